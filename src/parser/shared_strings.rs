//! Shared Strings Module
//!
//! 共有文字列テーブル（`xl/sharedStrings.xml`）の解析。
//!
//! テーブルはワークブックを開く時点で1回だけ読み込まれ、各文字列は`Arc<str>`として保持されます。
//! セルは文字列をコピーせず、テーブル内の文字列へのハンドルを参照します。

use std::borrow::Cow;
use std::io::BufRead;
use std::sync::Arc;

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::error::FormatError;

/// 事前確保する容量の上限（`uniqueCount`が巨大な値でもメモリを浪費しない）
const MAX_PREALLOCATED: usize = 1 << 20;

/// 共有文字列テーブル
///
/// 順序付きの不変な文字列リストです。インデックスは`<si>`要素の出現順です。
#[derive(Debug, Clone, Default)]
pub struct SharedStrings {
    strings: Vec<Arc<str>>,
}

impl SharedStrings {
    /// 文字列のリストからテーブルを生成
    pub fn new<I, S>(strings: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Arc<str>>,
    {
        Self {
            strings: strings.into_iter().map(Into::into).collect(),
        }
    }

    /// エントリ数
    pub fn len(&self) -> usize {
        self.strings.len()
    }

    /// テーブルが空か
    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }

    /// インデックスで文字列を取得
    pub fn get(&self, index: usize) -> Option<&Arc<str>> {
        self.strings.get(index)
    }

    /// 文字列のイテレータ（テーブル順）
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.strings.iter().map(|s| s.as_ref())
    }

    /// `<sst>`要素を解析
    ///
    /// # 引数
    ///
    /// * `source` - `sharedStrings.xml`の内容を読み込むリーダー
    /// * `entry` - エラーメッセージ用のエントリ名
    ///
    /// # 戻り値
    ///
    /// * `Ok(SharedStrings)` - 解析に成功した場合
    /// * `Err(FormatError::CorruptIndex)` - XMLが不正、または途中で終了している場合
    pub(crate) fn parse<R: BufRead>(source: R, entry: &str) -> Result<Self, FormatError> {
        let corrupt = |message: String| FormatError::CorruptIndex(format!("{}: {}", entry, message));

        let mut reader = Reader::from_reader(source);
        // `xml:space="preserve"`の空白を保持するため、トリムしない
        reader.trim_text(false);

        let mut buf = Vec::new();
        let mut strings = Vec::new();
        let mut current = String::new();
        let mut in_si = false;
        let mut in_t = false;
        let mut phonetic_depth = 0usize;

        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(e)) => match e.local_name().as_ref() {
                    b"sst" => {
                        for attr in e.attributes().flatten() {
                            if attr.key.as_ref() == b"uniqueCount" {
                                let count = std::str::from_utf8(&attr.value)
                                    .ok()
                                    .and_then(|v| v.parse::<usize>().ok())
                                    .unwrap_or(0);
                                strings.reserve(count.min(MAX_PREALLOCATED));
                            }
                        }
                    }
                    b"si" => {
                        in_si = true;
                        current.clear();
                    }
                    // ふりがな（<rPh>）は本文に含めない
                    b"rPh" if in_si => phonetic_depth += 1,
                    b"t" if in_si && phonetic_depth == 0 => in_t = true,
                    _ => {}
                },
                Ok(Event::Empty(e)) => {
                    // <si/> も1つのスロットを占める
                    if e.local_name().as_ref() == b"si" {
                        strings.push(Arc::from(""));
                    }
                }
                Ok(Event::Text(e)) => {
                    if in_t {
                        let text = e
                            .unescape()
                            .map_err(|e| corrupt(format!("XML text error: {}", e)))?;
                        current.push_str(&text);
                    }
                }
                Ok(Event::CData(e)) => {
                    if in_t {
                        let text = std::str::from_utf8(&e)
                            .map_err(|e| corrupt(format!("invalid UTF-8: {}", e)))?;
                        current.push_str(text);
                    }
                }
                Ok(Event::End(e)) => match e.local_name().as_ref() {
                    b"t" => in_t = false,
                    b"rPh" if phonetic_depth > 0 => phonetic_depth -= 1,
                    b"si" if in_si => {
                        strings.push(Arc::from(decode_escapes(&current).as_ref()));
                        in_si = false;
                        phonetic_depth = 0;
                    }
                    _ => {}
                },
                Ok(Event::Eof) => {
                    if in_si {
                        return Err(corrupt(format!(
                            "unexpected end of file in string #{}",
                            strings.len()
                        )));
                    }
                    break;
                }
                Err(e) => return Err(corrupt(format!("XML parse error: {}", e))),
                _ => {}
            }
            buf.clear();
        }

        Ok(Self { strings })
    }
}

/// OOXMLのエスケープ（`_xHHHH_`）をデコード
///
/// XMLで表現できない制御文字などは`_x000D_`のように保存されます。
pub(crate) fn decode_escapes(text: &str) -> Cow<'_, str> {
    if !text.contains("_x") {
        return Cow::Borrowed(text);
    }

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(pos) = rest.find("_x") {
        out.push_str(&rest[..pos]);
        let candidate = &rest[pos..];
        match parse_escape(candidate) {
            Some(ch) => {
                out.push(ch);
                rest = &candidate[7..];
            }
            None => {
                out.push_str("_x");
                rest = &candidate[2..];
            }
        }
    }
    out.push_str(rest);
    Cow::Owned(out)
}

/// `_xHHHH_`の1つを解析
fn parse_escape(candidate: &str) -> Option<char> {
    let bytes = candidate.as_bytes();
    if bytes.len() < 7 || bytes[6] != b'_' || !bytes[2..6].iter().all(u8::is_ascii_hexdigit) {
        return None;
    }
    let code = u32::from_str_radix(&candidate[2..6], 16).ok()?;
    char::from_u32(code)
}
