//! Styles Module
//!
//! `xl/styles.xml`から、セルスタイルごとの「日付書式かどうか」だけを抽出します。
//! 数値セルを`Cell::Date`として返すかどうかの判定に使用します。

use std::collections::HashMap;
use std::io::BufRead;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::FormatError;

/// スタイルテーブル（スタイルインデックス -> 日付書式フラグ）
#[derive(Debug, Clone, Default)]
pub(crate) struct StyleTable {
    date_styles: Vec<bool>,
}

impl StyleTable {
    /// 空のテーブル（すべてのスタイルが日付書式ではない）
    pub(crate) const fn empty() -> Self {
        Self {
            date_styles: Vec::new(),
        }
    }

    /// スタイルインデックス（`<c s="...">`）が日付書式か
    pub fn is_date(&self, style: u32) -> bool {
        self.date_styles
            .get(style as usize)
            .copied()
            .unwrap_or(false)
    }

    /// スタイル数
    pub fn len(&self) -> usize {
        self.date_styles.len()
    }

    /// `<numFmts>`と`<cellXfs>`を解析
    pub(crate) fn parse<R: BufRead>(source: R, entry: &str) -> Result<Self, FormatError> {
        let corrupt = |message: String| FormatError::CorruptIndex(format!("{}: {}", entry, message));

        let mut reader = Reader::from_reader(source);
        reader.trim_text(true);

        let mut buf = Vec::new();
        let mut custom_formats: HashMap<u32, bool> = HashMap::new();
        let mut xf_formats: Vec<u32> = Vec::new();
        let mut in_num_fmts = false;
        let mut in_cell_xfs = false;

        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(e)) => match e.local_name().as_ref() {
                    b"numFmts" => in_num_fmts = true,
                    b"cellXfs" => in_cell_xfs = true,
                    b"numFmt" if in_num_fmts => {
                        if let Some((id, is_date)) = read_num_fmt(&e).map_err(&corrupt)? {
                            custom_formats.insert(id, is_date);
                        }
                    }
                    b"xf" if in_cell_xfs => xf_formats.push(read_xf(&e).map_err(&corrupt)?),
                    _ => {}
                },
                // <numFmt .../> と <xf .../> は通常、自己終了タグ
                Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                    b"numFmt" if in_num_fmts => {
                        if let Some((id, is_date)) = read_num_fmt(&e).map_err(&corrupt)? {
                            custom_formats.insert(id, is_date);
                        }
                    }
                    b"xf" if in_cell_xfs => xf_formats.push(read_xf(&e).map_err(&corrupt)?),
                    _ => {}
                },
                Ok(Event::End(e)) => match e.local_name().as_ref() {
                    b"numFmts" => in_num_fmts = false,
                    b"cellXfs" => in_cell_xfs = false,
                    _ => {}
                },
                Ok(Event::Eof) => break,
                Err(e) => return Err(corrupt(format!("XML parse error: {}", e))),
                _ => {}
            }
            buf.clear();
        }

        // カスタム書式はビルトインIDを上書きできる
        let date_styles = xf_formats
            .into_iter()
            .map(|id| {
                custom_formats
                    .get(&id)
                    .copied()
                    .unwrap_or_else(|| is_builtin_date_format(id))
            })
            .collect();

        Ok(Self { date_styles })
    }
}

/// `<numFmt numFmtId="165" formatCode="yyyy/mm/dd"/>`
fn read_num_fmt(e: &BytesStart<'_>) -> Result<Option<(u32, bool)>, String> {
    let mut id = None;
    let mut code = None;
    for attr in e.attributes() {
        let attr = attr.map_err(|e| format!("XML attribute error: {}", e))?;
        match attr.key.as_ref() {
            b"numFmtId" => {
                id = std::str::from_utf8(&attr.value)
                    .ok()
                    .and_then(|v| v.parse::<u32>().ok());
            }
            b"formatCode" => {
                let value = attr
                    .unescape_value()
                    .map_err(|e| format!("XML attribute error: {}", e))?;
                code = Some(value.into_owned());
            }
            _ => {}
        }
    }
    Ok(match (id, code) {
        (Some(id), Some(code)) => Some((id, is_date_format(&code))),
        _ => None,
    })
}

/// `<xf numFmtId="14" .../>`
fn read_xf(e: &BytesStart<'_>) -> Result<u32, String> {
    for attr in e.attributes() {
        let attr = attr.map_err(|e| format!("XML attribute error: {}", e))?;
        if attr.key.as_ref() == b"numFmtId" {
            return Ok(std::str::from_utf8(&attr.value)
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(0));
        }
    }
    Ok(0)
}

/// ビルトイン書式IDが日付・時刻書式か
///
/// 14-22: 日付・時刻、27-36 / 50-58: 東アジア向け日付書式、45-47: 経過時間
pub(crate) fn is_builtin_date_format(id: u32) -> bool {
    matches!(id, 14..=22 | 27..=36 | 45..=47 | 50..=58)
}

/// 書式文字列が日付・時刻書式か
///
/// 引用符（`"..."`）、ブラケット（`[Red]`、`[$-409]`）、エスケープ（`\x`、`_x`、`*x`）の
/// 外側に日付・時刻トークン（`y`、`m`、`d`、`h`、`s`）があれば日付書式とみなします。
/// 経過時間（`[h]`、`[mm]`、`[ss]`）も日付書式として扱います。
pub(crate) fn is_date_format(code: &str) -> bool {
    let mut chars = code.chars();
    while let Some(ch) = chars.next() {
        match ch {
            '"' => {
                for c in chars.by_ref() {
                    if c == '"' {
                        break;
                    }
                }
            }
            '[' => {
                let mut inner = String::new();
                for c in chars.by_ref() {
                    if c == ']' {
                        break;
                    }
                    inner.push(c);
                }
                let inner = inner.to_ascii_lowercase();
                if !inner.is_empty() && inner.chars().all(|c| matches!(c, 'h' | 'm' | 's')) {
                    return true;
                }
            }
            '\\' | '_' | '*' => {
                chars.next();
            }
            'y' | 'Y' | 'm' | 'M' | 'd' | 'D' | 'h' | 'H' | 's' | 'S' => return true,
            _ => {}
        }
    }
    false
}
