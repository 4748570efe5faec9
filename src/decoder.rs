//! Cell Decoder Module
//!
//! シートXMLから切り出した生のセルトークン（[`RawCell`]）を、型付きの[`Cell`]に変換するモジュール。
//!
//! デコーダーは純粋な関数であり、入出力を行いません。
//! 共有文字列テーブル、スタイルテーブル、日付エポックはワークブックから借用します。

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike};

use crate::error::DecodeError;
use crate::parser::{SharedStrings, StyleTable};
use crate::types::{Cell, CellError, DateEpoch, ErrorCode, Text};

static EMPTY_STYLES: StyleTable = StyleTable::empty();

/// セルの型タグ（`<c t="...">`）
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CellTypeTag {
    /// `t`属性なし、または`t="n"`
    #[default]
    Number,
    /// `t="s"`: 共有文字列インデックス
    SharedString,
    /// `t="inlineStr"`: `<is>`要素内の文字列
    InlineString,
    /// `t="str"`: 数式の文字列結果
    FormulaString,
    /// `t="b"`
    Boolean,
    /// `t="e"`
    Error,
    /// `t="d"`: ISO 8601形式の日付
    Date,
    /// 未知の型
    Unknown(String),
}

impl CellTypeTag {
    /// `t`属性の値から型タグを生成
    pub fn from_attr(value: &[u8]) -> Self {
        match value {
            b"n" | b"" => CellTypeTag::Number,
            b"s" => CellTypeTag::SharedString,
            b"inlineStr" => CellTypeTag::InlineString,
            b"str" => CellTypeTag::FormulaString,
            b"b" => CellTypeTag::Boolean,
            b"e" => CellTypeTag::Error,
            b"d" => CellTypeTag::Date,
            other => CellTypeTag::Unknown(String::from_utf8_lossy(other).into_owned()),
        }
    }
}

/// 生のセルトークン
///
/// 現在の行を読み込む間だけカーソルにバッファされます。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawCell {
    /// 列インデックス（0始まり）
    pub col: u32,
    /// 型タグ
    pub tag: CellTypeTag,
    /// スタイルインデックス（`s`属性）
    pub style: u32,
    /// `<v>`要素のテキスト
    pub value: Option<String>,
    /// `<is>`要素内のテキスト（連結済み）
    pub inline: Option<String>,
}

/// セルデコーダー
///
/// # 使用例
///
/// ```rust
/// use xlrows::{CellDecoder, CellTypeTag, DateEpoch, RawCell, SharedStrings};
///
/// let strings = SharedStrings::new(["Name", "Age"]);
/// let decoder = CellDecoder::new(&strings, DateEpoch::E1900);
///
/// let raw = RawCell {
///     tag: CellTypeTag::SharedString,
///     value: Some("1".to_string()),
///     ..RawCell::default()
/// };
/// assert_eq!(decoder.decode(&raw).unwrap().as_str(), Some("Age"));
/// ```
#[derive(Debug, Clone, Copy)]
pub struct CellDecoder<'a> {
    shared_strings: &'a SharedStrings,
    styles: &'a StyleTable,
    epoch: DateEpoch,
}

impl<'a> CellDecoder<'a> {
    /// 新しいデコーダーを生成（スタイル情報なし、数値は日付として扱わない）
    pub fn new(shared_strings: &'a SharedStrings, epoch: DateEpoch) -> Self {
        Self {
            shared_strings,
            styles: &EMPTY_STYLES,
            epoch,
        }
    }

    pub(crate) fn with_styles(mut self, styles: &'a StyleTable) -> Self {
        self.styles = styles;
        self
    }

    /// セルをデコード
    ///
    /// # 戻り値
    ///
    /// * `Ok(Cell)` - デコードに成功した場合（値がないセルは`Cell::Empty`）
    /// * `Err(DecodeError)` - 型タグと値が一致しない場合
    pub fn decode(&self, raw: &RawCell) -> Result<Cell, DecodeError> {
        match &raw.tag {
            CellTypeTag::Number => {
                let value = match non_empty(&raw.value) {
                    Some(v) => v,
                    None => return Ok(Cell::Empty),
                };
                let number = parse_number(value)?;
                if self.styles.is_date(raw.style) {
                    Ok(Cell::Date {
                        serial: number,
                        epoch: self.epoch,
                    })
                } else {
                    Ok(Cell::Number(number))
                }
            }
            CellTypeTag::SharedString => {
                let value = match non_empty(&raw.value) {
                    Some(v) => v,
                    None => return Ok(Cell::Empty),
                };
                let bad_reference = || DecodeError::BadReference {
                    index: value.to_string(),
                    len: self.shared_strings.len(),
                };
                let index: u32 = value.parse().map_err(|_| bad_reference())?;
                let text = self
                    .shared_strings
                    .get(index as usize)
                    .ok_or_else(bad_reference)?;
                Ok(Cell::Text(Text::Shared {
                    index,
                    value: text.clone(),
                }))
            }
            CellTypeTag::InlineString => match raw.inline.as_ref().or(raw.value.as_ref()) {
                Some(text) => Ok(Cell::Text(Text::Inline(text.clone()))),
                None => Ok(Cell::Empty),
            },
            // 空文字列を返す数式は<v></v>になる
            CellTypeTag::FormulaString => Ok(Cell::Text(Text::Inline(
                raw.value.clone().unwrap_or_default(),
            ))),
            CellTypeTag::Boolean => match non_empty(&raw.value) {
                None => Ok(Cell::Empty),
                Some("1") | Some("true") | Some("TRUE") => Ok(Cell::Boolean(true)),
                Some("0") | Some("false") | Some("FALSE") => Ok(Cell::Boolean(false)),
                Some(other) => Err(DecodeError::BadBoolean(other.to_string())),
            },
            CellTypeTag::Error => match non_empty(&raw.value) {
                None => Ok(Cell::Empty),
                Some(code) => Ok(Cell::Error(CellError::Formula(ErrorCode::parse(code)))),
            },
            CellTypeTag::Date => {
                let value = match non_empty(&raw.value) {
                    Some(v) => v,
                    None => return Ok(Cell::Empty),
                };
                let serial = parse_iso_date(value, self.epoch)
                    .ok_or_else(|| DecodeError::BadDate(value.to_string()))?;
                Ok(Cell::Date {
                    serial,
                    epoch: self.epoch,
                })
            }
            CellTypeTag::Unknown(tag) => Err(DecodeError::UnknownType(tag.clone())),
        }
    }

    /// セルをデコードし、エラーを`Cell::Error`として埋め込む
    pub fn decode_lossy(&self, raw: &RawCell) -> Cell {
        self.decode(raw)
            .unwrap_or_else(|e| Cell::Error(CellError::Decode(e)))
    }

    /// ワークブックの日付エポック
    pub fn epoch(&self) -> DateEpoch {
        self.epoch
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// 有限のf64として解析（`inf`や`NaN`は拒否）
fn parse_number(value: &str) -> Result<f64, DecodeError> {
    value
        .parse::<f64>()
        .ok()
        .filter(|n| n.is_finite())
        .ok_or_else(|| DecodeError::BadNumber(value.to_string()))
}

/// ISO 8601形式の日付・時刻をシリアル値に変換
fn parse_iso_date(value: &str, epoch: DateEpoch) -> Option<f64> {
    let value = value.strip_suffix('Z').unwrap_or(value);

    if let Ok(datetime) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f") {
        return epoch.to_serial(datetime);
    }
    if let Ok(datetime) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M") {
        return epoch.to_serial(datetime);
    }
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return epoch.to_serial(date.and_hms_opt(0, 0, 0)?);
    }
    // 時刻のみの場合は1日に対する割合
    let time = NaiveTime::parse_from_str(value, "%H:%M:%S%.f")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M"))
        .ok()?;
    let millis = time.num_seconds_from_midnight() as f64 * 1000.0
        + (time.nanosecond() / 1_000_000) as f64;
    Some(millis / 86_400_000.0)
}
