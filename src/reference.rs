//! Reference Module
//!
//! A1形式のセル参照（`B2`）と範囲参照（`A1:C10`）の解析。
//! 列名は大文字・小文字を区別せず、`$`による絶対参照記号は無視します。

use crate::error::ReferenceError;
use crate::types::{CellCoord, CellRange, MAX_COLUMNS, MAX_ROWS};

/// 列名を列インデックスに変換（"A" -> 0, "Z" -> 25, "AA" -> 26）
///
/// # 戻り値
///
/// * `Ok(u32)` - 0始まりの列インデックス
/// * `Err(ReferenceError)` - 空文字列、英字以外を含む、または列数の上限を超える場合
pub fn column_name_to_index(name: &str) -> Result<u32, ReferenceError> {
    if name.is_empty() {
        return Err(ReferenceError::Empty);
    }

    let mut value: u32 = 0;
    for ch in name.chars() {
        if !ch.is_ascii_alphabetic() {
            return Err(ReferenceError::Syntax {
                input: name.to_string(),
                message: "column names may only contain letters",
            });
        }
        let digit = (ch.to_ascii_uppercase() as u32) - ('A' as u32) + 1;
        value = value
            .checked_mul(26)
            .and_then(|v| v.checked_add(digit))
            .filter(|v| *v <= MAX_COLUMNS)
            .ok_or_else(|| ReferenceError::OutOfBounds(name.to_string()))?;
    }

    Ok(value - 1)
}

/// セル参照を座標に変換（"A1" -> (0, 0)、"$B$2" -> (1, 1)）
pub fn parse_cell_reference(input: &str) -> Result<CellCoord, ReferenceError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(ReferenceError::Empty);
    }

    let body: String = trimmed.chars().filter(|c| *c != '$').collect();
    let split = body
        .find(|c: char| !c.is_ascii_alphabetic())
        .ok_or_else(|| ReferenceError::Syntax {
            input: input.to_string(),
            message: "expected a row number after the column name",
        })?;
    let (column, row) = body.split_at(split);

    if column.is_empty() {
        return Err(ReferenceError::Syntax {
            input: input.to_string(),
            message: "expected a column name",
        });
    }
    if !row.chars().all(|c| c.is_ascii_digit()) {
        return Err(ReferenceError::Syntax {
            input: input.to_string(),
            message: "expected a number for row value",
        });
    }

    let col = column_name_to_index(column)?;
    let row: u32 = row
        .parse()
        .map_err(|_| ReferenceError::OutOfBounds(input.to_string()))?;
    if row == 0 || row > MAX_ROWS {
        return Err(ReferenceError::OutOfBounds(input.to_string()));
    }

    Ok(CellCoord::new(row - 1, col))
}

/// 範囲参照を範囲に変換（"A1:B5" -> (0, 0)..=(4, 1)）
///
/// 始点と終点が逆順の場合は正規化します（"B5:A1"も同じ範囲）。
pub fn parse_range_reference(input: &str) -> Result<CellRange, ReferenceError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(ReferenceError::Empty);
    }

    let (first, second) = trimmed
        .split_once(':')
        .ok_or_else(|| ReferenceError::Syntax {
            input: input.to_string(),
            message: "expected ':' between the range corners",
        })?;

    let a = parse_cell_reference(first)?;
    let b = parse_cell_reference(second)?;

    Ok(CellRange::new(
        CellCoord::new(a.row.min(b.row), a.col.min(b.col)),
        CellCoord::new(a.row.max(b.row), a.col.max(b.col)),
    ))
}

/// シートXMLのセル参照（`r`属性）を高速に解析
///
/// ストリーミング中に全セルで呼ばれるため、検証は最小限です。
pub(crate) fn parse_cell_ref_bytes(value: &[u8]) -> Option<(u32, u32)> {
    let mut col: u32 = 0;
    let mut row: u32 = 0;
    let mut seen_digit = false;

    for &b in value {
        match b {
            b'A'..=b'Z' if !seen_digit => col = col * 26 + (b - b'A' + 1) as u32,
            b'a'..=b'z' if !seen_digit => col = col * 26 + (b - b'a' + 1) as u32,
            b'0'..=b'9' => {
                seen_digit = true;
                row = row.checked_mul(10)?.checked_add((b - b'0') as u32)?;
            }
            b'$' => {}
            _ => return None,
        }
        if col > MAX_COLUMNS {
            return None;
        }
    }

    if col == 0 || row == 0 {
        return None;
    }
    Some((row - 1, col - 1))
}
