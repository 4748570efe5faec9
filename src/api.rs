//! Public API Types
//!
//! 公開APIで使用する列挙型を定義するモジュール。

use std::fmt;

/// シート選択方式
///
/// 読み込むシートを選択する方法を指定します。
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SheetSelector {
    /// インデックス指定（0始まり、ワークブック内の順序）
    ///
    /// 例: `SheetSelector::Index(0)` は最初のシートを選択（デフォルト）
    Index(usize),

    /// シート名指定（完全一致）
    ///
    /// 例: `SheetSelector::Name("Sheet1".to_string())`
    Name(String),
}

impl Default for SheetSelector {
    fn default() -> Self {
        SheetSelector::Index(0)
    }
}

impl From<usize> for SheetSelector {
    fn from(index: usize) -> Self {
        SheetSelector::Index(index)
    }
}

impl From<&str> for SheetSelector {
    fn from(name: &str) -> Self {
        SheetSelector::Name(name.to_string())
    }
}

impl From<String> for SheetSelector {
    fn from(name: String) -> Self {
        SheetSelector::Name(name)
    }
}

impl fmt::Display for SheetSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SheetSelector::Index(index) => write!(f, "#{}", index),
            SheetSelector::Name(name) => write!(f, "'{}'", name),
        }
    }
}

/// 列の指定方法
///
/// 読み込む列（射影）を指定します。指定されなかった列はデコードされません。
///
/// # 使用例
///
/// ```rust,no_run
/// use xlrows::{ColumnKey, ReaderBuilder};
///
/// # fn main() -> Result<(), xlrows::XlError> {
/// let reader = ReaderBuilder::new()
///     .with_header_row(0)
///     .with_columns(vec![
///         ColumnKey::Index(0),
///         ColumnKey::Letter("C".to_string()),
///         ColumnKey::Header("Age".to_string()),
///     ])
///     .build()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ColumnKey {
    /// 列インデックス（0始まり）
    Index(u32),

    /// 列名（`"A"`、`"AB"`、大文字・小文字を区別しない）
    Letter(String),

    /// ヘッダー行のセル値（ヘッダー行の指定が必要）
    Header(String),
}

impl From<u32> for ColumnKey {
    fn from(index: u32) -> Self {
        ColumnKey::Index(index)
    }
}

/// 文字列はヘッダー名として扱う（列名は`ColumnKey::Letter`で指定）
impl From<&str> for ColumnKey {
    fn from(name: &str) -> Self {
        ColumnKey::Header(name.to_string())
    }
}

impl From<String> for ColumnKey {
    fn from(name: String) -> Self {
        ColumnKey::Header(name)
    }
}

impl fmt::Display for ColumnKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnKey::Index(index) => write!(f, "column #{}", index),
            ColumnKey::Letter(letter) => write!(f, "column {}", letter),
            ColumnKey::Header(name) => write!(f, "header '{}'", name),
        }
    }
}
