//! Error Types Module
//!
//! クレート全体で使用する構造化エラー型を定義するモジュール。
//! `thiserror`を使用して、エラーの自動変換とメッセージフォーマットを実現する。
//!
//! エラーは発生するフェーズごとに分類されます。
//!
//! - [`FormatError`]: ワークブックを開く時点のエラー（回復不能）
//! - [`StreamError`]: 行の読み込み中のエラー（そのカーソルのみ終了）
//! - [`DecodeError`]: セル単位のエラー（行内に`Cell::Error`として埋め込まれる）

use thiserror::Error;

/// xlrowsクレート全体で使用するエラー型
///
/// # 使用例
///
/// ```rust,no_run
/// use xlrows::{Workbook, XlError};
/// use std::fs::File;
///
/// fn open(path: &str) -> Result<Workbook, XlError> {
///     let file = File::open(path)?; // Ioエラーが自動的に変換される
///     Workbook::open(file)
/// }
/// ```
#[derive(Error, Debug)]
pub enum XlError {
    /// I/O操作中に発生したエラー
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// コンテナ（ZIPアーカイブ）またはワークブック構造の解析エラー
    ///
    /// ワークブックを開く時点で発生し、行は1つも返されません。
    #[error("Invalid workbook: {0}")]
    Format(#[from] FormatError),

    /// シートの読み込み中に発生したエラー
    ///
    /// 発生したカーソルはそれ以降、行を返しません。
    #[error("Sheet stream error: {0}")]
    Stream(#[from] StreamError),

    /// セル値のデコードエラー
    ///
    /// 通常は行内の`Cell::Error`として返されるため、
    /// このバリアントは単体のデコードAPIからのみ返されます。
    #[error("Cell decode error: {0}")]
    Decode(#[from] DecodeError),

    /// A1形式のセル参照の解析エラー
    #[error("Invalid cell reference: {0}")]
    Reference(#[from] ReferenceError),

    /// 指定されたシートが存在しない
    #[error("Sheet not found: {0}")]
    NotFound(String),

    /// ヘッダー名が存在しない（レコードの名前アクセス時）
    #[error("Unknown column name: '{0}'")]
    Key(String),

    /// 設定の検証に失敗したエラー
    ///
    /// `ReaderBuilder::build()`時に設定を検証し、無効な設定が検出された
    /// 場合に発生します。
    ///
    /// # 例
    ///
    /// ```rust,no_run
    /// use xlrows::{ReaderBuilder, XlError};
    ///
    /// let result = ReaderBuilder::new()
    ///     .with_range((10, 0), (0, 0)) // 無効な範囲
    ///     .build();
    ///
    /// if let Err(XlError::Config(msg)) = result {
    ///     println!("設定エラー: {}", msg);
    /// }
    /// ```
    #[error("Configuration error: {0}")]
    Config(String),

    /// セキュリティ制限に違反したエラー
    ///
    /// ZIP bomb攻撃、パストラバーサル攻撃、ファイルサイズ制限などの
    /// セキュリティ制限に違反した場合に発生します。
    #[error("Security violation: {0}")]
    SecurityViolation(String),
}

/// ワークブックを開く時点で発生するエラー
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    /// 入力がZIPコンテナではない
    #[error("input is not a ZIP container")]
    NotAContainer,

    /// ワークブック・リレーションシップ・共有文字列などのインデックスが壊れている
    #[error("corrupt workbook index: {0}")]
    CorruptIndex(String),

    /// 対応していない圧縮方式のエントリ
    #[error("entry '{entry}' uses unsupported compression method {method}")]
    UnsupportedCompression {
        /// エントリ名
        entry: String,
        /// 圧縮方式（表示用）
        method: String,
    },

    /// 暗号化されたエントリ
    #[error("entry '{0}' is encrypted")]
    Encrypted(String),
}

/// 行の読み込み中に発生するエラー（カーソルに対して終端的）
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    /// `</sheetData>`より前にストリームが終了した
    ///
    /// `row`は読み込み中だった行番号（0始まり、判明している場合）。
    #[error("sheet stream truncated{}", fmt_row(.row))]
    Truncated {
        /// 読み込み中だった行番号
        row: Option<u32>,
    },

    /// 下位ストリームのI/Oエラー
    #[error("I/O error while reading sheet: {0}")]
    Io(String),

    /// 不正なXML
    #[error("malformed sheet XML{}: {message}", fmt_row(.row))]
    Malformed {
        /// 読み込み中だった行番号
        row: Option<u32>,
        /// 詳細メッセージ
        message: String,
    },
}

fn fmt_row(row: &Option<u32>) -> String {
    match row {
        Some(r) => format!(" at row {}", r + 1),
        None => String::new(),
    }
}

/// セル単位のデコードエラー
///
/// 行全体を中断せず、該当位置に`Cell::Error`として埋め込まれます。
#[derive(Error, Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub enum DecodeError {
    /// 数値タグ付きのトークンが数値として解析できない
    #[error("bad number: '{0}'")]
    BadNumber(String),

    /// 共有文字列インデックスが不正、または範囲外
    #[error("bad shared string reference: '{index}' (table size: {len})")]
    BadReference {
        /// 元のトークン
        index: String,
        /// 共有文字列テーブルのサイズ
        len: usize,
    },

    /// 論理値タグ付きのトークンが不正
    #[error("bad boolean: '{0}'")]
    BadBoolean(String),

    /// 日付タグ付き（`t="d"`）のトークンが不正
    #[error("bad date: '{0}'")]
    BadDate(String),

    /// 未知のセル型
    #[error("unknown cell type: '{0}'")]
    UnknownType(String),
}

/// A1形式の参照の解析エラー
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReferenceError {
    /// 空の入力
    #[error("empty input")]
    Empty,

    /// 構文エラー
    #[error("syntax error in '{input}': {message}")]
    Syntax {
        /// 元の入力
        input: String,
        /// 詳細メッセージ
        message: &'static str,
    },

    /// 行または列がシートの上限を超えている
    #[error("reference '{0}' is outside the sheet bounds")]
    OutOfBounds(String),
}

/// テーブル関数の実行計画のエラー
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    /// 必須の隠し列（引数）に等価制約がない
    #[error("missing required argument '{0}'")]
    MissingArgument(&'static str),

    /// 隠し列に等価以外の制約、または使用できない制約がある
    #[error("argument '{0}' only supports usable equality constraints")]
    UnusableConstraint(&'static str),
}
