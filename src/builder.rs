//! Builder Module
//!
//! Fluent Builder APIを提供し、`SheetReader`インスタンスを段階的に構築する。

use crate::api::{ColumnKey, SheetSelector};
use crate::error::XlError;
use crate::parser::Workbook;
use crate::reference::column_name_to_index;
use crate::rows::{Records, Rows};
use crate::security::SecurityLimits;
use crate::types::{CellCoord, CellRange, MAX_COLUMNS, MAX_ROWS};
use std::io::Read;

/// 読み込み設定（`ReaderBuilder::build()`で検証済み）
#[derive(Debug, Clone, PartialEq)]
pub struct ReadOptions {
    /// シート選択方式
    pub(crate) sheet: SheetSelector,

    /// ヘッダー行（0始まり、Noneの場合はヘッダーなし）
    pub(crate) header_row: Option<u32>,

    /// 読み込む列（Noneの場合はすべての列）
    pub(crate) columns: Option<Vec<ColumnKey>>,

    /// 欠落した行を空行で補完するか
    pub(crate) dense: bool,

    /// セル範囲制限（Option: Noneの場合は全範囲）
    pub(crate) range: Option<CellRange>,

    /// セキュリティ制限
    pub(crate) limits: SecurityLimits,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            sheet: SheetSelector::Index(0),
            header_row: None,
            columns: None,
            dense: false,
            range: None,
            limits: SecurityLimits::default(),
        }
    }
}

impl ReadOptions {
    /// シート選択方式
    pub fn sheet(&self) -> &SheetSelector {
        &self.sheet
    }

    /// ヘッダー行
    pub fn header_row(&self) -> Option<u32> {
        self.header_row
    }

    /// 読み込む列
    pub fn columns(&self) -> Option<&[ColumnKey]> {
        self.columns.as_deref()
    }

    /// 欠落行を補完するか
    pub fn is_dense(&self) -> bool {
        self.dense
    }

    /// セル範囲
    pub fn range(&self) -> Option<CellRange> {
        self.range
    }

    /// セキュリティ制限
    pub fn limits(&self) -> &SecurityLimits {
        &self.limits
    }
}

/// Fluent Builder APIを提供する構造体
///
/// `SheetReader`インスタンスを段階的に構築するためのビルダーです。
/// すべての設定項目にデフォルト値が設定されており、必要な設定のみをオーバーライドできます。
///
/// # 使用例
///
/// ```rust,no_run
/// use xlrows::{ReaderBuilder, SheetSelector};
///
/// # fn main() -> Result<(), xlrows::XlError> {
/// let reader = ReaderBuilder::new()
///     .with_sheet(SheetSelector::Name("Data".to_string()))
///     .with_header_row(0)
///     .build()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct ReaderBuilder {
    /// 内部設定（構築中）
    options: ReadOptions,
}

impl ReaderBuilder {
    /// デフォルト設定を持つビルダーインスタンスを生成する
    ///
    /// # デフォルト設定
    ///
    /// - シート選択: 最初のシート
    /// - ヘッダー行: なし
    /// - 列: すべての列
    /// - 欠落行の補完: しない
    /// - セル範囲: 制限なし
    pub fn new() -> Self {
        Self {
            options: ReadOptions::default(),
        }
    }

    /// 読み込むシートを選択する
    ///
    /// # 引数
    ///
    /// * `selector` - シート選択方式（`SheetSelector`、`usize`、`&str`から変換可能）
    ///
    /// # 使用例
    ///
    /// ```rust,no_run
    /// use xlrows::{ReaderBuilder, SheetSelector};
    ///
    /// // インデックスで指定
    /// let builder = ReaderBuilder::new().with_sheet(SheetSelector::Index(1));
    ///
    /// // シート名で指定
    /// let builder = ReaderBuilder::new().with_sheet("Sheet2");
    /// ```
    pub fn with_sheet<S: Into<SheetSelector>>(mut self, selector: S) -> Self {
        self.options.sheet = selector.into();
        self
    }

    /// 最初の行をヘッダーとして使うかを指定する
    ///
    /// `true`の場合、シートで最初に存在する行（行番号に関係なく）がヘッダーになります。
    /// `with_header_row(0)`と同じです。
    pub fn with_headers(mut self, headers: bool) -> Self {
        self.options.header_row = headers.then_some(0);
        self
    }

    /// ヘッダー行の検索開始位置を指定する（0始まり）
    ///
    /// `row`以降で最初に存在する行がヘッダーになり、データ行としては返されません。
    /// 疎なシートでは、ヘッダーの実際の行番号は`Rows::header()`で確認できます。
    /// ヘッダー名による列指定（`ColumnKey::Header`）とレコード読み込みに必要です。
    pub fn with_header_row(mut self, row: u32) -> Self {
        self.options.header_row = Some(row);
        self
    }

    /// 読み込む列を指定する
    ///
    /// 指定されなかった列のセルはデコードされません。
    ///
    /// # 使用例
    ///
    /// ```rust,no_run
    /// use xlrows::{ColumnKey, ReaderBuilder};
    ///
    /// let builder = ReaderBuilder::new()
    ///     .with_columns(vec![ColumnKey::Index(0), ColumnKey::Letter("C".to_string())]);
    /// ```
    pub fn with_columns<I, K>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<ColumnKey>,
    {
        self.options.columns = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    /// 欠落した行を空行で補完するか
    ///
    /// `true`の場合、ファイル上に`<row>`がない行番号にも空行を返します。
    pub fn dense(mut self, dense: bool) -> Self {
        self.options.dense = dense;
        self
    }

    /// セル範囲を制限する
    ///
    /// # 引数
    ///
    /// * `start` - 開始座標 (行, 列)、0始まり
    /// * `end` - 終了座標 (行, 列)、0始まり、この座標を含む
    ///
    /// # 使用例
    ///
    /// ```rust,no_run
    /// use xlrows::ReaderBuilder;
    ///
    /// // A1:C10 の範囲のみ読み込む
    /// let builder = ReaderBuilder::new().with_range((0, 0), (9, 2));
    /// ```
    pub fn with_range(mut self, start: (u32, u32), end: (u32, u32)) -> Self {
        self.options.range = Some(CellRange::new(
            CellCoord::new(start.0, start.1),
            CellCoord::new(end.0, end.1),
        ));
        self
    }

    /// セキュリティ制限を変更する
    pub fn with_limits(mut self, limits: SecurityLimits) -> Self {
        self.options.limits = limits;
        self
    }

    /// 設定を検証し、`SheetReader`インスタンスを生成する
    ///
    /// # 戻り値
    ///
    /// * `Ok(SheetReader)`: 設定が有効な場合
    /// * `Err(XlError::Config)`: 設定が無効な場合
    ///
    /// # 発生し得るエラー
    ///
    /// * `XlError::Config(String)`: 設定の検証に失敗した場合
    ///   * 範囲指定の開始座標が終了座標より大きい、またはシートの上限を超えている
    ///   * 列の指定が空
    ///   * ヘッダー行なしでヘッダー名による列指定がある
    ///   * 列名・列インデックスが不正
    pub fn build(self) -> Result<SheetReader, XlError> {
        // 1. セル範囲の検証
        if let Some(range) = &self.options.range {
            if range.start.row > range.end.row {
                return Err(XlError::Config(format!(
                    "Invalid range: start row ({}) > end row ({})",
                    range.start.row, range.end.row
                )));
            }

            if range.start.col > range.end.col {
                return Err(XlError::Config(format!(
                    "Invalid range: start col ({}) > end col ({})",
                    range.start.col, range.end.col
                )));
            }

            if range.end.row >= MAX_ROWS || range.end.col >= MAX_COLUMNS {
                return Err(XlError::Config(format!(
                    "Invalid range: {} is outside the sheet bounds",
                    range.end
                )));
            }
        }

        // 2. ヘッダー行の検証
        if let Some(row) = self.options.header_row {
            if row >= MAX_ROWS {
                return Err(XlError::Config(format!(
                    "Invalid header row: {} (max: {})",
                    row,
                    MAX_ROWS - 1
                )));
            }
            if let Some(range) = &self.options.range {
                if row > range.end.row {
                    return Err(XlError::Config(format!(
                        "Invalid header row: {} is after the range end row ({})",
                        row, range.end.row
                    )));
                }
            }
        }

        // 3. 列指定の検証
        if let Some(columns) = &self.options.columns {
            if columns.is_empty() {
                return Err(XlError::Config("Column selection is empty".to_string()));
            }
            for key in columns {
                match key {
                    ColumnKey::Index(index) if *index >= MAX_COLUMNS => {
                        return Err(XlError::Config(format!(
                            "Invalid column index: {} (max: {})",
                            index,
                            MAX_COLUMNS - 1
                        )));
                    }
                    ColumnKey::Letter(letter) => {
                        column_name_to_index(letter).map_err(|e| {
                            XlError::Config(format!("Invalid column letter '{}': {}", letter, e))
                        })?;
                    }
                    ColumnKey::Header(name) if self.options.header_row.is_none() => {
                        return Err(XlError::Config(format!(
                            "Column '{}' is selected by header name but no header row is set",
                            name
                        )));
                    }
                    _ => {}
                }
            }
        }

        Ok(SheetReader {
            options: self.options,
        })
    }
}

/// 行読み込みのファサード
///
/// `ReaderBuilder`で構築された設定に基づいて、ワークブックから行またはレコードを読み込みます。
/// `SheetReader`は状態を持たないため、同じワークブックに対して何度でも`rows()`を呼べます。
///
/// # 使用例
///
/// ```rust,no_run
/// use xlrows::ReaderBuilder;
/// use std::fs::File;
///
/// # fn main() -> Result<(), xlrows::XlError> {
/// let reader = ReaderBuilder::new().with_header_row(0).build()?;
/// for record in reader.read_records(File::open("people.xlsx")?)? {
///     let record = record?;
///     println!("{}", record.to_json());
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct SheetReader {
    options: ReadOptions,
}

impl SheetReader {
    /// 検証済みの設定
    pub fn options(&self) -> &ReadOptions {
        &self.options
    }

    /// 行のイテレータを生成する
    ///
    /// # 戻り値
    ///
    /// * `Ok(Rows)` - 行のイテレータ（ヘッダー行は読み込み済み）
    /// * `Err(XlError)` - シートが存在しない、ヘッダー名が見つからない、またはシートの先頭が壊れている場合
    pub fn rows(&self, workbook: &Workbook) -> Result<Rows, XlError> {
        Rows::open(workbook, &self.options)
    }

    /// レコード（ヘッダー名で参照できる行）のイテレータを生成する
    ///
    /// ヘッダー行の指定が必要です。
    pub fn records(&self, workbook: &Workbook) -> Result<Records, XlError> {
        if self.options.header_row.is_none() {
            return Err(XlError::Config(
                "Records require a header row (use with_header_row)".to_string(),
            ));
        }
        Records::new(self.rows(workbook)?)
    }

    /// 入力を読み込んでワークブックを開き、行のイテレータを生成する
    ///
    /// 返される`Rows`はワークブックへの参照を保持するため、ワークブックを別途保持する必要はありません。
    pub fn read<R: Read>(&self, input: R) -> Result<Rows, XlError> {
        let workbook = Workbook::open_with_limits(input, &self.options.limits)?;
        self.rows(&workbook)
    }

    /// 入力を読み込んでワークブックを開き、レコードのイテレータを生成する
    pub fn read_records<R: Read>(&self, input: R) -> Result<Records, XlError> {
        let workbook = Workbook::open_with_limits(input, &self.options.limits)?;
        self.records(&workbook)
    }
}
