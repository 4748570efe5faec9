//! Table Function Module
//!
//! データベースの仮想テーブル（テーブル値関数）として行・セル・シートを公開するためのアダプター。
//! 特定のデータベースには依存せず、ホスト側は次の流れで呼び出します。
//!
//! 1. [`TableFunction::create_sql`]でテーブルを宣言する
//! 2. [`TableFunction::best_index`]で、隠し列（引数）の制約から実行計画を立てる
//! 3. [`TableFunction::open`]で引数を渡してカーソルを開く
//! 4. [`TableCursor::eof`]・[`TableCursor::column`]・[`TableCursor::advance`]で行を読む
//!
//! | 関数 | 列 |
//! |------|----|
//! | `xl_rows` | `row_number, row, workbook HIDDEN, sheet HIDDEN` |
//! | `xl_cells` | `row, column, value, workbook HIDDEN, range HIDDEN, sheet HIDDEN` |
//! | `xl_sheets` | `name, visible, workbook HIDDEN` |
//!
//! スカラー関数`xl_at(row, column)`と`xl_version()`も提供します。

use std::collections::VecDeque;
use std::sync::Arc;

use log::debug;

use crate::api::SheetSelector;
use crate::cursor::{CursorOptions, SheetCursor};
use crate::error::{PlanError, XlError};
use crate::parser::Workbook;
use crate::reference::{column_name_to_index, parse_range_reference};
use crate::types::{Cell, Row, SheetDescriptor};

/// テーブル関数の名前
pub const ROWS_FUNCTION: &str = "xl_rows";
/// テーブル関数の名前
pub const CELLS_FUNCTION: &str = "xl_cells";
/// テーブル関数の名前
pub const SHEETS_FUNCTION: &str = "xl_sheets";

/// 仮想テーブルの値
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// NULL
    Null,
    /// 整数（論理値は0/1）
    Integer(i64),
    /// 浮動小数点数（数値、日付のシリアル値）
    Real(f64),
    /// 文字列（エラー値は`#DIV/0!`などの文字列）
    Text(String),
    /// バイナリ（ワークブックのバイト列）
    Blob(Arc<[u8]>),
    /// 行（`xl_rows`の`row`列、`xl_at`の第1引数）
    Row(Row),
}

impl From<&Cell> for SqlValue {
    fn from(cell: &Cell) -> Self {
        match cell {
            Cell::Empty => SqlValue::Null,
            Cell::Number(n) => SqlValue::Real(*n),
            Cell::Boolean(b) => SqlValue::Integer(i64::from(*b)),
            Cell::Text(text) => SqlValue::Text(text.to_string()),
            Cell::Date { serial, .. } => SqlValue::Real(*serial),
            Cell::Error(e) => SqlValue::Text(e.to_string()),
        }
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        SqlValue::Text(value.to_string())
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        SqlValue::Integer(value)
    }
}

impl From<Vec<u8>> for SqlValue {
    fn from(value: Vec<u8>) -> Self {
        SqlValue::Blob(Arc::from(value))
    }
}

/// 列定義
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnDef {
    /// 列名
    pub name: &'static str,
    /// 隠し列（関数の引数）か
    pub hidden: bool,
    /// 引数として必須か（隠し列のみ）
    pub required: bool,
}

impl ColumnDef {
    const fn visible(name: &'static str) -> Self {
        Self {
            name,
            hidden: false,
            required: false,
        }
    }

    const fn argument(name: &'static str, required: bool) -> Self {
        Self {
            name,
            hidden: true,
            required,
        }
    }
}

/// 制約の演算子
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintOp {
    /// `=`
    Eq,
    /// その他の演算子
    Other,
}

/// クエリの制約（`WHERE`句、または関数の引数）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Constraint {
    /// 列インデックス
    pub column: usize,
    /// 演算子
    pub op: ConstraintOp,
    /// 使用可能か
    pub usable: bool,
}

/// 実行計画
#[derive(Debug, Clone, PartialEq)]
pub struct IndexPlan {
    /// 渡された隠し列のビットマスク（隠し列の順序）
    pub idx_num: i32,
    /// 制約ごとの引数位置（1始まり、引数にしない制約は`None`）
    pub argv_index: Vec<Option<u32>>,
    /// 見積もりコスト
    pub estimated_cost: f64,
    /// 見積もり行数
    pub estimated_rows: i64,
}

/// カーソルに渡される引数（隠し列名 -> 値）
#[derive(Debug, Clone, Default)]
pub struct Arguments {
    values: Vec<(&'static str, SqlValue)>,
}

impl Arguments {
    /// 実行計画のビットマスクと引数の値を隠し列に対応付ける
    pub fn bind(
        schema: &[ColumnDef],
        idx_num: i32,
        values: &[SqlValue],
    ) -> Result<Self, XlError> {
        let mut values = values.iter();
        let mut bound = Vec::new();
        for (ordinal, column) in schema.iter().filter(|c| c.hidden).enumerate() {
            if idx_num & (1 << ordinal) == 0 {
                continue;
            }
            let value = values.next().ok_or_else(|| {
                XlError::Config(format!("missing value for argument '{}'", column.name))
            })?;
            bound.push((column.name, value.clone()));
        }
        Ok(Self { values: bound })
    }

    /// 名前で引数を生成（テストや直接呼び出し用）
    pub fn new<I>(values: I) -> Self
    where
        I: IntoIterator<Item = (&'static str, SqlValue)>,
    {
        Self {
            values: values.into_iter().collect(),
        }
    }

    /// 引数を取得
    pub fn get(&self, name: &str) -> Option<&SqlValue> {
        self.values
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v)
    }

    /// `workbook`引数からワークブックを開く
    fn workbook(&self) -> Result<Workbook, XlError> {
        match self.get("workbook") {
            Some(SqlValue::Blob(bytes)) => Workbook::from_bytes(Arc::clone(bytes)),
            Some(other) => Err(XlError::Config(format!(
                "workbook argument must be a blob, got {}",
                type_name(other)
            ))),
            None => Err(XlError::Config("missing workbook argument".to_string())),
        }
    }

    /// `sheet`引数（省略時は最初のシート）
    fn sheet(&self) -> Result<SheetSelector, XlError> {
        match self.get("sheet") {
            None | Some(SqlValue::Null) => Ok(SheetSelector::Index(0)),
            Some(SqlValue::Text(name)) => Ok(SheetSelector::Name(name.clone())),
            Some(SqlValue::Integer(index)) => usize::try_from(*index)
                .map(SheetSelector::Index)
                .map_err(|_| XlError::NotFound(format!("#{}", index))),
            Some(other) => Err(XlError::Config(format!(
                "sheet argument must be a name or an index, got {}",
                type_name(other)
            ))),
        }
    }
}

fn type_name(value: &SqlValue) -> &'static str {
    match value {
        SqlValue::Null => "null",
        SqlValue::Integer(_) => "integer",
        SqlValue::Real(_) => "real",
        SqlValue::Text(_) => "text",
        SqlValue::Blob(_) => "blob",
        SqlValue::Row(_) => "row",
    }
}

/// テーブル値関数
pub trait TableFunction {
    /// カーソルの型
    type Cursor: TableCursor;

    /// 列定義（表示列、隠し列の順）
    fn schema(&self) -> &'static [ColumnDef];

    /// 引数を渡してカーソルを開き、最初の行に位置付ける
    fn open(&self, args: &Arguments) -> Result<Self::Cursor, XlError>;

    /// テーブル宣言（`CREATE TABLE x(...)`）
    fn create_sql(&self) -> String {
        let columns: Vec<String> = self
            .schema()
            .iter()
            .map(|c| {
                if c.hidden {
                    format!("{} hidden", c.name)
                } else {
                    c.name.to_string()
                }
            })
            .collect();
        format!("CREATE TABLE x({})", columns.join(", "))
    }

    /// 制約から実行計画を立てる
    ///
    /// 隠し列への使用可能な等価制約を引数として受け取ります。
    /// 必須の引数がない場合、または隠し列に等価以外の制約がある場合はエラーです。
    fn best_index(&self, constraints: &[Constraint]) -> Result<IndexPlan, PlanError> {
        let mut idx_num = 0i32;
        let mut argv_index = vec![None; constraints.len()];
        let mut next_argv = 1u32;
        let hidden = self.schema().iter().enumerate().filter(|(_, c)| c.hidden);
        for (ordinal, (position, column)) in hidden.enumerate() {
            let mut found = false;
            for (i, constraint) in constraints.iter().enumerate() {
                if constraint.column != position {
                    continue;
                }
                if !constraint.usable || constraint.op != ConstraintOp::Eq {
                    return Err(PlanError::UnusableConstraint(column.name));
                }
                if !found {
                    argv_index[i] = Some(next_argv);
                    next_argv += 1;
                    idx_num |= 1 << ordinal;
                    found = true;
                }
            }
            if column.required && !found {
                return Err(PlanError::MissingArgument(column.name));
            }
        }

        Ok(IndexPlan {
            idx_num,
            argv_index,
            estimated_cost: 100_000.0,
            estimated_rows: 100_000,
        })
    }
}

/// テーブル値関数のカーソル
pub trait TableCursor {
    /// 行を読み終えたか
    fn eof(&self) -> bool;

    /// 次の行に進む
    fn advance(&mut self) -> Result<(), XlError>;

    /// 現在の行の列の値（隠し列は`Null`）
    fn column(&self, index: usize) -> SqlValue;

    /// 現在の行のID
    fn rowid(&self) -> i64;
}

static ROWS_SCHEMA: [ColumnDef; 4] = [
    ColumnDef::visible("row_number"),
    ColumnDef::visible("row"),
    ColumnDef::argument("workbook", true),
    ColumnDef::argument("sheet", false),
];

/// `xl_rows`: シートの1行を1レコードとして返す
///
/// `row_number`は1始まりの行番号、`row`は[`xl_at`]で列を取り出せる行の値です。
#[derive(Debug, Clone, Default)]
pub struct RowsTable {
    columns: Option<Vec<u32>>,
}

impl RowsTable {
    /// すべての列を読み込むテーブル
    pub fn new() -> Self {
        Self::default()
    }

    /// クエリが使用する列だけを読み込む（列のプッシュダウン）
    pub fn plan<I: IntoIterator<Item = u32>>(mut self, used_columns: I) -> Self {
        self.columns = Some(used_columns.into_iter().collect());
        self
    }

    /// `row`列に対するオーバーロード関数（`row ->> column`は`xl_at`）
    pub fn find_function(&self, name: &str, argc: usize) -> Option<ScalarFunction> {
        (name == "->>" && argc == 2).then_some(xl_at as ScalarFunction)
    }
}

impl TableFunction for RowsTable {
    type Cursor = RowsCursor;

    fn schema(&self) -> &'static [ColumnDef] {
        &ROWS_SCHEMA
    }

    fn open(&self, args: &Arguments) -> Result<RowsCursor, XlError> {
        let workbook = args.workbook()?;
        let cursor = workbook.open_sheet_with(
            &args.sheet()?,
            CursorOptions {
                columns: self.columns.clone(),
                ..CursorOptions::default()
            },
        )?;
        let mut rows = RowsCursor {
            cursor,
            current: None,
            rowid: -1,
        };
        rows.advance()?;
        Ok(rows)
    }
}

/// `xl_rows`のカーソル
#[derive(Debug)]
pub struct RowsCursor {
    cursor: SheetCursor,
    current: Option<Row>,
    rowid: i64,
}

impl TableCursor for RowsCursor {
    fn eof(&self) -> bool {
        self.current.is_none()
    }

    fn advance(&mut self) -> Result<(), XlError> {
        self.current = self.cursor.next_row()?;
        self.rowid += 1;
        Ok(())
    }

    fn column(&self, index: usize) -> SqlValue {
        let Some(row) = &self.current else {
            return SqlValue::Null;
        };
        match index {
            0 => SqlValue::Integer(i64::from(row.index()) + 1),
            1 => SqlValue::Row(row.clone()),
            _ => SqlValue::Null,
        }
    }

    fn rowid(&self) -> i64 {
        self.rowid
    }
}

static CELLS_SCHEMA: [ColumnDef; 6] = [
    ColumnDef::visible("row"),
    ColumnDef::visible("column"),
    ColumnDef::visible("value"),
    ColumnDef::argument("workbook", true),
    ColumnDef::argument("range", true),
    ColumnDef::argument("sheet", false),
];

/// `xl_cells`: A1形式の範囲内の空でないセルを1レコードとして返す
///
/// `row`は1始まりの行番号、`column`は0始まりの列インデックスです。
#[derive(Debug, Clone, Copy, Default)]
pub struct CellsTable;

impl TableFunction for CellsTable {
    type Cursor = CellsCursor;

    fn schema(&self) -> &'static [ColumnDef] {
        &CELLS_SCHEMA
    }

    fn open(&self, args: &Arguments) -> Result<CellsCursor, XlError> {
        let range = match args.get("range") {
            Some(SqlValue::Text(range)) => parse_range_reference(range)?,
            _ => return Err(XlError::Config("range argument must be text".to_string())),
        };
        let workbook = args.workbook()?;
        let cursor = workbook.open_sheet_with(
            &args.sheet()?,
            CursorOptions {
                range: Some(range),
                ..CursorOptions::default()
            },
        )?;
        debug!("{}: scanning {}", CELLS_FUNCTION, range);

        let mut cells = CellsCursor {
            cursor,
            buffered: VecDeque::new(),
            current: None,
            rowid: -1,
        };
        cells.advance()?;
        Ok(cells)
    }
}

/// `xl_cells`のカーソル
#[derive(Debug)]
pub struct CellsCursor {
    cursor: SheetCursor,
    buffered: VecDeque<(u32, u32, Cell)>,
    current: Option<(u32, u32, Cell)>,
    rowid: i64,
}

impl TableCursor for CellsCursor {
    fn eof(&self) -> bool {
        self.current.is_none()
    }

    fn advance(&mut self) -> Result<(), XlError> {
        while self.buffered.is_empty() {
            let Some(row) = self.cursor.next_row()? else {
                break;
            };
            let index = row.index();
            let columns: Vec<u32> = row.iter().map(|(column, _)| column).collect();
            self.buffered.extend(
                columns
                    .into_iter()
                    .zip(row.into_cells())
                    .filter(|(_, cell)| !cell.is_empty())
                    .map(|(column, cell)| (index, column, cell)),
            );
        }
        self.current = self.buffered.pop_front();
        self.rowid += 1;
        Ok(())
    }

    fn column(&self, index: usize) -> SqlValue {
        let Some((row, column, cell)) = &self.current else {
            return SqlValue::Null;
        };
        match index {
            0 => SqlValue::Integer(i64::from(*row) + 1),
            1 => SqlValue::Integer(i64::from(*column)),
            2 => SqlValue::from(cell),
            _ => SqlValue::Null,
        }
    }

    fn rowid(&self) -> i64 {
        self.rowid
    }
}

static SHEETS_SCHEMA: [ColumnDef; 3] = [
    ColumnDef::visible("name"),
    ColumnDef::visible("visible"),
    ColumnDef::argument("workbook", true),
];

/// `xl_sheets`: ワークブック内のシートを順に返す
#[derive(Debug, Clone, Copy, Default)]
pub struct SheetsTable;

impl TableFunction for SheetsTable {
    type Cursor = SheetsCursor;

    fn schema(&self) -> &'static [ColumnDef] {
        &SHEETS_SCHEMA
    }

    fn open(&self, args: &Arguments) -> Result<SheetsCursor, XlError> {
        let workbook = args.workbook()?;
        Ok(SheetsCursor {
            sheets: workbook.sheets().to_vec(),
            position: 0,
        })
    }
}

/// `xl_sheets`のカーソル
#[derive(Debug)]
pub struct SheetsCursor {
    sheets: Vec<SheetDescriptor>,
    position: usize,
}

impl TableCursor for SheetsCursor {
    fn eof(&self) -> bool {
        self.position >= self.sheets.len()
    }

    fn advance(&mut self) -> Result<(), XlError> {
        self.position += 1;
        Ok(())
    }

    fn column(&self, index: usize) -> SqlValue {
        let Some(sheet) = self.sheets.get(self.position) else {
            return SqlValue::Null;
        };
        match index {
            0 => SqlValue::Text(sheet.name.clone()),
            1 => SqlValue::Integer(i64::from(sheet.is_visible())),
            _ => SqlValue::Null,
        }
    }

    fn rowid(&self) -> i64 {
        self.position as i64
    }
}

/// スカラー関数
pub type ScalarFunction = fn(&[SqlValue]) -> Result<SqlValue, XlError>;

/// 登録するスカラー関数の一覧（名前、引数の数、関数）
pub fn scalar_functions() -> [(&'static str, usize, ScalarFunction); 2] {
    [("xl_at", 2, xl_at), ("xl_version", 0, xl_version)]
}

/// `xl_at(row, column)`: 行から列の値を取り出す
///
/// `column`は0始まりの列インデックス、または列名（`"A"`、`"bc"`）です。
/// 行に存在しない列は`Null`になります。
pub fn xl_at(args: &[SqlValue]) -> Result<SqlValue, XlError> {
    let [row, column] = args else {
        return Err(XlError::Config(format!(
            "xl_at takes 2 arguments, got {}",
            args.len()
        )));
    };
    let SqlValue::Row(row) = row else {
        return Err(XlError::Config(format!(
            "xl_at: first argument must be a row, got {}",
            type_name(row)
        )));
    };
    let column = match column {
        SqlValue::Integer(index) => u32::try_from(*index).map_err(|_| {
            XlError::Config(format!("xl_at: invalid column index {}", index))
        })?,
        SqlValue::Text(letter) => column_name_to_index(letter)?,
        other => {
            return Err(XlError::Config(format!(
                "xl_at: column must be an integer or a column name, got {}",
                type_name(other)
            )))
        }
    };
    Ok(row.get(column).map_or(SqlValue::Null, SqlValue::from))
}

/// `xl_version()`: クレートのバージョン（例: `v0.1.0`）
pub fn xl_version(_args: &[SqlValue]) -> Result<SqlValue, XlError> {
    Ok(SqlValue::Text(format!("v{}", env!("CARGO_PKG_VERSION"))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CellError, ErrorCode, Text};
    use std::io::Write;
    use zip::write::FileOptions;
    use zip::ZipWriter;

    const SHEET: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">
  <sheetData>
    <row r="1"><c r="A1" t="inlineStr"><is><t>Name</t></is></c><c r="B1" t="inlineStr"><is><t>Age</t></is></c></row>
    <row r="2"><c r="A2" t="inlineStr"><is><t>Alice</t></is></c><c r="B2"><v>30</v></c></row>
    <row r="4"><c r="A4" t="inlineStr"><is><t>Bob</t></is></c><c r="C4" t="b"><v>1</v></c></row>
  </sheetData>
</worksheet>"#;

    fn workbook_bytes() -> Vec<u8> {
        let workbook = r#"<?xml version="1.0" encoding="UTF-8"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">
  <sheets>
    <sheet name="People" sheetId="1" r:id="rId1"/>
    <sheet name="Hidden" sheetId="2" state="hidden" r:id="rId2"/>
  </sheets>
</workbook>"#;
        let rels = r#"<?xml version="1.0" encoding="UTF-8"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
  <Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/>
  <Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet2.xml"/>
</Relationships>"#;
        let empty = r#"<worksheet><sheetData/></worksheet>"#;

        let mut zip = ZipWriter::new(std::io::Cursor::new(Vec::new()));
        let options = FileOptions::default();
        for (name, content) in [
            ("xl/workbook.xml", workbook),
            ("xl/_rels/workbook.xml.rels", rels),
            ("xl/worksheets/sheet1.xml", SHEET),
            ("xl/worksheets/sheet2.xml", empty),
        ] {
            zip.start_file(name, options).unwrap();
            zip.write_all(content.as_bytes()).unwrap();
        }
        zip.finish().unwrap().into_inner()
    }

    fn workbook_arg() -> (&'static str, SqlValue) {
        ("workbook", SqlValue::from(workbook_bytes()))
    }

    fn collect<C: TableCursor>(mut cursor: C, columns: usize) -> Vec<Vec<SqlValue>> {
        let mut rows = Vec::new();
        while !cursor.eof() {
            rows.push((0..columns).map(|i| cursor.column(i)).collect());
            cursor.advance().unwrap();
        }
        rows
    }

    #[test]
    fn test_create_sql() {
        assert_eq!(
            RowsTable::new().create_sql(),
            "CREATE TABLE x(row_number, row, workbook hidden, sheet hidden)"
        );
        assert_eq!(
            CellsTable.create_sql(),
            "CREATE TABLE x(row, column, value, workbook hidden, range hidden, sheet hidden)"
        );
        assert_eq!(
            SheetsTable.create_sql(),
            "CREATE TABLE x(name, visible, workbook hidden)"
        );
    }

    #[test]
    fn test_best_index() {
        let constraints = [
            Constraint {
                column: 4,
                op: ConstraintOp::Eq,
                usable: true,
            },
            Constraint {
                column: 0,
                op: ConstraintOp::Other,
                usable: true,
            },
            Constraint {
                column: 3,
                op: ConstraintOp::Eq,
                usable: true,
            },
        ];
        let plan = CellsTable.best_index(&constraints).unwrap();
        assert_eq!(plan.idx_num, 0b011);
        assert_eq!(plan.argv_index, vec![Some(2), None, Some(1)]);
    }

    #[test]
    fn test_best_index_errors() {
        assert_eq!(
            RowsTable::new().best_index(&[]),
            Err(PlanError::MissingArgument("workbook"))
        );

        let constraints = [Constraint {
            column: 2,
            op: ConstraintOp::Other,
            usable: true,
        }];
        assert_eq!(
            SheetsTable.best_index(&constraints),
            Err(PlanError::UnusableConstraint("workbook"))
        );

        let constraints = [Constraint {
            column: 3,
            op: ConstraintOp::Eq,
            usable: true,
        }];
        assert_eq!(
            CellsTable.best_index(&constraints),
            Err(PlanError::MissingArgument("range"))
        );
    }

    #[test]
    fn test_arguments_bind() {
        let values = [SqlValue::from("A1:B2"), SqlValue::from("People")];
        let args = Arguments::bind(&CELLS_SCHEMA, 0b110, &values).unwrap();
        assert!(args.get("workbook").is_none());
        assert_eq!(args.get("range"), Some(&SqlValue::from("A1:B2")));
        assert_eq!(args.get("sheet"), Some(&SqlValue::from("People")));

        assert!(Arguments::bind(&CELLS_SCHEMA, 0b111, &values).is_err());
    }

    #[test]
    fn test_rows_table() {
        let cursor = RowsTable::new()
            .open(&Arguments::new([workbook_arg()]))
            .unwrap();
        let rows = collect(cursor, 2);

        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0][0], SqlValue::Integer(1));
        assert_eq!(rows[2][0], SqlValue::Integer(4));

        let row = rows[1][1].clone();
        assert_eq!(
            xl_at(&[row.clone(), SqlValue::Integer(0)]).unwrap(),
            SqlValue::from("Alice")
        );
        assert_eq!(
            xl_at(&[row.clone(), SqlValue::from("b")]).unwrap(),
            SqlValue::Real(30.0)
        );
        assert_eq!(xl_at(&[row, SqlValue::Integer(9)]).unwrap(), SqlValue::Null);
    }

    #[test]
    fn test_rows_table_plan() {
        let mut cursor = RowsTable::new()
            .plan([0])
            .open(&Arguments::new([workbook_arg()]))
            .unwrap();
        cursor.advance().unwrap();

        let row = cursor.column(1);
        assert_eq!(
            xl_at(&[row.clone(), SqlValue::from("A")]).unwrap(),
            SqlValue::from("Alice")
        );
        assert_eq!(xl_at(&[row, SqlValue::from("B")]).unwrap(), SqlValue::Null);
        assert_eq!(cursor.cursor.decoded_cells(), 2);
    }

    #[test]
    fn test_rows_table_sheet_argument() {
        let cursor = RowsTable::new()
            .open(&Arguments::new([
                workbook_arg(),
                ("sheet", SqlValue::from("Hidden")),
            ]))
            .unwrap();
        assert!(cursor.eof());

        let result = RowsTable::new().open(&Arguments::new([
            workbook_arg(),
            ("sheet", SqlValue::from("Missing")),
        ]));
        assert!(matches!(result, Err(XlError::NotFound(_))));
    }

    #[test]
    fn test_rows_table_find_function() {
        let table = RowsTable::new();
        assert!(table.find_function("->>", 2).is_some());
        assert!(table.find_function("->", 2).is_none());
    }

    #[test]
    fn test_cells_table() {
        let cursor = CellsTable
            .open(&Arguments::new([
                workbook_arg(),
                ("range", SqlValue::from("A2:C4")),
            ]))
            .unwrap();
        let cells = collect(cursor, 3);

        assert_eq!(
            cells,
            vec![
                vec![
                    SqlValue::Integer(2),
                    SqlValue::Integer(0),
                    SqlValue::from("Alice")
                ],
                vec![
                    SqlValue::Integer(2),
                    SqlValue::Integer(1),
                    SqlValue::Real(30.0)
                ],
                vec![
                    SqlValue::Integer(4),
                    SqlValue::Integer(0),
                    SqlValue::from("Bob")
                ],
                vec![
                    SqlValue::Integer(4),
                    SqlValue::Integer(2),
                    SqlValue::Integer(1)
                ],
            ]
        );
    }

    #[test]
    fn test_cells_table_invalid_range() {
        let result = CellsTable.open(&Arguments::new([
            workbook_arg(),
            ("range", SqlValue::from("B5:A1:C")),
        ]));
        assert!(matches!(result, Err(XlError::Reference(_))));

        let result = CellsTable.open(&Arguments::new([workbook_arg()]));
        assert!(matches!(result, Err(XlError::Config(_))));
    }

    #[test]
    fn test_sheets_table() {
        let cursor = SheetsTable
            .open(&Arguments::new([workbook_arg()]))
            .unwrap();
        let sheets = collect(cursor, 2);
        assert_eq!(
            sheets,
            vec![
                vec![SqlValue::from("People"), SqlValue::Integer(1)],
                vec![SqlValue::from("Hidden"), SqlValue::Integer(0)],
            ]
        );
    }

    #[test]
    fn test_workbook_argument_errors() {
        let result = SheetsTable.open(&Arguments::new([("workbook", SqlValue::Integer(1))]));
        assert!(matches!(result, Err(XlError::Config(_))));

        let result = SheetsTable.open(&Arguments::new([(
            "workbook",
            SqlValue::from(b"not a zip".to_vec()),
        )]));
        assert!(matches!(result, Err(XlError::Format(_))));
    }

    #[test]
    fn test_sql_value_from_cell() {
        assert_eq!(SqlValue::from(&Cell::Empty), SqlValue::Null);
        assert_eq!(SqlValue::from(&Cell::Boolean(false)), SqlValue::Integer(0));
        assert_eq!(
            SqlValue::from(&Cell::Text(Text::Inline("x".to_string()))),
            SqlValue::from("x")
        );
        assert_eq!(
            SqlValue::from(&Cell::Error(CellError::Formula(ErrorCode::NA))),
            SqlValue::from("#N/A")
        );
    }

    #[test]
    fn test_xl_at_errors() {
        assert!(xl_at(&[]).is_err());
        assert!(xl_at(&[SqlValue::Null, SqlValue::Integer(0)]).is_err());

        let row = SqlValue::Row(Row::new(0, vec![Cell::Number(1.0)]));
        assert!(xl_at(&[row.clone(), SqlValue::Integer(-1)]).is_err());
        assert!(matches!(
            xl_at(&[row, SqlValue::from("1A")]),
            Err(XlError::Reference(_))
        ));
    }

    #[test]
    fn test_xl_version() {
        assert_eq!(
            xl_version(&[]).unwrap(),
            SqlValue::Text(format!("v{}", env!("CARGO_PKG_VERSION")))
        );
        let names: Vec<&str> = scalar_functions().iter().map(|(n, _, _)| *n).collect();
        assert_eq!(names, vec!["xl_at", "xl_version"]);
    }
}
