//! Rows Module
//!
//! `SheetReader`が返す行・レコードのイテレータ。
//! ヘッダー行の読み込みと、ヘッダー名による列指定の解決を行います。

use std::borrow::Cow;
use std::iter::FusedIterator;
use std::sync::Arc;

use log::debug;
use serde::{Serialize, Serializer};
use serde_json::{Map, Number, Value};

use crate::api::ColumnKey;
use crate::builder::ReadOptions;
use crate::cursor::{CursorOptions, SheetCursor};
use crate::error::XlError;
use crate::parser::Workbook;
use crate::reference::column_name_to_index;
use crate::types::{column_index_to_name, Cell, Row, SheetDescriptor};

static EMPTY_CELL: Cell = Cell::Empty;

/// ヘッダー行
///
/// 空のセルは列名（`"A"`、`"B"`、...）で命名されます。
/// 同じ名前が複数ある場合、名前による参照は最初の列に解決されます。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Header {
    row: u32,
    columns: Vec<u32>,
    names: Vec<String>,
}

impl Header {
    fn from_row(row: &Row) -> Self {
        let (columns, names) = row
            .iter()
            .map(|(column, cell)| {
                let name = cell.to_string();
                if name.trim().is_empty() {
                    (column, column_index_to_name(column))
                } else {
                    (column, name)
                }
            })
            .unzip();
        Self {
            row: row.index(),
            columns,
            names,
        }
    }

    fn empty(row: u32) -> Self {
        Self {
            row,
            columns: Vec::new(),
            names: Vec::new(),
        }
    }

    /// ヘッダー行のインデックス（0始まり）
    pub fn row_index(&self) -> u32 {
        self.row
    }

    /// ヘッダーの列数
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// ヘッダーが空か（ヘッダー行が存在しない場合を含む）
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// ヘッダーの列番号（昇順）
    pub fn columns(&self) -> &[u32] {
        &self.columns
    }

    /// ヘッダー名のイテレータ（列順）
    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.names.iter().map(String::as_str)
    }

    /// (列番号, ヘッダー名) のイテレータ
    pub fn iter(&self) -> impl Iterator<Item = (u32, &str)> + '_ {
        self.columns
            .iter()
            .copied()
            .zip(self.names.iter().map(String::as_str))
    }

    /// ヘッダー名から列番号を取得（同名の場合は最初の列）
    pub fn column_of(&self, name: &str) -> Option<u32> {
        self.iter()
            .find(|(_, header)| *header == name)
            .map(|(column, _)| column)
    }

    /// 列番号からヘッダー名を取得（ヘッダーのない列は列名）
    pub fn name_of(&self, column: u32) -> Cow<'_, str> {
        match self.columns.binary_search(&column) {
            Ok(pos) => Cow::Borrowed(self.names[pos].as_str()),
            Err(_) => Cow::Owned(column_index_to_name(column)),
        }
    }
}

/// 列指定を列番号に解決
fn resolve_columns(
    keys: Option<&[ColumnKey]>,
    header: Option<&Header>,
) -> Result<Option<Vec<u32>>, XlError> {
    let Some(keys) = keys else {
        return Ok(None);
    };
    keys.iter()
        .map(|key| -> Result<u32, XlError> {
            match key {
                ColumnKey::Index(index) => Ok(*index),
                ColumnKey::Letter(letter) => Ok(column_name_to_index(letter)?),
                ColumnKey::Header(name) => header
                    .and_then(|h| h.column_of(name))
                    .ok_or_else(|| XlError::Key(name.clone())),
            }
        })
        .collect::<Result<Vec<_>, _>>()
        .map(Some)
}

/// 行のイテレータ
///
/// 最初のエラーを返した後は`None`を返し続けます。
/// 最初から読み直す場合は、`SheetReader::rows()`で新しいイテレータを作成します。
pub struct Rows {
    cursor: SheetCursor,
    header: Option<Arc<Header>>,
    done: bool,
}

impl Rows {
    pub(crate) fn open(workbook: &Workbook, options: &ReadOptions) -> Result<Self, XlError> {
        let Some(header_row) = options.header_row else {
            let columns = resolve_columns(options.columns.as_deref(), None)?;
            let cursor = workbook.open_sheet_with(
                &options.sheet,
                CursorOptions {
                    columns,
                    dense: options.dense,
                    range: options.range,
                },
            )?;
            return Ok(Self {
                cursor,
                header: None,
                done: false,
            });
        };

        // ヘッダー行は範囲内のすべての列を読み込み、その後で射影を確定する。
        // 空行を補わずに読むため、`header_row`以降で最初に存在する行がヘッダーになる
        let mut cursor = workbook.open_sheet_with(
            &options.sheet,
            CursorOptions {
                columns: None,
                dense: false,
                range: options.range,
            },
        )?;
        cursor.set_first_row(header_row);

        let header = match cursor.next_row()? {
            Some(row) => Header::from_row(&row),
            None => Header::empty(header_row),
        };

        let columns = resolve_columns(options.columns.as_deref(), Some(&header))?;
        cursor.set_projection(columns);
        cursor.set_dense(options.dense);

        let first_row = options
            .range
            .map_or(0, |range| range.start.row)
            .max(header.row_index().saturating_add(1));
        cursor.set_first_row(first_row);

        debug!(
            "sheet '{}': header row {} with {} columns",
            cursor.sheet().name,
            header.row_index() + 1,
            header.len()
        );

        Ok(Self {
            cursor,
            header: Some(Arc::new(header)),
            done: false,
        })
    }

    /// ヘッダー行（ヘッダー行を指定した場合のみ）
    pub fn header(&self) -> Option<&Header> {
        self.header.as_deref()
    }

    /// 読み込み中のシート
    pub fn sheet(&self) -> &SheetDescriptor {
        self.cursor.sheet()
    }

    /// 下位のカーソル
    pub fn cursor(&self) -> &SheetCursor {
        &self.cursor
    }

    /// これまでにデコードしたセルの数（ヘッダー行を含む）
    pub fn decoded_cells(&self) -> u64 {
        self.cursor.decoded_cells()
    }
}

impl Iterator for Rows {
    type Item = Result<Row, XlError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.cursor.next_row() {
            Ok(Some(row)) => Some(Ok(row)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e.into()))
            }
        }
    }
}

impl FusedIterator for Rows {}

impl std::fmt::Debug for Rows {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rows")
            .field("cursor", &self.cursor)
            .field("header", &self.header)
            .field("done", &self.done)
            .finish()
    }
}

/// ヘッダー名で参照できる行
#[derive(Debug, Clone)]
pub struct Record {
    header: Arc<Header>,
    row: Row,
}

impl Record {
    /// 行インデックス（0始まり）
    pub fn index(&self) -> u32 {
        self.row.index()
    }

    /// ヘッダー
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// 元の行
    pub fn row(&self) -> &Row {
        &self.row
    }

    /// 元の行を取り出す
    pub fn into_row(self) -> Row {
        self.row
    }

    /// ヘッダー名でセルを取得
    ///
    /// # 戻り値
    ///
    /// * `Ok(&Cell)` - セル（行にセルがない場合は`Cell::Empty`）
    /// * `Err(XlError::Key)` - ヘッダー名が存在しない、または列が読み込み対象外の場合
    ///
    /// # 使用例
    ///
    /// ```rust,no_run
    /// use xlrows::{ReaderBuilder, Workbook};
    ///
    /// # fn main() -> Result<(), xlrows::XlError> {
    /// let workbook = Workbook::open_path("people.xlsx")?;
    /// let reader = ReaderBuilder::new().with_header_row(0).build()?;
    /// for record in reader.records(&workbook)? {
    ///     let record = record?;
    ///     println!("{} is {}", record.get("Name")?, record.get("Age")?);
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub fn get(&self, name: &str) -> Result<&Cell, XlError> {
        let column = self
            .header
            .column_of(name)
            .ok_or_else(|| XlError::Key(name.to_string()))?;
        if let Some(columns) = self.row.columns() {
            if columns.binary_search(&column).is_err() {
                return Err(XlError::Key(name.to_string()));
            }
        }
        Ok(self.row.get(column).unwrap_or(&EMPTY_CELL))
    }

    /// (フィールド名, セル) の一覧
    ///
    /// 射影がある場合は射影された列、ない場合はヘッダーの列と値のある列です。
    pub fn fields(&self) -> Vec<(Cow<'_, str>, &Cell)> {
        let columns: Vec<u32> = match self.row.columns() {
            Some(columns) => columns.to_vec(),
            None => {
                let mut columns = self.header.columns().to_vec();
                columns.extend(
                    self.row
                        .iter()
                        .filter(|(_, cell)| !cell.is_empty())
                        .map(|(column, _)| column),
                );
                columns.sort_unstable();
                columns.dedup();
                columns
            }
        };
        columns
            .into_iter()
            .map(|column| {
                (
                    self.header.name_of(column),
                    self.row.get(column).unwrap_or(&EMPTY_CELL),
                )
            })
            .collect()
    }

    /// JSONオブジェクトに変換（同名のフィールドは最初の列）
    pub fn to_json_value(&self) -> Value {
        let mut map = Map::new();
        for (name, cell) in self.fields() {
            map.entry(name.into_owned())
                .or_insert_with(|| cell_to_json(cell));
        }
        Value::Object(map)
    }

    /// JSON文字列に変換
    pub fn to_json(&self) -> String {
        self.to_json_value().to_string()
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json_value().serialize(serializer)
    }
}

/// セル値をJSON値に変換
///
/// 日付はISO 8601文字列、エラーはエラーコード（`#DIV/0!`など）になります。
fn cell_to_json(cell: &Cell) -> Value {
    match cell {
        Cell::Empty => Value::Null,
        Cell::Number(n) => Number::from_f64(*n).map_or(Value::Null, Value::Number),
        Cell::Boolean(b) => Value::Bool(*b),
        Cell::Text(text) => Value::String(text.to_string()),
        // 日付として表現できないシリアル値は数値のまま出力する
        Cell::Date { serial, .. } if cell.as_datetime().is_none() => {
            Number::from_f64(*serial).map_or(Value::Null, Value::Number)
        }
        Cell::Date { .. } | Cell::Error(_) => Value::String(cell.to_string()),
    }
}

/// レコードのイテレータ
pub struct Records {
    rows: Rows,
    header: Arc<Header>,
}

impl Records {
    pub(crate) fn new(rows: Rows) -> Result<Self, XlError> {
        let header = rows
            .header
            .clone()
            .ok_or_else(|| XlError::Config("Records require a header row".to_string()))?;
        Ok(Self { rows, header })
    }

    /// ヘッダー行
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// これまでにデコードしたセルの数（ヘッダー行を含む）
    pub fn decoded_cells(&self) -> u64 {
        self.rows.decoded_cells()
    }
}

impl Iterator for Records {
    type Item = Result<Record, XlError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.rows.next().map(|row| {
            row.map(|row| Record {
                header: Arc::clone(&self.header),
                row,
            })
        })
    }
}

impl FusedIterator for Records {}

impl std::fmt::Debug for Records {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Records")
            .field("rows", &self.rows)
            .finish()
    }
}
