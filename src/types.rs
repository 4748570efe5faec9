//! Types Module
//!
//! クレート全体で使用する共通データ型を定義するモジュール。

use std::fmt;
use std::sync::Arc;

use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::{Serialize, Serializer};

use crate::error::DecodeError;

/// シートの最大行数（1,048,576行）
pub const MAX_ROWS: u32 = 1_048_576;

/// シートの最大列数（16,384列 = XFD）
pub const MAX_COLUMNS: u32 = 16_384;

/// 日付シリアル値の起算方式
///
/// ワークブック全体の設定（`<workbookPr date1904="1"/>`）であり、
/// ワークブックを開く時点で1回だけ読み込まれます。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum DateEpoch {
    /// 1900年システム（デフォルト）
    ///
    /// Excelの1900年うるう年バグ（1900-02-29が存在する扱い）を含みます。
    #[default]
    E1900,

    /// 1904年システム（Mac版Excel）
    E1904,
}

impl DateEpoch {
    /// シリアル値を日時に変換
    ///
    /// # 戻り値
    ///
    /// * `Some(NaiveDateTime)` - 変換に成功した場合
    /// * `None` - シリアル値が負、または表現可能な範囲外の場合
    ///
    /// # エポックシステム
    ///
    /// - 1900年システム: シリアル値1 = 1900-01-01、シリアル値60 = 1900-02-29（存在しない日）。
    ///   60は1900-02-28として扱い、61以降は1899-12-30起算。
    /// - 1904年システム: シリアル値0 = 1904-01-01
    pub fn to_datetime(self, serial: f64) -> Option<NaiveDateTime> {
        if !serial.is_finite() || serial < 0.0 {
            return None;
        }

        let days = serial.trunc() as i64;
        let (epoch, days) = match self {
            DateEpoch::E1904 => (NaiveDate::from_ymd_opt(1904, 1, 1)?, days),
            DateEpoch::E1900 if days >= 61 => (NaiveDate::from_ymd_opt(1899, 12, 30)?, days),
            DateEpoch::E1900 if days == 60 => (NaiveDate::from_ymd_opt(1900, 2, 28)?, 0),
            DateEpoch::E1900 => (NaiveDate::from_ymd_opt(1899, 12, 31)?, days),
        };

        // `as i64`は範囲外の値を飽和させるため、日数への変換で範囲を検査する
        let date = epoch.checked_add_signed(Duration::try_days(days)?)?;
        // 小数部は1日に対する割合（ミリ秒に丸める）
        let millis = (serial.fract() * 86_400_000.0).round() as i64;
        date.and_hms_opt(0, 0, 0)?
            .checked_add_signed(Duration::milliseconds(millis))
    }

    /// 日時をシリアル値に変換（`to_datetime`の逆変換）
    pub fn to_serial(self, datetime: NaiveDateTime) -> Option<f64> {
        let date = datetime.date();
        let days = match self {
            DateEpoch::E1904 => (date - NaiveDate::from_ymd_opt(1904, 1, 1)?).num_days(),
            DateEpoch::E1900 => {
                let days = (date - NaiveDate::from_ymd_opt(1899, 12, 30)?).num_days();
                // 1900-03-01より前はうるう年バグの分だけ1日ずれる
                if days < 61 {
                    days - 1
                } else {
                    days
                }
            }
        };
        if days < 0 {
            return None;
        }

        let midnight = date.and_hms_opt(0, 0, 0)?;
        let millis = (datetime - midnight).num_milliseconds() as f64;
        Some(days as f64 + millis / 86_400_000.0)
    }
}

/// ワークシートのエラー値（例: `#DIV/0!`）
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorCode {
    /// `#NULL!`
    Null,
    /// `#DIV/0!`
    Div0,
    /// `#VALUE!`
    Value,
    /// `#REF!`
    Ref,
    /// `#NAME?`
    Name,
    /// `#NUM!`
    Num,
    /// `#N/A`
    NA,
    /// `#GETTING_DATA`
    GettingData,
    /// 上記以外のエラー文字列
    Other(String),
}

impl ErrorCode {
    /// エラー文字列からエラーコードを生成
    pub fn parse(code: &str) -> Self {
        match code {
            "#NULL!" => ErrorCode::Null,
            "#DIV/0!" => ErrorCode::Div0,
            "#VALUE!" => ErrorCode::Value,
            "#REF!" => ErrorCode::Ref,
            "#NAME?" => ErrorCode::Name,
            "#NUM!" => ErrorCode::Num,
            "#N/A" => ErrorCode::NA,
            "#GETTING_DATA" => ErrorCode::GettingData,
            other => ErrorCode::Other(other.to_string()),
        }
    }

    /// Excelで表示されるエラー文字列
    pub fn as_str(&self) -> &str {
        match self {
            ErrorCode::Null => "#NULL!",
            ErrorCode::Div0 => "#DIV/0!",
            ErrorCode::Value => "#VALUE!",
            ErrorCode::Ref => "#REF!",
            ErrorCode::Name => "#NAME?",
            ErrorCode::Num => "#NUM!",
            ErrorCode::NA => "#N/A",
            ErrorCode::GettingData => "#GETTING_DATA",
            ErrorCode::Other(s) => s,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// エラーセルの内容
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum CellError {
    /// ファイルに保存されていたワークシートのエラー値
    Formula(ErrorCode),

    /// セルのデコードに失敗した
    Decode(DecodeError),
}

impl fmt::Display for CellError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellError::Formula(code) => write!(f, "{}", code),
            CellError::Decode(e) => write!(f, "{}", e),
        }
    }
}

/// 文字列セルの内容
///
/// 共有文字列を参照するセルは、テーブル内の文字列への`Arc`ハンドルを保持し、
/// セルごとに文字列をコピーしません。
#[derive(Debug, Clone)]
pub enum Text {
    /// セル内に直接保存された文字列（`inlineStr`、`str`）
    Inline(String),

    /// 共有文字列テーブルへの参照
    Shared {
        /// テーブル内のインデックス
        index: u32,
        /// テーブル内の文字列
        value: Arc<str>,
    },
}

impl Text {
    /// 文字列を取得
    pub fn as_str(&self) -> &str {
        match self {
            Text::Inline(s) => s,
            Text::Shared { value, .. } => value,
        }
    }

    /// 共有文字列インデックス（共有文字列の場合のみ）
    pub fn shared_index(&self) -> Option<u32> {
        match self {
            Text::Inline(_) => None,
            Text::Shared { index, .. } => Some(*index),
        }
    }
}

impl PartialEq for Text {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl fmt::Display for Text {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Text {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// デコード済みのセル値
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Cell {
    /// 空セル
    Empty,

    /// 数値（f64）
    Number(f64),

    /// 論理値
    Boolean(bool),

    /// 文字列
    Text(Text),

    /// 日付書式の数値（シリアル値とエポック）
    Date {
        /// シリアル値
        serial: f64,
        /// ワークブックのエポック
        epoch: DateEpoch,
    },

    /// エラー値、またはデコードエラー
    Error(CellError),
}

impl Cell {
    /// 値が空かどうかを判定
    pub fn is_empty(&self) -> bool {
        matches!(self, Cell::Empty)
    }

    /// 文字列として取得（文字列セルの場合のみ）
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Cell::Text(t) => Some(t.as_str()),
            _ => None,
        }
    }

    /// 数値として取得（数値・日付セルの場合）
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Number(n) => Some(*n),
            Cell::Date { serial, .. } => Some(*serial),
            _ => None,
        }
    }

    /// 論理値として取得
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Cell::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// 日付セルを日時に変換
    pub fn as_datetime(&self) -> Option<NaiveDateTime> {
        match self {
            Cell::Date { serial, epoch } => epoch.to_datetime(*serial),
            _ => None,
        }
    }

    /// デコードエラーを取得（デコードに失敗したセルの場合のみ）
    pub fn decode_error(&self) -> Option<&DecodeError> {
        match self {
            Cell::Error(CellError::Decode(e)) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Empty => Ok(()),
            Cell::Number(n) => write!(f, "{}", n),
            Cell::Boolean(b) => write!(f, "{}", if *b { "TRUE" } else { "FALSE" }),
            Cell::Text(t) => write!(f, "{}", t),
            Cell::Date { serial, epoch } => match epoch.to_datetime(*serial) {
                Some(dt) if serial.fract() == 0.0 => write!(f, "{}", dt.format("%Y-%m-%d")),
                Some(dt) => write!(f, "{}", dt.format("%Y-%m-%dT%H:%M:%S")),
                None => write!(f, "{}", serial),
            },
            Cell::Error(e) => write!(f, "{}", e),
        }
    }
}

/// セル座標（0始まり）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct CellCoord {
    /// 行インデックス
    pub row: u32,
    /// 列インデックス
    pub col: u32,
}

impl CellCoord {
    /// 新しい座標を生成
    pub fn new(row: u32, col: u32) -> Self {
        Self { row, col }
    }

    /// A1形式の文字列に変換（例: (0, 0) -> "A1"）
    pub fn to_a1_notation(self) -> String {
        format!("{}{}", column_index_to_name(self.col), self.row + 1)
    }
}

impl fmt::Display for CellCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", column_index_to_name(self.col), self.row + 1)
    }
}

/// 列インデックスを列名に変換（0 -> "A", 25 -> "Z", 26 -> "AA"）
pub fn column_index_to_name(mut col: u32) -> String {
    let mut result = String::new();
    loop {
        let remainder = col % 26;
        result.insert(0, (b'A' + remainder as u8) as char);
        if col < 26 {
            break;
        }
        col = col / 26 - 1;
    }
    result
}

/// セル範囲（両端を含む）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CellRange {
    /// 左上
    pub start: CellCoord,
    /// 右下
    pub end: CellCoord,
}

impl CellRange {
    /// 新しい範囲を生成
    pub fn new(start: CellCoord, end: CellCoord) -> Self {
        Self { start, end }
    }

    /// 指定された座標が範囲内にあるかを判定
    pub fn contains(&self, coord: CellCoord) -> bool {
        coord.row >= self.start.row
            && coord.row <= self.end.row
            && coord.col >= self.start.col
            && coord.col <= self.end.col
    }

    /// 範囲のサイズ（行数 × 列数）を計算
    pub fn size(&self) -> (u32, u32) {
        let rows = self.end.row - self.start.row + 1;
        let cols = self.end.col - self.start.col + 1;
        (rows, cols)
    }
}

impl fmt::Display for CellRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.start, self.end)
    }
}

/// シートの表示状態（`<sheet state="...">`）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum SheetVisibility {
    /// 表示
    #[default]
    Visible,
    /// 非表示（ユーザーが再表示可能）
    Hidden,
    /// 非表示（VBAからのみ再表示可能）
    VeryHidden,
}

impl SheetVisibility {
    pub(crate) fn from_state(state: &str) -> Self {
        match state {
            "hidden" => SheetVisibility::Hidden,
            "veryHidden" => SheetVisibility::VeryHidden,
            _ => SheetVisibility::Visible,
        }
    }
}

/// シートの記述子
///
/// ワークブックを開く時点で確定し、以後変更されません。
/// シートの内容そのものは含まず、行データのエントリ位置のみを保持します。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SheetDescriptor {
    /// シート名
    pub name: String,

    /// シートインデックス（0始まり、ワークブック内の順序）
    pub index: usize,

    /// `sheetId`属性
    pub sheet_id: u32,

    /// 表示状態
    pub visibility: SheetVisibility,

    /// 行データのエントリパス（例: `xl/worksheets/sheet1.xml`）
    pub(crate) entry: String,
}

impl SheetDescriptor {
    /// シートが表示されているか
    pub fn is_visible(&self) -> bool {
        self.visibility == SheetVisibility::Visible
    }

    /// アーカイブ内のエントリパス
    pub fn entry_path(&self) -> &str {
        &self.entry
    }
}

/// 1行分のセル
///
/// 射影（列の絞り込み）がない場合、`cells()[i]`は列`i`のセルです。
/// 射影がある場合、射影された列ごとに1セル（列番号の昇順）を保持します。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Row {
    index: u32,
    cells: Vec<Cell>,
    #[serde(skip)]
    columns: Option<Arc<[u32]>>,
}

impl Row {
    /// 射影なしの行を生成
    pub fn new(index: u32, cells: Vec<Cell>) -> Self {
        Self {
            index,
            cells,
            columns: None,
        }
    }

    /// 射影ありの行を生成（`cells.len() == columns.len()`）
    pub(crate) fn projected(index: u32, cells: Vec<Cell>, columns: Arc<[u32]>) -> Self {
        debug_assert_eq!(cells.len(), columns.len());
        Self {
            index,
            cells,
            columns: Some(columns),
        }
    }

    /// 行インデックス（0始まり、ファイル上で宣言された行番号 - 1）
    pub fn index(&self) -> u32 {
        self.index
    }

    /// セルのスライス
    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    /// セルを取り出す
    pub fn into_cells(self) -> Vec<Cell> {
        self.cells
    }

    /// セル数
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// セルがない行かどうか
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// 射影された列番号（射影がない場合は`None`）
    pub fn columns(&self) -> Option<&[u32]> {
        self.columns.as_deref()
    }

    /// 列番号（0始まり、絶対位置）でセルを取得
    pub fn get(&self, column: u32) -> Option<&Cell> {
        match &self.columns {
            None => self.cells.get(column as usize),
            Some(columns) => columns
                .binary_search(&column)
                .ok()
                .and_then(|pos| self.cells.get(pos)),
        }
    }

    /// (列番号, セル) のイテレータ
    pub fn iter(&self) -> impl Iterator<Item = (u32, &Cell)> + '_ {
        self.cells.iter().enumerate().map(move |(pos, cell)| {
            let column = match &self.columns {
                None => pos as u32,
                Some(columns) => columns[pos],
            };
            (column, cell)
        })
    }
}
