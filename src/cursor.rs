//! Sheet Row Cursor Module
//!
//! シートXML（`xl/worksheets/sheetN.xml`）を1回のパスで前方にのみ読み込み、
//! 1行ずつ[`Row`]を返すカーソル。
//!
//! カーソルがバッファするのは現在の行の生トークンのみです。
//! 射影（列の絞り込み）が指定された場合、射影外の列はストリームを進めるためだけに
//! トークン化され、値のテキストは取り出されず、デコーダーにも渡されません。

use std::io::{BufRead, BufReader};
use std::sync::Arc;

use log::{debug, trace, warn};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::decoder::{CellTypeTag, RawCell};
use crate::error::{StreamError, XlError};
use crate::parser::archive::{EntryReader, EntrySource};
use crate::parser::shared_strings::decode_escapes;
use crate::parser::WorkbookInner;
use crate::reference::{parse_cell_ref_bytes, parse_cell_reference, parse_range_reference};
use crate::types::{Cell, CellCoord, CellError, CellRange, Row, SheetDescriptor, MAX_ROWS};

/// カーソルの状態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    /// 行の読み込み中
    Streaming,
    /// `</sheetData>`に到達した（または範囲の最終行を過ぎた）
    Finished,
    /// 読み込みエラーが発生した（以降、行を返さない）
    Failed,
}

/// カーソルのオプション
///
/// 通常は`ReaderBuilder`から設定します。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CursorOptions {
    /// 読み込む列（0始まり）。`None`の場合はすべての列
    pub columns: Option<Vec<u32>>,
    /// 欠落した行番号を空行で埋めるか
    pub dense: bool,
    /// 読み込む範囲
    pub range: Option<CellRange>,
}

/// シートの行カーソル
///
/// [`Workbook::open_sheet`](crate::Workbook::open_sheet)で作成します。
/// カーソルはワークブックの共有状態へのハンドルと、独立したエントリリーダーを所有するため、
/// 同じワークブックに対して複数のカーソルを同時に使用できます。
///
/// # 使用例
///
/// ```rust,no_run
/// use xlrows::Workbook;
///
/// # fn main() -> Result<(), xlrows::XlError> {
/// let workbook = Workbook::open_path("data.xlsx")?;
/// let mut cursor = workbook.open_sheet("Data")?;
/// while let Some(row) = cursor.next_row()? {
///     println!("row {}: {} cells", row.index() + 1, row.len());
/// }
/// println!("decoded {} cells", cursor.decoded_cells());
/// # Ok(())
/// # }
/// ```
pub struct SheetCursor<R: BufRead = BufReader<EntryReader>> {
    workbook: Arc<WorkbookInner>,
    sheet: SheetDescriptor,
    rows: RowCursor<R>,
    projection: Option<Arc<[u32]>>,
    range: Option<CellRange>,
    row_bounds: (u32, u32),
    dense: bool,
    dense_next: u32,
    pending: Option<Row>,
    raw: Vec<RawCell>,
    decoded: u64,
}

impl SheetCursor {
    /// シートのエントリを開き、`<sheetData>`までのプレフィックスを読み込む
    pub(crate) fn open(
        workbook: Arc<WorkbookInner>,
        sheet: SheetDescriptor,
        options: CursorOptions,
    ) -> Result<Self, XlError> {
        let reader = BufReader::new(workbook.container.open_entry(&sheet.entry)?);
        Self::with_reader(workbook, sheet, reader, options)
    }
}

impl<R: BufRead> SheetCursor<R> {
    pub(crate) fn with_reader(
        workbook: Arc<WorkbookInner>,
        sheet: SheetDescriptor,
        source: R,
        options: CursorOptions,
    ) -> Result<Self, XlError> {
        let rows = RowCursor::new(source).map_err(|e| {
            warn!("sheet '{}': {}", sheet.name, e);
            e
        })?;

        let projection = normalize_projection(options.columns, options.range);
        let row_bounds = options
            .range
            .map(|r| (r.start.row, r.end.row))
            .unwrap_or((0, MAX_ROWS - 1));

        debug!(
            "opened sheet '{}' ({}): dimension {:?}, {} projected columns, dense {}",
            sheet.name,
            sheet.entry,
            rows.dimension(),
            projection
                .as_ref()
                .map(|p| p.len().to_string())
                .unwrap_or_else(|| "all".to_string()),
            options.dense
        );

        Ok(Self {
            workbook,
            sheet,
            rows,
            projection,
            range: options.range,
            row_bounds,
            dense: options.dense,
            dense_next: row_bounds.0,
            pending: None,
            raw: Vec::new(),
            decoded: 0,
        })
    }

    /// 読み込み中のシート
    pub fn sheet(&self) -> &SheetDescriptor {
        &self.sheet
    }

    /// `<dimension ref="...">`で宣言された使用範囲（存在する場合）
    pub fn dimension(&self) -> Option<CellRange> {
        self.rows.dimension()
    }

    /// カーソルの状態
    pub fn state(&self) -> CursorState {
        if self.pending.is_some() {
            CursorState::Streaming
        } else {
            self.rows.state()
        }
    }

    /// 射影された列（射影がない場合は`None`）
    pub fn projection(&self) -> Option<&[u32]> {
        self.projection.as_deref()
    }

    /// これまでにデコーダーに渡したセルの数
    pub fn decoded_cells(&self) -> u64 {
        self.decoded
    }

    /// 射影を変更する（ヘッダー行を読み込んだ後に使用）
    pub(crate) fn set_projection(&mut self, columns: Option<Vec<u32>>) {
        debug_assert!(self.pending.is_none());
        self.projection = normalize_projection(columns, self.range);
    }

    /// 欠落行を空行で埋めるかを変更する（ヘッダー行を読み込んだ後に使用）
    pub(crate) fn set_dense(&mut self, dense: bool) {
        self.dense = dense;
    }

    /// 返す最初の行番号を変更する
    pub(crate) fn set_first_row(&mut self, row: u32) {
        self.row_bounds.0 = row;
        self.dense_next = row;
        if self.pending.as_ref().is_some_and(|p| p.index() < row) {
            self.pending = None;
        }
    }

    /// 次の行を読み込む
    ///
    /// # 戻り値
    ///
    /// * `Ok(Some(Row))` - 次の行
    /// * `Ok(None)` - シートの終端
    /// * `Err(StreamError)` - 読み込みエラー（以降、このカーソルは行を返さない）
    pub fn next_row(&mut self) -> Result<Option<Row>, StreamError> {
        if let Some(pending) = self.pending.take() {
            if self.dense_next < pending.index() {
                let index = self.dense_next;
                self.dense_next += 1;
                self.pending = Some(pending);
                return Ok(Some(self.empty_row(index)));
            }
            self.dense_next = pending.index() + 1;
            return Ok(Some(pending));
        }

        let row = match self.read_row() {
            Ok(Some(row)) => row,
            Ok(None) => return Ok(None),
            Err(e) => {
                warn!("sheet '{}': {}", self.sheet.name, e);
                return Err(e);
            }
        };

        if self.dense {
            if row.index() > self.dense_next {
                let index = self.dense_next;
                self.dense_next += 1;
                self.pending = Some(row);
                return Ok(Some(self.empty_row(index)));
            }
            self.dense_next = self.dense_next.max(row.index() + 1);
        }
        Ok(Some(row))
    }

    /// 次の行を読み込み、デコードする
    fn read_row(&mut self) -> Result<Option<Row>, StreamError> {
        let index = match self.rows.read_row(
            self.projection.as_deref(),
            self.row_bounds,
            &mut self.raw,
        )? {
            Some(index) => index,
            None => return Ok(None),
        };

        let decoder = self.workbook.decoder();
        let decode = |raw: &RawCell| match decoder.decode(raw) {
            Ok(cell) => cell,
            Err(e) => {
                warn!(
                    "sheet '{}': cell {} could not be decoded: {}",
                    self.sheet.name,
                    CellCoord::new(index, raw.col),
                    e
                );
                Cell::Error(CellError::Decode(e))
            }
        };

        let row = match &self.projection {
            None => {
                let width = self.raw.iter().map(|c| c.col as usize + 1).max().unwrap_or(0);
                let mut cells = vec![Cell::Empty; width];
                for raw in &self.raw {
                    cells[raw.col as usize] = decode(raw);
                }
                Row::new(index, cells)
            }
            Some(columns) => {
                let mut cells = vec![Cell::Empty; columns.len()];
                for raw in &self.raw {
                    if let Ok(pos) = columns.binary_search(&raw.col) {
                        cells[pos] = decode(raw);
                    }
                }
                Row::projected(index, cells, Arc::clone(columns))
            }
        };
        self.decoded += self.raw.len() as u64;

        trace!(
            "sheet '{}': row {} ({} cells decoded)",
            self.sheet.name,
            index + 1,
            self.raw.len()
        );
        Ok(Some(row))
    }

    fn empty_row(&self, index: u32) -> Row {
        match &self.projection {
            None => Row::new(index, Vec::new()),
            Some(columns) => {
                Row::projected(index, vec![Cell::Empty; columns.len()], Arc::clone(columns))
            }
        }
    }
}

impl<R: BufRead> Iterator for SheetCursor<R> {
    type Item = Result<Row, StreamError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_row().transpose()
    }
}

impl<R: BufRead> std::iter::FusedIterator for SheetCursor<R> {}

impl<R: BufRead> std::fmt::Debug for SheetCursor<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SheetCursor")
            .field("sheet", &self.sheet.name)
            .field("state", &self.state())
            .field("projection", &self.projection)
            .field("dense", &self.dense)
            .field("decoded", &self.decoded)
            .finish()
    }
}

/// 射影を正規化（昇順・重複なし、範囲の列と交差）
fn normalize_projection(
    columns: Option<Vec<u32>>,
    range: Option<CellRange>,
) -> Option<Arc<[u32]>> {
    let mut columns = match (columns, range) {
        (Some(columns), _) => columns,
        (None, Some(range)) => (range.start.col..=range.end.col).collect(),
        (None, None) => return None,
    };
    if let Some(range) = range {
        columns.retain(|c| (range.start.col..=range.end.col).contains(c));
    }
    columns.sort_unstable();
    columns.dedup();
    Some(Arc::from(columns))
}

/// シートXMLのトークナイザー
///
/// `<sheetData>`内の`<row>`を1つずつ生セルトークンに分解します。
pub(crate) struct RowCursor<R: BufRead> {
    reader: Reader<R>,
    buf: Vec<u8>,
    state: CursorState,
    /// `r`属性のない行に割り当てる行番号
    next_index: u32,
    dimension: Option<CellRange>,
}

/// `read_row`のループ内で、イベントのバッファ借用を終えてから行う処理
enum Step {
    Row { index: u32, empty: bool },
    End,
    Skip,
}

impl<R: BufRead> RowCursor<R> {
    /// `<sheetData>`までのプレフィックスを読み込む
    ///
    /// `<dimension ref="...">`があれば記録します。
    pub(crate) fn new(source: R) -> Result<Self, StreamError> {
        let mut reader = Reader::from_reader(source);
        // <t xml:space="preserve">の空白を保持するため、トリムしない
        reader.trim_text(false);

        let mut cursor = Self {
            reader,
            buf: Vec::new(),
            state: CursorState::Streaming,
            next_index: 0,
            dimension: None,
        };

        let mut depth = 0usize;
        let mut saw_root = false;
        loop {
            match cursor.reader.read_event_into(&mut cursor.buf) {
                Ok(Event::Start(e)) => {
                    if e.local_name().as_ref() == b"sheetData" {
                        break;
                    }
                    depth += 1;
                    saw_root = true;
                }
                Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                    b"sheetData" => {
                        cursor.state = CursorState::Finished;
                        break;
                    }
                    b"dimension" => cursor.dimension = read_dimension(&e),
                    _ => saw_root = true,
                },
                Ok(Event::End(_)) => depth = depth.saturating_sub(1),
                // ルート要素が閉じていれば<sheetData>のないシート（空）
                Ok(Event::Eof) if saw_root && depth == 0 => {
                    cursor.state = CursorState::Finished;
                    break;
                }
                Ok(Event::Eof) => return Err(StreamError::Truncated { row: None }),
                Err(e) => return Err(stream_error(e, None)),
                _ => {}
            }
            cursor.buf.clear();
        }
        cursor.buf.clear();

        Ok(cursor)
    }

    pub(crate) fn dimension(&self) -> Option<CellRange> {
        self.dimension
    }

    pub(crate) fn state(&self) -> CursorState {
        self.state
    }

    /// 次の行の生セルトークンを`cells`に読み込む
    ///
    /// # 引数
    ///
    /// * `projection` - 取り出す列（昇順）。`None`の場合はすべての列
    /// * `bounds` - 返す行番号の範囲（両端を含む）。範囲より前の行は読み飛ばし、
    ///   範囲より後の行に到達した時点で終了します
    /// * `cells` - 行のセルを格納するバッファ（呼び出しごとにクリア）
    ///
    /// # 戻り値
    ///
    /// * `Ok(Some(index))` - 読み込んだ行の行番号（0始まり）
    /// * `Ok(None)` - シートの終端
    /// * `Err(StreamError)` - 読み込みエラー（カーソルは`Failed`になる）
    pub(crate) fn read_row(
        &mut self,
        projection: Option<&[u32]>,
        bounds: (u32, u32),
        cells: &mut Vec<RawCell>,
    ) -> Result<Option<u32>, StreamError> {
        if self.state != CursorState::Streaming {
            return Ok(None);
        }
        match self.read_row_inner(projection, bounds, cells) {
            Ok(Some(index)) => Ok(Some(index)),
            Ok(None) => {
                self.state = CursorState::Finished;
                Ok(None)
            }
            Err(e) => {
                self.state = CursorState::Failed;
                cells.clear();
                Err(e)
            }
        }
    }

    fn read_row_inner(
        &mut self,
        projection: Option<&[u32]>,
        bounds: (u32, u32),
        cells: &mut Vec<RawCell>,
    ) -> Result<Option<u32>, StreamError> {
        loop {
            cells.clear();
            self.buf.clear();

            let step = match self.reader.read_event_into(&mut self.buf) {
                Ok(Event::Start(e)) if e.local_name().as_ref() == b"row" => Step::Row {
                    index: read_row_index(&e, self.next_index)?,
                    empty: false,
                },
                Ok(Event::Empty(e)) if e.local_name().as_ref() == b"row" => Step::Row {
                    index: read_row_index(&e, self.next_index)?,
                    empty: true,
                },
                Ok(Event::End(e)) if e.local_name().as_ref() == b"sheetData" => Step::End,
                Ok(Event::Eof) => {
                    return Err(StreamError::Truncated {
                        row: self.next_index.checked_sub(1),
                    })
                }
                Err(e) => return Err(stream_error(e, self.next_index.checked_sub(1))),
                Ok(_) => Step::Skip,
            };
            self.buf.clear();

            match step {
                Step::End => return Ok(None),
                Step::Skip => continue,
                Step::Row { index, empty } => {
                    self.next_index = index.saturating_add(1);
                    if index > bounds.1 {
                        return Ok(None);
                    }
                    let skipped = index < bounds.0;
                    if !empty {
                        // 範囲より前の行はどの列も取り出さない
                        let projection = if skipped { Some(&[][..]) } else { projection };
                        self.read_cells(index, projection, cells)?;
                    }
                    if !skipped {
                        return Ok(Some(index));
                    }
                }
            }
        }
    }

    /// `<row>`の内側を`</row>`まで読み込む
    fn read_cells(
        &mut self,
        row: u32,
        projection: Option<&[u32]>,
        cells: &mut Vec<RawCell>,
    ) -> Result<(), StreamError> {
        let included = |col: u32| projection.map_or(true, |p| p.binary_search(&col).is_ok());

        let mut next_col = 0u32;
        let mut current: Option<RawCell> = None;
        let mut capture = Capture::None;
        let mut in_inline = false;
        let mut phonetic_depth = 0usize;

        loop {
            match self.reader.read_event_into(&mut self.buf) {
                Ok(Event::Start(e)) => match e.local_name().as_ref() {
                    b"c" => {
                        let cell = read_cell_attrs(&e, next_col, row)?;
                        next_col = cell.col.saturating_add(1);
                        current = included(cell.col).then_some(cell);
                    }
                    b"v" if current.is_some() => capture = Capture::Value,
                    b"is" => {
                        if let Some(cell) = current.as_mut() {
                            in_inline = true;
                            cell.inline.get_or_insert_with(String::new);
                        }
                    }
                    b"rPh" if in_inline => phonetic_depth += 1,
                    b"t" if in_inline && phonetic_depth == 0 => capture = Capture::Inline,
                    _ => {}
                },
                Ok(Event::Empty(e)) => {
                    if e.local_name().as_ref() == b"c" {
                        let cell = read_cell_attrs(&e, next_col, row)?;
                        next_col = cell.col.saturating_add(1);
                        if included(cell.col) {
                            cells.push(cell);
                        }
                    }
                }
                Ok(Event::Text(e)) => {
                    if let Some(cell) = current.as_mut() {
                        if capture != Capture::None {
                            let text = e.unescape().map_err(|err| malformed(row, err))?;
                            capture.target(cell).push_str(&text);
                        }
                    }
                }
                Ok(Event::CData(e)) => {
                    if let Some(cell) = current.as_mut() {
                        if capture != Capture::None {
                            let text = std::str::from_utf8(&e).map_err(|err| malformed(row, err))?;
                            capture.target(cell).push_str(text);
                        }
                    }
                }
                Ok(Event::End(e)) => match e.local_name().as_ref() {
                    b"v" | b"t" => capture = Capture::None,
                    b"rPh" => phonetic_depth = phonetic_depth.saturating_sub(1),
                    b"is" => in_inline = false,
                    b"c" => {
                        if let Some(mut cell) = current.take() {
                            unescape_strings(&mut cell);
                            cells.push(cell);
                        }
                        capture = Capture::None;
                        in_inline = false;
                        phonetic_depth = 0;
                    }
                    b"row" => return Ok(()),
                    _ => {}
                },
                Ok(Event::Eof) => return Err(StreamError::Truncated { row: Some(row) }),
                Err(e) => return Err(stream_error(e, Some(row))),
                _ => {}
            }
            self.buf.clear();
        }
    }
}

/// 現在取り出しているテキストの種類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Capture {
    None,
    Value,
    Inline,
}

impl Capture {
    fn target(self, cell: &mut RawCell) -> &mut String {
        match self {
            Capture::Inline => cell.inline.get_or_insert_with(String::new),
            _ => cell.value.get_or_insert_with(String::new),
        }
    }
}

/// 文字列セルの`_xHHHH_`エスケープをデコード
fn unescape_strings(cell: &mut RawCell) {
    let targets = match cell.tag {
        CellTypeTag::InlineString => [cell.inline.as_mut(), cell.value.as_mut()],
        CellTypeTag::FormulaString => [cell.value.as_mut(), None],
        _ => return,
    };
    for text in targets.into_iter().flatten() {
        if text.contains("_x") {
            let decoded = decode_escapes(text).into_owned();
            *text = decoded;
        }
    }
}

/// `<row r="5">`の行番号（0始まり）。`r`がない場合は`next_index`
fn read_row_index(e: &BytesStart<'_>, next_index: u32) -> Result<u32, StreamError> {
    for attr in e.attributes() {
        let attr = attr.map_err(|err| malformed(next_index, err))?;
        if attr.key.as_ref() == b"r" {
            let number = std::str::from_utf8(&attr.value)
                .ok()
                .and_then(|v| v.trim().parse::<u32>().ok())
                .filter(|n| (1..=MAX_ROWS).contains(n))
                .ok_or_else(|| StreamError::Malformed {
                    row: Some(next_index),
                    message: format!(
                        "invalid row number '{}'",
                        String::from_utf8_lossy(&attr.value)
                    ),
                })?;
            return Ok(number - 1);
        }
    }
    Ok(next_index)
}

/// `<c r="B2" t="s" s="3">`の属性を読み込む。`r`がない場合は`next_col`
fn read_cell_attrs(e: &BytesStart<'_>, next_col: u32, row: u32) -> Result<RawCell, StreamError> {
    let mut cell = RawCell {
        col: next_col,
        ..RawCell::default()
    };
    for attr in e.attributes() {
        let attr = attr.map_err(|err| malformed(row, err))?;
        match attr.key.as_ref() {
            b"r" => {
                let (_, col) = parse_cell_ref_bytes(&attr.value).ok_or_else(|| {
                    StreamError::Malformed {
                        row: Some(row),
                        message: format!(
                            "invalid cell reference '{}'",
                            String::from_utf8_lossy(&attr.value)
                        ),
                    }
                })?;
                cell.col = col;
            }
            b"t" => cell.tag = CellTypeTag::from_attr(&attr.value),
            b"s" => {
                cell.style = std::str::from_utf8(&attr.value)
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(0)
            }
            _ => {}
        }
    }
    Ok(cell)
}

/// `<dimension ref="A1:C10"/>`
fn read_dimension(e: &BytesStart<'_>) -> Option<CellRange> {
    let attr = e
        .attributes()
        .flatten()
        .find(|attr| attr.key.as_ref() == b"ref")?;
    let value = std::str::from_utf8(&attr.value).ok()?;
    match parse_range_reference(value) {
        Ok(range) => Some(range),
        Err(_) => parse_cell_reference(value)
            .ok()
            .map(|coord| CellRange::new(coord, coord)),
    }
}

fn malformed<E: std::fmt::Display>(row: u32, err: E) -> StreamError {
    StreamError::Malformed {
        row: Some(row),
        message: err.to_string(),
    }
}

/// quick-xmlのエラーをストリームエラーに分類
///
/// 展開エラー（壊れた、または途中で切れた圧縮データ）は`Truncated`として扱います。
fn stream_error(err: quick_xml::Error, row: Option<u32>) -> StreamError {
    use std::io::ErrorKind;

    match err {
        quick_xml::Error::Io(e) => match e.kind() {
            ErrorKind::UnexpectedEof | ErrorKind::InvalidInput | ErrorKind::InvalidData => {
                StreamError::Truncated { row }
            }
            _ => StreamError::Io(e.to_string()),
        },
        quick_xml::Error::UnexpectedEof(_) => StreamError::Truncated { row },
        other => StreamError::Malformed {
            row,
            message: other.to_string(),
        },
    }
}
