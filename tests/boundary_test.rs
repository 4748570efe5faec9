//! Boundary Tests for xlrows
//!
//! 空のシート、途中で切れたストリーム、シート境界のセルなど、端のケースを検証します。

use std::io::{Cursor, Write};

use chrono::NaiveDate;
use xlrows::{
    Cell, CursorState, DateEpoch, FormatError, ReaderBuilder, SheetSelector, StreamError,
    Workbook, XlError, MAX_COLUMNS, MAX_ROWS,
};
use zip::write::FileOptions;
use zip::ZipWriter;

mod fixtures {
    use super::*;

    /// 1シートのワークブックを梱包
    ///
    /// `workbook_pr`は`<workbookPr>`の属性、`styles`は`xl/styles.xml`の内容
    pub fn single_sheet(workbook_pr: &str, sheet_xml: &str, styles: Option<&str>) -> Vec<u8> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options = FileOptions::default();

        zip.start_file("xl/workbook.xml", options).unwrap();
        write!(
            zip,
            r#"<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><workbookPr {}/><sheets><sheet name="Sheet1" sheetId="1" r:id="rId1"/></sheets></workbook>"#,
            workbook_pr
        )
        .unwrap();

        zip.start_file("xl/_rels/workbook.xml.rels", options).unwrap();
        zip.write_all(
            br#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/></Relationships>"#,
        )
        .unwrap();

        if let Some(styles) = styles {
            zip.start_file("xl/styles.xml", options).unwrap();
            zip.write_all(styles.as_bytes()).unwrap();
        }

        zip.start_file("xl/worksheets/sheet1.xml", options).unwrap();
        zip.write_all(sheet_xml.as_bytes()).unwrap();

        zip.finish().unwrap().into_inner()
    }

    pub fn sheet(rows: &str) -> String {
        format!(
            r#"<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>{}</sheetData></worksheet>"#,
            rows
        )
    }

    pub const DATE_STYLES: &str = r#"<styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><cellXfs count="2"><xf numFmtId="0"/><xf numFmtId="14" applyNumberFormat="1"/></cellXfs></styleSheet>"#;
}

fn open(sheet_xml: &str) -> Workbook {
    Workbook::from_bytes(fixtures::single_sheet("", sheet_xml, None)).unwrap()
}

#[test]
fn test_empty_sheet_data() {
    let workbook = open(r#"<worksheet><sheetData/></worksheet>"#);
    let mut cursor = workbook.open_sheet(0usize).unwrap();
    assert!(cursor.next_row().unwrap().is_none());
    assert_eq!(cursor.state(), CursorState::Finished);
}

#[test]
fn test_sheet_without_sheet_data() {
    let workbook = open(r#"<worksheet><sheetViews/></worksheet>"#);
    assert_eq!(workbook.open_sheet(0usize).unwrap().count(), 0);
}

#[test]
fn test_empty_row_element() {
    let workbook = open(&fixtures::sheet(r#"<row r="1"/>"#));
    let rows: Vec<_> = workbook
        .open_sheet(0usize)
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].index(), 0);
    assert!(rows[0].is_empty());
}

#[test]
fn test_rows_and_cells_without_references() {
    let workbook = open(&fixtures::sheet(
        r#"<row><c><v>1</v></c><c><v>2</v></c></row><row><c t="inlineStr"><is><t>x</t></is></c></row>"#,
    ));
    let rows: Vec<_> = workbook
        .open_sheet(0usize)
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(rows[0].index(), 0);
    assert_eq!(rows[0].cells(), &[Cell::Number(1.0), Cell::Number(2.0)]);
    assert_eq!(rows[1].index(), 1);
    assert_eq!(rows[1].cells()[0].as_str(), Some("x"));
}

#[test]
fn test_truncated_sheet_stream() {
    let xml = r#"<worksheet><sheetData><row r="1"><c r="A1"><v>1</v></c></row>"#;
    let workbook = open(xml);
    let mut cursor = workbook.open_sheet(0usize).unwrap();

    assert_eq!(cursor.next_row().unwrap().unwrap().cells()[0], Cell::Number(1.0));
    assert!(matches!(
        cursor.next_row(),
        Err(StreamError::Truncated { .. })
    ));
    assert_eq!(cursor.state(), CursorState::Failed);
    assert!(cursor.next_row().unwrap().is_none());
}

#[test]
fn test_stream_error_fuses_rows_iterator() {
    let xml = r#"<worksheet><sheetData><row r="1"><c r="A1"><v>1</v></c></row>"#;
    let workbook = open(xml);
    let reader = ReaderBuilder::new().build().unwrap();

    let results: Vec<_> = reader.rows(&workbook).unwrap().collect();
    assert_eq!(results.len(), 2);
    assert!(results[0].is_ok());
    assert!(matches!(results[1], Err(XlError::Stream(_))));
}

#[test]
fn test_truncated_container() {
    let data = fixtures::single_sheet("", &fixtures::sheet(""), None);
    let truncated = data[..data.len() / 2].to_vec();
    assert!(matches!(
        Workbook::from_bytes(truncated),
        Err(XlError::Format(_))
    ));
}

#[test]
fn test_empty_input() {
    assert!(matches!(
        Workbook::from_bytes(Vec::new()),
        Err(XlError::Format(FormatError::NotAContainer))
    ));
    assert!(matches!(
        Workbook::open(Cursor::new(b"Name,Age\nAnn,30\n".to_vec())),
        Err(XlError::Format(FormatError::NotAContainer))
    ));
}

#[test]
fn test_missing_workbook_part() {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    zip.start_file("docProps/app.xml", FileOptions::default())
        .unwrap();
    zip.write_all(b"<Properties/>").unwrap();
    let data = zip.finish().unwrap().into_inner();

    assert!(matches!(
        Workbook::from_bytes(data),
        Err(XlError::Format(FormatError::CorruptIndex(_)))
    ));
}

#[test]
fn test_1904_epoch() {
    let xml = fixtures::sheet(r#"<row r="1"><c r="A1" s="1"><v>0</v></c><c r="B1"><v>0</v></c></row>"#);
    let data = fixtures::single_sheet(r#"date1904="1""#, &xml, Some(fixtures::DATE_STYLES));
    let workbook = Workbook::from_bytes(data).unwrap();
    assert_eq!(workbook.epoch(), DateEpoch::E1904);

    let row = workbook.open_sheet(0usize).unwrap().next_row().unwrap().unwrap();
    assert_eq!(
        row.cells()[0].as_datetime().map(|dt| dt.date()),
        NaiveDate::from_ymd_opt(1904, 1, 1)
    );
    assert_eq!(row.cells()[1], Cell::Number(0.0));
}

#[test]
fn test_1900_epoch_date() {
    let xml = fixtures::sheet(r#"<row r="1"><c r="A1" s="1"><v>1</v></c></row>"#);
    let data = fixtures::single_sheet("", &xml, Some(fixtures::DATE_STYLES));
    let workbook = Workbook::from_bytes(data).unwrap();
    assert_eq!(workbook.epoch(), DateEpoch::E1900);

    let row = workbook.open_sheet(0usize).unwrap().next_row().unwrap().unwrap();
    assert_eq!(
        row.cells()[0].as_datetime().map(|dt| dt.date()),
        NaiveDate::from_ymd_opt(1900, 1, 1)
    );
}

#[test]
fn test_last_cell_of_sheet() {
    let xml = fixtures::sheet(r#"<row r="1048576"><c r="XFD1048576"><v>7</v></c></row>"#);
    let workbook = open(&xml);
    let reader = ReaderBuilder::new()
        .with_columns(vec![MAX_COLUMNS - 1])
        .build()
        .unwrap();

    let rows: Vec<_> = reader
        .rows(&workbook)
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].index(), MAX_ROWS - 1);
    assert_eq!(rows[0].get(MAX_COLUMNS - 1), Some(&Cell::Number(7.0)));
}

#[test]
fn test_whitespace_strings_are_preserved() {
    let xml = fixtures::sheet(
        r#"<row r="1"><c r="A1" t="inlineStr"><is><t xml:space="preserve">  padded  </t></is></c><c r="B1" t="str"><v> </v></c></row>"#,
    );
    let workbook = open(&xml);
    let row = workbook.open_sheet(0usize).unwrap().next_row().unwrap().unwrap();
    assert_eq!(row.cells()[0].as_str(), Some("  padded  "));
    assert_eq!(row.cells()[1].as_str(), Some(" "));
}

#[test]
fn test_formula_error_cell() {
    let xml = fixtures::sheet(r#"<row r="1"><c r="A1" t="e"><f>1/0</f><v>#DIV/0!</v></c></row>"#);
    let workbook = open(&xml);
    let row = workbook.open_sheet(0usize).unwrap().next_row().unwrap().unwrap();
    assert_eq!(row.cells()[0].to_string(), "#DIV/0!");
    assert!(row.cells()[0].decode_error().is_none());
}

#[test]
fn test_header_is_first_present_row() {
    let xml = fixtures::sheet(
        r#"<row r="3"><c r="A3" t="inlineStr"><is><t>Name</t></is></c><c r="B3" t="inlineStr"><is><t>Age</t></is></c></row>
           <row r="4"><c r="A4" t="inlineStr"><is><t>Ann</t></is></c><c r="B4"><v>30</v></c></row>"#,
    );
    let workbook = open(&xml);
    let reader = ReaderBuilder::new().with_headers(true).build().unwrap();

    let records = reader.records(&workbook).unwrap();
    assert_eq!(records.header().row_index(), 2);
    assert_eq!(records.header().names().collect::<Vec<_>>(), vec!["Name", "Age"]);

    let records: Vec<_> = records.collect::<Result<_, _>>().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].index(), 3);
    assert_eq!(records[0].get("Name").unwrap().as_str(), Some("Ann"));
    assert_eq!(records[0].get("Age").unwrap().as_f64(), Some(30.0));
}

#[test]
fn test_header_row_searches_from_given_row() {
    let xml = fixtures::sheet(
        r#"<row r="1"><c r="A1" t="inlineStr"><is><t>Report</t></is></c></row>
           <row r="3"><c r="A3" t="inlineStr"><is><t>id</t></is></c></row>
           <row r="4"><c r="A4"><v>7</v></c></row>"#,
    );
    let workbook = open(&xml);

    let reader = ReaderBuilder::new().with_header_row(1).build().unwrap();
    let records: Vec<_> = reader
        .records(&workbook)
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].header().row_index(), 2);
    assert_eq!(records[0].get("id").unwrap().as_f64(), Some(7.0));

    // 先頭から探すと、タイトル行がヘッダーになる
    let reader = ReaderBuilder::new().with_header_row(0).build().unwrap();
    let records = reader.records(&workbook).unwrap();
    assert_eq!(records.header().names().collect::<Vec<_>>(), vec!["Report"]);
    assert_eq!(records.count(), 2);
}

#[test]
fn test_dense_rows_after_late_header() {
    let xml = fixtures::sheet(
        r#"<row r="2"><c r="A2" t="inlineStr"><is><t>x</t></is></c></row>
           <row r="5"><c r="A5"><v>1</v></c></row>"#,
    );
    let workbook = open(&xml);
    let reader = ReaderBuilder::new()
        .with_headers(true)
        .dense(true)
        .build()
        .unwrap();

    let rows = reader.rows(&workbook).unwrap();
    assert_eq!(rows.header().map(|h| h.row_index()), Some(1));

    let indices: Vec<u32> = rows.map(|r| r.unwrap().index()).collect();
    assert_eq!(indices, vec![2, 3, 4]);
}

#[test]
fn test_header_on_empty_sheet() {
    let workbook = open(r#"<worksheet><sheetData/></worksheet>"#);
    let reader = ReaderBuilder::new().with_headers(true).build().unwrap();

    let records = reader.records(&workbook).unwrap();
    assert!(records.header().is_empty());
    assert_eq!(records.count(), 0);
}

#[test]
fn test_range_past_last_row() {
    let xml = fixtures::sheet(r#"<row r="1"><c r="A1"><v>1</v></c></row>"#);
    let workbook = open(&xml);
    let reader = ReaderBuilder::new()
        .with_sheet(SheetSelector::Index(0))
        .with_range((100, 0), (200, 0))
        .build()
        .unwrap();
    assert_eq!(reader.rows(&workbook).unwrap().count(), 0);
}
