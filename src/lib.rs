//! xlrows - Pure-Rust streaming XLSX row reader
//!
//! This crate reads worksheet rows from XLSX workbooks one at a time, without
//! materializing the sheet. The workbook index (sheet list, relationships, shared
//! strings, date styles) is parsed once when the workbook is opened; each sheet is
//! then streamed by an independent cursor that decodes only the columns you ask for.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::fs::File;
//! use xlrows::ReaderBuilder;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Read the first sheet, using row 1 as the header
//!     let reader = ReaderBuilder::new().with_header_row(0).build()?;
//!
//!     for record in reader.read_records(File::open("people.xlsx")?)? {
//!         let record = record?;
//!         println!("{} is {}", record.get("Name")?, record.get("Age")?);
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! # Column Pushdown
//!
//! Cells outside the selected columns are skipped by the tokenizer and never decoded:
//!
//! ```rust,no_run
//! use xlrows::{ColumnKey, ReaderBuilder, Workbook};
//!
//! # fn main() -> Result<(), xlrows::XlError> {
//! let workbook = Workbook::open_path("wide.xlsx")?;
//! let reader = ReaderBuilder::new()
//!     .with_sheet("Data")
//!     .with_columns(vec![ColumnKey::Index(0), ColumnKey::Letter("C".to_string())])
//!     .build()?;
//!
//! let mut rows = reader.rows(&workbook)?;
//! for row in rows.by_ref() {
//!     let row = row?;
//!     println!("{:?} {:?}", row.get(0), row.get(2));
//! }
//! println!("decoded {} cells", rows.decoded_cells());
//! # Ok(())
//! # }
//! ```
//!
//! # Low-level Cursor
//!
//! ```rust,no_run
//! use xlrows::{CursorOptions, SheetSelector, Workbook};
//!
//! # fn main() -> Result<(), xlrows::XlError> {
//! let workbook = Workbook::open_path("data.xlsx")?;
//! let mut cursor = workbook.open_sheet_with(
//!     &SheetSelector::Index(0),
//!     CursorOptions { dense: true, ..CursorOptions::default() },
//! )?;
//! while let Some(row) = cursor.next_row()? {
//!     println!("{}: {:?}", row.index() + 1, row.cells());
//! }
//! # Ok(())
//! # }
//! ```

mod api;
mod builder;
mod cursor;
mod decoder;
mod error;
mod parallel;
mod parser;
mod reference;
mod rows;
mod security;
pub mod table;
mod types;

// 公開API
pub use api::{ColumnKey, SheetSelector};
pub use builder::{ReadOptions, ReaderBuilder, SheetReader};
pub use cursor::{CursorOptions, CursorState, SheetCursor};
pub use decoder::{CellDecoder, CellTypeTag, RawCell};
pub use error::{DecodeError, FormatError, PlanError, ReferenceError, StreamError, XlError};
pub use parallel::{count_rows, scan_sheets};
pub use parser::{EntryReader, EntrySource, SharedStrings, Workbook, ZipContainer};
pub use reference::{column_name_to_index, parse_cell_reference, parse_range_reference};
pub use rows::{Header, Record, Records, Rows};
pub use security::SecurityLimits;
pub use types::{
    column_index_to_name, Cell, CellCoord, CellError, CellRange, DateEpoch, ErrorCode, Row,
    SheetDescriptor, SheetVisibility, Text, MAX_COLUMNS, MAX_ROWS,
};
