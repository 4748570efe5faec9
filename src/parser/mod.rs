//! Parser Module
//!
//! XLSXコンテナの読み込み。
//! ZIPアーカイブの索引、ワークブック構造、共有文字列、スタイルをワークブックを開く時点で解析します。
//! シートの行データはここでは解析せず、`cursor`モジュールがストリーミングします。

pub(crate) mod archive;
pub(crate) mod shared_strings;
pub(crate) mod styles;
mod workbook;

pub use archive::{EntryReader, EntrySource, ZipContainer};
pub use shared_strings::SharedStrings;
pub(crate) use styles::StyleTable;
pub use workbook::Workbook;
pub(crate) use workbook::WorkbookInner;
