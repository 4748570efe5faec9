//! Parallel Module
//!
//! 複数のシートを独立したカーソルで並列に読み込む。
//! 各カーソルは自分のエントリリーダーを持ち、ワークブックの解析済み情報（読み取り専用）のみを共有します。

use rayon::prelude::*;

use crate::api::SheetSelector;
use crate::builder::SheetReader;
use crate::error::XlError;
use crate::parser::Workbook;
use crate::rows::Rows;
use crate::types::SheetDescriptor;

/// すべてのシートを並列に読み込む
///
/// `reader`の設定（ヘッダー行、列、範囲など）をシートごとに適用し、
/// シート選択だけを各シートに置き換えます。結果はワークブック内のシート順です。
///
/// # 引数
///
/// * `workbook` - 対象のワークブック
/// * `reader` - シートごとに適用する設定
/// * `f` - シートと行のイテレータを受け取り、結果を返す関数
///
/// # 使用例
///
/// ```rust,no_run
/// use xlrows::{scan_sheets, ReaderBuilder, Workbook};
///
/// # fn main() -> Result<(), xlrows::XlError> {
/// let workbook = Workbook::open_path("report.xlsx")?;
/// let reader = ReaderBuilder::new().build()?;
/// let counts = scan_sheets(&workbook, &reader, |_, mut rows| {
///     rows.try_fold(0usize, |n, row| row.map(|_| n + 1))
/// });
/// for (sheet, count) in workbook.sheets().iter().zip(counts) {
///     println!("{}: {} rows", sheet.name, count?);
/// }
/// # Ok(())
/// # }
/// ```
pub fn scan_sheets<T, F>(
    workbook: &Workbook,
    reader: &SheetReader,
    f: F,
) -> Vec<Result<T, XlError>>
where
    T: Send,
    F: Fn(&SheetDescriptor, Rows) -> Result<T, XlError> + Sync,
{
    workbook
        .sheets()
        .par_iter()
        .map(|sheet| {
            let mut options = reader.options().clone();
            options.sheet = SheetSelector::Index(sheet.index);
            let rows = Rows::open(workbook, &options)?;
            f(sheet, rows)
        })
        .collect()
}

/// すべてのシートの行数を並列に数える
pub fn count_rows(workbook: &Workbook, reader: &SheetReader) -> Vec<Result<usize, XlError>> {
    scan_sheets(workbook, reader, |_, mut rows| {
        rows.try_fold(0usize, |count, row| row.map(|_| count + 1))
    })
}
