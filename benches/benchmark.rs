//! パフォーマンスベンチマーク
//!
//! このモジュールは、xlrowsクレートの行読み込み性能を測定するためのベンチマークを提供します。
//!
//! - 全列の読み込みと列を絞った読み込み（列プッシュダウン）の比較
//! - ヘッダー付きレコードの読み込み
//! - 複数シートの並列読み込み
//!
//! フィクスチャは`rust_xlsxwriter`でメモリ上に生成します。

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use rust_xlsxwriter::{Workbook as XlsxWriter, XlsxError};
use xlrows::{count_rows, ReaderBuilder, Workbook};

/// `sheets`枚のシートに、ヘッダー行 + `rows`行 x `cols`列を書き込んだワークブックを生成
fn generate_fixture(sheets: usize, rows: u32, cols: u16) -> Result<Vec<u8>, XlsxError> {
    let mut workbook = XlsxWriter::new();
    for _ in 0..sheets {
        let worksheet = workbook.add_worksheet();
        for col in 0..cols {
            worksheet.write_string(0, col, &format!("col{}", col))?;
        }
        for row in 1..=rows {
            for col in 0..cols {
                if col % 3 == 0 {
                    worksheet.write_string(row, col, &format!("item-{}", row % 500))?;
                } else {
                    worksheet.write_number(row, col, f64::from(row) * 1.5 + f64::from(col))?;
                }
            }
        }
    }
    Ok(workbook.save_to_buffer()?)
}

fn benchmark_full_scan(c: &mut Criterion) {
    let data = generate_fixture(1, 20_000, 20).unwrap();
    let workbook = Workbook::from_bytes(data.clone()).unwrap();

    let mut group = c.benchmark_group("scan");
    group.throughput(Throughput::Elements(20_001));
    group.sample_size(20);

    group.bench_function("all_columns", |b| {
        let reader = ReaderBuilder::new().build().unwrap();
        b.iter(|| {
            let rows = reader.rows(black_box(&workbook)).unwrap();
            black_box(rows.map(|r| r.unwrap().len()).sum::<usize>())
        });
    });

    group.bench_function("two_columns", |b| {
        let reader = ReaderBuilder::new()
            .with_columns(vec![1u32, 17])
            .build()
            .unwrap();
        b.iter(|| {
            let rows = reader.rows(black_box(&workbook)).unwrap();
            black_box(rows.map(|r| r.unwrap().len()).sum::<usize>())
        });
    });

    // ワークブックの索引構築を含む
    group.bench_function("open_and_scan", |b| {
        let reader = ReaderBuilder::new().build().unwrap();
        b.iter(|| {
            let rows = reader.read(std::io::Cursor::new(black_box(&data))).unwrap();
            black_box(rows.count())
        });
    });

    group.finish();
}

fn benchmark_records(c: &mut Criterion) {
    let data = generate_fixture(1, 10_000, 8).unwrap();
    let workbook = Workbook::from_bytes(data).unwrap();
    let reader = ReaderBuilder::new().with_header_row(0).build().unwrap();

    let mut group = c.benchmark_group("records");
    group.throughput(Throughput::Elements(10_000));
    group.sample_size(20);

    group.bench_function("get_by_name", |b| {
        b.iter(|| {
            let records = reader.records(black_box(&workbook)).unwrap();
            let mut total = 0.0;
            for record in records {
                total += record.unwrap().get("col1").unwrap().as_f64().unwrap_or(0.0);
            }
            black_box(total)
        });
    });

    group.bench_function("to_json", |b| {
        b.iter(|| {
            let records = reader.records(black_box(&workbook)).unwrap();
            black_box(records.map(|r| r.unwrap().to_json().len()).sum::<usize>())
        });
    });

    group.finish();
}

fn benchmark_parallel_sheets(c: &mut Criterion) {
    let data = generate_fixture(8, 5_000, 10).unwrap();
    let workbook = Workbook::from_bytes(data).unwrap();
    let reader = ReaderBuilder::new().build().unwrap();

    let mut group = c.benchmark_group("parallel");
    group.throughput(Throughput::Elements(8 * 5_001));
    group.sample_size(10);

    group.bench_function("count_rows_8_sheets", |b| {
        b.iter(|| black_box(count_rows(black_box(&workbook), &reader)));
    });

    group.bench_function("sequential_8_sheets", |b| {
        b.iter(|| {
            let total: usize = (0..workbook.sheets().len())
                .map(|i| workbook.open_sheet(i).unwrap().count())
                .sum();
            black_box(total)
        });
    });

    group.finish();
}

criterion_group! {
    name = benches;
    config = Criterion::default()
        .measurement_time(std::time::Duration::from_secs(10))
        .warm_up_time(std::time::Duration::from_secs(3));
    targets = benchmark_full_scan, benchmark_records, benchmark_parallel_sheets
}

criterion_main!(benches);
