//! Workbook Module
//!
//! ワークブックを開き、シート一覧・共有文字列・スタイル・日付エポックを読み込むモジュール。
//!
//! シートの内容はここでは読み込みません。行データは`open_sheet()`で作成する
//! カーソルが、必要になった時点でストリーミングします。

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use std::sync::Arc;

use log::debug;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::api::SheetSelector;
use crate::cursor::{CursorOptions, SheetCursor};
use crate::decoder::CellDecoder;
use crate::error::{FormatError, XlError};
use crate::parser::archive::{EntrySource, ZipContainer};
use crate::parser::shared_strings::SharedStrings;
use crate::parser::styles::StyleTable;
use crate::security::SecurityLimits;
use crate::types::{DateEpoch, SheetDescriptor, SheetVisibility};

const REL_OFFICE_DOCUMENT: &str = "/officeDocument";
const REL_SHARED_STRINGS: &str = "/sharedStrings";
const REL_STYLES: &str = "/styles";

/// 開いたワークブック
///
/// 開いた後は読み取り専用で、内部は参照カウントで共有されます。
/// `clone()`は安価であり、カーソルは呼び出し元の`Workbook`を借用せずに
/// ハンドルを保持します。最後のハンドルが破棄された時点ですべてのリソースが解放されます。
///
/// # 使用例
///
/// ```rust,no_run
/// use std::fs::File;
/// use xlrows::Workbook;
///
/// # fn main() -> Result<(), xlrows::XlError> {
/// let workbook = Workbook::open(File::open("data.xlsx")?)?;
/// for sheet in workbook.sheets() {
///     println!("{} (visible: {})", sheet.name, sheet.is_visible());
/// }
///
/// let mut cursor = workbook.open_sheet(0)?;
/// while let Some(row) = cursor.next_row()? {
///     println!("{:?}", row.cells());
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Workbook {
    inner: Arc<WorkbookInner>,
}

/// ワークブックの共有状態
#[derive(Debug)]
pub(crate) struct WorkbookInner {
    pub(crate) container: ZipContainer,
    pub(crate) shared_strings: SharedStrings,
    pub(crate) styles: StyleTable,
    pub(crate) epoch: DateEpoch,
    pub(crate) sheets: Vec<SheetDescriptor>,
}

impl WorkbookInner {
    /// このワークブックのデコーダー
    pub(crate) fn decoder(&self) -> CellDecoder<'_> {
        CellDecoder::new(&self.shared_strings, self.epoch).with_styles(&self.styles)
    }
}

impl Workbook {
    /// リーダーからワークブックを開く（デフォルトのセキュリティ制限）
    ///
    /// 入力全体（圧縮済みのバイト列）をメモリに読み込み、エントリ索引を構築します。
    /// エントリの展開は、カーソルが読み進めた分だけ遅延して行われます。
    ///
    /// # 戻り値
    ///
    /// * `Ok(Workbook)` - 開くことに成功した場合
    /// * `Err(XlError::Format)` - ZIPコンテナではない、またはワークブック構造が壊れている場合
    /// * `Err(XlError::SecurityViolation)` - セキュリティ制限に違反した場合
    pub fn open<R: Read>(reader: R) -> Result<Self, XlError> {
        Self::open_with_limits(reader, &SecurityLimits::default())
    }

    /// リーダーからワークブックを開く（セキュリティ制限を指定）
    pub fn open_with_limits<R: Read>(reader: R, limits: &SecurityLimits) -> Result<Self, XlError> {
        // 上限+1バイトまで読めば超過を検出できる
        let mut limited = reader.take(limits.max_input_file_size.saturating_add(1));
        let mut buffer = Vec::new();
        limited.read_to_end(&mut buffer)?;
        Self::from_bytes_with_limits(buffer, limits)
    }

    /// ファイルパスからワークブックを開く
    pub fn open_path<P: AsRef<Path>>(path: P) -> Result<Self, XlError> {
        Self::open(File::open(path)?)
    }

    /// バイト列からワークブックを開く
    pub fn from_bytes<B: Into<Arc<[u8]>>>(bytes: B) -> Result<Self, XlError> {
        Self::from_bytes_with_limits(bytes, &SecurityLimits::default())
    }

    /// バイト列からワークブックを開く（セキュリティ制限を指定）
    pub fn from_bytes_with_limits<B: Into<Arc<[u8]>>>(
        bytes: B,
        limits: &SecurityLimits,
    ) -> Result<Self, XlError> {
        let container = ZipContainer::new(bytes.into(), limits)?;

        let workbook_part = find_workbook_part(&container)?;
        let (sheet_entries, epoch) = parse_workbook_part(&container, &workbook_part)?;
        let relationships = read_relationships(&container, &workbook_part)?;

        let mut sheets = Vec::with_capacity(sheet_entries.len());
        for (index, entry) in sheet_entries.into_iter().enumerate() {
            let target = relationships
                .get(&entry.relationship)
                .map(|rel| rel.target.clone())
                .ok_or_else(|| {
                    FormatError::CorruptIndex(format!(
                        "sheet '{}' refers to unknown relationship '{}'",
                        entry.name, entry.relationship
                    ))
                })?;
            if !container.contains(&target) {
                return Err(FormatError::CorruptIndex(format!(
                    "sheet '{}' refers to missing entry '{}'",
                    entry.name, target
                ))
                .into());
            }

            sheets.push(SheetDescriptor {
                name: entry.name,
                index,
                sheet_id: entry.sheet_id,
                visibility: entry.visibility,
                entry: target,
            });
        }

        let shared_strings = match optional_part(
            &container,
            &relationships,
            REL_SHARED_STRINGS,
            "xl/sharedStrings.xml",
        ) {
            Some(entry) => SharedStrings::parse(open_buffered(&container, &entry)?, &entry)?,
            None => SharedStrings::default(),
        };
        let styles = match optional_part(&container, &relationships, REL_STYLES, "xl/styles.xml") {
            Some(entry) => StyleTable::parse(open_buffered(&container, &entry)?, &entry)?,
            None => StyleTable::default(),
        };

        debug!(
            "opened workbook '{}': {} sheets, {} shared strings, {} styles, epoch {:?}",
            workbook_part,
            sheets.len(),
            shared_strings.len(),
            styles.len(),
            epoch
        );

        Ok(Self {
            inner: Arc::new(WorkbookInner {
                container,
                shared_strings,
                styles,
                epoch,
                sheets,
            }),
        })
    }

    /// すべてのシート（ワークブック内の順序）
    pub fn sheets(&self) -> &[SheetDescriptor] {
        &self.inner.sheets
    }

    /// シート名でシートを検索
    pub fn sheet(&self, name: &str) -> Option<&SheetDescriptor> {
        self.inner.sheets.iter().find(|s| s.name == name)
    }

    /// すべてのシート名
    pub fn sheet_names(&self) -> Vec<&str> {
        self.inner.sheets.iter().map(|s| s.name.as_str()).collect()
    }

    /// 共有文字列テーブル
    pub fn shared_strings(&self) -> &SharedStrings {
        &self.inner.shared_strings
    }

    /// 日付エポック
    pub fn epoch(&self) -> DateEpoch {
        self.inner.epoch
    }

    /// このワークブックの共有文字列・スタイル・エポックを使うデコーダー
    pub fn decoder(&self) -> CellDecoder<'_> {
        self.inner.decoder()
    }

    /// シート選択方式に基づいてシートを解決
    ///
    /// # 戻り値
    ///
    /// * `Ok(&SheetDescriptor)` - シートが見つかった場合
    /// * `Err(XlError::NotFound)` - 名前が一致しない、またはインデックスが範囲外の場合
    pub fn resolve_sheet(&self, selector: &SheetSelector) -> Result<&SheetDescriptor, XlError> {
        let found = match selector {
            SheetSelector::Index(index) => self.inner.sheets.get(*index),
            SheetSelector::Name(name) => self.sheet(name),
        };
        found.ok_or_else(|| XlError::NotFound(selector.to_string()))
    }

    /// シートのカーソルを開く（すべての列、疎な行）
    pub fn open_sheet<S: Into<SheetSelector>>(&self, selector: S) -> Result<SheetCursor, XlError> {
        self.open_sheet_with(&selector.into(), CursorOptions::default())
    }

    /// シートのカーソルを開く（射影・範囲などを指定）
    pub fn open_sheet_with(
        &self,
        selector: &SheetSelector,
        options: CursorOptions,
    ) -> Result<SheetCursor, XlError> {
        let sheet = self.resolve_sheet(selector)?.clone();
        SheetCursor::open(Arc::clone(&self.inner), sheet, options)
    }

    /// ワークブックを閉じる
    ///
    /// このハンドルを破棄します。カーソルが残っている場合、
    /// 共有状態は最後のカーソルが破棄された時点で解放されます。
    pub fn close(self) {
        debug!(
            "closing workbook handle ({} other handles)",
            Arc::strong_count(&self.inner) - 1
        );
    }
}

/// `<sheet>`要素の内容
struct SheetEntry {
    name: String,
    sheet_id: u32,
    relationship: String,
    visibility: SheetVisibility,
}

/// リレーションシップ
#[derive(Debug, Clone)]
struct Relationship {
    /// `Type`属性（URI）
    kind: String,
    /// 正規化されたエントリパス
    target: String,
}

fn open_buffered(container: &ZipContainer, entry: &str) -> Result<impl BufRead, XlError> {
    Ok(BufReader::new(container.open_entry(entry)?))
}

/// `_rels/.rels`の`officeDocument`リレーションシップからワークブックパートを特定
fn find_workbook_part(container: &ZipContainer) -> Result<String, XlError> {
    if container.contains("_rels/.rels") {
        let rels = parse_relationships(open_buffered(container, "_rels/.rels")?, "", "_rels/.rels")?;
        if let Some(rel) = rels.values().find(|rel| rel.kind.ends_with(REL_OFFICE_DOCUMENT)) {
            if container.contains(&rel.target) {
                return Ok(rel.target.clone());
            }
        }
    }

    if container.contains("xl/workbook.xml") {
        return Ok("xl/workbook.xml".to_string());
    }
    Err(FormatError::CorruptIndex("missing workbook part".to_string()).into())
}

/// ワークブックパートを解析し、シート一覧と日付エポックを取得
fn parse_workbook_part(
    container: &ZipContainer,
    part: &str,
) -> Result<(Vec<SheetEntry>, DateEpoch), XlError> {
    let corrupt = |message: String| FormatError::CorruptIndex(format!("{}: {}", part, message));

    let mut reader = Reader::from_reader(open_buffered(container, part)?);
    reader.trim_text(true);

    let mut buf = Vec::new();
    let mut sheets = Vec::new();
    let mut epoch = DateEpoch::E1900;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"workbookPr" => {
                    for attr in e.attributes() {
                        let attr = attr.map_err(|e| corrupt(format!("XML attribute error: {}", e)))?;
                        if attr.key.as_ref() == b"date1904" {
                            let value = std::str::from_utf8(&attr.value)
                                .map_err(|e| corrupt(format!("invalid UTF-8: {}", e)))?;
                            if value == "1" || value == "true" {
                                epoch = DateEpoch::E1904;
                            }
                        }
                    }
                }
                b"sheet" => sheets.push(read_sheet_entry(&e).map_err(&corrupt)?),
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(corrupt(format!("XML parse error: {}", e)).into()),
            _ => {}
        }
        buf.clear();
    }

    Ok((sheets, epoch))
}

/// `<sheet name="Sheet1" sheetId="1" state="hidden" r:id="rId1"/>`
fn read_sheet_entry(e: &BytesStart<'_>) -> Result<SheetEntry, String> {
    let mut name = None;
    let mut sheet_id = 0;
    let mut relationship = None;
    let mut visibility = SheetVisibility::Visible;

    for attr in e.attributes() {
        let attr = attr.map_err(|e| format!("XML attribute error: {}", e))?;
        let value = attr
            .unescape_value()
            .map_err(|e| format!("XML attribute error: {}", e))?;
        match attr.key.as_ref() {
            b"name" => name = Some(value.into_owned()),
            b"sheetId" => sheet_id = value.parse().unwrap_or(0),
            b"state" => visibility = SheetVisibility::from_state(&value),
            // r:id（名前空間プレフィックスは任意）
            _ if attr.key.local_name().as_ref() == b"id" => {
                relationship = Some(value.into_owned())
            }
            _ => {}
        }
    }

    match (name, relationship) {
        (Some(name), Some(relationship)) => Ok(SheetEntry {
            name,
            sheet_id,
            relationship,
            visibility,
        }),
        (Some(name), None) => Err(format!("sheet '{}' has no relationship id", name)),
        _ => Err("sheet element without a name".to_string()),
    }
}

/// パートに対応するリレーションシップファイルを読み込む（存在しない場合は空）
fn read_relationships(
    container: &ZipContainer,
    part: &str,
) -> Result<HashMap<String, Relationship>, XlError> {
    let rels_path = relationships_path(part);
    if !container.contains(&rels_path) {
        return Ok(HashMap::new());
    }
    let relationships = parse_relationships(
        open_buffered(container, &rels_path)?,
        part_directory(part),
        &rels_path,
    )?;
    Ok(relationships)
}

/// リレーションシップファイルを解析（Id -> Relationship）
///
/// `Target`は`base_dir`を基準に正規化されます。外部リンク（`TargetMode="External"`）は除外します。
fn parse_relationships<R: BufRead>(
    source: R,
    base_dir: &str,
    entry: &str,
) -> Result<HashMap<String, Relationship>, FormatError> {
    let corrupt = |message: String| FormatError::CorruptIndex(format!("{}: {}", entry, message));

    let mut reader = Reader::from_reader(source);
    reader.trim_text(true);

    let mut buf = Vec::new();
    let mut relationships = HashMap::new();

    loop {
        match reader.read_event_into(&mut buf) {
            // Event::Emptyは自己終了タグの場合に発生
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                if e.local_name().as_ref() != b"Relationship" {
                    buf.clear();
                    continue;
                }

                let mut id = None;
                let mut kind = String::new();
                let mut target = None;
                let mut external = false;

                for attr in e.attributes() {
                    let attr = attr.map_err(|e| corrupt(format!("XML attribute error: {}", e)))?;
                    let value = attr
                        .unescape_value()
                        .map_err(|e| corrupt(format!("XML attribute error: {}", e)))?;
                    match attr.key.as_ref() {
                        b"Id" => id = Some(value.into_owned()),
                        b"Type" => kind = value.into_owned(),
                        b"Target" => target = Some(value.into_owned()),
                        b"TargetMode" => external = value.eq_ignore_ascii_case("External"),
                        _ => {}
                    }
                }

                // IDまたはターゲットが欠落している場合はスキップ
                if let (Some(id), Some(target), false) = (id, target, external) {
                    relationships.insert(
                        id,
                        Relationship {
                            kind,
                            target: resolve_target(base_dir, &target),
                        },
                    );
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(corrupt(format!("XML parse error: {}", e))),
            _ => {}
        }
        buf.clear();
    }

    Ok(relationships)
}

/// 任意パート（共有文字列・スタイル）のエントリパスを特定
fn optional_part(
    container: &ZipContainer,
    relationships: &HashMap<String, Relationship>,
    kind: &str,
    fallback: &str,
) -> Option<String> {
    relationships
        .values()
        .find(|rel| rel.kind.ends_with(kind) && container.contains(&rel.target))
        .map(|rel| rel.target.clone())
        .or_else(|| container.contains(fallback).then(|| fallback.to_string()))
}

/// `xl/workbook.xml` -> `xl/_rels/workbook.xml.rels`
fn relationships_path(part: &str) -> String {
    match part.rsplit_once('/') {
        Some((dir, file)) => format!("{}/_rels/{}.rels", dir, file),
        None => format!("_rels/{}.rels", part),
    }
}

/// `xl/workbook.xml` -> `xl`
fn part_directory(part: &str) -> &str {
    part.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("")
}

/// リレーションシップのターゲットをエントリパスに正規化
///
/// 相対パス（`worksheets/sheet1.xml`）、親ディレクトリ参照（`../xl/...`）、
/// 絶対パス（`/xl/worksheets/sheet1.xml`）を処理します。
fn resolve_target(base_dir: &str, target: &str) -> String {
    let joined = match target.strip_prefix('/') {
        Some(absolute) => absolute.to_string(),
        None if base_dir.is_empty() => target.to_string(),
        None => format!("{}/{}", base_dir, target),
    };

    let mut segments: Vec<&str> = Vec::new();
    for segment in joined.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_target() {
        assert_eq!(
            resolve_target("xl", "worksheets/sheet1.xml"),
            "xl/worksheets/sheet1.xml"
        );
        assert_eq!(
            resolve_target("xl", "/xl/worksheets/sheet2.xml"),
            "xl/worksheets/sheet2.xml"
        );
        assert_eq!(
            resolve_target("xl", "../xl/worksheets/./sheet3.xml"),
            "xl/worksheets/sheet3.xml"
        );
        assert_eq!(resolve_target("", "xl/workbook.xml"), "xl/workbook.xml");
    }

    #[test]
    fn test_relationship_paths() {
        assert_eq!(
            relationships_path("xl/workbook.xml"),
            "xl/_rels/workbook.xml.rels"
        );
        assert_eq!(relationships_path("book.xml"), "_rels/book.xml.rels");
        assert_eq!(part_directory("xl/workbook.xml"), "xl");
        assert_eq!(part_directory("book.xml"), "");
    }

    #[test]
    fn test_parse_relationships() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
  <Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/>
  <Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/sharedStrings" Target="/xl/sharedStrings.xml"/>
  <Relationship Id="rId3" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/hyperlink" Target="https://example.com" TargetMode="External"/>
  <Relationship Id="rId4"/>
</Relationships>"#;
        let rels = parse_relationships(xml.as_bytes(), "xl", "xl/_rels/workbook.xml.rels").unwrap();

        assert_eq!(rels.len(), 2);
        assert_eq!(rels["rId1"].target, "xl/worksheets/sheet1.xml");
        assert!(rels["rId1"].kind.ends_with("/worksheet"));
        assert_eq!(rels["rId2"].target, "xl/sharedStrings.xml");
        assert!(!rels.contains_key("rId3"));
    }

    #[test]
    fn test_read_sheet_entry() {
        let xml = r#"<sheets xmlns:r="r"><sheet name="Data &amp; More" sheetId="7" state="veryHidden" r:id="rId3"/><sheet sheetId="2" r:id="rId4"/></sheets>"#;
        let mut reader = Reader::from_reader(xml.as_bytes());
        let mut buf = Vec::new();
        let mut entries = Vec::new();
        loop {
            match reader.read_event_into(&mut buf).unwrap() {
                Event::Empty(e) if e.local_name().as_ref() == b"sheet" => {
                    entries.push(read_sheet_entry(&e))
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        let first = entries[0].as_ref().unwrap();
        assert_eq!(first.name, "Data & More");
        assert_eq!(first.sheet_id, 7);
        assert_eq!(first.relationship, "rId3");
        assert_eq!(first.visibility, SheetVisibility::VeryHidden);
        assert!(entries[1].is_err());
    }
}
