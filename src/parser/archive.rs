//! Archive Module
//!
//! XLSXコンテナ（ZIPアーカイブ）のエントリ索引と、エントリごとの独立した読み込み位置を提供します。
//!
//! 中央ディレクトリはワークブックを開く時点で1回だけ走査し、
//! エントリ名 -> 位置情報（データ開始位置、圧縮サイズ、展開後サイズ、圧縮方式）の索引を構築します。
//! エントリの展開は、`open_entry()`が返すリーダーを読み進めた分だけ遅延して行われます。

use std::collections::HashMap;
use std::io::{self, Cursor, Read};
use std::sync::Arc;

use flate2::read::DeflateDecoder;
use log::debug;
use zip::result::ZipError;
use zip::{CompressionMethod, ZipArchive};

use crate::error::{FormatError, XlError};
use crate::security::SecurityLimits;

/// ZIPローカルファイルヘッダーのシグネチャ
const LOCAL_FILE_SIGNATURE: &[u8; 4] = b"PK\x03\x04";

/// 空のZIPアーカイブ（中央ディレクトリ終端のみ）のシグネチャ
const EMPTY_ARCHIVE_SIGNATURE: &[u8; 4] = b"PK\x05\x06";

/// 「エントリXに対して新しい読み込み位置を開く」能力
///
/// シートカーソルはこのトレイトを通じてエントリを開くため、
/// 同じエントリに対して複数の独立したカーソルを作成できます。
pub trait EntrySource {
    /// エントリのリーダー型
    type Reader: Read + Send;

    /// エントリが存在するか
    fn contains(&self, name: &str) -> bool;

    /// エントリの先頭から読み込むリーダーを開く
    fn open_entry(&self, name: &str) -> Result<Self::Reader, XlError>;
}

/// エントリの位置情報
#[derive(Debug, Clone)]
struct EntryLocator {
    data_start: u64,
    compressed_size: u64,
    size: u64,
    method: CompressionMethod,
    encrypted: bool,
}

/// メモリ上のZIPコンテナ
///
/// 圧縮済みのバイト列を`Arc`で共有し、エントリごとに独立したリーダーを生成します。
#[derive(Debug, Clone)]
pub struct ZipContainer {
    data: Arc<[u8]>,
    entries: HashMap<String, EntryLocator>,
    /// 小文字化した名前 -> 実際のエントリ名
    folded: HashMap<String, String>,
}

impl ZipContainer {
    /// バイト列からコンテナを開く
    ///
    /// # 戻り値
    ///
    /// * `Ok(ZipContainer)` - 索引の構築に成功した場合
    /// * `Err(XlError::Format(FormatError::NotAContainer))` - ZIPアーカイブではない場合
    /// * `Err(XlError::SecurityViolation)` - セキュリティ制限に違反した場合
    pub(crate) fn new(data: Arc<[u8]>, limits: &SecurityLimits) -> Result<Self, XlError> {
        limits.check_input_size(data.len() as u64)?;

        if !data.starts_with(LOCAL_FILE_SIGNATURE) && !data.starts_with(EMPTY_ARCHIVE_SIGNATURE) {
            return Err(FormatError::NotAContainer.into());
        }

        let mut archive = ZipArchive::new(Cursor::new(&data[..])).map_err(|e| {
            debug!("ZIP central directory could not be read: {}", e);
            FormatError::NotAContainer
        })?;

        // セキュリティチェック: ファイル数の上限（走査前）
        if archive.len() > limits.max_file_count {
            return Err(XlError::SecurityViolation(format!(
                "ZIP archive contains too many files: {} (max: {})",
                archive.len(),
                limits.max_file_count
            )));
        }

        let mut entries = HashMap::with_capacity(archive.len());
        let mut folded = HashMap::with_capacity(archive.len());

        for i in 0..archive.len() {
            // 暗号化の判定は通常のオープンでのみ行われる
            let encrypted = matches!(
                archive.by_index(i),
                Err(ZipError::UnsupportedArchive(msg)) if msg == ZipError::PASSWORD_REQUIRED
            );

            let file = archive.by_index_raw(i).map_err(|e| {
                FormatError::CorruptIndex(format!("unreadable ZIP entry #{}: {}", i, e))
            })?;
            if file.is_dir() {
                continue;
            }

            let name = file.name().to_string();
            let locator = EntryLocator {
                data_start: file.data_start(),
                compressed_size: file.compressed_size(),
                size: file.size(),
                method: file.compression(),
                encrypted,
            };
            drop(file);

            folded.insert(name.to_ascii_lowercase(), name.clone());
            entries.insert(name, locator);
        }

        limits.check_entries(entries.iter().map(|(name, loc)| (name.as_str(), loc.size)))?;

        debug!(
            "indexed ZIP container: {} entries, {} bytes",
            entries.len(),
            data.len()
        );

        Ok(Self {
            data,
            entries,
            folded,
        })
    }

    /// エントリ数
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// エントリがないか
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// すべてのエントリ名
    pub fn entry_names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(|s| s.as_str())
    }

    /// 名前でエントリを検索（完全一致、次に大文字・小文字を無視）
    fn locate(&self, name: &str) -> Option<(&str, &EntryLocator)> {
        let name = name.trim_start_matches('/');
        if let Some((key, loc)) = self.entries.get_key_value(name) {
            return Some((key.as_str(), loc));
        }
        let actual = self.folded.get(&name.to_ascii_lowercase())?;
        self.entries
            .get_key_value(actual.as_str())
            .map(|(key, loc)| (key.as_str(), loc))
    }
}

impl EntrySource for ZipContainer {
    type Reader = EntryReader;

    fn contains(&self, name: &str) -> bool {
        self.locate(name).is_some()
    }

    fn open_entry(&self, name: &str) -> Result<EntryReader, XlError> {
        let (actual, loc) = self
            .locate(name)
            .ok_or_else(|| FormatError::CorruptIndex(format!("missing entry '{}'", name)))?;

        if loc.encrypted {
            return Err(FormatError::Encrypted(actual.to_string()).into());
        }

        let start = usize::try_from(loc.data_start).unwrap_or(usize::MAX).min(self.data.len());
        let end = start
            .saturating_add(usize::try_from(loc.compressed_size).unwrap_or(usize::MAX))
            .min(self.data.len());
        let raw = SharedSlice {
            data: Arc::clone(&self.data),
            pos: start,
            end,
        };

        // 展開後サイズを宣言値で打ち切る（ZIP bomb対策）
        let inner = match loc.method {
            CompressionMethod::Stored => EntryInner::Stored(raw.take(loc.size)),
            CompressionMethod::Deflated => {
                EntryInner::Deflated(DeflateDecoder::new(raw).take(loc.size))
            }
            other => {
                return Err(FormatError::UnsupportedCompression {
                    entry: actual.to_string(),
                    method: format!("{:?}", other),
                }
                .into())
            }
        };

        Ok(EntryReader { inner })
    }
}

/// 共有バッファ上の範囲を読み込むリーダー
#[derive(Debug)]
struct SharedSlice {
    data: Arc<[u8]>,
    pos: usize,
    end: usize,
}

impl Read for SharedSlice {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = &self.data[self.pos..self.end];
        let n = remaining.len().min(buf.len());
        buf[..n].copy_from_slice(&remaining[..n]);
        self.pos += n;
        Ok(n)
    }
}

/// 1つのエントリを先頭から読み込むリーダー
///
/// 他のリーダーと状態を共有しないため、同じエントリを複数同時に読み込めます。
pub struct EntryReader {
    inner: EntryInner,
}

enum EntryInner {
    Stored(io::Take<SharedSlice>),
    Deflated(io::Take<DeflateDecoder<SharedSlice>>),
}

impl Read for EntryReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match &mut self.inner {
            EntryInner::Stored(r) => r.read(buf),
            EntryInner::Deflated(r) => r.read(buf),
        }
    }
}

impl std::fmt::Debug for EntryReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self.inner {
            EntryInner::Stored(_) => "stored",
            EntryInner::Deflated(_) => "deflated",
        };
        f.debug_struct("EntryReader").field("method", &kind).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::{FileOptions, ZipWriter};

    fn build_zip(entries: &[(&str, &[u8], CompressionMethod)]) -> Vec<u8> {
        let mut data = Vec::new();
        {
            let mut zip = ZipWriter::new(Cursor::new(&mut data));
            for (name, body, method) in entries {
                let options = FileOptions::default().compression_method(*method);
                zip.start_file(*name, options).unwrap();
                zip.write_all(body).unwrap();
            }
            zip.finish().unwrap();
        }
        data
    }

    fn read_all(container: &ZipContainer, name: &str) -> Vec<u8> {
        let mut out = Vec::new();
        container
            .open_entry(name)
            .unwrap()
            .read_to_end(&mut out)
            .unwrap();
        out
    }

    #[test]
    fn test_rejects_non_zip_input() {
        let result = ZipContainer::new(Arc::from(&b"not a zip"[..]), &SecurityLimits::default());
        assert!(matches!(
            result,
            Err(XlError::Format(FormatError::NotAContainer))
        ));

        let result = ZipContainer::new(Arc::from(&b""[..]), &SecurityLimits::default());
        assert!(matches!(
            result,
            Err(XlError::Format(FormatError::NotAContainer))
        ));
    }

    #[test]
    fn test_rejects_truncated_zip() {
        let data = build_zip(&[("a.xml", b"hello", CompressionMethod::Stored)]);
        let truncated = &data[..data.len() / 2];
        let result = ZipContainer::new(Arc::from(truncated), &SecurityLimits::default());
        assert!(matches!(
            result,
            Err(XlError::Format(FormatError::NotAContainer))
        ));
    }

    #[test]
    fn test_open_stored_and_deflated_entries() {
        let body = b"<root>".repeat(500);
        let data = build_zip(&[
            ("xl/a.xml", &body, CompressionMethod::Stored),
            ("xl/b.xml", &body, CompressionMethod::Deflated),
        ]);
        let container = ZipContainer::new(Arc::from(data), &SecurityLimits::default()).unwrap();

        assert_eq!(container.len(), 2);
        assert_eq!(read_all(&container, "xl/a.xml"), body);
        assert_eq!(read_all(&container, "xl/b.xml"), body);
    }

    #[test]
    fn test_independent_read_positions() {
        let data = build_zip(&[("s.xml", b"0123456789", CompressionMethod::Deflated)]);
        let container = ZipContainer::new(Arc::from(data), &SecurityLimits::default()).unwrap();

        let mut first = container.open_entry("s.xml").unwrap();
        let mut second = container.open_entry("s.xml").unwrap();

        let mut buf = [0u8; 4];
        first.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"0123");

        // 2つ目のリーダーは1つ目の位置の影響を受けない
        second.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"0123");
        first.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"4567");
    }

    #[test]
    fn test_case_insensitive_lookup() {
        let data = build_zip(&[("xl/SharedStrings.xml", b"x", CompressionMethod::Stored)]);
        let container = ZipContainer::new(Arc::from(data), &SecurityLimits::default()).unwrap();

        assert!(container.contains("xl/sharedStrings.xml"));
        assert!(container.contains("/xl/SharedStrings.xml"));
        assert!(!container.contains("xl/styles.xml"));
        assert!(matches!(
            container.open_entry("xl/styles.xml"),
            Err(XlError::Format(FormatError::CorruptIndex(_)))
        ));
    }

    #[test]
    fn test_too_many_files() {
        let entries: Vec<(String, &[u8])> = (0..5)
            .map(|i| (format!("f{}.xml", i), &b"x"[..]))
            .collect();
        let borrowed: Vec<(&str, &[u8], CompressionMethod)> = entries
            .iter()
            .map(|(n, b)| (n.as_str(), *b, CompressionMethod::Stored))
            .collect();
        let data = build_zip(&borrowed);

        let limits = SecurityLimits {
            max_file_count: 4,
            ..SecurityLimits::default()
        };
        let result = ZipContainer::new(Arc::from(data), &limits);
        assert!(matches!(result, Err(XlError::SecurityViolation(_))));
    }
}
