//! Security Module
//!
//! セキュリティ対策を実装するモジュール。
//! ZIP bomb攻撃、パストラバーサル攻撃への対策として、
//! ワークブックを開く時点でアーカイブ全体の制限をチェックします。

use crate::error::XlError;

/// セキュリティ制限
///
/// ファイル処理時のセキュリティ制限を定義します。
/// `ReaderBuilder::with_limits()`で変更できます。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityLimits {
    /// 展開後の合計最大サイズ（バイト）
    /// デフォルト: 4GB
    pub max_decompressed_size: u64,
    /// ZIPアーカイブ内の最大ファイル数
    /// デフォルト: 10000
    pub max_file_count: usize,
    /// 単一エントリの展開後の最大サイズ（バイト）
    /// デフォルト: 2GB
    pub max_file_size: u64,
    /// 入力ファイルの最大サイズ（バイト）
    /// デフォルト: 2GB
    pub max_input_file_size: u64,
}

impl Default for SecurityLimits {
    fn default() -> Self {
        Self {
            max_decompressed_size: 4_294_967_296, // 4GB
            max_file_count: 10_000,
            max_file_size: 2_147_483_648,       // 2GB
            max_input_file_size: 2_147_483_648, // 2GB
        }
    }
}

impl SecurityLimits {
    /// 入力サイズをチェック
    pub(crate) fn check_input_size(&self, len: u64) -> Result<(), XlError> {
        if len > self.max_input_file_size {
            return Err(XlError::SecurityViolation(format!(
                "Input file size exceeds maximum: {} bytes (max: {} bytes)",
                len, self.max_input_file_size
            )));
        }
        Ok(())
    }

    /// アーカイブ内のエントリをチェック
    ///
    /// # 引数
    ///
    /// * `entries` - (エントリ名, 展開後サイズ) のイテレータ
    ///
    /// # 戻り値
    ///
    /// * `Ok(())` - すべての制限を満たす場合
    /// * `Err(XlError::SecurityViolation)` - いずれかの制限に違反した場合
    pub(crate) fn check_entries<'a, I>(&self, entries: I) -> Result<(), XlError>
    where
        I: IntoIterator<Item = (&'a str, u64)>,
    {
        let mut count = 0usize;
        let mut total_decompressed_size = 0u64;

        for (name, size) in entries {
            count += 1;
            if count > self.max_file_count {
                return Err(XlError::SecurityViolation(format!(
                    "ZIP archive contains too many files (max: {})",
                    self.max_file_count
                )));
            }

            validate_zip_path(name)
                .map_err(|e| XlError::SecurityViolation(format!("Invalid ZIP path: {}", e)))?;

            if size > self.max_file_size {
                return Err(XlError::SecurityViolation(format!(
                    "File '{}' exceeds maximum size: {} bytes (max: {} bytes)",
                    name, size, self.max_file_size
                )));
            }

            total_decompressed_size = total_decompressed_size.checked_add(size).ok_or_else(|| {
                XlError::SecurityViolation(
                    "Total decompressed size calculation overflow".to_string(),
                )
            })?;

            if total_decompressed_size > self.max_decompressed_size {
                return Err(XlError::SecurityViolation(format!(
                    "Total decompressed size exceeds maximum: {} bytes (max: {} bytes)",
                    total_decompressed_size, self.max_decompressed_size
                )));
            }
        }

        Ok(())
    }
}

/// ファイルパスの検証
///
/// パストラバーサル攻撃を防ぐため、ファイルパスを検証します。
///
/// # 戻り値
///
/// * `Ok(())` - パスが安全な場合
/// * `Err(String)` - パスが危険な場合（`..`や絶対パスを含む）
pub(crate) fn validate_zip_path(path: &str) -> Result<(), String> {
    if path.is_empty() {
        return Err("Empty path is not allowed".to_string());
    }

    // 絶対パスを拒否（Unix形式の`/`、Windows形式の`C:`など）
    let bytes = path.as_bytes();
    if path.starts_with('/') || (bytes.len() >= 2 && bytes[1] == b':') {
        return Err(format!("Absolute path is not allowed: {}", path));
    }

    // `..`セグメントを拒否（ディレクトリトラバーサル攻撃）
    if path.split('/').any(|segment| segment == "..") {
        return Err(format!("Path traversal detected: {}", path));
    }

    if path.contains('\\') {
        return Err(format!("Backslash in path is not allowed: {}", path));
    }

    Ok(())
}
