//! 生成文件存储

use super::{short_id, StorageError};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};

static SAFE_FILENAME: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9._-]+$").ok());

/// 下载文件名只允许 `[A-Za-z0-9._-]`，且不能以 `.` 开头
pub fn is_safe_filename(name: &str) -> bool {
    !name.starts_with('.')
        && SAFE_FILENAME
            .as_ref()
            .is_some_and(|re| re.is_match(name))
}

pub struct OutputStore {
    base_dir: PathBuf,
}

impl OutputStore {
    pub fn with_base_dir(base_dir: PathBuf) -> Result<Self, StorageError> {
        std::fs::create_dir_all(&base_dir)?;
        Ok(Self { base_dir })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// 保存生成文件，返回 `{uuid8}.{ext}` 文件名
    pub async fn save(&self, ext: &str, content: &[u8]) -> Result<String, StorageError> {
        let filename = format!("{}.{}", short_id(8), ext);
        if !is_safe_filename(&filename) {
            return Err(StorageError::InvalidName(filename));
        }
        tokio::fs::write(self.base_dir.join(&filename), content).await?;
        tracing::info!("[RELAY] 生成文件已保存: {} ({} bytes)", filename, content.len());
        Ok(filename)
    }

    /// 解析下载路径，校验文件名并确认文件存在
    pub fn resolve(&self, filename: &str) -> Result<PathBuf, StorageError> {
        if !is_safe_filename(filename) {
            return Err(StorageError::InvalidName(filename.to_string()));
        }
        let path = self.base_dir.join(filename);
        if !path.is_file() {
            return Err(StorageError::NotFound(filename.to_string()));
        }
        Ok(path)
    }

    pub async fn read(&self, filename: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.resolve(filename)?;
        Ok(tokio::fs::read(path).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_store() -> (OutputStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = OutputStore::with_base_dir(temp_dir.path().join("outputs")).unwrap();
        (store, temp_dir)
    }

    #[test]
    fn test_is_safe_filename() {
        assert!(is_safe_filename("3f2a9c1d.docx"));
        assert!(is_safe_filename("report_v2-final.pdf"));
        assert!(!is_safe_filename(".env"));
        assert!(!is_safe_filename(".."));
        assert!(!is_safe_filename("../secret.pdf"));
        assert!(!is_safe_filename("a b.pdf"));
        assert!(!is_safe_filename(""));
    }

    #[tokio::test]
    async fn test_save_and_read() {
        let (store, _temp) = create_test_store();
        let filename = store.save("pdf", b"%PDF").await.unwrap();

        assert_eq!(filename.len(), 12);
        assert!(filename.ends_with(".pdf"));
        assert_eq!(store.read(&filename).await.unwrap(), b"%PDF");
    }

    #[tokio::test]
    async fn test_read_missing() {
        let (store, _temp) = create_test_store();
        assert!(matches!(
            store.read("deadbeef.docx").await,
            Err(StorageError::NotFound(_))
        ));
        assert!(matches!(
            store.resolve("../x.docx"),
            Err(StorageError::InvalidName(_))
        ));
    }
}
