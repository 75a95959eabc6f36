//! 上传文件索引
//!
//! 上传文件先保存本地副本，再由 Relay 推送到 Files API；
//! 返回的 file_id 以 12 位十六进制 upload key 登记在内存索引中。

use super::{short_id, StorageError};
use dashmap::DashMap;
use std::path::{Path, PathBuf};

/// 单个上传记录
#[derive(Debug, Clone, PartialEq)]
pub struct UploadRecord {
    pub upload_key: String,
    pub file_id: String,
    pub filename: String,
    pub local_path: PathBuf,
}

pub struct UploadStore {
    base_dir: PathBuf,
    records: DashMap<String, UploadRecord>,
}

impl UploadStore {
    pub fn with_base_dir(base_dir: PathBuf) -> Result<Self, StorageError> {
        std::fs::create_dir_all(&base_dir)?;
        Ok(Self {
            base_dir,
            records: DashMap::new(),
        })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// 保存本地副本：`{uuid8}_{filename}`
    pub async fn save_local(&self, filename: &str, content: &[u8]) -> Result<PathBuf, StorageError> {
        let name = Path::new(filename)
            .file_name()
            .and_then(|n| n.to_str())
            .filter(|n| !n.is_empty() && *n != "..")
            .ok_or_else(|| StorageError::InvalidName(filename.to_string()))?;
        let path = self.base_dir.join(format!("{}_{}", short_id(8), name));
        tokio::fs::write(&path, content).await?;
        tracing::debug!("[UPLOAD] 本地副本: {:?} ({} bytes)", path, content.len());
        Ok(path)
    }

    /// 登记已上传到 Files API 的文件，返回新记录
    pub fn register(&self, file_id: String, filename: String, local_path: PathBuf) -> UploadRecord {
        let record = UploadRecord {
            upload_key: short_id(12),
            file_id,
            filename,
            local_path,
        };
        self.records
            .insert(record.upload_key.clone(), record.clone());
        tracing::info!(
            "[UPLOAD] 登记 {} -> {} ({})",
            record.upload_key,
            record.file_id,
            record.filename
        );
        record
    }

    pub fn get(&self, upload_key: &str) -> Option<UploadRecord> {
        self.records.get(upload_key).map(|r| r.value().clone())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// 根据扩展名推断 MIME 类型
pub fn mime_type_for(filename: &str) -> &'static str {
    let ext = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    match ext.as_str() {
        "pdf" => "application/pdf",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "doc" => "application/msword",
        "txt" => "text/plain",
        "csv" => "text/csv",
        "md" => "text/markdown",
        "json" => "application/json",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "pptx" => "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_store() -> (UploadStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = UploadStore::with_base_dir(temp_dir.path().join("uploads")).unwrap();
        (store, temp_dir)
    }

    #[tokio::test]
    async fn test_save_local_prefixes_name() {
        let (store, _temp) = create_test_store();
        let path = store.save_local("report.pdf", b"%PDF-1.7").await.unwrap();

        let name = path.file_name().unwrap().to_str().unwrap();
        assert_eq!(name.len(), 8 + 1 + "report.pdf".len());
        assert!(name.ends_with("_report.pdf"));
        assert_eq!(std::fs::read(&path).unwrap(), b"%PDF-1.7");
    }

    #[tokio::test]
    async fn test_save_local_strips_directories() {
        let (store, _temp) = create_test_store();
        let path = store.save_local("../../etc/passwd", b"x").await.unwrap();
        assert_eq!(path.parent().unwrap(), store.base_dir());
        assert!(path.to_str().unwrap().ends_with("_passwd"));

        assert!(matches!(
            store.save_local("..", b"x").await,
            Err(StorageError::InvalidName(_))
        ));
    }

    #[test]
    fn test_register_and_get() {
        let (store, _temp) = create_test_store();
        let record = store.register(
            "file_011CNha8iCJcU1wXNR6q4V8w".to_string(),
            "notes.md".to_string(),
            PathBuf::from("/tmp/notes.md"),
        );

        assert_eq!(record.upload_key.len(), 12);
        assert!(record.upload_key.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(store.get(&record.upload_key), Some(record.clone()));
        assert!(store.get("000000000000").is_none());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_mime_type_for() {
        assert_eq!(mime_type_for("a.PDF"), "application/pdf");
        assert_eq!(mime_type_for("data.csv"), "text/csv");
        assert_eq!(
            mime_type_for("deck.pptx"),
            "application/vnd.openxmlformats-officedocument.presentationml.presentation"
        );
        assert_eq!(mime_type_for("archive.tar.gz"), "application/octet-stream");
        assert_eq!(mime_type_for("README"), "application/octet-stream");
    }
}
