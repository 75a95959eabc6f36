//! 本地文件存储
//!
//! ## 目录结构
//! ```text
//! ~/.featurecast/
//! ├── uploads/                # 上传文件的本地副本
//! │   └── {uuid8}_{filename}
//! └── outputs/                # Skills 生成的文件
//!     └── {uuid8}.{ext}
//! ```

pub mod outputs;
pub mod uploads;

use thiserror::Error;

pub use outputs::{is_safe_filename, OutputStore};
pub use uploads::{mime_type_for, UploadRecord, UploadStore};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("文件读写失败: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid filename: {0}")]
    InvalidName(String),
    #[error("File not found: {0}")]
    NotFound(String),
}

/// 取 UUID v4 的前 `len` 位十六进制字符
pub(crate) fn short_id(len: usize) -> String {
    let mut id = uuid::Uuid::new_v4().simple().to_string();
    id.truncate(len);
    id
}
