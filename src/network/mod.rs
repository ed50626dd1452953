//! 远端目录接口：小说、章节、译者、标签。

pub mod client;
pub mod models;
pub mod source;

use thiserror::Error;

pub use client::CatalogClient;
pub use models::PAGE_SIZE;
pub use source::CatalogSource;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("network error: {0}")]
    Transport(#[from] reqwest::Error),
    /// 非 2xx 响应；`message` 优先取服务端返回的 `detail`。
    #[error("{message} (http {status})")]
    Status { status: u16, message: String },
    #[error("unexpected response: {0}")]
    Decode(String),
    #[error("validation error: {0}")]
    Validation(String),
}

impl ApiError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            ApiError::Transport(err) => err.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }

    /// 编辑不属于自己的小说等情况。
    pub fn is_access_denied(&self) -> bool {
        matches!(self.status(), Some(401 | 403))
    }
}
