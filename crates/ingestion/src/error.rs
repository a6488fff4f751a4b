//! Ingestion 错误类型

use contracts::{FormatError, QueueError};
use thiserror::Error;

/// Ingestion 错误
#[derive(Debug, Error)]
pub enum IngestionError {
    /// 内容审核拒绝
    #[error("content rejected: {reason}")]
    Rejected {
        /// 拒绝原因
        reason: String,
    },

    /// 排版服务失败
    #[error("formatting failed: {0}")]
    Format(#[from] FormatError),

    /// 入队失败 (校验 / 锁定 / 存储)
    #[error(transparent)]
    Queue(#[from] QueueError),
}

impl IngestionError {
    /// 是否因 store 锁定而被拒绝
    pub fn is_locked(&self) -> bool {
        matches!(self, Self::Queue(QueueError::Locked { .. }))
    }
}

/// Ingestion Result 类型别名
pub type Result<T> = std::result::Result<T, IngestionError>;
