use thiserror::Error;

use crate::xapi::{OpaqueRef, RpcError};

/// 统一错误类型
#[derive(Error, Debug)]
pub enum Error {
    #[error("配置错误: {0}")]
    Config(String),

    #[error("认证错误: {0}")]
    Authentication(String),

    #[error("资源未找到: {0}")]
    NotFound(String),

    #[error("匹配到多个资源: {0}")]
    Ambiguous(String),

    #[error("无效状态: {0}")]
    InvalidState(String),

    #[error("无效参数: {0}")]
    InvalidArgument(String),

    #[error("任务失败: task={task}, status={status}, error={}", error_info.join(", "))]
    TaskFailed {
        task: OpaqueRef,
        status: String,
        error_info: Vec<String>,
    },

    #[error("等待超时: {0}")]
    Timeout(String),

    #[error("操作已取消: {0}")]
    Cancelled(String),

    #[error("RPC 错误: {0}")]
    Rpc(#[from] RpcError),

    #[error("序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("内部错误: {0}")]
    Internal(String),
}

impl Error {
    /// 是否为资源未找到类错误
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// 统一结果类型
pub type Result<T> = std::result::Result<T, Error>;
