/// XenAPI RPC 错误定义

use serde::{Deserialize, Serialize};
use std::fmt;

/// RPC 错误码
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RpcErrorCode {
    // 通用错误
    InvalidRequest,
    MethodUnknown,
    InvalidParams,
    InternalError,
    Timeout,
    ConnectionFailed,
    HttpStatus,
    SerializationError,

    // XenAPI 业务错误
    SessionAuthenticationFailed,
    SessionInvalid,
    HandleInvalid,
    UuidInvalid,
    VmBadPowerState,
    OperationNotAllowed,
    VdiInUse,
    /// 未单独建模的远端错误，原始错误名保留在 message 中
    Remote,
}

impl RpcErrorCode {
    /// 转换为字符串码
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidRequest => "INVALID_REQUEST",
            Self::MethodUnknown => "MESSAGE_METHOD_UNKNOWN",
            Self::InvalidParams => "MESSAGE_PARAMETER_COUNT_MISMATCH",
            Self::InternalError => "INTERNAL_ERROR",
            Self::Timeout => "TIMEOUT",
            Self::ConnectionFailed => "CONNECTION_FAILED",
            Self::HttpStatus => "HTTP_STATUS",
            Self::SerializationError => "SERIALIZATION_ERROR",

            Self::SessionAuthenticationFailed => "SESSION_AUTHENTICATION_FAILED",
            Self::SessionInvalid => "SESSION_INVALID",
            Self::HandleInvalid => "HANDLE_INVALID",
            Self::UuidInvalid => "UUID_INVALID",
            Self::VmBadPowerState => "VM_BAD_POWER_STATE",
            Self::OperationNotAllowed => "OPERATION_NOT_ALLOWED",
            Self::VdiInUse => "VDI_IN_USE",
            Self::Remote => "REMOTE_ERROR",
        }
    }

    /// 由 XenAPI 错误名解析错误码
    pub fn from_xapi_name(name: &str) -> Self {
        match name {
            "MESSAGE_METHOD_UNKNOWN" => Self::MethodUnknown,
            "MESSAGE_PARAMETER_COUNT_MISMATCH" => Self::InvalidParams,
            "INTERNAL_ERROR" => Self::InternalError,
            "SESSION_AUTHENTICATION_FAILED" => Self::SessionAuthenticationFailed,
            "SESSION_INVALID" => Self::SessionInvalid,
            "HANDLE_INVALID" => Self::HandleInvalid,
            "UUID_INVALID" => Self::UuidInvalid,
            "VM_BAD_POWER_STATE" => Self::VmBadPowerState,
            "OPERATION_NOT_ALLOWED" => Self::OperationNotAllowed,
            "VDI_IN_USE" => Self::VdiInUse,
            _ => Self::Remote,
        }
    }
}

impl fmt::Display for RpcErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// RPC 错误
#[derive(Debug, Clone)]
pub struct RpcError {
    pub code: RpcErrorCode,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl RpcError {
    /// 创建新的 RPC 错误
    pub fn new(code: RpcErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    /// 创建带详情的 RPC 错误
    pub fn with_details(
        code: RpcErrorCode,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            code,
            message: message.into(),
            details: Some(details),
        }
    }

    /// 方法不存在错误
    pub fn method_unknown(method: impl Into<String>) -> Self {
        let method = method.into();
        Self::with_details(
            RpcErrorCode::MethodUnknown,
            format!("方法不存在: {}", method),
            serde_json::json!([method]),
        )
    }

    /// 句柄无效（对象不存在）
    pub fn handle_invalid(class: &str, reference: impl Into<String>) -> Self {
        let reference = reference.into();
        Self::with_details(
            RpcErrorCode::HandleInvalid,
            format!("句柄无效: {} {}", class, reference),
            serde_json::json!([class, reference]),
        )
    }

    /// 超时错误
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(RpcErrorCode::Timeout, message)
    }

    /// 连接失败错误
    pub fn connection_failed(message: impl Into<String>) -> Self {
        Self::new(RpcErrorCode::ConnectionFailed, message)
    }

    /// 序列化错误
    pub fn serialization_error(err: impl fmt::Display) -> Self {
        Self::new(
            RpcErrorCode::SerializationError,
            format!("序列化错误: {}", err),
        )
    }

    /// 远端对象是否不存在（句柄或 UUID 无效）
    pub fn is_missing_object(&self) -> bool {
        matches!(self.code, RpcErrorCode::HandleInvalid | RpcErrorCode::UuidInvalid)
    }
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for RpcError {}

impl From<serde_json::Error> for RpcError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization_error(err)
    }
}

impl From<reqwest::Error> for RpcError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::timeout(format!("请求超时: {}", err))
        } else if err.is_decode() {
            Self::serialization_error(err)
        } else {
            Self::connection_failed(format!("请求失败: {}", err))
        }
    }
}
