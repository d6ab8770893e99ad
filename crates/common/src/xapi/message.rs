/// XenAPI JSON-RPC 消息定义

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::{RpcError, RpcErrorCode};

/// JSON-RPC 请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    /// 协议版本，固定为 "2.0"
    pub jsonrpc: String,

    /// 方法名，如 `VM.get_by_name_label` 或 `Async.VDI.create`
    pub method: String,

    /// 位置参数（会话引用由调用方放在首位）
    #[serde(default)]
    pub params: Vec<Value>,

    /// 请求唯一ID
    pub id: String,
}

/// JSON-RPC 响应
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jsonrpc: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcErrorInfo>,

    #[serde(default)]
    pub id: Value,
}

/// 远端返回的错误描述
///
/// XenAPI 将错误名放在 `message`，错误参数放在 `data`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcErrorInfo {
    #[serde(default)]
    pub code: i64,

    pub message: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcRequest {
    /// 创建请求消息
    pub fn new(method: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            method: method.into(),
            params,
            id: format!("req-{}", Uuid::new_v4()),
        }
    }

    /// 序列化为 JSON 字符串
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl RpcResponse {
    /// 创建成功响应
    pub fn success(id: impl Into<String>, result: Value) -> Self {
        Self {
            jsonrpc: Some("2.0".to_string()),
            result: Some(result),
            error: None,
            id: Value::String(id.into()),
        }
    }

    /// 创建错误响应
    pub fn error_response(id: impl Into<String>, err: &RpcError) -> Self {
        Self {
            jsonrpc: Some("2.0".to_string()),
            result: None,
            error: Some(RpcErrorInfo {
                code: 1,
                message: err.code.as_str().to_string(),
                data: err.details.clone(),
            }),
            id: Value::String(id.into()),
        }
    }

    /// 从 JSON 字符串反序列化
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// 判断是否是成功响应
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// 拆出结果；错误响应转换为 `RpcError`
    pub fn into_result(self) -> Result<Value, RpcError> {
        if let Some(info) = self.error {
            let code = RpcErrorCode::from_xapi_name(&info.message);
            let message = match &info.data {
                Some(Value::Array(params)) if !params.is_empty() => {
                    let params: Vec<String> = params
                        .iter()
                        .map(|p| match p {
                            Value::String(s) => s.clone(),
                            other => other.to_string(),
                        })
                        .collect();
                    format!("{}: {}", info.message, params.join(", "))
                }
                _ => info.message.clone(),
            };
            return Err(match info.data {
                Some(details) => RpcError::with_details(code, message, details),
                None => RpcError::new(code, message),
            });
        }

        Ok(self.result.unwrap_or(Value::Null))
    }
}
