/// XenAPI 传输层
/// 
/// 定义统一的调用接口，提供 HTTP JSON-RPC 实现与进程内路由实现

use super::{RpcError, RpcErrorCode, RpcRequest, RpcResponse, RpcRouter};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// TLS 证书校验模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyMode {
    /// 不校验（XenServer 默认自签名证书）
    VerifyNone,
    /// 校验对端证书
    VerifyPeer,
}

/// XenAPI 传输 Trait
#[async_trait]
pub trait XapiTransport: Send + Sync + 'static {
    /// 发起一次调用并返回结果
    async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value, RpcError>;

    /// 远端地址
    fn endpoint(&self) -> &str;
}

/// 基于 HTTP JSON-RPC 的传输
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpTransport {
    /// 创建 HTTP 传输
    pub fn new(host: &str, verify: VerifyMode, timeout: Duration) -> Result<Self, RpcError> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(verify == VerifyMode::VerifyNone)
            .timeout(timeout)
            .build()
            .map_err(|e| RpcError::connection_failed(format!("无法创建 HTTP 客户端: {}", e)))?;

        Ok(Self {
            client,
            endpoint: Self::endpoint_for(host),
        })
    }

    /// 由主机地址推导 JSON-RPC 端点
    pub fn endpoint_for(host: &str) -> String {
        let host = host.trim().trim_end_matches('/');
        let base = if host.starts_with("http://") || host.starts_with("https://") {
            host.to_string()
        } else {
            format!("https://{}", host)
        };
        format!("{}/jsonrpc", base)
    }
}

#[async_trait]
impl XapiTransport for HttpTransport {
    async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value, RpcError> {
        let req = RpcRequest::new(method, params);
        debug!("➡️ XAPI 调用: method={}, id={}", req.method, req.id);

        let resp = self.client
            .post(&self.endpoint)
            .json(&req)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(RpcError::new(
                RpcErrorCode::HttpStatus,
                format!("HTTP {}: {}", status.as_u16(), body),
            ));
        }

        let body: RpcResponse = resp.json().await?;
        body.into_result()
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// 基于进程内路由器的传输
pub struct RouterTransport {
    router: RpcRouter,
    endpoint: String,
}

impl RouterTransport {
    pub fn new(router: RpcRouter) -> Self {
        Self {
            router,
            endpoint: "local://router".to_string(),
        }
    }
}

#[async_trait]
impl XapiTransport for RouterTransport {
    async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value, RpcError> {
        let req = RpcRequest::new(method, params);
        self.router.handle_request(req).await.into_result()
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }
}
