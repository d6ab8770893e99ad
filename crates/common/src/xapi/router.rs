/// XenAPI 方法路由器
/// 
/// 在进程内按方法名分发 JSON-RPC 请求，供本地控制面模拟与联调使用

use super::{RpcError, RpcRequest, RpcResponse};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// RPC 方法处理器类型
pub type RpcHandler = Arc<
    dyn Fn(Vec<Value>) -> Result<Value, RpcError> + Send + Sync
>;

/// RPC 方法路由器
pub struct RpcRouter {
    handlers: Arc<RwLock<HashMap<String, RpcHandler>>>,
}

impl RpcRouter {
    /// 创建新的路由器
    pub fn new() -> Self {
        Self {
            handlers: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// 注册方法处理器
    pub async fn register<F>(&self, method: impl Into<String>, handler: F)
    where
        F: Fn(Vec<Value>) -> Result<Value, RpcError> + Send + Sync + 'static,
    {
        let mut handlers = self.handlers.write().await;
        handlers.insert(method.into(), Arc::new(handler));
    }

    /// 处理 RPC 请求
    pub async fn handle_request(&self, req: RpcRequest) -> RpcResponse {
        debug!("📨 [收到RPC请求] method={}, id={}", req.method, req.id);

        let handler = {
            let handlers = self.handlers.read().await;
            handlers.get(&req.method).cloned()
        };

        match handler {
            Some(handler) => match handler(req.params) {
                Ok(result) => RpcResponse::success(req.id, result),
                Err(err) => {
                    warn!("❌ [RPC处理失败] method={}, id={}, error={}", req.method, req.id, err);
                    RpcResponse::error_response(req.id, &err)
                }
            },
            None => RpcResponse::error_response(req.id, &RpcError::method_unknown(&req.method)),
        }
    }

    /// 获取已注册的方法列表
    pub async fn list_methods(&self) -> Vec<String> {
        let handlers = self.handlers.read().await;
        let mut methods: Vec<String> = handlers.keys().cloned().collect();
        methods.sort();
        methods
    }
}

impl Default for RpcRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for RpcRouter {
    fn clone(&self) -> Self {
        Self {
            handlers: self.handlers.clone(),
        }
    }
}
