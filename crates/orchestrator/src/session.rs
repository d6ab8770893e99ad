/// XAPI 会话
/// 
/// 持有到控制面的已认证通道，所有组件都通过它发起调用

use common::models::constants;
use common::xapi::{HttpTransport, OpaqueRef, RpcErrorCode, VerifyMode, XapiTransport};
use common::{Error, Result};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::Config;

/// 已认证的 XAPI 会话
pub struct Session {
    transport: Arc<dyn XapiTransport>,
    session_ref: Option<OpaqueRef>,
}

impl Session {
    /// 建立到主机的通道（尚未认证）
    pub fn connect(host: Option<&str>, verify: VerifyMode, timeout: Duration) -> Result<Self> {
        let host = host
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .ok_or_else(|| Error::Config("必须通过 --host 提供 XAPI 主机地址".to_string()))?;

        let transport = HttpTransport::new(host, verify, timeout)?;
        info!("🔗 XAPI 端点: {} (verify={:?})", transport.endpoint(), verify);

        Ok(Self::with_transport(Arc::new(transport)))
    }

    /// 使用指定传输创建会话
    pub fn with_transport(transport: Arc<dyn XapiTransport>) -> Self {
        Self {
            transport,
            session_ref: None,
        }
    }

    /// 按配置建立并认证会话
    pub async fn from_config(cfg: &Config) -> Result<Self> {
        let mut session = Self::connect(
            cfg.xapi_host.as_deref(),
            cfg.verify_mode,
            cfg.request_timeout(),
        )?;

        let password = cfg
            .xapi_password
            .as_deref()
            .ok_or_else(|| Error::Config(format!("未提供用户 {} 的密码", cfg.xapi_username)))?;

        session.authenticate(&cfg.xapi_username, password).await?;
        Ok(session)
    }

    /// 使用用户名密码登录
    pub async fn authenticate(&mut self, username: &str, password: &str) -> Result<()> {
        let result = self.transport
            .call(
                "session.login_with_password",
                vec![
                    json!(username),
                    json!(password),
                    json!(constants::API_VERSION),
                    json!(constants::ORIGINATOR),
                ],
            )
            .await
            .map_err(|e| match e.code {
                RpcErrorCode::SessionAuthenticationFailed => {
                    Error::Authentication(format!("用户 {} 认证失败: {}", username, e.message))
                }
                _ => Error::Rpc(e),
            })?;

        let session_ref: OpaqueRef = serde_json::from_value(result)?;
        info!("✅ 登录成功: user={}", username);
        self.session_ref = Some(session_ref);
        Ok(())
    }

    /// 是否已认证
    pub fn is_authenticated(&self) -> bool {
        self.session_ref.is_some()
    }

    /// 远端地址
    pub fn endpoint(&self) -> &str {
        self.transport.endpoint()
    }

    fn session_ref(&self) -> Result<&OpaqueRef> {
        self.session_ref
            .as_ref()
            .ok_or_else(|| Error::Authentication("会话尚未认证".to_string()))
    }

    /// 同步调用，会话引用自动放在首位参数
    pub async fn call<T: DeserializeOwned>(&self, method: &str, args: Vec<Value>) -> Result<T> {
        let mut params = Vec::with_capacity(args.len() + 1);
        params.push(json!(self.session_ref()?));
        params.extend(args);

        debug!("XAPI 调用: {}", method);
        let result = self.transport.call(method, params).await?;
        Ok(serde_json::from_value(result)?)
    }

    /// 异步调用，返回任务引用
    pub async fn call_async(&self, method: &str, args: Vec<Value>) -> Result<OpaqueRef> {
        let task: OpaqueRef = self.call(&format!("Async.{}", method), args).await?;
        debug!("已提交异步任务: method={}, task={}", method, task);
        Ok(task)
    }

    /// 按 name_label 查找对象
    pub async fn get_by_name_label(&self, class: &str, label: &str) -> Result<Vec<OpaqueRef>> {
        self.call(&format!("{}.get_by_name_label", class), vec![json!(label)]).await
    }

    /// 按 UUID 查找对象，不存在时返回 None
    pub async fn get_by_uuid(&self, class: &str, uuid: &str) -> Result<Option<OpaqueRef>> {
        match self.call(&format!("{}.get_by_uuid", class), vec![json!(uuid)]).await {
            Ok(reference) => Ok(Some(reference)),
            Err(Error::Rpc(e)) if e.is_missing_object() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// 获取对象完整记录
    pub async fn get_record<T: DeserializeOwned>(&self, class: &str, reference: &OpaqueRef) -> Result<T> {
        self.call(&format!("{}.get_record", class), vec![json!(reference)]).await
    }

    /// 获取对象单个字段，如 `("VM", "power_state")` 对应 `VM.get_power_state`
    pub async fn get_field<T: DeserializeOwned>(
        &self,
        class: &str,
        field: &str,
        reference: &OpaqueRef,
    ) -> Result<T> {
        self.call(&format!("{}.get_{}", class, field), vec![json!(reference)]).await
    }
}
