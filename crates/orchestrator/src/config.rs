/// 配置管理

use common::models::constants;
use common::xapi::VerifyMode;
use std::time::Duration;

use crate::task::PollPolicy;
use crate::template::TemplateSelector;

/// 运行配置
///
/// 构建后不再修改，以引用方式传给各组件
#[derive(Debug, Clone)]
pub struct Config {
    pub xapi_host: Option<String>,
    pub xapi_username: String,
    pub xapi_password: Option<String>,
    pub verify_mode: VerifyMode,
    pub request_timeout: u64,
    pub domain: Option<String>,
    pub poll_interval_ms: u64,
    /// 0 表示不设上限
    pub task_timeout_secs: u64,
    pub destroy_failed_tasks: bool,
    pub template_pattern: String,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            xapi_host: None,
            xapi_username: constants::DEFAULT_USERNAME.to_string(),
            xapi_password: None,
            verify_mode: VerifyMode::VerifyNone,
            request_timeout: constants::DEFAULT_REQUEST_TIMEOUT,
            domain: None,
            poll_interval_ms: constants::DEFAULT_POLL_INTERVAL_MS,
            task_timeout_secs: 0,
            destroy_failed_tasks: false,
            template_pattern: constants::DEFAULT_TEMPLATE_PATTERN.to_string(),
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// 从环境变量加载配置
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// 从任意键值来源加载配置
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let verify_mode = match non_empty("XAPI_SSL_VERIFY") {
            Some(v) if parse_flag(&v)? => VerifyMode::VerifyPeer,
            _ => VerifyMode::VerifyNone,
        };

        let request_timeout = match non_empty("XAPI_REQUEST_TIMEOUT") {
            Some(v) => v.parse()?,
            None => defaults.request_timeout,
        };

        let poll_interval_ms = match non_empty("TASK_POLL_INTERVAL_MS") {
            Some(v) => v.parse()?,
            None => defaults.poll_interval_ms,
        };

        let task_timeout_secs = match non_empty("TASK_TIMEOUT_SECS") {
            Some(v) => v.parse()?,
            None => defaults.task_timeout_secs,
        };

        let destroy_failed_tasks = match non_empty("DESTROY_FAILED_TASKS") {
            Some(v) => parse_flag(&v)?,
            None => defaults.destroy_failed_tasks,
        };

        Ok(Self {
            xapi_host: non_empty("XAPI_HOST"),
            xapi_username: non_empty("XAPI_USERNAME").unwrap_or(defaults.xapi_username),
            xapi_password: non_empty("XAPI_PASSWORD"),
            verify_mode,
            request_timeout,
            domain: non_empty("XAPI_DOMAIN"),
            poll_interval_ms,
            task_timeout_secs,
            destroy_failed_tasks,
            template_pattern: non_empty("TEMPLATE_PATTERN").unwrap_or(defaults.template_pattern),
            log_level: non_empty("LOG_LEVEL").unwrap_or(defaults.log_level),
        })
    }

    /// 任务轮询策略
    pub fn poll_policy(&self) -> PollPolicy {
        let timeout = match self.task_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };
        PollPolicy::new(Duration::from_millis(self.poll_interval_ms), timeout)
    }

    /// 单次 HTTP 请求超时
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }

    /// 默认模板选择器
    pub fn default_template(&self) -> common::Result<TemplateSelector> {
        TemplateSelector::parse(&self.template_pattern)
    }
}

fn parse_flag(value: &str) -> anyhow::Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(anyhow::anyhow!("无法解析布尔值: {}", other)),
    }
}
