/// 共享数据模型
/// 
/// 定义 XenAPI 中以字符串编码的枚举状态

use serde::{Deserialize, Serialize};
use std::fmt;

/// 虚拟机电源状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PowerState {
    Halted,
    Running,
    Suspended,
    Paused,
    #[serde(other)]
    Unknown,
}

impl PowerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Halted => "Halted",
            Self::Running => "Running",
            Self::Suspended => "Suspended",
            Self::Paused => "Paused",
            Self::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for PowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 任务状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Success,
    Failure,
    Cancelling,
    Cancelled,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Cancelling => "cancelling",
            Self::Cancelled => "cancelled",
        }
    }

    /// 是否已进入终态
    ///
    /// `cancelling` 也视为终态：它不再是 pending，轮询协议到此为止
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// VBD 访问模式
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum VbdMode {
    #[serde(rename = "RO")]
    ReadOnly,
    #[serde(rename = "RW")]
    ReadWrite,
}

/// VBD 设备类型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum VbdType {
    Disk,
    #[serde(rename = "CD")]
    Cd,
    Floppy,
}

/// VDI 类型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VdiType {
    System,
    User,
    Ephemeral,
    Suspend,
    Crashdump,
    #[serde(other)]
    Other,
}

impl VdiType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Ephemeral => "ephemeral",
            Self::Suspend => "suspend",
            Self::Crashdump => "crashdump",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for VdiType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 常量定义
pub mod constants {
    /// 默认任务轮询间隔（毫秒）
    pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

    /// 默认单次 HTTP 请求超时（秒）
    pub const DEFAULT_REQUEST_TIMEOUT: u64 = 10;

    /// 默认登录用户
    pub const DEFAULT_USERNAME: &str = "root";

    /// 默认模板匹配规则
    pub const DEFAULT_TEMPLATE_PATTERN: &str = r"/^CentOS 5.*\(64-bit\)/";

    /// 新建 VIF 的 MTU
    pub const DEFAULT_MTU: &str = "1500";

    /// XenAPI 协议版本（登录时上报）
    pub const API_VERSION: &str = "2.0";

    /// 登录时上报的客户端标识
    pub const ORIGINATOR: &str = "xapi-orchestrator";
}
