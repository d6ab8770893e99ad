/// XenAPI 数据类型定义
/// 
/// 对应 XenAPI 中各类对象的记录结构，字段名与远端保持一致

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::models::{PowerState, VbdMode, VbdType, VdiType};

// ============================================================================
// 不透明引用
// ============================================================================

/// 控制面签发的不透明对象引用
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OpaqueRef(String);

impl OpaqueRef {
    /// 空引用
    pub const NULL: &'static str = "OpaqueRef:NULL";

    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    pub fn null() -> Self {
        Self(Self::NULL.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// 是否为空引用
    pub fn is_null(&self) -> bool {
        self.0.is_empty() || self.0 == Self::NULL
    }
}

impl fmt::Display for OpaqueRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OpaqueRef {
    fn from(reference: &str) -> Self {
        Self::new(reference)
    }
}

impl From<String> for OpaqueRef {
    fn from(reference: String) -> Self {
        Self(reference)
    }
}

/// XenAPI 中 int64 在不同编码下可能是数字也可能是字符串
fn lenient_u64<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(n) => Ok(n),
        Raw::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

// ============================================================================
// 已有对象记录
// ============================================================================

/// 虚拟机记录（`VM.get_record` / `VM.get_all_records`）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VmRecord {
    #[serde(default)]
    pub uuid: String,
    #[serde(default)]
    pub name_label: String,
    pub power_state: PowerState,
    #[serde(default)]
    pub is_a_template: bool,
    #[serde(rename = "VBDs", default)]
    pub vbds: Vec<OpaqueRef>,
    #[serde(rename = "VIFs", default)]
    pub vifs: Vec<OpaqueRef>,
}

/// 虚拟磁盘记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VdiRecord {
    #[serde(default)]
    pub uuid: String,
    #[serde(default)]
    pub name_label: String,
    #[serde(default)]
    pub name_description: String,
    #[serde(rename = "type")]
    pub vdi_type: VdiType,
    #[serde(deserialize_with = "lenient_u64", default)]
    pub virtual_size: u64,
    #[serde(deserialize_with = "lenient_u64", default)]
    pub physical_utilisation: u64,
    #[serde(rename = "SR")]
    pub sr: OpaqueRef,
    #[serde(rename = "VBDs", default)]
    pub vbds: Vec<OpaqueRef>,
}

/// 虚拟块设备记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VbdRecord {
    #[serde(default)]
    pub uuid: String,
    #[serde(rename = "VM")]
    pub vm: OpaqueRef,
    #[serde(rename = "VDI")]
    pub vdi: OpaqueRef,
    #[serde(default)]
    pub device: String,
    #[serde(default)]
    pub userdevice: String,
    #[serde(default)]
    pub bootable: bool,
    pub mode: VbdMode,
    #[serde(rename = "type")]
    pub vbd_type: VbdType,
}

/// 存储仓库记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SrRecord {
    #[serde(default)]
    pub uuid: String,
    #[serde(default)]
    pub name_label: String,
    #[serde(rename = "type", default)]
    pub sr_type: String,
    #[serde(deserialize_with = "lenient_u64", default)]
    pub physical_size: u64,
    #[serde(deserialize_with = "lenient_u64", default)]
    pub physical_utilisation: u64,
}

// ============================================================================
// 新建对象请求
// ============================================================================

/// `VDI.create` 请求记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewVdi {
    pub name_label: String,
    pub name_description: String,
    #[serde(rename = "SR")]
    pub sr: OpaqueRef,
    /// 字节数，按远端约定以字符串传递
    pub virtual_size: String,
    #[serde(rename = "type")]
    pub vdi_type: VdiType,
    pub sharable: bool,
    pub read_only: bool,
    #[serde(default)]
    pub other_config: HashMap<String, String>,
}

/// `VBD.create` 请求记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewVbd {
    #[serde(rename = "VM")]
    pub vm: OpaqueRef,
    #[serde(rename = "VDI")]
    pub vdi: OpaqueRef,
    pub empty: bool,
    #[serde(default)]
    pub other_config: HashMap<String, String>,
    pub userdevice: String,
    pub bootable: bool,
    pub mode: VbdMode,
    pub qos_algorithm_type: String,
    #[serde(default)]
    pub qos_algorithm_params: HashMap<String, String>,
    #[serde(default)]
    pub qos_supported_algorithms: Vec<String>,
    #[serde(rename = "type")]
    pub vbd_type: VbdType,
}

/// `VIF.create` 请求记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewVif {
    pub device: String,
    pub network: OpaqueRef,
    #[serde(rename = "VM")]
    pub vm: OpaqueRef,
    #[serde(rename = "MAC")]
    pub mac: String,
    #[serde(rename = "MTU")]
    pub mtu: String,
    #[serde(default)]
    pub other_config: HashMap<String, String>,
    pub qos_algorithm_type: String,
    #[serde(default)]
    pub qos_algorithm_params: HashMap<String, String>,
}
