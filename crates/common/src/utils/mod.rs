/// 工具函数集合

use rand::Rng;
use regex::Regex;
use std::sync::OnceLock;

use crate::xapi::OpaqueRef;
use crate::{Error, Result};

const KIB: u64 = 1024;
const MIB: u64 = KIB * 1024;
const GIB: u64 = MIB * 1024;
const TIB: u64 = GIB * 1024;

/// 格式化字节大小
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB", "PB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    format!("{:.2} {}", size, UNITS[unit_index])
}

/// 解析磁盘大小描述（如 `20g`、`512m`、`2t`）为字节数
///
/// 单位不区分大小写，缺省为 GB；小数部分向零截断
pub fn parse_size_to_bytes(input: &str) -> Result<u64> {
    let input = input.trim();
    let digits_end = input
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(input.len());

    if digits_end == 0 {
        return Err(Error::InvalidArgument(format!("无效的磁盘大小: {:?}", input)));
    }

    let count: u64 = input[..digits_end]
        .parse()
        .map_err(|e| Error::InvalidArgument(format!("无效的磁盘大小 {:?}: {}", input, e)))?;

    let mut unit = &input[digits_end..];
    if let Some(fraction) = unit.strip_prefix('.') {
        unit = fraction.trim_start_matches(|c: char| c.is_ascii_digit());
    }

    let multiplier = match unit.trim().to_ascii_lowercase().as_str() {
        "" | "g" | "gb" => GIB,
        "m" | "mb" => MIB,
        "t" | "tb" => TIB,
        other => {
            return Err(Error::InvalidArgument(format!(
                "不支持的磁盘大小单位: {:?}",
                other
            )));
        }
    };

    count
        .checked_mul(multiplier)
        .ok_or_else(|| Error::InvalidArgument(format!("磁盘大小溢出: {:?}", input)))
}

/// 生成随机 MAC 地址
///
/// 首字节置位本地管理位并清除组播位，其余五字节完全随机
pub fn generate_mac() -> String {
    let mut rng = rand::thread_rng();
    let first = (rng.gen_range(0u8..64) * 4) | 0x02;
    let mut mac = format!("{:02x}", first);
    for _ in 0..5 {
        mac.push_str(&format!(":{:02x}", rng.gen::<u8>()));
    }
    mac
}

/// 验证 MAC 地址格式
pub fn validate_mac_address(mac: &str) -> bool {
    let parts: Vec<&str> = mac.split(':').collect();
    if parts.len() != 6 {
        return false;
    }

    parts.iter().all(|part| {
        part.len() == 2 && part.chars().all(|c| c.is_ascii_hexdigit())
    })
}

fn opaque_ref_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"OpaqueRef:[^<]+").expect("静态正则表达式"))
}

/// 从任务结果中提取 OpaqueRef
///
/// 任务结果形如 `<value>OpaqueRef:...</value>`，也兼容直接返回裸引用的情况
pub fn extract_opaque_ref(payload: &str) -> Option<OpaqueRef> {
    opaque_ref_pattern()
        .find(payload)
        .map(|m| OpaqueRef::new(m.as_str().trim()))
}
