/// 存储资源：VDI 与 VBD

use common::models::{constants, PowerState, VbdMode, VbdType, VdiType};
use common::utils::{format_bytes, parse_size_to_bytes};
use common::xapi::{NewVbd, NewVdi, OpaqueRef, SrRecord, VbdRecord, VdiRecord};
use common::{Error, Result};
use serde_json::json;
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, info, warn};

use super::Provisioner;

/// 挂载了某个 VDI 的虚拟机
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachedVm {
    pub name_label: String,
    pub power_state: PowerState,
}

/// VDI 概要信息
#[derive(Debug, Clone)]
pub struct VdiSummary {
    pub reference: OpaqueRef,
    pub name_label: String,
    pub uuid: String,
    pub description: String,
    pub vdi_type: VdiType,
    pub virtual_size: u64,
    pub physical_utilisation: u64,
    pub attached: Vec<AttachedVm>,
}

impl fmt::Display for VdiSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "VDI Name: {}", self.name_label)?;
        writeln!(f, "  UUID: {}", self.uuid)?;
        writeln!(f, "  Description: {}", self.description)?;
        writeln!(f, "  Type: {}", self.vdi_type)?;
        writeln!(f, "  Size: {}", format_bytes(self.virtual_size))?;
        writeln!(f, "  Utilized: {}", format_bytes(self.physical_utilisation))?;
        if self.attached.is_empty() {
            writeln!(f, "  No VM Attached")?;
        }
        for vm in &self.attached {
            writeln!(f, "    VM name: {}", vm.name_label)?;
            writeln!(f, "    VM state: {}", vm.power_state)?;
        }
        Ok(())
    }
}

impl Provisioner<'_> {
    /// 创建系统盘，`size` 形如 `20g` / `512m` / `2t`
    pub async fn create_vdi(&self, name: &str, sr: &OpaqueRef, size: &str) -> Result<OpaqueRef> {
        let bytes = parse_size_to_bytes(size)?;
        let user = std::env::var("USER").unwrap_or_else(|_| "unknown".to_string());

        let record = NewVdi {
            name_label: name.to_string(),
            name_description: format!(
                "Root disk for {} created by {} with {}",
                name,
                user,
                constants::ORIGINATOR
            ),
            sr: sr.clone(),
            virtual_size: bytes.to_string(),
            vdi_type: VdiType::System,
            sharable: false,
            read_only: false,
            other_config: HashMap::new(),
        };

        info!("💾 创建 VDI: name={}, size={} ({} bytes), sr={}", name, size, bytes, sr);
        let vdi = self
            .tasks
            .run(self.session, "VDI.create", vec![json!(record)])
            .await?
            .into_ref()?;
        info!("✅ VDI 已创建: {}", vdi);
        Ok(vdi)
    }

    /// 在指定槽位把 VDI 挂到虚拟机上（读写模式）
    pub async fn create_vbd(
        &self,
        vm: &OpaqueRef,
        vdi: &OpaqueRef,
        position: u32,
        bootable: bool,
    ) -> Result<OpaqueRef> {
        let record = NewVbd {
            vm: vm.clone(),
            vdi: vdi.clone(),
            empty: false,
            other_config: HashMap::from([("owner".to_string(), String::new())]),
            userdevice: position.to_string(),
            bootable,
            mode: VbdMode::ReadWrite,
            qos_algorithm_type: String::new(),
            qos_algorithm_params: HashMap::new(),
            qos_supported_algorithms: Vec::new(),
            vbd_type: VbdType::Disk,
        };

        info!("🔗 创建 VBD: vm={}, vdi={}, userdevice={}, bootable={}", vm, vdi, position, bootable);
        self.tasks
            .run(self.session, "VBD.create", vec![json!(record)])
            .await?
            .into_ref()
    }

    /// 卸载 VDI 的一个 VBD
    ///
    /// 只有一个 VBD 时直接使用；多个时取第一个 VDI 字段等于目标的 VBD
    pub async fn detach_vdi(&self, vdi: &OpaqueRef) -> Result<()> {
        let vbds: Vec<OpaqueRef> = self.session.get_field("VDI", "VBDs", vdi).await?;
        debug!("VDI {} 的 VBD: {:?}", vdi, vbds);

        let target = match vbds.as_slice() {
            [] => None,
            [only] => Some(only.clone()),
            many => {
                let mut found = None;
                for vbd in many {
                    let record: VbdRecord = self.session.get_record("VBD", vbd).await?;
                    debug!("检查 VBD {}: device={}, VDI={}", vbd, record.device, record.vdi);
                    if &record.vdi == vdi {
                        found = Some(vbd.clone());
                        break;
                    }
                }
                found
            }
        };

        let vbd = target.ok_or_else(|| {
            Error::InvalidState(format!("没有找到 VDI {} 对应的 VBD", vdi))
        })?;

        info!("🔌 卸载 VBD: {}", vbd);
        self.tasks
            .run(self.session, "VBD.destroy", vec![json!(vbd)])
            .await?
            .into_unit()
    }

    /// 销毁 VDI，先卸载全部 VBD
    pub async fn destroy_vdi(&self, vdi: &OpaqueRef) -> Result<()> {
        let vbds: Vec<OpaqueRef> = self.session.get_field("VDI", "VBDs", vdi).await?;
        for _ in 0..vbds.len() {
            self.detach_vdi(vdi).await?;
        }

        let name: String = self.session.get_field("VDI", "name_label", vdi).await?;
        info!("🗑️ 销毁卷: {}", name);
        self.tasks
            .run(self.session, "VDI.destroy", vec![json!(vdi)])
            .await?
            .into_unit()
    }

    /// 汇总 VDI 信息以及挂载它的虚拟机
    pub async fn vdi_summary(&self, vdi: &OpaqueRef) -> Result<VdiSummary> {
        let record: VdiRecord = self.session.get_record("VDI", vdi).await?;

        let mut attached = Vec::with_capacity(record.vbds.len());
        for vbd in &record.vbds {
            let vm: OpaqueRef = self.session.get_field("VBD", "VM", vbd).await?;
            attached.push(AttachedVm {
                name_label: self.session.get_field("VM", "name_label", &vm).await?,
                power_state: self.session.get_field("VM", "power_state", &vm).await?,
            });
        }

        Ok(VdiSummary {
            reference: vdi.clone(),
            name_label: record.name_label,
            uuid: record.uuid,
            description: record.name_description,
            vdi_type: record.vdi_type,
            virtual_size: record.virtual_size,
            physical_utilisation: record.physical_utilisation,
            attached,
        })
    }

    /// 资源池的默认存储仓库
    pub async fn find_default_sr(&self) -> Result<Option<OpaqueRef>> {
        let pools: Vec<OpaqueRef> = self.session.call("pool.get_all", vec![]).await?;
        let Some(pool) = pools.first() else {
            warn!("没有可用的资源池");
            return Ok(None);
        };

        let sr: OpaqueRef = self.session.call("pool.get_default_SR", vec![json!(pool)]).await?;
        Ok((!sr.is_null()).then_some(sr))
    }

    /// 按名称查找存储仓库
    pub async fn get_sr_by_name(&self, name: &str) -> Result<Option<(OpaqueRef, SrRecord)>> {
        let Some(sr) = self.session.get_by_name_label("SR", name).await?.into_iter().next() else {
            warn!("存储仓库 {} 不存在", name);
            return Ok(None);
        };

        let record: SrRecord = self.session.get_record("SR", &sr).await?;
        Ok(Some((sr, record)))
    }
}
