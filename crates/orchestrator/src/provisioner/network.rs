/// 网络资源：VIF

use common::models::constants;
use common::utils::generate_mac;
use common::xapi::{NewVif, OpaqueRef};
use common::Result;
use regex::Regex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::OnceLock;
use tracing::{debug, info, warn};

use super::Provisioner;

/// XenCenter 显示的 "Network N" 名称
fn display_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"Network (\d+)$").expect("静态正则表达式"))
}

/// "Network N" 对应的资源池网络名称
fn pool_wide_label(label: &str) -> Option<String> {
    display_name_pattern()
        .captures(label)
        .map(|caps| format!("Pool-wide network associated with eth{}", &caps[1]))
}

impl Provisioner<'_> {
    async fn find_network(&self, label: &str) -> Result<Option<OpaqueRef>> {
        Ok(self
            .session
            .get_by_name_label("network", label)
            .await?
            .into_iter()
            .next())
    }

    /// 按网络名称为虚拟机添加网卡，网络不存在时返回 None
    pub async fn add_vif_by_name(
        &self,
        vm: &OpaqueRef,
        device: u32,
        network_label: &str,
    ) -> Result<Option<OpaqueRef>> {
        debug!("查找网络: {}", network_label);

        let mut network = self.find_network(network_label).await?;
        if network.is_none() {
            if let Some(fallback) = pool_wide_label(network_label) {
                debug!("网络 {} 不存在，尝试 {}", network_label, fallback);
                network = self.find_network(&fallback).await?;
            }
        }

        let Some(network) = network else {
            warn!("网络 {} 不存在，跳过", network_label);
            return Ok(None);
        };

        let mac = generate_mac();
        info!("🔗 添加网卡: network={}, mac={}, device={}", network_label, mac, device);

        let record = NewVif {
            device: device.to_string(),
            network,
            vm: vm.clone(),
            mac,
            mtu: constants::DEFAULT_MTU.to_string(),
            other_config: HashMap::new(),
            qos_algorithm_type: String::new(),
            qos_algorithm_params: HashMap::new(),
        };

        let vif = self
            .tasks
            .run(self.session, "VIF.create", vec![json!(record)])
            .await?
            .into_ref()?;
        Ok(Some(vif))
    }

    /// 删除虚拟机上的全部网卡，返回删除数量
    pub async fn clear_vm_vifs(&self, vm: &OpaqueRef) -> Result<usize> {
        let vifs: Vec<OpaqueRef> = self.session.get_field("VM", "VIFs", vm).await?;
        for vif in &vifs {
            debug!("删除网卡: {}", vif);
            self.session.call::<Value>("VIF.destroy", vec![json!(vif)]).await?;
        }
        Ok(vifs.len())
    }
}
