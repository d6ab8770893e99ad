/// 主机与客户机信息查询

use common::xapi::OpaqueRef;
use common::Result;
use serde_json::json;
use std::collections::HashMap;

use super::Provisioner;

impl Provisioner<'_> {
    /// 按名称线性查找主机
    pub async fn get_host_ref(&self, hostname: &str) -> Result<Option<OpaqueRef>> {
        let hosts: Vec<OpaqueRef> = self.session.call("host.get_all", vec![]).await?;
        for host in hosts {
            let name: String = self.session.get_field("host", "name_label", &host).await?;
            if name == hostname {
                return Ok(Some(host));
            }
        }
        Ok(None)
    }

    /// 客户机上报的首个 IP，未安装工具时为 None
    pub async fn get_guest_ip(&self, vm: &OpaqueRef) -> Result<Option<String>> {
        let metrics: OpaqueRef = self.session.get_field("VM", "guest_metrics", vm).await?;
        if metrics.is_null() {
            return Ok(None);
        }

        let networks: HashMap<String, String> = self
            .session
            .call("VM_guest_metrics.get_networks", vec![json!(metrics)])
            .await?;
        Ok(networks.get("0/ip").cloned())
    }
}
