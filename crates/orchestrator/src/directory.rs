/// 目录服务边界
///
/// 删除客户机后同步清理配置管理服务中的节点与客户端记录

use async_trait::async_trait;
use common::Result;
use tracing::info;

/// 外部目录服务
#[async_trait]
pub trait DirectoryService: Send + Sync {
    /// 删除客户端记录，记录不存在时返回 false
    async fn delete_client(&self, name: &str) -> Result<bool>;

    /// 删除节点记录，记录不存在时返回 false
    async fn delete_node(&self, name: &str) -> Result<bool>;
}

/// 未接入目录服务时的占位实现
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopDirectory;

#[async_trait]
impl DirectoryService for NoopDirectory {
    async fn delete_client(&self, name: &str) -> Result<bool> {
        info!("未配置目录服务，跳过客户端 {}", name);
        Ok(false)
    }

    async fn delete_node(&self, name: &str) -> Result<bool> {
        info!("未配置目录服务，跳过节点 {}", name);
        Ok(false)
    }
}
