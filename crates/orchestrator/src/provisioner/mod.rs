/// 资源供给
///
/// 磁盘（VDI/VBD）、网卡（VIF）与主机清单相关的操作，
/// 读操作直接走会话，写操作统一经由任务轮询器

pub mod inventory;
pub mod network;
pub mod storage;

pub use storage::{AttachedVm, VdiSummary};

use crate::session::Session;
use crate::task::TaskPoller;

/// 资源供给器
///
/// 借用会话与任务轮询器，按需构造
pub struct Provisioner<'a> {
    session: &'a Session,
    tasks: &'a TaskPoller,
}

impl<'a> Provisioner<'a> {
    pub fn new(session: &'a Session, tasks: &'a TaskPoller) -> Self {
        Self { session, tasks }
    }

    pub fn session(&self) -> &'a Session {
        self.session
    }

    pub fn tasks(&self) -> &'a TaskPoller {
        self.tasks
    }
}
