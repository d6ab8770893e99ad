/// 客户机生命周期编排
///
/// 组合会话、任务轮询、模板解析与资源供给，实现销毁、挂盘与启停流程

use common::models::PowerState;
use common::xapi::OpaqueRef;
use common::{Error, Result};
use serde_json::json;
use std::fmt;
use std::str::FromStr;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::directory::{DirectoryService, NoopDirectory};
use crate::provisioner::Provisioner;
use crate::session::Session;
use crate::task::{TaskOutcome, TaskPoller};
use crate::template::{TemplateMatch, TemplateResolver, TemplateSelector};

// ============================================================================
// 选择与策略
// ============================================================================

/// 销毁顺序
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TeardownStrategy {
    /// 先批量销毁磁盘与 VBD，再销毁虚拟机
    DisksFirst,
    /// 先销毁虚拟机，再逐个销毁事先记录的磁盘
    #[default]
    GuestFirst,
}

impl TeardownStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DisksFirst => "disks-first",
            Self::GuestFirst => "guest-first",
        }
    }
}

impl fmt::Display for TeardownStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TeardownStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "disks-first" => Ok(Self::DisksFirst),
            "guest-first" => Ok(Self::GuestFirst),
            other => Err(Error::InvalidArgument(format!("未知的销毁策略: {}", other))),
        }
    }
}

/// 对象定位方式
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    NameLabel(String),
    Uuid(String),
}

impl Lookup {
    pub fn new(value: impl Into<String>, by_uuid: bool) -> Self {
        if by_uuid {
            Lookup::Uuid(value.into())
        } else {
            Lookup::NameLabel(value.into())
        }
    }
}

impl fmt::Display for Lookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lookup::NameLabel(name) => write!(f, "{}", name),
            Lookup::Uuid(uuid) => write!(f, "uuid={}", uuid),
        }
    }
}

/// 多个对象命中时的选择
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SelectionPolicy {
    /// 必须唯一命中
    #[default]
    Single,
    All,
    Index(usize),
}

/// 删除客户机时保留的目录记录
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DirectoryCleanup {
    pub keep_client: bool,
    pub keep_node: bool,
}

// ============================================================================
// 结果
// ============================================================================

/// 失败的销毁步骤
#[derive(Debug, Clone, PartialEq)]
pub struct StepFailure {
    pub step: String,
    pub task: OpaqueRef,
    pub error_info: Vec<String>,
}

/// 单台虚拟机的销毁结果
#[derive(Debug, Clone, PartialEq)]
pub struct TeardownReport {
    pub vm: OpaqueRef,
    pub name_label: String,
    pub strategy: TeardownStrategy,
    pub shut_down: bool,
    pub destroyed_vbds: usize,
    pub destroyed_vdis: Vec<OpaqueRef>,
    pub vm_destroyed: bool,
    pub failures: Vec<StepFailure>,
}

impl TeardownReport {
    fn new(vm: &OpaqueRef, name_label: String, strategy: TeardownStrategy) -> Self {
        Self {
            vm: vm.clone(),
            name_label,
            strategy,
            shut_down: false,
            destroyed_vbds: 0,
            destroyed_vdis: Vec::new(),
            vm_destroyed: false,
            failures: Vec::new(),
        }
    }

    /// 所有步骤成功且虚拟机已销毁
    pub fn is_complete(&self) -> bool {
        self.vm_destroyed && self.failures.is_empty()
    }

    /// 记录步骤结果，返回是否成功
    fn absorb(&mut self, step: impl Into<String>, outcome: TaskOutcome) -> bool {
        match outcome {
            TaskOutcome::Succeeded { .. } => true,
            TaskOutcome::Failed { task, error_info, .. } => {
                let step = step.into();
                error!("❌ {} 失败: {:?}", step, error_info);
                self.failures.push(StepFailure { step, task, error_info });
                false
            }
        }
    }
}

/// 删除客户机的结果
#[derive(Debug, Clone, PartialEq)]
pub struct GuestDeletion {
    pub teardown: TeardownReport,
    /// None 表示按要求保留
    pub client_deleted: Option<bool>,
    pub node_deleted: Option<bool>,
}

// ============================================================================
// 编排器
// ============================================================================

/// 生命周期编排器
pub struct Orchestrator {
    session: Session,
    tasks: TaskPoller,
    templates: TemplateResolver,
    directory: Box<dyn DirectoryService>,
}

impl Orchestrator {
    pub fn new(session: Session, tasks: TaskPoller, templates: TemplateResolver) -> Self {
        Self {
            session,
            tasks,
            templates,
            directory: Box::new(NoopDirectory),
        }
    }

    /// 按配置组装各组件
    pub fn from_config(session: Session, cfg: &Config) -> Result<Self> {
        let tasks = TaskPoller::new(cfg.poll_policy()).destroy_failed_tasks(cfg.destroy_failed_tasks);
        let templates = TemplateResolver::new(cfg.default_template()?);
        Ok(Self::new(session, tasks, templates))
    }

    pub fn with_directory(mut self, directory: Box<dyn DirectoryService>) -> Self {
        self.directory = directory;
        self
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn tasks(&self) -> &TaskPoller {
        &self.tasks
    }

    pub fn provisioner(&self) -> Provisioner<'_> {
        Provisioner::new(&self.session, &self.tasks)
    }

    pub async fn find_template(&self, selector: Option<&TemplateSelector>) -> Result<Option<TemplateMatch>> {
        self.templates.find_template(&self.session, selector).await
    }

    // ------------------------------------------------------------------
    // 定位
    // ------------------------------------------------------------------

    async fn resolve(&self, class: &str, lookup: &Lookup, policy: SelectionPolicy) -> Result<Vec<OpaqueRef>> {
        let mut found = match lookup {
            Lookup::NameLabel(name) => self.session.get_by_name_label(class, name).await?,
            Lookup::Uuid(uuid) => self.session.get_by_uuid(class, uuid).await?.into_iter().collect(),
        };

        if found.is_empty() {
            return Err(Error::NotFound(format!("{} 不存在: {}", class, lookup)));
        }

        match policy {
            SelectionPolicy::All => Ok(found),
            SelectionPolicy::Single if found.len() == 1 => Ok(found),
            SelectionPolicy::Single => Err(Error::Ambiguous(format!(
                "{} 匹配到 {} 个 {}",
                lookup,
                found.len(),
                class
            ))),
            SelectionPolicy::Index(i) if i < found.len() => Ok(vec![found.swap_remove(i)]),
            SelectionPolicy::Index(i) => Err(Error::InvalidArgument(format!(
                "{} 只有 {} 个匹配，序号 {} 越界",
                lookup,
                found.len(),
                i
            ))),
        }
    }

    pub async fn resolve_vms(&self, lookup: &Lookup, policy: SelectionPolicy) -> Result<Vec<OpaqueRef>> {
        self.resolve("VM", lookup, policy).await
    }

    pub async fn resolve_vdis(&self, lookup: &Lookup, policy: SelectionPolicy) -> Result<Vec<OpaqueRef>> {
        self.resolve("VDI", lookup, policy).await
    }

    // ------------------------------------------------------------------
    // 销毁
    // ------------------------------------------------------------------

    /// 按指定顺序销毁虚拟机及其磁盘
    ///
    /// 任务失败记入报告，不重试也不回滚
    pub async fn teardown(&self, vm: &OpaqueRef, strategy: TeardownStrategy) -> Result<TeardownReport> {
        let name_label: String = self.session.get_field("VM", "name_label", vm).await?;
        let power_state: PowerState = self.session.get_field("VM", "power_state", vm).await?;
        let mut report = TeardownReport::new(vm, name_label, strategy);
        info!("🗑️ 销毁客户机 {} ({}), 策略={}", report.name_label, power_state, strategy);

        let vbds: Vec<OpaqueRef> = self.session.get_field("VM", "VBDs", vm).await?;
        let mut disks = Vec::with_capacity(vbds.len());
        for vbd in vbds {
            let vdi: OpaqueRef = self.session.get_field("VBD", "VDI", &vbd).await?;
            disks.push((vbd, vdi));
        }

        if power_state != PowerState::Halted {
            info!("关闭客户机 {}", report.name_label);
            let outcome = self.tasks.run(&self.session, "VM.hard_shutdown", vec![json!(vm)]).await?;
            report.shut_down = report.absorb("VM.hard_shutdown", outcome);
        }

        match strategy {
            TeardownStrategy::DisksFirst => {
                // 提交失败时停止下发，已下发的任务仍需等完
                let mut issued = Vec::new();
                let mut submit_err = None;
                'submit: for (vbd, vdi) in &disks {
                    let mut calls = Vec::with_capacity(2);
                    if !vdi.is_null() {
                        calls.push(("VDI.destroy", vdi.clone(), Some(vdi.clone())));
                    }
                    calls.push(("VBD.destroy", vbd.clone(), None));

                    for (method, target, destroyed_vdi) in calls {
                        match self.session.call_async(method, vec![json!(target)]).await {
                            Ok(task) => issued.push((format!("{} {}", method, target), task, destroyed_vdi)),
                            Err(e) => {
                                warn!("⚠️ 提交 {} {} 失败，等待已下发的 {} 个任务", method, target, issued.len());
                                submit_err = Some(e);
                                break 'submit;
                            }
                        }
                    }
                }

                let refs: Vec<OpaqueRef> = issued.iter().map(|(_, task, _)| task.clone()).collect();
                let outcomes = self.tasks.wait_all(&self.session, &refs).await;
                for ((step, task, vdi), outcome) in issued.into_iter().zip(outcomes) {
                    match outcome {
                        Ok(outcome) => {
                            if report.absorb(step, outcome) {
                                match vdi {
                                    Some(vdi) => report.destroyed_vdis.push(vdi),
                                    None => report.destroyed_vbds += 1,
                                }
                            }
                        }
                        Err(e) => report.failures.push(StepFailure {
                            step,
                            task,
                            error_info: vec![e.to_string()],
                        }),
                    }
                }

                if let Some(e) = submit_err {
                    return Err(e);
                }

                let outcome = self.tasks.run(&self.session, "VM.destroy", vec![json!(vm)]).await?;
                report.vm_destroyed = report.absorb("VM.destroy", outcome);
            }
            TeardownStrategy::GuestFirst => {
                let outcome = self.tasks.run(&self.session, "VM.destroy", vec![json!(vm)]).await?;
                report.vm_destroyed = report.absorb("VM.destroy", outcome);
                if report.vm_destroyed {
                    report.destroyed_vbds = disks.len();
                }

                for (_, vdi) in disks.iter().filter(|(_, vdi)| !vdi.is_null()) {
                    info!("销毁卷 {}", vdi);
                    let outcome = self.tasks.run(&self.session, "VDI.destroy", vec![json!(vdi)]).await?;
                    if report.absorb(format!("VDI.destroy {}", vdi), outcome) {
                        report.destroyed_vdis.push(vdi.clone());
                    }
                }
            }
        }

        if report.is_complete() {
            info!("✅ 客户机 {} 已销毁", report.name_label);
        } else {
            warn!("客户机 {} 销毁未完成: {} 个步骤失败", report.name_label, report.failures.len());
        }
        Ok(report)
    }

    /// 删除客户机并清理目录记录
    pub async fn delete_guest(
        &self,
        lookup: &Lookup,
        strategy: TeardownStrategy,
        policy: SelectionPolicy,
        cleanup: DirectoryCleanup,
    ) -> Result<Vec<GuestDeletion>> {
        let vms = self.resolve_vms(lookup, policy).await?;

        let mut deletions = Vec::with_capacity(vms.len());
        for vm in &vms {
            let teardown = self.teardown(vm, strategy).await?;
            let name = teardown.name_label.clone();

            let client_deleted = if cleanup.keep_client {
                None
            } else {
                let deleted = self.directory.delete_client(&name).await?;
                if !deleted {
                    info!("目录中没有客户端 {}，跳过", name);
                }
                Some(deleted)
            };

            let node_deleted = if cleanup.keep_node {
                None
            } else {
                let deleted = self.directory.delete_node(&name).await?;
                if !deleted {
                    info!("目录中没有节点 {}，跳过", name);
                }
                Some(deleted)
            };

            deletions.push(GuestDeletion {
                teardown,
                client_deleted,
                node_deleted,
            });
        }
        Ok(deletions)
    }

    // ------------------------------------------------------------------
    // 挂盘与启停
    // ------------------------------------------------------------------

    /// 把 VDI 挂到虚拟机的下一个空闲槽位，槽位 0 可引导
    pub async fn attach_vdi(
        &self,
        vm_name: &str,
        vdi: &Lookup,
        policy: SelectionPolicy,
    ) -> Result<Vec<OpaqueRef>> {
        let vm = self
            .resolve_vms(&Lookup::NameLabel(vm_name.to_string()), SelectionPolicy::Single)
            .await?
            .remove(0);
        let vdis = self.resolve_vdis(vdi, policy).await?;

        let existing: Vec<OpaqueRef> = self.session.get_field("VM", "VBDs", &vm).await?;
        let mut position = existing.len() as u32;

        let provisioner = self.provisioner();
        let mut created = Vec::with_capacity(vdis.len());
        for vdi in &vdis {
            created.push(provisioner.create_vbd(&vm, vdi, position, position == 0).await?);
            position += 1;
        }

        info!("✅ 已为 {} 挂载 {} 块磁盘", vm_name, created.len());
        Ok(created)
    }

    /// 启动虚拟机，可指定主机
    pub async fn start(&self, vm: &OpaqueRef, host: Option<&str>) -> Result<()> {
        let outcome = match host {
            Some(hostname) => {
                let host_ref = self
                    .provisioner()
                    .get_host_ref(hostname)
                    .await?
                    .ok_or_else(|| Error::NotFound(format!("主机不存在: {}", hostname)))?;
                info!("🚀 在 {} 上启动 {}", hostname, vm);
                self.tasks
                    .run(&self.session, "VM.start_on", vec![json!(vm), json!(host_ref), json!(false), json!(true)])
                    .await?
            }
            None => {
                info!("🚀 启动 {}", vm);
                self.tasks
                    .run(&self.session, "VM.start", vec![json!(vm), json!(false), json!(true)])
                    .await?
            }
        };
        outcome.into_unit()
    }

    /// 正常关机
    pub async fn stop(&self, vm: &OpaqueRef) -> Result<()> {
        info!("停止 {}", vm);
        self.tasks
            .run(&self.session, "VM.clean_shutdown", vec![json!(vm)])
            .await?
            .into_unit()
    }
}
