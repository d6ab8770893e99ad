/// 异步任务轮询
///
/// 控制面的长操作以任务形式返回，这里负责等待、取结果与清理

use common::models::{constants, TaskStatus};
use common::utils::extract_opaque_ref;
use common::xapi::OpaqueRef;
use common::{Error, Result};
use serde_json::{json, Value};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::session::Session;

/// 轮询策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    /// None 表示无限等待
    pub timeout: Option<Duration>,
}

impl PollPolicy {
    pub fn new(interval: Duration, timeout: Option<Duration>) -> Self {
        Self { interval, timeout }
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::new(Duration::from_millis(constants::DEFAULT_POLL_INTERVAL_MS), None)
    }
}

/// 任务终态的解析结果
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    Succeeded {
        result: Option<OpaqueRef>,
    },
    Failed {
        task: OpaqueRef,
        status: TaskStatus,
        error_info: Vec<String>,
    },
}

impl TaskOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, TaskOutcome::Succeeded { .. })
    }

    /// 取出新建对象的引用，失败或无结果时报错
    pub fn into_ref(self) -> Result<OpaqueRef> {
        match self {
            TaskOutcome::Succeeded { result: Some(reference) } => Ok(reference),
            TaskOutcome::Succeeded { result: None } => {
                Err(Error::Internal("任务成功但未返回对象引用".to_string()))
            }
            failed => failed.into_unit().map(|_| OpaqueRef::null()),
        }
    }

    pub fn into_unit(self) -> Result<()> {
        match self {
            TaskOutcome::Succeeded { .. } => Ok(()),
            TaskOutcome::Failed { task, status, error_info } => Err(Error::TaskFailed {
                task,
                status: status.to_string(),
                error_info,
            }),
        }
    }
}

/// 未清理的任务
#[derive(Debug, Clone, PartialEq)]
pub struct OutstandingTask {
    pub task: OpaqueRef,
    pub status: TaskStatus,
    pub error_info: Vec<String>,
}

/// 任务轮询器
///
/// 成功的任务立即销毁；失败或超时的任务进入待清理列表，
/// 除非开启了 destroy_failed_tasks
pub struct TaskPoller {
    policy: PollPolicy,
    cancel: CancellationToken,
    destroy_failed_tasks: bool,
    outstanding: Mutex<Vec<OutstandingTask>>,
}

impl TaskPoller {
    pub fn new(policy: PollPolicy) -> Self {
        Self {
            policy,
            cancel: CancellationToken::new(),
            destroy_failed_tasks: false,
            outstanding: Mutex::new(Vec::new()),
        }
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn destroy_failed_tasks(mut self, enabled: bool) -> Self {
        self.destroy_failed_tasks = enabled;
        self
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// 按默认策略等待任务进入终态
    pub async fn wait_on_task(&self, session: &Session, task: &OpaqueRef) -> Result<TaskStatus> {
        self.wait_on_task_with(session, task, self.policy).await
    }

    /// 按指定策略等待任务进入终态
    pub async fn wait_on_task_with(
        &self,
        session: &Session,
        task: &OpaqueRef,
        policy: PollPolicy,
    ) -> Result<TaskStatus> {
        let deadline = policy.timeout.map(|t| Instant::now() + t);

        loop {
            if self.cancel.is_cancelled() {
                return Err(self.abandon(session, task).await);
            }

            let status: TaskStatus = session.get_field("task", "status", task).await?;
            if status.is_terminal() {
                debug!("任务 {} 结束: {}", task, status);
                return Ok(status);
            }

            match session.get_field::<f64>("task", "progress", task).await {
                Ok(progress) => debug!("任务 {} 进度 {:.0}%", task, progress * 100.0),
                Err(e) => debug!("读取任务 {} 进度失败: {}", task, e),
            }

            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    warn!("⏱️ 任务 {} 等待超时，保留待清理", task);
                    self.record(OutstandingTask {
                        task: task.clone(),
                        status,
                        error_info: Vec::new(),
                    });
                    return Err(Error::Timeout(format!("任务 {} 在 {:?} 内未结束", task, policy.timeout)));
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(policy.interval) => {}
                _ = self.cancel.cancelled() => {
                    return Err(self.abandon(session, task).await);
                }
            }
        }
    }

    /// 放弃等待并请求远端取消，任务记录留待清理
    async fn abandon(&self, session: &Session, task: &OpaqueRef) -> Error {
        if let Err(e) = session.call::<Value>("task.cancel", vec![json!(task)]).await {
            warn!("取消任务 {} 失败: {}", task, e);
        }
        self.record(OutstandingTask {
            task: task.clone(),
            status: TaskStatus::Cancelling,
            error_info: Vec::new(),
        });
        Error::Cancelled(format!("等待任务 {} 时被取消", task))
    }

    /// 等待任务并解析结果
    pub async fn resolve_task_result(&self, session: &Session, task: &OpaqueRef) -> Result<TaskOutcome> {
        let status = self.wait_on_task(session, task).await?;

        if status == TaskStatus::Success {
            let raw: String = session.get_field("task", "result", task).await?;
            let result = extract_opaque_ref(&raw);
            self.destroy(session, task).await?;
            return Ok(TaskOutcome::Succeeded { result });
        }

        let error_info: Vec<String> = session.get_field("task", "error_info", task).await?;
        error!("❌ 任务 {} 失败: status={}, error_info={:?}", task, status, error_info);

        if self.destroy_failed_tasks {
            if let Err(e) = self.destroy(session, task).await {
                warn!("销毁失败任务 {} 出错: {}", task, e);
            }
        } else {
            self.record(OutstandingTask {
                task: task.clone(),
                status,
                error_info: error_info.clone(),
            });
        }

        Ok(TaskOutcome::Failed {
            task: task.clone(),
            status,
            error_info,
        })
    }

    /// 提交异步调用并等待结果
    pub async fn run(&self, session: &Session, method: &str, args: Vec<Value>) -> Result<TaskOutcome> {
        let task = session.call_async(method, args).await?;
        self.resolve_task_result(session, &task).await
    }

    /// 依次等待一组已提交的任务
    ///
    /// 单个任务出错不影响后续任务；未能观察到终态的任务进入待清理列表
    pub async fn wait_all(&self, session: &Session, tasks: &[OpaqueRef]) -> Vec<Result<TaskOutcome>> {
        let mut outcomes = Vec::with_capacity(tasks.len());
        for task in tasks {
            let outcome = self.resolve_task_result(session, task).await;
            if let Err(e) = &outcome {
                warn!("等待任务 {} 出错: {}", task, e);
                // 超时与取消路径已自行登记
                if !matches!(e, Error::Timeout(_) | Error::Cancelled(_)) {
                    self.record(OutstandingTask {
                        task: task.clone(),
                        status: TaskStatus::Pending,
                        error_info: vec![e.to_string()],
                    });
                }
            }
            outcomes.push(outcome);
        }
        outcomes
    }

    /// 当前未清理的任务
    pub fn outstanding_tasks(&self) -> Vec<OutstandingTask> {
        self.outstanding
            .lock()
            .map(|list| list.clone())
            .unwrap_or_default()
    }

    /// 销毁所有未清理的任务，返回成功销毁的数量
    pub async fn cleanup_outstanding(&self, session: &Session) -> Result<usize> {
        let pending = match self.outstanding.lock() {
            Ok(mut list) => std::mem::take(&mut *list),
            Err(_) => return Err(Error::Internal("任务列表锁已损坏".to_string())),
        };

        let mut destroyed = 0;
        for entry in pending {
            match self.destroy(session, &entry.task).await {
                Ok(()) => destroyed += 1,
                Err(e) => warn!("清理任务 {} 失败: {}", entry.task, e),
            }
        }

        if destroyed > 0 {
            info!("🧹 已清理 {} 个遗留任务", destroyed);
        }
        Ok(destroyed)
    }

    async fn destroy(&self, session: &Session, task: &OpaqueRef) -> Result<()> {
        session.call::<Value>("task.destroy", vec![json!(task)]).await?;
        Ok(())
    }

    fn record(&self, entry: OutstandingTask) {
        if let Ok(mut list) = self.outstanding.lock() {
            list.push(entry);
        }
    }
}
