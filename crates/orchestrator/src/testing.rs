/// 测试用内存控制面
///
/// 基于 RpcRouter 模拟 XenAPI 的对象存储与任务状态机，并记录每次调用

use common::xapi::{OpaqueRef, RouterTransport, RpcError, RpcErrorCode, RpcRouter, XapiTransport};
use common::models::PowerState;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::session::Session;
use crate::task::PollPolicy;

pub const PASSWORD: &str = "secret";
const SESSION_REF: &str = "OpaqueRef:session-0";
const POOL_REF: &str = "OpaqueRef:pool-0";

/// 测试用的快速轮询策略
pub fn fast_poll() -> PollPolicy {
    PollPolicy::new(Duration::from_millis(1), Some(Duration::from_secs(5)))
}

enum Outcome {
    Success(String),
    Failure(Vec<String>),
    Cancelled,
}

struct FakeTask {
    remaining_polls: u32,
    hung: bool,
    outcome: Outcome,
}

#[derive(Default)]
struct FakeState {
    next_id: u64,
    objects: HashMap<String, Vec<(OpaqueRef, Value)>>,
    tasks: HashMap<OpaqueRef, FakeTask>,
    calls: Vec<(String, Vec<Value>)>,
    failures: HashMap<String, Vec<String>>,
    submit_failures: HashMap<String, u32>,
    pending_polls: u32,
    hang: bool,
    default_sr: Option<OpaqueRef>,
    guest_networks: HashMap<OpaqueRef, Value>,
}

impl FakeState {
    fn next_ref(&mut self, class: &str) -> OpaqueRef {
        self.next_id += 1;
        OpaqueRef::new(format!("OpaqueRef:{}-{}", class.to_lowercase(), self.next_id))
    }

    fn insert(&mut self, class: &str, mut record: Value) -> OpaqueRef {
        let reference = self.next_ref(class);
        if record.get("uuid").is_none() {
            record["uuid"] = json!(format!("uuid-{}-{}", class.to_lowercase(), self.next_id));
        }
        self.objects
            .entry(class.to_string())
            .or_default()
            .push((reference.clone(), record));
        reference
    }

    fn list(&self, class: &str) -> &[(OpaqueRef, Value)] {
        self.objects.get(class).map(|v| v.as_slice()).unwrap_or(&[])
    }

    fn find(&self, class: &str, reference: &OpaqueRef) -> Option<&Value> {
        self.list(class)
            .iter()
            .find(|(r, _)| r == reference)
            .map(|(_, record)| record)
    }

    fn find_mut(&mut self, class: &str, reference: &OpaqueRef) -> Option<&mut Value> {
        self.objects
            .get_mut(class)?
            .iter_mut()
            .find(|(r, _)| r == reference)
            .map(|(_, record)| record)
    }

    fn remove(&mut self, class: &str, reference: &OpaqueRef) -> bool {
        match self.objects.get_mut(class) {
            Some(list) => {
                let before = list.len();
                list.retain(|(r, _)| r != reference);
                list.len() != before
            }
            None => false,
        }
    }

    fn refs_where(&self, class: &str, field: &str, target: &OpaqueRef) -> Vec<OpaqueRef> {
        self.list(class)
            .iter()
            .filter(|(_, record)| record[field] == json!(target))
            .map(|(r, _)| r.clone())
            .collect()
    }

    /// 记录加上由关联关系推导出的引用列表
    fn record(&self, class: &str, reference: &OpaqueRef) -> Result<Value, RpcError> {
        let mut record = self
            .find(class, reference)
            .cloned()
            .ok_or_else(|| RpcError::handle_invalid(class, reference.as_str()))?;

        match class {
            "VM" => {
                record["VBDs"] = json!(self.refs_where("VBD", "VM", reference));
                record["VIFs"] = json!(self.refs_where("VIF", "VM", reference));
            }
            "VDI" => {
                record["VBDs"] = json!(self.refs_where("VBD", "VDI", reference));
            }
            _ => {}
        }
        Ok(record)
    }

    fn spawn_task(&mut self, outcome: Outcome) -> OpaqueRef {
        let task = self.next_ref("task");
        self.tasks.insert(task.clone(), FakeTask {
            remaining_polls: self.pending_polls,
            hung: self.hang,
            outcome,
        });
        task
    }

    fn power_state(&self, vm: &OpaqueRef) -> Result<PowerState, RpcError> {
        let record = self.record("VM", vm)?;
        Ok(serde_json::from_value(record["power_state"].clone())?)
    }

    fn set_power_state(&mut self, vm: &OpaqueRef, state: PowerState) {
        if let Some(record) = self.find_mut("VM", vm) {
            record["power_state"] = json!(state);
        }
    }

    /// 执行异步方法的副作用，返回任务结果
    fn run_async(&mut self, method: &str, args: &[Value]) -> Result<Option<OpaqueRef>, Vec<String>> {
        if let Some(info) = self.failures.remove(method) {
            return Err(info);
        }

        let target = || arg_ref(args, 0).map_err(|e| vec![e.message]);
        let missing = |class: &str, r: &OpaqueRef| {
            vec!["HANDLE_INVALID".to_string(), class.to_string(), r.to_string()]
        };

        match method {
            "Async.VDI.create" => {
                let mut record = args.first().cloned().unwrap_or(Value::Null);
                record["physical_utilisation"] = json!(0);
                Ok(Some(self.insert("VDI", record)))
            }
            "Async.VBD.create" => {
                let mut record = args.first().cloned().unwrap_or(Value::Null);
                record["device"] = record["userdevice"].clone();
                Ok(Some(self.insert("VBD", record)))
            }
            "Async.VIF.create" => {
                let record = args.first().cloned().unwrap_or(Value::Null);
                Ok(Some(self.insert("VIF", record)))
            }
            "Async.VBD.destroy" | "Async.VDI.destroy" => {
                let class = if method == "Async.VBD.destroy" { "VBD" } else { "VDI" };
                let r = target()?;
                if self.remove(class, &r) { Ok(None) } else { Err(missing(class, &r)) }
            }
            "Async.VM.destroy" => {
                let r = target()?;
                if !self.remove("VM", &r) {
                    return Err(missing("VM", &r));
                }
                for vbd in self.refs_where("VBD", "VM", &r) {
                    self.remove("VBD", &vbd);
                }
                for vif in self.refs_where("VIF", "VM", &r) {
                    self.remove("VIF", &vif);
                }
                Ok(None)
            }
            "Async.VM.hard_shutdown" | "Async.VM.clean_shutdown" => {
                let r = target()?;
                match self.power_state(&r) {
                    Ok(PowerState::Halted) => Err(vec![
                        "VM_BAD_POWER_STATE".to_string(),
                        r.to_string(),
                        "running".to_string(),
                        "halted".to_string(),
                    ]),
                    Ok(_) => {
                        self.set_power_state(&r, PowerState::Halted);
                        Ok(None)
                    }
                    Err(_) => Err(missing("VM", &r)),
                }
            }
            "Async.VM.start" | "Async.VM.start_on" => {
                let r = target()?;
                match self.power_state(&r) {
                    Ok(PowerState::Halted) => {
                        self.set_power_state(&r, PowerState::Running);
                        if method == "Async.VM.start_on" {
                            let host = args.get(1).cloned().unwrap_or(Value::Null);
                            if let Some(record) = self.find_mut("VM", &r) {
                                record["resident_on"] = host;
                            }
                        }
                        Ok(None)
                    }
                    Ok(_) => Err(vec!["VM_BAD_POWER_STATE".to_string(), r.to_string()]),
                    Err(_) => Err(missing("VM", &r)),
                }
            }
            other => Err(vec!["MESSAGE_METHOD_UNKNOWN".to_string(), other.to_string()]),
        }
    }
}

fn arg_ref(args: &[Value], index: usize) -> Result<OpaqueRef, RpcError> {
    serde_json::from_value(args.get(index).cloned().unwrap_or(Value::Null))
        .map_err(|_| RpcError::new(RpcErrorCode::InvalidParams, format!("参数 {} 不是引用", index)))
}

fn arg_str(args: &[Value], index: usize) -> Result<String, RpcError> {
    args.get(index)
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| RpcError::new(RpcErrorCode::InvalidParams, format!("参数 {} 不是字符串", index)))
}

const ASYNC_METHODS: &[&str] = &[
    "Async.VDI.create",
    "Async.VDI.destroy",
    "Async.VBD.create",
    "Async.VBD.destroy",
    "Async.VIF.create",
    "Async.VM.destroy",
    "Async.VM.hard_shutdown",
    "Async.VM.clean_shutdown",
    "Async.VM.start",
    "Async.VM.start_on",
];

const CLASS_FIELDS: &[(&str, &[&str])] = &[
    ("VM", &["name_label", "uuid", "power_state", "is_a_template", "VBDs", "VIFs", "guest_metrics"]),
    ("VDI", &["name_label", "uuid", "VBDs", "virtual_size"]),
    ("VBD", &["VM", "VDI", "device", "userdevice"]),
    ("VIF", &["VM", "network", "MAC"]),
    ("SR", &["name_label", "uuid"]),
    ("network", &["name_label", "uuid"]),
    ("host", &["name_label", "uuid"]),
];

/// 内存控制面
pub struct FakeXapi {
    state: Arc<Mutex<FakeState>>,
    router: RpcRouter,
}

impl FakeXapi {
    pub async fn new() -> Self {
        let fake = Self {
            state: Arc::new(Mutex::new(FakeState::default())),
            router: RpcRouter::new(),
        };
        fake.install().await;
        fake
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    async fn route<F>(&self, method: &str, handler: F)
    where
        F: Fn(&mut FakeState, &[Value]) -> Result<Value, RpcError> + Send + Sync + 'static,
    {
        let state = self.state.clone();
        let name = method.to_string();
        self.router.register(method, move |params| {
            let mut state = state
                .lock()
                .map_err(|_| RpcError::new(RpcErrorCode::InvalidRequest, "state poisoned"))?;
            if params.first() != Some(&json!(SESSION_REF)) {
                return Err(RpcError::new(RpcErrorCode::SessionInvalid, "SESSION_INVALID"));
            }
            let args = params[1..].to_vec();
            state.calls.push((name.clone(), args.clone()));
            handler(&mut state, &args)
        }).await;
    }

    async fn install(&self) {
        self.router.register("session.login_with_password", |params| {
            if params.get(1) == Some(&json!(PASSWORD)) {
                Ok(json!(SESSION_REF))
            } else {
                Err(RpcError::with_details(
                    RpcErrorCode::SessionAuthenticationFailed,
                    "SESSION_AUTHENTICATION_FAILED",
                    json!([params.first().cloned().unwrap_or(Value::Null), "Authentication failure"]),
                ))
            }
        }).await;

        for (class, fields) in CLASS_FIELDS {
            let class: &'static str = *class;

            self.route(&format!("{}.get_by_name_label", class), move |s, args| {
                let label = arg_str(args, 0)?;
                let found: Vec<OpaqueRef> = s
                    .list(class)
                    .iter()
                    .filter(|(_, record)| record["name_label"] == json!(label))
                    .map(|(r, _)| r.clone())
                    .collect();
                Ok(json!(found))
            }).await;

            self.route(&format!("{}.get_by_uuid", class), move |s, args| {
                let uuid = arg_str(args, 0)?;
                s.list(class)
                    .iter()
                    .find(|(_, record)| record["uuid"] == json!(uuid))
                    .map(|(r, _)| json!(r))
                    .ok_or_else(|| RpcError::with_details(
                        RpcErrorCode::UuidInvalid,
                        "UUID_INVALID",
                        json!([class, uuid]),
                    ))
            }).await;

            self.route(&format!("{}.get_record", class), move |s, args| {
                s.record(class, &arg_ref(args, 0)?)
            }).await;

            self.route(&format!("{}.get_all", class), move |s, _| {
                let refs: Vec<OpaqueRef> = s.list(class).iter().map(|(r, _)| r.clone()).collect();
                Ok(json!(refs))
            }).await;

            self.route(&format!("{}.get_all_records", class), move |s, _| {
                let mut records = Map::new();
                for (r, _) in s.list(class) {
                    records.insert(r.to_string(), s.record(class, r)?);
                }
                Ok(Value::Object(records))
            }).await;

            for field in fields.iter() {
                let field: &'static str = *field;
                self.route(&format!("{}.get_{}", class, field), move |s, args| {
                    let record = s.record(class, &arg_ref(args, 0)?)?;
                    Ok(record.get(field).cloned().unwrap_or(Value::Null))
                }).await;
            }
        }

        for method in ASYNC_METHODS {
            let method: &'static str = *method;
            self.route(method, move |s, args| {
                if let Some(remaining) = s.submit_failures.get_mut(method) {
                    if *remaining == 0 {
                        s.submit_failures.remove(method);
                        return Err(RpcError::new(RpcErrorCode::OperationNotAllowed, "OPERATION_NOT_ALLOWED"));
                    }
                    *remaining -= 1;
                }
                let outcome = match s.run_async(method, args) {
                    Ok(Some(r)) => Outcome::Success(format!("<value>{}</value>", r)),
                    Ok(None) => Outcome::Success(String::new()),
                    Err(info) => Outcome::Failure(info),
                };
                Ok(json!(s.spawn_task(outcome)))
            }).await;
        }

        self.route("VIF.destroy", |s, args| {
            let r = arg_ref(args, 0)?;
            if s.remove("VIF", &r) {
                Ok(Value::Null)
            } else {
                Err(RpcError::handle_invalid("VIF", r.as_str()))
            }
        }).await;

        self.route("VM_guest_metrics.get_networks", |s, args| {
            let r = arg_ref(args, 0)?;
            s.guest_networks
                .get(&r)
                .cloned()
                .ok_or_else(|| RpcError::handle_invalid("VM_guest_metrics", r.as_str()))
        }).await;

        self.route("pool.get_all", |_, _| Ok(json!([POOL_REF]))).await;

        self.route("pool.get_default_SR", |s, _| {
            Ok(json!(s.default_sr.clone().unwrap_or_else(OpaqueRef::null)))
        }).await;

        self.install_tasks().await;
    }

    async fn install_tasks(&self) {
        fn task_mut<'a>(s: &'a mut FakeState, args: &[Value]) -> Result<&'a mut FakeTask, RpcError> {
            let r = arg_ref(args, 0)?;
            s.tasks
                .get_mut(&r)
                .ok_or_else(|| RpcError::handle_invalid("task", r.as_str()))
        }

        self.route("task.get_status", |s, args| {
            let task = task_mut(s, args)?;
            if task.hung {
                return Ok(json!("pending"));
            }
            if task.remaining_polls > 0 {
                task.remaining_polls -= 1;
                return Ok(json!("pending"));
            }
            Ok(json!(match task.outcome {
                Outcome::Success(_) => "success",
                Outcome::Failure(_) => "failure",
                Outcome::Cancelled => "cancelled",
            }))
        }).await;

        self.route("task.get_progress", |s, args| {
            let task = task_mut(s, args)?;
            Ok(json!(if task.hung || task.remaining_polls > 0 { 0.5 } else { 1.0 }))
        }).await;

        self.route("task.get_result", |s, args| {
            Ok(match &task_mut(s, args)?.outcome {
                Outcome::Success(result) => json!(result),
                _ => json!(""),
            })
        }).await;

        self.route("task.get_error_info", |s, args| {
            Ok(match &task_mut(s, args)?.outcome {
                Outcome::Failure(info) => json!(info),
                Outcome::Cancelled => json!(["TASK_CANCELLED"]),
                Outcome::Success(_) => json!([]),
            })
        }).await;

        self.route("task.cancel", |s, args| {
            let task = task_mut(s, args)?;
            task.hung = false;
            task.remaining_polls = 0;
            task.outcome = Outcome::Cancelled;
            Ok(Value::Null)
        }).await;

        self.route("task.destroy", |s, args| {
            let r = arg_ref(args, 0)?;
            s.tasks
                .remove(&r)
                .map(|_| Value::Null)
                .ok_or_else(|| RpcError::handle_invalid("task", r.as_str()))
        }).await;
    }

    // ------------------------------------------------------------------
    // 连接
    // ------------------------------------------------------------------

    pub fn transport(&self) -> Arc<dyn XapiTransport> {
        Arc::new(RouterTransport::new(self.router.clone()))
    }

    /// 已登录的会话
    pub async fn session(&self) -> Session {
        let mut session = Session::with_transport(self.transport());
        session.authenticate("root", PASSWORD).await.unwrap();
        session
    }

    // ------------------------------------------------------------------
    // 场景构造
    // ------------------------------------------------------------------

    pub fn add_vm(&self, name: &str, power_state: PowerState, is_template: bool) -> OpaqueRef {
        self.lock().insert("VM", json!({
            "name_label": name,
            "power_state": power_state,
            "is_a_template": is_template,
            "guest_metrics": OpaqueRef::NULL,
        }))
    }

    pub fn add_sr(&self, name: &str) -> OpaqueRef {
        self.lock().insert("SR", json!({
            "name_label": name,
            "type": "lvm",
            "physical_size": "107374182400",
            "physical_utilisation": "0",
        }))
    }

    pub fn set_default_sr(&self, sr: &OpaqueRef) {
        self.lock().default_sr = Some(sr.clone());
    }

    pub fn add_vdi(&self, name: &str, sr: &OpaqueRef) -> OpaqueRef {
        self.lock().insert("VDI", json!({
            "name_label": name,
            "name_description": format!("{} disk", name),
            "type": "system",
            "virtual_size": "10737418240",
            "physical_utilisation": "1073741824",
            "SR": sr,
        }))
    }

    pub fn attach(&self, vm: &OpaqueRef, vdi: &OpaqueRef, userdevice: u32) -> OpaqueRef {
        self.lock().insert("VBD", json!({
            "VM": vm,
            "VDI": vdi,
            "device": userdevice.to_string(),
            "userdevice": userdevice.to_string(),
            "bootable": userdevice == 0,
            "mode": "RW",
            "type": "Disk",
        }))
    }

    /// 空光驱（VDI 为空引用）
    pub fn attach_empty_cd(&self, vm: &OpaqueRef, userdevice: u32) -> OpaqueRef {
        self.lock().insert("VBD", json!({
            "VM": vm,
            "VDI": OpaqueRef::NULL,
            "device": userdevice.to_string(),
            "userdevice": userdevice.to_string(),
            "bootable": false,
            "mode": "RO",
            "type": "CD",
        }))
    }

    pub fn add_network(&self, name: &str) -> OpaqueRef {
        self.lock().insert("network", json!({ "name_label": name }))
    }

    pub fn add_vif(&self, vm: &OpaqueRef, network: &OpaqueRef, device: u32) -> OpaqueRef {
        self.lock().insert("VIF", json!({
            "VM": vm,
            "network": network,
            "device": device.to_string(),
            "MAC": "02:00:00:00:00:01",
            "MTU": "1500",
        }))
    }

    pub fn add_host(&self, name: &str) -> OpaqueRef {
        self.lock().insert("host", json!({ "name_label": name }))
    }

    pub fn set_guest_ip(&self, vm: &OpaqueRef, ip: &str) {
        let mut state = self.lock();
        let metrics = state.next_ref("VM_guest_metrics");
        state.guest_networks.insert(metrics.clone(), json!({ "0/ip": ip }));
        if let Some(record) = state.find_mut("VM", vm) {
            record["guest_metrics"] = json!(metrics);
        }
    }

    /// 下一次调用该异步方法时任务以失败结束
    pub fn fail_next(&self, method: &str, error_info: &[&str]) {
        self.lock().failures.insert(
            method.to_string(),
            error_info.iter().map(|s| s.to_string()).collect(),
        );
    }

    /// 该异步方法再成功提交 `after` 次后，下一次提交直接被拒绝
    pub fn fail_submit_after(&self, method: &str, after: u32) {
        self.lock().submit_failures.insert(method.to_string(), after);
    }

    /// 新任务在进入终态前保持 pending 的轮询次数
    pub fn set_pending_polls(&self, polls: u32) {
        self.lock().pending_polls = polls;
    }

    /// 新任务永远停留在 pending
    pub fn hang_tasks(&self) {
        self.lock().hang = true;
    }

    // ------------------------------------------------------------------
    // 观察
    // ------------------------------------------------------------------

    /// 按顺序返回调用过的方法名（不含登录）
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.iter().map(|(m, _)| m.clone()).collect()
    }

    /// 某方法每次调用的参数（不含会话引用）
    pub fn requests(&self, method: &str) -> Vec<Vec<Value>> {
        self.lock()
            .calls
            .iter()
            .filter(|(m, _)| m == method)
            .map(|(_, args)| args.clone())
            .collect()
    }

    pub fn exists(&self, class: &str, reference: &OpaqueRef) -> bool {
        self.lock().find(class, reference).is_some()
    }

    pub fn record(&self, class: &str, reference: &OpaqueRef) -> Value {
        self.lock().record(class, reference).unwrap_or(Value::Null)
    }

    pub fn power_state(&self, vm: &OpaqueRef) -> PowerState {
        self.lock().power_state(vm).unwrap()
    }

    pub fn count(&self, class: &str) -> usize {
        self.lock().list(class).len()
    }

    pub fn task_exists(&self, task: &OpaqueRef) -> bool {
        self.lock().tasks.contains_key(task)
    }

    pub fn live_tasks(&self) -> usize {
        self.lock().tasks.len()
    }
}
