/// XAPI Orchestrator - 公共库
/// 
/// 提供编排核心共享的类型、错误处理、工具函数以及 XenAPI 通信层

pub mod errors;
pub mod models;
pub mod utils;
pub mod xapi;

// 重新导出常用类型
pub use errors::{Error, Result};
pub use xapi::{OpaqueRef, RpcError, RpcErrorCode};
