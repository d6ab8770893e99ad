/// XenAPI 通信模块
/// 
/// 基于 HTTP JSON-RPC 的 XenAPI 调用层：消息封装、错误码、记录类型、传输与本地路由

pub mod message;
pub mod error;
pub mod types;
pub mod client;
pub mod router;

pub use message::{RpcRequest, RpcResponse, RpcErrorInfo};
pub use error::{RpcError, RpcErrorCode};
pub use client::{HttpTransport, RouterTransport, VerifyMode, XapiTransport};
pub use router::RpcRouter;
pub use types::*;
