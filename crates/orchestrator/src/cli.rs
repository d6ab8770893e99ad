/// 命令行参数

use clap::error::ErrorKind;
use clap::{Parser, Subcommand};
use common::xapi::VerifyMode;

use crate::config::Config;
use crate::lifecycle::{DirectoryCleanup, Lookup, SelectionPolicy, TeardownStrategy};

/// XenAPI 客户机编排工具
#[derive(Parser, Debug)]
#[command(name = "xapi")]
#[command(about = "XenAPI guest lifecycle orchestrator")]
#[command(version)]
pub struct Args {
    /// XAPI 主机地址，如 https://xen01.lan
    #[arg(long, global = true)]
    pub host: Option<String>,

    #[arg(long, global = true)]
    pub xapi_username: Option<String>,

    #[arg(long, global = true)]
    pub xapi_password: Option<String>,

    /// 客户机所在的域名
    #[arg(long, global = true)]
    pub domain: Option<String>,

    /// 校验服务端证书
    #[arg(long, global = true)]
    pub xapi_ssl_verify: bool,

    /// 关闭彩色日志
    #[arg(long, global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// 删除客户机及其磁盘
    GuestDelete {
        /// 客户机名称（配合 --uuid 时为 UUID）
        name: String,

        #[arg(short = 'U', long)]
        uuid: bool,

        /// 保留目录服务中的客户端记录
        #[arg(short = 'C', long)]
        keep_client: bool,

        /// 保留目录服务中的节点记录
        #[arg(short = 'N', long)]
        keep_node: bool,

        /// 同名客户机全部删除
        #[arg(long)]
        all: bool,

        #[arg(long, default_value = "guest-first", value_parser = parse_strategy)]
        strategy: TeardownStrategy,
    },

    /// 把已有 VDI 挂到客户机上
    VdiAttach {
        vm_name: String,

        /// VDI 名称（配合 --uuid 时为 UUID）
        vdi: String,

        #[arg(short = 'U', long)]
        uuid: bool,

        /// 同名 VDI 全部挂载
        #[arg(long)]
        all: bool,
    },
}

/// 参数解析失败时的退出码；帮助与版本信息返回 None
pub fn parse_failure_code(err: &clap::Error) -> Option<u8> {
    match err.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => None,
        _ => Some(1),
    }
}

fn parse_strategy(value: &str) -> Result<TeardownStrategy, String> {
    value.parse().map_err(|e: common::Error| e.to_string())
}

impl Args {
    /// 命令行参数覆盖环境配置
    pub fn apply(&self, cfg: &mut Config) {
        if let Some(host) = &self.host {
            cfg.xapi_host = Some(host.clone());
        }
        if let Some(username) = &self.xapi_username {
            cfg.xapi_username = username.clone();
        }
        if let Some(password) = &self.xapi_password {
            cfg.xapi_password = Some(password.clone());
        }
        if let Some(domain) = &self.domain {
            cfg.domain = Some(domain.clone());
        }
        if self.xapi_ssl_verify {
            cfg.verify_mode = VerifyMode::VerifyPeer;
        }
    }
}

impl Command {
    pub fn lookup(&self) -> Lookup {
        match self {
            Command::GuestDelete { name, uuid, .. } => Lookup::new(name.clone(), *uuid),
            Command::VdiAttach { vdi, uuid, .. } => Lookup::new(vdi.clone(), *uuid),
        }
    }

    pub fn selection(&self) -> SelectionPolicy {
        let all = match self {
            Command::GuestDelete { all, .. } | Command::VdiAttach { all, .. } => *all,
        };
        if all {
            SelectionPolicy::All
        } else {
            SelectionPolicy::Single
        }
    }

    pub fn directory_cleanup(&self) -> DirectoryCleanup {
        match self {
            Command::GuestDelete { keep_client, keep_node, .. } => DirectoryCleanup {
                keep_client: *keep_client,
                keep_node: *keep_node,
            },
            Command::VdiAttach { .. } => DirectoryCleanup::default(),
        }
    }
}
