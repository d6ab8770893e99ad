/// XAPI Orchestrator - 命令行入口
///
/// 解析参数、加载配置、建立会话后执行子命令

use clap::Parser;
use std::process::ExitCode;
use tracing::{error, info, warn};

use xapi_orchestrator::cli::{self, Args, Command};
use xapi_orchestrator::{Config, Orchestrator, Session};

fn init_tracing(level: &str, no_color: bool) {
    // RUST_LOG 优先，其次 LOG_LEVEL
    tracing_subscriber::fmt()
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .with_ansi(!no_color)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => match cli::parse_failure_code(&e) {
            None => e.exit(),
            Some(code) => {
                let _ = e.print();
                return ExitCode::from(code);
            }
        },
    };

    dotenvy::dotenv().ok();
    let loaded = Config::from_env();
    let level = loaded
        .as_ref()
        .map(|cfg| cfg.log_level.clone())
        .unwrap_or_else(|_| "info".to_string());
    init_tracing(&level, args.no_color);

    let result = match loaded {
        Ok(mut cfg) => {
            args.apply(&mut cfg);
            run(&args.command, &cfg).await
        }
        Err(e) => Err(e.context("加载配置失败")),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("❌ {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(command: &Command, cfg: &Config) -> anyhow::Result<()> {
    info!("🚀 启动 XAPI Orchestrator...");

    let session = Session::from_config(cfg).await?;
    let orchestrator = Orchestrator::from_config(session, cfg)?;
    info!("✅ 已连接 {}", orchestrator.session().endpoint());

    // Ctrl-C 时取消正在等待的任务
    let cancel = orchestrator.tasks().cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("收到中断信号，取消等待中的任务");
            cancel.cancel();
        }
    });

    let result = execute(command, &orchestrator).await;

    let outstanding = orchestrator.tasks().outstanding_tasks();
    if !outstanding.is_empty() {
        warn!("{} 个任务保留在控制面上", outstanding.len());
        for entry in &outstanding {
            warn!("  {} ({:?}) {:?}", entry.task, entry.status, entry.error_info);
        }
    }
    result
}

async fn execute(command: &Command, orchestrator: &Orchestrator) -> anyhow::Result<()> {
    match command {
        Command::GuestDelete { strategy, .. } => {
            let deletions = orchestrator
                .delete_guest(
                    &command.lookup(),
                    *strategy,
                    command.selection(),
                    command.directory_cleanup(),
                )
                .await?;

            let incomplete = deletions.iter().filter(|d| !d.teardown.is_complete()).count();
            if incomplete > 0 {
                anyhow::bail!("{} 台客户机未能完全销毁", incomplete);
            }
        }
        Command::VdiAttach { vm_name, .. } => {
            let vbds = orchestrator
                .attach_vdi(vm_name, &command.lookup(), command.selection())
                .await?;

            let provisioner = orchestrator.provisioner();
            for vbd in &vbds {
                let vdi = orchestrator.session().get_field("VBD", "VDI", vbd).await?;
                println!("{}", provisioner.vdi_summary(&vdi).await?);
            }
        }
    }
    Ok(())
}
