use std::net::SocketAddr;
use std::time::Duration;

use adaptor_core::{
    config::AppConfig,
    logging::{init_logging, LogLevel},
};
use anyhow::{Context, Result};
use clap::{Arg, ArgAction, Command};
use tokio::signal;
use tracing::{error, info, warn};

mod app;
mod shutdown;

use app::{select_engine, Application};
use shutdown::ShutdownManager;

#[tokio::main]
async fn main() -> Result<()> {
    let matches = Command::new("cloud-adaptor")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Kubernetes集群生命周期管理服务")
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("日志级别，覆盖 LOG_LEVEL 环境变量")
                .value_parser(["trace", "debug", "info", "warn", "error"]),
        )
        .arg(
            Arg::new("print-config")
                .long("print-config")
                .help("打印生效的配置后退出")
                .action(ArgAction::SetTrue),
        )
        .get_matches();

    let mut config = AppConfig::load().context("加载配置失败")?;
    if let Some(level) = matches.get_one::<String>("log-level") {
        config.log.level = level.parse::<LogLevel>()?;
    }

    if matches.get_flag("print-config") {
        println!("{}", config.to_toml()?);
        return Ok(());
    }

    init_logging(&config.log)?;
    info!("启动集群适配服务");
    info!(
        "数据库: {}, 状态目录: {}",
        config.database.redacted_url(),
        config.config_dir
    );

    if let Some(listen) = &config.metrics_listen {
        init_metrics(listen)?;
    }

    let engine = select_engine(&config, None)?;
    let app = Application::new(config, engine).await?;

    let shutdown_manager = ShutdownManager::new();
    let shutdown_rx = shutdown_manager.subscribe().await;
    let app_handle = tokio::spawn(async move {
        if let Err(e) = app.run(shutdown_rx).await {
            error!("应用运行失败: {e}");
        }
    });

    wait_for_shutdown_signal().await;
    info!("收到关闭信号，开始优雅关闭...");
    shutdown_manager.shutdown().await;

    match tokio::time::timeout(Duration::from_secs(30), app_handle).await {
        Ok(Ok(())) => info!("应用已优雅关闭"),
        Ok(Err(e)) => error!("应用关闭时发生错误: {e}"),
        Err(_) => warn!("应用关闭超时，强制退出"),
    }

    info!("集群适配服务已退出");
    Ok(())
}

/// 启动Prometheus指标导出
fn init_metrics(listen: &str) -> Result<()> {
    let addr: SocketAddr = listen
        .parse()
        .with_context(|| format!("无效的指标监听地址: {listen}"))?;
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("Failed to install Prometheus exporter: {}", e))?;
    info!("Prometheus指标导出已启动: {}", addr);
    Ok(())
}

/// 等待关闭信号
async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("安装Ctrl+C信号处理器失败: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("安装SIGTERM信号处理器失败: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("收到Ctrl+C信号");
        },
        _ = terminate => {
            info!("收到SIGTERM信号");
        },
    }
}
