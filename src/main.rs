use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use xvirus_binding::engine::UpdateStatus;
use xvirus_binding::{EngineService, SdkEnv};

#[cfg(windows)]
const DEFAULT_TARGET_FILE: &str = "C:\\Windows\\System32\\notepad.exe";
#[cfg(not(windows))]
const DEFAULT_TARGET_FILE: &str = "/usr/bin/bash";

/// Xvirus 引擎调用示例：version -> load -> scan -> scanFolder -> checkUpdates -> unload
#[derive(Debug, Parser)]
#[command(name = "xvirus-example", version, about = "Exercise the Xvirus native engine binding")]
struct Args {
    /// 要扫描的文件
    file: Option<PathBuf>,

    /// 要递归扫描的文件夹
    folder: Option<PathBuf>,

    /// XvirusSDK 动态库路径（覆盖配置与环境变量）
    #[arg(long)]
    library: Option<PathBuf>,

    /// 引擎根目录
    #[arg(long)]
    base_folder: Option<PathBuf>,

    /// JSON 配置文件
    #[arg(long)]
    config: Option<PathBuf>,

    /// 强制从头加载病毒库
    #[arg(long)]
    force_load: bool,

    /// 检查病毒库更新
    #[arg(long)]
    check_updates: bool,

    /// 更新后重新加载病毒库
    #[arg(long, requires = "check_updates")]
    reload_after_update: bool,

    /// 打开引擎内部日志
    #[arg(long)]
    engine_logging: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "xvirus_binding=debug,xvirus_example=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    // 配置优先级：配置文件 < 环境变量 < 命令行
    let mut env = SdkEnv::from_env();
    if let Some(config) = &args.config {
        env.config_file = Some(config.clone());
    }
    let mut config = env.resolve_config()?;
    if let Some(library) = args.library {
        config.library_path = library;
    }
    if let Some(base) = args.base_folder {
        config.base_folder = Some(base);
    }
    if args.engine_logging {
        config.enable_logging = Some(true);
    }
    let threshold = config.malware_threshold;
    tracing::info!("Using engine library: {}", config.library_path.display());

    // 1. 加载动态库并解析全部符号
    let engine = EngineService::open(config).await?;

    // 2. 版本
    println!("Xvirus SDK {}", engine.version().await?);

    // 3. 加载病毒库和模型
    match engine.load(args.force_load).await {
        Ok(text) => println!("{}", text),
        Err(e) => {
            eprintln!("Engine load failed: {:#}", e);
            return Err(e);
        }
    }

    // 4. 单文件扫描
    let target = args.file.unwrap_or_else(|| PathBuf::from(DEFAULT_TARGET_FILE));
    let result = engine.scan(target).await?;
    match result.verdict() {
        Some(verdict) => {
            println!();
            println!("File:      {}", result.scanned_path);
            println!("Malware:   {}", if verdict.is_malware { "Yes" } else { "No" });
            println!("Detection: {}", verdict.detection_name);
            println!("Score:     {:.2}%", verdict.malware_score * 100.0);
            if result.exceeds(threshold) && !verdict.is_malware {
                tracing::warn!("Score above {:.2} but engine did not flag the file", threshold);
            }
        }
        None => eprintln!(
            "Scan error: {}",
            result.error.as_deref().unwrap_or("unknown scan error")
        ),
    }

    // 5. 文件夹扫描
    if let Some(folder) = args.folder {
        println!("\nScanning folder: {}", folder.display());
        match engine.scan_folder(folder).await {
            Ok((results, summary)) => {
                for r in results.iter().filter(|r| r.is_threat()) {
                    let name = r.verdict().map(|v| v.detection_name).unwrap_or("");
                    println!("  THREAT  {:<30} {}", name, r.scanned_path);
                }
                println!(
                    "Scanned {} file(s), {} threat(s), {} error(s) in {} ms.",
                    summary.total,
                    summary.threats,
                    summary.failures,
                    summary.elapsed_ms()
                );
            }
            Err(e) => eprintln!("Folder scan failed: {:#}", e),
        }
    }

    // 6. 检查更新
    if args.check_updates {
        match engine.check_updates(args.reload_after_update).await {
            Ok(UpdateStatus::Other(text)) => println!("\nUpdate info: {}", text),
            Ok(status) => println!("\nUpdate info: {}", status),
            Err(e) => eprintln!("\nUpdate check failed: {:#}", e),
        }
    }

    // 7. 卸载引擎
    engine.shutdown().await?;
    tracing::info!("Engine unloaded");

    Ok(())
}
