//! 课程模拟 headless 宿主
//!
//! 加载配置与课程清单，回放脚本化输入，按帧记录编排事件。

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use host::config::AppConfig;
use host::driver::{self, Session, SessionOptions};
use host::manifest::Manifest;
use host::persistence::JsonFilePersistence;
use host::replay::Replay;

#[derive(Parser, Debug)]
#[command(name = "host", version, about = "Staged lesson simulation (headless)")]
struct Cli {
    /// 配置文件路径
    #[arg(long, default_value = "config.json")]
    config: PathBuf,

    /// 覆盖配置中的 manifest 路径
    #[arg(long)]
    manifest: Option<PathBuf>,

    /// 最多运行的帧数
    #[arg(long, default_value_t = 3600)]
    frames: u64,

    /// 回放输入脚本（JSON）
    #[arg(long)]
    inputs: Option<PathBuf>,

    /// 强制降级模式
    #[arg(long)]
    degraded: bool,

    /// 按目标帧率实时运行（默认按固定步长尽快运行）
    #[arg(long)]
    realtime: bool,

    /// 忽略已有进度，从头开始
    #[arg(long)]
    new_game: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_exists = cli.config.exists();
    let mut config = AppConfig::load(&cli.config);
    if cli.degraded {
        config.performance.monitor.force_degraded = true;
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.debug.log_level)),
        )
        .init();

    if !config_exists {
        warn!(path = %cli.config.display(), "配置文件不存在，使用默认配置");
    }
    if let Err(e) = config.validate() {
        warn!(error = %e, "配置校验未通过");
    }

    let manifest_path = cli
        .manifest
        .clone()
        .unwrap_or_else(|| config.manifest_full_path());
    let manifest = Manifest::load_and_validate(&manifest_path)
        .with_context(|| format!("加载课程清单失败: {}", manifest_path.display()))?;

    let replay = match &cli.inputs {
        Some(path) => Replay::load(path)
            .with_context(|| format!("加载回放脚本失败: {}", path.display()))?,
        None => Replay::default(),
    };

    let persistence = JsonFilePersistence::new(config.progress_file());
    let mut session = Session::new(
        &config,
        &manifest,
        Box::new(persistence),
        SessionOptions {
            new_game: cli.new_game,
        },
    )
    .context("注册课程阶段失败")?;

    let summary = if cli.realtime {
        driver::run_realtime(&mut session, replay, Some(cli.frames))
    } else {
        driver::run_headless(&mut session, replay, cli.frames)
    };

    info!(
        frames = summary.frames,
        errors = summary.errors,
        score = summary.score,
        completion = summary.completion_percent,
        stages = summary.completed_stages,
        achievements = ?summary.achievements,
        completed = summary.game_completed,
        "运行结束"
    );

    Ok(())
}
