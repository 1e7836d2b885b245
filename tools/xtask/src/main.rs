//! # xtask - 开发辅助工具
//!
//! 提供本地质量门禁与内容检查命令。
//!
//! ## 命令
//!
//! - `check-all`: 运行 fmt、clippy、test
//! - `cov-runtime`: 运行 stage-runtime 覆盖率
//! - `manifest-check`: 检查课程清单（结构、阶段与活动类型、资源文件）
//! - `replay-check`: 检查回放脚本能否解析

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use host::manifest::Manifest;
use host::replay::Replay;
use tracing::{error, info, warn};
use walkdir::WalkDir;
use xshell::{Shell, cmd};

#[derive(Parser, Debug)]
#[command(name = "xtask", about = "开发辅助工具")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// 运行 fmt、clippy、test 门禁检查
    CheckAll,
    /// 运行 stage-runtime 覆盖率报告
    CovRuntime,
    /// 检查课程清单；不带参数时检查 assets/manifest.json
    ManifestCheck {
        path: Option<PathBuf>,
        /// 资源根目录（默认取清单所在目录）
        #[arg(long)]
        assets_root: Option<PathBuf>,
    },
    /// 检查回放脚本；不带参数时检查 assets/replays/ 下所有 .json
    ReplayCheck { path: Option<PathBuf> },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    if let Err(e) = real_main() {
        error!("xtask error: {e:#}");
        return ExitCode::from(1);
    }
    ExitCode::from(0)
}

fn real_main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let sh = Shell::new()?;

    match cli.command {
        Command::CheckAll => {
            step("cargo fmt --all -- --check");
            cmd!(sh, "cargo fmt --all -- --check").run()?;

            step("cargo clippy --workspace --all-targets");
            cmd!(sh, "cargo clippy --workspace --all-targets").run()?;

            step("cargo test --workspace");
            cmd!(sh, "cargo test --workspace").run()?;
        }
        Command::CovRuntime => {
            if cmd!(sh, "cargo llvm-cov --version").quiet().run().is_err() {
                anyhow::bail!(
                    "cargo llvm-cov 不可用。\n\
请先安装：\n\
  - cargo install cargo-llvm-cov\n\
  - rustup component add llvm-tools-preview\n\
然后重试。"
                );
            }
            step("cargo llvm-cov -p stage-runtime --html");
            cmd!(sh, "cargo llvm-cov -p stage-runtime --html").run()?;
            info!("Coverage HTML: target/llvm-cov/html/index.html");
        }
        Command::ManifestCheck { path, assets_root } => {
            let path = path.unwrap_or_else(|| PathBuf::from("assets/manifest.json"));
            manifest_check(&path, assets_root.as_deref())?;
        }
        Command::ReplayCheck { path } => {
            let path = path.unwrap_or_else(|| PathBuf::from("assets/replays"));
            replay_check(&path)?;
        }
    }

    Ok(())
}

fn step(name: &str) {
    info!("==> {name}");
}

//=============================================================================
// manifest-check
//=============================================================================

/// 检查结果
#[derive(Debug, Default)]
struct CheckReport {
    checked: usize,
    errors: usize,
    warnings: usize,
}

impl CheckReport {
    fn print(&self, what: &str) {
        info!("─────────────────────────────────────────────────────");
        if self.errors > 0 {
            error!("{} 个{}: {} 个错误, {} 个警告", self.checked, what, self.errors, self.warnings);
        } else if self.warnings > 0 {
            warn!("{} 个{}: 0 个错误, {} 个警告", self.checked, what, self.warnings);
        } else {
            info!("{} 个{}: 检查通过", self.checked, what);
        }
    }
}

/// 收集路径下的 JSON 文件（单个文件原样返回）
fn collect_json_files(path: &Path) -> anyhow::Result<Vec<PathBuf>> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }
    if !path.is_dir() {
        anyhow::bail!(
            "路径不存在: {}\n请在 workspace 根目录运行，或指定路径",
            path.display()
        );
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(path) {
        let entry = entry.with_context(|| format!("无法遍历 {}", path.display()))?;
        if entry.file_type().is_file()
            && entry.path().extension().is_some_and(|ext| ext == "json")
        {
            files.push(entry.into_path());
        }
    }
    files.sort();
    Ok(files)
}

fn manifest_check(path: &Path, assets_root: Option<&Path>) -> anyhow::Result<()> {
    let mut report = CheckReport::default();
    for file in collect_json_files(path)? {
        let root = match assets_root {
            Some(root) => root.to_path_buf(),
            None => file.parent().map(Path::to_path_buf).unwrap_or_default(),
        };
        check_manifest_file(&file, &root, &mut report);
    }

    report.print("清单");
    if report.errors > 0 {
        anyhow::bail!("清单检查发现错误");
    }
    Ok(())
}

fn check_manifest_file(file: &Path, assets_root: &Path, report: &mut CheckReport) {
    let id = file.display().to_string();
    report.checked += 1;

    let manifest = match Manifest::load(file) {
        Ok(manifest) => manifest,
        Err(e) => {
            error!("[ERROR] {id}: {e}");
            report.errors += 1;
            return;
        }
    };

    for warning in manifest.validate() {
        warn!("[WARN] {id}: {warning}");
        report.warnings += 1;
    }

    for stage in &manifest.stages {
        for asset in &stage.assets {
            if !assets_root.join(&asset.path).exists() {
                error!(
                    "[ERROR] {id}: 阶段 '{}' 资源不存在 [{}] {}",
                    stage.id, asset.key, asset.path
                );
                report.errors += 1;
            }
        }
    }

    info!(
        "{id}: {} 个阶段, {} 个步骤",
        manifest.stages.len(),
        manifest.total_steps()
    );
}

//=============================================================================
// replay-check
//=============================================================================

fn replay_check(path: &Path) -> anyhow::Result<()> {
    let mut report = CheckReport::default();
    for file in collect_json_files(path)? {
        report.checked += 1;
        match Replay::load(&file) {
            Ok(replay) => info!("{}: {} 个动作", file.display(), replay.remaining()),
            Err(e) => {
                error!("[ERROR] {}: {e}", file.display());
                report.errors += 1;
            }
        }
    }

    report.print("回放");
    if report.errors > 0 {
        anyhow::bail!("回放检查发现错误");
    }
    Ok(())
}
