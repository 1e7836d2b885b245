//! # Host 层
//!
//! 课程模拟的 headless 宿主实现。
//!
//! ## 架构说明
//!
//! Host 层负责：
//! - 配置与课程清单加载
//! - 具体阶段与活动（封闭变体 + 内容工厂）
//! - 资源、音频、UI、渲染服务的 headless 实现
//! - 进度存档
//! - 驱动帧循环（固定步长或实时）
//!
//! Host 层不包含编排逻辑，阶段生命周期与过渡由 `stage-runtime` 驱动。

pub mod activities;
pub mod config;
pub mod driver;
pub mod manifest;
pub mod persistence;
pub mod replay;
pub mod services;
pub mod stages;

pub use activities::{ACTIVITY_KINDS, CurriculumActivity};
pub use config::{AppConfig, AudioConfig, CanvasConfig, ConfigError, DebugConfig, PerformanceConfig};
pub use driver::{RunSummary, Session, SessionOptions, run_headless, run_realtime};
pub use manifest::{Manifest, ManifestError, ManifestWarning};
pub use persistence::{JsonFilePersistence, ProgressFile, SaveVersion};
pub use replay::{Replay, ReplayAction, ReplayError, ReplayStep};
pub use services::{HeadlessAssets, LogAudio, RenderStats, TraceRenderer, UiElement, UiRegistry};
pub use stages::{CurriculumFactory, CurriculumStage, STAGE_KINDS};
