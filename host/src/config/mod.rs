//! # Config 模块
//!
//! 宿主配置管理，集中管理所有配置项。
//!
//! ## 配置优先级
//!
//! 1. 命令行参数（最高）
//! 2. 配置文件 (config.json)
//! 3. 默认值（最低）

use serde::{Deserialize, Serialize};
use stage_runtime::{
    CanvasBounds, EffectPoolConfig, LoopSettings, PerformanceSettings, RuntimeConfig,
    TransitionSettings,
};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

/// 应用配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// 资源根目录
    #[serde(default = "default_assets_root")]
    pub assets_root: PathBuf,

    /// 存档目录
    #[serde(default = "default_saves_dir")]
    pub saves_dir: PathBuf,

    /// manifest.json 路径（相对于 assets_root）
    #[serde(default = "default_manifest_path")]
    pub manifest_path: String,

    /// 画布尺寸
    #[serde(default)]
    pub canvas: CanvasConfig,

    /// 帧循环
    #[serde(default)]
    pub game_loop: LoopSettings,

    /// 性能与降级
    #[serde(default)]
    pub performance: PerformanceConfig,

    /// 默认过渡
    #[serde(default)]
    pub transition: TransitionSettings,

    /// 阶段完成后自动进入下一阶段
    #[serde(default = "default_auto_advance")]
    pub auto_advance: bool,

    /// 音频配置
    #[serde(default)]
    pub audio: AudioConfig,

    /// 语言标签；未设置时沿用存档中的设置
    #[serde(default)]
    pub locale: Option<String>,

    /// 调试配置
    #[serde(default)]
    pub debug: DebugConfig,
}

/// 画布配置
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CanvasConfig {
    #[serde(default = "default_canvas_width")]
    pub width: u32,
    #[serde(default = "default_canvas_height")]
    pub height: u32,
}

/// 性能配置（帧率监控 + 特效上限）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceConfig {
    #[serde(flatten)]
    pub monitor: PerformanceSettings,

    /// 正常模式下的特效上限
    #[serde(default = "default_effect_cap")]
    pub effect_cap: usize,

    /// 降级模式下的特效上限
    #[serde(default = "default_degraded_effect_cap")]
    pub degraded_effect_cap: usize,

    /// 降级模式下新特效寿命的缩放
    #[serde(default = "default_degraded_duration_scale")]
    pub degraded_duration_scale: f32,
}

/// 音频配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioConfig {
    /// 覆盖存档中的音效开关
    #[serde(default)]
    pub sound_enabled: Option<bool>,
}

/// 调试配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebugConfig {
    /// 未设置 `RUST_LOG` 时的日志级别
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// 每帧输出事件日志
    #[serde(default)]
    pub trace_frames: bool,
}

// 默认值函数
fn default_assets_root() -> PathBuf {
    PathBuf::from("assets")
}

fn default_saves_dir() -> PathBuf {
    PathBuf::from("saves")
}

fn default_manifest_path() -> String {
    "manifest.json".to_string()
}

fn default_auto_advance() -> bool {
    true
}

fn default_canvas_width() -> u32 {
    1280
}

fn default_canvas_height() -> u32 {
    720
}

fn default_effect_cap() -> usize {
    EffectPoolConfig::default().normal_cap
}

fn default_degraded_effect_cap() -> usize {
    EffectPoolConfig::default().degraded_cap
}

fn default_degraded_duration_scale() -> f32 {
    EffectPoolConfig::default().degraded_duration_scale
}

fn default_log_level() -> String {
    if cfg!(debug_assertions) {
        "debug".to_string()
    } else {
        "info".to_string()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            assets_root: default_assets_root(),
            saves_dir: default_saves_dir(),
            manifest_path: default_manifest_path(),
            canvas: CanvasConfig::default(),
            game_loop: LoopSettings::default(),
            performance: PerformanceConfig::default(),
            transition: TransitionSettings::default(),
            auto_advance: default_auto_advance(),
            audio: AudioConfig::default(),
            locale: None,
            debug: DebugConfig::default(),
        }
    }
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            width: default_canvas_width(),
            height: default_canvas_height(),
        }
    }
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            monitor: PerformanceSettings::default(),
            effect_cap: default_effect_cap(),
            degraded_effect_cap: default_degraded_effect_cap(),
            degraded_duration_scale: default_degraded_duration_scale(),
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sound_enabled: None,
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            trace_frames: false,
        }
    }
}

impl AppConfig {
    /// 加载配置文件
    ///
    /// 如果文件不存在或解析失败，返回默认配置并记录警告。
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();

        if !path.exists() {
            warn!(path = %path.display(), "配置文件不存在，使用默认配置");
            return Self::default();
        }

        match fs::read_to_string(path) {
            Ok(content) => match Self::from_json(&content) {
                Ok(config) => {
                    info!(path = %path.display(), "配置文件加载成功");
                    config
                }
                Err(e) => {
                    warn!(error = %e, "配置文件解析失败，使用默认配置");
                    Self::default()
                }
            },
            Err(e) => {
                warn!(error = %e, "配置文件读取失败，使用默认配置");
                Self::default()
            }
        }
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|e| ConfigError::ParseFailed(e.to_string()))
    }

    /// 保存配置到文件
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializationFailed(e.to_string()))?;

        fs::write(path, json).map_err(|e| ConfigError::Io(e.to_string()))?;

        Ok(())
    }

    /// 获取 manifest 完整路径
    pub fn manifest_full_path(&self) -> PathBuf {
        self.assets_root.join(&self.manifest_path)
    }

    /// 存档文件路径
    pub fn progress_file(&self) -> PathBuf {
        self.saves_dir.join("progress.json")
    }

    /// 组装核心运行参数
    pub fn runtime_config(&self) -> RuntimeConfig {
        RuntimeConfig {
            game_loop: self.game_loop.clone(),
            performance: self.performance.monitor.clone(),
            effects: EffectPoolConfig {
                normal_cap: self.performance.effect_cap,
                degraded_cap: self.performance.degraded_effect_cap,
                degraded_duration_scale: self.performance.degraded_duration_scale,
                bounds: CanvasBounds {
                    width: self.canvas.width as f32,
                    height: self.canvas.height as f32,
                },
                ..EffectPoolConfig::default()
            },
            transition: self.transition.clone(),
            auto_advance: self.auto_advance,
        }
    }

    /// 验证配置有效性
    ///
    /// 先检查数值，再检查文件系统。
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.canvas.width == 0 || self.canvas.height == 0 {
            return Err(ConfigError::ValidationFailed(
                "画布尺寸必须大于 0".to_string(),
            ));
        }

        if self.game_loop.target_fps == 0 {
            return Err(ConfigError::ValidationFailed(
                "target_fps 必须大于 0".to_string(),
            ));
        }

        if self.game_loop.max_delta.is_some_and(|d| d <= 0.0) {
            return Err(ConfigError::ValidationFailed(
                "max_delta 必须大于 0".to_string(),
            ));
        }

        let perf = &self.performance;
        if perf.effect_cap == 0 {
            return Err(ConfigError::ValidationFailed(
                "effect_cap 必须大于 0".to_string(),
            ));
        }

        if perf.degraded_effect_cap > perf.effect_cap {
            return Err(ConfigError::ValidationFailed(format!(
                "degraded_effect_cap ({}) 不能大于 effect_cap ({})",
                perf.degraded_effect_cap, perf.effect_cap
            )));
        }

        if !(perf.degraded_duration_scale > 0.0 && perf.degraded_duration_scale <= 1.0) {
            return Err(ConfigError::ValidationFailed(
                "degraded_duration_scale 必须在 (0.0, 1.0] 之间".to_string(),
            ));
        }

        if perf.monitor.degrade_below_fps >= perf.monitor.recover_above_fps {
            return Err(ConfigError::ValidationFailed(format!(
                "degrade_below_fps ({}) 必须小于 recover_above_fps ({})",
                perf.monitor.degrade_below_fps, perf.monitor.recover_above_fps
            )));
        }

        if self.transition.duration < 0.0 || self.transition.degraded_max_duration < 0.0 {
            return Err(ConfigError::ValidationFailed(
                "过渡时长不能为负".to_string(),
            ));
        }

        if self.locale.as_deref().is_some_and(str::is_empty) {
            return Err(ConfigError::ValidationFailed(
                "locale 不能为空字符串".to_string(),
            ));
        }

        if !self.assets_root.exists() {
            return Err(ConfigError::ValidationFailed(format!(
                "资源目录不存在: {}",
                self.assets_root.display()
            )));
        }

        let manifest = self.manifest_full_path();
        if !manifest.exists() {
            return Err(ConfigError::ValidationFailed(format!(
                "manifest 不存在: {}",
                manifest.display()
            )));
        }

        Ok(())
    }
}

/// 配置错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("配置序列化失败: {0}")]
    SerializationFailed(String),

    #[error("配置解析失败: {0}")]
    ParseFailed(String),

    #[error("配置 IO 错误: {0}")]
    Io(String),

    #[error("配置验证失败: {0}")]
    ValidationFailed(String),
}
