//! # Config 模块
//!
//! 编排核心的运行参数。宿主层把它嵌入自己的配置文件，
//! 缺失的字段使用默认值。

use serde::{Deserialize, Serialize};

use crate::easing::EasingFunction;
use crate::effects::EffectPoolConfig;
use crate::transition::{TransitionConfig, TransitionStyle};

/// 帧循环参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopSettings {
    /// 目标帧率
    pub target_fps: u32,
    /// 单帧 delta 上限（秒）；未设置时为一个标称帧
    pub max_delta: Option<f32>,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            target_fps: 60,
            max_delta: None,
        }
    }
}

impl LoopSettings {
    /// 标称帧时长（秒）
    pub fn frame_duration(&self) -> f32 {
        1.0 / self.target_fps.max(1) as f32
    }

    pub fn effective_max_delta(&self) -> f32 {
        self.max_delta.unwrap_or_else(|| self.frame_duration())
    }
}

/// 性能监控与降级参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceSettings {
    /// 始终运行在降级模式
    pub force_degraded: bool,
    /// 按平均帧率自动降级
    pub auto_degrade: bool,
    /// 平均帧率低于此值时降级
    pub degrade_below_fps: f32,
    /// 平均帧率高于此值时恢复
    pub recover_above_fps: f32,
    /// 采样窗口（帧数）
    pub window: usize,
}

impl Default for PerformanceSettings {
    fn default() -> Self {
        Self {
            force_degraded: false,
            auto_degrade: true,
            degrade_below_fps: 30.0,
            recover_above_fps: 50.0,
            window: 60,
        }
    }
}

/// 阶段过渡参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransitionSettings {
    pub style: TransitionStyle,
    /// 每个阶段（Out / In）的时长（秒）
    pub duration: f32,
    /// 覆盖样式默认缓动
    pub easing: Option<EasingFunction>,
    /// 降级模式下单阶段时长上限
    pub degraded_max_duration: f32,
}

impl Default for TransitionSettings {
    fn default() -> Self {
        Self {
            style: TransitionStyle::Fade,
            duration: 0.4,
            easing: None,
            degraded_max_duration: 0.15,
        }
    }
}

impl TransitionSettings {
    /// 单次请求的参数
    pub fn request_config(&self) -> TransitionConfig {
        TransitionConfig {
            duration: self.duration,
            easing: self.easing,
        }
    }
}

/// 运行时配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub game_loop: LoopSettings,
    pub performance: PerformanceSettings,
    pub effects: EffectPoolConfig,
    pub transition: TransitionSettings,
    /// 阶段完成后自动进入下一阶段
    pub auto_advance: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            game_loop: LoopSettings::default(),
            performance: PerformanceSettings::default(),
            effects: EffectPoolConfig::default(),
            transition: TransitionSettings::default(),
            auto_advance: true,
        }
    }
}
