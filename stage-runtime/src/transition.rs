//! # Transition 模块
//!
//! 阶段之间的过渡调度。
//!
//! ## 流程
//!
//! 每个过渡分两个等长阶段：
//! - **Out**：遮罩覆盖度 0 → 1
//! - **In**：遮罩覆盖度 1 → 0
//!
//! Out 到达 1 的那一刻产生一次 `Midpoint` 事件，携带请求的 payload
//! （payload 被 move 出请求，不可能投递两次）。调用方在此时完成阶段切换。
//!
//! 同一时刻至多一个活跃过渡，其余请求按 FIFO 排队；
//! 当前过渡结束的同一次 `update` 中启动下一个。

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::easing::EasingFunction;

/// 方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    #[default]
    Left,
    Right,
    Up,
    Down,
}

/// 过渡样式
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransitionStyle {
    /// 淡入淡出
    #[default]
    Fade,
    /// 整屏滑动
    Slide { direction: Direction },
    /// 擦除
    Wipe { direction: Direction },
    /// 百叶窗
    Blinds { slats: u32 },
}

impl TransitionStyle {
    /// 样式默认缓动
    pub fn default_easing(&self) -> EasingFunction {
        match self {
            TransitionStyle::Fade | TransitionStyle::Blinds { .. } => EasingFunction::EaseInOutQuad,
            TransitionStyle::Slide { .. } | TransitionStyle::Wipe { .. } => {
                EasingFunction::EaseInOutCubic
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            TransitionStyle::Fade => "fade",
            TransitionStyle::Slide { .. } => "slide",
            TransitionStyle::Wipe { .. } => "wipe",
            TransitionStyle::Blinds { .. } => "blinds",
        }
    }
}

/// 单次过渡的参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransitionConfig {
    /// 每个阶段的时长（秒）
    pub duration: f32,
    /// 覆盖样式默认缓动
    pub easing: Option<EasingFunction>,
}

impl Default for TransitionConfig {
    fn default() -> Self {
        Self {
            duration: 0.4,
            easing: None,
        }
    }
}

impl TransitionConfig {
    pub fn with_duration(duration: f32) -> Self {
        Self {
            duration,
            ..Self::default()
        }
    }
}

/// 过渡标识符
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransitionId(pub u64);

/// 过渡阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionPhase {
    Out,
    In,
}

/// 过渡遮罩的渲染快照
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionOverlay {
    pub id: TransitionId,
    pub style: TransitionStyle,
    pub phase: TransitionPhase,
    /// 遮罩覆盖度（已缓动，0.0 - 1.0）
    pub coverage: f32,
}

/// 调度器产生的事件
#[derive(Debug, Clone, PartialEq)]
pub enum TransitionEvent<T> {
    Started {
        id: TransitionId,
        style: TransitionStyle,
    },
    /// Out 结束；payload 只出现一次
    Midpoint { id: TransitionId, payload: T },
    Finished { id: TransitionId },
}

/// 排队中的请求
#[derive(Debug)]
struct TransitionRequest<T> {
    id: TransitionId,
    style: TransitionStyle,
    config: TransitionConfig,
    payload: T,
}

/// 正在播放的过渡
#[derive(Debug)]
struct ActiveTransition<T> {
    id: TransitionId,
    style: TransitionStyle,
    duration: f32,
    easing: EasingFunction,
    phase: TransitionPhase,
    elapsed: f32,
    payload: Option<T>,
}

impl<T> ActiveTransition<T> {
    fn coverage(&self) -> f32 {
        let t = if self.duration <= 0.0 {
            1.0
        } else {
            self.elapsed / self.duration
        };
        match self.phase {
            TransitionPhase::Out => self.easing.apply(t),
            TransitionPhase::In => 1.0 - self.easing.apply(t),
        }
    }
}

/// 过渡调度器
///
/// `T` 为中间点投递的 payload 类型。
#[derive(Debug)]
pub struct TransitionScheduler<T> {
    active: Option<ActiveTransition<T>>,
    queue: VecDeque<TransitionRequest<T>>,
    /// 尚未通过 `update` 交付的事件
    events: Vec<TransitionEvent<T>>,
    degraded: bool,
    degraded_max_duration: f32,
    next_id: u64,
}

impl<T> TransitionScheduler<T> {
    /// 创建调度器
    ///
    /// `degraded_max_duration` 为降级模式下单阶段时长上限。
    pub fn new(degraded_max_duration: f32) -> Self {
        Self {
            active: None,
            queue: VecDeque::new(),
            events: Vec::new(),
            degraded: false,
            degraded_max_duration: degraded_max_duration.max(0.0),
            next_id: 1,
        }
    }

    /// 请求一个过渡
    ///
    /// 空闲时立即开始，否则排队。`Started` 事件在下一次 `update` 交付。
    pub fn begin(
        &mut self,
        style: TransitionStyle,
        config: TransitionConfig,
        payload: T,
    ) -> TransitionId {
        let id = TransitionId(self.next_id);
        self.next_id += 1;

        let request = TransitionRequest {
            id,
            style,
            config,
            payload,
        };

        if self.active.is_none() {
            self.start(request);
        } else {
            debug!(id = id.0, queued = self.queue.len() + 1, "过渡排队");
            self.queue.push_back(request);
        }
        id
    }

    fn start(&mut self, request: TransitionRequest<T>) {
        let TransitionRequest {
            id,
            mut style,
            config,
            payload,
        } = request;

        let mut duration = config.duration.max(0.0);
        if self.degraded {
            style = TransitionStyle::Fade;
            duration = duration.min(self.degraded_max_duration);
        }
        let easing = config.easing.unwrap_or_else(|| style.default_easing());

        debug!(id = id.0, style = style.name(), duration, "过渡开始");
        self.events.push(TransitionEvent::Started {
            id,
            style: style.clone(),
        });
        self.active = Some(ActiveTransition {
            id,
            style,
            duration,
            easing,
            phase: TransitionPhase::Out,
            elapsed: 0.0,
            payload: Some(payload),
        });
    }

    fn start_next(&mut self) {
        if let Some(request) = self.queue.pop_front() {
            self.start(request);
        }
    }

    /// 结束当前过渡（必要时补发中间点），然后启动下一个
    fn finish_active(&mut self) {
        let Some(mut active) = self.active.take() else {
            return;
        };
        if let Some(payload) = active.payload.take() {
            self.events.push(TransitionEvent::Midpoint {
                id: active.id,
                payload,
            });
        }
        debug!(id = active.id.0, "过渡完成");
        self.events.push(TransitionEvent::Finished { id: active.id });
        self.start_next();
    }

    /// 推进过渡
    ///
    /// 每次调用至多跨越一个阶段边界；跨越中间点时剩余时间不带入 In 阶段。
    pub fn update(&mut self, dt: f32) -> Vec<TransitionEvent<T>> {
        if let Some(active) = self.active.as_mut() {
            active.elapsed += dt.max(0.0);
            if active.elapsed >= active.duration {
                match active.phase {
                    TransitionPhase::Out => {
                        active.phase = TransitionPhase::In;
                        active.elapsed = 0.0;
                        if let Some(payload) = active.payload.take() {
                            self.events.push(TransitionEvent::Midpoint {
                                id: active.id,
                                payload,
                            });
                        }
                    }
                    TransitionPhase::In => self.finish_active(),
                }
            }
        }

        std::mem::take(&mut self.events)
    }

    /// 跳过当前过渡
    ///
    /// 尚未到达中间点时仍会投递中间点。事件在下一次 `update` 交付。
    pub fn skip_current(&mut self) -> bool {
        if self.active.is_none() {
            return false;
        }
        self.finish_active();
        true
    }

    /// 切换降级模式（对之后开始的过渡生效）
    pub fn set_degraded(&mut self, degraded: bool) {
        self.degraded = degraded;
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    /// 是否有过渡正在播放
    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// 是否有正在播放、排队或未交付的工作
    pub fn is_busy(&self) -> bool {
        self.active.is_some() || !self.queue.is_empty() || !self.events.is_empty()
    }

    pub fn queued_len(&self) -> usize {
        self.queue.len()
    }

    /// 当前遮罩快照
    pub fn overlay(&self) -> Option<TransitionOverlay> {
        self.active.as_ref().map(|active| TransitionOverlay {
            id: active.id,
            style: active.style.clone(),
            phase: active.phase,
            coverage: active.coverage(),
        })
    }

    /// 丢弃所有过渡（包括未投递的 payload），返回丢弃的数量
    pub fn clear(&mut self) -> usize {
        let dropped = usize::from(self.active.is_some()) + self.queue.len();
        self.active = None;
        self.queue.clear();
        self.events.clear();
        dropped
    }
}
