//! # Stage Runtime
//!
//! 分阶段教学模拟的编排核心。
//!
//! ## 架构概述
//!
//! `stage-runtime` 不依赖任何窗口、渲染或音频后端。
//! 外部能力通过 [`services`] 中的 trait 注入，宿主层提供实现：
//!
//! ```text
//! Host                                 Runtime
//!   │                                     │
//!   │──── push_input / tick(now) ───────►│ GameLoop
//!   │                                     │   → Orchestrator → Stage → Activity
//!   │                                     │   → EffectPool
//!   │◄─── Renderer / UiService / Audio ───│
//!   │◄─── FrameReport ────────────────────│
//! ```
//!
//! ## 核心类型
//!
//! - [`GameLoop`]：帧循环，持有全部受管对象
//! - [`Orchestrator`]：阶段注册表、入场规则、预加载与过渡
//! - [`StageRuntime`] / [`ActivityRuntime`]：阶段与活动的生命周期
//! - [`TransitionScheduler`]：带中间点载荷的过渡队列
//! - [`EffectPool`]：有上限的视觉特效池
//! - [`ProgressTracker`]：得分、完成度与成就
//!
//! ## 模块结构
//!
//! - [`game_loop`]：帧循环与性能监控
//! - [`orchestrator`]：阶段编排
//! - [`stage`]：阶段描述、运行时与上下文
//! - [`activity`]：活动 trait 与运行时
//! - [`transition`]：过渡调度
//! - [`effects`]：特效池
//! - [`progress`]：进度与成就
//! - [`services`]：外部服务接口
//! - [`config`]：运行参数

pub mod activity;
pub mod config;
pub mod easing;
pub mod effects;
pub mod error;
pub mod event;
pub mod game_loop;
pub mod input;
pub mod orchestrator;
pub mod progress;
pub mod services;
pub mod stage;
pub mod state;
pub mod transition;
pub mod view;

#[cfg(test)]
mod testing;

// 重导出核心类型
pub use activity::{Activity, ActivityPhase, ActivityResult, ActivityRuntime, ActivitySpec};
pub use config::{LoopSettings, PerformanceSettings, RuntimeConfig, TransitionSettings};
pub use easing::EasingFunction;
pub use effects::{
    CanvasBounds, EffectId, EffectInstance, EffectKind, EffectLayer, EffectParams, EffectPool,
    EffectPoolConfig,
};
pub use error::{
    ActivityError, OrchestratorError, PersistenceError, ProgressError, RenderError, RuntimeError,
    RuntimeResult, StageError,
};
pub use event::{EventBus, SubscriptionId};
pub use game_loop::{FrameReport, GameLoop, LoopState, LoopStats, PerformanceMonitor};
pub use input::InputEvent;
pub use orchestrator::{ContentFactory, Orchestrator, OrchestratorEvent, TransitionOutcome};
pub use progress::{Achievement, BUILTIN_ACHIEVEMENTS, ProgressEvent, ProgressTracker};
pub use services::{
    AssetHandle, AssetService, AssetStatus, AudioService, ButtonConfig, LabelConfig,
    NoopPersistence, NullRenderer, PersistenceService, Renderer, Services, SilentAudio, UiHandle,
    UiService,
};
pub use stage::{
    AssetRef, Stage, StageAction, StageContext, StageDescriptor, StageEvent, StagePhase,
    StageRuntime, Systems,
};
pub use state::{GameState, SessionStats, Settings, StageId};
pub use transition::{
    Direction, TransitionConfig, TransitionEvent, TransitionId, TransitionOverlay,
    TransitionPhase, TransitionScheduler, TransitionStyle,
};
pub use view::{ActivityView, StageView};
