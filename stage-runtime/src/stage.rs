//! # Stage 模块
//!
//! 单个阶段的生命周期。
//!
//! ## 状态机
//!
//! ```text
//! Loading ──资源就绪──► Ready ──activate──► Running ──全部活动成功──► Completing
//!    │                                        │                          │
//!    └──失败：停留在 Loading，等待 retry_load   └──活动失败：停留，等待重试   │
//!                                                                        ▼
//!                                             (任意状态) ──teardown──► TornDown
//! ```
//!
//! 阶段通过 [`UiScope`] 创建的每个控件都登记在 `ui_elements` 中，
//! 拆除时统一释放。

use std::collections::{BTreeSet, VecDeque};
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::activity::{Activity, ActivityResult, ActivityRuntime, ActivitySpec};
use crate::effects::{EffectKind, EffectParams, EffectPool};
use crate::error::StageError;
use crate::input::InputEvent;
use crate::progress::ProgressTracker;
use crate::services::{
    AssetService, AssetStatus, AudioService, SoundGate, UiHandle, UiScope, UiService,
};
use crate::state::StageId;
use crate::view::StageView;

/// 音效键
pub mod sounds {
    pub const SUCCESS: &str = "success";
    pub const FAIL: &str = "fail";
    pub const ACHIEVEMENT: &str = "achievement";
    pub const STAGE_COMPLETE: &str = "stage_complete";
}

// =============================================================================
// 描述
// =============================================================================

/// 阶段资源引用
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetRef {
    pub key: String,
    pub path: String,
}

/// 阶段描述（注册后不可变）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageDescriptor {
    pub id: StageId,
    #[serde(default)]
    pub title: String,
    /// 阶段类型（由内容工厂解释）
    #[serde(default = "default_stage_kind")]
    pub kind: String,
    #[serde(default)]
    pub assets: Vec<AssetRef>,
    #[serde(default)]
    pub activities: Vec<ActivitySpec>,
}

fn default_stage_kind() -> String {
    "lesson".to_string()
}

impl StageDescriptor {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            kind: default_stage_kind(),
            assets: Vec::new(),
            activities: Vec::new(),
        }
    }

    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = kind.into();
        self
    }

    pub fn with_asset(mut self, key: impl Into<String>, path: impl Into<String>) -> Self {
        self.assets.push(AssetRef {
            key: key.into(),
            path: path.into(),
        });
        self
    }

    pub fn with_activity(mut self, spec: ActivitySpec) -> Self {
        self.activities.push(spec);
        self
    }

    /// 计入完成度的步骤数（无活动的阶段计为一步）
    pub fn step_count(&self) -> usize {
        self.activities.len().max(1)
    }

    /// 第 `index` 个活动的步骤 ID
    pub fn step_id(&self, index: usize) -> String {
        format!("{}/{}", self.id, index)
    }
}

// =============================================================================
// 上下文
// =============================================================================

/// 一帧内借出的服务
pub struct Systems<'a> {
    pub assets: &'a mut dyn AssetService,
    pub audio: &'a mut dyn AudioService,
    pub ui: &'a mut dyn UiService,
    pub progress: &'a mut ProgressTracker,
    pub effects: &'a mut EffectPool,
}

/// 阶段钩子可用的上下文
pub struct StageContext<'a> {
    pub stage_id: &'a str,
    pub title: &'a str,
    pub progress: &'a mut ProgressTracker,
    pub effects: &'a mut EffectPool,
    pub audio: SoundGate<'a>,
    pub ui: UiScope<'a>,
}

impl<'a> StageContext<'a> {
    fn new(
        descriptor: &'a StageDescriptor,
        ui_elements: &'a mut Vec<UiHandle>,
        sys: &'a mut Systems<'_>,
    ) -> Self {
        let sound_enabled = sys.progress.state().settings.sound_enabled;
        Self {
            stage_id: &descriptor.id,
            title: &descriptor.title,
            progress: &mut *sys.progress,
            effects: &mut *sys.effects,
            audio: SoundGate::new(&mut *sys.audio, sound_enabled),
            ui: UiScope::new(&mut *sys.ui, ui_elements),
        }
    }

    /// 画布中心
    pub fn canvas_center(&self) -> (f32, f32) {
        let bounds = self.effects.config().bounds;
        (bounds.width / 2.0, bounds.height / 2.0)
    }
}

/// 阶段按钮触发的动作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageAction {
    /// 重试失败的活动
    RetryActivity,
    /// 继续（无活动阶段的确认）
    Continue,
}

/// 阶段行为
///
/// 具体阶段（介绍、课程、结业等）实现这些钩子；生命周期由 [`StageRuntime`] 驱动。
pub trait Stage {
    fn kind(&self) -> &'static str;

    /// 资源就绪后构建 UI
    fn build(&mut self, ctx: &mut StageContext<'_>);

    fn on_activity_started(&mut self, _ctx: &mut StageContext<'_>, _index: usize, _kind: &str) {}

    fn on_activity_finished(
        &mut self,
        _ctx: &mut StageContext<'_>,
        _index: usize,
        _result: &ActivityResult,
    ) {
    }

    /// 阶段完成（完成标记已写入）
    fn on_complete(&mut self, _ctx: &mut StageContext<'_>) {}

    /// 按钮映射到动作
    fn button_action(&self, _handle: UiHandle) -> Option<StageAction> {
        None
    }

    /// 拆除前清理自身状态（控件由运行时统一移除）
    fn teardown(&mut self, _ctx: &mut StageContext<'_>) {}
}

// =============================================================================
// 运行时
// =============================================================================

/// 阶段状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StagePhase {
    Loading,
    Ready,
    Running,
    Completing,
    TornDown,
}

impl fmt::Display for StagePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StagePhase::Loading => "Loading",
            StagePhase::Ready => "Ready",
            StagePhase::Running => "Running",
            StagePhase::Completing => "Completing",
            StagePhase::TornDown => "TornDown",
        };
        f.write_str(name)
    }
}

/// 资源加载进度
#[derive(Debug, Clone, PartialEq)]
pub enum LoadStatus {
    /// 仍在加载（或等待重试）
    Loading,
    /// 全部就绪
    Ready,
    /// 本次轮询新发现的失败
    Failed(Vec<StageError>),
}

/// 阶段事件
#[derive(Debug, Clone, PartialEq)]
pub enum StageEvent {
    ActivityStarted {
        index: usize,
        kind: &'static str,
    },
    ActivitySucceeded {
        index: usize,
        result: ActivityResult,
    },
    ActivityFailed {
        index: usize,
        result: ActivityResult,
    },
    AchievementUnlocked {
        id: &'static str,
    },
    Completed,
}

/// 阶段运行时
pub struct StageRuntime {
    descriptor: StageDescriptor,
    stage: Box<dyn Stage>,
    phase: StagePhase,
    /// 尚未开始的活动
    upcoming: VecDeque<Box<dyn Activity>>,
    current: Option<ActivityRuntime>,
    /// 当前活动序号
    cursor: usize,
    ui_elements: Vec<UiHandle>,
    /// 已请求加载
    requested: bool,
    /// 已上报过的失败资源
    failed_assets: BTreeSet<String>,
    awaiting_retry: bool,
}

impl StageRuntime {
    pub fn new(
        descriptor: StageDescriptor,
        stage: Box<dyn Stage>,
        activities: Vec<Box<dyn Activity>>,
    ) -> Self {
        Self {
            descriptor,
            stage,
            phase: StagePhase::Loading,
            upcoming: activities.into(),
            current: None,
            cursor: 0,
            ui_elements: Vec::new(),
            requested: false,
            failed_assets: BTreeSet::new(),
            awaiting_retry: false,
        }
    }

    pub fn id(&self) -> &str {
        &self.descriptor.id
    }

    pub fn descriptor(&self) -> &StageDescriptor {
        &self.descriptor
    }

    pub fn phase(&self) -> StagePhase {
        self.phase
    }

    pub fn is_completed(&self) -> bool {
        self.phase == StagePhase::Completing
    }

    pub fn awaiting_retry(&self) -> bool {
        self.awaiting_retry
    }

    pub fn current_activity(&self) -> Option<&ActivityRuntime> {
        self.current.as_ref()
    }

    /// 本阶段创建且尚未移除的控件数
    pub fn ui_element_count(&self) -> usize {
        self.ui_elements.len()
    }

    fn invalid_phase(&self, expected: StagePhase) -> StageError {
        StageError::InvalidPhase {
            stage: self.descriptor.id.clone(),
            expected: expected.to_string(),
            actual: self.phase.to_string(),
        }
    }

    // =========================================================================
    // 加载
    // =========================================================================

    /// 请求全部资源（只请求一次）
    pub fn request_assets(&mut self, assets: &mut dyn AssetService) {
        if self.phase != StagePhase::Loading || self.requested {
            return;
        }
        self.requested = true;
        for asset in &self.descriptor.assets {
            assets.load_image(&asset.path, &asset.key);
        }
        debug!(stage = %self.descriptor.id, count = self.descriptor.assets.len(), "请求阶段资源");
    }

    /// 轮询资源状态
    pub fn poll_load(&mut self, assets: &dyn AssetService) -> LoadStatus {
        match self.phase {
            StagePhase::Loading => {}
            StagePhase::TornDown => return LoadStatus::Loading,
            _ => return LoadStatus::Ready,
        }

        let mut all_ready = true;
        let mut errors = Vec::new();
        for asset in &self.descriptor.assets {
            let failure = match assets.status(&asset.key) {
                AssetStatus::Ready => continue,
                AssetStatus::Pending => {
                    all_ready = false;
                    continue;
                }
                AssetStatus::Failed(message) => message,
                AssetStatus::Missing => "资源未被请求或已丢失".to_string(),
            };
            all_ready = false;
            if self.failed_assets.insert(asset.key.clone()) {
                errors.push(StageError::AssetLoad {
                    stage: self.descriptor.id.clone(),
                    key: asset.key.clone(),
                    message: failure,
                });
            }
        }

        if all_ready {
            self.phase = StagePhase::Ready;
            info!(stage = %self.descriptor.id, "阶段资源就绪");
            LoadStatus::Ready
        } else if errors.is_empty() {
            LoadStatus::Loading
        } else {
            for error in &errors {
                warn!(error = %error, "阶段资源加载失败");
            }
            LoadStatus::Failed(errors)
        }
    }

    /// 只重新请求失败的资源，返回重新请求的数量
    pub fn retry_load(&mut self, assets: &mut dyn AssetService) -> Result<usize, StageError> {
        if self.phase != StagePhase::Loading {
            return Err(self.invalid_phase(StagePhase::Loading));
        }
        if self.failed_assets.is_empty() {
            return Err(StageError::NothingToRetry {
                stage: self.descriptor.id.clone(),
            });
        }

        let failed = std::mem::take(&mut self.failed_assets);
        for asset in self
            .descriptor
            .assets
            .iter()
            .filter(|a| failed.contains(&a.key))
        {
            assets.load_image(&asset.path, &asset.key);
        }
        info!(stage = %self.descriptor.id, count = failed.len(), "重新请求失败资源");
        Ok(failed.len())
    }

    // =========================================================================
    // 运行
    // =========================================================================

    /// Ready → Running：构建 UI 并开始第一个活动
    pub fn activate(&mut self, sys: &mut Systems<'_>) -> Result<Vec<StageEvent>, StageError> {
        if self.phase != StagePhase::Ready {
            return Err(self.invalid_phase(StagePhase::Ready));
        }

        let mut ctx = StageContext::new(&self.descriptor, &mut self.ui_elements, sys);
        self.stage.build(&mut ctx);
        self.phase = StagePhase::Running;
        info!(stage = %self.descriptor.id, kind = self.stage.kind(), "阶段开始");

        let mut events = Vec::new();
        self.start_next_activity(sys, &mut events);
        Ok(events)
    }

    /// 推进当前活动
    pub fn update(&mut self, dt: f32, sys: &mut Systems<'_>) -> Vec<StageEvent> {
        let mut events = Vec::new();
        if self.phase != StagePhase::Running {
            return events;
        }
        if let Some(runtime) = self.current.as_mut() {
            runtime.tick(dt);
        }
        self.settle_activity(sys, &mut events);
        events
    }

    /// 路由输入
    ///
    /// 命中阶段按钮时执行按钮动作，否则转发给当前活动。
    pub fn handle_input(&mut self, event: &InputEvent, sys: &mut Systems<'_>) -> Vec<StageEvent> {
        let mut events = Vec::new();
        if self.phase != StagePhase::Running {
            return events;
        }

        let action = match event {
            InputEvent::Retry => Some(StageAction::RetryActivity),
            InputEvent::Continue => Some(StageAction::Continue),
            InputEvent::Click { x, y } => {
                let scope = UiScope::new(&mut *sys.ui, &mut self.ui_elements);
                scope
                    .button_at(*x, *y)
                    .and_then(|handle| self.stage.button_action(handle))
            }
            _ => None,
        };

        match action {
            Some(StageAction::RetryActivity) if self.awaiting_retry => {
                self.restart_current(sys, &mut events);
                return events;
            }
            Some(StageAction::Continue) if self.is_confirmation_stage() => {
                self.complete(sys, &mut events);
                return events;
            }
            _ => {}
        }

        if self.is_confirmation_stage() && matches!(event, InputEvent::Click { .. }) {
            self.complete(sys, &mut events);
            return events;
        }

        if let Some(runtime) = self.current.as_mut() {
            runtime.handle_input(event);
        }
        self.settle_activity(sys, &mut events);
        events
    }

    /// 重试失败的活动
    pub fn retry_activity(&mut self, sys: &mut Systems<'_>) -> Result<Vec<StageEvent>, StageError> {
        if !self.awaiting_retry {
            return Err(StageError::NothingToRetry {
                stage: self.descriptor.id.clone(),
            });
        }
        let mut events = Vec::new();
        self.restart_current(sys, &mut events);
        Ok(events)
    }

    /// 没有活动、等待玩家确认的阶段
    fn is_confirmation_stage(&self) -> bool {
        self.descriptor.activities.is_empty()
    }

    fn start_next_activity(&mut self, sys: &mut Systems<'_>, events: &mut Vec<StageEvent>) {
        let Some(activity) = self.upcoming.pop_front() else {
            if !self.is_confirmation_stage() {
                self.complete(sys, events);
            }
            return;
        };

        let mut runtime = ActivityRuntime::new(activity);
        runtime.start();
        let kind = runtime.kind();
        self.current = Some(runtime);

        let mut ctx = StageContext::new(&self.descriptor, &mut self.ui_elements, sys);
        self.stage.on_activity_started(&mut ctx, self.cursor, kind);
        events.push(StageEvent::ActivityStarted {
            index: self.cursor,
            kind,
        });
    }

    fn restart_current(&mut self, sys: &mut Systems<'_>, events: &mut Vec<StageEvent>) {
        let Some(runtime) = self.current.as_mut() else {
            return;
        };
        if let Err(e) = runtime.restart() {
            warn!(error = %e, "活动重试失败");
            return;
        }
        runtime.start();
        let kind = runtime.kind();
        self.awaiting_retry = false;

        let mut ctx = StageContext::new(&self.descriptor, &mut self.ui_elements, sys);
        self.stage.on_activity_started(&mut ctx, self.cursor, kind);
        events.push(StageEvent::ActivityStarted {
            index: self.cursor,
            kind,
        });
    }

    /// 处理刚结束的活动
    fn settle_activity(&mut self, sys: &mut Systems<'_>, events: &mut Vec<StageEvent>) {
        let Some(runtime) = self.current.as_mut() else {
            return;
        };
        if !runtime.is_finished() {
            return;
        }
        let result = match runtime.report() {
            Ok(result) => result,
            Err(e) => {
                warn!(error = %e, "活动结果上报失败");
                return;
            }
        };
        let index = self.cursor;

        if result.success {
            self.record_success(index, &result, sys);
            let mut ctx = StageContext::new(&self.descriptor, &mut self.ui_elements, sys);
            self.stage.on_activity_finished(&mut ctx, index, &result);
            events.push(StageEvent::ActivitySucceeded { index, result });
            announce_achievements(&mut ctx, events);

            self.current = None;
            self.cursor += 1;
            self.start_next_activity(sys, events);
        } else {
            info!(stage = %self.descriptor.id, index, "活动失败，等待重试");
            sys.progress.record_stage_failure(&self.descriptor.id);

            let mut ctx = StageContext::new(&self.descriptor, &mut self.ui_elements, sys);
            ctx.audio.play_sound(sounds::FAIL);
            self.stage.on_activity_finished(&mut ctx, index, &result);
            self.awaiting_retry = true;
            events.push(StageEvent::ActivityFailed { index, result });
        }
    }

    fn record_success(
        &mut self,
        index: usize,
        result: &ActivityResult,
        sys: &mut Systems<'_>,
    ) {
        let step = self.descriptor.step_id(index);
        sys.progress.complete_step(&step);
        if let Err(e) = sys.progress.add_score(result.score) {
            warn!(error = %e, step = %step, "活动分数无效，已忽略");
        }
        sys.progress.record_activity_time(result.elapsed);

        let mut ctx = StageContext::new(&self.descriptor, &mut self.ui_elements, sys);
        let (cx, cy) = ctx.canvas_center();
        ctx.effects.spawn(
            EffectKind::ScorePopup,
            EffectParams::at(cx, cy).with_text(format!("+{}", result.score.max(0))),
        );
        ctx.effects.burst(EffectKind::Star, cx, cy, 8, 240.0);
        ctx.audio.play_sound(sounds::SUCCESS);
    }

    /// Running → Completing
    fn complete(&mut self, sys: &mut Systems<'_>, events: &mut Vec<StageEvent>) {
        if self.phase != StagePhase::Running {
            return;
        }
        self.phase = StagePhase::Completing;

        if self.is_confirmation_stage() {
            sys.progress.complete_step(&self.descriptor.id);
        }
        sys.progress.mark_stage_complete(&self.descriptor.id);

        let mut ctx = StageContext::new(&self.descriptor, &mut self.ui_elements, sys);
        self.stage.on_complete(&mut ctx);
        ctx.audio.play_sound(sounds::STAGE_COMPLETE);
        let (cx, cy) = ctx.canvas_center();
        ctx.effects.burst(EffectKind::Confetti, cx, cy * 0.5, 24, 320.0);
        announce_achievements(&mut ctx, events);

        events.push(StageEvent::Completed);
    }

    // =========================================================================
    // 拆除
    // =========================================================================

    /// 释放活动与全部控件；幂等
    pub fn teardown(&mut self, sys: &mut Systems<'_>) {
        if self.phase == StagePhase::TornDown {
            return;
        }

        let mut ctx = StageContext::new(&self.descriptor, &mut self.ui_elements, sys);
        self.stage.teardown(&mut ctx);
        let removed = ctx.ui.remove_all();

        self.current = None;
        self.upcoming.clear();
        self.awaiting_retry = false;
        self.phase = StagePhase::TornDown;
        debug!(stage = %self.descriptor.id, removed, "阶段已拆除");
    }

    /// 渲染快照
    pub fn view(&self) -> StageView {
        StageView {
            id: self.descriptor.id.clone(),
            title: self.descriptor.title.clone(),
            phase: self.phase,
            step: self.cursor,
            total_steps: self.descriptor.activities.len(),
            activity: self.current.as_ref().map(ActivityRuntime::view),
            awaiting_retry: self.awaiting_retry,
        }
    }
}

/// 检查成就，为每个新成就播放横幅与音效
fn announce_achievements(ctx: &mut StageContext<'_>, events: &mut Vec<StageEvent>) {
    let (cx, _) = ctx.canvas_center();
    for achievement in ctx.progress.check_achievements() {
        ctx.effects.spawn(
            EffectKind::Banner,
            EffectParams::at(cx, 80.0).with_text(achievement.name),
        );
        ctx.audio.play_sound(sounds::ACHIEVEMENT);
        events.push(StageEvent::AchievementUnlocked { id: achievement.id });
    }
}

impl fmt::Debug for StageRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageRuntime")
            .field("id", &self.descriptor.id)
            .field("kind", &self.stage.kind())
            .field("phase", &self.phase)
            .field("cursor", &self.cursor)
            .field("current", &self.current)
            .field("ui_elements", &self.ui_elements.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::ActivityPhase;
    use crate::testing::{Harness, TestStage, clicks};

    fn lesson(id: &str, activities: usize) -> StageRuntime {
        let mut descriptor = StageDescriptor::new(id, "Lesson").with_asset("bg", "bg.png");
        let mut boxed = Vec::new();
        for _ in 0..activities {
            descriptor = descriptor.with_activity(ActivitySpec::new("clicks").with_time_limit(5.0));
            boxed.push(clicks(1, Some(5.0)));
        }
        StageRuntime::new(descriptor, Box::new(TestStage::default()), boxed)
    }

    fn load(stage: &mut StageRuntime, harness: &mut Harness) {
        stage.request_assets(&mut harness.assets);
        harness.assets.poll();
        assert_eq!(stage.poll_load(&harness.assets), LoadStatus::Ready);
    }

    #[test]
    fn test_loading_to_running() {
        let mut harness = Harness::new();
        let mut stage = lesson("s1", 2);
        assert_eq!(stage.phase(), StagePhase::Loading);

        stage.request_assets(&mut harness.assets);
        stage.request_assets(&mut harness.assets);
        assert_eq!(harness.assets.requests, vec!["bg"]);
        assert_eq!(stage.poll_load(&harness.assets), LoadStatus::Loading);

        harness.assets.poll();
        assert_eq!(stage.poll_load(&harness.assets), LoadStatus::Ready);
        assert_eq!(stage.phase(), StagePhase::Ready);

        let events = stage.activate(&mut harness.systems()).unwrap();
        assert_eq!(stage.phase(), StagePhase::Running);
        assert_eq!(
            events,
            vec![StageEvent::ActivityStarted {
                index: 0,
                kind: "clicks"
            }]
        );
        assert!(stage.ui_element_count() > 0);
    }

    #[test]
    fn test_asset_failure_surfaces_once_and_retries_only_failed() {
        let mut harness = Harness::new();
        harness.assets.fail("broken");
        let descriptor = StageDescriptor::new("s1", "Lesson")
            .with_asset("bg", "bg.png")
            .with_asset("broken", "broken.png");
        let mut stage = StageRuntime::new(descriptor, Box::new(TestStage::default()), Vec::new());

        stage.request_assets(&mut harness.assets);
        harness.assets.poll();
        let LoadStatus::Failed(errors) = stage.poll_load(&harness.assets) else {
            panic!("应当报告加载失败");
        };
        assert_eq!(errors.len(), 1);
        assert!(matches!(&errors[0], StageError::AssetLoad { key, .. } if key == "broken"));
        assert_eq!(stage.poll_load(&harness.assets), LoadStatus::Loading);
        assert_eq!(stage.phase(), StagePhase::Loading);

        harness.assets.heal("broken");
        harness.assets.requests.clear();
        assert_eq!(stage.retry_load(&mut harness.assets), Ok(1));
        assert_eq!(harness.assets.requests, vec!["broken"]);

        harness.assets.poll();
        assert_eq!(stage.poll_load(&harness.assets), LoadStatus::Ready);
        assert!(matches!(
            stage.retry_load(&mut harness.assets),
            Err(StageError::InvalidPhase { .. })
        ));
    }

    #[test]
    fn test_success_records_progress_and_advances() {
        let mut harness = Harness::new();
        harness.progress.set_total_steps(2);
        let mut stage = lesson("s1", 2);
        load(&mut stage, &mut harness);
        stage.activate(&mut harness.systems()).unwrap();

        let events = stage.handle_input(&InputEvent::click(1.0, 1.0), &mut harness.systems());
        assert!(matches!(events[0], StageEvent::ActivitySucceeded { index: 0, .. }));
        assert!(events.contains(&StageEvent::AchievementUnlocked { id: "first_step" }));
        assert!(events.contains(&StageEvent::ActivityStarted {
            index: 1,
            kind: "clicks"
        }));
        assert!(harness.progress.state().completed_steps.contains("s1/0"));
        assert_eq!(harness.progress.completion_percent(), 50.0);
        assert!(harness.effects.count(EffectKind::ScorePopup) > 0);
        assert!(harness.effects.count(EffectKind::Banner) > 0);
        assert!(harness.audio.played.contains(&sounds::SUCCESS.to_string()));

        let events = stage.handle_input(&InputEvent::click(1.0, 1.0), &mut harness.systems());
        assert_eq!(events.last(), Some(&StageEvent::Completed));
        assert_eq!(stage.phase(), StagePhase::Completing);
        assert!(harness.progress.state().is_stage_complete("s1"));
    }

    #[test]
    fn test_failure_waits_for_retry() {
        let mut harness = Harness::new();
        let mut stage = lesson("s1", 1);
        load(&mut stage, &mut harness);
        stage.activate(&mut harness.systems()).unwrap();

        let events = stage.update(5.0, &mut harness.systems());
        assert!(matches!(events[0], StageEvent::ActivityFailed { index: 0, .. }));
        assert_eq!(stage.phase(), StagePhase::Running);
        assert!(stage.awaiting_retry());
        assert!(harness.progress.state().completed_steps.is_empty());
        assert_eq!(harness.progress.state().score, 0);

        // 等待重试时输入不会到达活动
        stage.handle_input(&InputEvent::click(1.0, 1.0), &mut harness.systems());
        assert_eq!(stage.current_activity().unwrap().phase(), ActivityPhase::Reported);

        let events = stage.retry_activity(&mut harness.systems()).unwrap();
        assert_eq!(
            events,
            vec![StageEvent::ActivityStarted {
                index: 0,
                kind: "clicks"
            }]
        );
        assert_eq!(stage.current_activity().unwrap().attempt(), 2);
        assert!(stage.retry_activity(&mut harness.systems()).is_err());
    }

    #[test]
    fn test_retry_button_restarts_activity() {
        let mut harness = Harness::new();
        let mut stage = lesson("s1", 1);
        load(&mut stage, &mut harness);
        stage.activate(&mut harness.systems()).unwrap();
        stage.update(5.0, &mut harness.systems());

        let (x, y) = TestStage::RETRY_BUTTON_POS;
        let events = stage.handle_input(&InputEvent::click(x + 1.0, y + 1.0), &mut harness.systems());
        assert!(matches!(events[0], StageEvent::ActivityStarted { .. }));
        assert!(!stage.awaiting_retry());
    }

    #[test]
    fn test_confirmation_stage_completes_on_click() {
        let mut harness = Harness::new();
        let descriptor = StageDescriptor::new("intro", "Welcome").with_kind("intro");
        let mut stage = StageRuntime::new(descriptor, Box::new(TestStage::default()), Vec::new());
        load(&mut stage, &mut harness);

        let events = stage.activate(&mut harness.systems()).unwrap();
        assert!(events.is_empty());
        assert_eq!(stage.phase(), StagePhase::Running);

        let events = stage.handle_input(&InputEvent::Continue, &mut harness.systems());
        assert_eq!(events.last(), Some(&StageEvent::Completed));
        assert!(harness.progress.state().completed_steps.contains("intro"));
    }

    #[test]
    fn test_teardown_releases_ui_and_is_idempotent() {
        let mut harness = Harness::new();
        let mut stage = lesson("s1", 1);
        load(&mut stage, &mut harness);
        stage.activate(&mut harness.systems()).unwrap();
        assert!(harness.ui.live() > 0);

        stage.teardown(&mut harness.systems());
        assert_eq!(harness.ui.live(), 0);
        assert_eq!(stage.ui_element_count(), 0);
        assert_eq!(stage.phase(), StagePhase::TornDown);
        assert!(stage.current_activity().is_none());

        stage.teardown(&mut harness.systems());
        assert_eq!(stage.phase(), StagePhase::TornDown);
    }

    #[test]
    fn test_activate_requires_ready() {
        let mut harness = Harness::new();
        let mut stage = lesson("s1", 1);
        assert!(matches!(
            stage.activate(&mut harness.systems()),
            Err(StageError::InvalidPhase { .. })
        ));
    }

    #[test]
    fn test_muted_settings_silence_stage_sounds() {
        let mut harness = Harness::new();
        harness.progress.set_sound_enabled(false);
        let mut stage = lesson("s1", 1);
        load(&mut stage, &mut harness);
        stage.activate(&mut harness.systems()).unwrap();
        stage.handle_input(&InputEvent::click(1.0, 1.0), &mut harness.systems());

        assert!(harness.audio.played.is_empty());
    }

    #[test]
    fn test_view() {
        let mut harness = Harness::new();
        let mut stage = lesson("s1", 3);
        load(&mut stage, &mut harness);
        stage.activate(&mut harness.systems()).unwrap();

        let view = stage.view();
        assert_eq!(view.id, "s1");
        assert_eq!(view.phase, StagePhase::Running);
        assert_eq!(view.total_steps, 3);
        assert_eq!(view.activity.unwrap().kind, "clicks");
    }
}
