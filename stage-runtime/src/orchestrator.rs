//! # Orchestrator 模块
//!
//! 阶段注册表与切换编排。
//!
//! ## 切换流程
//!
//! ```text
//! transition_to(id)
//!   → 校验（未注册 / 已是当前 / 顺序规则）
//!   → 构建目标 StageRuntime，请求资源
//!   → 资源就绪：以目标阶段为 payload 开始过渡
//!   → 中间点：拆除旧阶段 → 构建新阶段 → 标记为当前阶段
//!   → 过渡结束
//! ```
//!
//! 资源加载失败时保留旧阶段，通过 [`OrchestratorEvent::StageLoadFailed`] 报告，
//! 可调用 [`Orchestrator::retry_load`] 重试。

use std::collections::{BTreeMap, VecDeque};

use tracing::{debug, error, info, warn};

use crate::activity::{Activity, ActivityResult, ActivitySpec};
use crate::config::TransitionSettings;
use crate::error::{OrchestratorError, StageError};
use crate::input::InputEvent;
use crate::stage::{LoadStatus, Stage, StageDescriptor, StageEvent, StageRuntime, Systems};
use crate::state::{GameState, StageId};
use crate::transition::{
    TransitionEvent, TransitionId, TransitionOverlay, TransitionScheduler, TransitionStyle,
};
use crate::view::StageView;

/// 按描述构建阶段与活动行为
///
/// 具体变体是宿主层的封闭枚举，按清单中的 `kind` 选择。
pub trait ContentFactory {
    fn create_stage(&self, descriptor: &StageDescriptor) -> Box<dyn Stage>;

    fn create_activity(&self, spec: &ActivitySpec) -> Box<dyn Activity>;
}

/// 编排事件
#[derive(Debug, Clone, PartialEq)]
pub enum OrchestratorEvent {
    /// 目标阶段资源就绪，过渡已排入
    StageLoaded { stage: StageId },
    StageLoadFailed { stage: StageId, error: StageError },
    /// 丢弃了尚未开始过渡的加载
    LoadCancelled { stage: StageId },
    TransitionStarted {
        id: TransitionId,
        to: StageId,
        style: TransitionStyle,
    },
    /// 中间点完成切换
    StageEntered { stage: StageId },
    TransitionFinished { id: TransitionId },
    ActivityStarted {
        stage: StageId,
        index: usize,
        kind: &'static str,
    },
    ActivitySucceeded {
        stage: StageId,
        index: usize,
        result: ActivityResult,
    },
    ActivityFailed {
        stage: StageId,
        index: usize,
        result: ActivityResult,
    },
    AchievementUnlocked { stage: StageId, id: &'static str },
    StageCompleted { stage: StageId },
}

/// `transition_to` 的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// 目标已是当前阶段（或已在切换中），无事发生
    NoOp,
    /// 已开始加载并排入过渡
    Scheduled,
}

/// 阶段编排器
pub struct Orchestrator {
    factory: Box<dyn ContentFactory>,
    /// 注册顺序即阶段顺序
    order: Vec<StageId>,
    descriptors: BTreeMap<StageId, StageDescriptor>,
    active: Option<StageRuntime>,
    /// 资源加载中的目标阶段（只轮询队首）
    pending: VecDeque<StageRuntime>,
    /// 队首加载失败，等待重试
    load_failed: bool,
    transitions: TransitionScheduler<StageRuntime>,
    /// 过渡 ID → 目标阶段
    transition_targets: BTreeMap<TransitionId, StageId>,
    settings: TransitionSettings,
    auto_advance: bool,
}

impl Orchestrator {
    pub fn new(
        factory: Box<dyn ContentFactory>,
        settings: TransitionSettings,
        auto_advance: bool,
    ) -> Self {
        Self {
            factory,
            order: Vec::new(),
            descriptors: BTreeMap::new(),
            active: None,
            pending: VecDeque::new(),
            load_failed: false,
            transitions: TransitionScheduler::new(settings.degraded_max_duration),
            transition_targets: BTreeMap::new(),
            settings,
            auto_advance,
        }
    }

    // =========================================================================
    // 注册表
    // =========================================================================

    /// 注册阶段；ID 必须唯一
    pub fn register_stage(&mut self, descriptor: StageDescriptor) -> Result<(), OrchestratorError> {
        if self.descriptors.contains_key(&descriptor.id) {
            return Err(OrchestratorError::DuplicateStage { id: descriptor.id });
        }
        debug!(stage = %descriptor.id, kind = %descriptor.kind, "注册阶段");
        self.order.push(descriptor.id.clone());
        self.descriptors.insert(descriptor.id.clone(), descriptor);
        Ok(())
    }

    pub fn stage_ids(&self) -> &[StageId] {
        &self.order
    }

    pub fn descriptor(&self, id: &str) -> Option<&StageDescriptor> {
        self.descriptors.get(id)
    }

    fn index_of(&self, id: &str) -> Option<usize> {
        self.order.iter().position(|s| s == id)
    }

    /// 顺序上的下一个阶段
    pub fn next_stage_id(&self, id: &str) -> Option<&str> {
        let index = self.index_of(id)?;
        self.order.get(index + 1).map(String::as_str)
    }

    /// 完成度分母：全部活动数，无活动的阶段计一步
    pub fn total_steps(&self) -> usize {
        self.descriptors.values().map(StageDescriptor::step_count).sum()
    }

    /// 顺序规则
    ///
    /// 允许进入：当前追踪的阶段（没有时为第一个阶段），
    /// 或当前阶段已完成时的下一个阶段。
    pub fn can_enter(&self, id: &str, state: &GameState) -> bool {
        let current = state
            .current_stage
            .as_deref()
            .filter(|current| self.index_of(current).is_some());

        match current {
            None => self.order.first().is_some_and(|first| first == id),
            Some(current) if current == id => true,
            Some(current) => {
                self.next_stage_id(current) == Some(id) && state.is_stage_complete(current)
            }
        }
    }

    // =========================================================================
    // 切换
    // =========================================================================

    /// 请求进入阶段
    pub fn transition_to(
        &mut self,
        id: &str,
        sys: &mut Systems<'_>,
    ) -> Result<TransitionOutcome, OrchestratorError> {
        let Some(descriptor) = self.descriptors.get(id) else {
            return Err(OrchestratorError::UnknownStage { id: id.to_string() });
        };

        if self.active_id() == Some(id) && !self.is_busy() {
            debug!(stage = id, "已是当前阶段");
            return Ok(TransitionOutcome::NoOp);
        }
        if self.last_in_flight() == Some(id) {
            debug!(stage = id, "阶段已在切换中");
            return Ok(TransitionOutcome::NoOp);
        }

        let state = sys.progress.state();
        if !self.can_enter(id, state) {
            return Err(OrchestratorError::EntryDenied {
                id: id.to_string(),
                current: state.current_stage.clone(),
            });
        }

        let activities = descriptor
            .activities
            .iter()
            .map(|spec| self.factory.create_activity(spec))
            .collect();
        let stage = self.factory.create_stage(descriptor);
        let mut runtime = StageRuntime::new(descriptor.clone(), stage, activities);
        runtime.request_assets(&mut *sys.assets);

        info!(stage = id, "开始加载阶段");
        self.pending.push_back(runtime);
        Ok(TransitionOutcome::Scheduled)
    }

    /// 切换中最后一个目标
    fn last_in_flight(&self) -> Option<&str> {
        self.pending.back().map(StageRuntime::id).or_else(|| {
            self.transition_targets
                .values()
                .next_back()
                .map(String::as_str)
        })
    }

    /// 重新请求失败的资源
    pub fn retry_load(&mut self, sys: &mut Systems<'_>) -> Result<usize, OrchestratorError> {
        if !self.load_failed {
            return Err(OrchestratorError::NothingToRetry);
        }
        let Some(front) = self.pending.front_mut() else {
            return Err(OrchestratorError::NothingToRetry);
        };
        let count = front
            .retry_load(&mut *sys.assets)
            .map_err(|_| OrchestratorError::NothingToRetry)?;
        self.load_failed = false;
        Ok(count)
    }

    /// 丢弃所有尚未开始过渡的加载
    pub fn cancel_pending(&mut self) -> Vec<OrchestratorEvent> {
        self.load_failed = false;
        self.pending
            .drain(..)
            .map(|stage| {
                info!(stage = stage.id(), "取消阶段加载");
                OrchestratorEvent::LoadCancelled {
                    stage: stage.id().to_string(),
                }
            })
            .collect()
    }

    /// 跳过当前过渡
    pub fn skip_transition(&mut self) -> bool {
        self.transitions.skip_current()
    }

    // =========================================================================
    // 每帧
    // =========================================================================

    /// 推进加载、过渡与当前阶段
    ///
    /// 过渡进行中当前阶段冻结。
    pub fn update(&mut self, dt: f32, sys: &mut Systems<'_>) -> Vec<OrchestratorEvent> {
        let mut events = Vec::new();

        self.poll_pending(sys, &mut events);

        for event in self.transitions.update(dt) {
            match event {
                TransitionEvent::Started { id, style } => {
                    let to = self.transition_targets.get(&id).cloned().unwrap_or_default();
                    events.push(OrchestratorEvent::TransitionStarted { id, to, style });
                }
                TransitionEvent::Midpoint { id, payload } => {
                    self.transition_targets.remove(&id);
                    self.swap_stage(payload, sys, &mut events);
                }
                TransitionEvent::Finished { id } => {
                    events.push(OrchestratorEvent::TransitionFinished { id });
                }
            }
        }

        if !self.transitions.is_active()
            && let Some(active) = self.active.as_mut()
        {
            let stage_id = active.id().to_string();
            let stage_events = active.update(dt, sys);
            map_stage_events(&stage_id, stage_events, &mut events);
        }

        self.advance_if_completed(sys, &mut events);
        events
    }

    /// 把输入交给当前阶段（过渡中丢弃）
    pub fn handle_input(&mut self, input: &InputEvent, sys: &mut Systems<'_>) -> Vec<OrchestratorEvent> {
        let mut events = Vec::new();
        if self.transitions.is_active() {
            debug!(?input, "过渡中，忽略输入");
            return events;
        }
        if let Some(active) = self.active.as_mut() {
            let stage_id = active.id().to_string();
            let stage_events = active.handle_input(input, sys);
            map_stage_events(&stage_id, stage_events, &mut events);
        }
        self.advance_if_completed(sys, &mut events);
        events
    }

    /// 重试当前阶段失败的活动
    pub fn retry_activity(&mut self, sys: &mut Systems<'_>) -> Result<Vec<OrchestratorEvent>, StageError> {
        let mut events = Vec::new();
        if let Some(active) = self.active.as_mut() {
            let stage_id = active.id().to_string();
            let stage_events = active.retry_activity(sys)?;
            map_stage_events(&stage_id, stage_events, &mut events);
        }
        Ok(events)
    }

    fn poll_pending(&mut self, sys: &mut Systems<'_>, events: &mut Vec<OrchestratorEvent>) {
        let Some(front) = self.pending.front_mut() else {
            return;
        };

        match front.poll_load(&*sys.assets) {
            LoadStatus::Loading => {}
            LoadStatus::Failed(errors) => {
                self.load_failed = true;
                let stage = front.id().to_string();
                for error in errors {
                    events.push(OrchestratorEvent::StageLoadFailed {
                        stage: stage.clone(),
                        error,
                    });
                }
            }
            LoadStatus::Ready => {
                self.load_failed = false;
                if let Some(stage) = self.pending.pop_front() {
                    let target = stage.id().to_string();
                    let id = self.transitions.begin(
                        self.settings.style.clone(),
                        self.settings.request_config(),
                        stage,
                    );
                    self.transition_targets.insert(id, target.clone());
                    events.push(OrchestratorEvent::StageLoaded { stage: target });
                }
            }
        }
    }

    /// 中间点：拆除旧阶段 → 构建新阶段 → 标记当前
    fn swap_stage(
        &mut self,
        mut next: StageRuntime,
        sys: &mut Systems<'_>,
        events: &mut Vec<OrchestratorEvent>,
    ) {
        if let Some(mut old) = self.active.take() {
            old.teardown(sys);
        }
        sys.effects.clear_all();

        let stage_id = next.id().to_string();
        match next.activate(sys) {
            Ok(stage_events) => {
                sys.progress.set_current_stage(&stage_id);
                info!(stage = %stage_id, "进入阶段");
                events.push(OrchestratorEvent::StageEntered {
                    stage: stage_id.clone(),
                });
                map_stage_events(&stage_id, stage_events, events);
                self.active = Some(next);
            }
            Err(e) => {
                error!(error = %e, "阶段激活失败");
            }
        }
    }

    fn advance_if_completed(&mut self, sys: &mut Systems<'_>, events: &mut Vec<OrchestratorEvent>) {
        if !self.auto_advance {
            return;
        }
        let Some(completed) = events.iter().rev().find_map(|e| match e {
            OrchestratorEvent::StageCompleted { stage } => Some(stage.clone()),
            _ => None,
        }) else {
            return;
        };
        let Some(next) = self.next_stage_id(&completed).map(str::to_string) else {
            return;
        };
        if let Err(e) = self.transition_to(&next, sys) {
            warn!(error = %e, "自动进入下一阶段失败");
        }
    }

    // =========================================================================
    // 查询
    // =========================================================================

    pub fn active(&self) -> Option<&StageRuntime> {
        self.active.as_ref()
    }

    pub fn active_id(&self) -> Option<&str> {
        self.active.as_ref().map(StageRuntime::id)
    }

    /// 有加载或过渡尚未结束
    pub fn is_busy(&self) -> bool {
        !self.pending.is_empty() || self.transitions.is_busy()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_transitioning(&self) -> bool {
        self.transitions.is_active()
    }

    pub fn set_degraded(&mut self, degraded: bool) {
        self.transitions.set_degraded(degraded);
    }

    pub fn overlay(&self) -> Option<TransitionOverlay> {
        self.transitions.overlay()
    }

    pub fn view(&self) -> Option<StageView> {
        self.active.as_ref().map(StageRuntime::view)
    }

    /// 拆除当前阶段并丢弃所有加载与过渡
    pub fn teardown(&mut self, sys: &mut Systems<'_>) {
        if let Some(mut active) = self.active.take() {
            active.teardown(sys);
        }
        sys.effects.clear_all();
        let dropped = self.pending.len() + self.transitions.clear();
        self.pending.clear();
        self.transition_targets.clear();
        self.load_failed = false;
        debug!(dropped, "编排器已拆除");
    }
}

fn map_stage_events(stage: &str, events: Vec<StageEvent>, out: &mut Vec<OrchestratorEvent>) {
    let stage = stage.to_string();
    out.extend(events.into_iter().map(|event| match event {
        StageEvent::ActivityStarted { index, kind } => OrchestratorEvent::ActivityStarted {
            stage: stage.clone(),
            index,
            kind,
        },
        StageEvent::ActivitySucceeded { index, result } => OrchestratorEvent::ActivitySucceeded {
            stage: stage.clone(),
            index,
            result,
        },
        StageEvent::ActivityFailed { index, result } => OrchestratorEvent::ActivityFailed {
            stage: stage.clone(),
            index,
            result,
        },
        StageEvent::AchievementUnlocked { id } => OrchestratorEvent::AchievementUnlocked {
            stage: stage.clone(),
            id,
        },
        StageEvent::Completed => OrchestratorEvent::StageCompleted {
            stage: stage.clone(),
        },
    }));
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("order", &self.order)
            .field("active", &self.active_id())
            .field("pending", &self.pending.len())
            .field("transitions", &self.transitions)
            .finish_non_exhaustive()
    }
}
