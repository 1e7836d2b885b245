//! # GameLoop 模块
//!
//! 帧循环：持有编排器、特效池、进度追踪器与全部外部服务。
//!
//! ## 每帧顺序
//!
//! ```text
//! tick(now)
//!   → delta = now - last（上限 max_delta）
//!   → 性能采样（必要时切换降级模式）
//!   → update：资源轮询 → 输入 → 编排器/阶段/活动 → 特效
//!   → render：begin → 阶段 → 特效（按图层）→ 过渡遮罩 → end
//! ```
//!
//! 循环本身不读时钟：调用方传入单调时间戳，测试可以逐帧驱动。
//! update/render 中的错误在循环边界记录，循环继续运行。

use std::collections::VecDeque;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::config::{PerformanceSettings, RuntimeConfig};
use crate::effects::EffectPool;
use crate::error::{OrchestratorError, RuntimeError};
use crate::input::InputEvent;
use crate::orchestrator::{ContentFactory, Orchestrator, OrchestratorEvent, TransitionOutcome};
use crate::progress::ProgressTracker;
use crate::services::Services;
use crate::stage::{StageDescriptor, Systems};

/// 循环状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Running,
    Paused,
    Stopped,
}

/// 滚动窗口帧率监控
#[derive(Debug)]
pub struct PerformanceMonitor {
    settings: PerformanceSettings,
    samples: VecDeque<f32>,
    degraded: bool,
}

impl PerformanceMonitor {
    pub fn new(settings: PerformanceSettings) -> Self {
        let degraded = settings.force_degraded;
        Self {
            samples: VecDeque::with_capacity(settings.window),
            settings,
            degraded,
        }
    }

    /// 记录一帧的原始 delta（未截断）
    ///
    /// 模式切换时返回新的降级状态。
    pub fn record(&mut self, raw_delta: f32) -> Option<bool> {
        if self.settings.force_degraded || !self.settings.auto_degrade || raw_delta <= 0.0 {
            return None;
        }

        self.samples.push_back(raw_delta);
        while self.samples.len() > self.settings.window.max(1) {
            self.samples.pop_front();
        }
        if self.samples.len() < self.settings.window.max(1) {
            return None;
        }

        let fps = self.average_fps()?;
        let next = if self.degraded {
            fps <= self.settings.recover_above_fps
        } else {
            fps < self.settings.degrade_below_fps
        };
        if next == self.degraded {
            return None;
        }

        self.degraded = next;
        // 切换后重新采样
        self.samples.clear();
        Some(next)
    }

    /// 窗口内平均帧率
    pub fn average_fps(&self) -> Option<f32> {
        let total: f32 = self.samples.iter().sum();
        (total > 0.0).then(|| self.samples.len() as f32 / total)
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded
    }
}

/// 单帧报告
#[derive(Debug, Clone, PartialEq)]
pub struct FrameReport {
    pub frame: u64,
    /// 截断后的 delta（秒）
    pub delta: f32,
    pub events: Vec<OrchestratorEvent>,
    pub errors: Vec<RuntimeError>,
    pub degraded: bool,
}

/// 循环统计
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoopStats {
    pub frames: u64,
    pub errors: u64,
    /// 模拟时间累计（秒）
    pub simulated_secs: f64,
    pub degraded_switches: u32,
}

/// 帧循环
pub struct GameLoop {
    config: RuntimeConfig,
    state: LoopState,
    orchestrator: Orchestrator,
    progress: ProgressTracker,
    effects: EffectPool,
    services: Services,
    monitor: PerformanceMonitor,
    inputs: VecDeque<InputEvent>,
    last_tick: Option<Duration>,
    stats: LoopStats,
}

/// 从各自字段借出 [`Systems`]
fn systems<'a>(
    services: &'a mut Services,
    progress: &'a mut ProgressTracker,
    effects: &'a mut EffectPool,
) -> Systems<'a> {
    Systems {
        assets: services.assets.as_mut(),
        audio: services.audio.as_mut(),
        ui: services.ui.as_mut(),
        progress,
        effects,
    }
}

impl GameLoop {
    pub fn new(
        config: RuntimeConfig,
        factory: Box<dyn ContentFactory>,
        services: Services,
        progress: ProgressTracker,
    ) -> Self {
        let mut orchestrator =
            Orchestrator::new(factory, config.transition.clone(), config.auto_advance);
        let mut effects = EffectPool::new(config.effects.clone());
        let monitor = PerformanceMonitor::new(config.performance.clone());
        if monitor.is_degraded() {
            orchestrator.set_degraded(true);
            effects.set_degraded(true);
        }

        Self {
            config,
            state: LoopState::Idle,
            orchestrator,
            progress,
            effects,
            services,
            monitor,
            inputs: VecDeque::new(),
            last_tick: None,
            stats: LoopStats::default(),
        }
    }

    /// 注册阶段并更新完成度分母
    pub fn register_stage(&mut self, descriptor: StageDescriptor) -> Result<(), OrchestratorError> {
        self.orchestrator.register_stage(descriptor)?;
        self.progress.set_total_steps(self.orchestrator.total_steps());
        Ok(())
    }

    // =========================================================================
    // 生命周期
    // =========================================================================

    /// Idle → Running
    pub fn start(&mut self, now: Duration) -> bool {
        if self.state != LoopState::Idle {
            return false;
        }
        self.state = LoopState::Running;
        self.last_tick = Some(now);
        info!(
            target_fps = self.config.game_loop.target_fps,
            degraded = self.monitor.is_degraded(),
            "帧循环启动"
        );
        true
    }

    pub fn pause(&mut self) -> bool {
        if self.state != LoopState::Running {
            return false;
        }
        self.state = LoopState::Paused;
        debug!(frame = self.stats.frames, "帧循环暂停");
        true
    }

    /// 恢复；暂停期间的墙钟时间不计入下一帧
    pub fn resume(&mut self, now: Duration) -> bool {
        if self.state != LoopState::Paused {
            return false;
        }
        self.state = LoopState::Running;
        self.last_tick = Some(now);
        debug!(frame = self.stats.frames, "帧循环恢复");
        true
    }

    /// 停止并拆除所有受管对象
    pub fn stop(&mut self) {
        if self.state == LoopState::Stopped {
            return;
        }
        let mut sys = systems(&mut self.services, &mut self.progress, &mut self.effects);
        self.orchestrator.teardown(&mut sys);
        self.effects.clear_all();
        self.inputs.clear();
        self.progress.flush();
        self.state = LoopState::Stopped;
        info!(
            frames = self.stats.frames,
            errors = self.stats.errors,
            "帧循环停止"
        );
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    // =========================================================================
    // 每帧
    // =========================================================================

    /// 排入输入，下一帧处理
    pub fn push_input(&mut self, input: InputEvent) {
        self.inputs.push_back(input);
    }

    /// 推进一帧；非运行状态返回 `None`
    pub fn tick(&mut self, now: Duration) -> Option<FrameReport> {
        if self.state != LoopState::Running {
            return None;
        }

        let raw = self
            .last_tick
            .map_or(0.0, |last| now.saturating_sub(last).as_secs_f32());
        self.last_tick = Some(now);
        let delta = raw.min(self.config.game_loop.effective_max_delta());

        if let Some(degraded) = self.monitor.record(raw) {
            self.apply_degraded(degraded);
        }

        self.stats.frames += 1;
        self.stats.simulated_secs += f64::from(delta);
        let mut report = FrameReport {
            frame: self.stats.frames,
            delta,
            events: Vec::new(),
            errors: Vec::new(),
            degraded: self.monitor.is_degraded(),
        };

        report.events = self.update(delta);
        for event in &report.events {
            if let OrchestratorEvent::StageLoadFailed { error, .. } = event {
                report.errors.push(RuntimeError::Stage(error.clone()));
            }
        }

        if let Err(e) = self.render() {
            error!(frame = report.frame, error = %e, "渲染失败");
            report.errors.push(e);
        }

        self.stats.errors += report.errors.len() as u64;
        Some(report)
    }

    fn update(&mut self, dt: f32) -> Vec<OrchestratorEvent> {
        self.services.assets.poll();
        self.progress.record_play_time(f64::from(dt));

        let mut sys = systems(&mut self.services, &mut self.progress, &mut self.effects);
        let mut events = Vec::new();
        while let Some(input) = self.inputs.pop_front() {
            events.extend(self.orchestrator.handle_input(&input, &mut sys));
        }
        events.extend(self.orchestrator.update(dt, &mut sys));
        self.effects.update(dt);
        events
    }

    fn render(&mut self) -> Result<(), RuntimeError> {
        let renderer = self.services.renderer.as_mut();
        renderer.begin_frame();
        if let Some(view) = self.orchestrator.view() {
            renderer.draw_stage(&view);
        }
        self.effects.render(renderer);
        if let Some(overlay) = self.orchestrator.overlay() {
            renderer.draw_transition(&overlay);
        }
        renderer.end_frame()?;
        Ok(())
    }

    fn apply_degraded(&mut self, degraded: bool) {
        if degraded {
            warn!(fps = ?self.monitor.average_fps(), "帧率过低，进入降级模式");
        } else {
            info!("帧率恢复，退出降级模式");
        }
        self.stats.degraded_switches += 1;
        self.effects.set_degraded(degraded);
        self.orchestrator.set_degraded(degraded);
    }

    // =========================================================================
    // 编排
    // =========================================================================

    pub fn transition_to(&mut self, id: &str) -> Result<TransitionOutcome, OrchestratorError> {
        let mut sys = systems(&mut self.services, &mut self.progress, &mut self.effects);
        self.orchestrator.transition_to(id, &mut sys)
    }

    /// 进入追踪的当前阶段（没有时为第一个阶段）
    pub fn enter_current_stage(&mut self) -> Result<TransitionOutcome, OrchestratorError> {
        let tracked = self
            .progress
            .state()
            .current_stage
            .clone()
            .filter(|id| self.orchestrator.descriptor(id).is_some());
        let target = match tracked {
            Some(id) => id,
            None => self
                .orchestrator
                .stage_ids()
                .first()
                .cloned()
                .ok_or_else(|| OrchestratorError::UnknownStage { id: String::new() })?,
        };
        self.transition_to(&target)
    }

    pub fn retry_load(&mut self) -> Result<usize, OrchestratorError> {
        let mut sys = systems(&mut self.services, &mut self.progress, &mut self.effects);
        self.orchestrator.retry_load(&mut sys)
    }

    pub fn retry_activity(&mut self) -> Result<Vec<OrchestratorEvent>, RuntimeError> {
        let mut sys = systems(&mut self.services, &mut self.progress, &mut self.effects);
        Ok(self.orchestrator.retry_activity(&mut sys)?)
    }

    pub fn cancel_pending(&mut self) -> Vec<OrchestratorEvent> {
        self.orchestrator.cancel_pending()
    }

    pub fn skip_transition(&mut self) -> bool {
        self.orchestrator.skip_transition()
    }

    /// 新游戏：拆除当前阶段，重置本局进度
    pub fn start_new_game(&mut self) {
        let mut sys = systems(&mut self.services, &mut self.progress, &mut self.effects);
        self.orchestrator.teardown(&mut sys);
        self.effects.clear_all();
        self.progress.start_new_game();
    }

    // =========================================================================
    // 查询
    // =========================================================================

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    pub fn progress(&self) -> &ProgressTracker {
        &self.progress
    }

    /// 订阅进度事件、修改设置
    pub fn progress_mut(&mut self) -> &mut ProgressTracker {
        &mut self.progress
    }

    pub fn effects(&self) -> &EffectPool {
        &self.effects
    }

    pub fn stats(&self) -> &LoopStats {
        &self.stats
    }

    pub fn is_degraded(&self) -> bool {
        self.monitor.is_degraded()
    }
}

impl std::fmt::Debug for GameLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GameLoop")
            .field("state", &self.state)
            .field("orchestrator", &self.orchestrator)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::ActivitySpec;
    use crate::error::RenderError;
    use crate::services::SilentAudio;
    use crate::testing::{MockAssets, MockUi, RecordingRenderer, TestFactory, shared};
    use std::cell::RefCell;
    use std::rc::Rc;

    struct Fixture {
        game: GameLoop,
        ui: Rc<RefCell<MockUi>>,
        renderer: Rc<RefCell<RecordingRenderer>>,
    }

    fn fixture(config: RuntimeConfig) -> Fixture {
        let ui = shared(MockUi::default());
        let renderer = shared(RecordingRenderer::default());
        let services = Services {
            assets: Box::new(MockAssets::default()),
            audio: Box::new(SilentAudio),
            ui: Box::new(ui.clone()),
            renderer: Box::new(renderer.clone()),
        };
        let mut game = GameLoop::new(
            config,
            Box::new(TestFactory),
            services,
            ProgressTracker::new(),
        );
        game.register_stage(
            StageDescriptor::new("intro", "Intro").with_kind("intro"),
        )
        .unwrap();
        game.register_stage(
            StageDescriptor::new("lesson", "Lesson")
                .with_activity(ActivitySpec::new("clicks").with_time_limit(30.0)),
        )
        .unwrap();
        Fixture { game, ui, renderer }
    }

    fn quiet_config() -> RuntimeConfig {
        let mut config = RuntimeConfig::default();
        config.performance.auto_degrade = false;
        config.transition.duration = 0.05;
        config
    }

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    /// 以 60 FPS 推进若干帧，返回最后的时间戳
    fn run(game: &mut GameLoop, from: Duration, frames: u64) -> (Duration, Vec<FrameReport>) {
        let mut now = from;
        let mut reports = Vec::new();
        for _ in 0..frames {
            now += Duration::from_micros(16_667);
            reports.extend(game.tick(now));
        }
        (now, reports)
    }

    #[test]
    fn test_delta_clamped_to_max_delta() {
        let mut fx = fixture(quiet_config());
        fx.game.start(ms(0));

        let report = fx.game.tick(ms(1000)).unwrap();
        assert!((report.delta - 1.0 / 60.0).abs() < 1e-6);
        assert_eq!(report.frame, 1);
    }

    #[test]
    fn test_tick_only_while_running() {
        let mut fx = fixture(quiet_config());
        assert!(fx.game.tick(ms(10)).is_none());

        fx.game.start(ms(0));
        assert!(fx.game.pause());
        assert!(fx.game.tick(ms(20)).is_none());

        // 暂停期间的时间不计入
        assert!(fx.game.resume(ms(5000)));
        let report = fx.game.tick(ms(5010)).unwrap();
        assert!((report.delta - 0.01).abs() < 1e-4);
        assert_eq!(fx.game.stats().frames, 1);
    }

    #[test]
    fn test_curriculum_flow() {
        let mut fx = fixture(quiet_config());
        fx.game.start(ms(0));
        assert_eq!(
            fx.game.enter_current_stage(),
            Ok(TransitionOutcome::Scheduled)
        );
        let (now, _) = run(&mut fx.game, ms(0), 12);
        assert_eq!(fx.game.orchestrator().active_id(), Some("intro"));

        fx.game.push_input(InputEvent::Continue);
        let (now, reports) = run(&mut fx.game, now, 12);
        let events: Vec<_> = reports.into_iter().flat_map(|r| r.events).collect();
        assert!(events.contains(&OrchestratorEvent::StageCompleted {
            stage: "intro".to_string()
        }));
        assert_eq!(fx.game.orchestrator().active_id(), Some("lesson"));

        fx.game.push_input(InputEvent::click(5.0, 5.0));
        run(&mut fx.game, now, 1);
        let state = fx.game.progress().state();
        assert!(state.is_stage_complete("lesson"));
        assert_eq!(fx.game.progress().completion_percent(), 100.0);
    }

    #[test]
    fn test_stop_tears_down_everything() {
        let mut fx = fixture(quiet_config());
        fx.game.start(ms(0));
        fx.game.enter_current_stage().unwrap();
        run(&mut fx.game, ms(0), 12);
        assert!(fx.ui.borrow().live() > 0);

        fx.game.stop();
        assert_eq!(fx.game.state(), LoopState::Stopped);
        assert_eq!(fx.ui.borrow().live(), 0);
        assert!(fx.game.orchestrator().active().is_none());
        assert!(fx.game.effects().is_empty());
        assert!(fx.game.tick(ms(10_000)).is_none());
    }

    #[test]
    fn test_render_errors_are_caught() {
        let mut fx = fixture(quiet_config());
        fx.renderer.borrow_mut().fail_frames = 2;
        fx.game.start(ms(0));

        let (_, reports) = run(&mut fx.game, ms(0), 4);
        assert_eq!(reports.len(), 4);
        assert_eq!(
            reports[0].errors,
            vec![RuntimeError::Render(RenderError::Backend(
                "scripted failure".to_string()
            ))]
        );
        assert!(reports[3].errors.is_empty());
        assert_eq!(fx.game.stats().errors, 2);
    }

    #[test]
    fn test_render_order() {
        let mut fx = fixture(quiet_config());
        fx.game.start(ms(0));
        fx.game.enter_current_stage().unwrap();
        let (now, _) = run(&mut fx.game, ms(0), 12);
        fx.game.push_input(InputEvent::Continue);
        run(&mut fx.game, now, 1);

        let renderer = fx.renderer.borrow();
        let last_frame = renderer.frames.last().unwrap();
        assert_eq!(last_frame.first().map(String::as_str), Some("begin"));
        assert_eq!(last_frame.last().map(String::as_str), Some("end"));
        let stage = last_frame.iter().position(|c| c == "stage").unwrap();
        let first_effect = last_frame.iter().position(|c| c.starts_with("effect")).unwrap();
        let transition = last_frame.iter().position(|c| c == "transition").unwrap();
        assert!(stage < first_effect && first_effect < transition);
    }

    #[test]
    fn test_auto_degrade_and_recover() {
        let mut config = quiet_config();
        config.performance = PerformanceSettings {
            auto_degrade: true,
            window: 4,
            ..PerformanceSettings::default()
        };
        let mut fx = fixture(config);
        fx.game.start(ms(0));

        // 10 FPS
        let mut now = ms(0);
        for _ in 0..4 {
            now += ms(100);
            fx.game.tick(now);
        }
        assert!(fx.game.is_degraded());
        assert!(fx.game.effects().is_degraded());

        // 100 FPS
        for _ in 0..4 {
            now += ms(10);
            fx.game.tick(now);
        }
        assert!(!fx.game.is_degraded());
        assert_eq!(fx.game.stats().degraded_switches, 2);
    }

    #[test]
    fn test_force_degraded() {
        let mut config = quiet_config();
        config.performance.force_degraded = true;
        let mut fx = fixture(config);
        fx.game.start(ms(0));

        let (_, reports) = run(&mut fx.game, ms(0), 3);
        assert!(reports.iter().all(|r| r.degraded));
        assert!(fx.game.effects().is_degraded());
    }

    #[test]
    fn test_new_game_resets_run() {
        let mut fx = fixture(quiet_config());
        fx.game.start(ms(0));
        fx.game.enter_current_stage().unwrap();
        let (now, _) = run(&mut fx.game, ms(0), 12);
        fx.game.push_input(InputEvent::Continue);
        run(&mut fx.game, now, 12);
        assert!(fx.game.progress().state().score > 0);

        fx.game.start_new_game();
        assert_eq!(fx.game.progress().state().score, 0);
        assert!(fx.game.orchestrator().active().is_none());
        assert_eq!(fx.ui.borrow().live(), 0);
        assert!(fx.game.progress().state().current_stage.is_none());
    }

    #[test]
    fn test_monitor_needs_full_window() {
        let mut monitor = PerformanceMonitor::new(PerformanceSettings {
            window: 3,
            ..PerformanceSettings::default()
        });
        assert_eq!(monitor.record(0.5), None);
        assert_eq!(monitor.record(0.5), None);
        assert_eq!(monitor.record(0.5), Some(true));
        assert!(monitor.is_degraded());
    }
}
