//! # Driver 模块
//!
//! 组装会话并驱动帧循环。
//!
//! - [`run_headless`]：按固定步长推进模拟时间，不睡眠，用于测试与 CI
//! - [`run_realtime`]：按目标帧率节拍推进，每帧睡掉剩余时间

use std::cell::RefCell;
use std::rc::Rc;
use std::thread;
use std::time::{Duration, Instant};

use stage_runtime::{
    FrameReport, GameLoop, InputEvent, OrchestratorError, OrchestratorEvent, PersistenceService,
    ProgressEvent, ProgressTracker, Services,
};
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::manifest::Manifest;
use crate::replay::{Replay, ReplayAction};
use crate::services::{HeadlessAssets, LogAudio, RenderStats, TraceRenderer, UiRegistry};
use crate::stages::CurriculumFactory;

/// 一次运行的全部状态
pub struct Session {
    pub game: GameLoop,
    pub ui: UiRegistry,
    pub render_stats: Rc<RefCell<RenderStats>>,
    trace_frames: bool,
}

/// 会话选项
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    /// 开始前重置本局进度
    pub new_game: bool,
}

impl Session {
    /// 按配置和清单组装会话，注册全部阶段
    pub fn new(
        config: &AppConfig,
        manifest: &Manifest,
        persistence: Box<dyn PersistenceService>,
        options: SessionOptions,
    ) -> Result<Self, OrchestratorError> {
        let ui = UiRegistry::default();
        let renderer = TraceRenderer::new(ui.clone());
        let render_stats = renderer.stats();
        let services = Services {
            assets: Box::new(HeadlessAssets::new(&config.assets_root)),
            audio: Box::new(LogAudio::default()),
            ui: Box::new(ui.clone()),
            renderer: Box::new(renderer),
        };

        let mut progress = ProgressTracker::with_persistence(persistence);
        if options.new_game {
            progress.start_new_game();
        }
        if let Some(enabled) = config.audio.sound_enabled {
            progress.set_sound_enabled(enabled);
        }
        if let Some(locale) = &config.locale {
            progress.set_locale(locale);
        }
        progress.subscribe(log_progress_event);

        let mut game = GameLoop::new(
            config.runtime_config(),
            Box::new(CurriculumFactory),
            services,
            progress,
        );
        for descriptor in &manifest.stages {
            game.register_stage(descriptor.clone())?;
        }
        info!(
            title = %manifest.title,
            stages = manifest.stages.len(),
            steps = game.progress().total_steps(),
            "课程已加载"
        );

        Ok(Self {
            game,
            ui,
            render_stats,
            trace_frames: config.debug.trace_frames,
        })
    }

    /// 启动循环并进入追踪的阶段
    pub fn start(&mut self, now: Duration) {
        self.game.start(now);
        if let Err(e) = self.game.enter_current_stage() {
            warn!(error = %e, "无法进入起始阶段");
        }
    }

    /// 执行一个回放动作
    pub fn apply(&mut self, action: ReplayAction) {
        match action {
            ReplayAction::Input { event } => self.game.push_input(event),
            ReplayAction::ClickButton { text } => match self.ui.button_center(&text) {
                Some((x, y)) => self.game.push_input(InputEvent::click(x, y)),
                None => warn!(text = %text, "回放: 找不到按钮"),
            },
            ReplayAction::TransitionTo { stage } => {
                if let Err(e) = self.game.transition_to(&stage) {
                    warn!(stage = %stage, error = %e, "回放: 无法进入阶段");
                }
            }
            ReplayAction::SkipTransition => {
                self.game.skip_transition();
            }
            ReplayAction::RetryLoad => {
                if let Err(e) = self.game.retry_load() {
                    warn!(error = %e, "回放: 无法重试加载");
                }
            }
            ReplayAction::CancelPending => {
                for event in self.game.cancel_pending() {
                    log_event(&event);
                }
            }
            ReplayAction::NewGame => {
                self.game.start_new_game();
                if let Err(e) = self.game.enter_current_stage() {
                    warn!(error = %e, "回放: 新游戏无法进入起始阶段");
                }
            }
        }
    }

    /// 推进一帧并记录事件
    pub fn step(&mut self, now: Duration) -> Option<FrameReport> {
        let report = self.game.tick(now)?;
        for event in &report.events {
            log_event(event);
        }
        if self.trace_frames {
            debug!(
                frame = report.frame,
                delta = report.delta,
                events = report.events.len(),
                degraded = report.degraded,
                "帧完成"
            );
        }
        Some(report)
    }

    /// 通关且没有待处理的回放、加载或过渡
    fn is_settled(&self, replay: &Replay) -> bool {
        self.game.progress().state().game_completed
            && replay.is_finished()
            && !self.game.orchestrator().is_busy()
    }

    pub fn summary(&self) -> RunSummary {
        let state = self.game.progress().state();
        RunSummary {
            frames: self.game.stats().frames,
            errors: self.game.stats().errors,
            current_stage: self.game.orchestrator().active_id().map(str::to_string),
            score: state.score,
            completion_percent: self.game.progress().completion_percent(),
            completed_stages: state.completed_stage_count(),
            achievements: state.unlocked_achievements.iter().cloned().collect(),
            game_completed: state.game_completed,
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("game", &self.game)
            .field("widgets", &self.ui.len())
            .finish_non_exhaustive()
    }
}

/// 运行结果摘要
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub frames: u64,
    pub errors: u64,
    pub current_stage: Option<String>,
    pub score: u64,
    pub completion_percent: f32,
    pub completed_stages: usize,
    pub achievements: Vec<String>,
    pub game_completed: bool,
}

/// 以固定步长运行最多 `max_frames` 帧
///
/// 通关且回放耗尽后提前结束。
pub fn run_headless(session: &mut Session, mut replay: Replay, max_frames: u64) -> RunSummary {
    let step = Duration::from_secs_f32(session.game.config().game_loop.frame_duration());
    let mut now = Duration::ZERO;
    session.start(now);

    for frame in 1..=max_frames {
        for action in replay.take_due(frame) {
            session.apply(action);
        }
        now += step;
        session.step(now);

        if session.is_settled(&replay) {
            info!(frame, "课程完成，提前结束");
            break;
        }
    }

    session.game.stop();
    session.summary()
}

/// 按目标帧率实时运行
///
/// `max_frames` 为 `None` 时运行到通关为止。
pub fn run_realtime(
    session: &mut Session,
    mut replay: Replay,
    max_frames: Option<u64>,
) -> RunSummary {
    let frame_duration = Duration::from_secs_f32(session.game.config().game_loop.frame_duration());
    let clock = Instant::now();
    session.start(clock.elapsed());
    info!(
        fps = session.game.config().game_loop.target_fps,
        "实时循环启动"
    );

    let mut frame = 0;
    while max_frames.is_none_or(|max| frame < max) {
        let frame_start = Instant::now();
        frame += 1;

        for action in replay.take_due(frame) {
            session.apply(action);
        }
        session.step(clock.elapsed());

        if session.is_settled(&replay) {
            info!(frame, "课程完成");
            break;
        }

        let elapsed = frame_start.elapsed();
        if elapsed < frame_duration {
            thread::sleep(frame_duration - elapsed);
        }
    }

    session.game.stop();
    session.summary()
}

fn log_event(event: &OrchestratorEvent) {
    match event {
        OrchestratorEvent::StageEntered { stage } => info!(stage = %stage, "进入阶段"),
        OrchestratorEvent::StageCompleted { stage } => info!(stage = %stage, "阶段完成"),
        OrchestratorEvent::StageLoadFailed { stage, error } => {
            warn!(stage = %stage, error = %error, "阶段加载失败")
        }
        OrchestratorEvent::ActivityFailed {
            stage,
            index,
            result,
        } => info!(stage = %stage, index, elapsed = result.elapsed, "活动失败"),
        OrchestratorEvent::ActivitySucceeded {
            stage,
            index,
            result,
        } => info!(stage = %stage, index, score = result.score, "活动成功"),
        OrchestratorEvent::AchievementUnlocked { stage, id } => {
            info!(stage = %stage, achievement = %id, "解锁成就")
        }
        other => debug!(event = ?other, "编排事件"),
    }
}

fn log_progress_event(event: &ProgressEvent) {
    match event {
        ProgressEvent::GameCompleted => info!("课程通关"),
        ProgressEvent::StepCompleted { step, percent } => {
            debug!(step = %step, percent, "步骤完成")
        }
        other => debug!(event = ?other, "进度事件"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stage_runtime::NoopPersistence;

    fn session(manifest: &str) -> Session {
        let config = AppConfig::default();
        let manifest = Manifest::from_json(manifest).unwrap();
        Session::new(
            &config,
            &manifest,
            Box::new(NoopPersistence),
            SessionOptions::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_duplicate_stage_is_rejected() {
        let manifest = Manifest::from_json(
            r#"{ "stages": [{ "id": "a", "kind": "intro" }, { "id": "a", "kind": "intro" }] }"#,
        )
        .unwrap();
        let result = Session::new(
            &AppConfig::default(),
            &manifest,
            Box::new(NoopPersistence),
            SessionOptions::default(),
        );
        assert!(matches!(
            result,
            Err(OrchestratorError::DuplicateStage { .. })
        ));
    }

    #[test]
    fn test_click_button_resolves_position() {
        let mut session = session(
            r#"{ "stages": [{ "id": "welcome", "title": "Welcome", "kind": "intro" }] }"#,
        );
        let replay = Replay::from_json(
            r#"[{ "frame": 60, "action": "click_button", "text": "Start" }]"#,
        )
        .unwrap();

        let summary = run_headless(&mut session, replay, 90);
        assert_eq!(summary.completed_stages, 1);
        assert_eq!(summary.errors, 0);
    }
}
