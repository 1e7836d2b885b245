//! # Progress 模块
//!
//! 进度与成就追踪。
//!
//! [`ProgressTracker`] 是修改 [`GameState`] 的唯一入口：
//! - 每个修改操作结束时通过持久化服务保存快照（失败只记录警告）
//! - 状态变化通过 [`EventBus<ProgressEvent>`] 同步通知订阅者

pub mod achievements;

use tracing::{debug, info, warn};

use crate::error::ProgressError;
use crate::event::{EventBus, SubscriptionId};
use crate::services::{NoopPersistence, PersistenceService};
use crate::state::GameState;

pub use achievements::{Achievement, BUILTIN_ACHIEVEMENTS};

/// 每完成一个步骤的奖励分数
pub const STEP_BONUS: u64 = 100;

/// 进度事件
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    ScoreChanged { score: u64, delta: u64 },
    StepCompleted { step: String, percent: f32 },
    StageCompleted { stage: String },
    AchievementUnlocked { id: String, name: String },
    GameCompleted,
    NewGame,
}

/// 进度追踪器
pub struct ProgressTracker {
    state: GameState,
    /// 完成度分母（由阶段注册表推导）
    total_steps: usize,
    achievements: Vec<Achievement>,
    events: EventBus<ProgressEvent>,
    persistence: Box<dyn PersistenceService>,
}

impl ProgressTracker {
    /// 纯内存追踪器
    pub fn new() -> Self {
        Self {
            state: GameState::default(),
            total_steps: 0,
            achievements: BUILTIN_ACHIEVEMENTS.to_vec(),
            events: EventBus::new(),
            persistence: Box::new(NoopPersistence),
        }
    }

    /// 使用持久化服务，并立即尝试读取存档
    pub fn with_persistence(persistence: Box<dyn PersistenceService>) -> Self {
        let mut tracker = Self::new();
        tracker.load_from(persistence);
        tracker
    }

    /// 替换成就目录
    pub fn with_achievements(mut self, achievements: Vec<Achievement>) -> Self {
        self.achievements = achievements;
        self
    }

    /// 切换持久化服务并读取其中的快照
    ///
    /// 没有存档时使用默认状态；读取失败时同样使用默认状态，
    /// 并改为纯内存运行，不覆盖原存档。返回是否成功读取到存档。
    pub fn load_from(&mut self, persistence: Box<dyn PersistenceService>) -> bool {
        self.persistence = persistence;
        match self.persistence.load() {
            Ok(Some(state)) => {
                info!(score = state.score, steps = state.completed_steps.len(), "读取进度存档");
                self.state = state;
                true
            }
            Ok(None) => {
                debug!("没有进度存档，使用默认状态");
                self.state = GameState::default();
                false
            }
            Err(e) => {
                // 读不懂的存档保持原样，本次运行只保存在内存中
                warn!(error = %e, "读取进度存档失败，使用默认状态且不再写入存档");
                self.persistence = Box::new(NoopPersistence);
                self.state = GameState::default();
                false
            }
        }
    }

    pub fn state(&self) -> &GameState {
        &self.state
    }

    pub fn achievements(&self) -> &[Achievement] {
        &self.achievements
    }

    /// 设置完成度分母
    pub fn set_total_steps(&mut self, total: usize) {
        self.total_steps = total;
    }

    pub fn total_steps(&self) -> usize {
        self.total_steps
    }

    /// 完成度百分比（0 - 100）
    pub fn completion_percent(&self) -> f32 {
        if self.total_steps == 0 {
            return 0.0;
        }
        let ratio = self.state.completed_steps.len() as f32 / self.total_steps as f32;
        (ratio * 100.0).min(100.0)
    }

    // =========================================================================
    // 订阅
    // =========================================================================

    pub fn subscribe(&mut self, handler: impl FnMut(&ProgressEvent) + 'static) -> SubscriptionId {
        self.events.subscribe(handler)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.events.unsubscribe(id)
    }

    // =========================================================================
    // 修改操作
    // =========================================================================

    /// 完成步骤
    ///
    /// 幂等：重复完成同一步骤不会再次加分，返回是否为首次完成。
    pub fn complete_step(&mut self, id: &str) -> bool {
        if !self.state.completed_steps.insert(id.to_string()) {
            return false;
        }
        self.apply_score(STEP_BONUS);

        let percent = self.completion_percent();
        debug!(step = id, percent, "步骤完成");
        self.persist();
        self.events.publish(&ProgressEvent::StepCompleted {
            step: id.to_string(),
            percent,
        });
        true
    }

    /// 加分
    ///
    /// 负数被拒绝，分数保持不变。返回新的分数。
    pub fn add_score(&mut self, amount: i64) -> Result<u64, ProgressError> {
        let delta = u64::try_from(amount).map_err(|_| ProgressError::NegativeScore { amount })?;
        self.apply_score(delta);
        self.persist();
        Ok(self.state.score)
    }

    fn apply_score(&mut self, delta: u64) {
        self.state.score = self.state.score.saturating_add(delta);
        self.state.stats.best_score = self.state.stats.best_score.max(self.state.score);
        self.events.publish(&ProgressEvent::ScoreChanged {
            score: self.state.score,
            delta,
        });
    }

    /// 记录一次成功活动的用时
    pub fn record_activity_time(&mut self, elapsed_secs: f32) {
        let elapsed = f64::from(elapsed_secs);
        let fastest = &mut self.state.stats.fastest_activity_secs;
        if fastest.is_none_or(|best| elapsed < best) {
            *fastest = Some(elapsed);
            self.persist();
        }
    }

    /// 记录阶段内一次活动失败
    pub fn record_stage_failure(&mut self, stage: &str) {
        *self
            .state
            .stage_failures
            .entry(stage.to_string())
            .or_insert(0) += 1;
        self.persist();
    }

    /// 检查成就，返回本次新解锁的成就
    pub fn check_achievements(&mut self) -> Vec<Achievement> {
        let newly: Vec<Achievement> = self
            .achievements
            .iter()
            .filter(|a| !self.state.unlocked_achievements.contains(a.id) && a.is_met(&self.state))
            .copied()
            .collect();

        if newly.is_empty() {
            return newly;
        }

        for achievement in &newly {
            info!(id = achievement.id, "解锁成就");
            self.state
                .unlocked_achievements
                .insert(achievement.id.to_string());
        }
        self.persist();
        for achievement in &newly {
            self.events.publish(&ProgressEvent::AchievementUnlocked {
                id: achievement.id.to_string(),
                name: achievement.name.to_string(),
            });
        }
        newly
    }

    /// 标记阶段完成，返回是否为首次完成
    pub fn mark_stage_complete(&mut self, id: &str) -> bool {
        if self.state.is_stage_complete(id) {
            return false;
        }
        self.state.stage_completion.insert(id.to_string(), true);
        info!(stage = id, "阶段完成");
        self.persist();
        self.events.publish(&ProgressEvent::StageCompleted {
            stage: id.to_string(),
        });
        true
    }

    /// 更新当前阶段
    pub fn set_current_stage(&mut self, id: &str) {
        self.state.current_stage = Some(id.to_string());
        self.state.stats.last_played = Some(chrono::Utc::now().timestamp());
        self.persist();
    }

    /// 通关
    ///
    /// 同一局内只计一次。
    pub fn complete_game(&mut self) -> bool {
        if self.state.game_completed {
            return false;
        }
        self.state.game_completed = true;
        self.state.completed_at = Some(chrono::Utc::now().timestamp());
        self.state.stats.completions += 1;
        info!(completions = self.state.stats.completions, "通关");
        self.persist();
        self.events.publish(&ProgressEvent::GameCompleted);
        true
    }

    /// 累计游戏时长
    ///
    /// 每帧调用，不单独保存，随下一次修改操作或 [`Self::flush`] 写入。
    pub fn record_play_time(&mut self, delta_secs: f64) {
        if delta_secs > 0.0 {
            self.state.stats.total_play_time_secs += delta_secs;
        }
    }

    pub fn set_sound_enabled(&mut self, enabled: bool) {
        self.state.settings.sound_enabled = enabled;
        self.persist();
    }

    pub fn set_locale(&mut self, locale: &str) {
        self.state.settings.locale = locale.to_string();
        self.persist();
    }

    /// 开始新游戏
    ///
    /// 清空本局步骤、分数与阶段状态；保留统计、成就与设置。
    pub fn start_new_game(&mut self) {
        self.state.reset_run();
        info!(completions = self.state.stats.completions, "开始新游戏");
        self.persist();
        self.events.publish(&ProgressEvent::NewGame);
    }

    /// 立即保存
    pub fn flush(&mut self) {
        self.persist();
    }

    fn persist(&mut self) {
        if let Err(e) = self.persistence.save(&self.state) {
            warn!(error = %e, "保存进度失败，继续以内存状态运行");
        }
    }
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ProgressTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressTracker")
            .field("state", &self.state)
            .field("total_steps", &self.total_steps)
            .field("achievements", &self.achievements.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PersistenceError;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// 记录每次保存的持久化服务
    #[derive(Default, Clone)]
    struct RecordingPersistence {
        saved: Rc<RefCell<Vec<GameState>>>,
        stored: Option<GameState>,
        load_error: Option<PersistenceError>,
    }

    impl PersistenceService for RecordingPersistence {
        fn save(&mut self, snapshot: &GameState) -> Result<(), PersistenceError> {
            self.saved.borrow_mut().push(snapshot.clone());
            Ok(())
        }

        fn load(&mut self) -> Result<Option<GameState>, PersistenceError> {
            match &self.load_error {
                Some(e) => Err(e.clone()),
                None => Ok(self.stored.clone()),
            }
        }
    }

    struct BrokenPersistence;

    impl PersistenceService for BrokenPersistence {
        fn save(&mut self, _snapshot: &GameState) -> Result<(), PersistenceError> {
            Err(PersistenceError::Unavailable("disk gone".to_string()))
        }

        fn load(&mut self) -> Result<Option<GameState>, PersistenceError> {
            Err(PersistenceError::Unavailable("disk gone".to_string()))
        }
    }

    fn collect_events(tracker: &mut ProgressTracker) -> Rc<RefCell<Vec<ProgressEvent>>> {
        let events = Rc::new(RefCell::new(Vec::new()));
        let sink = events.clone();
        tracker.subscribe(move |e| sink.borrow_mut().push(e.clone()));
        events
    }

    #[test]
    fn test_complete_step_is_idempotent() {
        let mut tracker = ProgressTracker::new();
        tracker.set_total_steps(4);

        assert!(tracker.complete_step("lesson/0"));
        assert_eq!(tracker.completion_percent(), 25.0);
        assert_eq!(tracker.state().score, STEP_BONUS);

        assert!(!tracker.complete_step("lesson/0"));
        assert_eq!(tracker.completion_percent(), 25.0);
        assert_eq!(tracker.state().score, STEP_BONUS);
    }

    #[test]
    fn test_percent_capped_and_zero_without_steps() {
        let mut tracker = ProgressTracker::new();
        tracker.complete_step("a");
        assert_eq!(tracker.completion_percent(), 0.0);

        tracker.set_total_steps(1);
        tracker.complete_step("b");
        assert_eq!(tracker.completion_percent(), 100.0);
    }

    #[test]
    fn test_step_event_carries_percent() {
        let mut tracker = ProgressTracker::new();
        tracker.set_total_steps(2);
        let events = collect_events(&mut tracker);

        tracker.complete_step("intro");

        assert_eq!(
            *events.borrow(),
            vec![
                ProgressEvent::ScoreChanged {
                    score: 100,
                    delta: 100
                },
                ProgressEvent::StepCompleted {
                    step: "intro".to_string(),
                    percent: 50.0
                },
            ]
        );
    }

    #[test]
    fn test_negative_score_rejected() {
        let mut tracker = ProgressTracker::new();
        tracker.add_score(500).unwrap();
        assert_eq!(tracker.state().stats.best_score, 500);

        let err = tracker.add_score(-10).unwrap_err();
        assert_eq!(err, ProgressError::NegativeScore { amount: -10 });
        assert_eq!(tracker.state().score, 500);
        assert_eq!(tracker.state().stats.best_score, 500);
    }

    #[test]
    fn test_best_score_never_decreases() {
        let mut tracker = ProgressTracker::new();
        tracker.add_score(800).unwrap();
        tracker.start_new_game();
        tracker.add_score(300).unwrap();

        assert_eq!(tracker.state().score, 300);
        assert_eq!(tracker.state().stats.best_score, 800);
    }

    #[test]
    fn test_check_achievements_only_returns_new_unlocks() {
        let mut tracker = ProgressTracker::new();
        let events = collect_events(&mut tracker);
        tracker.complete_step("intro");

        let unlocked = tracker.check_achievements();
        assert_eq!(unlocked.len(), 1);
        assert_eq!(unlocked[0].id, "first_step");
        assert!(tracker.check_achievements().is_empty());

        let unlock_events = events
            .borrow()
            .iter()
            .filter(|e| matches!(e, ProgressEvent::AchievementUnlocked { .. }))
            .count();
        assert_eq!(unlock_events, 1);
    }

    #[test]
    fn test_flawless_needs_a_stage_with_activities() {
        let mut tracker = ProgressTracker::new();
        tracker.complete_step("intro");
        tracker.mark_stage_complete("intro");
        let ids: Vec<_> = tracker.check_achievements().iter().map(|a| a.id).collect();
        assert!(ids.contains(&"first_stage"));
        assert!(!ids.contains(&"flawless"));

        tracker.complete_step("lesson/0");
        tracker.mark_stage_complete("lesson");
        let ids: Vec<_> = tracker.check_achievements().iter().map(|a| a.id).collect();
        assert_eq!(ids, vec!["flawless"]);
    }

    #[test]
    fn test_new_game_keeps_stats_and_achievements() {
        let mut tracker = ProgressTracker::new();
        tracker.set_total_steps(1);

        for _ in 0..3 {
            tracker.complete_step("only");
            tracker.mark_stage_complete("only");
            tracker.complete_game();
            tracker.check_achievements();
            tracker.start_new_game();
        }

        let state = tracker.state();
        assert_eq!(state.stats.completions, 3);
        assert!(state.unlocked_achievements.contains("veteran"));
        assert!(state.unlocked_achievements.contains("graduate"));
        assert!(state.completed_steps.is_empty());
        assert_eq!(state.score, 0);
        assert!(!state.game_completed);
        assert!(state.stage_completion.is_empty());
    }

    #[test]
    fn test_complete_game_counts_once_per_run() {
        let mut tracker = ProgressTracker::new();
        assert!(tracker.complete_game());
        assert!(!tracker.complete_game());
        assert_eq!(tracker.state().stats.completions, 1);
        assert!(tracker.state().completed_at.is_some());
    }

    #[test]
    fn test_every_mutation_is_persisted() {
        let persistence = RecordingPersistence::default();
        let saved = persistence.saved.clone();
        let mut tracker = ProgressTracker::with_persistence(Box::new(persistence));

        tracker.complete_step("a");
        tracker.add_score(5).unwrap();
        tracker.mark_stage_complete("a");
        tracker.set_locale("zh");
        tracker.record_play_time(0.5);

        let saved = saved.borrow();
        assert_eq!(saved.len(), 4);
        assert_eq!(saved.last().unwrap().settings.locale, "zh");
    }

    #[test]
    fn test_load_restores_snapshot() {
        let mut stored = GameState::default();
        stored.score = 42;
        let persistence = RecordingPersistence {
            stored: Some(stored),
            ..RecordingPersistence::default()
        };

        let tracker = ProgressTracker::with_persistence(Box::new(persistence));
        assert_eq!(tracker.state().score, 42);
    }

    #[test]
    fn test_unavailable_persistence_degrades_silently() {
        let mut tracker = ProgressTracker::with_persistence(Box::new(BrokenPersistence));
        assert_eq!(tracker.state(), &GameState::default());

        tracker.complete_step("a");
        assert_eq!(tracker.state().score, STEP_BONUS);
    }

    #[test]
    fn test_unreadable_snapshot_is_never_overwritten() {
        let persistence = RecordingPersistence {
            load_error: Some(PersistenceError::IncompatibleVersion {
                found: "9.0".to_string(),
                current: "1.0".to_string(),
            }),
            ..RecordingPersistence::default()
        };
        let saved = persistence.saved.clone();
        let mut tracker = ProgressTracker::with_persistence(Box::new(persistence));
        assert_eq!(tracker.state(), &GameState::default());

        tracker.set_current_stage("a");
        tracker.complete_step("a");
        tracker.flush();

        assert!(saved.borrow().is_empty());
        assert_eq!(tracker.state().current_stage.as_deref(), Some("a"));
    }

    #[test]
    fn test_fastest_activity_time() {
        let mut tracker = ProgressTracker::new();
        tracker.record_activity_time(12.0);
        tracker.record_activity_time(20.0);
        assert_eq!(tracker.state().stats.fastest_activity_secs, Some(12.0));
        tracker.record_activity_time(8.0);
        assert_eq!(tracker.state().stats.fastest_activity_secs, Some(8.0));
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let mut tracker = ProgressTracker::new();
        let events = Rc::new(RefCell::new(0));
        let counter = events.clone();
        let id = tracker.subscribe(move |_| *counter.borrow_mut() += 1);

        tracker.add_score(1).unwrap();
        assert!(tracker.unsubscribe(id));
        tracker.add_score(1).unwrap();

        assert_eq!(*events.borrow(), 1);
    }
}
