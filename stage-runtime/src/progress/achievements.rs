//! 内置成就目录
//!
//! 每个成就是一个针对 [`GameState`] 的解锁谓词。定义不可变，
//! 解锁记录保存在 `GameState::unlocked_achievements`。

use crate::state::GameState;

/// 成就定义
#[derive(Debug, Clone, Copy)]
pub struct Achievement {
    /// 唯一 ID（持久化用）
    pub id: &'static str,
    /// 显示名称
    pub name: &'static str,
    pub description: &'static str,
    predicate: fn(&GameState) -> bool,
}

impl Achievement {
    pub const fn new(
        id: &'static str,
        name: &'static str,
        description: &'static str,
        predicate: fn(&GameState) -> bool,
    ) -> Self {
        Self {
            id,
            name,
            description,
            predicate,
        }
    }

    /// 解锁条件是否满足
    pub fn is_met(&self, state: &GameState) -> bool {
        (self.predicate)(state)
    }
}

impl PartialEq for Achievement {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

/// 完成一个活动即视为"快速"的阈值（秒）
const QUICK_STUDY_SECS: f64 = 10.0;

/// 内置成就
pub static BUILTIN_ACHIEVEMENTS: &[Achievement] = &[
    Achievement::new("first_step", "First Step", "Complete your first step", |s| {
        !s.completed_steps.is_empty()
    }),
    Achievement::new("first_stage", "Stage Clear", "Complete a whole stage", |s| {
        s.completed_stage_count() >= 1
    }),
    Achievement::new("score_1000", "Rising Star", "Reach 1000 points in one run", |s| {
        s.score >= 1000
    }),
    Achievement::new("score_5000", "High Scorer", "Reach a best score of 5000", |s| {
        s.stats.best_score >= 5000
    }),
    Achievement::new(
        "flawless",
        "Flawless",
        "Complete a stage without failing an activity",
        GameState::has_flawless_stage,
    ),
    Achievement::new("quick_study", "Quick Study", "Finish an activity within 10 seconds", |s| {
        s.stats
            .fastest_activity_secs
            .is_some_and(|secs| secs <= QUICK_STUDY_SECS)
    }),
    Achievement::new("graduate", "Graduate", "Finish the whole curriculum", |s| {
        s.game_completed
    }),
    Achievement::new("veteran", "Veteran", "Finish the curriculum three times", |s| {
        s.stats.completions >= 3
    }),
];

/// 按 ID 查找内置成就
pub fn find(id: &str) -> Option<&'static Achievement> {
    BUILTIN_ACHIEVEMENTS.iter().find(|a| a.id == id)
}
