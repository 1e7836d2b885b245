//! # State 模块
//!
//! 定义玩家进度状态 [`GameState`]。
//!
//! ## 设计原则
//!
//! - 所有状态必须**可序列化**（支持持久化）
//! - 只允许通过 [`crate::progress::ProgressTracker`] 修改
//! - 旧版本存档缺失的字段由默认值补齐（`#[serde(default)]`）

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// 阶段标识符
pub type StageId = String;

/// 玩家设置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// 是否开启音效
    pub sound_enabled: bool,
    /// 语言标签
    pub locale: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            sound_enabled: true,
            locale: "en".to_string(),
        }
    }
}

/// 跨局统计（新游戏时保留）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionStats {
    /// 累计游戏时长（秒）
    pub total_play_time_secs: f64,
    /// 通关次数
    pub completions: u32,
    /// 历史最高分
    pub best_score: u64,
    /// 最近一次游戏时间（Unix 秒）
    pub last_played: Option<i64>,
    /// 最快完成活动的用时（秒）
    pub fastest_activity_secs: Option<f64>,
}

/// 玩家进度状态
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameState {
    /// 当前阶段
    pub current_stage: Option<StageId>,
    /// 各阶段完成标记
    pub stage_completion: BTreeMap<StageId, bool>,
    /// 本局累计分数
    pub score: u64,
    /// 已完成的步骤
    pub completed_steps: BTreeSet<String>,
    /// 本局各阶段的活动失败次数
    pub stage_failures: BTreeMap<StageId, u32>,
    /// 玩家设置
    pub settings: Settings,
    /// 跨局统计
    pub stats: SessionStats,
    /// 已解锁成就
    pub unlocked_achievements: BTreeSet<String>,
    /// 是否已通关
    pub game_completed: bool,
    /// 通关时间（Unix 秒）
    pub completed_at: Option<i64>,
}

impl GameState {
    /// 阶段是否已完成
    pub fn is_stage_complete(&self, id: &str) -> bool {
        self.stage_completion.get(id).copied().unwrap_or(false)
    }

    /// 已完成的阶段数
    pub fn completed_stage_count(&self) -> usize {
        self.stage_completion.values().filter(|done| **done).count()
    }

    /// 是否存在零失败完成的阶段
    ///
    /// 只统计完成过活动步骤（`{stage}/{index}`）的阶段，没有活动的阶段不可能失败。
    pub fn has_flawless_stage(&self) -> bool {
        self.stage_completion
            .iter()
            .filter(|(id, done)| **done && self.has_activity_steps(id))
            .any(|(id, _)| self.stage_failures.get(id).copied().unwrap_or(0) == 0)
    }

    fn has_activity_steps(&self, stage: &str) -> bool {
        self.completed_steps.iter().any(|step| {
            step.strip_prefix(stage)
                .is_some_and(|rest| rest.starts_with('/'))
        })
    }

    /// 重置本局状态，保留统计、成就与设置
    pub(crate) fn reset_run(&mut self) {
        let settings = std::mem::take(&mut self.settings);
        let stats = std::mem::take(&mut self.stats);
        let unlocked = std::mem::take(&mut self.unlocked_achievements);

        *self = Self {
            settings,
            stats,
            unlocked_achievements: unlocked,
            ..Self::default()
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_state_snapshot() {
        let json = serde_json::to_string_pretty(&GameState::default()).unwrap();
        insta::assert_snapshot!(json, @r###"
        {
          "current_stage": null,
          "stage_completion": {},
          "score": 0,
          "completed_steps": [],
          "stage_failures": {},
          "settings": {
            "sound_enabled": true,
            "locale": "en"
          },
          "stats": {
            "total_play_time_secs": 0.0,
            "completions": 0,
            "best_score": 0,
            "last_played": null,
            "fastest_activity_secs": null
          },
          "unlocked_achievements": [],
          "game_completed": false,
          "completed_at": null
        }
        "###);
    }

    #[test]
    fn test_older_snapshot_fills_defaults() {
        // 旧版本存档只有部分字段
        let json = r#"{ "score": 120, "settings": { "sound_enabled": false } }"#;
        let state: GameState = serde_json::from_str(json).unwrap();

        assert_eq!(state.score, 120);
        assert!(!state.settings.sound_enabled);
        assert_eq!(state.settings.locale, "en");
        assert!(state.completed_steps.is_empty());
        assert_eq!(state.stats.completions, 0);
    }

    #[test]
    fn test_reset_run_keeps_cross_session_data() {
        let mut state = GameState::default();
        state.score = 900;
        state.current_stage = Some("intro".to_string());
        state.completed_steps.insert("intro".to_string());
        state.stats.completions = 3;
        state.settings.locale = "zh".to_string();
        state.unlocked_achievements.insert("first_step".to_string());
        state.game_completed = true;

        state.reset_run();

        assert_eq!(state.score, 0);
        assert!(state.current_stage.is_none());
        assert!(state.completed_steps.is_empty());
        assert!(!state.game_completed);
        assert_eq!(state.stats.completions, 3);
        assert_eq!(state.settings.locale, "zh");
        assert!(state.unlocked_achievements.contains("first_step"));
    }

    #[test]
    fn test_flawless_stage() {
        let mut state = GameState::default();
        state.stage_completion.insert("a".to_string(), true);
        state.completed_steps.insert("a/0".to_string());
        state.stage_failures.insert("a".to_string(), 2);
        assert!(!state.has_flawless_stage());

        state.stage_completion.insert("b".to_string(), true);
        state.completed_steps.insert("b/0".to_string());
        assert!(state.has_flawless_stage());
    }

    #[test]
    fn test_stage_without_activities_is_not_flawless() {
        let mut state = GameState::default();
        state.stage_completion.insert("intro".to_string(), true);
        state.completed_steps.insert("intro".to_string());
        assert!(!state.has_flawless_stage());

        // 前缀相同的其他阶段不算
        state.completed_steps.insert("intro2/0".to_string());
        assert!(!state.has_flawless_stage());
    }
}
