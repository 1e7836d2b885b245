//! # Replay 模块
//!
//! 脚本化输入：按帧号把输入或控制动作交给 headless 循环。
//!
//! ```json
//! [
//!   { "frame": 10, "action": "click_button", "text": "Start" },
//!   { "frame": 40, "action": "input", "event": { "type": "click", "x": 320.0, "y": 240.0 } },
//!   { "frame": 90, "action": "skip_transition" }
//! ]
//! ```

use std::collections::VecDeque;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use stage_runtime::InputEvent;
use thiserror::Error;

/// 回放动作
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ReplayAction {
    /// 原样投递的输入
    Input { event: InputEvent },
    /// 点击指定文本的按钮（按当前控件表解析坐标）
    ClickButton { text: String },
    /// 请求进入阶段
    TransitionTo { stage: String },
    SkipTransition,
    RetryLoad,
    CancelPending,
    NewGame,
}

/// 单步
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayStep {
    pub frame: u64,
    #[serde(flatten)]
    pub action: ReplayAction,
}

/// 回放加载错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReplayError {
    #[error("无法读取回放文件: {0}")]
    Io(String),

    #[error("无法解析回放 JSON: {0}")]
    Parse(String),
}

/// 按帧排序的回放队列
#[derive(Debug, Clone, Default)]
pub struct Replay {
    steps: VecDeque<ReplayStep>,
}

impl Replay {
    /// 排序保持同帧步骤的原始顺序
    pub fn new(mut steps: Vec<ReplayStep>) -> Self {
        steps.sort_by_key(|step| step.frame);
        Self {
            steps: steps.into(),
        }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ReplayError> {
        let json = fs::read_to_string(path).map_err(|e| ReplayError::Io(e.to_string()))?;
        Self::from_json(&json)
    }

    pub fn from_json(json: &str) -> Result<Self, ReplayError> {
        let steps = serde_json::from_str(json).map_err(|e| ReplayError::Parse(e.to_string()))?;
        Ok(Self::new(steps))
    }

    /// 取出帧号不大于 `frame` 的所有动作
    pub fn take_due(&mut self, frame: u64) -> Vec<ReplayAction> {
        let mut due = Vec::new();
        while self.steps.front().is_some_and(|step| step.frame <= frame) {
            if let Some(step) = self.steps.pop_front() {
                due.push(step.action);
            }
        }
        due
    }

    pub fn remaining(&self) -> usize {
        self.steps.len()
    }

    pub fn is_finished(&self) -> bool {
        self.steps.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_order() {
        let json = r#"[
            { "frame": 20, "action": "skip_transition" },
            { "frame": 5, "action": "click_button", "text": "Start" },
            { "frame": 5, "action": "input", "event": { "type": "continue" } }
        ]"#;
        let mut replay = Replay::from_json(json).unwrap();
        assert_eq!(replay.remaining(), 3);

        assert!(replay.take_due(4).is_empty());
        assert_eq!(
            replay.take_due(5),
            vec![
                ReplayAction::ClickButton {
                    text: "Start".to_string()
                },
                ReplayAction::Input {
                    event: InputEvent::Continue
                },
            ]
        );
        // 跳过的帧一并取出
        assert_eq!(replay.take_due(100), vec![ReplayAction::SkipTransition]);
        assert!(replay.is_finished());
    }

    #[test]
    fn test_parse_error() {
        assert!(matches!(
            Replay::from_json(r#"[{ "frame": 1, "action": "dance" }]"#),
            Err(ReplayError::Parse(_))
        ));
    }
}
