//! # Activity 模块
//!
//! 阶段内的限时技能活动。
//!
//! ## 状态机
//!
//! ```text
//! Configured ──start──► Active ──win──────► Succeeded ──report──► Reported
//!      ▲                  │                                          │
//!      │                  └──time limit──► Failed ─────report────────┤
//!      └──────────────────────restart (失败后)─────────────────────────┘
//! ```
//!
//! 成功只能通过胜利谓词达成；超出时限且尚未获胜即失败。
//! 结果只上报一次。

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ActivityError;
use crate::input::InputEvent;
use crate::view::ActivityView;

/// 活动配置（来自课程清单）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivitySpec {
    /// 活动类型
    pub kind: String,
    /// 时限（秒）
    #[serde(default)]
    pub time_limit: Option<f32>,
    /// 活动特有参数
    #[serde(default)]
    pub params: serde_json::Value,
}

impl ActivitySpec {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            time_limit: None,
            params: serde_json::Value::Null,
        }
    }

    pub fn with_time_limit(mut self, seconds: f32) -> Self {
        self.time_limit = Some(seconds);
        self
    }

    pub fn with_params(mut self, params: serde_json::Value) -> Self {
        self.params = params;
        self
    }
}

/// 活动结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActivityResult {
    pub success: bool,
    pub score: i64,
    /// 用时（秒）
    pub elapsed: f32,
    /// 自由格式的统计数据
    pub stats: BTreeMap<String, f64>,
}

impl ActivityResult {
    pub fn new(success: bool, score: i64, elapsed: f32) -> Self {
        Self {
            success,
            score,
            elapsed,
            stats: BTreeMap::new(),
        }
    }

    pub fn with_stat(mut self, key: impl Into<String>, value: f64) -> Self {
        self.stats.insert(key.into(), value);
        self
    }
}

/// 活动行为
///
/// 每种具体活动实现此 trait；生命周期由 [`ActivityRuntime`] 驱动。
pub trait Activity {
    /// 活动类型名
    fn kind(&self) -> &'static str;

    /// 重置到初始状态（首次开始与重试前调用）
    fn configure(&mut self);

    /// 推进内部计时/动画
    fn tick(&mut self, _dt: f32) {}

    /// 处理输入，返回是否消费
    fn handle_input(&mut self, event: &InputEvent) -> bool;

    /// 胜利谓词
    fn is_won(&self) -> bool;

    /// 完成度 (0.0 - 1.0)
    fn progress(&self) -> f32;

    /// 时限（秒）
    fn time_limit(&self) -> Option<f32> {
        None
    }

    /// 计算结果
    fn compute_result(&self, success: bool, elapsed: f32) -> ActivityResult;
}

/// 活动阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityPhase {
    Configured,
    Active,
    Succeeded,
    Failed,
    Reported,
}

impl fmt::Display for ActivityPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ActivityPhase::Configured => "Configured",
            ActivityPhase::Active => "Active",
            ActivityPhase::Succeeded => "Succeeded",
            ActivityPhase::Failed => "Failed",
            ActivityPhase::Reported => "Reported",
        };
        f.write_str(name)
    }
}

/// 活动运行时
pub struct ActivityRuntime {
    activity: Box<dyn Activity>,
    phase: ActivityPhase,
    elapsed: f32,
    /// 第几次尝试（从 1 开始）
    attempt: u32,
    /// 最近一次结束是否成功
    outcome: Option<bool>,
}

impl ActivityRuntime {
    /// 包装活动并完成配置
    pub fn new(mut activity: Box<dyn Activity>) -> Self {
        activity.configure();
        Self {
            activity,
            phase: ActivityPhase::Configured,
            elapsed: 0.0,
            attempt: 1,
            outcome: None,
        }
    }

    pub fn kind(&self) -> &'static str {
        self.activity.kind()
    }

    pub fn phase(&self) -> ActivityPhase {
        self.phase
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn elapsed(&self) -> f32 {
        self.elapsed
    }

    /// 已结束、等待上报
    pub fn is_finished(&self) -> bool {
        matches!(self.phase, ActivityPhase::Succeeded | ActivityPhase::Failed)
    }

    /// 剩余时间
    pub fn remaining_time(&self) -> Option<f32> {
        self.activity
            .time_limit()
            .map(|limit| (limit - self.elapsed).max(0.0))
    }

    /// Configured → Active
    pub fn start(&mut self) -> bool {
        if self.phase != ActivityPhase::Configured {
            return false;
        }
        self.phase = ActivityPhase::Active;
        debug!(kind = self.kind(), attempt = self.attempt, "活动开始");
        true
    }

    /// 推进活动
    pub fn tick(&mut self, dt: f32) {
        if self.phase != ActivityPhase::Active {
            return;
        }
        self.elapsed += dt;
        self.activity.tick(dt);
        self.evaluate();
    }

    /// 转发输入，返回活动是否消费
    pub fn handle_input(&mut self, event: &InputEvent) -> bool {
        if self.phase != ActivityPhase::Active {
            return false;
        }
        let consumed = self.activity.handle_input(event);
        self.evaluate();
        consumed
    }

    /// 胜利优先于超时
    fn evaluate(&mut self) {
        if self.activity.is_won() {
            self.phase = ActivityPhase::Succeeded;
            self.outcome = Some(true);
        } else if self
            .activity
            .time_limit()
            .is_some_and(|limit| self.elapsed >= limit)
        {
            self.phase = ActivityPhase::Failed;
            self.outcome = Some(false);
        }
    }

    /// 上报结果（只能一次）
    pub fn report(&mut self) -> Result<ActivityResult, ActivityError> {
        match self.phase {
            ActivityPhase::Succeeded | ActivityPhase::Failed => {
                let success = self.phase == ActivityPhase::Succeeded;
                let result = self.activity.compute_result(success, self.elapsed);
                self.phase = ActivityPhase::Reported;
                debug!(kind = self.kind(), success, score = result.score, "活动结果上报");
                Ok(result)
            }
            ActivityPhase::Reported => Err(ActivityError::AlreadyReported {
                kind: self.kind().to_string(),
            }),
            phase => Err(ActivityError::NotFinished {
                kind: self.kind().to_string(),
                phase: phase.to_string(),
            }),
        }
    }

    /// 失败后重新配置，回到 Configured
    pub fn restart(&mut self) -> Result<(), ActivityError> {
        let failed = match self.phase {
            ActivityPhase::Failed => true,
            ActivityPhase::Reported => self.outcome == Some(false),
            _ => false,
        };
        if !failed {
            return Err(ActivityError::CannotRestart {
                kind: self.kind().to_string(),
                phase: self.phase.to_string(),
            });
        }

        self.activity.configure();
        self.phase = ActivityPhase::Configured;
        self.elapsed = 0.0;
        self.outcome = None;
        self.attempt += 1;
        debug!(kind = self.kind(), attempt = self.attempt, "活动重试");
        Ok(())
    }

    /// 渲染快照
    pub fn view(&self) -> ActivityView {
        ActivityView {
            kind: self.kind(),
            phase: self.phase,
            progress: self.activity.progress().clamp(0.0, 1.0),
            remaining_time: self.remaining_time(),
            attempt: self.attempt,
        }
    }
}

impl fmt::Debug for ActivityRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActivityRuntime")
            .field("kind", &self.kind())
            .field("phase", &self.phase)
            .field("elapsed", &self.elapsed)
            .field("attempt", &self.attempt)
            .finish()
    }
}
