//! # View 模块
//!
//! 渲染快照：渲染器在 update 完成后读取，只读、不持有运行时内部引用。

use crate::activity::ActivityPhase;
use crate::stage::StagePhase;

/// 活动的渲染快照
#[derive(Debug, Clone, PartialEq)]
pub struct ActivityView {
    /// 活动类型
    pub kind: &'static str,
    pub phase: ActivityPhase,
    /// 完成度 (0.0 - 1.0)
    pub progress: f32,
    /// 剩余时间（无时限为 None）
    pub remaining_time: Option<f32>,
    /// 第几次尝试（从 1 开始）
    pub attempt: u32,
}

/// 阶段的渲染快照
#[derive(Debug, Clone, PartialEq)]
pub struct StageView {
    pub id: String,
    pub title: String,
    pub phase: StagePhase,
    /// 当前活动序号
    pub step: usize,
    /// 活动总数
    pub total_steps: usize,
    pub activity: Option<ActivityView>,
    /// 是否在等待重试
    pub awaiting_retry: bool,
}
