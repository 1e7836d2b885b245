//! # Input 模块
//!
//! 宿主层向运行时传递的输入事件。
//!
//! 坐标均为画布相对坐标（左上角为原点）。Stage Runtime 负责把输入
//! 路由给当前唯一的活动。

use serde::{Deserialize, Serialize};

/// 输入事件
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InputEvent {
    /// 指针按下
    PointerDown { x: f32, y: f32 },
    /// 指针移动
    PointerMove { x: f32, y: f32 },
    /// 指针抬起
    PointerUp { x: f32, y: f32 },
    /// 点击
    Click { x: f32, y: f32 },
    /// 语义输入：继续（如介绍阶段的"开始"）
    Continue,
    /// 语义输入：重试失败的活动
    Retry,
}

impl InputEvent {
    /// 指针位置（语义输入没有位置）
    pub fn position(&self) -> Option<(f32, f32)> {
        match *self {
            InputEvent::PointerDown { x, y }
            | InputEvent::PointerMove { x, y }
            | InputEvent::PointerUp { x, y }
            | InputEvent::Click { x, y } => Some((x, y)),
            InputEvent::Continue | InputEvent::Retry => None,
        }
    }

    /// 创建点击事件
    pub fn click(x: f32, y: f32) -> Self {
        Self::Click { x, y }
    }
}
