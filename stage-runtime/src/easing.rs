//! # Easing 模块
//!
//! 缓动函数，供过渡动画与特效共用。

use serde::{Deserialize, Serialize};

/// 缓动函数类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EasingFunction {
    /// 线性（匀速）
    Linear,
    /// 二次缓入
    EaseInQuad,
    /// 二次缓出
    EaseOutQuad,
    /// 二次缓入缓出（淡入淡出类过渡的默认曲线）
    #[default]
    EaseInOutQuad,
    /// 三次缓出
    EaseOutCubic,
    /// 三次缓入缓出（滑动/擦除类过渡）
    EaseInOutCubic,
    /// 回弹缓出（分数弹出）
    EaseOutBack,
}

impl EasingFunction {
    /// 计算缓动值
    ///
    /// 输入会被限制到 `[0, 1]`，且保证 `apply(0) == 0`、`apply(1) == 1`。
    pub fn apply(&self, t: f32) -> f32 {
        let t = t.clamp(0.0, 1.0);

        match self {
            EasingFunction::Linear => t,
            EasingFunction::EaseInQuad => t * t,
            EasingFunction::EaseOutQuad => 1.0 - (1.0 - t) * (1.0 - t),
            EasingFunction::EaseInOutQuad => {
                if t < 0.5 {
                    2.0 * t * t
                } else {
                    1.0 - (-2.0 * t + 2.0).powi(2) / 2.0
                }
            }
            EasingFunction::EaseOutCubic => 1.0 - (1.0 - t).powi(3),
            EasingFunction::EaseInOutCubic => {
                if t < 0.5 {
                    4.0 * t * t * t
                } else {
                    1.0 - (-2.0 * t + 2.0).powi(3) / 2.0
                }
            }
            EasingFunction::EaseOutBack => ease_out_back(t),
        }
    }
}

/// 回弹缓出：中途略微超出 1 再回落
fn ease_out_back(t: f32) -> f32 {
    const C1: f32 = 1.70158;
    const C3: f32 = C1 + 1.0;

    if t >= 1.0 {
        return 1.0;
    }
    1.0 + C3 * (t - 1.0).powi(3) + C1 * (t - 1.0).powi(2)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [EasingFunction; 7] = [
        EasingFunction::Linear,
        EasingFunction::EaseInQuad,
        EasingFunction::EaseOutQuad,
        EasingFunction::EaseInOutQuad,
        EasingFunction::EaseOutCubic,
        EasingFunction::EaseInOutCubic,
        EasingFunction::EaseOutBack,
    ];

    #[test]
    fn test_endpoints() {
        for easing in ALL {
            assert!(easing.apply(0.0).abs() < 1e-6, "{easing:?} at 0");
            assert!((easing.apply(1.0) - 1.0).abs() < 1e-6, "{easing:?} at 1");
        }
    }

    #[test]
    fn test_in_out_symmetric_midpoint() {
        assert!((EasingFunction::EaseInOutQuad.apply(0.5) - 0.5).abs() < 1e-6);
        assert!((EasingFunction::EaseInOutCubic.apply(0.5) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_clamp() {
        let easing = EasingFunction::Linear;
        assert_eq!(easing.apply(-0.5), 0.0);
        assert_eq!(easing.apply(1.5), 1.0);
    }

    #[test]
    fn test_back_overshoots() {
        let peak = (1..100)
            .map(|i| EasingFunction::EaseOutBack.apply(i as f32 / 100.0))
            .fold(0.0_f32, f32::max);
        assert!(peak > 1.0);
    }
}
