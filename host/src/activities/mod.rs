//! # Activities 模块
//!
//! 课程中可用的具体活动。
//!
//! 活动种类是封闭集合：[`CurriculumActivity`] 按清单中的 `kind` 构建，
//! 并把 [`Activity`] 的调用分派给对应实现。
//!
//! | kind | 胜利条件 |
//! |------|---------|
//! | `tap_targets` | 所有目标都被点中 |
//! | `trace_path` | 沿路径描过至少 80% 的路点 |
//! | `drag_sort` | 每个物品都被拖进对应的分类框 |

mod drag_sort;
mod tap_targets;
mod trace_path;

pub use drag_sort::{DragSort, DragSortParams, SortBin, SortItem};
pub use tap_targets::{TapTarget, TapTargets, TapTargetsParams};
pub use trace_path::{TracePath, TracePathParams};

use serde::de::DeserializeOwned;
use stage_runtime::{Activity, ActivityResult, ActivitySpec, InputEvent};
use tracing::warn;

/// 已知的活动类型
pub const ACTIVITY_KINDS: &[&str] = &["tap_targets", "trace_path", "drag_sort"];

/// 每剩余一秒的时间奖励
const TIME_BONUS_PER_SEC: f32 = 5.0;

/// 课程活动
#[derive(Debug, Clone)]
pub enum CurriculumActivity {
    TapTargets(TapTargets),
    TracePath(TracePath),
    DragSort(DragSort),
}

impl CurriculumActivity {
    /// 按清单配置构建；未知类型退回默认的点击目标活动
    pub fn from_spec(spec: &ActivitySpec) -> Self {
        match spec.kind.as_str() {
            "trace_path" => Self::TracePath(TracePath::new(parse_params(spec), spec.time_limit)),
            "drag_sort" => Self::DragSort(DragSort::new(parse_params(spec), spec.time_limit)),
            "tap_targets" => {
                Self::TapTargets(TapTargets::new(parse_params(spec), spec.time_limit))
            }
            other => {
                warn!(kind = %other, "未知活动类型，使用 tap_targets");
                Self::TapTargets(TapTargets::new(TapTargetsParams::default(), spec.time_limit))
            }
        }
    }

    fn inner(&self) -> &dyn Activity {
        match self {
            Self::TapTargets(a) => a,
            Self::TracePath(a) => a,
            Self::DragSort(a) => a,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn Activity {
        match self {
            Self::TapTargets(a) => a,
            Self::TracePath(a) => a,
            Self::DragSort(a) => a,
        }
    }
}

impl Activity for CurriculumActivity {
    fn kind(&self) -> &'static str {
        self.inner().kind()
    }

    fn configure(&mut self) {
        self.inner_mut().configure();
    }

    fn tick(&mut self, dt: f32) {
        self.inner_mut().tick(dt);
    }

    fn handle_input(&mut self, event: &InputEvent) -> bool {
        self.inner_mut().handle_input(event)
    }

    fn is_won(&self) -> bool {
        self.inner().is_won()
    }

    fn progress(&self) -> f32 {
        self.inner().progress()
    }

    fn time_limit(&self) -> Option<f32> {
        self.inner().time_limit()
    }

    fn compute_result(&self, success: bool, elapsed: f32) -> ActivityResult {
        self.inner().compute_result(success, elapsed)
    }
}

/// 解析活动参数；缺失或格式错误时使用默认值
fn parse_params<T: DeserializeOwned + Default>(spec: &ActivitySpec) -> T {
    if spec.params.is_null() {
        return T::default();
    }
    match serde_json::from_value(spec.params.clone()) {
        Ok(params) => params,
        Err(e) => {
            warn!(kind = %spec.kind, error = %e, "活动参数无效，使用默认值");
            T::default()
        }
    }
}

/// 成功得分：基础分 + 剩余时间奖励
fn success_score(base: i64, time_limit: Option<f32>, elapsed: f32) -> i64 {
    let bonus = time_limit
        .map(|limit| ((limit - elapsed).max(0.0) * TIME_BONUS_PER_SEC).round() as i64)
        .unwrap_or(0);
    base + bonus
}

fn distance(a: (f32, f32), b: (f32, f32)) -> f32 {
    ((a.0 - b.0).powi(2) + (a.1 - b.1).powi(2)).sqrt()
}
