//! 路径描绘：按住指针沿折线路点移动。
//!
//! 只有按下期间的移动计入；松开后可以再次按下继续描。

use serde::Deserialize;
use stage_runtime::{Activity, ActivityResult, InputEvent};

use super::{distance, success_score};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct TracePathParams {
    /// 路点（画布坐标）
    pub points: Vec<(f32, f32)>,
    /// 离路点多近算经过
    pub tolerance: f32,
    /// 获胜所需的路点比例
    pub required_ratio: f32,
    pub base_score: i64,
}

impl Default for TracePathParams {
    fn default() -> Self {
        Self {
            points: (0..=10)
                .map(|i| (240.0 + i as f32 * 80.0, 360.0 + if i % 2 == 0 { -60.0 } else { 60.0 }))
                .collect(),
            tolerance: 24.0,
            required_ratio: 0.8,
            base_score: 150,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TracePath {
    params: TracePathParams,
    time_limit: Option<f32>,
    visited: Vec<bool>,
    pressed: bool,
    strokes: u32,
}

impl TracePath {
    pub fn new(params: TracePathParams, time_limit: Option<f32>) -> Self {
        let visited = vec![false; params.points.len()];
        Self {
            params,
            time_limit,
            visited,
            pressed: false,
            strokes: 0,
        }
    }

    fn visit(&mut self, x: f32, y: f32) {
        for (point, visited) in self.params.points.iter().zip(self.visited.iter_mut()) {
            if distance((x, y), *point) <= self.params.tolerance {
                *visited = true;
            }
        }
    }
}

impl Activity for TracePath {
    fn kind(&self) -> &'static str {
        "trace_path"
    }

    fn configure(&mut self) {
        self.visited = vec![false; self.params.points.len()];
        self.pressed = false;
        self.strokes = 0;
    }

    fn handle_input(&mut self, event: &InputEvent) -> bool {
        match *event {
            InputEvent::PointerDown { x, y } => {
                self.pressed = true;
                self.strokes += 1;
                self.visit(x, y);
                true
            }
            InputEvent::PointerMove { x, y } if self.pressed => {
                self.visit(x, y);
                true
            }
            InputEvent::PointerUp { x, y } if self.pressed => {
                self.visit(x, y);
                self.pressed = false;
                true
            }
            _ => false,
        }
    }

    fn is_won(&self) -> bool {
        !self.visited.is_empty() && self.progress() >= self.params.required_ratio
    }

    fn progress(&self) -> f32 {
        if self.visited.is_empty() {
            return 0.0;
        }
        self.visited.iter().filter(|v| **v).count() as f32 / self.visited.len() as f32
    }

    fn time_limit(&self) -> Option<f32> {
        self.time_limit
    }

    fn compute_result(&self, success: bool, elapsed: f32) -> ActivityResult {
        let score = if success {
            success_score(self.params.base_score, self.time_limit, elapsed)
        } else {
            0
        };
        ActivityResult::new(success, score, elapsed)
            .with_stat("coverage", f64::from(self.progress()))
            .with_stat("strokes", f64::from(self.strokes))
    }
}
