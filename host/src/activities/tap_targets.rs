//! 点击目标：依次点中画布上的所有圆形目标。

use serde::Deserialize;
use stage_runtime::{Activity, ActivityResult, InputEvent};

use super::{distance, success_score};

/// 圆形目标
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct TapTarget {
    pub x: f32,
    pub y: f32,
    #[serde(default = "default_radius")]
    pub radius: f32,
}

fn default_radius() -> f32 {
    40.0
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct TapTargetsParams {
    pub targets: Vec<TapTarget>,
    /// 每个目标的分值
    pub points_per_target: i64,
}

impl Default for TapTargetsParams {
    fn default() -> Self {
        let target = |x, y| TapTarget {
            x,
            y,
            radius: default_radius(),
        };
        Self {
            targets: vec![
                target(320.0, 240.0),
                target(640.0, 420.0),
                target(960.0, 300.0),
            ],
            points_per_target: 50,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TapTargets {
    params: TapTargetsParams,
    time_limit: Option<f32>,
    hit: Vec<bool>,
    misses: u32,
}

impl TapTargets {
    pub fn new(params: TapTargetsParams, time_limit: Option<f32>) -> Self {
        let hit = vec![false; params.targets.len()];
        Self {
            params,
            time_limit,
            hit,
            misses: 0,
        }
    }

    pub fn targets(&self) -> &[TapTarget] {
        &self.params.targets
    }

    fn hit_count(&self) -> usize {
        self.hit.iter().filter(|h| **h).count()
    }
}

impl Activity for TapTargets {
    fn kind(&self) -> &'static str {
        "tap_targets"
    }

    fn configure(&mut self) {
        self.hit = vec![false; self.params.targets.len()];
        self.misses = 0;
    }

    fn handle_input(&mut self, event: &InputEvent) -> bool {
        let InputEvent::Click { x, y } = *event else {
            return false;
        };

        let target = self
            .params
            .targets
            .iter()
            .zip(&self.hit)
            .position(|(t, hit)| !hit && distance((x, y), (t.x, t.y)) <= t.radius);
        match target {
            Some(index) => self.hit[index] = true,
            None => self.misses += 1,
        }
        true
    }

    fn is_won(&self) -> bool {
        !self.hit.is_empty() && self.hit.iter().all(|h| *h)
    }

    fn progress(&self) -> f32 {
        if self.hit.is_empty() {
            return 0.0;
        }
        self.hit_count() as f32 / self.hit.len() as f32
    }

    fn time_limit(&self) -> Option<f32> {
        self.time_limit
    }

    fn compute_result(&self, success: bool, elapsed: f32) -> ActivityResult {
        let score = if success {
            let base = self.params.points_per_target * self.hit.len() as i64;
            success_score(base, self.time_limit, elapsed)
        } else {
            0
        };
        ActivityResult::new(success, score, elapsed)
            .with_stat("hits", self.hit_count() as f64)
            .with_stat("misses", f64::from(self.misses))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_targets() -> TapTargets {
        TapTargets::new(
            TapTargetsParams {
                targets: vec![
                    TapTarget {
                        x: 100.0,
                        y: 100.0,
                        radius: 20.0,
                    },
                    TapTarget {
                        x: 300.0,
                        y: 100.0,
                        radius: 20.0,
                    },
                ],
                points_per_target: 50,
            },
            Some(10.0),
        )
    }

    #[test]
    fn test_hits_in_any_order() {
        let mut activity = two_targets();
        activity.handle_input(&InputEvent::click(305.0, 95.0));
        assert_eq!(activity.progress(), 0.5);
        assert!(!activity.is_won());

        // 已命中的目标不重复计数
        activity.handle_input(&InputEvent::click(300.0, 100.0));
        assert_eq!(activity.progress(), 0.5);

        activity.handle_input(&InputEvent::click(110.0, 100.0));
        assert!(activity.is_won());
    }

    #[test]
    fn test_misses_and_result() {
        let mut activity = two_targets();
        activity.handle_input(&InputEvent::click(600.0, 600.0));
        activity.handle_input(&InputEvent::click(100.0, 100.0));
        activity.handle_input(&InputEvent::click(300.0, 100.0));

        let result = activity.compute_result(true, 4.0);
        assert_eq!(result.score, 100 + 30);
        assert_eq!(result.stats["misses"], 1.0);
        assert_eq!(result.stats["hits"], 2.0);
    }

    #[test]
    fn test_configure_resets() {
        let mut activity = two_targets();
        activity.handle_input(&InputEvent::click(100.0, 100.0));
        activity.configure();
        assert_eq!(activity.progress(), 0.0);
        assert!(!activity.handle_input(&InputEvent::Continue));
    }
}
