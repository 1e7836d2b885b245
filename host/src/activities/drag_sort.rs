//! 拖拽分类：把每个物品拖进与它匹配的分类框。
//!
//! 放进错误的框或框外时，物品回到原位并记一次错误。

use serde::Deserialize;
use stage_runtime::{Activity, ActivityResult, InputEvent};

use super::{distance, success_score};

/// 分类框（矩形）
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SortBin {
    pub id: String,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl SortBin {
    fn contains(&self, x: f32, y: f32) -> bool {
        x >= self.x && x <= self.x + self.width && y >= self.y && y <= self.y + self.height
    }
}

/// 可拖动的物品
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SortItem {
    pub label: String,
    /// 匹配的分类框 ID
    pub bin: String,
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DragSortParams {
    pub bins: Vec<SortBin>,
    pub items: Vec<SortItem>,
    /// 抓取半径
    pub grab_radius: f32,
    pub points_per_item: i64,
}

impl Default for DragSortParams {
    fn default() -> Self {
        let bin = |id: &str, x| SortBin {
            id: id.to_string(),
            x,
            y: 480.0,
            width: 240.0,
            height: 160.0,
        };
        let item = |label: &str, bin: &str, x| SortItem {
            label: label.to_string(),
            bin: bin.to_string(),
            x,
            y: 200.0,
        };
        Self {
            bins: vec![bin("planets", 280.0), bin("stars", 760.0)],
            items: vec![
                item("Mars", "planets", 360.0),
                item("Sirius", "stars", 560.0),
                item("Venus", "planets", 760.0),
                item("Vega", "stars", 960.0),
            ],
            grab_radius: 32.0,
            points_per_item: 40,
        }
    }
}

#[derive(Debug, Clone)]
struct Drag {
    item: usize,
    x: f32,
    y: f32,
}

#[derive(Debug, Clone)]
pub struct DragSort {
    params: DragSortParams,
    time_limit: Option<f32>,
    /// 已正确放置的物品
    placed: Vec<bool>,
    dragging: Option<Drag>,
    mistakes: u32,
}

impl DragSort {
    pub fn new(params: DragSortParams, time_limit: Option<f32>) -> Self {
        let placed = vec![false; params.items.len()];
        Self {
            params,
            time_limit,
            placed,
            dragging: None,
            mistakes: 0,
        }
    }

    /// 正在拖动的物品及其当前位置
    pub fn dragging(&self) -> Option<(&str, f32, f32)> {
        self.dragging
            .as_ref()
            .map(|d| (self.params.items[d.item].label.as_str(), d.x, d.y))
    }

    fn placed_count(&self) -> usize {
        self.placed.iter().filter(|p| **p).count()
    }

    fn pick(&self, x: f32, y: f32) -> Option<usize> {
        self.params
            .items
            .iter()
            .enumerate()
            .filter(|(i, item)| {
                !self.placed[*i] && distance((x, y), (item.x, item.y)) <= self.params.grab_radius
            })
            .min_by(|(_, a), (_, b)| {
                distance((x, y), (a.x, a.y)).total_cmp(&distance((x, y), (b.x, b.y)))
            })
            .map(|(i, _)| i)
    }

    fn drop_at(&mut self, item: usize, x: f32, y: f32) {
        let target = &self.params.items[item].bin;
        match self.params.bins.iter().find(|bin| bin.contains(x, y)) {
            Some(bin) if &bin.id == target => self.placed[item] = true,
            _ => self.mistakes += 1,
        }
    }
}

impl Activity for DragSort {
    fn kind(&self) -> &'static str {
        "drag_sort"
    }

    fn configure(&mut self) {
        self.placed = vec![false; self.params.items.len()];
        self.dragging = None;
        self.mistakes = 0;
    }

    fn handle_input(&mut self, event: &InputEvent) -> bool {
        match *event {
            InputEvent::PointerDown { x, y } => match self.pick(x, y) {
                Some(item) => {
                    self.dragging = Some(Drag { item, x, y });
                    true
                }
                None => false,
            },
            InputEvent::PointerMove { x, y } => match self.dragging.as_mut() {
                Some(drag) => {
                    drag.x = x;
                    drag.y = y;
                    true
                }
                None => false,
            },
            InputEvent::PointerUp { x, y } => match self.dragging.take() {
                Some(drag) => {
                    self.drop_at(drag.item, x, y);
                    true
                }
                None => false,
            },
            _ => false,
        }
    }

    fn is_won(&self) -> bool {
        !self.placed.is_empty() && self.placed.iter().all(|p| *p)
    }

    fn progress(&self) -> f32 {
        if self.placed.is_empty() {
            return 0.0;
        }
        self.placed_count() as f32 / self.placed.len() as f32
    }

    fn time_limit(&self) -> Option<f32> {
        self.time_limit
    }

    fn compute_result(&self, success: bool, elapsed: f32) -> ActivityResult {
        let score = if success {
            let base = self.params.points_per_item * self.placed.len() as i64;
            success_score(base, self.time_limit, elapsed)
        } else {
            0
        };
        ActivityResult::new(success, score, elapsed)
            .with_stat("placed", self.placed_count() as f64)
            .with_stat("mistakes", f64::from(self.mistakes))
    }
}
