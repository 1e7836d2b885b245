//! # Effects 模块
//!
//! 装饰性特效（得分飘字、星星、彩纸、横幅、进度补间）的对象池。
//!
//! ## 设计原则
//!
//! - 特效实例由池独占，调用方只拿到 [`EffectId`]
//! - 每种特效一个池；超出上限时淘汰最旧的实例
//! - 降级模式：上限收紧为 `degraded_cap`，新特效时长乘以 `degraded_duration_scale`
//! - 粒子"物理"只是装饰，唯一保证是位置始终在画布范围内

use std::collections::{BTreeMap, VecDeque};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::easing::EasingFunction;
use crate::services::Renderer;

/// 特效类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectKind {
    /// 得分飘字
    ScorePopup,
    /// 星星粒子
    Star,
    /// 彩纸粒子
    Confetti,
    /// 成就横幅
    Banner,
    /// 进度条补间
    ProgressTween,
}

impl EffectKind {
    /// 按绘制顺序排列的全部类型
    pub const DRAW_ORDER: [EffectKind; 5] = [
        EffectKind::Star,
        EffectKind::Confetti,
        EffectKind::ScorePopup,
        EffectKind::Banner,
        EffectKind::ProgressTween,
    ];

    /// 所在图层
    pub fn layer(self) -> EffectLayer {
        match self {
            EffectKind::Star | EffectKind::Confetti => EffectLayer::Particles,
            EffectKind::ScorePopup => EffectLayer::Popups,
            EffectKind::Banner | EffectKind::ProgressTween => EffectLayer::Overlay,
        }
    }

    /// 默认寿命（秒）
    pub fn default_lifetime(self) -> f32 {
        match self {
            EffectKind::ScorePopup => 1.0,
            EffectKind::Star => 0.8,
            EffectKind::Confetti => 1.6,
            EffectKind::Banner => 2.5,
            EffectKind::ProgressTween => 0.6,
        }
    }

    pub fn is_particle(self) -> bool {
        self.layer() == EffectLayer::Particles
    }
}

/// 绘制图层（按声明顺序从下到上）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EffectLayer {
    Particles,
    Popups,
    Overlay,
}

/// 画布尺寸
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CanvasBounds {
    pub width: f32,
    pub height: f32,
}

impl Default for CanvasBounds {
    fn default() -> Self {
        Self {
            width: 1280.0,
            height: 720.0,
        }
    }
}

impl CanvasBounds {
    fn clamp(&self, x: f32, y: f32) -> (f32, f32) {
        (x.clamp(0.0, self.width), y.clamp(0.0, self.height))
    }
}

/// 特效池配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EffectPoolConfig {
    /// 正常模式下每个池的上限
    pub normal_cap: usize,
    /// 降级模式下每个池的上限
    pub degraded_cap: usize,
    /// 降级模式下新特效的时长系数
    pub degraded_duration_scale: f32,
    /// 粒子重力（像素/秒²）
    pub gravity: f32,
    pub bounds: CanvasBounds,
}

impl Default for EffectPoolConfig {
    fn default() -> Self {
        Self {
            normal_cap: 64,
            degraded_cap: 12,
            degraded_duration_scale: 0.5,
            gravity: 600.0,
            bounds: CanvasBounds::default(),
        }
    }
}

/// 生成参数
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EffectParams {
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
    pub text: Option<String>,
    /// 覆盖默认寿命
    pub lifetime: Option<f32>,
    /// 补间起止值
    pub from: f32,
    pub to: f32,
    pub easing: EasingFunction,
}

impl EffectParams {
    pub fn at(x: f32, y: f32) -> Self {
        Self {
            x,
            y,
            ..Self::default()
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_velocity(mut self, vx: f32, vy: f32) -> Self {
        self.vx = vx;
        self.vy = vy;
        self
    }

    pub fn with_lifetime(mut self, lifetime: f32) -> Self {
        self.lifetime = Some(lifetime);
        self
    }

    pub fn tween(mut self, from: f32, to: f32, easing: EasingFunction) -> Self {
        self.from = from;
        self.to = to;
        self.easing = easing;
        self
    }
}

/// 特效标识符
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EffectId(pub u64);

/// 飘字上升速度（像素/秒）
const POPUP_RISE_SPEED: f32 = 60.0;

/// 特效实例
#[derive(Debug, Clone, PartialEq)]
pub struct EffectInstance {
    pub id: EffectId,
    pub kind: EffectKind,
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
    pub text: Option<String>,
    pub age: f32,
    pub lifetime: f32,
    pub alpha: f32,
    /// 补间当前值
    pub value: f32,
    from: f32,
    to: f32,
    easing: EasingFunction,
}

impl EffectInstance {
    fn new(id: EffectId, kind: EffectKind, params: EffectParams, lifetime: f32) -> Self {
        Self {
            id,
            kind,
            x: params.x,
            y: params.y,
            vx: params.vx,
            vy: params.vy,
            text: params.text,
            age: 0.0,
            lifetime,
            alpha: 1.0,
            value: params.from,
            from: params.from,
            to: params.to,
            easing: params.easing,
        }
    }

    /// 剩余寿命
    pub fn remaining(&self) -> f32 {
        self.lifetime - self.age
    }

    /// 寿命进度 (0.0 - 1.0)
    pub fn progress(&self) -> f32 {
        if self.lifetime <= 0.0 {
            1.0
        } else {
            (self.age / self.lifetime).clamp(0.0, 1.0)
        }
    }

    fn update(&mut self, dt: f32, gravity: f32, bounds: &CanvasBounds) {
        self.age += dt;
        let t = self.progress();

        match self.kind {
            EffectKind::Star | EffectKind::Confetti => {
                self.vy += gravity * dt;
                let next_x = self.x + self.vx * dt;
                let next_y = self.y + self.vy * dt;
                let (x, y) = bounds.clamp(next_x, next_y);
                // 碰到边缘即停在该轴上
                if x != next_x {
                    self.vx = 0.0;
                }
                if y != next_y {
                    self.vy = 0.0;
                }
                self.x = x;
                self.y = y;
                self.alpha = 1.0 - t * t;
            }
            EffectKind::ScorePopup => {
                self.y = (self.y - POPUP_RISE_SPEED * dt).max(0.0);
                self.alpha = 1.0 - t;
            }
            EffectKind::Banner => {
                self.alpha = if t < 0.15 {
                    t / 0.15
                } else if t > 0.75 {
                    (1.0 - t) / 0.25
                } else {
                    1.0
                };
            }
            EffectKind::ProgressTween => {
                self.value = self.from + (self.to - self.from) * self.easing.apply(t);
            }
        }
    }
}

/// 特效池
#[derive(Debug)]
pub struct EffectPool {
    config: EffectPoolConfig,
    pools: BTreeMap<EffectKind, VecDeque<EffectInstance>>,
    degraded: bool,
    next_id: u64,
    /// 因超出上限被淘汰的累计数量
    evicted: u64,
}

impl EffectPool {
    pub fn new(config: EffectPoolConfig) -> Self {
        Self {
            config,
            pools: BTreeMap::new(),
            degraded: false,
            next_id: 1,
            evicted: 0,
        }
    }

    pub fn config(&self) -> &EffectPoolConfig {
        &self.config
    }

    /// 当前每个池的上限
    pub fn cap(&self) -> usize {
        if self.degraded {
            self.config.degraded_cap
        } else {
            self.config.normal_cap
        }
    }

    /// 生成特效
    ///
    /// 池已满时先淘汰最旧的实例。
    pub fn spawn(&mut self, kind: EffectKind, params: EffectParams) -> EffectId {
        let id = EffectId(self.next_id);
        self.next_id += 1;

        let mut lifetime = params.lifetime.unwrap_or_else(|| kind.default_lifetime());
        if self.degraded {
            lifetime *= self.config.degraded_duration_scale;
        }
        let (x, y) = self.config.bounds.clamp(params.x, params.y);
        let params = EffectParams { x, y, ..params };

        let cap = self.cap();
        let pool = self.pools.entry(kind).or_default();
        while !pool.is_empty() && pool.len() >= cap {
            pool.pop_front();
            self.evicted += 1;
        }
        if cap > 0 {
            pool.push_back(EffectInstance::new(id, kind, params, lifetime));
        }
        id
    }

    /// 以固定角度散开生成一组粒子
    pub fn burst(&mut self, kind: EffectKind, x: f32, y: f32, count: usize, speed: f32) {
        for i in 0..count {
            let angle = std::f32::consts::TAU * (i as f32 / count.max(1) as f32);
            let params = EffectParams::at(x, y).with_velocity(angle.cos() * speed, angle.sin() * speed);
            self.spawn(kind, params);
        }
    }

    /// 推进所有特效并剔除寿命耗尽的实例
    pub fn update(&mut self, dt: f32) {
        let gravity = self.config.gravity;
        let bounds = self.config.bounds;
        for pool in self.pools.values_mut() {
            for effect in pool.iter_mut() {
                effect.update(dt, gravity, &bounds);
            }
            pool.retain(|effect| effect.remaining() > 0.0);
        }
    }

    /// 按图层顺序绘制
    pub fn render(&self, renderer: &mut dyn Renderer) {
        for kind in EffectKind::DRAW_ORDER {
            if let Some(pool) = self.pools.get(&kind) {
                for effect in pool {
                    renderer.draw_effect(effect);
                }
            }
        }
    }

    /// 清空所有特效
    pub fn clear_all(&mut self) {
        let count = self.len();
        self.pools.clear();
        if count > 0 {
            debug!(count, "清空特效");
        }
    }

    /// 切换降级模式；进入降级时立即裁剪到新上限
    pub fn set_degraded(&mut self, degraded: bool) {
        if self.degraded == degraded {
            return;
        }
        self.degraded = degraded;
        debug!(degraded, "特效池模式切换");

        let cap = self.cap();
        for pool in self.pools.values_mut() {
            while pool.len() > cap {
                pool.pop_front();
                self.evicted += 1;
            }
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    /// 全部活跃特效数量
    pub fn len(&self) -> usize {
        self.pools.values().map(VecDeque::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 指定类型的活跃数量
    pub fn count(&self, kind: EffectKind) -> usize {
        self.pools.get(&kind).map_or(0, VecDeque::len)
    }

    pub fn evicted(&self) -> u64 {
        self.evicted
    }

    /// 遍历指定类型的实例（从旧到新）
    pub fn iter_kind(&self, kind: EffectKind) -> impl Iterator<Item = &EffectInstance> {
        self.pools.get(&kind).into_iter().flatten()
    }
}

impl Default for EffectPool {
    fn default() -> Self {
        Self::new(EffectPoolConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transition::TransitionOverlay;
    use crate::view::StageView;

    #[derive(Default)]
    struct RecordingRenderer {
        drawn: Vec<EffectKind>,
    }

    impl Renderer for RecordingRenderer {
        fn draw_stage(&mut self, _view: &StageView) {}

        fn draw_effect(&mut self, effect: &EffectInstance) {
            self.drawn.push(effect.kind);
        }

        fn draw_transition(&mut self, _overlay: &TransitionOverlay) {}
    }

    #[test]
    fn test_degraded_pool_never_exceeds_cap() {
        let mut pool = EffectPool::default();
        pool.set_degraded(true);

        for i in 0..100 {
            pool.spawn(EffectKind::Star, EffectParams::at(i as f32, 10.0));
            assert!(pool.count(EffectKind::Star) <= 12);
        }
        assert_eq!(pool.count(EffectKind::Star), 12);
        assert_eq!(pool.evicted(), 88);
    }

    #[test]
    fn test_oldest_evicted_first() {
        let mut pool = EffectPool::new(EffectPoolConfig {
            normal_cap: 2,
            ..EffectPoolConfig::default()
        });
        let first = pool.spawn(EffectKind::ScorePopup, EffectParams::at(0.0, 0.0));
        let second = pool.spawn(EffectKind::ScorePopup, EffectParams::at(0.0, 0.0));
        let third = pool.spawn(EffectKind::ScorePopup, EffectParams::at(0.0, 0.0));

        let ids: Vec<_> = pool.iter_kind(EffectKind::ScorePopup).map(|e| e.id).collect();
        assert_eq!(ids, vec![second, third]);
        assert!(!ids.contains(&first));
    }

    #[test]
    fn test_entering_degraded_trims_existing_pools() {
        let mut pool = EffectPool::default();
        pool.burst(EffectKind::Confetti, 640.0, 360.0, 40, 200.0);
        assert_eq!(pool.count(EffectKind::Confetti), 40);

        pool.set_degraded(true);
        assert_eq!(pool.count(EffectKind::Confetti), 12);
    }

    #[test]
    fn test_degraded_scales_new_durations() {
        let mut pool = EffectPool::default();
        pool.set_degraded(true);
        pool.spawn(EffectKind::Banner, EffectParams::at(0.0, 0.0).with_lifetime(2.0));

        let banner = pool.iter_kind(EffectKind::Banner).next().unwrap();
        assert_eq!(banner.lifetime, 1.0);
    }

    #[test]
    fn test_update_culls_expired() {
        let mut pool = EffectPool::default();
        pool.spawn(EffectKind::ScorePopup, EffectParams::at(10.0, 100.0).with_lifetime(0.5));
        pool.spawn(EffectKind::Banner, EffectParams::at(10.0, 100.0));

        pool.update(0.25);
        assert_eq!(pool.len(), 2);
        let popup = pool.iter_kind(EffectKind::ScorePopup).next().unwrap();
        assert!(popup.y < 100.0);
        assert!(popup.alpha < 1.0);

        pool.update(0.25);
        assert_eq!(pool.count(EffectKind::ScorePopup), 0);
        assert_eq!(pool.count(EffectKind::Banner), 1);
    }

    #[test]
    fn test_particles_stay_in_bounds() {
        let mut pool = EffectPool::default();
        pool.burst(EffectKind::Confetti, 5.0, 5.0, 16, 2000.0);
        pool.burst(EffectKind::Star, 1275.0, 715.0, 16, 2000.0);

        for _ in 0..60 {
            pool.update(1.0 / 60.0);
            for kind in [EffectKind::Confetti, EffectKind::Star] {
                for effect in pool.iter_kind(kind) {
                    assert!((0.0..=1280.0).contains(&effect.x));
                    assert!((0.0..=720.0).contains(&effect.y));
                }
            }
        }
    }

    #[test]
    fn test_progress_tween_reaches_target() {
        let mut pool = EffectPool::default();
        pool.spawn(
            EffectKind::ProgressTween,
            EffectParams::at(0.0, 0.0)
                .with_lifetime(1.0)
                .tween(0.2, 0.6, EasingFunction::Linear),
        );

        pool.update(0.5);
        let tween = pool.iter_kind(EffectKind::ProgressTween).next().unwrap();
        assert!((tween.value - 0.4).abs() < 1e-5);
    }

    #[test]
    fn test_render_in_layer_order() {
        let mut pool = EffectPool::default();
        pool.spawn(EffectKind::Banner, EffectParams::at(0.0, 0.0));
        pool.spawn(EffectKind::ScorePopup, EffectParams::at(0.0, 0.0));
        pool.spawn(EffectKind::Confetti, EffectParams::at(0.0, 0.0));

        let mut renderer = RecordingRenderer::default();
        pool.render(&mut renderer);

        assert_eq!(
            renderer.drawn,
            vec![EffectKind::Confetti, EffectKind::ScorePopup, EffectKind::Banner]
        );
        let layers: Vec<_> = renderer.drawn.iter().map(|k| k.layer()).collect();
        assert!(layers.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_clear_all() {
        let mut pool = EffectPool::default();
        pool.clear_all();
        pool.burst(EffectKind::Star, 100.0, 100.0, 5, 10.0);
        pool.clear_all();
        assert!(pool.is_empty());
    }
}
