//! 逐帧记录绘制摘要的渲染器

use std::cell::RefCell;
use std::rc::Rc;

use stage_runtime::{EffectInstance, RenderError, Renderer, StageView, TransitionOverlay};
use tracing::trace;

use super::UiRegistry;

/// 渲染统计
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderStats {
    pub frames: u64,
    pub effects_drawn: u64,
    pub transition_frames: u64,
    /// 最近一帧绘制的阶段
    pub last_stage: Option<String>,
    /// 最近一帧的过渡遮罩覆盖率
    pub last_coverage: Option<f32>,
}

#[derive(Debug, Default)]
struct Frame {
    stage: Option<String>,
    effects: u32,
    coverage: Option<f32>,
}

/// 不输出像素的渲染器：每帧写一条 trace 日志并累计统计
#[derive(Debug)]
pub struct TraceRenderer {
    ui: UiRegistry,
    frame: Frame,
    stats: Rc<RefCell<RenderStats>>,
}

impl TraceRenderer {
    pub fn new(ui: UiRegistry) -> Self {
        Self {
            ui,
            frame: Frame::default(),
            stats: Rc::default(),
        }
    }

    /// 统计的共享句柄
    pub fn stats(&self) -> Rc<RefCell<RenderStats>> {
        Rc::clone(&self.stats)
    }
}

impl Renderer for TraceRenderer {
    fn begin_frame(&mut self) {
        self.frame = Frame::default();
    }

    fn draw_stage(&mut self, view: &StageView) {
        self.frame.stage = Some(view.id.clone());
    }

    fn draw_effect(&mut self, _effect: &EffectInstance) {
        self.frame.effects += 1;
    }

    fn draw_transition(&mut self, overlay: &TransitionOverlay) {
        self.frame.coverage = Some(overlay.coverage);
    }

    fn end_frame(&mut self) -> Result<(), RenderError> {
        let frame = std::mem::take(&mut self.frame);
        let mut stats = self.stats.borrow_mut();
        stats.frames += 1;
        stats.effects_drawn += u64::from(frame.effects);
        if frame.coverage.is_some() {
            stats.transition_frames += 1;
        }
        trace!(
            frame = stats.frames,
            stage = ?frame.stage,
            effects = frame.effects,
            coverage = ?frame.coverage,
            widgets = self.ui.len(),
            "帧"
        );
        stats.last_stage = frame.stage;
        stats.last_coverage = frame.coverage;
        Ok(())
    }
}
