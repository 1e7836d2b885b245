//! # Stages 模块
//!
//! 具体阶段与内容工厂。
//!
//! - `intro`：标题 + 开始按钮，没有活动
//! - `lesson`：依次运行清单中的活动，失败时提供重试按钮
//! - `finale`：结算页，完成时标记通关

use stage_runtime::{
    Activity, ActivityResult, ActivitySpec, ButtonConfig, ContentFactory, EasingFunction,
    EffectKind, EffectParams, LabelConfig, Stage, StageAction, StageContext, StageDescriptor,
    UiHandle,
};
use tracing::{debug, warn};

use crate::activities::CurriculumActivity;

/// 已知的阶段类型
pub const STAGE_KINDS: &[&str] = &["intro", "lesson", "finale"];

const TITLE_POS: (f32, f32) = (64.0, 48.0);
const STATUS_POS: (f32, f32) = (64.0, 112.0);
const SCORE_POS: (f32, f32) = (1040.0, 48.0);
const PROGRESS_BAR_POS: (f32, f32) = (1040.0, 96.0);

/// 画布底部居中的按钮
fn bottom_button(ctx: &StageContext<'_>, text: &str) -> ButtonConfig {
    let bounds = ctx.effects.config().bounds;
    let mut button = ButtonConfig::new(text, 0.0, 0.0);
    button.x = (bounds.width - button.width) / 2.0;
    button.y = bounds.height - button.height - 48.0;
    button
}

fn title_label(ctx: &mut StageContext<'_>) -> UiHandle {
    let title = ctx.title.to_string();
    ctx.ui
        .create_label(LabelConfig::new(title, TITLE_POS.0, TITLE_POS.1).with_font_size(40.0))
}

fn score_text(ctx: &StageContext<'_>) -> String {
    format!("Score {}", ctx.progress.state().score)
}

// =============================================================================
// Intro
// =============================================================================

#[derive(Debug, Default)]
pub struct IntroStage {
    start_button: Option<UiHandle>,
}

impl Stage for IntroStage {
    fn kind(&self) -> &'static str {
        "intro"
    }

    fn build(&mut self, ctx: &mut StageContext<'_>) {
        title_label(ctx);
        let (cx, cy) = ctx.canvas_center();
        ctx.ui.create_label(LabelConfig::new(
            "Tap Start when you are ready",
            cx - 180.0,
            cy,
        ));
        let button = bottom_button(ctx, "Start");
        self.start_button = Some(ctx.ui.create_button(button));
    }

    fn button_action(&self, handle: UiHandle) -> Option<StageAction> {
        (self.start_button == Some(handle)).then_some(StageAction::Continue)
    }

    fn teardown(&mut self, _ctx: &mut StageContext<'_>) {
        self.start_button = None;
    }
}

// =============================================================================
// Lesson
// =============================================================================

#[derive(Debug)]
pub struct LessonStage {
    total: usize,
    status: Option<UiHandle>,
    score: Option<UiHandle>,
    retry_button: Option<UiHandle>,
    /// 进度条当前显示的完成度
    shown_percent: f32,
}

impl LessonStage {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            status: None,
            score: None,
            retry_button: None,
            shown_percent: 0.0,
        }
    }

    /// 进度条从上次显示的完成度补间到当前值
    fn tween_progress(&mut self, ctx: &mut StageContext<'_>) {
        let percent = ctx.progress.completion_percent();
        if percent <= self.shown_percent {
            return;
        }
        ctx.effects.spawn(
            EffectKind::ProgressTween,
            EffectParams::at(PROGRESS_BAR_POS.0, PROGRESS_BAR_POS.1).tween(
                self.shown_percent,
                percent,
                EasingFunction::EaseOutCubic,
            ),
        );
        self.shown_percent = percent;
    }

    fn set_status(&self, ctx: &mut StageContext<'_>, text: &str) {
        if let Some(handle) = self.status {
            ctx.ui.set_text(handle, text);
        }
    }

    fn refresh_score(&self, ctx: &mut StageContext<'_>) {
        if let Some(handle) = self.score {
            let text = score_text(ctx);
            ctx.ui.set_text(handle, &text);
        }
    }
}

impl Stage for LessonStage {
    fn kind(&self) -> &'static str {
        "lesson"
    }

    fn build(&mut self, ctx: &mut StageContext<'_>) {
        title_label(ctx);
        self.status = Some(
            ctx.ui
                .create_label(LabelConfig::new("", STATUS_POS.0, STATUS_POS.1)),
        );
        let score = score_text(ctx);
        self.score = Some(
            ctx.ui
                .create_label(LabelConfig::new(score, SCORE_POS.0, SCORE_POS.1)),
        );
        self.shown_percent = ctx.progress.completion_percent();
    }

    fn on_activity_started(&mut self, ctx: &mut StageContext<'_>, index: usize, kind: &str) {
        if let Some(handle) = self.retry_button.take() {
            ctx.ui.remove(handle);
        }
        let text = format!("Step {}/{} · {}", index + 1, self.total, kind);
        self.set_status(ctx, &text);
    }

    fn on_activity_finished(
        &mut self,
        ctx: &mut StageContext<'_>,
        index: usize,
        result: &ActivityResult,
    ) {
        if result.success {
            let text = format!("Step {}/{} done (+{})", index + 1, self.total, result.score);
            self.set_status(ctx, &text);
            self.refresh_score(ctx);
            self.tween_progress(ctx);
            return;
        }

        self.set_status(ctx, "Out of time. Try again?");
        let button = bottom_button(ctx, "Retry");
        self.retry_button = Some(ctx.ui.create_button(button));
    }

    fn button_action(&self, handle: UiHandle) -> Option<StageAction> {
        (self.retry_button == Some(handle)).then_some(StageAction::RetryActivity)
    }

    fn teardown(&mut self, _ctx: &mut StageContext<'_>) {
        self.status = None;
        self.score = None;
        self.retry_button = None;
    }
}

// =============================================================================
// Finale
// =============================================================================

#[derive(Debug, Default)]
pub struct FinaleStage {
    finish_button: Option<UiHandle>,
}

impl Stage for FinaleStage {
    fn kind(&self) -> &'static str {
        "finale"
    }

    fn build(&mut self, ctx: &mut StageContext<'_>) {
        title_label(ctx);
        let summary = format!(
            "Score {} · {:.0}% complete · {} achievements",
            ctx.progress.state().score,
            ctx.progress.completion_percent(),
            ctx.progress.state().unlocked_achievements.len(),
        );
        let (cx, cy) = ctx.canvas_center();
        ctx.ui
            .create_label(LabelConfig::new(summary, cx - 240.0, cy));
        let button = bottom_button(ctx, "Finish");
        self.finish_button = Some(ctx.ui.create_button(button));
    }

    fn on_complete(&mut self, ctx: &mut StageContext<'_>) {
        if ctx.progress.complete_game() {
            debug!(stage = %ctx.stage_id, "课程通关");
        }
    }

    fn button_action(&self, handle: UiHandle) -> Option<StageAction> {
        (self.finish_button == Some(handle)).then_some(StageAction::Continue)
    }

    fn teardown(&mut self, _ctx: &mut StageContext<'_>) {
        self.finish_button = None;
    }
}

// =============================================================================
// 封闭变体 + 工厂
// =============================================================================

/// 课程阶段
#[derive(Debug)]
pub enum CurriculumStage {
    Intro(IntroStage),
    Lesson(LessonStage),
    Finale(FinaleStage),
}

impl CurriculumStage {
    /// 按描述中的 `kind` 构建；未知类型按课程阶段处理
    pub fn from_descriptor(descriptor: &StageDescriptor) -> Self {
        match descriptor.kind.as_str() {
            "intro" => Self::Intro(IntroStage::default()),
            "finale" => Self::Finale(FinaleStage::default()),
            "lesson" => Self::Lesson(LessonStage::new(descriptor.step_count())),
            other => {
                warn!(stage = %descriptor.id, kind = %other, "未知阶段类型，按 lesson 处理");
                Self::Lesson(LessonStage::new(descriptor.step_count()))
            }
        }
    }

    fn inner(&self) -> &dyn Stage {
        match self {
            Self::Intro(s) => s,
            Self::Lesson(s) => s,
            Self::Finale(s) => s,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn Stage {
        match self {
            Self::Intro(s) => s,
            Self::Lesson(s) => s,
            Self::Finale(s) => s,
        }
    }
}

impl Stage for CurriculumStage {
    fn kind(&self) -> &'static str {
        self.inner().kind()
    }

    fn build(&mut self, ctx: &mut StageContext<'_>) {
        self.inner_mut().build(ctx);
    }

    fn on_activity_started(&mut self, ctx: &mut StageContext<'_>, index: usize, kind: &str) {
        self.inner_mut().on_activity_started(ctx, index, kind);
    }

    fn on_activity_finished(
        &mut self,
        ctx: &mut StageContext<'_>,
        index: usize,
        result: &ActivityResult,
    ) {
        self.inner_mut().on_activity_finished(ctx, index, result);
    }

    fn on_complete(&mut self, ctx: &mut StageContext<'_>) {
        self.inner_mut().on_complete(ctx);
    }

    fn button_action(&self, handle: UiHandle) -> Option<StageAction> {
        self.inner().button_action(handle)
    }

    fn teardown(&mut self, ctx: &mut StageContext<'_>) {
        self.inner_mut().teardown(ctx);
    }
}

/// 课程内容工厂
#[derive(Debug, Default)]
pub struct CurriculumFactory;

impl ContentFactory for CurriculumFactory {
    fn create_stage(&self, descriptor: &StageDescriptor) -> Box<dyn Stage> {
        Box::new(CurriculumStage::from_descriptor(descriptor))
    }

    fn create_activity(&self, spec: &ActivitySpec) -> Box<dyn Activity> {
        Box::new(CurriculumActivity::from_spec(spec))
    }
}
