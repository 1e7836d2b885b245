//! 单元测试共用的服务替身

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

use crate::activity::{Activity, ActivityResult, ActivitySpec};
use crate::effects::{EffectInstance, EffectPool};
use crate::error::RenderError;
use crate::input::InputEvent;
use crate::orchestrator::ContentFactory;
use crate::progress::ProgressTracker;
use crate::services::{
    AssetHandle, AssetService, AssetStatus, AudioService, ButtonConfig, LabelConfig, Renderer,
    UiHandle, UiService,
};
use crate::stage::{Stage, StageAction, StageContext, StageDescriptor, Systems};
use crate::transition::TransitionOverlay;
use crate::view::StageView;

/// 下一次 `poll` 时完成加载的资源服务
#[derive(Debug, Default)]
pub struct MockAssets {
    statuses: BTreeMap<String, AssetStatus>,
    broken: BTreeSet<String>,
    pub requests: Vec<String>,
}

impl MockAssets {
    /// 之后对该资源的加载都会失败
    pub fn fail(&mut self, key: &str) {
        self.broken.insert(key.to_string());
    }

    pub fn heal(&mut self, key: &str) {
        self.broken.remove(key);
    }
}

impl AssetService for MockAssets {
    fn load_image(&mut self, _path: &str, key: &str) {
        self.requests.push(key.to_string());
        self.statuses.insert(key.to_string(), AssetStatus::Pending);
    }

    fn status(&self, key: &str) -> AssetStatus {
        self.statuses
            .get(key)
            .cloned()
            .unwrap_or(AssetStatus::Missing)
    }

    fn get_asset(&self, key: &str) -> Option<AssetHandle> {
        (self.status(key) == AssetStatus::Ready).then(|| AssetHandle {
            key: key.to_string(),
            path: format!("{key}.png"),
            byte_len: 0,
        })
    }

    fn poll(&mut self) {
        for (key, status) in self.statuses.iter_mut() {
            if *status == AssetStatus::Pending {
                *status = if self.broken.contains(key) {
                    AssetStatus::Failed("not found".to_string())
                } else {
                    AssetStatus::Ready
                };
            }
        }
    }
}

/// 记录播放过的音效
#[derive(Debug, Default)]
pub struct RecordingAudio {
    pub played: Vec<String>,
}

impl AudioService for RecordingAudio {
    fn play_sound(&mut self, key: &str) {
        self.played.push(key.to_string());
    }
}

/// 内存 UI 控件表
#[derive(Debug, Default)]
pub struct MockUi {
    next: u64,
    labels: BTreeMap<UiHandle, LabelConfig>,
    buttons: BTreeMap<UiHandle, ButtonConfig>,
}

impl MockUi {
    /// 存活的控件数量
    pub fn live(&self) -> usize {
        self.labels.len() + self.buttons.len()
    }
}

impl UiService for MockUi {
    fn create_label(&mut self, config: LabelConfig) -> UiHandle {
        self.next += 1;
        self.labels.insert(UiHandle(self.next), config);
        UiHandle(self.next)
    }

    fn create_button(&mut self, config: ButtonConfig) -> UiHandle {
        self.next += 1;
        self.buttons.insert(UiHandle(self.next), config);
        UiHandle(self.next)
    }

    fn remove_element(&mut self, handle: UiHandle) -> bool {
        self.labels.remove(&handle).is_some() || self.buttons.remove(&handle).is_some()
    }

    fn set_text(&mut self, handle: UiHandle, text: &str) {
        if let Some(label) = self.labels.get_mut(&handle) {
            label.text = text.to_string();
        }
    }

    fn button_at(&self, x: f32, y: f32) -> Option<UiHandle> {
        self.buttons
            .iter()
            .find(|(_, button)| button.contains(x, y))
            .map(|(handle, _)| *handle)
    }
}

/// 交给 `Services` 之后仍可在测试里观察
pub fn shared<T>(value: T) -> Rc<RefCell<T>> {
    Rc::new(RefCell::new(value))
}

impl<T: UiService> UiService for Rc<RefCell<T>> {
    fn create_label(&mut self, config: LabelConfig) -> UiHandle {
        self.borrow_mut().create_label(config)
    }

    fn create_button(&mut self, config: ButtonConfig) -> UiHandle {
        self.borrow_mut().create_button(config)
    }

    fn remove_element(&mut self, handle: UiHandle) -> bool {
        self.borrow_mut().remove_element(handle)
    }

    fn set_text(&mut self, handle: UiHandle, text: &str) {
        self.borrow_mut().set_text(handle, text);
    }

    fn button_at(&self, x: f32, y: f32) -> Option<UiHandle> {
        self.borrow().button_at(x, y)
    }
}

/// 按帧记录绘制调用；`fail_frames` 帧内 `end_frame` 返回错误
#[derive(Debug, Default)]
pub struct RecordingRenderer {
    pub frames: Vec<Vec<String>>,
    pub fail_frames: u32,
}

impl RecordingRenderer {
    fn record(&mut self, call: String) {
        if let Some(frame) = self.frames.last_mut() {
            frame.push(call);
        }
    }
}

impl Renderer for RecordingRenderer {
    fn begin_frame(&mut self) {
        self.frames.push(vec!["begin".to_string()]);
    }

    fn draw_stage(&mut self, _view: &StageView) {
        self.record("stage".to_string());
    }

    fn draw_effect(&mut self, effect: &EffectInstance) {
        self.record(format!("effect:{:?}", effect.kind));
    }

    fn draw_transition(&mut self, _overlay: &TransitionOverlay) {
        self.record("transition".to_string());
    }

    fn end_frame(&mut self) -> Result<(), RenderError> {
        self.record("end".to_string());
        if self.fail_frames > 0 {
            self.fail_frames -= 1;
            return Err(RenderError::Backend("scripted failure".to_string()));
        }
        Ok(())
    }
}

impl<T: Renderer> Renderer for Rc<RefCell<T>> {
    fn begin_frame(&mut self) {
        self.borrow_mut().begin_frame();
    }

    fn draw_stage(&mut self, view: &StageView) {
        self.borrow_mut().draw_stage(view);
    }

    fn draw_effect(&mut self, effect: &EffectInstance) {
        self.borrow_mut().draw_effect(effect);
    }

    fn draw_transition(&mut self, overlay: &TransitionOverlay) {
        self.borrow_mut().draw_transition(overlay);
    }

    fn end_frame(&mut self) -> Result<(), RenderError> {
        self.borrow_mut().end_frame()
    }
}

/// 持有全部服务替身，按需借出 [`Systems`]
#[derive(Debug, Default)]
pub struct Harness {
    pub assets: MockAssets,
    pub audio: RecordingAudio,
    pub ui: MockUi,
    pub progress: ProgressTracker,
    pub effects: EffectPool,
}

impl Harness {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn systems(&mut self) -> Systems<'_> {
        Systems {
            assets: &mut self.assets,
            audio: &mut self.audio,
            ui: &mut self.ui,
            progress: &mut self.progress,
            effects: &mut self.effects,
        }
    }
}

/// 需要点击 N 次的活动
struct Clicks {
    needed: u32,
    done: u32,
    limit: Option<f32>,
}

pub fn clicks(needed: u32, limit: Option<f32>) -> Box<dyn Activity> {
    Box::new(Clicks {
        needed,
        done: 0,
        limit,
    })
}

impl Activity for Clicks {
    fn kind(&self) -> &'static str {
        "clicks"
    }

    fn configure(&mut self) {
        self.done = 0;
    }

    fn handle_input(&mut self, event: &InputEvent) -> bool {
        if matches!(event, InputEvent::Click { .. }) {
            self.done += 1;
            return true;
        }
        false
    }

    fn is_won(&self) -> bool {
        self.done >= self.needed
    }

    fn progress(&self) -> f32 {
        self.done as f32 / self.needed.max(1) as f32
    }

    fn time_limit(&self) -> Option<f32> {
        self.limit
    }

    fn compute_result(&self, success: bool, elapsed: f32) -> ActivityResult {
        ActivityResult::new(success, if success { 10 } else { 0 }, elapsed)
    }
}

/// 建标题标签，失败时建重试按钮
#[derive(Debug, Default)]
pub struct TestStage {
    retry_button: Option<UiHandle>,
}

impl TestStage {
    pub const RETRY_BUTTON_POS: (f32, f32) = (400.0, 500.0);
}

impl Stage for TestStage {
    fn kind(&self) -> &'static str {
        "test"
    }

    fn build(&mut self, ctx: &mut StageContext<'_>) {
        let title = ctx.title.to_string();
        ctx.ui.create_label(LabelConfig::new(title, 20.0, 20.0));
    }

    fn on_activity_started(&mut self, ctx: &mut StageContext<'_>, _index: usize, _kind: &str) {
        if let Some(handle) = self.retry_button.take() {
            ctx.ui.remove(handle);
        }
    }

    fn on_activity_finished(
        &mut self,
        ctx: &mut StageContext<'_>,
        _index: usize,
        result: &ActivityResult,
    ) {
        if !result.success {
            let (x, y) = Self::RETRY_BUTTON_POS;
            self.retry_button = Some(ctx.ui.create_button(ButtonConfig::new("Retry", x, y)));
        }
    }

    fn button_action(&self, handle: UiHandle) -> Option<StageAction> {
        (self.retry_button == Some(handle)).then_some(StageAction::RetryActivity)
    }
}

/// 活动参数 `{"clicks": n}`，默认 1 次
#[derive(Debug, Default)]
pub struct TestFactory;

impl ContentFactory for TestFactory {
    fn create_stage(&self, _descriptor: &StageDescriptor) -> Box<dyn Stage> {
        Box::new(TestStage::default())
    }

    fn create_activity(&self, spec: &ActivitySpec) -> Box<dyn Activity> {
        let needed = spec
            .params
            .get("clicks")
            .and_then(serde_json::Value::as_u64)
            .unwrap_or(1) as u32;
        clicks(needed, spec.time_limit)
    }
}
