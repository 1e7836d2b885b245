//! # Services 模块
//!
//! 编排核心依赖的外部服务接口。
//!
//! 运行时本身不做任何 IO 与绘制，只通过这些 trait 与宿主层交互：
//!
//! ```text
//! Runtime                         Host
//!   │── load_image / status ────►│  AssetService
//!   │── play_sound ─────────────►│  AudioService
//!   │── create_label / button ──►│  UiService
//!   │── save / load ────────────►│  PersistenceService
//!   │── draw_* ─────────────────►│  Renderer
//! ```

use crate::effects::EffectInstance;
use crate::error::{PersistenceError, RenderError};
use crate::state::GameState;
use crate::transition::TransitionOverlay;
use crate::view::StageView;

// =============================================================================
// 资源
// =============================================================================

/// 资源加载状态
#[derive(Debug, Clone, PartialEq)]
pub enum AssetStatus {
    /// 从未请求
    Missing,
    /// 加载中
    Pending,
    /// 已就绪
    Ready,
    /// 加载失败
    Failed(String),
}

/// 已加载的资源句柄
#[derive(Debug, Clone, PartialEq)]
pub struct AssetHandle {
    pub key: String,
    pub path: String,
    pub byte_len: usize,
}

/// 资源服务
///
/// `load_image` 是异步的：调用只发起请求，完成情况在之后的 tick 中
/// 通过 `status` 观察。失败时调用方必须把资源视为缺失，不能崩溃。
pub trait AssetService {
    /// 发起图片加载请求
    fn load_image(&mut self, path: &str, key: &str);

    /// 查询加载状态
    fn status(&self, key: &str) -> AssetStatus;

    /// 同步查询已加载资源
    fn get_asset(&self, key: &str) -> Option<AssetHandle>;

    /// 推进异步加载（每帧调用一次）
    fn poll(&mut self) {}
}

// =============================================================================
// 音频
// =============================================================================

/// 音频服务（即发即弃，缺失的音效静默跳过）
pub trait AudioService {
    fn play_sound(&mut self, key: &str);
}

/// 不发声的音频服务
#[derive(Debug, Default)]
pub struct SilentAudio;

impl AudioService for SilentAudio {
    fn play_sound(&mut self, _key: &str) {}
}

/// 受玩家设置 `sound_enabled` 控制的音频包装
pub struct SoundGate<'a> {
    audio: &'a mut dyn AudioService,
    enabled: bool,
}

impl<'a> SoundGate<'a> {
    pub fn new(audio: &'a mut dyn AudioService, enabled: bool) -> Self {
        Self { audio, enabled }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

impl AudioService for SoundGate<'_> {
    fn play_sound(&mut self, key: &str) {
        if self.enabled {
            self.audio.play_sound(key);
        }
    }
}

// =============================================================================
// UI 控件
// =============================================================================

/// UI 元素句柄
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UiHandle(pub u64);

/// 文本标签配置
#[derive(Debug, Clone, PartialEq)]
pub struct LabelConfig {
    pub text: String,
    pub x: f32,
    pub y: f32,
    pub font_size: f32,
}

impl LabelConfig {
    pub fn new(text: impl Into<String>, x: f32, y: f32) -> Self {
        Self {
            text: text.into(),
            x,
            y,
            font_size: 24.0,
        }
    }

    pub fn with_font_size(mut self, size: f32) -> Self {
        self.font_size = size;
        self
    }
}

/// 按钮配置
#[derive(Debug, Clone, PartialEq)]
pub struct ButtonConfig {
    pub text: String,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl ButtonConfig {
    pub fn new(text: impl Into<String>, x: f32, y: f32) -> Self {
        Self {
            text: text.into(),
            x,
            y,
            width: 160.0,
            height: 48.0,
        }
    }

    /// 点是否落在按钮内
    pub fn contains(&self, px: f32, py: f32) -> bool {
        px >= self.x && px <= self.x + self.width && py >= self.y && py <= self.y + self.height
    }
}

/// UI 控件服务
///
/// 编排核心只通过此服务创建/移除控件，从不直接绘制控件。
pub trait UiService {
    fn create_label(&mut self, config: LabelConfig) -> UiHandle;

    fn create_button(&mut self, config: ButtonConfig) -> UiHandle;

    /// 移除控件，返回控件是否存在
    fn remove_element(&mut self, handle: UiHandle) -> bool;

    /// 更新标签文本
    fn set_text(&mut self, handle: UiHandle, text: &str);

    /// 命中测试：返回该位置上的按钮
    fn button_at(&self, x: f32, y: f32) -> Option<UiHandle>;
}

/// 记录所有权的 UI 作用域
///
/// 阶段通过它创建的每个控件都会登记到阶段自己的列表，
/// 拆除阶段时统一移除。
pub struct UiScope<'a> {
    service: &'a mut dyn UiService,
    owned: &'a mut Vec<UiHandle>,
}

impl<'a> UiScope<'a> {
    pub fn new(service: &'a mut dyn UiService, owned: &'a mut Vec<UiHandle>) -> Self {
        Self { service, owned }
    }

    pub fn create_label(&mut self, config: LabelConfig) -> UiHandle {
        let handle = self.service.create_label(config);
        self.owned.push(handle);
        handle
    }

    pub fn create_button(&mut self, config: ButtonConfig) -> UiHandle {
        let handle = self.service.create_button(config);
        self.owned.push(handle);
        handle
    }

    /// 只能移除本作用域创建的控件
    pub fn remove(&mut self, handle: UiHandle) -> bool {
        let Some(pos) = self.owned.iter().position(|h| *h == handle) else {
            return false;
        };
        self.owned.remove(pos);
        self.service.remove_element(handle)
    }

    pub fn set_text(&mut self, handle: UiHandle, text: &str) {
        if self.owned.contains(&handle) {
            self.service.set_text(handle, text);
        }
    }

    pub fn button_at(&self, x: f32, y: f32) -> Option<UiHandle> {
        self.service
            .button_at(x, y)
            .filter(|handle| self.owned.contains(handle))
    }

    /// 移除本作用域的全部控件
    pub fn remove_all(&mut self) -> usize {
        let handles = std::mem::take(&mut *self.owned);
        let count = handles.len();
        for handle in handles {
            self.service.remove_element(handle);
        }
        count
    }

    pub fn owned_count(&self) -> usize {
        self.owned.len()
    }
}

// =============================================================================
// 持久化
// =============================================================================

/// 持久化服务
///
/// 不可用时调用方必须退化为纯内存运行，不能失败。
pub trait PersistenceService {
    fn save(&mut self, snapshot: &GameState) -> Result<(), PersistenceError>;

    /// 读取快照；`Ok(None)` 表示没有存档
    fn load(&mut self) -> Result<Option<GameState>, PersistenceError>;
}

/// 不做任何事的持久化（默认实现）
#[derive(Debug, Default)]
pub struct NoopPersistence;

impl PersistenceService for NoopPersistence {
    fn save(&mut self, _snapshot: &GameState) -> Result<(), PersistenceError> {
        Ok(())
    }

    fn load(&mut self) -> Result<Option<GameState>, PersistenceError> {
        Ok(None)
    }
}

// =============================================================================
// 渲染
// =============================================================================

/// 渲染接口
///
/// 一帧的调用顺序固定：`begin_frame` → `draw_stage` → `draw_effect`（按图层）
/// → `draw_transition` → `end_frame`。
pub trait Renderer {
    fn begin_frame(&mut self) {}

    fn draw_stage(&mut self, view: &StageView);

    fn draw_effect(&mut self, effect: &EffectInstance);

    fn draw_transition(&mut self, overlay: &TransitionOverlay);

    fn end_frame(&mut self) -> Result<(), RenderError> {
        Ok(())
    }
}

/// 不输出任何内容的渲染器
#[derive(Debug, Default)]
pub struct NullRenderer;

impl Renderer for NullRenderer {
    fn draw_stage(&mut self, _view: &StageView) {}

    fn draw_effect(&mut self, _effect: &EffectInstance) {}

    fn draw_transition(&mut self, _overlay: &TransitionOverlay) {}
}

/// 运行时持有的服务集合
pub struct Services {
    pub assets: Box<dyn AssetService>,
    pub audio: Box<dyn AudioService>,
    pub ui: Box<dyn UiService>,
    pub renderer: Box<dyn Renderer>,
}
