//! # Services 模块
//!
//! 外部服务的 headless 实现。
//!
//! - [`HeadlessAssets`]：从资源目录读取文件，每帧完成有限数量的请求
//! - [`LogAudio`]：把音效请求写入日志
//! - [`UiRegistry`]：内存控件表，与渲染器共享
//! - [`TraceRenderer`]：逐帧记录绘制摘要

mod assets;
mod audio;
mod render;
mod ui;

pub use assets::HeadlessAssets;
pub use audio::LogAudio;
pub use render::{RenderStats, TraceRenderer};
pub use ui::{UiElement, UiRegistry};
