//! 内存控件表

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use stage_runtime::{ButtonConfig, LabelConfig, UiHandle, UiService};
use tracing::trace;

/// 控件
#[derive(Debug, Clone, PartialEq)]
pub enum UiElement {
    Label(LabelConfig),
    Button(ButtonConfig),
}

#[derive(Debug, Default)]
struct Widgets {
    next: u64,
    elements: BTreeMap<UiHandle, UiElement>,
}

/// 共享的控件表
///
/// 克隆得到同一张表的另一个句柄：运行时通过 [`UiService`] 修改，
/// 渲染器与测试只读。
#[derive(Debug, Clone, Default)]
pub struct UiRegistry {
    widgets: Rc<RefCell<Widgets>>,
}

impl UiRegistry {
    fn insert(&self, element: UiElement) -> UiHandle {
        let mut widgets = self.widgets.borrow_mut();
        widgets.next += 1;
        let handle = UiHandle(widgets.next);
        trace!(handle = handle.0, ?element, "创建控件");
        widgets.elements.insert(handle, element);
        handle
    }

    /// 存活的控件数量
    pub fn len(&self) -> usize {
        self.widgets.borrow().elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, handle: UiHandle) -> Option<UiElement> {
        self.widgets.borrow().elements.get(&handle).cloned()
    }

    /// 所有标签文本（按创建顺序）
    pub fn label_texts(&self) -> Vec<String> {
        self.widgets
            .borrow()
            .elements
            .values()
            .filter_map(|element| match element {
                UiElement::Label(label) => Some(label.text.clone()),
                UiElement::Button(_) => None,
            })
            .collect()
    }

    /// 指定文本的按钮中心
    pub fn button_center(&self, text: &str) -> Option<(f32, f32)> {
        self.widgets
            .borrow()
            .elements
            .values()
            .find_map(|element| match element {
                UiElement::Button(button) if button.text == text => Some((
                    button.x + button.width / 2.0,
                    button.y + button.height / 2.0,
                )),
                _ => None,
            })
    }
}

impl UiService for UiRegistry {
    fn create_label(&mut self, config: LabelConfig) -> UiHandle {
        self.insert(UiElement::Label(config))
    }

    fn create_button(&mut self, config: ButtonConfig) -> UiHandle {
        self.insert(UiElement::Button(config))
    }

    fn remove_element(&mut self, handle: UiHandle) -> bool {
        self.widgets.borrow_mut().elements.remove(&handle).is_some()
    }

    fn set_text(&mut self, handle: UiHandle, text: &str) {
        if let Some(element) = self.widgets.borrow_mut().elements.get_mut(&handle) {
            match element {
                UiElement::Label(label) => label.text = text.to_string(),
                UiElement::Button(button) => button.text = text.to_string(),
            }
        }
    }

    /// 后创建的按钮在上层
    fn button_at(&self, x: f32, y: f32) -> Option<UiHandle> {
        self.widgets
            .borrow()
            .elements
            .iter()
            .rev()
            .find_map(|(handle, element)| match element {
                UiElement::Button(button) if button.contains(x, y) => Some(*handle),
                _ => None,
            })
    }
}
