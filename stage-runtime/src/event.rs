//! # Event 模块
//!
//! 类型化的观察者（事件总线）。
//!
//! - 显式 `subscribe` / `unsubscribe`
//! - 同步投递，按注册顺序调用
//! - 单线程使用，订阅者不要求 `Send`

use std::fmt;

/// 订阅标识符
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

/// 事件总线
pub struct EventBus<E> {
    subscribers: Vec<(SubscriptionId, Box<dyn FnMut(&E)>)>,
    next_id: u64,
}

impl<E> EventBus<E> {
    /// 创建空的事件总线
    pub fn new() -> Self {
        Self {
            subscribers: Vec::new(),
            next_id: 1,
        }
    }

    /// 注册订阅者，返回用于注销的 ID
    pub fn subscribe(&mut self, handler: impl FnMut(&E) + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.subscribers.push((id, Box::new(handler)));
        id
    }

    /// 注销订阅者
    ///
    /// 返回该订阅是否存在。
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(sub_id, _)| *sub_id != id);
        self.subscribers.len() != before
    }

    /// 发布事件（同步，按注册顺序）
    pub fn publish(&mut self, event: &E) {
        for (_, handler) in self.subscribers.iter_mut() {
            handler(event);
        }
    }

    /// 订阅者数量
    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }
}

impl<E> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> fmt::Debug for EventBus<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_delivery_in_registration_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut bus: EventBus<u32> = EventBus::new();

        let first = log.clone();
        bus.subscribe(move |e| first.borrow_mut().push(format!("a{e}")));
        let second = log.clone();
        bus.subscribe(move |e| second.borrow_mut().push(format!("b{e}")));

        bus.publish(&1);
        bus.publish(&2);

        assert_eq!(*log.borrow(), vec!["a1", "b1", "a2", "b2"]);
    }

    #[test]
    fn test_unsubscribe() {
        let count = Rc::new(RefCell::new(0));
        let mut bus: EventBus<()> = EventBus::new();

        let counter = count.clone();
        let id = bus.subscribe(move |_| *counter.borrow_mut() += 1);
        bus.publish(&());
        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        bus.publish(&());

        assert_eq!(*count.borrow(), 1);
        assert!(bus.is_empty());
    }
}
