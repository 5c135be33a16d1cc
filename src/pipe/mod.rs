//! Обёртки слушателей (пайпы).
//!
//! Пайп получает слушателя и возвращает нового, добавляя поведение вокруг
//! вызова: подавление частых вызовов, повторы, кэширование, очередь.
//! Пайпы из `ListenOptions::pipes` применяются по порядку, так что последний
//! оказывается внешним и первым видит каждый вызов.
//!
//! Отброшенные вызовы завершаются значением `null` и сообщаются колбэку
//! `on_drop`, если он задан.

pub mod debounce;
pub mod memoize;
pub mod queue;
pub mod retry;
pub mod throttle;

use std::sync::Arc;

pub use debounce::Debounce;
pub use memoize::Memoize;
pub use queue::{DropReason, Overflow, Queue, QueueOptions, QueuedCall};
pub use retry::Retry;
pub use throttle::Throttle;

use crate::pubsub::{ListenerRef, Message};

/// Преобразование слушателя.
pub trait Pipe: Send + Sync + 'static {
    fn wrap(
        &self,
        inner: ListenerRef,
    ) -> ListenerRef;
}

impl<F> Pipe for F
where
    F: Fn(ListenerRef) -> ListenerRef + Send + Sync + 'static,
{
    fn wrap(
        &self,
        inner: ListenerRef,
    ) -> ListenerRef {
        self(inner)
    }
}

pub type PipeRef = Arc<dyn Pipe>;

/// Колбэк для вызовов, отброшенных пайпом.
pub type DropCallback = Arc<dyn Fn(&Message) + Send + Sync>;

pub(crate) fn report_drop(
    on_drop: Option<&DropCallback>,
    message: &Message,
) {
    if let Some(on_drop) = on_drop {
        on_drop(message);
    }
}
