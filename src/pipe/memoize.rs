use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;

use super::Pipe;
use crate::pubsub::{EmitArgs, Invocation, Listener, ListenerRef, Message};

/// Сравнение предыдущего и нового сообщения.
pub type SameMessage = Arc<dyn Fn(&Message, &Message) -> bool + Send + Sync>;

/// Возвращает последний результат без вызова слушателя, если новое
/// сообщение «равно» предыдущему. Ошибки не кэшируются.
#[derive(Clone)]
pub struct Memoize {
    same: SameMessage,
}

impl Memoize {
    /// Сравнение по полезной нагрузке.
    pub fn new() -> Self {
        Self::with(|prev, next| prev.payload == next.payload)
    }

    pub fn with<F>(same: F) -> Self
    where
        F: Fn(&Message, &Message) -> bool + Send + Sync + 'static,
    {
        Self {
            same: Arc::new(same),
        }
    }
}

impl Default for Memoize {
    fn default() -> Self {
        Self::new()
    }
}

impl Pipe for Memoize {
    fn wrap(
        &self,
        inner: ListenerRef,
    ) -> ListenerRef {
        Arc::new(Memoized {
            inner,
            same: self.same.clone(),
            last: Arc::new(Mutex::new(None)),
        })
    }
}

type Cache = Arc<Mutex<Option<(Message, Value)>>>;

struct Memoized {
    inner: ListenerRef,
    same: SameMessage,
    last: Cache,
}

impl Listener for Memoized {
    fn invoke(
        &self,
        message: Message,
        args: &EmitArgs,
    ) -> Invocation {
        if let Some((prev, value)) = self.last.lock().as_ref() {
            if (self.same)(prev, &message) {
                return Invocation::Ready(Ok(value.clone()));
            }
        }

        let key = message.clone();
        match self.inner.invoke(message, args) {
            Invocation::Ready(Ok(value)) => {
                *self.last.lock() = Some((key, value.clone()));
                Invocation::Ready(Ok(value))
            }
            Invocation::Pending(fut) => {
                let last = self.last.clone();
                Invocation::pending(async move {
                    let result = fut.await;
                    if let Ok(value) = &result {
                        *last.lock() = Some((key, value.clone()));
                    }
                    result
                })
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;

    use super::*;
    use crate::pubsub::{from_async, from_fn};

    #[test]
    fn test_memoize_same_payload() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let listener = Memoize::new().wrap(from_fn(move |msg| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(json!({"seen": msg.payload}))
        }));
        let args = EmitArgs::default();

        for payload in [json!(1), json!(1), json!(2), json!(2), json!(1)] {
            listener.invoke(Message::new("t", payload), &args);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    /// Тест проверяет, что ошибка не попадает в кэш.
    #[test]
    fn test_errors_not_cached() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let listener = Memoize::new().wrap(from_fn(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            anyhow::bail!("nope")
        }));
        let args = EmitArgs::default();
        listener.invoke(Message::new("t", json!(1)), &args);
        listener.invoke(Message::new("t", json!(1)), &args);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_custom_predicate_async() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let listener = Memoize::with(|prev, next| prev.topic == next.topic).wrap(from_async(
            move |msg| {
                counter.fetch_add(1, Ordering::SeqCst);
                async move { Ok(msg.payload) }
            },
        ));
        let args = EmitArgs::default();

        let first = listener
            .invoke(Message::new("a", json!(1)), &args)
            .resolve()
            .await;
        let cached = listener
            .invoke(Message::new("a", json!(2)), &args)
            .resolve()
            .await;
        assert_eq!(first.unwrap(), json!(1));
        assert_eq!(cached.unwrap(), json!(1));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
