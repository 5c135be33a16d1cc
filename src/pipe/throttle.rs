use std::{sync::Arc, time::Duration};

use parking_lot::Mutex;
use serde_json::Value;
use tokio::time::Instant;
use tracing::trace;

use super::{report_drop, DropCallback, Pipe};
use crate::pubsub::{EmitArgs, Invocation, Listener, ListenerRef, Message};

/// Не чаще одного запуска за `interval`, считая от начала предыдущего
/// запуска. Лишние вызовы отбрасываются.
#[derive(Clone)]
pub struct Throttle {
    interval: Duration,
    on_drop: Option<DropCallback>,
}

impl Throttle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            on_drop: None,
        }
    }

    pub fn on_drop<F>(
        mut self,
        on_drop: F,
    ) -> Self
    where
        F: Fn(&Message) + Send + Sync + 'static,
    {
        self.on_drop = Some(Arc::new(on_drop));
        self
    }
}

impl Pipe for Throttle {
    fn wrap(
        &self,
        inner: ListenerRef,
    ) -> ListenerRef {
        Arc::new(Throttled {
            inner,
            interval: self.interval,
            on_drop: self.on_drop.clone(),
            last_start: Mutex::new(None),
        })
    }
}

struct Throttled {
    inner: ListenerRef,
    interval: Duration,
    on_drop: Option<DropCallback>,
    last_start: Mutex<Option<Instant>>,
}

impl Listener for Throttled {
    fn invoke(
        &self,
        message: Message,
        args: &EmitArgs,
    ) -> Invocation {
        let now = Instant::now();
        let admitted = {
            let mut last_start = self.last_start.lock();
            let open = last_start.map_or(true, |t| now.duration_since(t) >= self.interval);
            if open {
                *last_start = Some(now);
            }
            open
        };

        if !admitted {
            trace!(topic = %message.topic, "throttle: call dropped");
            report_drop(self.on_drop.as_ref(), &message);
            return Invocation::Ready(Ok(Value::Null));
        }
        self.inner.invoke(message, args)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;

    use super::*;
    use crate::pubsub::from_fn;

    /// Тест проверяет, что за интервал проходит только первый вызов.
    #[tokio::test(start_paused = true)]
    async fn test_throttle_interval() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let listener = Throttle::new(Duration::from_millis(50)).wrap(from_fn(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(json!("ran"))
        }));
        let args = EmitArgs::default();

        for _ in 0..5 {
            listener.invoke(Message::new("t", Value::Null), &args);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_millis(30)).await;
        listener.invoke(Message::new("t", Value::Null), &args);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_millis(20)).await;
        listener.invoke(Message::new("t", Value::Null), &args);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
