use std::{sync::Arc, time::Duration};

use parking_lot::Mutex;
use serde_json::Value;
use tokio::time::Instant;
use tracing::trace;

use super::{report_drop, DropCallback, Pipe};
use crate::pubsub::{EmitArgs, Invocation, Listener, ListenerRef, Message};

/// Пропускает вызов, только если слушатель свободен и после завершения
/// предыдущего вызова прошло не меньше `window`.
#[derive(Clone)]
pub struct Debounce {
    window: Duration,
    on_drop: Option<DropCallback>,
}

impl Debounce {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
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

impl Pipe for Debounce {
    fn wrap(
        &self,
        inner: ListenerRef,
    ) -> ListenerRef {
        Arc::new(Debounced {
            inner,
            window: self.window,
            on_drop: self.on_drop.clone(),
            state: Arc::new(Mutex::new(State::default())),
        })
    }
}

#[derive(Default)]
struct State {
    in_flight: bool,
    quiet_until: Option<Instant>,
}

impl State {
    fn settle(
        &mut self,
        window: Duration,
    ) {
        self.in_flight = false;
        self.quiet_until = Some(Instant::now() + window);
    }
}

struct Debounced {
    inner: ListenerRef,
    window: Duration,
    on_drop: Option<DropCallback>,
    state: Arc<Mutex<State>>,
}

impl Listener for Debounced {
    fn invoke(
        &self,
        message: Message,
        args: &EmitArgs,
    ) -> Invocation {
        {
            let mut state = self.state.lock();
            let quiet = state.quiet_until.map_or(true, |t| Instant::now() >= t);
            if state.in_flight || !quiet {
                drop(state);
                trace!(topic = %message.topic, "debounce: call dropped");
                report_drop(self.on_drop.as_ref(), &message);
                return Invocation::Ready(Ok(Value::Null));
            }
            state.in_flight = true;
        }

        let guard = SettleGuard {
            state: self.state.clone(),
            window: self.window,
        };
        match self.inner.invoke(message, args) {
            Invocation::Pending(fut) => Invocation::pending(async move {
                let _guard = guard;
                fut.await
            }),
            done => done,
        }
    }
}

/// Освобождает слушателя при завершении вызова, в том числе при панике
/// или отмене future.
struct SettleGuard {
    state: Arc<Mutex<State>>,
    window: Duration,
}

impl Drop for SettleGuard {
    fn drop(&mut self) {
        self.state.lock().settle(self.window);
    }
}
