//! Очередь вызовов: слушатель никогда не выполняется параллельно сам с собой.
//!
//! Вызов, пришедший во время выполнения предыдущего, ставится в буфер и
//! получает дескриптор, который завершится, когда до него дойдёт очередь.
//! При заполненном буфере работает политика [`Overflow`].

use std::{collections::VecDeque, fmt, sync::Arc, time::Duration};

use parking_lot::Mutex;
use serde_json::Value;
use tokio::{runtime::Handle, sync::oneshot, time::Instant};
use tracing::{trace, warn};
use vestnik_error::{EmitError, EmitResult};

use super::Pipe;
use crate::pubsub::{EmitArgs, Invocation, Listener, ListenerRef, Message};

/// Поведение при заполненном буфере.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Overflow {
    /// Отбросить новый вызов.
    #[default]
    Drop,
    /// Вытеснить самый старый вызов из буфера.
    Slide,
    /// Увеличить буфер (до `size + max_expand_size`), затем `expand_overflow`.
    Expand,
    /// Вернуть вызывающему [`EmitError::QueueOverflow`].
    Throw,
}

/// Причина, по которой вызов не был выполнен.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    Overflow,
    Evicted,
    Expired,
}

/// Вызов, ожидающий в буфере.
pub struct QueuedCall {
    message: Message,
    args: EmitArgs,
    enqueued_at: Instant,
    reply: oneshot::Sender<EmitResult<Value>>,
}

impl QueuedCall {
    pub fn message(&self) -> &Message {
        &self.message
    }

    pub fn enqueued_at(&self) -> Instant {
        self.enqueued_at
    }

    fn finish(
        self,
        result: EmitResult<Value>,
    ) -> Message {
        let _ = self.reply.send(result);
        self.message
    }
}

impl fmt::Debug for QueuedCall {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("QueuedCall")
            .field("topic", &self.message.topic)
            .field("enqueued_at", &self.enqueued_at)
            .finish()
    }
}

pub type PushFn = Arc<dyn Fn(&mut VecDeque<QueuedCall>, QueuedCall) + Send + Sync>;
pub type PopFn = Arc<dyn Fn(&mut VecDeque<QueuedCall>) -> Option<QueuedCall> + Send + Sync>;
pub type QueueDropFn = Arc<dyn Fn(&Message, DropReason) + Send + Sync>;

/// Параметры очереди.
///
/// `on_push`/`on_pop` заменяют порядок FIFO (например, на приоритетный).
/// Они вызываются под внутренней блокировкой очереди и не должны вызывать
/// тот же слушатель.
#[derive(Clone)]
pub struct QueueOptions {
    pub size: usize,
    pub overflow: Overflow,
    pub max_expand_size: usize,
    pub expand_overflow: Overflow,
    pub lifetime: Option<Duration>,
    pub on_push: Option<PushFn>,
    pub on_pop: Option<PopFn>,
    pub on_drop: Option<QueueDropFn>,
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self {
            size: 1,
            overflow: Overflow::Drop,
            max_expand_size: 0,
            expand_overflow: Overflow::Drop,
            lifetime: None,
            on_push: None,
            on_pop: None,
            on_drop: None,
        }
    }
}

impl QueueOptions {
    pub fn new(size: usize) -> Self {
        Self {
            size,
            ..Self::default()
        }
    }

    pub fn overflow(
        mut self,
        overflow: Overflow,
    ) -> Self {
        self.overflow = overflow;
        self
    }

    /// Политика `Expand` с пределом роста и запасной политикой.
    pub fn expand(
        mut self,
        max_expand_size: usize,
        fallback: Overflow,
    ) -> Self {
        self.overflow = Overflow::Expand;
        self.max_expand_size = max_expand_size;
        self.expand_overflow = fallback;
        self
    }

    pub fn lifetime(
        mut self,
        lifetime: Duration,
    ) -> Self {
        self.lifetime = Some(lifetime);
        self
    }

    pub fn on_push<F>(
        mut self,
        on_push: F,
    ) -> Self
    where
        F: Fn(&mut VecDeque<QueuedCall>, QueuedCall) + Send + Sync + 'static,
    {
        self.on_push = Some(Arc::new(on_push));
        self
    }

    pub fn on_pop<F>(
        mut self,
        on_pop: F,
    ) -> Self
    where
        F: Fn(&mut VecDeque<QueuedCall>) -> Option<QueuedCall> + Send + Sync + 'static,
    {
        self.on_pop = Some(Arc::new(on_pop));
        self
    }

    pub fn on_drop<F>(
        mut self,
        on_drop: F,
    ) -> Self
    where
        F: Fn(&Message, DropReason) + Send + Sync + 'static,
    {
        self.on_drop = Some(Arc::new(on_drop));
        self
    }
}

/// Пайп-очередь.
#[derive(Clone)]
pub struct Queue {
    options: QueueOptions,
}

impl Queue {
    pub fn new(options: QueueOptions) -> Self {
        Self { options }
    }
}

impl Pipe for Queue {
    fn wrap(
        &self,
        inner: ListenerRef,
    ) -> ListenerRef {
        Arc::new(Queued(Arc::new(Core {
            inner,
            state: Mutex::new(State {
                running: false,
                buffer: VecDeque::new(),
                capacity: self.options.size,
            }),
            options: self.options.clone(),
        })))
    }
}

struct State {
    running: bool,
    buffer: VecDeque<QueuedCall>,
    capacity: usize,
}

struct Core {
    inner: ListenerRef,
    state: Mutex<State>,
    options: QueueOptions,
}

/// Решение по новому вызову.
enum Admit {
    /// Слушатель свободен: выполнить сразу.
    Run,
    Wait(oneshot::Receiver<EmitResult<Value>>),
    Reject(DropReason),
    Fail(usize),
}

impl Core {
    fn push(
        &self,
        state: &mut State,
        call: QueuedCall,
    ) {
        match &self.options.on_push {
            Some(on_push) => on_push(&mut state.buffer, call),
            None => state.buffer.push_back(call),
        }
    }

    fn pop(
        &self,
        state: &mut State,
    ) -> Option<QueuedCall> {
        match &self.options.on_pop {
            Some(on_pop) => on_pop(&mut state.buffer),
            None => state.buffer.pop_front(),
        }
    }

    fn report(
        &self,
        dropped: Vec<(Message, DropReason)>,
    ) {
        for (message, reason) in dropped {
            trace!(topic = %message.topic, ?reason, "queue: call dropped");
            if let Some(on_drop) = &self.options.on_drop {
                on_drop(&message, reason);
            }
        }
    }

    /// Ставит вызов в буфер или применяет политику переполнения.
    fn admit(
        &self,
        state: &mut State,
        message: &Message,
        args: &EmitArgs,
        evicted: &mut Vec<(Message, DropReason)>,
    ) -> Admit {
        if !state.running {
            state.running = true;
            return Admit::Run;
        }
        if state.buffer.len() >= state.capacity {
            let mut policy = self.options.overflow;
            if policy == Overflow::Expand {
                if state.capacity < self.options.size + self.options.max_expand_size {
                    state.capacity += 1;
                } else {
                    policy = self.options.expand_overflow;
                }
            }
            if state.buffer.len() >= state.capacity {
                match policy {
                    Overflow::Slide => match state.buffer.pop_front() {
                        Some(oldest) => {
                            evicted.push((oldest.finish(Ok(Value::Null)), DropReason::Evicted))
                        }
                        None => return Admit::Reject(DropReason::Overflow),
                    },
                    Overflow::Throw => return Admit::Fail(state.capacity),
                    Overflow::Drop | Overflow::Expand => {
                        return Admit::Reject(DropReason::Overflow)
                    }
                }
            }
        }

        let (reply, rx) = oneshot::channel();
        self.push(
            state,
            QueuedCall {
                message: message.clone(),
                args: args.clone(),
                enqueued_at: Instant::now(),
                reply,
            },
        );
        Admit::Wait(rx)
    }

    /// Следующий живой вызов из буфера; при пустом буфере очередь
    /// переходит в состояние простоя.
    fn next_call(&self) -> Option<QueuedCall> {
        let mut expired = Vec::new();
        let next = {
            let mut state = self.state.lock();
            loop {
                let Some(call) = self.pop(&mut state) else {
                    state.running = false;
                    state.capacity = self.options.size;
                    break None;
                };
                let stale = self
                    .options
                    .lifetime
                    .is_some_and(|lifetime| call.enqueued_at.elapsed() >= lifetime);
                if stale {
                    expired.push((call.finish(Ok(Value::Null)), DropReason::Expired));
                    continue;
                }
                break Some(call);
            }
        };
        self.report(expired);
        next
    }

    /// Выполняет буфер синхронно, пока слушатель отвечает сразу. Первый
    /// асинхронный вызов переносит остаток в фоновую задачу.
    fn drain_now(self: &Arc<Self>) {
        while let Some(call) = self.next_call() {
            match self.inner.invoke(call.message.clone(), &call.args) {
                Invocation::Ready(result) => {
                    call.finish(result);
                }
                suspended => {
                    let fut = suspended.resolve();
                    match Handle::try_current() {
                        Ok(handle) => {
                            let core = self.clone();
                            handle.spawn(async move {
                                call.finish(fut.await);
                                core.drain().await;
                            });
                            return;
                        }
                        Err(_) => {
                            call.finish(Err(EmitError::NoRuntime));
                        }
                    }
                }
            }
        }
    }

    async fn drain(self: Arc<Self>) {
        while let Some(call) = self.next_call() {
            let result = self
                .inner
                .invoke(call.message.clone(), &call.args)
                .resolve()
                .await;
            call.finish(result);
        }
    }

    /// Запускает фоновую обработку буфера после асинхронного вызова.
    async fn resume(self: Arc<Self>) {
        match Handle::try_current() {
            Ok(handle) => {
                handle.spawn(self.drain());
            }
            Err(_) => self.drain().await,
        }
    }
}

struct Queued(Arc<Core>);

impl Listener for Queued {
    fn invoke(
        &self,
        message: Message,
        args: &EmitArgs,
    ) -> Invocation {
        let core = &self.0;
        let mut evicted = Vec::new();
        let admit = core.admit(&mut core.state.lock(), &message, args, &mut evicted);
        core.report(evicted);

        match admit {
            Admit::Run => {}
            Admit::Wait(rx) => {
                return Invocation::pending(async move { rx.await.unwrap_or(Ok(Value::Null)) })
            }
            Admit::Reject(reason) => {
                core.report(vec![(message, reason)]);
                return Invocation::Ready(Ok(Value::Null));
            }
            Admit::Fail(capacity) => {
                warn!(topic = %message.topic, capacity, "queue overflow");
                return Invocation::Ready(Err(EmitError::QueueOverflow { capacity }));
            }
        }

        match core.inner.invoke(message, args) {
            Invocation::Ready(result) => {
                core.drain_now();
                Invocation::Ready(result)
            }
            suspended => {
                let fut = suspended.resolve();
                let core = core.clone();
                Invocation::pending(async move {
                    let result = fut.await;
                    core.resume().await;
                    result
                })
            }
        }
    }
}
