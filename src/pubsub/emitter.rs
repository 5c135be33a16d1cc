//! Движок диспетчеризации: регистрация слушателей, эмиссия, удержанные
//! сообщения и ожидание события.
//!
//! Дерево слушателей и хранилище удержанных сообщений защищены одной
//! блокировкой, которая никогда не удерживается во время вызова слушателей,
//! хуков и наблюдателя. Поэтому слушатель может свободно эмитить,
//! подписываться и отписываться изнутри своего тела.

use std::{
    fmt,
    future::Future,
    pin::Pin,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Weak,
    },
    task::{Context, Poll},
    time::Duration,
};

use futures::future::{join_all, BoxFuture, FutureExt};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use tokio::{sync::oneshot, time::Instant};
use tracing::{debug, trace};
use vestnik_error::{EmitError, EmitResult};

use super::{
    args::{EmitArgs, Emission, Retain},
    hooks::{AddDecision, EmitDecision, Hooks, Observer},
    invoker::Invoker,
    listener::{
        from_fn, same_listener, Invocation, ListenOptions, Listener, ListenerEntry, ListenerRef,
    },
    message::{Message, Meta},
    outcome::Outcome,
    retained::RetainedStore,
    subscription::Subscription,
    tree::ListenerNode,
};
use crate::{
    config::EmitterConfig,
    executor::{ExecutorCall, ExecutorRef},
    topic::{self, MULTI_LEVEL},
};

#[derive(Default)]
struct State {
    root: ListenerNode,
    retained: RetainedStore,
    listeners: usize,
}

/// Общее состояние движка, на которое ссылаются подписки и инвокер.
pub(crate) struct Shared {
    state: Mutex<State>,
    pub(crate) config: EmitterConfig,
    pub(crate) hooks: Option<Arc<dyn Hooks>>,
    observer: Option<Arc<dyn Observer>>,
    next_id: AtomicU64,
}

impl Shared {
    /// Снимает одну запись. `true`, если запись была активна.
    pub(crate) fn remove_entry(
        &self,
        entry: &ListenerEntry,
    ) -> bool {
        if !entry.retire() {
            return false;
        }
        {
            let mut state = self.state.lock();
            if state.root.remove(entry) {
                state.listeners -= 1;
            }
        }
        self.notify_removed(entry);
        true
    }

    /// Снимает уже извлечённые из дерева записи и уведомляет о них.
    fn retire_drained(
        &self,
        drained: Vec<Arc<ListenerEntry>>,
    ) -> usize {
        let mut removed = 0;
        for entry in drained {
            if entry.retire() {
                self.notify_removed(&entry);
                removed += 1;
            }
        }
        removed
    }

    fn notify_removed(
        &self,
        entry: &ListenerEntry,
    ) {
        if let Some(observer) = &self.observer {
            observer.on_remove(entry);
        }
        if let Some(hooks) = &self.hooks {
            hooks.after_remove(entry);
        }
    }
}

/// Внутрипроцессный движок publish/subscribe.
///
/// Клонирование дешёвое: клоны разделяют одно состояние.
#[derive(Clone)]
pub struct Emitter {
    shared: Arc<Shared>,
}

impl Emitter {
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn with_config(config: EmitterConfig) -> Self {
        Self::builder().config(config).build()
    }

    pub fn builder() -> EmitterBuilder {
        EmitterBuilder::default()
    }

    pub fn config(&self) -> &EmitterConfig {
        &self.shared.config
    }

    ////////////////////////////////////////////////////////////////////////////
    // Регистрация
    ////////////////////////////////////////////////////////////////////////////

    /// Регистрирует слушателя на шаблон топика.
    ///
    /// Если `listener == None`, используется слушатель по умолчанию из
    /// конфигурации. После регистрации новому слушателю (и только ему)
    /// доставляются удержанные сообщения, совпадающие с шаблоном.
    pub fn subscribe(
        &self,
        topic: &str,
        listener: Option<ListenerRef>,
        options: ListenOptions,
    ) -> EmitResult<Subscription> {
        topic::validate(topic)?;
        let listener = listener
            .or_else(|| self.shared.config.default_listener.clone())
            .ok_or(EmitError::MissingListener)?;

        if let Some(hooks) = &self.shared.hooks {
            match hooks.before_add(topic, &listener, &options) {
                AddDecision::Proceed => {}
                AddDecision::Veto => {
                    debug!(topic, "listener registration vetoed");
                    return Err(EmitError::CancelledRegistration);
                }
                AddDecision::Redirect(subscription) => return Ok(subscription),
            }
        }

        let prepend = options.prepend;
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        let entry = Arc::new(ListenerEntry::new(id, Arc::from(topic), listener, options));

        let replay = {
            let mut state = self.shared.state.lock();
            state.root.insert(entry.clone(), prepend);
            state.listeners += 1;
            if topic::has_wildcard(topic) {
                state.retained.matching(topic)
            } else {
                state.retained.get(topic).cloned().into_iter().collect()
            }
        };

        if let Some(observer) = &self.shared.observer {
            observer.on_add(&entry);
        }

        if !replay.is_empty() {
            trace!(topic, retained = replay.len(), "replaying retained messages");
            let invoker = Invoker::new(self.shared.clone());
            let args = EmitArgs {
                retain: Retain::Keep,
                ..EmitArgs::default()
            };
            for message in replay {
                if !entry.is_active() {
                    break;
                }
                // Ошибка уже передана в хук и в лог.
                let _ = invoker.invoke(&entry, &message, &args);
            }
        }

        Ok(Subscription::new(entry, Arc::downgrade(&self.shared)))
    }

    pub fn on(
        &self,
        topic: &str,
        listener: ListenerRef,
    ) -> EmitResult<Subscription> {
        self.subscribe(topic, Some(listener), ListenOptions::default())
    }

    pub fn on_with(
        &self,
        topic: &str,
        listener: ListenerRef,
        options: ListenOptions,
    ) -> EmitResult<Subscription> {
        self.subscribe(topic, Some(listener), options)
    }

    /// Слушатель, который будет вызван не более одного раза.
    pub fn once(
        &self,
        topic: &str,
        listener: ListenerRef,
    ) -> EmitResult<Subscription> {
        self.subscribe(topic, Some(listener), ListenOptions::default().limit(1))
    }

    /// Слушатель на все топики (`**`).
    pub fn on_any(
        &self,
        listener: ListenerRef,
    ) -> EmitResult<Subscription> {
        self.subscribe(MULTI_LEVEL, Some(listener), ListenOptions::default())
    }

    /// Снимает слушателей.
    ///
    /// `topic` выбирает узел точного шаблона (без поддерева), `None` — все
    /// узлы. `listener` сравнивается с исходным (до пайпов) слушателем,
    /// `None` — все слушатели выбранных узлов. Возвращает число снятых.
    pub fn off(
        &self,
        topic: Option<&str>,
        listener: Option<&ListenerRef>,
    ) -> usize {
        let pred =
            |entry: &ListenerEntry| listener.map_or(true, |l| same_listener(entry.original(), l));
        let drained = {
            let mut state = self.shared.state.lock();
            let drained = match topic {
                Some(pattern) => state
                    .root
                    .node_mut(pattern)
                    .map(|node| node.drain_where(false, &pred))
                    .unwrap_or_default(),
                None => state.root.drain_where(true, &pred),
            };
            state.listeners -= drained.len();
            drained
        };
        self.shared.retire_drained(drained)
    }

    /// Снимает всех слушателей узла `topic` и его поддерева; `None` — всех.
    pub fn off_all(
        &self,
        topic: Option<&str>,
    ) -> usize {
        let drained = {
            let mut state = self.shared.state.lock();
            let root = match topic {
                Some(pattern) => state.root.node_mut(pattern),
                None => Some(&mut state.root),
            };
            let drained = root
                .map(|node| node.drain_where(true, &|_| true))
                .unwrap_or_default();
            state.listeners -= drained.len();
            drained
        };
        self.shared.retire_drained(drained)
    }

    /// Снимает всех слушателей и удаляет все удержанные сообщения.
    pub fn clear(&self) {
        let (drained, retained) = {
            let mut state = self.shared.state.lock();
            let drained = state.root.drain_where(true, &|_| true);
            state.listeners = 0;
            (drained, state.retained.clear())
        };
        let removed = self.shared.retire_drained(drained);
        debug!(listeners = removed, retained, "emitter cleared");
        if let Some(hooks) = &self.shared.hooks {
            hooks.after_clear(None);
        }
    }

    /// Удаляет удержанные сообщения поддерева `prefix` (сам `prefix` и всё
    /// под `prefix/`); `None` — все. Возвращает число удалённых.
    pub fn clear_retained(
        &self,
        prefix: Option<&str>,
    ) -> usize {
        let removed = {
            let mut state = self.shared.state.lock();
            match prefix {
                Some(prefix) => state.retained.clear_prefix(prefix),
                None => state.retained.clear(),
            }
        };
        debug!(prefix, removed, "retained messages cleared");
        if let Some(hooks) = &self.shared.hooks {
            hooks.after_clear(prefix);
        }
        removed
    }

    ////////////////////////////////////////////////////////////////////////////
    // Эмиссия
    ////////////////////////////////////////////////////////////////////////////

    /// Доставляет сообщение всем совпадающим слушателям.
    ///
    /// Асинхронные слушатели уже запущены, когда `emit` возвращает
    /// управление; их результаты доступны через [`Outcome::settle`].
    /// `Err` возвращается только в строгом режиме (`ignore_errors == false`)
    /// или при вето хука `before_emit`.
    pub fn emit(
        &self,
        emission: impl Into<Emission>,
    ) -> EmitResult<Vec<Outcome>> {
        let (message, args, scope_executor) = emission
            .into()
            .into_parts(self.shared.config.default_meta.as_ref());

        let entries = {
            let mut state = self.shared.state.lock();
            match args.retain {
                Retain::Keep => state.retained.upsert(message.clone()),
                Retain::Clear => {
                    state.retained.remove(&message.topic);
                }
                Retain::No => {}
            }
            let mut entries = Vec::new();
            state.root.collect(&topic::split(&message.topic), &mut entries);
            entries
        };

        if args.retain != Retain::No {
            debug!(topic = %message.topic, retain = ?args.retain, "retained store updated");
        }
        if let Some(observer) = &self.shared.observer {
            observer.before_emit(&message, entries.len());
        }
        if let Some(hooks) = &self.shared.hooks {
            match hooks.before_emit(&message, &args) {
                EmitDecision::Proceed => {}
                EmitDecision::Veto => {
                    debug!(topic = %message.topic, "emission vetoed");
                    return Err(EmitError::Aborted);
                }
                EmitDecision::Replace(outcomes) => return Ok(self.finish(&message, outcomes)),
            }
        }

        let executor = args
            .executor
            .clone()
            .or(scope_executor)
            .unwrap_or_else(|| self.shared.config.executor.clone());
        let invoker = Invoker::new(self.shared.clone());
        let outcomes = executor.execute(ExecutorCall {
            entries: &entries,
            message: &message,
            args: &args,
            invoker: &invoker,
        })?;

        Ok(self.finish(&message, outcomes))
    }

    fn finish(
        &self,
        message: &Message,
        outcomes: Vec<Outcome>,
    ) -> Vec<Outcome> {
        let outcomes = if self.shared.config.expand_nested {
            Outcome::flatten(outcomes)
        } else {
            outcomes
        };
        if let Some(hooks) = &self.shared.hooks {
            hooks.after_emit(message, &outcomes);
        }
        if let Some(observer) = &self.shared.observer {
            observer.after_emit(message, &outcomes);
        }
        outcomes
    }

    /// Эмитит и дожидается всех результатов.
    ///
    /// Ошибки слушателей возвращаются на своих позициях; внешний `Err`
    /// только если сама синхронная `emit` вернула ошибку.
    pub fn emit_async(
        &self,
        emission: impl Into<Emission>,
    ) -> BoxFuture<'static, EmitResult<Vec<EmitResult<Value>>>> {
        match self.emit(emission) {
            Ok(outcomes) => join_all(outcomes.into_iter().map(Outcome::settle))
                .map(Ok)
                .boxed(),
            Err(err) => futures::future::ready(Err(err)).boxed(),
        }
    }

    /// Эмитит сериализуемое значение как полезную нагрузку.
    pub fn emit_typed<T: Serialize>(
        &self,
        topic: &str,
        payload: &T,
    ) -> EmitResult<Vec<Outcome>> {
        let payload =
            serde_json::to_value(payload).map_err(|e| EmitError::Serialization(e.to_string()))?;
        self.emit(Emission::new(topic, payload))
    }

    /// Ожидает первое сообщение на `topic`.
    ///
    /// Одноразовый слушатель регистрируется сразу, до первого опроса future.
    /// Отсчёт `timeout` тоже начинается сразу. Слушатель снимается ровно
    /// один раз: при срабатывании, по таймауту или при удалении future.
    pub fn wait_for(
        &self,
        topic: &str,
        timeout: Option<Duration>,
    ) -> WaitFor {
        let (tx, rx) = oneshot::channel();
        let slot = Mutex::new(Some(tx));
        let listener = from_fn(move |message| {
            if let Some(tx) = slot.lock().take() {
                let _ = tx.send(message);
            }
            Ok(Value::Null)
        });

        let subscription = match self.once(topic, listener) {
            Ok(subscription) => subscription,
            Err(err) => return WaitFor::failed(err),
        };
        let deadline = timeout.map(|t| Instant::now() + t);
        let guard = CancelOnDrop {
            owner: Arc::downgrade(&self.shared),
            entry: Arc::downgrade(subscription.entry()),
        };
        drop(subscription);

        WaitFor(
            async move {
                let _guard = guard;
                let received = match deadline {
                    Some(deadline) => tokio::time::timeout_at(deadline, rx)
                        .await
                        .map_err(|_| EmitError::Timeout)?,
                    None => rx.await,
                };
                // Отправитель удалён без сообщения: движок очищен.
                received.map_err(|_| EmitError::Aborted)
            }
            .boxed(),
        )
    }

    /// Слушатель, пересылающий сообщения в `target`.
    ///
    /// Результаты вложенной эмиссии возвращаются как
    /// [`Invocation::Nested`]. Слушатель держит слабую ссылку: после
    /// уничтожения `target` вызов завершается [`EmitError::Unbound`].
    pub fn forward_to(
        &self,
        target: &Emitter,
    ) -> ListenerRef {
        Arc::new(Forward {
            target: Arc::downgrade(&target.shared),
        })
    }

    ////////////////////////////////////////////////////////////////////////////
    // Состояние
    ////////////////////////////////////////////////////////////////////////////

    /// Число зарегистрированных слушателей.
    pub fn len(&self) -> usize {
        self.shared.state.lock().listeners
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Шаблоны, на которых есть слушатели, в отсортированном виде.
    pub fn topics(&self) -> Vec<String> {
        self.shared.state.lock().root.patterns()
    }

    /// Удержанное сообщение точного топика.
    pub fn retained(
        &self,
        topic: &str,
    ) -> Option<Message> {
        self.shared.state.lock().retained.get(topic).cloned()
    }

    pub fn retained_len(&self) -> usize {
        self.shared.state.lock().retained.len()
    }
}

impl Default for Emitter {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Emitter {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("Emitter")
            .field("listeners", &state.listeners)
            .field("retained", &state.retained.len())
            .field("ignore_errors", &self.shared.config.ignore_errors)
            .field("expand_nested", &self.shared.config.expand_nested)
            .finish()
    }
}

////////////////////////////////////////////////////////////////////////////////
// Builder
////////////////////////////////////////////////////////////////////////////////

#[derive(Default)]
pub struct EmitterBuilder {
    config: EmitterConfig,
    hooks: Option<Arc<dyn Hooks>>,
    observer: Option<Arc<dyn Observer>>,
}

impl EmitterBuilder {
    pub fn config(
        mut self,
        config: EmitterConfig,
    ) -> Self {
        self.config = config;
        self
    }

    /// `false` включает строгий режим: ошибка слушателя прерывает эмиссию.
    pub fn ignore_errors(
        mut self,
        ignore: bool,
    ) -> Self {
        self.config.ignore_errors = ignore;
        self
    }

    pub fn expand_nested(
        mut self,
        expand: bool,
    ) -> Self {
        self.config.expand_nested = expand;
        self
    }

    pub fn default_meta(
        mut self,
        meta: Meta,
    ) -> Self {
        self.config.default_meta = (!meta.is_empty()).then_some(meta);
        self
    }

    pub fn executor(
        mut self,
        executor: ExecutorRef,
    ) -> Self {
        self.config.executor = executor;
        self
    }

    pub fn default_listener(
        mut self,
        listener: ListenerRef,
    ) -> Self {
        self.config.default_listener = Some(listener);
        self
    }

    pub fn hooks(
        mut self,
        hooks: Arc<dyn Hooks>,
    ) -> Self {
        self.hooks = Some(hooks);
        self
    }

    pub fn observer(
        mut self,
        observer: Arc<dyn Observer>,
    ) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn build(self) -> Emitter {
        Emitter {
            shared: Arc::new(Shared {
                state: Mutex::new(State::default()),
                config: self.config,
                hooks: self.hooks,
                observer: self.observer,
                next_id: AtomicU64::new(1),
            }),
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// wait_for
////////////////////////////////////////////////////////////////////////////////

/// Future, возвращаемая [`Emitter::wait_for`].
#[must_use = "the listener is removed when WaitFor is dropped"]
pub struct WaitFor(BoxFuture<'static, EmitResult<Message>>);

impl WaitFor {
    fn failed(err: EmitError) -> Self {
        Self(futures::future::ready(Err(err)).boxed())
    }
}

impl Future for WaitFor {
    type Output = EmitResult<Message>;

    fn poll(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Self::Output> {
        self.0.as_mut().poll(cx)
    }
}

impl fmt::Debug for WaitFor {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str("WaitFor")
    }
}

/// Снимает слушателя `wait_for` при удалении future.
///
/// Ссылки слабые: после очистки движка запись (а с ней и отправитель
/// канала) освобождается, и ожидание завершается ошибкой.
struct CancelOnDrop {
    owner: Weak<Shared>,
    entry: Weak<ListenerEntry>,
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        if let (Some(shared), Some(entry)) = (self.owner.upgrade(), self.entry.upgrade()) {
            shared.remove_entry(&entry);
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Пересылка между движками
////////////////////////////////////////////////////////////////////////////////

struct Forward {
    target: Weak<Shared>,
}

impl Listener for Forward {
    fn invoke(
        &self,
        message: Message,
        args: &EmitArgs,
    ) -> Invocation {
        let Some(shared) = self.target.upgrade() else {
            return Invocation::Ready(Err(EmitError::Unbound));
        };
        let target = Emitter { shared };
        match target.emit(Emission::from(message).args(args.clone())) {
            Ok(outcomes) => Invocation::Nested(outcomes),
            Err(err) => Invocation::Ready(Err(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use serde_json::json;

    use super::*;
    use crate::pubsub::from_async;

    fn counter(calls: &Arc<AtomicUsize>) -> ListenerRef {
        let calls = calls.clone();
        from_fn(move |msg| {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(msg.payload)
        })
    }

    fn ready_values(outcomes: &[Outcome]) -> Vec<Value> {
        outcomes
            .iter()
            .filter_map(|o| match o {
                Outcome::Ready(Ok(v)) => Some(v.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_emit_exact_and_off() {
        let emitter = Emitter::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let listener = counter(&calls);
        emitter.on("a/b", listener.clone()).unwrap();

        let outcomes = emitter.emit(("a/b", json!(7))).unwrap();
        assert_eq!(ready_values(&outcomes), vec![json!(7)]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        assert_eq!(emitter.off(Some("a/b"), Some(&listener)), 1);
        assert!(emitter.emit(("a/b", json!(8))).unwrap().is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(emitter.is_empty());
    }

    /// Тест проверяет порядок вызова: точный шаблон, затем `*`, затем `**`.
    #[test]
    fn test_wildcard_order() {
        let emitter = Emitter::new();
        for (pattern, tag) in [("a/**", "multi"), ("a/*", "single"), ("a/b", "exact")] {
            emitter.on(pattern, from_fn(move |_| Ok(json!(tag)))).unwrap();
        }
        let outcomes = emitter.emit("a/b").unwrap();
        assert_eq!(
            ready_values(&outcomes),
            vec![json!("exact"), json!("single"), json!("multi")]
        );
        assert_eq!(emitter.emit("a/b/c").unwrap().len(), 1);
    }

    #[test]
    fn test_invalid_topic_rejected() {
        let emitter = Emitter::new();
        let err = emitter.on("a/**/b", from_fn(|_| Ok(Value::Null))).unwrap_err();
        assert!(matches!(err, EmitError::InvalidTopic { .. }));
        assert!(emitter.is_empty());
    }

    #[test]
    fn test_missing_listener_uses_default() {
        let emitter = Emitter::new();
        assert!(matches!(
            emitter.subscribe("t", None, ListenOptions::default()),
            Err(EmitError::MissingListener)
        ));

        let emitter = Emitter::builder()
            .default_listener(from_fn(|_| Ok(json!("default"))))
            .build();
        emitter.subscribe("t", None, ListenOptions::default()).unwrap();
        assert_eq!(ready_values(&emitter.emit("t").unwrap()), vec![json!("default")]);
    }

    /// Тест проверяет, что `once`, эмитящий свой же топик, выполняется один
    /// раз.
    #[test]
    fn test_once_reentrant() {
        let emitter = Emitter::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let inner = emitter.clone();
        let counter = calls.clone();
        emitter
            .once(
                "loop",
                from_fn(move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    inner.emit("loop")?;
                    Ok(Value::Null)
                }),
            )
            .unwrap();

        emitter.emit("loop").unwrap();
        emitter.emit("loop").unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(emitter.is_empty());
    }

    #[test]
    fn test_retained_replay_only_new_listener() {
        let emitter = Emitter::new();
        let old_calls = Arc::new(AtomicUsize::new(0));
        emitter.on("cfg", counter(&old_calls)).unwrap();

        emitter.emit(("cfg", json!(1), true)).unwrap();
        assert_eq!(old_calls.load(Ordering::SeqCst), 1);

        let new_calls = Arc::new(AtomicUsize::new(0));
        emitter.on("cfg", counter(&new_calls)).unwrap();
        assert_eq!(new_calls.load(Ordering::SeqCst), 1);
        assert_eq!(old_calls.load(Ordering::SeqCst), 1);

        emitter.emit(Emission::new("cfg", json!(2)).clear_retained()).unwrap();
        assert!(emitter.retained("cfg").is_none());
        let late_calls = Arc::new(AtomicUsize::new(0));
        emitter.on("cfg", counter(&late_calls)).unwrap();
        assert_eq!(late_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_retained_wildcard_replay_order() {
        let emitter = Emitter::new();
        emitter.emit(("s/b", json!("b"), true)).unwrap();
        emitter.emit(("s/a", json!("a"), true)).unwrap();
        emitter.emit(("s/b", json!("b2"), true)).unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        emitter
            .on(
                "s/*",
                from_fn(move |msg| {
                    sink.lock().push(msg.payload);
                    Ok(Value::Null)
                }),
            )
            .unwrap();
        assert_eq!(*seen.lock(), vec![json!("b2"), json!("a")]);
    }

    #[test]
    fn test_clear_retained_prefix() {
        let emitter = Emitter::new();
        for topic in ["a", "a/b", "a/b/c", "ab"] {
            emitter.emit((topic, json!(1), true)).unwrap();
        }
        assert_eq!(emitter.clear_retained(Some("a")), 3);
        assert!(emitter.retained("ab").is_some());
        assert_eq!(emitter.retained_len(), 1);
    }

    #[test]
    fn test_strict_mode_propagates() {
        let emitter = Emitter::builder().ignore_errors(false).build();
        let calls = Arc::new(AtomicUsize::new(0));
        emitter.on("t", from_fn(|_| anyhow::bail!("boom"))).unwrap();
        emitter.on("t", counter(&calls)).unwrap();

        let err = emitter.emit("t").unwrap_err();
        assert!(matches!(err, EmitError::Listener(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_captured_error_is_result() {
        let emitter = Emitter::new();
        emitter.on("t", from_fn(|_| anyhow::bail!("boom"))).unwrap();
        let outcomes = emitter.emit("t").unwrap();
        assert!(matches!(outcomes[0], Outcome::Ready(Err(EmitError::Listener(_)))));
    }

    #[test]
    fn test_default_meta_merge() {
        let mut defaults = Meta::new();
        defaults.insert("app".into(), json!({"name": "x", "env": "dev"}));
        let emitter = Emitter::builder().default_meta(defaults).build();
        emitter.on("t", from_fn(|msg| Ok(json!(msg.meta)))).unwrap();

        let mut extra = Meta::new();
        extra.insert("app".into(), json!({"env": "prod"}));
        let outcomes = emitter.emit(Emission::new("t", Value::Null).meta(extra)).unwrap();
        assert_eq!(
            ready_values(&outcomes),
            vec![json!({"app": {"name": "x", "env": "prod"}})]
        );
    }

    #[test]
    fn test_off_all_subtree() {
        let emitter = Emitter::new();
        let noop = from_fn(|_| Ok(Value::Null));
        for topic in ["a", "a/b", "a/b/c", "x"] {
            emitter.on(topic, noop.clone()).unwrap();
        }
        assert_eq!(emitter.off_all(Some("a/b")), 2);
        assert_eq!(emitter.topics(), vec!["a".to_string(), "x".to_string()]);
        assert_eq!(emitter.off_all(None), 2);
        assert!(emitter.is_empty());
    }

    #[test]
    fn test_subscription_cancel_idempotent() {
        let emitter = Emitter::new();
        let sub = emitter.on("t", from_fn(|_| Ok(Value::Null))).unwrap();
        assert!(sub.cancel());
        assert!(!sub.cancel());
        assert!(!sub.is_active());
        assert_eq!(emitter.len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_resolves() {
        let emitter = Emitter::new();
        let waiting = emitter.wait_for("ready", Some(Duration::from_millis(500)));
        assert_eq!(emitter.len(), 1);

        emitter.emit(("ready", json!({"ok": true}))).unwrap();
        let message = waiting.await.unwrap();
        assert_eq!(message.topic, "ready");
        assert_eq!(message.payload, json!({"ok": true}));
        assert!(emitter.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_timeout() {
        let emitter = Emitter::new();
        let err = emitter
            .wait_for("never", Some(Duration::from_millis(500)))
            .await
            .unwrap_err();
        assert!(matches!(err, EmitError::Timeout));
        assert!(emitter.is_empty());
    }

    #[tokio::test]
    async fn test_emit_async_settles_all() {
        let emitter = Emitter::new();
        emitter.on("t", from_fn(|_| Ok(json!(1)))).unwrap();
        emitter
            .on("t", from_async(|_| async { anyhow::bail!("late failure") }))
            .unwrap();
        emitter
            .on("t", from_async(|_| async { Ok(json!(3)) }))
            .unwrap();

        let results = emitter.emit_async("t").await.unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].as_ref().unwrap(), &json!(1));
        assert!(results[1].is_err());
        assert_eq!(results[2].as_ref().unwrap(), &json!(3));
    }

    #[test]
    fn test_forward_nested() {
        let upstream = Emitter::new();
        let downstream = Emitter::new();
        downstream.on("t", from_fn(|_| Ok(json!("a")))).unwrap();
        downstream.on("t", from_fn(|_| Ok(json!("b")))).unwrap();
        upstream.on("t", upstream.forward_to(&downstream)).unwrap();
        upstream.on("t", from_fn(|_| Ok(json!("c")))).unwrap();

        let outcomes = upstream.emit("t").unwrap();
        assert_eq!(ready_values(&outcomes), vec![json!("a"), json!("b"), json!("c")]);

        drop(downstream);
        let outcomes = upstream.emit("t").unwrap();
        assert!(matches!(outcomes[0], Outcome::Ready(Err(EmitError::Unbound))));
    }
}
