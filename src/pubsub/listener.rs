use std::{
    fmt,
    future::Future,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
};

use futures::future::{BoxFuture, FutureExt};
use serde_json::Value;
use vestnik_error::{EmitError, EmitResult};

use super::{
    args::{AbortSignal, EmitArgs},
    message::Message,
    outcome::Outcome,
};
use crate::pipe::PipeRef;

/// Future асинхронного слушателя.
pub type ListenerFuture = BoxFuture<'static, EmitResult<Value>>;

/// Предикат над сообщением (`filter`, `auto_cancel_if`, мемоизация).
pub type Predicate = Arc<dyn Fn(&Message) -> bool + Send + Sync>;

/// Общая ссылка на слушателя.
pub type ListenerRef = Arc<dyn Listener>;

/// Что вернул слушатель на один вызов.
pub enum Invocation {
    Ready(EmitResult<Value>),
    Pending(ListenerFuture),
    /// Результаты эмиссии во вложенный движок.
    Nested(Vec<Outcome>),
}

/// Обработчик сообщений.
///
/// Синхронный слушатель возвращает [`Invocation::Ready`], асинхронный
/// возвращает future, которую движок запускает сам.
pub trait Listener: Send + Sync + 'static {
    fn invoke(
        &self,
        message: Message,
        args: &EmitArgs,
    ) -> Invocation;
}

impl Invocation {
    pub fn pending<F>(fut: F) -> Self
    where
        F: Future<Output = EmitResult<Value>> + Send + 'static,
    {
        Self::Pending(fut.boxed())
    }

    /// Дожидается результата вызова без запуска отдельной задачи.
    pub fn resolve(self) -> BoxFuture<'static, EmitResult<Value>> {
        match self {
            Self::Ready(result) => futures::future::ready(result).boxed(),
            Self::Pending(fut) => fut,
            Self::Nested(outcomes) => Outcome::Nested(outcomes).settle(),
        }
    }

    /// Переводит вызов в результат эмиссии, запуская асинхронную часть.
    pub fn into_outcome(self) -> Outcome {
        match self {
            Self::Ready(result) => Outcome::Ready(result),
            Self::Pending(fut) => Outcome::spawn(fut),
            Self::Nested(outcomes) => Outcome::Nested(outcomes),
        }
    }
}

impl From<anyhow::Result<Value>> for Invocation {
    fn from(result: anyhow::Result<Value>) -> Self {
        Self::Ready(result.map_err(EmitError::from))
    }
}

/// `true`, если обе ссылки указывают на один и тот же слушатель.
pub fn same_listener(
    a: &ListenerRef,
    b: &ListenerRef,
) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

////////////////////////////////////////////////////////////////////////////////
// Адаптеры замыканий
////////////////////////////////////////////////////////////////////////////////

pub struct FromFn<F>(F);
pub struct FromFnWithSignal<F>(F);
pub struct FromAsync<F>(F);
pub struct FromAsyncWithSignal<F>(F);

impl<F> Listener for FromFn<F>
where
    F: Fn(Message) -> anyhow::Result<Value> + Send + Sync + 'static,
{
    fn invoke(
        &self,
        message: Message,
        _: &EmitArgs,
    ) -> Invocation {
        (self.0)(message).into()
    }
}

impl<F> Listener for FromFnWithSignal<F>
where
    F: Fn(Message, AbortSignal) -> anyhow::Result<Value> + Send + Sync + 'static,
{
    fn invoke(
        &self,
        message: Message,
        args: &EmitArgs,
    ) -> Invocation {
        (self.0)(message, args.signal_or_default()).into()
    }
}

impl<F, Fut> Listener for FromAsync<F>
where
    F: Fn(Message) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
{
    fn invoke(
        &self,
        message: Message,
        _: &EmitArgs,
    ) -> Invocation {
        let fut = (self.0)(message);
        Invocation::pending(async move { fut.await.map_err(EmitError::from) })
    }
}

impl<F, Fut> Listener for FromAsyncWithSignal<F>
where
    F: Fn(Message, AbortSignal) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
{
    fn invoke(
        &self,
        message: Message,
        args: &EmitArgs,
    ) -> Invocation {
        let fut = (self.0)(message, args.signal_or_default());
        Invocation::pending(async move { fut.await.map_err(EmitError::from) })
    }
}

/// Синхронный слушатель из замыкания.
#[inline]
pub fn from_fn<F>(f: F) -> ListenerRef
where
    F: Fn(Message) -> anyhow::Result<Value> + Send + Sync + 'static,
{
    Arc::new(FromFn(f))
}

/// Синхронный слушатель, получающий сигнал прерывания.
#[inline]
pub fn from_fn_with_signal<F>(f: F) -> ListenerRef
where
    F: Fn(Message, AbortSignal) -> anyhow::Result<Value> + Send + Sync + 'static,
{
    Arc::new(FromFnWithSignal(f))
}

/// Асинхронный слушатель из замыкания, возвращающего future.
#[inline]
pub fn from_async<F, Fut>(f: F) -> ListenerRef
where
    F: Fn(Message) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
{
    Arc::new(FromAsync(f))
}

#[inline]
pub fn from_async_with_signal<F, Fut>(f: F) -> ListenerRef
where
    F: Fn(Message, AbortSignal) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
{
    Arc::new(FromAsyncWithSignal(f))
}

////////////////////////////////////////////////////////////////////////////////
// Параметры регистрации
////////////////////////////////////////////////////////////////////////////////

/// Параметры регистрации слушателя.
#[derive(Clone, Default)]
pub struct ListenOptions {
    /// Сколько раз слушатель может быть вызван; `0` — без ограничений.
    pub execution_limit: usize,
    /// Вставить в начало списка узла, а не в конец.
    pub prepend: bool,
    /// Пропускает вызов, не расходуя лимит.
    pub filter: Option<Predicate>,
    /// Проверяется до `filter`; `true` снимает слушателя вместо вызова.
    pub auto_cancel_if: Option<Predicate>,
    /// Обёртки в порядке применения: первая ближе всего к слушателю.
    pub pipes: Vec<PipeRef>,
    pub tag: Option<String>,
}

impl ListenOptions {
    pub fn limit(
        mut self,
        execution_limit: usize,
    ) -> Self {
        self.execution_limit = execution_limit;
        self
    }

    pub fn prepend(mut self) -> Self {
        self.prepend = true;
        self
    }

    pub fn filter<F>(
        mut self,
        filter: F,
    ) -> Self
    where
        F: Fn(&Message) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Arc::new(filter));
        self
    }

    pub fn auto_cancel_if<F>(
        mut self,
        predicate: F,
    ) -> Self
    where
        F: Fn(&Message) -> bool + Send + Sync + 'static,
    {
        self.auto_cancel_if = Some(Arc::new(predicate));
        self
    }

    pub fn pipe(
        mut self,
        pipe: PipeRef,
    ) -> Self {
        self.pipes.push(pipe);
        self
    }

    pub fn tag(
        mut self,
        tag: impl Into<String>,
    ) -> Self {
        self.tag = Some(tag.into());
        self
    }
}

////////////////////////////////////////////////////////////////////////////////
// Запись слушателя
////////////////////////////////////////////////////////////////////////////////

/// Итог попытки занять слот лимита вызовов.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Acquire {
    Unlimited,
    /// `last` — слот был последним, запись нужно снять.
    Granted { last: bool },
    Spent,
}

/// Зарегистрированный слушатель в узле дерева.
pub struct ListenerEntry {
    id: u64,
    topic: Arc<str>,
    listener: ListenerRef,
    original: ListenerRef,
    execution_limit: usize,
    execution_count: AtomicUsize,
    filter: Option<Predicate>,
    auto_cancel_if: Option<Predicate>,
    tag: Option<String>,
    active: AtomicBool,
}

impl ListenerEntry {
    pub(crate) fn new(
        id: u64,
        topic: Arc<str>,
        original: ListenerRef,
        options: ListenOptions,
    ) -> Self {
        let ListenOptions {
            execution_limit,
            filter,
            auto_cancel_if,
            pipes,
            tag,
            ..
        } = options;
        let listener = pipes
            .iter()
            .fold(original.clone(), |inner, pipe| pipe.wrap(inner));
        Self {
            id,
            topic,
            listener,
            original,
            execution_limit,
            execution_count: AtomicUsize::new(0),
            filter,
            auto_cancel_if,
            tag,
            active: AtomicBool::new(true),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Шаблон, под которым зарегистрирован слушатель.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Слушатель после применения пайпов.
    pub fn listener(&self) -> &ListenerRef {
        &self.listener
    }

    /// Исходный слушатель, переданный при регистрации.
    pub fn original(&self) -> &ListenerRef {
        &self.original
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    pub fn execution_limit(&self) -> usize {
        self.execution_limit
    }

    /// Число начатых вызовов.
    pub fn execution_count(&self) -> usize {
        self.execution_count.load(Ordering::Acquire)
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub(crate) fn should_auto_cancel(
        &self,
        message: &Message,
    ) -> bool {
        self.auto_cancel_if.as_ref().is_some_and(|p| p(message))
    }

    pub(crate) fn accepts(
        &self,
        message: &Message,
    ) -> bool {
        self.filter.as_ref().map_or(true, |p| p(message))
    }

    /// Занимает слот лимита до вызова слушателя.
    ///
    /// Счётчик увеличивается до вызова, поэтому повторная эмиссия изнутри
    /// слушателя уже видит исчерпанный лимит.
    pub(crate) fn try_acquire(&self) -> Acquire {
        if self.execution_limit == 0 {
            self.execution_count.fetch_add(1, Ordering::AcqRel);
            return Acquire::Unlimited;
        }
        let limit = self.execution_limit;
        match self
            .execution_count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
                (count < limit).then_some(count + 1)
            }) {
            Ok(prev) => Acquire::Granted {
                last: prev + 1 == limit,
            },
            Err(_) => Acquire::Spent,
        }
    }

    /// Помечает запись снятой. `true` только при первом вызове.
    pub(crate) fn retire(&self) -> bool {
        self.active.swap(false, Ordering::AcqRel)
    }
}

impl fmt::Debug for ListenerEntry {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("ListenerEntry")
            .field("id", &self.id)
            .field("topic", &self.topic)
            .field("tag", &self.tag)
            .field("execution_limit", &self.execution_limit)
            .field("execution_count", &self.execution_count())
            .field("active", &self.is_active())
            .finish()
    }
}
