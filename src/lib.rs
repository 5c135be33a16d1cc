//! `vestnik`: внутрипроцессный движок publish/subscribe.
//!
//! Слушатели регистрируются на шаблоны топиков (`a/b`, `a/*`, `a/**`),
//! эмиссия доставляет сообщение всем совпадающим слушателям по выбранной
//! стратегии исполнения. Поддерживаются удержанные (retained) сообщения,
//! лимиты вызовов, пайпы (debounce, throttle, retry, memoize, queue) и
//! хуки жизненного цикла.

/// Конфигурация движка и приложения.
pub mod config;
/// Стратегии исполнения: broadcast, race, balance, series и другие.
pub mod executor;
/// Логирование (форматы, фильтры, файловый вывод).
pub mod logging;
/// Обёртки слушателей.
pub mod pipe;
/// Движок, слушатели, сообщения, хуки.
pub mod pubsub;
/// Разбор и сопоставление шаблонов топиков.
pub mod topic;

// -----------------------------------------------------------------------------
//  Frequently used public types
// -----------------------------------------------------------------------------

pub use config::{EmitterConfig, Settings};
pub use executor::{
    Balance, Broadcast, Executor, ExecutorCall, ExecutorKind, ExecutorRef, First, Last, Race,
    Random, Series, StepErrorPolicy, Waterfall,
};
pub use logging::{init_logging, LoggingConfig, LoggingHandle};
pub use pipe::{Debounce, Memoize, Overflow, Pipe, PipeRef, Queue, QueueOptions, Retry, Throttle};
pub use pubsub::{
    from_async, from_async_with_signal, from_fn, from_fn_with_signal, AbortSignal, AddDecision,
    EmitArgs, EmitDecision, Emission, Emitter, EmitterBuilder, Hooks, Invocation, ListenOptions,
    Listener, ListenerRef, LogObserver, Message, Meta, Observer, Outcome, Retain, Subscription,
    WaitFor,
};
pub use vestnik_error::{EmitError, EmitResult, ErrorExt, StatusCode};
