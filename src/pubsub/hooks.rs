//! Точки расширения жизненного цикла движка.
//!
//! [`Hooks`] может менять поведение (отклонить регистрацию, подменить
//! результат эмиссии), [`Observer`] только наблюдает. Оба вызываются без
//! удержания внутренней блокировки движка, поэтому повторный вход в движок
//! из хука допустим.

use serde_json::Value;
use tracing::{debug, error, info, trace, warn};
use vestnik_error::{EmitError, EmitResult, ErrorExt, LogLevel};

use super::{
    args::EmitArgs,
    listener::{ListenOptions, ListenerEntry, ListenerRef},
    message::Message,
    outcome::Outcome,
    subscription::Subscription,
};

/// Решение хука `before_add`.
pub enum AddDecision {
    Proceed,
    /// Регистрация отклонена: `subscribe` вернёт
    /// [`EmitError::CancelledRegistration`].
    Veto,
    /// Регистрация выполнена в другом месте (например, в другом движке):
    /// `subscribe` вернёт этот дескриптор.
    Redirect(Subscription),
}

/// Решение хука `before_emit`.
pub enum EmitDecision {
    Proceed,
    /// Эмиссия прервана: `emit` вернёт [`EmitError::Aborted`].
    Veto,
    /// Подменить результат эмиссии без вызова слушателей.
    Replace(Vec<Outcome>),
}

/// Хуки жизненного цикла. Все методы имеют реализацию по умолчанию.
pub trait Hooks: Send + Sync + 'static {
    /// Получает слушателя вызывающего (или слушателя по умолчанию), чтобы
    /// перенаправить регистрацию без потери исходного слушателя.
    fn before_add(
        &self,
        _topic: &str,
        _listener: &ListenerRef,
        _options: &ListenOptions,
    ) -> AddDecision {
        AddDecision::Proceed
    }

    fn after_remove(
        &self,
        _entry: &ListenerEntry,
    ) {
    }

    /// `prefix == None` означает полную очистку.
    fn after_clear(
        &self,
        _prefix: Option<&str>,
    ) {
    }

    fn before_emit(
        &self,
        _message: &Message,
        _args: &EmitArgs,
    ) -> EmitDecision {
        EmitDecision::Proceed
    }

    fn after_emit(
        &self,
        _message: &Message,
        _outcomes: &[Outcome],
    ) {
    }

    /// Вызывается для каждой ошибки слушателя, в том числе асинхронной.
    fn on_listener_error(
        &self,
        _message: &Message,
        _error: &EmitError,
    ) {
    }
}

/// Наблюдатель за движком (диагностика, метрики).
pub trait Observer: Send + Sync + 'static {
    fn on_add(
        &self,
        _entry: &ListenerEntry,
    ) {
    }

    fn on_remove(
        &self,
        _entry: &ListenerEntry,
    ) {
    }

    fn before_emit(
        &self,
        _message: &Message,
        _matched: usize,
    ) {
    }

    fn after_emit(
        &self,
        _message: &Message,
        _outcomes: &[Outcome],
    ) {
    }
}

/// Наблюдатель, пишущий события движка в `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl Observer for LogObserver {
    fn on_add(
        &self,
        entry: &ListenerEntry,
    ) {
        debug!(
            id = entry.id(),
            topic = entry.topic(),
            tag = entry.tag(),
            limit = entry.execution_limit(),
            "listener added"
        );
    }

    fn on_remove(
        &self,
        entry: &ListenerEntry,
    ) {
        debug!(
            id = entry.id(),
            topic = entry.topic(),
            tag = entry.tag(),
            calls = entry.execution_count(),
            "listener removed"
        );
    }

    fn before_emit(
        &self,
        message: &Message,
        matched: usize,
    ) {
        trace!(topic = %message.topic, matched, "emit");
    }

    fn after_emit(
        &self,
        message: &Message,
        outcomes: &[Outcome],
    ) {
        let failed = outcomes
            .iter()
            .filter(|o| matches!(o, Outcome::Ready(Err(_))))
            .count();
        let pending = outcomes.iter().filter(|o| o.is_pending()).count();
        if failed > 0 {
            warn!(topic = %message.topic, failed, pending, "emit finished with listener errors");
        } else {
            trace!(topic = %message.topic, results = outcomes.len(), pending, "emit finished");
        }
    }
}

/// Пишет ошибку слушателя в лог с уровнем по её статус-коду и передаёт
/// её хуку.
pub(crate) fn report_listener_error(
    hooks: Option<&dyn Hooks>,
    message: &Message,
    err: &EmitError,
) {
    let status = err.status_code();
    let topic = message.topic.as_str();
    let code = status.code();
    match status.log_level() {
        LogLevel::Error => error!(topic, code, error = %err, "listener failed"),
        LogLevel::Warn => warn!(topic, code, error = %err, "listener failed"),
        LogLevel::Info => info!(topic, code, error = %err, "listener failed"),
        LogLevel::Debug => debug!(topic, code, error = %err, "listener failed"),
        LogLevel::Trace => trace!(topic, code, error = %err, "listener failed"),
    }
    if let Some(hooks) = hooks {
        hooks.on_listener_error(message, err);
    }
}

/// Обёртка результата асинхронного вызова: ошибка уходит в хук.
pub(crate) fn observe_result(
    hooks: Option<&dyn Hooks>,
    message: &Message,
    result: &EmitResult<Value>,
) {
    if let Err(error) = result {
        report_listener_error(hooks, message, error);
    }
}
