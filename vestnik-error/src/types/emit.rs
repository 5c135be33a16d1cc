use std::{any::Any, fmt, sync::Arc};

use thiserror::Error;

use crate::{ErrorExt, StatusCode};

/// Ошибка, выброшенная телом слушателя.
///
/// Оборачивает [`anyhow::Error`] в `Arc`, чтобы результаты эмиссии оставались
/// `Clone` (мемоизация, гонка исполнителей).
#[derive(Clone)]
pub struct ListenerFailure(Arc<anyhow::Error>);

/// Ошибки диспетчеризации сообщений.
#[derive(Debug, Clone, Error)]
pub enum EmitError {
    /// Слушатель завершился ошибкой.
    #[error("listener failed: {0}")]
    Listener(ListenerFailure),

    /// Эмиссия или вызов отменены сигналом прерывания либо хуком.
    #[error("emission aborted")]
    Aborted,

    /// Истёк срок ожидания `wait_for`.
    #[error("operation exceeded the specified timeout")]
    Timeout,

    /// Пайп-очередь отклонила вызов при политике `Throw`.
    #[error("queue overflow (capacity {capacity})")]
    QueueOverflow { capacity: usize },

    /// Хук `before_add` отклонил регистрацию.
    #[error("listener registration was cancelled by a hook")]
    CancelledRegistration,

    /// Операция над движком, который уже уничтожен или не привязан.
    #[error("emitter is not bound")]
    Unbound,

    /// Некорректный шаблон топика.
    #[error("invalid topic '{topic}': {reason}")]
    InvalidTopic { topic: String, reason: String },

    /// Слушатель не передан, а обработчик по умолчанию не настроен.
    #[error("no listener given and no default listener configured")]
    MissingListener,

    /// Не удалось преобразовать полезную нагрузку в JSON.
    #[error("payload serialization failed: {0}")]
    Serialization(String),

    /// Асинхронный слушатель вызван вне tokio runtime.
    #[error("asynchronous listener requires a tokio runtime")]
    NoRuntime,

    /// Фоновая задача слушателя завершилась паникой или была отменена.
    #[error("listener task failed: {0}")]
    Join(String),
}

impl ListenerFailure {
    pub fn new(err: anyhow::Error) -> Self {
        Self(Arc::new(err))
    }

    /// Исходная ошибка слушателя.
    pub fn inner(&self) -> &anyhow::Error {
        &self.0
    }
}

impl fmt::Debug for ListenerFailure {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

impl fmt::Display for ListenerFailure {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl EmitError {
    /// Создаёт ошибку слушателя из произвольного сообщения.
    pub fn listener(msg: impl fmt::Display + fmt::Debug + Send + Sync + 'static) -> Self {
        Self::Listener(ListenerFailure::new(anyhow::Error::msg(msg)))
    }

    pub fn invalid_topic(
        topic: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidTopic {
            topic: topic.into(),
            reason: reason.into(),
        }
    }

    /// `true`, если ошибка вызвана прерыванием.
    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted)
    }
}

/// Ошибка слушателя, уже являющаяся `EmitError`, не оборачивается повторно.
impl From<anyhow::Error> for EmitError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<EmitError>() {
            Ok(inner) => inner,
            Err(err) => Self::Listener(ListenerFailure::new(err)),
        }
    }
}

impl ErrorExt for EmitError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Listener(_) => StatusCode::ListenerFailed,
            Self::Aborted => StatusCode::Aborted,
            Self::Timeout => StatusCode::Timeout,
            Self::QueueOverflow { .. } => StatusCode::QueueOverflow,
            Self::CancelledRegistration => StatusCode::RegistrationCancelled,
            Self::Unbound => StatusCode::Unbound,
            Self::InvalidTopic { .. } => StatusCode::InvalidTopic,
            Self::MissingListener => StatusCode::MissingListener,
            Self::Serialization(_) => StatusCode::SerializationFailed,
            Self::NoRuntime => StatusCode::NoRuntime,
            Self::Join(_) => StatusCode::TaskFailed,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn client_message(&self) -> String {
        match self {
            Self::Listener(_) => "Listener failed".to_string(),
            Self::Join(_) => "Listener task failed".to_string(),
            other => other.to_string(),
        }
    }

    fn metrics_tags(&self) -> Vec<(&'static str, String)> {
        let mut tags = vec![
            ("error_type", "emit".to_string()),
            ("status_code", self.status_code().to_string()),
        ];

        match self {
            Self::QueueOverflow { capacity } => tags.push(("capacity", capacity.to_string())),
            Self::InvalidTopic { topic, .. } => tags.push(("topic", topic.clone())),
            _ => {}
        }

        tags
    }
}
