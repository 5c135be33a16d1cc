use std::fmt;

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::message::{merge_meta, Message, Meta};
use crate::executor::ExecutorRef;

/// Кооперативный сигнал прерывания.
///
/// Слушатели проверяют его сами (`is_cancelled()` / `cancelled().await`);
/// движок лишь не запускает новые вызовы после отмены.
pub type AbortSignal = CancellationToken;

/// Режим удержания (retain) сообщения.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Retain {
    /// Обычная эмиссия.
    #[default]
    No,
    /// Сохранить сообщение как последнее значение топика.
    Keep,
    /// Удалить удержанное сообщение топика.
    Clear,
}

/// Параметры конкретной эмиссии.
#[derive(Clone, Default)]
pub struct EmitArgs {
    pub retain: Retain,
    pub meta: Option<Meta>,
    pub signal: Option<AbortSignal>,
    pub executor: Option<ExecutorRef>,
}

impl EmitArgs {
    /// `true`, если сигнал прерывания уже сработал.
    pub fn is_aborted(&self) -> bool {
        self.signal.as_ref().is_some_and(|s| s.is_cancelled())
    }

    /// Сигнал вызова или новый, никогда не отменяемый токен.
    pub fn signal_or_default(&self) -> AbortSignal {
        self.signal.clone().unwrap_or_default()
    }
}

impl From<bool> for EmitArgs {
    fn from(retain: bool) -> Self {
        Self {
            retain: if retain { Retain::Keep } else { Retain::No },
            ..Self::default()
        }
    }
}

impl fmt::Debug for EmitArgs {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("EmitArgs")
            .field("retain", &self.retain)
            .field("meta", &self.meta)
            .field("aborted", &self.is_aborted())
            .field("executor", &self.executor.is_some())
            .finish()
    }
}

/// Нормализованный вызов `emit`.
///
/// Все формы вызова (`topic`, `(topic, payload)`, `(topic, payload, retain)`,
/// `(topic, payload, args)`, готовое `Message`) сводятся к этому типу.
pub struct Emission {
    message: Message,
    args: EmitArgs,
    scope_executor: Option<ExecutorRef>,
}

impl Emission {
    pub fn new(
        topic: impl Into<String>,
        payload: impl Into<Value>,
    ) -> Self {
        Self::from(Message::new(topic, payload))
    }

    pub fn retain(
        mut self,
        retain: bool,
    ) -> Self {
        self.args.retain = if retain { Retain::Keep } else { Retain::No };
        self
    }

    /// Директива очистки удержанного сообщения топика.
    pub fn clear_retained(mut self) -> Self {
        self.args.retain = Retain::Clear;
        self
    }

    pub fn meta(
        mut self,
        meta: Meta,
    ) -> Self {
        self.args.meta = merge_meta(self.args.meta.as_ref(), Some(meta));
        self
    }

    pub fn signal(
        mut self,
        signal: AbortSignal,
    ) -> Self {
        self.args.signal = Some(signal);
        self
    }

    /// Исполнитель для этого вызова (наивысший приоритет).
    pub fn executor(
        mut self,
        executor: ExecutorRef,
    ) -> Self {
        self.args.executor = Some(executor);
        self
    }

    /// Исполнитель уровня scope: используется, если у вызова нет своего.
    pub fn scope_executor(
        mut self,
        executor: ExecutorRef,
    ) -> Self {
        self.scope_executor = Some(executor);
        self
    }

    pub fn args(
        mut self,
        args: EmitArgs,
    ) -> Self {
        self.args = args;
        self
    }

    pub fn topic(&self) -> &str {
        &self.message.topic
    }

    /// Разбирает вызов на сообщение (с итоговыми метаданными), аргументы и
    /// выбранного исполнителя уровня scope.
    pub(crate) fn into_parts(
        self,
        default_meta: Option<&Meta>,
    ) -> (Message, EmitArgs, Option<ExecutorRef>) {
        let Emission {
            mut message,
            mut args,
            scope_executor,
        } = self;
        let call_meta = merge_meta(message.meta.take().as_ref(), args.meta.take());
        message.meta = merge_meta(default_meta, call_meta.clone());
        args.meta = call_meta;
        (message, args, scope_executor)
    }
}

impl From<Message> for Emission {
    fn from(message: Message) -> Self {
        Self {
            message,
            args: EmitArgs::default(),
            scope_executor: None,
        }
    }
}

impl From<&str> for Emission {
    fn from(topic: &str) -> Self {
        Self::new(topic, Value::Null)
    }
}

impl From<String> for Emission {
    fn from(topic: String) -> Self {
        Self::new(topic, Value::Null)
    }
}

impl<T: Into<String>> From<(T, Value)> for Emission {
    fn from((topic, payload): (T, Value)) -> Self {
        Self::new(topic, payload)
    }
}

impl<T: Into<String>> From<(T, Value, bool)> for Emission {
    fn from((topic, payload, retain): (T, Value, bool)) -> Self {
        Self::new(topic, payload).args(EmitArgs::from(retain))
    }
}

impl<T: Into<String>> From<(T, Value, EmitArgs)> for Emission {
    fn from((topic, payload, args): (T, Value, EmitArgs)) -> Self {
        Self::new(topic, payload).args(args)
    }
}
