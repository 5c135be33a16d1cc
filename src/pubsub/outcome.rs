use std::{
    fmt,
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use futures::future::{join_all, BoxFuture, FutureExt};
use serde_json::Value;
use tokio::runtime::Handle;
use vestnik_error::{EmitError, EmitResult};

/// Результат одного вызова слушателя в ответе `emit`.
pub enum Outcome {
    /// Синхронный результат (значение или перехваченная ошибка).
    Ready(EmitResult<Value>),
    /// Асинхронный вызов, уже запущенный в tokio runtime.
    Pending(Pending),
    /// Результаты вложенного движка (пересылка между движками).
    Nested(Vec<Outcome>),
}

/// Дескриптор уже запущенной задачи слушателя.
///
/// Задача выполняется независимо от дескриптора: его можно ожидать или
/// просто отбросить.
pub struct Pending(BoxFuture<'static, EmitResult<Value>>);

impl Pending {
    pub fn new<F>(fut: F) -> Self
    where
        F: Future<Output = EmitResult<Value>> + Send + 'static,
    {
        Self(fut.boxed())
    }
}

impl Future for Pending {
    type Output = EmitResult<Value>;

    fn poll(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Self::Output> {
        self.0.as_mut().poll(cx)
    }
}

impl Outcome {
    /// Запускает future в текущем runtime.
    ///
    /// Вне runtime вызов завершается ошибкой [`EmitError::NoRuntime`].
    pub fn spawn<F>(fut: F) -> Self
    where
        F: Future<Output = EmitResult<Value>> + Send + 'static,
    {
        match Handle::try_current() {
            Ok(handle) => {
                let task = handle.spawn(fut);
                Self::Pending(Pending::new(async move {
                    match task.await {
                        Ok(result) => result,
                        Err(err) => Err(EmitError::Join(err.to_string())),
                    }
                }))
            }
            Err(_) => Self::Ready(Err(EmitError::NoRuntime)),
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending(_))
    }

    /// Синхронный результат, если он уже известен.
    pub fn ready(&self) -> Option<&EmitResult<Value>> {
        match self {
            Self::Ready(result) => Some(result),
            _ => None,
        }
    }

    /// Дожидается результата.
    ///
    /// Вложенные результаты сворачиваются в JSON-массив; первая ошибка среди
    /// них становится результатом целиком.
    pub fn settle(self) -> BoxFuture<'static, EmitResult<Value>> {
        match self {
            Self::Ready(result) => futures::future::ready(result).boxed(),
            Self::Pending(pending) => pending.boxed(),
            Self::Nested(outcomes) => async move {
                let values = join_all(outcomes.into_iter().map(Outcome::settle)).await;
                values
                    .into_iter()
                    .collect::<EmitResult<Vec<_>>>()
                    .map(Value::Array)
            }
            .boxed(),
        }
    }

    /// Раскрывает вложенные результаты в плоский список.
    pub fn flatten(outcomes: Vec<Outcome>) -> Vec<Outcome> {
        let mut out = Vec::with_capacity(outcomes.len());
        for outcome in outcomes {
            match outcome {
                Self::Nested(inner) => out.extend(Self::flatten(inner)),
                other => out.push(other),
            }
        }
        out
    }
}

impl fmt::Debug for Outcome {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            Self::Ready(result) => f.debug_tuple("Ready").field(result).finish(),
            Self::Pending(_) => f.write_str("Pending(..)"),
            Self::Nested(inner) => f.debug_tuple("Nested").field(inner).finish(),
        }
    }
}

impl From<EmitResult<Value>> for Outcome {
    fn from(result: EmitResult<Value>) -> Self {
        Self::Ready(result)
    }
}
