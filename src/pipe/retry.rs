use std::{sync::Arc, time::Duration};

use serde_json::Value;
use tracing::debug;
use vestnik_error::{EmitError, EmitResult};

use super::Pipe;
use crate::pubsub::{EmitArgs, Invocation, Listener, ListenerRef, Message};

/// Задержка перед повтором; аргумент — номер неудавшейся попытки (с 1).
pub type BackoffFn = Arc<dyn Fn(u32) -> Duration + Send + Sync>;

/// Колбэк для вызова, исчерпавшего все попытки.
pub type RetryDropCallback = Arc<dyn Fn(&Message, &EmitError) + Send + Sync>;

/// Повторяет неудавшийся вызов до `max_attempts` раз сверх первой попытки.
///
/// Первая попытка выполняется сразу; повторы идут асинхронно с задержкой
/// `backoff`. Повторы прекращаются, если поднят сигнал прерывания. После
/// последней неудачи вызывается `on_drop`, а результатом остаётся последняя
/// ошибка.
#[derive(Clone)]
pub struct Retry {
    max_attempts: u32,
    backoff: BackoffFn,
    on_drop: Option<RetryDropCallback>,
}

impl Retry {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            backoff: Arc::new(|_: u32| Duration::ZERO),
            on_drop: None,
        }
    }

    /// Постоянная задержка между попытками.
    pub fn interval(
        mut self,
        interval: Duration,
    ) -> Self {
        self.backoff = Arc::new(move |_: u32| interval);
        self
    }

    pub fn backoff<F>(
        mut self,
        backoff: F,
    ) -> Self
    where
        F: Fn(u32) -> Duration + Send + Sync + 'static,
    {
        self.backoff = Arc::new(backoff);
        self
    }

    /// Экспоненциальная задержка `first × factor^(n-1)`, ограниченная `max`.
    pub fn exponential(
        self,
        first: Duration,
        factor: f64,
        max: Duration,
    ) -> Self {
        self.backoff(move |attempt| {
            let exp = factor.powi(attempt.saturating_sub(1) as i32);
            Duration::from_secs_f64((first.as_secs_f64() * exp).min(max.as_secs_f64()))
        })
    }

    pub fn on_drop<F>(
        mut self,
        on_drop: F,
    ) -> Self
    where
        F: Fn(&Message, &EmitError) + Send + Sync + 'static,
    {
        self.on_drop = Some(Arc::new(on_drop));
        self
    }
}

impl Pipe for Retry {
    fn wrap(
        &self,
        inner: ListenerRef,
    ) -> ListenerRef {
        Arc::new(Retried {
            inner,
            policy: Arc::new(self.clone()),
        })
    }
}

struct Retried {
    inner: ListenerRef,
    policy: Arc<Retry>,
}

impl Retried {
    fn exhausted(
        policy: &Retry,
        message: &Message,
        err: EmitError,
    ) -> EmitResult<Value> {
        debug!(topic = %message.topic, retries = policy.max_attempts, error = %err, "retry: giving up");
        if let Some(on_drop) = &policy.on_drop {
            on_drop(message, &err);
        }
        Err(err)
    }

    async fn retry_loop(
        inner: ListenerRef,
        policy: Arc<Retry>,
        message: Message,
        args: EmitArgs,
        mut last: EmitError,
    ) -> EmitResult<Value> {
        let mut failed = 1;
        while failed <= policy.max_attempts {
            tokio::time::sleep((policy.backoff)(failed)).await;
            if args.is_aborted() {
                break;
            }
            match inner.invoke(message.clone(), &args).resolve().await {
                Ok(value) => return Ok(value),
                Err(err) => last = err,
            }
            failed += 1;
        }
        Self::exhausted(&policy, &message, last)
    }
}

impl Listener for Retried {
    fn invoke(
        &self,
        message: Message,
        args: &EmitArgs,
    ) -> Invocation {
        let first = self.inner.invoke(message.clone(), args);
        let inner = self.inner.clone();
        let policy = self.policy.clone();
        let args = args.clone();

        match first {
            Invocation::Ready(Err(err)) => {
                if policy.max_attempts == 0 {
                    return Invocation::Ready(Self::exhausted(&policy, &message, err));
                }
                Invocation::pending(Self::retry_loop(inner, policy, message, args, err))
            }
            Invocation::Pending(fut) => Invocation::pending(async move {
                match fut.await {
                    Ok(value) => Ok(value),
                    Err(err) if policy.max_attempts == 0 => {
                        Self::exhausted(&policy, &message, err)
                    }
                    Err(err) => Self::retry_loop(inner, policy, message, args, err).await,
                }
            }),
            done => done,
        }
    }
}
