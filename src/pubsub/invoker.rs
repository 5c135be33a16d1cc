use std::sync::Arc;

use tracing::trace;
use vestnik_error::{EmitError, EmitResult};

use super::{
    args::EmitArgs,
    emitter::Shared,
    hooks::{observe_result, report_listener_error},
    listener::{Acquire, Invocation, ListenerEntry},
    message::Message,
    outcome::Outcome,
};

/// Единственная точка вызова слушателя.
///
/// Исполнители не вызывают слушателей напрямую: каждый вызов проходит
/// проверки прерывания, `auto_cancel_if`, фильтра и лимита, а ошибка
/// слушателя либо возвращается как результат, либо (в строгом режиме)
/// прерывает эмиссию.
#[derive(Clone)]
pub struct Invoker {
    shared: Arc<Shared>,
}

impl Invoker {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    /// `true`, если ошибки слушателей возвращаются как результаты.
    pub fn ignore_errors(&self) -> bool {
        self.shared.config.ignore_errors
    }

    /// Вызывает запись. `Ok(None)` — запись не вызывалась (снята,
    /// отфильтрована, лимит исчерпан).
    pub fn invoke(
        &self,
        entry: &Arc<ListenerEntry>,
        message: &Message,
        args: &EmitArgs,
    ) -> EmitResult<Option<Outcome>> {
        if !entry.is_active() {
            return Ok(None);
        }
        if args.is_aborted() {
            return Ok(Some(Outcome::Ready(Err(EmitError::Aborted))));
        }
        if entry.should_auto_cancel(message) {
            trace!(id = entry.id(), topic = entry.topic(), "auto-cancelled");
            self.shared.remove_entry(entry);
            return Ok(None);
        }
        if !entry.accepts(message) {
            return Ok(None);
        }
        match entry.try_acquire() {
            Acquire::Spent => return Ok(None),
            Acquire::Granted { last: true } => {
                self.shared.remove_entry(entry);
            }
            Acquire::Granted { last: false } | Acquire::Unlimited => {}
        }

        let hooks = self.shared.hooks.clone();
        let outcome = match entry.listener().invoke(message.clone(), args) {
            Invocation::Pending(fut) => {
                let message = message.clone();
                Outcome::spawn(async move {
                    let result = fut.await;
                    observe_result(hooks.as_deref(), &message, &result);
                    result
                })
            }
            Invocation::Ready(result) => Outcome::Ready(result),
            Invocation::Nested(outcomes) => Outcome::Nested(outcomes),
        };

        match outcome {
            Outcome::Ready(Err(err)) => {
                report_listener_error(self.shared.hooks.as_deref(), message, &err);
                if self.ignore_errors() {
                    Ok(Some(Outcome::Ready(Err(err))))
                } else {
                    Err(err)
                }
            }
            outcome => Ok(Some(outcome)),
        }
    }
}
