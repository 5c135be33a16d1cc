use futures::future::select_all;
use vestnik_error::EmitResult;

use super::{Executor, ExecutorCall};
use crate::pubsub::{EmitArgs, Outcome, Pending};

/// Вызывает все записи, в ответе остаётся только первый результат.
///
/// Слушатели получают сигнал прерывания (переданный вызывающим или
/// созданный здесь), который поднимается, как только есть победитель.
/// Проигравшие асинхронные вызовы дорабатывают в фоне.
#[derive(Debug, Default, Clone, Copy)]
pub struct Race;

impl Executor for Race {
    fn execute(
        &self,
        call: ExecutorCall<'_>,
    ) -> EmitResult<Vec<Outcome>> {
        let signal = call.args.signal_or_default();
        let args = EmitArgs {
            signal: Some(signal.clone()),
            ..call.args.clone()
        };

        let mut winner = None;
        let mut pending = Vec::new();
        for entry in call.entries {
            match call.invoker.invoke(entry, call.message, &args)? {
                None => {}
                Some(Outcome::Pending(p)) => pending.push(p),
                Some(Outcome::Nested(inner)) => {
                    pending.push(Pending::new(Outcome::Nested(inner).settle()))
                }
                Some(ready) => {
                    if winner.is_none() {
                        winner = Some(ready);
                    }
                }
            }
        }

        if let Some(ready) = winner {
            signal.cancel();
            return Ok(vec![ready]);
        }
        if pending.is_empty() {
            return Ok(Vec::new());
        }
        Ok(vec![Outcome::Pending(Pending::new(async move {
            let (result, _, _) = select_all(pending).await;
            signal.cancel();
            result
        }))])
    }
}
