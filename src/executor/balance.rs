use vestnik_error::EmitResult;

use super::{Executor, ExecutorCall};
use crate::pubsub::Outcome;

/// Вызывает одну запись: ту, у которой меньше всего начатых вызовов
/// (первую среди равных). Повторные эмиссии распределяются по кругу.
///
/// Запись, которая не приняла сообщение (фильтр, `auto_cancel_if`,
/// исчерпанный лимит), пропускается в пользу следующей по счётчику.
#[derive(Debug, Default, Clone, Copy)]
pub struct Balance;

impl Executor for Balance {
    fn execute(
        &self,
        call: ExecutorCall<'_>,
    ) -> EmitResult<Vec<Outcome>> {
        let mut candidates: Vec<_> = call
            .entries
            .iter()
            .filter(|entry| entry.is_active())
            .collect();
        candidates.sort_by_key(|entry| entry.execution_count());

        for entry in candidates {
            if let Some(outcome) = call.invoke(entry)? {
                return Ok(vec![outcome]);
            }
        }
        Ok(Vec::new())
    }
}
