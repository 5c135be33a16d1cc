use vestnik_error::EmitResult;

use super::{Executor, ExecutorCall};
use crate::pubsub::Outcome;

/// Вызывает каждую запись независимо и собирает все результаты.
#[derive(Debug, Default, Clone, Copy)]
pub struct Broadcast;

impl Executor for Broadcast {
    fn execute(
        &self,
        call: ExecutorCall<'_>,
    ) -> EmitResult<Vec<Outcome>> {
        let mut outcomes = Vec::with_capacity(call.entries.len());
        for entry in call.entries {
            if let Some(outcome) = call.invoke(entry)? {
                outcomes.push(outcome);
            }
        }
        Ok(outcomes)
    }
}
