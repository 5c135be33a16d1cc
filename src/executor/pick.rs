use rand::Rng;
use vestnik_error::EmitResult;

use super::{Executor, ExecutorCall};
use crate::pubsub::Outcome;

fn invoke_at(
    call: &ExecutorCall<'_>,
    index: Option<usize>,
) -> EmitResult<Vec<Outcome>> {
    match index.and_then(|i| call.entries.get(i)) {
        Some(entry) => Ok(call.invoke(entry)?.into_iter().collect()),
        None => Ok(Vec::new()),
    }
}

/// Вызывает только первую совпавшую запись.
///
/// Если она отфильтрована, результат пуст: следующая запись не пробуется.
#[derive(Debug, Default, Clone, Copy)]
pub struct First;

/// Вызывает только последнюю совпавшую запись.
#[derive(Debug, Default, Clone, Copy)]
pub struct Last;

/// Вызывает одну случайную запись.
#[derive(Debug, Default, Clone, Copy)]
pub struct Random;

impl Executor for First {
    fn execute(
        &self,
        call: ExecutorCall<'_>,
    ) -> EmitResult<Vec<Outcome>> {
        invoke_at(&call, Some(0))
    }
}

impl Executor for Last {
    fn execute(
        &self,
        call: ExecutorCall<'_>,
    ) -> EmitResult<Vec<Outcome>> {
        invoke_at(&call, call.entries.len().checked_sub(1))
    }
}

impl Executor for Random {
    fn execute(
        &self,
        call: ExecutorCall<'_>,
    ) -> EmitResult<Vec<Outcome>> {
        let index = match call.entries.len() {
            0 => None,
            len => Some(rand::thread_rng().gen_range(0..len)),
        };
        invoke_at(&call, index)
    }
}
