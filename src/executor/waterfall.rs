use std::ops::ControlFlow;

use serde_json::Value;
use vestnik_error::EmitResult;

use super::{
    series::{run_sequence, Fold},
    Executor, ExecutorCall,
};
use crate::pubsub::{Message, Outcome};

/// Последовательное исполнение, в котором результат каждого шага
/// становится полезной нагрузкой следующего. Первая ошибка прерывает цепочку.
#[derive(Debug, Default, Clone, Copy)]
pub struct Waterfall;

struct WaterfallFold {
    payload: Value,
}

impl Fold for WaterfallFold {
    fn message(
        &self,
        base: &Message,
    ) -> Message {
        Message {
            payload: self.payload.clone(),
            ..base.clone()
        }
    }

    fn step(
        &mut self,
        result: EmitResult<Value>,
    ) -> ControlFlow<EmitResult<Value>> {
        match result {
            Ok(value) => {
                self.payload = value;
                ControlFlow::Continue(())
            }
            Err(err) => ControlFlow::Break(Err(err)),
        }
    }

    fn finish(self) -> EmitResult<Value> {
        Ok(self.payload)
    }
}

impl Executor for Waterfall {
    fn execute(
        &self,
        call: ExecutorCall<'_>,
    ) -> EmitResult<Vec<Outcome>> {
        let payload = call.message.payload.clone();
        run_sequence(call, WaterfallFold { payload })
    }
}
