use std::{fmt, ops::ControlFlow, sync::Arc};

use serde_json::Value;
use vestnik_error::{EmitError, EmitResult};

use super::{Executor, ExecutorCall};
use crate::pubsub::{Message, Outcome};

/// Состояние последовательного исполнения.
pub(crate) trait Fold: Send + 'static {
    /// Сообщение для очередного шага.
    fn message(
        &self,
        base: &Message,
    ) -> Message;

    /// Учитывает результат шага; `Break` завершает последовательность.
    fn step(
        &mut self,
        result: EmitResult<Value>,
    ) -> ControlFlow<EmitResult<Value>>;

    fn finish(self) -> EmitResult<Value>;
}

/// Вызывает записи по одной, дожидаясь каждой.
///
/// Синхронные шаги выполняются сразу. На первом асинхронном шаге остаток
/// последовательности уходит в одну фоновую задачу, а вызывающий получает
/// её дескриптор.
pub(crate) fn run_sequence<F: Fold>(
    call: ExecutorCall<'_>,
    mut fold: F,
) -> EmitResult<Vec<Outcome>> {
    if call.entries.is_empty() {
        return Ok(Vec::new());
    }

    for (idx, entry) in call.entries.iter().enumerate() {
        let message = fold.message(call.message);
        let outcome = match call.invoker.invoke(entry, &message, call.args)? {
            None => continue,
            Some(Outcome::Ready(result)) => {
                if let ControlFlow::Break(result) = fold.step(result) {
                    return Ok(vec![Outcome::Ready(result)]);
                }
                continue;
            }
            Some(suspended) => suspended,
        };

        let rest = call.entries[idx + 1..].to_vec();
        let invoker = call.invoker.clone();
        let base = call.message.clone();
        let args = call.args.clone();
        return Ok(vec![Outcome::spawn(async move {
            if let ControlFlow::Break(result) = fold.step(outcome.settle().await) {
                return result;
            }
            for entry in rest {
                let message = fold.message(&base);
                let result = match invoker.invoke(&entry, &message, &args) {
                    Ok(None) => continue,
                    Ok(Some(outcome)) => outcome.settle().await,
                    Err(err) => Err(err),
                };
                if let ControlFlow::Break(result) = fold.step(result) {
                    return result;
                }
            }
            fold.finish()
        })]);
    }

    Ok(vec![Outcome::Ready(fold.finish())])
}

/// Поведение `Series` при ошибке шага.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum StepErrorPolicy {
    /// Пропустить шаг и продолжить.
    #[default]
    Skip,
    /// Остановиться и вернуть накопленное значение.
    Abort,
    /// Остановиться и вернуть ошибку как итог.
    Capture,
}

pub type Reducer = Arc<dyn Fn(Value, Value) -> Value + Send + Sync>;

/// Последовательное исполнение со свёрткой результатов.
///
/// По умолчанию результаты собираются в массив в порядке вызова.
#[derive(Clone)]
pub struct Series {
    reducer: Reducer,
    initial: Value,
    on_error: StepErrorPolicy,
}

impl Series {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reducer<F>(
        mut self,
        reducer: F,
    ) -> Self
    where
        F: Fn(Value, Value) -> Value + Send + Sync + 'static,
    {
        self.reducer = Arc::new(reducer);
        self
    }

    pub fn initial(
        mut self,
        initial: Value,
    ) -> Self {
        self.initial = initial;
        self
    }

    pub fn on_error(
        mut self,
        policy: StepErrorPolicy,
    ) -> Self {
        self.on_error = policy;
        self
    }
}

impl Default for Series {
    fn default() -> Self {
        Self {
            reducer: Arc::new(push_result),
            initial: Value::Array(Vec::new()),
            on_error: StepErrorPolicy::default(),
        }
    }
}

impl fmt::Debug for Series {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Series")
            .field("initial", &self.initial)
            .field("on_error", &self.on_error)
            .finish_non_exhaustive()
    }
}

fn push_result(
    acc: Value,
    value: Value,
) -> Value {
    match acc {
        Value::Array(mut items) => {
            items.push(value);
            Value::Array(items)
        }
        Value::Null => Value::Array(vec![value]),
        other => Value::Array(vec![other, value]),
    }
}

struct SeriesFold {
    reducer: Reducer,
    acc: Value,
    on_error: StepErrorPolicy,
}

impl Fold for SeriesFold {
    fn message(
        &self,
        base: &Message,
    ) -> Message {
        base.clone()
    }

    fn step(
        &mut self,
        result: EmitResult<Value>,
    ) -> ControlFlow<EmitResult<Value>> {
        match result {
            Ok(value) => {
                let acc = std::mem::take(&mut self.acc);
                self.acc = (self.reducer)(acc, value);
                ControlFlow::Continue(())
            }
            Err(err) => self.on_step_error(err),
        }
    }

    fn finish(self) -> EmitResult<Value> {
        Ok(self.acc)
    }
}

impl SeriesFold {
    fn on_step_error(
        &mut self,
        err: EmitError,
    ) -> ControlFlow<EmitResult<Value>> {
        match self.on_error {
            StepErrorPolicy::Skip => ControlFlow::Continue(()),
            StepErrorPolicy::Abort => ControlFlow::Break(Ok(std::mem::take(&mut self.acc))),
            StepErrorPolicy::Capture => ControlFlow::Break(Err(err)),
        }
    }
}

impl Executor for Series {
    fn execute(
        &self,
        call: ExecutorCall<'_>,
    ) -> EmitResult<Vec<Outcome>> {
        run_sequence(
            call,
            SeriesFold {
                reducer: self.reducer.clone(),
                acc: self.initial.clone(),
                on_error: self.on_error,
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_push_result() {
        assert_eq!(push_result(json!([]), json!(1)), json!([1]));
        assert_eq!(push_result(json!([1]), json!(2)), json!([1, 2]));
        assert_eq!(push_result(Value::Null, json!(1)), json!([1]));
        assert_eq!(push_result(json!(0), json!(1)), json!([0, 1]));
    }

    /// Тест проверяет три политики обработки ошибки шага.
    #[test]
    fn test_step_error_policies() {
        let mut fold = SeriesFold {
            reducer: Arc::new(push_result),
            acc: json!([1]),
            on_error: StepErrorPolicy::Skip,
        };
        assert!(fold.step(Err(EmitError::Aborted)).is_continue());

        fold.on_error = StepErrorPolicy::Abort;
        match fold.step(Err(EmitError::Aborted)) {
            ControlFlow::Break(Ok(value)) => assert_eq!(value, json!([1])),
            other => panic!("Expected abort with accumulator, got {other:?}"),
        }

        fold.on_error = StepErrorPolicy::Capture;
        assert!(matches!(
            fold.step(Err(EmitError::Timeout)),
            ControlFlow::Break(Err(EmitError::Timeout))
        ));
    }
}
