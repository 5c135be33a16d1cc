use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use parking_lot::Mutex;
use serde_json::{json, Value};
use vestnik::{
    from_async, from_fn,
    pipe::{DropReason, QueuedCall},
    Debounce, EmitError, Emitter, ListenOptions, Memoize, Outcome, Overflow, Queue, QueueOptions,
    Retry, Throttle,
};

/// Асинхронный слушатель, записывающий полезную нагрузку при старте.
fn slow_recorder(
    log: &Arc<Mutex<Vec<Value>>>,
    work: Duration,
) -> vestnik::ListenerRef {
    let log = log.clone();
    from_async(move |msg| {
        log.lock().push(msg.payload.clone());
        async move {
            tokio::time::sleep(work).await;
            Ok(msg.payload)
        }
    })
}

/// Тест проверяет очередь `size = 3, overflow = slide`: из 11 быстрых
/// вызовов первый выполняется сразу, в буфере остаются три последних.
#[tokio::test(start_paused = true)]
async fn test_queue_slide_keeps_latest() {
    let emitter = Emitter::new();
    let log = Arc::new(Mutex::new(Vec::new()));
    let evicted = Arc::new(AtomicUsize::new(0));
    let evicted_cb = evicted.clone();

    emitter
        .on_with(
            "job",
            slow_recorder(&log, Duration::from_millis(10)),
            ListenOptions::default().pipe(Arc::new(Queue::new(
                QueueOptions::new(3)
                    .overflow(Overflow::Slide)
                    .on_drop(move |_, reason| {
                        assert_eq!(reason, DropReason::Evicted);
                        evicted_cb.fetch_add(1, Ordering::SeqCst);
                    }),
            ))),
        )
        .unwrap();

    let mut outcomes = Vec::new();
    for n in 1..=11 {
        outcomes.extend(emitter.emit(("job", json!(n))).unwrap());
    }
    let results: Vec<_> = futures::future::join_all(outcomes.into_iter().map(Outcome::settle)).await;

    assert_eq!(*log.lock(), vec![json!(1), json!(9), json!(10), json!(11)]);
    assert_eq!(evicted.load(Ordering::SeqCst), 7);
    assert_eq!(results[0].as_ref().unwrap(), &json!(1));
    assert_eq!(results[1].as_ref().unwrap(), &Value::Null);
    assert_eq!(results[10].as_ref().unwrap(), &json!(11));
}

/// Тест проверяет политику `Throw`: переполнение становится ошибкой
/// результата конкретного вызова.
#[tokio::test(start_paused = true)]
async fn test_queue_throw_overflow() {
    let emitter = Emitter::new();
    let log = Arc::new(Mutex::new(Vec::new()));
    emitter
        .on_with(
            "job",
            slow_recorder(&log, Duration::from_millis(10)),
            ListenOptions::default().pipe(Arc::new(Queue::new(
                QueueOptions::new(1).overflow(Overflow::Throw),
            ))),
        )
        .unwrap();

    let results: Vec<_> = futures::future::join_all(
        (1..=3).map(|n| emitter.emit_async(("job", json!(n)))),
    )
    .await;

    let flat: Vec<_> = results.into_iter().map(|r| r.unwrap().remove(0)).collect();
    assert_eq!(flat[0].as_ref().unwrap(), &json!(1));
    assert_eq!(flat[1].as_ref().unwrap(), &json!(2));
    assert!(matches!(flat[2], Err(EmitError::QueueOverflow { capacity: 1 })));
}

/// Тест проверяет `on_pop` с приоритетом: из буфера первым берётся
/// наибольшее значение.
#[tokio::test(start_paused = true)]
async fn test_queue_priority_pop() {
    let emitter = Emitter::new();
    let log = Arc::new(Mutex::new(Vec::new()));
    let options = QueueOptions::new(10).on_pop(|buffer: &mut VecDeque<QueuedCall>| {
        let idx = buffer
            .iter()
            .enumerate()
            .max_by_key(|(_, call)| call.message().payload.as_i64().unwrap_or_default())
            .map(|(idx, _)| idx)?;
        buffer.remove(idx)
    });
    emitter
        .on_with(
            "job",
            slow_recorder(&log, Duration::from_millis(5)),
            ListenOptions::default().pipe(Arc::new(Queue::new(options))),
        )
        .unwrap();

    let mut outcomes = Vec::new();
    for n in [1, 3, 7, 5] {
        outcomes.extend(emitter.emit(("job", json!(n))).unwrap());
    }
    futures::future::join_all(outcomes.into_iter().map(Outcome::settle)).await;
    assert_eq!(*log.lock(), vec![json!(1), json!(7), json!(5), json!(3)]);
}

/// Тест проверяет debounce(100): из серии вызовов в окне выполняется
/// только первый и первый после окна; остальные уходят в `on_drop`.
#[tokio::test(start_paused = true)]
async fn test_debounce_burst() {
    let emitter = Emitter::new();
    let calls = Arc::new(Mutex::new(Vec::new()));
    let dropped = Arc::new(AtomicUsize::new(0));
    let sink = calls.clone();
    let dropped_cb = dropped.clone();

    emitter
        .on_with(
            "input",
            from_fn(move |msg| {
                sink.lock().push(msg.payload.clone());
                Ok(Value::Null)
            }),
            ListenOptions::default().pipe(Arc::new(
                Debounce::new(Duration::from_millis(100)).on_drop(move |_| {
                    dropped_cb.fetch_add(1, Ordering::SeqCst);
                }),
            )),
        )
        .unwrap();

    for n in 0..5 {
        emitter.emit(("input", json!(n))).unwrap();
        tokio::time::advance(Duration::from_millis(20)).await;
    }
    tokio::time::advance(Duration::from_millis(100)).await;
    emitter.emit(("input", json!("after"))).unwrap();

    assert_eq!(*calls.lock(), vec![json!(0), json!("after")]);
    assert_eq!(dropped.load(Ordering::SeqCst), 4);
}

#[tokio::test(start_paused = true)]
async fn test_throttle_through_emitter() {
    let emitter = Emitter::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    emitter
        .on_with(
            "tick",
            from_fn(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Value::Null)
            }),
            ListenOptions::default().pipe(Arc::new(Throttle::new(Duration::from_millis(50)))),
        )
        .unwrap();

    for _ in 0..10 {
        emitter.emit("tick").unwrap();
        tokio::time::advance(Duration::from_millis(10)).await;
    }
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

/// Тест проверяет компоновку пайпов: retry внутри, memoize снаружи
/// кэширует итог успешного повтора.
#[tokio::test(start_paused = true)]
async fn test_retry_then_memoize() {
    let emitter = Emitter::new();
    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = attempts.clone();

    emitter
        .on_with(
            "fetch",
            from_fn(move |msg| {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    anyhow::bail!("attempt {} failed", n);
                }
                Ok(json!({ "data": msg.payload }))
            }),
            ListenOptions::default()
                .pipe(Arc::new(Retry::new(3).interval(Duration::from_millis(10))))
                .pipe(Arc::new(Memoize::new())),
        )
        .unwrap();

    let first = emitter.emit_async(("fetch", json!("k"))).await.unwrap();
    assert_eq!(first[0].as_ref().unwrap(), &json!({ "data": "k" }));
    assert_eq!(attempts.load(Ordering::SeqCst), 3);

    let cached = emitter.emit_async(("fetch", json!("k"))).await.unwrap();
    assert_eq!(cached[0].as_ref().unwrap(), &json!({ "data": "k" }));
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
}
