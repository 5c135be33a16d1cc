#![no_main]

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use serde_json::Value;
use vestnik::{from_fn, topic, Emitter};

#[derive(Debug, Arbitrary)]
enum Op {
    Subscribe(String),
    Emit { topic: String, retain: bool },
    Off(String),
    ClearRetained,
}

fuzz_target!(|ops: Vec<Op>| {
    let emitter = Emitter::new();
    let calls = Arc::new(AtomicUsize::new(0));

    for op in ops.into_iter().take(64) {
        match op {
            Op::Subscribe(pattern) => {
                let counter = calls.clone();
                let listener = from_fn(move |_| {
                    counter.fetch_add(1, Ordering::Relaxed);
                    Ok(Value::Null)
                });
                let registered = emitter.on(&pattern, listener).is_ok();
                assert_eq!(registered, topic::validate(&pattern).is_ok());
            }
            Op::Emit { topic, retain } => {
                let before = calls.load(Ordering::Relaxed);
                let outcomes = emitter.emit((topic, Value::Null, retain));
                if let Ok(outcomes) = outcomes {
                    assert_eq!(calls.load(Ordering::Relaxed) - before, outcomes.len());
                }
            }
            Op::Off(pattern) => {
                emitter.off(Some(&pattern), None);
            }
            Op::ClearRetained => {
                emitter.clear_retained(None);
            }
        }
    }
    emitter.clear();
    assert!(emitter.is_empty());
    assert_eq!(emitter.retained_len(), 0);
});
