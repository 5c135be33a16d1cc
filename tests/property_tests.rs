//! Property-based tests для маршрутизации топиков.
//!
//! Генерируют случайные топики и шаблоны и проверяют, что дерево
//! подписок вызывает ровно те шаблоны, которые совпадают по
//! `topic::topic_matches`.

use std::{
    collections::BTreeSet,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use parking_lot::Mutex;
use proptest::prelude::*;
use serde_json::{json, Value};
use vestnik::{from_fn, topic, Emitter, ListenOptions};

const PROPTEST_CASES: u32 = 256;

fn config() -> ProptestConfig {
    ProptestConfig {
        cases: PROPTEST_CASES,
        ..ProptestConfig::default()
    }
}

////////////////////////////////////////////////////////////////////////////////
// Генераторы
////////////////////////////////////////////////////////////////////////////////

/// Сегмент конкретного топика из маленького алфавита, чтобы совпадения
/// случались часто.
fn segment() -> impl Strategy<Value = String> {
    prop::sample::select(vec!["a", "b", "c"]).prop_map(str::to_string)
}

fn concrete_topic() -> impl Strategy<Value = String> {
    prop::collection::vec(segment(), 1..=4).prop_map(|s| s.join("/"))
}

/// Шаблон: сегменты или `*`, с необязательным `**` в конце.
fn pattern() -> impl Strategy<Value = String> {
    let seg = prop_oneof![3 => segment(), 1 => Just("*".to_string())];
    (prop::collection::vec(seg, 0..=3), any::<bool>()).prop_filter_map(
        "empty pattern",
        |(mut segments, multi)| {
            if multi {
                segments.push("**".to_string());
            }
            (!segments.is_empty()).then(|| segments.join("/"))
        },
    )
}

fn recording_emitter(patterns: &[String]) -> (Emitter, Arc<Mutex<Vec<usize>>>) {
    let emitter = Emitter::new();
    let hits = Arc::new(Mutex::new(Vec::new()));
    for (idx, pattern) in patterns.iter().enumerate() {
        let hits = hits.clone();
        emitter
            .on(
                pattern,
                from_fn(move |_| {
                    hits.lock().push(idx);
                    Ok(Value::Null)
                }),
            )
            .unwrap();
    }
    (emitter, hits)
}

////////////////////////////////////////////////////////////////////////////////
// Свойства
////////////////////////////////////////////////////////////////////////////////

proptest! {
    #![proptest_config(config())]

    /// Дерево вызывает ровно совпадающие шаблоны, каждый один раз.
    #[test]
    fn prop_dispatch_agrees_with_matcher(
        patterns in prop::collection::vec(pattern(), 1..8),
        topic in concrete_topic(),
    ) {
        let (emitter, hits) = recording_emitter(&patterns);
        emitter.emit(topic.as_str()).unwrap();

        let invoked: BTreeSet<usize> = hits.lock().iter().copied().collect();
        let expected: BTreeSet<usize> = patterns
            .iter()
            .enumerate()
            .filter(|(_, p)| topic::topic_matches(&topic, p))
            .map(|(idx, _)| idx)
            .collect();

        prop_assert_eq!(hits.lock().len(), invoked.len());
        prop_assert_eq!(invoked, expected);
    }

    /// Подписка на шаблон получает удержанные сообщения ровно тех
    /// топиков, которые с ним совпадают.
    #[test]
    fn prop_retained_replay_agrees_with_matcher(
        topics in prop::collection::btree_set(concrete_topic(), 1..8),
        pattern in pattern(),
    ) {
        let emitter = Emitter::new();
        for topic in &topics {
            emitter.emit((topic.as_str(), json!(topic), true)).unwrap();
        }

        let replayed = Arc::new(Mutex::new(BTreeSet::new()));
        let sink = replayed.clone();
        emitter
            .on(&pattern, from_fn(move |msg| {
                sink.lock().insert(msg.topic.clone());
                Ok(Value::Null)
            }))
            .unwrap();

        let expected: BTreeSet<String> = topics
            .iter()
            .filter(|t| topic::topic_matches(t, &pattern))
            .cloned()
            .collect();
        prop_assert_eq!(&*replayed.lock(), &expected);
    }

    /// Слушатель с лимитом `k` вызывается `min(k, n)` раз и затем снимается.
    #[test]
    fn prop_execution_limit(limit in 1usize..6, emits in 0usize..10) {
        let emitter = Emitter::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        emitter
            .on_with(
                "limited",
                from_fn(move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(Value::Null)
                }),
                ListenOptions::default().limit(limit),
            )
            .unwrap();

        for _ in 0..emits {
            emitter.emit("limited").unwrap();
        }
        prop_assert_eq!(calls.load(Ordering::SeqCst), limit.min(emits));
        prop_assert_eq!(emitter.len(), usize::from(emits < limit));
    }
}
