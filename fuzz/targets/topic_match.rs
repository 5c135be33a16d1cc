#![no_main]

use libfuzzer_sys::fuzz_target;
use vestnik::topic;

fuzz_target!(|input: (&str, &str)| {
    let (topic, pattern) = input;

    // Сопоставление не должно паниковать ни на каких строках.
    let matched = topic::topic_matches(topic, pattern);

    if topic::validate(pattern).is_err() {
        assert!(!matched, "invalid pattern {pattern:?} matched {topic:?}");
    }
    if !topic::has_wildcard(pattern) {
        assert_eq!(matched, topic == pattern);
    }
    if !topic::has_wildcard(topic) {
        assert!(topic::topic_matches(topic, topic));
    }
});
