//! Разбор и сопоставление иерархических топиков.
//!
//! Топик — строка из сегментов, разделённых `/`. Шаблон подписки может
//! содержать:
//! - `*` — ровно один произвольный сегмент;
//! - `**` — ноль или более оставшихся сегментов (только последним сегментом).
//!
//! Шаблон, в котором `**` стоит не в конце (`a/**/b`), некорректен: он
//! отклоняется при регистрации и никогда ничего не совпадает.

use vestnik_error::{ensure, EmitResult};

/// Разделитель сегментов топика.
pub const SEPARATOR: char = '/';
/// Одноуровневый wildcard.
pub const SINGLE_LEVEL: &str = "*";
/// Многоуровневый wildcard (только последним сегментом).
pub const MULTI_LEVEL: &str = "**";

/// Разбивает топик на сегменты.
///
/// Пустая строка даёт один пустой сегмент, как и `str::split`.
pub fn split(topic: &str) -> Vec<&str> {
    topic.split(SEPARATOR).collect()
}

/// `true`, если сегмент является wildcard-токеном.
#[inline]
pub fn is_wildcard_segment(segment: &str) -> bool {
    segment == SINGLE_LEVEL || segment == MULTI_LEVEL
}

/// `true`, если топик содержит хотя бы один wildcard-сегмент.
pub fn has_wildcard(topic: &str) -> bool {
    topic.split(SEPARATOR).any(is_wildcard_segment)
}

/// Проверяет шаблон: `**` допустим только последним сегментом.
pub fn validate(pattern: &str) -> EmitResult<()> {
    let segments = split(pattern);
    let last = segments.len() - 1;
    for (idx, segment) in segments.iter().enumerate() {
        ensure!(
            *segment != MULTI_LEVEL || idx == last,
            pattern,
            "`{}` is only allowed as the last segment",
            MULTI_LEVEL
        );
    }
    Ok(())
}

/// Сопоставляет сегменты конкретного пути с сегментами шаблона.
pub fn matches(
    path: &[&str],
    pattern: &[&str],
) -> bool {
    match pattern.split_last() {
        Some((&MULTI_LEVEL, prefix)) => {
            if prefix.contains(&MULTI_LEVEL) {
                return false;
            }
            path.len() >= prefix.len() && segments_match(&path[..prefix.len()], prefix)
        }
        _ => {
            if pattern.contains(&MULTI_LEVEL) {
                return false;
            }
            path.len() == pattern.len() && segments_match(path, pattern)
        }
    }
}

/// Строковая обёртка над [`matches`].
pub fn topic_matches(
    topic: &str,
    pattern: &str,
) -> bool {
    matches(&split(topic), &split(pattern))
}

fn segments_match(
    path: &[&str],
    pattern: &[&str],
) -> bool {
    path.iter()
        .zip(pattern)
        .all(|(segment, expected)| *expected == SINGLE_LEVEL || segment == expected)
}
