use rustc_hash::FxHashMap;

use super::message::Message;
use crate::topic::{self, SEPARATOR};

/// Последние удержанные сообщения по точному топику.
///
/// Порядок выдачи — порядок первой вставки ключа; перезапись сохраняет
/// исходную позицию.
#[derive(Default)]
pub(crate) struct RetainedStore {
    messages: FxHashMap<String, (u64, Message)>,
    next_seq: u64,
}

impl RetainedStore {
    pub fn upsert(
        &mut self,
        message: Message,
    ) {
        match self.messages.get_mut(&message.topic) {
            Some((_, slot)) => *slot = message,
            None => {
                let seq = self.next_seq;
                self.next_seq += 1;
                self.messages.insert(message.topic.clone(), (seq, message));
            }
        }
    }

    pub fn remove(
        &mut self,
        topic: &str,
    ) -> Option<Message> {
        self.messages.remove(topic).map(|(_, message)| message)
    }

    pub fn get(
        &self,
        topic: &str,
    ) -> Option<&Message> {
        self.messages.get(topic).map(|(_, message)| message)
    }

    /// Удержанные сообщения, чьи топики совпадают с шаблоном.
    pub fn matching(
        &self,
        pattern: &str,
    ) -> Vec<Message> {
        let pattern = topic::split(pattern);
        let mut found: Vec<_> = self
            .messages
            .iter()
            .filter(|(key, _)| topic::matches(&topic::split(key), &pattern))
            .map(|(_, (seq, message))| (*seq, message.clone()))
            .collect();
        found.sort_unstable_by_key(|(seq, _)| *seq);
        found.into_iter().map(|(_, message)| message).collect()
    }

    /// Удаляет `prefix` и всё под `prefix/`. Возвращает число удалённых.
    pub fn clear_prefix(
        &mut self,
        prefix: &str,
    ) -> usize {
        let before = self.messages.len();
        self.messages.retain(|key, _| !in_subtree(key, prefix));
        before - self.messages.len()
    }

    pub fn clear(&mut self) -> usize {
        let count = self.messages.len();
        self.messages.clear();
        count
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }
}

fn in_subtree(
    key: &str,
    prefix: &str,
) -> bool {
    key.strip_prefix(prefix)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with(SEPARATOR))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn store(topics: &[&str]) -> RetainedStore {
        let mut store = RetainedStore::default();
        for (i, t) in topics.iter().enumerate() {
            store.upsert(Message::new(*t, json!(i)));
        }
        store
    }

    fn topics(messages: Vec<Message>) -> Vec<String> {
        messages.into_iter().map(|m| m.topic).collect()
    }

    /// Тест проверяет, что перезапись сохраняет позицию первой вставки.
    #[test]
    fn test_overwrite_keeps_order() {
        let mut s = store(&["a/1", "a/2", "a/3"]);
        s.upsert(Message::new("a/1", json!("new")));
        assert_eq!(topics(s.matching("a/*")), vec!["a/1", "a/2", "a/3"]);
        assert_eq!(s.get("a/1").unwrap().payload, json!("new"));
        assert_eq!(s.len(), 3);
    }

    #[test]
    fn test_matching_wildcards() {
        let s = store(&["a", "a/b", "a/b/c", "x/b"]);
        assert_eq!(topics(s.matching("a/**")), vec!["a", "a/b", "a/b/c"]);
        assert_eq!(topics(s.matching("*/b")), vec!["a/b", "x/b"]);
        assert!(s.matching("nothing").is_empty());
    }

    /// Тест проверяет, что очистка префикса не задевает соседние топики
    /// с общим началом строки.
    #[test]
    fn test_clear_prefix() {
        let mut s = store(&["a", "a/b", "ab", "c"]);
        assert_eq!(s.clear_prefix("a"), 2);
        assert!(s.get("ab").is_some());
        assert!(s.get("c").is_some());
        assert_eq!(s.clear(), 2);
    }

    #[test]
    fn test_remove() {
        let mut s = store(&["t"]);
        assert!(s.remove("t").is_some());
        assert!(s.remove("t").is_none());
    }
}
