//! Префиксное дерево слушателей по сегментам топика.
//!
//! Порядок обхода при эмиссии на каждом уровне: точный сегмент, затем `*`,
//! затем `**`. Внутри узла слушатели идут в порядке регистрации (с учётом
//! `prepend`). Узлы создаются лениво и не удаляются.

use std::sync::Arc;

use rustc_hash::FxHashMap;

use super::listener::ListenerEntry;
use crate::topic::{self, MULTI_LEVEL, SINGLE_LEVEL};

#[derive(Default)]
pub(crate) struct ListenerNode {
    entries: Vec<Arc<ListenerEntry>>,
    children: FxHashMap<Box<str>, ListenerNode>,
}

impl ListenerNode {
    /// Добавляет запись в узел её шаблона.
    pub fn insert(
        &mut self,
        entry: Arc<ListenerEntry>,
        prepend: bool,
    ) {
        let mut node = self;
        for segment in topic::split(entry.topic()) {
            node = node.children.entry(segment.into()).or_default();
        }
        if prepend {
            node.entries.insert(0, entry);
        } else {
            node.entries.push(entry);
        }
    }

    /// Удаляет конкретную запись. `true`, если она была в дереве.
    pub fn remove(
        &mut self,
        entry: &ListenerEntry,
    ) -> bool {
        let Some(node) = self.node_mut(entry.topic()) else {
            return false;
        };
        let before = node.entries.len();
        node.entries.retain(|e| e.id() != entry.id());
        node.entries.len() != before
    }

    /// Собирает записи всех шаблонов, совпадающих с путём.
    pub fn collect(
        &self,
        path: &[&str],
        out: &mut Vec<Arc<ListenerEntry>>,
    ) {
        let Some((head, rest)) = path.split_first() else {
            out.extend(self.entries.iter().cloned());
            if let Some(multi) = self.children.get(MULTI_LEVEL) {
                out.extend(multi.entries.iter().cloned());
            }
            return;
        };

        if !topic::is_wildcard_segment(head) {
            if let Some(child) = self.children.get(*head) {
                child.collect(rest, out);
            }
        }
        if let Some(single) = self.children.get(SINGLE_LEVEL) {
            single.collect(rest, out);
        }
        if let Some(multi) = self.children.get(MULTI_LEVEL) {
            out.extend(multi.entries.iter().cloned());
        }
    }

    /// Узел точного шаблона, если он уже создан.
    pub fn node_mut(
        &mut self,
        pattern: &str,
    ) -> Option<&mut ListenerNode> {
        let mut node = self;
        for segment in topic::split(pattern) {
            node = node.children.get_mut(segment)?;
        }
        Some(node)
    }

    /// Извлекает записи, удовлетворяющие предикату; с `deep` — во всём
    /// поддереве.
    pub fn drain_where(
        &mut self,
        deep: bool,
        pred: &dyn Fn(&ListenerEntry) -> bool,
    ) -> Vec<Arc<ListenerEntry>> {
        let mut removed = Vec::new();
        self.drain_into(deep, pred, &mut removed);
        removed
    }

    fn drain_into(
        &mut self,
        deep: bool,
        pred: &dyn Fn(&ListenerEntry) -> bool,
        removed: &mut Vec<Arc<ListenerEntry>>,
    ) {
        let mut kept = Vec::with_capacity(self.entries.len());
        for entry in self.entries.drain(..) {
            if pred(&entry) {
                removed.push(entry);
            } else {
                kept.push(entry);
            }
        }
        self.entries = kept;
        if deep {
            for child in self.children.values_mut() {
                child.drain_into(deep, pred, removed);
            }
        }
    }

    /// Шаблоны всех узлов, у которых есть слушатели.
    pub fn patterns(&self) -> Vec<String> {
        let mut out = Vec::new();
        let mut prefix = Vec::new();
        self.patterns_into(&mut prefix, &mut out);
        out.sort();
        out
    }

    fn patterns_into<'a>(
        &'a self,
        prefix: &mut Vec<&'a str>,
        out: &mut Vec<String>,
    ) {
        if !self.entries.is_empty() {
            out.push(prefix.join("/"));
        }
        for (segment, child) in &self.children {
            prefix.push(segment);
            child.patterns_into(prefix, out);
            prefix.pop();
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use super::*;
    use crate::pubsub::listener::{from_fn, ListenOptions};

    fn entry(
        id: u64,
        pattern: &str,
    ) -> Arc<ListenerEntry> {
        Arc::new(ListenerEntry::new(
            id,
            Arc::from(pattern),
            from_fn(|_| Ok(Value::Null)),
            ListenOptions::default(),
        ))
    }

    fn ids(
        root: &ListenerNode,
        topic: &str,
    ) -> Vec<u64> {
        let mut out = Vec::new();
        root.collect(&topic::split(topic), &mut out);
        out.iter().map(|e| e.id()).collect()
    }

    /// Тест проверяет порядок обхода: точный, `*`, затем `**`.
    #[test]
    fn test_collect_order() {
        let mut root = ListenerNode::default();
        root.insert(entry(1, "a/**"), false);
        root.insert(entry(2, "a/*/c"), false);
        root.insert(entry(3, "a/b/c"), false);
        root.insert(entry(4, "**"), false);

        assert_eq!(ids(&root, "a/b/c"), vec![3, 2, 1, 4]);
        assert_eq!(ids(&root, "a/x/c"), vec![2, 1, 4]);
        assert_eq!(ids(&root, "a"), vec![1, 4]);
        assert_eq!(ids(&root, "z"), vec![4]);
    }

    /// Тест проверяет вставку в начало списка узла.
    #[test]
    fn test_prepend() {
        let mut root = ListenerNode::default();
        root.insert(entry(1, "t"), false);
        root.insert(entry(2, "t"), false);
        root.insert(entry(3, "t"), true);
        assert_eq!(ids(&root, "t"), vec![3, 1, 2]);
    }

    /// Тест проверяет, что эмиссия в топик со звёздочкой не собирает
    /// слушателей узла `*` дважды.
    #[test]
    fn test_wildcard_emit_topic_not_duplicated() {
        let mut root = ListenerNode::default();
        root.insert(entry(1, "a/*"), false);
        assert_eq!(ids(&root, "a/*"), vec![1]);
    }

    #[test]
    fn test_remove_and_drain() {
        let mut root = ListenerNode::default();
        let e1 = entry(1, "a/b");
        root.insert(e1.clone(), false);
        root.insert(entry(2, "a/b"), false);
        root.insert(entry(3, "a/b/c"), false);

        assert!(root.remove(&e1));
        assert!(!root.remove(&e1));
        assert_eq!(ids(&root, "a/b"), vec![2]);

        let node = root.node_mut("a").unwrap();
        let removed = node.drain_where(true, &|_| true);
        assert_eq!(removed.len(), 2);
        assert!(ids(&root, "a/b/c").is_empty());
    }

    #[test]
    fn test_patterns() {
        let mut root = ListenerNode::default();
        root.insert(entry(1, "a/b"), false);
        root.insert(entry(2, "a/*"), false);
        root.insert(entry(3, "**"), false);
        assert_eq!(root.patterns(), vec!["**", "a/*", "a/b"]);
    }
}
