use std::{
    fmt,
    sync::{Arc, Weak},
};

use super::{
    emitter::Shared,
    listener::{ListenerEntry, ListenerRef},
};

/// Дескриптор регистрации слушателя.
///
/// Удаление дескриптора не отменяет подписку: слушатель живёт до `cancel`,
/// исчерпания лимита или очистки движка.
#[derive(Clone)]
pub struct Subscription {
    entry: Arc<ListenerEntry>,
    owner: Weak<Shared>,
}

impl Subscription {
    pub(crate) fn new(
        entry: Arc<ListenerEntry>,
        owner: Weak<Shared>,
    ) -> Self {
        Self { entry, owner }
    }

    /// Снимает слушателя. Повторный вызов ничего не делает и возвращает
    /// `false`.
    pub fn cancel(&self) -> bool {
        match self.owner.upgrade() {
            Some(shared) => shared.remove_entry(&self.entry),
            None => self.entry.retire(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.entry.is_active()
    }

    /// Исходный слушатель (до применения пайпов), пригодный для `off`.
    pub fn listener(&self) -> &ListenerRef {
        self.entry.original()
    }

    pub fn topic(&self) -> &str {
        self.entry.topic()
    }

    pub fn tag(&self) -> Option<&str> {
        self.entry.tag()
    }

    pub fn execution_count(&self) -> usize {
        self.entry.execution_count()
    }

    pub(crate) fn entry(&self) -> &Arc<ListenerEntry> {
        &self.entry
    }
}

impl fmt::Debug for Subscription {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("topic", &self.topic())
            .field("tag", &self.tag())
            .field("active", &self.is_active())
            .finish()
    }
}
