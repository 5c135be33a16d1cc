use std::fmt;

use once_cell::sync::Lazy;

use super::Settings;
use crate::{
    executor::{ExecutorKind, ExecutorRef},
    pubsub::{ListenerRef, Meta},
};

static DEFAULT_EXECUTOR: Lazy<ExecutorRef> = Lazy::new(|| ExecutorKind::default().build());

/// Конфигурация одного движка.
#[derive(Clone)]
pub struct EmitterConfig {
    /// `true` — ошибка слушателя возвращается как его результат, `false` —
    /// строгий режим, ошибка прерывает эмиссию.
    pub ignore_errors: bool,
    /// Разворачивать результаты вложенных эмиссий во внешний список.
    pub expand_nested: bool,
    /// Метаданные, под которые сливаются метаданные каждой эмиссии.
    pub default_meta: Option<Meta>,
    /// Исполнитель, если ни вызов, ни scope не задали свой.
    pub executor: ExecutorRef,
    /// Слушатель для регистраций без явного слушателя.
    pub default_listener: Option<ListenerRef>,
}

impl Default for EmitterConfig {
    fn default() -> Self {
        Self {
            ignore_errors: true,
            expand_nested: true,
            default_meta: None,
            executor: DEFAULT_EXECUTOR.clone(),
            default_listener: None,
        }
    }
}

impl From<&Settings> for EmitterConfig {
    fn from(settings: &Settings) -> Self {
        Self {
            ignore_errors: settings.ignore_errors,
            expand_nested: settings.expand_nested,
            executor: settings.default_executor.build(),
            ..Self::default()
        }
    }
}

impl fmt::Debug for EmitterConfig {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("EmitterConfig")
            .field("ignore_errors", &self.ignore_errors)
            .field("expand_nested", &self.expand_nested)
            .field("default_meta", &self.default_meta)
            .field("default_listener", &self.default_listener.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn test_defaults() {
        let config = EmitterConfig::default();
        assert!(config.ignore_errors);
        assert!(config.expand_nested);
        assert!(config.default_meta.is_none());
        assert!(Arc::ptr_eq(&config.executor, &EmitterConfig::default().executor));
    }

    #[test]
    fn test_from_settings() {
        let settings = Settings {
            ignore_errors: false,
            expand_nested: false,
            default_executor: ExecutorKind::Race,
            ..Settings::default()
        };
        let config = EmitterConfig::from(&settings);
        assert!(!config.ignore_errors);
        assert!(!config.expand_nested);
    }
}
