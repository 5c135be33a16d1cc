//! Конфигурация движка и приложения.
//!
//! [`Settings`] читается из файла и переменных окружения `VESTNIK_*`,
//! [`EmitterConfig`] — внутрипроцессная конфигурация конкретного движка.

pub mod emitter;
pub mod settings;

pub use emitter::EmitterConfig;
pub use settings::Settings;
