use std::path::Path;

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

use crate::{executor::ExecutorKind, logging::LoggingConfig};

/// Настройки приложения.
///
/// Источники в порядке приоритета: переменные окружения `VESTNIK_*`
/// (вложенные поля через `__`, например `VESTNIK_LOGGING__LEVEL`), файл
/// `vestnik.toml`, значения по умолчанию.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub ignore_errors: bool,
    pub expand_nested: bool,
    pub default_executor: ExecutorKind,
    pub logging: LoggingConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            ignore_errors: true,
            expand_nested: true,
            default_executor: ExecutorKind::Broadcast,
            logging: LoggingConfig::default(),
        }
    }
}

impl Settings {
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(Path::new("vestnik.toml"))
    }

    /// Загружает настройки из указанного файла (если он есть) и окружения.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let cfg = Config::builder()
            // Значения по умолчанию
            .set_default("ignore_errors", true)?
            .set_default("expand_nested", true)?
            .set_default("default_executor", ExecutorKind::Broadcast.as_ref())?
            // Необязательный файл конфигурации
            .add_source(File::from(path).required(false))
            // Переменные окружения с префиксом VESTNIK_
            .add_source(
                Environment::with_prefix("VESTNIK")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        cfg.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use serial_test::serial;

    use super::*;
    use crate::logging::LogFormat;

    #[test]
    #[serial]
    fn test_load_defaults() {
        let settings = Settings::load_from(Path::new("/nonexistent/vestnik.toml")).unwrap();
        assert!(settings.ignore_errors);
        assert!(settings.expand_nested);
        assert_eq!(settings.default_executor, ExecutorKind::Broadcast);
    }

    /// Тест проверяет чтение файла и приоритет переменных окружения.
    #[test]
    #[serial]
    fn test_file_and_env() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "default_executor = \"race\"\nexpand_nested = false\n\n\
             [logging.console]\nformat = \"json\""
        )
        .unwrap();

        std::env::set_var("VESTNIK_IGNORE_ERRORS", "false");
        std::env::set_var("VESTNIK_LOGGING__LEVEL", "debug");
        let settings = Settings::load_from(file.path());
        std::env::remove_var("VESTNIK_IGNORE_ERRORS");
        std::env::remove_var("VESTNIK_LOGGING__LEVEL");

        let settings = settings.unwrap();
        assert!(!settings.ignore_errors);
        assert!(!settings.expand_nested);
        assert_eq!(settings.default_executor, ExecutorKind::Race);
        assert_eq!(settings.logging.console.format, LogFormat::Json);
        assert_eq!(settings.logging.level, "debug");
    }
}
