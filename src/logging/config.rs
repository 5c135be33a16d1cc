use std::{
    env,
    fmt, fs,
    path::PathBuf,
    str::FromStr,
};

use serde::{Deserialize, Serialize};

/// Уровни, допустимые в `level`.
const LEVELS: [&str; 6] = ["off", "error", "warn", "info", "debug", "trace"];

/// Формат вывода в консоль.
#[derive(Debug, Default, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Compact,
    Json,
}

impl FromStr for LogFormat {
    type Err = LoggingConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            other => Err(LoggingConfigError::UnknownFormat(other.to_string())),
        }
    }
}

/// Ошибки конфигурации логирования.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoggingConfigError {
    #[error("unknown log level '{0}'")]
    UnknownLevel(String),
    #[error("unknown log format '{0}'")]
    UnknownFormat(String),
    #[error("log file name must not be empty")]
    EmptyFileName,
}

/// Настройки консольного вывода.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ConsoleConfig {
    pub enabled: bool,
    pub format: LogFormat,
    pub with_ansi: bool,
    pub with_target: bool,
    pub with_thread_ids: bool,
    pub with_line_numbers: bool,
}

/// Настройки файлового вывода (ежедневная ротация).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FileConfig {
    pub enabled: bool,
    pub file_name: String,
    pub json: bool,
}

/// Конфигурация логирования.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Базовый уровень: `off`, `error`, `warn`, `info`, `debug`, `trace`.
    pub level: String,
    /// Дополнительные директивы `EnvFilter` (например `vestnik::pipe=trace`).
    pub directives: Vec<String>,
    pub log_dir: PathBuf,
    pub console: ConsoleConfig,
    pub file: FileConfig,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            format: LogFormat::Pretty,
            with_ansi: true,
            with_target: true,
            with_thread_ids: false,
            with_line_numbers: false,
        }
    }
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            file_name: "vestnik.log".to_string(),
            json: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            directives: Vec::new(),
            log_dir: PathBuf::from("logs"),
            console: ConsoleConfig::default(),
            file: FileConfig::default(),
        }
    }
}

impl LoggingConfig {
    /// Переопределения из окружения: `VESTNIK_LOG_LEVEL`,
    /// `VESTNIK_LOG_FORMAT`, `VESTNIK_LOG_DIR` (последняя включает файловый
    /// вывод).
    pub fn apply_env_overrides(&mut self) {
        if let Ok(level) = env::var("VESTNIK_LOG_LEVEL") {
            self.level = level.to_ascii_lowercase();
        }
        if let Ok(format) = env::var("VESTNIK_LOG_FORMAT") {
            match format.parse() {
                Ok(format) => self.console.format = format,
                Err(e) => eprintln!("Ignoring VESTNIK_LOG_FORMAT: {e}"),
            }
        }
        if let Ok(dir) = env::var("VESTNIK_LOG_DIR") {
            self.log_dir = PathBuf::from(dir);
            self.file.enabled = true;
        }
    }

    pub fn validate(&self) -> Result<(), LoggingConfigError> {
        if !LEVELS.contains(&self.level.as_str()) {
            return Err(LoggingConfigError::UnknownLevel(self.level.clone()));
        }
        if self.file.enabled && self.file.file_name.trim().is_empty() {
            return Err(LoggingConfigError::EmptyFileName);
        }
        Ok(())
    }

    /// Создаёт каталог логов, если включён файловый вывод.
    pub fn ensure_log_dir(&self) -> std::io::Result<()> {
        if self.file.enabled {
            fs::create_dir_all(&self.log_dir)?;
        }
        Ok(())
    }

    /// Директива для `EnvFilter`: базовый уровень и дополнительные
    /// директивы через запятую.
    pub fn build_filter_directive(&self) -> String {
        std::iter::once(self.level.as_str())
            .chain(self.directives.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl fmt::Display for LogFormat {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let name = match self {
            Self::Pretty => "pretty",
            Self::Compact => "compact",
            Self::Json => "json",
        };
        f.write_str(name)
    }
}
