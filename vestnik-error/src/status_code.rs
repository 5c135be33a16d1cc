use std::fmt;

use num_enum::TryFromPrimitive;
#[cfg(feature = "serde_repr")]
use serde_repr::{Deserialize_repr, Serialize_repr};
#[cfg(feature = "strum")]
use strum_macros::{AsRefStr, EnumIter};

/// Коды статуса для категоризации ошибок диспетчеризации.
///
/// # Диапазоны:
/// - 0xxx: Успех
/// - 1xxx: Общие ошибки
/// - 2xxx: Ошибки регистрации (топики, слушатели)
/// - 3xxx: Ошибки выполнения слушателей
/// - 4xxx: Противодавление (очереди, ограничения)
/// - 5xxx: Среда выполнения (runtime, фоновые задачи)
///
/// # Реализация:
/// - `num_enum::TryFromPrimitive` даёт нативную реализацию `TryFrom<u32>`.
/// - опционально: `strum` для `AsRefStr`/`EnumIter` (feature = "strum").
/// - опционально: `serde_repr` для сериализации в виде числового значения
///   (feature = "serde_repr").
#[cfg_attr(feature = "strum", derive(AsRefStr, EnumIter))]
#[cfg_attr(feature = "serde_repr", derive(Serialize_repr, Deserialize_repr))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u32)]
#[non_exhaustive]
pub enum StatusCode {
    // === 0xxx: Успех ===
    Success = 0,

    // === 1xxx: Общие ошибки ===
    Unknown = 1000,
    Unexpected = 1002,
    Internal = 1003,
    InvalidArgs = 1004,

    // === 2xxx: Регистрация ===
    InvalidTopic = 2000,
    MissingListener = 2001,
    RegistrationCancelled = 2002,
    Unbound = 2003,
    SerializationFailed = 2004,

    // === 3xxx: Выполнение слушателей ===
    ListenerFailed = 3000,
    Aborted = 3001,
    Timeout = 3002,

    // === 4xxx: Противодавление ===
    QueueOverflow = 4000,

    // === 5xxx: Среда выполнения ===
    NoRuntime = 5000,
    TaskFailed = 5001,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl StatusCode {
    /// Числовое представление кода статуса.
    pub const fn code(self) -> u32 {
        self as u32
    }

    /// Пытается получить вариант `StatusCode` из `u32`.
    ///
    /// Использует `TryFrom<u32>` из `num_enum`; возвращает `None`, если
    /// значение не соответствует ни одному варианту.
    pub fn from_u32(v: u32) -> Option<Self> {
        Self::try_from(v).ok()
    }

    /// Возвращает `true`, если операцию с этим кодом имеет смысл повторить
    /// (например, через пайп `Retry`).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ListenerFailed | Self::Timeout | Self::QueueOverflow | Self::TaskFailed
        )
    }

    /// Вернёт `true`, если переданный `code` означает успешный результат.
    pub fn is_success(code: u32) -> bool {
        Self::Success as u32 == code
    }

    /// Ошибка вызывающей стороны: неверный топик, отсутствующий слушатель,
    /// отклонённая регистрация.
    pub fn is_caller_error(&self) -> bool {
        (2000..=2999).contains(&self.code()) || matches!(self, Self::InvalidArgs)
    }

    /// Ошибка, возникшая при выполнении слушателя или пайпа.
    pub fn is_execution_error(&self) -> bool {
        matches!(self.code(), 3000..=4999)
    }

    /// Требуется ли логировать как критическую ошибку.
    pub fn is_critical(&self) -> bool {
        matches!(self, Self::Internal | Self::NoRuntime | Self::TaskFailed)
    }

    /// Рекомендуемый уровень логирования для данного кода.
    pub fn log_level(&self) -> LogLevel {
        match self {
            Self::Success => LogLevel::Trace,
            Self::Aborted | Self::RegistrationCancelled => LogLevel::Debug,
            Self::InvalidArgs
            | Self::InvalidTopic
            | Self::MissingListener
            | Self::Unbound
            | Self::SerializationFailed => LogLevel::Info,
            Self::ListenerFailed | Self::Timeout | Self::QueueOverflow => LogLevel::Warn,
            Self::Internal | Self::NoRuntime | Self::TaskFailed => LogLevel::Error,
            _ => LogLevel::Warn,
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов для StatusCode
////////////////////////////////////////////////////////////////////////////////

impl From<StatusCode> for u32 {
    fn from(c: StatusCode) -> Self {
        c.code()
    }
}

impl fmt::Display for StatusCode {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        #[cfg(feature = "strum")]
        {
            write!(f, "{} ({})", self.as_ref(), self.code())
        }
        #[cfg(not(feature = "strum"))]
        {
            write!(f, "{:?} ({})", self, self.code())
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
