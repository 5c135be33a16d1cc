/// Немедленно возвращает `Err(EmitError)` из текущей функции (аналогично
/// `anyhow::bail!`).
///
/// Поддерживает две формы:
/// - `bail!(err)` — принимает готовое значение, конвертируемое в `EmitError`;
/// - `bail!(topic, "причина {}", arg)` — создаёт `EmitError::InvalidTopic`.
///
/// Пример:
///
/// ```ignore
/// use vestnik_error::{bail, EmitError, EmitResult};
///
/// fn check(topic: &str) -> EmitResult<()> {
///     if topic.is_empty() {
///         bail!(topic, "topic cannot be empty");
///     }
///     Ok(())
/// }
/// ```
#[macro_export]
macro_rules! bail {
    ($err:expr) => {
        return Err($crate::EmitError::from($err))
    };
    ($topic:expr, $fmt:expr $(, $arg:expr)* $(,)?) => {
        return Err($crate::EmitError::invalid_topic($topic, format!($fmt $(, $arg)*)))
    };
}

/// Проверяет условие и вызывает `bail!`, если условие ложно.
///
/// Формы аналогичны `bail!`:
/// - `ensure!(cond, err)`;
/// - `ensure!(cond, topic, "причина {}", arg)`.
#[macro_export]
macro_rules! ensure {
    ($cond:expr, $err:expr) => {
        if !($cond) {
            $crate::bail!($err);
        }
    };
    ($cond:expr, $topic:expr, $fmt:expr $(, $arg:expr)* $(,)?) => {
        if !($cond) {
            $crate::bail!($topic, $fmt $(, $arg)*);
        }
    };
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
