use std::io;

use tracing_subscriber::{layer::Layer as LayerTrait, registry::LookupSpan};

use crate::logging::{config::LoggingConfig, formatter};

/// Консольный слой по настройкам `config.console`.
pub fn layer_with_config<S>(config: &LoggingConfig) -> Box<dyn LayerTrait<S> + Send + Sync>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    formatter::build_formatter_from_config(
        &config.console,
        config.console.format,
        config.console.with_ansi,
        io::stdout as fn() -> io::Stdout,
    )
}

#[cfg(test)]
mod tests {
    use tracing::info;
    use tracing_subscriber::{prelude::*, registry::Registry};

    use super::*;
    use crate::logging::config::{ConsoleConfig, LogFormat};

    /// Тест проверяет, что слой строится для всех форматов и его можно
    /// зарегистрировать в `Registry`.
    #[test]
    fn test_layer_with_config_all_formats() {
        for format in [LogFormat::Pretty, LogFormat::Compact, LogFormat::Json] {
            let cfg = LoggingConfig {
                console: ConsoleConfig {
                    format,
                    with_ansi: false,
                    ..Default::default()
                },
                ..Default::default()
            };
            let subscriber = Registry::default().with(layer_with_config::<Registry>(&cfg));
            tracing::subscriber::with_default(subscriber, || {
                info!(%format, "console layer smoke test");
            });
        }
    }
}
