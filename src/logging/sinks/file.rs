use tracing_appender::{non_blocking, non_blocking::WorkerGuard, rolling::daily};
use tracing_subscriber::{layer::Layer as LayerTrait, registry::LookupSpan};

use crate::logging::{
    config::{LogFormat, LoggingConfig},
    formatter,
};

/// Файловый слой с ежедневной ротацией и неблокирующей записью.
///
/// `WorkerGuard` нужно держать до завершения программы, иначе хвост логов
/// будет потерян.
pub fn layer_with_config<S>(
    config: &LoggingConfig,
) -> (Box<dyn LayerTrait<S> + Send + Sync>, WorkerGuard)
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    let appender = daily(&config.log_dir, &config.file.file_name);
    let (writer, guard) = non_blocking(appender);
    let format = if config.file.json {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };
    let layer = formatter::build_formatter_from_config(&config.console, format, false, writer);
    (layer, guard)
}
