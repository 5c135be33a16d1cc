//! Демонстрационный запуск движка vestnik.
//!
//! Загружает настройки, инициализирует логирование и прогоняет сценарий
//! эмиссии: удержанные сообщения, wildcard-подписки, асинхронные слушатели
//! и `wait_for`.

use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::{json, Value};
use tracing::info;
use vestnik::{
    from_async, from_fn, init_logging, Emitter, EmitterConfig, ExecutorKind, ListenOptions,
    LogObserver, Settings, Throttle,
};

#[derive(Parser)]
#[command(name = "vestnik")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "In-process publish/subscribe dispatch engine demo", long_about = None)]
struct Cli {
    /// Файл настроек
    #[arg(short, long, default_value = "vestnik.toml", env = "VESTNIK_CONFIG")]
    config: PathBuf,
    /// Исполнитель по умолчанию (переопределяет настройки)
    #[arg(short, long)]
    executor: Option<ExecutorKind>,
    /// Строгий режим: ошибка слушателя прерывает эмиссию
    #[arg(long)]
    strict: bool,
    /// Число показаний датчика в сценарии
    #[arg(short, long, default_value_t = 5)]
    readings: u32,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut settings = Settings::load_from(&cli.config)
        .with_context(|| format!("failed to load settings from {}", cli.config.display()))?;
    if let Some(kind) = cli.executor {
        settings.default_executor = kind;
    }
    if cli.strict {
        settings.ignore_errors = false;
    }

    let logging = init_logging(settings.logging.clone())
        .map_err(|e| anyhow::anyhow!("failed to initialize logging: {e}"))?;

    info!(
        git = option_env!("GIT_COMMIT").unwrap_or("unknown"),
        build_time = option_env!("BUILD_TIME").unwrap_or("unknown"),
        executor = settings.default_executor.as_ref(),
        ignore_errors = settings.ignore_errors,
        "vestnik starting"
    );

    let emitter = Emitter::builder()
        .config(EmitterConfig::from(&settings))
        .observer(Arc::new(LogObserver))
        .build();

    run_scenario(&emitter, cli.readings).await?;

    logging.shutdown();
    Ok(())
}

async fn run_scenario(
    emitter: &Emitter,
    readings: u32,
) -> Result<()> {
    emitter.emit(("config/units", json!("celsius"), true))?;

    emitter.on(
        "config/*",
        from_fn(|msg| {
            info!(topic = %msg.topic, value = %msg.payload, "config replayed");
            Ok(Value::Null)
        }),
    )?;

    emitter.on_with(
        "sensors/*/temperature",
        from_fn(|msg| {
            let celsius = msg.payload.as_f64().unwrap_or_default();
            Ok(json!({ "sensor": msg.topic, "fahrenheit": celsius * 9.0 / 5.0 + 32.0 }))
        }),
        ListenOptions::default().tag("converter"),
    )?;

    emitter.on_with(
        "sensors/**",
        from_async(|msg| async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            Ok(json!({ "stored": msg.topic }))
        }),
        ListenOptions::default()
            .tag("archiver")
            .pipe(Arc::new(Throttle::new(Duration::from_millis(5)))),
    )?;

    let done = emitter.wait_for("sensors/done", Some(Duration::from_secs(1)));

    for i in 0..readings {
        let results = emitter
            .emit_async((format!("sensors/s{i}/temperature"), json!(20.0 + f64::from(i))))
            .await?;
        for result in results {
            match result {
                Ok(value) => info!(%value, "listener result"),
                Err(err) => info!(error = %err, "listener failed"),
            }
        }
    }

    emitter.emit("sensors/done")?;
    let message = done.await?;
    info!(topic = %message.topic, listeners = emitter.len(), "scenario finished");
    Ok(())
}
