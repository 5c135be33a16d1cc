use std::{sync::Arc, time::Duration};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use vestnik::{from_fn, EmitArgs, EmitDecision, Emitter, Hooks, Message};

#[derive(Debug, Serialize, Deserialize)]
struct Limits {
    max_connections: u32,
    timeout_ms: u64,
}

/// Запрещает публикацию в служебное пространство `internal/**`.
struct DenyInternal;

impl Hooks for DenyInternal {
    fn before_emit(
        &self,
        message: &Message,
        _args: &EmitArgs,
    ) -> EmitDecision {
        if message.topic.starts_with("internal/") {
            EmitDecision::Veto
        } else {
            EmitDecision::Proceed
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    println!("=== Retained configuration ===\n");

    let emitter = Emitter::builder().hooks(Arc::new(DenyInternal)).build();

    example_1_late_subscriber(&emitter)?;
    example_2_typed_payload(&emitter)?;
    example_3_wait_for(&emitter).await?;
    example_4_veto(&emitter);

    println!("\n=== Done ===");
    Ok(())
}

/// Пример 1: подписчик, пришедший позже, получает удержанные значения.
fn example_1_late_subscriber(emitter: &Emitter) -> Result<()> {
    println!("Example 1: late subscriber");
    println!("--------------------------");

    emitter.emit(("config/db/host", json!("localhost"), true))?;
    emitter.emit(("config/db/port", json!(5432), true))?;
    emitter.emit(("config/cache/ttl", json!(60), true))?;

    emitter.on(
        "config/db/*",
        from_fn(|msg| {
            println!("  {} = {}", msg.topic, msg.payload);
            Ok(Value::Null)
        }),
    )?;
    println!("Retained topics: {}\n", emitter.retained_len());
    Ok(())
}

/// Пример 2: типизированная полезная нагрузка.
fn example_2_typed_payload(emitter: &Emitter) -> Result<()> {
    println!("Example 2: typed payload");
    println!("------------------------");

    emitter.on(
        "config/limits",
        from_fn(|msg| {
            let limits: Limits = msg.decode()?;
            println!("  limits: {limits:?}");
            Ok(json!(limits.max_connections))
        }),
    )?;
    let outcomes = emitter.emit_typed(
        "config/limits",
        &Limits {
            max_connections: 128,
            timeout_ms: 2_000,
        },
    )?;
    println!("  listener results: {}\n", outcomes.len());
    Ok(())
}

/// Пример 3: ожидание следующего сообщения с тайм-аутом.
async fn example_3_wait_for(emitter: &Emitter) -> Result<()> {
    println!("Example 3: wait_for");
    println!("-------------------");

    let reload = emitter.wait_for("config/reload", Some(Duration::from_millis(500)));
    let publisher = emitter.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        let _ = publisher.emit(("config/reload", json!({ "reason": "manual" })));
    });
    let message = reload.await?;
    println!("  reload received: {}", message.payload);

    match emitter.wait_for("config/never", Some(Duration::from_millis(20))).await {
        Ok(_) => println!("  unexpected message"),
        Err(err) => println!("  timed out as expected: {err}\n"),
    }
    Ok(())
}

/// Пример 4: hook запрещает эмиссию.
fn example_4_veto(emitter: &Emitter) {
    println!("Example 4: before_emit veto");
    println!("---------------------------");

    match emitter.emit(("internal/secret", json!(1))) {
        Ok(_) => println!("  emission went through"),
        Err(err) => println!("  rejected: {err}"),
    }
}
