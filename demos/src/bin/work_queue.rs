use std::{
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc,
    },
    time::Duration,
};

use anyhow::{bail, Result};
use serde_json::json;
use vestnik::{
    from_async, Balance, Emission, Emitter, ListenOptions, Outcome, Overflow, Queue,
    QueueOptions, Retry, Waterfall,
};

#[tokio::main]
async fn main() -> Result<()> {
    println!("=== Work queue ===\n");

    example_1_balanced_workers().await?;
    example_2_bounded_queue().await?;
    example_3_pipeline().await?;

    println!("\n=== Done ===");
    Ok(())
}

/// Пример 1: три воркера, задания распределяются по наименее загруженному.
async fn example_1_balanced_workers() -> Result<()> {
    println!("Example 1: balanced workers");
    println!("---------------------------");

    let emitter = Emitter::builder().executor(Arc::new(Balance)).build();
    for worker in 0..3 {
        emitter.on(
            "jobs/resize",
            from_async(move |msg| async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                Ok(json!({ "worker": worker, "job": msg.payload }))
            }),
        )?;
    }

    for job in 0..6 {
        for result in emitter.emit_async(("jobs/resize", json!(job))).await? {
            println!("  {}", result?);
        }
    }
    println!();
    Ok(())
}

/// Пример 2: очередь на одного исполнителя с повтором нестабильной работы.
async fn example_2_bounded_queue() -> Result<()> {
    println!("Example 2: bounded queue with retry");
    println!("-----------------------------------");

    let emitter = Emitter::new();
    let failures = Arc::new(AtomicU32::new(0));
    let counter = failures.clone();

    emitter.on_with(
        "jobs/upload",
        from_async(move |msg| {
            let attempt = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                if attempt % 3 == 0 {
                    bail!("transient upload failure");
                }
                Ok(json!({ "uploaded": msg.payload }))
            }
        }),
        ListenOptions::default()
            .pipe(Arc::new(Retry::new(3).interval(Duration::from_millis(5))))
            .pipe(Arc::new(Queue::new(
                QueueOptions::new(2)
                    .overflow(Overflow::Slide)
                    .on_drop(|message, reason| {
                        println!("  dropped {} ({reason:?})", message.payload);
                    }),
            ))),
    )?;

    let mut pending = Vec::new();
    for file in ["a.png", "b.png", "c.png", "d.png", "e.png"] {
        pending.extend(emitter.emit(("jobs/upload", json!(file)))?);
    }
    for result in settle_all(pending).await {
        println!("  {}", result?);
    }
    println!("  attempts: {}\n", failures.load(Ordering::SeqCst));
    Ok(())
}

/// Пример 3: конвейер, где каждый шаг получает результат предыдущего.
async fn example_3_pipeline() -> Result<()> {
    println!("Example 3: waterfall pipeline");
    println!("-----------------------------");

    let emitter = Emitter::new();
    emitter.on(
        "order",
        from_async(|msg| async move { Ok(json!({ "order": msg.payload, "validated": true })) }),
    )?;
    emitter.on(
        "order",
        from_async(|msg| async move {
            let mut order = msg.payload;
            order["total"] = json!(42.5);
            Ok(order)
        }),
    )?;

    let results = emitter
        .emit_async(Emission::new("order", json!(1001)).executor(Arc::new(Waterfall)))
        .await?;
    for result in results {
        println!("  {}", result?);
    }
    Ok(())
}

async fn settle_all(outcomes: Vec<Outcome>) -> Vec<vestnik::EmitResult<serde_json::Value>> {
    let mut results = Vec::with_capacity(outcomes.len());
    for outcome in outcomes {
        results.push(outcome.settle().await);
    }
    results
}
