//! Start a training run, follow its progress, then evaluate the result
//!
//! Press Ctrl-C to stop waiting; the task keeps running on the service.
//!
//! Run with: `cargo run --example train_and_poll`

use std::time::Duration;

use npd_client::{
    CancellationToken, EvalMetric, Hyperparameters, NewSample, NpdClient, PollPolicy, TaskKind,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "npd_client=debug,info".into()),
        )
        .init();

    let client = NpdClient::from_env()?;

    if !client.is_alive().await {
        anyhow::bail!("service at {} is not reachable", client.base_url());
    }

    match client
        .create_dataset()
        .dataset_id("train-demo")
        .samples(vec![
            NewSample::new("guard", "stern", "Halt!"),
            NewSample::new("merchant", "cheerful", "Finest wares in town!"),
            NewSample::new("innkeeper", "tired", "Rooms are upstairs."),
        ])
        .call()
        .await
    {
        Ok(dataset) => println!("Created dataset {}", dataset.dataset_id),
        Err(e) if e.is_conflict() => println!("Reusing existing dataset train-demo"),
        Err(e) => return Err(e.into()),
    }

    let task = client
        .start_training()
        .dataset_id("train-demo")
        .hyperparameters(Hyperparameters::builder().lr(1e-3).epochs(3).build())
        .call()
        .await?;
    println!("Started training task {} ({})", task.task_id, task.state);

    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_ctrl_c.cancel();
        }
    });

    let poller = client.poller(
        PollPolicy::builder()
            .interval(Duration::from_secs(1))
            .deadline(Duration::from_secs(300))
            .jitter(true)
            .build(),
    );

    let trained = poller
        .wait_with_progress(TaskKind::Train, &task.task_id, &cancel, |t| {
            println!("  {:>9} {:>5.1}% {}", t.state, t.progress * 100.0, t.message);
        })
        .await?;

    if !trained.succeeded() {
        anyhow::bail!("training failed: {}", trained.message);
    }
    println!("Training finished with metrics {:?}", trained.metrics);

    let evaluation = client
        .start_evaluation()
        .model_tag(trained.model_tag.clone())
        .dataset_id("train-demo")
        .metrics(vec![EvalMetric::Loss, EvalMetric::StyleScore])
        .call()
        .await?;

    let evaluated = poller
        .wait(TaskKind::Evaluate, &evaluation.task_id, &cancel)
        .await?;
    println!("Evaluation {}: {:?}", evaluated.state, evaluated.metrics);

    let response = client
        .generate()
        .persona("guard")
        .emotion("stern")
        .model_tag(trained.model_tag)
        .call()
        .await?;
    if let Some(best) = response.best() {
        println!("Best line ({:.2}): {}", best.score, best.text);
    }

    Ok(())
}
