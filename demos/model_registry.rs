//! Register a model, train a version, and promote it once training succeeds
//!
//! Run with: `cargo run --example model_registry`

use std::time::Duration;

use npd_client::{CancellationToken, NewSample, NpdClient, PollPolicy, TaskState};
use serde_json::json;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt::init();

    let client = NpdClient::from_env()?;

    println!("  Model Registry Example");
    println!("=========================");

    println!("\n1. Preparing a dataset...");
    match client
        .create_dataset()
        .dataset_id("registry-demo")
        .samples(vec![
            NewSample::new("guard", "stern", "Halt!"),
            NewSample::new("guard", "bored", "Another quiet night."),
        ])
        .call()
        .await
    {
        Ok(_) => println!(" Dataset created"),
        Err(e) if e.is_conflict() => println!(" Dataset already exists"),
        Err(e) => return Err(e.into()),
    }

    println!("\n2. Registering a model...");
    let model = match client.get_model("npc-guard").await? {
        Some(model) => model,
        None => {
            client
                .create_model()
                .model_id("npc-guard")
                .description("Dialogue model for guards")
                .model_type("stub")
                .config(json!({"max_len": 64}).as_object().cloned().unwrap_or_default())
                .call()
                .await?
        }
    };
    println!(" Model {} (active version: {:?})", model.model_id, model.active_version_id);

    println!("\n3. Training a new version...");
    let version = client
        .train_model()
        .model_id("npc-guard")
        .dataset_id("registry-demo")
        .version_tag("demo")
        .call()
        .await?;
    println!(" Version {} is {}", version.id, version.state);

    let finished = client
        .poller(
            PollPolicy::builder()
                .interval(Duration::from_secs(1))
                .deadline(Duration::from_secs(300))
                .build(),
        )
        .wait_for_model_version("npc-guard", version.id, &CancellationToken::new())
        .await?;
    println!(" Version {} finished: {} {:?}", finished.id, finished.state, finished.metrics);

    println!("\n4. Promoting...");
    if finished.state == TaskState::Succeeded {
        let model = client.promote_model_version("npc-guard", finished.id).await?;
        println!(" Active version is now {:?}", model.active_version_id);
    } else {
        println!(" Training failed, keeping the current version");
    }

    println!("\n5. Versions:");
    for version in client.list_model_versions("npc-guard").await?.unwrap_or_default() {
        println!(
            "  #{} {} {}",
            version.id,
            version.version_tag.as_deref().unwrap_or("-"),
            version.state
        );
    }

    Ok(())
}
