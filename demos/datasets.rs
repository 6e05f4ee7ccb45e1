//! Example demonstrating dataset and sample management
//!
//! Run with: `cargo run --example datasets`

use npd_client::{NewSample, NpdClient, SampleUpdate};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt::init();

    // Create client from environment variables
    let client = NpdClient::from_env()?;

    println!("  Dataset Management Example");
    println!("=============================");

    println!("\n1. Creating a dataset...");
    let dataset = match client
        .create_dataset()
        .dataset_id("example-guards")
        .description("Lines for town guards")
        .call()
        .await
    {
        Ok(dataset) => dataset,
        Err(e) if e.is_conflict() => {
            println!("  Dataset already exists, reusing it");
            client
                .get_dataset("example-guards")
                .await?
                .ok_or_else(|| anyhow::anyhow!("dataset vanished after conflict"))?
        }
        Err(e) => return Err(e.into()),
    };
    println!(" Created dataset: {}", serde_json::to_string_pretty(&dataset)?);

    println!("\n2. Adding samples...");
    let halt = client
        .create_sample(
            "example-guards",
            NewSample::new("guard", "stern", "Halt!").tags(["greeting"]),
        )
        .await?;
    println!(" Sample {} created", halt.id);

    let added = client
        .add_samples(
            "example-guards",
            &[
                NewSample::new("guard", "calm", "Move along, citizen."),
                NewSample::new("guard", "suspicious", "I've got my eye on you."),
            ],
        )
        .await?;
    println!(" Added {} samples ({} total)", added.added, added.total);

    println!("\n3. Updating a sample...");
    let updated = client
        .update_sample(
            "example-guards",
            halt.id,
            &SampleUpdate::default().text("Halt! Who goes there?"),
        )
        .await?;
    println!(" Sample {} now reads: {}", updated.id, updated.text);

    println!("\n4. Listing samples...");
    match client.list_samples("example-guards").await? {
        Some(samples) => {
            for sample in samples {
                println!(
                    "  [{}] {} ({}): {}",
                    sample.id, sample.persona, sample.emotion, sample.text
                );
            }
        }
        None => println!("  Dataset not found"),
    }

    println!("\n5. Updating the description...");
    let dataset = client
        .update_dataset_description("example-guards", "Lines for town and castle guards")
        .await?;
    println!(" Description: {}", dataset.description.unwrap_or_default());

    println!("\n6. Listing datasets...");
    for dataset in client.list_datasets().await? {
        println!("  {}", dataset.dataset_id);
    }

    println!("\n7. Cleaning up...");
    client.delete_sample("example-guards", halt.id).await?;
    client.delete_dataset("example-guards").await?;
    println!(" Deleted: {}", client.get_dataset("example-guards").await?.is_none());

    Ok(())
}
