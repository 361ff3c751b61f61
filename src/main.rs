use anyhow::Result;

use common::ids::UserId;
use common::models::Dataset;
use model_forge::ModelForge;

#[tokio::main]
async fn main() -> Result<()> {
    let forge = ModelForge::new()?;

    println!("Model Forge initialized");

    let owner = UserId::new();
    let layers = serde_json::json!([
        { "type": "Conv2d", "in_channels": 1, "out_channels": 32, "kernel_size": 3 },
        { "type": "ReLU" },
        { "type": "MaxPool2d", "kernel_size": 2, "stride": 2 },
        { "type": "Flatten" },
        { "type": "Linear", "in_features": 5408, "out_features": 10 },
        { "type": "Softmax", "dim": 1 },
    ]);

    // Register a model and its first draft
    let (model, draft) = forge
        .create_model("demo-cnn", owner, Dataset::Mnist, &layers)
        .await?;
    println!("Created model {} with draft version {}", model.id, draft.version_id);

    // Train the draft against the remote trainer, then fetch its analysis;
    // both steps need the training and analysis services to be reachable
    let result = forge.run_training(draft.version_id).await?;
    println!(
        "Training finished: accuracy {:.4}, loss {:.4}, {} parameters",
        result.test_accuracy, result.test_loss, result.total_params
    );

    forge.save_analysis(draft.version_id).await?;
    let finalized = forge.get_model(model.id).await?;
    println!(
        "Version finalized: model now at v{} with accuracy {:.4}",
        finalized.latest_version, finalized.accuracy
    );

    // Iterate: clone the finalized version into a new draft
    let next = forge
        .create_version(model.id, draft.version_id, owner)
        .await?;
    println!("Opened draft version {} for the next iteration", next.version_id);

    let working = forge.list_working_versions(owner).await?;
    println!("{} version(s) in progress", working.len());

    Ok(())
}
