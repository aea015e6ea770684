use anyhow::{Context, Result};
use mnemos::config::MnemosConfig;
use mnemos::init_logging;
use mnemos::memory::{ConsolidationOutcome, MemoryArea};
use mnemos::MemorySystem;
use serde_json::json;

/// Stores a few fragments, consolidates them and prints what comes back.
///
/// Reads the layered `mnemos.json5` config from the current directory. Set
/// `synthesis.provider` to `openai` (and the matching API key) to get real
/// summaries; without it consolidation reports the missing provider.
#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let query = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "what did I learn".to_string());
    let cwd = std::env::current_dir().context("failed to resolve current directory")?;
    let config = MnemosConfig::load_layered(&cwd)
        .context("failed to load mnemos config")?
        .config;
    let system = MemorySystem::builder(config)
        .cwd(&cwd)
        .build()
        .context("failed to build memory system")?;
    let mind = system
        .open_default()
        .await
        .context("failed to open default namespace")?;

    for text in [
        "I learned that the borrow checker rejects shared mutation",
        "I learned that tokio tasks must not hold a sync mutex across await",
        "I learned that atomic renames keep index files consistent",
    ] {
        mind.store(text, MemoryArea::Fragments, json!({ "source": "demo" }))
            .await?;
    }

    match mind.consolidate(20).await {
        Ok(ConsolidationOutcome::Consolidated { solution_id, .. }) => {
            let solution = mind.index().get(solution_id).context("solution vanished")?;
            println!("Consolidated:\n{}\n", solution.text);
        }
        Ok(outcome) => println!("Consolidation: {outcome:?}\n"),
        Err(err) => println!("Consolidation unavailable: {err}\n"),
    }

    println!("{}", mind.search_and_format(&query, 5).await?);
    println!("\n{}", serde_json::to_string_pretty(&mind.stats())?);

    system.shutdown().await;
    Ok(())
}
