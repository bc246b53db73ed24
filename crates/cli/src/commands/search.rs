//! `hearth search`: Search working and semantic memory.

use super::{Global, preview};

pub async fn run(
    global: &Global,
    query: &str,
    user: &str,
    limit: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    let orchestrator = global.orchestrator()?;
    let results = orchestrator.search_memories(query, user, limit).await?;

    if global.json {
        return super::print_json(&results);
    }

    println!("🔍 Searching memories for: \"{query}\"");
    println!();
    if results.is_empty() {
        println!("   No memories found.");
        return Ok(());
    }
    for (i, item) in results.iter().enumerate() {
        println!(
            "  {:>2}. [score: {:.2}] {}",
            i + 1,
            item.relevance_score.unwrap_or(0.0),
            preview(&item.content, 80)
        );
        println!("      {} · {} · {}", item.id, item.conversation_id, item.created_at.format("%Y-%m-%d %H:%M"));
    }
    Ok(())
}
