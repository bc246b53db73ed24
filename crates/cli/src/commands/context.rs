//! `hearth context`: Gather merged memory for a conversation.

use super::{Global, preview};
use hearth_orchestrator::GetContextRequest;

pub async fn run(
    global: &Global,
    user: String,
    conversation: String,
    query: Option<String>,
    budget: Option<usize>,
) -> Result<(), Box<dyn std::error::Error>> {
    let orchestrator = global.orchestrator()?;
    let request = GetContextRequest {
        user_id: user,
        conversation_id: conversation,
        query,
        budget,
        deadline: None,
    };
    let ctx = orchestrator.get_context(&request).await?;

    if global.json {
        return super::print_json(&ctx);
    }

    let user = &ctx.structured;
    println!("🧠 Context for {} / {}", request.user_id, request.conversation_id);
    println!("=====================================");
    println!(
        "  User:      {} ({}, {})",
        user.user_id,
        user.role,
        user.language_preference.as_str()
    );
    if !user.active_skills.is_empty() {
        let skills: Vec<&str> = user.active_skills.iter().map(String::as_str).collect();
        println!("  Skills:    {}", skills.join(", "));
    }
    println!(
        "  Items:     {} ({} tokens)",
        ctx.ranked.len(),
        ctx.ranked.iter().map(|r| r.tokens).sum::<usize>()
    );
    for (layer, reason) in &ctx.failures {
        println!("  ⚠️  {layer} degraded: {reason}");
    }
    println!();

    for (i, ranked) in ctx.ranked.iter().enumerate() {
        println!(
            "  {:>2}. [{:<10} rank {:.2}] {}",
            i + 1,
            ranked.layer.as_str(),
            ranked.rank_score,
            preview(&ranked.item.content, 80)
        );
    }
    for (key, value) in &ctx.preferences {
        println!("      pref {key}: {}", preview(value, 70));
    }
    if ctx.ranked.is_empty() && ctx.preferences.is_empty() {
        println!("   No memory found for this conversation.");
    }
    Ok(())
}
