//! `hearth prompt`: Build the system prompt for a turn.

use super::Global;
use hearth_core::PromptMode;
use hearth_orchestrator::PromptBuildRequest;

pub async fn run(
    global: &Global,
    user: String,
    conversation: String,
    query: Option<String>,
    minimal: bool,
    budget: Option<usize>,
) -> Result<(), Box<dyn std::error::Error>> {
    let orchestrator = global.orchestrator()?;
    let request = PromptBuildRequest {
        user_id: user,
        conversation_id: conversation,
        query,
        mode: if minimal {
            PromptMode::Minimal
        } else {
            PromptMode::Full
        },
        budget,
        deadline: None,
    };
    let prompt = orchestrator.build_prompt(&request).await?;

    if global.json {
        return super::print_json(&prompt);
    }

    println!("{}", prompt.final_text);

    // Build metadata goes to stderr so stdout stays pipeable.
    eprintln!();
    eprintln!(
        "── {} tokens · {:?} · sections: {}",
        prompt.estimated_tokens,
        prompt.mode,
        prompt.sections_used.join(", ")
    );
    for warning in &prompt.warnings {
        eprintln!("   ⚠️  {warning}");
    }
    if !prompt.degraded.is_empty() {
        eprintln!("   ⚠️  degraded layers: {}", prompt.degraded.join(", "));
    }
    Ok(())
}
