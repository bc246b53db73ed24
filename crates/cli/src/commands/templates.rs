//! `hearth templates`: List the resolved template registry.

use super::{Global, preview};
use hearth_core::token::estimate_tokens;
use hearth_orchestrator::template_store;

pub fn run(global: &Global, show: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    let config = global.load_config()?;
    let store = template_store(&config.prompt)?;
    let templates = store.templates();

    if let Some(key) = show {
        let template = templates
            .iter()
            .find(|t| t.key.to_string() == key)
            .ok_or_else(|| format!("No template registered as '{key}'"))?;
        if global.json {
            return super::print_json(template);
        }
        println!("{}", template.body);
        return Ok(());
    }

    if global.json {
        return super::print_json(&templates);
    }

    println!("📄 Templates from {}", store.describe_source());
    println!();
    for t in &templates {
        let required: Vec<&str> = t.required_variables.iter().map(String::as_str).collect();
        println!(
            "  {:<24} v{:<3} {:>4} tok  {}",
            t.key.to_string(),
            t.version,
            estimate_tokens(&t.body),
            preview(t.body.lines().next().unwrap_or(""), 50)
        );
        if !required.is_empty() {
            println!("  {:<24} requires: {}", "", required.join(", "));
        }
    }
    println!();
    println!("  {} templates", templates.len());
    Ok(())
}
