//! `hearth config`: Configuration management commands.

use super::Global;
use hearth_config::AppConfig;

pub fn show(global: &Global) -> Result<(), Box<dyn std::error::Error>> {
    let config = global.load_config()?;
    println!("{}", config.to_toml()?);
    Ok(())
}

pub fn default() {
    println!("{}", AppConfig::default_toml());
}

pub fn path(global: &Global) {
    println!("{}", global.config_path().display());
}

pub fn validate(global: &Global) -> Result<(), Box<dyn std::error::Error>> {
    println!("🔍 Validating configuration...");

    let config = match global.load_config() {
        Ok(config) => config,
        Err(e) => {
            println!("   ❌ {e}");
            return Err(e);
        }
    };
    println!("   ✅ Config parsed successfully");

    let mut warnings = Vec::new();
    if config.orchestrator.layer_timeout_ms > config.orchestrator.request_deadline_ms {
        warnings.push("layer_timeout_ms exceeds request_deadline_ms; the deadline always wins");
    }
    if config.layers.api_token.is_none() && !global.offline {
        warnings.push("No api_token set (set HEARTH_API_TOKEN if the services require one)");
    }
    if let Some(dir) = &config.prompt.templates_dir
        && !dir.is_dir()
    {
        warnings.push("templates_dir does not exist; built-in templates will be used");
    }

    if warnings.is_empty() {
        println!("   ✅ All checks passed");
    } else {
        println!();
        for w in &warnings {
            println!("   ⚠️  {w}");
        }
    }

    println!();
    println!("   Hot cache:   {}", config.layers.hot_cache_url);
    println!("   Working:     {}", config.layers.working_memory_url);
    println!("   Profile:     {}", config.layers.profile_url);
    println!("   Semantic:    {}", config.layers.semantic_index_url);
    println!("   Archive:     {}", config.layers.archive_url);
    println!(
        "   Embedding:   {} ({} dims)",
        config.embedding.model, config.embedding.dimension
    );
    println!(
        "   Budget:      {} tokens (minimal memory share {:.0}%)",
        config.prompt.default_budget,
        config.prompt.minimal_memory_share * 100.0
    );
    Ok(())
}
