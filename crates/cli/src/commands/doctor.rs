//! `hearth doctor`: Check memory layer health.

use super::Global;

pub async fn run(global: &Global) -> Result<(), Box<dyn std::error::Error>> {
    let orchestrator = global.orchestrator()?;
    let report = orchestrator.health().await;

    if global.json {
        return super::print_json(&report);
    }

    println!("🩺 Hearth Doctor — Memory Layer Diagnostics");
    println!("===========================================\n");

    let mut issues = 0;
    for layer in &report.layers {
        match (&layer.error, layer.healthy) {
            (None, true) => println!("  ✅ {:<10} ({}ms)", layer.layer.as_str(), layer.elapsed_ms),
            (None, false) => {
                println!("  ⚠️  {:<10} reports unhealthy", layer.layer.as_str());
                issues += 1;
            }
            (Some(error), _) => {
                println!("  ❌ {:<10} {error}", layer.layer.as_str());
                issues += 1;
            }
        }
    }
    println!("  ✅ embedder   {}", report.embedder);
    println!("  ✅ templates  {}", report.templates);

    println!();
    if issues == 0 {
        println!("  🎉 All checks passed!");
    } else {
        println!("  ⚠️  {issues} issue(s) found. See above for details.");
    }
    Ok(())
}
