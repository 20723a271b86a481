//! List registered extractors. Loads no secrets and opens no sessions.

use crate::extractors;
use anyhow::Result;

pub fn run(json: bool) -> Result<i32> {
    let registry = extractors::builtin();

    if json {
        let entries: Vec<serde_json::Value> = registry
            .iter()
            .map(|c| {
                serde_json::json!({
                    "name": c.name(),
                    "description": c.description(),
                    "session": c.session_kind(),
                    "required_secrets": c.required_secrets(),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(0);
    }

    for capability in registry.iter() {
        println!(
            "{:<14} [{}] {}",
            capability.name(),
            capability.session_kind(),
            capability.description()
        );
    }
    Ok(0)
}
