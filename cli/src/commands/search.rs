use anyhow::Result;
use colored::Colorize;
use stubgen_schema::{search_schema, MatchType};

use super::Project;
use crate::ui;

pub fn search(config_path: &str, schema: Option<&str>, query: &str, json: bool) -> Result<()> {
    let project = Project::load(config_path, schema)?;
    let results = search_schema(&project.spec, query);

    if json {
        let entries: Vec<_> = results
            .iter()
            .map(|r| {
                serde_json::json!({
                    "name": r.name,
                    "owner": r.owner,
                    "section": r.section.to_string(),
                    "match": match r.match_type {
                        MatchType::Exact => "exact".to_string(),
                        MatchType::Contains => "contains".to_string(),
                        MatchType::Fuzzy(distance) => format!("fuzzy:{}", distance),
                    },
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if results.is_empty() {
        ui::print_warning(&format!("No matches for '{}'", query));
        return Ok(());
    }

    ui::print_step(&format!("{} match(es) for '{}'", results.len(), query.bold()));
    for result in &results {
        let location = match &result.owner {
            Some(owner) => format!("{}.{}", owner, result.name),
            None => result.name.clone(),
        };
        let label = match result.match_type {
            MatchType::Exact => location.green().bold().to_string(),
            MatchType::Contains => location.bold().to_string(),
            MatchType::Fuzzy(_) => location,
        };
        ui::print_item(1, &format!("{} {}", label, format!("({})", result.section).dimmed()));
    }
    Ok(())
}
