//! Vertical card display for a single page.
//!
//! Properties are printed in name order with type-aware formatting, followed
//! by the page content converted to text.

use pagebot_core::{Block, blocks_to_text};
use pagebot_notion::page;
use serde_json::Value;

const MAX_LIST_ITEMS: usize = 10;

/// Print a page's properties and content as a card.
pub fn print_page(page_obj: &Value, blocks: &[Value], status_property: &str) {
    let title = page::page_title(page_obj).unwrap_or_default();
    let id = page_obj.get("id").and_then(Value::as_str).unwrap_or("-");

    println!("=== {} ===", if title.is_empty() { id } else { title.as_str() });
    println!("  {:<26} {}", "id", id);
    if let Some(edited) = page::last_edited_time(page_obj) {
        println!("  {:<26} {}", "last edited", edited);
    }
    println!(
        "  {:<26} {}",
        status_property,
        page::page_status(page_obj, status_property)
    );
    println!();

    let properties = page::render_properties(page_obj, &[status_property]);
    if !properties.is_empty() {
        println!("Properties");
        for (name, value) in &properties {
            if let Some(rendered) = render_value(value) {
                println!("  {:<26} {}", name, rendered);
            }
        }
        println!();
    }

    let parsed: Vec<Block> = blocks.iter().map(Block::from_json).collect();
    let skipped = parsed
        .iter()
        .filter(|b| matches!(b, Block::Unsupported(_)))
        .count();
    let text = blocks_to_text(&parsed);
    println!("Content ({} blocks, {} unsupported)", blocks.len(), skipped);
    if !text.is_empty() {
        for line in text.lines() {
            println!("  {line}");
        }
    }
}

/// One-line rendering of a simplified property value; `None` hides it.
fn render_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(if *b { "yes" } else { "no" }.to_string()),
        Value::Array(items) if items.is_empty() => None,
        Value::Array(items) => {
            let mut shown: Vec<String> = items
                .iter()
                .take(MAX_LIST_ITEMS)
                .filter_map(render_value)
                .collect();
            if items.len() > MAX_LIST_ITEMS {
                shown.push(format!("... and {} more", items.len() - MAX_LIST_ITEMS));
            }
            Some(shown.join(", "))
        }
        Value::Object(map) => match (map.get("start"), map.get("end")) {
            (Some(Value::String(start)), Some(Value::String(end))) => {
                Some(format!("{start} → {end}"))
            }
            (Some(Value::String(start)), _) => Some(start.clone()),
            _ => Some(value.to_string()),
        },
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn renders_scalars_and_lists() {
        assert_eq!(render_value(&json!(null)), None);
        assert_eq!(render_value(&json!("")), None);
        assert_eq!(render_value(&json!(true)).as_deref(), Some("yes"));
        assert_eq!(render_value(&json!(4.5)).as_deref(), Some("4.5"));
        assert_eq!(
            render_value(&json!(["fashion", "eu"])).as_deref(),
            Some("fashion, eu")
        );
    }

    #[test]
    fn renders_date_ranges() {
        assert_eq!(
            render_value(&json!({"start": "2025-06-01", "end": null})).as_deref(),
            Some("2025-06-01")
        );
        assert_eq!(
            render_value(&json!({"start": "2025-06-01", "end": "2025-06-30"})).as_deref(),
            Some("2025-06-01 → 2025-06-30")
        );
    }

    #[test]
    fn long_lists_are_truncated() {
        let items: Vec<String> = (0..12).map(|i| i.to_string()).collect();
        let rendered = render_value(&json!(items)).unwrap();
        assert!(rendered.ends_with("... and 2 more"));
    }
}
