//! Helpers over raw page JSON: property reads, simplified rendering, and
//! payload builders for writes.

use pagebot_core::PageStatus;
use pagebot_core::blocks::{rich_text_to_string, text_runs};
use serde_json::{Map, Value, json};

/// Name of the selected option of a `select` (or `status`) property.
pub fn select_name<'a>(page: &'a Value, property: &str) -> Option<&'a str> {
    let prop = page.get("properties")?.get(property)?;
    let kind = prop.get("type").and_then(Value::as_str)?;
    if kind != "select" && kind != "status" {
        return None;
    }
    prop.get(kind)?.get("name")?.as_str()
}

/// Status stored in `property`; absent or non-select is [`PageStatus::Unset`].
pub fn page_status(page: &Value, property: &str) -> PageStatus {
    PageStatus::from_label(select_name(page, property))
}

/// Fencing token for conditional writes.
pub fn last_edited_time(page: &Value) -> Option<&str> {
    page.get("last_edited_time")?.as_str()
}

/// Properties payload setting `property` to `status`.
pub fn status_payload(property: &str, status: &PageStatus) -> Value {
    let select = match status.label() {
        Some(name) => json!({ "name": name }),
        None => Value::Null,
    };
    json!({ property: { "select": select } })
}

/// A code block holding `content`, split into store-sized text runs.
pub fn code_block(content: &str, language: &str) -> Value {
    json!({
        "object": "block",
        "type": "code",
        "code": {
            "rich_text": text_runs(content),
            "language": language,
        },
    })
}

/// Title of the page, from whichever property has type `title`.
pub fn page_title(page: &Value) -> Option<String> {
    page.get("properties")?
        .as_object()?
        .values()
        .find(|p| p.get("type").and_then(Value::as_str) == Some("title"))
        .and_then(|p| p.get("title"))
        .and_then(Value::as_array)
        .map(|runs| rich_text_to_string(runs))
}

/// Flatten typed property objects into plain JSON values, skipping
/// `exclude`. Keys come out sorted.
pub fn render_properties(page: &Value, exclude: &[&str]) -> Map<String, Value> {
    let mut out = Map::new();
    let Some(props) = page.get("properties").and_then(Value::as_object) else {
        return out;
    };
    for (name, prop) in props {
        if exclude.contains(&name.as_str()) {
            continue;
        }
        out.insert(name.clone(), render_property(prop));
    }
    out
}

fn render_property(prop: &Value) -> Value {
    let Some(kind) = prop.get("type").and_then(Value::as_str) else {
        return prop.clone();
    };
    let body = prop.get(kind).unwrap_or(&Value::Null);
    match kind {
        "title" | "rich_text" => body
            .as_array()
            .map(|runs| Value::String(rich_text_to_string(runs)))
            .unwrap_or(Value::Null),
        "select" | "status" => body.get("name").cloned().unwrap_or(Value::Null),
        "multi_select" => Value::Array(
            body.as_array()
                .map(|opts| opts.iter().filter_map(|o| o.get("name").cloned()).collect())
                .unwrap_or_default(),
        ),
        "date" => {
            if body.is_null() {
                Value::Null
            } else {
                json!({ "start": body.get("start"), "end": body.get("end") })
            }
        }
        _ => body.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STATUS: &str = "Joko Bot - Status";

    fn page() -> Value {
        json!({
            "id": "p1",
            "last_edited_time": "2025-05-18T11:13:00.000Z",
            "properties": {
                "Name": {"type": "title", "title": [
                    {"type": "text", "text": {"content": "Acme "}},
                    {"type": "text", "text": {"content": "Store"}}
                ]},
                STATUS: {"type": "select", "select": {"name": "Ready for Analysis"}},
                "Tags": {"type": "multi_select", "multi_select": [{"name": "fashion"}, {"name": "eu"}]},
                "Website": {"type": "url", "url": "https://acme.example"},
                "Active": {"type": "checkbox", "checkbox": true},
                "Launch": {"type": "date", "date": {"start": "2025-06-01", "end": null}},
                "Rate": {"type": "number", "number": 4.5},
                "Notes": {"type": "rich_text", "rich_text": []},
                "Owner": {"type": "people", "people": [{"id": "u1"}]}
            }
        })
    }

    #[test]
    fn reads_select_status() {
        assert_eq!(page_status(&page(), STATUS), PageStatus::ReadyForAnalysis);
        assert_eq!(page_status(&page(), "Missing"), PageStatus::Unset);
    }

    #[test]
    fn empty_select_is_unset() {
        let p = json!({"properties": {STATUS: {"type": "select", "select": null}}});
        assert_eq!(page_status(&p, STATUS), PageStatus::Unset);
    }

    #[test]
    fn non_select_property_is_unset() {
        assert_eq!(page_status(&page(), "Website"), PageStatus::Unset);
    }

    #[test]
    fn status_payload_shape() {
        assert_eq!(
            status_payload(STATUS, &PageStatus::InProgress),
            json!({STATUS: {"select": {"name": "In Progress"}}})
        );
        assert_eq!(
            status_payload(STATUS, &PageStatus::Unset),
            json!({STATUS: {"select": null}})
        );
    }

    #[test]
    fn renders_simplified_properties() {
        let rendered = render_properties(&page(), &[STATUS]);
        assert!(!rendered.contains_key(STATUS));
        assert_eq!(rendered["Name"], "Acme Store");
        assert_eq!(rendered["Tags"], json!(["fashion", "eu"]));
        assert_eq!(rendered["Website"], "https://acme.example");
        assert_eq!(rendered["Active"], true);
        assert_eq!(rendered["Launch"], json!({"start": "2025-06-01", "end": null}));
        assert_eq!(rendered["Rate"], 4.5);
        assert_eq!(rendered["Notes"], "");
        assert_eq!(rendered["Owner"], json!([{"id": "u1"}]));
    }

    #[test]
    fn title_and_fence() {
        assert_eq!(page_title(&page()).as_deref(), Some("Acme Store"));
        assert_eq!(last_edited_time(&page()), Some("2025-05-18T11:13:00.000Z"));
    }

    #[test]
    fn code_block_shape() {
        let block = code_block("{\"a\": 1}", "json");
        assert_eq!(block["type"], "code");
        assert_eq!(block["code"]["language"], "json");
        assert_eq!(block["code"]["rich_text"][0]["text"]["content"], "{\"a\": 1}");
    }
}
