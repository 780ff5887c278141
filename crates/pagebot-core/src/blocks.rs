//! Conversion between page content blocks and flat markdown-like text.
//!
//! Only three block kinds are understood: headings (levels 1-3), bulleted
//! list items, and paragraphs. Everything else is carried as
//! [`Block::Unsupported`] and dropped in both directions.
//!
//! Round-trip: for supported blocks with non-empty text,
//! `text_to_blocks(&blocks_to_text(&b)) == b`.

use serde_json::{Value, json};

/// Maximum characters in one rich-text run accepted by the document store.
pub const MAX_RICH_TEXT_CHARS: usize = 2000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    Heading { level: u8, text: String },
    BulletItem(String),
    Paragraph(String),
    /// Any block type outside the vocabulary, tagged with its type name.
    Unsupported(String),
}

impl Block {
    /// Text content, or `None` for unsupported blocks.
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Heading { text, .. } | Self::BulletItem(text) | Self::Paragraph(text) => {
                Some(text)
            }
            Self::Unsupported(_) => None,
        }
    }

    /// Parse a block object as returned by the document store.
    ///
    /// Multiple rich-text runs are concatenated with no separator.
    pub fn from_json(block: &Value) -> Self {
        let Some(kind) = block.get("type").and_then(Value::as_str) else {
            return Self::Unsupported(String::new());
        };
        let text = || {
            block
                .get(kind)
                .and_then(|body| body.get("rich_text"))
                .and_then(Value::as_array)
                .map(|runs| rich_text_to_string(runs))
                .unwrap_or_default()
        };
        match kind {
            "heading_1" => Self::Heading { level: 1, text: text() },
            "heading_2" => Self::Heading { level: 2, text: text() },
            "heading_3" => Self::Heading { level: 3, text: text() },
            "bulleted_list_item" => Self::BulletItem(text()),
            "paragraph" => Self::Paragraph(text()),
            other => Self::Unsupported(other.to_string()),
        }
    }
}

/// Concatenate the plain content of rich-text runs.
///
/// Reads `text.content` and falls back to `plain_text` (mentions and
/// equations only carry the latter).
pub fn rich_text_to_string(runs: &[Value]) -> String {
    runs.iter()
        .filter_map(|run| {
            run.get("text")
                .and_then(|t| t.get("content"))
                .or_else(|| run.get("plain_text"))
                .and_then(Value::as_str)
        })
        .collect()
}

/// Split text into rich-text runs no longer than [`MAX_RICH_TEXT_CHARS`].
pub fn text_runs(text: &str) -> Vec<Value> {
    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() {
        return vec![text_run("")];
    }
    chars
        .chunks(MAX_RICH_TEXT_CHARS)
        .map(|chunk| text_run(&chunk.iter().collect::<String>()))
        .collect()
}

fn text_run(content: &str) -> Value {
    json!({ "type": "text", "text": { "content": content } })
}

/// Render blocks as newline-separated text.
///
/// Unsupported blocks and blocks with empty text produce no line.
pub fn blocks_to_text(blocks: &[Block]) -> String {
    let mut lines = Vec::with_capacity(blocks.len());
    for block in blocks {
        if block.text().is_none_or(str::is_empty) {
            continue;
        }
        match block {
            Block::Heading { level, text } => {
                lines.push(format!("{} {text}", "#".repeat((*level).clamp(1, 3) as usize)));
            }
            Block::BulletItem(text) => lines.push(format!("- {text}")),
            Block::Paragraph(text) => lines.push(text.clone()),
            Block::Unsupported(_) => {}
        }
    }
    lines.join("\n")
}

/// Parse text line by line into blocks. Blank lines are skipped.
pub fn text_to_blocks(text: &str) -> Vec<Block> {
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            if let Some(rest) = line.strip_prefix("# ") {
                Block::Heading { level: 1, text: rest.to_string() }
            } else if let Some(rest) = line.strip_prefix("## ") {
                Block::Heading { level: 2, text: rest.to_string() }
            } else if let Some(rest) = line.strip_prefix("### ") {
                Block::Heading { level: 3, text: rest.to_string() }
            } else if let Some(rest) = line.strip_prefix("- ") {
                Block::BulletItem(rest.to_string())
            } else {
                Block::Paragraph(line.to_string())
            }
        })
        .collect()
}
