//! Classification request construction and response parsing.

use serde::Serialize;
use std::collections::HashMap;
use std::fmt::Write as _;

use super::ClassifyError;
use crate::categories::CategoryRegistry;

/// Raw provider output: category id → score, before thresholding.
pub type RawScores = HashMap<String, f64>;

/// One category as presented to the AI service.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryPrompt {
    pub id: String,
    pub name: String,
    pub description: String,
    pub keywords: Vec<String>,
}

/// Everything the service needs, passed explicitly on every call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationRequest {
    pub title: String,
    /// Body prefix, already truncated.
    pub content: String,
    pub categories: Vec<CategoryPrompt>,
    /// Scores at or below this are discarded by the caller; included as a hint.
    pub min_relevance: f64,
}

impl ClassificationRequest {
    pub fn new(title: &str, content: &str, categories: &CategoryRegistry, min_relevance: f64) -> Self {
        Self {
            title: title.to_string(),
            content: content.to_string(),
            categories: categories
                .iter()
                .map(|c| CategoryPrompt {
                    id: c.id.clone(),
                    name: c.name.clone(),
                    description: c.description.clone(),
                    keywords: c.keywords.clone(),
                })
                .collect(),
            min_relevance,
        }
    }
}

/// Borrow at most `max_chars` characters (never splits a code point).
pub fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

pub const SYSTEM_PROMPT: &str = "You classify developer blog articles into a fixed set of categories. \
Reply with a single JSON object mapping category id to an integer relevance score from 0 to 100. \
Output only the JSON object.";

pub fn build_prompt(req: &ClassificationRequest) -> String {
    let mut out = String::with_capacity(req.content.len() + 1024);
    out.push_str("Score how relevant this developer blog article is to each category (0-100).\n\n");
    let _ = writeln!(out, "Title: {}", req.title);
    let _ = writeln!(out, "Content:\n{}\n", req.content);
    out.push_str("Categories:\n");
    for (i, c) in req.categories.iter().enumerate() {
        let _ = write!(out, "{}. {} ({}) - {}", i + 1, c.id, c.name, c.description);
        if !c.keywords.is_empty() {
            let _ = write!(out, " [keywords: {}]", c.keywords.join(", "));
        }
        out.push('\n');
    }
    let _ = write!(
        out,
        "\nReply as JSON: {{\"category_id\": score, ...}}. Only include categories scoring above {}.",
        req.min_relevance
    );
    out
}

/// Extract scores from a reply that may wrap the JSON object in prose or code fences.
/// Accepts `{"id": 72}`, `{"id": "72%"}`, and `{"scores": {...}}`.
pub fn parse_scores(reply: &str) -> Result<RawScores, ClassifyError> {
    let start = reply.find('{');
    let end = reply.rfind('}');
    let (start, end) = match (start, end) {
        (Some(s), Some(e)) if s < e => (s, e),
        _ => {
            return Err(ClassifyError::Unparseable(
                "no JSON object in reply".to_string(),
            ))
        }
    };

    let value: serde_json::Value = serde_json::from_str(&reply[start..=end])
        .map_err(|e| ClassifyError::Unparseable(e.to_string()))?;

    let obj = match value.get("scores") {
        Some(inner) if inner.is_object() => inner.as_object(),
        _ => value.as_object(),
    }
    .ok_or_else(|| ClassifyError::Unparseable("reply is not a JSON object".to_string()))?;

    let mut out = RawScores::with_capacity(obj.len());
    for (k, v) in obj {
        let score = match v {
            serde_json::Value::Number(n) => n.as_f64(),
            serde_json::Value::String(s) => s.trim().trim_end_matches('%').trim().parse::<f64>().ok(),
            _ => None,
        };
        match score {
            Some(s) if s.is_finite() => {
                out.insert(k.trim().to_string(), s);
            }
            _ => {
                return Err(ClassifyError::Unparseable(format!(
                    "score for '{k}' is not a number"
                )))
            }
        }
    }
    Ok(out)
}
