//! Core domain model and text rules for the pgseed wizards.

use serde::{Deserialize, Serialize};
use strsim::jaro_winkler;
use uuid::Uuid;

mod tree;

pub use tree::{CategoryTree, TreeNode};

pub const CRATE_NAME: &str = "pgseed-core";

/// Characters stripped from field names before comparison (whitespace is stripped too).
const FIELD_NAME_NOISE: &[char] = &['/', '-', '_', '(', ')', '.', ','];

/// Descriptions are cut to this many words.
pub const MAX_DESCRIPTION_WORDS: usize = 10;

/// Minimum Jaro-Winkler score for a "did you mean" suggestion.
pub const SUGGESTION_THRESHOLD: f64 = 0.85;

const PREVIEW_WIDTH: usize = 80;

/// A row of the form fields table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormField {
    pub id: String,
    pub field_name: String,
}

/// How the user identifies the fields to map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InputMode {
    FieldId,
    FieldName,
}

impl InputMode {
    /// Parses the menu choice (`1` or `2`).
    pub fn from_choice(choice: i64) -> Option<Self> {
        match choice {
            1 => Some(Self::FieldId),
            2 => Some(Self::FieldName),
            _ => None,
        }
    }
}

/// An input line resolved to an existing field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedField {
    pub id: String,
    pub field_name: String,
    pub input_name: String,
}

impl ResolvedField {
    pub fn from_field(field: &FormField, input_name: &str) -> Self {
        Self {
            id: field.id.clone(),
            field_name: field.field_name.clone(),
            input_name: input_name.to_string(),
        }
    }
}

/// A category waiting to be inserted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryDraft {
    pub name: String,
    pub description: String,
}

impl CategoryDraft {
    /// Builds a draft with a generated description.
    pub fn from_name(name: &str) -> Self {
        Self {
            name: name.to_string(),
            description: generate_description(name),
        }
    }
}

/// A category after insertion, carrying its database id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsertedCategory {
    pub id: Uuid,
    pub name: String,
}

/// Lowercases a field name and strips separators, punctuation and whitespace.
pub fn normalize_field_name(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .filter(|c| !c.is_whitespace() && !FIELD_NAME_NOISE.contains(c))
        .collect()
}

/// Finds the first field whose normalized name matches the normalized input.
pub fn resolve_by_name(fields: &[FormField], input: &str) -> Option<ResolvedField> {
    let wanted = normalize_field_name(input);
    fields
        .iter()
        .find(|field| normalize_field_name(&field.field_name) == wanted)
        .map(|field| ResolvedField::from_field(field, input))
}

/// Close field names for an input that did not resolve, best match first.
pub fn suggest_field_names(fields: &[FormField], input: &str, limit: usize) -> Vec<String> {
    let wanted = normalize_field_name(input);
    if wanted.is_empty() {
        return Vec::new();
    }

    let mut scored = fields
        .iter()
        .map(|field| {
            let score = jaro_winkler(&wanted, &normalize_field_name(&field.field_name));
            (score, field.field_name.as_str())
        })
        .filter(|(score, _)| *score >= SUGGESTION_THRESHOLD)
        .collect::<Vec<_>>();
    scored.sort_by(|a, b| b.0.total_cmp(&a.0));

    let mut out: Vec<String> = Vec::new();
    for (_, name) in scored {
        if out.len() == limit {
            break;
        }
        if !out.iter().any(|seen| seen == name) {
            out.push(name.to_string());
        }
    }
    out
}

/// Short description derived from a category name, at most ten words.
pub fn generate_description(category_name: &str) -> String {
    let clean = category_name.trim().to_lowercase();
    let templates = [
        format!("Category for managing {clean} related items"),
        format!("Contains all {clean} related entries"),
        format!("Handles {clean} classification and organization"),
        format!("Groups items related to {clean} topic"),
        format!("Organizes content under {clean} classification"),
    ];
    let picked = &templates[clean.chars().count() % templates.len()];

    let words = picked.split_whitespace().collect::<Vec<_>>();
    if words.len() > MAX_DESCRIPTION_WORDS {
        words[..MAX_DESCRIPTION_WORDS].join(" ")
    } else {
        picked.clone()
    }
}

/// True for the canonical `8-4-4-4-12` hexadecimal form.
pub fn is_hyphenated_uuid(value: &str) -> bool {
    // 36 chars rules out the simple, braced and urn encodings `Uuid::parse_str` also accepts.
    value.len() == 36 && Uuid::parse_str(value).is_ok()
}

/// Lowercases hyphenated UUIDs so they match `uuid::text`; other ids are only trimmed.
pub fn canonical_id(raw: &str) -> String {
    let trimmed = raw.trim();
    match Uuid::parse_str(trimmed) {
        Ok(id) if is_hyphenated_uuid(trimmed) => id.to_string(),
        _ => trimmed.to_string(),
    }
}

/// Text forms an id may take when compared as `id::text`: the canonical id,
/// plus the plain integer when the input is a padded or signed number.
pub fn id_lookup_keys(raw: &str) -> Vec<String> {
    let canonical = canonical_id(raw);
    let mut keys = vec![canonical.clone()];
    if let Ok(number) = canonical.parse::<i64>() {
        let plain = number.to_string();
        if plain != canonical {
            keys.push(plain);
        }
    }
    keys
}

/// Cuts `value` to `max` chars and appends `...` when it is longer.
pub fn truncate_display(value: &str, max: usize) -> String {
    if value.chars().count() > max {
        let head = value.chars().take(max).collect::<String>();
        format!("{head}...")
    } else {
        value.to_string()
    }
}

/// Renders the resolved-fields preview table shown before confirmation.
pub fn render_preview(fields: &[ResolvedField], mode: InputMode) -> String {
    let rule = "=".repeat(PREVIEW_WIDTH);
    let mut lines = vec![rule.clone(), "Resolved Fields Preview".to_string(), rule.clone()];

    match mode {
        InputMode::FieldId => {
            lines.push(format!("{:<40} | {:<35}", "Field ID", "Field Name"));
            lines.push("-".repeat(PREVIEW_WIDTH));
            for field in fields {
                lines.push(format!(
                    "{:<40} | {:<35}",
                    truncate_display(&field.id, 36),
                    field.field_name
                ));
            }
        }
        InputMode::FieldName => {
            lines.push(format!(
                "{:<25} | {:<30} | {:<20}",
                "Input Name", "Matched Field Name", "Field ID"
            ));
            lines.push("-".repeat(PREVIEW_WIDTH));
            for field in fields {
                lines.push(format!(
                    "{:<25} | {:<30} | {:<20}",
                    truncate_display(&field.input_name, 22),
                    truncate_display(&field.field_name, 27),
                    truncate_display(&field.id, 16)
                ));
            }
        }
    }

    lines.push(rule);
    lines.join("\n")
}
