//! Declarative element queries
//!
//! A [`Locator`] is resolved by the browser when the Playwright driver runs it,
//! and by [`Locator::matches`] when it is checked against a captured control
//! inventory. Both paths use the same rules: text comparisons are
//! case-insensitive with whitespace collapsed, `exact` means whole-string
//! equality and anything else is a substring match.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::inventory::ControlItem;

/// Query for a single element on the current page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Locator {
    /// ARIA role, optionally narrowed by accessible name
    Role {
        role: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        #[serde(default)]
        exact: bool,
    },

    /// Input or textarea by its placeholder attribute
    Placeholder {
        placeholder: String,
        #[serde(default)]
        exact: bool,
    },

    /// Element by visible text
    Text {
        text: String,
        #[serde(default)]
        exact: bool,
    },
}

impl Locator {
    /// Role locator with an accessible-name substring filter
    pub fn role(role: impl Into<String>, name: impl Into<String>) -> Self {
        Locator::Role {
            role: role.into(),
            name: Some(name.into()),
            exact: false,
        }
    }

    pub fn placeholder(text: impl Into<String>) -> Self {
        Locator::Placeholder {
            placeholder: text.into(),
            exact: false,
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Locator::Text {
            text: text.into(),
            exact: false,
        }
    }

    /// Require whole-string equality instead of substring matching
    pub fn exact(self) -> Self {
        match self {
            Locator::Role { role, name, .. } => Locator::Role {
                role,
                name,
                exact: true,
            },
            Locator::Placeholder { placeholder, .. } => Locator::Placeholder {
                placeholder,
                exact: true,
            },
            Locator::Text { text, .. } => Locator::Text { text, exact: true },
        }
    }

    /// Whether a captured control satisfies this query
    pub fn matches(&self, item: &ControlItem) -> bool {
        match self {
            Locator::Role { role, name, exact } => {
                let Some(actual) = implicit_role(item) else {
                    return false;
                };
                if !actual.eq_ignore_ascii_case(role) {
                    return false;
                }
                match name {
                    Some(name) => accessible_name(item)
                        .map(|accessible| text_matches(&accessible, name, *exact))
                        .unwrap_or(false),
                    None => true,
                }
            }
            Locator::Placeholder { placeholder, exact } => item
                .attrs
                .get("placeholder")
                .map(|value| text_matches(value, placeholder, *exact))
                .unwrap_or(false),
            Locator::Text { text, exact } => item
                .text
                .as_deref()
                .map(|value| text_matches(value, text, *exact))
                .unwrap_or(false),
        }
    }

    /// Number of controls in `items` this locator resolves to
    pub fn count_in(&self, items: &[ControlItem]) -> usize {
        items.iter().filter(|item| self.matches(item)).count()
    }

    /// Form sent to the browser driver, with every text already compiled to a pattern
    pub fn wire(&self) -> Value {
        match self {
            Locator::Role { role, name, exact } => json!({
                "by": "role",
                "role": role,
                "name": name.as_deref().map(|n| TextPattern::new(n, *exact)),
            }),
            Locator::Placeholder { placeholder, exact } => json!({
                "by": "placeholder",
                "pattern": TextPattern::new(placeholder, *exact),
            }),
            Locator::Text { text, exact } => json!({
                "by": "text",
                "pattern": TextPattern::new(text, *exact),
            }),
        }
    }
}

/// Regular expression the driver hands to Playwright as `new RegExp(source, flags)`
///
/// Follows the same rules as [`text_matches`]: case-insensitive, any run of
/// whitespace matches any other, `exact` anchors both ends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TextPattern {
    pub source: String,
    pub flags: &'static str,
}

impl TextPattern {
    pub fn new(text: &str, exact: bool) -> Self {
        let body = text
            .split_whitespace()
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join(r"\s+");
        let source = if exact {
            format!(r"^\s*{}\s*$", body)
        } else {
            body
        };
        Self { source, flags: "i" }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = |exact: bool| if exact { "=" } else { "~=" };
        match self {
            Locator::Role {
                role,
                name: Some(name),
                exact,
            } => write!(f, "role={}[name{}\"{}\" i]", role, op(*exact), name),
            Locator::Role { role, name: None, .. } => write!(f, "role={}", role),
            Locator::Placeholder { placeholder, exact } => {
                write!(f, "placeholder{}\"{}\" i", op(*exact), placeholder)
            }
            Locator::Text { text, exact } => write!(f, "text{}\"{}\" i", op(*exact), text),
        }
    }
}

/// Lowercase and collapse runs of whitespace
pub fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Case-insensitive comparison of `candidate` against `pattern`
pub fn text_matches(candidate: &str, pattern: &str, exact: bool) -> bool {
    let candidate = normalize(candidate);
    let pattern = normalize(pattern);
    if exact {
        candidate == pattern
    } else {
        candidate.contains(&pattern)
    }
}

/// ARIA role of a control, explicit or implied by its tag
pub fn implicit_role(item: &ControlItem) -> Option<String> {
    if let Some(role) = item.attrs.get("role") {
        if let Some(first) = role.split_whitespace().next() {
            return Some(first.to_lowercase());
        }
    }

    let input_type = item
        .attrs
        .get("type")
        .map(|t| t.to_lowercase())
        .unwrap_or_else(|| "text".to_string());

    let role = match item.tag.to_lowercase().as_str() {
        "button" => "button",
        "a" if item.attrs.contains_key("href") => "link",
        "textarea" => "textbox",
        "select" if item.attrs.contains_key("multiple") => "listbox",
        "select" => "combobox",
        "option" => "option",
        "details" => "group",
        "input" => match input_type.as_str() {
            "button" | "submit" | "reset" | "image" => "button",
            "checkbox" => "checkbox",
            "radio" => "radio",
            "search" => "searchbox",
            "number" => "spinbutton",
            "range" => "slider",
            "hidden" | "password" | "file" | "color" | "date" | "time" => return None,
            _ => "textbox",
        },
        _ => return None,
    };
    Some(role.to_string())
}

/// Approximate accessible name: aria-label, then text, then type-specific fallbacks
pub fn accessible_name(item: &ControlItem) -> Option<String> {
    let non_empty = |s: &str| {
        let trimmed = s.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    };

    if let Some(label) = item.attrs.get("aria-label").and_then(|s| non_empty(s)) {
        return Some(label);
    }
    if let Some(text) = item.text.as_deref().and_then(non_empty) {
        return Some(text);
    }
    if item.tag.eq_ignore_ascii_case("input") {
        let input_type = item.attrs.get("type").map(|t| t.to_lowercase());
        match input_type.as_deref() {
            Some("button") | Some("submit") | Some("reset") => {
                if let Some(value) = item.attrs.get("value").and_then(|s| non_empty(s)) {
                    return Some(value);
                }
            }
            _ => {
                if let Some(ph) = item.attrs.get("placeholder").and_then(|s| non_empty(s)) {
                    return Some(ph);
                }
            }
        }
    }
    item.attrs.get("title").and_then(|s| non_empty(s))
}
