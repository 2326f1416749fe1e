//! Control inventory capture
//!
//! Snapshots the interactive controls of a page into a compact JSON list so
//! that locator drift on the portal can be spotted without re-running the
//! whole scenario. The browser returns every attribute of every matching
//! control; filtering and normalization happen here.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::driver::{LoadState, PageDriver};
use crate::error::E2eResult;
use crate::locator::Locator;

/// CSS selector the driver uses to collect raw controls
pub const CONTROL_SELECTOR: &str = "button, a, input, textarea, select, option, label, summary, details, \
     [role=button], [role=link], [role=textbox], [role=searchbox], \
     [role=combobox], [role=listbox], [role=checkbox], [role=radio], \
     [role=tab], [role=menuitem]";

/// Attributes worth keeping for building selectors
const KEEP_ATTRS: &[&str] = &[
    "id",
    "name",
    "type",
    "placeholder",
    "value",
    "href",
    "for",
    "role",
    "aria-label",
    "aria-labelledby",
    "aria-describedby",
    "data-testid",
    "data-test",
    "data-qa",
];

pub const DEFAULT_MAX_TEXT_LEN: usize = 80;

/// One interactive control
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ControlItem {
    pub tag: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attrs: BTreeMap<String, String>,
}

/// Collapse runs of whitespace and trim
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn is_hidden(item: &ControlItem) -> bool {
    if item
        .attrs
        .get("aria-hidden")
        .map(|v| v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
    {
        return true;
    }
    item.tag.eq_ignore_ascii_case("input")
        && item
            .attrs
            .get("type")
            .map(|t| t.eq_ignore_ascii_case("hidden"))
            .unwrap_or(false)
}

fn keep_attr(name: &str) -> bool {
    KEEP_ATTRS.contains(&name) || name.starts_with("data-test")
}

fn truncate(text: String, max_len: usize) -> String {
    if max_len == 0 || text.chars().count() <= max_len {
        return text;
    }
    let mut out: String = text.chars().take(max_len - 1).collect();
    out.push('…');
    out
}

/// Drop hidden controls, keeping every attribute of the rest
///
/// Locator audits run on this list: `title`, `multiple` and other attributes
/// the compact inventory strips still count for roles and accessible names.
pub fn visible_controls(raw: Vec<ControlItem>) -> Vec<ControlItem> {
    raw.into_iter().filter(|item| !is_hidden(item)).collect()
}

/// Filter raw controls down to the compact inventory
pub fn extract_inventory(raw: Vec<ControlItem>, max_text_len: usize) -> Vec<ControlItem> {
    raw.into_iter()
        .filter(|item| !is_hidden(item))
        .filter_map(|item| {
            let text = item
                .text
                .as_deref()
                .map(normalize_text)
                .filter(|t| !t.is_empty())
                .map(|t| truncate(t, max_text_len));

            let attrs: BTreeMap<String, String> = item
                .attrs
                .into_iter()
                .filter(|(k, _)| keep_attr(k))
                .collect();

            if text.is_none() && attrs.is_empty() {
                return None;
            }

            Some(ControlItem {
                tag: item.tag.to_lowercase(),
                text,
                attrs,
            })
        })
        .collect()
}

/// Compact single-line JSON, non-ASCII kept as-is
pub fn inventory_to_json(items: &[ControlItem]) -> E2eResult<String> {
    Ok(serde_json::to_string(items)?)
}

/// How one locator fares against an inventory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocatorAudit {
    pub label: String,
    pub locator: String,
    pub matches: usize,
}

impl LocatorAudit {
    /// Exactly one match is the only resolvable outcome
    pub fn resolves(&self) -> bool {
        self.matches == 1
    }
}

/// Count how many inventory items each named locator resolves to
pub fn audit(items: &[ControlItem], locators: &[(&str, &Locator)]) -> Vec<LocatorAudit> {
    locators
        .iter()
        .map(|(label, locator)| LocatorAudit {
            label: label.to_string(),
            locator: locator.to_string(),
            matches: locator.count_in(items),
        })
        .collect()
}

/// Files written by [`capture`]
#[derive(Debug, Clone)]
pub struct InventoryCapture {
    pub html_path: PathBuf,
    pub inventory_path: PathBuf,

    /// Compact inventory as written to `inventory_path`
    pub items: Vec<ControlItem>,

    /// Visible controls with all attributes, for [`audit`]
    pub visible: Vec<ControlItem>,
}

/// Load `url`, then save its HTML and control inventory under `output_dir`
pub async fn capture(
    driver: &mut dyn PageDriver,
    url: &str,
    output_dir: &Path,
    max_text_len: usize,
) -> E2eResult<InventoryCapture> {
    std::fs::create_dir_all(output_dir)?;

    driver.goto(url, LoadState::NetworkIdle).await?;

    let html = driver.content().await?;
    let html_path = output_dir.join("page.html");
    std::fs::write(&html_path, html)?;

    let visible = visible_controls(driver.controls().await?);
    let items = extract_inventory(visible.clone(), max_text_len);
    let inventory_path = output_dir.join("controls_inventory.json");
    std::fs::write(&inventory_path, inventory_to_json(&items)?)?;

    info!(
        "Captured {} control(s) from {} into {}",
        items.len(),
        url,
        output_dir.display()
    );

    Ok(InventoryCapture {
        html_path,
        inventory_path,
        items,
        visible,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(tag: &str, text: &str, attrs: &[(&str, &str)]) -> ControlItem {
        ControlItem {
            tag: tag.to_string(),
            text: Some(text.to_string()),
            attrs: attrs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    #[test]
    fn test_hidden_controls_are_dropped() {
        let items = extract_inventory(
            vec![
                raw("input", "", &[("type", "hidden"), ("name", "csrf")]),
                raw("button", "Close", &[("aria-hidden", "TRUE")]),
                raw("button", "Agree", &[]),
            ],
            DEFAULT_MAX_TEXT_LEN,
        );
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].text.as_deref(), Some("Agree"));
    }

    #[test]
    fn test_attributes_are_filtered() {
        let items = extract_inventory(
            vec![raw(
                "INPUT",
                "",
                &[
                    ("class", "form-control"),
                    ("style", "width: 100%"),
                    ("placeholder", "Password"),
                    ("data-testid", "pw"),
                    ("data-test-id", "pw2"),
                    ("data-cy", "x"),
                ],
            )],
            DEFAULT_MAX_TEXT_LEN,
        );
        let attrs: Vec<&str> = items[0].attrs.keys().map(String::as_str).collect();
        assert_eq!(attrs, vec!["data-test-id", "data-testid", "placeholder"]);
        assert_eq!(items[0].tag, "input");
        assert_eq!(items[0].text, None);
    }

    #[test]
    fn test_empty_controls_are_dropped() {
        let items = extract_inventory(vec![raw("label", "   ", &[("class", "x")])], 80);
        assert!(items.is_empty());
    }

    #[test]
    fn test_long_text_is_truncated_with_ellipsis() {
        let long = "word ".repeat(40);
        let items = extract_inventory(vec![raw("a", &long, &[("href", "/")])], 10);
        let text = items[0].text.as_deref().unwrap();
        assert_eq!(text.chars().count(), 10);
        assert!(text.ends_with('…'));
    }

    #[test]
    fn test_compact_json_shape() {
        let items = vec![
            ControlItem {
                tag: "button".into(),
                text: Some("تسجيل الدخول".into()),
                attrs: BTreeMap::new(),
            },
            ControlItem {
                tag: "input".into(),
                text: None,
                attrs: [("placeholder".to_string(), "Password".to_string())].into(),
            },
        ];
        let json = inventory_to_json(&items).unwrap();
        assert_eq!(
            json,
            r#"[{"tag":"button","text":"تسجيل الدخول"},{"tag":"input","attrs":{"placeholder":"Password"}}]"#
        );
    }

    #[test]
    fn test_audit_counts_matches() {
        let items = extract_inventory(
            vec![
                raw("button", "Log in", &[]),
                raw("input", "", &[("placeholder", "Password")]),
            ],
            80,
        );
        let login = Locator::role("button", "log in").exact();
        let agree = Locator::role("button", "agree").exact();
        let report = audit(&items, &[("submit", &login), ("consent", &agree)]);
        assert!(report[0].resolves());
        assert_eq!(report[1].matches, 0);
        assert!(!report[1].resolves());
    }
}
