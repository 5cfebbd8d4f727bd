use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use color_eyre::eyre::{anyhow, Context};
use color_eyre::Result;
use serde_json::Value;

/// One configured classification rule.
///
/// `pattern` is a literal substring searched for anywhere in a statement
/// line; `page` and `category` are the reporting buckets the match lands in.
/// `label` is the friendly display name, `None` when the config left it null.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryRule {
    pub pattern: String,
    pub page: String,
    pub category: String,
    pub label: Option<String>,
}

impl CategoryRule {
    /// The name shown for this rule in listings: the label, or the raw
    /// pattern when no label was configured.
    pub fn display_label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.pattern)
    }
}

/// An ordered index of category rules.
///
/// The configuration file is a JSON object of the shape
/// `{ page: { category: { pattern: label-or-null } } }`. Object order is
/// preserved on load and decides match precedence: the first rule whose
/// pattern occurs in a line wins, and a line matches at most one rule.
#[derive(Debug, Default)]
pub struct CategoryIndex {
    rules: Vec<CategoryRule>,
}

impl CategoryIndex {
    pub fn from_path(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("Could not open categories file {path:?}"))?;
        let config: serde_json::Map<String, Value> = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("Could not parse categories file {path:?}"))?;
        Self::from_config(&config)
    }

    fn from_config(config: &serde_json::Map<String, Value>) -> Result<Self> {
        let mut rules = Vec::new();
        for (page, page_categories) in config {
            let page_categories = page_categories
                .as_object()
                .ok_or_else(|| anyhow!("Page '{page}' is not an object of categories"))?;
            for (category, patterns) in page_categories {
                let patterns = patterns.as_object().ok_or_else(|| {
                    anyhow!("Category '{page}/{category}' is not an object of patterns")
                })?;
                for (pattern, label) in patterns {
                    let label = match label {
                        Value::Null => None,
                        Value::String(label) => Some(label.clone()),
                        other => {
                            return Err(anyhow!(
                                "Label for pattern '{pattern}' must be a string or null, got {other}"
                            ))
                        }
                    };
                    rules.push(CategoryRule {
                        pattern: pattern.clone(),
                        page: page.clone(),
                        category: category.clone(),
                        label,
                    });
                }
            }
        }
        Ok(Self { rules })
    }

    /// The first rule, in configured order, whose pattern occurs anywhere in
    /// `line`.
    pub fn matching(&self, line: &str) -> Option<&CategoryRule> {
        self.rules.iter().find(|rule| line.contains(&rule.pattern))
    }

    pub fn iter(&self) -> impl Iterator<Item = &CategoryRule> {
        self.rules.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
