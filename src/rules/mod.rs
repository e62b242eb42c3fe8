//! Rule engine: stack names and categories.
//!
//! Rules are compiled once from [`Settings`] into an immutable, versioned
//! [`RuleSet`] snapshot. The collection re-derives every stack's name and
//! category when it receives a new snapshot; decoded data is never touched.

pub mod category;
pub mod stdlib;
pub mod title;

pub use category::{default_category, derive_category, parse_category_rule, CategoryRule};
pub use stdlib::is_stdlib;
pub use title::{derive_name, parse_title_rule, TitleRule, Trim, WhileCondition};

use crate::parser::Frame;
use crate::utils::config::DEFAULT_APP_PACKAGE;
use crate::utils::settings::Settings;
use log::debug;

/// Compiled title and category rules
#[derive(Debug, Clone)]
pub struct RuleSet {
    /// Bumped by the collection each time it adopts a new snapshot
    pub version: u64,
    pub app_package: String,
    pub title: Vec<TitleRule>,
    pub category: Vec<CategoryRule>,
}

impl Default for RuleSet {
    fn default() -> Self {
        Self {
            version: 0,
            app_package: DEFAULT_APP_PACKAGE.to_string(),
            title: Vec::new(),
            category: Vec::new(),
        }
    }
}

impl RuleSet {
    /// Compile rule lines; unparsable lines are dropped
    pub fn parse<S: AsRef<str>>(title: &[S], category: &[S], app_package: &str) -> Self {
        let title: Vec<TitleRule> = title
            .iter()
            .filter_map(|line| parse_title_rule(line.as_ref()))
            .collect();
        let category: Vec<CategoryRule> = category
            .iter()
            .filter_map(|line| parse_category_rule(line.as_ref()))
            .collect();

        debug!(
            "Compiled {} title rules and {} category rules",
            title.len(),
            category.len()
        );

        Self {
            version: 0,
            app_package: app_package.to_string(),
            title,
            category,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::parse(
            &settings.title_rules,
            &settings.category_rules,
            &settings.app_package,
        )
    }

    pub fn name(&self, trace: &[Frame]) -> String {
        derive_name(trace, &self.title, &self.app_package)
    }

    pub fn category(&self, trace: &[Frame]) -> String {
        derive_category(trace, &self.category, &self.app_package)
    }
}
