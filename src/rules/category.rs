//! Category rules: derive the category a stack is filed under.
//!
//! Frames are tried from the innermost application (non-stdlib) frame
//! outward toward the goroutine's entry point. The first `match` rule that
//! matches a non-skipped frame wins. Without a match the category is the
//! package root of that first application frame.

use log::warn;
use regex::Regex;

use super::stdlib::is_stdlib;
use crate::parser::Frame;
use crate::utils::config::FRAMELESS_CATEGORY;

#[derive(Debug, Clone)]
pub enum CategoryRule {
    Skip(String),
    Match { pattern: Regex, group: usize },
}

/// Parse one category rule line: `skip:PREFIX` or
/// `match:REGEX[#N][ -- comment]`
pub fn parse_category_rule(line: &str) -> Option<CategoryRule> {
    let line = line.trim();
    if line.is_empty() || line.starts_with("//") {
        return None;
    }

    let rule = match line.split_once(':') {
        Some(("skip", prefix)) if !prefix.is_empty() => Some(CategoryRule::Skip(prefix.to_string())),
        Some(("match", spec)) => parse_match(spec),
        _ => None,
    };

    if rule.is_none() {
        warn!("Dropping unparsable category rule '{}'", line);
    }
    rule
}

fn parse_match(spec: &str) -> Option<CategoryRule> {
    let spec = spec.split_once(" -- ").map_or(spec, |(head, _)| head).trim_end();

    let (pattern, group) = match spec.rsplit_once('#') {
        Some((pattern, n)) if !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()) => {
            (pattern, n.parse::<usize>().ok()?)
        }
        _ => (spec, 1),
    };

    if pattern.is_empty() {
        return None;
    }

    match Regex::new(pattern) {
        Ok(pattern) => Some(CategoryRule::Match { pattern, group }),
        Err(e) => {
            warn!("Invalid category pattern '{}': {}", pattern, e);
            None
        }
    }
}

/// Derive the category of a trace
///
/// **Public** - called by the collection whenever a stack is created or the
/// rules change
pub fn derive_category(trace: &[Frame], rules: &[CategoryRule], app_package: &str) -> String {
    let Some(first) = trace.first() else {
        return FRAMELESS_CATEGORY.to_string();
    };

    let candidates: Vec<&Frame> = trace
        .iter()
        .filter(|frame| {
            !rules.iter().any(|rule| {
                matches!(rule, CategoryRule::Skip(prefix) if frame.function.starts_with(prefix.as_str()))
            })
        })
        .collect();

    let start = candidates
        .iter()
        .position(|frame| !is_stdlib(&frame.function, app_package))
        .unwrap_or(0);

    for frame in candidates.iter().skip(start) {
        for rule in rules {
            let CategoryRule::Match { pattern, group } = rule else {
                continue;
            };
            if let Some(caps) = pattern.captures(&frame.function) {
                let selected = caps.get(*group).or_else(|| caps.get(0));
                if let Some(m) = selected {
                    return m.as_str().to_string();
                }
            }
        }
    }

    let anchor = candidates.get(start).copied().unwrap_or(first);
    default_category(&anchor.function).to_string()
}

/// Package root of a function name
///
/// * Domain-qualified paths keep the domain and first path element
///   (`github.com/user/repo.F` → `github.com/user`)
/// * Other paths keep their first element (`db/database.Query` → `db`)
/// * Unqualified names keep the package (`main.main` → `main`)
pub fn default_category(function: &str) -> &str {
    let first_dot = function.find('.');
    let Some(first_slash) = function.find('/') else {
        return first_dot.map_or(function, |dot| &function[..dot]);
    };

    let domain_qualified = first_dot.is_some_and(|dot| dot < first_slash);
    if !domain_qualified {
        return &function[..first_slash];
    }

    let rest = &function[first_slash + 1..];
    if let Some(second_slash) = rest.find('/') {
        return &function[..first_slash + 1 + second_slash];
    }
    match rest.find('.') {
        Some(dot) => &function[..first_slash + 1 + dot],
        None => function,
    }
}
