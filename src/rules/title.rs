//! Title rules: derive a short display name from a call stack.
//!
//! Rules are evaluated against the trace innermost frame first. `skip` and
//! `fold` consume frames, `find` only looks ahead, and the first frame that
//! no rule consumes becomes the base of the name. `trim` rules rewrite the
//! chosen base. Suffixes queued by `fold`/`find` follow the base, ordered by
//! rule position:
//!
//! ```text
//! skip:runtime.
//! foldstdlib:sync.(*Mutex).Lock->mutex
//! [runtime.gopark, sync.(*Mutex).lockSlow, sync.(*Mutex).Lock, main.flush]
//!     => "main.flush → mutex"
//! ```

use log::warn;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use super::stdlib::is_stdlib;
use crate::parser::Frame;
use crate::utils::config::{EMPTY_STACK_NAME, SUFFIX_SEPARATOR};

/// Condition bounding a `fold`/`find` scan
#[derive(Debug, Clone)]
pub enum WhileCondition {
    /// Function starts with the prefix
    Prefix(String),
    /// Function is standard library code
    StdLib,
}

impl WhileCondition {
    fn holds(&self, function: &str, app_package: &str) -> bool {
        match self {
            WhileCondition::Prefix(prefix) => function.starts_with(prefix.as_str()),
            WhileCondition::StdLib => is_stdlib(function, app_package),
        }
    }
}

/// Rewrite applied to the chosen base function
#[derive(Debug, Clone)]
pub enum Trim {
    Prefix(String),
    Substitute { pattern: Regex, replacement: String },
}

impl Trim {
    fn apply(&self, function: &str) -> String {
        match self {
            Trim::Prefix(prefix) => function
                .strip_prefix(prefix.as_str())
                .unwrap_or(function)
                .to_string(),
            Trim::Substitute {
                pattern,
                replacement,
            } => pattern.replace(function, replacement.as_str()).into_owned(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum TitleRule {
    Skip(String),
    Trim(Trim),
    Fold {
        pattern: String,
        suffix: String,
        while_condition: Option<WhileCondition>,
    },
    Find {
        pattern: String,
        suffix: String,
        while_condition: Option<WhileCondition>,
    },
}

/// Parse one title rule line
///
/// Returns `None` for blank lines, `//` comments and unparsable rules; the
/// latter are logged and dropped.
pub fn parse_title_rule(line: &str) -> Option<TitleRule> {
    let line = line.trim();
    if line.is_empty() || line.starts_with("//") {
        return None;
    }

    let rule = match line.split_once(':') {
        Some(("skip", prefix)) if !prefix.is_empty() => Some(TitleRule::Skip(prefix.to_string())),
        Some(("trim", spec)) if !spec.is_empty() => parse_trim(spec).map(TitleRule::Trim),
        Some(("fold", spec)) => parse_suffix_rule(spec).map(|(pattern, suffix, while_condition)| {
            TitleRule::Fold {
                pattern,
                suffix,
                while_condition,
            }
        }),
        Some(("find", spec)) => parse_suffix_rule(spec).map(|(pattern, suffix, while_condition)| {
            TitleRule::Find {
                pattern,
                suffix,
                while_condition,
            }
        }),
        Some(("foldstdlib", spec)) => spec.split_once("->").and_then(|(pattern, suffix)| {
            (!pattern.is_empty()).then(|| TitleRule::Fold {
                pattern: pattern.to_string(),
                suffix: suffix.to_string(),
                while_condition: Some(WhileCondition::StdLib),
            })
        }),
        _ => None,
    };

    if rule.is_none() {
        warn!("Dropping unparsable title rule '{}'", line);
    }
    rule
}

/// `PATTERN->SUFFIX[,while:PREFIX]`
fn parse_suffix_rule(spec: &str) -> Option<(String, String, Option<WhileCondition>)> {
    let (pattern, rest) = spec.split_once("->")?;
    if pattern.is_empty() {
        return None;
    }
    let (suffix, while_condition) = match rest.split_once(",while:") {
        Some((suffix, cond)) if !cond.is_empty() => {
            (suffix, Some(WhileCondition::Prefix(cond.to_string())))
        }
        Some(_) => return None,
        None => (rest, None),
    };
    Some((pattern.to_string(), suffix.to_string(), while_condition))
}

static GROUP_REF_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\$|\$(\d+)").expect("group reference pattern is valid"));

/// Brace every numeric group reference so `$1_x` means group 1 followed by
/// `_x` rather than a group named `1_x`
fn brace_group_refs(replacement: &str) -> String {
    GROUP_REF_RE
        .replace_all(replacement, |caps: &Captures<'_>| match caps.get(1) {
            Some(n) => format!("${{{}}}", n.as_str()),
            None => "$$".to_string(),
        })
        .into_owned()
}

/// A literal prefix, or `s<d>pattern<d>replacement<d>`
fn parse_trim(spec: &str) -> Option<Trim> {
    let mut chars = spec.chars();
    if let (Some('s'), Some(delim)) = (chars.next(), chars.next()) {
        let width = delim.len_utf8();
        if !delim.is_alphanumeric()
            && !delim.is_whitespace()
            && spec.len() >= 1 + 2 * width
            && spec.ends_with(delim)
        {
            let body = &spec[1 + width..spec.len() - width];
            let parts: Vec<&str> = body.split(delim).collect();
            if let [pattern, replacement] = parts.as_slice() {
                return match Regex::new(pattern) {
                    Ok(pattern) => Some(Trim::Substitute {
                        pattern,
                        replacement: brace_group_refs(replacement),
                    }),
                    Err(e) => {
                        warn!("Invalid trim pattern '{}': {}", spec, e);
                        None
                    }
                };
            }
        }
    }
    Some(Trim::Prefix(spec.to_string()))
}

/// Derive the display name of a trace
///
/// **Public** - called by the collection whenever a stack is created or the
/// rules change
///
/// # Returns
/// * `"empty"` for an empty trace
/// * The last frame (trimmed) when every frame was skipped or folded
pub fn derive_name(trace: &[Frame], rules: &[TitleRule], app_package: &str) -> String {
    let Some(last) = trace.last() else {
        return EMPTY_STACK_NAME.to_string();
    };

    let mut suffixes: Vec<(usize, &str)> = Vec::new();
    let mut fired = vec![false; rules.len()];
    let mut base: Option<&Frame> = None;
    let mut i = 0;

    'frames: while i < trace.len() {
        let function = trace[i].function.as_str();

        for (index, rule) in rules.iter().enumerate() {
            match rule {
                TitleRule::Skip(prefix) => {
                    if function.starts_with(prefix.as_str()) {
                        i += 1;
                        continue 'frames;
                    }
                }
                TitleRule::Fold {
                    pattern,
                    suffix,
                    while_condition,
                } => {
                    if function.starts_with(pattern.as_str()) {
                        if !fired[index] {
                            fired[index] = true;
                            suffixes.push((index, suffix.as_str()));
                        }
                        i += 1;
                        if let Some(condition) = while_condition {
                            while i < trace.len()
                                && condition.holds(&trace[i].function, app_package)
                            {
                                i += 1;
                            }
                        }
                        continue 'frames;
                    }
                }
                TitleRule::Find {
                    pattern,
                    suffix,
                    while_condition,
                } => {
                    if !fired[index]
                        && find_ahead(&trace[i..], pattern, while_condition.as_ref(), app_package)
                    {
                        fired[index] = true;
                        suffixes.push((index, suffix.as_str()));
                    }
                }
                TitleRule::Trim(_) => {}
            }
        }

        base = Some(&trace[i]);
        break;
    }

    let chosen = base.unwrap_or(last);
    let mut name = rules
        .iter()
        .filter_map(|rule| match rule {
            TitleRule::Trim(trim) => Some(trim),
            _ => None,
        })
        .fold(chosen.function.clone(), |name, trim| trim.apply(&name));

    suffixes.sort_by_key(|(index, _)| *index);
    for (_, suffix) in suffixes {
        name.push_str(SUFFIX_SEPARATOR);
        name.push_str(suffix);
    }
    name
}

/// Look for `pattern` at the candidate frame or beyond it; a `while`
/// condition stops the scan at the first later frame that does not hold it
fn find_ahead(
    frames: &[Frame],
    pattern: &str,
    while_condition: Option<&WhileCondition>,
    app_package: &str,
) -> bool {
    let Some((candidate, rest)) = frames.split_first() else {
        return false;
    };
    if candidate.function.starts_with(pattern) {
        return true;
    }
    for frame in rest {
        if frame.function.starts_with(pattern) {
            return true;
        }
        if let Some(condition) = while_condition {
            if !condition.holds(&frame.function, app_package) {
                return false;
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trace(functions: &[&str]) -> Vec<Frame> {
        functions
            .iter()
            .enumerate()
            .map(|(i, f)| Frame::new(*f, "x.go", i as u32 + 1))
            .collect()
    }

    fn rules(lines: &[&str]) -> Vec<TitleRule> {
        lines.iter().filter_map(|l| parse_title_rule(l)).collect()
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_title_rule("bogus").is_none());
        assert!(parse_title_rule("fold:X").is_none());
        assert!(parse_title_rule("fold:->Y").is_none());
        assert!(parse_title_rule("// comment").is_none());
        assert!(parse_title_rule("").is_none());
    }

    #[test]
    fn test_brace_group_refs() {
        assert_eq!(brace_group_refs("$1_handler"), "${1}_handler");
        assert_eq!(brace_group_refs("$2.$10"), "${2}.${10}");
        assert_eq!(brace_group_refs("$$1"), "$$1");
        assert_eq!(brace_group_refs("${name}x"), "${name}x");
    }

    #[test]
    fn test_trim_literal_vs_regex() {
        assert!(matches!(parse_trim("sync."), Some(Trim::Prefix(_))));
        assert!(matches!(parse_trim("s/a/b/"), Some(Trim::Substitute { .. })));
        assert!(matches!(parse_trim("s/"), Some(Trim::Prefix(_))));
        assert!(parse_trim("s/(/x/").is_none());
    }

    #[test]
    fn test_find_bounded_by_while() {
        let rules = rules(&["find:net/http.->http,while:main."]);
        let bounded = trace(&["main.a", "fmt.x", "net/http.serve"]);
        assert_eq!(derive_name(&bounded, &rules, "main"), "main.a");

        let reached = trace(&["main.a", "main.b", "net/http.serve"]);
        assert_eq!(derive_name(&reached, &rules, "main"), "main.a → http");
    }

    #[test]
    fn test_fold_while_moves_candidate() {
        let rules = rules(&["fold:sync.(*Mutex).Lock->mutex,while:sync."]);
        let t = trace(&["sync.(*Mutex).Lock", "sync.(*Once).doSlow", "main.init"]);
        assert_eq!(derive_name(&t, &rules, "main"), "main.init → mutex");
    }
}
