//! Filter queries.
//!
//! Query syntax, whitespace separated:
//!
//! ```text
//! lock                  free text (at most one term, "quoted phrase" allowed)
//! wait:5+  wait:4-9     wait constraint, repeatable: N, N+, >N, >=N, <N, <=N, A-B
//! state:select,running  state set
//! id:42                 forced unit
//! exclude:FILE          hide a file
//! solo:FILE             hide every other file
//! ```

use std::collections::BTreeSet;
use std::fmt;

use crate::utils::error::QueryError;

/// A normalized wait-time constraint, in minutes, inclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitConstraint {
    Exact(u32),
    Min(u32),
    Max(u32),
    Range { min: u32, max: u32 },
}

impl WaitConstraint {
    pub fn matches(&self, wait: u32) -> bool {
        match *self {
            WaitConstraint::Exact(n) => wait == n,
            WaitConstraint::Min(n) => wait >= n,
            WaitConstraint::Max(n) => wait <= n,
            WaitConstraint::Range { min, max } => (min..=max).contains(&wait),
        }
    }

    fn combine(self, other: WaitConstraint) -> Result<WaitConstraint, QueryError> {
        use WaitConstraint::*;
        match (self, other) {
            (Min(min), Max(max)) | (Max(max), Min(min)) => {
                if min > max {
                    Err(QueryError::ConflictingWait(format!(
                        "minimum {} exceeds maximum {}",
                        min, max
                    )))
                } else {
                    Ok(Range { min, max })
                }
            }
            (Min(_), Min(_)) => Err(conflict("two minimum values")),
            (Max(_), Max(_)) => Err(conflict("two maximum values")),
            (Exact(_), _) | (_, Exact(_)) => {
                Err(conflict("an exact value cannot be combined with other constraints"))
            }
            (Range { .. }, _) | (_, Range { .. }) => {
                Err(conflict("a range cannot be combined with other constraints"))
            }
        }
    }
}

impl fmt::Display for WaitConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WaitConstraint::Exact(n) => write!(f, "{}", n),
            WaitConstraint::Min(n) => write!(f, "{}+", n),
            WaitConstraint::Max(n) => write!(f, "<={}", n),
            WaitConstraint::Range { min, max } => write!(f, "{}-{}", min, max),
        }
    }
}

fn conflict(reason: &str) -> QueryError {
    QueryError::ConflictingWait(reason.to_string())
}

/// Parse a wait expression into one normalized constraint
///
/// **Public** - used by the query parser and directly by callers building a
/// [`FilterQuery`] by hand
///
/// # Example
/// ```ignore
/// assert_eq!(parse_wait(">5 <10")?, WaitConstraint::Range { min: 6, max: 9 });
/// ```
///
/// # Errors
/// * `QueryError::InvalidWait` - A token is not a number or bound
/// * `QueryError::ConflictingWait` - Tokens contradict each other
pub fn parse_wait(expr: &str) -> Result<WaitConstraint, QueryError> {
    let mut constraint: Option<WaitConstraint> = None;
    for token in expr.split_whitespace() {
        let next = parse_wait_token(token)?;
        constraint = Some(match constraint {
            Some(current) => current.combine(next)?,
            None => next,
        });
    }
    constraint.ok_or_else(|| QueryError::InvalidWait(expr.to_string()))
}

fn parse_wait_token(token: &str) -> Result<WaitConstraint, QueryError> {
    let invalid = || QueryError::InvalidWait(token.to_string());
    let number = |digits: &str| -> Result<u32, QueryError> {
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        digits.parse().map_err(|_| invalid())
    };

    if let Some(n) = token.strip_prefix(">=") {
        return Ok(WaitConstraint::Min(number(n)?));
    }
    if let Some(n) = token.strip_prefix("<=") {
        return Ok(WaitConstraint::Max(number(n)?));
    }
    if let Some(n) = token.strip_prefix('>') {
        let n = number(n)?.checked_add(1).ok_or_else(invalid)?;
        return Ok(WaitConstraint::Min(n));
    }
    if let Some(n) = token.strip_prefix('<') {
        let n = number(n)?.checked_sub(1).ok_or_else(invalid)?;
        return Ok(WaitConstraint::Max(n));
    }
    if let Some(n) = token.strip_suffix('+') {
        return Ok(WaitConstraint::Min(number(n)?));
    }
    if let Some((min, max)) = token.split_once('-') {
        let (min, max) = (number(min)?, number(max)?);
        if min > max {
            return Err(QueryError::ConflictingWait(format!(
                "{}: minimum exceeds maximum",
                token
            )));
        }
        return Ok(WaitConstraint::Range { min, max });
    }
    Ok(WaitConstraint::Exact(number(token)?))
}

/// Structured filter
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterQuery {
    pub text: Option<String>,
    pub wait: Option<WaitConstraint>,
    pub states: BTreeSet<String>,

    /// Display id of a unit kept visible regardless of constraints
    pub forced_unit: Option<String>,
    pub excluded_files: BTreeSet<String>,
    pub solo_files: BTreeSet<String>,
}

struct Token {
    text: String,
    quoted: bool,
}

fn tokenize(input: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut quoted = false;

    for c in input.chars() {
        match c {
            '"' => {
                if current.is_empty() && !in_quotes {
                    quoted = true;
                }
                in_quotes = !in_quotes;
            }
            c if c.is_whitespace() && !in_quotes => {
                if !current.is_empty() {
                    tokens.push(Token {
                        text: std::mem::take(&mut current),
                        quoted,
                    });
                }
                quoted = false;
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        tokens.push(Token {
            text: current,
            quoted,
        });
    }
    tokens
}

impl FilterQuery {
    /// Parse a query string
    ///
    /// # Errors
    /// * `QueryError::MultipleTerms` - More than one free-text term
    /// * `QueryError::EmptyValue` - A `key:` token without a value
    /// * Wait errors from [`parse_wait`]
    pub fn parse(input: &str) -> Result<Self, QueryError> {
        let mut query = Self::default();
        let mut wait_exprs: Vec<String> = Vec::new();

        for token in tokenize(input) {
            if !token.quoted {
                if let Some((key, value)) = token.text.split_once(':') {
                    let known = matches!(key, "wait" | "state" | "id" | "exclude" | "solo");
                    if known && value.is_empty() {
                        return Err(QueryError::EmptyValue(key.to_string()));
                    }
                    match key {
                        "wait" => wait_exprs.push(value.to_string()),
                        "state" => query.states.extend(
                            value
                                .split(',')
                                .map(str::trim)
                                .filter(|s| !s.is_empty())
                                .map(str::to_string),
                        ),
                        "id" => query.forced_unit = Some(value.to_string()),
                        "exclude" => {
                            query.excluded_files.insert(value.to_string());
                        }
                        "solo" => {
                            query.solo_files.insert(value.to_string());
                        }
                        _ => {}
                    }
                    if known {
                        continue;
                    }
                }
            }

            match &query.text {
                Some(existing) => {
                    return Err(QueryError::MultipleTerms(existing.clone(), token.text))
                }
                None => query.text = Some(token.text),
            }
        }

        if !wait_exprs.is_empty() {
            query.wait = Some(parse_wait(&wait_exprs.join(" "))?);
        }

        query.validate()?;
        Ok(query)
    }

    /// Check a query for self-contradictions
    pub fn validate(&self) -> Result<(), QueryError> {
        if matches!(self.text.as_deref(), Some(t) if t.trim().is_empty()) {
            return Err(QueryError::EmptyValue("text".to_string()));
        }
        if self.states.iter().any(|s| s.trim().is_empty()) {
            return Err(QueryError::EmptyValue("state".to_string()));
        }
        if let Some(WaitConstraint::Range { min, max }) = self.wait {
            if min > max {
                return Err(QueryError::ConflictingWait(format!(
                    "minimum {} exceeds maximum {}",
                    min, max
                )));
            }
        }
        Ok(())
    }

    /// No constraint, forced unit or file restriction is set
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn excludes_file(&self, file_name: &str) -> bool {
        self.excluded_files.contains(file_name)
            || (!self.solo_files.is_empty() && !self.solo_files.contains(file_name))
    }

    pub fn matcher(&self) -> FilterMatcher<'_> {
        FilterMatcher {
            query: self,
            needle: self.text.as_ref().map(|t| t.to_lowercase()),
            states: self.states.iter().map(|s| s.to_lowercase()).collect(),
        }
    }
}

/// Renders the query back in query syntax
impl fmt::Display for FilterQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let quote = |value: &str| {
            if value.chars().any(char::is_whitespace) {
                format!("\"{}\"", value)
            } else {
                value.to_string()
            }
        };

        let mut parts: Vec<String> = Vec::new();
        if let Some(text) = &self.text {
            if text.contains(':') {
                parts.push(format!("\"{}\"", text));
            } else {
                parts.push(quote(text));
            }
        }
        if let Some(wait) = self.wait {
            parts.push(format!("wait:{}", wait));
        }
        if !self.states.is_empty() {
            let states: Vec<&str> = self.states.iter().map(String::as_str).collect();
            parts.push(format!("state:{}", states.join(",")));
        }
        if let Some(id) = &self.forced_unit {
            parts.push(format!("id:{}", quote(id)));
        }
        for file in &self.excluded_files {
            parts.push(format!("exclude:{}", quote(file)));
        }
        for file in &self.solo_files {
            parts.push(format!("solo:{}", quote(file)));
        }
        write!(f, "{}", parts.join(" "))
    }
}

/// What the filter sees of one unit
#[derive(Debug, Clone, Copy)]
pub struct UnitContext<'a> {
    pub display_id: &'a str,
    pub state: &'a str,
    pub wait_minutes: Option<u32>,
    pub labels: &'a BTreeSet<String>,
    pub searchable_text: &'a str,
}

/// A query prepared for evaluation over many units
#[derive(Debug)]
pub struct FilterMatcher<'a> {
    query: &'a FilterQuery,
    needle: Option<String>,
    states: BTreeSet<String>,
}

impl FilterMatcher<'_> {
    /// Text, wait and state constraints all hold (or are absent)
    pub fn constraints_match(&self, unit: &UnitContext<'_>) -> bool {
        if let Some(wait) = self.query.wait {
            if !wait.matches(unit.wait_minutes.unwrap_or(0)) {
                return false;
            }
        }

        if !self.states.is_empty() && !self.states.contains(&unit.state.to_lowercase()) {
            return false;
        }

        match &self.needle {
            Some(needle) => {
                unit.display_id.to_lowercase().contains(needle.as_str())
                    || unit.searchable_text.contains(needle.as_str())
                    || unit.state.to_lowercase().contains(needle.as_str())
                    || unit
                        .labels
                        .iter()
                        .any(|label| label.to_lowercase().contains(needle.as_str()))
            }
            None => true,
        }
    }

    pub fn is_forced(&self, display_id: &str) -> bool {
        self.query.forced_unit.as_deref() == Some(display_id)
    }

    pub fn excludes_file(&self, file_name: &str) -> bool {
        self.query.excludes_file(file_name)
    }
}
