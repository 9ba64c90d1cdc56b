//! Compiled rule conditions and the matching predicate.
//!
//! Matching is pure: it reads the action and the rule and nothing else.
//! A referenced field that the action does not carry is a non-match, never
//! an error. String search (`contains`, `pattern`) covers every key path and
//! every scalar value under the referenced field, so a secret nested at
//! `parameters.data.password` is found whether the rule points at
//! `parameters`, `parameters.data`, or the leaf itself.

use regex::{Regex, RegexBuilder};
use serde_json::{Map, Value};

use maais_contracts::action::Action;

use crate::rule::Rule;

/// Nesting below this depth is searched as raw JSON text.
const MAX_DEPTH: usize = 32;

/// Compiled regexes larger than this are rejected at load time.
const REGEX_SIZE_LIMIT: usize = 1 << 20;

/// Whether `rule` matches `action`.
///
/// Category applicability is checked first; the condition is only walked for
/// applicable categories.
pub fn matches(rule: &Rule, action: &Action) -> bool {
    rule.applies_to.covers(action.category) && rule.condition.matches(action)
}

/// The part of an action a clause looks at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldRef {
    Target,
    AgentId,
    TenantId,
    /// A parameter path. Empty means the whole parameter mapping.
    Parameters(Vec<String>),
}

impl FieldRef {
    /// Parse a field name such as `"target"` or `"parameters.data.password"`.
    ///
    /// `"params"` is accepted as shorthand for `"parameters"`. Returns `None`
    /// for anything else, including empty path segments.
    pub fn parse(name: &str) -> Option<Self> {
        let name = name.trim();
        match name {
            "target" => return Some(FieldRef::Target),
            "agent_id" | "agent" => return Some(FieldRef::AgentId),
            "tenant_id" | "tenant" => return Some(FieldRef::TenantId),
            _ => {}
        }

        let rest = name
            .strip_prefix("parameters")
            .or_else(|| name.strip_prefix("params"))?;
        if rest.is_empty() {
            return Some(FieldRef::Parameters(Vec::new()));
        }
        let path = rest.strip_prefix('.')?;
        let segments: Vec<String> = path.split('.').map(str::to_string).collect();
        if segments.iter().any(|s| s.is_empty()) {
            return None;
        }
        Some(FieldRef::Parameters(segments))
    }

    fn resolve<'a>(&self, action: &'a Action) -> Option<Resolved<'a>> {
        match self {
            FieldRef::Target => Some(Resolved::Text(&action.target)),
            FieldRef::AgentId => Some(Resolved::Text(&action.agent_id.0)),
            FieldRef::TenantId => Some(Resolved::Text(&action.tenant_id.0)),
            FieldRef::Parameters(path) => {
                let Some((first, rest)) = path.split_first() else {
                    return Some(Resolved::Map(&action.parameters));
                };
                let mut current = action.parameters.get(first)?;
                for segment in rest {
                    current = match current {
                        Value::Object(map) => map.get(segment)?,
                        Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                        _ => return None,
                    };
                }
                Some(Resolved::Value(current))
            }
        }
    }
}

/// What a field resolved to on a concrete action.
#[derive(Debug, Clone, Copy)]
enum Resolved<'a> {
    Text(&'a str),
    Map(&'a Map<String, Value>),
    Value(&'a Value),
}

impl Resolved<'_> {
    fn equals(&self, expected: &Value, case_insensitive: bool) -> bool {
        match self {
            Resolved::Text(text) => expected
                .as_str()
                .is_some_and(|e| str_equal(text, e, case_insensitive)),
            Resolved::Map(map) => match expected {
                Value::Object(other) => map.len() == other.len() && map.iter().all(|(k, v)| {
                    other.get(k).is_some_and(|o| values_equal(v, o, case_insensitive))
                }),
                _ => false,
            },
            Resolved::Value(value) => values_equal(value, expected, case_insensitive),
        }
    }

    /// True when `predicate` holds for any key path or scalar under this
    /// value.
    fn search(&self, predicate: &mut dyn FnMut(&str) -> bool) -> bool {
        match self {
            Resolved::Text(text) => predicate(text),
            Resolved::Map(map) => search_map(map, &mut String::new(), 0, predicate),
            Resolved::Value(value) => search_value(value, &mut String::new(), 0, predicate),
        }
    }
}

fn str_equal(a: &str, b: &str, case_insensitive: bool) -> bool {
    if case_insensitive {
        a.to_lowercase() == b.to_lowercase()
    } else {
        a == b
    }
}

/// Structural equality. Numbers compare by value, so TOML `1` equals JSON
/// `1.0`.
fn values_equal(actual: &Value, expected: &Value, case_insensitive: bool) -> bool {
    match (actual, expected) {
        (Value::String(a), Value::String(b)) => str_equal(a, b, case_insensitive),
        (Value::Number(a), Value::Number(b)) => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => a == b,
        },
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len()
                && a.iter()
                    .zip(b)
                    .all(|(x, y)| values_equal(x, y, case_insensitive))
        }
        (Value::Object(a), Value::Object(b)) => {
            a.len() == b.len()
                && a.iter().all(|(k, v)| {
                    b.get(k).is_some_and(|o| values_equal(v, o, case_insensitive))
                })
        }
        _ => actual == expected,
    }
}

fn search_map(
    map: &Map<String, Value>,
    path: &mut String,
    depth: usize,
    predicate: &mut dyn FnMut(&str) -> bool,
) -> bool {
    for (key, value) in map {
        let mark = path.len();
        if !path.is_empty() {
            path.push('.');
        }
        path.push_str(key);

        let found = predicate(key)
            || (path.as_str() != key.as_str() && predicate(path.as_str()))
            || search_value(value, path, depth + 1, predicate);
        path.truncate(mark);
        if found {
            return true;
        }
    }
    false
}

fn search_value(
    value: &Value,
    path: &mut String,
    depth: usize,
    predicate: &mut dyn FnMut(&str) -> bool,
) -> bool {
    if depth > MAX_DEPTH {
        return predicate(&value.to_string());
    }
    match value {
        Value::Object(map) => search_map(map, path, depth, predicate),
        Value::Array(items) => items.iter().enumerate().any(|(index, item)| {
            let mark = path.len();
            if !path.is_empty() {
                path.push('.');
            }
            path.push_str(&index.to_string());
            let found = search_value(item, path, depth + 1, predicate);
            path.truncate(mark);
            found
        }),
        Value::String(s) => predicate(s),
        Value::Number(n) => predicate(&n.to_string()),
        Value::Bool(b) => predicate(if *b { "true" } else { "false" }),
        Value::Null => false,
    }
}

/// A clause operator with its compiled operand.
#[derive(Debug, Clone)]
pub enum Operator {
    Equals(Value),
    OneOf(Vec<Value>),
    /// The needle, already lowercased for case-insensitive clauses.
    Contains(String),
    Pattern(Regex),
    Exists(bool),
}

impl Operator {
    pub fn contains(needle: String, case_insensitive: bool) -> Self {
        if case_insensitive {
            Operator::Contains(needle.to_lowercase())
        } else {
            Operator::Contains(needle)
        }
    }

    pub fn pattern(pattern: &str, case_insensitive: bool) -> Result<Self, regex::Error> {
        RegexBuilder::new(pattern)
            .case_insensitive(case_insensitive)
            .size_limit(REGEX_SIZE_LIMIT)
            .build()
            .map(Operator::Pattern)
    }
}

/// One field test.
#[derive(Debug, Clone)]
pub struct Clause {
    field: FieldRef,
    operator: Operator,
    case_insensitive: bool,
}

impl Clause {
    pub fn new(field: FieldRef, operator: Operator, case_insensitive: bool) -> Self {
        Self {
            field,
            operator,
            case_insensitive,
        }
    }

    pub fn field(&self) -> &FieldRef {
        &self.field
    }

    pub fn matches(&self, action: &Action) -> bool {
        let ci = self.case_insensitive;
        let resolved = self.field.resolve(action);
        match (&self.operator, resolved) {
            (Operator::Exists(want), resolved) => resolved.is_some() == *want,
            (_, None) => false,
            (Operator::Equals(expected), Some(r)) => r.equals(expected, ci),
            (Operator::OneOf(candidates), Some(r)) => {
                candidates.iter().any(|candidate| r.equals(candidate, ci))
            }
            (Operator::Contains(needle), Some(r)) => r.search(&mut |text| {
                if ci {
                    text.to_lowercase().contains(needle.as_str())
                } else {
                    text.contains(needle.as_str())
                }
            }),
            (Operator::Pattern(regex), Some(r)) => r.search(&mut |text| regex.is_match(text)),
        }
    }
}

/// A compiled condition tree. See `ConditionSpec` for the semantics.
#[derive(Debug, Clone, Default)]
pub struct Condition {
    pub clauses: Vec<Clause>,
    pub any: Vec<Condition>,
    pub all: Vec<Condition>,
}

impl Condition {
    pub fn matches(&self, action: &Action) -> bool {
        self.clauses.iter().all(|clause| clause.matches(action))
            && self.all.iter().all(|sub| sub.matches(action))
            && (self.any.is_empty() || self.any.iter().any(|sub| sub.matches(action)))
    }

    /// Number of leaf clauses in the tree.
    pub fn specificity(&self) -> usize {
        self.clauses.len()
            + self.any.iter().map(Condition::specificity).sum::<usize>()
            + self.all.iter().map(Condition::specificity).sum::<usize>()
    }
}
