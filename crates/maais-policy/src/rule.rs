//! Policy rule types and the TOML policy-file schema.
//!
//! A policy file deserializes into a `PolicyConfig` of `RuleSpec`s. Specs
//! are compiled into `Rule`s (categories parsed, field paths resolved,
//! regexes built) by `RuleSet::compile`; a single bad rule rejects the
//! whole file.
//!
//! Example:
//!
//! ```toml
//! [[rules]]
//! id = "deny-exfiltration"
//! applies_to = ["network-request"]
//! verdict = "deny"
//! priority = 10
//! reason = "Data exfiltration"
//! threat_taxonomy = ["exfiltration"]
//!
//! [[rules.condition.matches]]
//! field = "parameters.data"
//! pattern = "(?i)password"
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use maais_contracts::{
    action::ActionCategory,
    decision::{RuleMetadata, Verdict},
    error::{GateError, GateResult},
};

use crate::matcher::{Clause, Condition, FieldRef, Operator};

/// The verdict a rule produces when it matches.
///
/// Written kebab-case in TOML:
/// ```toml
/// verdict = "allow"
/// verdict = "deny"
/// verdict = "require-confirmation"
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RuleVerdict {
    Allow,
    Deny,
    RequireConfirmation,
}

impl From<RuleVerdict> for Verdict {
    fn from(verdict: RuleVerdict) -> Self {
        match verdict {
            RuleVerdict::Allow => Verdict::Allow,
            RuleVerdict::Deny => Verdict::Deny,
            RuleVerdict::RequireConfirmation => Verdict::RequireConfirmation,
        }
    }
}

/// What a policy file declares when no rule matches.
///
/// `deny` is the default. `allow` is the explicit fail-open opt-in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DefaultVerdict {
    #[default]
    Deny,
    Allow,
}

/// One match clause: a field of the action and exactly one operator.
///
/// `field` is `"target"`, `"agent_id"`, `"tenant_id"`, `"parameters"`, or a
/// dotted parameter path such as `"parameters.data.password"`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClauseSpec {
    pub field: String,
    /// Exact equality with the resolved value.
    #[serde(default)]
    pub equals: Option<serde_json::Value>,
    /// Equality with any listed value.
    #[serde(default, rename = "in")]
    pub one_of: Option<Vec<serde_json::Value>>,
    /// Substring search over every key path and scalar under the field.
    #[serde(default)]
    pub contains: Option<String>,
    /// Regex search over every key path and scalar under the field.
    #[serde(default)]
    pub pattern: Option<String>,
    /// `true` matches when the field is present, `false` when it is absent.
    #[serde(default)]
    pub exists: Option<bool>,
    /// Compare strings case-insensitively (`equals`, `in`, `contains`,
    /// `pattern`).
    #[serde(default)]
    pub case_insensitive: bool,
}

/// A boolean expression over the action's fields.
///
/// Every clause in `matches` and every sub-condition in `all` must hold; when
/// `any` is non-empty at least one of its sub-conditions must hold too. An
/// empty condition matches every applicable action.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConditionSpec {
    pub matches: Vec<ClauseSpec>,
    pub any: Vec<ConditionSpec>,
    pub all: Vec<ConditionSpec>,
}

/// A single policy rule as written in a policy file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleSpec {
    /// Stable identifier used in decisions, audit records, and alerts.
    pub id: String,

    /// What this rule is for. Not evaluated.
    #[serde(default)]
    pub description: String,

    /// Categories the rule applies to, e.g. `["network-request"]`.
    /// `["*"]` applies to every category.
    pub applies_to: Vec<String>,

    #[serde(default)]
    pub condition: ConditionSpec,

    pub verdict: RuleVerdict,

    /// Returned as the decision reason. Defaults to a message naming the rule.
    #[serde(default)]
    pub reason: Option<String>,

    /// Larger values win. Ties are broken by verdict severity, then
    /// specificity, then declaration order.
    #[serde(default)]
    pub priority: i64,

    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(default)]
    pub threat_taxonomy: Vec<String>,

    /// Any other annotations, copied to `RuleMetadata::extra`.
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
}

/// The top-level structure of a TOML policy file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicyConfig {
    /// Verdict when no rule matches.
    #[serde(default)]
    pub default_verdict: DefaultVerdict,
    /// Rules in declaration order. The order is part of the rule set's
    /// identity: it is the final tie-break.
    #[serde(default)]
    pub rules: Vec<RuleSpec>,
}

/// Which categories a compiled rule applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Applicability {
    Any,
    Categories(Vec<ActionCategory>),
}

impl Applicability {
    pub fn covers(&self, category: ActionCategory) -> bool {
        match self {
            Applicability::Any => true,
            Applicability::Categories(categories) => categories.contains(&category),
        }
    }
}

/// A validated, compiled rule. Immutable once built.
#[derive(Debug, Clone)]
pub struct Rule {
    pub id: String,
    pub description: String,
    pub applies_to: Applicability,
    pub condition: Condition,
    pub verdict: Verdict,
    pub reason: String,
    pub priority: i64,
    pub metadata: RuleMetadata,
    /// Position in the policy file.
    pub declared_index: usize,
    /// Number of leaf clauses in `condition`.
    pub specificity: usize,
}

impl Rule {
    /// Compile a spec. `declared_index` is its position in the file.
    pub fn compile(spec: RuleSpec, declared_index: usize) -> GateResult<Self> {
        let id = spec.id.trim().to_string();
        if id.is_empty() {
            return Err(GateError::InvalidRule {
                rule_id: format!("#{declared_index}"),
                reason: "rule id is empty".to_string(),
            });
        }

        let applies_to = compile_applicability(&id, &spec.applies_to)?;
        let condition = compile_condition(&id, spec.condition)?;
        let specificity = condition.specificity();
        let verdict = Verdict::from(spec.verdict);
        let reason = spec
            .reason
            .filter(|r| !r.trim().is_empty())
            .unwrap_or_else(|| format!("{verdict} by rule '{id}'"));

        Ok(Self {
            id,
            description: spec.description,
            applies_to,
            condition,
            verdict,
            reason,
            priority: spec.priority,
            metadata: RuleMetadata {
                tags: spec.tags,
                threat_taxonomy: spec.threat_taxonomy,
                extra: spec.annotations,
            },
            declared_index,
            specificity,
        })
    }
}

fn invalid(rule_id: &str, reason: impl Into<String>) -> GateError {
    GateError::InvalidRule {
        rule_id: rule_id.to_string(),
        reason: reason.into(),
    }
}

fn compile_applicability(rule_id: &str, names: &[String]) -> GateResult<Applicability> {
    if names.is_empty() {
        return Err(invalid(rule_id, "applies_to is empty"));
    }
    if names.iter().any(|name| name.trim() == "*") {
        return Ok(Applicability::Any);
    }

    let mut categories = Vec::with_capacity(names.len());
    for name in names {
        let category = ActionCategory::parse(name)
            .ok_or_else(|| invalid(rule_id, format!("unknown action category '{name}'")))?;
        if !categories.contains(&category) {
            categories.push(category);
        }
    }
    Ok(Applicability::Categories(categories))
}

fn compile_condition(rule_id: &str, spec: ConditionSpec) -> GateResult<Condition> {
    let clauses = spec
        .matches
        .into_iter()
        .map(|clause| compile_clause(rule_id, clause))
        .collect::<GateResult<Vec<_>>>()?;
    let any = spec
        .any
        .into_iter()
        .map(|sub| compile_condition(rule_id, sub))
        .collect::<GateResult<Vec<_>>>()?;
    let all = spec
        .all
        .into_iter()
        .map(|sub| compile_condition(rule_id, sub))
        .collect::<GateResult<Vec<_>>>()?;

    Ok(Condition { clauses, any, all })
}

fn compile_clause(rule_id: &str, spec: ClauseSpec) -> GateResult<Clause> {
    let field = FieldRef::parse(&spec.field)
        .ok_or_else(|| invalid(rule_id, format!("unsupported field '{}'", spec.field)))?;
    let ci = spec.case_insensitive;

    let mut operators = Vec::new();
    if let Some(expected) = spec.equals {
        operators.push(Operator::Equals(expected));
    }
    if let Some(candidates) = spec.one_of {
        operators.push(Operator::OneOf(candidates));
    }
    if let Some(needle) = spec.contains {
        operators.push(Operator::contains(needle, ci));
    }
    if let Some(pattern) = spec.pattern {
        let op = Operator::pattern(&pattern, ci).map_err(|e| {
            invalid(rule_id, format!("invalid pattern '{pattern}': {e}"))
        })?;
        operators.push(op);
    }
    if let Some(present) = spec.exists {
        operators.push(Operator::Exists(present));
    }

    match operators.len() {
        1 => {
            let operator = operators.remove(0);
            Ok(Clause::new(field, operator, ci))
        }
        0 => Err(invalid(
            rule_id,
            format!("clause on '{}' has no operator", spec.field),
        )),
        _ => Err(invalid(
            rule_id,
            format!("clause on '{}' has more than one operator", spec.field),
        )),
    }
}
