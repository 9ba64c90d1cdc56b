//! Rule sets and the evaluation function.
//!
//! A `RuleSet` is compiled once from a `PolicyConfig` and never changes.
//! Rules are stored in evaluation order, so `evaluate` is a linear scan that
//! returns at the first match:
//!
//! 1. higher `priority` first;
//! 2. on equal priority, the more severe verdict first
//!    (`deny` > `require-confirmation` > `allow`);
//! 3. then the rule with more match clauses;
//! 4. then declaration order.
//!
//! The first matching rule in that order is the rule that wins, which makes
//! "deny beats a lower-priority allow" and "a higher-priority allow
//! overrides a deny" both fall out of the sort.

use std::collections::HashSet;
use std::path::Path;

use tracing::{debug, info};

use maais_contracts::{
    action::Action,
    decision::{PolicyOutcome, RuleMetadata, Verdict},
    error::{GateError, GateResult},
};

use crate::matcher;
use crate::rule::{DefaultVerdict, PolicyConfig, Rule};

/// Reason attached to the default verdict when no rule matched.
pub const NO_MATCH_DENY_REASON: &str = "no rule matched; denied by default";
pub const NO_MATCH_ALLOW_REASON: &str = "no rule matched; allowed by default";

/// An immutable, validated, ordered collection of rules.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<Rule>,
    default_verdict: DefaultVerdict,
}

impl RuleSet {
    /// An empty rule set that denies everything.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Validate and compile every rule in `config`.
    ///
    /// Any invalid rule, or two rules sharing an id, rejects the whole set.
    pub fn compile(config: PolicyConfig) -> GateResult<Self> {
        let mut seen = HashSet::new();
        let mut rules = Vec::with_capacity(config.rules.len());

        for (index, spec) in config.rules.into_iter().enumerate() {
            let rule = Rule::compile(spec, index)?;
            if !seen.insert(rule.id.clone()) {
                return Err(GateError::InvalidRule {
                    rule_id: rule.id,
                    reason: "duplicate rule id".to_string(),
                });
            }
            rules.push(rule);
        }

        rules.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| b.verdict.severity().cmp(&a.verdict.severity()))
                .then_with(|| b.specificity.cmp(&a.specificity))
                .then_with(|| a.declared_index.cmp(&b.declared_index))
        });

        Ok(Self {
            rules,
            default_verdict: config.default_verdict,
        })
    }

    /// Parse `s` as a TOML policy file and compile it.
    ///
    /// Returns `GateError::PolicyLoad` for TOML or schema errors (including
    /// unknown operators) and `GateError::InvalidRule` for rules that parse
    /// but do not validate.
    pub fn from_toml_str(s: &str) -> GateResult<Self> {
        let config: PolicyConfig = toml::from_str(s).map_err(|e| GateError::PolicyLoad {
            reason: format!("failed to parse policy TOML: {e}"),
        })?;
        Self::compile(config)
    }

    /// Read and compile the policy file at `path`.
    pub fn from_file(path: &Path) -> GateResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| GateError::PolicyLoad {
            reason: format!("failed to read policy file '{}': {e}", path.display()),
        })?;
        let rule_set = Self::from_toml_str(&contents)?;
        info!(
            path = %path.display(),
            rules = rule_set.len(),
            "policy file loaded"
        );
        Ok(rule_set)
    }

    /// Replace the no-match verdict.
    pub fn with_default_verdict(mut self, default_verdict: DefaultVerdict) -> Self {
        self.default_verdict = default_verdict;
        self
    }

    pub fn default_verdict(&self) -> DefaultVerdict {
        self.default_verdict
    }

    /// Rules in evaluation order.
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn get(&self, rule_id: &str) -> Option<&Rule> {
        self.rules.iter().find(|rule| rule.id == rule_id)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Evaluate `action` against `rules`.
///
/// Pure and deterministic. `policy_version` is left `None`; the store fills
/// it in.
pub fn evaluate(action: &Action, rules: &RuleSet) -> PolicyOutcome {
    for rule in &rules.rules {
        if !matcher::matches(rule, action) {
            continue;
        }

        debug!(
            action_id = %action.id,
            rule_id = %rule.id,
            verdict = %rule.verdict,
            priority = rule.priority,
            "rule matched"
        );
        return PolicyOutcome {
            verdict: rule.verdict,
            rule_id: Some(rule.id.clone()),
            reason: rule.reason.clone(),
            metadata: rule.metadata.clone(),
            policy_version: None,
        };
    }

    let (verdict, reason) = match rules.default_verdict {
        DefaultVerdict::Deny => (Verdict::Deny, NO_MATCH_DENY_REASON),
        DefaultVerdict::Allow => (Verdict::Allow, NO_MATCH_ALLOW_REASON),
    };
    debug!(
        action_id = %action.id,
        category = %action.category,
        target = %action.target,
        verdict = %verdict,
        "no rule matched; default verdict"
    );
    PolicyOutcome {
        verdict,
        rule_id: None,
        reason: reason.to_string(),
        metadata: RuleMetadata::default(),
        policy_version: None,
    }
}
