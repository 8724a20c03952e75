//! Ordered terminology substitution.
//!
//! A degenerate cousin of the patch applier: a fixed list of
//! `(pattern, literal replacement)` rules applied in sequence to a document.
//! No sentinel, no fallback. Rule order is load-bearing - a whole-phrase
//! rule must run before the short-acronym rule it contains, or the acronym
//! rule double-substitutes inside text the phrase rule just produced.

use crate::cache;
use crate::config::schema::SubstitutionRule;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SubstError {
    #[error("invalid substitution pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        source: regex::Error,
    },
}

/// A compiled, ordered rule list ready to run against documents.
#[derive(Debug, Clone)]
pub struct SubstitutionSet {
    rules: Vec<CompiledRule>,
}

#[derive(Debug, Clone)]
struct CompiledRule {
    regex: regex::Regex,
    replacement: String,
}

/// Outcome of running a substitution set over one document.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "SubstOutcome should be checked before deciding to publish"]
pub struct SubstOutcome {
    pub text: String,
    /// Match counts per rule, in rule order.
    pub counts: Vec<usize>,
}

impl SubstOutcome {
    pub fn total(&self) -> usize {
        self.counts.iter().sum()
    }

    pub fn changed(&self) -> bool {
        self.total() > 0
    }
}

impl SubstitutionSet {
    /// Compile the configured rules, preserving their order exactly.
    pub fn compile(rules: &[SubstitutionRule]) -> Result<Self, SubstError> {
        let rules = rules
            .iter()
            .map(|rule| {
                let regex =
                    cache::get_or_compile(&rule.pattern).map_err(|source| SubstError::Pattern {
                        pattern: rule.pattern.clone(),
                        source,
                    })?;
                Ok(CompiledRule {
                    regex,
                    replacement: rule.replacement.clone(),
                })
            })
            .collect::<Result<Vec<_>, SubstError>>()?;

        Ok(SubstitutionSet { rules })
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Run every rule in sequence over the document.
    ///
    /// Replacements are literal: `$` in the configured replacement text is
    /// not a capture reference.
    pub fn apply(&self, document: &str) -> SubstOutcome {
        let mut text = document.to_string();
        let mut counts = Vec::with_capacity(self.rules.len());

        for rule in &self.rules {
            let count = rule.regex.find_iter(&text).count();
            if count > 0 {
                text = rule
                    .regex
                    .replace_all(&text, regex::NoExpand(&rule.replacement))
                    .into_owned();
            }
            counts.push(count);
        }

        SubstOutcome { text, counts }
    }
}
