use serde::Deserialize;
use std::fmt;

use crate::cache;

/// A patch spec file: run metadata plus the ordered patch list.
#[derive(Debug, Deserialize, Default, Clone)]
pub struct PatchSpec {
    #[serde(default)]
    pub meta: Metadata,
    #[serde(default)]
    pub patches: Vec<PatchDefinition>,
}

/// A terminology rule file: metadata plus the ordered rule list.
#[derive(Debug, Deserialize, Default, Clone)]
pub struct RulesFile {
    #[serde(default)]
    pub meta: Metadata,
    #[serde(default)]
    pub rules: Vec<SubstitutionRule>,
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct Metadata {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Target repository as `owner/name`. A CLI flag overrides this.
    #[serde(default)]
    pub repo: Option<String>,
    #[serde(default)]
    pub branch: Option<String>,
    /// Commit message used when publishing the patched files.
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct PatchDefinition {
    pub id: String,
    /// Repository-relative path of the file this patch targets.
    pub file: String,
    /// Marker the replacement embeds; its presence on a later run means the
    /// patch already landed.
    #[serde(default)]
    pub sentinel: Option<String>,
    pub rewrite: Rewrite,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Rewrite {
    /// Literal substring replacement, leftmost occurrence only.
    Exact {
        needle: String,
        replacement: String,
        #[serde(default)]
        fallback: Option<Fallback>,
    },
    /// Global regex substitution with a literal replacement.
    Pattern { pattern: String, replacement: String },
}

/// Line-based fallback used when the exact needle has drifted out from
/// under the patch (reformatting, indentation changes).
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct Fallback {
    /// Weaker substring that must still be present for the fallback to be
    /// worth attempting, e.g. the call being patched.
    pub precondition: String,
    /// Marker of the enclosing block, e.g. the function signature. A
    /// candidate line is only eligible when this appears within the scan
    /// window above it.
    pub context: String,
    /// Substring identifying the line to replace.
    pub target: String,
    /// Lines spliced in at the candidate's position; each receives the
    /// candidate line's leading whitespace.
    pub lines: Vec<String>,
    /// When the line after the candidate contains this, it is consumed too.
    #[serde(default)]
    pub consume_next: Option<String>,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct SubstitutionRule {
    pub pattern: String,
    pub replacement: String,
}

impl PatchSpec {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut issues = Vec::new();

        if self.patches.is_empty() {
            issues.push(ValidationIssue::EmptyList { what: "patches" });
        }

        for patch in &self.patches {
            if patch.id.trim().is_empty() {
                issues.push(ValidationIssue::MissingField {
                    id: None,
                    field: "id",
                });
            }
            if patch.file.trim().is_empty() {
                issues.push(ValidationIssue::MissingField {
                    id: Some(patch.id.clone()),
                    field: "file",
                });
            }

            match &patch.rewrite {
                Rewrite::Exact {
                    needle,
                    replacement,
                    fallback,
                } => {
                    if needle.is_empty() {
                        issues.push(ValidationIssue::MissingField {
                            id: Some(patch.id.clone()),
                            field: "rewrite.needle",
                        });
                    }

                    // The sentinel is the idempotence mechanism: a declared
                    // marker must actually land in whatever text the patch
                    // produces, on both the exact and the fallback path.
                    if let Some(sentinel) = &patch.sentinel {
                        if !replacement.contains(sentinel.as_str()) {
                            issues.push(ValidationIssue::Invalid {
                                id: Some(patch.id.clone()),
                                message: "replacement does not contain the sentinel".to_string(),
                            });
                        }
                    }

                    if let Some(fallback) = fallback {
                        if patch.sentinel.is_none() {
                            issues.push(ValidationIssue::Invalid {
                                id: Some(patch.id.clone()),
                                message: "a fallback requires a sentinel, or re-runs would splice twice"
                                    .to_string(),
                            });
                        }
                        if fallback.precondition.is_empty() {
                            issues.push(ValidationIssue::MissingField {
                                id: Some(patch.id.clone()),
                                field: "fallback.precondition",
                            });
                        }
                        if fallback.context.is_empty() {
                            issues.push(ValidationIssue::MissingField {
                                id: Some(patch.id.clone()),
                                field: "fallback.context",
                            });
                        }
                        if fallback.target.is_empty() {
                            issues.push(ValidationIssue::MissingField {
                                id: Some(patch.id.clone()),
                                field: "fallback.target",
                            });
                        }
                        if fallback.lines.is_empty() {
                            issues.push(ValidationIssue::MissingField {
                                id: Some(patch.id.clone()),
                                field: "fallback.lines",
                            });
                        }
                        if let Some(sentinel) = &patch.sentinel {
                            if !fallback.lines.iter().any(|l| l.contains(sentinel.as_str())) {
                                issues.push(ValidationIssue::Invalid {
                                    id: Some(patch.id.clone()),
                                    message: "no fallback line contains the sentinel".to_string(),
                                });
                            }
                        }
                    }
                }
                Rewrite::Pattern { pattern, .. } => {
                    if pattern.is_empty() {
                        issues.push(ValidationIssue::MissingField {
                            id: Some(patch.id.clone()),
                            field: "rewrite.pattern",
                        });
                    } else if let Err(e) = cache::get_or_compile(pattern) {
                        issues.push(ValidationIssue::Invalid {
                            id: Some(patch.id.clone()),
                            message: format!("pattern does not compile: {e}"),
                        });
                    }
                }
            }
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { issues })
        }
    }

    /// Repository-relative target files, deduplicated, in first-seen order.
    pub fn target_files(&self) -> Vec<&str> {
        let mut seen = Vec::new();
        for patch in &self.patches {
            if !seen.contains(&patch.file.as_str()) {
                seen.push(patch.file.as_str());
            }
        }
        seen
    }
}

impl RulesFile {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut issues = Vec::new();

        if self.rules.is_empty() {
            issues.push(ValidationIssue::EmptyList { what: "rules" });
        }

        for (index, rule) in self.rules.iter().enumerate() {
            if rule.pattern.is_empty() {
                issues.push(ValidationIssue::MissingField {
                    id: Some(format!("rules[{index}]")),
                    field: "pattern",
                });
            } else if let Err(e) = cache::get_or_compile(&rule.pattern) {
                issues.push(ValidationIssue::Invalid {
                    id: Some(format!("rules[{index}]")),
                    message: format!("pattern does not compile: {e}"),
                });
            }
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { issues })
        }
    }
}

impl PatchDefinition {
    /// Short text used to rank candidate lines when this patch misses.
    pub fn probe(&self) -> &str {
        match &self.rewrite {
            Rewrite::Exact { needle, fallback, .. } => needle
                .lines()
                .find(|l| !l.trim().is_empty())
                .unwrap_or_else(|| {
                    fallback
                        .as_ref()
                        .map(|f| f.target.as_str())
                        .unwrap_or(needle.as_str())
                }),
            Rewrite::Pattern { pattern, .. } => pattern.as_str(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, issue) in self.issues.iter().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            write!(f, "{issue}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug, Clone)]
pub enum ValidationIssue {
    EmptyList {
        what: &'static str,
    },
    MissingField {
        id: Option<String>,
        field: &'static str,
    },
    Invalid {
        id: Option<String>,
        message: String,
    },
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationIssue::EmptyList { what } => write!(f, "spec contains no {what}"),
            ValidationIssue::MissingField { id, field } => match id {
                Some(id) => write!(f, "'{id}' missing required field '{field}'"),
                None => write!(f, "entry missing required field '{field}'"),
            },
            ValidationIssue::Invalid { id, message } => match id {
                Some(id) => write!(f, "'{id}' is invalid: {message}"),
                None => write!(f, "invalid entry: {message}"),
            },
        }
    }
}
