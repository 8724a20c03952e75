//! Idempotent patch application over document text.
//!
//! The applier is a pure function: given a fetched document and one patch
//! definition it produces the new text plus a status, with no I/O and no
//! hidden state. Callers decide whether the result is worth writing back.
//!
//! Application ladder:
//! 1. Sentinel scan - a prior successful run left its marker, so stop.
//! 2. Exact match - replace the leftmost occurrence of the needle.
//! 3. Heuristic fallback - line-oriented splice inside the anchor block,
//!    used when formatting drift broke the exact needle.
//! 4. Not found - return the input untouched.

use crate::cache;
use crate::config::schema::{Fallback, PatchDefinition, Rewrite};
use thiserror::Error;

/// Backward scan distance, in lines, when checking that a candidate line
/// sits inside the enclosing block named by `Fallback::context`.
pub const CONTEXT_WINDOW_LINES: usize = 20;

/// How a patch application concluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyStatus {
    /// The needle was found verbatim and replaced.
    AppliedExact,
    /// The needle was absent; the line-based fallback spliced the fix in.
    AppliedHeuristic,
    /// The sentinel marker is already present; nothing was changed.
    AlreadyApplied,
    /// Neither sentinel, needle, nor fallback precondition matched.
    NotFound,
}

impl ApplyStatus {
    /// True when the outcome carries modified text that should be written.
    pub fn is_change(self) -> bool {
        matches!(self, ApplyStatus::AppliedExact | ApplyStatus::AppliedHeuristic)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ApplyStatus::AppliedExact => "exact",
            ApplyStatus::AppliedHeuristic => "heuristic",
            ApplyStatus::AlreadyApplied => "already-applied",
            ApplyStatus::NotFound => "not-found",
        }
    }
}

impl std::fmt::Display for ApplyStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of running one patch against one document.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "PatchOutcome should be checked before deciding to publish"]
pub struct PatchOutcome {
    /// Document text after application. Identical to the input for
    /// `AlreadyApplied` and `NotFound`.
    pub text: String,
    pub status: ApplyStatus,
}

#[derive(Error, Debug)]
pub enum ApplyError {
    #[error("invalid pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        source: regex::Error,
    },
}

/// Apply a single patch definition to a document.
///
/// Deterministic and side-effect free. Re-applying the outcome's text with
/// the same patch is a no-op: either the sentinel is detected or the needle
/// is gone.
pub fn apply(document: &str, patch: &PatchDefinition) -> Result<PatchOutcome, ApplyError> {
    if let Some(sentinel) = &patch.sentinel {
        if document.contains(sentinel.as_str()) {
            return Ok(PatchOutcome {
                text: document.to_string(),
                status: ApplyStatus::AlreadyApplied,
            });
        }
    }

    match &patch.rewrite {
        Rewrite::Exact {
            needle,
            replacement,
            fallback,
        } => Ok(apply_exact(document, needle, replacement, fallback.as_ref())),
        Rewrite::Pattern {
            pattern,
            replacement,
        } => apply_pattern(document, pattern, replacement),
    }
}

/// Exact substring replacement with heuristic fallback.
///
/// Only the leftmost occurrence is replaced. Multiple occurrences are not
/// disambiguated; the patches this tool exists for target one call site.
fn apply_exact(
    document: &str,
    needle: &str,
    replacement: &str,
    fallback: Option<&Fallback>,
) -> PatchOutcome {
    if document.contains(needle) {
        return PatchOutcome {
            text: document.replacen(needle, replacement, 1),
            status: ApplyStatus::AppliedExact,
        };
    }

    if let Some(fallback) = fallback {
        if document.contains(fallback.precondition.as_str()) {
            if let Some(text) = splice_fallback(document, fallback) {
                return PatchOutcome {
                    text,
                    status: ApplyStatus::AppliedHeuristic,
                };
            }
        }
    }

    PatchOutcome {
        text: document.to_string(),
        status: ApplyStatus::NotFound,
    }
}

/// Global regex substitution. Reported as an exact application: the match is
/// literal per pattern, with no positional guessing involved.
fn apply_pattern(
    document: &str,
    pattern: &str,
    replacement: &str,
) -> Result<PatchOutcome, ApplyError> {
    let re = cache::get_or_compile(pattern).map_err(|source| ApplyError::Pattern {
        pattern: pattern.to_string(),
        source,
    })?;

    if !re.is_match(document) {
        return Ok(PatchOutcome {
            text: document.to_string(),
            status: ApplyStatus::NotFound,
        });
    }

    Ok(PatchOutcome {
        text: re.replace_all(document, replacement).into_owned(),
        status: ApplyStatus::AppliedExact,
    })
}

/// Line-oriented fallback splice.
///
/// Walks the document looking for the first line containing `target` that
/// sits within `CONTEXT_WINDOW_LINES` lines below a line containing
/// `context` (the enclosing block marker). The fallback lines are inserted
/// in its place, each carrying the candidate line's leading whitespace, and
/// the following line is consumed too when it matches `consume_next`.
///
/// Returns `None` when no eligible candidate line exists.
fn splice_fallback(document: &str, fallback: &Fallback) -> Option<String> {
    let lines: Vec<&str> = document.lines().collect();

    for (idx, line) in lines.iter().enumerate() {
        if !line.contains(fallback.target.as_str()) {
            continue;
        }

        let window_start = idx.saturating_sub(CONTEXT_WINDOW_LINES);
        let in_block = lines[window_start..idx]
            .iter()
            .any(|prior| prior.contains(fallback.context.as_str()));
        if !in_block {
            continue;
        }

        let indent = &line[..line.len() - line.trim_start().len()];

        let mut out: Vec<String> = lines[..idx].iter().map(|l| l.to_string()).collect();
        for inserted in &fallback.lines {
            out.push(format!("{indent}{inserted}"));
        }

        // Consume the matched line, plus the following line when it is the
        // assignment the fallback lines already account for.
        let mut resume = idx + 1;
        if let Some(next_pred) = &fallback.consume_next {
            if lines
                .get(resume)
                .is_some_and(|next| next.contains(next_pred.as_str()))
            {
                resume += 1;
            }
        }
        out.extend(lines[resume..].iter().map(|l| l.to_string()));

        let mut text = out.join("\n");
        if document.ends_with('\n') {
            text.push('\n');
        }
        return Some(text);
    }

    None
}

/// Lines of the document closest to `probe`, ranked by similarity.
///
/// Used for diagnostics when a patch reports `NotFound`: the operator gets
/// the best candidates instead of grepping the file by hand. Line numbers
/// are 1-based.
pub fn candidate_lines(document: &str, probe: &str, limit: usize) -> Vec<(usize, String)> {
    let probe = probe.trim();
    if probe.is_empty() || limit == 0 {
        return Vec::new();
    }

    let mut scored: Vec<(f64, usize, &str)> = document
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| {
            let score = strsim::normalized_levenshtein(line.trim(), probe);
            (score, idx + 1, line)
        })
        .collect();

    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

    scored
        .into_iter()
        .take(limit)
        .map(|(_, number, line)| (number, line.trim_end().to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{Fallback, PatchDefinition, Rewrite};

    fn exact_patch(needle: &str, replacement: &str, fallback: Option<Fallback>) -> PatchDefinition {
        PatchDefinition {
            id: "test".to_string(),
            file: "src/app.tsx".to_string(),
            sentinel: Some("PATCH(test)".to_string()),
            rewrite: Rewrite::Exact {
                needle: needle.to_string(),
                replacement: replacement.to_string(),
                fallback,
            },
        }
    }

    fn sample_fallback() -> Fallback {
        Fallback {
            precondition: "response.json()".to_string(),
            context: "handleAsk".to_string(),
            target: "const data = await response.json()".to_string(),
            lines: vec![
                "// PATCH(test)".to_string(),
                "const body = await response.text();".to_string(),
                "setAnswer(parse(body));".to_string(),
            ],
            consume_next: Some("setAnswer".to_string()),
        }
    }

    #[test]
    fn exact_match_replaces_leftmost_occurrence() {
        let doc = "aaa NEEDLE bbb NEEDLE ccc";
        let patch = exact_patch("NEEDLE", "FIX PATCH(test)", None);

        let outcome = apply(doc, &patch).unwrap();
        assert_eq!(outcome.status, ApplyStatus::AppliedExact);
        assert_eq!(outcome.text, "aaa FIX PATCH(test) bbb NEEDLE ccc");
    }

    #[test]
    fn sentinel_short_circuits_before_matching() {
        let doc = "already has PATCH(test) and NEEDLE";
        let patch = exact_patch("NEEDLE", "FIX PATCH(test)", None);

        let outcome = apply(doc, &patch).unwrap();
        assert_eq!(outcome.status, ApplyStatus::AlreadyApplied);
        assert_eq!(outcome.text, doc);
    }

    #[test]
    fn reapplication_is_a_noop() {
        let doc = "before NEEDLE after";
        let patch = exact_patch("NEEDLE", "FIX PATCH(test)", None);

        let first = apply(doc, &patch).unwrap();
        assert_eq!(first.status, ApplyStatus::AppliedExact);

        let second = apply(&first.text, &patch).unwrap();
        assert_eq!(second.status, ApplyStatus::AlreadyApplied);
        assert_eq!(second.text, first.text);
    }

    #[test]
    fn heuristic_fires_when_exact_fails_and_preserves_indent() {
        // The two-line needle never matches: the document was reformatted
        // with different indentation, which breaks it at the line boundary.
        let doc = "function handleAsk() {\n\
                   \x20       const data = await response.json();\n\
                   \x20       setAnswer(data.answer);\n\
                   }\n";
        let patch = exact_patch(
            "  const data = await response.json();\n  setAnswer(data.answer);",
            "unused PATCH(test)",
            Some(sample_fallback()),
        );

        let outcome = apply(doc, &patch).unwrap();
        assert_eq!(outcome.status, ApplyStatus::AppliedHeuristic);
        assert!(outcome.text.contains("        // PATCH(test)"));
        assert!(outcome.text.contains("        const body = await response.text();"));
        // Both the matched line and the trailing assignment are gone.
        assert!(!outcome.text.contains("response.json()"));
        assert!(!outcome.text.contains("setAnswer(data.answer)"));
        assert!(outcome.text.ends_with('\n'));
    }

    #[test]
    fn heuristic_requires_context_within_window() {
        // Target line present, but no enclosing block marker anywhere above.
        let doc = "const data = await response.json();\nsetAnswer(data.answer);\n";
        let patch = exact_patch("no such needle", "unused PATCH(test)", Some(sample_fallback()));

        let outcome = apply(doc, &patch).unwrap();
        assert_eq!(outcome.status, ApplyStatus::NotFound);
        assert_eq!(outcome.text, doc);
    }

    #[test]
    fn heuristic_skips_ineligible_candidate_then_matches_later_one() {
        let mut doc = String::from("const data = await response.json();\n");
        doc.push_str("function handleAsk() {\n");
        doc.push_str("    const data = await response.json();\n");
        doc.push_str("}\n");

        let patch = exact_patch("no such needle", "unused PATCH(test)", Some(sample_fallback()));
        let outcome = apply(&doc, &patch).unwrap();

        assert_eq!(outcome.status, ApplyStatus::AppliedHeuristic);
        // The bare top-level occurrence is untouched; the one inside the
        // function was rewritten.
        assert!(outcome.text.starts_with("const data = await response.json();\n"));
        assert!(outcome.text.contains("    const body = await response.text();"));
    }

    #[test]
    fn not_found_returns_input_byte_identical() {
        let doc = "nothing relevant here\n";
        let patch = exact_patch("missing", "unused PATCH(test)", None);

        let outcome = apply(doc, &patch).unwrap();
        assert_eq!(outcome.status, ApplyStatus::NotFound);
        assert_eq!(outcome.text, doc);
    }

    #[test]
    fn pattern_rewrite_replaces_globally() {
        let doc = "score_formula: 'weighted_average'\nscore_formula: 'weighted_average'\n";
        let patch = PatchDefinition {
            id: "avg".to_string(),
            file: "spec.ts".to_string(),
            sentinel: None,
            rewrite: Rewrite::Pattern {
                pattern: r"score_formula: 'weighted_average'".to_string(),
                replacement: "score_formula: 'average'".to_string(),
            },
        };

        let outcome = apply(doc, &patch).unwrap();
        assert_eq!(outcome.status, ApplyStatus::AppliedExact);
        assert_eq!(outcome.text.matches("'average'").count(), 2);
        assert!(!outcome.text.contains("weighted_average"));
    }

    #[test]
    fn pattern_rewrite_without_match_is_not_found() {
        let doc = "plain text";
        let patch = PatchDefinition {
            id: "p".to_string(),
            file: "f".to_string(),
            sentinel: None,
            rewrite: Rewrite::Pattern {
                pattern: r"\bnope\b".to_string(),
                replacement: "x".to_string(),
            },
        };

        let outcome = apply(doc, &patch).unwrap();
        assert_eq!(outcome.status, ApplyStatus::NotFound);
        assert_eq!(outcome.text, doc);
    }

    #[test]
    fn invalid_pattern_surfaces_as_error() {
        let patch = PatchDefinition {
            id: "bad".to_string(),
            file: "f".to_string(),
            sentinel: None,
            rewrite: Rewrite::Pattern {
                pattern: "(unclosed".to_string(),
                replacement: "x".to_string(),
            },
        };

        assert!(matches!(
            apply("doc", &patch),
            Err(ApplyError::Pattern { .. })
        ));
    }

    #[test]
    fn candidate_lines_rank_closest_first() {
        let doc = "import x from 'y';\n\nconst data = await response.json()\nunrelated();\n";
        let candidates = candidate_lines(doc, "const data = await response.json();", 2);

        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].0, 3);
        assert!(candidates[0].1.contains("response.json()"));
    }

    #[test]
    fn candidate_lines_empty_probe_yields_nothing() {
        assert!(candidate_lines("some text", "   ", 5).is_empty());
    }
}
