//! End-to-end patch application: spec file in, patched document out, and the
//! fetch/patch/publish flow against the in-memory store.

use proptest::prelude::*;
use remote_hotfix::applier::{self, ApplyStatus};
use remote_hotfix::config;
use remote_hotfix::remote::{FileStore, MemoryStore, StoreError};
use std::path::Path;

const SPEC: &str = r#"
[meta]
name = "knowledge-json-fallback"
repo = "acme/site"
branch = "main"
message = "fix: tolerate plain-text responses"

[[patches]]
id = "json-fallback"
file = "client/src/pages/knowledge.tsx"
sentinel = "HOTFIX(json-fallback)"

[patches.rewrite]
type = "exact"
needle = """      const data = await response.json();
      setAiAnswer(data.answer || 'No answer provided');"""
replacement = """      // HOTFIX(json-fallback): tolerate plain-text responses
      const responseText = await response.text();
      let finalAnswer;
      try {
        finalAnswer = JSON.parse(responseText).answer || responseText;
      } catch (jsonError) {
        finalAnswer = responseText;
      }
      setAiAnswer(finalAnswer || 'No answer provided');"""

[patches.rewrite.fallback]
precondition = "await response.json()"
context = "handleAskAI"
target = "const data = await response.json()"
lines = [
  "// HOTFIX(json-fallback): tolerate plain-text responses",
  "const responseText = await response.text();",
  "let finalAnswer;",
  "try {",
  "  finalAnswer = JSON.parse(responseText).answer || responseText;",
  "} catch (jsonError) {",
  "  finalAnswer = responseText;",
  "}",
  "setAiAnswer(finalAnswer || 'No answer provided');",
]
consume_next = "setAiAnswer"
"#;

const DOCUMENT: &str = r#"import { ask } from '../api';

export function KnowledgePage() {
  const handleAskAI = async () => {
    try {
      const response = await fetch(WORKER_URL, { method: 'POST' });
      const data = await response.json();
      setAiAnswer(data.answer || 'No answer provided');
    } catch (err) {
      setAiAnswer('Something went wrong');
    }
  };
}
"#;

/// The same page after an upstream reformat: wider indentation, so the
/// exact needle no longer matches but the call site is still there.
const DRIFTED_DOCUMENT: &str = r#"import { ask } from '../api';

export function KnowledgePage() {
    const handleAskAI = async () => {
        try {
            const response = await fetch(WORKER_URL, { method: 'POST' });
            const data = await response.json();
            setAiAnswer(data.answer || 'No answer provided');
        } catch (err) {
            setAiAnswer('Something went wrong');
        }
    };
}
"#;

fn load_patch() -> remote_hotfix::PatchDefinition {
    let spec = config::spec_from_str(SPEC, Path::new("spec.toml")).unwrap();
    spec.patches[0].clone()
}

#[test]
fn exact_application_embeds_sentinel_exactly_once() {
    let patch = load_patch();

    let outcome = applier::apply(DOCUMENT, &patch).unwrap();
    assert_eq!(outcome.status, ApplyStatus::AppliedExact);
    assert_eq!(outcome.text.matches("HOTFIX(json-fallback)").count(), 1);
    assert!(!outcome.text.contains("const data = await response.json()"));
}

#[test]
fn reapplying_after_success_is_a_noop() {
    let patch = load_patch();

    let first = applier::apply(DOCUMENT, &patch).unwrap();
    let second = applier::apply(&first.text, &patch).unwrap();

    assert_eq!(second.status, ApplyStatus::AlreadyApplied);
    assert_eq!(second.text, first.text);
}

#[test]
fn heuristic_rescues_drifted_document_with_its_indentation() {
    let patch = load_patch();

    let outcome = applier::apply(DRIFTED_DOCUMENT, &patch).unwrap();
    assert_eq!(outcome.status, ApplyStatus::AppliedHeuristic);

    // Inserted lines carry the drifted document's 12-space indentation.
    assert!(outcome
        .text
        .contains("            const responseText = await response.text();"));
    // Both the parse line and the trailing setAiAnswer assignment are gone,
    // replaced by the spliced block's own assignment.
    assert!(!outcome.text.contains("await response.json()"));
    assert_eq!(outcome.text.matches("setAiAnswer(finalAnswer").count(), 1);

    // And the heuristic result is itself idempotent.
    let again = applier::apply(&outcome.text, &patch).unwrap();
    assert_eq!(again.status, ApplyStatus::AlreadyApplied);
}

#[test]
fn unrelated_document_is_returned_byte_identical() {
    let patch = load_patch();
    let unrelated = "export function Unrelated() { return null; }\n";

    let outcome = applier::apply(unrelated, &patch).unwrap();
    assert_eq!(outcome.status, ApplyStatus::NotFound);
    assert_eq!(outcome.text, unrelated);
}

#[test]
fn fetch_patch_publish_round_trip_through_store() {
    let patch = load_patch();
    let store = MemoryStore::new();
    store.insert("client/src/pages/knowledge.tsx", DOCUMENT);

    let doc = store.fetch("client/src/pages/knowledge.tsx").unwrap();
    let outcome = applier::apply(&doc.content, &patch).unwrap();
    assert!(outcome.status.is_change());

    let receipt = store
        .publish(&doc.path, &outcome.text, &doc.token, "fix: hotfix")
        .unwrap();
    assert_ne!(receipt.token, doc.token);

    // A second run sees the sentinel and never writes.
    let doc = store.fetch("client/src/pages/knowledge.tsx").unwrap();
    let outcome = applier::apply(&doc.content, &patch).unwrap();
    assert_eq!(outcome.status, ApplyStatus::AlreadyApplied);
}

#[test]
fn publish_with_stale_token_is_rejected_and_store_untouched() {
    let patch = load_patch();
    let store = MemoryStore::new();
    store.insert("client/src/pages/knowledge.tsx", DOCUMENT);

    let doc = store.fetch("client/src/pages/knowledge.tsx").unwrap();
    let outcome = applier::apply(&doc.content, &patch).unwrap();

    // Someone else edits the file between our fetch and publish.
    store.insert("client/src/pages/knowledge.tsx", "// rewritten upstream\n");

    let err = store
        .publish(&doc.path, &outcome.text, &doc.token, "fix: hotfix")
        .unwrap_err();
    assert!(matches!(err, StoreError::Conflict { .. }));
    assert_eq!(
        store.content("client/src/pages/knowledge.tsx").as_deref(),
        Some("// rewritten upstream\n")
    );
}

proptest! {
    /// apply(apply(doc)) == apply(doc): the second pass either sees the
    /// sentinel or finds nothing left to do, and never changes the text.
    #[test]
    fn applying_twice_equals_applying_once(doc in "[a-z ().;\n]{0,200}", with_needle in any::<bool>()) {
        let patch = load_patch();

        let mut doc = doc;
        if with_needle {
            doc.push_str("\n  const handleAskAI = async () => {\n");
            doc.push_str("      const data = await response.json();\n");
            doc.push_str("      setAiAnswer(data.answer || 'No answer provided');\n");
        }

        let once = applier::apply(&doc, &patch).unwrap();
        let twice = applier::apply(&once.text, &patch).unwrap();

        prop_assert_eq!(&twice.text, &once.text);
        if once.status == ApplyStatus::NotFound {
            prop_assert_eq!(&once.text, &doc);
        }
    }
}
