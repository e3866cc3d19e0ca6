//! Literal point-fix primitives.
//!
//! Both primitives are idempotent, and both are no-ops (not errors) when the
//! target text is absent.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::config::RepairConfig;
use crate::document::{Dialect, Document};
use crate::error::{Error, Result};
use crate::repair::RunOutcome;
use crate::transaction::Transaction;
use crate::utils::{io, validation};
use crate::validate::{self, ValidationReport};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PatchKind {
    RemoveExactLine,
    ReplaceExactToken,
}

#[derive(Debug, Clone, Serialize)]
pub struct PatchOutcome {
    pub kind: PatchKind,
    pub target: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replacement: Option<String>,
    pub matches: usize,
    pub applied: bool,
}

/// Remove every line whose trimmed content equals the trimmed `literal`,
/// line terminator included.
pub fn remove_exact_line(doc: &Document, literal: &str) -> Result<(Document, PatchOutcome)> {
    let wanted = literal.trim();
    validation::require_non_empty(wanted, "remove_line", "Line to remove cannot be empty")?;

    let mut kept = String::with_capacity(doc.text().len());
    let mut matches = 0;
    for line in doc.text().split_inclusive('\n') {
        if line.trim() == wanted {
            matches += 1;
        } else {
            kept.push_str(line);
        }
    }

    let outcome = PatchOutcome {
        kind: PatchKind::RemoveExactLine,
        target: wanted.to_string(),
        replacement: None,
        matches,
        applied: matches > 0,
    };
    let document = if matches > 0 {
        doc.with_text(kept)
    } else {
        doc.clone()
    };

    Ok((document, outcome))
}

/// Replace every literal occurrence of `old` with `new`.
///
/// When `new` extends `old` (`old` followed by a suffix), occurrences that
/// already carry the suffix are left alone, so inserting a line after an
/// anchor runs once. Any other `new` containing `old` is rejected.
pub fn replace_exact_token(
    doc: &Document,
    old: &str,
    new: &str,
) -> Result<(Document, PatchOutcome)> {
    validation::require_non_empty(old, "replace", "Text to replace cannot be empty")?;
    let suffix = new.strip_prefix(old);
    if suffix.unwrap_or(new).contains(old) {
        return Err(not_idempotent(old, new));
    }

    let pending = pending_offsets(doc.text(), old, suffix);
    let matches = pending.len();
    let outcome = PatchOutcome {
        kind: PatchKind::ReplaceExactToken,
        target: old.to_string(),
        replacement: Some(new.to_string()),
        matches,
        applied: matches > 0,
    };
    if matches == 0 {
        return Ok((doc.clone(), outcome));
    }

    let text = doc.text();
    let mut patched = String::with_capacity(text.len() + matches * new.len());
    let mut cursor = 0;
    for offset in pending {
        patched.push_str(&text[cursor..offset]);
        patched.push_str(new);
        cursor = offset + old.len();
    }
    patched.push_str(&text[cursor..]);

    if !pending_offsets(&patched, old, suffix).is_empty() {
        return Err(not_idempotent(old, new));
    }

    Ok((doc.with_text(patched), outcome))
}

/// Offsets of `old` in `text` still to be replaced. With a `suffix`,
/// occurrences already followed by it are done.
fn pending_offsets(text: &str, old: &str, suffix: Option<&str>) -> Vec<usize> {
    text.match_indices(old)
        .map(|(offset, _)| offset)
        .filter(|&offset| suffix.is_none_or(|s| !text[offset + old.len()..].starts_with(s)))
        .collect()
}

fn not_idempotent(old: &str, new: &str) -> Error {
    Error::validation_invalid_argument(
        "replace",
        format!(
            "Replacement '{}' would match '{}' again on the next run",
            new, old
        ),
        None,
        None,
    )
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenReplacement {
    pub from: String,
    pub to: String,
}

/// Ordered point-fixes: line removals first, then replacements.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PatchScript {
    #[serde(default)]
    pub remove_lines: Vec<String>,
    #[serde(default)]
    pub replacements: Vec<TokenReplacement>,
}

impl PatchScript {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = io::read_file(path, &format!("read patch script {}", path.display()))?;
        serde_json::from_str(&raw)
            .map_err(|e| Error::config_invalid_json(path.display().to_string(), e))
    }

    pub fn is_empty(&self) -> bool {
        self.remove_lines.is_empty() && self.replacements.is_empty()
    }

    /// Append another script's steps after this one's.
    pub fn extend(&mut self, other: PatchScript) {
        self.remove_lines.extend(other.remove_lines);
        self.replacements.extend(other.replacements);
    }
}

pub fn apply_script(doc: &Document, script: &PatchScript) -> Result<(Document, Vec<PatchOutcome>)> {
    let mut current = doc.clone();
    let mut outcomes = Vec::new();

    for line in &script.remove_lines {
        let (next, outcome) = remove_exact_line(&current, line)?;
        current = next;
        outcomes.push(outcome);
    }
    for step in &script.replacements {
        let (next, outcome) = replace_exact_token(&current, &step.from, &step.to)?;
        current = next;
        outcomes.push(outcome);
    }

    Ok((current, outcomes))
}

#[derive(Debug, Clone, Serialize)]
pub struct PatchReport {
    pub path: String,
    pub generated_at: String,
    pub original_sha256: String,
    pub final_sha256: String,
    pub patches: Vec<PatchOutcome>,
    pub validation: ValidationReport,
    pub outcome: RunOutcome,
}

/// Apply `script` to the file at `path` through validation and the
/// transaction controller.
pub fn patch_file(
    path: &Path,
    script: &PatchScript,
    config: &RepairConfig,
    dry_run: bool,
) -> Result<PatchReport> {
    let dialect = Dialect::from_config(config)?;
    let mut tx = Transaction::load(path, &dialect)?;

    let (patched, patches) = match apply_script(tx.original(), script) {
        Ok(result) => result,
        Err(e) => {
            tx.rollback()?;
            return Err(e);
        }
    };

    for outcome in &patches {
        if outcome.applied {
            log_status!("patch", "{:?}: {} match(es) for '{}'", outcome.kind, outcome.matches, outcome.target);
        } else {
            log_status!("patch", "{:?}: '{}' not found, skipped", outcome.kind, outcome.target);
        }
    }

    let changed = patches.iter().any(|p| p.applied);
    let mut report = PatchReport {
        path: path.display().to_string(),
        generated_at: Utc::now().to_rfc3339(),
        original_sha256: io::content_digest(tx.original().text().as_bytes()),
        final_sha256: io::content_digest(patched.text().as_bytes()),
        patches,
        validation: validate::validate(&patched, config, &[]),
        outcome: RunOutcome::Unchanged,
    };

    if !report.validation.passed() {
        tx.rollback()?;
        report.outcome = RunOutcome::RolledBack;
        let failed = report.validation.failed_checks();
        let details = serde_json::to_value(&report)
            .map_err(|e| Error::internal_json(e.to_string(), Some("serialize report".into())))?;
        return Err(Error::repair_validation_failed(&failed, details));
    }

    if !changed {
        tx.rollback()?;
        return Ok(report);
    }

    if dry_run {
        tx.rollback()?;
        report.outcome = RunOutcome::DryRun;
        return Ok(report);
    }

    tx.stage(patched)?;
    report.final_sha256 = tx.commit()?;
    report.outcome = RunOutcome::Committed;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::tests::{dialect, FILE, GROUP};

    fn doc() -> Document {
        let text = format!(
            "{{ objects = {{\n\
\t\t{FILE} /* Info.plist in Resources */ = {{isa = PBXBuildFile; fileRef = {GROUP} /* Info.plist */; }};\n\
\t\t{GROUP} /* Info.plist */ = {{isa = PBXFileReference; }};\n\
\t\tGENERATE_INFOPLIST_FILE = YES;\n\
\t\tGENERATE_INFOPLIST_FILE = YES;\n\
}}; }}\n"
        );
        Document::load(text, &dialect())
    }

    #[test]
    fn remove_absent_line_is_noop() {
        let doc = doc();
        let (after, outcome) = remove_exact_line(&doc, "not in the document;").unwrap();

        assert!(!outcome.applied);
        assert_eq!(outcome.matches, 0);
        assert_eq!(after.text(), doc.text());
    }

    #[test]
    fn remove_line_drops_whole_line_and_is_idempotent() {
        let doc = doc();
        let line = format!(
            "{FILE} /* Info.plist in Resources */ = {{isa = PBXBuildFile; fileRef = {GROUP} /* Info.plist */; }};"
        );

        let (once, outcome) = remove_exact_line(&doc, &line).unwrap();
        assert_eq!(outcome.matches, 1);
        assert!(!once.text().contains("in Resources"));
        assert_eq!(once.text().lines().count(), doc.text().lines().count() - 1);

        let (twice, outcome) = remove_exact_line(&once, &line).unwrap();
        assert!(!outcome.applied);
        assert_eq!(twice.text(), once.text());
    }

    #[test]
    fn replace_token_counts_every_match() {
        let doc = doc();
        let (after, outcome) = replace_exact_token(
            &doc,
            "GENERATE_INFOPLIST_FILE = YES;",
            "GENERATE_INFOPLIST_FILE = NO;",
        )
        .unwrap();

        assert_eq!(outcome.matches, 2);
        assert!(!after.text().contains("= YES;"));
    }

    #[test]
    fn replacement_wrapping_original_is_rejected() {
        let err = replace_exact_token(&doc(), "YES", "NOT YES").unwrap_err();
        assert_eq!(err.code.as_str(), "validation.invalid_argument");

        let err = replace_exact_token(&doc(), "YES", "YES YES").unwrap_err();
        assert_eq!(err.code.as_str(), "validation.invalid_argument");
    }

    #[test]
    fn line_inserted_after_anchor_runs_once() {
        let anchor = "GENERATE_INFOPLIST_FILE = NO;";
        let insertion = "GENERATE_INFOPLIST_FILE = NO;\n\t\t\t\tINFOPLIST_FILE = StreamApp/Info.plist;";
        let doc = doc();
        let doc = doc.with_text(doc.text().replace("GENERATE_INFOPLIST_FILE = YES;", anchor));

        let (once, outcome) = replace_exact_token(&doc, anchor, insertion).unwrap();
        assert_eq!(outcome.matches, 2);
        assert!(outcome.applied);
        assert_eq!(once.text().matches("INFOPLIST_FILE = StreamApp/Info.plist;").count(), 2);

        let (twice, outcome) = replace_exact_token(&once, anchor, insertion).unwrap();
        assert!(!outcome.applied);
        assert_eq!(outcome.matches, 0);
        assert_eq!(twice.text(), once.text());
    }

    #[test]
    fn identical_replacement_is_noop() {
        let doc = doc();
        let (after, outcome) = replace_exact_token(&doc, "YES", "YES").unwrap();
        assert!(!outcome.applied);
        assert_eq!(after.text(), doc.text());
    }

    #[test]
    fn empty_targets_are_rejected() {
        assert!(remove_exact_line(&doc(), "   ").is_err());
        assert!(replace_exact_token(&doc(), "", "x").is_err());
    }

    #[test]
    fn script_applies_removals_then_replacements() {
        let script: PatchScript = serde_json::from_str(
            r#"{"remove_lines": ["GENERATE_INFOPLIST_FILE = YES;"],
                "replacements": [{"from": "GENERATE_INFOPLIST_FILE = YES;", "to": "X"}]}"#,
        )
        .unwrap();

        let (after, outcomes) = apply_script(&doc(), &script).unwrap();
        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0].matches, 2);
        assert!(!outcomes[1].applied);
        assert!(!after.text().contains("GENERATE_INFOPLIST_FILE"));
    }
}
