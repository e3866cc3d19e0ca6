//! Rewrite engine: re-key the occurrences of duplicate objects.
//!
//! Every rewrite is qualified by the label comment next to the token. For a
//! replacement `(old, label) -> new`, the engine patches:
//! - the definition header `old /* label */ = {`
//! - every other `old /* label */` occurrence
//!
//! Occurrences of `old` with another label (or none) belong to the canonical
//! object and are left alone. All target offsets are taken from the input
//! snapshot and patched from the end of the text backwards, so one
//! replacement can never see text written by another.

use rand::RngCore;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};

use crate::detect::CollisionPlan;
use crate::document::Document;
use crate::error::Result;
use crate::identifier::{IdGenerator, ObjectId};

/// One `(old, label) -> new` assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Replacement {
    pub old: ObjectId,
    pub new: ObjectId,
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

/// Replacements chosen for one run.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct ReplacementMapping {
    entries: Vec<Replacement>,
}

impl ReplacementMapping {
    /// Mint one fresh identifier per planned collision.
    ///
    /// `existing` must hold every token in the document; it grows with each
    /// minted identifier.
    pub fn mint<R: RngCore>(
        plan: &CollisionPlan,
        generator: &mut IdGenerator<R>,
        existing: &mut HashSet<ObjectId>,
    ) -> Result<Self> {
        let fresh = generator.mint_n(plan.actionable.len(), existing)?;

        let entries = plan
            .actionable
            .iter()
            .zip(fresh)
            .map(|(planned, new)| Replacement {
                old: planned.id.clone(),
                new,
                label: planned.label.clone(),
                file: planned.file.clone(),
            })
            .collect();

        Ok(Self { entries })
    }

    pub fn from_entries(entries: Vec<Replacement>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[Replacement] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Keys are distinct, new identifiers are distinct, and no new identifier
    /// is also an old one.
    pub fn is_injective(&self) -> bool {
        let mut keys = HashSet::new();
        let mut news = HashSet::new();
        let olds: HashSet<&ObjectId> = self.entries.iter().map(|r| &r.old).collect();

        self.entries.iter().all(|r| {
            keys.insert((&r.old, r.label.as_str()))
                && news.insert(&r.new)
                && !olds.contains(&r.new)
        })
    }
}

/// What one replacement touched.
#[derive(Debug, Clone, Serialize)]
pub struct RewriteStats {
    pub old: ObjectId,
    pub new: ObjectId,
    pub label: String,
    pub definitions: usize,
    pub references: usize,
}

#[derive(Debug, Clone)]
pub struct RewriteOutcome {
    pub document: Document,
    pub stats: Vec<RewriteStats>,
    pub warnings: Vec<String>,
}

impl RewriteOutcome {
    pub fn total_patches(&self) -> usize {
        self.stats.iter().map(|s| s.definitions + s.references).sum()
    }
}

/// Apply `mapping` to `doc`, returning a new document. `doc` is untouched.
pub fn rewrite(doc: &Document, mapping: &ReplacementMapping) -> RewriteOutcome {
    // start offset -> (token length, replacement)
    let mut patches: BTreeMap<usize, (usize, &str)> = BTreeMap::new();
    let mut stats = Vec::new();
    let mut warnings = Vec::new();

    for replacement in mapping.entries() {
        let mut definitions = 0;
        let mut references = 0;

        for occurrence in doc.occurrence_records(&replacement.old) {
            if !occurrence.has_label(&replacement.label) {
                continue;
            }
            if patches.contains_key(&occurrence.offset) {
                continue;
            }
            patches.insert(
                occurrence.offset,
                (replacement.old.as_str().len(), replacement.new.as_str()),
            );
            if occurrence.is_definition() {
                definitions += 1;
            } else {
                references += 1;
            }
        }

        match definitions {
            0 => warnings.push(format!(
                "No definition of {} labelled '{}' found",
                replacement.old, replacement.label
            )),
            1 => {}
            n => warnings.push(format!(
                "{} definitions of {} labelled '{}' share replacement {}",
                n, replacement.old, replacement.label, replacement.new
            )),
        }
        if references == 0 {
            warnings.push(format!(
                "No references to {} labelled '{}' found",
                replacement.old, replacement.label
            ));
        }

        stats.push(RewriteStats {
            old: replacement.old.clone(),
            new: replacement.new.clone(),
            label: replacement.label.clone(),
            definitions,
            references,
        });
    }

    let mut text = doc.text().to_string();
    for (&start, &(len, new)) in patches.iter().rev() {
        text.replace_range(start..start + len, new);
    }

    let document = if patches.is_empty() {
        doc.clone()
    } else {
        doc.with_text(text)
    };

    RewriteOutcome {
        document,
        stats,
        warnings,
    }
}
