//! Collision detection.
//!
//! Two tiers:
//! 1. Diagnostics: identifiers whose occurrence count exceeds a ceiling, plus
//!    structural signals (several definitions, disagreeing labels).
//! 2. Planning: the caller's collision table (and, optionally, confirmed
//!    label conflicts) resolved against the document into the set of
//!    `(identifier, label)` pairs that will actually be re-keyed.
//!
//! Counts alone cannot tell a widely shared object from two objects sharing an
//! identifier. A label conflict can: every labelled occurrence of one logical
//! object carries the same `/* label */`.

use serde::Serialize;
use std::collections::{BTreeMap, HashSet};

use crate::config::CollisionEntry;
use crate::document::{Document, ListSite};
use crate::error::{Error, Result};
use crate::identifier::ObjectId;

/// Identifiers occurring more than `ceiling` times, with their counts.
pub fn detect(doc: &Document, ceiling: usize) -> BTreeMap<ObjectId, usize> {
    doc.ids()
        .map(|id| (id.clone(), doc.occurrence_count(id)))
        .filter(|(_, count)| *count > ceiling)
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Signal {
    /// More occurrences than a single object normally has.
    OverCeiling,
    /// Two or more definition headers.
    MultipleDefinitions,
    /// Labelled occurrences disagree on the label.
    LabelConflict,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LabelCount {
    pub label: String,
    pub count: usize,
}

/// An identifier flagged by at least one signal.
#[derive(Debug, Clone, Serialize)]
pub struct Suspect {
    pub id: ObjectId,
    pub occurrences: usize,
    pub definitions: usize,
    /// Labels in order of first appearance; the first is canonical.
    pub labels: Vec<LabelCount>,
    pub signals: Vec<Signal>,
    /// Several definitions or disagreeing labels: more than one object
    /// really shares this identifier.
    pub confirmed: bool,
    /// First `( ... )` list that references the identifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub listed_in: Option<ListSite>,
}

impl Suspect {
    /// Labels of the objects that should be re-keyed: all but the canonical one.
    pub fn duplicate_labels(&self) -> impl Iterator<Item = &str> {
        self.labels.iter().skip(1).map(|l| l.label.as_str())
    }
}

/// Collect every identifier flagged by a count or structural signal.
pub fn find_suspects(doc: &Document, ceiling: usize) -> Vec<Suspect> {
    let mut suspects = Vec::new();

    for id in doc.ids() {
        let occurrences = doc.occurrence_count(id);
        let definitions = doc.definitions_of(id).len();
        let labels: Vec<LabelCount> = doc
            .labels_of(id)
            .into_iter()
            .map(|(label, count)| LabelCount { label, count })
            .collect();

        let mut signals = Vec::new();
        if occurrences > ceiling {
            signals.push(Signal::OverCeiling);
        }
        if definitions > 1 {
            signals.push(Signal::MultipleDefinitions);
        }
        if labels.len() > 1 {
            signals.push(Signal::LabelConflict);
        }

        if signals.is_empty() {
            continue;
        }

        let confirmed =
            signals.contains(&Signal::LabelConflict) || signals.contains(&Signal::MultipleDefinitions);
        suspects.push(Suspect {
            id: id.clone(),
            occurrences,
            definitions,
            labels,
            signals,
            confirmed,
            listed_in: doc.children_list_containing(id),
        });
    }

    suspects
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanSource {
    /// Named in the caller's collision table.
    Table,
    /// Added from a confirmed label conflict.
    Auto,
}

/// One `(identifier, label)` pair that will receive a fresh identifier.
#[derive(Debug, Clone, Serialize)]
pub struct PlannedCollision {
    pub id: ObjectId,
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    pub source: PlanSource,
    /// Occurrences of `id` carrying `label`.
    pub occurrences: usize,
    /// Definitions of `id` carrying `label`.
    pub definitions: usize,
}

/// A table entry that needs no rewrite.
#[derive(Debug, Clone, Serialize)]
pub struct SkippedCollision {
    pub id: ObjectId,
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CollisionPlan {
    pub actionable: Vec<PlannedCollision>,
    pub skipped: Vec<SkippedCollision>,
}

impl CollisionPlan {
    pub fn is_empty(&self) -> bool {
        self.actionable.is_empty()
    }
}

/// Resolve the collision table (and optional auto suspects) against `doc`.
pub fn plan(
    doc: &Document,
    table: &[CollisionEntry],
    auto: Option<&[Suspect]>,
) -> Result<CollisionPlan> {
    let mut plan = CollisionPlan::default();
    let mut seen: HashSet<(ObjectId, String)> = HashSet::new();

    for entry in table {
        let id = doc.format().parse(&entry.id).ok_or_else(|| {
            Error::config_invalid_value(
                "collisions",
                Some(entry.id.clone()),
                format!(
                    "Not a {}-character identifier over '{}'",
                    doc.format().width(),
                    doc.format().alphabet()
                ),
            )
        })?;

        if !seen.insert((id.clone(), entry.label.clone())) {
            continue;
        }

        let records = doc.occurrence_records(&id);
        let matching: Vec<_> = records.iter().filter(|o| o.has_label(&entry.label)).collect();

        if matching.is_empty() {
            plan.skipped.push(SkippedCollision {
                id,
                label: entry.label.clone(),
                file: entry.file.clone(),
                reason: "No occurrence carries this label; already resolved".to_string(),
            });
            continue;
        }

        let distinct_labels = doc.labels_of(&id).len();
        let definitions = doc.definitions_of(&id).len();
        if distinct_labels <= 1 && definitions <= 1 {
            plan.skipped.push(SkippedCollision {
                id,
                label: entry.label.clone(),
                file: entry.file.clone(),
                reason: "Identifier is used by a single object; nothing to separate".to_string(),
            });
            continue;
        }

        plan.actionable.push(PlannedCollision {
            id,
            label: entry.label.clone(),
            file: entry.file.clone(),
            source: PlanSource::Table,
            occurrences: matching.len(),
            definitions: matching.iter().filter(|o| o.is_definition()).count(),
        });
    }

    for suspect in auto.unwrap_or_default().iter().filter(|s| s.confirmed) {
        for label in suspect.duplicate_labels() {
            if !seen.insert((suspect.id.clone(), label.to_string())) {
                continue;
            }

            let matching: Vec<_> = doc
                .occurrence_records(&suspect.id)
                .into_iter()
                .filter(|o| o.has_label(label))
                .collect();

            plan.actionable.push(PlannedCollision {
                id: suspect.id.clone(),
                label: label.to_string(),
                file: None,
                source: PlanSource::Auto,
                occurrences: matching.len(),
                definitions: matching.iter().filter(|o| o.is_definition()).count(),
            });
        }
    }

    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::tests::{dialect, FILE, GROUP, ROOT};

    fn colliding() -> Document {
        let text = format!(
            "{{ objects = {{\n\
{GROUP} /* Main.swift in Sources */ = {{isa = PBXBuildFile; fileRef = {FILE} /* Main.swift */; }};\n\
{GROUP} /* Core */ = {{isa = PBXGroup; children = ( ); }};\n\
{FILE} /* Main.swift */ = {{isa = PBXFileReference; }};\n\
{ROOT} = {{ children = ( {GROUP} /* Core */ ); files = ( {GROUP} /* Main.swift in Sources */ ); }};\n\
}}; }}"
        );
        Document::load(text, &dialect())
    }

    fn id(token: &str) -> ObjectId {
        ObjectId::new_unchecked(token)
    }

    #[test]
    fn detect_reports_counts_over_ceiling() {
        let doc = colliding();
        let counts = detect(&doc, 2);
        assert_eq!(counts.get(&id(GROUP)), Some(&4));
        assert!(!counts.contains_key(&id(FILE)));
    }

    #[test]
    fn shared_identifier_with_one_label_is_not_confirmed() {
        let text = format!(
            "{{ objects = {{ {GROUP} /* Core */ = {{ }}; {ROOT} = {{ a = ( {GROUP} /* Core */ ); b = ( {GROUP} /* Core */ ); }}; }}; }}"
        );
        let doc = Document::load(text, &dialect());
        let suspects = find_suspects(&doc, 2);

        assert_eq!(suspects.len(), 1);
        assert_eq!(suspects[0].signals, vec![Signal::OverCeiling]);
        assert!(!suspects[0].confirmed);
    }

    #[test]
    fn label_conflict_confirms_and_orders_labels() {
        let doc = colliding();
        let suspects = find_suspects(&doc, 2);
        let group = suspects.iter().find(|s| s.id == id(GROUP)).unwrap();

        assert!(group.confirmed);
        assert_eq!(group.definitions, 2);
        assert!(group.signals.contains(&Signal::MultipleDefinitions));
        assert_eq!(group.labels[0].label, "Main.swift in Sources");
        assert_eq!(group.duplicate_labels().collect::<Vec<_>>(), vec!["Core"]);

        let site = group.listed_in.as_ref().unwrap();
        assert_eq!(site.field.as_deref(), Some("children"));
        assert!(doc.text()[site.range.clone()].contains("/* Core */"));
    }

    #[test]
    fn plan_uses_table_and_skips_resolved_entries() {
        let doc = colliding();
        let table = vec![
            CollisionEntry {
                id: GROUP.to_string(),
                label: "Core".to_string(),
                file: Some("Main.swift".to_string()),
            },
            CollisionEntry {
                id: GROUP.to_string(),
                label: "Views".to_string(),
                file: None,
            },
        ];

        let plan = plan(&doc, &table, None).unwrap();
        assert_eq!(plan.actionable.len(), 1);
        assert_eq!(plan.actionable[0].label, "Core");
        assert_eq!(plan.actionable[0].occurrences, 2);
        assert_eq!(plan.actionable[0].definitions, 1);
        assert_eq!(plan.actionable[0].source, PlanSource::Table);
        assert_eq!(plan.skipped.len(), 1);
        assert_eq!(plan.skipped[0].label, "Views");
    }

    #[test]
    fn plan_skips_identifier_owned_by_single_object() {
        let doc = colliding();
        let table = vec![CollisionEntry {
            id: FILE.to_string(),
            label: "Main.swift".to_string(),
            file: None,
        }];

        let plan = plan(&doc, &table, None).unwrap();
        assert!(plan.is_empty());
        assert_eq!(plan.skipped.len(), 1);
    }

    #[test]
    fn plan_auto_adds_duplicate_labels_once() {
        let doc = colliding();
        let suspects = find_suspects(&doc, 2);
        let table = vec![CollisionEntry {
            id: GROUP.to_string(),
            label: "Core".to_string(),
            file: None,
        }];

        let plan = plan(&doc, &table, Some(&suspects)).unwrap();
        assert_eq!(plan.actionable.len(), 1);
        assert_eq!(plan.actionable[0].source, PlanSource::Table);

        let plan = super::plan(&doc, &[], Some(&suspects)).unwrap();
        assert_eq!(plan.actionable.len(), 1);
        assert_eq!(plan.actionable[0].source, PlanSource::Auto);
        assert_eq!(plan.actionable[0].label, "Core");
    }

    #[test]
    fn plan_rejects_malformed_identifier() {
        let doc = colliding();
        let table = vec![CollisionEntry {
            id: "not-an-id".to_string(),
            label: "Core".to_string(),
            file: None,
        }];

        let err = plan(&doc, &table, None).unwrap_err();
        assert_eq!(err.code.as_str(), "config.invalid_value");
    }
}
