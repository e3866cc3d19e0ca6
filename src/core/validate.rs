//! Structural validation of a document.
//!
//! Checks never fail as errors; they return a report that callers inspect
//! with [`ValidationReport::passed`].

use serde::Serialize;
use std::ops::Range;

use crate::config::RepairConfig;
use crate::document::Document;
use crate::identifier::ObjectId;
use crate::rewrite::Replacement;

#[derive(Debug, Clone, Serialize)]
pub struct DuplicateDefinition {
    pub id: ObjectId,
    pub definitions: usize,
    pub labels: Vec<String>,
    /// Body of the first definition, which keeps the identifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub canonical_body: Option<Range<usize>>,
    /// Byte ranges of every definition body, in document order.
    pub bodies: Vec<Range<usize>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MappingViolation {
    pub old: ObjectId,
    pub new: ObjectId,
    pub label: String,
    pub problem: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct UniquenessCheck {
    pub passed: bool,
    pub duplicates: Vec<DuplicateDefinition>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub mapping_violations: Vec<MappingViolation>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DanglingReference {
    pub id: ObjectId,
    pub offset: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<ObjectId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClosureCheck {
    pub passed: bool,
    pub references: usize,
    pub dangling: Vec<DanglingReference>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SectionCheck {
    pub passed: bool,
    pub required: Vec<String>,
    pub missing: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BalanceCheck {
    pub passed: bool,
    /// Open minus close.
    pub braces: i64,
    pub parens: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct HeaderCheck {
    pub passed: bool,
    pub expected: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub passed: bool,
    pub uniqueness: UniquenessCheck,
    pub referential_closure: ClosureCheck,
    pub section_presence: SectionCheck,
    pub delimiter_balance: BalanceCheck,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub header: Option<HeaderCheck>,
}

impl ValidationReport {
    pub fn passed(&self) -> bool {
        self.passed
    }

    /// Names of the checks that did not pass, in report order.
    pub fn failed_checks(&self) -> Vec<&'static str> {
        let mut failed = Vec::new();
        if !self.uniqueness.passed {
            failed.push("uniqueness");
        }
        if !self.referential_closure.passed {
            failed.push("referential_closure");
        }
        if !self.section_presence.passed {
            failed.push("section_presence");
        }
        if !self.delimiter_balance.passed {
            failed.push("delimiter_balance");
        }
        if self.header.as_ref().is_some_and(|h| !h.passed) {
            failed.push("header");
        }
        failed
    }
}

/// No identifier is defined twice, and every applied replacement took effect.
pub fn check_uniqueness(doc: &Document, applied: &[Replacement]) -> UniquenessCheck {
    let duplicates: Vec<DuplicateDefinition> = doc
        .ids()
        .filter_map(|id| {
            let definitions = doc.definitions_of(id);
            (definitions.len() > 1).then(|| DuplicateDefinition {
                id: id.clone(),
                definitions: definitions.len(),
                labels: definitions.iter().filter_map(|d| d.label.clone()).collect(),
                canonical_body: doc.definition_body_of(id),
                bodies: definitions.iter().filter_map(|d| d.body.clone()).collect(),
            })
        })
        .collect();

    let mut mapping_violations = Vec::new();
    for replacement in applied {
        let violation = |problem: String| MappingViolation {
            old: replacement.old.clone(),
            new: replacement.new.clone(),
            label: replacement.label.clone(),
            problem,
        };

        let leftover = doc
            .occurrence_records(&replacement.old)
            .iter()
            .filter(|o| o.has_label(&replacement.label))
            .count();
        if leftover > 0 {
            mapping_violations.push(violation(format!(
                "{} occurrence(s) of the old identifier still carry the label",
                leftover
            )));
        }

        let definitions = doc.definitions_of(&replacement.new).len();
        if definitions != 1 {
            mapping_violations.push(violation(format!(
                "New identifier has {} definitions, expected 1",
                definitions
            )));
        }
    }

    UniquenessCheck {
        passed: duplicates.is_empty() && mapping_violations.is_empty(),
        duplicates,
        mapping_violations,
    }
}

/// Every reference resolves to a definition.
pub fn check_closure(doc: &Document) -> ClosureCheck {
    let mut references = 0;
    let mut dangling = Vec::new();

    for occurrence in doc.occurrences().iter().filter(|o| !o.is_definition()) {
        references += 1;
        if doc.definitions_of(&occurrence.id).is_empty() {
            dangling.push(DanglingReference {
                id: occurrence.id.clone(),
                offset: occurrence.offset,
                label: occurrence.label.clone(),
                owner: doc.owner_of(occurrence.offset),
                field: occurrence.field.clone(),
            });
        }
    }

    ClosureCheck {
        passed: dangling.is_empty(),
        references,
        dangling,
    }
}

pub fn check_sections(doc: &Document, required: &[String]) -> SectionCheck {
    let missing: Vec<String> = required
        .iter()
        .filter(|name| !doc.has_section(name))
        .cloned()
        .collect();

    SectionCheck {
        passed: missing.is_empty(),
        required: required.to_vec(),
        missing,
    }
}

pub fn check_balance(doc: &Document) -> BalanceCheck {
    let balance = doc.delimiter_balance();
    BalanceCheck {
        passed: balance.is_balanced(),
        braces: balance.braces,
        parens: balance.parens,
    }
}

pub fn check_header(doc: &Document, expected: &str) -> HeaderCheck {
    HeaderCheck {
        passed: doc.text().starts_with(expected),
        expected: expected.to_string(),
    }
}

/// Run every check. `applied` holds the replacements made in this run, if any.
pub fn validate(doc: &Document, config: &RepairConfig, applied: &[Replacement]) -> ValidationReport {
    let uniqueness = check_uniqueness(doc, applied);
    let referential_closure = check_closure(doc);
    let section_presence = check_sections(doc, &config.required_sections);
    let delimiter_balance = check_balance(doc);
    let header = config
        .expected_header
        .as_deref()
        .map(|expected| check_header(doc, expected));

    let passed = uniqueness.passed
        && referential_closure.passed
        && section_presence.passed
        && delimiter_balance.passed
        && header.as_ref().is_none_or(|h| h.passed);

    ValidationReport {
        passed,
        uniqueness,
        referential_closure,
        section_presence,
        delimiter_balance,
        header,
    }
}
