//! Repair pipeline: load, detect, plan, mint, rewrite, validate, commit.

use chrono::Utc;
use rand::RngCore;
use serde::Serialize;
use std::path::Path;

use crate::config::RepairConfig;
use crate::detect::{self, CollisionPlan, Suspect};
use crate::document::{Dialect, Document};
use crate::error::{Error, Result};
use crate::identifier::IdGenerator;
use crate::rewrite::{self, ReplacementMapping, RewriteStats};
use crate::transaction::Transaction;
use crate::utils::io;
use crate::validate::{self, ValidationReport};

#[derive(Debug, Clone, Default)]
pub struct RepairOptions {
    pub config: RepairConfig,
    /// Also re-key duplicates confirmed by a label conflict.
    pub auto: bool,
    /// Validate but never write.
    pub dry_run: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Committed,
    Unchanged,
    DryRun,
    RolledBack,
}

/// Result of one in-memory repair pass.
#[derive(Debug, Clone)]
pub struct RepairPass {
    pub document: Document,
    pub suspects: Vec<Suspect>,
    pub plan: CollisionPlan,
    pub mapping: ReplacementMapping,
    pub stats: Vec<RewriteStats>,
    pub warnings: Vec<String>,
    pub validation: ValidationReport,
}

impl RepairPass {
    pub fn changed(&self) -> bool {
        self.stats.iter().any(|s| s.definitions + s.references > 0)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RepairReport {
    pub path: String,
    pub generated_at: String,
    pub original_sha256: String,
    pub final_sha256: String,
    pub suspects: Vec<Suspect>,
    pub plan: CollisionPlan,
    pub replacements: ReplacementMapping,
    pub rewrites: Vec<RewriteStats>,
    pub warnings: Vec<String>,
    pub validation: ValidationReport,
    pub outcome: RunOutcome,
}

/// Run detection through validation on `doc` without touching disk.
pub fn repair_document<R: RngCore>(
    doc: &Document,
    config: &RepairConfig,
    auto: bool,
    generator: &mut IdGenerator<R>,
) -> Result<RepairPass> {
    let suspects = detect::find_suspects(doc, config.occurrence_ceiling);
    let plan = detect::plan(doc, &config.collisions, auto.then_some(suspects.as_slice()))?;

    let mut existing = doc.all_tokens().clone();
    let mapping = ReplacementMapping::mint(&plan, generator, &mut existing)?;
    if !mapping.is_injective() {
        return Err(Error::internal_unexpected(
            "Minted replacement mapping is not one-to-one",
        ));
    }

    let outcome = rewrite::rewrite(doc, &mapping);
    let validation = validate::validate(&outcome.document, config, mapping.entries());

    Ok(RepairPass {
        document: outcome.document,
        suspects,
        plan,
        mapping,
        stats: outcome.stats,
        warnings: outcome.warnings,
        validation,
    })
}

/// Read and index a document under `config`.
pub fn load_document(path: &Path, config: &RepairConfig) -> Result<Document> {
    let dialect = Dialect::from_config(config)?;
    Ok(Transaction::load(path, &dialect)?.original().clone())
}

/// Repair the document at `path` in place.
///
/// On validation failure the file is left as it was and the error details
/// carry the full report.
pub fn repair_file(path: &Path, options: &RepairOptions) -> Result<RepairReport> {
    let config = &options.config;
    let dialect = Dialect::from_config(config)?;
    let mut tx = Transaction::load(path, &dialect)?;
    log_status!(
        "repair",
        "Loaded {} ({} identifiers)",
        path.display(),
        tx.original().ids().count()
    );

    let mut generator = IdGenerator::new(dialect.format().clone());
    let pass = match repair_document(tx.original(), config, options.auto, &mut generator) {
        Ok(pass) => pass,
        Err(e) => {
            tx.rollback()?;
            return Err(e);
        }
    };

    for warning in &pass.warnings {
        log_status!("repair", "Warning: {}", warning);
    }
    log_status!(
        "repair",
        "{} suspect(s), {} planned, {} already resolved",
        pass.suspects.len(),
        pass.plan.actionable.len(),
        pass.plan.skipped.len()
    );

    let original_sha256 = io::content_digest(tx.original().text().as_bytes());
    let final_sha256 = io::content_digest(pass.document.text().as_bytes());
    let changed = pass.changed();

    let mut report = RepairReport {
        path: path.display().to_string(),
        generated_at: Utc::now().to_rfc3339(),
        original_sha256,
        final_sha256,
        suspects: pass.suspects,
        plan: pass.plan,
        replacements: pass.mapping,
        rewrites: pass.stats,
        warnings: pass.warnings,
        validation: pass.validation,
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
        report.final_sha256 = report.original_sha256.clone();
        return Ok(report);
    }

    if options.dry_run {
        tx.rollback()?;
        report.outcome = RunOutcome::DryRun;
        return Ok(report);
    }

    tx.stage(pass.document)?;
    report.final_sha256 = tx.commit()?;
    report.outcome = RunOutcome::Committed;
    log_status!(
        "repair",
        "Re-keyed {} duplicate(s) in {}",
        report.replacements.entries().len(),
        report.path
    );

    Ok(report)
}
