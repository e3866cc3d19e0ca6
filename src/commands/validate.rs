use clap::Args;
use serde::Serialize;

use pbxrepair::repair;
use pbxrepair::validate::{self, ValidationReport};

use super::{CmdResult, DocumentArgs};

#[derive(Args)]
pub struct ValidateArgs {
    #[command(flatten)]
    document: DocumentArgs,
}

#[derive(Serialize)]
pub struct ValidateOutput {
    pub path: String,
    pub failed_checks: Vec<&'static str>,
    pub report: ValidationReport,
}

/// Exit code is 1 when any check fails.
pub fn run(args: ValidateArgs) -> CmdResult<ValidateOutput> {
    let path = args.document.document_path()?;
    let config = args.document.load_config()?;
    let doc = repair::load_document(&path, &config)?;

    let report = validate::validate(&doc, &config, &[]);
    let exit_code = if report.passed() { 0 } else { 1 };

    Ok((
        ValidateOutput {
            path: path.display().to_string(),
            failed_checks: report.failed_checks(),
            report,
        },
        exit_code,
    ))
}
