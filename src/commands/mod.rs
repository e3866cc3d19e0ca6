use clap::Args;
use std::path::{Path, PathBuf};

use pbxrepair::config::RepairConfig;

pub type CmdResult<T> = pbxrepair::Result<(T, i32)>;

const DOCUMENT_FILE: &str = "project.pbxproj";

/// Arguments shared by every subcommand that reads a document.
#[derive(Args, Debug)]
pub struct DocumentArgs {
    /// Path to project.pbxproj or its enclosing .xcodeproj directory
    pub path: String,

    /// JSON configuration file (defaults apply when omitted)
    #[arg(long, value_name = "FILE")]
    pub config: Option<String>,
}

impl DocumentArgs {
    pub fn document_path(&self) -> pbxrepair::Result<PathBuf> {
        resolve_document_path(&self.path)
    }

    pub fn load_config(&self) -> pbxrepair::Result<RepairConfig> {
        let path = self.config.as_deref().map(expand_path);
        RepairConfig::load_or_default(path.as_deref())
    }
}

fn expand_path(raw: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(raw).to_string())
}

/// Resolve a user-supplied path to the document file.
///
/// A directory resolves to the `project.pbxproj` inside it.
pub(crate) fn resolve_document_path(raw: &str) -> pbxrepair::Result<PathBuf> {
    pbxrepair::validation::require_non_empty(raw, "path", "Document path cannot be empty")?;
    let path = expand_path(raw.trim());

    let path = if path.is_dir() {
        path.join(DOCUMENT_FILE)
    } else {
        path
    };

    if !path.exists() {
        return Err(pbxrepair::Error::document_load_failed(
            path.display().to_string(),
            "File not found",
        ));
    }
    pbxrepair::validation::require_file(&path, "path")?;
    Ok(path)
}

pub(crate) fn read_script(path: &str) -> pbxrepair::Result<pbxrepair::patch::PatchScript> {
    pbxrepair::patch::PatchScript::load(Path::new(&shellexpand::tilde(path).to_string()))
}

pub mod detect;
pub mod patch;
pub mod repair;
pub mod validate;

/// Dispatch a command to its handler and map result to JSON.
macro_rules! dispatch {
    ($args:expr, $module:ident) => {
        crate::output::map_cmd_result_to_json($module::run($args))
    };
}

pub(crate) fn run_json(command: crate::Commands) -> (pbxrepair::Result<serde_json::Value>, i32) {
    crate::tty::status("pbxrepair is working...");

    match command {
        crate::Commands::Repair(args) => dispatch!(args, repair),
        crate::Commands::Detect(args) => dispatch!(args, detect),
        crate::Commands::Validate(args) => dispatch!(args, validate),
        crate::Commands::Patch(args) => dispatch!(args, patch),
    }
}
