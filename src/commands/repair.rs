use clap::Args;

use pbxrepair::config::CollisionEntry;
use pbxrepair::log_status;
use pbxrepair::repair::{self, RepairOptions, RepairReport};

use super::{CmdResult, DocumentArgs};

#[derive(Args)]
pub struct RepairArgs {
    #[command(flatten)]
    document: DocumentArgs,

    /// Known collision: the object labelled LABEL is the duplicate of ID (repeatable)
    #[arg(long = "collision", value_name = "ID=LABEL[::FILE]")]
    collisions: Vec<String>,

    /// Also re-key duplicates whose labels disagree with the first occurrence
    #[arg(long)]
    auto: bool,

    /// Validate the repaired document without writing it
    #[arg(long)]
    dry_run: bool,
}

pub fn run(args: RepairArgs) -> CmdResult<RepairReport> {
    let path = args.document.document_path()?;
    let mut config = args.document.load_config()?;

    for raw in &args.collisions {
        config.collisions.push(CollisionEntry::parse(raw)?);
    }
    if config.collisions.is_empty() && !args.auto {
        log_status!(
            "repair",
            "No collisions configured and --auto not set; only validating"
        );
    }

    let options = RepairOptions {
        config,
        auto: args.auto,
        dry_run: args.dry_run,
    };
    let report = repair::repair_file(&path, &options)?;

    Ok((report, 0))
}
