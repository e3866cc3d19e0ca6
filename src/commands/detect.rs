use clap::Args;
use serde::Serialize;
use std::collections::BTreeMap;

use pbxrepair::detect::{self, CollisionPlan, Suspect};
use pbxrepair::identifier::ObjectId;
use pbxrepair::repair;

use super::{CmdResult, DocumentArgs};

#[derive(Args)]
pub struct DetectArgs {
    #[command(flatten)]
    document: DocumentArgs,
}

#[derive(Serialize)]
pub struct DetectOutput {
    pub path: String,
    pub identifiers: usize,
    /// Whether an object table was found; without one every header is a definition.
    pub object_table: bool,
    pub occurrence_ceiling: usize,
    pub over_ceiling: BTreeMap<ObjectId, usize>,
    pub suspects: Vec<Suspect>,
    /// How the configured collision table resolves against this document.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<CollisionPlan>,
}

pub fn run(args: DetectArgs) -> CmdResult<DetectOutput> {
    let path = args.document.document_path()?;
    let config = args.document.load_config()?;
    let doc = repair::load_document(&path, &config)?;

    let suspects = detect::find_suspects(&doc, config.occurrence_ceiling);
    let plan = if config.collisions.is_empty() {
        None
    } else {
        Some(detect::plan(&doc, &config.collisions, None)?)
    };

    Ok((
        DetectOutput {
            path: path.display().to_string(),
            identifiers: doc.ids().count(),
            object_table: doc.has_object_table(),
            occurrence_ceiling: config.occurrence_ceiling,
            over_ceiling: detect::detect(&doc, config.occurrence_ceiling),
            suspects,
            plan,
        },
        0,
    ))
}
