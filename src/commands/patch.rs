use clap::Args;

use pbxrepair::patch::{self, PatchReport, PatchScript, TokenReplacement};

use super::{read_script, CmdResult, DocumentArgs};

#[derive(Args)]
pub struct PatchArgs {
    #[command(flatten)]
    document: DocumentArgs,

    /// Remove every line whose trimmed text equals LINE (repeatable)
    #[arg(long = "remove-line", value_name = "LINE")]
    remove_lines: Vec<String>,

    /// Replace every literal FROM with TO (repeatable)
    #[arg(long, num_args = 2, value_names = ["FROM", "TO"])]
    replace: Vec<String>,

    /// JSON patch script with `remove_lines` and `replacements`
    #[arg(long, value_name = "FILE")]
    script: Option<String>,

    /// Validate the patched document without writing it
    #[arg(long)]
    dry_run: bool,
}

fn build_script(args: &PatchArgs) -> pbxrepair::Result<PatchScript> {
    let mut script = match &args.script {
        Some(path) => read_script(path)?,
        None => PatchScript::default(),
    };

    script.extend(PatchScript {
        remove_lines: args.remove_lines.clone(),
        replacements: args
            .replace
            .chunks(2)
            .filter(|pair| pair.len() == 2)
            .map(|pair| TokenReplacement {
                from: pair[0].clone(),
                to: pair[1].clone(),
            })
            .collect(),
    });

    Ok(script)
}

pub fn run(args: PatchArgs) -> CmdResult<PatchReport> {
    let path = args.document.document_path()?;
    let config = args.document.load_config()?;
    let script = build_script(&args)?;

    if script.is_empty() {
        return Err(pbxrepair::Error::validation_missing_argument(vec![
            "--remove-line".to_string(),
            "--replace".to_string(),
            "--script".to_string(),
        ]));
    }

    let report = patch::patch_file(&path, &script, &config, args.dry_run)?;
    Ok((report, 0))
}
