use clap::{Parser, Subcommand};

mod commands;
mod output;
mod tty;

use commands::{detect, patch, repair, validate};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "pbxrepair")]
#[command(version = VERSION)]
#[command(about = "Repair identifier collisions in Xcode project files")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Re-key duplicate objects, validate, and write the document back
    Repair(repair::RepairArgs),
    /// Report identifiers that look shared by several objects
    Detect(detect::DetectArgs),
    /// Run the structural checks without changing anything
    Validate(validate::ValidateArgs),
    /// Apply literal line removals and replacements
    Patch(patch::PatchArgs),
}

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();

    let (json_result, exit_code) = commands::run_json(cli.command);
    if output::print_json_result(json_result).is_err() {
        return std::process::ExitCode::from(1);
    }

    std::process::ExitCode::from(exit_code_to_u8(exit_code))
}

fn exit_code_to_u8(code: i32) -> u8 {
    if code <= 0 {
        0
    } else if code >= 255 {
        255
    } else {
        code as u8
    }
}
