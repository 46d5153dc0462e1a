use std::path::PathBuf;

use clap::Parser;

/// Find buttons in frontend sources that have no click handler or no
/// accessible label.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub(crate) struct Args {
    /// Directory to scan.
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Print the report as JSON instead of text.
    #[arg(long)]
    pub json: bool,

    /// Exit with status 1 when any issue is found.
    #[arg(long, env = "BUTTON_AUDIT_STRICT")]
    pub strict: bool,
}
