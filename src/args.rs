use clap::Parser;
use std::path::PathBuf;

/// Run a CK classification experiment and show live results
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Settings file (defaults to config/settings.json, then ~/.config/dnn-desktop/settings.json)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Program UOA or title (defaults to the first configured program)
    #[arg(long, value_name = "PROGRAM")]
    pub program: Option<String>,

    /// Model UOA or title (defaults to the first configured model)
    #[arg(long, value_name = "MODEL")]
    pub model: Option<String>,

    /// Dataset validation UOA or title (defaults to the first configured dataset)
    #[arg(long, value_name = "DATASET")]
    pub dataset: Option<String>,

    /// Images per batch, overrides the settings file
    #[arg(long, value_name = "COUNT")]
    pub batch_size: Option<u32>,

    /// Seconds to wait for the first results, overrides the settings file
    #[arg(long, value_name = "SECONDS")]
    pub startup_timeout: Option<u64>,

    /// List configured programs, models and datasets and exit
    #[arg(long)]
    pub list: bool,

    /// Echo log lines to stderr
    #[arg(long, short)]
    pub verbose: bool,
}
