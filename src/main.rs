use std::path::PathBuf;

use clap::Parser;

use batchname_lib::config_paths::DATA_DIR_ENV;
use batchname_lib::host::{self, HostOptions};

#[derive(Debug, Parser)]
#[command(name = "batchname", version, about = "Browse a bucket and rename files in bulk")]
struct Cli {
    /// Directory holding settings.json and credentials.json
    #[arg(long, env = DATA_DIR_ENV)]
    data_dir: Option<PathBuf>,

    /// Browse a seeded in-memory bucket instead of a remote one
    #[arg(long)]
    demo: bool,

    #[arg(short, long)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    host::run(HostOptions {
        data_dir: cli.data_dir,
        demo: cli.demo,
        verbose: cli.verbose,
    })
}
