extern crate rec_sim;

use clap::Parser;
use rec_sim::output::FileOutput;
use rec_sim::run_project;
use std::fs;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct RecSimArgs {
    /// JSON configuration of the community
    config_file: PathBuf,
    /// directory of <system id>.csv hourly irradiance files
    #[arg(long, short)]
    irradiance_dir: Option<PathBuf>,
    /// directory the result tables are written to, by default next to the configuration
    #[arg(long, short)]
    output_dir: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(tracing::Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = RecSimArgs::parse();

    let base_path = args.config_file.parent().unwrap_or(Path::new("."));
    let output_dir = args
        .output_dir
        .clone()
        .unwrap_or_else(|| base_path.join("Output"));
    fs::create_dir_all(&output_dir)?;

    let results = run_project(
        BufReader::new(File::open(&args.config_file)?),
        FileOutput::new(output_dir.clone(), "{}.csv".to_string()),
        Some(base_path),
        args.irradiance_dir.as_deref(),
    )?;

    for (id, community) in &results.communities {
        info!(
            "{id}: {} members, NPV {:.2}, payback period {:.1} years",
            community.members.total, community.economics.npv, community.economics.payback_period
        );
    }
    info!("Results written to {}", output_dir.display());

    Ok(())
}
