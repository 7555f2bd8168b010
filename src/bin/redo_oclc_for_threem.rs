use clap::Parser;
use metadata_wrangler::{launch, CliConfig, Job};

#[derive(Parser)]
#[command(name = "redo_oclc_for_threem")]
#[command(about = "Redo OCLC Linked Data for 3M books without authors, then refresh the views")]
struct Args {
    #[command(flatten)]
    common: CliConfig,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    std::process::exit(launch(args.common, Job::RedoOclcForThreeM).await);
}
