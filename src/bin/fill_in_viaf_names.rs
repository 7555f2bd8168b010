use clap::Parser;
use metadata_wrangler::{launch, CliConfig, Job};

#[derive(Parser)]
#[command(name = "fill_in_viaf_names")]
#[command(about = "Fill in contributor names from VIAF")]
struct Args {
    #[command(flatten)]
    common: CliConfig,

    #[arg(long, help = "Also process contributors that already have a display name")]
    force: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    std::process::exit(launch(args.common, Job::FillInViafNames { force: args.force }).await);
}
