use clap::Parser;
use metadata_wrangler::{launch, CliConfig, Job};

#[derive(Parser)]
#[command(name = "identifiers_resolve")]
#[command(about = "Resolve the identifiers in every collection into works")]
struct Args {
    #[command(flatten)]
    common: CliConfig,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    std::process::exit(launch(args.common, Job::IdentifiersResolve).await);
}
