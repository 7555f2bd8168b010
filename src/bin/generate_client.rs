use clap::Parser;
use metadata_wrangler::{launch, CliConfig, Job};

#[derive(Parser)]
#[command(name = "generate_client")]
#[command(about = "Register integration clients and print their credentials")]
struct Args {
    #[command(flatten)]
    common: CliConfig,

    /// Server URL(s) to register
    urls: Vec<String>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    std::process::exit(launch(args.common, Job::GenerateClient { urls: args.urls }).await);
}
