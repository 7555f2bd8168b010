use clap::Parser;
use metadata_wrangler::{launch, CliConfig, Job};

#[derive(Parser)]
#[command(name = "oclc_linked_data")]
#[command(about = "Fetch OCLC Linked Data for ISBNs, OCLC numbers and OCLC works")]
struct Args {
    #[command(flatten)]
    common: CliConfig,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    std::process::exit(launch(args.common, Job::OclcLinkedData).await);
}
