use clap::Parser;
use metadata_wrangler::{launch, CliConfig, Job};

#[derive(Parser)]
#[command(name = "content_server_monitor")]
#[command(about = "Import an OPDS feed from the content server")]
struct Args {
    #[command(flatten)]
    common: CliConfig,

    /// Feed URL (defaults to CONTENT_WEB_APP_URL)
    args: Vec<String>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let job = Job::ContentServerMonitor {
        args: args.args,
        timestamped: false,
    };
    std::process::exit(launch(args.common, job).await);
}
