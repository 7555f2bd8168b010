use clap::{Parser, Subcommand};
use metadata_wrangler::{launch, CliConfig, Job};

#[derive(Parser)]
#[command(name = "metadata-wrangler")]
#[command(about = "Catalog metadata jobs: OCLC, VIAF, OPDS import and identifier resolution")]
struct Cli {
    #[command(flatten)]
    common: CliConfig,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Redo OCLC Linked Data for authorless 3M books, then refresh the views
    RedoOclcForThreem,
    /// Run the OCLC Linked Data coverage provider
    OclcLinkedData,
    /// Register integration clients and print their credentials
    GenerateClient {
        #[arg(required = true)]
        urls: Vec<String>,
    },
    /// Import an OPDS feed (URL argument or CONTENT_WEB_APP_URL)
    ContentServerMonitor { args: Vec<String> },
    /// Like content-server-monitor, skipping entries older than the last run
    ContentServerTimestampedMonitor { args: Vec<String> },
    /// Resolve identifiers in every collection
    IdentifiersResolve,
    /// Fill in contributor names from VIAF
    FillInViafNames {
        #[arg(long, help = "Also process contributors that already have a display name")]
        force: bool,
    },
}

impl From<Command> for Job {
    fn from(command: Command) -> Self {
        match command {
            Command::RedoOclcForThreem => Job::RedoOclcForThreeM,
            Command::OclcLinkedData => Job::OclcLinkedData,
            Command::GenerateClient { urls } => Job::GenerateClient { urls },
            Command::ContentServerMonitor { args } => Job::ContentServerMonitor {
                args,
                timestamped: false,
            },
            Command::ContentServerTimestampedMonitor { args } => Job::ContentServerMonitor {
                args,
                timestamped: true,
            },
            Command::IdentifiersResolve => Job::IdentifiersResolve,
            Command::FillInViafNames { force } => Job::FillInViafNames { force },
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let code = launch(cli.common, cli.command.into()).await;
    std::process::exit(code);
}
