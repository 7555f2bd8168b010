use crate::adapters::content_server::ContentServerClient;
use crate::adapters::http::HttpClient;
use crate::adapters::oclc::{LinkedDataCoverageProvider, OCLCLinkedDataClient};
use crate::adapters::viaf::VIAFClient;
use crate::app::scripts::{
    FillInVIAFNamesScript, IdentifierResolutionCoverageProvider, IntegrationClientGeneratorScript,
    OPDSImportScript, RedoOCLCForThreeMScript,
};
use crate::config::cli::LocalStorage;
use crate::config::toml_config::DEFAULT_VIAF_URL;
use crate::config::{CliConfig, WranglerConfig, CONTENT_WEB_APP_URL_ENV};
use crate::core::coverage::{RunCollectionCoverageProviderScript, RunCoverageProviderScript};
use crate::core::script::{ScriptResult, ScriptSequence};
use crate::core::session::Session;
use crate::core::views::RefreshMaterializedViewsScript;
use crate::domain::model::{CollectionId, DataSource};
use crate::domain::ports::{ConfigProvider, CoverageProvider, Script};
use crate::utils::error::{Result, WranglerError};
use crate::utils::logger;
use crate::utils::validation::{self, Validate};

/// What a binary asks the launcher to run.
#[derive(Debug, Clone, PartialEq)]
pub enum Job {
    RedoOclcForThreeM,
    OclcLinkedData,
    GenerateClient { urls: Vec<String> },
    ContentServerMonitor { args: Vec<String>, timestamped: bool },
    IdentifiersResolve,
    FillInViafNames { force: bool },
}

impl Job {
    pub fn name(&self) -> &'static str {
        match self {
            Job::RedoOclcForThreeM => "redo_oclc_for_threem",
            Job::OclcLinkedData => "oclc_linked_data",
            Job::GenerateClient { .. } => "generate_client",
            Job::ContentServerMonitor { timestamped: false, .. } => "content_server_monitor",
            Job::ContentServerMonitor { timestamped: true, .. } => "content_server_timestamped_monitor",
            Job::IdentifiersResolve => "identifiers_resolve",
            Job::FillInViafNames { .. } => "fill_in_viaf_names",
        }
    }
}

/// The feed to import: the first positional argument, else
/// `CONTENT_WEB_APP_URL`, else the configured content server.
pub fn resolve_source_url(
    args: &[String],
    env_url: Option<String>,
    configured: Option<&str>,
) -> Result<String> {
    let url = args
        .first()
        .cloned()
        .or(env_url.filter(|u| !u.trim().is_empty()))
        .or_else(|| configured.map(str::to_string))
        .ok_or_else(|| WranglerError::MissingConfigError {
            field: CONTENT_WEB_APP_URL_ENV.to_string(),
        })?;
    validation::validate_url("url", &url)?;
    Ok(url)
}

fn oclc_provider(config: &WranglerConfig, http: &HttpClient) -> LinkedDataCoverageProvider {
    LinkedDataCoverageProvider::new(
        OCLCLinkedDataClient::new(http.clone(), config.oclc_linked_data_url()),
        config.batch_size(),
    )
}

/// Build the scripts a job runs, in order.
pub fn build_scripts(
    job: &Job,
    config: &WranglerConfig,
    env_url: Option<String>,
) -> Result<Vec<Box<dyn Script>>> {
    let http = HttpClient::from_config(config)?;

    let scripts: Vec<Box<dyn Script>> = match job {
        Job::RedoOclcForThreeM => vec![
            Box::new(RedoOCLCForThreeMScript::new(oclc_provider(config, &http))),
            Box::new(RefreshMaterializedViewsScript),
        ],
        Job::OclcLinkedData => vec![Box::new(RunCoverageProviderScript::new(Box::new(
            oclc_provider(config, &http),
        )))],
        Job::GenerateClient { urls } => {
            vec![Box::new(IntegrationClientGeneratorScript::new(urls.clone())?)]
        }
        Job::ContentServerMonitor { args, timestamped } => {
            let url = resolve_source_url(args, env_url, config.content_server_url())?;
            let client = ContentServerClient::new(http, &url);
            vec![Box::new(OPDSImportScript::new(
                url,
                DataSource::ContentServer,
                *timestamped,
                client,
            ))]
        }
        Job::IdentifiersResolve => {
            let content_server_url = resolve_source_url(&[], env_url, config.content_server_url())?;
            let oclc_url = config.oclc_linked_data_url().to_string();
            let viaf_url = config.viaf_url().map(str::to_string);
            let batch_size = config.batch_size();
            let factory = move |collection_id: CollectionId| -> Box<dyn CoverageProvider> {
                Box::new(IdentifierResolutionCoverageProvider::new(
                    Some(collection_id),
                    ContentServerClient::new(http.clone(), &content_server_url),
                    LinkedDataCoverageProvider::new(
                        OCLCLinkedDataClient::new(http.clone(), &oclc_url),
                        batch_size,
                    ),
                    viaf_url.as_deref().map(|u| VIAFClient::new(http.clone(), u)),
                    batch_size,
                ))
            };
            vec![Box::new(RunCollectionCoverageProviderScript::new(
                "Identifier Resolution",
                None,
                Box::new(factory),
            ))]
        }
        Job::FillInViafNames { force } => {
            let viaf = VIAFClient::new(http, config.viaf_url().unwrap_or(DEFAULT_VIAF_URL));
            vec![Box::new(FillInVIAFNamesScript::new(viaf, *force))]
        }
    };
    Ok(scripts)
}

/// Open the catalog, run the job's scripts in order and return their results.
pub async fn run_job(
    job: &Job,
    config: &WranglerConfig,
    env_url: Option<String>,
) -> Result<Vec<ScriptResult>> {
    let scripts = build_scripts(job, config, env_url)?;

    let storage = LocalStorage::new(config.data_directory().to_string());
    let mut session = Session::open(storage).await?;

    let execution_id = format!("{}_{}", job.name(), chrono::Utc::now().format("%Y%m%d_%H%M%S"));
    let mut sequence = ScriptSequence::new(execution_id).with_monitoring(config.monitor_enabled());
    for script in scripts {
        sequence.add_script(script);
    }
    sequence.execute_all(&mut session).await
}

fn display_results(results: &[ScriptResult]) {
    let summary = ScriptSequence::get_execution_summary(results);
    println!("📋 Execution Summary:");
    for result in results {
        println!(
            "  ✅ {} - {} item(s), {} ok, {} failed ({:?})",
            result.script_name,
            result.report.items_processed,
            result.report.successes,
            result.report.failures,
            result.duration
        );
        for message in &result.report.messages {
            tracing::debug!("  {}", message);
        }
    }
    if let Some(total) = summary.get("total_items") {
        println!("📊 Total items: {}", total);
    }
    if let Some(duration) = summary.get("total_duration_ms") {
        println!("⏱️ Total duration: {} ms", duration);
    }
}

fn report_error(e: &WranglerError) -> i32 {
    tracing::error!(
        "❌ Job failed: {} (Category: {:?}, Severity: {:?})",
        e,
        e.category(),
        e.severity()
    );
    tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());
    eprintln!("❌ {}", e.user_friendly_message());
    eprintln!("💡 {}", e.recovery_suggestion());
    e.exit_code()
}

/// Everything a binary does after parsing its arguments. Returns the
/// process exit code.
pub async fn launch(cli: CliConfig, job: Job) -> i32 {
    if cli.json_logs {
        logger::init_json_logger();
    } else {
        logger::init_cli_logger(cli.verbose);
    }
    tracing::info!("🚀 Starting {}", job.name());
    if cli.verbose {
        tracing::debug!("CLI config: {:?}", cli);
    }

    let config = match WranglerConfig::load(cli).and_then(|c| c.validate().map(|_| c)) {
        Ok(config) => config,
        Err(e) => return report_error(&e),
    };
    if config.monitor_enabled() {
        tracing::info!("🔍 System monitoring enabled");
    }

    let env_url = std::env::var(CONTENT_WEB_APP_URL_ENV).ok();
    match run_job(&job, &config, env_url).await {
        Ok(results) => {
            tracing::info!("🎉 {} completed successfully!", job.name());
            display_results(&results);
            0
        }
        Err(e) => report_error(&e),
    }
}
