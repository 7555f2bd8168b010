mod common;

use common::Fixture;
use metadata_wrangler::app::launcher::run_job;
use metadata_wrangler::{Job, WranglerError};

#[tokio::test]
async fn test_generate_client_persists_and_reuses_secret() -> anyhow::Result<()> {
    let fixture = Fixture::new("http://unused.example");
    let job = Job::GenerateClient {
        urls: vec!["https://library.example.org/".to_string()],
    };

    let first = run_job(&job, &fixture.config, None).await?;
    let catalog = fixture.load().await;
    let client = catalog
        .integration_client_by_url("http://library.example.org")
        .expect("registered client")
        .clone();
    assert_eq!(client.url, "library.example.org");
    assert_eq!(client.shared_secret.len(), 48);
    assert!(first[0].report.messages[0].contains(&client.shared_secret));

    run_job(&job, &fixture.config, None).await?;
    let catalog = fixture.load().await;
    assert_eq!(
        catalog
            .integration_client_by_url("library.example.org")
            .map(|c| c.shared_secret.clone()),
        Some(client.shared_secret)
    );
    Ok(())
}

#[tokio::test]
async fn test_generate_client_requires_a_url() {
    let fixture = Fixture::new("http://unused.example");

    let err = run_job(&Job::GenerateClient { urls: vec![] }, &fixture.config, None)
        .await
        .unwrap_err();

    assert!(matches!(err, WranglerError::MissingConfigError { .. }));
    assert_eq!(err.exit_code(), 3);
}
