mod common;

use common::Fixture;
use httpmock::prelude::*;
use metadata_wrangler::app::launcher::run_job;
use metadata_wrangler::domain::model::{DataSource, IdentifierType};
use metadata_wrangler::{Catalog, Job};

const GRAPH: &str = r#"{
  "@graph": [
    {
      "@id": "http://www.worldcat.org/oclc/77",
      "@type": "schema:Book",
      "schema:name": "Dune",
      "schema:creator": {"@id": "http://viaf.org/viaf/61566993"},
      "schema:about": {"@id": "http://dewey.info/class/813.54/e22/"}
    },
    {
      "@id": "http://viaf.org/viaf/61566993",
      "@type": "schema:Person",
      "schema:familyName": "Herbert",
      "schema:givenName": "Frank"
    }
  ]
}"#;

#[tokio::test]
async fn test_redo_then_refresh_views() -> anyhow::Result<()> {
    let server = MockServer::start();
    let oclc = server.mock(|when, then| {
        when.method(GET).path("/isbn/9780441013593.jsonld");
        then.status(200).body(GRAPH);
    });

    let fixture = Fixture::new(&server.base_url());
    let mut catalog = Catalog::new();
    let (threem, _) = catalog.identifier_for(IdentifierType::ThreeM, "dune-3m");
    let (isbn, _) = catalog.identifier_for(IdentifierType::Isbn, "9780441013593");
    catalog.add_equivalency(threem, isbn, DataSource::ThreeM, 1.0);
    let (edition_id, _) = catalog.edition_for(DataSource::ThreeM, threem)?;
    catalog.edition_mut(edition_id).unwrap().title = Some("Dune".to_string());
    catalog.refresh_work_for_edition(edition_id)?;
    fixture.save(catalog).await;

    let results = run_job(&Job::RedoOclcForThreeM, &fixture.config, None).await?;

    oclc.assert();
    let names: Vec<&str> = results.iter().map(|r| r.script_name.as_str()).collect();
    assert_eq!(names, vec!["Redo OCLC for 3M", "Refresh Materialized Views"]);

    let catalog = fixture.load().await;
    let edition = catalog.edition(edition_id).unwrap();
    let author = catalog.contributor(edition.contributions[0].contributor_id).unwrap();
    assert_eq!(author.sort_name.as_deref(), Some("Herbert, Frank"));

    let work = catalog.works().next().unwrap();
    assert_eq!(work.author.as_deref(), Some("Frank Herbert"));
    assert_eq!(work.fiction, Some(true));

    let views = fixture.dir.path().join("views");
    let editions = std::fs::read_to_string(views.join("works_editions.csv"))?;
    assert!(editions.contains("Frank Herbert"));
    assert!(editions.contains("dune-3m"));
    let classifications = std::fs::read_to_string(views.join("works_classifications.csv"))?;
    assert!(classifications.contains("813.54"));
    Ok(())
}
