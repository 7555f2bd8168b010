use crate::adapters::content_server::ContentServerClient;
use crate::adapters::opds::{OPDSImporter, OpdsFeed};
use crate::core::session::Session;
use crate::domain::model::DataSource;
use crate::domain::ports::{Script, ScriptReport};
use crate::utils::error::Result;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashSet;

/// Imports an OPDS feed, following `next` links while pages still carry
/// something we have not seen.
pub struct OPDSImportScript {
    name: String,
    url: String,
    timestamped: bool,
    importer: OPDSImporter,
    client: ContentServerClient,
}

impl OPDSImportScript {
    pub fn new(
        url: impl Into<String>,
        data_source: DataSource,
        timestamped: bool,
        client: ContentServerClient,
    ) -> Self {
        let url = url.into();
        let name = if timestamped {
            format!("OPDS Import Monitor {}", url)
        } else {
            format!("OPDS Import {}", url)
        };
        Self {
            name,
            url,
            timestamped,
            importer: OPDSImporter::new(data_source),
            client,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Walk the feed from the first page. Stops at the first page with
    /// nothing new, a page without a `next` link, or a page already seen.
    async fn crawl(&self, session: &Session) -> Result<Vec<OpdsFeed>> {
        let cutoff = if self.timestamped {
            session.catalog.timestamp(&self.name).and_then(|t| t.start)
        } else {
            None
        };
        if let Some(cutoff) = cutoff {
            tracing::info!("⏱️ Only importing entries updated after {}", cutoff);
        }

        let mut pages = Vec::new();
        let mut seen = HashSet::new();
        let mut next = Some(self.url.clone());

        while let Some(url) = next.take() {
            if !seen.insert(url.clone()) {
                tracing::warn!("⚠️ Feed links back to {}, stopping", url);
                break;
            }
            tracing::debug!("Fetching feed page {}", url);
            let feed = self.client.get_feed(&url).await?;

            let has_new_data = feed
                .entries
                .iter()
                .any(|e| self.importer.entry_has_new_data(&session.catalog, e, cutoff));
            if !has_new_data {
                tracing::info!("📭 Nothing new on {}, stopping", url);
                break;
            }
            next = feed.next_links().first().map(|s| s.to_string());
            pages.push(feed);
        }
        Ok(pages)
    }
}

#[async_trait]
impl Script for OPDSImportScript {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, session: &mut Session) -> Result<ScriptReport> {
        let run_start = Utc::now();
        let pages = self.crawl(session).await?;
        tracing::info!("📚 {} page(s) queued from {}", pages.len(), self.url);

        let mut report = ScriptReport::default();
        // 從最舊的頁面開始匯入
        for feed in pages.iter().rev() {
            let result = self.importer.import_from_feed(&mut session.catalog, feed)?;
            session.commit().await?;

            report.items_processed += result.editions.len() + result.messages.len();
            report.successes += result.editions.len();
            for (urn, (status, message)) in &result.messages {
                if *status >= 400 {
                    report.failures += 1;
                    report.messages.push(format!("{}: {} {}", urn, status, message));
                }
            }
        }

        if self.timestamped {
            session
                .catalog
                .update_timestamp(&self.name, Some(run_start), Some(Utc::now()), None);
            session.commit().await?;
        }
        Ok(report)
    }
}
