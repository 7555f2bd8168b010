use crate::adapters::viaf::VIAFClient;
use crate::core::session::Session;
use crate::domain::model::{Contributor, ContributorId};
use crate::domain::ports::{Script, ScriptReport};
use crate::utils::error::Result;
use async_trait::async_trait;

pub const SCRIPT_NAME: &str = "Fill in VIAF names";
pub const COMMIT_EVERY: usize = 1000;

/// Normalizes contributor names against VIAF.
pub struct FillInVIAFNamesScript {
    viaf: VIAFClient,
    force: bool,
}

impl FillInVIAFNamesScript {
    pub fn new(viaf: VIAFClient, force: bool) -> Self {
        Self { viaf, force }
    }

    fn needs_processing(&self, contributor: &Contributor) -> bool {
        self.force || contributor.display_name.is_none()
    }

    /// Fall back to names derived from the sort name.
    fn apply_default_names(session: &mut Session, contributor_id: ContributorId) {
        let Some(c) = session.catalog.contributor_mut(contributor_id) else {
            return;
        };
        if c.display_name.is_some() {
            return;
        }
        if let Some(sort_name) = &c.sort_name {
            let (family, display) = Contributor::default_names(sort_name);
            if c.family_name.is_none() {
                c.family_name = Some(family);
            }
            c.display_name = Some(display);
        }
    }
}

#[async_trait]
impl Script for FillInVIAFNamesScript {
    fn name(&self) -> &str {
        SCRIPT_NAME
    }

    async fn run(&self, session: &mut Session) -> Result<ScriptReport> {
        let todo: Vec<ContributorId> = session
            .catalog
            .contributor_ids()
            .into_iter()
            .filter(|id| {
                session
                    .catalog
                    .contributor(*id)
                    .is_some_and(|c| self.needs_processing(c))
            })
            .collect();
        tracing::info!("👤 {} contributor(s) to look up in VIAF", todo.len());

        let mut report = ScriptReport::default();
        for (i, contributor_id) in todo.into_iter().enumerate() {
            // 先前合併掉的就跳過
            if session.catalog.contributor(contributor_id).is_none() {
                continue;
            }
            report.items_processed += 1;

            let holder = match self.viaf.process_contributor(&mut session.catalog, contributor_id).await {
                Ok(Some(id)) => {
                    report.successes += 1;
                    id
                }
                Ok(None) => {
                    tracing::debug!("No VIAF match for contributor {}", contributor_id);
                    contributor_id
                }
                Err(e) => {
                    tracing::warn!("⚠️ VIAF lookup for contributor {} failed: {}", contributor_id, e);
                    report.failures += 1;
                    report.messages.push(format!("contributor {}: {}", contributor_id, e));
                    contributor_id
                }
            };
            Self::apply_default_names(session, holder);

            if (i + 1) % COMMIT_EVERY == 0 {
                session.commit().await?;
            }
        }
        session.commit().await?;
        Ok(report)
    }
}
