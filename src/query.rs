use std::sync::Arc;

use crate::models::{Id, MountainPassRecord, MountainPassView};
use crate::repo::{Repo, RepoError, RepoResult};

/// Read side: fetches stored records and expands their references into
/// full bodies. Callers never see raw reference ids.
pub struct QueryService {
    repo: Arc<dyn Repo>,
}

impl QueryService {
    pub fn new(repo: Arc<dyn Repo>) -> Self {
        Self { repo }
    }

    pub async fn get_by_id(&self, id: Id) -> RepoResult<Option<MountainPassView>> {
        match self.repo.get_pass(id).await {
            Ok(record) => Ok(Some(self.expand(record).await?)),
            Err(RepoError::NotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn get_by_email(&self, email: &str) -> RepoResult<Vec<MountainPassView>> {
        let records = self.repo.find_passes_by_email(email).await?;
        let mut views = Vec::with_capacity(records.len());
        for record in records {
            views.push(self.expand(record).await?);
        }
        Ok(views)
    }

    /// A reference that fails to resolve is store corruption, not a
    /// user-facing not-found.
    async fn expand(&self, record: MountainPassRecord) -> RepoResult<MountainPassView> {
        let person = self
            .repo
            .get_person(record.person_id)
            .await
            .map_err(|e| dangling("person", record.id, e))?;
        let geodata = self
            .repo
            .get_geodata(record.geodata_id)
            .await
            .map_err(|e| dangling("geodata", record.id, e))?;
        let mut photos = Vec::with_capacity(record.photo_ids.len());
        for photo_id in &record.photo_ids {
            photos.push(
                self.repo
                    .get_photo(*photo_id)
                    .await
                    .map_err(|e| dangling("photo", record.id, e))?,
            );
        }
        Ok(MountainPassView {
            id: record.id,
            title: record.title,
            title_prefix: record.title_prefix,
            alt_titles: record.alt_titles,
            timestamp: record.timestamp,
            person,
            geodata,
            photos,
            connects: record.connects,
            status: record.status,
        })
    }
}

fn dangling(entity: &str, pass_id: Id, e: RepoError) -> RepoError {
    match e {
        RepoError::NotFound => {
            RepoError::Internal(format!("dangling {entity} link on pass {pass_id}"))
        }
        other => other,
    }
}
