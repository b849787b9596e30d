use std::sync::Arc;

use log::{info, warn};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::*;
use crate::reconcile::{PhotoReconciler, PhotoUpload, StoredPhoto};
use crate::repo::{Repo, RepoError, RepoResult};
use crate::storage::PhotoStore;

/// Tagged result of a submit/edit call. Business-rule rejections come
/// back as `state: 0` with a short message; only unexpected store faults
/// surface as errors.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Outcome {
    pub state: u8,
    pub message: String,
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<Id>,
}

impl Outcome {
    pub fn ok(id: Id) -> Self {
        Self {
            state: 1,
            message: "OK".into(),
            id: Some(id),
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            state: 0,
            message: message.into(),
            id: None,
        }
    }
}

/// Outcome of submitter-identity resolution: a stored person wins
/// wholesale over whatever profile the caller sent along.
pub enum ResolvedPerson {
    Existing(Person),
    New(PersonPayload),
}

/// Orchestrates validation, status gating, photo reconciliation and the
/// child-before-parent composite save for create and edit.
pub struct SubmissionWorkflow {
    repo: Arc<dyn Repo>,
    store: Arc<dyn PhotoStore>,
    reconciler: PhotoReconciler,
}

impl SubmissionWorkflow {
    pub fn new(repo: Arc<dyn Repo>, store: Arc<dyn PhotoStore>) -> Self {
        let reconciler = PhotoReconciler::new(store.clone());
        Self {
            repo,
            store,
            reconciler,
        }
    }

    async fn resolve_person(&self, candidate: &PersonPayload) -> RepoResult<ResolvedPerson> {
        match self.repo.find_person_by_email(&candidate.email).await? {
            Some(person) => Ok(ResolvedPerson::Existing(person)),
            None => Ok(ResolvedPerson::New(candidate.clone())),
        }
    }

    /// Persists a new person, or returns the stored one. A unique-email
    /// conflict means another submission won the race between our lookup
    /// and our insert; re-resolve once and use the winner's row.
    async fn persist_person(&self, resolved: ResolvedPerson) -> RepoResult<Person> {
        match resolved {
            ResolvedPerson::Existing(person) => Ok(person),
            ResolvedPerson::New(payload) => match self.repo.insert_person(payload.clone()).await {
                Ok(person) => Ok(person),
                Err(RepoError::Conflict) => self
                    .repo
                    .find_person_by_email(&payload.email)
                    .await?
                    .ok_or(RepoError::Conflict),
                Err(e) => Err(e),
            },
        }
    }

    /// Children before parent: geodata, person-if-new, each photo meta,
    /// then the pass record referencing all of them.
    async fn persist_composite(
        &self,
        data: MountainPassSubmission,
        resolved: ResolvedPerson,
        photos: Vec<StoredPhoto>,
    ) -> RepoResult<MountainPassRecord> {
        let geodata = self.repo.insert_geodata(data.geodata.clone()).await?;
        let person = self.persist_person(resolved).await?;
        for photo in &photos {
            self.repo.insert_photo(photo.meta.clone()).await?;
        }
        self.repo
            .insert_pass(NewPassRecord {
                title: data.title,
                title_prefix: data.title_prefix,
                alt_titles: data.alt_titles,
                timestamp: data.timestamp,
                person_id: person.id,
                geodata_id: geodata.id,
                photo_ids: photos.iter().map(|p| p.meta.id).collect(),
                connects: data.connects,
                status: Status::New,
            })
            .await
    }

    pub async fn submit(
        &self,
        data: MountainPassSubmission,
        uploads: Vec<PhotoUpload>,
    ) -> RepoResult<Outcome> {
        if let Err(e) = data.validate() {
            return Ok(Outcome::rejected(e.to_string()));
        }
        // Callers may not submit pre-accepted/rejected records.
        if let Some(status) = data.status {
            if !status.can_mutate() {
                return Ok(Outcome::rejected("Status not New"));
            }
        }
        let resolved = self.resolve_person(&data.person).await?;
        if data.photos.len() != uploads.len() {
            return Ok(Outcome::rejected("Photo count mismatch"));
        }
        // Binaries land on storage before any record is written.
        let stored = match self.reconciler.reconcile(&data.photos, uploads).await {
            Ok(stored) => stored,
            Err(e) => return Ok(Outcome::rejected(e.to_string())),
        };
        let record = self.persist_composite(data, resolved, stored).await?;
        info!("stored mountain pass {}", record.id);
        Ok(Outcome::ok(record.id))
    }

    /// Replace-and-reassign-id, not in-place update: the old record and
    /// its geodata/photo children are deleted and a fresh composite is
    /// saved under a new id. The submitter cannot be changed by an edit.
    pub async fn edit(
        &self,
        id: Id,
        mut data: MountainPassSubmission,
        uploads: Vec<PhotoUpload>,
    ) -> RepoResult<Outcome> {
        let existing = match self.repo.get_pass(id).await {
            Ok(record) => record,
            Err(RepoError::NotFound) => return Ok(Outcome::rejected("Data not found")),
            Err(e) => return Err(e),
        };
        if !existing.status.can_mutate() {
            return Ok(Outcome::rejected("Status not New"));
        }
        let person = self.repo.get_person(existing.person_id).await?;
        // identity is forced before validation; the submitted person body is dead weight
        data.person = PersonPayload {
            email: person.email.clone(),
            username: person.username.clone(),
            first_name: person.first_name.clone(),
            last_name: person.last_name.clone(),
            phone: person.phone.clone(),
        };
        if let Err(e) = data.validate() {
            return Ok(Outcome::rejected(e.to_string()));
        }
        if data.photos.len() != uploads.len() {
            return Ok(Outcome::rejected("Invalid photo count"));
        }
        let stored = match self.reconciler.reconcile(&data.photos, uploads).await {
            Ok(stored) => stored,
            Err(e) => return Ok(Outcome::rejected(e.to_string())),
        };

        let removed = self.repo.delete_pass_cascade(id).await?;
        // Replaced binaries: best effort, the new composite wins either way.
        for photo_id in &removed.photo_ids {
            let stem = photo_id.simple().to_string();
            if let Err(e) = self.store.delete_stem(&stem).await {
                warn!("failed to remove replaced photo binary {stem}: {e}");
            }
        }

        let record = self
            .persist_composite(data, ResolvedPerson::Existing(person), stored)
            .await?;
        info!("replaced mountain pass {id} with {}", record.id);
        Ok(Outcome::ok(record.id))
    }
}
