use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

pub type Id = i64;

/// Lifecycle of a submitted pass. Only `New` records may be edited;
/// moderation moves them to one of the terminal states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    #[default]
    New,
    Pending,
    Accepted,
    Rejected,
}

impl Status {
    pub fn can_mutate(self) -> bool {
        matches!(self, Status::New)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Status::New => "NEW",
            Status::Pending => "PENDING",
            Status::Accepted => "ACCEPTED",
            Status::Rejected => "REJECTED",
        }
    }

    pub fn parse(s: &str) -> Option<Status> {
        match s {
            "NEW" => Some(Status::New),
            "PENDING" => Some(Status::Pending),
            "ACCEPTED" => Some(Status::Accepted),
            "REJECTED" => Some(Status::Rejected),
            _ => None,
        }
    }
}

/// Short honorific/qualifier in front of the pass title ("per.", "pik" ...).
/// Embedded value type, never persisted on its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct TitlePrefix {
    pub value: String,
}

/// GeoJSON-shaped point: `{"type": "Point", "coordinates": [lon, lat]}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct GeoPoint {
    #[serde(rename = "type")]
    pub kind: String,
    pub coordinates: Vec<f64>,
}

impl GeoPoint {
    /// Valid only after [`GeoDataPayload::validate`] has checked arity.
    pub fn lon(&self) -> f64 {
        self.coordinates[0]
    }
    pub fn lat(&self) -> f64 {
        self.coordinates[1]
    }
}

/// Submitter profile as supplied in a submission payload (unpersisted).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PersonPayload {
    pub email: String,
    pub username: String,
    pub first_name: String,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

/// Persisted submitter. `email` is the natural dedup key; `id` is the
/// surrogate assigned on first creation and referenced by passes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Person {
    pub id: Id,
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub last_name: Option<String>,
    pub phone: Option<String>,
}

/// Geo point + altitude as supplied in a submission payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct GeoDataPayload {
    pub data: GeoPoint,
    pub altitude: i32,
}

/// Persisted geo data, created fresh per submission (no dedup).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct GeoData {
    pub id: Id,
    pub data: GeoPoint,
    pub altitude: i32,
}

/// One photo's metadata. The uuid doubles as the base name of the binary
/// on storage (simple/hyphenless hex), so it is generated up front when
/// the caller does not supply one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PhotoMeta {
    #[serde(default = "uuid::Uuid::new_v4")]
    pub id: Uuid,
    pub title: String,
}

/// Inbound composite payload: embedded, unpersisted sub-entity bodies.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MountainPassSubmission {
    pub title: String,
    pub title_prefix: TitlePrefix,
    #[serde(default)]
    pub alt_titles: Option<Vec<String>>,
    #[serde(default = "chrono::Utc::now")]
    pub timestamp: DateTime<Utc>,
    pub person: PersonPayload,
    pub geodata: GeoDataPayload,
    #[serde(default)]
    pub photos: Vec<PhotoMeta>,
    #[serde(default)]
    pub connects: Option<String>,
    #[serde(default)]
    pub status: Option<Status>,
}

/// Stored composite: lightweight references only. Sub-entity bodies are
/// expanded on read, never embedded here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MountainPassRecord {
    pub id: Id,
    pub title: String,
    pub title_prefix: TitlePrefix,
    pub alt_titles: Option<Vec<String>>,
    pub timestamp: DateTime<Utc>,
    pub person_id: Id,
    pub geodata_id: Id,
    pub photo_ids: Vec<Uuid>,
    pub connects: Option<String>,
    pub status: Status,
}

/// Insertable form of [`MountainPassRecord`] (id assigned by the store).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPassRecord {
    pub title: String,
    pub title_prefix: TitlePrefix,
    pub alt_titles: Option<Vec<String>>,
    pub timestamp: DateTime<Utc>,
    pub person_id: Id,
    pub geodata_id: Id,
    pub photo_ids: Vec<Uuid>,
    pub connects: Option<String>,
    pub status: Status,
}

/// Outbound composite: every reference resolved to a full body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct MountainPassView {
    pub id: Id,
    pub title: String,
    pub title_prefix: TitlePrefix,
    pub alt_titles: Option<Vec<String>>,
    pub timestamp: DateTime<Utc>,
    pub person: Person,
    pub geodata: GeoData,
    pub photos: Vec<PhotoMeta>,
    pub connects: Option<String>,
    pub status: Status,
}

#[derive(thiserror::Error, Debug)]
pub enum ValidationError {
    #[error("title must not be empty")]
    EmptyTitle,
    #[error("invalid email address: {0}")]
    BadEmail(String),
    #[error("username must not be empty")]
    EmptyUsername,
    #[error("first name must not be empty")]
    EmptyFirstName,
    #[error("geometry type must be Point, got {0}")]
    NotAPoint(String),
    #[error("coordinates must be [lon, lat], got {0} values")]
    BadCoordinates(usize),
    #[error("longitude {0} out of range")]
    BadLongitude(f64),
    #[error("latitude {0} out of range")]
    BadLatitude(f64),
    #[error("photo title must not be empty")]
    EmptyPhotoTitle,
}

/// Minimal structural check: `local@domain` with a dotted, non-degenerate
/// domain part. Anything stricter belongs to a mail verifier, not here.
fn valid_email(s: &str) -> bool {
    if s.chars().any(char::is_whitespace) {
        return false;
    }
    match s.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
        }
        None => false,
    }
}

impl PersonPayload {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !valid_email(&self.email) {
            return Err(ValidationError::BadEmail(self.email.clone()));
        }
        if self.username.trim().is_empty() {
            return Err(ValidationError::EmptyUsername);
        }
        if self.first_name.trim().is_empty() {
            return Err(ValidationError::EmptyFirstName);
        }
        Ok(())
    }
}

impl GeoDataPayload {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.data.kind != "Point" {
            return Err(ValidationError::NotAPoint(self.data.kind.clone()));
        }
        if self.data.coordinates.len() != 2 {
            return Err(ValidationError::BadCoordinates(self.data.coordinates.len()));
        }
        let lon = self.data.lon();
        if !(-180.0..=180.0).contains(&lon) {
            return Err(ValidationError::BadLongitude(lon));
        }
        let lat = self.data.lat();
        if !(-90.0..=90.0).contains(&lat) {
            return Err(ValidationError::BadLatitude(lat));
        }
        Ok(())
    }
}

impl MountainPassSubmission {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.title.trim().is_empty() {
            return Err(ValidationError::EmptyTitle);
        }
        self.person.validate()?;
        self.geodata.validate()?;
        for photo in &self.photos {
            if photo.title.trim().is_empty() {
                return Err(ValidationError::EmptyPhotoTitle);
            }
        }
        Ok(())
    }
}
