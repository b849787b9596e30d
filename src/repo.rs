use crate::models::*;
use async_trait::async_trait;
use uuid::Uuid;

#[derive(thiserror::Error, Debug)]
pub enum RepoError {
    #[error("not found")]
    NotFound,
    #[error("conflict")]
    Conflict,
    #[error("internal: {0}")]
    Internal(String),
}

pub type RepoResult<T> = Result<T, RepoError>;

/// Child ids removed by a cascade delete, so the caller can also clean
/// up the photo binaries those ids name on storage.
#[derive(Debug, Clone)]
pub struct CascadeDeleted {
    pub geodata_id: Id,
    pub photo_ids: Vec<Uuid>,
}

#[async_trait]
pub trait PersonRepo: Send + Sync {
    async fn find_person_by_email(&self, email: &str) -> RepoResult<Option<Person>>;
    /// Fails with [`RepoError::Conflict`] when the email is already taken.
    async fn insert_person(&self, new: PersonPayload) -> RepoResult<Person>;
    async fn get_person(&self, id: Id) -> RepoResult<Person>;
}

#[async_trait]
pub trait PassRepo: Send + Sync {
    async fn insert_geodata(&self, new: GeoDataPayload) -> RepoResult<GeoData>;
    async fn get_geodata(&self, id: Id) -> RepoResult<GeoData>;
    async fn insert_photo(&self, meta: PhotoMeta) -> RepoResult<()>;
    async fn get_photo(&self, id: Uuid) -> RepoResult<PhotoMeta>;
    async fn insert_pass(&self, new: NewPassRecord) -> RepoResult<MountainPassRecord>;
    async fn get_pass(&self, id: Id) -> RepoResult<MountainPassRecord>;
    async fn find_passes_by_email(&self, email: &str) -> RepoResult<Vec<MountainPassRecord>>;
    /// Removes the parent record first, then its geodata and photo
    /// children. The referenced person is never touched.
    async fn delete_pass_cascade(&self, id: Id) -> RepoResult<CascadeDeleted>;
}

pub trait Repo: PersonRepo + PassRepo {}

impl<T> Repo for T where T: PersonRepo + PassRepo {}

#[cfg(feature = "inmem-store")]
pub mod inmem {
    use super::*;
    use serde::{Deserialize, Serialize};
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};
    use std::sync::{Arc, RwLock};

    #[derive(Default, Serialize, Deserialize)]
    struct State {
        persons: HashMap<Id, Person>,
        geodata: HashMap<Id, GeoData>,
        photos: HashMap<Uuid, PhotoMeta>,
        passes: HashMap<Id, MountainPassRecord>,
        next_id: Id,
    }

    /// Document store backed by process memory, snapshotted to
    /// `<data-dir>/state.json` after every mutation. Default backend;
    /// also what the test suite runs against.
    #[derive(Clone)]
    pub struct InMemRepo {
        state: Arc<RwLock<State>>,
        snapshot_path: Arc<PathBuf>,
    }

    impl InMemRepo {
        pub fn new(data_dir: &Path) -> Self {
            let snapshot_path = data_dir.join("state.json");
            let state = Self::load_state_from(&snapshot_path);
            Self {
                state: Arc::new(RwLock::new(state)),
                snapshot_path: Arc::new(snapshot_path),
            }
        }

        fn load_state_from(path: &Path) -> State {
            match std::fs::read(path) {
                Ok(bytes) => match serde_json::from_slice::<State>(&bytes) {
                    Ok(s) => {
                        log::info!("loaded snapshot '{}'", path.display());
                        s
                    }
                    Err(e) => {
                        log::warn!(
                            "failed to parse snapshot '{}': {e}; starting empty",
                            path.display()
                        );
                        State::default()
                    }
                },
                Err(_) => State::default(),
            }
        }

        fn persist(&self) {
            let path = &*self.snapshot_path;
            if let Ok(s) = serde_json::to_vec_pretty(&*self.state.read().unwrap()) {
                if let Some(dir) = path.parent() {
                    let _ = std::fs::create_dir_all(dir);
                }
                if let Err(e) = std::fs::write(path, s) {
                    log::warn!("failed to write snapshot '{}': {e}", path.display());
                }
            }
        }

        fn next_id(state: &mut State) -> Id {
            state.next_id += 1;
            state.next_id
        }
    }

    #[async_trait]
    impl PersonRepo for InMemRepo {
        async fn find_person_by_email(&self, email: &str) -> RepoResult<Option<Person>> {
            let s = self.state.read().unwrap();
            Ok(s.persons.values().find(|p| p.email == email).cloned())
        }

        async fn insert_person(&self, new: PersonPayload) -> RepoResult<Person> {
            let mut s = self.state.write().unwrap();
            // unique-email constraint lives here, not in the workflow
            if s.persons.values().any(|p| p.email == new.email) {
                return Err(RepoError::Conflict);
            }
            let id = Self::next_id(&mut s);
            let person = Person {
                id,
                email: new.email,
                username: new.username,
                first_name: new.first_name,
                last_name: new.last_name,
                phone: new.phone,
            };
            s.persons.insert(id, person.clone());
            drop(s);
            self.persist();
            Ok(person)
        }

        async fn get_person(&self, id: Id) -> RepoResult<Person> {
            let s = self.state.read().unwrap();
            s.persons.get(&id).cloned().ok_or(RepoError::NotFound)
        }
    }

    #[async_trait]
    impl PassRepo for InMemRepo {
        async fn insert_geodata(&self, new: GeoDataPayload) -> RepoResult<GeoData> {
            let mut s = self.state.write().unwrap();
            let id = Self::next_id(&mut s);
            let geo = GeoData {
                id,
                data: new.data,
                altitude: new.altitude,
            };
            s.geodata.insert(id, geo.clone());
            drop(s);
            self.persist();
            Ok(geo)
        }

        async fn get_geodata(&self, id: Id) -> RepoResult<GeoData> {
            let s = self.state.read().unwrap();
            s.geodata.get(&id).cloned().ok_or(RepoError::NotFound)
        }

        async fn insert_photo(&self, meta: PhotoMeta) -> RepoResult<()> {
            let mut s = self.state.write().unwrap();
            if s.photos.contains_key(&meta.id) {
                return Err(RepoError::Conflict);
            }
            s.photos.insert(meta.id, meta);
            drop(s);
            self.persist();
            Ok(())
        }

        async fn get_photo(&self, id: Uuid) -> RepoResult<PhotoMeta> {
            let s = self.state.read().unwrap();
            s.photos.get(&id).cloned().ok_or(RepoError::NotFound)
        }

        async fn insert_pass(&self, new: NewPassRecord) -> RepoResult<MountainPassRecord> {
            let mut s = self.state.write().unwrap();
            let id = Self::next_id(&mut s);
            let record = MountainPassRecord {
                id,
                title: new.title,
                title_prefix: new.title_prefix,
                alt_titles: new.alt_titles,
                timestamp: new.timestamp,
                person_id: new.person_id,
                geodata_id: new.geodata_id,
                photo_ids: new.photo_ids,
                connects: new.connects,
                status: new.status,
            };
            s.passes.insert(id, record.clone());
            drop(s);
            self.persist();
            Ok(record)
        }

        async fn get_pass(&self, id: Id) -> RepoResult<MountainPassRecord> {
            let s = self.state.read().unwrap();
            s.passes.get(&id).cloned().ok_or(RepoError::NotFound)
        }

        async fn find_passes_by_email(&self, email: &str) -> RepoResult<Vec<MountainPassRecord>> {
            let s = self.state.read().unwrap();
            let person_id = match s.persons.values().find(|p| p.email == email) {
                Some(p) => p.id,
                None => return Ok(Vec::new()),
            };
            Ok(s.passes
                .values()
                .filter(|r| r.person_id == person_id)
                .cloned()
                .collect())
        }

        async fn delete_pass_cascade(&self, id: Id) -> RepoResult<CascadeDeleted> {
            let mut s = self.state.write().unwrap();
            // parent goes first, children after
            let record = s.passes.remove(&id).ok_or(RepoError::NotFound)?;
            s.geodata.remove(&record.geodata_id);
            for pid in &record.photo_ids {
                s.photos.remove(pid);
            }
            drop(s);
            self.persist();
            Ok(CascadeDeleted {
                geodata_id: record.geodata_id,
                photo_ids: record.photo_ids,
            })
        }
    }
}

// Postgres implementation (feature = "postgres-store")
#[cfg(feature = "postgres-store")]
pub mod pg {
    use super::*;
    use sqlx::postgres::PgRow;
    use sqlx::{Pool, Postgres, Row};

    #[derive(Clone)]
    pub struct PgRepo {
        pool: Pool<Postgres>,
    }

    impl PgRepo {
        pub fn new(pool: Pool<Postgres>) -> Self {
            Self { pool }
        }
    }

    fn internal(e: sqlx::Error) -> RepoError {
        RepoError::Internal(e.to_string())
    }

    fn is_unique_violation(e: &sqlx::Error) -> bool {
        matches!(e, sqlx::Error::Database(db) if db.code().as_deref() == Some("23505"))
    }

    fn person_from_row(row: &PgRow) -> Result<Person, sqlx::Error> {
        Ok(Person {
            id: row.try_get("id")?,
            email: row.try_get("email")?,
            username: row.try_get("username")?,
            first_name: row.try_get("first_name")?,
            last_name: row.try_get("last_name")?,
            phone: row.try_get("phone")?,
        })
    }

    fn geodata_from_row(row: &PgRow) -> Result<GeoData, sqlx::Error> {
        Ok(GeoData {
            id: row.try_get("id")?,
            data: GeoPoint {
                kind: "Point".to_string(),
                coordinates: vec![row.try_get("lon")?, row.try_get("lat")?],
            },
            altitude: row.try_get("altitude")?,
        })
    }

    fn pass_from_row(row: &PgRow) -> Result<MountainPassRecord, sqlx::Error> {
        let status: String = row.try_get("status")?;
        Ok(MountainPassRecord {
            id: row.try_get("id")?,
            title: row.try_get("title")?,
            title_prefix: TitlePrefix {
                value: row.try_get("title_prefix")?,
            },
            alt_titles: row.try_get("alt_titles")?,
            timestamp: row.try_get("ts")?,
            person_id: row.try_get("person_id")?,
            geodata_id: row.try_get("geodata_id")?,
            photo_ids: row.try_get("photo_ids")?,
            connects: row.try_get("connects")?,
            status: Status::parse(&status)
                .ok_or_else(|| sqlx::Error::Decode(format!("bad status '{status}'").into()))?,
        })
    }

    #[async_trait]
    impl PersonRepo for PgRepo {
        async fn find_person_by_email(&self, email: &str) -> RepoResult<Option<Person>> {
            let row = sqlx::query(
                "SELECT id, email, username, first_name, last_name, phone FROM persons WHERE email = $1",
            )
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(internal)?;
            row.map(|r| person_from_row(&r)).transpose().map_err(internal)
        }

        async fn insert_person(&self, new: PersonPayload) -> RepoResult<Person> {
            let row = sqlx::query(
                "INSERT INTO persons (email, username, first_name, last_name, phone) \
                 VALUES ($1, $2, $3, $4, $5) \
                 RETURNING id, email, username, first_name, last_name, phone",
            )
            .bind(&new.email)
            .bind(&new.username)
            .bind(&new.first_name)
            .bind(&new.last_name)
            .bind(&new.phone)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    RepoError::Conflict
                } else {
                    internal(e)
                }
            })?;
            person_from_row(&row).map_err(internal)
        }

        async fn get_person(&self, id: Id) -> RepoResult<Person> {
            let row = sqlx::query(
                "SELECT id, email, username, first_name, last_name, phone FROM persons WHERE id = $1",
            )
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(internal)?
            .ok_or(RepoError::NotFound)?;
            person_from_row(&row).map_err(internal)
        }
    }

    #[async_trait]
    impl PassRepo for PgRepo {
        async fn insert_geodata(&self, new: GeoDataPayload) -> RepoResult<GeoData> {
            let row = sqlx::query(
                "INSERT INTO geo_data (lon, lat, altitude) VALUES ($1, $2, $3) \
                 RETURNING id, lon, lat, altitude",
            )
            .bind(new.data.lon())
            .bind(new.data.lat())
            .bind(new.altitude)
            .fetch_one(&self.pool)
            .await
            .map_err(internal)?;
            geodata_from_row(&row).map_err(internal)
        }

        async fn get_geodata(&self, id: Id) -> RepoResult<GeoData> {
            let row = sqlx::query("SELECT id, lon, lat, altitude FROM geo_data WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(internal)?
                .ok_or(RepoError::NotFound)?;
            geodata_from_row(&row).map_err(internal)
        }

        async fn insert_photo(&self, meta: PhotoMeta) -> RepoResult<()> {
            sqlx::query("INSERT INTO photos (id, title) VALUES ($1, $2)")
                .bind(meta.id)
                .bind(&meta.title)
                .execute(&self.pool)
                .await
                .map_err(|e| {
                    if is_unique_violation(&e) {
                        RepoError::Conflict
                    } else {
                        internal(e)
                    }
                })?;
            Ok(())
        }

        async fn get_photo(&self, id: Uuid) -> RepoResult<PhotoMeta> {
            let row = sqlx::query("SELECT id, title FROM photos WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(internal)?
                .ok_or(RepoError::NotFound)?;
            Ok(PhotoMeta {
                id: row.try_get("id").map_err(internal)?,
                title: row.try_get("title").map_err(internal)?,
            })
        }

        async fn insert_pass(&self, new: NewPassRecord) -> RepoResult<MountainPassRecord> {
            let row = sqlx::query(
                "INSERT INTO mountain_passes \
                 (title, title_prefix, alt_titles, ts, person_id, geodata_id, photo_ids, connects, status) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
                 RETURNING id, title, title_prefix, alt_titles, ts, person_id, geodata_id, photo_ids, connects, status",
            )
            .bind(&new.title)
            .bind(&new.title_prefix.value)
            .bind(&new.alt_titles)
            .bind(new.timestamp)
            .bind(new.person_id)
            .bind(new.geodata_id)
            .bind(&new.photo_ids)
            .bind(&new.connects)
            .bind(new.status.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(internal)?;
            pass_from_row(&row).map_err(internal)
        }

        async fn get_pass(&self, id: Id) -> RepoResult<MountainPassRecord> {
            let row = sqlx::query(
                "SELECT id, title, title_prefix, alt_titles, ts, person_id, geodata_id, photo_ids, connects, status \
                 FROM mountain_passes WHERE id = $1",
            )
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(internal)?
            .ok_or(RepoError::NotFound)?;
            pass_from_row(&row).map_err(internal)
        }

        async fn find_passes_by_email(&self, email: &str) -> RepoResult<Vec<MountainPassRecord>> {
            let rows = sqlx::query(
                "SELECT mp.id, mp.title, mp.title_prefix, mp.alt_titles, mp.ts, mp.person_id, \
                        mp.geodata_id, mp.photo_ids, mp.connects, mp.status \
                 FROM mountain_passes mp \
                 JOIN persons p ON p.id = mp.person_id \
                 WHERE p.email = $1",
            )
            .bind(email)
            .fetch_all(&self.pool)
            .await
            .map_err(internal)?;
            rows.iter()
                .map(pass_from_row)
                .collect::<Result<Vec<_>, _>>()
                .map_err(internal)
        }

        async fn delete_pass_cascade(&self, id: Id) -> RepoResult<CascadeDeleted> {
            let mut tx = self.pool.begin().await.map_err(internal)?;
            let row = sqlx::query("SELECT geodata_id, photo_ids FROM mountain_passes WHERE id = $1")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(internal)?
                .ok_or(RepoError::NotFound)?;
            let geodata_id: Id = row.try_get("geodata_id").map_err(internal)?;
            let photo_ids: Vec<Uuid> = row.try_get("photo_ids").map_err(internal)?;

            // explicit ordering: parent row, then each child kind
            sqlx::query("DELETE FROM mountain_passes WHERE id = $1")
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(internal)?;
            sqlx::query("DELETE FROM geo_data WHERE id = $1")
                .bind(geodata_id)
                .execute(&mut *tx)
                .await
                .map_err(internal)?;
            sqlx::query("DELETE FROM photos WHERE id = ANY($1)")
                .bind(&photo_ids)
                .execute(&mut *tx)
                .await
                .map_err(internal)?;
            tx.commit().await.map_err(internal)?;

            Ok(CascadeDeleted {
                geodata_id,
                photo_ids,
            })
        }
    }
}
