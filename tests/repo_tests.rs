#![cfg(feature = "inmem-store")]

use passreg::models::{
    GeoDataPayload, GeoPoint, NewPassRecord, PersonPayload, PhotoMeta, Status,
};
use passreg::repo::{inmem::InMemRepo, PassRepo, PersonRepo, RepoError};
use tempfile::TempDir;
use uuid::Uuid;

/// Helper that returns a fresh, empty repository for every test run.
/// The TempDir must stay alive for the snapshot path to remain valid.
fn repo() -> (InMemRepo, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    (InMemRepo::new(dir.path()), dir)
}

fn sample_person(email: &str) -> PersonPayload {
    PersonPayload {
        email: email.into(),
        username: "johndoe1969".into(),
        first_name: "John".into(),
        last_name: Some("Doe".into()),
        phone: Some("+19991234567".into()),
    }
}

fn sample_geodata() -> GeoDataPayload {
    GeoDataPayload {
        data: GeoPoint {
            kind: "Point".into(),
            coordinates: vec![1.33, -2.66],
        },
        altitude: 2789,
    }
}

fn sample_pass(person_id: i64, geodata_id: i64, photo_ids: Vec<Uuid>) -> NewPassRecord {
    NewPassRecord {
        title: "Dyatlov".into(),
        title_prefix: passreg::models::TitlePrefix { value: "per.".into() },
        alt_titles: Some(vec!["Schmyatlov".into()]),
        timestamp: chrono::Utc::now(),
        person_id,
        geodata_id,
        photo_ids,
        connects: None,
        status: Status::New,
    }
}

#[tokio::test]
async fn person_unique_email() {
    let (r, _dir) = repo();

    assert!(r.find_person_by_email("a@b.com").await.unwrap().is_none());

    let p = r.insert_person(sample_person("a@b.com")).await.unwrap();
    assert_eq!(p.email, "a@b.com");

    let found = r.find_person_by_email("a@b.com").await.unwrap().unwrap();
    assert_eq!(found.id, p.id);

    // duplicate email -> conflict
    let err = r.insert_person(sample_person("a@b.com")).await.unwrap_err();
    assert!(matches!(err, RepoError::Conflict));
}

#[tokio::test]
async fn pass_insert_get_and_query_by_email() {
    let (r, _dir) = repo();

    let person = r.insert_person(sample_person("a@b.com")).await.unwrap();
    let geo = r.insert_geodata(sample_geodata()).await.unwrap();
    let photo = PhotoMeta {
        id: Uuid::new_v4(),
        title: "Overlook".into(),
    };
    r.insert_photo(photo.clone()).await.unwrap();

    let record = r
        .insert_pass(sample_pass(person.id, geo.id, vec![photo.id]))
        .await
        .unwrap();

    let fetched = r.get_pass(record.id).await.unwrap();
    assert_eq!(fetched, record);
    assert_eq!(fetched.photo_ids, vec![photo.id]);

    let by_email = r.find_passes_by_email("a@b.com").await.unwrap();
    assert_eq!(by_email.len(), 1);
    assert_eq!(by_email[0].id, record.id);

    assert!(r.find_passes_by_email("nobody@example.com").await.unwrap().is_empty());
}

#[tokio::test]
async fn duplicate_photo_id_conflicts() {
    let (r, _dir) = repo();

    let photo = PhotoMeta {
        id: Uuid::new_v4(),
        title: "Overlook".into(),
    };
    r.insert_photo(photo.clone()).await.unwrap();
    let err = r.insert_photo(photo).await.unwrap_err();
    assert!(matches!(err, RepoError::Conflict));
}

#[tokio::test]
async fn cascade_delete_removes_children_keeps_person() {
    let (r, _dir) = repo();

    let person = r.insert_person(sample_person("a@b.com")).await.unwrap();
    let geo = r.insert_geodata(sample_geodata()).await.unwrap();
    let photo = PhotoMeta {
        id: Uuid::new_v4(),
        title: "Overlook".into(),
    };
    r.insert_photo(photo.clone()).await.unwrap();
    let record = r
        .insert_pass(sample_pass(person.id, geo.id, vec![photo.id]))
        .await
        .unwrap();

    let removed = r.delete_pass_cascade(record.id).await.unwrap();
    assert_eq!(removed.geodata_id, geo.id);
    assert_eq!(removed.photo_ids, vec![photo.id]);

    assert!(matches!(r.get_pass(record.id).await, Err(RepoError::NotFound)));
    assert!(matches!(r.get_geodata(geo.id).await, Err(RepoError::NotFound)));
    assert!(matches!(r.get_photo(photo.id).await, Err(RepoError::NotFound)));
    // the submitter survives the cascade
    assert_eq!(r.get_person(person.id).await.unwrap().id, person.id);
}

#[tokio::test]
async fn cascade_delete_missing_pass() {
    let (r, _dir) = repo();
    assert!(matches!(
        r.delete_pass_cascade(4242).await,
        Err(RepoError::NotFound)
    ));
}

#[tokio::test]
async fn snapshot_survives_restart() {
    let dir = tempfile::tempdir().unwrap();

    let first = InMemRepo::new(dir.path());
    let person = first.insert_person(sample_person("a@b.com")).await.unwrap();
    drop(first);

    let second = InMemRepo::new(dir.path());
    let found = second.find_person_by_email("a@b.com").await.unwrap().unwrap();
    assert_eq!(found.id, person.id);
}
