//! Store behaviour against a real MongoDB. Needs Docker.

use std::sync::Arc;

use mongodb::bson::{DateTime, Document, doc};
use tenantry_shared::{members::MemberStatus, roles::MemberRole};
use testcontainers::{
    ContainerAsync, GenericImage, ImageExt,
    core::{IntoContainerPort, WaitFor},
    runners::AsyncRunner,
};
use uuid::Uuid;

use super::membership::{MemberUpdate, MembershipDoc};
use crate::{db::Mongo, response::ServerError};

const ORG: &str = "o-1";
const EMAIL: &str = "new@example.com";

async fn start_mongo() -> (Arc<Mongo>, ContainerAsync<GenericImage>) {
    let container = GenericImage::new("mongo", "7")
        .with_exposed_port(27017.tcp())
        .with_wait_for(WaitFor::message_on_stdout("Waiting for connections"))
        .start()
        .await
        .expect("Failed to start MongoDB");
    let port = container.get_host_port_ipv4(27017).await.unwrap();

    let uri = format!("mongodb://127.0.0.1:{port}");
    let db = Mongo::connect(&uri, &format!("tenantry_{}", Uuid::new_v4().simple()))
        .await
        .unwrap();
    db.ensure_indexes().await.unwrap();
    (Arc::new(db), container)
}

fn status_change(status: MemberStatus) -> MemberUpdate {
    MemberUpdate {
        status: Some(status),
        role: None,
    }
}

#[tokio::test]
async fn test_open_invitation_blocks_another() {
    let (db, _mongo) = start_mongo().await;

    MembershipDoc::ensure_no_open_invitation(&db, ORG, EMAIL).await.unwrap();
    let invitation = MembershipDoc::new_invitation(ORG, EMAIL, MemberRole::Member, None);
    invitation.insert(&db).await.unwrap();

    let again = MembershipDoc::ensure_no_open_invitation(&db, ORG, EMAIL).await;
    assert!(matches!(again, Err(ServerError::BadRequest(_))));

    // other organizations are unaffected
    MembershipDoc::ensure_no_open_invitation(&db, "o-2", EMAIL).await.unwrap();
}

#[tokio::test]
async fn test_unique_index_rejects_second_open_record() {
    let (db, _mongo) = start_mongo().await;

    let first = MembershipDoc::new_invitation(ORG, EMAIL, MemberRole::Member, None);
    first.insert(&db).await.unwrap();

    let second = MembershipDoc::new_invitation(ORG, EMAIL, MemberRole::Guest, None);
    let duplicate = second.insert(&db).await;
    assert!(matches!(duplicate, Err(ServerError::BadRequest(_))));

    // closed records fall outside the partial index
    first
        .apply_update(&db, &status_change(MemberStatus::Canceled), None)
        .await
        .unwrap();
    second.insert(&db).await.unwrap();
}

#[tokio::test]
async fn test_status_write_is_conditional() {
    let (db, _mongo) = start_mongo().await;

    let invitation = MembershipDoc::new_invitation(ORG, EMAIL, MemberRole::Member, None);
    invitation.insert(&db).await.unwrap();
    let stale = invitation.clone();

    let accepted = invitation
        .apply_update(&db, &status_change(MemberStatus::Active), Some("u-1"))
        .await
        .unwrap();
    assert_eq!(accepted.status, Some(MemberStatus::Active));
    assert_eq!(accepted.user_id.as_deref(), Some("u-1"));
    assert!(accepted.invitation_token.is_none());

    // planned from PENDING, but the record is ACTIVE by now
    let late = stale
        .apply_update(&db, &status_change(MemberStatus::Canceled), None)
        .await;
    assert!(matches!(late, Err(ServerError::BadRequest(_))));

    let stored = MembershipDoc::find_by_id(&db, &invitation.id).await.unwrap().unwrap();
    assert_eq!(stored.status, Some(MemberStatus::Active));
}

#[tokio::test]
async fn test_role_change_on_unknown_stored_status() {
    let (db, _mongo) = start_mongo().await;

    let now = DateTime::now();
    db.client
        .database(&db.db_name)
        .collection::<Document>("organization_members")
        .insert_one(doc! {
            "_id": "m-legacy",
            "organization_id": ORG,
            "user_id": "u-2",
            "email": "legacy@example.com",
            "role": "member",
            "status": "suspended",
            "created_at": now,
            "updated_at": now,
        })
        .await
        .unwrap();

    let legacy = MembershipDoc::find_by_id(&db, "m-legacy").await.unwrap().unwrap();
    assert_eq!(legacy.status, None);

    let promote = MemberUpdate {
        status: None,
        role: Some(MemberRole::Admin),
    };
    let updated = legacy.apply_update(&db, &promote, None).await.unwrap();
    assert_eq!(updated.role, MemberRole::Admin);
}
