use std::sync::Arc;

use futures::TryStreamExt;
use mongodb::bson::{DateTime, doc};
use serde::{Deserialize, Serialize};
use tenantry_shared::org::{
    CreateOrganizationBody, Organization, OrganizationPlan, OrganizationStatus,
};

use crate::{
    db::Mongo,
    response::{ServerError, ServerResult},
};

use super::rfc3339;

/// Public field names that list and find queries may filter and order on.
pub const QUERYABLE_FIELDS: &[&str] = &[
    "id",
    "name",
    "description",
    "ownerId",
    "plan",
    "status",
    "createdAt",
    "updatedAt",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrganizationDoc {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub owner_id: String,
    #[serde(default)]
    pub plan: OrganizationPlan,
    #[serde(default)]
    pub status: OrganizationStatus,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

impl OrganizationDoc {
    pub async fn create(
        db: &Arc<Mongo>,
        owner_id: &str,
        body: CreateOrganizationBody,
    ) -> ServerResult<OrganizationDoc> {
        let name = body.name.trim();
        if name.is_empty() {
            return Err(ServerError::bad_request("Organization name must not be empty"));
        }

        let now = DateTime::now();
        let org = OrganizationDoc {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            description: body.description.filter(|d| !d.trim().is_empty()),
            owner_id: owner_id.to_string(),
            plan: body.plan.unwrap_or_default(),
            status: OrganizationStatus::Active,
            created_at: now,
            updated_at: now,
        };
        db.organizations().insert_one(&org).await?;
        Ok(org)
    }

    pub async fn find_by_id(db: &Arc<Mongo>, id: &str) -> ServerResult<Option<OrganizationDoc>> {
        Ok(db.organizations().find_one(doc! { "_id": id }).await?)
    }

    pub async fn find_owned_by(
        db: &Arc<Mongo>,
        owner_id: &str,
    ) -> ServerResult<Option<OrganizationDoc>> {
        Ok(db
            .organizations()
            .find_one(doc! { "owner_id": owner_id })
            .await?)
    }

    pub async fn find_many(db: &Arc<Mongo>, ids: &[String]) -> ServerResult<Vec<OrganizationDoc>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let orgs = db
            .organizations()
            .find(doc! { "_id": { "$in": ids.to_vec() } })
            .await?
            .try_collect()
            .await?;
        Ok(orgs)
    }

    pub async fn delete(db: &Arc<Mongo>, id: &str) -> ServerResult<()> {
        db.organizations().delete_one(doc! { "_id": id }).await?;
        Ok(())
    }

    pub fn to_public(&self) -> Organization {
        Organization {
            id: self.id.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            owner_id: self.owner_id.clone(),
            plan: self.plan,
            status: self.status,
            created_at: rfc3339(self.created_at),
            updated_at: rfc3339(self.updated_at),
        }
    }
}
