use std::sync::Arc;

use mongodb::{
    bson::{DateTime, doc},
    options::ReturnDocument,
};
use serde::{Deserialize, Serialize};
use tenantry_shared::roles::PlatformRole;

use crate::{auth::jwt::TokenClaims, db::Mongo, response::ServerResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserDoc {
    #[serde(rename = "_id")]
    pub id: String,

    pub sub: String,
    pub name: Option<String>,
    pub email: Option<String>,
    #[serde(default)]
    pub role: PlatformRole,

    pub created_at: DateTime,
    pub last_login: DateTime,
    pub total_logins: u64,
}

impl UserDoc {
    /// Records a login for the token subject, creating the user on first sight.
    pub async fn get_or_create(db: &Arc<Mongo>, claims: &TokenClaims) -> ServerResult<UserDoc> {
        let collection = db.users();
        let now = DateTime::now();
        let email = claims.email.as_ref().map(|e| e.trim().to_lowercase());

        let mut set = doc! { "last_login": now };
        if let Some(email) = &email {
            set.insert("email", email);
        }
        if let Some(name) = &claims.name {
            set.insert("name", name);
        }

        if let Some(user) = collection
            .find_one_and_update(
                doc! { "sub": &claims.sub },
                doc! { "$set": set, "$inc": { "total_logins": 1 } },
            )
            .return_document(ReturnDocument::After)
            .await?
        {
            return Ok(user);
        }

        let user = UserDoc {
            id: uuid::Uuid::new_v4().to_string(),
            sub: claims.sub.clone(),
            name: claims.name.clone(),
            email,
            role: claims.role.unwrap_or_default(),
            created_at: now,
            last_login: now,
            total_logins: 1,
        };
        collection.insert_one(&user).await?;
        Ok(user)
    }

    pub async fn find_by_email(db: &Arc<Mongo>, email: &str) -> ServerResult<Option<UserDoc>> {
        let user = db
            .users()
            .find_one(doc! { "email": email.trim().to_lowercase() })
            .await?;
        Ok(user)
    }

    pub fn display_name(&self) -> String {
        self.name
            .clone()
            .or_else(|| self.email.clone())
            .unwrap_or_else(|| self.sub.clone())
    }
}
