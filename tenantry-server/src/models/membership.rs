use std::sync::Arc;

use futures::TryStreamExt;
use mongodb::bson::{DateTime, Document, doc};
use rand::{Rng, distributions::Alphanumeric};
use serde::{Deserialize, Serialize};
use tenantry_shared::{
    members::{
        MemberStatus, MemberStatusMachine, OrganizationMember, UpdateMemberBody,
        deserialize_lenient_status,
    },
    org::Organization,
    query::{Filter, Predicate, Value},
    roles::MemberRole,
};

use crate::{
    db::Mongo,
    response::{ServerError, ServerResult},
};

use super::rfc3339;

pub const QUERYABLE_FIELDS: &[&str] = &[
    "id",
    "organizationId",
    "userId",
    "email",
    "role",
    "status",
    "invitationToken",
    "invitationSentAt",
    "createdAt",
    "updatedAt",
];

pub const ORGANIZATION_RELATION: &str = "organization";
pub const INVITATION_TOKEN: &str = "invitationToken";

const TOKEN_LENGTH: usize = 32;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MembershipDoc {
    #[serde(rename = "_id")]
    pub id: String,
    pub organization_id: String,
    pub user_id: Option<String>,
    pub email: String,
    pub role: MemberRole,
    #[serde(default, deserialize_with = "deserialize_lenient_status")]
    pub status: Option<MemberStatus>,
    pub invitation_token: Option<String>,
    pub invitation_sent_at: Option<DateTime>,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

/// How the caller relates to one membership record.
#[derive(Debug, Clone, Copy, Default)]
pub struct MemberAccess {
    pub is_platform_admin: bool,
    /// The record is the caller's own membership or invitation.
    pub is_self: bool,
    /// Caller's role in the record's organization, if ACTIVE there.
    pub org_role: Option<MemberRole>,
}

impl MemberAccess {
    fn manages_organization(&self) -> bool {
        self.org_role
            .is_some_and(|role| MemberRole::allows(&role, &MemberRole::Admin))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    HardDelete,
    Transition(MemberStatus),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemberUpdate {
    pub status: Option<MemberStatus>,
    pub role: Option<MemberRole>,
}

pub fn plan_removal(
    access: &MemberAccess,
    role: MemberRole,
    status: Option<MemberStatus>,
) -> ServerResult<Removal> {
    if role == MemberRole::Owner {
        return Err(ServerError::bad_request(
            "The organization owner cannot be removed",
        ));
    }
    if access.is_platform_admin {
        return Ok(Removal::HardDelete);
    }

    let target = if access.is_self {
        MemberStatus::Rejected
    } else if access.manages_organization() {
        MemberStatus::Canceled
    } else {
        return Err(ServerError::forbidden(
            "Only organization admins can remove other members",
        ));
    };

    // an ACTIVE member removing themselves leaves the organization
    if access.is_self && status == Some(MemberStatus::Active) {
        return Ok(Removal::Transition(MemberStatus::Rejected));
    }

    let next = MemberStatusMachine::new(status).transition(target)?;
    Ok(Removal::Transition(next))
}

pub fn plan_update(
    access: &MemberAccess,
    role: MemberRole,
    status: Option<MemberStatus>,
    body: &UpdateMemberBody,
) -> ServerResult<MemberUpdate> {
    if body.is_empty() {
        return Err(ServerError::bad_request("Nothing to update"));
    }

    let mut update = MemberUpdate::default();

    if let Some(target) = body.status {
        if !access.is_platform_admin && !access.is_self {
            return Err(ServerError::forbidden(
                "Only the member can change the membership status",
            ));
        }
        update.status = Some(MemberStatusMachine::new(status).transition(target)?);
    }

    if let Some(new_role) = body.role {
        if role == MemberRole::Owner || new_role == MemberRole::Owner {
            return Err(ServerError::bad_request("The owner role cannot be changed"));
        }
        let may_change = access.is_platform_admin
            || (access.manages_organization() && !access.is_self);
        if !may_change {
            return Err(ServerError::forbidden(
                "Only organization admins can change member roles",
            ));
        }
        update.role = Some(new_role);
    }

    Ok(update)
}

/// Records a signed-in user may see: everything in organizations where they
/// are ACTIVE, plus pending invitations bound to their account.
pub fn visibility_scope(user_id: &str, active_organization_ids: &[String]) -> Document {
    doc! {
        "$or": [
            { "organization_id": { "$in": active_organization_ids.to_vec() } },
            { "user_id": user_id, "status": MemberStatus::Pending.as_str() },
        ]
    }
}

/// The invitation token an anonymous caller filters on, if any.
pub fn requested_invitation_token(filter: Option<&Filter>) -> Option<&str> {
    filter?
        .conditions(INVITATION_TOKEN)?
        .iter()
        .find_map(|predicate| match predicate {
            Predicate::Equals(Value::Text(token)) if !token.is_empty() => Some(token.as_str()),
            _ => None,
        })
}

fn generate_invitation_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LENGTH)
        .map(char::from)
        .collect()
}

fn open_statuses() -> [&'static str; 2] {
    [MemberStatus::Pending.as_str(), MemberStatus::Active.as_str()]
}

impl MembershipDoc {
    /// Fails when an open (PENDING or ACTIVE) membership already exists for
    /// `email` in the organization.
    pub async fn ensure_no_open_invitation(
        db: &Arc<Mongo>,
        organization_id: &str,
        email: &str,
    ) -> ServerResult<()> {
        let existing = db
            .organization_members()
            .find_one(doc! {
                "organization_id": organization_id,
                "email": email,
                "status": { "$in": open_statuses().to_vec() },
            })
            .await?;
        if existing.is_some() {
            return Err(ServerError::bad_request(&format!(
                "An invitation for {} already exists",
                email
            )));
        }
        Ok(())
    }

    /// A fresh PENDING invitation with its own token. Not stored yet.
    pub fn new_invitation(
        organization_id: &str,
        email: &str,
        role: MemberRole,
        user_id: Option<String>,
    ) -> MembershipDoc {
        let now = DateTime::now();
        MembershipDoc {
            id: uuid::Uuid::new_v4().to_string(),
            organization_id: organization_id.to_string(),
            user_id,
            email: email.to_string(),
            role,
            status: Some(MemberStatus::Pending),
            invitation_token: Some(generate_invitation_token()),
            invitation_sent_at: Some(now),
            created_at: now,
            updated_at: now,
        }
    }

    pub async fn insert(&self, db: &Arc<Mongo>) -> ServerResult<()> {
        db.organization_members().insert_one(self).await?;
        Ok(())
    }

    pub async fn create_owner(
        db: &Arc<Mongo>,
        organization_id: &str,
        user_id: &str,
        email: &str,
    ) -> ServerResult<MembershipDoc> {
        let now = DateTime::now();
        let member = MembershipDoc {
            id: uuid::Uuid::new_v4().to_string(),
            organization_id: organization_id.to_string(),
            user_id: Some(user_id.to_string()),
            email: email.to_string(),
            role: MemberRole::Owner,
            status: Some(MemberStatus::Active),
            invitation_token: None,
            invitation_sent_at: None,
            created_at: now,
            updated_at: now,
        };
        member.insert(db).await?;
        Ok(member)
    }

    pub async fn find_by_id(db: &Arc<Mongo>, id: &str) -> ServerResult<Option<MembershipDoc>> {
        Ok(db.organization_members().find_one(doc! { "_id": id }).await?)
    }

    pub async fn find_one(
        db: &Arc<Mongo>,
        filter: Document,
    ) -> ServerResult<Option<MembershipDoc>> {
        Ok(db.organization_members().find_one(filter).await?)
    }

    pub async fn active_organization_ids(
        db: &Arc<Mongo>,
        user_id: &str,
    ) -> ServerResult<Vec<String>> {
        let members: Vec<MembershipDoc> = db
            .organization_members()
            .find(doc! { "user_id": user_id, "status": MemberStatus::Active.as_str() })
            .await?
            .try_collect()
            .await?;
        Ok(members.into_iter().map(|m| m.organization_id).collect())
    }

    pub async fn find_active(
        db: &Arc<Mongo>,
        organization_id: &str,
        user_id: &str,
    ) -> ServerResult<Option<MembershipDoc>> {
        Ok(db
            .organization_members()
            .find_one(doc! {
                "organization_id": organization_id,
                "user_id": user_id,
                "status": MemberStatus::Active.as_str(),
            })
            .await?)
    }

    /// Attaches invitations sent to `email` before the account existed.
    pub async fn bind_pending_to_user(
        db: &Arc<Mongo>,
        user_id: &str,
        email: &str,
    ) -> ServerResult<u64> {
        let result = db
            .organization_members()
            .update_many(
                doc! { "email": email, "user_id": null },
                doc! { "$set": { "user_id": user_id, "updated_at": DateTime::now() } },
            )
            .await?;
        Ok(result.modified_count)
    }

    /// Matches this record while a planned status change is still valid. Role-only
    /// updates do not depend on the stored status.
    fn update_guard(&self, update: &MemberUpdate) -> Document {
        let mut guard = doc! { "_id": &self.id };
        if let (Some(_), Some(current)) = (update.status, self.status) {
            guard.insert("status", current.as_str());
        }
        guard
    }

    /// Stores an approved update. The write only applies while the record still
    /// has the status the plan was made from.
    pub async fn apply_update(
        &self,
        db: &Arc<Mongo>,
        update: &MemberUpdate,
        accepting_user: Option<&str>,
    ) -> ServerResult<MembershipDoc> {
        let mut set = doc! { "updated_at": DateTime::now() };
        let mut unset = Document::new();

        if let Some(role) = update.role {
            set.insert("role", role.as_str());
        }
        if let Some(status) = update.status {
            set.insert("status", status.as_str());
            if self.status == Some(MemberStatus::Pending) {
                unset.insert("invitation_token", "");
            }
            if let (MemberStatus::Active, Some(user_id)) = (status, accepting_user) {
                set.insert("user_id", user_id);
            }
        }

        let mut change = doc! { "$set": set };
        if !unset.is_empty() {
            change.insert("$unset", unset);
        }

        let updated = db
            .organization_members()
            .find_one_and_update(self.update_guard(update), change)
            .return_document(mongodb::options::ReturnDocument::After)
            .await?;

        updated.ok_or_else(|| ServerError::bad_request("Membership was changed concurrently"))
    }

    pub async fn hard_delete(db: &Arc<Mongo>, id: &str) -> ServerResult<()> {
        db.organization_members().delete_one(doc! { "_id": id }).await?;
        Ok(())
    }

    pub fn to_public(&self, organization: Option<Organization>) -> OrganizationMember {
        OrganizationMember {
            id: self.id.clone(),
            organization_id: self.organization_id.clone(),
            user_id: self.user_id.clone(),
            email: self.email.clone(),
            role: self.role,
            status: self.status,
            invitation_sent_at: self.invitation_sent_at.map(rfc3339),
            created_at: rfc3339(self.created_at),
            updated_at: rfc3339(self.updated_at),
            organization,
        }
    }
}

#[cfg(test)]
mod tests {
    use tenantry_shared::query::{QueryParams, build_find_many_options};

    use super::*;

    fn member() -> MemberAccess {
        MemberAccess {
            org_role: Some(MemberRole::Member),
            ..Default::default()
        }
    }

    fn org_admin() -> MemberAccess {
        MemberAccess {
            org_role: Some(MemberRole::Admin),
            ..Default::default()
        }
    }

    fn own_record() -> MemberAccess {
        MemberAccess {
            is_self: true,
            ..Default::default()
        }
    }

    fn platform_admin() -> MemberAccess {
        MemberAccess {
            is_platform_admin: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_owner_is_never_removed() {
        for access in [own_record(), org_admin(), platform_admin()] {
            let err = plan_removal(&access, MemberRole::Owner, Some(MemberStatus::Active));
            assert!(matches!(err, Err(ServerError::BadRequest(_))));
        }
    }

    #[test]
    fn test_self_removal_declines_invitation() {
        assert_eq!(
            plan_removal(&own_record(), MemberRole::Member, Some(MemberStatus::Pending)).unwrap(),
            Removal::Transition(MemberStatus::Rejected)
        );
    }

    #[test]
    fn test_active_member_can_leave() {
        assert_eq!(
            plan_removal(&own_record(), MemberRole::Member, Some(MemberStatus::Active)).unwrap(),
            Removal::Transition(MemberStatus::Rejected)
        );
        let own_admin_record = MemberAccess {
            is_self: true,
            org_role: Some(MemberRole::Admin),
            ..Default::default()
        };
        assert_eq!(
            plan_removal(&own_admin_record, MemberRole::Admin, Some(MemberStatus::Active)).unwrap(),
            Removal::Transition(MemberStatus::Rejected)
        );
    }

    #[test]
    fn test_self_removal_of_closed_record_is_rejected() {
        for status in [Some(MemberStatus::Rejected), Some(MemberStatus::Canceled), None] {
            let result = plan_removal(&own_record(), MemberRole::Member, status);
            assert!(matches!(result, Err(ServerError::BadRequest(_))));
        }
    }

    #[test]
    fn test_admin_removal_cancels() {
        assert_eq!(
            plan_removal(&org_admin(), MemberRole::Member, Some(MemberStatus::Active)).unwrap(),
            Removal::Transition(MemberStatus::Canceled)
        );
        assert_eq!(
            plan_removal(&org_admin(), MemberRole::Guest, Some(MemberStatus::Pending)).unwrap(),
            Removal::Transition(MemberStatus::Canceled)
        );
    }

    #[test]
    fn test_admin_removal_of_terminal_record_is_rejected() {
        let result = plan_removal(&org_admin(), MemberRole::Member, Some(MemberStatus::Canceled));
        assert!(matches!(result, Err(ServerError::BadRequest(_))));
        let unknown = plan_removal(&org_admin(), MemberRole::Member, None);
        assert!(matches!(unknown, Err(ServerError::BadRequest(_))));
    }

    #[test]
    fn test_plain_member_cannot_remove_others() {
        let result = plan_removal(&member(), MemberRole::Member, Some(MemberStatus::Active));
        assert!(matches!(
            result,
            Err(ServerError::AuthError(crate::response::AuthError::Forbidden(_)))
        ));
    }

    #[test]
    fn test_platform_admin_hard_deletes() {
        assert_eq!(
            plan_removal(&platform_admin(), MemberRole::Admin, Some(MemberStatus::Canceled)).unwrap(),
            Removal::HardDelete
        );
    }

    #[test]
    fn test_accepting_own_invitation() {
        let body = UpdateMemberBody {
            status: Some(MemberStatus::Active),
            role: None,
        };
        assert_eq!(
            plan_update(&own_record(), MemberRole::Member, Some(MemberStatus::Pending), &body)
                .unwrap(),
            MemberUpdate {
                status: Some(MemberStatus::Active),
                role: None,
            }
        );
    }

    #[test]
    fn test_status_change_follows_the_machine() {
        let body = UpdateMemberBody {
            status: Some(MemberStatus::Active),
            role: None,
        };
        for from in [MemberStatus::Rejected, MemberStatus::Canceled, MemberStatus::Active] {
            assert!(plan_update(&own_record(), MemberRole::Member, Some(from), &body).is_err());
        }
        assert!(plan_update(&platform_admin(), MemberRole::Member, Some(MemberStatus::Deleted), &body).is_err());
    }

    #[test]
    fn test_status_change_by_someone_else_is_forbidden() {
        let body = UpdateMemberBody {
            status: Some(MemberStatus::Canceled),
            role: None,
        };
        assert!(plan_update(&org_admin(), MemberRole::Member, Some(MemberStatus::Active), &body).is_err());
    }

    #[test]
    fn test_role_changes() {
        let promote = UpdateMemberBody {
            status: None,
            role: Some(MemberRole::Admin),
        };
        assert_eq!(
            plan_update(&org_admin(), MemberRole::Member, Some(MemberStatus::Active), &promote)
                .unwrap()
                .role,
            Some(MemberRole::Admin)
        );
        assert!(plan_update(&member(), MemberRole::Member, Some(MemberStatus::Active), &promote).is_err());
        assert!(plan_update(
            &MemberAccess {
                is_self: true,
                org_role: Some(MemberRole::Admin),
                ..Default::default()
            },
            MemberRole::Admin,
            Some(MemberStatus::Active),
            &promote
        )
        .is_err());
    }

    #[test]
    fn test_owner_role_is_immutable() {
        let demote = UpdateMemberBody {
            status: None,
            role: Some(MemberRole::Member),
        };
        assert!(plan_update(&platform_admin(), MemberRole::Owner, Some(MemberStatus::Active), &demote).is_err());

        let crown = UpdateMemberBody {
            status: None,
            role: Some(MemberRole::Owner),
        };
        assert!(plan_update(&platform_admin(), MemberRole::Member, Some(MemberStatus::Active), &crown).is_err());
    }

    #[test]
    fn test_empty_update_is_rejected() {
        assert!(plan_update(
            &platform_admin(),
            MemberRole::Member,
            Some(MemberStatus::Active),
            &UpdateMemberBody::default()
        )
        .is_err());
    }

    #[test]
    fn test_requested_invitation_token() {
        let params: QueryParams = [("where[invitationToken]", "abc123")].into_iter().collect();
        let options = build_find_many_options(&params);
        assert_eq!(requested_invitation_token(options.filter.as_ref()), Some("abc123"));

        let params: QueryParams = [("where[invitationToken][like]", "abc")].into_iter().collect();
        let options = build_find_many_options(&params);
        assert_eq!(requested_invitation_token(options.filter.as_ref()), None);

        assert_eq!(requested_invitation_token(None), None);
    }

    #[test]
    fn test_visibility_scope() {
        let scope = visibility_scope("u-1", &["o-1".to_string()]);
        assert_eq!(
            scope,
            doc! {
                "$or": [
                    { "organization_id": { "$in": ["o-1"] } },
                    { "user_id": "u-1", "status": "pending" },
                ]
            }
        );
    }

    #[test]
    fn test_new_invitation_is_pending_with_token() {
        let invite = MembershipDoc::new_invitation("o-1", "new@example.com", MemberRole::Guest, None);
        assert_eq!(invite.status, Some(MemberStatus::Pending));
        assert_eq!(invite.role, MemberRole::Guest);
        assert_eq!(invite.invitation_token.as_deref().map(str::len), Some(TOKEN_LENGTH));
        assert!(invite.invitation_sent_at.is_some());
        assert!(invite.user_id.is_none());
    }

    #[test]
    fn test_invitation_tokens_are_random() {
        let a = generate_invitation_token();
        let b = generate_invitation_token();
        assert_eq!(a.len(), TOKEN_LENGTH);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a, b);
    }

    fn stored(status: Option<MemberStatus>) -> MembershipDoc {
        let now = DateTime::from_millis(1_700_000_000_000);
        MembershipDoc {
            id: "m-1".into(),
            organization_id: "o-1".into(),
            user_id: Some("u-1".into()),
            email: "member@example.com".into(),
            role: MemberRole::Member,
            status,
            invitation_token: None,
            invitation_sent_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_status_changes_are_guarded_by_current_status() {
        let update = MemberUpdate {
            status: Some(MemberStatus::Canceled),
            role: None,
        };
        assert_eq!(
            stored(Some(MemberStatus::Active)).update_guard(&update),
            doc! { "_id": "m-1", "status": "active" }
        );
    }

    #[test]
    fn test_role_change_ignores_unknown_stored_status() {
        let update = MemberUpdate {
            status: None,
            role: Some(MemberRole::Admin),
        };
        assert_eq!(stored(None).update_guard(&update), doc! { "_id": "m-1" });
        assert_eq!(
            stored(Some(MemberStatus::Active)).update_guard(&update),
            doc! { "_id": "m-1" }
        );
    }

    #[test]
    fn test_public_view_hides_token() {
        let now = DateTime::from_millis(1_700_000_000_000);
        let doc = MembershipDoc {
            id: "m-1".into(),
            organization_id: "o-1".into(),
            user_id: None,
            email: "new@example.com".into(),
            role: MemberRole::Member,
            status: Some(MemberStatus::Pending),
            invitation_token: Some("secret".into()),
            invitation_sent_at: Some(now),
            created_at: now,
            updated_at: now,
        };
        let json = serde_json::to_value(doc.to_public(None)).unwrap();
        assert!(json.get("invitationToken").is_none());
        assert!(json.get("organization").is_none());
        assert_eq!(json["status"], "pending");
        assert_eq!(json["invitationSentAt"], "2023-11-14T22:13:20.000Z");
    }
}
