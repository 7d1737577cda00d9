use std::collections::HashMap;

use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use mongodb::bson::{Document, doc};
use serde_json::Value as JsonValue;
use tenantry_shared::members::{InviteMemberBody, OrganizationMember, UpdateMemberBody};
use tenantry_shared::org::Organization;
use tenantry_shared::pagination::Page;
use tenantry_shared::query::{Filter, build_find_many_options, build_find_one_options};
use tenantry_shared::roles::MemberRole;
use tracing::{debug, info, warn};

use crate::auth::claims::Claims;
use crate::mail::{InviteEmail, Mailer};
use crate::models::membership::{
    MemberAccess, MemberUpdate, MembershipDoc, ORGANIZATION_RELATION, QUERYABLE_FIELDS, Removal,
    plan_removal, plan_update, requested_invitation_token, visibility_scope,
};
use crate::models::org::OrganizationDoc;
use crate::models::user::UserDoc;
use crate::response::{ServerAppResult, ServerError, ServerResponse, ServerResult};
use crate::util::app_state::AppState;
use crate::util::bson_query::{and, filter_document, find_page};
use crate::util::query::{RequestQuery, page_response, shape};

pub fn create_route() -> Router<AppState> {
    Router::new()
        .route("/", get(list_members).post(invite_member))
        .route(
            "/{id}",
            get(get_member).patch(update_member).delete(remove_member),
        )
}

async fn invite_member(
    claims: Claims,
    State(state): State<AppState>,
    Json(payload): Json<InviteMemberBody>,
) -> ServerAppResult<OrganizationMember> {
    let email = payload.email.trim().to_lowercase();
    if email.is_empty() || !email.contains('@') {
        return Err(ServerError::bad_request("A valid email address is required"));
    }
    if claims.owns_email(&email) {
        return Err(ServerError::bad_request("You cannot invite yourself"));
    }

    let role = payload.role.unwrap_or_default();
    if role == MemberRole::Owner {
        return Err(ServerError::bad_request("Invitations cannot grant the owner role"));
    }

    let org = OrganizationDoc::find_by_id(&state.db, &payload.organization_id)
        .await?
        .ok_or_else(|| {
            ServerError::bad_request(&format!(
                "Organization {} not found",
                payload.organization_id
            ))
        })?;

    if !claims.is_admin {
        let inviter = MembershipDoc::find_active(&state.db, &org.id, &claims.user_id)
            .await?
            .ok_or_else(|| ServerError::forbidden("Not a member of this organization"))?;
        if !MemberRole::allows(&inviter.role, &MemberRole::Admin) {
            return Err(ServerError::forbidden("Only organization admins can invite"));
        }
        if role.rank() > inviter.role.rank() {
            return Err(ServerError::forbidden("Cannot invite with a higher role"));
        }
    }

    let invitee = UserDoc::find_by_email(&state.db, &email).await?;
    MembershipDoc::ensure_no_open_invitation(&state.db, &org.id, &email).await?;
    let invitation = MembershipDoc::new_invitation(
        &org.id,
        &email,
        role,
        invitee.as_ref().map(|u| u.id.clone()),
    );

    let token = invitation.invitation_token.as_deref().unwrap_or_default();
    let mail = InviteEmail {
        to: email.clone(),
        recipient_name: invitee
            .as_ref()
            .map(UserDoc::display_name)
            .unwrap_or_else(|| "New Member".to_string()),
        organization_name: org.name.clone(),
        inviter_name: claims.user_name.clone(),
        role,
        existing_account: invitee.is_some(),
        link: InviteEmail::invitation_link(&state.config.public_url, token),
    };
    send_then_store(state.mailer.as_ref(), &mail, || invitation.insert(&state.db)).await?;

    info!(
        "{} invited {} to organization {} as {}",
        claims.user_email, email, org.id, role
    );
    Ok(ServerResponse::builder()
        .body(invitation.to_public(None))
        .created()
        .build())
}

/// Sends the invitation email, then stores the record. Nothing is stored when
/// the email cannot be sent, so the address can be invited again.
async fn send_then_store<T, F, Fut>(
    mailer: &dyn Mailer,
    mail: &InviteEmail,
    store: F,
) -> ServerResult<T>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = ServerResult<T>>,
{
    if let Err(e) = mailer.send_organization_invite(mail).await {
        warn!("Failed to send invitation to {}: {}", mail.to, e);
        return Err(e);
    }
    store().await
}

/// Records the caller may read. Anonymous callers only reach the invitation
/// they hold a token for.
async fn caller_scope(
    claims: Option<&Claims>,
    state: &AppState,
    filter: Option<&Filter>,
) -> ServerResult<Document> {
    match claims {
        Some(claims) if claims.is_admin => Ok(doc! {}),
        Some(claims) => {
            if !claims.user_email.is_empty() {
                let bound =
                    MembershipDoc::bind_pending_to_user(&state.db, &claims.user_id, &claims.user_email)
                        .await?;
                if bound > 0 {
                    info!("Bound {} invitation(s) to {}", bound, claims.user_email);
                }
            }
            let ids = MembershipDoc::active_organization_ids(&state.db, &claims.user_id).await?;
            Ok(visibility_scope(&claims.user_id, &ids))
        }
        None => {
            let token = requested_invitation_token(filter).ok_or_else(|| {
                ServerError::unauthorized("An invitation token is required")
            })?;
            Ok(doc! { "invitation_token": token })
        }
    }
}

async fn load_organizations(
    state: &AppState,
    members: &[MembershipDoc],
) -> ServerResult<HashMap<String, Organization>> {
    let mut ids: Vec<String> = members.iter().map(|m| m.organization_id.clone()).collect();
    ids.sort();
    ids.dedup();

    let orgs = OrganizationDoc::find_many(&state.db, &ids).await?;
    Ok(orgs
        .into_iter()
        .map(|org| (org.id.clone(), org.to_public()))
        .collect())
}

fn log_unknown_relations(relations: &[String]) {
    for relation in relations.iter().filter(|r| *r != ORGANIZATION_RELATION) {
        debug!("ignoring unknown relation {}", relation);
    }
}

async fn to_public(
    state: &AppState,
    members: &[MembershipDoc],
    with_organization: bool,
) -> ServerResult<Vec<OrganizationMember>> {
    let orgs = if with_organization {
        load_organizations(state, members).await?
    } else {
        HashMap::new()
    };

    Ok(members
        .iter()
        .map(|m| m.to_public(orgs.get(&m.organization_id).cloned()))
        .collect())
}

async fn list_members(
    claims: Option<Claims>,
    State(state): State<AppState>,
    RequestQuery(query): RequestQuery,
) -> ServerAppResult<Page<JsonValue>> {
    let options = build_find_many_options(&query);
    let scope = caller_scope(claims.as_ref(), &state, options.filter.as_ref()).await?;

    let (members, total) = find_page(
        &state.db.organization_members(),
        scope,
        &options,
        QUERYABLE_FIELDS,
    )
    .await?;
    log_unknown_relations(&options.relations);
    let public = to_public(
        &state,
        &members,
        options.has_relation(ORGANIZATION_RELATION),
    )
    .await?;

    page_response(&public, total, &options)
}

async fn get_member(
    claims: Option<Claims>,
    State(state): State<AppState>,
    Path(id): Path<String>,
    RequestQuery(query): RequestQuery,
) -> ServerAppResult<JsonValue> {
    let options = build_find_one_options(&query);
    let scope = caller_scope(claims.as_ref(), &state, options.filter.as_ref()).await?;
    let requested = options
        .filter
        .as_ref()
        .map(|f| filter_document(f, QUERYABLE_FIELDS))
        .unwrap_or_default();

    let member = MembershipDoc::find_one(&state.db, and(and(doc! { "_id": &id }, scope), requested))
        .await?
        .ok_or_else(|| ServerError::not_found("Membership not found"))?;

    log_unknown_relations(&options.relations);
    let public = to_public(
        &state,
        std::slice::from_ref(&member),
        options.has_relation(ORGANIZATION_RELATION),
    )
    .await?;
    let body = match public.first() {
        Some(member) => shape(member, options.select.as_ref())?,
        None => return Err(ServerError::not_found("Membership not found")),
    };

    Ok(ServerResponse::builder().body(body).ok().build())
}

/// Loads a record and how the caller relates to it. Records outside the
/// caller's reach read as missing.
async fn load_with_access(
    claims: &Claims,
    state: &AppState,
    id: &str,
) -> ServerResult<(MembershipDoc, MemberAccess)> {
    let member = MembershipDoc::find_by_id(&state.db, id)
        .await?
        .ok_or_else(|| ServerError::not_found("Membership not found"))?;

    let is_self = member.user_id.as_deref() == Some(claims.user_id.as_str())
        || claims.owns_email(&member.email);
    let org_role = MembershipDoc::find_active(&state.db, &member.organization_id, &claims.user_id)
        .await?
        .map(|m| m.role);

    if !claims.is_admin && !is_self && org_role.is_none() {
        return Err(ServerError::not_found("Membership not found"));
    }

    let access = MemberAccess {
        is_platform_admin: claims.is_admin,
        is_self,
        org_role,
    };
    Ok((member, access))
}

async fn update_member(
    claims: Claims,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<UpdateMemberBody>,
) -> ServerAppResult<OrganizationMember> {
    let (member, access) = load_with_access(&claims, &state, &id).await?;
    let update = plan_update(&access, member.role, member.status, &payload)?;

    let accepting_user = access.is_self.then_some(claims.user_id.as_str());
    let updated = member.apply_update(&state.db, &update, accepting_user).await?;

    info!(
        "{} updated membership {} (status {:?}, role {:?})",
        claims.user_email, updated.id, update.status, update.role
    );
    Ok(ServerResponse::builder()
        .body(updated.to_public(None))
        .ok()
        .build())
}

async fn remove_member(
    claims: Claims,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ServerAppResult<OrganizationMember> {
    let (member, access) = load_with_access(&claims, &state, &id).await?;

    match plan_removal(&access, member.role, member.status)? {
        Removal::HardDelete => {
            MembershipDoc::hard_delete(&state.db, &member.id).await?;
            info!("{} deleted membership {}", claims.user_email, member.id);
            Ok(ServerResponse::builder().no_content().build())
        }
        Removal::Transition(status) => {
            let update = MemberUpdate {
                status: Some(status),
                role: None,
            };
            let updated = member.apply_update(&state.db, &update, None).await?;
            info!(
                "{} removed membership {} ({})",
                claims.user_email, updated.id, status
            );
            Ok(ServerResponse::builder()
                .body(updated.to_public(None))
                .ok()
                .build())
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::mail::LogMailer;

    struct FailingMailer;

    #[async_trait]
    impl Mailer for FailingMailer {
        async fn send_organization_invite(&self, _email: &InviteEmail) -> ServerResult<()> {
            Err(ServerError::internal_error("smtp unavailable"))
        }
    }

    fn mail() -> InviteEmail {
        InviteEmail {
            to: "new@example.com".into(),
            recipient_name: "New Member".into(),
            organization_name: "Acme".into(),
            inviter_name: "Ada".into(),
            role: MemberRole::Member,
            existing_account: false,
            link: InviteEmail::invitation_link("http://localhost:3000", "tok"),
        }
    }

    #[tokio::test]
    async fn test_failed_email_stores_nothing() {
        let stored = AtomicBool::new(false);
        let result = send_then_store(&FailingMailer, &mail(), || async {
            stored.store(true, Ordering::SeqCst);
            Ok(())
        })
        .await;

        assert!(matches!(result, Err(ServerError::InternalError(_))));
        assert!(!stored.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_sent_email_stores_invitation() {
        let stored = AtomicBool::new(false);
        let result = send_then_store(&LogMailer, &mail(), || async {
            stored.store(true, Ordering::SeqCst);
            Ok("m-1")
        })
        .await;

        assert_eq!(result.unwrap(), "m-1");
        assert!(stored.load(Ordering::SeqCst));
    }
}
