use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use mongodb::bson::{Document, doc};
use serde_json::Value as JsonValue;
use tenantry_shared::org::{CreateOrganizationBody, Organization};
use tenantry_shared::pagination::Page;
use tenantry_shared::query::{build_find_many_options, build_find_one_options};
use tracing::{info, warn};

use crate::auth::claims::Claims;
use crate::models::membership::MembershipDoc;
use crate::models::org::{OrganizationDoc, QUERYABLE_FIELDS};
use crate::response::{ServerAppResult, ServerError, ServerResponse, ServerResult};
use crate::util::app_state::AppState;
use crate::util::bson_query::{and, filter_document, find_page};
use crate::util::query::{RequestQuery, page_response, shape};

pub fn create_route() -> Router<AppState> {
    Router::new()
        .route("/", get(list_organizations).post(create_organization))
        .route("/{id}", get(get_organization))
}

async fn create_organization(
    claims: Claims,
    State(state): State<AppState>,
    Json(payload): Json<CreateOrganizationBody>,
) -> ServerAppResult<Organization> {
    if claims.user_email.is_empty() {
        return Err(ServerError::bad_request(
            "An email address is required to own an organization",
        ));
    }
    if OrganizationDoc::find_owned_by(&state.db, &claims.user_id)
        .await?
        .is_some()
    {
        return Err(ServerError::bad_request("You already own an organization"));
    }

    let org = OrganizationDoc::create(&state.db, &claims.user_id, payload).await?;

    if let Err(e) =
        MembershipDoc::create_owner(&state.db, &org.id, &claims.user_id, &claims.user_email).await
    {
        warn!("Rolling back organization {} after owner membership failed", org.id);
        OrganizationDoc::delete(&state.db, &org.id).await?;
        return Err(e);
    }

    info!("{} created organization {}", claims.user_email, org.id);
    Ok(ServerResponse::builder()
        .body(org.to_public())
        .created()
        .build())
}

/// Organizations a non-admin caller may read.
async fn caller_scope(
    claims: &Claims,
    state: &AppState,
) -> ServerResult<Document> {
    if claims.is_admin {
        return Ok(doc! {});
    }
    let ids = MembershipDoc::active_organization_ids(&state.db, &claims.user_id).await?;
    Ok(doc! { "_id": { "$in": ids } })
}

async fn list_organizations(
    claims: Claims,
    State(state): State<AppState>,
    RequestQuery(query): RequestQuery,
) -> ServerAppResult<Page<JsonValue>> {
    let options = build_find_many_options(&query);
    let scope = caller_scope(&claims, &state).await?;

    let (orgs, total) =
        find_page(&state.db.organizations(), scope, &options, QUERYABLE_FIELDS).await?;
    let public: Vec<Organization> = orgs.iter().map(OrganizationDoc::to_public).collect();

    page_response(&public, total, &options)
}

async fn get_organization(
    claims: Claims,
    State(state): State<AppState>,
    Path(id): Path<String>,
    RequestQuery(query): RequestQuery,
) -> ServerAppResult<JsonValue> {
    let options = build_find_one_options(&query);
    let requested = options
        .filter
        .as_ref()
        .map(|f| filter_document(f, QUERYABLE_FIELDS))
        .unwrap_or_default();

    let filter = and(
        and(doc! { "_id": &id }, caller_scope(&claims, &state).await?),
        requested,
    );
    let org = state
        .db
        .organizations()
        .find_one(filter)
        .await?
        .ok_or_else(|| ServerError::not_found("Organization not found"))?;

    Ok(ServerResponse::builder()
        .body(shape(&org.to_public(), options.select.as_ref())?)
        .ok()
        .build())
}
