use axum::extract::{FromRequestParts, Query};
use axum::http::request::Parts;
use serde::Serialize;
use serde_json::Value as Json;
use tenantry_shared::{
    pagination::Page,
    query::{FindManyOptions, QueryParams, SelectTree},
};

use crate::response::{ResponsePagination, ServerAppResult, ServerResponse, ServerResult};

/// Raw query string as a multimap. Never rejects: an unparsable query string
/// is treated as empty.
#[derive(Debug, Clone, Default)]
pub struct RequestQuery(pub QueryParams);

impl<S> FromRequestParts<S> for RequestQuery
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(pairs) = Query::<Vec<(String, String)>>::from_request_parts(parts, state)
            .await
            .unwrap_or_else(|_| Query(Vec::new()));

        Ok(Self(pairs.into_iter().collect()))
    }
}

/// Public JSON of `record`, narrowed to the selected fields when a selection
/// was requested.
pub fn shape<T: Serialize>(record: &T, select: Option<&SelectTree>) -> ServerResult<Json> {
    let json = serde_json::to_value(record)?;
    Ok(match select {
        Some(tree) => tree.project(&json),
        None => json,
    })
}

/// Paginated list response: envelope body plus `x-pagination-*` headers.
pub fn page_response<T: Serialize>(
    records: &[T],
    total: u64,
    options: &FindManyOptions,
) -> ServerAppResult<Page<Json>> {
    let data = records
        .iter()
        .map(|r| shape(r, options.select.as_ref()))
        .collect::<ServerResult<Vec<_>>>()?;

    Ok(ServerResponse::builder()
        .body(Page::new(data, total, options.offset(), options.take))
        .pagination(ResponsePagination {
            count: total,
            offset: options.offset(),
            limit: options.take,
        })
        .ok()
        .build())
}
