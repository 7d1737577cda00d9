use axum::{
    http::header::CONTENT_TYPE,
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, IntoResponseParts, Response, ResponseParts},
};
use mongodb::error::{ErrorKind, WriteFailure};
use serde::Serialize;
use std::fmt::Display;
use tenantry_shared::members::MembershipError;
use tracing::{error, warn};

const DUPLICATE_KEY: i32 = 11000;

#[derive(Debug)]
pub struct ServerResponse<T: Serialize> {
    pub body: Option<T>,
    pub headers: HeaderMap,
    pub status_code: StatusCode,
    pub pagination: Option<ResponsePagination>,
}

#[derive(Debug)]
pub struct ResponsePagination {
    pub count: u64,
    pub offset: u64,
    pub limit: u64,
}

impl IntoResponseParts for ResponsePagination {
    type Error = (StatusCode, String);

    fn into_response_parts(self, mut res: ResponseParts) -> Result<ResponseParts, Self::Error> {
        res.headers_mut()
            .insert("x-pagination-count", self.count.into());

        res.headers_mut()
            .insert("x-pagination-offset", self.offset.into());

        res.headers_mut()
            .insert("x-pagination-limit", self.limit.into());

        Ok(res)
    }
}

#[derive(Debug)]
pub struct ServerResponseBuilder<T: Serialize> {
    pub body: Option<T>,
    pub headers: Option<HeaderMap>,
    pub status_code: Option<StatusCode>,
    pub pagination: Option<ResponsePagination>,
}

impl<T> ServerResponseBuilder<T>
where
    T: Serialize,
{
    pub fn body(mut self, body: T) -> Self {
        self.body = Some(body);
        self
    }

    pub fn status_code(mut self, status_code: StatusCode) -> Self {
        self.status_code = Some(status_code);
        self
    }

    pub fn ok(mut self) -> Self {
        self.status_code = Some(StatusCode::OK);
        self
    }

    pub fn created(mut self) -> Self {
        self.status_code = Some(StatusCode::CREATED);
        self
    }

    pub fn no_content(mut self) -> Self {
        self.status_code = Some(StatusCode::NO_CONTENT);
        self
    }

    pub fn pagination(mut self, pagination: ResponsePagination) -> Self {
        self.pagination = Some(pagination);
        self
    }

    pub fn build(self) -> ServerResponse<T> {
        ServerResponse {
            body: self.body,
            headers: self.headers.unwrap_or_default(),
            status_code: self.status_code.unwrap_or(StatusCode::OK),
            pagination: self.pagination,
        }
    }

    pub fn new() -> Self {
        Self {
            body: None,
            headers: None,
            status_code: None,
            pagination: None,
        }
    }
}

impl<T: Serialize> ServerResponse<T> {
    pub fn builder() -> ServerResponseBuilder<T> {
        ServerResponseBuilder::new()
    }
}

impl<T: Serialize> IntoResponse for ServerResponse<T> {
    fn into_response(self) -> Response {
        let body = match self.body {
            Some(body) => body,
            None => return self.status_code.into_response(),
        };

        let bytes = match serde_json::to_vec(&body) {
            Ok(b) => b,
            Err(err) => {
                tracing::error!("Error serializing response body: {:?}", err);
                return StatusCode::INTERNAL_SERVER_ERROR.into_response();
            }
        };

        let mut headers = self.headers.clone();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        match self.pagination {
            Some(p) => (self.status_code, p, headers, bytes).into_response(),
            None => (self.status_code, headers, bytes).into_response(),
        }
    }
}

#[derive(Debug)]
pub enum AuthError {
    MissingToken(String),
    InvalidToken(String),
    Unauthorized(String),
    Forbidden(String),
}

impl Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::MissingToken(message) => write!(f, "Missing token: {}", message),
            AuthError::InvalidToken(message) => write!(f, "Invalid token: {}", message),
            AuthError::Unauthorized(message) => write!(f, "Unauthorized: {}", message),
            AuthError::Forbidden(message) => write!(f, "Forbidden: {}", message),
        }
    }
}

#[derive(Debug)]
pub enum ServerError {
    InternalError(String),
    AuthError(AuthError),
    BadRequest(String),
    NotFound(String),
}

impl Display for ServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServerError::InternalError(message) => write!(f, "Internal Error: {}", message),
            ServerError::AuthError(error) => write!(f, "Authentication Error: {}", error),
            ServerError::BadRequest(message) => write!(f, "Bad Request: {}", message),
            ServerError::NotFound(message) => write!(f, "Not Found: {}", message),
        }
    }
}

impl From<mongodb::error::Error> for ServerError {
    fn from(error: mongodb::error::Error) -> Self {
        if is_duplicate_key(&error) {
            return ServerError::BadRequest("record already exists".to_string());
        }
        ServerError::InternalError(error.to_string())
    }
}

impl From<std::io::Error> for ServerError {
    fn from(err: std::io::Error) -> Self {
        ServerError::InternalError(err.to_string())
    }
}

impl From<serde_json::Error> for ServerError {
    fn from(err: serde_json::Error) -> Self {
        ServerError::InternalError(err.to_string())
    }
}

impl From<MembershipError> for ServerError {
    fn from(err: MembershipError) -> Self {
        ServerError::BadRequest(err.to_string())
    }
}

fn is_duplicate_key(error: &mongodb::error::Error) -> bool {
    matches!(
        &*error.kind,
        ErrorKind::Write(WriteFailure::WriteError(write_error)) if write_error.code == DUPLICATE_KEY
    )
}

impl ServerError {
    pub fn internal_error(message: &str) -> Self {
        ServerError::InternalError(message.to_string())
    }

    pub fn invalid_token(message: &str) -> Self {
        ServerError::AuthError(AuthError::InvalidToken(message.to_string()))
    }

    pub fn missing_token(message: &str) -> Self {
        ServerError::AuthError(AuthError::MissingToken(message.to_string()))
    }

    pub fn bad_request(message: &str) -> Self {
        ServerError::BadRequest(message.to_string())
    }

    pub fn not_found(message: &str) -> Self {
        ServerError::NotFound(message.to_string())
    }

    pub fn unauthorized(message: &str) -> Self {
        ServerError::AuthError(AuthError::Unauthorized(message.to_string()))
    }

    pub fn forbidden(message: &str) -> Self {
        ServerError::AuthError(AuthError::Forbidden(message.to_string()))
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ServerError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServerError::AuthError(AuthError::Forbidden(_)) => StatusCode::FORBIDDEN,
            ServerError::AuthError(_) => StatusCode::UNAUTHORIZED,
            ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::NotFound(_) => StatusCode::NOT_FOUND,
        }
    }

    fn message(&self) -> &str {
        match self {
            ServerError::InternalError(message)
            | ServerError::BadRequest(message)
            | ServerError::NotFound(message)
            | ServerError::AuthError(AuthError::MissingToken(message))
            | ServerError::AuthError(AuthError::InvalidToken(message))
            | ServerError::AuthError(AuthError::Unauthorized(message))
            | ServerError::AuthError(AuthError::Forbidden(message)) => message,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorResponse {
            message: String,
        }

        let status = self.status_code();
        if status.is_server_error() {
            error!("Returning error response {} {}", status, self.message());
        } else {
            warn!("Returning error response {} {}", status, self.message());
        }

        ServerResponse::<ErrorResponse>::builder()
            .body(ErrorResponse {
                message: self.message().to_owned(),
            })
            .status_code(status)
            .build()
            .into_response()
    }
}

pub type ServerResult<T> = Result<T, ServerError>;
pub type ServerAppResult<T> = Result<ServerResponse<T>, ServerError>;

#[cfg(test)]
mod tests {
    use super::*;
    use tenantry_shared::members::{MemberStatus, MemberStatusMachine};

    #[test]
    fn test_error_status_codes() {
        assert_eq!(
            ServerError::bad_request("x").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ServerError::not_found("x").status_code(), StatusCode::NOT_FOUND);
        assert_eq!(ServerError::forbidden("x").status_code(), StatusCode::FORBIDDEN);
        assert_eq!(
            ServerError::missing_token("x").status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ServerError::internal_error("x").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_invalid_transition_is_a_client_error() {
        let err: ServerError = MemberStatusMachine::new(Some(MemberStatus::Canceled))
            .transition(MemberStatus::Active)
            .unwrap_err()
            .into();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.message(), "cannot move membership from canceled to active");
    }

    #[test]
    fn test_error_response_shape() {
        let response = ServerError::forbidden("not a member").into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            response.headers().get(CONTENT_TYPE).unwrap(),
            "application/json"
        );
    }

    #[test]
    fn test_pagination_headers() {
        let response = ServerResponse::builder()
            .body(vec![1, 2, 3])
            .ok()
            .pagination(ResponsePagination {
                count: 42,
                offset: 10,
                limit: 5,
            })
            .build()
            .into_response();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get("x-pagination-count").unwrap(), "42");
        assert_eq!(response.headers().get("x-pagination-offset").unwrap(), "10");
        assert_eq!(response.headers().get("x-pagination-limit").unwrap(), "5");
    }

    #[test]
    fn test_empty_body_uses_status_only() {
        let response = ServerResponse::<()>::builder().no_content().build().into_response();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(response.headers().get(CONTENT_TYPE).is_none());
    }
}
