//! Actor extractor.
//!
//! Identity is resolved upstream (a gateway or auth proxy) and forwarded in
//! two headers: `x-actor-id` (UUID) and `x-actor-role` (role code such as
//! `lab_head`). A missing or malformed header is a 401.

use axum::{
  extract::FromRequestParts,
  http::{HeaderMap, request::Parts},
};
use specimen_core::{Actor, Role};
use uuid::Uuid;

use crate::error::ApiError;

pub const ACTOR_ID_HEADER: &str = "x-actor-id";
pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";

/// The resolved actor behind the current request.
#[derive(Debug, Clone, Copy)]
pub struct CurrentActor(pub Actor);

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Result<&'a str, ApiError> {
  headers
    .get(name)
    .and_then(|v| v.to_str().ok())
    .map(str::trim)
    .filter(|v| !v.is_empty())
    .ok_or_else(|| ApiError::Unauthorized(format!("missing {name} header")))
}

/// Read the actor from request headers.
pub fn actor_from_headers(headers: &HeaderMap) -> Result<Actor, ApiError> {
  let id = header(headers, ACTOR_ID_HEADER)?;
  let role = header(headers, ACTOR_ROLE_HEADER)?;

  let actor_id = Uuid::parse_str(id)
    .map_err(|_| ApiError::Unauthorized(format!("malformed {ACTOR_ID_HEADER}")))?;
  let role = role
    .parse::<Role>()
    .map_err(|_| ApiError::Unauthorized(format!("unknown role {role:?}")))?;

  Ok(Actor::new(actor_id, role))
}

impl<S> FromRequestParts<S> for CurrentActor
where
  S: Send + Sync,
{
  type Rejection = ApiError;

  async fn from_request_parts(
    parts: &mut Parts,
    _state: &S,
  ) -> Result<Self, Self::Rejection> {
    actor_from_headers(&parts.headers).map(CurrentActor)
  }
}
