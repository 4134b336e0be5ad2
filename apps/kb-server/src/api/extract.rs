//! Tenant context extraction.
//!
//! SPEC_FULL.md SS1 treats permission resolution as an external collaborator: "a caller
//! already supplies `{user_id, org_id, workspace_id, role}`". This extractor reads that
//! quadruple off request headers, the shape a reverse proxy / auth layer in front of this
//! service is expected to set after resolving a JWT or session cookie. It does not
//! validate the principal itself -- that's the boundary this crate doesn't own.

use crate::api::error::ApiError;
use async_trait::async_trait;
use axum::{extract::FromRequestParts, http::request::Parts};
use kb_core::types::{OrgId, Role, TenantContext, UserId, WorkspaceId};
use std::str::FromStr;

const HEADER_ORG: &str = "x-org-id";
const HEADER_WORKSPACE: &str = "x-workspace-id";
const HEADER_USER: &str = "x-user-id";
const HEADER_ROLE: &str = "x-role";

pub struct Tenant(pub TenantContext);

#[async_trait]
impl<S> FromRequestParts<S> for Tenant
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let org_id = required_id::<OrgId>(parts, HEADER_ORG)?;
        let workspace_id = required_id::<WorkspaceId>(parts, HEADER_WORKSPACE)?;
        let user_id = required_id::<UserId>(parts, HEADER_USER)?;
        let role = header_str(parts, HEADER_ROLE)?
            .map(|raw| parse_role(&raw))
            .transpose()?
            .unwrap_or(Role::Viewer);

        Ok(Tenant(TenantContext::new(org_id, workspace_id, user_id, role)))
    }
}

fn header_str(parts: &Parts, name: &str) -> Result<Option<String>, ApiError> {
    match parts.headers.get(name) {
        Some(value) => {
            let s = value
                .to_str()
                .map_err(|_| ApiError::bad_request(format!("header {name} is not valid UTF-8")))?;
            Ok(Some(s.to_string()))
        }
        None => Ok(None),
    }
}

fn required_id<T: FromStr>(parts: &Parts, name: &str) -> Result<T, ApiError> {
    let raw = header_str(parts, name)?
        .ok_or_else(|| ApiError::bad_request(format!("missing required header {name}")))?;
    raw.parse::<T>()
        .map_err(|_| ApiError::bad_request(format!("header {name} is not a valid id")))
}

fn parse_role(raw: &str) -> Result<Role, ApiError> {
    match raw.to_ascii_lowercase().as_str() {
        "viewer" => Ok(Role::Viewer),
        "editor" => Ok(Role::Editor),
        "admin" => Ok(Role::Admin),
        "owner" => Ok(Role::Owner),
        other => Err(ApiError::bad_request(format!("unknown role {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn parts_with_headers(headers: &[(&str, &str)]) -> Parts {
        let mut builder = Request::builder().uri("/");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let (parts, _) = builder.body(()).unwrap().into_parts();
        parts
    }

    #[tokio::test]
    async fn test_missing_headers_rejected() {
        let mut parts = parts_with_headers(&[]).await;
        let result = Tenant::from_request_parts(&mut parts, &()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_valid_headers_accepted() {
        let org = OrgId::new().to_string();
        let ws = WorkspaceId::new().to_string();
        let user = UserId::new().to_string();
        let mut parts = parts_with_headers(&[
            (HEADER_ORG, &org),
            (HEADER_WORKSPACE, &ws),
            (HEADER_USER, &user),
            (HEADER_ROLE, "editor"),
        ])
        .await;
        let Tenant(ctx) = Tenant::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(ctx.role, Role::Editor);
    }

    #[tokio::test]
    async fn test_missing_role_defaults_to_viewer() {
        let org = OrgId::new().to_string();
        let ws = WorkspaceId::new().to_string();
        let user = UserId::new().to_string();
        let mut parts =
            parts_with_headers(&[(HEADER_ORG, &org), (HEADER_WORKSPACE, &ws), (HEADER_USER, &user)]).await;
        let Tenant(ctx) = Tenant::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(ctx.role, Role::Viewer);
    }

    #[tokio::test]
    async fn test_invalid_role_rejected() {
        let org = OrgId::new().to_string();
        let ws = WorkspaceId::new().to_string();
        let user = UserId::new().to_string();
        let mut parts = parts_with_headers(&[
            (HEADER_ORG, &org),
            (HEADER_WORKSPACE, &ws),
            (HEADER_USER, &user),
            (HEADER_ROLE, "superuser"),
        ])
        .await;
        assert!(Tenant::from_request_parts(&mut parts, &()).await.is_err());
    }
}
