//! Thin HTTP client over the kb-server REST surface (SPEC_FULL.md SS6).
//!
//! Every request carries the tenant quadruple as headers, the shape `kb-server`'s
//! `Tenant` extractor expects -- this CLI stands in for the reverse proxy / auth layer
//! SPEC_FULL.md SS1 treats as an external collaborator.

use anyhow::{bail, Result};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

#[derive(Debug, Clone)]
pub struct TenantHeaders {
    pub org_id: String,
    pub workspace_id: String,
    pub user_id: String,
    pub role: String,
}

pub struct KbClient {
    base_url: String,
    tenant: TenantHeaders,
    http: reqwest::Client,
}

impl KbClient {
    pub fn new(base_url: impl Into<String>, tenant: TenantHeaders) -> Self {
        Self { base_url: base_url.into(), tenant, http: reqwest::Client::new() }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    fn apply_tenant(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder
            .header("x-org-id", &self.tenant.org_id)
            .header("x-workspace-id", &self.tenant.workspace_id)
            .header("x-user-id", &self.tenant.user_id)
            .header("x-role", &self.tenant.role)
    }

    async fn send<T: DeserializeOwned>(&self, builder: reqwest::RequestBuilder) -> Result<T> {
        let response = self.apply_tenant(builder).send().await?;
        let status = response.status();
        let body: Value = response.json().await.unwrap_or(Value::Null);

        if !status.is_success() {
            let message = body
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("request failed")
                .to_string();
            bail!("kb-server returned {status}: {message}");
        }

        Ok(serde_json::from_value(body)?)
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.send(self.http.get(self.url(path))).await
    }

    pub async fn post<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        self.send(self.http.post(self.url(path)).json(body)).await
    }

    pub async fn post_empty<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.send(self.http.post(self.url(path))).await
    }

    pub async fn put<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        self.send(self.http.put(self.url(path)).json(body)).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.send(self.http.delete(self.url(path))).await
    }
}
