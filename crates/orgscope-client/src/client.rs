use std::time::Duration;

use orgscope_core::config::ScopeConfig;
use orgscope_core::retry::RetryPolicy;
use orgscope_core::{Environment, OrgTree, OrganizationApi, Result, ScopeError, SignIn};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{classify_status, transport_error, ClientError};
use crate::token::TokenSource;

// ─── Wire types ───────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct EnvironmentList {
    #[serde(default)]
    data: Vec<Environment>,
}

#[derive(Debug, Deserialize)]
struct Me {
    user: MeUser,
}

#[derive(Debug, Deserialize)]
struct MeUser {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    email: Option<String>,
    organization: MeOrganization,
}

#[derive(Debug, Deserialize)]
struct MeOrganization {
    id: String,
    #[serde(default)]
    name: Option<String>,
}

// ─── OrgApiClient ─────────────────────────────────────────────────────────

/// Organization API over HTTP.
///
/// Retries rate limits (429), server errors and transport failures per the
/// configured [`RetryPolicy`], honouring `Retry-After`. A 401 triggers one
/// token refresh per request when a refresher is installed.
pub struct OrgApiClient {
    http: reqwest::Client,
    base_url: String,
    token: TokenSource,
    retry: RetryPolicy,
}

impl OrgApiClient {
    pub fn new(config: &ScopeConfig, token: TokenSource) -> std::result::Result<Self, ClientError> {
        let base_url = config.api.base_url.trim_end_matches('/').to_string();
        if !(base_url.starts_with("https://") || base_url.starts_with("http://")) {
            return Err(ClientError::InvalidBaseUrl(config.api.base_url.clone()));
        }
        let http = reqwest::Client::builder()
            .timeout(config.api.timeout())
            .user_agent(concat!("orgscope/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            base_url,
            token,
            retry: config.retry.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Identity of the token's owner, shaped for [`ScopeResolver::sign_in`].
    ///
    /// [`ScopeResolver::sign_in`]: orgscope_core::ScopeResolver::sign_in
    pub async fn fetch_me(&self) -> Result<SignIn> {
        let me: Me = self.get_json("/accounts/api/me").await?;
        let account_id = me
            .user
            .id
            .clone()
            .filter(|s| !s.is_empty())
            .or_else(|| me.user.email.clone())
            .ok_or_else(|| ScopeError::InvalidAccount("profile has neither id nor email".into()))?;
        Ok(SignIn {
            account_id,
            organization_id: me.user.organization.id,
            organization_name: me.user.organization.name,
            display_name: me.user.username.or(me.user.email),
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let mut attempt = 0u32;
        let mut refreshed = false;

        loop {
            attempt += 1;
            let mut req = self.http.get(&url);
            if let Some(token) = self.token.current().await {
                req = req.bearer_auth(token);
            }

            let (err, retry_after) = match req.send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        let bytes = resp.bytes().await.map_err(transport_error)?;
                        return serde_json::from_slice(&bytes).map_err(|e| {
                            ScopeError::upstream(
                                Some(status.as_u16()),
                                format!("unexpected response from {path}: {e}"),
                            )
                        });
                    }
                    if status == StatusCode::UNAUTHORIZED && !refreshed && self.token.can_refresh()
                    {
                        refreshed = true;
                        debug!(path, "401 from organization API; refreshing token");
                        self.token.refresh().await?;
                        // The refresh does not use up an attempt.
                        attempt -= 1;
                        continue;
                    }
                    let retry_after = parse_retry_after(resp.headers());
                    let body = resp.text().await.unwrap_or_default();
                    (classify_status(status.as_u16(), &body), retry_after)
                }
                Err(e) => (transport_error(e), None),
            };

            if !err.is_retryable() || !self.retry.should_retry(attempt) {
                return Err(err);
            }
            let delay = self.retry.delay_for(attempt - 1, retry_after);
            warn!(path, attempt, delay_ms = delay.as_millis() as u64, error = %err, "retrying organization API call");
            tokio::time::sleep(delay).await;
        }
    }
}

fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

impl OrganizationApi for OrgApiClient {
    async fn fetch_environments(&self, organization_id: &str) -> Result<Vec<Environment>> {
        let path = format!("/accounts/api/organizations/{organization_id}/environments");
        match self.get_json::<EnvironmentList>(&path).await {
            Ok(list) => Ok(list.data),
            Err(ScopeError::Upstream {
                status: Some(404), ..
            }) => Err(ScopeError::BusinessGroupNotFound(organization_id.to_string())),
            Err(e) => Err(e),
        }
    }

    async fn fetch_hierarchy(&self, account_id: &str, organization_id: &str) -> Result<OrgTree> {
        debug!(account = %account_id, org = %organization_id, "fetching organization hierarchy");
        let path = format!("/accounts/api/organizations/{organization_id}/hierarchy");
        self.get_json(&path).await
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Server;

    fn client_for(server: &Server, token: TokenSource) -> OrgApiClient {
        let mut config = ScopeConfig::default();
        config.api.base_url = server.url();
        config.retry = RetryPolicy {
            max_attempts: 3,
            base_delay_ms: 1,
            max_delay_ms: 5,
            multiplier: 2.0,
        };
        OrgApiClient::new(&config, token).unwrap()
    }

    const ENVS: &str = r#"{
        "data": [
            {"id": "e1", "name": "Prod", "organizationId": "bg-9", "type": "production", "isProduction": true},
            {"id": "e2", "name": "Sandbox", "organizationId": "bg-9", "type": "sandbox", "isProduction": false}
        ],
        "total": 2
    }"#;

    #[tokio::test]
    async fn fetches_environments_with_bearer_token() {
        let mut server = Server::new_async().await;
        let m = server
            .mock("GET", "/accounts/api/organizations/bg-9/environments")
            .match_header("authorization", "Bearer tok")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(ENVS)
            .expect(1)
            .create_async()
            .await;

        let client = client_for(&server, TokenSource::new(Some("tok".into())));
        let envs = client.fetch_environments("bg-9").await.unwrap();

        assert_eq!(envs.len(), 2);
        assert_eq!(envs[0], Environment::new("e1", "Prod").with_kind("production"));
        m.assert_async().await;
    }

    #[tokio::test]
    async fn retries_server_errors_then_succeeds() {
        let mut server = Server::new_async().await;
        let failing = server
            .mock("GET", "/accounts/api/organizations/root-1/environments")
            .with_status(503)
            .expect(1)
            .create_async()
            .await;
        let ok = server
            .mock("GET", "/accounts/api/organizations/root-1/environments")
            .with_status(200)
            .with_body(ENVS)
            .expect(1)
            .create_async()
            .await;

        let client = client_for(&server, TokenSource::new(Some("tok".into())));
        let envs = client.fetch_environments("root-1").await.unwrap();

        assert_eq!(envs.len(), 2);
        failing.assert_async().await;
        ok.assert_async().await;
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let mut server = Server::new_async().await;
        let m = server
            .mock("GET", "/accounts/api/organizations/root-1/hierarchy")
            .with_status(429)
            .with_header("retry-after", "0")
            .expect(3)
            .create_async()
            .await;

        let client = client_for(&server, TokenSource::new(Some("tok".into())));
        let err = client.fetch_hierarchy("A", "root-1").await.unwrap_err();

        assert!(matches!(err, ScopeError::Upstream { status: Some(429), .. }));
        m.assert_async().await;
    }

    #[tokio::test]
    async fn forbidden_is_not_retried() {
        let mut server = Server::new_async().await;
        let m = server
            .mock("GET", "/accounts/api/organizations/bg-1/environments")
            .with_status(403)
            .with_body(r#"{"message":"Forbidden"}"#)
            .expect(1)
            .create_async()
            .await;

        let client = client_for(&server, TokenSource::new(Some("tok".into())));
        let err = client.fetch_environments("bg-1").await.unwrap_err();

        assert!(matches!(err, ScopeError::Permission(ref msg) if msg == "Forbidden"));
        m.assert_async().await;
    }

    #[tokio::test]
    async fn missing_group_maps_to_not_found() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/accounts/api/organizations/bg-gone/environments")
            .with_status(404)
            .create_async()
            .await;

        let client = client_for(&server, TokenSource::new(Some("tok".into())));
        let err = client.fetch_environments("bg-gone").await.unwrap_err();
        assert!(matches!(err, ScopeError::BusinessGroupNotFound(ref id) if id == "bg-gone"));
    }

    #[tokio::test]
    async fn expired_token_is_refreshed_once() {
        let mut server = Server::new_async().await;
        let stale = server
            .mock("GET", "/accounts/api/organizations/root-1/hierarchy")
            .match_header("authorization", "Bearer old")
            .with_status(401)
            .expect(1)
            .create_async()
            .await;
        let fresh = server
            .mock("GET", "/accounts/api/organizations/root-1/hierarchy")
            .match_header("authorization", "Bearer new")
            .with_status(200)
            .with_body(r#"{"id":"root-1","name":"Acme","subOrganizations":[{"id":"bg-1","name":"Sales","subOrganizations":[]}]}"#)
            .expect(1)
            .create_async()
            .await;

        let token = TokenSource::new(Some("old".into()))
            .with_refresh(|| async { Ok("new".to_string()) });
        let client = client_for(&server, token);
        let tree = client.fetch_hierarchy("A", "root-1").await.unwrap();

        assert!(tree.contains("bg-1"));
        stale.assert_async().await;
        fresh.assert_async().await;
    }

    #[tokio::test]
    async fn unauthorized_without_refresher_fails() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/accounts/api/organizations/root-1/hierarchy")
            .with_status(401)
            .expect(1)
            .create_async()
            .await;

        let client = client_for(&server, TokenSource::new(None));
        let err = client.fetch_hierarchy("A", "root-1").await.unwrap_err();
        assert!(matches!(err, ScopeError::Upstream { status: Some(401), .. }));
    }

    #[tokio::test]
    async fn fetch_me_builds_sign_in() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/accounts/api/me")
            .with_status(200)
            .with_body(
                r#"{"user":{"id":"u-1","username":"alice","email":"a@x.io","organization":{"id":"root-1","name":"Acme"}}}"#,
            )
            .create_async()
            .await;

        let client = client_for(&server, TokenSource::new(Some("tok".into())));
        let me = client.fetch_me().await.unwrap();
        assert_eq!(me.account_id, "u-1");
        assert_eq!(me.organization_id, "root-1");
        assert_eq!(me.display_name.as_deref(), Some("alice"));
    }

    #[tokio::test]
    async fn malformed_body_is_upstream_error() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/accounts/api/organizations/root-1/hierarchy")
            .with_status(200)
            .with_body("<html>maintenance</html>")
            .create_async()
            .await;

        let client = client_for(&server, TokenSource::new(Some("tok".into())));
        let err = client.fetch_hierarchy("A", "root-1").await.unwrap_err();
        assert!(matches!(err, ScopeError::Upstream { status: Some(200), .. }));
        assert!(!err.is_retryable());
    }

    #[test]
    fn rejects_non_http_base_url() {
        let mut config = ScopeConfig::default();
        config.api.base_url = "anypoint.mulesoft.com".into();
        assert!(matches!(
            OrgApiClient::new(&config, TokenSource::new(None)),
            Err(ClientError::InvalidBaseUrl(_))
        ));
    }
}
