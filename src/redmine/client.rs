//! REST client for the Redmine API.
//!
//! Uses reqwest with the `X-Redmine-API-Key` header. One request, one
//! result: nothing here retries, the poller decides when to try again.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use url::Url;

use super::{AWAITING_ANSWER_STATUS_ID, ISSUE_PAGE_LIMIT};
use crate::error::TrackerError;
use crate::types::{AccountIdentity, Credentials};

const API_KEY_HEADER: &str = "X-Redmine-API-Key";

/// Upper bound for a single request so a hung server cannot stall a cycle
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Source of the "Awaiting answer" count.
///
/// Implemented by [`RedmineClient`]; the poller only sees this trait.
#[async_trait]
pub trait IssueSource: Send + Sync {
    /// Swap host/key in place. Forgets the cached identity.
    fn configure(&mut self, credentials: Credentials);

    fn identity(&self) -> Option<&AccountIdentity>;

    /// Fetch and cache the account the API key belongs to.
    async fn authenticate(&mut self) -> Result<AccountIdentity, TrackerError>;

    /// Number of "Awaiting answer" issues assigned to the authenticated account.
    async fn fetch_awaiting_count(&self) -> Result<u64, TrackerError>;
}

pub struct RedmineClient {
    client: reqwest::Client,
    credentials: Credentials,
    identity: Option<AccountIdentity>,
}

impl RedmineClient {
    pub fn new(credentials: Credentials) -> Result<Self, TrackerError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| {
                TrackerError::Configuration(format!("Failed to build HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            credentials,
            identity: None,
        })
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Join the configured host with `path` and append `params`.
    fn url(&self, path: &str, params: &[(&str, String)]) -> Result<Url, TrackerError> {
        let mut base = Url::parse(&self.credentials.host).map_err(|e| {
            TrackerError::Configuration(format!("Invalid host {}: {}", self.credentials.host, e))
        })?;

        // Url::join drops the last segment unless the base ends in '/'
        if !base.path().ends_with('/') {
            let path_with_slash = format!("{}/", base.path());
            base.set_path(&path_with_slash);
        }

        let mut url = base
            .join(path)
            .map_err(|e| TrackerError::Configuration(format!("Invalid path {}: {}", path, e)))?;

        if !params.is_empty() {
            url.query_pairs_mut()
                .extend_pairs(params.iter().map(|(k, v)| (*k, v.as_str())));
        }

        Ok(url)
    }

    fn awaiting_params(&self, assignee: String) -> Vec<(&'static str, String)> {
        vec![
            ("assigned_to_id", assignee),
            ("status_id", AWAITING_ANSWER_STATUS_ID.to_string()),
            ("limit", ISSUE_PAGE_LIMIT.to_string()),
        ]
    }

    /// Browser link to the "Awaiting answer" list. Never fetched.
    ///
    /// Falls back to Redmine's `me` alias before authentication.
    pub fn awaiting_issues_page_url(&self) -> Result<Url, TrackerError> {
        let assignee = self
            .identity
            .as_ref()
            .map(|user| user.id.to_string())
            .unwrap_or_else(|| "me".to_string());

        self.url(
            "issues",
            &[
                ("assigned_to_id", assignee),
                ("status_id", AWAITING_ANSWER_STATUS_ID.to_string()),
            ],
        )
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, TrackerError> {
        log::debug!("Redmine client: GET {}", url.path());

        let resp = self
            .client
            .get(url)
            .header(API_KEY_HEADER, &self.credentials.api_key)
            .send()
            .await?;

        if resp.status() != StatusCode::OK {
            return Err(TrackerError::HttpStatus(resp.status().as_u16()));
        }

        let body = resp.text().await?;
        serde_json::from_str(&body).map_err(TrackerError::from)
    }
}

#[derive(Deserialize)]
struct UserNode {
    id: u64,
    #[serde(default)]
    login: String,
    #[serde(default)]
    firstname: String,
    #[serde(default)]
    lastname: String,
}

#[derive(Deserialize)]
struct IssuesResponse {
    total_count: u64,
}

/// Extract the identity from a `users/current.json` body.
fn parse_identity(body: serde_json::Value) -> Result<AccountIdentity, TrackerError> {
    let user = body
        .get("user")
        .cloned()
        .ok_or(TrackerError::IncorrectUserData)?;

    let user: UserNode =
        serde_json::from_value(user).map_err(|_| TrackerError::IncorrectUserData)?;

    Ok(AccountIdentity {
        id: user.id,
        login: user.login,
        name: format!("{} {}", user.firstname, user.lastname),
    })
}

#[async_trait]
impl IssueSource for RedmineClient {
    fn configure(&mut self, credentials: Credentials) {
        self.credentials = credentials;
        self.identity = None;
    }

    fn identity(&self) -> Option<&AccountIdentity> {
        self.identity.as_ref()
    }

    async fn authenticate(&mut self) -> Result<AccountIdentity, TrackerError> {
        let url = self.url("users/current.json", &[])?;
        let body: serde_json::Value = self.get_json(url).await?;
        let identity = parse_identity(body)?;

        self.identity = Some(identity.clone());
        Ok(identity)
    }

    async fn fetch_awaiting_count(&self) -> Result<u64, TrackerError> {
        let user = self.identity.as_ref().ok_or(TrackerError::NotAuthenticated)?;
        let url = self.url("issues.json", &self.awaiting_params(user.id.to_string()))?;

        let resp: IssuesResponse = self.get_json(url).await?;
        Ok(resp.total_count)
    }
}
