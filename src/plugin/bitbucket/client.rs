use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, error, info};

use crate::config::BitbucketConfig;
use crate::http;

use super::{Error, PullRequest, Status};

/// An account reference as embedded in pull request payloads.
#[derive(Debug, Deserialize)]
struct Account {
    display_name: Option<String>,
}

/// A single pull request as returned by the REST API.
///
/// Both the 1.0 (`status`, `user`) and 2.0 (`state`, `author`) field names are accepted.
#[derive(Debug, Deserialize)]
pub(super) struct PullRequestPayload {
    id: Option<u64>,
    title: Option<String>,
    status: Option<String>,
    state: Option<String>,
    user: Option<Account>,
    author: Option<Account>,
    closed_by: Option<Account>,
}

/// A page of pull requests.
#[derive(Debug, Deserialize)]
struct PullRequestList {
    values: Option<Vec<PullRequestPayload>>,
}

fn display_name(account: Option<Account>) -> Option<String> {
    account
        .and_then(|account| account.display_name)
        .filter(|name| !name.is_empty())
}

/// Bitbucket REST API client scoped to a single repository.
pub struct Client {
    /// HTTP client, reused to keep the connection pool.
    http: reqwest::Client,
    /// `{api}/repositories/{account}/{repo}/pullrequests`
    endpoint: String,
    /// `{web}/{account}/{repo}/pull-request`
    web_prefix: String,
}

impl Client {
    /// Creates a client for the repository described by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Init`] if the HTTP client cannot be built.
    pub fn new(config: &BitbucketConfig) -> Result<Self, Error> {
        let http = http::client::builder().build().map_err(Error::Init)?;

        Ok(Self::with_http(http, config))
    }

    /// Creates a client for the repository described by `config` using an existing HTTP client.
    #[must_use]
    pub fn with_http(http: reqwest::Client, config: &BitbucketConfig) -> Self {
        let account = &config.account_name;
        let repo = &config.repo_slug;
        let api = config.api_url.as_str().trim_end_matches('/');
        let web = config.web_url.as_str().trim_end_matches('/');

        Self {
            http,
            endpoint: format!("{api}/repositories/{account}/{repo}/pullrequests"),
            web_prefix: format!("{web}/{account}/{repo}/pull-request"),
        }
    }

    /// Returns the URL that lists the repository's open pull requests.
    #[must_use]
    pub fn list_url(&self) -> &str {
        &self.endpoint
    }

    /// Returns the API URL of the pull request with the given `id`.
    #[must_use]
    pub fn pull_request_url(&self, id: u64) -> String {
        format!("{}/{id}", self.endpoint)
    }

    /// Returns the web URL of the pull request with the given `id`.
    #[must_use]
    pub fn web_url(&self, id: u64) -> String {
        format!("{}/{id}", self.web_prefix)
    }

    /// Looks up a single pull request.
    ///
    /// # Errors
    ///
    /// - [`Error::PullRequestNotFound`] if the server answers with a non-success status.
    /// - [`Error::Request`] if the request could not be sent or the body could not be read.
    /// - [`Error::Deserialize`] if the body isn't a pull request object.
    pub async fn fetch(&self, id: u64) -> Result<PullRequest, Error> {
        let url = self.pull_request_url(id);
        info!(%url, "getting pull request");

        let response = self.http.get(&url).send().await.map_err(Error::Request)?;
        let status = response.status();

        if !status.is_success() {
            info!(%id, %status, "pull request not found");

            return Err(Error::PullRequestNotFound(id));
        }

        let payload: PullRequestPayload = parse(response).await?;
        let pull_request = self.normalize(payload, id);

        debug!(?pull_request, "fetched pull request");

        Ok(pull_request)
    }

    /// Lists the repository's open pull requests in the order the API returns them.
    ///
    /// A missing or empty `values` array yields an empty list.
    ///
    /// # Errors
    ///
    /// - [`Error::UrlNotFound`] if the server answers with a non-success status.
    /// - [`Error::Request`] if the request could not be sent or the body could not be read.
    /// - [`Error::Deserialize`] if the body isn't a pull request listing.
    pub async fn fetch_all(&self) -> Result<Vec<PullRequest>, Error> {
        info!(url = %self.endpoint, "listing pull requests");

        let response = self
            .http
            .get(&self.endpoint)
            .send()
            .await
            .map_err(Error::Request)?;
        let status = response.status();

        if !status.is_success() {
            info!(%status, "pull request listing not found");

            return Err(Error::UrlNotFound(self.endpoint.clone()));
        }

        let list: PullRequestList = parse(response).await?;
        let pull_requests: Vec<PullRequest> = list
            .values
            .unwrap_or_default()
            .into_iter()
            .map(|payload| {
                let id = payload.id.unwrap_or_default();

                self.normalize(payload, id)
            })
            .collect();

        debug!(count = pull_requests.len(), "listed pull requests");

        Ok(pull_requests)
    }

    /// Turns an API payload into a [`PullRequest`], using `requested_id` if the payload has no id.
    pub(super) fn normalize(&self, payload: PullRequestPayload, requested_id: u64) -> PullRequest {
        let id = payload.id.unwrap_or(requested_id);
        let status = payload
            .status
            .or(payload.state)
            .filter(|status| !status.is_empty())
            .map(|status| Status::from(status.as_str()));

        PullRequest {
            id,
            title: payload.title,
            status,
            author: display_name(payload.user).or_else(|| display_name(payload.author)),
            closed_by: display_name(payload.closed_by),
            url: self.web_url(id),
        }
    }
}

/// Reads the response body and deserializes it, logging the path of the offending field on
/// failure.
async fn parse<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, Error> {
    let text = response.text().await.map_err(Error::Request)?;
    let jd = &mut serde_json::Deserializer::from_str(&text);

    serde_path_to_error::deserialize(jd)
        .inspect_err(|err| error!(?err, %text, "could not parse response"))
        .map_err(Error::Deserialize)
}
