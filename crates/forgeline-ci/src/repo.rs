//! Repository metadata resolution.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use forgeline_state::RepoMetadata;
use reqwest::header::{HeaderMap, LINK};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::stage::OAuthToken;

const GITHUB_API: &str = "https://api.github.com";

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("repository not found: {0}")]
    NotFound(String),

    #[error("repository lookup failed: {0}")]
    Provider(String),
}

/// Resolves a repository name to its clone URL, default branch and id.
#[async_trait]
pub trait RepoMetadataProvider: Send + Sync {
    async fn resolve(&self, repo_name: &str, token: &OAuthToken) -> Result<RepoMetadata, RepoError>;
}

/// Fixed set of repositories, for tests and offline setups.
#[derive(Debug, Default, Clone)]
pub struct StaticRepoProvider {
    repos: HashMap<String, RepoMetadata>,
}

impl StaticRepoProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_repo(mut self, repo: RepoMetadata) -> Self {
        self.repos.insert(repo.repo_name.clone(), repo);
        self
    }
}

#[async_trait]
impl RepoMetadataProvider for StaticRepoProvider {
    async fn resolve(&self, repo_name: &str, _token: &OAuthToken) -> Result<RepoMetadata, RepoError> {
        self.repos
            .get(repo_name)
            .cloned()
            .ok_or_else(|| RepoError::NotFound(repo_name.to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct GithubRepo {
    id: i64,
    name: String,
    clone_url: String,
    default_branch: String,
}

/// Looks the repository up among the token owner's repositories
/// (`GET /user/repos`).
pub struct GithubRepoProvider {
    client: reqwest::Client,
    api_base: String,
}

impl GithubRepoProvider {
    pub fn new(request_timeout: Option<Duration>) -> anyhow::Result<Self> {
        Self::with_api_base(GITHUB_API, request_timeout)
    }

    /// Point at a GitHub-compatible API (Enterprise, or a test server).
    pub fn with_api_base(api_base: &str, request_timeout: Option<Duration>) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder().user_agent("forgeline");
        if let Some(t) = request_timeout {
            builder = builder.timeout(t);
        }
        Ok(Self {
            client: builder.build()?,
            api_base: api_base.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl RepoMetadataProvider for GithubRepoProvider {
    /// Walks `/user/repos` page by page, following `Link: rel="next"`,
    /// until the repository turns up or the pages run out.
    async fn resolve(&self, repo_name: &str, token: &OAuthToken) -> Result<RepoMetadata, RepoError> {
        let provider = |e: reqwest::Error| RepoError::Provider(e.to_string());
        let mut next = Some(format!("{}/user/repos?per_page=100", self.api_base));
        let mut listed = 0;

        while let Some(url) = next.take() {
            let response = self
                .client
                .get(&url)
                .bearer_auth(token.access_token())
                .header("Accept", "application/vnd.github+json")
                .send()
                .await
                .and_then(|r| r.error_for_status())
                .map_err(provider)?;
            next = next_page(response.headers());
            let repos: Vec<GithubRepo> = response.json().await.map_err(provider)?;
            listed += repos.len();

            if let Some(r) = repos.into_iter().find(|r| r.name == repo_name) {
                return Ok(RepoMetadata {
                    repo_id: r.id,
                    repo_name: r.name,
                    clone_url: r.clone_url,
                    default_branch: r.default_branch,
                });
            }
        }

        debug!(count = listed, "repository not among user repositories");
        Err(RepoError::NotFound(repo_name.to_string()))
    }
}

/// Target of the `rel="next"` entry of a `Link` header.
fn next_page(headers: &HeaderMap) -> Option<String> {
    let link = headers.get(LINK)?.to_str().ok()?;
    link.split(',').find_map(|entry| {
        let (target, params) = entry.split_once(';')?;
        params
            .split(';')
            .any(|p| p.trim() == r#"rel="next""#)
            .then(|| {
                target
                    .trim()
                    .trim_start_matches('<')
                    .trim_end_matches('>')
                    .to_string()
            })
    })
}
