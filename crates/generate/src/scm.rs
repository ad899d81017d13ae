//! Pull-request hosting clients, behind a small trait boundary so the
//! generator can be driven by fakes in tests.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;

/// Page size requested from hosting APIs.
const PAGE_SIZE: usize = 20;

/// One open pull request as reported by the hosting API.
#[derive(Debug, Clone, PartialEq)]
pub struct PullRequest {
    pub number: u64,
    pub branch: String,
    pub head_sha: String,
    pub labels: Vec<String>,
}

#[async_trait]
pub trait ScmClient: std::fmt::Debug + Send + Sync {
    /// List open pull requests against `repo` ("owner/name").
    async fn list_open(&self, repo: &str) -> Result<Vec<PullRequest>>;
}

/// Builds a client from `(driver, server_url, token)`.
pub type ScmFactory =
    Arc<dyn Fn(&str, Option<&str>, &str) -> Result<Arc<dyn ScmClient>> + Send + Sync>;

/// Factory for the supported drivers.
pub fn default_factory() -> ScmFactory {
    Arc::new(|driver, server_url, token| match driver {
        "github" => Ok(Arc::new(GithubClient::new(server_url, token))),
        other => bail!("unsupported pull request driver {other:?}"),
    })
}

/// GitHub driver over the REST API.
#[derive(Debug)]
pub struct GithubClient {
    client: reqwest::Client,
    base: String,
    token: String,
}

impl GithubClient {
    pub fn new(server_url: Option<&str>, token: &str) -> Self {
        let base = server_url
            .unwrap_or("https://api.github.com")
            .trim_end_matches('/')
            .to_string();
        GithubClient {
            client: reqwest::Client::new(),
            base,
            token: token.to_string(),
        }
    }
}

#[async_trait]
impl ScmClient for GithubClient {
    async fn list_open(&self, repo: &str) -> Result<Vec<PullRequest>> {
        #[derive(Deserialize)]
        struct Label {
            name: String,
        }
        #[derive(Deserialize)]
        struct Head {
            #[serde(rename = "ref")]
            branch: String,
            sha: String,
        }
        #[derive(Deserialize)]
        struct Pr {
            number: u64,
            head: Head,
            #[serde(default)]
            labels: Vec<Label>,
        }

        let url = format!(
            "{}/repos/{}/pulls?state=open&per_page={}",
            self.base, repo, PAGE_SIZE
        );
        let mut request = self
            .client
            .get(&url)
            .header(reqwest::header::USER_AGENT, "kuset")
            .header(reqwest::header::ACCEPT, "application/vnd.github+json");
        if !self.token.is_empty() {
            request = request.bearer_auth(&self.token);
        }
        let response = request
            .send()
            .await
            .with_context(|| format!("listing pull requests for {repo}"))?;
        if !response.status().is_success() {
            bail!("pull request query for {repo} returned {}", response.status());
        }
        let prs: Vec<Pr> = response
            .json()
            .await
            .context("decoding pull request list")?;
        Ok(prs
            .into_iter()
            .map(|pr| PullRequest {
                number: pr.number,
                branch: pr.head.branch,
                head_sha: pr.head.sha,
                labels: pr.labels.into_iter().map(|l| l.name).collect(),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_driver_is_rejected() {
        let factory = default_factory();
        let err = factory("gitea", None, "").unwrap_err();
        assert!(err.to_string().contains("unsupported pull request driver"), "{err}");
        assert!(factory("github", None, "token").is_ok());
    }
}
