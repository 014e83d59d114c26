use serde::{de::DeserializeOwned, Deserialize};
use tracing::{debug, trace};
use ureq::{
    http::{header::AUTHORIZATION, HeaderMap, Response, StatusCode},
    Agent, Body,
};

use crate::{
    client::{ReleaseInfo, RemoteMetadataClient, RepositoryInfo},
    error::{ClientError, ClientResult},
    http_client::ClientConfig,
};

pub const API_BASE: &str = "https://api.github.com";
pub const RAW_BASE: &str = "https://raw.githubusercontent.com";

/// Largest page GitHub serves for release listings.
const MAX_PER_PAGE: usize = 100;

#[derive(Debug, Deserialize)]
struct GithubRepository {
    id: u64,
    full_name: String,
    description: Option<String>,
    default_branch: String,
    #[serde(default)]
    stargazers_count: u64,
    #[serde(default)]
    archived: bool,
}

#[derive(Debug, Deserialize)]
struct GithubRelease {
    tag_name: String,
    #[serde(default)]
    prerelease: bool,
    #[serde(default)]
    draft: bool,
}

#[derive(Debug, Deserialize)]
struct GithubCommit {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct GithubTree {
    tree: Vec<GithubTreeEntry>,
    #[serde(default)]
    truncated: bool,
}

#[derive(Debug, Deserialize)]
struct GithubTreeEntry {
    path: String,
    #[serde(rename = "type")]
    kind: String,
}

/// [`RemoteMetadataClient`] backed by the GitHub REST API and raw content host.
pub struct GithubClient {
    agent: Agent,
    token: Option<String>,
}

impl GithubClient {
    pub fn new(config: &ClientConfig, token: Option<String>) -> Self {
        Self {
            agent: config.build(),
            token,
        }
    }

    fn get(&self, url: &str, accept: &str) -> ClientResult<Response<Body>> {
        trace!(url, "GET");
        let mut req = self.agent.get(url).header("Accept", accept);
        if let Some(token) = &self.token {
            req = req.header(AUTHORIZATION, &format!("Bearer {token}"));
        }

        let resp = req.call()?;
        check_status(resp.status(), resp.headers(), url)?;
        Ok(resp)
    }

    fn get_json<T: DeserializeOwned>(&self, path: &str) -> ClientResult<T> {
        let url = format!("{API_BASE}{path}");
        let mut resp = self.get(&url, "application/vnd.github+json")?;
        resp.body_mut()
            .read_json::<T>()
            .map_err(|err| ClientError::Network(format!("invalid response from {url}: {err}")))
    }
}

/// Maps a response status onto the client error taxonomy.
///
/// GitHub signals an exhausted quota with 403 plus `x-ratelimit-remaining: 0`, or with 429.
pub fn check_status(status: StatusCode, headers: &HeaderMap, url: &str) -> ClientResult<()> {
    if status.is_success() {
        return Ok(());
    }

    let remaining = headers
        .get("x-ratelimit-remaining")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok());
    let reset_at = headers
        .get("x-ratelimit-reset")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok());

    match status.as_u16() {
        404 => Err(ClientError::NotFound(url.to_string())),
        429 => Err(ClientError::RateLimited { reset_at }),
        403 if remaining == Some(0) => Err(ClientError::RateLimited { reset_at }),
        code => Err(ClientError::Network(format!("HTTP {code}: {url}"))),
    }
}

fn encode_ref(reference: &str) -> String {
    url::form_urlencoded::byte_serialize(reference.as_bytes()).collect()
}

impl RemoteMetadataClient for GithubClient {
    fn get_repository(&self, full_name: &str) -> ClientResult<RepositoryInfo> {
        let repo: GithubRepository = self.get_json(&format!("/repos/{full_name}"))?;
        Ok(RepositoryInfo {
            id: repo.id.to_string(),
            full_name: repo.full_name,
            description: repo.description,
            default_branch: repo.default_branch,
            stars: repo.stargazers_count,
            archived: repo.archived,
        })
    }

    fn get_releases(&self, full_name: &str, limit: usize) -> ClientResult<Vec<ReleaseInfo>> {
        // over-fetch a little so filtered drafts do not shrink the result
        let per_page = (limit + 5).min(MAX_PER_PAGE);
        let releases: Vec<GithubRelease> =
            self.get_json(&format!("/repos/{full_name}/releases?per_page={per_page}"))?;

        let releases: Vec<_> = releases
            .into_iter()
            .filter(|release| !release.draft)
            .take(limit)
            .map(|release| ReleaseInfo::new(release.tag_name, release.prerelease))
            .collect();
        debug!(repo = full_name, count = releases.len(), "fetched releases");
        Ok(releases)
    }

    fn get_default_branch_sha(&self, full_name: &str) -> ClientResult<String> {
        let commit: GithubCommit = self.get_json(&format!("/repos/{full_name}/commits/HEAD"))?;
        Ok(commit.sha)
    }

    fn get_tree(&self, full_name: &str, reference: &str) -> ClientResult<Vec<String>> {
        let tree: GithubTree = self.get_json(&format!(
            "/repos/{full_name}/git/trees/{}?recursive=1",
            encode_ref(reference)
        ))?;
        if tree.truncated {
            debug!(repo = full_name, reference, "tree listing truncated by upstream");
        }

        Ok(tree
            .tree
            .into_iter()
            .filter(|entry| entry.kind == "blob")
            .map(|entry| entry.path)
            .collect())
    }

    fn get_file(&self, full_name: &str, reference: &str, path: &str) -> ClientResult<Vec<u8>> {
        let url = format!(
            "{RAW_BASE}/{full_name}/{reference}/{}",
            path.trim_start_matches('/')
        );
        let mut resp = self.get(&url, "*/*")?;
        resp.body_mut()
            .read_to_vec()
            .map_err(|err| ClientError::Network(format!("reading {url}: {err}")))
    }
}
