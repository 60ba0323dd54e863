use std::collections::VecDeque;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use url::Url;

use crate::types::{Branch, ContentItem, ContentType, Repo, RepoEntry};

const DEFAULT_BASE_URL: &str = "https://api.github.com";
const API_VERSION: &str = "2022-11-28";
const USER_AGENT: &str = concat!("travis-workspace/", env!("CARGO_PKG_VERSION"));
const PAGE_SIZE: usize = 100;
const RAW_CONTENT_HOST: &str = "raw.githubusercontent.com";
const EMPTY_REPOSITORY_MESSAGE: &str = "This repository is empty";

#[derive(Debug, Error)]
pub enum GithubError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("base url cannot carry path segments: {0}")]
    InvalidBaseUrl(String),
    #[error("repository must be given as owner/repo, got {0:?}")]
    InvalidRepoName(String),
    #[error("api returned {status}: {body}")]
    Api {
        status: StatusCode,
        body: String,
        rate_limit_remaining: Option<u64>,
    },
    #[error("failed to decode file content: {0}")]
    Decode(#[from] base64::DecodeError),
    #[error("not a file: {0}")]
    NotAFile(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorClass {
    Auth,
    RateLimit,
    NotFound,
    Transient,
    Permanent,
}

#[derive(Clone)]
pub struct GithubClient {
    http: Client,
    base_url: Url,
    token: String,
}

#[derive(serde::Deserialize)]
#[serde(untagged)]
enum ContentsResponse {
    Listing(Vec<ContentItem>),
    Single(Box<ContentItem>),
}

#[derive(Serialize)]
struct SaveFileBody<'a> {
    message: &'a str,
    content: String,
    #[serde(skip_serializing_if = "str::is_empty")]
    branch: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<String>,
}

impl GithubClient {
    pub fn new(token: impl Into<String>) -> Result<Self, GithubError> {
        Self::with_base_url(DEFAULT_BASE_URL, token)
    }

    pub fn with_base_url(base_url: &str, token: impl Into<String>) -> Result<Self, GithubError> {
        Ok(Self {
            http: Client::new(),
            base_url: Url::parse(base_url)?,
            token: token.into(),
        })
    }

    pub async fn list_repositories(&self) -> Result<Vec<Repo>, GithubError> {
        let url = self.endpoint(&["user", "repos"])?;
        self.get_all_pages(url, &[("sort", "updated")]).await
    }

    pub async fn list_branches(&self, full_name: &str) -> Result<Vec<Branch>, GithubError> {
        let (owner, repo) = split_full_name(full_name)?;
        let url = self.endpoint(&["repos", owner, repo, "branches"])?;
        self.get_all_pages(url, &[]).await
    }

    /// Walks the tree below `path` (empty for the repository root), one
    /// listing request per directory. Directories are listed breadth-first,
    /// so a folder always precedes its own children in the result.
    pub async fn fetch_directory_contents(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
        branch: &str,
    ) -> Result<Vec<RepoEntry>, GithubError> {
        let mut pending = VecDeque::from([path.trim_matches('/').to_string()]);
        let mut entries = Vec::new();
        while let Some(dir) = pending.pop_front() {
            let listing = match self.get_contents(owner, repo, &dir, branch).await {
                Ok(ContentsResponse::Listing(items)) => items,
                Ok(ContentsResponse::Single(item)) => vec![*item],
                Err(err) if dir.is_empty() && err.is_empty_repository() => {
                    tracing::debug!(owner, repo, "repository has no commits");
                    return Ok(Vec::new());
                }
                Err(err) => return Err(err),
            };
            tracing::debug!(path = %dir, items = listing.len(), "listed repository directory");
            for item in listing {
                match item.content_type {
                    ContentType::Dir => {
                        pending.push_back(item.path.clone());
                        entries.push(RepoEntry::folder(item.path));
                    }
                    ContentType::File | ContentType::Symlink => {
                        let content = inline_content(&item);
                        entries.push(RepoEntry::file(item.path, content));
                    }
                    ContentType::Submodule => {
                        tracing::debug!(path = %item.path, "skipping submodule");
                    }
                }
            }
        }
        Ok(entries)
    }

    pub async fn fetch_file_content(
        &self,
        full_name: &str,
        path: &str,
        branch: &str,
    ) -> Result<String, GithubError> {
        let (owner, repo) = split_full_name(full_name)?;
        let item = match self.get_contents(owner, repo, path, branch).await? {
            ContentsResponse::Single(item) => *item,
            ContentsResponse::Listing(_) => return Err(GithubError::NotAFile(path.to_string())),
        };
        if item.content_type == ContentType::Dir {
            return Err(GithubError::NotAFile(path.to_string()));
        }

        if item.encoding.as_deref() == Some("base64")
            && let Some(raw) = item.content.as_deref()
        {
            return Ok(bytes_to_string(decode_base64(raw)?));
        }
        // Files above 1 MB come back with `encoding: none` and no body.
        match (item.content, item.download_url) {
            (Some(content), _) if !content.is_empty() => Ok(content),
            (_, Some(download_url)) => self.fetch_raw(&download_url).await,
            (content, None) => Ok(content.unwrap_or_default()),
        }
    }

    /// Creates or updates one file as a single commit.
    ///
    /// Returns `Ok(false)` for any non-success status so callers saving many
    /// files can tally partial success; only transport failures are errors.
    pub async fn save_file(
        &self,
        full_name: &str,
        path: &str,
        content: &str,
        message: &str,
        branch: &str,
    ) -> Result<bool, GithubError> {
        let (owner, repo) = split_full_name(full_name)?;
        let sha = self.current_sha(owner, repo, path, branch).await?;
        let url = self.contents_url(owner, repo, path)?;
        let body = SaveFileBody {
            message,
            content: STANDARD.encode(content),
            branch,
            sha,
        };
        let response = self.authorized(self.http.put(url)).json(&body).send().await?;
        let status = response.status();
        if status.is_success() {
            tracing::debug!(path, %status, "saved file to github");
            return Ok(true);
        }
        let body = response.text().await.unwrap_or_default();
        tracing::warn!(path, %status, body = %body, "github rejected file save");
        Ok(false)
    }

    async fn current_sha(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
        branch: &str,
    ) -> Result<Option<String>, GithubError> {
        match self.get_contents(owner, repo, path, branch).await {
            Ok(ContentsResponse::Single(item)) => Ok(item.sha),
            Ok(ContentsResponse::Listing(_)) => Ok(None),
            Err(err @ GithubError::Api { .. }) => {
                if !err.is_not_found() {
                    tracing::debug!(path, error = %err, "sha lookup failed, saving without sha");
                }
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    async fn get_contents(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
        branch: &str,
    ) -> Result<ContentsResponse, GithubError> {
        let mut url = self.contents_url(owner, repo, path)?;
        if !branch.is_empty() {
            url.query_pairs_mut().append_pair("ref", branch);
        }
        let response = self.authorized(self.http.get(url)).send().await?;
        Self::handle_response(response).await
    }

    async fn fetch_raw(&self, download_url: &str) -> Result<String, GithubError> {
        let url = Url::parse(download_url)?;
        let request = if self.is_trusted_origin(&url) {
            self.authorized(self.http.get(url))
        } else {
            tracing::debug!(host = ?url.host_str(), "fetching raw content without credentials");
            self.http.get(url).header("User-Agent", USER_AGENT)
        };
        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(Self::api_error(response).await);
        }
        let bytes = response.bytes().await?;
        Ok(bytes_to_string(bytes.to_vec()))
    }

    async fn get_all_pages<T: DeserializeOwned>(
        &self,
        base: Url,
        params: &[(&str, &str)],
    ) -> Result<Vec<T>, GithubError> {
        let mut items = Vec::new();
        let mut page = 1u32;
        loop {
            let mut url = base.clone();
            {
                let mut query = url.query_pairs_mut();
                for (key, value) in params {
                    query.append_pair(key, value);
                }
                query.append_pair("per_page", &PAGE_SIZE.to_string());
                query.append_pair("page", &page.to_string());
            }
            let response = self.authorized(self.http.get(url)).send().await?;
            let batch: Vec<T> = Self::handle_response(response).await?;
            let len = batch.len();
            items.extend(batch);
            if len < PAGE_SIZE {
                break;
            }
            page = page.saturating_add(1);
        }
        Ok(items)
    }

    // The token only goes to the API host itself or GitHub's raw content host.
    fn is_trusted_origin(&self, url: &Url) -> bool {
        url.origin() == self.base_url.origin()
            || (url.scheme() == "https" && url.host_str() == Some(RAW_CONTENT_HOST))
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", API_VERSION)
            .header("User-Agent", USER_AGENT)
    }

    fn contents_url(&self, owner: &str, repo: &str, path: &str) -> Result<Url, GithubError> {
        let mut segments = vec!["repos", owner, repo, "contents"];
        segments.extend(path.split('/').filter(|segment| !segment.is_empty()));
        self.endpoint(&segments)
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, GithubError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| GithubError::InvalidBaseUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn handle_response<T: DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, GithubError> {
        if response.status().is_success() {
            Ok(response.json::<T>().await?)
        } else {
            Err(Self::api_error(response).await)
        }
    }

    async fn api_error(response: reqwest::Response) -> GithubError {
        let status = response.status();
        let rate_limit_remaining = response
            .headers()
            .get("x-ratelimit-remaining")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<u64>().ok());
        let body = response.text().await.unwrap_or_default();
        GithubError::Api {
            status,
            body,
            rate_limit_remaining,
        }
    }
}

impl GithubError {
    pub fn classification(&self) -> Option<ApiErrorClass> {
        match self {
            GithubError::Api {
                status,
                rate_limit_remaining,
                ..
            } => Some(classify_api_status(*status, *rate_limit_remaining)),
            _ => None,
        }
    }

    pub fn is_auth(&self) -> bool {
        self.classification() == Some(ApiErrorClass::Auth)
    }

    pub fn is_rate_limited(&self) -> bool {
        self.classification() == Some(ApiErrorClass::RateLimit)
    }

    pub fn is_not_found(&self) -> bool {
        self.classification() == Some(ApiErrorClass::NotFound)
    }

    /// GitHub answers `/contents` on a repository without commits with a 404
    /// rather than an empty listing.
    pub fn is_empty_repository(&self) -> bool {
        matches!(
            self,
            GithubError::Api { status, body, .. }
                if *status == StatusCode::NOT_FOUND && body.contains(EMPTY_REPOSITORY_MESSAGE)
        )
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            GithubError::Request(_) => true,
            _ => matches!(
                self.classification(),
                Some(ApiErrorClass::RateLimit | ApiErrorClass::Transient)
            ),
        }
    }
}

fn classify_api_status(status: StatusCode, rate_limit_remaining: Option<u64>) -> ApiErrorClass {
    if status == StatusCode::TOO_MANY_REQUESTS
        || (status == StatusCode::FORBIDDEN && rate_limit_remaining == Some(0))
    {
        ApiErrorClass::RateLimit
    } else if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
        ApiErrorClass::Auth
    } else if status == StatusCode::NOT_FOUND {
        ApiErrorClass::NotFound
    } else if status.is_server_error()
        || matches!(
            status,
            StatusCode::REQUEST_TIMEOUT | StatusCode::CONFLICT | StatusCode::TOO_EARLY
        )
    {
        ApiErrorClass::Transient
    } else {
        ApiErrorClass::Permanent
    }
}

/// Splits `owner/repo` into its two halves.
pub fn split_full_name(full_name: &str) -> Result<(&str, &str), GithubError> {
    match full_name.split_once('/') {
        Some((owner, repo)) if !owner.is_empty() && !repo.is_empty() && !repo.contains('/') => {
            Ok((owner, repo))
        }
        _ => Err(GithubError::InvalidRepoName(full_name.to_string())),
    }
}

fn inline_content(item: &ContentItem) -> Option<String> {
    if item.encoding.as_deref() != Some("base64") {
        return None;
    }
    let raw = item.content.as_deref()?;
    decode_base64(raw).ok().map(bytes_to_string)
}

// The contents API wraps base64 bodies at 60 columns.
fn decode_base64(raw: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let compact: String = raw.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    STANDARD.decode(compact)
}

fn bytes_to_string(bytes: Vec<u8>) -> String {
    match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(err) => String::from_utf8_lossy(err.as_bytes()).into_owned(),
    }
}
