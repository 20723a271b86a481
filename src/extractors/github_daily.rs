//! GitHub daily activity — commits authored today across all repositories.
//!
//! Pure REST: lists the user's repositories (sorted by recent pushes), then
//! asks each repo for commits inside today's window. "Today" is the local
//! calendar day converted to UTC bounds. Commits are matched by author login
//! and, optionally, by a list of author emails; the two strategies are
//! deduplicated by SHA. A failing repository is logged and skipped — it never
//! fails the whole extraction.

use crate::record::{self, RawRecord};
use crate::registry::Extractor;
use crate::secrets::Secrets;
use crate::session::{HttpResponse, HttpSession, Session, SessionKind};
use anyhow::{ensure, Result};
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Local, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;
use tracing::{debug, warn};

const DEFAULT_API_BASE: &str = "https://api.github.com";

/// A single commit with the metadata worth keeping.
#[derive(Debug, Clone, Serialize)]
pub struct CommitItem {
    pub repo: String,
    pub sha: String,
    pub html_url: String,
    /// First line of the commit message.
    pub message: String,
    pub date: String,
    pub author_login: Option<String>,
    pub author_email: Option<String>,
}

pub struct GitHubDaily;

#[async_trait]
impl Extractor for GitHubDaily {
    fn name(&self) -> &'static str {
        "github_daily"
    }

    fn description(&self) -> &'static str {
        "Commits authored today across all GitHub repositories"
    }

    fn required_secrets(&self) -> &'static [&'static str] {
        &["github.token"]
    }

    fn optional_settings(&self) -> &'static [&'static str] {
        &[
            "github.author_login",
            "github.author_emails",
            "github.per_page",
            "github.visibility",
            "github.api_base",
        ]
    }

    fn session_kind(&self) -> SessionKind {
        SessionKind::Http
    }

    async fn run(&self, session: &mut Session, secrets: &Secrets) -> Result<Vec<RawRecord>> {
        let http = session.http()?;

        let token = secrets.require("github.token")?;
        let api_base = secrets
            .get_or("github.api_base", DEFAULT_API_BASE)
            .trim_end_matches('/')
            .to_string();
        let per_page = secrets.get_int("github.per_page", 100).clamp(1, 100);
        let visibility = secrets.get_or("github.visibility", "all").to_string();
        let emails: HashSet<String> = secrets
            .get_list("github.author_emails")
            .into_iter()
            .map(|e| e.to_lowercase())
            .collect();

        let headers = request_headers(token);

        let author_login = match secrets.get("github.author_login").filter(|l| !l.is_empty()) {
            Some(login) => login.to_string(),
            None => resolve_author_login(http, &api_base, &headers).await?,
        };

        let (since, until) = today_window();
        debug!(
            author = %author_login,
            "collecting commits between {since} and {until}"
        );

        let repos_url = format!(
            "{api_base}/user/repos?per_page={per_page}&sort=pushed&direction=desc&visibility={visibility}"
        );
        let repos = paginate(http, &headers, repos_url).await?;

        let mut commits: Vec<CommitItem> = Vec::new();
        for repo in &repos {
            let owner = repo["owner"]["login"].as_str().unwrap_or_default();
            let name = repo["name"].as_str().unwrap_or_default();
            if owner.is_empty() || name.is_empty() {
                continue;
            }

            match repo_commits_today(
                http,
                &headers,
                &api_base,
                owner,
                name,
                &since,
                &until,
                &author_login,
                &emails,
                per_page,
            )
            .await
            {
                Ok(found) => {
                    if !found.is_empty() {
                        debug!("found {} commit(s) in {owner}/{name}", found.len());
                        commits.extend(found);
                    }
                }
                // One broken repository must not sink the whole extraction
                Err(e) => warn!("skipping {owner}/{name}: {e:#}"),
            }
        }

        record::to_raw(&commits)
    }
}

fn request_headers(token: &str) -> Vec<(String, String)> {
    vec![
        ("accept".to_string(), "application/vnd.github+json".to_string()),
        ("x-github-api-version".to_string(), "2022-11-28".to_string()),
        ("authorization".to_string(), format!("Bearer {token}")),
    ]
}

/// Resolve the authenticated user's login via `GET /user`.
async fn resolve_author_login(
    http: &HttpSession,
    api_base: &str,
    headers: &[(String, String)],
) -> Result<String> {
    let resp = http.get_with(&format!("{api_base}/user"), headers).await?;
    ensure!(resp.is_success(), "GET /user returned HTTP {}", resp.status);
    let user: Value = serde_json::from_str(&resp.body)?;
    user["login"]
        .as_str()
        .map(String::from)
        .ok_or_else(|| anyhow::anyhow!("GET /user response has no login field"))
}

/// Today's window in UTC bounds, derived from the local calendar day.
fn today_window() -> (String, String) {
    let now = Local::now();
    let start_local = now
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .and_then(|midnight| midnight.and_local_timezone(Local).earliest())
        .unwrap_or(now);
    let end_local = start_local + ChronoDuration::days(1) - ChronoDuration::seconds(1);

    let fmt = "%Y-%m-%dT%H:%M:%SZ";
    (
        start_local.with_timezone(&Utc).format(fmt).to_string(),
        end_local.with_timezone(&Utc).format(fmt).to_string(),
    )
}

#[allow(clippy::too_many_arguments)]
async fn repo_commits_today(
    http: &HttpSession,
    headers: &[(String, String)],
    api_base: &str,
    owner: &str,
    name: &str,
    since: &str,
    until: &str,
    author_login: &str,
    emails: &HashSet<String>,
    per_page: i64,
) -> Result<Vec<CommitItem>> {
    let base = format!("{api_base}/repos/{owner}/{name}/commits");
    let mut seen: HashSet<String> = HashSet::new();
    let mut commits = Vec::new();

    // Strategy 1: match by author login
    let by_author = format!(
        "{base}?since={since}&until={until}&author={author_login}&per_page={per_page}"
    );
    for item in paginate(http, headers, by_author).await? {
        if let Some(commit) = commit_item(owner, name, &item) {
            if seen.insert(commit.sha.clone()) {
                commits.push(commit);
            }
        }
    }

    // Strategy 2: match unattributed commits by author email
    if !emails.is_empty() {
        let all = format!("{base}?since={since}&until={until}&per_page={per_page}");
        for item in paginate(http, headers, all).await? {
            let Some(commit) = commit_item(owner, name, &item) else {
                continue;
            };
            let matches = commit
                .author_email
                .as_deref()
                .map(|e| emails.contains(&e.to_lowercase()))
                .unwrap_or(false);
            if matches && seen.insert(commit.sha.clone()) {
                commits.push(commit);
            }
        }
    }

    Ok(commits)
}

fn commit_item(owner: &str, name: &str, item: &Value) -> Option<CommitItem> {
    let sha = item["sha"].as_str()?;
    let commit = &item["commit"];
    let author = &commit["author"];
    Some(CommitItem {
        repo: format!("{owner}/{name}"),
        sha: sha.to_string(),
        html_url: item["html_url"].as_str().unwrap_or_default().to_string(),
        message: commit["message"]
            .as_str()
            .unwrap_or_default()
            .lines()
            .next()
            .unwrap_or_default()
            .trim()
            .to_string(),
        date: author["date"].as_str().unwrap_or_default().to_string(),
        author_login: item["author"]["login"].as_str().map(String::from),
        author_email: author["email"].as_str().map(String::from),
    })
}

/// Follow `Link: rel="next"` pagination, waiting out a primary rate limit.
async fn paginate(
    http: &HttpSession,
    headers: &[(String, String)],
    first_url: String,
) -> Result<Vec<Value>> {
    let mut url = Some(first_url);
    let mut items = Vec::new();

    while let Some(u) = url.take() {
        let mut resp = http.get_with(&u, headers).await?;

        if resp.status == 403 && resp.body.to_lowercase().contains("rate limit") {
            let wait_secs = rate_limit_wait(&resp);
            warn!("GitHub rate limit hit, waiting {wait_secs}s");
            tokio::time::sleep(std::time::Duration::from_secs(wait_secs)).await;
            resp = http.get_with(&u, headers).await?;
        }

        ensure!(
            resp.is_success(),
            "GitHub API returned HTTP {} for {u}",
            resp.status
        );

        let next = resp.header("link").and_then(next_link);
        let data: Value = serde_json::from_str(&resp.body)?;
        match data {
            Value::Array(page) => items.extend(page),
            other => items.push(other),
        }
        url = next;
    }

    Ok(items)
}

fn rate_limit_wait(resp: &HttpResponse) -> u64 {
    resp.header("x-ratelimit-reset")
        .and_then(|s| s.parse::<i64>().ok())
        .map(|reset| (reset - Utc::now().timestamp()).clamp(5, 300) as u64)
        .unwrap_or(60)
}

/// Extract the `rel="next"` target from a Link header.
fn next_link(link: &str) -> Option<String> {
    for part in link.split(',') {
        if part.contains("rel=\"next\"") {
            let start = part.find('<')? + 1;
            let end = part.find('>')?;
            return Some(part[start..end].to_string());
        }
    }
    None
}
