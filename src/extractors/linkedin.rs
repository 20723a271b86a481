//! LinkedIn profile snapshot.
//!
//! Logs into LinkedIn with a headless browser, opens the configured profile
//! page and parses the rendered intro card plus the experience and education
//! sections. Produces a single profile object per run, not a list.
//!
//! LinkedIn duplicates visible text in `aria-hidden` spans next to
//! `visually-hidden` ones for screen readers; parsing prefers the
//! `aria-hidden` copy and falls back to raw section text.

use crate::record::{self, RawRecord};
use crate::registry::Extractor;
use crate::secrets::Secrets;
use crate::session::{Session, SessionKind};
use anyhow::{ensure, Context, Result};
use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use serde::Serialize;
use tracing::debug;

const LOGIN_URL: &str = "https://www.linkedin.com/login";

#[derive(Debug, Clone, Serialize)]
pub struct ProfileSnapshot {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headline: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub about: Option<String>,
    pub experience: Vec<SectionEntry>,
    pub education: Vec<SectionEntry>,
    pub certifications: Vec<SectionEntry>,
    pub profile_url: String,
}

/// One entry in the experience or education sections.
#[derive(Debug, Clone, Serialize)]
pub struct SectionEntry {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub period: Option<String>,
}

pub struct LinkedInProfile;

#[async_trait]
impl Extractor for LinkedInProfile {
    fn name(&self) -> &'static str {
        "linkedin"
    }

    fn description(&self) -> &'static str {
        "Snapshot of the configured LinkedIn profile"
    }

    fn required_secrets(&self) -> &'static [&'static str] {
        &["linkedin.email", "linkedin.password", "linkedin.profile"]
    }

    fn optional_settings(&self) -> &'static [&'static str] {
        &["linkedin.login_wait_ms"]
    }

    fn session_kind(&self) -> SessionKind {
        SessionKind::Browser
    }

    /// The artifact holds one profile object, not an array.
    fn singleton(&self) -> bool {
        true
    }

    async fn run(&self, session: &mut Session, secrets: &Secrets) -> Result<Vec<RawRecord>> {
        let browser = session.browser()?;
        let email = secrets.require("linkedin.email")?.to_string();
        let password = secrets.require("linkedin.password")?.to_string();
        let profile_url = normalize_profile_url(secrets.require("linkedin.profile")?);
        let login_wait = secrets.get_int("linkedin.login_wait_ms", 25_000).max(1_000) as u64;

        browser.navigate(LOGIN_URL, 30_000).await?;
        browser
            .wait_for_selector("input[name='session_key']", login_wait)
            .await
            .context("login form did not appear")?;
        browser
            .type_into("input[name='session_key']", &email)
            .await?;
        browser
            .type_into("input[name='session_password']", &password)
            .await?;
        browser.click("button[type='submit']").await?;

        // The feed redirect confirms the login; a checkpoint page means a
        // verification challenge we cannot answer headlessly.
        browser.wait_for_url_contains("/feed", login_wait).await?;
        let after_login = browser.current_url().await?;
        ensure!(
            !after_login.contains("checkpoint"),
            "login hit a verification checkpoint"
        );
        debug!("logged in, opening profile {profile_url}");

        browser.navigate(&profile_url, 30_000).await?;
        browser
            .wait_for_selector("main section", login_wait)
            .await
            .context("profile page did not render")?;
        // Sections below the fold render lazily; scroll once to force them.
        let _ = browser
            .eval("window.scrollTo(0, document.body.scrollHeight)")
            .await;
        tokio::time::sleep(std::time::Duration::from_millis(2_000)).await;

        let html = browser.html().await?;
        let profile = parse_profile(&html, &profile_url)
            .context("profile page rendered without an intro card")?;

        record::to_raw(&[profile])
    }
}

/// Accepts a full URL, an `/in/...` path, or a bare public identifier.
fn normalize_profile_url(configured: &str) -> String {
    let trimmed = configured.trim().trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else if let Some(path) = trimmed.strip_prefix("/in/") {
        format!("https://www.linkedin.com/in/{path}")
    } else {
        format!("https://www.linkedin.com/in/{trimmed}")
    }
}

fn parse_profile(html: &str, profile_url: &str) -> Option<ProfileSnapshot> {
    let document = Html::parse_document(html);

    let name = select_text(&document, "main h1")?;
    let headline = select_text(&document, "div[class*='text-body-medium']")
        .or_else(|| select_text(&document, "main section div.text-body-medium"));
    let location = select_text(&document, "span[class*='text-body-small'][class*='inline']")
        .or_else(|| select_text(&document, "main section span.text-body-small"));
    let about = section_by_anchor(&document, "about").and_then(|s| section_body_text(&s));

    Some(ProfileSnapshot {
        name,
        headline,
        location,
        about,
        experience: section_entries(&document, "experience"),
        education: section_entries(&document, "education"),
        certifications: section_entries(&document, "licenses_and_certifications"),
        profile_url: profile_url.to_string(),
    })
}

fn select_text(document: &Html, selector: &str) -> Option<String> {
    let sel = Selector::parse(selector).ok()?;
    document
        .select(&sel)
        .map(|el| el.text().collect::<String>().trim().to_string())
        .find(|t| !t.is_empty())
}

/// Profile sections are addressed by an anchor div with a stable id.
fn section_by_anchor<'a>(document: &'a Html, anchor_id: &str) -> Option<ElementRef<'a>> {
    let sel = Selector::parse("main section").ok()?;
    let anchor = Selector::parse(&format!("div#{anchor_id}")).ok()?;
    document
        .select(&sel)
        .find(|section| section.select(&anchor).next().is_some())
}

fn section_body_text(section: &ElementRef<'_>) -> Option<String> {
    let sel = Selector::parse("span[aria-hidden='true']").ok()?;
    let text = section
        .select(&sel)
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty())
        // The first aria-hidden span in a section is its heading
        .skip(1)
        .collect::<Vec<_>>()
        .join("\n");
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

fn section_entries(document: &Html, anchor_id: &str) -> Vec<SectionEntry> {
    let Some(section) = section_by_anchor(document, anchor_id) else {
        return Vec::new();
    };
    let Ok(item_sel) = Selector::parse("li[class*='list-item'], ul > li") else {
        return Vec::new();
    };
    let Ok(span_sel) = Selector::parse("span[aria-hidden='true']") else {
        return Vec::new();
    };

    let mut entries = Vec::new();
    for item in section.select(&item_sel) {
        let spans: Vec<String> = item
            .select(&span_sel)
            .map(|el| el.text().collect::<String>().trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();
        let Some(title) = spans.first() else {
            continue;
        };
        // Nested list items repeat their parent's spans; keep the outermost.
        if entries
            .iter()
            .any(|e: &SectionEntry| e.title == *title)
        {
            continue;
        }
        entries.push(SectionEntry {
            title: title.clone(),
            subtitle: spans.get(1).cloned(),
            period: spans
                .iter()
                .skip(1)
                .find(|s| looks_like_period(s))
                .cloned(),
        });
    }
    entries
}

fn looks_like_period(text: &str) -> bool {
    let lower = text.to_lowercase();
    (text.contains(" - ") || lower.contains("present") || lower.contains("actualidad"))
        && text.chars().any(|c| c.is_ascii_digit())
}
