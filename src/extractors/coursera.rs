//! Coursera in-progress courses.
//!
//! Coursera renders the learning dashboard client side, so this extractor
//! drives a headless browser: log in with email and password, open the
//! my-learning page, then parse the rendered course cards out of the DOM.

use crate::record::{self, RawRecord};
use crate::registry::Extractor;
use crate::secrets::Secrets;
use crate::session::{Session, SessionKind};
use anyhow::{ensure, Context, Result};
use async_trait::async_trait;
use regex::Regex;
use scraper::{Html, Selector};
use serde::Serialize;
use std::sync::OnceLock;
use tracing::debug;

const LOGIN_URL: &str = "https://www.coursera.org/?authMode=login";
const LEARNING_URL: &str = "https://www.coursera.org/my-learning?myLearningTab=IN_PROGRESS";

/// One enrolled course with its completion state.
#[derive(Debug, Clone, Serialize)]
pub struct CourseProgress {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partner: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percent: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

pub struct CourseraProgress;

#[async_trait]
impl Extractor for CourseraProgress {
    fn name(&self) -> &'static str {
        "coursera"
    }

    fn description(&self) -> &'static str {
        "In-progress courses from the Coursera learning dashboard"
    }

    fn required_secrets(&self) -> &'static [&'static str] {
        &["coursera.email", "coursera.password"]
    }

    fn optional_settings(&self) -> &'static [&'static str] {
        &["coursera.login_wait_ms"]
    }

    fn session_kind(&self) -> SessionKind {
        SessionKind::Browser
    }

    async fn run(&self, session: &mut Session, secrets: &Secrets) -> Result<Vec<RawRecord>> {
        let browser = session.browser()?;
        let email = secrets.require("coursera.email")?.to_string();
        let password = secrets.require("coursera.password")?.to_string();
        let login_wait = secrets.get_int("coursera.login_wait_ms", 20_000).max(1_000) as u64;

        browser.navigate(LOGIN_URL, 30_000).await?;
        browser
            .wait_for_selector("input[name='email']", login_wait)
            .await
            .context("login form did not appear")?;
        browser.type_into("input[name='email']", &email).await?;
        browser
            .type_into("input[name='password']", &password)
            .await?;
        browser.click("button[type='submit']").await?;

        // Login is confirmed by the dashboard redirect; a CAPTCHA or wrong
        // password leaves us on the auth page.
        browser
            .wait_for_url_contains("coursera.org", login_wait)
            .await?;
        tokio::time::sleep(std::time::Duration::from_millis(2_000)).await;

        let after_login = browser.current_url().await?;
        ensure!(
            !after_login.contains("authMode=login"),
            "login did not complete; still on {after_login}"
        );
        debug!("logged in, loading dashboard");

        browser.navigate(LEARNING_URL, 30_000).await?;
        browser
            .wait_for_selector("main", login_wait)
            .await
            .context("learning dashboard did not render")?;

        let html = browser.html().await?;
        let courses = parse_my_learning(&html);
        ensure!(
            !html.contains("authMode=login") || !courses.is_empty(),
            "dashboard did not render any course cards"
        );
        debug!("parsed {} course card(s)", courses.len());

        record::to_raw(&courses)
    }
}

/// Parse rendered course cards out of the my-learning page.
fn parse_my_learning(html: &str) -> Vec<CourseProgress> {
    let document = Html::parse_document(html);
    let Ok(card_sel) = Selector::parse("div[class*='card'], li[class*='card']") else {
        return Vec::new();
    };

    let mut courses = Vec::new();
    for card in document.select(&card_sel) {
        let text: Vec<String> = card
            .text()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(String::from)
            .collect();
        if text.is_empty() {
            continue;
        }

        let Some(title) = card_title(&card) else {
            continue;
        };
        // Nested card wrappers repeat the same title; outermost wins.
        if courses
            .iter()
            .any(|c: &CourseProgress| c.title == title)
        {
            continue;
        }

        courses.push(CourseProgress {
            title,
            partner: card_partner(&card),
            percent: card_percent(&card, &text),
            url: card_link(&card),
        });
    }
    courses
}

fn card_title(card: &scraper::ElementRef<'_>) -> Option<String> {
    let sel = Selector::parse("h2, h3, h4").ok()?;
    card.select(&sel)
        .map(|h| h.text().collect::<String>().trim().to_string())
        .find(|t| !t.is_empty())
}

fn card_partner(card: &scraper::ElementRef<'_>) -> Option<String> {
    let sel = Selector::parse("p[class*='partner'], span[class*='partner']").ok()?;
    card.select(&sel)
        .map(|p| p.text().collect::<String>().trim().to_string())
        .find(|t| !t.is_empty())
}

fn card_link(card: &scraper::ElementRef<'_>) -> Option<String> {
    let sel = Selector::parse("a[href*='/learn/']").ok()?;
    card.select(&sel)
        .filter_map(|a| a.value().attr("href"))
        .map(|href| {
            if href.starts_with('/') {
                format!("https://www.coursera.org{href}")
            } else {
                href.to_string()
            }
        })
        .next()
}

/// Completion percent: an explicit progressbar attribute when present,
/// otherwise "NN%" anywhere in the card text.
fn card_percent(card: &scraper::ElementRef<'_>, text: &[String]) -> Option<u32> {
    if let Ok(sel) = Selector::parse("[role='progressbar']") {
        for bar in card.select(&sel) {
            if let Some(v) = bar.value().attr("aria-valuenow") {
                if let Ok(p) = v.trim().parse::<u32>() {
                    return Some(p.min(100));
                }
            }
        }
    }

    static PERCENT_RE: OnceLock<Regex> = OnceLock::new();
    let re = PERCENT_RE.get_or_init(|| Regex::new(r"(\d{1,3})\s*%").expect("valid regex"));
    text.iter()
        .filter_map(|t| re.captures(t))
        .filter_map(|c| c[1].parse::<u32>().ok())
        .map(|p| p.min(100))
        .next()
}
