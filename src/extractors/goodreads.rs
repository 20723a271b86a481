//! Goodreads reading progress — books on the `currently-reading` shelf.
//!
//! Pure HTTP: fetches the public profile to resolve the numeric user id, then
//! parses the shelf page HTML. Progress comes from inline `width: NN%` styles
//! on progress bars, free-text percentages ("35% done") or page counts
//! ("120 of 340 pages").

use crate::record::{self, RawRecord};
use crate::registry::Extractor;
use crate::secrets::Secrets;
use crate::session::{HttpSession, Session, SessionKind};
use anyhow::{bail, Result};
use async_trait::async_trait;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::Serialize;
use std::sync::OnceLock;

const BASE_URL: &str = "https://www.goodreads.com";

/// A book in progress on a shelf.
#[derive(Debug, Clone, Serialize)]
pub struct BookProgress {
    pub title: String,
    pub author: Option<String>,
    pub percent: Option<u32>,
    pub pages_read: Option<u32>,
    pub pages_total: Option<u32>,
    pub book_url: Option<String>,
    pub shelf: String,
}

pub struct GoodreadsReading;

#[async_trait]
impl Extractor for GoodreadsReading {
    fn name(&self) -> &'static str {
        "goodreads"
    }

    fn description(&self) -> &'static str {
        "Reading progress from the Goodreads currently-reading shelf"
    }

    fn required_secrets(&self) -> &'static [&'static str] {
        &["goodreads.username"]
    }

    fn optional_settings(&self) -> &'static [&'static str] {
        &[
            "goodreads.profile_url",
            "goodreads.shelf",
            "goodreads.per_page",
        ]
    }

    fn session_kind(&self) -> SessionKind {
        SessionKind::Http
    }

    async fn run(&self, session: &mut Session, secrets: &Secrets) -> Result<Vec<RawRecord>> {
        let http = session.http()?;

        let username = secrets.require("goodreads.username")?;
        let profile_url = secrets
            .get("goodreads.profile_url")
            .map(String::from)
            .unwrap_or_else(|| format!("{BASE_URL}/{username}"));
        let shelf = secrets.get_or("goodreads.shelf", "currently-reading");
        let per_page = secrets.get_int("goodreads.per_page", 100);

        let user_id = resolve_user_id(http, &profile_url).await?;
        let shelf_url =
            format!("{BASE_URL}/review/list/{user_id}?shelf={shelf}&per_page={per_page}");

        let resp = http.get(&shelf_url).await?;
        if !resp.is_success() {
            bail!("shelf page returned HTTP {}", resp.status);
        }

        let books = parse_shelf(&resp.body, shelf);
        record::to_raw(&books)
    }
}

/// Goodreads shelves are addressed by a numeric user id, not the username.
/// Resolve it from the public profile: final URL first, then profile links.
async fn resolve_user_id(http: &HttpSession, profile_url: &str) -> Result<String> {
    let resp = http.get(profile_url).await?;
    if !resp.is_success() {
        bail!("profile page returned HTTP {}", resp.status);
    }

    let re = user_id_re();
    if let Some(m) = re.captures(&resp.final_url) {
        return Ok(m[1].to_string());
    }
    if let Some(id) = find_user_id_in_links(&resp.body) {
        return Ok(id);
    }
    bail!("could not resolve the Goodreads user id from {profile_url}")
}

fn find_user_id_in_links(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let anchors = Selector::parse("a[href], meta[property=\"og:url\"]").ok()?;
    let re = user_id_re();
    for el in document.select(&anchors) {
        let Some(target) = el.attr("href").or_else(|| el.attr("content")) else {
            continue;
        };
        if let Some(m) = re.captures(target) {
            return Some(m[1].to_string());
        }
    }
    None
}

/// Parse a shelf page in either the classic table layout or the card layout.
fn parse_shelf(html: &str, shelf: &str) -> Vec<BookProgress> {
    let document = Html::parse_document(html);

    let mut books = parse_rows(&document, "table#books tr", shelf);
    if books.is_empty() {
        books = parse_rows(&document, "table.tableList tr", shelf);
    }
    if books.is_empty() {
        books = parse_rows(
            &document,
            "div.bookalike, div.elementList, li.bookListItem",
            shelf,
        );
    }
    books
}

fn parse_rows(document: &Html, row_selector: &str, shelf: &str) -> Vec<BookProgress> {
    let Ok(rows) = Selector::parse(row_selector) else {
        return Vec::new();
    };
    let title_sel = Selector::parse("td.title a, a.bookTitle").ok();
    let author_sel = Selector::parse("td.author a, a.authorName, span.authorName").ok();

    let mut books = Vec::new();
    for row in document.select(&rows) {
        let link = title_sel
            .as_ref()
            .and_then(|s| row.select(s).next())
            .or_else(|| {
                // Card layouts: the first link is the book link
                Selector::parse("a[href]")
                    .ok()
                    .and_then(|s| row.select(&s).next())
            });
        let Some(link) = link else { continue };

        let title = collapse_whitespace(&link.text().collect::<String>());
        let book_url = link.attr("href").map(canonical_book_url);
        if title.is_empty() && book_url.is_none() {
            continue;
        }

        let author = author_sel
            .as_ref()
            .and_then(|s| row.select(s).next())
            .map(|a| collapse_whitespace(&a.text().collect::<String>()))
            .filter(|a| !a.is_empty());

        let row_text = collapse_whitespace(&row.text().collect::<String>());
        let mut percent = style_percent(&row).or_else(|| text_percent(&row_text));
        let (pages_read, pages_total) = pages_progress(&row_text);
        if percent.is_none() {
            if let (Some(read), Some(total)) = (pages_read, pages_total) {
                if total > 0 {
                    percent = Some(((read as f64 / total as f64) * 100.0).round() as u32);
                }
            }
        }

        books.push(BookProgress {
            title: if title.is_empty() {
                "(untitled)".to_string()
            } else {
                title
            },
            author,
            percent,
            pages_read,
            pages_total,
            book_url,
            shelf: shelf.to_string(),
        });
    }
    books
}

/// Highest `width: NN%` among progress-bar-ish descendants — the filled bar.
fn style_percent(row: &ElementRef<'_>) -> Option<u32> {
    let sel = Selector::parse("[style*=\"width\"]").ok()?;
    let re = width_re();
    let mut best: Option<u32> = None;
    for el in row.select(&sel) {
        let style = el.attr("style").unwrap_or("");
        if let Some(m) = re.captures(style) {
            if let Ok(v) = m[1].parse::<u32>() {
                let v = v.min(100);
                if best.map_or(true, |b| v > b) {
                    best = Some(v);
                }
            }
        }
    }
    best
}

/// Capture "10%", "10 %", "35% done" from free text.
fn text_percent(text: &str) -> Option<u32> {
    percent_re()
        .captures(text)
        .and_then(|m| m[1].parse::<u32>().ok())
        .map(|v| v.min(100))
}

/// Extract (pages read, pages total): "X of Y pages", "X de Y páginas", "X / Y".
fn pages_progress(text: &str) -> (Option<u32>, Option<u32>) {
    for re in [pages_en_re(), pages_es_re(), pages_slash_re()] {
        if let Some(m) = re.captures(text) {
            return (m[1].parse().ok(), m[2].parse().ok());
        }
    }
    (None, None)
}

/// Strip query params and fragments; resolve relative links against the site.
fn canonical_book_url(href: &str) -> String {
    let absolute = if href.starts_with('/') {
        format!("{BASE_URL}{href}")
    } else {
        href.to_string()
    };
    match url::Url::parse(&absolute) {
        Ok(mut u) => {
            u.set_query(None);
            u.set_fragment(None);
            u.to_string()
        }
        Err(_) => absolute,
    }
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn user_id_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"/user/show/(\d+)").expect("valid regex"))
}

fn width_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"width\s*:\s*(\d{1,3})\s*%").expect("valid regex"))
}

fn percent_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d{1,3})\s?%").expect("valid regex"))
}

fn pages_en_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)(\d{1,5})\s+of\s+(\d{1,5})\s+pages").expect("valid regex"))
}

fn pages_es_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(\d{1,5})\s+de\s+(\d{1,5})\s+p(?:á|a)ginas").expect("valid regex")
    })
}

fn pages_slash_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(?:\bp\.?\s*)?(\d{1,5})\s*/\s*(\d{1,5})\b").expect("valid regex")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHELF_HTML: &str = r#"
        <html><body>
        <table id="books">
          <tr><th>cover</th><th>title</th></tr>
          <tr>
            <td class="field title"><a href="/book/show/44767458-dune?from=shelf">Dune</a></td>
            <td class="field author"><a href="/author/1">Herbert, Frank</a></td>
            <td class="field progress">
              <div class="graphBar" style="width: 26%"></div>
            </td>
          </tr>
          <tr>
            <td class="field title"><a href="/book/show/7144">Crime and Punishment</a></td>
            <td class="field author"><a href="/author/2">Dostoevsky, Fyodor</a></td>
            <td class="field progress">120 of 340 pages</td>
          </tr>
        </table>
        </body></html>
    "#;

    #[test]
    fn test_parse_shelf_table_layout() {
        let books = parse_shelf(SHELF_HTML, "currently-reading");
        assert_eq!(books.len(), 2);

        assert_eq!(books[0].title, "Dune");
        assert_eq!(books[0].author.as_deref(), Some("Herbert, Frank"));
        assert_eq!(books[0].percent, Some(26));
        assert_eq!(
            books[0].book_url.as_deref(),
            Some("https://www.goodreads.com/book/show/44767458-dune")
        );

        // Percent derived from page counts
        assert_eq!(books[1].pages_read, Some(120));
        assert_eq!(books[1].pages_total, Some(340));
        assert_eq!(books[1].percent, Some(35));
    }

    #[test]
    fn test_parse_shelf_empty_document() {
        assert!(parse_shelf("<html><body></body></html>", "read").is_empty());
    }

    #[test]
    fn test_text_percent_variants() {
        assert_eq!(text_percent("35% done"), Some(35));
        assert_eq!(text_percent("10 %"), Some(10));
        assert_eq!(text_percent("450% weird"), Some(100));
        assert_eq!(text_percent("no progress"), None);
    }

    #[test]
    fn test_pages_progress_variants() {
        assert_eq!(pages_progress("120 of 340 pages"), (Some(120), Some(340)));
        assert_eq!(pages_progress("45 de 300 páginas"), (Some(45), Some(300)));
        assert_eq!(pages_progress("p. 12 / 90"), (Some(12), Some(90)));
        assert_eq!(pages_progress("nothing"), (None, None));
    }

    #[test]
    fn test_canonical_book_url() {
        assert_eq!(
            canonical_book_url("/book/show/1?ref=x#frag"),
            "https://www.goodreads.com/book/show/1"
        );
        assert_eq!(
            canonical_book_url("https://www.goodreads.com/book/show/2"),
            "https://www.goodreads.com/book/show/2"
        );
    }

    #[test]
    fn test_user_id_from_links() {
        let html = r#"<html><body>
            <a href="/user/show/12345-maria">profile</a>
        </body></html>"#;
        assert_eq!(find_user_id_in_links(html), Some("12345".to_string()));
    }
}
