//! Session handles and their acquisition.
//!
//! A session is the opaque resource an extractor needs to talk to its
//! platform: nothing (pure API access over a shared client is still `Http`),
//! an HTTP client, or a headless browser page. Acquisition goes through the
//! [`SessionFactory`] trait so the runtime can be exercised in tests without
//! opening real connections.

pub mod browser;
pub mod http;

pub use browser::BrowserSession;
pub use http::{HttpResponse, HttpSession};

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::Serialize;

/// The kind of session an extractor declares it needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionKind {
    /// Stateless extractor; no resource is acquired.
    None,
    /// Plain HTTP client (REST APIs, public pages).
    Http,
    /// Headless Chromium page (login flows, JS-rendered pages).
    Browser,
}

impl std::fmt::Display for SessionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => f.write_str("none"),
            Self::Http => f.write_str("http"),
            Self::Browser => f.write_str("browser"),
        }
    }
}

/// An acquired session handle, released exactly once by the runtime.
pub enum Session {
    None,
    Http(HttpSession),
    Browser(BrowserSession),
}

impl Session {
    pub fn kind(&self) -> SessionKind {
        match self {
            Self::None => SessionKind::None,
            Self::Http(_) => SessionKind::Http,
            Self::Browser(_) => SessionKind::Browser,
        }
    }

    /// The HTTP client inside this session.
    pub fn http(&self) -> Result<&HttpSession> {
        match self {
            Self::Http(client) => Ok(client),
            other => bail!("extractor expected an http session, got {}", other.kind()),
        }
    }

    /// The browser page inside this session.
    pub fn browser(&mut self) -> Result<&mut BrowserSession> {
        match self {
            Self::Browser(page) => Ok(page),
            other => bail!("extractor expected a browser session, got {}", other.kind()),
        }
    }

    /// Release the underlying resource.
    pub async fn close(self) -> Result<()> {
        match self {
            Self::None | Self::Http(_) => Ok(()),
            Self::Browser(page) => page.close().await,
        }
    }
}

/// Acquires and releases session handles.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn acquire(&self, kind: SessionKind) -> Result<Session>;

    /// Release a session. The runtime calls this on every exit path; a
    /// release failure is logged and never masks the extraction outcome.
    async fn release(&self, session: Session) -> Result<()> {
        session.close().await
    }
}

/// Production factory: real HTTP clients and a fresh headless Chromium per
/// browser session.
pub struct DefaultSessionFactory {
    http_timeout_ms: u64,
    headless: bool,
}

impl DefaultSessionFactory {
    pub fn new(http_timeout_ms: u64, headless: bool) -> Self {
        Self {
            http_timeout_ms,
            headless,
        }
    }
}

#[async_trait]
impl SessionFactory for DefaultSessionFactory {
    async fn acquire(&self, kind: SessionKind) -> Result<Session> {
        match kind {
            SessionKind::None => Ok(Session::None),
            SessionKind::Http => Ok(Session::Http(HttpSession::new(self.http_timeout_ms))),
            SessionKind::Browser => Ok(Session::Browser(
                BrowserSession::launch(self.headless).await?,
            )),
        }
    }
}
