//! Headless Chromium session using chromiumoxide.
//!
//! Each browser session owns its own Chromium instance and a single page;
//! closing the session closes the page and drops the browser, which reaps the
//! child process.

use anyhow::{bail, Context, Result};
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::page::Page;
use futures::StreamExt;
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// Find the Chromium binary path.
pub fn find_chromium() -> Option<PathBuf> {
    // 1. PSYNC_CHROMIUM_PATH env
    if let Ok(p) = std::env::var("PSYNC_CHROMIUM_PATH") {
        let path = PathBuf::from(&p);
        if path.exists() {
            return Some(path);
        }
    }

    // 2. Common install locations (Debian/Raspberry Pi OS package paths)
    let candidates = [
        "/usr/bin/chromium",
        "/usr/bin/chromium-browser",
        "/usr/lib/chromium/chromium",
        "/usr/bin/google-chrome",
    ];
    for c in candidates {
        let path = PathBuf::from(c);
        if path.exists() {
            return Some(path);
        }
    }

    // 3. System PATH
    for name in ["google-chrome", "chromium", "chromium-browser"] {
        if let Ok(path) = which::which(name) {
            return Some(path);
        }
    }

    // 4. Common macOS location
    if cfg!(target_os = "macos") {
        let common = PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome");
        if common.exists() {
            return Some(common);
        }
    }

    None
}

/// A single headless Chromium page.
pub struct BrowserSession {
    browser: Browser,
    page: Page,
}

impl BrowserSession {
    /// Launch a Chromium instance and open a blank page.
    pub async fn launch(headless: bool) -> Result<Self> {
        let chrome_path = find_chromium()
            .context("Chromium not found. Install chromium or set PSYNC_CHROMIUM_PATH.")?;

        let mut builder = BrowserConfig::builder()
            .chrome_executable(chrome_path)
            .arg("--disable-gpu")
            .arg("--disable-software-rasterizer")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--disable-background-networking")
            .arg("--window-size=1280,1600");
        if headless {
            builder = builder.arg("--headless=new");
        } else {
            builder = builder.with_head();
        }
        let config = builder
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build browser config: {e}"))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("failed to launch Chromium")?;

        // Drain CDP events for the lifetime of the browser
        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                let _ = event;
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .context("failed to open page")?;

        Ok(Self { browser, page })
    }

    /// Navigate to a URL with a timeout, waiting for the load to settle.
    pub async fn navigate(&self, url: &str, timeout_ms: u64) -> Result<()> {
        let result = tokio::time::timeout(
            Duration::from_millis(timeout_ms),
            self.page.goto(url),
        )
        .await;

        match result {
            Ok(Ok(_)) => {
                let _ = self.page.wait_for_navigation().await;
                Ok(())
            }
            Ok(Err(e)) => bail!("navigation to {url} failed: {e}"),
            Err(_) => bail!("navigation to {url} timed out after {timeout_ms}ms"),
        }
    }

    /// Execute JavaScript in the page context and return the result.
    pub async fn eval(&self, script: &str) -> Result<serde_json::Value> {
        let result = self
            .page
            .evaluate(script)
            .await
            .context("JS execution failed")?;

        result
            .into_value()
            .map_err(|e| anyhow::anyhow!("failed to convert JS result: {e:?}"))
    }

    /// Get the full page HTML.
    pub async fn html(&self) -> Result<String> {
        let result = self
            .page
            .evaluate("document.documentElement.outerHTML")
            .await
            .context("failed to get HTML")?;

        let html: String = result
            .into_value()
            .map_err(|e| anyhow::anyhow!("failed to convert HTML result: {e:?}"))?;

        Ok(html)
    }

    /// Get the current URL.
    pub async fn current_url(&self) -> Result<String> {
        let url = self
            .page
            .url()
            .await
            .context("failed to get URL")?
            .map(|u| u.to_string())
            .unwrap_or_default();
        Ok(url)
    }

    /// Type text into the first element matching a CSS selector.
    pub async fn type_into(&self, selector: &str, text: &str) -> Result<()> {
        let element = self
            .page
            .find_element(selector)
            .await
            .with_context(|| format!("element not found: {selector}"))?;
        element.click().await.ok();
        element
            .type_str(text)
            .await
            .with_context(|| format!("failed to type into {selector}"))?;
        Ok(())
    }

    /// Click the first element matching a CSS selector.
    pub async fn click(&self, selector: &str) -> Result<()> {
        self.page
            .find_element(selector)
            .await
            .with_context(|| format!("element not found: {selector}"))?
            .click()
            .await
            .with_context(|| format!("failed to click {selector}"))?;
        Ok(())
    }

    /// Poll until the current URL contains `needle`.
    pub async fn wait_for_url_contains(&self, needle: &str, max_wait_ms: u64) -> Result<()> {
        let deadline = Instant::now() + Duration::from_millis(max_wait_ms);
        loop {
            if self.current_url().await?.contains(needle) {
                return Ok(());
            }
            if Instant::now() >= deadline {
                bail!("timed out waiting for URL to contain '{needle}'");
            }
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
    }

    /// Poll until an element matching `selector` exists.
    pub async fn wait_for_selector(&self, selector: &str, max_wait_ms: u64) -> Result<()> {
        let deadline = Instant::now() + Duration::from_millis(max_wait_ms);
        loop {
            if self.page.find_element(selector).await.is_ok() {
                return Ok(());
            }
            if Instant::now() >= deadline {
                bail!("timed out waiting for element '{selector}'");
            }
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
    }

    /// Close the page and drop the browser handle.
    pub async fn close(self) -> Result<()> {
        let _ = self.page.close().await;
        // Child process is reaped when the Browser handle drops.
        drop(self.browser);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore] // Requires Chromium to be installed
    async fn test_navigate_and_read_html() {
        let session = BrowserSession::launch(true).await.expect("launch failed");
        session
            .navigate("data:text/html,<h1>Hola</h1><p>Mundo</p>", 10_000)
            .await
            .expect("navigation failed");

        let text = session
            .eval("document.querySelector('h1').textContent")
            .await
            .expect("eval failed");
        assert_eq!(text.as_str().unwrap(), "Hola");

        let html = session.html().await.expect("html failed");
        assert!(html.contains("<p>Mundo</p>"));

        session.close().await.expect("close failed");
    }
}
