//! Test utilities: an in-memory browser serving fixture HTML.
//!
//! `MockBrowser` maps URLs to canned HTML (or to a navigation error) and
//! records every page session it opens and closes, so tests can assert on
//! how many renders a component triggered. Clicking follows the `href` of the
//! clicked element within the same fixture set.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::dom::Dom;
use crate::error::AppError;
use crate::traits::{Browser, PageSession};
use crate::util::resolve_url;

// ---------------------------------------------------------------------------
// MockBrowser
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
pub struct MockBrowser {
    /// URL → HTML, or URL → error message.
    pages: Arc<Mutex<HashMap<String, Result<String, String>>>>,
    opened: Arc<Mutex<Vec<String>>>,
    /// Every URL loaded, by `open` or `goto`.
    navigations: Arc<Mutex<Vec<String>>>,
    closed: Arc<AtomicUsize>,
    delay: Option<Duration>,
    content_delay: Option<Duration>,
}

impl MockBrowser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(self, url: &str, html: &str) -> Self {
        self.pages
            .lock()
            .unwrap()
            .insert(url.to_string(), Ok(html.to_string()));
        self
    }

    pub fn with_error(self, url: &str, message: &str) -> Self {
        self.pages
            .lock()
            .unwrap()
            .insert(url.to_string(), Err(message.to_string()));
        self
    }

    /// Every `open` sleeps for `delay` first (simulates a slow site). A delay
    /// longer than the navigation timeout fails the open like a real driver.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Every `content` read sleeps for `delay` first (simulates a page that
    /// never finishes rendering).
    pub fn with_content_delay(mut self, delay: Duration) -> Self {
        self.content_delay = Some(delay);
        self
    }

    /// Number of page sessions opened so far.
    pub fn open_count(&self) -> usize {
        self.opened.lock().unwrap().len()
    }

    /// Number of page sessions closed so far.
    pub fn close_count(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn navigated_urls(&self) -> Vec<String> {
        self.navigations.lock().unwrap().clone()
    }

    fn lookup(&self, url: &str) -> Result<String, AppError> {
        self.navigations.lock().unwrap().push(url.to_string());
        match self.pages.lock().unwrap().get(url) {
            Some(Ok(html)) => Ok(html.clone()),
            Some(Err(message)) => Err(AppError::BrowserError(message.clone())),
            None => Err(AppError::BrowserError(format!(
                "net::ERR_NAME_NOT_RESOLVED at {url}"
            ))),
        }
    }
}

impl Browser for MockBrowser {
    type Page = MockPage;

    async fn open(&self, url: &str, timeout: Duration) -> Result<MockPage, AppError> {
        self.opened.lock().unwrap().push(url.to_string());
        if let Some(delay) = self.delay {
            if delay > timeout {
                tokio::time::sleep(timeout).await;
                return Err(AppError::Timeout(timeout.as_secs()));
            }
            tokio::time::sleep(delay).await;
        }
        let html = self.lookup(url)?;
        Ok(MockPage {
            url: url.to_string(),
            html,
            browser: self.clone(),
        })
    }
}

// ---------------------------------------------------------------------------
// MockPage
// ---------------------------------------------------------------------------

pub struct MockPage {
    url: String,
    html: String,
    browser: MockBrowser,
}

impl PageSession for MockPage {
    async fn current_url(&self) -> Result<String, AppError> {
        Ok(self.url.clone())
    }

    async fn goto(&mut self, url: &str, _timeout: Duration) -> Result<(), AppError> {
        self.html = self.browser.lookup(url)?;
        self.url = url.to_string();
        Ok(())
    }

    async fn content(&self) -> Result<String, AppError> {
        if let Some(delay) = self.browser.content_delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.html.clone())
    }

    async fn wait_for_selector(
        &self,
        selector: &str,
        _timeout: Duration,
    ) -> Result<bool, AppError> {
        Ok(Dom::parse(&self.html).count(selector) > 0)
    }

    async fn click(&mut self, selector: &str, index: usize) -> Result<(), AppError> {
        let href = Dom::parse(&self.html).nth_href(selector, index);
        let target = href
            .and_then(|h| resolve_url(&self.url, &h))
            .ok_or_else(|| AppError::Unsupported(format!("{selector}[{index}] has no link")))?;
        self.goto(&target, Duration::from_secs(5)).await
    }

    async fn settle(&self, _timeout: Duration) -> Result<(), AppError> {
        Ok(())
    }

    async fn close(self) {
        self.browser.closed.fetch_add(1, Ordering::SeqCst);
    }
}
