use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chromiumoxide::{Browser as Chromium, BrowserConfig, Page};
use futures::StreamExt;
use jobscout_core::error::AppError;
use jobscout_core::traits::{Browser, PageSession};

use crate::guard::check_url;

/// How often `wait_for_selector` re-queries the DOM.
const POLL_INTERVAL: Duration = Duration::from_millis(250);
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Headless-Chromium driver over the Chrome DevTools Protocol.
///
/// Unlike [`crate::HttpBrowser`], pages are fully rendered, so single-page
/// job boards (LinkedIn, Ashby, Workday) show their job cards and
/// script-driven "next" buttons can be clicked.
///
/// A single Chromium process is shared across all clones of this struct;
/// each [`Browser::open`] call opens a new tab that is closed again by
/// [`PageSession::close`].
///
/// # Example
///
/// ```rust,no_run
/// use std::time::Duration;
/// use jobscout_client::ChromiumBrowser;
/// use jobscout_core::traits::{Browser, PageSession};
///
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let browser = ChromiumBrowser::launch().await?;
/// let page = browser.open("https://example.com", Duration::from_secs(30)).await?;
/// let html = page.content().await?;
/// println!("{}", &html[..200]);
/// page.close().await;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ChromiumBrowser {
    browser: Arc<Chromium>,
    allow_private: bool,
}

impl ChromiumBrowser {
    /// Launch a headless Chromium.
    ///
    /// Requires a Chromium / Chrome binary reachable via `$CHROME_BIN`, one
    /// of the well-known install locations, or `$PATH`.
    pub async fn launch() -> Result<Self, AppError> {
        let mut builder = BrowserConfig::builder().no_sandbox().disable_default_args();

        // The snap wrapper rejects standard Chrome flags; prefer the real binary.
        if let Some(bin) = Self::find_chrome_binary() {
            tracing::info!(binary = %bin.display(), "Using Chrome binary");
            builder = builder.chrome_executable(bin);
        }

        let config = builder
            .arg("--headless=new")
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--disable-popup-blocking")
            .arg("--no-first-run")
            .build()
            .map_err(|e| AppError::BrowserError(format!("Browser config error: {e}")))?;

        let (browser, mut handler) = Chromium::launch(config)
            .await
            .map_err(|e| AppError::BrowserError(format!("Failed to launch browser: {e}")))?;

        // The CDP handler must be polled continuously for the connection to work.
        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::warn!(error = %e, "Browser CDP handler error");
                    break;
                }
            }
        });

        Ok(Self {
            browser: Arc::new(browser),
            allow_private: false,
        })
    }

    /// Allow pages on private/reserved IPs (local testing).
    pub fn allow_private_urls(mut self) -> Self {
        self.allow_private = true;
        self
    }

    /// Locate a real Chrome/Chromium binary, honouring `$CHROME_BIN`.
    /// `None` lets chromiumoxide do its own lookup.
    fn find_chrome_binary() -> Option<PathBuf> {
        if let Ok(p) = std::env::var("CHROME_BIN") {
            let path = PathBuf::from(p);
            if path.exists() {
                return Some(path);
            }
        }

        [
            "/snap/chromium/current/usr/lib/chromium-browser/chrome",
            "/var/lib/flatpak/exports/bin/org.chromium.Chromium",
            "/usr/bin/google-chrome-stable",
            "/usr/bin/google-chrome",
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
        ]
        .iter()
        .map(PathBuf::from)
        .find(|p| p.exists())
    }
}

impl Browser for ChromiumBrowser {
    type Page = ChromiumPage;

    async fn open(&self, url: &str, timeout: Duration) -> Result<ChromiumPage, AppError> {
        check_url(url, self.allow_private).await?;

        let page = tokio::time::timeout(timeout, self.browser.new_page(url))
            .await
            .map_err(|_| AppError::Timeout(timeout.as_secs()))?
            .map_err(|e| AppError::BrowserError(format!("Failed to navigate to {url}: {e}")))?;

        Ok(ChromiumPage {
            page,
            allow_private: self.allow_private,
        })
    }
}

/// One Chromium tab.
pub struct ChromiumPage {
    page: Page,
    allow_private: bool,
}

impl PageSession for ChromiumPage {
    async fn current_url(&self) -> Result<String, AppError> {
        self.page
            .url()
            .await
            .map_err(|e| AppError::BrowserError(format!("Failed to read page URL: {e}")))?
            .ok_or_else(|| AppError::BrowserError("Page has no URL".into()))
    }

    async fn goto(&mut self, url: &str, timeout: Duration) -> Result<(), AppError> {
        check_url(url, self.allow_private).await?;
        tokio::time::timeout(timeout, self.page.goto(url))
            .await
            .map_err(|_| AppError::Timeout(timeout.as_secs()))?
            .map_err(|e| AppError::BrowserError(format!("Failed to navigate to {url}: {e}")))?;
        Ok(())
    }

    async fn content(&self) -> Result<String, AppError> {
        self.page
            .content()
            .await
            .map_err(|e| AppError::BrowserError(format!("Failed to read page content: {e}")))
    }

    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> Result<bool, AppError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.page.find_element(selector).await.is_ok() {
                return Ok(true);
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn click(&mut self, selector: &str, index: usize) -> Result<(), AppError> {
        let elements = self
            .page
            .find_elements(selector)
            .await
            .map_err(|e| AppError::BrowserError(format!("Failed to query {selector}: {e}")))?;
        let element = elements.get(index).ok_or_else(|| {
            AppError::BrowserError(format!("No element {selector}[{index}] to click"))
        })?;
        element
            .click()
            .await
            .map_err(|e| {
                AppError::BrowserError(format!("Failed to click {selector}[{index}]: {e}"))
            })?;
        Ok(())
    }

    async fn settle(&self, timeout: Duration) -> Result<(), AppError> {
        match tokio::time::timeout(timeout, self.page.wait_for_navigation()).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(AppError::BrowserError(format!("Page did not settle: {e}"))),
            Err(_) => Err(AppError::Timeout(timeout.as_secs())),
        }
    }

    async fn close(self) {
        match tokio::time::timeout(CLOSE_TIMEOUT, self.page.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::debug!(error = %e, "Failed to close tab"),
            Err(_) => tracing::warn!("Timed out closing tab"),
        }
    }
}
