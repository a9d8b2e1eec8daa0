use std::time::Duration;

use jobscout_core::dom::Dom;
use jobscout_core::error::AppError;
use jobscout_core::traits::{Browser, PageSession};
use jobscout_core::util::resolve_url;
use reqwest::Client;

use crate::guard::check_url;

const USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36 jobscout/0.1";

/// Static-HTML driver using reqwest.
///
/// Pages are downloaded, not rendered: no JavaScript runs, so content built
/// client-side is invisible and clicks only work on controls that carry an
/// `href`. Good enough for ATS boards that serve server-side HTML
/// (Greenhouse, Lever) and for tests against fixtures.
///
/// Requests to private/reserved addresses are rejected unless
/// [`allow_private_urls`](Self::allow_private_urls) is set.
#[derive(Clone)]
pub struct HttpBrowser {
    client: Client,
    allow_private: bool,
}

impl HttpBrowser {
    pub fn new() -> Result<Self, AppError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| AppError::HttpError(e.to_string()))?;

        Ok(Self {
            client,
            allow_private: false,
        })
    }

    /// Allow pages on private/reserved IPs (local testing).
    pub fn allow_private_urls(mut self) -> Self {
        self.allow_private = true;
        self
    }

    /// GET `url`, following redirects. Returns the final URL and the body.
    async fn load(&self, url: &str, timeout: Duration) -> Result<(String, String), AppError> {
        check_url(url, self.allow_private).await?;

        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AppError::Timeout(timeout.as_secs())
                } else if e.is_connect() {
                    AppError::NetworkError(format!("Connection failed: {e}"))
                } else {
                    AppError::HttpError(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::HttpError(format!(
                "HTTP {} for {}",
                status.as_u16(),
                url
            )));
        }

        let final_url = response.url().to_string();
        let body = response
            .text()
            .await
            .map_err(|e| AppError::HttpError(format!("Failed to read response body: {e}")))?;
        tracing::debug!(%url, %final_url, bytes = body.len(), "Page downloaded");
        Ok((final_url, body))
    }
}

impl Browser for HttpBrowser {
    type Page = HttpPage;

    async fn open(&self, url: &str, timeout: Duration) -> Result<HttpPage, AppError> {
        let (url, html) = self.load(url, timeout).await?;
        Ok(HttpPage {
            browser: self.clone(),
            url,
            html,
        })
    }
}

/// A downloaded page.
pub struct HttpPage {
    browser: HttpBrowser,
    url: String,
    html: String,
}

impl PageSession for HttpPage {
    async fn current_url(&self) -> Result<String, AppError> {
        Ok(self.url.clone())
    }

    async fn goto(&mut self, url: &str, timeout: Duration) -> Result<(), AppError> {
        let (url, html) = self.browser.load(url, timeout).await?;
        self.url = url;
        self.html = html;
        Ok(())
    }

    async fn content(&self) -> Result<String, AppError> {
        Ok(self.html.clone())
    }

    /// Static HTML never changes, so this answers immediately.
    async fn wait_for_selector(
        &self,
        selector: &str,
        _timeout: Duration,
    ) -> Result<bool, AppError> {
        Ok(Dom::parse(&self.html).count(selector) > 0)
    }

    async fn click(&mut self, selector: &str, index: usize) -> Result<(), AppError> {
        let target = Dom::parse(&self.html)
            .nth_href(selector, index)
            .and_then(|href| resolve_url(&self.url, &href));
        match target {
            Some(target) => self.goto(&target, Duration::from_secs(30)).await,
            None => Err(AppError::Unsupported(format!(
                "cannot click {selector}[{index}] without JavaScript"
            ))),
        }
    }

    async fn settle(&self, _timeout: Duration) -> Result<(), AppError> {
        Ok(())
    }

    async fn close(self) {}
}
