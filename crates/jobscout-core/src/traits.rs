use std::future::Future;
use std::time::Duration;

use crate::error::AppError;
use crate::models::DiscoveredJob;

/// Opens independent page sessions on some rendering engine.
///
/// Each call to [`Browser::open`] must hand back a session that owns its own
/// navigation state, so concurrent workers never share a tab.
pub trait Browser: Send + Sync + Clone + 'static {
    type Page: PageSession + Sync;

    /// Open a new page and navigate it to `url`.
    ///
    /// Navigation must give up with an error after `timeout`. Drivers that
    /// wait for admission first (rate limiting) do so before the timeout
    /// starts.
    fn open(
        &self,
        url: &str,
        timeout: Duration,
    ) -> impl Future<Output = Result<Self::Page, AppError>> + Send;
}

/// A single open page.
///
/// Element queries and inner-text reads are performed on the HTML returned by
/// [`PageSession::content`]; the session itself only covers the operations
/// that touch the live page.
pub trait PageSession: Send {
    /// URL the page is currently showing (after redirects/clicks).
    fn current_url(&self) -> impl Future<Output = Result<String, AppError>> + Send;

    /// Navigate this session to another URL.
    fn goto(
        &mut self,
        url: &str,
        timeout: Duration,
    ) -> impl Future<Output = Result<(), AppError>> + Send;

    /// The rendered DOM serialised as HTML.
    fn content(&self) -> impl Future<Output = Result<String, AppError>> + Send;

    /// Wait until at least one element matches `selector`.
    ///
    /// Returns `Ok(false)` when the timeout elapses without a match.
    fn wait_for_selector(
        &self,
        selector: &str,
        timeout: Duration,
    ) -> impl Future<Output = Result<bool, AppError>> + Send;

    /// Click the `index`-th element (document order) matching `selector`.
    fn click(
        &mut self,
        selector: &str,
        index: usize,
    ) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Wait for the page to settle after a transition.
    fn settle(&self, timeout: Duration) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Release the session.
    fn close(self) -> impl Future<Output = ()> + Send;
}

/// Receives the validated jobs of a batch for persistence.
pub trait JobSink: Send + Sync {
    fn store(&mut self, jobs: &[DiscoveredJob]) -> Result<usize, AppError>;
}

/// Slack on top of settling before reading a page is abandoned.
const RENDER_GRACE: Duration = Duration::from_secs(5);

/// Open `url`, wait `settle_delay`, read the rendered HTML, and close the page.
///
/// Navigation is bounded by `navigation_timeout` through the driver; the
/// settle and the read together get `settle_delay` plus a few seconds. A
/// page that was opened is always closed, even when reading it runs out of
/// time.
pub async fn render_html<B: Browser>(
    browser: &B,
    url: &str,
    navigation_timeout: Duration,
    settle_delay: Duration,
) -> Result<String, AppError> {
    let page = browser.open(url, navigation_timeout).await?;

    let budget = settle_delay + RENDER_GRACE;
    let html = tokio::time::timeout(budget, async {
        tokio::time::sleep(settle_delay).await;
        page.content().await
    })
    .await;
    page.close().await;

    html.map_err(|_| AppError::Timeout(budget.as_secs()))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::MockBrowser;

    const URL: &str = "https://acme.test/jobs/1";

    #[tokio::test(start_paused = true)]
    async fn render_returns_html_and_closes_the_page() {
        let browser = MockBrowser::new().with_page(URL, "<html><body>hi</body></html>");
        let html = render_html(&browser, URL, Duration::from_secs(20), Duration::from_secs(2))
            .await
            .unwrap();
        assert!(html.contains("hi"));
        assert_eq!(browser.close_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_navigation_gives_up_at_the_navigation_timeout() {
        let browser = MockBrowser::new()
            .with_page(URL, "<html></html>")
            .with_delay(Duration::from_secs(600));
        let start = tokio::time::Instant::now();
        let err = render_html(&browser, URL, Duration::from_secs(20), Duration::from_secs(2))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Timeout(20)));
        assert!(start.elapsed() < Duration::from_secs(21));
        assert_eq!(browser.close_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limit_wait_is_not_charged_to_the_render() {
        use crate::throttle::{RateLimitedBrowser, RateLimiter};

        let inner = MockBrowser::new().with_page(URL, "<html><body>hi</body></html>");
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        let browser = RateLimitedBrowser::new(inner.clone(), limiter);
        render_html(&browser, URL, Duration::from_secs(20), Duration::ZERO)
            .await
            .unwrap();

        let html = render_html(&browser, URL, Duration::from_secs(20), Duration::ZERO)
            .await
            .unwrap();
        assert!(html.contains("hi"));
        assert_eq!(inner.close_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_content_still_closes_the_page() {
        let browser = MockBrowser::new()
            .with_page(URL, "<html></html>")
            .with_content_delay(Duration::from_secs(600));
        let err = render_html(&browser, URL, Duration::from_secs(20), Duration::ZERO)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Timeout(5)));
        assert_eq!(browser.open_count(), 1);
        assert_eq!(browser.close_count(), 1);
    }
}
