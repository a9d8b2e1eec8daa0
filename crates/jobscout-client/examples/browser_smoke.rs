/// Smoke-test for `ChromiumBrowser`.
///
/// Launches a headless Chromium, renders and classifies
/// <https://example.com>, and checks the rendered page made it through.
///
/// Run with:
///   cargo run -p jobscout-client --example browser_smoke --features browser
use std::sync::Arc;
use std::time::Duration;

use jobscout_client::ChromiumBrowser;
use jobscout_core::classifier::UrlClassifier;
use jobscout_core::traits::{Browser, PageSession};
use jobscout_core::{Cache, OperationMonitor, UrlKind};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    println!("Launching headless browser…");
    let browser = ChromiumBrowser::launch().await?;

    let url = "https://example.com";
    let page = browser.open(url, Duration::from_secs(30)).await?;
    let html = page.content().await?;
    page.close().await;
    assert!(
        html.contains("Example Domain"),
        "Expected heading not found in rendered HTML"
    );
    println!("OK: got {} bytes of rendered HTML", html.len());

    let monitor = Arc::new(OperationMonitor::new());
    let classifier = UrlClassifier::new(browser, Arc::new(Cache::new()), Arc::clone(&monitor));
    let analysis = classifier.classify(url).await;
    assert_eq!(analysis.kind, UrlKind::NotRelevant, "{}", analysis.reason);
    println!("Classified {url} as {} ({:.2})", analysis.kind, analysis.confidence);

    monitor.log_summary();
    Ok(())
}
