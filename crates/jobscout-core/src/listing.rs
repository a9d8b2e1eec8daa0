//! Job-card extraction from listing pages, with pagination.
//!
//! A listing is rendered once, then walked page by page: each page's job
//! cards are read from an HTML snapshot using the selector profile of the
//! detected platform, and the "next" control is followed until there is
//! none, it is disabled, it leads back to a page already seen, or enough
//! candidates were collected.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use scraper::ElementRef;

use crate::dom::{Dom, element_text, is_disabled, parse_selector};
use crate::error::AppError;
use crate::models::JobCandidate;
use crate::monitor::OperationMonitor;
use crate::traits::{Browser, PageSession};
use crate::util::{normalize_url, resolve_url, truncate_chars};

/// CSS selectors locating job cards and their fields on one platform.
#[derive(Debug, Clone, Copy)]
pub struct PlatformProfile {
    pub job_card: &'static str,
    /// Searched inside each card.
    pub job_link: &'static str,
    pub title: &'static str,
    pub company: &'static str,
    pub location: &'static str,
    pub next_page: &'static str,
    /// Also treat any link or button reading "Next" as the next control.
    pub next_by_text: bool,
}

const LINKEDIN: PlatformProfile = PlatformProfile {
    job_card: "[data-job-id], .job-search-card, .jobs-search-results__list-item",
    job_link: "a[data-job-id], .job-search-card__link-wrapper, a[href*='/jobs/view/']",
    title: "h3, .job-search-card__title, .sr-only",
    company: "h4, .job-search-card__subtitle-primary a, .job-search-card__subtitle",
    location: ".job-search-card__location",
    next_page: "button[aria-label*='next'], button[aria-label*='Next'], .artdeco-pagination__button--next",
    next_by_text: false,
};

const INDEED: PlatformProfile = PlatformProfile {
    job_card: "[data-jk], .job_seen_beacon, .slider_container .slider_item",
    job_link: "a[data-jk], .jobTitle a, h2 a",
    title: ".jobTitle span, h2 span[data-testid='job-title']",
    company: ".companyName, [data-testid='company-name']",
    location: ".companyLocation, [data-testid='job-location'], [data-testid='text-location']",
    next_page: "a[aria-label='Next Page'], [aria-label='Next'], a[data-testid='pagination-page-next']",
    next_by_text: false,
};

const GLASSDOOR: PlatformProfile = PlatformProfile {
    job_card: "[data-test='job-listing'], .react-job-listing",
    job_link: "a[data-test='job-title'], a[data-test='job-link'], .jobLink",
    title: "[data-test='job-title'], .jobLink",
    company: "[data-test='employer-name'], .employerName",
    location: "[data-test='job-location'], .loc",
    next_page: "button[data-test='pagination-next'], .next",
    next_by_text: false,
};

const ANGEL: PlatformProfile = PlatformProfile {
    job_card: "[data-test='JobSearchResult'], .job-listing",
    job_link: "a[data-test='job-title-link'], .job-title a, a[href*='/jobs/']",
    title: "[data-test='job-title-link'], .job-title",
    company: "[data-test='company-name'], .company-name",
    location: "[data-test='job-location'], .location",
    next_page: "[data-test='pagination-next'], .next-page",
    next_by_text: false,
};

const GREENHOUSE: PlatformProfile = PlatformProfile {
    job_card: ".opening, tr.job-post",
    job_link: "a",
    title: "a, p.body--medium",
    company: ".company-name",
    location: ".location, p.body--metadata",
    next_page: ".next, button[aria-label='Next page']",
    next_by_text: false,
};

const LEVER: PlatformProfile = PlatformProfile {
    job_card: ".posting",
    job_link: "a.posting-title, a",
    title: ".posting-title h5, .posting-title, a",
    company: ".company-name",
    location: ".location, .posting-categories .location",
    next_page: ".next",
    next_by_text: false,
};

const GENERIC: PlatformProfile = PlatformProfile {
    job_card: "[class*='job'], [class*='posting'], [class*='opening'], [class*='position'], [class*='listing']",
    job_link: "a[href*='job'], a[href*='career'], a[href*='position'], a[href*='opening']",
    title: "h1, h2, h3, h4, .title, [class*='title']",
    company: ".company, [class*='company'], [class*='employer']",
    location: ".location, [class*='location'], [class*='loc']",
    next_page: "[rel='next'], [class*='next'], [class*='pagination'] a:last-child",
    next_by_text: true,
};

/// Platforms with a dedicated selector profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListingPlatform {
    Linkedin,
    Indeed,
    Glassdoor,
    Angel,
    Greenhouse,
    Lever,
    Generic,
}

impl ListingPlatform {
    /// Detect the platform by URL substring.
    pub fn detect(url: &str) -> Self {
        let url = url.to_lowercase();
        if url.contains("linkedin.com") {
            Self::Linkedin
        } else if url.contains("indeed.com") {
            Self::Indeed
        } else if url.contains("glassdoor.com") {
            Self::Glassdoor
        } else if url.contains("angel.co") || url.contains("wellfound.com") {
            Self::Angel
        } else if url.contains("greenhouse.io") {
            Self::Greenhouse
        } else if url.contains("lever.co") {
            Self::Lever
        } else {
            Self::Generic
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Linkedin => "linkedin",
            Self::Indeed => "indeed",
            Self::Glassdoor => "glassdoor",
            Self::Angel => "angel",
            Self::Greenhouse => "greenhouse",
            Self::Lever => "lever",
            Self::Generic => "generic",
        }
    }

    pub fn profile(&self) -> &'static PlatformProfile {
        match self {
            Self::Linkedin => &LINKEDIN,
            Self::Indeed => &INDEED,
            Self::Glassdoor => &GLASSDOOR,
            Self::Angel => &ANGEL,
            Self::Greenhouse => &GREENHOUSE,
            Self::Lever => &LEVER,
            Self::Generic => &GENERIC,
        }
    }
}

/// Cookie/consent buttons, by CSS.
const COOKIE_SELECTORS: &[&str] = &[
    "[data-test='accept-cookies']",
    "#onetrust-accept-btn-handler",
    ".cookie-banner button",
];

/// Cookie/consent buttons, by label.
const COOKIE_BUTTON_LABELS: &[&str] = &["accept", "allow all", "agree"];

/// Tunables for [`ListingExtractor`].
#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    pub navigation_timeout: Duration,
    /// How long to wait for the first job card on each page.
    pub card_wait_timeout: Duration,
    /// How long to wait for a page transition to settle.
    pub settle_timeout: Duration,
    /// Extra pause after settling, for late-loading content.
    pub settle_delay: Duration,
    pub max_cards_per_page: usize,
    pub snippet_chars: usize,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            navigation_timeout: Duration::from_secs(30),
            card_wait_timeout: Duration::from_secs(10),
            settle_timeout: Duration::from_secs(15),
            settle_delay: Duration::from_secs(2),
            max_cards_per_page: 50,
            snippet_chars: 200,
        }
    }
}

/// Extracts [`JobCandidate`]s from listing and careers pages.
#[derive(Clone)]
pub struct ListingExtractor<B: Browser> {
    browser: B,
    monitor: Arc<OperationMonitor>,
    config: ExtractorConfig,
}

impl<B: Browser> ListingExtractor<B> {
    pub fn new(browser: B, monitor: Arc<OperationMonitor>) -> Self {
        Self::with_config(browser, monitor, ExtractorConfig::default())
    }

    pub fn with_config(
        browser: B,
        monitor: Arc<OperationMonitor>,
        config: ExtractorConfig,
    ) -> Self {
        Self {
            browser,
            monitor,
            config,
        }
    }

    /// Collect up to `max_jobs` unique candidates from at most `max_pages`
    /// pages of the listing at `url`. Failures yield an empty list.
    pub async fn extract(&self, url: &str, max_jobs: usize, max_pages: usize) -> Vec<JobCandidate> {
        if max_jobs == 0 {
            return Vec::new();
        }
        let platform = ListingPlatform::detect(url);
        tracing::info!(%url, platform = platform.as_str(), "Extracting jobs from listing");

        let crawl = self.crawl(url, platform, max_jobs, max_pages.max(1));
        match self.monitor.track("extract_jobs_from_listing", crawl).await {
            Ok(jobs) => {
                tracing::info!(
                    %url,
                    platform = platform.as_str(),
                    count = jobs.len(),
                    "Listing extraction complete"
                );
                jobs
            }
            Err(e) => {
                tracing::warn!(%url, error = %e, "Listing extraction failed");
                Vec::new()
            }
        }
    }

    async fn crawl(
        &self,
        url: &str,
        platform: ListingPlatform,
        max_jobs: usize,
        max_pages: usize,
    ) -> Result<Vec<JobCandidate>, AppError> {
        let mut page = self
            .browser
            .open(url, self.config.navigation_timeout)
            .await?;
        let result = self
            .crawl_pages(&mut page, platform, max_jobs, max_pages)
            .await;
        page.close().await;
        result
    }

    async fn crawl_pages(
        &self,
        page: &mut B::Page,
        platform: ListingPlatform,
        max_jobs: usize,
        max_pages: usize,
    ) -> Result<Vec<JobCandidate>, AppError> {
        let profile = platform.profile();
        self.dismiss_cookie_banner(page).await;

        let mut found = CandidateSet::new(max_jobs);
        let mut current = page.current_url().await?;
        let mut visited = HashSet::from([normalize_url(&current)]);
        self.collect_page(page, platform, &current, &mut found)
            .await?;

        for page_num in 1..max_pages {
            if found.is_full() {
                break;
            }
            match self.next_page(page, profile, &current, &visited).await {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) => {
                    tracing::warn!(page = page_num, error = %e, "Pagination failed");
                    break;
                }
            }

            let url = match page.current_url().await {
                Ok(url) => url,
                Err(e) => {
                    tracing::warn!(page = page_num, error = %e, "Pagination failed");
                    break;
                }
            };
            if !visited.insert(normalize_url(&url)) {
                tracing::info!(page = page_num, %url, "Same URL after pagination, stopping");
                break;
            }
            current = url;
            if let Err(e) = self.collect_page(page, platform, &current, &mut found).await {
                tracing::warn!(url = %current, error = %e, "Failed to read listing page");
                break;
            }
        }

        Ok(found.into_vec())
    }

    /// Move `page` to the next page of results. `Ok(false)` means there is
    /// nowhere to go.
    async fn next_page(
        &self,
        page: &mut B::Page,
        profile: &PlatformProfile,
        current: &str,
        visited: &HashSet<String>,
    ) -> Result<bool, AppError> {
        let html = page.content().await?;
        match find_next_control(&html, profile, current) {
            NextControl::Missing => {
                tracing::info!(url = %current, "No next control found, stopping");
                return Ok(false);
            }
            NextControl::Disabled => {
                tracing::info!(url = %current, "Next control disabled, stopping");
                return Ok(false);
            }
            NextControl::Link(target) => {
                if visited.contains(&normalize_url(&target)) {
                    tracing::info!(%target, "Next page already visited, stopping");
                    return Ok(false);
                }
                page.goto(&target, self.config.navigation_timeout).await?;
            }
            NextControl::Click { selector, index } => {
                page.click(&selector, index).await?;
            }
        }

        if let Err(e) = page.settle(self.config.settle_timeout).await {
            tracing::debug!(error = %e, "Page did not settle after pagination");
        }
        tokio::time::sleep(self.config.settle_delay).await;
        Ok(true)
    }

    async fn collect_page(
        &self,
        page: &mut B::Page,
        platform: ListingPlatform,
        page_url: &str,
        found: &mut CandidateSet,
    ) -> Result<(), AppError> {
        let profile = platform.profile();
        match page
            .wait_for_selector(profile.job_card, self.config.card_wait_timeout)
            .await
        {
            Ok(true) => {}
            Ok(false) => tracing::debug!(url = %page_url, "No job cards appeared"),
            Err(e) => tracing::debug!(url = %page_url, error = %e, "Waiting for job cards failed"),
        }

        let html = page.content().await?;
        let candidates = extract_cards(&html, platform, page_url, &self.config);
        tracing::info!(
            url = %page_url,
            platform = platform.as_str(),
            count = candidates.len(),
            "Extracted job cards"
        );
        found.extend(candidates);
        Ok(())
    }

    /// Click the first cookie/consent button, if any. Best-effort.
    async fn dismiss_cookie_banner(&self, page: &mut B::Page) {
        let Ok(html) = page.content().await else {
            return;
        };
        let Some((selector, index)) = find_cookie_button(&html) else {
            return;
        };
        match page.click(&selector, index).await {
            Ok(()) => {
                tracing::debug!(%selector, "Dismissed cookie banner");
                if let Err(e) = page.settle(Duration::from_secs(1)).await {
                    tracing::debug!(error = %e, "Page did not settle after cookie banner");
                }
            }
            Err(e) => tracing::debug!(%selector, error = %e, "Could not dismiss cookie banner"),
        }
    }
}

/// Unique candidates in discovery order, up to a cap.
struct CandidateSet {
    max: usize,
    seen: HashSet<String>,
    items: Vec<JobCandidate>,
}

impl CandidateSet {
    fn new(max: usize) -> Self {
        Self {
            max,
            seen: HashSet::new(),
            items: Vec::new(),
        }
    }

    fn is_full(&self) -> bool {
        self.items.len() >= self.max
    }

    fn extend(&mut self, candidates: Vec<JobCandidate>) {
        for candidate in candidates {
            if self.is_full() {
                break;
            }
            if self.seen.insert(normalize_url(&candidate.url)) {
                self.items.push(candidate);
            }
        }
    }

    fn into_vec(self) -> Vec<JobCandidate> {
        self.items
    }
}

/// Read the job cards of one page snapshot.
pub fn extract_cards(
    html: &str,
    platform: ListingPlatform,
    page_url: &str,
    config: &ExtractorConfig,
) -> Vec<JobCandidate> {
    let profile = platform.profile();
    let dom = Dom::parse(html);
    let (Some(card_sel), Some(link_sel)) = (
        parse_selector(profile.job_card),
        parse_selector(profile.job_link),
    ) else {
        return Vec::new();
    };

    dom.html()
        .select(&card_sel)
        .take(config.max_cards_per_page)
        .filter_map(|card| {
            let href = card
                .select(&link_sel)
                .find_map(|a| a.value().attr("href"))?;
            let url = resolve_url(page_url, href)?;
            let snippet = truncate_chars(&element_text(card), config.snippet_chars);
            Some(JobCandidate {
                url,
                title: card_field(card, profile.title),
                company: card_field(card, profile.company),
                location: card_field(card, profile.location),
                snippet: snippet.trim().to_string(),
                platform: platform.as_str().to_string(),
            })
        })
        .collect()
}

/// Text of the first non-empty element under `card` matching `selector`.
fn card_field(card: ElementRef<'_>, selector: &str) -> String {
    parse_selector(selector)
        .and_then(|sel| {
            card.select(&sel)
                .map(element_text)
                .find(|text| !text.is_empty())
        })
        .unwrap_or_default()
}

/// How to reach the next page of results.
#[derive(Debug, Clone, PartialEq)]
pub enum NextControl {
    Missing,
    Disabled,
    /// Navigate to this absolute URL.
    Link(String),
    /// Click the `index`-th element matching `selector`.
    Click { selector: String, index: usize },
}

const NEXT_BY_TEXT: &str = "a, button";

/// Locate the next-page control in a page snapshot.
pub fn find_next_control(html: &str, profile: &PlatformProfile, page_url: &str) -> NextControl {
    let dom = Dom::parse(html);

    let by_text = if profile.next_by_text {
        dom.position_with_text(NEXT_BY_TEXT, "next")
            .map(|index| (NEXT_BY_TEXT, index))
    } else {
        None
    };
    let Some((selector, index)) = by_text.or_else(|| {
        (dom.count(profile.next_page) > 0).then_some((profile.next_page, 0))
    }) else {
        return NextControl::Missing;
    };

    let Some(control) = parse_selector(selector).and_then(|sel| dom.html().select(&sel).nth(index))
    else {
        return NextControl::Missing;
    };
    if is_disabled(control) {
        return NextControl::Disabled;
    }
    match control
        .value()
        .attr("href")
        .and_then(|href| resolve_url(page_url, href))
    {
        Some(target) => NextControl::Link(target),
        None => NextControl::Click {
            selector: selector.to_string(),
            index,
        },
    }
}

/// Locate a cookie/consent button in a page snapshot.
fn find_cookie_button(html: &str) -> Option<(String, usize)> {
    let dom = Dom::parse(html);
    COOKIE_SELECTORS
        .iter()
        .find(|sel| dom.count(sel) > 0)
        .map(|sel| (sel.to_string(), 0))
        .or_else(|| {
            COOKIE_BUTTON_LABELS.iter().find_map(|label| {
                dom.position_with_text("button", label)
                    .map(|index| ("button".to_string(), index))
            })
        })
}
