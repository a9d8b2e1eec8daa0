//! Liveness and validity checks for single job postings.
//!
//! A posting is rendered once and judged on two axes: whether it is still
//! open (liveness, from expired/active phrases and apply controls) and
//! whether the page looks like a real posting (a score built from the
//! metadata that could be extracted). Both feed the final confidence.

use std::sync::{Arc, LazyLock};
use std::time::Duration;

use regex::Regex;
use scraper::ElementRef;

use crate::dom::{Dom, element_text, parse_selector};
use crate::error::AppError;
use crate::models::{JobStatus, JobValidation, Metadata};
use crate::monitor::OperationMonitor;
use crate::traits::{Browser, render_html};
use crate::util::truncate_chars;

// ---------------------------------------------------------------------------
// Liveness tables
// ---------------------------------------------------------------------------

/// Expired-posting phrases of specific platforms, keyed by host fragment.
const PLATFORM_EXPIRED: &[(&str, &[&str])] = &[
    (
        "linkedin.com",
        &[
            "no longer accepting applications",
            "this job is no longer available",
            "job has expired",
        ],
    ),
    (
        "ashbyhq.com",
        &[
            "job not found",
            "this job is no longer available",
            "the job you requested was not found",
        ],
    ),
    (
        "lever.co",
        &[
            "this posting is closed",
            "the job posting you're looking for might have closed",
            "no longer open",
        ],
    ),
    (
        "greenhouse.io",
        &[
            "the job you are looking for is no longer open",
            "this job is no longer open",
            "job not found",
        ],
    ),
    (
        "startup.jobs",
        &["this job has expired", "this job is no longer available"],
    ),
];

const GENERIC_EXPIRED: &[&str] = &[
    "no longer accepting applications",
    "position has been filled",
    "job has been filled",
    "job is no longer available",
    "position is no longer available",
    "posting is no longer available",
    "position closed",
    "job has expired",
    "posting has expired",
    "listing has expired",
    "job has been removed",
    "posting has been removed",
    "job not found",
    "page not found",
    "404 not found",
];

/// Whole words only, so a requisition number like "14042" is not a 404.
static EXPIRED_TITLE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\b(?:page not found|not found|404|expired)\b").ok());

const ACTIVE_PHRASES: &[&str] = &[
    "apply now",
    "submit application",
    "apply for this position",
    "apply for this job",
    "apply online",
    "easy apply",
    "join our team",
    "we are hiring",
    "apply today",
];

const APPLY_CONTROLS: &[&str] = &[
    "[class*='apply']",
    "[data-test*='apply']",
    "input[value*='Apply']",
];

// ---------------------------------------------------------------------------
// Metadata tables
// ---------------------------------------------------------------------------

const TITLE_SELECTORS: &[&str] = &[
    "h1",
    "[data-test='job-title']",
    ".job-title",
    "[class*='job-title']",
    "[class*='position-title']",
    ".posting-headline h2",
    ".job-view-job-title",
];

const COMPANY_SELECTORS: &[&str] = &[
    "[data-test='company-name']",
    ".company-name",
    "[class*='company']",
    "[class*='employer']",
    ".posting-company h2",
    ".job-view-job-company",
];

const LOCATION_SELECTORS: &[&str] = &[
    "[data-test='job-location']",
    ".location",
    "[class*='location']",
    ".posting-categories .location",
];

const DESCRIPTION_SELECTORS: &[&str] = &[
    "[data-test='job-description']",
    ".job-description",
    "[class*='description']",
    ".posting-content",
    ".job-view-job-description",
    "[class*='job-details']",
];

const REQUIREMENT_KEYWORDS: &[&str] = &[
    "requirements",
    "qualifications",
    "must have",
    "skills",
    "experience",
];

/// Elements that can label a requirements section.
const SECTION_LABELS: &str = "h1, h2, h3, h4, h5, h6, strong, b, dt, label, p";

const ROLE_KEYWORDS: &[&str] = &[
    "developer",
    "engineer",
    "manager",
    "analyst",
    "designer",
    "specialist",
    "coordinator",
    "director",
    "lead",
    "senior",
    "junior",
    "intern",
];

const CONTENT_KEYWORDS: &[&str] = &[
    "responsibilities",
    "duties",
    "requirements",
    "qualifications",
    "experience",
    "skills",
    "benefits",
    "salary",
    "team",
    "role",
];

static SALARY_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)\$[\d,]+(?:\.\d+)?k?\s*[-–]\s*\$[\d,]+(?:\.\d+)?k?",
        r"(?i)\$[\d,]+k?\s*[-–]\s*\$?[\d,]+k?",
        r"(?i)[€£][\d,.]+k?\s*[-–]\s*[€£]?[\d,.]+k?",
        r"(?i)\d[\d,]*k?\s*[-–]\s*\d[\d,]*k?\s*(?:USD|EUR|GBP)",
        r"(?i)salary[^\d\n]{0,40}\d[\d,]*",
        r"(?i)compensation[^\d\n]{0,40}\d[\d,]*",
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
});

// ---------------------------------------------------------------------------
// Page inspection
// ---------------------------------------------------------------------------

/// Liveness verdict and its reason.
#[derive(Debug, Clone, PartialEq)]
pub struct Liveness {
    pub status: JobStatus,
    pub reason: String,
}

impl Liveness {
    fn active(reason: impl Into<String>) -> Self {
        Self {
            status: JobStatus::Active,
            reason: reason.into(),
        }
    }

    fn expired(reason: impl Into<String>) -> Self {
        Self {
            status: JobStatus::Expired,
            reason: reason.into(),
        }
    }
}

/// Fields scraped from a posting page. Empty when not found.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PostingMetadata {
    pub title: String,
    pub company: String,
    pub location: String,
    pub description: String,
    pub requirements: String,
    pub salary: String,
}

/// Content score of a posting and what contributed to it.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentScore {
    pub score: u32,
    pub reasons: Vec<String>,
}

/// Decide whether the posting at `url` is still open.
pub fn check_liveness(dom: &Dom, url: &str, min_text_chars: usize) -> Liveness {
    let text = dom.body_text().to_lowercase();
    let title = dom.title().to_lowercase();

    if text.chars().count() < min_text_chars {
        return Liveness::expired("Page has almost no content");
    }

    let url = url.to_lowercase();
    for (host, phrases) in PLATFORM_EXPIRED {
        if !url.contains(host) {
            continue;
        }
        if let Some(phrase) = phrases.iter().find(|p| text.contains(*p)) {
            return Liveness::expired(format!("Found platform indicator: {phrase}"));
        }
    }

    if let Some(phrase) = GENERIC_EXPIRED.iter().find(|p| text.contains(*p)) {
        return Liveness::expired(format!("Found indicator: {phrase}"));
    }
    if let Some(marker) = EXPIRED_TITLE.as_ref().and_then(|re| re.find(&title)) {
        return Liveness::expired(format!("Found title indicator: {}", marker.as_str()));
    }

    if let Some(phrase) = ACTIVE_PHRASES.iter().find(|p| text.contains(*p)) {
        return Liveness::active(format!("Found active indicator: {phrase}"));
    }
    let has_apply_control = dom.position_with_text("button, a", "apply").is_some()
        || APPLY_CONTROLS.iter().any(|sel| dom.count(sel) > 0);
    if has_apply_control {
        return Liveness::active("Found apply button");
    }

    Liveness::active("No expiration indicators found")
}

/// Scrape posting fields from a page.
pub fn extract_metadata(dom: &Dom, config: &ValidatorConfig) -> PostingMetadata {
    let any = |_: &str| true;
    let description = dom
        .first_text(DESCRIPTION_SELECTORS, |t| {
            t.chars().count() > config.min_description_chars
        })
        .map(|t| truncate_chars(&t, config.description_chars))
        .unwrap_or_default();

    PostingMetadata {
        title: dom.first_text(TITLE_SELECTORS, any).unwrap_or_default(),
        company: dom.first_text(COMPANY_SELECTORS, any).unwrap_or_default(),
        location: dom.first_text(LOCATION_SELECTORS, any).unwrap_or_default(),
        description,
        requirements: find_requirements(dom, config)
            .map(|t| truncate_chars(&t, config.requirements_chars))
            .unwrap_or_default(),
        salary: find_salary(&dom.body_text()).unwrap_or_default(),
    }
}

/// Locate a heading or label naming a requirements keyword and take the
/// first substantial block that follows it.
fn find_requirements(dom: &Dom, config: &ValidatorConfig) -> Option<String> {
    let body = dom.body_text().to_lowercase();
    let labels = parse_selector(SECTION_LABELS)?;

    for keyword in REQUIREMENT_KEYWORDS {
        if !body.contains(keyword) {
            continue;
        }
        let found = dom
            .html()
            .select(&labels)
            .filter(|el| {
                let text = element_text(*el).to_lowercase();
                text.len() <= 80 && text.contains(keyword)
            })
            .find_map(|label| {
                following_block(label, config.min_requirements_chars).or_else(|| {
                    label
                        .parent()
                        .and_then(ElementRef::wrap)
                        .and_then(|p| following_block(p, config.min_requirements_chars))
                })
            });
        if found.is_some() {
            return found;
        }
    }
    None
}

fn following_block(el: ElementRef<'_>, min_chars: usize) -> Option<String> {
    el.next_siblings()
        .filter_map(ElementRef::wrap)
        .map(element_text)
        .find(|text| text.chars().count() >= min_chars)
}

fn find_salary(text: &str) -> Option<String> {
    SALARY_PATTERNS
        .iter()
        .find_map(|re| re.find(text))
        .map(|m| m.as_str().trim().to_string())
}

/// Score how much a page looks like a real posting, out of 100.
pub fn score_content(meta: &PostingMetadata) -> ContentScore {
    let mut score = 0;
    let mut reasons = Vec::new();

    if !meta.title.is_empty() {
        score += 25;
        reasons.push("Has job title".to_string());
        let title = meta.title.to_lowercase();
        if ROLE_KEYWORDS.iter().any(|k| title.contains(k)) {
            score += 10;
            reasons.push("Title contains job keywords".to_string());
        }
    }
    if !meta.company.is_empty() {
        score += 20;
        reasons.push("Has company name".to_string());
    }
    if meta.description.chars().count() >= 200 {
        score += 25;
        reasons.push("Has substantial job description".to_string());
        let description = meta.description.to_lowercase();
        let matching = CONTENT_KEYWORDS
            .iter()
            .filter(|k| description.contains(*k))
            .count();
        if matching >= 3 {
            score += 15;
            reasons.push(format!("Description contains {matching} job-related keywords"));
        }
    }
    if !meta.requirements.is_empty() {
        score += 10;
        reasons.push("Has requirements section".to_string());
    }
    if !meta.location.is_empty() {
        score += 5;
        reasons.push("Has location".to_string());
    }
    if !meta.salary.is_empty() {
        score += 5;
        reasons.push("Has salary information".to_string());
    }

    ContentScore { score, reasons }
}

// ---------------------------------------------------------------------------
// Validator
// ---------------------------------------------------------------------------

/// Tunables for [`JobValidator`].
#[derive(Debug, Clone)]
pub struct ValidatorConfig {
    pub navigation_timeout: Duration,
    /// Pause after navigation for late-loading content.
    pub settle_delay: Duration,
    /// Pages with less visible text than this are treated as expired.
    pub min_text_chars: usize,
    /// Minimum content score for a posting to be valid.
    pub min_score: u32,
    pub active_discount: f64,
    pub inactive_discount: f64,
    pub min_description_chars: usize,
    /// Description kept while scoring.
    pub description_chars: usize,
    /// Description returned in the result.
    pub result_description_chars: usize,
    pub min_requirements_chars: usize,
    pub requirements_chars: usize,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            navigation_timeout: Duration::from_secs(20),
            settle_delay: Duration::from_secs(2),
            min_text_chars: 100,
            min_score: 60,
            active_discount: 0.9,
            inactive_discount: 0.3,
            min_description_chars: 100,
            description_chars: 1000,
            result_description_chars: 500,
            min_requirements_chars: 50,
            requirements_chars: 300,
        }
    }
}

/// Validates single job postings.
#[derive(Clone)]
pub struct JobValidator<B: Browser> {
    browser: B,
    monitor: Arc<OperationMonitor>,
    config: ValidatorConfig,
}

impl<B: Browser> JobValidator<B> {
    pub fn new(browser: B, monitor: Arc<OperationMonitor>) -> Self {
        Self::with_config(browser, monitor, ValidatorConfig::default())
    }

    pub fn with_config(
        browser: B,
        monitor: Arc<OperationMonitor>,
        config: ValidatorConfig,
    ) -> Self {
        Self {
            browser,
            monitor,
            config,
        }
    }

    /// Validate the posting at `url`. Never fails: rendering problems yield
    /// a [`JobStatus::Error`] result.
    pub async fn validate(&self, url: &str) -> JobValidation {
        tracing::info!(%url, "Validating job posting");
        match self
            .monitor
            .track("validate_job_posting", self.render(url))
            .await
        {
            Ok(html) => {
                let validation = self.assess(url, &html);
                tracing::info!(
                    %url,
                    status = %validation.status,
                    valid = validation.is_valid,
                    confidence = validation.confidence,
                    "Job posting validated"
                );
                validation
            }
            Err(e) => {
                tracing::warn!(%url, error = %e, "Job validation failed");
                JobValidation::failed(url, e.to_string())
            }
        }
    }

    async fn render(&self, url: &str) -> Result<String, AppError> {
        render_html(
            &self.browser,
            url,
            self.config.navigation_timeout,
            self.config.settle_delay,
        )
        .await
    }

    /// Judge a rendered posting.
    pub fn assess(&self, url: &str, html: &str) -> JobValidation {
        let dom = Dom::parse(html);
        let liveness = check_liveness(&dom, url, self.config.min_text_chars);
        let meta = extract_metadata(&dom, &self.config);
        let content = score_content(&meta);

        let active = liveness.status == JobStatus::Active;
        let discount = if active {
            self.config.active_discount
        } else {
            self.config.inactive_discount
        };
        let confidence = (f64::from(content.score) / 100.0).min(1.0) * discount;

        let mut metadata = Metadata::new();
        metadata.insert("validation_score".into(), content.score.into());
        metadata.insert("salary".into(), meta.salary.clone().into());
        metadata.insert(
            "description_length".into(),
            meta.description.chars().count().into(),
        );
        metadata.insert(
            "requirements_length".into(),
            meta.requirements.chars().count().into(),
        );

        JobValidation {
            url: url.to_string(),
            is_valid: active && content.score >= self.config.min_score,
            confidence,
            title: meta.title,
            company: meta.company,
            location: meta.location,
            description: truncate_chars(&meta.description, self.config.result_description_chars),
            requirements: meta.requirements,
            status: liveness.status,
            reason: format!(
                "Validation: {}. Status: {}",
                content.reasons.join(", "),
                liveness.reason
            ),
            metadata,
        }
    }
}
