//! URL classification: is this a posting, a listing, a careers page, or noise?
//!
//! Classification runs in two stages. Known ATS and job-board URL shapes are
//! recognised by regex alone and returned with confidence 0.8 without any
//! network traffic. Everything else is rendered once and judged from its
//! title, the first ~2000 characters of visible text, and a few structural
//! cues (description container, apply button, repeated job cards,
//! pagination).

use std::sync::{Arc, LazyLock};
use std::time::Duration;

use regex::Regex;
use serde_json::json;

use crate::cache::{Cache, URL_ANALYSIS, URL_ANALYSIS_TTL};
use crate::dom::Dom;
use crate::error::AppError;
use crate::models::{Metadata, UrlAnalysis, UrlKind};
use crate::monitor::OperationMonitor;
use crate::traits::{Browser, render_html};
use crate::util::truncate_chars;

/// Confidence of a direct-job or listing pattern hit. At or above this the
/// page is never rendered.
pub const PATTERN_CONFIDENCE: f64 = 0.8;
const CAREERS_PATTERN_CONFIDENCE: f64 = 0.7;
const NO_PATTERN_CONFIDENCE: f64 = 0.6;
const FAILURE_CONFIDENCE: f64 = 0.1;

// ---------------------------------------------------------------------------
// Pattern tables
// ---------------------------------------------------------------------------

/// A URL shape and the kind of page it denotes.
struct UrlRule {
    pattern: &'static str,
    regex: Regex,
    kind: UrlKind,
}

/// Ordered: direct-job rules, then listing rules, then careers rules.
const URL_PATTERNS: &[(UrlKind, &[&str])] = &[
    (
        UrlKind::DirectJob,
        &[
            r"greenhouse\.io/(?:[^/]+/)?jobs/\d+",
            r"jobs\.lever\.co/[^/?#]+/[^/?#]+",
            r"ashbyhq\.com/[^/?#]+/(?:jobs/)?[0-9a-f]{8}-[0-9a-f-]{27}",
            r"(?:myworkdayjobs|workday)\.com/.*/job/",
            r"smartrecruiters\.com/[^/?#]+/(?:jobs/)?\d+",
            r"bamboohr\.com/(?:careers|jobs)/(?:view\.php\?id=)?\d+",
            r"jobvite\.com/.*/job/",
            r"icims\.com/.*jobs/\d+",
            r"linkedin\.com/jobs/view/[^/?#]*\d+",
            r"indeed\.com/(?:viewjob|rc/clk)\?(?:.*&)?jk=",
            r"indeed\.com/.*[?&]vjk=",
            r"glassdoor\.com/job-listing/",
            r"(?:angel\.co|wellfound\.com)/company/[^/]+/jobs/.+",
            r"stackoverflow\.com/jobs/\d+",
            r"dice\.com/(?:job-detail|jobs/detail)/",
            r"monster\.com/job-openings/",
            r"ziprecruiter\.com/(?:c/[^/]+/job/|jobs/[^/?#]+)",
            r"startup\.jobs/[^/?#]+-\d+",
            r"/job/\d+",
            r"/jobs/[^/?#]+/\d+",
            r"/careers/[^/?#]+/\d+",
        ],
    ),
    (
        UrlKind::JobListing,
        &[
            r"linkedin\.com/jobs/search",
            r"linkedin\.com/jobs/[a-z0-9-]+-(?:jobs|empleos)",
            r"linkedin\.com/jobs/?(?:[?#]|$)",
            r"indeed\.com/(?:jobs|q-)",
            r"glassdoor\.com/jobs?/",
            r"(?:angel\.co|wellfound\.com)/(?:jobs|role)",
            r"stackoverflow\.com/jobs/?(?:[?#]|$)",
            r"dice\.com/jobs",
            r"monster\.com/jobs",
            r"ziprecruiter\.com/(?:jobs/?(?:[?#]|$)|candidate/search)",
            r"startup\.jobs/?(?:[?#]|$)",
            r"jobsearch",
            r"(?:boards|job-boards)\.greenhouse\.io/[^/?#]+/?(?:[?#]|$)",
            r"jobs\.lever\.co/[^/?#]+/?(?:[?#]|$)",
            r"jobs\.ashbyhq\.com/[^/?#]+/?(?:[?#]|$)",
            r"/jobs/?(?:[?#]|$)",
            r"/careers/?(?:[?#]|$)",
        ],
    ),
    (
        UrlKind::CompanyCareers,
        &[
            r"/work-with-us/?(?:[?#]|$)",
            r"/join-us/?(?:[?#]|$)",
            r"/opportunities/?(?:[?#]|$)",
            r"/positions/?(?:[?#]|$)",
            r"/openings/?(?:[?#]|$)",
            r"/vacancies/?(?:[?#]|$)",
            r"^https?://(?:careers|jobs)\.[^/]+/?(?:[?#]|$)",
        ],
    ),
];

/// Host fragments identifying the hosting platform, checked in order.
const PLATFORM_PATTERNS: &[(&str, &str)] = &[
    ("linkedin", r"linkedin\.com"),
    ("indeed", r"indeed\.com"),
    ("glassdoor", r"glassdoor\.com"),
    ("greenhouse", r"greenhouse\.io"),
    ("lever", r"lever\.co"),
    ("ashby", r"ashbyhq\.com"),
    ("workday", r"workday\.com|myworkdayjobs\.com"),
    ("smartrecruiters", r"smartrecruiters\.com"),
    ("angel", r"angel\.co|wellfound\.com"),
    ("stackoverflow", r"stackoverflow\.com"),
    ("dice", r"dice\.com"),
    ("monster", r"monster\.com"),
    ("ziprecruiter", r"ziprecruiter\.com"),
    ("jobvite", r"jobvite\.com"),
    ("icims", r"icims\.com"),
    ("bamboohr", r"bamboohr\.com"),
    ("startup_jobs", r"startup\.jobs"),
];

static URL_RULES: LazyLock<Vec<UrlRule>> = LazyLock::new(|| {
    URL_PATTERNS
        .iter()
        .flat_map(|(kind, patterns)| {
            patterns.iter().filter_map(move |pattern| {
                Regex::new(pattern).ok().map(|regex| UrlRule {
                    pattern: *pattern,
                    regex,
                    kind: *kind,
                })
            })
        })
        .collect()
});

static PLATFORM_RULES: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    PLATFORM_PATTERNS
        .iter()
        .filter_map(|(name, pattern)| Regex::new(pattern).ok().map(|r| (*name, r)))
        .collect()
});

/// Name of the platform hosting `url`, or `"unknown"`.
pub fn detect_platform(url: &str) -> &'static str {
    let url = url.to_lowercase();
    PLATFORM_RULES
        .iter()
        .find(|(_, regex)| regex.is_match(&url))
        .map(|(name, _)| *name)
        .unwrap_or("unknown")
}

/// Outcome of the pattern stage.
#[derive(Debug, Clone, PartialEq)]
pub struct PatternMatch {
    pub kind: UrlKind,
    pub platform: &'static str,
    pub confidence: f64,
    pub reason: String,
}

/// Fast classification from the URL string alone.
pub fn classify_by_pattern(url: &str) -> PatternMatch {
    let lower = url.to_lowercase();
    let platform = detect_platform(&lower);

    match URL_RULES.iter().find(|rule| rule.regex.is_match(&lower)) {
        Some(rule) => PatternMatch {
            kind: rule.kind,
            platform,
            confidence: if rule.kind == UrlKind::CompanyCareers {
                CAREERS_PATTERN_CONFIDENCE
            } else {
                PATTERN_CONFIDENCE
            },
            reason: format!("Pattern match: {}", rule.pattern),
        },
        None => PatternMatch {
            kind: UrlKind::NotRelevant,
            platform,
            confidence: NO_PATTERN_CONFIDENCE,
            reason: "No known patterns matched".into(),
        },
    }
}

// ---------------------------------------------------------------------------
// Content analysis
// ---------------------------------------------------------------------------

const JOB_INDICATORS: &[&str] = &[
    "job description",
    "responsibilities",
    "requirements",
    "qualifications",
    "apply now",
    "job details",
    "position",
    "role",
    "salary",
    "benefits",
    "experience required",
    "skills needed",
];

const LISTING_INDICATORS: &[&str] = &[
    "search results",
    "jobs found",
    "filter",
    "sort by",
    "page",
    "results",
    "showing",
    "matches",
    "browse",
    "explore opportunities",
];

const CAREERS_TITLE_KEYWORDS: &[&str] = &["career", "jobs", "opportunities"];

const DESCRIPTION_CONTAINER: &str =
    "[class*='job-description'], [class*='job-detail'], [id*='job-description']";
const JOB_CARD_LIKE: &str = "[class*='job-item'], [class*='job-card'], [class*='job-result']";
const PAGINATION: &str = "[class*='pagination'], [class*='pager']";

/// Page-level evidence gathered from a rendered page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContentSignals {
    pub job_score: usize,
    pub listing_score: usize,
    pub has_job_description: bool,
    pub has_apply_button: bool,
    pub job_card_count: usize,
    pub has_pagination: bool,
    pub careers_title: bool,
}

impl ContentSignals {
    /// Gather signals from rendered HTML, looking at the first
    /// `sample_chars` characters of body text.
    pub fn from_html(html: &str, sample_chars: usize) -> Self {
        let dom = Dom::parse(html);
        let title = dom.title().to_lowercase();
        let sample = truncate_chars(&dom.body_text(), sample_chars).to_lowercase();

        let hits = |indicators: &[&str]| {
            indicators
                .iter()
                .filter(|i| title.contains(*i) || sample.contains(*i))
                .count()
        };

        Self {
            job_score: hits(JOB_INDICATORS),
            listing_score: hits(LISTING_INDICATORS),
            has_job_description: dom.count(DESCRIPTION_CONTAINER) > 0,
            has_apply_button: dom.position_with_text("button, a", "apply").is_some()
                || dom.count("[class*='apply']") > 0,
            job_card_count: dom.count(JOB_CARD_LIKE),
            has_pagination: dom.count(PAGINATION) > 0
                || dom.position_with_text("a", "next").is_some(),
            careers_title: CAREERS_TITLE_KEYWORDS.iter().any(|k| title.contains(k)),
        }
    }

    /// Decide the page kind from the gathered signals.
    pub fn verdict(&self) -> ContentVerdict {
        let mut metadata = Metadata::new();
        metadata.insert("method".into(), "content".into());

        if self.job_score >= 3 || self.has_job_description || self.has_apply_button {
            metadata.insert("job_score".into(), self.job_score.into());
            metadata.insert("has_apply_button".into(), self.has_apply_button.into());
            metadata.insert("has_job_description".into(), self.has_job_description.into());
            ContentVerdict {
                kind: UrlKind::DirectJob,
                confidence: 0.9,
                reason: format!("Content analysis: {} job indicators found", self.job_score),
                metadata,
            }
        } else if self.listing_score >= 2 || self.job_card_count > 3 || self.has_pagination {
            metadata.insert("listing_score".into(), self.listing_score.into());
            metadata.insert("job_card_count".into(), self.job_card_count.into());
            metadata.insert("has_pagination".into(), self.has_pagination.into());
            ContentVerdict {
                kind: UrlKind::JobListing,
                confidence: 0.85,
                reason: format!(
                    "Content analysis: {} listing indicators found",
                    self.listing_score
                ),
                metadata,
            }
        } else if self.careers_title {
            ContentVerdict {
                kind: UrlKind::CompanyCareers,
                confidence: 0.7,
                reason: "Career-related title found".into(),
                metadata,
            }
        } else {
            ContentVerdict {
                kind: UrlKind::NotRelevant,
                confidence: 0.8,
                reason: "No job-related content indicators found".into(),
                metadata,
            }
        }
    }
}

/// Outcome of the content stage.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentVerdict {
    pub kind: UrlKind,
    pub confidence: f64,
    pub reason: String,
    pub metadata: Metadata,
}

// ---------------------------------------------------------------------------
// Classifier
// ---------------------------------------------------------------------------

/// Tunables for [`UrlClassifier`].
#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    pub navigation_timeout: Duration,
    pub cache_ttl: Duration,
    /// Characters of body text inspected for indicator phrases.
    pub content_sample_chars: usize,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            navigation_timeout: Duration::from_secs(15),
            cache_ttl: URL_ANALYSIS_TTL,
            content_sample_chars: 2000,
        }
    }
}

/// Classifies URLs, cache-first.
#[derive(Clone)]
pub struct UrlClassifier<B: Browser> {
    browser: B,
    cache: Arc<Cache>,
    monitor: Arc<OperationMonitor>,
    config: ClassifierConfig,
}

impl<B: Browser> UrlClassifier<B> {
    pub fn new(browser: B, cache: Arc<Cache>, monitor: Arc<OperationMonitor>) -> Self {
        Self::with_config(browser, cache, monitor, ClassifierConfig::default())
    }

    pub fn with_config(
        browser: B,
        cache: Arc<Cache>,
        monitor: Arc<OperationMonitor>,
        config: ClassifierConfig,
    ) -> Self {
        Self {
            browser,
            cache,
            monitor,
            config,
        }
    }

    /// Classify `url`. Never fails: rendering problems degrade to
    /// [`UrlKind::NotRelevant`] with low confidence.
    pub async fn classify(&self, url: &str) -> UrlAnalysis {
        let key = json!(url);
        if let Some(cached) = self.cache.get_as::<UrlAnalysis>(URL_ANALYSIS, &key) {
            tracing::info!(%url, "Using cached URL analysis");
            return cached;
        }

        let pattern = classify_by_pattern(url);
        let analysis = if pattern.confidence >= PATTERN_CONFIDENCE {
            let mut metadata = Metadata::new();
            metadata.insert("method".into(), "pattern".into());
            UrlAnalysis {
                url: url.to_string(),
                kind: pattern.kind,
                confidence: pattern.confidence,
                platform: pattern.platform.to_string(),
                reason: pattern.reason,
                metadata,
            }
        } else {
            let rendered = self
                .monitor
                .track("analyze_page_content", self.render(url))
                .await;
            match rendered {
                Ok(html) => {
                    let signals =
                        ContentSignals::from_html(&html, self.config.content_sample_chars);
                    combine(url, &pattern, signals.verdict())
                }
                Err(e) => {
                    tracing::warn!(%url, error = %e, "URL analysis failed");
                    let mut metadata = Metadata::new();
                    metadata.insert("error".into(), e.to_string().into());
                    return UrlAnalysis {
                        url: url.to_string(),
                        kind: UrlKind::NotRelevant,
                        confidence: FAILURE_CONFIDENCE,
                        platform: pattern.platform.to_string(),
                        reason: format!("Analysis failed: {e}"),
                        metadata,
                    };
                }
            }
        };

        tracing::debug!(
            %url,
            kind = %analysis.kind,
            confidence = analysis.confidence,
            "URL classified"
        );
        if let Err(e) = self
            .cache
            .set_as(URL_ANALYSIS, &key, &analysis, self.config.cache_ttl)
        {
            tracing::warn!(%url, error = %e, "Failed to cache URL analysis");
        }
        analysis
    }

    async fn render(&self, url: &str) -> Result<String, AppError> {
        render_html(&self.browser, url, self.config.navigation_timeout, Duration::ZERO).await
    }
}

/// Merge the pattern and content stages: the higher confidence wins, and the
/// content kind replaces the pattern kind only when strictly more confident.
fn combine(url: &str, pattern: &PatternMatch, content: ContentVerdict) -> UrlAnalysis {
    let kind = if content.confidence > pattern.confidence {
        content.kind
    } else {
        pattern.kind
    };

    let mut metadata = Metadata::new();
    metadata.insert("method".into(), "combined".into());
    metadata.insert(
        "pattern_result".into(),
        json!({
            "kind": pattern.kind,
            "confidence": pattern.confidence,
            "reason": pattern.reason,
        }),
    );
    metadata.insert(
        "content_result".into(),
        json!({
            "kind": content.kind,
            "confidence": content.confidence,
            "reason": content.reason,
            "signals": content.metadata,
        }),
    );

    UrlAnalysis {
        url: url.to_string(),
        kind,
        confidence: pattern.confidence.max(content.confidence),
        platform: pattern.platform.to_string(),
        reason: format!("{} + {}", pattern.reason, content.reason),
        metadata,
    }
}
