//! Concurrent job discovery over many URLs.
//!
//! Every URL becomes one unit of work: classify it, then validate it
//! (direct postings) or extract and validate its candidates (listings and
//! careers pages). Units run on a [`JoinSet`] bounded by a semaphore, each
//! under its own deadline. Candidate validations inside a unit run
//! concurrently too. A unit that times out keeps the jobs it already
//! validated; one that panics turns into an error outcome instead of
//! failing the batch.

use std::collections::{HashMap, HashSet};
use std::pin::pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use uuid::Uuid;

use crate::cache::{
    Cache, JOB_VALIDATION, JOB_VALIDATION_TTL, LISTING_EXTRACTION, LISTING_EXTRACTION_TTL,
};
use crate::classifier::UrlClassifier;
use crate::listing::ListingExtractor;
use crate::models::{
    DiscoveredJob, JobCandidate, JobSource, JobStatus, JobValidation, UrlKind, UrlOutcome,
};
use crate::monitor::OperationMonitor;
use crate::traits::Browser;
use crate::util::{duration_secs, normalize_url};
use crate::validator::JobValidator;

/// Careers pages are read one page deep.
const CAREERS_MAX_PAGES: usize = 1;
/// Candidates validated per careers page.
const CAREERS_MAX_VALIDATIONS: usize = 10;
const LISTING_PASS_THROUGH_CONFIDENCE: f64 = 0.7;
const CAREERS_PASS_THROUGH_CONFIDENCE: f64 = 0.6;
/// Jobs above this confidence count as validated in batch statistics.
pub const VALIDATED_CONFIDENCE: f64 = 0.6;

/// Knobs for one batch run.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchOptions {
    pub max_jobs_per_listing: usize,
    pub max_workers: usize,
    pub validate_jobs: bool,
    pub max_pages: usize,
    /// Budget for one URL, from the moment it gets a worker.
    pub url_timeout: Duration,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            max_jobs_per_listing: 30,
            max_workers: 3,
            validate_jobs: true,
            max_pages: 2,
            url_timeout: Duration::from_secs(120),
        }
    }
}

/// Aggregated result of a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchResult {
    pub batch_id: Uuid,
    pub total_urls_processed: usize,
    /// Jobs produced by URLs classified as direct postings.
    pub direct_jobs_found: usize,
    /// Listing and careers URLs processed.
    pub listings_processed: usize,
    pub jobs_extracted_from_listings: usize,
    pub validated_jobs: usize,
    pub invalid_jobs: usize,
    pub unique_jobs_found: usize,
    pub total_jobs_before_dedup: usize,
    /// Error strings across all outcomes.
    pub errors: usize,
    #[serde(with = "duration_secs")]
    pub processing_time: Duration,
    /// One entry per input URL, in submission order.
    pub results: Vec<UrlOutcome>,
    pub unique_jobs: Vec<DiscoveredJob>,
}

impl BatchResult {
    pub fn empty(batch_id: Uuid) -> Self {
        Self {
            batch_id,
            total_urls_processed: 0,
            direct_jobs_found: 0,
            listings_processed: 0,
            jobs_extracted_from_listings: 0,
            validated_jobs: 0,
            invalid_jobs: 0,
            unique_jobs_found: 0,
            total_jobs_before_dedup: 0,
            errors: 0,
            processing_time: Duration::ZERO,
            results: Vec::new(),
            unique_jobs: Vec::new(),
        }
    }

    /// Aggregate per-URL outcomes, given in submission order.
    pub fn from_outcomes(
        batch_id: Uuid,
        results: Vec<UrlOutcome>,
        processing_time: Duration,
    ) -> Self {
        let mut summary = Self::empty(batch_id);
        summary.total_urls_processed = results.len();
        summary.processing_time = processing_time;

        for outcome in &results {
            summary.errors += outcome.errors.len();
            match outcome.kind {
                Some(UrlKind::DirectJob) => summary.direct_jobs_found += outcome.jobs.len(),
                Some(UrlKind::JobListing | UrlKind::CompanyCareers) => {
                    summary.listings_processed += 1;
                    summary.jobs_extracted_from_listings += outcome.jobs.len();
                }
                Some(UrlKind::NotRelevant) | None => {}
            }
            for job in &outcome.jobs {
                if job.validation_confidence > VALIDATED_CONFIDENCE {
                    summary.validated_jobs += 1;
                } else {
                    summary.invalid_jobs += 1;
                }
            }
        }

        let all_jobs: Vec<&DiscoveredJob> = results.iter().flat_map(|o| &o.jobs).collect();
        summary.total_jobs_before_dedup = all_jobs.len();
        summary.unique_jobs = dedup_jobs(all_jobs);
        summary.unique_jobs_found = summary.unique_jobs.len();
        summary.results = results;
        summary
    }

    /// Combine two batches into one, re-deduplicating the unique jobs. The
    /// merged result keeps this batch's id.
    pub fn merge(self, other: BatchResult) -> Self {
        let unique_jobs = dedup_jobs(self.unique_jobs.iter().chain(&other.unique_jobs));
        let mut results = self.results;
        results.extend(other.results);

        Self {
            batch_id: self.batch_id,
            total_urls_processed: self.total_urls_processed + other.total_urls_processed,
            direct_jobs_found: self.direct_jobs_found + other.direct_jobs_found,
            listings_processed: self.listings_processed + other.listings_processed,
            jobs_extracted_from_listings: self.jobs_extracted_from_listings
                + other.jobs_extracted_from_listings,
            validated_jobs: self.validated_jobs + other.validated_jobs,
            invalid_jobs: self.invalid_jobs + other.invalid_jobs,
            unique_jobs_found: unique_jobs.len(),
            total_jobs_before_dedup: self.total_jobs_before_dedup + other.total_jobs_before_dedup,
            errors: self.errors + other.errors,
            processing_time: self.processing_time + other.processing_time,
            results,
            unique_jobs,
        }
    }
}

/// First occurrence wins, compared by normalized URL.
fn dedup_jobs<'a>(jobs: impl IntoIterator<Item = &'a DiscoveredJob>) -> Vec<DiscoveredJob> {
    let mut seen = HashSet::new();
    jobs.into_iter()
        .filter(|job| seen.insert(normalize_url(&job.url)))
        .cloned()
        .collect()
}

// ---------------------------------------------------------------------------
// Progress reporting
// ---------------------------------------------------------------------------

/// Events emitted while a batch runs.
#[derive(Debug, Clone)]
pub enum BatchEvent<'a> {
    Started {
        batch_id: Uuid,
        urls: usize,
        workers: usize,
    },
    UrlStarted {
        url: &'a str,
    },
    UrlCompleted {
        url: &'a str,
        kind: Option<UrlKind>,
        jobs: usize,
        errors: usize,
    },
    UrlFailed {
        url: &'a str,
        error: &'a str,
    },
    Finished {
        batch_id: Uuid,
        unique_jobs: usize,
        errors: usize,
        elapsed: Duration,
    },
}

/// Trait for receiving batch events (decoupled logging).
pub trait BatchReporter: Send + Sync {
    fn report(&self, event: BatchEvent<'_>) {
        let _ = event;
    }
}

/// Reporter that uses the `tracing` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingBatchReporter;

impl BatchReporter for TracingBatchReporter {
    fn report(&self, event: BatchEvent<'_>) {
        match event {
            BatchEvent::Started {
                batch_id,
                urls,
                workers,
            } => {
                tracing::info!(%batch_id, %urls, %workers, "Batch started");
            }
            BatchEvent::UrlStarted { url } => {
                tracing::debug!(%url, "Processing URL");
            }
            BatchEvent::UrlCompleted {
                url,
                kind,
                jobs,
                errors,
            } => {
                tracing::info!(%url, ?kind, %jobs, %errors, "URL processed");
            }
            BatchEvent::UrlFailed { url, error } => {
                tracing::warn!(%url, %error, "URL failed");
            }
            BatchEvent::Finished {
                batch_id,
                unique_jobs,
                errors,
                elapsed,
            } => {
                tracing::info!(
                    %batch_id,
                    %unique_jobs,
                    %errors,
                    elapsed_secs = elapsed.as_secs_f64(),
                    "Batch finished"
                );
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Processor
// ---------------------------------------------------------------------------

/// Jobs accepted from one page's candidates.
struct AcceptedJobs {
    jobs: Vec<DiscoveredJob>,
    /// Candidates checked before the unit ran out of time, if it did.
    interrupted_after: Option<usize>,
}

fn timeout_message(options: &BatchOptions) -> String {
    format!("Processing timed out after {}s", options.url_timeout.as_secs())
}

/// Runs URLs through classification, extraction and validation.
///
/// Cheap to clone: components share the browser, cache and monitor.
#[derive(Clone)]
pub struct BatchProcessor<B: Browser> {
    classifier: UrlClassifier<B>,
    extractor: ListingExtractor<B>,
    validator: JobValidator<B>,
    cache: Arc<Cache>,
    monitor: Arc<OperationMonitor>,
    reporter: Arc<dyn BatchReporter>,
}

impl<B: Browser> BatchProcessor<B> {
    /// Build every component with default tunables on one browser.
    pub fn new(browser: B, cache: Arc<Cache>, monitor: Arc<OperationMonitor>) -> Self {
        Self::from_components(
            UrlClassifier::new(browser.clone(), Arc::clone(&cache), Arc::clone(&monitor)),
            ListingExtractor::new(browser.clone(), Arc::clone(&monitor)),
            JobValidator::new(browser, Arc::clone(&monitor)),
            cache,
            monitor,
        )
    }

    pub fn from_components(
        classifier: UrlClassifier<B>,
        extractor: ListingExtractor<B>,
        validator: JobValidator<B>,
        cache: Arc<Cache>,
        monitor: Arc<OperationMonitor>,
    ) -> Self {
        Self {
            classifier,
            extractor,
            validator,
            cache,
            monitor,
            reporter: Arc::new(TracingBatchReporter),
        }
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn BatchReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn monitor(&self) -> &Arc<OperationMonitor> {
        &self.monitor
    }

    pub fn cache(&self) -> &Arc<Cache> {
        &self.cache
    }

    /// Process every URL and aggregate the outcomes. Never fails.
    pub async fn process(&self, urls: &[String], options: &BatchOptions) -> BatchResult {
        let batch_id = Uuid::new_v4();
        if urls.is_empty() {
            return BatchResult::empty(batch_id);
        }

        let start = Instant::now();
        let workers = options.max_workers.max(1);
        self.reporter.report(BatchEvent::Started {
            batch_id,
            urls: urls.len(),
            workers,
        });

        let outcomes = self.run_units(urls, options, workers).await;
        let result = BatchResult::from_outcomes(batch_id, outcomes, start.elapsed());

        self.monitor
            .record("batch_process_urls", result.processing_time, true, None);
        self.reporter.report(BatchEvent::Finished {
            batch_id,
            unique_jobs: result.unique_jobs_found,
            errors: result.errors,
            elapsed: result.processing_time,
        });
        result
    }

    /// Run one unit per URL on a bounded pool; outcomes come back in
    /// submission order.
    async fn run_units(
        &self,
        urls: &[String],
        options: &BatchOptions,
        workers: usize,
    ) -> Vec<UrlOutcome> {
        let semaphore = Arc::new(Semaphore::new(workers));
        let mut tasks = JoinSet::new();
        let mut task_urls = HashMap::new();

        for (index, url) in urls.iter().enumerate() {
            let processor = self.clone();
            let options = options.clone();
            let semaphore = Arc::clone(&semaphore);
            let unit_url = url.clone();

            let handle = tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                (index, processor.process_one(&unit_url, &options).await)
            });
            task_urls.insert(handle.id(), (index, url.clone()));
        }

        // Completion order.
        let mut outcomes = Vec::with_capacity(urls.len());
        while let Some(joined) = tasks.join_next_with_id().await {
            match joined {
                Ok((_, (index, outcome))) => {
                    if outcome.kind.is_none() {
                        let error = outcome.errors.first().map(String::as_str).unwrap_or_default();
                        self.reporter.report(BatchEvent::UrlFailed {
                            url: &outcome.url,
                            error,
                        });
                    } else {
                        self.reporter.report(BatchEvent::UrlCompleted {
                            url: &outcome.url,
                            kind: outcome.kind,
                            jobs: outcome.jobs.len(),
                            errors: outcome.errors.len(),
                        });
                    }
                    outcomes.push((index, outcome));
                }
                Err(e) => {
                    let Some((index, url)) = task_urls.remove(&e.id()) else {
                        tracing::error!(error = %e, "Lost track of a failed batch task");
                        continue;
                    };
                    let error = format!("Processing failed: {e}");
                    self.reporter.report(BatchEvent::UrlFailed {
                        url: &url,
                        error: &error,
                    });
                    outcomes.push((index, UrlOutcome::failed(&url, error, Duration::ZERO)));
                }
            }
        }

        outcomes.sort_by_key(|(index, _)| *index);
        outcomes.into_iter().map(|(_, outcome)| outcome).collect()
    }

    /// Run a single URL through the pipeline. Never fails: problems are
    /// recorded in the outcome's `errors`.
    ///
    /// The whole unit shares one `url_timeout` budget. If classification
    /// runs out of it the outcome has no kind; if a later stage does, the
    /// jobs accepted so far are kept.
    pub async fn process_one(&self, url: &str, options: &BatchOptions) -> UrlOutcome {
        let start = Instant::now();
        let deadline = tokio::time::Instant::now() + options.url_timeout;
        self.reporter.report(BatchEvent::UrlStarted { url });

        let Ok(analysis) = tokio::time::timeout_at(deadline, self.classifier.classify(url)).await
        else {
            let error = timeout_message(options);
            self.monitor
                .record("process_single_url", start.elapsed(), false, Some(&error));
            return UrlOutcome::failed(url, error, start.elapsed());
        };

        let mut outcome = UrlOutcome::new(url);
        outcome.kind = Some(analysis.kind);
        outcome.platform = analysis.platform.clone();
        outcome.confidence = analysis.confidence;

        let mut timed_out = false;
        match analysis.kind {
            UrlKind::DirectJob if options.validate_jobs => {
                match tokio::time::timeout_at(deadline, self.validate_cached(url)).await {
                    Ok(validation) if validation.is_valid => {
                        outcome.jobs.push(DiscoveredJob::from_validation(
                            &validation,
                            None,
                            &analysis.platform,
                            JobSource::Direct,
                        ));
                    }
                    Ok(validation) => outcome
                        .errors
                        .push(format!("Direct job validation failed: {}", validation.reason)),
                    Err(_) => timed_out = true,
                }
            }
            UrlKind::DirectJob => {
                outcome
                    .jobs
                    .push(DiscoveredJob::unvalidated_direct(url, &analysis.platform));
            }
            UrlKind::JobListing | UrlKind::CompanyCareers => {
                let (max_pages, source) = if analysis.kind == UrlKind::JobListing {
                    (options.max_pages, JobSource::Listing)
                } else {
                    (CAREERS_MAX_PAGES, JobSource::CompanyCareers)
                };
                let extraction = self.extract_cached(url, options.max_jobs_per_listing, max_pages);
                match tokio::time::timeout_at(deadline, extraction).await {
                    Ok(candidates) => {
                        tracing::info!(
                            %url,
                            kind = %analysis.kind,
                            count = candidates.len(),
                            "Extracted candidates"
                        );
                        let accepted = self
                            .accept_candidates(&candidates, options, source, deadline)
                            .await;
                        outcome.jobs = accepted.jobs;
                        if let Some(checked) = accepted.interrupted_after {
                            timed_out = true;
                            tracing::warn!(
                                %url,
                                checked,
                                kept = outcome.jobs.len(),
                                "Validation interrupted, keeping jobs validated so far"
                            );
                        }
                    }
                    Err(_) => timed_out = true,
                }
            }
            UrlKind::NotRelevant => {
                outcome
                    .errors
                    .push(format!("URL classified as not relevant: {}", analysis.reason));
            }
        }

        outcome.duration = start.elapsed();
        if timed_out {
            let error = timeout_message(options);
            self.monitor
                .record("process_single_url", outcome.duration, false, Some(&error));
            outcome.errors.push(error);
        } else {
            self.monitor
                .record("process_single_url", outcome.duration, true, None);
        }
        outcome
    }

    /// Turn extracted candidates into jobs, validating them if asked.
    ///
    /// Validations run concurrently, at most `max_workers` at a time, and
    /// stop at `deadline`. Accepted jobs keep the candidates' order.
    async fn accept_candidates(
        &self,
        candidates: &[JobCandidate],
        options: &BatchOptions,
        source: JobSource,
        deadline: tokio::time::Instant,
    ) -> AcceptedJobs {
        let (limit, pass_through_confidence) = match source {
            JobSource::CompanyCareers => (CAREERS_MAX_VALIDATIONS, CAREERS_PASS_THROUGH_CONFIDENCE),
            _ => (usize::MAX, LISTING_PASS_THROUGH_CONFIDENCE),
        };

        if !options.validate_jobs {
            return AcceptedJobs {
                jobs: candidates
                    .iter()
                    .map(|c| DiscoveredJob::from_candidate(c, pass_through_confidence, source))
                    .collect(),
                interrupted_after: None,
            };
        }

        let validations = candidates
            .iter()
            .take(limit)
            .cloned()
            .enumerate()
            .map(|(index, candidate)| {
                let processor = self.clone();
                async move {
                    let validation = processor.validate_cached(&candidate.url).await;
                    (index, candidate, validation)
                }
            });
        let validations = stream::iter(validations).buffer_unordered(options.max_workers.max(1));
        let mut validations = pin!(validations);

        let mut accepted = Vec::new();
        let mut checked = 0;
        let mut interrupted_after = None;
        loop {
            match tokio::time::timeout_at(deadline, validations.next()).await {
                Ok(Some((index, candidate, validation))) => {
                    checked += 1;
                    if validation.is_valid {
                        accepted.push((
                            index,
                            DiscoveredJob::from_validation(
                                &validation,
                                Some(&candidate),
                                &candidate.platform,
                                source,
                            ),
                        ));
                    }
                }
                Ok(None) => break,
                Err(_) => {
                    interrupted_after = Some(checked);
                    break;
                }
            }
        }

        accepted.sort_by_key(|(index, _)| *index);
        AcceptedJobs {
            jobs: accepted.into_iter().map(|(_, job)| job).collect(),
            interrupted_after,
        }
    }

    /// Validate through the cache. Error results are not cached.
    async fn validate_cached(&self, url: &str) -> JobValidation {
        let key = json!(url);
        if let Some(cached) = self.cache.get_as::<JobValidation>(JOB_VALIDATION, &key) {
            tracing::info!(%url, "Using cached validation");
            return cached;
        }

        let validation = self.validator.validate(url).await;
        if validation.status != JobStatus::Error
            && let Err(e) = self
                .cache
                .set_as(JOB_VALIDATION, &key, &validation, JOB_VALIDATION_TTL)
        {
            tracing::warn!(%url, error = %e, "Failed to cache validation");
        }
        validation
    }

    /// Extract through the cache. The key includes the limits; empty
    /// extractions are not cached.
    async fn extract_cached(
        &self,
        url: &str,
        max_jobs: usize,
        max_pages: usize,
    ) -> Vec<JobCandidate> {
        let key = json!({ "url": url, "max_jobs": max_jobs, "max_pages": max_pages });
        if let Some(cached) = self.cache.get_as::<Vec<JobCandidate>>(LISTING_EXTRACTION, &key) {
            tracing::info!(%url, "Using cached extraction for listing");
            return cached;
        }

        let candidates = self.extractor.extract(url, max_jobs, max_pages).await;
        if !candidates.is_empty()
            && let Err(e) = self
                .cache
                .set_as(LISTING_EXTRACTION, &key, &candidates, LISTING_EXTRACTION_TTL)
        {
            tracing::warn!(%url, error = %e, "Failed to cache listing extraction");
        }
        candidates
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::ClassifierConfig;
    use crate::listing::ExtractorConfig;
    use crate::testutil::MockBrowser;
    use crate::throttle::{RateLimitedBrowser, RateLimiter};
    use crate::validator::ValidatorConfig;

    const BOARD: &str = "https://boards.greenhouse.io/acme";

    fn posting(title: &str) -> String {
        format!(
            r#"<html><head><title>{title}</title></head><body>
            <h1>{title}</h1>
            <div class="company-name">Acme Robotics</div>
            <div class="job-description"><p>{}</p></div>
            <a href="/apply">Apply now</a>
            </body></html>"#,
            "Build reliable services for our warehouse robots with a small, friendly team. ".repeat(4)
        )
    }

    const FILLED: &str = r#"<html><body><h1>Data Analyst</h1>
        <p>We are sorry, but this position has been filled. Thank you for your interest in
        joining Acme Robotics, and please check back soon for other openings.</p></body></html>"#;

    fn board(ids: &[u32]) -> String {
        let cards: String = ids
            .iter()
            .map(|id| {
                format!(r#"<div class="opening"><a href="/acme/jobs/{id}">Job {id}</a></div>"#)
            })
            .collect();
        format!("<html><body><h1>Acme</h1>{cards}</body></html>")
    }

    fn processor(browser: MockBrowser) -> BatchProcessor<MockBrowser> {
        let cache = Arc::new(Cache::new());
        let monitor = Arc::new(OperationMonitor::new());
        BatchProcessor::from_components(
            UrlClassifier::with_config(
                browser.clone(),
                Arc::clone(&cache),
                Arc::clone(&monitor),
                ClassifierConfig::default(),
            ),
            ListingExtractor::with_config(
                browser.clone(),
                Arc::clone(&monitor),
                ExtractorConfig {
                    settle_delay: Duration::ZERO,
                    ..ExtractorConfig::default()
                },
            ),
            JobValidator::with_config(
                browser,
                Arc::clone(&monitor),
                ValidatorConfig {
                    settle_delay: Duration::ZERO,
                    ..ValidatorConfig::default()
                },
            ),
            cache,
            monitor,
        )
    }

    fn urls(list: &[&str]) -> Vec<String> {
        list.iter().map(|u| u.to_string()).collect()
    }

    #[tokio::test]
    async fn unreachable_url_becomes_error_outcome() {
        let browser = MockBrowser::new();
        let options = BatchOptions {
            max_workers: 1,
            ..BatchOptions::default()
        };
        let result = processor(browser)
            .process(&urls(&["not-a-real-url://x"]), &options)
            .await;

        assert_eq!(result.total_urls_processed, 1);
        assert!(result.errors >= 1);
        assert_eq!(result.unique_jobs_found, 0);
        assert_eq!(result.results[0].kind, Some(UrlKind::NotRelevant));
        assert!(result.results[0].errors[0].starts_with("URL classified as not relevant"));
    }

    #[tokio::test]
    async fn empty_input_spawns_nothing() {
        let browser = MockBrowser::new();
        let processor = processor(browser.clone());
        let result = processor.process(&[], &BatchOptions::default()).await;

        assert_eq!(result.total_urls_processed, 0);
        assert!(result.results.is_empty());
        assert_eq!(result.processing_time, Duration::ZERO);
        assert_eq!(browser.open_count(), 0);
        assert!(processor.monitor().snapshot().operations.is_empty());
    }

    #[tokio::test]
    async fn direct_posting_is_validated() {
        let url = "https://boards.greenhouse.io/acme/jobs/1";
        let browser = MockBrowser::new().with_page(url, &posting("Backend Engineer"));
        let result = processor(browser)
            .process(&urls(&[url]), &BatchOptions::default())
            .await;

        assert_eq!(result.direct_jobs_found, 1);
        assert_eq!(result.validated_jobs, 1);
        let job = &result.unique_jobs[0];
        assert_eq!(job.title, "Backend Engineer");
        assert_eq!(job.company, "Acme Robotics");
        assert_eq!(job.platform, "greenhouse");
        assert_eq!(job.source, JobSource::Direct);
        assert!(job.description.chars().count() <= 200);
    }

    #[tokio::test]
    async fn listing_keeps_only_valid_postings_and_caches_everything() {
        let browser = MockBrowser::new()
            .with_page(BOARD, &board(&[1, 2, 3]))
            .with_page("https://boards.greenhouse.io/acme/jobs/1", &posting("Backend Engineer"))
            .with_page("https://boards.greenhouse.io/acme/jobs/2", &posting("Product Designer"))
            .with_page("https://boards.greenhouse.io/acme/jobs/3", FILLED);
        let processor = processor(browser.clone());

        let first = processor
            .process(&urls(&[BOARD]), &BatchOptions::default())
            .await;
        assert_eq!(first.listings_processed, 1);
        assert_eq!(first.jobs_extracted_from_listings, 2);
        assert_eq!(first.unique_jobs[0].source, JobSource::Listing);
        assert_eq!(browser.open_count(), 4);

        let second = processor
            .process(&urls(&[BOARD]), &BatchOptions::default())
            .await;
        assert_eq!(second.unique_jobs, first.unique_jobs);
        assert_eq!(browser.open_count(), 4);
    }

    #[tokio::test]
    async fn careers_page_without_validation_passes_candidates_through() {
        let url = "https://acme.com/join-us";
        let page = r#"<html><head><title>Careers at Acme</title></head><body>
            <div class="opening"><a href="/jobs/eng">Engineer</a></div>
            <div class="opening"><a href="/jobs/ops">Operations</a></div>
            </body></html>"#;
        let browser = MockBrowser::new().with_page(url, page);
        let options = BatchOptions {
            validate_jobs: false,
            ..BatchOptions::default()
        };
        let result = processor(browser).process(&urls(&[url]), &options).await;

        assert_eq!(result.results[0].kind, Some(UrlKind::CompanyCareers));
        assert_eq!(result.jobs_extracted_from_listings, 2);
        assert_eq!(result.invalid_jobs, 2);
        assert!(
            result
                .unique_jobs
                .iter()
                .all(|j| j.validation_confidence == 0.6 && j.source == JobSource::CompanyCareers)
        );
    }

    #[tokio::test]
    async fn overlapping_batches_merge_without_duplicates() {
        let browser = MockBrowser::new().with_page(BOARD, &board(&[1, 2]));
        let processor = processor(browser);
        let options = BatchOptions {
            validate_jobs: false,
            ..BatchOptions::default()
        };

        let a = processor
            .process(
                &urls(&[BOARD, "https://boards.greenhouse.io/acme/jobs/1"]),
                &options,
            )
            .await;
        let b = processor
            .process(
                &urls(&[BOARD, "https://boards.greenhouse.io/acme/jobs/9/"]),
                &options,
            )
            .await;
        let merged = a.clone().merge(b);

        let mut seen = HashSet::new();
        assert!(
            merged
                .unique_jobs
                .iter()
                .all(|j| seen.insert(normalize_url(&j.url)))
        );
        assert_eq!(merged.unique_jobs_found, 3);
        assert!(merged.total_jobs_before_dedup >= merged.unique_jobs_found);
        assert_eq!(merged.total_urls_processed, 4);
        assert_eq!(merged.batch_id, a.batch_id);
    }

    #[tokio::test]
    async fn results_follow_submission_order() {
        let list = urls(&[
            "https://boards.greenhouse.io/acme/jobs/3",
            "not-a-real-url://a",
            "https://boards.greenhouse.io/acme/jobs/1",
        ]);
        let options = BatchOptions {
            validate_jobs: false,
            max_workers: 3,
            ..BatchOptions::default()
        };
        let result = processor(MockBrowser::new()).process(&list, &options).await;

        let order: Vec<&str> = result.results.iter().map(|o| o.url.as_str()).collect();
        assert_eq!(order, list.iter().map(String::as_str).collect::<Vec<_>>());
        assert_eq!(result.direct_jobs_found, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_unit_times_out() {
        let url = "https://slow.test/page";
        let browser = MockBrowser::new()
            .with_page(url, "<html><body>slow</body></html>")
            .with_delay(Duration::from_secs(60));
        let options = BatchOptions {
            url_timeout: Duration::from_secs(5),
            ..BatchOptions::default()
        };
        let processor = processor(browser);
        let result = processor.process(&urls(&[url]), &options).await;

        let outcome = &result.results[0];
        assert_eq!(outcome.kind, None);
        assert!(outcome.errors[0].contains("timed out"));
        assert_eq!(result.errors, 1);
        assert_eq!(
            processor.monitor().stats("process_single_url").unwrap().failed_calls,
            1
        );
    }

    fn staffed_board(ids: &[u32]) -> MockBrowser {
        ids.iter().fold(MockBrowser::new().with_page(BOARD, &board(ids)), |browser, id| {
            browser.with_page(
                &format!("https://boards.greenhouse.io/acme/jobs/{id}"),
                &posting(&format!("Backend Engineer {id}")),
            )
        })
    }

    #[tokio::test(start_paused = true)]
    async fn full_listing_fits_the_unit_budget_under_browser_rate_limit() {
        let ids: Vec<u32> = (1..=30).collect();
        let browser = staffed_board(&ids);
        let processor = BatchProcessor::new(
            RateLimitedBrowser::new(browser.clone(), RateLimiter::for_browser()),
            Arc::new(Cache::new()),
            Arc::new(OperationMonitor::new()),
        );

        let result = processor
            .process(&urls(&[BOARD]), &BatchOptions::default())
            .await;

        assert_eq!(result.errors, 0, "{:?}", result.results[0].errors);
        assert_eq!(result.unique_jobs_found, 30);
        assert!(browser.open_count() > 30);
        let titles: Vec<&str> = result.unique_jobs.iter().map(|j| j.title.as_str()).collect();
        assert_eq!(titles[0], "Backend Engineer 1");
        assert_eq!(titles[29], "Backend Engineer 30");
    }

    #[tokio::test(start_paused = true)]
    async fn timed_out_listing_keeps_jobs_validated_so_far() {
        let ids: Vec<u32> = (1..=10).collect();
        let processor = BatchProcessor::new(
            staffed_board(&ids),
            Arc::new(Cache::new()),
            Arc::new(OperationMonitor::new()),
        );
        let options = BatchOptions {
            max_workers: 1,
            url_timeout: Duration::from_secs(10),
            ..BatchOptions::default()
        };

        let result = processor.process(&urls(&[BOARD]), &options).await;

        let outcome = &result.results[0];
        assert_eq!(outcome.kind, Some(UrlKind::JobListing));
        assert!(!outcome.jobs.is_empty());
        assert!(outcome.jobs.len() < ids.len());
        assert_eq!(outcome.errors, vec!["Processing timed out after 10s".to_string()]);
        assert_eq!(
            processor.monitor().stats("process_single_url").unwrap().failed_calls,
            1
        );
    }
}
