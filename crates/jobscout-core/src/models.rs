use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::util::{duration_secs, truncate_chars};

/// Free-form diagnostic data attached to analyses and validations.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Length of the description preview carried by a [`DiscoveredJob`].
pub const DESCRIPTION_PREVIEW_CHARS: usize = 200;

/// What a URL points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UrlKind {
    /// A single job posting.
    DirectJob,
    /// A page enumerating many postings (search results, board index).
    JobListing,
    /// A company's own careers page.
    CompanyCareers,
    NotRelevant,
}

impl UrlKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            UrlKind::DirectJob => "direct_job",
            UrlKind::JobListing => "job_listing",
            UrlKind::CompanyCareers => "company_careers",
            UrlKind::NotRelevant => "not_relevant",
        }
    }
}

impl fmt::Display for UrlKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Classification of a single URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UrlAnalysis {
    pub url: String,
    pub kind: UrlKind,
    /// In `[0, 1]`.
    pub confidence: f64,
    pub platform: String,
    pub reason: String,
    #[serde(default)]
    pub metadata: Metadata,
}

/// An unverified pointer to a posting found on a listing page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobCandidate {
    pub url: String,
    pub title: String,
    pub company: String,
    pub location: String,
    pub snippet: String,
    pub platform: String,
}

/// Liveness of a posting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Still accepting applications (or no sign that it isn't).
    Active,
    /// Expired, filled, removed, or an error/placeholder page.
    Expired,
    /// The page could not be rendered or inspected.
    Error,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Active => "active",
            JobStatus::Expired => "expired",
            JobStatus::Error => "error",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Verdict on a single posting URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobValidation {
    pub url: String,
    /// `true` only when `status` is [`JobStatus::Active`] and the content scored high enough.
    pub is_valid: bool,
    /// In `[0, 1]`.
    pub confidence: f64,
    pub title: String,
    pub company: String,
    pub location: String,
    pub description: String,
    pub requirements: String,
    pub status: JobStatus,
    pub reason: String,
    #[serde(default)]
    pub metadata: Metadata,
}

impl JobValidation {
    /// Result for a page that could not be rendered or inspected.
    pub fn failed(url: &str, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        let mut metadata = Metadata::new();
        metadata.insert("error".into(), reason.clone().into());
        Self {
            url: url.to_string(),
            is_valid: false,
            confidence: 0.0,
            title: String::new(),
            company: String::new(),
            location: String::new(),
            description: String::new(),
            requirements: String::new(),
            status: JobStatus::Error,
            reason: format!("Validation failed: {reason}"),
            metadata,
        }
    }
}

/// Where a [`DiscoveredJob`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobSource {
    Direct,
    Listing,
    CompanyCareers,
}

impl JobSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobSource::Direct => "direct",
            JobSource::Listing => "listing",
            JobSource::CompanyCareers => "company_careers",
        }
    }
}

/// A job record emitted by a batch, ready for upsert-by-URL persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveredJob {
    pub url: String,
    pub title: String,
    pub company: String,
    pub location: String,
    pub description: String,
    pub platform: String,
    pub validation_confidence: f64,
    pub source: JobSource,
}

impl DiscoveredJob {
    /// Build a record from a validation, falling back to the extractor's
    /// guesses for any field the validator left empty.
    pub fn from_validation(
        validation: &JobValidation,
        candidate: Option<&JobCandidate>,
        platform: &str,
        source: JobSource,
    ) -> Self {
        let pick = |validated: &str, guessed: Option<&str>| {
            if validated.is_empty() {
                guessed.unwrap_or_default().to_string()
            } else {
                validated.to_string()
            }
        };

        Self {
            url: validation.url.clone(),
            title: pick(&validation.title, candidate.map(|c| c.title.as_str())),
            company: pick(&validation.company, candidate.map(|c| c.company.as_str())),
            location: pick(&validation.location, candidate.map(|c| c.location.as_str())),
            description: truncate_chars(&validation.description, DESCRIPTION_PREVIEW_CHARS),
            platform: candidate
                .map(|c| c.platform.clone())
                .unwrap_or_else(|| platform.to_string()),
            validation_confidence: validation.confidence,
            source,
        }
    }

    /// Pass a candidate through without validation.
    pub fn from_candidate(candidate: &JobCandidate, confidence: f64, source: JobSource) -> Self {
        Self {
            url: candidate.url.clone(),
            title: candidate.title.clone(),
            company: candidate.company.clone(),
            location: candidate.location.clone(),
            description: truncate_chars(&candidate.snippet, DESCRIPTION_PREVIEW_CHARS),
            platform: candidate.platform.clone(),
            validation_confidence: confidence,
            source,
        }
    }

    /// A direct posting accepted without validation.
    pub fn unvalidated_direct(url: &str, platform: &str) -> Self {
        Self {
            url: url.to_string(),
            title: String::new(),
            company: String::new(),
            location: String::new(),
            description: String::new(),
            platform: platform.to_string(),
            validation_confidence: 1.0,
            source: JobSource::Direct,
        }
    }
}

/// Result of running one URL through the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UrlOutcome {
    pub url: String,
    /// `None` when the unit failed or timed out before classification finished.
    pub kind: Option<UrlKind>,
    pub platform: String,
    pub confidence: f64,
    pub jobs: Vec<DiscoveredJob>,
    pub errors: Vec<String>,
    #[serde(with = "duration_secs")]
    pub duration: Duration,
}

impl UrlOutcome {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            kind: None,
            platform: "unknown".into(),
            confidence: 0.0,
            jobs: Vec::new(),
            errors: Vec::new(),
            duration: Duration::ZERO,
        }
    }

    /// Outcome for a unit that failed before producing anything.
    pub fn failed(url: &str, error: impl Into<String>, duration: Duration) -> Self {
        let mut outcome = Self::new(url);
        outcome.errors.push(error.into());
        outcome.duration = duration;
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validation(title: &str, company: &str) -> JobValidation {
        JobValidation {
            url: "https://jobs.lever.co/acme/123".into(),
            is_valid: true,
            confidence: 0.81,
            title: title.into(),
            company: company.into(),
            location: String::new(),
            description: "x".repeat(500),
            requirements: String::new(),
            status: JobStatus::Active,
            reason: "ok".into(),
            metadata: Metadata::new(),
        }
    }

    fn candidate() -> JobCandidate {
        JobCandidate {
            url: "https://jobs.lever.co/acme/123".into(),
            title: "Guessed Title".into(),
            company: "Acme".into(),
            location: "Remote".into(),
            snippet: "snippet".into(),
            platform: "lever".into(),
        }
    }

    #[test]
    fn test_failed_validation_is_error_status() {
        let v = JobValidation::failed("https://x.test/job/1", "navigation timeout");
        assert!(!v.is_valid);
        assert_eq!(v.status, JobStatus::Error);
        assert_eq!(v.confidence, 0.0);
        assert!(v.reason.contains("navigation timeout"));
    }

    #[test]
    fn test_from_validation_prefers_validator_fields() {
        let job = DiscoveredJob::from_validation(
            &validation("Senior Engineer", ""),
            Some(&candidate()),
            "unknown",
            JobSource::Listing,
        );
        assert_eq!(job.title, "Senior Engineer");
        assert_eq!(job.company, "Acme");
        assert_eq!(job.location, "Remote");
        assert_eq!(job.platform, "lever");
        assert_eq!(job.description.chars().count(), DESCRIPTION_PREVIEW_CHARS);
    }

    #[test]
    fn test_outcome_serializes_duration_as_seconds() {
        let outcome = UrlOutcome::failed("https://x.test", "boom", Duration::from_millis(1500));
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["duration"], serde_json::json!(1.5));
        assert_eq!(json["kind"], serde_json::Value::Null);
    }
}
