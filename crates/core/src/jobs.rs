//! Job kinds, modes, steps, and request validation.
//!
//! A job kind fixes which scripts run (in order), how the logical key and
//! crawl options become arguments, and where the result lands.

use std::collections::BTreeMap;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::artifacts::{clean_key, sanitize_key};
use crate::error::CoreError;

/// Default timeout for a single-script job (10 minutes).
pub const DEFAULT_JOB_TIMEOUT: Duration = Duration::from_secs(600);

/// Default timeout for a crawl, covering both the scraper and the analysis.
pub const DEFAULT_CRAWL_TIMEOUT: Duration = Duration::from_secs(1800);

/// Standalone analysis of an existing keyword.
pub const ANALYSIS_SCRIPT: &str = "scraper/data_analysis.py";
/// Keyword crawler; writes repositories to the database.
pub const CRAWL_SCRIPT: &str = "backend/scraper/crawlers/keyword_scraper.py";
/// Analysis run after a crawl.
pub const CRAWL_ANALYSIS_SCRIPT: &str = "backend/scraper/analyzers/data_analysis.py";
/// GitHub Trending collector; always refreshes daily, weekly and monthly together.
pub const TRENDING_SCRIPT: &str = "backend/scraper/trending_manager.py";
/// Time-series snapshot collector run after the trending collector.
pub const TIME_SERIES_SCRIPT: &str = "backend/scraper/time_series_trending_manager.py";

/// Where the trending collector writes, relative to its working directory.
pub const TRENDS_ARTIFACT: &str = "public/trends/data/trends.json";

/// Key recorded for trending jobs, which take no logical key.
pub const TRENDING_KEY: &str = "all";

/// Highest per-language repository limit accepted for a crawl.
pub const MAX_CRAWL_LIMIT: u32 = 1000;

static LANGUAGE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9+#._-]{1,32}$").expect("valid regex"));

/// Which external scripts a job runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// Re-analyse a keyword whose repositories are already crawled.
    #[default]
    Analysis,
    /// Crawl repositories for a keyword, then analyse them.
    Crawl,
    /// Refresh GitHub Trending, then record a time-series snapshot.
    Trending,
}

impl JobKind {
    pub const ALL: [JobKind; 3] = [JobKind::Analysis, JobKind::Crawl, JobKind::Trending];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Analysis => "analysis",
            Self::Crawl => "crawl",
            Self::Trending => "trending",
        }
    }

    /// Filename prefix of keyed artifacts, or `None` for kinds that write
    /// one fixed file.
    pub fn artifact_prefix(self) -> Option<&'static str> {
        match self {
            Self::Analysis | Self::Crawl => Some("analysis"),
            Self::Trending => None,
        }
    }

    /// Mode used when the request does not specify one.
    pub fn default_mode(self) -> JobMode {
        match self {
            Self::Analysis => JobMode::Sync,
            Self::Crawl | Self::Trending => JobMode::Async,
        }
    }

    /// Human-readable estimate returned for async launches.
    pub fn estimated_duration(self) -> &'static str {
        match self {
            Self::Analysis => "1-3 minutes",
            Self::Crawl => "5-20 minutes",
            Self::Trending => "5-10 minutes",
        }
    }

    /// Whether the child needs a GitHub token to do anything useful.
    pub fn requires_github_token(self) -> bool {
        matches!(self, Self::Trending)
    }

    /// Validate a raw logical key for this kind.
    ///
    /// Trending takes no key; whatever was sent is ignored and the job is
    /// recorded under [`TRENDING_KEY`].
    pub fn validate_key(self, raw: Option<&str>) -> Result<ValidKey, CoreError> {
        if self == Self::Trending {
            return Ok(ValidKey {
                raw: TRENDING_KEY.to_string(),
                clean: TRENDING_KEY.to_string(),
                sanitized: TRENDING_KEY.to_string(),
            });
        }

        let raw = raw.map(str::trim).unwrap_or_default();
        if raw.is_empty() {
            return Err(CoreError::Validation("logicalKey is required".to_string()));
        }

        let clean = clean_key(raw);
        if clean.is_empty() {
            return Err(CoreError::Validation(
                "logicalKey contains no usable characters".to_string(),
            ));
        }

        Ok(ValidKey {
            sanitized: sanitize_key(raw),
            raw: raw.to_string(),
            clean,
        })
    }

    /// Reject crawl options on kinds that cannot use them, and malformed ones.
    pub fn validate_options(self, options: &CrawlOptions) -> Result<(), CoreError> {
        if self != Self::Crawl {
            if options.is_empty() {
                return Ok(());
            }
            return Err(CoreError::Validation(
                "languages and limits apply to crawl jobs only".to_string(),
            ));
        }
        options.validate()
    }

    /// Scripts to run, in order, for a validated key and options.
    pub fn steps(self, key: &ValidKey, options: &CrawlOptions) -> Vec<JobStep> {
        let keywords = || vec!["--keywords".to_string(), key.clean.clone()];
        match self {
            Self::Analysis => vec![JobStep::new(ANALYSIS_SCRIPT, keywords())],
            Self::Crawl => {
                let mut args = keywords();
                args.extend(options.to_args());
                vec![
                    JobStep::new(CRAWL_SCRIPT, args),
                    JobStep::new(CRAWL_ANALYSIS_SCRIPT, keywords()),
                ]
            }
            Self::Trending => vec![
                JobStep::new(TRENDING_SCRIPT, Vec::new()),
                JobStep::new(TIME_SERIES_SCRIPT, Vec::new()),
            ],
        }
    }
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether the HTTP caller waits for the job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobMode {
    /// Wait for the process, then report its outcome.
    Sync,
    /// Return immediately; outcome is recorded for polling.
    Async,
}

/// A logical key that passed validation, in every form the job needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidKey {
    /// Trimmed key as supplied; used only for legacy artifact lookup.
    pub raw: String,
    /// Disallowed characters removed, single spaces; passed to the script.
    pub clean: String,
    /// Canonical filename fragment.
    pub sanitized: String,
}

/// One script invocation within a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobStep {
    /// Script path, relative to the scripts directory.
    pub script: &'static str,
    pub args: Vec<String>,
}

impl JobStep {
    fn new(script: &'static str, args: Vec<String>) -> Self {
        Self { script, args }
    }
}

/// Optional crawl scope: languages to search and per-language repository limits.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CrawlOptions {
    #[serde(default)]
    pub languages: Vec<String>,
    #[serde(default)]
    pub limits: BTreeMap<String, u32>,
}

impl CrawlOptions {
    pub fn is_empty(&self) -> bool {
        self.languages.is_empty() && self.limits.is_empty()
    }

    fn validate(&self) -> Result<(), CoreError> {
        let names = self
            .languages
            .iter()
            .chain(self.limits.keys())
            .map(String::as_str);
        for name in names {
            if !LANGUAGE_RE.is_match(name) {
                return Err(CoreError::Validation(format!(
                    "invalid language name '{name}'"
                )));
            }
        }

        if let Some((lang, limit)) = self
            .limits
            .iter()
            .find(|(_, limit)| **limit == 0 || **limit > MAX_CRAWL_LIMIT)
        {
            return Err(CoreError::Validation(format!(
                "limit for '{lang}' must be between 1 and {MAX_CRAWL_LIMIT}, got {limit}"
            )));
        }
        Ok(())
    }

    /// `--languages a,b` and `--limits a=n,b=m`, each value a single argument.
    fn to_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if !self.languages.is_empty() {
            args.push("--languages".to_string());
            args.push(self.languages.join(","));
        }
        if !self.limits.is_empty() {
            let limits: Vec<String> = self
                .limits
                .iter()
                .map(|(lang, limit)| format!("{lang}={limit}"))
                .collect();
            args.push("--limits".to_string());
            args.push(limits.join(","));
        }
        args
    }
}
