use std::path::{Path, PathBuf};
use std::time::Duration;

use trending_core::jobs::{JobKind, DEFAULT_CRAWL_TIMEOUT, DEFAULT_JOB_TIMEOUT, TRENDS_ARTIFACT};
use trending_core::scripting::interpreter::MinVersion;

/// Server configuration loaded from environment variables.
///
/// Defaults match a local checkout of the dashboard.
/// Deployments override them via the environment or `.env`.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `900`). Raised at runtime
    /// to cover the longest job, see [`effective_request_timeout`](Self::effective_request_timeout).
    pub request_timeout_secs: u64,
    /// How long shutdown waits for background jobs after cancelling them.
    pub shutdown_timeout_secs: u64,
    /// External job settings.
    pub jobs: JobsConfig,
}

/// Settings for launching external job scripts.
#[derive(Debug, Clone)]
pub struct JobsConfig {
    /// Interpreter override probed before the platform defaults.
    pub python_bin: Option<String>,
    /// Minimum interpreter version.
    pub python_min_version: MinVersion,
    /// Root that job script paths are relative to.
    pub scripts_dir: PathBuf,
    /// Directory the scripts write their keyed JSON artifacts into.
    /// Relative paths resolve against `scripts_dir`.
    pub artifacts_dir: PathBuf,
    /// File the trending collector overwrites on every run.
    /// Relative paths resolve against `scripts_dir`.
    pub trends_artifact: PathBuf,
    /// Credential variables forwarded (or defaulted to empty) in the child.
    pub credential_vars: Vec<String>,
    /// Connection string forwarded to the child as `DATABASE_URL`.
    pub database_url: Option<String>,
    pub analysis_timeout: Duration,
    /// Whole crawl, scraper and analysis together.
    pub crawl_timeout: Duration,
    /// Whole trending refresh, both collectors together.
    pub trending_timeout: Duration,
    /// Probe raw-key artifact names after the canonical one.
    pub legacy_artifact_lookup: bool,
    /// Rename legacy-named artifacts once at startup.
    pub migrate_legacy_artifacts: bool,
    /// Finished job records kept for polling and export.
    pub job_history_limit: usize,
}

impl JobsConfig {
    /// Timeout for a sync or async launch of `kind`.
    pub fn timeout_for(&self, kind: JobKind) -> Duration {
        match kind {
            JobKind::Analysis => self.analysis_timeout,
            JobKind::Crawl => self.crawl_timeout,
            JobKind::Trending => self.trending_timeout,
        }
    }

    /// Longest configured job timeout.
    pub fn max_timeout(&self) -> Duration {
        JobKind::ALL
            .into_iter()
            .map(|kind| self.timeout_for(kind))
            .max()
            .unwrap_or(DEFAULT_JOB_TIMEOUT)
    }

    /// Load job settings from environment variables with defaults.
    ///
    /// | Env Var                    | Default                                   |
    /// |----------------------------|-------------------------------------------|
    /// | `PYTHON_BIN`               | unset                                     |
    /// | `PYTHON_MIN_VERSION`       | `3.12`                                    |
    /// | `SCRIPTS_DIR`              | `.`                                       |
    /// | `ARTIFACTS_DIR`            | `public/analytics`                        |
    /// | `TRENDS_ARTIFACT`          | `public/trends/data/trends.json`          |
    /// | `CREDENTIAL_VARS`          | `GITHUB_TOKEN_PQG,...,GITHUB_TOKEN_XHY`   |
    /// | `DATABASE_URL`             | unset                                     |
    /// | `ANALYSIS_TIMEOUT_SECS`    | `600`                                     |
    /// | `CRAWL_TIMEOUT_SECS`       | `1800`                                    |
    /// | `TRENDING_TIMEOUT_SECS`    | `600`                                     |
    /// | `LEGACY_ARTIFACT_LOOKUP`   | `true`                                    |
    /// | `MIGRATE_LEGACY_ARTIFACTS` | `false`                                   |
    /// | `JOB_HISTORY_LIMIT`        | `200`                                     |
    pub fn from_env() -> Self {
        let python_bin = std::env::var("PYTHON_BIN")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        let python_min_version = match std::env::var("PYTHON_MIN_VERSION") {
            Ok(v) => MinVersion::parse(&v).expect("PYTHON_MIN_VERSION must look like 3.12"),
            Err(_) => MinVersion::default(),
        };

        let credential_vars = std::env::var("CREDENTIAL_VARS")
            .unwrap_or_else(|_| {
                "GITHUB_TOKEN_PQG,GITHUB_TOKEN_LR,GITHUB_TOKEN_HXZ,GITHUB_TOKEN_XHY".into()
            })
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let scripts_dir: PathBuf = std::env::var("SCRIPTS_DIR")
            .unwrap_or_else(|_| ".".into())
            .into();
        let artifacts_dir = resolve_under(
            &scripts_dir,
            std::env::var("ARTIFACTS_DIR").unwrap_or_else(|_| "public/analytics".into()),
        );
        let trends_artifact = resolve_under(
            &scripts_dir,
            std::env::var("TRENDS_ARTIFACT").unwrap_or_else(|_| TRENDS_ARTIFACT.into()),
        );

        Self {
            python_bin,
            python_min_version,
            scripts_dir,
            artifacts_dir,
            trends_artifact,
            credential_vars,
            database_url: std::env::var("DATABASE_URL").ok().filter(|s| !s.is_empty()),
            analysis_timeout: secs_from_env("ANALYSIS_TIMEOUT_SECS", DEFAULT_JOB_TIMEOUT),
            crawl_timeout: secs_from_env("CRAWL_TIMEOUT_SECS", DEFAULT_CRAWL_TIMEOUT),
            trending_timeout: secs_from_env("TRENDING_TIMEOUT_SECS", DEFAULT_JOB_TIMEOUT),
            legacy_artifact_lookup: bool_from_env("LEGACY_ARTIFACT_LOOKUP", true),
            migrate_legacy_artifacts: bool_from_env("MIGRATE_LEGACY_ARTIFACTS", false),
            job_history_limit: std::env::var("JOB_HISTORY_LIMIT")
                .unwrap_or_else(|_| "200".into())
                .parse()
                .expect("JOB_HISTORY_LIMIT must be a valid usize"),
        }
    }
}

/// Headroom added on top of the longest job before the HTTP layer times out.
pub const REQUEST_TIMEOUT_MARGIN: Duration = Duration::from_secs(30);

impl ServerConfig {
    /// Request timeout actually applied by the router.
    ///
    /// Never shorter than the longest job plus [`REQUEST_TIMEOUT_MARGIN`], so a
    /// sync job always reaches its own timeout first.
    pub fn effective_request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
            .max(self.jobs.max_timeout() + REQUEST_TIMEOUT_MARGIN)
    }

    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                | Default                    |
    /// |------------------------|----------------------------|
    /// | `HOST`                 | `0.0.0.0`                  |
    /// | `PORT`                 | `3000`                     |
    /// | `CORS_ORIGINS`         | `http://localhost:3000`    |
    /// | `REQUEST_TIMEOUT_SECS` | `900`                      |
    /// | `SHUTDOWN_TIMEOUT_SECS`| `30`                       |
    ///
    /// Job settings come from [`JobsConfig::from_env`].
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "3000".into())
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:3000".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs: u64 = std::env::var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "900".into())
            .parse()
            .expect("REQUEST_TIMEOUT_SECS must be a valid u64");

        let shutdown_timeout_secs: u64 = std::env::var("SHUTDOWN_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("SHUTDOWN_TIMEOUT_SECS must be a valid u64");

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            shutdown_timeout_secs,
            jobs: JobsConfig::from_env(),
        }
    }
}

/// Scripts run with `scripts_dir` as their working directory, so relative
/// output paths are relative to it.
fn resolve_under(base: &Path, value: String) -> PathBuf {
    let path = PathBuf::from(value);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
    }
}

fn secs_from_env(name: &str, default: Duration) -> Duration {
    match std::env::var(name) {
        Ok(v) => Duration::from_secs(
            v.parse()
                .unwrap_or_else(|_| panic!("{name} must be a valid u64")),
        ),
        Err(_) => default,
    }
}

fn bool_from_env(name: &str, default: bool) -> bool {
    match std::env::var(name) {
        Ok(v) => matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(request_timeout_secs: u64) -> ServerConfig {
        ServerConfig {
            host: "127.0.0.1".into(),
            port: 0,
            cors_origins: Vec::new(),
            request_timeout_secs,
            shutdown_timeout_secs: 5,
            jobs: JobsConfig {
                python_bin: None,
                python_min_version: MinVersion::default(),
                scripts_dir: PathBuf::from("/srv/app"),
                artifacts_dir: PathBuf::from("/srv/app/public/analytics"),
                trends_artifact: PathBuf::from("/srv/app/public/trends/data/trends.json"),
                credential_vars: Vec::new(),
                database_url: None,
                analysis_timeout: Duration::from_secs(600),
                crawl_timeout: Duration::from_secs(1800),
                trending_timeout: Duration::from_secs(600),
                legacy_artifact_lookup: true,
                migrate_legacy_artifacts: false,
                job_history_limit: 10,
            },
        }
    }

    #[test]
    fn max_timeout_covers_every_kind() {
        let config = config(900);
        assert_eq!(config.jobs.max_timeout(), Duration::from_secs(1800));
        assert_eq!(config.jobs.timeout_for(JobKind::Crawl), Duration::from_secs(1800));
    }

    #[test]
    fn request_timeout_is_raised_above_longest_job() {
        assert_eq!(config(900).effective_request_timeout(), Duration::from_secs(1830));
        assert_eq!(config(3600).effective_request_timeout(), Duration::from_secs(3600));
    }

    #[test]
    fn relative_outputs_resolve_under_scripts_dir() {
        let base = Path::new("/srv/app");
        assert_eq!(
            resolve_under(base, TRENDS_ARTIFACT.into()),
            PathBuf::from("/srv/app/public/trends/data/trends.json")
        );
        assert_eq!(resolve_under(base, "/data/x".into()), PathBuf::from("/data/x"));
    }
}
