//! # Controller Configuration
//!
//! Process-wide settings loaded once from environment variables at startup.
//! Every TaskSeed spec field has a default here; the resolver falls back to
//! these when a spec leaves the field unset.

use crate::error::ControllerError;
use crate::resolver::SeedMode;
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

/// Default poll interval between reconciliation passes
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
/// Default bound for a single cluster API call
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
/// Default number of finished seed Jobs retained per TaskSeed
pub const DEFAULT_JOB_HISTORY_LIMIT: usize = 3;

const PULL_POLICIES: [&str; 3] = ["Always", "IfNotPresent", "Never"];

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

/// Fallback values for every seeding field of a TaskSeed spec.
#[derive(Debug, Clone, PartialEq)]
pub struct SeedDefaults {
    /// MongoDB URI used when a spec gives neither a URI nor a secret
    pub mongo_uri: String,
    /// Target database
    pub database: String,
    /// Target collection
    pub collection: String,
    /// Number of tasks per run
    pub count: i64,
    /// Seed for the generator
    pub random_seed: i64,
    /// Write mode of one-shot runs
    pub mode: SeedMode,
    /// Prefix of generated task titles
    pub title_prefix: String,
    /// Tag pool generated tasks draw from
    pub tags: Vec<String>,
    /// Fraction of tasks generated as done
    pub done_ratio: f64,
    /// Fewest tags per task
    pub tag_count_min: i64,
    /// Most tags per task
    pub tag_count_max: i64,
}

impl Default for SeedDefaults {
    fn default() -> Self {
        Self {
            mongo_uri: String::new(),
            database: "taskdb".to_string(),
            collection: "tasks".to_string(),
            count: 50,
            random_seed: 1,
            mode: SeedMode::Upsert,
            title_prefix: "Task".to_string(),
            tags: vec!["demo".to_string(), "seed".to_string()],
            done_ratio: 0.3,
            tag_count_min: 0,
            tag_count_max: 2,
        }
    }
}

/// Fallback Job lifecycle knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobDefaults {
    /// Seconds a finished Job is kept before the TTL controller removes it
    pub ttl_seconds_after_finished: i32,
    /// Pod retries before the Job is marked failed
    pub backoff_limit: i32,
    /// Wall-clock bound on a Job run
    pub active_deadline_seconds: i64,
}

impl Default for JobDefaults {
    fn default() -> Self {
        Self {
            ttl_seconds_after_finished: 300,
            backoff_limit: 1,
            active_deadline_seconds: 300,
        }
    }
}

/// Controller-level configuration
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Namespace whose TaskSeeds are reconciled
    pub namespace: String,
    /// Interval between reconciliation passes
    pub poll_interval: Duration,
    /// Per-operation bound for cluster API calls
    pub request_timeout: Duration,
    /// Finished seed Jobs kept per TaskSeed before pruning
    pub job_history_limit: usize,
    /// Log output format
    pub log_format: LogFormat,
    /// Image that runs the seeder executable
    pub seed_job_image: String,
    /// Image pull policy of the seeder container
    pub seed_job_pull_policy: String,
    /// Fallbacks for unset spec fields
    pub seed_defaults: SeedDefaults,
    /// Fallbacks for unset Job lifecycle fields
    pub job_defaults: JobDefaults,
}

impl ControllerConfig {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self, ControllerError> {
        Self::from_lookup(&|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    ///
    /// Empty values are treated as unset.
    pub fn from_lookup(lookup: &dyn Fn(&str) -> Option<String>) -> Result<Self, ControllerError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let seed_job_image = get("SEED_JOB_IMAGE").ok_or_else(|| {
            ControllerError::InvalidConfig("SEED_JOB_IMAGE environment variable is required".to_string())
        })?;

        let seed_job_pull_policy =
            get("SEED_JOB_IMAGE_PULL_POLICY").unwrap_or_else(|| "IfNotPresent".to_string());
        if !PULL_POLICIES.contains(&seed_job_pull_policy.as_str()) {
            return Err(ControllerError::InvalidConfig(format!(
                "invalid SEED_JOB_IMAGE_PULL_POLICY: {seed_job_pull_policy} (expected one of {})",
                PULL_POLICIES.join(", ")
            )));
        }

        let namespace = get("SEED_CONTROLLER_NAMESPACE")
            .or_else(|| get("POD_NAMESPACE"))
            .unwrap_or_else(|| "default".to_string());

        let log_format = match get("LOG_FORMAT").map(|v| v.to_lowercase()).as_deref() {
            None | Some("text") => LogFormat::Text,
            Some("json") => LogFormat::Json,
            Some(other) => {
                return Err(ControllerError::InvalidConfig(format!("invalid LOG_FORMAT: {other}")));
            }
        };

        let fallback = SeedDefaults::default();
        let seed_defaults = SeedDefaults {
            mongo_uri: get("DEFAULT_MONGODB_URI").unwrap_or(fallback.mongo_uri),
            database: get("DEFAULT_MONGODB_DB").unwrap_or(fallback.database),
            collection: get("DEFAULT_MONGODB_COLLECTION").unwrap_or(fallback.collection),
            count: parsed(&get, "DEFAULT_SEED_COUNT", fallback.count)?,
            random_seed: parsed(&get, "DEFAULT_SEED_RANDOM_SEED", fallback.random_seed)?,
            mode: parsed(&get, "DEFAULT_SEED_MODE", fallback.mode)?,
            title_prefix: get("DEFAULT_SEED_TITLE_PREFIX").unwrap_or(fallback.title_prefix),
            tags: get("DEFAULT_SEED_TAGS").map_or(fallback.tags, |v| split_comma_list(&v)),
            done_ratio: parsed(&get, "DEFAULT_SEED_DONE_RATIO", fallback.done_ratio)?,
            tag_count_min: parsed(&get, "DEFAULT_SEED_TAG_COUNT_MIN", fallback.tag_count_min)?,
            tag_count_max: parsed(&get, "DEFAULT_SEED_TAG_COUNT_MAX", fallback.tag_count_max)?,
        };

        let job_fallback = JobDefaults::default();
        let job_defaults = JobDefaults {
            ttl_seconds_after_finished: parsed(
                &get,
                "DEFAULT_JOB_TTL_SECONDS_AFTER_FINISHED",
                job_fallback.ttl_seconds_after_finished,
            )?,
            backoff_limit: parsed(&get, "DEFAULT_JOB_BACKOFF_LIMIT", job_fallback.backoff_limit)?,
            active_deadline_seconds: parsed(
                &get,
                "DEFAULT_JOB_ACTIVE_DEADLINE_SECONDS",
                job_fallback.active_deadline_seconds,
            )?,
        };

        Ok(Self {
            namespace,
            poll_interval: duration(&get, "SEED_CONTROLLER_POLL_INTERVAL", DEFAULT_POLL_INTERVAL)?,
            request_timeout: duration(&get, "CLUSTER_REQUEST_TIMEOUT", DEFAULT_REQUEST_TIMEOUT)?,
            job_history_limit: parsed(&get, "SEED_JOB_HISTORY_LIMIT", DEFAULT_JOB_HISTORY_LIMIT)?,
            log_format,
            seed_job_image,
            seed_job_pull_policy,
            seed_defaults,
            job_defaults,
        })
    }
}

/// Parse an optional variable, naming it in the error when malformed.
fn parsed<T>(get: &dyn Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T, ControllerError>
where
    T: FromStr,
    T::Err: Display,
{
    match get(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| ControllerError::InvalidConfig(format!("invalid {key}: {e}"))),
    }
}

fn duration(
    get: &dyn Fn(&str) -> Option<String>,
    key: &str,
    default: Duration,
) -> Result<Duration, ControllerError> {
    match get(key) {
        None => Ok(default),
        Some(raw) => parse_duration(&raw)
            .map_err(|e| ControllerError::InvalidConfig(format!("invalid {key}: {e}"))),
    }
}

/// Parse a duration such as `500ms`, `5s`, `2m`, `1h`, or bare seconds.
pub fn parse_duration(value: &str) -> Result<Duration, String> {
    let trimmed = value.trim().to_lowercase();
    let (number, unit_millis) = if let Some(n) = trimmed.strip_suffix("ms") {
        (n, 1)
    } else if let Some(n) = trimmed.strip_suffix('s') {
        (n, 1_000)
    } else if let Some(n) = trimmed.strip_suffix('m') {
        (n, 60_000)
    } else if let Some(n) = trimmed.strip_suffix('h') {
        (n, 3_600_000)
    } else {
        (trimmed.as_str(), 1_000)
    };

    let amount: u64 = number
        .trim()
        .parse()
        .map_err(|_| format!("'{value}' is not a duration (expected e.g. 500ms, 5s, 1m)"))?;
    if amount == 0 {
        return Err(format!("'{value}' must be greater than zero"));
    }
    amount
        .checked_mul(unit_millis)
        .map(Duration::from_millis)
        .ok_or_else(|| format!("'{value}' is too large"))
}

/// Split a comma-separated list, dropping blank entries.
pub fn split_comma_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> Result<ControllerConfig, ControllerError> {
        let env: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        ControllerConfig::from_lookup(&|key| env.get(key).cloned())
    }

    #[test]
    fn test_defaults_with_only_image() {
        let config = load(&[("SEED_JOB_IMAGE", "ghcr.io/example/seeder:1.0")]).unwrap();

        assert_eq!(config.namespace, "default");
        assert_eq!(config.poll_interval, Duration::from_secs(5));
        assert_eq!(config.request_timeout, Duration::from_secs(10));
        assert_eq!(config.job_history_limit, 3);
        assert_eq!(config.seed_job_pull_policy, "IfNotPresent");
        assert_eq!(config.seed_defaults, SeedDefaults::default());
        assert_eq!(config.job_defaults, JobDefaults::default());
        assert_eq!(config.log_format, LogFormat::Text);
    }

    #[test]
    fn test_missing_image_is_fatal() {
        let err = load(&[("DEFAULT_SEED_COUNT", "10")]).unwrap_err();
        assert!(matches!(err, ControllerError::InvalidConfig(msg) if msg.contains("SEED_JOB_IMAGE")));

        let blank = load(&[("SEED_JOB_IMAGE", "   ")]).unwrap_err();
        assert!(matches!(blank, ControllerError::InvalidConfig(_)));
    }

    #[test]
    fn test_malformed_values_name_the_variable() {
        let err = load(&[("SEED_JOB_IMAGE", "img"), ("DEFAULT_SEED_COUNT", "many")]).unwrap_err();
        assert!(err.to_string().contains("DEFAULT_SEED_COUNT"));

        let err = load(&[("SEED_JOB_IMAGE", "img"), ("DEFAULT_SEED_MODE", "shuffle")]).unwrap_err();
        assert!(err.to_string().contains("DEFAULT_SEED_MODE"));

        let err = load(&[("SEED_JOB_IMAGE", "img"), ("SEED_JOB_IMAGE_PULL_POLICY", "Sometimes")]).unwrap_err();
        assert!(err.to_string().contains("SEED_JOB_IMAGE_PULL_POLICY"));
    }

    #[test]
    fn test_namespace_falls_back_to_pod_namespace() {
        let config = load(&[("SEED_JOB_IMAGE", "img"), ("POD_NAMESPACE", "seeding")]).unwrap();
        assert_eq!(config.namespace, "seeding");

        let config = load(&[
            ("SEED_JOB_IMAGE", "img"),
            ("POD_NAMESPACE", "seeding"),
            ("SEED_CONTROLLER_NAMESPACE", "tasks"),
        ])
        .unwrap();
        assert_eq!(config.namespace, "tasks");
    }

    #[test]
    fn test_overrides_are_applied() {
        let config = load(&[
            ("SEED_JOB_IMAGE", "img"),
            ("SEED_CONTROLLER_POLL_INTERVAL", "30s"),
            ("DEFAULT_SEED_MODE", "Append"),
            ("DEFAULT_SEED_TAGS", " alpha, ,beta "),
            ("DEFAULT_JOB_BACKOFF_LIMIT", "4"),
            ("LOG_FORMAT", "JSON"),
        ])
        .unwrap();

        assert_eq!(config.poll_interval, Duration::from_secs(30));
        assert_eq!(config.seed_defaults.mode, SeedMode::Append);
        assert_eq!(config.seed_defaults.tags, vec!["alpha", "beta"]);
        assert_eq!(config.job_defaults.backoff_limit, 4);
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn test_parse_duration_units() {
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("5s").unwrap(), Duration::from_secs(5));
        assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(120));
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
        assert_eq!(parse_duration("15").unwrap(), Duration::from_secs(15));
        assert!(parse_duration("0s").is_err());
        assert!(parse_duration("soon").is_err());
    }
}
