//! Input resolution for TaskSeed specs.
//!
//! Merges a `TaskSeedSpec` with the controller's process-wide defaults into
//! a validated [`ResolvedIntent`]. A fresh intent is built on every pass and
//! never persisted.

use crate::config::SeedDefaults;
use crate::error::ControllerError;
use chrono::{DateTime, FixedOffset};
use crds::TaskSeedSpec;
use std::fmt;
use std::str::FromStr;

/// Secret key read when a `uriSecretRef` does not name one.
pub const DEFAULT_SECRET_KEY: &str = "uri";

/// How the seeder writes documents into the target collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SeedMode {
    /// Insert new documents alongside existing ones
    Append,
    /// Clear the collection before inserting
    Replace,
    /// Insert or overwrite documents by generated key
    Upsert,
    /// Recurring upkeep run by the maintenance CronJob
    Maintain,
}

impl SeedMode {
    /// Value passed to the seeder as `SEED_MODE`
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Append => "append",
            Self::Replace => "replace",
            Self::Upsert => "upsert",
            Self::Maintain => "maintain",
        }
    }
}

impl fmt::Display for SeedMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SeedMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "append" => Ok(Self::Append),
            "replace" => Ok(Self::Replace),
            "upsert" => Ok(Self::Upsert),
            "maintain" => Ok(Self::Maintain),
            _ => Err(format!(
                "unknown seed mode '{s}' (expected append, replace, upsert or maintain)"
            )),
        }
    }
}

/// Where the seeder obtains its MongoDB connection URI.
///
/// Exactly one source is ever usable: a secret reference always wins over
/// any literal URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MongoConnection {
    /// Literal URI passed straight through
    Uri(String),
    /// URI read from a Secret key at pod start
    Secret {
        /// Secret name
        name: String,
        /// Key within the Secret
        key: String,
    },
}

/// Fully merged, validated seeding request.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedIntent {
    /// Number of tasks to generate
    pub size: i64,
    /// Seed for the generator
    pub random_seed: i64,
    /// Write mode
    pub mode: SeedMode,
    /// Free-form version tag, blank when unset
    pub seed_version: String,
    /// Prefix of generated task titles
    pub title_prefix: String,
    /// Tag pool generated tasks draw from
    pub tags: Vec<String>,
    /// Fraction of tasks generated as done, in `[0, 1]`
    pub done_ratio: f64,
    /// Fewest tags per task
    pub tag_count_min: i64,
    /// Most tags per task, never below `tag_count_min`
    pub tag_count_max: i64,
    /// Start of the creation timestamp window
    pub created_at_start: Option<String>,
    /// End of the creation timestamp window
    pub created_at_end: Option<String>,
    /// Target database
    pub database: String,
    /// Target collection
    pub collection: String,
    /// Where the seeder reads its MongoDB URI from
    pub connection: MongoConnection,
}

fn non_blank(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn parse_window_bound(field: &str, value: &str) -> Result<DateTime<FixedOffset>, ControllerError> {
    DateTime::parse_from_rfc3339(value)
        .map_err(|e| ControllerError::InvalidSpec(format!("spec.{field} must be RFC 3339: {e}")))
}

/// Merge `spec` over `defaults` and validate the result.
///
/// # Errors
///
/// Returns `ControllerError::InvalidSpec` describing the first offending
/// field.
pub fn resolve(defaults: &SeedDefaults, spec: &TaskSeedSpec) -> Result<ResolvedIntent, ControllerError> {
    let size = spec.size.unwrap_or(defaults.count);
    if size <= 0 {
        return Err(ControllerError::InvalidSpec("spec.size must be greater than zero".to_string()));
    }

    let random_seed = spec.seed.unwrap_or(defaults.random_seed);

    let mode = match non_blank(&spec.mode) {
        Some(raw) => raw
            .parse::<SeedMode>()
            .map_err(|_| ControllerError::InvalidSpec(format!("invalid spec.mode: {}", spec.mode)))?,
        None => defaults.mode,
    };

    let done_ratio = spec.done_ratio.unwrap_or(defaults.done_ratio);
    if !(0.0..=1.0).contains(&done_ratio) {
        return Err(ControllerError::InvalidSpec("spec.doneRatio must be between 0 and 1".to_string()));
    }

    let tag_count_min = spec.tag_count_min.unwrap_or(defaults.tag_count_min);
    let tag_count_max = spec.tag_count_max.unwrap_or(defaults.tag_count_max);
    if tag_count_min < 0 || tag_count_max < 0 || tag_count_max < tag_count_min {
        return Err(ControllerError::InvalidSpec(format!(
            "invalid tag count range: min {tag_count_min}, max {tag_count_max}"
        )));
    }

    let created_at_start = non_blank(&spec.created_at_start);
    let created_at_end = non_blank(&spec.created_at_end);
    let start = created_at_start
        .as_deref()
        .map(|v| parse_window_bound("createdAtStart", v))
        .transpose()?;
    let end = created_at_end
        .as_deref()
        .map(|v| parse_window_bound("createdAtEnd", v))
        .transpose()?;
    if let (Some(start), Some(end)) = (start, end) {
        if end < start {
            return Err(ControllerError::InvalidSpec(
                "spec.createdAtEnd must not be before spec.createdAtStart".to_string(),
            ));
        }
    }

    let database = non_blank(&spec.database).unwrap_or_else(|| defaults.database.clone());
    let collection = non_blank(&spec.collection).unwrap_or_else(|| defaults.collection.clone());
    if database.is_empty() || collection.is_empty() {
        return Err(ControllerError::InvalidSpec("database and collection names are required".to_string()));
    }

    let connection = match &spec.mongodb.uri_secret_ref {
        Some(secret) => {
            let name = non_blank(&secret.name).ok_or_else(|| {
                ControllerError::InvalidSpec("spec.mongodb.uriSecretRef.name is required".to_string())
            })?;
            let key = non_blank(&secret.key).unwrap_or_else(|| DEFAULT_SECRET_KEY.to_string());
            MongoConnection::Secret { name, key }
        }
        None => {
            let uri = non_blank(&spec.mongodb.uri)
                .or_else(|| non_blank(&defaults.mongo_uri))
                .ok_or_else(|| ControllerError::InvalidSpec("mongodb uri is required".to_string()))?;
            MongoConnection::Uri(uri)
        }
    };

    let tags: Vec<String> = spec.tags.iter().filter_map(|t| non_blank(t)).collect();
    let tags = if tags.is_empty() { defaults.tags.clone() } else { tags };

    let title_prefix = non_blank(&spec.title_prefix).unwrap_or_else(|| defaults.title_prefix.clone());

    Ok(ResolvedIntent {
        size,
        random_seed,
        mode,
        seed_version: spec.seed_version.trim().to_string(),
        title_prefix,
        tags,
        done_ratio,
        tag_count_min,
        tag_count_max,
        created_at_start,
        created_at_end,
        database,
        collection,
        connection,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crds::{MongoConnectionSpec, SecretKeyRef};

    fn defaults() -> SeedDefaults {
        SeedDefaults {
            mongo_uri: "mongodb://mongo:27017".to_string(),
            ..SeedDefaults::default()
        }
    }

    fn invalid(spec: &TaskSeedSpec) -> String {
        match resolve(&defaults(), spec) {
            Err(ControllerError::InvalidSpec(msg)) => msg,
            other => panic!("expected InvalidSpec, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_spec_uses_defaults() {
        let intent = resolve(&defaults(), &TaskSeedSpec::default()).unwrap();

        assert_eq!(intent.size, 50);
        assert_eq!(intent.random_seed, 1);
        assert_eq!(intent.mode, SeedMode::Upsert);
        assert_eq!(intent.title_prefix, "Task");
        assert_eq!(intent.tags, vec!["demo", "seed"]);
        assert_eq!(intent.database, "taskdb");
        assert_eq!(intent.collection, "tasks");
        assert_eq!(intent.connection, MongoConnection::Uri("mongodb://mongo:27017".to_string()));
        assert!(intent.created_at_start.is_none());
    }

    #[test]
    fn test_spec_overrides_win() {
        let spec = TaskSeedSpec {
            size: Some(10),
            seed: Some(-7),
            mode: "  APPEND ".to_string(),
            title_prefix: "Chore".to_string(),
            tags: vec!["home".to_string(), " ".to_string()],
            database: "other".to_string(),
            collection: "todo".to_string(),
            ..Default::default()
        };
        let intent = resolve(&defaults(), &spec).unwrap();

        assert_eq!(intent.size, 10);
        assert_eq!(intent.random_seed, -7);
        assert_eq!(intent.mode, SeedMode::Append);
        assert_eq!(intent.title_prefix, "Chore");
        assert_eq!(intent.tags, vec!["home"]);
        assert_eq!(intent.database, "other");
        assert_eq!(intent.collection, "todo");
    }

    #[test]
    fn test_blank_title_prefix_falls_back() {
        let spec = TaskSeedSpec {
            title_prefix: "   ".to_string(),
            ..Default::default()
        };
        assert_eq!(resolve(&defaults(), &spec).unwrap().title_prefix, "Task");
    }

    #[test]
    fn test_size_must_be_positive() {
        let msg = invalid(&TaskSeedSpec { size: Some(0), ..Default::default() });
        assert!(msg.contains("size"));
        invalid(&TaskSeedSpec { size: Some(-3), ..Default::default() });
    }

    #[test]
    fn test_unknown_mode_rejected() {
        let msg = invalid(&TaskSeedSpec { mode: "shuffle".to_string(), ..Default::default() });
        assert!(msg.contains("shuffle"));
    }

    #[test]
    fn test_done_ratio_boundaries() {
        for ok in [0.0, 1.0, 0.5] {
            let spec = TaskSeedSpec { done_ratio: Some(ok), ..Default::default() };
            assert_eq!(resolve(&defaults(), &spec).unwrap().done_ratio, ok);
        }
        for bad in [1.01, -0.01, f64::NAN] {
            invalid(&TaskSeedSpec { done_ratio: Some(bad), ..Default::default() });
        }
    }

    #[test]
    fn test_tag_count_range() {
        let equal = TaskSeedSpec {
            tag_count_min: Some(2),
            tag_count_max: Some(2),
            ..Default::default()
        };
        assert!(resolve(&defaults(), &equal).is_ok());

        invalid(&TaskSeedSpec {
            tag_count_min: Some(3),
            tag_count_max: Some(1),
            ..Default::default()
        });
        invalid(&TaskSeedSpec { tag_count_min: Some(-1), ..Default::default() });
        // Default max is 2, so a min above it alone is a broken range.
        invalid(&TaskSeedSpec { tag_count_min: Some(5), ..Default::default() });
    }

    #[test]
    fn test_secret_ref_discards_literal_uri() {
        let spec = TaskSeedSpec {
            mongodb: MongoConnectionSpec {
                uri: "mongodb://literal:27017".to_string(),
                uri_secret_ref: Some(SecretKeyRef {
                    name: "mongo-credentials".to_string(),
                    key: String::new(),
                }),
            },
            ..Default::default()
        };
        let intent = resolve(&defaults(), &spec).unwrap();

        assert_eq!(
            intent.connection,
            MongoConnection::Secret {
                name: "mongo-credentials".to_string(),
                key: DEFAULT_SECRET_KEY.to_string(),
            }
        );
    }

    #[test]
    fn test_missing_connection_rejected() {
        let no_default = SeedDefaults::default();
        match resolve(&no_default, &TaskSeedSpec::default()) {
            Err(ControllerError::InvalidSpec(msg)) => assert!(msg.contains("uri")),
            other => panic!("expected InvalidSpec, got {other:?}"),
        }

        let spec = TaskSeedSpec {
            mongodb: MongoConnectionSpec {
                uri: "mongodb://spec:27017".to_string(),
                uri_secret_ref: None,
            },
            ..Default::default()
        };
        let intent = resolve(&no_default, &spec).unwrap();
        assert_eq!(intent.connection, MongoConnection::Uri("mongodb://spec:27017".to_string()));
    }

    #[test]
    fn test_blank_secret_name_rejected() {
        invalid(&TaskSeedSpec {
            mongodb: MongoConnectionSpec {
                uri: String::new(),
                uri_secret_ref: Some(SecretKeyRef::default()),
            },
            ..Default::default()
        });
    }

    #[test]
    fn test_created_at_window() {
        let ok = TaskSeedSpec {
            created_at_start: "2024-01-01T00:00:00Z".to_string(),
            created_at_end: "2024-02-01T00:00:00+02:00".to_string(),
            ..Default::default()
        };
        let intent = resolve(&defaults(), &ok).unwrap();
        assert_eq!(intent.created_at_start.as_deref(), Some("2024-01-01T00:00:00Z"));

        invalid(&TaskSeedSpec {
            created_at_start: "yesterday".to_string(),
            ..Default::default()
        });
        invalid(&TaskSeedSpec {
            created_at_start: "2024-02-01T00:00:00Z".to_string(),
            created_at_end: "2024-01-01T00:00:00Z".to_string(),
            ..Default::default()
        });
    }
}
