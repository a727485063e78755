//! Content fingerprint of a resolved seeding intent.

use crate::resolver::{MongoConnection, ResolvedIntent};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

/// Length of the fingerprint prefix used in resource names
pub const SHORT_FINGERPRINT_LEN: usize = 8;

fn canonical(intent: &ResolvedIntent) -> Value {
    let (uri, secret_name, secret_key) = match &intent.connection {
        MongoConnection::Uri(uri) => (Some(uri.as_str()), None, None),
        MongoConnection::Secret { name, key } => (None, Some(name.as_str()), Some(key.as_str())),
    };

    // Keys are written in a fixed order; any field added to the intent must
    // be added here too or it will not trigger a new run.
    json!({
        "size": intent.size,
        "seed": intent.random_seed,
        "mode": intent.mode.as_str(),
        "seedVersion": intent.seed_version,
        "titlePrefix": intent.title_prefix,
        "tags": intent.tags,
        "doneRatio": intent.done_ratio,
        "tagCountMin": intent.tag_count_min,
        "tagCountMax": intent.tag_count_max,
        "createdAtStart": intent.created_at_start,
        "createdAtEnd": intent.created_at_end,
        "database": intent.database,
        "collection": intent.collection,
        "mongodb": {
            "uri": uri,
            "secretName": secret_name,
            "secretKey": secret_key,
        },
    })
}

/// SHA-256 hex digest of the intent's canonical JSON form.
pub fn fingerprint(intent: &ResolvedIntent) -> String {
    let digest = Sha256::digest(canonical(intent).to_string().as_bytes());
    format!("{digest:x}")
}

/// Leading characters of a fingerprint, for resource names.
pub fn short_fingerprint(fingerprint: &str) -> &str {
    fingerprint.get(..SHORT_FINGERPRINT_LEN).unwrap_or(fingerprint)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::SeedMode;

    fn intent() -> ResolvedIntent {
        ResolvedIntent {
            size: 10,
            random_seed: 1,
            mode: SeedMode::Upsert,
            seed_version: String::new(),
            title_prefix: "Task".to_string(),
            tags: vec!["demo".to_string(), "seed".to_string()],
            done_ratio: 0.3,
            tag_count_min: 0,
            tag_count_max: 2,
            created_at_start: None,
            created_at_end: None,
            database: "taskdb".to_string(),
            collection: "tasks".to_string(),
            connection: MongoConnection::Uri("mongodb://mongo:27017".to_string()),
        }
    }

    #[test]
    fn test_fingerprint_is_stable_hex() {
        let first = fingerprint(&intent());
        let second = fingerprint(&intent());

        assert_eq!(first, second);
        assert_eq!(first.len(), 64);
        assert!(first.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_eq!(short_fingerprint(&first), &first[..8]);
    }

    fn assert_changes(field: &str, mutate: impl Fn(&mut ResolvedIntent)) {
        let mut changed = intent();
        mutate(&mut changed);
        assert_ne!(
            fingerprint(&changed),
            fingerprint(&intent()),
            "changing {field} must change the fingerprint"
        );
    }

    #[test]
    fn test_every_field_changes_fingerprint() {
        assert_changes("size", |i| i.size = 11);
        assert_changes("random_seed", |i| i.random_seed = 2);
        assert_changes("mode", |i| i.mode = SeedMode::Append);
        assert_changes("seed_version", |i| i.seed_version = "v2".to_string());
        assert_changes("title_prefix", |i| i.title_prefix = "Chore".to_string());
        assert_changes("tags", |i| i.tags.push("extra".to_string()));
        assert_changes("tag order", |i| i.tags.reverse());
        assert_changes("done_ratio", |i| i.done_ratio = 0.5);
        assert_changes("tag_count_min", |i| i.tag_count_min = 1);
        assert_changes("tag_count_max", |i| i.tag_count_max = 3);
        assert_changes("created_at_start", |i| {
            i.created_at_start = Some("2024-01-01T00:00:00Z".to_string())
        });
        assert_changes("created_at_end", |i| {
            i.created_at_end = Some("2024-01-01T00:00:00Z".to_string())
        });
        assert_changes("database", |i| i.database = "other".to_string());
        assert_changes("collection", |i| i.collection = "other".to_string());
        assert_changes("uri", |i| {
            i.connection = MongoConnection::Uri("mongodb://other:27017".to_string())
        });
        assert_changes("secret", |i| {
            i.connection = MongoConnection::Secret {
                name: "mongo".to_string(),
                key: "uri".to_string(),
            }
        });
    }

    #[test]
    fn test_secret_key_is_part_of_fingerprint() {
        let secret = |key: &str| ResolvedIntent {
            connection: MongoConnection::Secret {
                name: "mongo".to_string(),
                key: key.to_string(),
            },
            ..intent()
        };
        assert_ne!(fingerprint(&secret("uri")), fingerprint(&secret("connection")));
    }
}
