use secrecy::SecretString;
use serde::{Deserialize, Serialize};

/// One configured migration rule: copy objects from a remote bucket/container
/// into a local container, subject to an optional prefix and age filter.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Migration {
    pub account: String,
    pub aws_identity: String,
    #[serde(skip_serializing, default)]
    pub aws_secret: Option<SecretString>,
    pub aws_endpoint: Option<String>,
    pub aws_bucket: String,
    #[serde(default)]
    pub container: Option<String>,
    pub protocol: Protocol,
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(default)]
    pub custom_prefix: Option<String>,
    #[serde(default)]
    pub older_than: u64,
    #[serde(default)]
    pub propagate_account_metadata: bool,
    #[serde(default)]
    pub remote_account: Option<String>,
    #[serde(default)]
    pub storage_policy: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    S3,
    Swift,
}

impl Migration {
    pub fn destination_container(&self) -> &str {
        self.container.as_deref().unwrap_or(&self.aws_bucket)
    }

    pub fn is_all_buckets(&self) -> bool {
        self.aws_bucket == "/*"
    }

    /// A `"/*"` bucket/container on either side of a comparison matches
    /// unconditionally, so a per-bucket status record written under an
    /// all-buckets migration still compares equal to the original
    /// `aws_bucket = "/*"` config entry.
    fn bucket_matches(&self, other: &Migration) -> bool {
        self.is_all_buckets() || other.is_all_buckets() || self.aws_bucket == other.aws_bucket
    }

    fn container_matches(&self, other: &Migration) -> bool {
        let (a, b) = (self.destination_container(), other.destination_container());
        a == "/*" || b == "/*" || a == b
    }

    /// Two migrations are equal iff they agree on every field except the
    /// status/secret/derived set (`aws_secret`, `custom_prefix`,
    /// `all_buckets`), and treat `"/*"` buckets/containers as wildcards that
    /// match any concrete value on the other side.
    pub fn equal_to(&self, other: &Migration) -> bool {
        self.account == other.account
            && self.aws_identity == other.aws_identity
            && self.aws_endpoint == other.aws_endpoint
            && self.bucket_matches(other)
            && self.container_matches(other)
            && self.protocol == other.protocol
            && self.prefix == other.prefix
            && self.older_than == other.older_than
            && self.propagate_account_metadata == other.propagate_account_metadata
            && self.remote_account == other.remote_account
            && self.storage_policy == other.storage_policy
    }
}

/// Daemon-level settings independent of any single migration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DaemonConfig {
    pub status_file: String,
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_items_chunk")]
    pub items_chunk: usize,
    #[serde(default = "default_poll_interval")]
    pub poll_interval: u64,
    #[serde(default = "default_segment_size")]
    pub segment_size: u64,
    #[serde(default = "default_ring_name")]
    pub ring_name: String,
    #[serde(default)]
    pub statsd_host: Option<String>,
    #[serde(default)]
    pub statsd_port: Option<u16>,
    #[serde(default = "default_statsd_prefix")]
    pub statsd_prefix: String,
}

fn default_workers() -> usize {
    10
}

fn default_items_chunk() -> usize {
    1000
}

fn default_poll_interval() -> u64 {
    5
}

fn default_segment_size() -> u64 {
    100 * 1024 * 1024
}

fn default_ring_name() -> String {
    "container".to_string()
}

fn default_statsd_prefix() -> String {
    "migrator".to_string()
}

/// Top-level configuration: daemon settings plus the list of migrations to run.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub migrations: Vec<Migration>,
}

impl AppConfig {
    pub fn from_toml_str(s: &str) -> crate::error::Result<Self> {
        toml::from_str(s).map_err(|e| crate::error::Error::Generic(format!("invalid config: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(bucket: &str) -> Migration {
        Migration {
            account: "acct".into(),
            aws_identity: "id".into(),
            aws_secret: None,
            aws_endpoint: None,
            aws_bucket: bucket.into(),
            container: None,
            protocol: Protocol::S3,
            prefix: None,
            custom_prefix: Some("ignored".into()),
            older_than: 0,
            propagate_account_metadata: false,
            remote_account: None,
            storage_policy: None,
        }
    }

    #[test]
    fn equal_ignores_custom_prefix_and_secret() {
        let mut a = sample("bucket-a");
        let mut b = sample("bucket-a");
        a.custom_prefix = Some("one".into());
        b.custom_prefix = Some("two".into());
        b.aws_secret = Some(SecretString::from("shh".to_string()));
        assert!(a.equal_to(&b));
    }

    #[test]
    fn wildcard_buckets_compare_equal() {
        let a = sample("/*");
        let b = sample("/*");
        assert!(a.equal_to(&b));
    }

    #[test]
    fn wildcard_on_either_side_matches_a_concrete_bucket() {
        let wildcard = sample("/*");
        let concrete = sample("bucket1");
        assert!(wildcard.equal_to(&concrete));
        assert!(concrete.equal_to(&wildcard));
    }

    #[test]
    fn differing_bucket_is_not_equal() {
        let a = sample("bucket-a");
        let b = sample("bucket-b");
        assert!(!a.equal_to(&b));
    }
}
