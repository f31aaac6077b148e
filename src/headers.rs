use std::collections::BTreeMap;

use crate::timestamp::Timestamp;

pub const MIGRATOR_OBJECT_HEADER: &str = "x-sys-migrator-object";
pub const MIGRATOR_CONTAINER_HEADER: &str = "x-sys-migrator-container";
pub const OBJECT_MANIFEST_HEADER: &str = "x-object-manifest";
pub const STATIC_LARGE_OBJECT_HEADER: &str = "x-static-large-object";
pub const TIMESTAMP_HEADER: &str = "x-timestamp";
pub const MPU_PARTS_COUNT_HEADER: &str = "x-amz-mp-parts-count";
pub const STORAGE_POLICY_HEADER: &str = "x-storage-policy";
pub const VERSIONS_LOCATION_HEADER: &str = "x-versions-location";
pub const HISTORY_LOCATION_HEADER: &str = "x-history-location";

/// State carried in [`MIGRATOR_CONTAINER_HEADER`] for containers the migrator owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerState {
    Migrating,
    SrcDeleted,
    Modified,
}

impl ContainerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContainerState::Migrating => "MIGRATING",
            ContainerState::SrcDeleted => "SRC_DELETED",
            ContainerState::Modified => "MODIFIED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "MIGRATING" => Some(ContainerState::Migrating),
            "SRC_DELETED" => Some(ContainerState::SrcDeleted),
            "MODIFIED" => Some(ContainerState::Modified),
            _ => None,
        }
    }
}

/// A case-insensitive header map, keyed by lower-cased header name. Keeps the
/// transport layer (Provider/InternalClient implementations) responsible for
/// converting to/from this at the wire boundary; the reconciler and large
/// object handler only ever see typed accessors.
#[derive(Debug, Clone, Default)]
pub struct HeaderMap(BTreeMap<String, String>);

impl HeaderMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into().to_ascii_lowercase(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(&name.to_ascii_lowercase()).map(|s| s.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(&name.to_ascii_lowercase())
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.0.remove(&name.to_ascii_lowercase())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Typed metadata envelope for a single object, independent of which store it
/// came from. Built from a raw [`HeaderMap`] at the transport boundary.
#[derive(Debug, Clone)]
pub struct ObjectMeta {
    pub headers: HeaderMap,
    pub etag: String,
    pub content_length: u64,
}

impl ObjectMeta {
    pub fn new(headers: HeaderMap, etag: impl Into<String>, content_length: u64) -> Self {
        Self {
            headers,
            etag: etag.into(),
            content_length,
        }
    }

    pub fn is_migrator_owned(&self) -> bool {
        self.headers.contains(MIGRATOR_OBJECT_HEADER)
    }

    pub fn migrator_timestamp(&self) -> Option<Timestamp> {
        self.headers
            .get(MIGRATOR_OBJECT_HEADER)
            .and_then(|v| v.parse().ok())
    }

    pub fn x_timestamp(&self) -> Option<Timestamp> {
        self.headers.get(TIMESTAMP_HEADER).and_then(|v| v.parse().ok())
    }

    pub fn dlo_manifest_prefix(&self) -> Option<&str> {
        self.headers.get(OBJECT_MANIFEST_HEADER)
    }

    pub fn is_static_large_object(&self) -> bool {
        self.headers
            .get(STATIC_LARGE_OBJECT_HEADER)
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false)
    }

    pub fn mpu_parts_count(&self) -> Option<u32> {
        self.headers.get(MPU_PARTS_COUNT_HEADER).and_then(|v| v.parse().ok())
    }

    /// Detects an S3 multipart-upload etag of the form `<hex>-<n>`.
    pub fn is_multipart_etag(&self) -> bool {
        if self.mpu_parts_count().is_some() {
            return true;
        }
        match self.etag.rsplit_once('-') {
            Some((hex_part, count_part)) => {
                !hex_part.is_empty()
                    && hex_part.bytes().all(|b| b.is_ascii_hexdigit())
                    && count_part.parse::<u32>().is_ok()
            }
            None => false,
        }
    }

    pub fn set_migrator_object(&mut self, ts: Timestamp) {
        self.headers.insert(MIGRATOR_OBJECT_HEADER, ts.to_string());
        self.headers.insert(TIMESTAMP_HEADER, ts.to_string());
    }
}

/// Typed metadata envelope for a container.
#[derive(Debug, Clone)]
pub struct ContainerMeta {
    pub headers: HeaderMap,
}

impl ContainerMeta {
    pub fn new(headers: HeaderMap) -> Self {
        Self { headers }
    }

    pub fn is_migrator_owned(&self) -> bool {
        self.headers.contains(MIGRATOR_CONTAINER_HEADER)
    }

    pub fn state(&self) -> Option<ContainerState> {
        self.headers
            .get(MIGRATOR_CONTAINER_HEADER)
            .and_then(ContainerState::parse)
    }

    pub fn set_state(&mut self, state: ContainerState) {
        self.headers.insert(MIGRATOR_CONTAINER_HEADER, state.as_str());
    }

    pub fn versioning_location(&self) -> Option<&str> {
        self.headers
            .get(VERSIONS_LOCATION_HEADER)
            .or_else(|| self.headers.get(HISTORY_LOCATION_HEADER))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_multipart_etag_shape() {
        let mut meta = ObjectMeta::new(HeaderMap::new(), "deadbeefcafebabe-2", 10);
        assert!(meta.is_multipart_etag());
        meta.etag = "d41d8cd98f00b204e9800998ecf8427e".to_string();
        assert!(!meta.is_multipart_etag());
    }

    #[test]
    fn header_lookup_is_case_insensitive() {
        let mut h = HeaderMap::new();
        h.insert("X-Sys-Migrator-Object", "1.000000_00000000");
        assert!(h.contains("x-sys-migrator-object"));
    }
}
