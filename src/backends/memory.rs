use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use futures::stream::{self, BoxStream, StreamExt};
use tokio::sync::RwLock;

use crate::error::{Error, Result};
use crate::headers::{ContainerMeta, HeaderMap, ObjectMeta};
use crate::internal_client::InternalClient;
use crate::large_object::Segment;
use crate::provider::{GetOptions, ListingEntry, ObjectBody, Provider};
use crate::timestamp::Timestamp;

#[derive(Clone)]
struct StoredObject {
    headers: HeaderMap,
    etag: String,
    body: Vec<u8>,
    last_modified: String,
    /// Per-part `(bytes, etag)`, 1-indexed by `GetOptions::part_number`, for
    /// objects seeded as a multipart upload.
    parts: Option<Vec<(Vec<u8>, String)>>,
}

/// In-process fake of a remote [`Provider`], backed by nested maps:
/// `Arc<RwLock<...>>` state with a terse `Debug` that never dumps object
/// bodies.
#[derive(Clone, Default)]
pub struct MemoryProvider {
    buckets: Arc<RwLock<BTreeMap<String, BTreeMap<String, StoredObject>>>>,
}

impl fmt::Debug for MemoryProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryProvider").finish()
    }
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn seed_object(
        &self,
        bucket: &str,
        key: &str,
        etag: impl Into<String>,
        body: Vec<u8>,
        last_modified: impl Into<String>,
        headers: HeaderMap,
    ) {
        let mut buckets = self.buckets.write().await;
        let bucket_map = buckets.entry(bucket.to_string()).or_default();
        bucket_map.insert(
            key.to_string(),
            StoredObject {
                headers,
                etag: etag.into(),
                body,
                last_modified: last_modified.into(),
                parts: None,
            },
        );
    }

    /// Seeds an object as a multipart upload: `whole_etag` is what `head_object`
    /// reports and what the final segment-manifest etag must validate against;
    /// each part is fetchable individually via `GetOptions::part_number` and
    /// carries its own independently-computed etag, as a real S3 part does.
    pub async fn seed_multipart_object(
        &self,
        bucket: &str,
        key: &str,
        whole_etag: impl Into<String>,
        parts: Vec<Vec<u8>>,
        last_modified: impl Into<String>,
        mut headers: HeaderMap,
    ) {
        let whole_body: Vec<u8> = parts.iter().flatten().copied().collect();
        let part_count = parts.len() as u32;
        let part_entries = parts
            .into_iter()
            .map(|bytes| {
                let etag = format!("{:x}", md5::compute(&bytes));
                (bytes, etag)
            })
            .collect();
        headers.insert(crate::headers::MPU_PARTS_COUNT_HEADER, part_count.to_string());

        let mut buckets = self.buckets.write().await;
        let bucket_map = buckets.entry(bucket.to_string()).or_default();
        bucket_map.insert(
            key.to_string(),
            StoredObject {
                headers,
                etag: whole_etag.into(),
                body: whole_body,
                last_modified: last_modified.into(),
                parts: Some(part_entries),
            },
        );
    }

    pub async fn remove_object(&self, bucket: &str, key: &str) {
        if let Some(bucket_map) = self.buckets.write().await.get_mut(bucket) {
            bucket_map.remove(key);
        }
    }
}

impl Provider for MemoryProvider {
    fn list_buckets(&self) -> BoxStream<'_, Result<String>> {
        let buckets = self.buckets.clone();
        Box::pin(stream::once(async move {
            let names: Vec<String> = buckets.read().await.keys().cloned().collect();
            names
        }).map(stream::iter).flatten().map(Ok))
    }

    fn list_objects<'a>(
        &'a self,
        bucket: &'a str,
        prefix: Option<&'a str>,
        marker: &'a str,
    ) -> BoxStream<'a, Result<ListingEntry>> {
        let buckets = self.buckets.clone();
        let bucket = bucket.to_string();
        let prefix = prefix.map(|s| s.to_string());
        let marker = marker.to_string();

        Box::pin(stream::once(async move {
            let buckets = buckets.read().await;
            let entries: Vec<ListingEntry> = match buckets.get(&bucket) {
                Some(map) => map
                    .iter()
                    .filter(|(name, _)| name.as_str() > marker.as_str())
                    .filter(|(name, _)| prefix.as_ref().map(|p| name.starts_with(p.as_str())).unwrap_or(true))
                    .map(|(name, obj)| ListingEntry {
                        name: name.clone(),
                        hash: obj.etag.clone(),
                        bytes: obj.body.len() as u64,
                        last_modified: obj.last_modified.clone(),
                    })
                    .collect(),
                None => Vec::new(),
            };
            entries
        })
        .map(stream::iter)
        .flatten()
        .map(Ok))
    }

    async fn head_bucket(&self, bucket: &str) -> Result<ContainerMeta> {
        let buckets = self.buckets.read().await;
        if buckets.contains_key(bucket) {
            Ok(ContainerMeta::new(HeaderMap::new()))
        } else {
            Err(Error::ContainerNotFound {
                account: String::new(),
                container: bucket.to_string(),
            })
        }
    }

    async fn head_account(&self) -> Result<ContainerMeta> {
        Ok(ContainerMeta::new(HeaderMap::new()))
    }

    async fn head_object(&self, bucket: &str, key: &str) -> Result<ObjectMeta> {
        let buckets = self.buckets.read().await;
        let obj = buckets
            .get(bucket)
            .and_then(|m| m.get(key))
            .ok_or_else(|| Error::NotFound(format!("{bucket}/{key}")))?;
        Ok(ObjectMeta::new(obj.headers.clone(), obj.etag.clone(), obj.body.len() as u64))
    }

    async fn get_object(&self, bucket: &str, key: &str, options: GetOptions) -> Result<ObjectBody> {
        let buckets = self.buckets.read().await;
        let obj = buckets
            .get(bucket)
            .and_then(|m| m.get(key))
            .ok_or_else(|| Error::NotFound(format!("{bucket}/{key}")))?;

        if let Some(part_number) = options.part_number {
            let parts = obj
                .parts
                .as_ref()
                .ok_or_else(|| Error::Generic(format!("{bucket}/{key} has no parts")))?;
            let (bytes, etag) = parts
                .get(part_number as usize - 1)
                .ok_or_else(|| Error::NotFound(format!("{bucket}/{key} part {part_number}")))?;
            return Ok(ObjectBody {
                meta: ObjectMeta::new(obj.headers.clone(), etag.clone(), bytes.len() as u64),
                body: bytes.clone(),
            });
        }

        Ok(ObjectBody {
            meta: ObjectMeta::new(obj.headers.clone(), obj.etag.clone(), obj.body.len() as u64),
            body: obj.body.clone(),
        })
    }

    async fn get_manifest(&self, bucket: &str, key: &str) -> Result<Vec<Segment>> {
        let body = self.get_object(bucket, key, GetOptions::default()).await?.body;
        serde_json::from_slice(&body).map_err(|e| Error::Generic(format!("invalid manifest json: {e}")))
    }
}

struct StoredLocalObject {
    headers: HeaderMap,
    etag: String,
    body: Vec<u8>,
    timestamp: Timestamp,
}

/// In-process fake of the local Swift-like cluster.
#[derive(Clone, Default)]
pub struct MemoryInternalClient {
    containers: Arc<RwLock<BTreeMap<(String, String), ContainerMeta>>>,
    objects: Arc<RwLock<BTreeMap<(String, String, String), StoredLocalObject>>>,
    accounts: Arc<RwLock<BTreeMap<String, ContainerMeta>>>,
}

impl fmt::Debug for MemoryInternalClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryInternalClient").finish()
    }
}

impl MemoryInternalClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn seed_object(
        &self,
        account: &str,
        container: &str,
        key: &str,
        etag: impl Into<String>,
        body: Vec<u8>,
        headers: HeaderMap,
        timestamp: Timestamp,
    ) {
        self.objects.write().await.insert(
            (account.to_string(), container.to_string(), key.to_string()),
            StoredLocalObject {
                headers,
                etag: etag.into(),
                body,
                timestamp,
            },
        );
    }
}

impl InternalClient for MemoryInternalClient {
    async fn container_exists(&self, account: &str, container: &str) -> Result<bool> {
        Ok(self
            .containers
            .read()
            .await
            .contains_key(&(account.to_string(), container.to_string())))
    }

    async fn create_container(&self, account: &str, container: &str, headers: HeaderMap) -> Result<()> {
        self.containers
            .write()
            .await
            .insert((account.to_string(), container.to_string()), ContainerMeta::new(headers));
        Ok(())
    }

    async fn delete_container(&self, account: &str, container: &str) -> Result<()> {
        let key = (account.to_string(), container.to_string());
        let has_objects = self
            .objects
            .read()
            .await
            .keys()
            .any(|(a, c, _)| a == account && c == container);
        if has_objects {
            return Err(Error::Conflict(format!("container not empty: {container}")));
        }
        self.containers.write().await.remove(&key);
        Ok(())
    }

    async fn get_container_metadata(&self, account: &str, container: &str) -> Result<ContainerMeta> {
        self.containers
            .read()
            .await
            .get(&(account.to_string(), container.to_string()))
            .cloned()
            .ok_or_else(|| Error::ContainerNotFound {
                account: account.to_string(),
                container: container.to_string(),
            })
    }

    async fn set_container_metadata(&self, account: &str, container: &str, headers: HeaderMap) -> Result<()> {
        let mut containers = self.containers.write().await;
        let meta = containers
            .get_mut(&(account.to_string(), container.to_string()))
            .ok_or_else(|| Error::ContainerNotFound {
                account: account.to_string(),
                container: container.to_string(),
            })?;
        for (k, v) in headers.iter() {
            meta.headers.insert(k, v);
        }
        Ok(())
    }

    async fn get_account_metadata(&self, account: &str) -> Result<ContainerMeta> {
        Ok(self
            .accounts
            .read()
            .await
            .get(account)
            .cloned()
            .unwrap_or_else(|| ContainerMeta::new(HeaderMap::new())))
    }

    async fn set_account_metadata(&self, account: &str, headers: HeaderMap) -> Result<()> {
        let mut accounts = self.accounts.write().await;
        let meta = accounts.entry(account.to_string()).or_insert_with(|| ContainerMeta::new(HeaderMap::new()));
        for (k, v) in headers.iter() {
            meta.headers.insert(k, v);
        }
        Ok(())
    }

    async fn get_object_metadata(&self, account: &str, container: &str, key: &str) -> Result<ObjectMeta> {
        let objects = self.objects.read().await;
        let obj = objects
            .get(&(account.to_string(), container.to_string(), key.to_string()))
            .ok_or_else(|| Error::NotFound(format!("{container}/{key}")))?;
        Ok(ObjectMeta::new(obj.headers.clone(), obj.etag.clone(), obj.body.len() as u64))
    }

    async fn put_object(
        &self,
        account: &str,
        container: &str,
        key: &str,
        headers: HeaderMap,
        body: Vec<u8>,
    ) -> Result<()> {
        if !self.container_exists(account, container).await? {
            return Err(Error::ContainerNotFound {
                account: account.to_string(),
                container: container.to_string(),
            });
        }
        let etag = format!("{:x}", md5::compute(&body));
        let timestamp = headers
            .get(crate::headers::TIMESTAMP_HEADER)
            .and_then(|v| v.parse().ok())
            .unwrap_or(Timestamp::from_epoch_seconds(0));
        self.objects.write().await.insert(
            (account.to_string(), container.to_string(), key.to_string()),
            StoredLocalObject { headers, etag, body, timestamp },
        );
        Ok(())
    }

    async fn delete_object(&self, account: &str, container: &str, key: &str, timestamp: Timestamp) -> Result<()> {
        let mut objects = self.objects.write().await;
        let map_key = (account.to_string(), container.to_string(), key.to_string());
        if let Some(existing) = objects.get(&map_key) {
            if timestamp <= existing.timestamp {
                return Err(Error::Conflict(format!("stale delete timestamp for {key}")));
            }
        }
        objects.remove(&map_key);
        Ok(())
    }

    fn list_objects<'a>(
        &'a self,
        account: &'a str,
        container: &'a str,
        prefix: Option<&'a str>,
    ) -> BoxStream<'a, Result<ListingEntry>> {
        let objects = self.objects.clone();
        let account = account.to_string();
        let container = container.to_string();
        let prefix = prefix.map(|s| s.to_string());

        Box::pin(
            stream::once(async move {
                let objects = objects.read().await;
                let mut entries: Vec<ListingEntry> = objects
                    .iter()
                    .filter(|((a, c, _), _)| a == &account && c == &container)
                    .filter(|((_, _, k), _)| prefix.as_ref().map(|p| k.starts_with(p.as_str())).unwrap_or(true))
                    .map(|((_, _, k), obj)| ListingEntry {
                        name: k.clone(),
                        hash: obj.etag.clone(),
                        bytes: obj.body.len() as u64,
                        last_modified: obj.timestamp.to_string(),
                    })
                    .collect();
                entries.sort_by(|a, b| a.name.cmp(&b.name));
                entries
            })
            .map(stream::iter)
            .flatten()
            .map(Ok),
        )
    }
}
