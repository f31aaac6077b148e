use std::collections::HashSet;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use futures::StreamExt;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::config::Migration;
use crate::error::{Error, Result};
use crate::headers::{ContainerMeta, ContainerState, HeaderMap, MIGRATOR_OBJECT_HEADER, TIMESTAMP_HEADER};
use crate::internal_client::InternalClient;
use crate::large_object::{self, LargeObjectKind};
use crate::provider::{GetOptions, ListingEntry, Provider};
use crate::reconciler::{self, Comparison, QueueKind, ReconcileAction};
use crate::selector::{Ring, Selector};
use crate::stats::MigratorPassStats;
use crate::status::StatusStore;
use crate::timestamp::{resolve_write_timestamp, Timestamp};
use crate::worker_pool::{self, Queues, WorkItem};

const DEFAULT_MAX_FILE_SIZE: u64 = 5 * 1024 * 1024 * 1024;

fn now_epoch() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before epoch")
        .as_secs_f64()
}

/// Splits a DLO manifest's `x-object-manifest` value into the segment
/// container and the object prefix stored under it.
fn split_manifest_prefix(raw: &str) -> (String, String) {
    match raw.split_once('/') {
        Some((container, prefix)) => (container.to_string(), prefix.to_string()),
        None => (raw.to_string(), String::new()),
    }
}

/// Per-pass deferred DLO bookkeeping: segment containers discovered via
/// `x-object-manifest` headers that must fully drain before their manifest
/// objects are copied, mirroring the original's `container_queue` +
/// `_manifests` set.
#[derive(Default)]
struct DloState {
    manifests: Mutex<Vec<(String, String, String, Timestamp)>>,
    pending_containers: Mutex<Vec<(String, String)>>,
    seen_containers: Mutex<HashSet<(String, String)>>,
}

impl DloState {
    fn new() -> Self {
        Self::default()
    }

    /// Records a manifest object as deferred and enqueues its segment
    /// container for a full-list pass, unless already queued.
    async fn defer_manifest(
        &self,
        bucket: String,
        container: String,
        key: String,
        ts: Timestamp,
        seg_container: String,
        prefix: String,
    ) {
        self.manifests.lock().await.push((bucket, container, key, ts));
        self.push_container(seg_container, prefix).await;
    }

    async fn push_container(&self, seg_container: String, prefix: String) {
        let mut seen = self.seen_containers.lock().await;
        if seen.insert((seg_container.clone(), prefix.clone())) {
            self.pending_containers.lock().await.push((seg_container, prefix));
        }
    }

    async fn pop_container(&self) -> Option<(String, String)> {
        self.pending_containers.lock().await.pop()
    }

    async fn take_manifests(&self) -> Vec<(String, String, String, Timestamp)> {
        std::mem::take(&mut *self.manifests.lock().await)
    }
}

/// Orchestrates one migration pass: container bootstrap, reconciliation,
/// worker-pool dispatch, and status checkpointing. Generic over the
/// `Provider`/`InternalClient`/`Ring` so it can run against in-memory fakes
/// in tests and real backends in production.
pub struct MigrationController<P, IC, R> {
    pub provider: Arc<P>,
    pub internal_client: Arc<IC>,
    pub selector: Arc<Selector<R>>,
    pub workers: usize,
    pub items_chunk: usize,
    pub segment_size: u64,
    pub max_file_size: u64,
    pub stats: Arc<MigratorPassStats>,
}

impl<P, IC, R> MigrationController<P, IC, R>
where
    P: Provider + Send + Sync + 'static,
    IC: InternalClient + Send + Sync + 'static,
    R: Ring + Send + Sync + 'static,
{
    pub fn new(provider: Arc<P>, internal_client: Arc<IC>, selector: Arc<Selector<R>>, workers: usize) -> Self {
        Self {
            provider,
            internal_client,
            selector,
            workers,
            items_chunk: 1000,
            segment_size: 100 * 1024 * 1024,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            stats: MigratorPassStats::new(),
        }
    }

    /// Runs one full pass for `migration` and checkpoints the result in
    /// `status`. Returns the list of containers actually processed (relevant
    /// for the all-buckets case, used by the daemon's pruning step).
    #[instrument(skip(self, status), fields(account = %migration.account, bucket = %migration.aws_bucket))]
    pub async fn run_pass(&self, migration: &Migration, status: &mut StatusStore) -> Result<Vec<String>> {
        let start = now_epoch();

        if migration.is_all_buckets() {
            let handled = self.run_all_buckets_pass(migration, status).await?;
            info!(duration = now_epoch() - start, containers = handled.len(), "pass finished");
            return Ok(handled);
        }

        let container = migration.destination_container().to_string();
        self.run_single_container_pass(migration, &container, status).await?;
        info!(duration = now_epoch() - start, container = %container, "pass finished");
        Ok(vec![container])
    }

    async fn run_all_buckets_pass(&self, migration: &Migration, status: &mut StatusStore) -> Result<Vec<String>> {
        let remote_buckets: Vec<String> = self.provider.list_buckets().filter_map(|r| async { r.ok() }).collect().await;
        let mut handled = Vec::new();

        for bucket in remote_buckets {
            if !self.selector.is_local_container(&migration.account, &bucket) {
                continue;
            }
            let mut rebound = migration.clone();
            rebound.aws_bucket = bucket.clone();
            rebound.container = Some(bucket.clone());
            if let Err(e) = self.run_single_container_pass(&rebound, &bucket, status).await {
                warn!(bucket = %bucket, error = %e, "bucket pass failed, continuing with next bucket");
                continue;
            }
            handled.push(bucket);
        }

        Ok(handled)
    }

    async fn run_single_container_pass(&self, migration: &Migration, container: &str, status: &mut StatusStore) -> Result<()> {
        self.bootstrap_container(migration, container, status).await?;
        self.process_objects(migration, container, status).await
    }

    /// Ensures the local container exists, propagates account metadata, and —
    /// for Swift-flavored migrations — pre-migrates a versioned/history
    /// container one level deep and reconciles the container's own headers.
    /// Not recursive: the versioned sub-pass only ensures-and-processes that
    /// one container, it never re-enters `bootstrap_container` itself, so a
    /// versioned container's own `x-versions-location` (if any) is ignored.
    async fn bootstrap_container(&self, migration: &Migration, container: &str, status: &mut StatusStore) -> Result<()> {
        self.ensure_container_exists(migration, container).await?;

        if migration.propagate_account_metadata && migration.protocol == crate::config::Protocol::Swift {
            let remote_meta = self.provider.head_account().await?;
            self.internal_client
                .set_account_metadata(&migration.account, remote_meta.headers)
                .await?;
        }

        if migration.protocol != crate::config::Protocol::Swift {
            return Ok(());
        }

        let remote_container_meta = self.provider.head_bucket(container).await?;

        if let Some(versioned) = remote_container_meta.versioning_location().map(|s| s.to_string()) {
            if versioned != container {
                let mut sub = migration.clone();
                sub.aws_bucket = versioned.clone();
                sub.container = Some(versioned.clone());
                self.ensure_container_exists(&sub, &versioned).await?;
                self.process_objects(&sub, &versioned, status).await?;
            }
        }

        self.apply_container_header_diff(migration, container, &remote_container_meta).await
    }

    async fn ensure_container_exists(&self, migration: &Migration, container: &str) -> Result<()> {
        if !self.internal_client.container_exists(&migration.account, container).await? {
            let mut headers = HeaderMap::new();
            headers.insert(crate::headers::MIGRATOR_CONTAINER_HEADER, ContainerState::Migrating.as_str());
            if let Some(policy) = &migration.storage_policy {
                headers.insert(crate::headers::STORAGE_POLICY_HEADER, policy.clone());
            }
            self.internal_client
                .create_container(&migration.account, container, headers)
                .await?;
        }
        Ok(())
    }

    /// Diffs the remote container's headers against the local copy and POSTs
    /// the remote set when it is newer, per each side's `x-timestamp`. A
    /// locally `SRC_DELETED` container that gets new headers is promoted
    /// back to `MODIFIED` rather than left marked for deletion.
    async fn apply_container_header_diff(&self, migration: &Migration, container: &str, remote_meta: &ContainerMeta) -> Result<()> {
        if remote_meta.headers.is_empty() {
            return Ok(());
        }
        let local_meta = match self.internal_client.get_container_metadata(&migration.account, container).await {
            Ok(m) => m,
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => return Err(e),
        };

        let local_ts = local_meta.headers.get(TIMESTAMP_HEADER).and_then(|v| v.parse::<f64>().ok());
        let remote_ts = remote_meta.headers.get(TIMESTAMP_HEADER).and_then(|v| v.parse::<f64>().ok());
        let should_apply = match (local_ts, remote_ts) {
            (Some(l), Some(r)) => l < r,
            (None, Some(_)) => true,
            _ => false,
        };
        if !should_apply {
            return Ok(());
        }

        let mut diff = remote_meta.headers.clone();
        if local_meta.state() == Some(ContainerState::SrcDeleted) {
            diff.insert(crate::headers::MIGRATOR_CONTAINER_HEADER, ContainerState::Modified.as_str());
        }
        self.internal_client.set_container_metadata(&migration.account, container, diff).await
    }

    async fn process_objects(&self, migration: &Migration, container: &str, status: &mut StatusStore) -> Result<()> {
        let marker = status
            .get(migration)
            .map(|r| r.status.marker.clone())
            .unwrap_or_default();

        let remote_entries = self.fetch_remote_listing(migration, container, &marker).await?;
        let local_entries = self.fetch_local_listing(migration, container).await?;

        let account = migration.account.clone();
        let is_primary = |name: &str| self.selector.is_primary(&account, container, name);
        let outcome = reconciler::reconcile(&remote_entries, &local_entries, false, is_primary);

        let queues = Queues::new(self.workers);
        let mut primary_count = 0u64;
        let mut verify_items = Vec::new();

        for action in &outcome.actions {
            match action {
                ReconcileAction::Migrate { name, queue: QueueKind::Primary, last_modified } => {
                    primary_count += 1;
                    let listing_ts = crate::timestamp::parse_last_modified(last_modified).unwrap_or(0.0);
                    queues
                        .enqueue_primary(WorkItem::MigrateObject {
                            bucket: migration.aws_bucket.clone(),
                            container: container.to_string(),
                            key: name.clone(),
                            listing_ts,
                        })
                        .await;
                }
                ReconcileAction::Migrate { name, queue: QueueKind::Verify, last_modified } => {
                    let listing_ts = crate::timestamp::parse_last_modified(last_modified).unwrap_or(0.0);
                    verify_items.push(WorkItem::MigrateObject {
                        bucket: migration.aws_bucket.clone(),
                        container: container.to_string(),
                        key: name.clone(),
                        listing_ts,
                    });
                }
                ReconcileAction::NeedsDeepCompare { name } => {
                    debug!(key = %name, "etag differs with matching timestamp, skipping rather than overwriting");
                }
                ReconcileAction::Delete { name } => {
                    self.reconcile_deleted(&migration.account, container, name).await?;
                }
            }
        }
        drop(queues.primary_tx);

        let account_clone = migration.account.clone();
        let provider = self.provider.clone();
        let internal_client = self.internal_client.clone();
        let segment_size = self.segment_size;
        let max_file_size = self.max_file_size;
        let stats = self.stats.clone();
        let dlo_state = Arc::new(DloState::new());

        let handler = {
            let account_clone = account_clone.clone();
            let dlo_state = dlo_state.clone();
            move |item: WorkItem| {
                let provider = provider.clone();
                let internal_client = internal_client.clone();
                let stats = stats.clone();
                let account = account_clone.clone();
                let dlo_state = dlo_state.clone();
                async move {
                    migrate_one(&*provider, &*internal_client, &stats, &account, &dlo_state, item, segment_size, max_file_size).await
                }
            }
        };
        let handler = Arc::new(handler);

        let mut errors = worker_pool::drain(queues.primary_rx, self.workers, handler.clone()).await;

        for item in verify_items {
            let _ = queues.verify_tx.send(item);
        }
        drop(queues.verify_tx);
        errors.extend(worker_pool::drain(queues.verify_rx, self.workers, handler.clone()).await);

        errors.extend(self.drain_dlo_phase(migration, &dlo_state, handler.clone()).await);

        let deferred_manifests = dlo_state.take_manifests().await;
        if !deferred_manifests.is_empty() {
            let manifest_queues = Queues::new(self.workers);
            for (bucket, manifest_container, key, ts) in deferred_manifests {
                manifest_queues
                    .enqueue_primary(WorkItem::MigrateManifestObject {
                        bucket,
                        container: manifest_container,
                        key,
                        ts,
                    })
                    .await;
            }
            drop(manifest_queues.primary_tx);
            errors.extend(worker_pool::drain(manifest_queues.primary_rx, self.workers, handler).await);
        }

        for err in &errors {
            warn!(container = %err.container, key = %err.key, error = %err.error, "migration error");
        }

        let snapshot = self.stats.snapshot().await;
        let reset = outcome.scanned == 0 && !marker.is_empty();
        let new_marker = if reset { String::new() } else { outcome.marker.clone() };

        status
            .save(
                migration,
                new_marker,
                primary_count.min(snapshot.copied),
                outcome.scanned,
                snapshot.bytes_copied,
                true,
                now_epoch(),
            )
            .await?;

        Ok(())
    }

    /// Drains the DLO container queue to exhaustion: each popped segment
    /// container is fully listed and reconciled, which may itself discover
    /// nested DLOs and push more entries, so the loop keeps going until the
    /// queue is empty before the caller migrates the deferred manifests.
    async fn drain_dlo_phase<H, Fut>(&self, migration: &Migration, dlo_state: &Arc<DloState>, handler: Arc<H>) -> Vec<crate::error::WorkError>
    where
        H: Fn(WorkItem) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<()>> + Send + 'static,
    {
        let mut errors = Vec::new();

        while let Some((seg_container, prefix)) = dlo_state.pop_container().await {
            let exists = match self.internal_client.container_exists(&migration.account, &seg_container).await {
                Ok(exists) => exists,
                Err(e) => {
                    warn!(container = %seg_container, error = %e, "failed to check segment container, skipping");
                    continue;
                }
            };
            if !exists {
                if let Err(e) = self
                    .internal_client
                    .create_container(&migration.account, &seg_container, HeaderMap::new())
                    .await
                {
                    warn!(container = %seg_container, error = %e, "failed to create segment container, skipping");
                    continue;
                }
            }

            let remote = match self.fetch_remote_listing_with_prefix(&seg_container, &prefix).await {
                Ok(v) => v,
                Err(e) => {
                    warn!(container = %seg_container, error = %e, "failed to list segment container");
                    continue;
                }
            };
            let local = match self.fetch_local_listing_for(&migration.account, &seg_container, Some(&prefix)).await {
                Ok(v) => v,
                Err(e) => {
                    warn!(container = %seg_container, error = %e, "failed to list local segment container");
                    continue;
                }
            };

            let outcome = reconciler::reconcile(&remote, &local, true, |_| true);
            let queues = Queues::new(self.workers);

            for action in &outcome.actions {
                match action {
                    ReconcileAction::Migrate { name, last_modified, .. } => {
                        let listing_ts = crate::timestamp::parse_last_modified(last_modified).unwrap_or(0.0);
                        queues
                            .enqueue_primary(WorkItem::MigrateObject {
                                bucket: seg_container.clone(),
                                container: seg_container.clone(),
                                key: name.clone(),
                                listing_ts,
                            })
                            .await;
                    }
                    ReconcileAction::NeedsDeepCompare { name } => {
                        debug!(key = %name, container = %seg_container, "segment etag differs with matching timestamp, skipping");
                    }
                    ReconcileAction::Delete { name } => {
                        if let Err(e) = self.reconcile_deleted(&migration.account, &seg_container, name).await {
                            warn!(container = %seg_container, key = %name, error = %e, "failed to reconcile deleted segment");
                        }
                    }
                }
            }
            drop(queues.primary_tx);
            errors.extend(worker_pool::drain(queues.primary_rx, self.workers, handler.clone()).await);
        }

        errors
    }

    async fn fetch_remote_listing(&self, migration: &Migration, container: &str, marker: &str) -> Result<Vec<ListingEntry>> {
        let prefix = migration.prefix.as_deref();
        let mut entries: Vec<ListingEntry> = self
            .provider
            .list_objects(container, prefix, marker)
            .filter_map(|r| async { r.ok() })
            .collect()
            .await;
        entries.truncate(self.items_chunk);
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    /// Full, unpaginated listing of a segment container under `prefix`, used
    /// by the DLO container-queue phase (`list_all = true` means every entry
    /// must be seen, not just the first `items_chunk` of them).
    async fn fetch_remote_listing_with_prefix(&self, container: &str, prefix: &str) -> Result<Vec<ListingEntry>> {
        let mut entries: Vec<ListingEntry> = self
            .provider
            .list_objects(container, Some(prefix), "")
            .filter_map(|r| async { r.ok() })
            .collect()
            .await;
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn fetch_local_listing(&self, migration: &Migration, container: &str) -> Result<Vec<ListingEntry>> {
        self.fetch_local_listing_for(&migration.account, container, migration.prefix.as_deref()).await
    }

    async fn fetch_local_listing_for(&self, account: &str, container: &str, prefix: Option<&str>) -> Result<Vec<ListingEntry>> {
        let mut entries: Vec<ListingEntry> = self
            .internal_client
            .list_objects(account, container, prefix)
            .filter_map(|r| async { r.ok() })
            .collect()
            .await;
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    /// Reconciles a locally-present object that disappeared from the remote
    /// listing: leaves client-owned objects untouched, otherwise deletes with
    /// a ticked timestamp so the delete durably wins over concurrent writes.
    async fn reconcile_deleted(&self, account: &str, container: &str, key: &str) -> Result<()> {
        let meta = match self.internal_client.get_object_metadata(account, container, key).await {
            Ok(meta) => meta,
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => return Err(e),
        };

        if !meta.is_migrator_owned() {
            debug!(key = %key, "leaving client-owned object alone");
            return Ok(());
        }

        let ts = meta.x_timestamp().unwrap_or_else(|| Timestamp::from_epoch_seconds(0)).tick();
        match self.internal_client.delete_object(account, container, key, ts).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_conflict() => {
                debug!(key = %key, "delete conflict, leaving for next pass");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Deletes a container that no longer exists remotely: reconciles every
    /// object inside it first, then deletes the container, falling back to
    /// marking it `SRC_DELETED` if it's still non-empty.
    pub async fn maybe_delete_internal_container(&self, account: &str, container: &str) -> Result<()> {
        let meta = match self.internal_client.get_container_metadata(account, container).await {
            Ok(meta) => meta,
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => return Err(e),
        };

        if !meta.is_migrator_owned() || meta.state() == Some(ContainerState::SrcDeleted) {
            return Ok(());
        }

        let entries = self.fetch_local_listing_for(account, container, None).await?;

        for entry in &entries {
            self.reconcile_deleted(account, container, &entry.name).await?;
        }

        match self.internal_client.delete_container(account, container).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_conflict() => {
                let mut headers = HeaderMap::new();
                headers.insert(crate::headers::MIGRATOR_CONTAINER_HEADER, ContainerState::SrcDeleted.as_str());
                self.internal_client.set_container_metadata(account, container, headers).await
            }
            Err(e) => Err(e),
        }
    }
}

/// Migrates (or updates) a single object, dispatching to the large-object
/// handler when the remote object is a DLO/SLO/MPU/oversized object.
async fn migrate_one<P, IC>(
    provider: &P,
    internal_client: &IC,
    stats: &MigratorPassStats,
    account: &str,
    dlo_state: &Arc<DloState>,
    item: WorkItem,
    segment_size: u64,
    max_file_size: u64,
) -> Result<()>
where
    P: Provider,
    IC: InternalClient,
{
    match item {
        WorkItem::UploadObject { container, key, headers, body } => {
            let len = body.len() as u64;
            internal_client.put_object(account, &container, &key, headers, body).await?;
            stats.update(0, 0, len).await;
            Ok(())
        }
        WorkItem::MigrateManifestObject { bucket, container, key, ts } => {
            let fetched = provider.get_object(&bucket, &key, GetOptions::default()).await?;
            let mut headers = fetched.meta.headers.clone();
            headers.insert(MIGRATOR_OBJECT_HEADER, ts.to_string());
            headers.insert(TIMESTAMP_HEADER, ts.to_string());
            let len = fetched.body.len() as u64;
            internal_client.put_object(account, &container, &key, headers, fetched.body).await?;
            stats.update(1, 1, len).await;
            Ok(())
        }
        WorkItem::MigrateObject { bucket, container, key, listing_ts } => {
            if let Ok(local_meta) = internal_client.get_object_metadata(account, &container, &key).await {
                if !local_meta.is_migrator_owned() {
                    debug!(key = %key, "local object is client-owned, leaving it alone");
                    return Ok(());
                }
            }

            let meta = provider.head_object(&bucket, &key).await?;
            let kind = large_object::classify(&meta, max_file_size);

            match kind {
                LargeObjectKind::Plain => {
                    let fetched = provider.get_object(&bucket, &key, GetOptions::default()).await?;
                    let mut headers = fetched.meta.headers.clone();
                    let head_epoch = fetched.meta.x_timestamp().map(|t| t.as_epoch_seconds_f64());
                    let ts = resolve_write_timestamp(listing_ts, head_epoch);
                    headers.insert(MIGRATOR_OBJECT_HEADER, ts.to_string());
                    headers.insert(TIMESTAMP_HEADER, ts.to_string());
                    let len = fetched.body.len() as u64;
                    internal_client.put_object(account, &container, &key, headers, fetched.body).await?;
                    stats.update(1, 1, len).await;
                    Ok(())
                }
                LargeObjectKind::Slo => {
                    migrate_slo(provider, internal_client, stats, account, &bucket, &container, &key, &meta, listing_ts).await
                }
                LargeObjectKind::MultipartUpload => {
                    migrate_mpu(provider, internal_client, stats, account, &bucket, &container, &key, &meta, listing_ts).await
                }
                LargeObjectKind::Oversized => {
                    migrate_oversized(provider, internal_client, stats, account, &bucket, &container, &key, &meta, segment_size, listing_ts).await
                }
                LargeObjectKind::Dlo => {
                    let prefix_raw = meta.dlo_manifest_prefix().unwrap_or_default().to_string();
                    let (seg_container, prefix) = split_manifest_prefix(&prefix_raw);
                    let head_epoch = meta.x_timestamp().map(|t| t.as_epoch_seconds_f64());
                    let ts = resolve_write_timestamp(listing_ts, head_epoch);
                    debug!(key = %key, segment_container = %seg_container, "dlo manifest deferred until segment container drains");
                    dlo_state
                        .defer_manifest(bucket.clone(), container.clone(), key.clone(), ts, seg_container, prefix)
                        .await;
                    Ok(())
                }
            }
        }
    }
}

async fn migrate_slo<P: Provider, IC: InternalClient>(
    provider: &P,
    internal_client: &IC,
    stats: &MigratorPassStats,
    account: &str,
    bucket: &str,
    container: &str,
    key: &str,
    meta: &crate::headers::ObjectMeta,
    listing_ts: f64,
) -> Result<()> {
    let segments = provider.get_manifest(bucket, key).await?;
    let seg_container = large_object::segments_container(container);

    if !internal_client.container_exists(account, &seg_container).await? {
        internal_client.create_container(account, &seg_container, HeaderMap::new()).await?;
    }

    let mut total_bytes = 0u64;
    for seg in &segments {
        match internal_client.get_object_metadata(account, &seg_container, &seg.name).await {
            Ok(local_meta) => {
                let remote_entry = ListingEntry {
                    name: seg.name.clone(),
                    hash: seg.hash.clone(),
                    bytes: seg.bytes,
                    last_modified: String::new(),
                };
                let local_entry = ListingEntry {
                    name: seg.name.clone(),
                    hash: local_meta.etag.clone(),
                    bytes: local_meta.content_length,
                    last_modified: String::new(),
                };
                match reconciler::cmp_meta(&remote_entry, &local_entry) {
                    Comparison::Equal => continue,
                    Comparison::TimeDiff => {
                        debug!(segment = %seg.name, "segment timestamps differ, leaving in place");
                        continue;
                    }
                    Comparison::EtagDiff => {
                        debug!(segment = %seg.name, "segment etag differs, re-uploading");
                    }
                }
            }
            Err(ref e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }

        let fetched = provider.get_object(bucket, &seg.name, GetOptions::default()).await?;
        let len = fetched.body.len() as u64;
        total_bytes += len;
        internal_client
            .put_object(account, &seg_container, &seg.name, HeaderMap::new(), fetched.body)
            .await?;
    }

    let computed_etag = large_object::get_slo_etag(&segments)?;
    if computed_etag != meta.etag.trim_start_matches('"') {
        debug!(key = %key, "slo etag mismatch against source, uploading manifest anyway per source-of-truth manifest contents");
    }

    let manifest_body = serde_json::to_vec(&segments)
        .map_err(|e| Error::Generic(format!("failed to serialize slo manifest: {e}")))?;
    let mut headers = HeaderMap::new();
    headers.insert(crate::headers::STATIC_LARGE_OBJECT_HEADER, "True");
    let head_epoch = meta.x_timestamp().map(|t| t.as_epoch_seconds_f64());
    let ts = resolve_write_timestamp(listing_ts, head_epoch);
    headers.insert(MIGRATOR_OBJECT_HEADER, ts.to_string());
    headers.insert(TIMESTAMP_HEADER, ts.to_string());

    internal_client.put_object(account, container, key, headers, manifest_body).await?;
    stats.update(1, 1, total_bytes).await;
    Ok(())
}

/// Migrates a real S3 multipart upload by fetching each part with a
/// part-numbered GET, preserving the upload's true part boundaries and using
/// each part's remote-returned etag (not a locally recomputed hash) as its
/// segment hash, since that's the authoritative value the final etag check
/// validates against.
async fn migrate_mpu<P: Provider, IC: InternalClient>(
    provider: &P,
    internal_client: &IC,
    stats: &MigratorPassStats,
    account: &str,
    bucket: &str,
    container: &str,
    key: &str,
    meta: &crate::headers::ObjectMeta,
    listing_ts: f64,
) -> Result<()> {
    let seg_container = large_object::segments_container(container);
    if !internal_client.container_exists(account, &seg_container).await? {
        internal_client.create_container(account, &seg_container, HeaderMap::new()).await?;
    }

    let x_ts = meta.x_timestamp().unwrap_or_else(|| Timestamp::from_epoch_seconds(0)).to_string();
    let parts_count = meta.mpu_parts_count().unwrap_or(1);

    let mut segments = Vec::with_capacity(parts_count as usize);
    let mut total_bytes = 0u64;
    for part_number in 1..=parts_count {
        let options = GetOptions {
            part_number: Some(part_number),
            if_match: Some(meta.etag.clone()),
            resp_chunk_size: None,
        };
        let fetched = provider.get_object(bucket, key, options).await?;
        let part_size = fetched.body.len() as u64;
        let name = large_object::segment_name(key, &x_ts, meta.content_length, part_size, part_number);
        internal_client
            .put_object(account, &seg_container, &name, HeaderMap::new(), fetched.body)
            .await?;
        total_bytes += part_size;
        segments.push(large_object::Segment {
            name,
            bytes: part_size,
            hash: fetched.meta.etag,
        });
    }

    let computed_etag = large_object::get_slo_etag(&segments)?;
    if computed_etag != meta.etag.trim_start_matches('"') {
        warn!(key = %key, "multipart etag mismatch, removing uploaded segments");
        for seg in &segments {
            let _ = internal_client
                .delete_object(account, &seg_container, &seg.name, Timestamp::from_epoch_seconds(0).tick())
                .await;
        }
        return Err(Error::Migration(format!("multipart etag mismatch for {key}")));
    }

    let manifest_body = serde_json::to_vec(&segments)
        .map_err(|e| Error::Generic(format!("failed to serialize manifest: {e}")))?;
    let mut headers = HeaderMap::new();
    headers.insert(crate::headers::STATIC_LARGE_OBJECT_HEADER, "True");
    let head_epoch = meta.x_timestamp().map(|t| t.as_epoch_seconds_f64());
    let ts = resolve_write_timestamp(listing_ts, head_epoch);
    headers.insert(MIGRATOR_OBJECT_HEADER, ts.to_string());
    headers.insert(TIMESTAMP_HEADER, ts.to_string());

    internal_client.put_object(account, container, key, headers, manifest_body).await?;
    stats.update(1, 1, total_bytes).await;
    Ok(())
}

/// Migrates a plain object whose size exceeds `max_file_size` by downloading
/// the whole body and re-slicing it locally into `segment_size` chunks. A
/// whole-file etag is never expected to equal a manifest-derived segment
/// etag, so unlike [`migrate_mpu`] there is no etag validation here.
async fn migrate_oversized<P: Provider, IC: InternalClient>(
    provider: &P,
    internal_client: &IC,
    stats: &MigratorPassStats,
    account: &str,
    bucket: &str,
    container: &str,
    key: &str,
    meta: &crate::headers::ObjectMeta,
    segment_size: u64,
    listing_ts: f64,
) -> Result<()> {
    let seg_container = large_object::segments_container(container);
    if !internal_client.container_exists(account, &seg_container).await? {
        internal_client.create_container(account, &seg_container, HeaderMap::new()).await?;
    }

    let fetched = provider.get_object(bucket, key, GetOptions::default()).await?;
    let total_size = fetched.body.len() as u64;
    let plan = large_object::plan_segments(total_size, segment_size);
    let x_ts = meta.x_timestamp().unwrap_or_else(|| Timestamp::from_epoch_seconds(0)).to_string();

    let mut segments = Vec::with_capacity(plan.len());
    for (index, (offset, size)) in plan.iter().enumerate() {
        let chunk = fetched.body[*offset as usize..(*offset + *size) as usize].to_vec();
        let name = large_object::segment_name(key, &x_ts, total_size, *size, index as u32 + 1);
        let etag = format!("{:x}", md5::compute(&chunk));
        internal_client
            .put_object(account, &seg_container, &name, HeaderMap::new(), chunk)
            .await?;
        segments.push(large_object::Segment { name, bytes: *size, hash: etag });
    }

    let manifest_body = serde_json::to_vec(&segments)
        .map_err(|e| Error::Generic(format!("failed to serialize manifest: {e}")))?;
    let mut headers = HeaderMap::new();
    headers.insert(crate::headers::STATIC_LARGE_OBJECT_HEADER, "True");
    let head_epoch = meta.x_timestamp().map(|t| t.as_epoch_seconds_f64());
    let ts = resolve_write_timestamp(listing_ts, head_epoch);
    headers.insert(MIGRATOR_OBJECT_HEADER, ts.to_string());
    headers.insert(TIMESTAMP_HEADER, ts.to_string());

    internal_client.put_object(account, container, key, headers, manifest_body).await?;
    stats.update(1, 1, total_size).await;
    Ok(())
}
