use futures::stream::BoxStream;

use crate::error::Result;
use crate::headers::{ContainerMeta, ObjectMeta};

/// One entry in a bucket/container listing, ordered by `name`.
#[derive(Debug, Clone)]
pub struct ListingEntry {
    pub name: String,
    pub hash: String,
    pub bytes: u64,
    pub last_modified: String,
}

/// Options for a single GET against the remote store.
#[derive(Debug, Clone, Default)]
pub struct GetOptions {
    pub part_number: Option<u32>,
    pub if_match: Option<String>,
    pub resp_chunk_size: Option<usize>,
}

/// A fetched object body plus its metadata, as returned by [`Provider::get_object`].
pub struct ObjectBody {
    pub meta: ObjectMeta,
    pub body: Vec<u8>,
}

/// Abstracts the remote store being migrated from (S3-flavor or
/// Swift-flavor). Concrete implementations live behind feature flags (see
/// `backends::s3`) or are supplied by the caller.
pub trait Provider: Send + Sync {
    /// Streams bucket names, paginated internally by the implementation.
    fn list_buckets(&self) -> BoxStream<'_, Result<String>>;

    /// Streams listing entries for `bucket`, optionally filtered by `prefix`,
    /// in ascending `name` order starting strictly after `marker`.
    fn list_objects<'a>(
        &'a self,
        bucket: &'a str,
        prefix: Option<&'a str>,
        marker: &'a str,
    ) -> BoxStream<'a, Result<ListingEntry>>;

    fn head_bucket(&self, bucket: &str) -> impl std::future::Future<Output = Result<ContainerMeta>> + Send;

    fn head_account(&self) -> impl std::future::Future<Output = Result<ContainerMeta>> + Send;

    fn head_object(
        &self,
        bucket: &str,
        key: &str,
    ) -> impl std::future::Future<Output = Result<ObjectMeta>> + Send;

    fn get_object(
        &self,
        bucket: &str,
        key: &str,
        options: GetOptions,
    ) -> impl std::future::Future<Output = Result<ObjectBody>> + Send;

    /// Fetches and parses an SLO manifest body into its segment list.
    fn get_manifest(
        &self,
        bucket: &str,
        key: &str,
    ) -> impl std::future::Future<Output = Result<Vec<crate::large_object::Segment>>> + Send;
}
