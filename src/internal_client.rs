use futures::stream::BoxStream;

use crate::error::Result;
use crate::headers::{ContainerMeta, HeaderMap, ObjectMeta};

/// Abstracts the local Swift-like cluster objects are migrated into.
pub trait InternalClient: Send + Sync {
    fn container_exists(
        &self,
        account: &str,
        container: &str,
    ) -> impl std::future::Future<Output = Result<bool>> + Send;

    fn create_container(
        &self,
        account: &str,
        container: &str,
        headers: HeaderMap,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    fn delete_container(
        &self,
        account: &str,
        container: &str,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    fn get_container_metadata(
        &self,
        account: &str,
        container: &str,
    ) -> impl std::future::Future<Output = Result<ContainerMeta>> + Send;

    fn set_container_metadata(
        &self,
        account: &str,
        container: &str,
        headers: HeaderMap,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    fn get_account_metadata(
        &self,
        account: &str,
    ) -> impl std::future::Future<Output = Result<ContainerMeta>> + Send;

    fn set_account_metadata(
        &self,
        account: &str,
        headers: HeaderMap,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    fn get_object_metadata(
        &self,
        account: &str,
        container: &str,
        key: &str,
    ) -> impl std::future::Future<Output = Result<ObjectMeta>> + Send;

    fn put_object(
        &self,
        account: &str,
        container: &str,
        key: &str,
        headers: HeaderMap,
        body: Vec<u8>,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    fn delete_object(
        &self,
        account: &str,
        container: &str,
        key: &str,
        timestamp: crate::timestamp::Timestamp,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Streams listing entries for the local container in ascending name order.
    fn list_objects<'a>(
        &'a self,
        account: &'a str,
        container: &'a str,
        prefix: Option<&'a str>,
    ) -> BoxStream<'a, Result<crate::provider::ListingEntry>>;
}
