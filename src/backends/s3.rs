use aws_sdk_s3::Client;
use futures::stream::{self, BoxStream, StreamExt};

use crate::error::{Error, Result};
use crate::headers::{ContainerMeta, HeaderMap, ObjectMeta};
use crate::large_object::Segment;
use crate::provider::{GetOptions, ListingEntry, ObjectBody, Provider};

/// A thin `Provider` over a real S3-compatible endpoint: a bare client
/// field plus string-matching 404 detection, since the SDK's typed error
/// variants are not reliable across every S3-compatible implementation
/// this migrates from.
#[derive(Clone, Debug)]
pub struct S3Provider {
    client: Client,
}

impl S3Provider {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Builds a client from the standard AWS environment/credentials chain
    /// and an optional custom endpoint (for S3-compatible, non-AWS stores).
    pub async fn from_env(endpoint: Option<&str>) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Some(endpoint) = endpoint {
            loader = loader.endpoint_url(endpoint);
        }
        let sdk_config = loader.load().await;
        Self::new(Client::new(&sdk_config))
    }

    fn map_sdk_err<E>(e: E) -> Error
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Error::connection(e)
    }

    fn is_not_found(msg: &str) -> bool {
        msg.contains("NotFound") || msg.contains("NoSuchKey") || msg.contains("404") || msg.contains("StatusCode(404)")
    }
}

impl Provider for S3Provider {
    fn list_buckets(&self) -> BoxStream<'_, Result<String>> {
        let client = self.client.clone();
        Box::pin(
            stream::once(async move {
                let resp = client.list_buckets().send().await.map_err(Self::map_sdk_err)?;
                let names = resp
                    .buckets()
                    .iter()
                    .filter_map(|b| b.name().map(|s| s.to_string()))
                    .collect::<Vec<_>>();
                Ok::<_, Error>(names)
            })
            .flat_map(|result| match result {
                Ok(names) => stream::iter(names.into_iter().map(Ok)).boxed(),
                Err(e) => stream::once(async move { Err(e) }).boxed(),
            }),
        )
    }

    fn list_objects<'a>(
        &'a self,
        bucket: &'a str,
        prefix: Option<&'a str>,
        marker: &'a str,
    ) -> BoxStream<'a, Result<ListingEntry>> {
        struct State {
            client: Client,
            bucket: String,
            prefix: Option<String>,
            marker: String,
            token: Option<String>,
            done: bool,
            page: std::vec::IntoIter<ListingEntry>,
        }

        let state = State {
            client: self.client.clone(),
            bucket: bucket.to_string(),
            prefix: prefix.map(|s| s.to_string()),
            marker: marker.to_string(),
            token: None,
            done: false,
            page: Vec::new().into_iter(),
        };

        Box::pin(stream::unfold(state, |mut state| async move {
            loop {
                if let Some(entry) = state.page.next() {
                    return Some((Ok(entry), state));
                }
                if state.done {
                    return None;
                }

                let mut req = state.client.list_objects_v2().bucket(&state.bucket);
                if let Some(p) = &state.prefix {
                    req = req.prefix(p);
                }
                if !state.marker.is_empty() {
                    req = req.start_after(&state.marker);
                }
                if let Some(token) = &state.token {
                    req = req.continuation_token(token);
                }

                let resp = match req.send().await.map_err(Self::map_sdk_err) {
                    Ok(resp) => resp,
                    Err(e) => {
                        state.done = true;
                        return Some((Err(e), state));
                    }
                };

                let entries = resp
                    .contents()
                    .iter()
                    .map(|obj| ListingEntry {
                        name: obj.key().unwrap_or_default().to_string(),
                        hash: obj.e_tag().unwrap_or_default().trim_matches('"').to_string(),
                        bytes: obj.size().unwrap_or(0) as u64,
                        last_modified: obj
                            .last_modified()
                            .and_then(|dt| dt.fmt(aws_smithy_types::date_time::Format::DateTime).ok())
                            .unwrap_or_default(),
                    })
                    .collect::<Vec<_>>();

                state.token = resp.next_continuation_token().map(|s| s.to_string());
                state.done = !resp.is_truncated().unwrap_or(false) || state.token.is_none();
                state.page = entries.into_iter();
            }
        }))
    }

    async fn head_bucket(&self, bucket: &str) -> Result<ContainerMeta> {
        self.client
            .head_bucket()
            .bucket(bucket)
            .send()
            .await
            .map_err(|e| {
                let msg = e.to_string();
                if Self::is_not_found(&msg) {
                    Error::ContainerNotFound {
                        account: String::new(),
                        container: bucket.to_string(),
                    }
                } else {
                    Self::map_sdk_err(e)
                }
            })?;
        Ok(ContainerMeta::new(HeaderMap::new()))
    }

    async fn head_account(&self) -> Result<ContainerMeta> {
        Ok(ContainerMeta::new(HeaderMap::new()))
    }

    async fn head_object(&self, bucket: &str, key: &str) -> Result<ObjectMeta> {
        let resp = self
            .client
            .head_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                let msg = e.to_string();
                if Self::is_not_found(&msg) {
                    Error::NotFound(format!("{bucket}/{key}"))
                } else {
                    Self::map_sdk_err(e)
                }
            })?;

        let mut headers = HeaderMap::new();
        if let Some(manifest) = resp.metadata().and_then(|m| m.get("x-object-manifest")) {
            headers.insert(crate::headers::OBJECT_MANIFEST_HEADER, manifest.clone());
        }
        if let Some(parts) = resp.parts_count() {
            headers.insert(crate::headers::MPU_PARTS_COUNT_HEADER, parts.to_string());
        }
        let etag = resp.e_tag().unwrap_or_default().trim_matches('"').to_string();
        let content_length = resp.content_length().unwrap_or(0) as u64;
        Ok(ObjectMeta::new(headers, etag, content_length))
    }

    async fn get_object(&self, bucket: &str, key: &str, options: GetOptions) -> Result<ObjectBody> {
        let mut req = self.client.get_object().bucket(bucket).key(key);
        if let Some(part) = options.part_number {
            req = req.part_number(part as i32);
        }
        if let Some(if_match) = &options.if_match {
            req = req.if_match(if_match);
        }

        let resp = req.send().await.map_err(|e| {
            let msg = e.to_string();
            if Self::is_not_found(&msg) {
                Error::NotFound(format!("{bucket}/{key}"))
            } else {
                Self::map_sdk_err(e)
            }
        })?;

        let etag = resp.e_tag().unwrap_or_default().trim_matches('"').to_string();
        let body = resp
            .body
            .collect()
            .await
            .map_err(Self::map_sdk_err)?
            .into_bytes()
            .to_vec();

        let meta = ObjectMeta::new(HeaderMap::new(), etag, body.len() as u64);
        Ok(ObjectBody { meta, body })
    }

    async fn get_manifest(&self, bucket: &str, key: &str) -> Result<Vec<Segment>> {
        let body = self.get_object(bucket, key, GetOptions::default()).await?.body;
        serde_json::from_slice(&body).map_err(|e| Error::Generic(format!("invalid manifest json: {e}")))
    }
}
