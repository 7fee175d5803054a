//! S3 backend built on `aws-sdk-s3`.
//!
//! Works against AWS S3 and S3-compatible services (MinIO, R2, ...) when a
//! custom endpoint and path-style addressing are configured. Credentials come
//! from the default AWS provider chain.

use super::{
    ListPage, ListRequest, ObjectBody, ObjectStore, StoreError, StoreResult, StoredObject,
    encode_key_path,
};
use async_trait::async_trait;
use aws_sdk_s3::{
    Client,
    config::{BehaviorVersion, Region},
    error::{ProvideErrorMetadata, SdkError},
    presigning::PresigningConfig,
    primitives::ByteStream,
};
use bytes::Bytes;
use chrono::DateTime;
use futures::StreamExt;
use std::time::Duration;
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};

const STREAM_CHUNK_SIZE: usize = 8192;
/// Codes meaning the key is absent. A missing bucket is a backend fault.
const NOT_FOUND_CODES: [&str; 2] = ["NoSuchKey", "NotFound"];

/// Connection settings for [`S3ObjectStore::connect`].
#[derive(Clone, Debug)]
pub struct S3Settings {
    pub region: String,
    pub endpoint: Option<String>,
    pub force_path_style: bool,
}

#[derive(Clone, Debug)]
pub struct S3ObjectStore {
    client: Client,
}

impl S3ObjectStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Build a client from the default credential chain plus `settings`.
    pub async fn connect(settings: &S3Settings) -> Self {
        let shared = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(settings.region.clone()))
            .load()
            .await;

        let mut builder =
            aws_sdk_s3::config::Builder::from(&shared).force_path_style(settings.force_path_style);
        if let Some(endpoint) = &settings.endpoint {
            builder = builder.endpoint_url(endpoint);
        }

        debug!(
            region = %settings.region,
            endpoint = ?settings.endpoint,
            path_style = settings.force_path_style,
            "configured S3 client"
        );
        Self::new(Client::from_conf(builder.build()))
    }
}

/// Translate an SDK error into a [`StoreError`], keeping not-found distinct.
fn map_sdk_error<E, R>(err: SdkError<E, R>, bucket: &str, key: &str) -> StoreError
where
    E: ProvideErrorMetadata,
{
    if let Some(service_err) = err.as_service_error() {
        let code = service_err.code().unwrap_or("unknown");
        if is_not_found_code(code) {
            return StoreError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            };
        }
        let message = service_err.message().unwrap_or("no message");
        warn!(bucket, key, code, message, "S3 call failed");
        return StoreError::Backend(format!("{}: {}", code, message));
    }
    let message = err.to_string();
    warn!(bucket, key, error = %message, "S3 call failed before a response");
    StoreError::Backend(message)
}

fn is_not_found_code(code: &str) -> bool {
    NOT_FOUND_CODES.contains(&code)
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    fn kind(&self) -> &'static str {
        "s3"
    }

    async fn list_objects(&self, bucket: &str, request: ListRequest) -> StoreResult<ListPage> {
        let max_keys = i32::try_from(request.max_keys).unwrap_or(i32::MAX);
        let output = self
            .client
            .list_objects_v2()
            .bucket(bucket)
            .prefix(&request.prefix)
            .set_delimiter(request.delimiter)
            .max_keys(max_keys)
            .set_continuation_token(request.continuation_token)
            .send()
            .await
            .map_err(|err| map_sdk_error(err, bucket, &request.prefix))?;

        let contents = output
            .contents()
            .iter()
            .filter_map(|object| {
                let key = object.key()?.to_string();
                let last_modified = object
                    .last_modified()
                    .and_then(|dt| DateTime::from_timestamp(dt.secs(), dt.subsec_nanos()));
                Some(StoredObject {
                    key,
                    size: object.size().unwrap_or(0).max(0) as u64,
                    last_modified,
                })
            })
            .collect();

        let common_prefixes = output
            .common_prefixes()
            .iter()
            .filter_map(|cp| cp.prefix().map(str::to_string))
            .collect();

        Ok(ListPage {
            common_prefixes,
            contents,
            next_continuation_token: output.next_continuation_token().map(str::to_string),
            is_truncated: output.is_truncated().unwrap_or(false),
        })
    }

    async fn copy_object(
        &self,
        bucket: &str,
        source_key: &str,
        dest_key: &str,
    ) -> StoreResult<()> {
        let copy_source = format!("{}/{}", bucket, encode_key_path(source_key));
        self.client
            .copy_object()
            .bucket(bucket)
            .copy_source(copy_source)
            .key(dest_key)
            .send()
            .await
            .map_err(|err| map_sdk_error(err, bucket, source_key))?;
        Ok(())
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> StoreResult<()> {
        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| map_sdk_error(err, bucket, key))?;
        Ok(())
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        content_type: Option<String>,
    ) -> StoreResult<()> {
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(body))
            .set_content_type(content_type)
            .send()
            .await
            .map_err(|err| map_sdk_error(err, bucket, key))?;
        Ok(())
    }

    async fn get_object(&self, bucket: &str, key: &str) -> StoreResult<ObjectBody> {
        let output = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| map_sdk_error(err, bucket, key))?;

        let content_type = output.content_type().map(str::to_string);
        let content_length = output
            .content_length()
            .and_then(|len| u64::try_from(len).ok());
        let reader = output.body.into_async_read();

        Ok(ObjectBody {
            stream: ReaderStream::with_capacity(reader, STREAM_CHUNK_SIZE).boxed(),
            content_type,
            content_length,
        })
    }

    async fn presign_get(
        &self,
        bucket: &str,
        key: &str,
        expires_in: Duration,
    ) -> StoreResult<String> {
        let config = PresigningConfig::expires_in(expires_in)
            .map_err(|err| StoreError::Backend(err.to_string()))?;
        let request = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .presigned(config)
            .await
            .map_err(|err| map_sdk_error(err, bucket, key))?;
        Ok(request.uri().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_missing_keys_map_to_not_found() {
        assert!(is_not_found_code("NoSuchKey"));
        assert!(is_not_found_code("NotFound"));
        assert!(!is_not_found_code("NoSuchBucket"));
        assert!(!is_not_found_code("AccessDenied"));
    }
}
