use async_trait::async_trait;
use aws_config::meta::region::RegionProviderChain;
use aws_sdk_s3::error::{DisplayErrorContext, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use bytes::Bytes;
use futures::stream::{self, StreamExt, TryStreamExt};

use super::{join_key, ObjectStore, ObjectStream, TileRef};
use crate::error::IoError;

/// Region used when neither the command line, the environment nor the profile
/// names one.
pub const FALLBACK_REGION: &str = "us-east-1";

/// Connection settings shared by every S3 store of a run.
#[derive(Debug, Clone, Default)]
pub struct S3Settings {
    /// Named credentials profile (`~/.aws/credentials`)
    pub profile: Option<String>,
    /// Region override
    pub region: Option<String>,
    /// Custom endpoint for S3-compatible services (MinIO, Ceph, ...)
    pub endpoint: Option<String>,
}

/// Create an S3 client from the standard credential chain.
///
/// Use a custom endpoint for S3-compatible services like MinIO:
/// ```ignore
/// let settings = S3Settings {
///     endpoint: Some("http://localhost:9000".to_string()),
///     ..Default::default()
/// };
/// let client = create_s3_client(&settings).await;
/// ```
pub async fn create_s3_client(settings: &S3Settings) -> Client {
    let region = RegionProviderChain::first_try(
        settings.region.clone().map(aws_config::Region::new),
    )
    .or_default_provider()
    .or_else(FALLBACK_REGION);

    let mut config_loader =
        aws_config::defaults(aws_config::BehaviorVersion::latest()).region(region);

    if let Some(profile) = &settings.profile {
        config_loader = config_loader.profile_name(profile);
    }
    if let Some(endpoint) = &settings.endpoint {
        config_loader = config_loader.endpoint_url(endpoint);
    }

    let sdk_config = config_loader.load().await;

    // S3-compatible services usually need path-style addressing
    let s3_config = if settings.endpoint.is_some() {
        aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(true)
            .build()
    } else {
        aws_sdk_s3::config::Builder::from(&sdk_config).build()
    };

    Client::from_conf(s3_config)
}

/// [`ObjectStore`] over a bucket prefix.
#[derive(Clone)]
pub struct S3Store {
    client: Client,
    bucket: String,
    prefix: String,
}

enum PageState {
    Start,
    Next(String),
    Done,
}

fn sdk_error<E, R>(err: &SdkError<E, R>) -> String
where
    E: std::error::Error + 'static,
    R: std::fmt::Debug,
{
    DisplayErrorContext(err).to_string()
}

impl S3Store {
    pub fn new(client: Client, bucket: String, prefix: String) -> Self {
        Self {
            client,
            bucket,
            prefix: prefix.trim_matches('/').to_string(),
        }
    }

    fn object_key(&self, key: &str) -> String {
        join_key(&self.prefix, key)
    }

    /// Strip the store prefix from a listed object key.
    fn relative_key<'a>(&self, object_key: &'a str) -> Option<&'a str> {
        if self.prefix.is_empty() {
            return Some(object_key);
        }
        object_key
            .strip_prefix(self.prefix.as_str())?
            .strip_prefix('/')
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    fn list(&self, prefix: &str, start_at: usize) -> ObjectStream {
        let list_prefix = match self.object_key(prefix) {
            key if key.is_empty() || key.ends_with('/') => key,
            key => format!("{}/", key),
        };
        let store = self.clone();

        // ListObjectsV2 returns keys in ascending UTF-8 order, one page at a time.
        let pages = stream::try_unfold(PageState::Start, move |state| {
            let store = store.clone();
            let list_prefix = list_prefix.clone();
            async move {
                let token = match state {
                    PageState::Start => None,
                    PageState::Next(token) => Some(token),
                    PageState::Done => return Ok(None),
                };

                let mut request = store
                    .client
                    .list_objects_v2()
                    .bucket(&store.bucket)
                    .prefix(&list_prefix);
                if let Some(token) = token {
                    request = request.continuation_token(token);
                }
                let response = request.send().await.map_err(|e| IoError::S3(sdk_error(&e)))?;

                let keys: Vec<Result<TileRef, IoError>> = response
                    .contents()
                    .iter()
                    .filter_map(|object| object.key())
                    .filter(|key| !key.ends_with('/'))
                    .filter_map(|key| store.relative_key(key))
                    .map(|key| Ok(TileRef::new(key)))
                    .collect();

                let next = match response.next_continuation_token() {
                    Some(token) if response.is_truncated().unwrap_or(false) => {
                        PageState::Next(token.to_string())
                    }
                    _ => PageState::Done,
                };
                Ok(Some((stream::iter(keys), next)))
            }
        });

        pages.try_flatten().skip(start_at).boxed()
    }

    async fn get(&self, key: &str) -> Result<Bytes, IoError> {
        let object_key = self.object_key(key);
        let resp = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&object_key)
            .send()
            .await
            .map_err(|e| {
                let is_not_found = e
                    .as_service_error()
                    .map(|se| se.is_no_such_key())
                    .unwrap_or(false);
                let status_is_404 = e
                    .raw_response()
                    .map(|r| r.status().as_u16() == 404)
                    .unwrap_or(false);

                if is_not_found || status_is_404 {
                    IoError::NotFound(self.identifier(key))
                } else {
                    IoError::S3(sdk_error(&e))
                }
            })?;

        let data = resp
            .body
            .collect()
            .await
            .map_err(|e| IoError::Connection(e.to_string()))?
            .into_bytes();

        Ok(data)
    }

    async fn put(&self, key: &str, data: Bytes) -> Result<(), IoError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(self.object_key(key))
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| IoError::S3(sdk_error(&e)))?;
        Ok(())
    }

    fn identifier(&self, key: &str) -> String {
        format!("s3://{}/{}", self.bucket, self.object_key(key))
    }
}
