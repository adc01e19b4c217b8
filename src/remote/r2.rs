// src/remote/r2.rs
//! Cloudflare R2 backend (S3 API via rust-s3)

use crate::error::{Error, Result};
use crate::remote::{KeyStream, RemoteConfig, RemoteStore};
use async_stream::try_stream;
use async_trait::async_trait;
use s3::bucket::Bucket;
use s3::creds::Credentials;
use s3::error::S3Error;
use s3::region::Region;
use tracing::{debug, instrument};

/// Bucket-backed remote store
pub struct R2Store {
    bucket: Box<Bucket>,
    name: String,
}

impl R2Store {
    /// Build a client from explicit settings
    ///
    /// Fails with `Config` when neither an endpoint nor an R2 account id is
    /// given, or the credentials are unusable.
    pub fn new(config: &RemoteConfig) -> Result<Self> {
        let region = match (&config.endpoint, &config.account_id) {
            (Some(endpoint), _) => Region::Custom {
                region: config.region.clone(),
                endpoint: endpoint.clone(),
            },
            (None, Some(account_id)) => Region::R2 {
                account_id: account_id.clone(),
            },
            (None, None) => {
                return Err(Error::Config(
                    "remote store needs an endpoint or an R2 account id".to_string(),
                ));
            }
        };

        let credentials = Credentials::new(
            config.access_key.as_deref(),
            config.secret_key.as_deref(),
            None,
            None,
            None,
        )
        .map_err(|e| Error::Config(format!("Invalid remote credentials: {e}")))?;

        let bucket = Bucket::new(&config.bucket, region, credentials)
            .map_err(|e| Error::Config(format!("Invalid bucket {}: {e}", config.bucket)))?
            .with_path_style();

        Ok(Self {
            bucket,
            name: format!("r2:{}", config.bucket),
        })
    }
}

/// Map a transport failure for `key` onto the crate taxonomy
fn remote_error(key: &str, err: S3Error) -> Error {
    match err {
        S3Error::HttpFailWithBody(404, _) => Error::NotFound(key.to_string()),
        other => Error::RemoteUnavailable(format!("{key}: {other}")),
    }
}

fn check_status(key: &str, status: u16) -> Result<()> {
    match status {
        200..=299 => Ok(()),
        404 => Err(Error::NotFound(key.to_string())),
        code => Err(Error::RemoteUnavailable(format!("{key}: HTTP {code}"))),
    }
}

#[async_trait]
impl RemoteStore for R2Store {
    fn list<'a>(&'a self, prefix: &'a str) -> KeyStream<'a> {
        Box::pin(try_stream! {
            let mut continuation: Option<String> = None;
            let mut pages = 0usize;

            loop {
                let (page, status) = self
                    .bucket
                    .list_page(prefix.to_string(), None, continuation.take(), None, None)
                    .await
                    .map_err(|e| remote_error(prefix, e))?;
                check_status(prefix, status)?;
                pages += 1;

                for object in page.contents {
                    yield object.key;
                }

                match page.next_continuation_token {
                    Some(token) if page.is_truncated => continuation = Some(token),
                    _ => break,
                }
            }

            debug!(%prefix, pages, "listed remote prefix");
        })
    }

    #[instrument(skip(self), fields(store = %self.name))]
    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let response = self
            .bucket
            .get_object(key)
            .await
            .map_err(|e| remote_error(key, e))?;
        check_status(key, response.status_code())?;

        let data = response.bytes().to_vec();
        debug!(bytes = data.len(), "fetched object");
        Ok(data)
    }

    #[instrument(skip(self, data), fields(store = %self.name, bytes = data.len()))]
    async fn put(&self, key: &str, data: Vec<u8>, content_type: &str) -> Result<()> {
        let response = self
            .bucket
            .put_object_with_content_type(key, &data, content_type)
            .await
            .map_err(|e| remote_error(key, e))?;
        check_status(key, response.status_code())?;

        debug!("stored object");
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
