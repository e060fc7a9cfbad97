//! All interaction with the S3-compatible endpoint. Two clients share
//! credentials but point at different endpoints: `internal` is used for
//! server-originated calls, `public` is the host baked into presigned URLs
//! handed to browsers, which cannot resolve a private network hostname.

use crate::config::S3Config;
use crate::error::AppError;
use anyhow::{Context, Result};
use aws_sdk_s3::{
    Client as S3Client,
    config::{Credentials, Region},
    presigning::PresigningConfig,
};
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;

#[derive(Clone)]
pub struct ObjectStore {
    internal: S3Client,
    public: S3Client,
    bucket: String,
    max_upload_bytes: u64,
}

pub struct HeadResult {
    pub content_length: u64,
    pub content_type: Option<String>,
}

fn build_client(endpoint: &str, cfg: &S3Config) -> S3Client {
    let conf = aws_sdk_s3::config::Builder::new()
        .endpoint_url(endpoint)
        .region(Region::new(cfg.region.clone()))
        .credentials_provider(Credentials::new(
            cfg.access_key.clone(),
            cfg.secret_key.clone(),
            None,
            None,
            "sendrec",
        ))
        .behavior_version(aws_sdk_s3::config::BehaviorVersion::latest())
        .build();
    S3Client::from_conf(conf)
}

/// Bytes < 0x20, quotes, and backslashes are replaced with `_` so a
/// filename can never break out of the `Content-Disposition` header value.
fn sanitize_disposition_filename(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_control() || c == '"' || c == '\\' { '_' } else { c })
        .collect()
}

impl ObjectStore {
    pub fn new(cfg: &S3Config, max_upload_bytes: u64) -> Self {
        Self {
            internal: build_client(&cfg.internal_endpoint, cfg),
            public: build_client(&cfg.public_endpoint, cfg),
            bucket: cfg.bucket.clone(),
            max_upload_bytes,
        }
    }

    pub async fn ensure_bucket(&self) -> Result<()> {
        let exists = self
            .internal
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .is_ok();
        if !exists {
            self.internal
                .create_bucket()
                .bucket(&self.bucket)
                .send()
                .await
                .context("create bucket")?;
        }
        Ok(())
    }

    pub async fn presign_upload(
        &self,
        key: &str,
        content_type: &str,
        content_length: u64,
        ttl: Duration,
    ) -> Result<String, AppError> {
        if content_length > self.max_upload_bytes {
            return Err(AppError::TooLarge);
        }
        let presign_config = PresigningConfig::expires_in(ttl)
            .map_err(|e| AppError::Internal(e.into()))?;
        let req = self
            .public
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .content_length(content_length as i64)
            .presigned(presign_config)
            .await
            .map_err(|e| AppError::Internal(e.into()))?;
        Ok(req.uri().to_string())
    }

    pub async fn presign_download(
        &self,
        key: &str,
        ttl: Duration,
        content_disposition: Option<&str>,
    ) -> Result<String, AppError> {
        let presign_config = PresigningConfig::expires_in(ttl)
            .map_err(|e| AppError::Internal(e.into()))?;
        let mut req = self.public.get_object().bucket(&self.bucket).key(key);
        if let Some(filename) = content_disposition {
            let safe = sanitize_disposition_filename(filename);
            req = req.response_content_disposition(format!("attachment; filename=\"{safe}\""));
        }
        let presigned = req
            .presigned(presign_config)
            .await
            .map_err(|e| AppError::Internal(e.into()))?;
        Ok(presigned.uri().to_string())
    }

    pub async fn head(&self, key: &str) -> Result<HeadResult, AppError> {
        let resp = self
            .internal
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| match e.as_service_error().map(|s| s.is_not_found()) {
                Some(true) => AppError::NotFound("video not found"),
                _ => AppError::Internal(e.into()),
            })?;
        Ok(HeadResult {
            content_length: resp.content_length().unwrap_or(0).max(0) as u64,
            content_type: resp.content_type().map(|s| s.to_string()),
        })
    }

    pub async fn download_to_file(&self, key: &str, path: &Path) -> Result<()> {
        let resp = self
            .internal
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .with_context(|| format!("get_object {key}"))?;
        let mut body = resp.body.into_async_read();
        let mut file = tokio::fs::File::create(path)
            .await
            .with_context(|| format!("create {path:?}"))?;
        tokio::io::copy(&mut body, &mut file).await.context("stream to disk")?;
        file.flush().await.context("flush")?;
        Ok(())
    }

    pub async fn upload_file(&self, key: &str, path: &Path, content_type: &str) -> Result<()> {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("read {path:?}"))?;
        self.internal
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(bytes.into())
            .send()
            .await
            .with_context(|| format!("put_object {key}"))?;
        Ok(())
    }

    pub async fn delete(&self, key: &str) -> Result<()> {
        self.internal
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .with_context(|| format!("delete_object {key}"))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitizes_disposition_filename() {
        let input = "evil\"; x=\\\n<0x01>.mp4";
        let out = sanitize_disposition_filename(input);
        assert!(!out.contains('"'));
        assert!(!out.contains('\\'));
        assert!(!out.contains('\n'));
    }
}
