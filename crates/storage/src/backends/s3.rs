//! S3-compatible storage backend using signed requests.

use crate::error::{StorageError, StorageResult};
use crate::traits::{ByteStream, ObjectMeta, ObjectStore, PartInfo};
use crate::xml;
use async_trait::async_trait;
use bytes::Bytes;
use futures::TryStreamExt;
use sha2::{Digest as _, Sha256};
use tracing::instrument;
use wharf_core::CompletedPart;
use wharf_sigv4::{RequestSigner, SignedRequest};

/// Object store backed by an S3-compatible service.
///
/// Every operation is a single signed HTTP request; multipart state lives
/// entirely on the store side.
pub struct S3Backend {
    signer: RequestSigner,
    http: reqwest::Client,
}

impl std::fmt::Debug for S3Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Backend").finish_non_exhaustive()
    }
}

impl S3Backend {
    pub fn new(signer: RequestSigner) -> Self {
        Self { signer, http: reqwest::Client::new() }
    }

    fn builder(&self, signed: &SignedRequest) -> StorageResult<reqwest::RequestBuilder> {
        let mut builder = match signed.method.as_str() {
            "GET" => self.http.get(&signed.url),
            "HEAD" => self.http.head(&signed.url),
            "PUT" => self.http.put(&signed.url),
            "POST" => self.http.post(&signed.url),
            "DELETE" => self.http.delete(&signed.url),
            other => {
                return Err(StorageError::Protocol(format!("unsupported method {other}")));
            }
        };
        for (name, value) in &signed.headers {
            builder = builder.header(name, value);
        }
        Ok(builder)
    }

    async fn send(&self, signed: &SignedRequest) -> StorageResult<reqwest::Response> {
        Ok(self.builder(signed)?.send().await?)
    }

    /// Read the error body (truncated) and build an UnexpectedStatus.
    async fn status_error(response: reqwest::Response) -> StorageError {
        let status = response.status().as_u16();
        let mut body = response.text().await.unwrap_or_default();
        body.truncate(512);
        StorageError::UnexpectedStatus { status, body }
    }

    fn meta_from_response(response: &reqwest::Response) -> ObjectMeta {
        let size = response
            .headers()
            .get(reqwest::header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());
        ObjectMeta { size, content_type }
    }
}

#[async_trait]
impl ObjectStore for S3Backend {
    #[instrument(skip(self), fields(backend = "s3"))]
    async fn exists(&self, key: &str) -> StorageResult<bool> {
        let response = self.send(&self.signer.head(key)).await?;
        match response.status().as_u16() {
            200..=299 => Ok(true),
            404 => Ok(false),
            _ => Err(Self::status_error(response).await),
        }
    }

    #[instrument(skip(self), fields(backend = "s3"))]
    async fn head(&self, key: &str) -> StorageResult<ObjectMeta> {
        let response = self.send(&self.signer.head(key)).await?;
        match response.status().as_u16() {
            200..=299 => Ok(Self::meta_from_response(&response)),
            404 => Err(StorageError::NotFound(key.to_string())),
            _ => Err(Self::status_error(response).await),
        }
    }

    #[instrument(skip(self), fields(backend = "s3"))]
    async fn get(&self, key: &str) -> StorageResult<Bytes> {
        let response = self.send(&self.signer.get(key)).await?;
        match response.status().as_u16() {
            200..=299 => Ok(response.bytes().await?),
            404 => Err(StorageError::NotFound(key.to_string())),
            _ => Err(Self::status_error(response).await),
        }
    }

    #[instrument(skip(self), fields(backend = "s3"))]
    async fn get_stream(&self, key: &str) -> StorageResult<(ObjectMeta, ByteStream)> {
        let response = self.send(&self.signer.get(key)).await?;
        match response.status().as_u16() {
            200..=299 => {
                let meta = Self::meta_from_response(&response);
                let stream = response
                    .bytes_stream()
                    .map_err(|e| StorageError::Transport(e.to_string()));
                Ok((meta, Box::pin(stream)))
            }
            404 => Err(StorageError::NotFound(key.to_string())),
            _ => Err(Self::status_error(response).await),
        }
    }

    #[instrument(skip(self, data), fields(backend = "s3", size = data.len()))]
    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> StorageResult<()> {
        let signed = self.signer.put(key, content_type);
        let response = self
            .builder(&signed)?
            .header(reqwest::header::CONTENT_LENGTH, data.len())
            .body(data)
            .send()
            .await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(Self::status_error(response).await)
        }
    }

    #[instrument(skip(self, body), fields(backend = "s3", size = content_length))]
    async fn put_stream(
        &self,
        key: &str,
        content_length: u64,
        body: ByteStream,
        content_type: &str,
    ) -> StorageResult<()> {
        let signed = self.signer.put(key, content_type);
        let response = self
            .builder(&signed)?
            .header(reqwest::header::CONTENT_LENGTH, content_length)
            .body(reqwest::Body::wrap_stream(body))
            .send()
            .await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(Self::status_error(response).await)
        }
    }

    #[instrument(skip(self), fields(backend = "s3"))]
    async fn delete(&self, key: &str) -> StorageResult<()> {
        let response = self.send(&self.signer.delete(key)).await?;
        match response.status().as_u16() {
            200..=299 | 404 => Ok(()),
            _ => Err(Self::status_error(response).await),
        }
    }

    #[instrument(skip(self), fields(backend = "s3"))]
    async fn copy(&self, from: &str, to: &str) -> StorageResult<()> {
        let response = self.send(&self.signer.copy(to, from)).await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(Self::status_error(response).await)
        }
    }

    #[instrument(skip(self), fields(backend = "s3"))]
    async fn initiate_multipart(&self, key: &str) -> StorageResult<String> {
        let response = self.send(&self.signer.initiate_multipart(key)).await?;
        if !response.status().is_success() {
            return Err(Self::status_error(response).await);
        }
        let body = response.text().await?;
        xml::parse_initiate(&body)
    }

    #[instrument(skip(self, data), fields(backend = "s3", part_number, size = data.len()))]
    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: u32,
        data: Bytes,
    ) -> StorageResult<String> {
        // Some S3-compatible stores omit the ETag response header; the part
        // hash stands in so complete-multipart always has a value to send.
        let fallback_etag = format!("\"{}\"", hex::encode(Sha256::digest(&data)));

        let signed = self
            .signer
            .upload_part(key, upload_id, part_number, data.len() as u64);
        let response = self.builder(&signed)?.body(data).send().await?;

        if !response.status().is_success() {
            return Err(Self::status_error(response).await);
        }

        let etag = response
            .headers()
            .get(reqwest::header::ETAG)
            .and_then(|v| v.to_str().ok())
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string())
            .unwrap_or(fallback_etag);
        Ok(etag)
    }

    #[instrument(skip(self), fields(backend = "s3"))]
    async fn list_parts(&self, key: &str, upload_id: &str) -> StorageResult<Vec<PartInfo>> {
        let response = self.send(&self.signer.list_parts(key, upload_id)).await?;
        if !response.status().is_success() {
            return Err(Self::status_error(response).await);
        }
        let body = response.text().await?;
        xml::parse_list_parts(&body)
    }

    #[instrument(skip(self, parts), fields(backend = "s3", parts = parts.len()))]
    async fn complete_multipart(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> StorageResult<()> {
        let body = xml::build_complete_body(parts);
        let signed = self.signer.complete_multipart(key, upload_id, body.as_bytes());
        let response = self.builder(&signed)?.body(body).send().await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(Self::status_error(response).await)
        }
    }

    #[instrument(skip(self), fields(backend = "s3"))]
    async fn abort_multipart(&self, key: &str, upload_id: &str) -> StorageResult<()> {
        let response = self.send(&self.signer.abort_multipart(key, upload_id)).await?;
        match response.status().as_u16() {
            200..=299 | 404 => Ok(()),
            _ => Err(Self::status_error(response).await),
        }
    }

    fn presign_put(&self, key: &str, expires_secs: u64) -> StorageResult<String> {
        Ok(self.signer.presigned_put_url(key, expires_secs))
    }

    fn backend_name(&self) -> &'static str {
        "s3"
    }
}
