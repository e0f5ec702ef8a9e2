//! REST-backed KV store client.
//!
//! Speaks the plain GET/PUT/DELETE-on-key protocol that hosted edge KV
//! services expose: `GET <base>/<key>` returns the value or 404,
//! `PUT <base>/<key>` writes the body, `DELETE <base>/<key>` removes it.

use crate::error::{MetadataError, MetadataResult};
use crate::kv::KvStore;
use async_trait::async_trait;
use bytes::Bytes;

/// KV store reached over HTTP.
pub struct HttpKv {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpKv {
    pub fn new(base_url: &str, token: Option<String>) -> MetadataResult<Self> {
        if base_url.is_empty() {
            return Err(MetadataError::Config("KV base_url cannot be empty".to_string()));
        }
        Ok(Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    fn url(&self, key: &str) -> String {
        format!("{}/{key}", self.base_url)
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn status_error(response: reqwest::Response) -> MetadataError {
        let status = response.status().as_u16();
        let mut body = response.text().await.unwrap_or_default();
        body.truncate(256);
        MetadataError::UnexpectedStatus { status, body }
    }
}

#[async_trait]
impl KvStore for HttpKv {
    async fn lookup(&self, key: &str) -> MetadataResult<Option<Bytes>> {
        let response = self.authorize(self.http.get(self.url(key))).send().await?;
        match response.status().as_u16() {
            200..=299 => Ok(Some(response.bytes().await?)),
            404 => Ok(None),
            _ => Err(Self::status_error(response).await),
        }
    }

    async fn insert(&self, key: &str, value: Bytes) -> MetadataResult<()> {
        let response = self
            .authorize(self.http.put(self.url(key)))
            .body(value)
            .send()
            .await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(Self::status_error(response).await)
        }
    }

    async fn delete(&self, key: &str) -> MetadataResult<()> {
        let response = self.authorize(self.http.delete(self.url(key))).send().await?;
        match response.status().as_u16() {
            200..=299 | 404 => Ok(()),
            _ => Err(Self::status_error(response).await),
        }
    }
}
