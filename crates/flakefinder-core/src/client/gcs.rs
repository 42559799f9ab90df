//! Blob store adapter (Google Cloud Storage JSON API).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::http::{trim_base, HttpBackend};
use crate::config::FinderConfig;
use crate::error::FinderResult;
use crate::source::{BlobStore, ObjectAttrs};

#[derive(Debug, Clone)]
pub struct GcsClient {
    http: HttpBackend,
    base_url: String,
    bucket: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListPage {
    #[serde(default)]
    prefixes: Vec<String>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObjectResource {
    name: String,
    time_created: DateTime<Utc>,
}

impl GcsClient {
    pub fn new(config: &FinderConfig) -> FinderResult<Self> {
        Ok(Self {
            http: HttpBackend::new(config.request_timeout(), None)?,
            base_url: trim_base(&config.storage_url),
            bucket: config.bucket.clone(),
        })
    }

    fn objects_url(&self) -> String {
        format!(
            "{}/storage/v1/b/{}/o",
            self.base_url,
            urlencoding::encode(&self.bucket)
        )
    }

    fn object_url(&self, path: &str) -> String {
        format!("{}/{}", self.objects_url(), urlencoding::encode(path))
    }
}

#[async_trait]
impl BlobStore for GcsClient {
    async fn list_prefixes(&self, prefix: &str) -> FinderResult<Vec<String>> {
        let mut prefixes = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut url = format!(
                "{}?delimiter=%2F&fields=prefixes,nextPageToken&prefix={}",
                self.objects_url(),
                urlencoding::encode(prefix)
            );
            if let Some(token) = &page_token {
                url.push_str("&pageToken=");
                url.push_str(&urlencoding::encode(token));
            }

            let page: ListPage = self.http.get_json(&url).await?;
            prefixes.extend(page.prefixes);
            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        Ok(prefixes)
    }

    async fn read_object(&self, path: &str) -> FinderResult<Vec<u8>> {
        let url = format!("{}?alt=media", self.object_url(path));
        self.http.get_bytes(&url).await
    }

    async fn object_attrs(&self, path: &str) -> FinderResult<ObjectAttrs> {
        let url = format!("{}?fields=name,timeCreated", self.object_url(path));
        let object: ObjectResource = self.http.get_json(&url).await?;
        Ok(ObjectAttrs {
            name: object.name,
            created: object.time_created,
        })
    }
}
