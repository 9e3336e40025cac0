//! A Supabase-style REST implementation of [`RemoteStore`]: one row per
//! owner in a `snapshots` table, upserted on write.

use chrono::{DateTime, Utc};

use crate::remote::{RemoteDocument, RemoteError, RemoteStore};

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RestConfig {
    pub base_url: String,
    pub anon_key: String,
    pub access_token: String,
}

pub struct RestRemote {
    config: RestConfig,
    client: reqwest::Client,
}

#[derive(Debug, serde::Deserialize)]
struct SnapshotRow {
    fields: serde_json::Value,
    #[serde(rename = "updatedAt")]
    updated_at: DateTime<Utc>,
}

#[derive(Debug, serde::Serialize)]
struct SnapshotUpsert<'a> {
    #[serde(rename = "ownerId")]
    owner_id: &'a str,
    fields: &'a serde_json::Value,
    #[serde(rename = "updatedAt")]
    updated_at: DateTime<Utc>,
}

impl RestRemote {
    pub fn new(config: RestConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .header("apikey", &self.config.anon_key)
            .header(
                "Authorization",
                format!("Bearer {}", self.config.access_token),
            )
    }
}

impl RemoteStore for RestRemote {
    async fn read_document(
        &mut self,
        owner_id: &str,
    ) -> Result<Option<RemoteDocument>, RemoteError> {
        let url = format!(
            "{}/rest/v1/snapshots?ownerId=eq.{owner_id}&select=fields,updatedAt",
            self.config.base_url
        );

        let response = self
            .request(reqwest::Method::GET, &url)
            .send()
            .await
            .map_err(|e| RemoteError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(RemoteError::Rejected(format!(
                "snapshot read failed with status: {}",
                response.status()
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| RemoteError::Network(e.to_string()))?;
        let mut rows: Vec<SnapshotRow> = serde_json::from_str(&body).map_err(|e| {
            RemoteError::Malformed(format!("failed to parse snapshot rows: {e}. Body: {body}"))
        })?;

        if rows.is_empty() {
            return Ok(None);
        }
        let row = rows.swap_remove(0);
        Ok(Some(RemoteDocument {
            fields: row.fields,
            updated_at: row.updated_at,
        }))
    }

    async fn write_document(
        &mut self,
        owner_id: &str,
        document: RemoteDocument,
    ) -> Result<(), RemoteError> {
        let url = format!("{}/rest/v1/snapshots", self.config.base_url);
        let row = SnapshotUpsert {
            owner_id,
            fields: &document.fields,
            updated_at: document.updated_at,
        };

        let response = self
            .request(reqwest::Method::POST, &url)
            .header("Prefer", "resolution=merge-duplicates")
            .json(&row)
            .send()
            .await
            .map_err(|e| RemoteError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            log::error!("Failed to upsert snapshot: {status} - {error_body}");
            return Err(RemoteError::Rejected(format!(
                "snapshot write failed with status: {status}"
            )));
        }

        Ok(())
    }
}
