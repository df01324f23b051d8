//! Minimal Grafana HTTP client for rule provisioning.

use std::time::Duration;

use anyhow::{anyhow, Result};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;

use crate::config::ProvisionConfig;
use crate::rules::AlertRule;

// ---

#[derive(Debug, Deserialize)]
struct Datasource {
    uid: String,
    name: String,
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Deserialize)]
struct Folder {
    uid: String,
    title: String,
}

#[derive(Debug, Deserialize)]
struct ContactPoint {
    name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleOutcome {
    Created,
    Recreated,
}

pub struct GrafanaClient {
    // ---
    http: Client,
    cfg: ProvisionConfig,
}

impl GrafanaClient {
    // ---
    pub fn new(cfg: ProvisionConfig) -> Result<Self> {
        let http = Client::builder().timeout(Duration::from_secs(10)).build()?;
        Ok(Self { http, cfg })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.cfg.grafana_url, path)
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.http
            .get(self.url(path))
            .basic_auth(&self.cfg.user, Some(&self.cfg.password))
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.http
            .post(self.url(path))
            .basic_auth(&self.cfg.user, Some(&self.cfg.password))
    }

    /// Poll `/api/health` until it answers 200.
    pub async fn wait_until_ready(&self, attempts: u32, delay: Duration) -> Result<()> {
        // ---
        for attempt in 1..=attempts {
            match self.http.get(self.url("/api/health")).send().await {
                Ok(resp) if resp.status() == StatusCode::OK => {
                    tracing::info!("Grafana is ready");
                    return Ok(());
                }
                Ok(resp) => tracing::debug!(attempt, status = %resp.status(), "Grafana not ready"),
                Err(e) => tracing::debug!(attempt, "Grafana not reachable: {}", e),
            }
            if attempt % 5 == 0 {
                tracing::info!("Still waiting for Grafana ({} attempts)", attempt);
            }
            tokio::time::sleep(delay).await;
        }
        Err(anyhow!(
            "Grafana not ready after {} attempts at {}",
            attempts,
            self.cfg.grafana_url
        ))
    }

    /// Uid of the first PostgreSQL datasource.
    pub async fn postgres_datasource_uid(&self) -> Result<String> {
        // ---
        let datasources: Vec<Datasource> = self
            .get("/api/datasources")
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let found = datasources
            .iter()
            .find(|ds| ds.kind == "postgres")
            .ok_or_else(|| {
                let names: Vec<_> = datasources.iter().map(|d| d.name.as_str()).collect();
                anyhow!("PostgreSQL datasource not found, available: {:?}", names)
            })?;

        tracing::info!("Found datasource: {} (UID: {})", found.name, found.uid);
        Ok(found.uid.clone())
    }

    /// Uid of the configured folder, creating it if needed. Falls back to
    /// `general` when creation is refused.
    pub async fn ensure_folder(&self) -> Result<String> {
        // ---
        let title = &self.cfg.folder;
        let folders: Vec<Folder> = self
            .get("/api/folders")
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if let Some(folder) = folders.iter().find(|f| &f.title == title) {
            tracing::info!("Folder {} exists (UID: {})", title, folder.uid);
            return Ok(folder.uid.clone());
        }

        let resp = self
            .post("/api/folders")
            .json(&serde_json::json!({ "title": title }))
            .send()
            .await?;
        if matches!(resp.status(), StatusCode::OK | StatusCode::CONFLICT) {
            let body: Value = resp.json().await?;
            let uid = body["uid"].as_str().unwrap_or("general").to_string();
            tracing::info!("Created folder {} (UID: {})", title, uid);
            Ok(uid)
        } else {
            tracing::warn!("Could not create folder: {}", resp.text().await.unwrap_or_default());
            Ok("general".to_string())
        }
    }

    pub async fn contact_point_exists(&self) -> Result<bool> {
        // ---
        let points: Vec<ContactPoint> = self
            .get("/api/v1/provisioning/contact-points")
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(points.iter().any(|cp| cp.name == self.cfg.contact_point))
    }

    /// Create a rule; on a uid conflict delete it and create it again.
    pub async fn upsert_rule(
        &self,
        rule: &AlertRule,
        datasource_uid: &str,
        folder_uid: &str,
    ) -> Result<RuleOutcome> {
        // ---
        let payload = rule.to_payload(datasource_uid, folder_uid);

        let resp = self.create_rule(&payload).await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(RuleOutcome::Created);
        }

        let body = resp.text().await.unwrap_or_default();
        if status == StatusCode::BAD_REQUEST && body.contains("conflicting") {
            self.http
                .delete(self.url(&format!("/api/v1/provisioning/alert-rules/{}", rule.uid())))
                .basic_auth(&self.cfg.user, Some(&self.cfg.password))
                .send()
                .await?
                .error_for_status()?;
            tokio::time::sleep(Duration::from_millis(500)).await;

            let retry = self.create_rule(&payload).await?;
            if retry.status().is_success() {
                return Ok(RuleOutcome::Recreated);
            }
            let status = retry.status();
            let body = retry.text().await.unwrap_or_default();
            return Err(anyhow!("Recreate of '{}' failed: {} - {}", rule.title, status, body));
        }

        let snippet: String = body.chars().take(200).collect();
        Err(anyhow!("Create of '{}' failed: {} - {}", rule.title, status, snippet))
    }

    async fn create_rule(&self, payload: &Value) -> Result<reqwest::Response> {
        Ok(self
            .post("/api/v1/provisioning/alert-rules")
            .json(payload)
            .send()
            .await?)
    }

    /// Set every rule group in the folder to evaluate every `interval`.
    pub async fn set_group_intervals(&self, interval: &str) -> Result<usize> {
        // ---
        let folder = &self.cfg.folder;
        let rules: Value = self
            .get("/api/ruler/grafana/api/v1/rules")
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let Some(groups) = rules.get(folder).and_then(Value::as_array) else {
            return Ok(0);
        };

        let mut updated = 0;
        for group in groups {
            let Some(mut group) = group.as_object().cloned() else {
                continue;
            };
            let Some(name) = group.get("name").and_then(Value::as_str).map(str::to_string) else {
                continue;
            };
            group.insert("interval".to_string(), Value::from(interval));

            let resp = self
                .post(&format!("/api/ruler/grafana/api/v1/rules/{folder}/{name}"))
                .json(&group)
                .send()
                .await?;
            if resp.status().is_success() {
                tracing::info!("Updated {} interval to {}", name, interval);
                updated += 1;
            } else {
                tracing::warn!("Failed to update {}: {}", name, resp.status());
            }
        }
        Ok(updated)
    }
}
