//! HTTP client for the integration tests
//!
//! When API routes or request formats change, update only this file.

use super::constants::*;
use reqwest::Response;
use serde_json::{json, Value};
use std::time::Duration;

pub struct TestClient {
    pub client: reqwest::Client,
    pub base_url: String,
}

impl TestClient {
    pub fn new(base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .expect("Failed to build reqwest client");

        Self { client, base_url }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn health(&self) -> Response {
        self.client.get(self.url("/health")).send().await.unwrap()
    }

    pub async fn metrics(&self) -> Response {
        self.client.get(self.url("/metrics")).send().await.unwrap()
    }

    pub async fn list_jobs(&self) -> Response {
        self.client.get(self.url("/v1/jobs")).send().await.unwrap()
    }

    pub async fn create_job(&self, body: Value) -> Response {
        self.client
            .post(self.url("/v1/jobs"))
            .json(&body)
            .send()
            .await
            .unwrap()
    }

    /// Create a job and return its id.
    pub async fn create_test_job(&self, name: &str, run_frequency_secs: f64) -> String {
        let response = self
            .create_job(json!({
                "name": name,
                "min_price": 100.0,
                "max_price": 300.0,
                "condition": null,
                "keywords": TEST_KEYWORDS,
                "run_frequency": run_frequency_secs,
            }))
            .await;
        assert_eq!(response.status(), reqwest::StatusCode::CREATED);
        let body: Value = response.json().await.unwrap();
        body["id"].as_str().unwrap().to_string()
    }

    pub async fn get_job(&self, id: &str) -> Response {
        self.client
            .get(self.url(&format!("/v1/jobs/{}", id)))
            .send()
            .await
            .unwrap()
    }

    pub async fn start_job(&self, id: &str) -> Response {
        self.client
            .post(self.url(&format!("/v1/jobs/{}/start", id)))
            .send()
            .await
            .unwrap()
    }

    pub async fn stop_job(&self, id: &str) -> Response {
        self.client
            .post(self.url(&format!("/v1/jobs/{}/stop", id)))
            .send()
            .await
            .unwrap()
    }

    pub async fn remove_job(&self, id: &str) -> Response {
        self.client
            .delete(self.url(&format!("/v1/jobs/{}", id)))
            .send()
            .await
            .unwrap()
    }

    pub async fn start_all(&self) -> Response {
        self.client
            .post(self.url("/v1/jobs/start"))
            .send()
            .await
            .unwrap()
    }

    pub async fn stop_all(&self) -> Response {
        self.client
            .post(self.url("/v1/jobs/stop"))
            .send()
            .await
            .unwrap()
    }

    pub async fn remove_all(&self) -> Response {
        self.client
            .delete(self.url("/v1/jobs"))
            .send()
            .await
            .unwrap()
    }

    pub async fn start_jobs(&self, ids: &[&str]) -> Response {
        self.post_ids("/v1/jobs/start/ids", ids).await
    }

    pub async fn stop_jobs(&self, ids: &[&str]) -> Response {
        self.post_ids("/v1/jobs/stop/ids", ids).await
    }

    pub async fn remove_jobs(&self, ids: &[&str]) -> Response {
        self.post_ids("/v1/jobs/remove/ids", ids).await
    }

    async fn post_ids(&self, path: &str, ids: &[&str]) -> Response {
        self.client
            .post(self.url(path))
            .json(&json!({ "ids": ids }))
            .send()
            .await
            .unwrap()
    }

    pub async fn get_run(&self, id: &str, run_number: u64) -> Response {
        self.client
            .get(self.url(&format!("/v1/jobs/{}/runs/{}", id, run_number)))
            .send()
            .await
            .unwrap()
    }

    pub async fn get_events(&self, id: &str) -> Response {
        self.client
            .get(self.url(&format!("/v1/jobs/{}/events", id)))
            .send()
            .await
            .unwrap()
    }
}
