//! HTTP implementation of [`ProgressTransport`] against the reporter API.

use async_trait::async_trait;
use reqwest::StatusCode;
use uuid::Uuid;

use crate::models::task::{ProgressView, RecoverResponse, RecoverStatus};
use crate::poller::{ProgressTransport, ReadOutcome, RecoverOutcome, TransportError};

pub struct HttpProgressTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpProgressTransport {
    pub fn new(base_url: impl Into<String>) -> Self {
        HttpProgressTransport {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    fn url(&self, task_id: Uuid, suffix: &str) -> String {
        let base = self.base_url.trim_end_matches('/');
        format!("{base}/api/v1/progress/{task_id}{suffix}")
    }

    async fn fetch_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
    ) -> Result<Option<T>, TransportError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| TransportError(e.to_string()))?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(TransportError(format!(
                "unexpected status {} from {url}",
                response.status()
            )));
        }
        let body = response
            .json::<T>()
            .await
            .map_err(|e| TransportError(format!("malformed response body: {e}")))?;
        Ok(Some(body))
    }
}

#[async_trait]
impl ProgressTransport for HttpProgressTransport {
    async fn read_progress(&self, task_id: Uuid) -> Result<ReadOutcome, TransportError> {
        match self
            .fetch_json::<ProgressView>(&self.url(task_id, ""))
            .await?
        {
            Some(view) => Ok(ReadOutcome::Snapshot(view)),
            // 404 on the plain read is the recovery trigger, not a failure
            None => Ok(ReadOutcome::NotFound),
        }
    }

    async fn recover_progress(&self, task_id: Uuid) -> Result<RecoverOutcome, TransportError> {
        let response = self
            .fetch_json::<RecoverResponse>(&self.url(task_id, "/recover"))
            .await?
            .ok_or_else(|| TransportError("recovery endpoint returned 404".to_string()))?;

        match (response.status, response.progress) {
            (RecoverStatus::Found, Some(view)) => Ok(RecoverOutcome::Found(view)),
            (RecoverStatus::Recovered, Some(view)) => Ok(RecoverOutcome::Recovered(view)),
            (RecoverStatus::NotFound, _) => Ok(RecoverOutcome::NotFound),
            (status, None) => Err(TransportError(format!(
                "recovery status {status:?} arrived without a snapshot"
            ))),
        }
    }
}
