//! HTTP completion callbacks.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;
use url::Url;

use reelmix_models::CompletionNotification;

use crate::error::{WorkerError, WorkerResult};
use crate::stages::Notifier;

/// Posts the completion notification as JSON. Delivery is attempted once.
#[derive(Debug, Clone)]
pub struct HttpNotifier {
    client: Client,
}

impl HttpNotifier {
    pub fn new(timeout: Duration) -> WorkerResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| WorkerError::unexpected(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

fn parse_target(target: &str) -> WorkerResult<Url> {
    let url = Url::parse(target)
        .map_err(|e| WorkerError::CallbackFailed(format!("invalid callback target {}: {}", target, e)))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(WorkerError::CallbackFailed(format!(
            "unsupported callback scheme: {}",
            other
        ))),
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    async fn notify(&self, target: &str, notification: &CompletionNotification) -> WorkerResult<()> {
        let url = parse_target(target)?;
        debug!(job_id = %notification.job_id, url = %url, "Sending completion callback");

        let response = self
            .client
            .post(url)
            .json(notification)
            .send()
            .await
            .map_err(|e| WorkerError::CallbackFailed(format!("callback request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(WorkerError::CallbackFailed(format!(
                "callback returned {}: {}",
                status, body
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reelmix_models::{ErrorCategory, Job, JobFailure, JobParameters};
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn failed_job() -> Job {
        Job::new(JobParameters::new("main.mp4", "s1.mp4"))
            .start()
            .fail(JobFailure::new(ErrorCategory::RenderFailed, "exit 1"))
    }

    #[tokio::test]
    async fn test_posts_notification_json() {
        let server = MockServer::start().await;
        let job = failed_job();

        Mock::given(method("POST"))
            .and(path("/hooks/reel"))
            .and(body_partial_json(serde_json::json!({
                "jobId": job.id.as_str(),
                "status": "failed",
                "error": { "category": "RenderFailed", "details": "exit 1" }
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let notifier = HttpNotifier::new(Duration::from_secs(5)).unwrap();
        let note = CompletionNotification::from_job(&job).unwrap();
        notifier
            .notify(&format!("{}/hooks/reel", server.uri()), &note)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_non_success_status_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("down"))
            .mount(&server)
            .await;

        let notifier = HttpNotifier::new(Duration::from_secs(5)).unwrap();
        let note = CompletionNotification::from_job(&failed_job()).unwrap();
        let err = notifier.notify(&server.uri(), &note).await.unwrap_err();
        assert!(matches!(err, WorkerError::CallbackFailed(_)));
    }

    #[tokio::test]
    async fn test_slow_receiver_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .mount(&server)
            .await;

        let notifier = HttpNotifier::new(Duration::from_millis(100)).unwrap();
        let note = CompletionNotification::from_job(&failed_job()).unwrap();
        assert!(notifier.notify(&server.uri(), &note).await.is_err());
    }

    #[test]
    fn test_rejects_non_http_targets() {
        assert!(parse_target("ftp://example.com/x").is_err());
        assert!(parse_target("not a url").is_err());
        assert!(parse_target("https://example.com/hook").is_ok());
    }
}
