use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;

use crate::config::SubmitConfig;
use crate::error::SinkError;
use crate::metrics::ScanResult;
use crate::session::ResultSink;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubmitError {
    #[error("form submission timed out")]
    Timeout,
    #[error("form submission network error: {0}")]
    Network(String),
    #[error("form endpoint rejected submission: status={status}, body={body}")]
    Rejected { status: u16, body: String },
    #[error("submission task dropped before completing")]
    Dropped,
}

impl From<reqwest::Error> for SubmitError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else {
            Self::Network(e.to_string())
        }
    }
}

/// Posts a [`ScanResult`] as an urlencoded form.
#[derive(Debug, Clone)]
pub struct FormSubmitter {
    url: String,
    client: reqwest::Client,
}

impl FormSubmitter {
    pub fn new(url: impl Into<String>, timeout_secs: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            url: url.into(),
            client,
        }
    }

    /// `None` when no form URL is configured.
    pub fn from_config(config: &SubmitConfig) -> Option<Self> {
        config
            .form_url
            .as_deref()
            .map(|url| Self::new(url, config.timeout_secs))
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn submit(&self, result: &ScanResult) -> Result<(), SubmitError> {
        let fields = result.form_fields();
        let response = self.client.post(&self.url).form(&fields).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SubmitError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        tracing::info!(
            session_id = %result.session_id,
            status = status.as_u16(),
            "Scan form submitted"
        );
        Ok(())
    }
}

/// Completion of a submission started by [`FormSink`].
pub type SubmissionReceipt = oneshot::Receiver<Result<(), SubmitError>>;

/// [`ResultSink`] that posts the result on the current tokio runtime.
pub struct FormSink {
    submitter: Arc<FormSubmitter>,
    receipt: Option<oneshot::Sender<Result<(), SubmitError>>>,
}

impl FormSink {
    pub fn new(submitter: FormSubmitter) -> (Self, SubmissionReceipt) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                submitter: Arc::new(submitter),
                receipt: Some(tx),
            },
            rx,
        )
    }
}

impl ResultSink for FormSink {
    fn submit(&mut self, result: &ScanResult) -> Result<(), SinkError> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| SinkError::Rejected(e.to_string()))?;
        let receipt = self.receipt.take().ok_or(SinkError::Closed)?;

        let submitter = Arc::clone(&self.submitter);
        let result = result.clone();
        runtime.spawn(async move {
            let outcome = submitter.submit(&result).await;
            if let Err(e) = &outcome {
                tracing::error!(session_id = %result.session_id, error = %e, "Scan form submission failed");
            }
            let _ = receipt.send(outcome);
        });
        Ok(())
    }
}

pub async fn wait_for_receipt(receipt: SubmissionReceipt) -> Result<(), SubmitError> {
    receipt.await.unwrap_or(Err(SubmitError::Dropped))
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use uuid::Uuid;

    use super::*;
    use crate::metrics::{MetricAggregator, MetricKind};

    async fn serve_once(status_line: &'static str) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let task = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
                if String::from_utf8_lossy(&request).contains("bp_isComplete=") {
                    break;
                }
            }
            let response = format!("{status_line}\r\ncontent-length: 2\r\nconnection: close\r\n\r\nok");
            socket.write_all(response.as_bytes()).await.unwrap();
            String::from_utf8_lossy(&request).to_string()
        });
        (format!("http://{addr}/post-scan"), task)
    }

    fn result() -> ScanResult {
        let mut agg = MetricAggregator::new();
        agg.set(MetricKind::HeartRate, 72.0, 1);
        agg.set(MetricKind::BloodPressureSystolic, 118.4, 1);
        agg.to_result(Uuid::new_v4(), false)
    }

    #[tokio::test]
    async fn posts_form_fields() {
        let (url, server) = serve_once("HTTP/1.1 200 OK").await;
        let submitter = FormSubmitter::new(url, 5);
        submitter.submit(&result()).await.unwrap();

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /post-scan"));
        assert!(request.contains("application/x-www-form-urlencoded"));
        assert!(request.contains("bpm_ent_restingHeartRate=72"));
        assert!(request.contains("mmHg_ent_systolicBP=118.4"));
        assert!(request.contains("int_raw_oxygen=null"));
    }

    #[tokio::test]
    async fn non_success_status_is_rejected() {
        let (url, server) = serve_once("HTTP/1.1 500 Internal Server Error").await;
        let err = FormSubmitter::new(url, 5)
            .submit(&result())
            .await
            .unwrap_err();
        assert!(matches!(err, SubmitError::Rejected { status: 500, .. }));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn form_sink_submits_once() {
        let (url, server) = serve_once("HTTP/1.1 200 OK").await;
        let (mut sink, receipt) = FormSink::new(FormSubmitter::new(url, 5));

        sink.submit(&result()).unwrap();
        assert_eq!(sink.submit(&result()), Err(SinkError::Closed));
        wait_for_receipt(receipt).await.unwrap();
        server.await.unwrap();
    }

    #[test]
    fn form_sink_needs_runtime() {
        let (mut sink, _receipt) = FormSink::new(FormSubmitter::new("http://127.0.0.1:9/", 1));
        assert!(matches!(
            sink.submit(&result()),
            Err(SinkError::Rejected(_))
        ));
    }

    #[test]
    fn missing_url_disables_submitter() {
        assert!(FormSubmitter::from_config(&SubmitConfig::default()).is_none());
    }
}
