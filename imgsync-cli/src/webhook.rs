//! Webhook delivery of run reports.

use std::time::Duration;

use imgsync_sync::{webhook_payload, Notifier, NotifyError, RunSummary};

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

/// POSTs [`webhook_payload`] as JSON to a fixed URL.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    url: String,
    timeout: Duration,
}

impl WebhookNotifier {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            timeout: WEBHOOK_TIMEOUT,
        }
    }
}

impl Notifier for WebhookNotifier {
    fn notify(&self, summary: &RunSummary) -> Result<(), NotifyError> {
        let payload = webhook_payload(summary);
        match ureq::post(&self.url)
            .timeout(self.timeout)
            .send_json(payload)
        {
            Ok(_) => {
                tracing::info!("run report delivered to webhook");
                Ok(())
            }
            Err(ureq::Error::Status(status, response)) => Err(NotifyError::Status {
                status,
                body: response.into_string().unwrap_or_default(),
            }),
            Err(err) => Err(NotifyError::Transport(err.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::TcpListener;
    use std::sync::mpsc;
    use std::thread;

    use imgsync_sync::{SyncDetail, SyncOutcome};

    /// Accept one request, send `response`, hand the request body back.
    fn one_shot_server(response: &'static str) -> (String, mpsc::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/hook", listener.local_addr().unwrap());
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream);
            let mut content_length = 0;
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).unwrap();
                let line = line.trim_end();
                if line.is_empty() {
                    break;
                }
                if let Some((name, value)) = line.split_once(':') {
                    if name.eq_ignore_ascii_case("content-length") {
                        content_length = value.trim().parse().unwrap();
                    }
                }
            }
            let mut body = vec![0; content_length];
            reader.read_exact(&mut body).unwrap();
            reader.get_mut().write_all(response.as_bytes()).unwrap();
            tx.send(String::from_utf8(body).unwrap()).unwrap();
        });
        (url, rx)
    }

    fn summary() -> RunSummary {
        let mut summary = RunSummary::default();
        summary.record(SyncDetail {
            image: "alpine".to_string(),
            tag: "3.20".to_string(),
            kind: imgsync_core::VersionKind::Always,
            target: "registry.example.com/ns/alpine:3.20".to_string(),
            outcome: SyncOutcome::SkippedUnchanged,
        });
        summary
    }

    #[test]
    fn posts_text_payload() {
        let (url, body) =
            one_shot_server("HTTP/1.1 200 OK\r\nContent-Length: 0\r\nConnection: close\r\n\r\n");
        WebhookNotifier::new(&url).notify(&summary()).unwrap();

        let body: serde_json::Value = serde_json::from_str(&body.recv().unwrap()).unwrap();
        assert_eq!(body["msgtype"], "text");
        assert!(body["text"]["content"]
            .as_str()
            .unwrap()
            .contains("· alpine:3.20 unchanged"));
    }

    #[test]
    fn non_success_status_is_an_error() {
        let (url, _body) = one_shot_server(
            "HTTP/1.1 500 Internal Server Error\r\nContent-Length: 4\r\nConnection: close\r\n\r\nnope",
        );
        let err = WebhookNotifier::new(&url).notify(&summary()).unwrap_err();
        match err {
            NotifyError::Status { status, body } => {
                assert_eq!(status, 500);
                assert_eq!(body, "nope");
            }
            other => panic!("expected status error, got {other:?}"),
        }
    }

    #[test]
    fn unreachable_endpoint_is_a_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/hook", listener.local_addr().unwrap());
        drop(listener);

        let err = WebhookNotifier::new(&url).notify(&summary()).unwrap_err();
        assert!(matches!(err, NotifyError::Transport(_)), "{err:?}");
    }
}
