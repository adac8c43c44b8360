//! DingTalk robot webhook.
//! POSTs a markdown message; when a secret is set the URL carries
//! `timestamp` and `sign` = base64(HMAC-SHA256(secret, "{timestamp}\n{secret}")).

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

use repowatch_core::config::NotifyConfig;
use repowatch_core::error::{RepoWatchError, Result};
use repowatch_core::traits::NotificationSink;
use repowatch_core::types::{Event, RepoIdentity};

use crate::format::{MarkdownMessage, render_batch};

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Deserialize)]
struct DingTalkResponse {
    #[serde(default = "unknown_errcode")]
    errcode: i64,
    #[serde(default)]
    errmsg: String,
}

fn unknown_errcode() -> i64 {
    -1
}

pub struct DingTalkSink {
    client: reqwest::Client,
    config: NotifyConfig,
}

impl DingTalkSink {
    pub fn new(config: NotifyConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| RepoWatchError::Http(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    /// Webhook URL with signature parameters appended when a secret is configured.
    fn signed_url(&self, timestamp_ms: i64) -> Result<reqwest::Url> {
        let mut url = reqwest::Url::parse(&self.config.webhook_url)
            .map_err(|e| RepoWatchError::notify(format!("Invalid webhook URL: {e}")))?;
        if !self.config.secret.is_empty() {
            let sign = sign(&self.config.secret, timestamp_ms)?;
            url.query_pairs_mut()
                .append_pair("timestamp", &timestamp_ms.to_string())
                .append_pair("sign", &sign);
        }
        Ok(url)
    }

    pub async fn send_markdown(&self, message: &MarkdownMessage) -> Result<()> {
        if self.config.webhook_url.is_empty() {
            return Err(RepoWatchError::notify("DingTalk webhook URL is not configured"));
        }
        let url = self.signed_url(chrono::Utc::now().timestamp_millis())?;

        let resp = self
            .client
            .post(url)
            .json(&serde_json::json!({
                "msgtype": "markdown",
                "markdown": {
                    "title": message.title,
                    "text": message.text,
                }
            }))
            .send()
            .await
            .map_err(|e| RepoWatchError::notify(format!("DingTalk send failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(RepoWatchError::notify(format!(
                "DingTalk API error {status}: {body}"
            )));
        }

        let body: DingTalkResponse = resp
            .json()
            .await
            .map_err(|e| RepoWatchError::notify(format!("Invalid DingTalk response: {e}")))?;
        if body.errcode != 0 {
            return Err(RepoWatchError::notify(format!(
                "DingTalk errcode {}: {}",
                body.errcode, body.errmsg
            )));
        }

        tracing::info!("✅ DingTalk notification sent: {}", message.title);
        Ok(())
    }
}

#[async_trait]
impl NotificationSink for DingTalkSink {
    fn name(&self) -> &str {
        "dingtalk"
    }

    async fn send(&self, monitor_id: &str, repo: &RepoIdentity, events: &[Event]) -> Result<()> {
        let message = render_batch(repo, events, self.config.max_display_events);
        tracing::debug!(
            "Sending {} event(s) for monitor {monitor_id} to DingTalk",
            events.len()
        );
        self.send_markdown(&message).await
    }
}

/// base64(HMAC-SHA256(secret, "{timestamp}\n{secret}")).
pub fn sign(secret: &str, timestamp_ms: i64) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| RepoWatchError::notify(format!("Invalid signing secret: {e}")))?;
    mac.update(format!("{timestamp_ms}\n{secret}").as_bytes());
    Ok(base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn sink(url: &str, secret: &str) -> DingTalkSink {
        DingTalkSink::new(NotifyConfig {
            webhook_url: url.into(),
            secret: secret.into(),
            ..Default::default()
        })
        .unwrap()
    }

    fn message() -> MarkdownMessage {
        MarkdownMessage {
            title: "GitHub Monitor - o/r".into(),
            text: "### GitHub Monitor".into(),
        }
    }

    #[test]
    fn test_sign_is_deterministic() {
        let a = sign("SEC123", 1_705_312_800_000).unwrap();
        let b = sign("SEC123", 1_705_312_800_000).unwrap();
        let c = sign("SEC123", 1_705_312_800_001).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        // 32-byte digest → 44 base64 chars
        assert_eq!(a.len(), 44);
    }

    #[test]
    fn test_signed_url_keeps_access_token() {
        let s = sink("https://oapi.dingtalk.com/robot/send?access_token=abc", "SEC123");
        let url = s.signed_url(1_705_312_800_000).unwrap();
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(pairs[0], ("access_token".into(), "abc".into()));
        assert_eq!(pairs[1], ("timestamp".into(), "1705312800000".into()));
        assert_eq!(pairs[2].1, sign("SEC123", 1_705_312_800_000).unwrap());

        let unsigned = sink("https://oapi.dingtalk.com/robot/send?access_token=abc", "");
        assert_eq!(unsigned.signed_url(0).unwrap().query_pairs().count(), 1);
    }

    #[tokio::test]
    async fn test_send_markdown_ok() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/robot/send"))
            .and(query_param("access_token", "abc"))
            .and(body_partial_json(json!({"msgtype": "markdown",
                "markdown": {"title": "GitHub Monitor - o/r"}})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"errcode": 0, "errmsg": "ok"})))
            .expect(1)
            .mount(&server)
            .await;

        let s = sink(&format!("{}/robot/send?access_token=abc", server.uri()), "SEC123");
        s.send_markdown(&message()).await.unwrap();
    }

    #[tokio::test]
    async fn test_errcode_is_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                json!({"errcode": 310000, "errmsg": "sign not match"}),
            ))
            .mount(&server)
            .await;

        let s = sink(&format!("{}/robot/send", server.uri()), "");
        let err = s.send_markdown(&message()).await.unwrap_err();
        assert!(matches!(err, RepoWatchError::Notify(_)));
        assert!(err.to_string().contains("310000"));
    }

    #[tokio::test]
    async fn test_http_error_is_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;
        let s = sink(&format!("{}/robot/send", server.uri()), "");
        assert!(s.send_markdown(&message()).await.is_err());
    }

    #[tokio::test]
    async fn test_missing_url() {
        let s = sink("", "");
        let err = s.send("m1", &RepoIdentity::new("o", "r"), &[]).await;
        assert!(matches!(err, Err(RepoWatchError::Notify(_))));
    }
}
