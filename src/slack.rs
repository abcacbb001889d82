//! Chat notifications through Slack's `chat.postMessage`.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use wp_mirror_core::contract::{Message, Notifier};
use wp_mirror_core::error::SyncError;

use crate::http::{check, decode_json, transport, USER_AGENT};

pub const POST_MESSAGE_URL: &str = "https://slack.com/api/chat.postMessage";

#[derive(Debug, Deserialize)]
struct PostResponse {
    ok: bool,
    #[serde(default)]
    ts: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

pub struct SlackNotifier {
    http: Client,
    token: String,
}

impl SlackNotifier {
    pub fn new(token: String) -> anyhow::Result<Self> {
        let http = Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self { http, token })
    }
}

pub fn payload(message: &Message) -> Value {
    let mut body = json!({"channel": message.channel, "text": message.text});
    if let Some(username) = &message.username {
        body["username"] = json!(username);
    }
    if let Some(thread) = &message.thread {
        body["thread_ts"] = json!(thread);
    }
    body
}

#[async_trait]
impl Notifier for SlackNotifier {
    async fn post(&self, message: Message) -> Result<String, SyncError> {
        let url = POST_MESSAGE_URL;
        debug!(channel = %message.channel, threaded = message.thread.is_some(), "Posting message");
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.token)
            .json(&payload(&message))
            .send()
            .await
            .map_err(|e| transport(url, e))?;
        let response = check(url, response).await?;
        let reply: PostResponse = decode_json(url, response).await?;
        match (reply.ok, reply.ts) {
            (true, Some(ts)) => Ok(ts),
            (true, None) => Err(SyncError::Notify("response carried no message timestamp".into())),
            (false, _) => Err(SyncError::Notify(reply.error.unwrap_or_else(|| "unknown error".into()))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_only_sets_optional_fields_when_present() {
        let plain = payload(&Message {
            channel: "C1".into(),
            text: "hi".into(),
            username: None,
            thread: None,
        });
        assert_eq!(plain, json!({"channel": "C1", "text": "hi"}));

        let reply = payload(&Message {
            channel: "C1".into(),
            text: "detail".into(),
            username: Some("site".into()),
            thread: Some("171.01".into()),
        });
        assert_eq!(reply["thread_ts"], json!("171.01"));
        assert_eq!(reply["username"], json!("site"));
    }
}
