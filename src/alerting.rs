/// External alert sink (spec.md §4.1 alert loop: "emit one alert through
/// the external alert sink"). The sink itself is an out-of-scope
/// collaborator per spec.md §1; this is the minimal Telegram-backed
/// implementation the ambient stack needs to be runnable end to end,
/// grounded in `original_source/observer/alert.go`'s call to
/// `util.SendTelegramMessage` on staleness.
use crate::error::{BridgeError, Result};
use async_trait::async_trait;

#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn send(&self, message: &str) -> Result<()>;
}

pub struct TelegramAlertSink {
    bot_token: String,
    chat_id: String,
    client: reqwest::Client,
}

impl TelegramAlertSink {
    pub fn new(bot_token: String, chat_id: String) -> Self {
        Self { bot_token, chat_id, client: reqwest::Client::new() }
    }
}

#[async_trait]
impl AlertSink for TelegramAlertSink {
    async fn send(&self, message: &str) -> Result<()> {
        if self.bot_token.is_empty() || self.chat_id.is_empty() {
            return Ok(());
        }

        let url = format!("https://api.telegram.org/bot{}/sendMessage", self.bot_token);
        self.client
            .post(&url)
            .json(&serde_json::json!({ "chat_id": self.chat_id, "text": message }))
            .send()
            .await
            .map_err(|e| BridgeError::rpc(format!("telegram send failed: {e}")))?;
        Ok(())
    }
}

/// No-op sink for chains with no alert config or for tests.
pub struct NullAlertSink;

#[async_trait]
impl AlertSink for NullAlertSink {
    async fn send(&self, _message: &str) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn null_sink_always_succeeds() {
        let sink = NullAlertSink;
        assert!(sink.send("anything").await.is_ok());
    }

    #[tokio::test]
    async fn telegram_sink_noops_with_empty_config() {
        let sink = TelegramAlertSink::new(String::new(), String::new());
        assert!(sink.send("chain stalled").await.is_ok());
    }
}
