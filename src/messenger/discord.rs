//! Discord adapter: notifications go out as direct messages

use async_trait::async_trait;
use serenity::builder::CreateMessage;
use serenity::http::Http;
use serenity::model::id::UserId;
use std::sync::Arc;
use tracing::debug;

use super::{ChatAdapter, SendOptions};
use crate::error::{BotError, Result};
use crate::store::Platform;

/// Discord rejects longer messages
const MAX_MESSAGE_CHARS: usize = 2000;

pub struct DiscordAdapter {
    http: Arc<Http>,
}

impl DiscordAdapter {
    pub fn new(token: &str) -> Self {
        Self {
            http: Arc::new(Http::new(token)),
        }
    }
}

fn fit_message(text: &str) -> String {
    if text.chars().count() <= MAX_MESSAGE_CHARS {
        return text.to_string();
    }
    let mut out: String = text.chars().take(MAX_MESSAGE_CHARS - 1).collect();
    out.push('…');
    out
}

#[async_trait]
impl ChatAdapter for DiscordAdapter {
    fn platform(&self) -> Platform {
        Platform::Discord
    }

    async fn send(&self, chat_id: &str, text: &str, _options: &SendOptions) -> Result<()> {
        let id: u64 = chat_id.parse().map_err(|_| BotError::Discord {
            message: format!("invalid user id '{}'", chat_id),
        })?;
        if id == 0 {
            return Err(BotError::Discord {
                message: "user id 0 is not a valid snowflake".to_string(),
            });
        }

        let channel = UserId::new(id).create_dm_channel(self.http.as_ref()).await?;
        channel
            .send_message(self.http.as_ref(), CreateMessage::new().content(fit_message(text)))
            .await?;
        debug!("Sent Discord DM to {}", id);
        Ok(())
    }
}
