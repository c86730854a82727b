//! Telegram Bot API adapter (sendMessage only)

use async_trait::async_trait;
use serde::Deserialize;

use super::{ChatAdapter, SendOptions};
use crate::error::{BotError, Result};
use crate::store::Platform;

/// Telegram rejects longer messages
const MAX_MESSAGE_CHARS: usize = 4096;

#[derive(Debug, Deserialize)]
struct TelegramApiResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

pub struct TelegramAdapter {
    bot_token: String,
    api_base: String,
    client: reqwest::Client,
}

impl TelegramAdapter {
    pub fn new(bot_token: &str) -> Self {
        Self {
            bot_token: bot_token.to_string(),
            api_base: "https://api.telegram.org".to_string(),
            client: reqwest::Client::new(),
        }
    }

    fn api_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.bot_token, method)
    }
}

/// Render message markup as Telegram HTML.
///
/// `**` toggles bold and a backslash makes the next character literal; all
/// text is HTML-escaped, so user data can never break entity parsing.
fn to_telegram_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 16);
    let mut bold = false;
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => push_html_escaped(&mut out, chars.next().unwrap_or('\\')),
            '*' if chars.peek() == Some(&'*') => {
                chars.next();
                out.push_str(if bold { "</b>" } else { "<b>" });
                bold = !bold;
            }
            c => push_html_escaped(&mut out, c),
        }
    }
    if bold {
        out.push_str("</b>");
    }
    out
}

fn push_html_escaped(out: &mut String, c: char) {
    match c {
        '&' => out.push_str("&amp;"),
        '<' => out.push_str("&lt;"),
        '>' => out.push_str("&gt;"),
        c => out.push(c),
    }
}

fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}

#[async_trait]
impl ChatAdapter for TelegramAdapter {
    fn platform(&self) -> Platform {
        Platform::Telegram
    }

    async fn send(&self, chat_id: &str, text: &str, options: &SendOptions) -> Result<()> {
        let chat_id: i64 = chat_id.parse().map_err(|_| BotError::Telegram {
            message: format!("invalid chat id '{}'", chat_id),
        })?;

        let mut body = serde_json::json!({
            "chat_id": chat_id,
            "disable_web_page_preview": options.disable_link_preview,
        });
        if options.markdown {
            body["text"] = to_telegram_html(&truncate_chars(text, MAX_MESSAGE_CHARS)).into();
            body["parse_mode"] = "HTML".into();
        } else {
            body["text"] = truncate_chars(text, MAX_MESSAGE_CHARS).into();
        }

        let response = self
            .client
            .post(self.api_url("sendMessage"))
            .json(&body)
            .send()
            .await
            .map_err(|e| BotError::Telegram {
                message: format!("sendMessage failed: {}", e),
            })?;

        let result: TelegramApiResponse = response.json().await.map_err(|e| BotError::Telegram {
            message: format!("invalid sendMessage response: {}", e),
        })?;

        if !result.ok {
            return Err(BotError::Telegram {
                message: result.description.unwrap_or_default(),
            });
        }
        Ok(())
    }
}
