//! Single send path for notifications, hiding which chat platform a user is on

pub mod discord;
pub mod telegram;

pub use discord::DiscordAdapter;
pub use telegram::TelegramAdapter;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::Result;
use crate::messages;
use crate::store::{Platform, SharedStore};

/// Formatting hints for an outgoing message
#[derive(Debug, Clone)]
pub struct SendOptions {
    /// Render `**bold**` style markup where the platform supports it
    pub markdown: bool,
    pub disable_link_preview: bool,
}

impl Default for SendOptions {
    fn default() -> Self {
        Self {
            markdown: true,
            disable_link_preview: true,
        }
    }
}

/// Outbound half of a chat platform
#[async_trait]
pub trait ChatAdapter: Send + Sync {
    fn platform(&self) -> Platform;

    async fn send(&self, chat_id: &str, text: &str, options: &SendOptions) -> Result<()>;
}

/// What happened to a message handed to the messenger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    /// No platform could be resolved, or its adapter is not configured
    Skipped,
    /// The platform rejected the message or the request failed
    Failed,
}

impl Delivery {
    /// Nothing left to retry
    pub fn is_settled(self) -> bool {
        !matches!(self, Delivery::Failed)
    }
}

/// Telegram IDs fit in 52 bits; Discord snowflakes are far above that.
const TELEGRAM_ID_LIMIT: i64 = 1 << 52;

/// Best-effort platform guess from the shape of a chat ID.
///
/// Only used when the user record carries no explicit platform tag.
pub fn detect_platform(chat_id: &str) -> Option<Platform> {
    let id: i64 = match chat_id.trim().parse() {
        Ok(id) => id,
        // Snowflakes can exceed i64 only in theory, but accept them anyway
        Err(_) => {
            return chat_id
                .trim()
                .parse::<u64>()
                .ok()
                .map(|_| Platform::Discord)
        }
    };
    if id < TELEGRAM_ID_LIMIT {
        Some(Platform::Telegram)
    } else {
        Some(Platform::Discord)
    }
}

pub struct Messenger {
    store: SharedStore,
    adapters: HashMap<Platform, Arc<dyn ChatAdapter>>,
}

impl Messenger {
    pub fn new(store: SharedStore) -> Self {
        Self {
            store,
            adapters: HashMap::new(),
        }
    }

    pub fn with_adapter(mut self, adapter: Arc<dyn ChatAdapter>) -> Self {
        self.adapters.insert(adapter.platform(), adapter);
        self
    }

    pub fn configured_platforms(&self) -> Vec<Platform> {
        self.adapters.keys().copied().collect()
    }

    /// Platform and language for a chat user
    async fn recipient(&self, user_id: &str) -> (Option<Platform>, String) {
        match self.store.get_user(user_id).await {
            Some(user) => (
                user.platform.or_else(|| detect_platform(&user.id)),
                user.language,
            ),
            None => (
                detect_platform(user_id),
                messages::DEFAULT_LANGUAGE.to_string(),
            ),
        }
    }

    /// Render a template in the user's language without sending it
    pub async fn localize(&self, user_id: &str, key: &str, variables: &[(&str, String)]) -> String {
        let (_, language) = self.recipient(user_id).await;
        messages::localize(&language, key, variables)
    }

    pub async fn send_templated(
        &self,
        user_id: &str,
        key: &str,
        variables: &[(&str, String)],
    ) -> Delivery {
        let (platform, language) = self.recipient(user_id).await;
        let text = messages::localize(&language, key, variables);
        self.dispatch(user_id, platform, &text, &SendOptions::default())
            .await
    }

    pub async fn send_raw(&self, user_id: &str, text: &str, options: &SendOptions) -> Delivery {
        let (platform, _) = self.recipient(user_id).await;
        self.dispatch(user_id, platform, text, options).await
    }

    async fn dispatch(
        &self,
        user_id: &str,
        platform: Option<Platform>,
        text: &str,
        options: &SendOptions,
    ) -> Delivery {
        let Some(platform) = platform else {
            warn!(user_id, "Cannot resolve chat platform, message dropped");
            return Delivery::Skipped;
        };
        let Some(adapter) = self.adapters.get(&platform) else {
            warn!(user_id, %platform, "Chat platform not configured, message dropped");
            return Delivery::Skipped;
        };

        match adapter.send(user_id, text, options).await {
            Ok(()) => {
                debug!(user_id, %platform, "Message delivered");
                Delivery::Sent
            }
            Err(e) => {
                warn!(user_id, %platform, "Message delivery failed: {}", e);
                Delivery::Failed
            }
        }
    }
}

pub type SharedMessenger = Arc<Messenger>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Store, User};
    use crate::testing::RecordingAdapter;

    #[test]
    fn test_detect_platform_by_magnitude() {
        assert_eq!(detect_platform("123456789"), Some(Platform::Telegram));
        assert_eq!(detect_platform("-1001234567890"), Some(Platform::Telegram));
        assert_eq!(detect_platform("987654321098765432"), Some(Platform::Discord));
        assert_eq!(detect_platform("18446744073709551615"), Some(Platform::Discord));
        assert_eq!(detect_platform("not-an-id"), None);
    }

    #[tokio::test]
    async fn test_explicit_platform_wins_over_heuristic() {
        let store = Arc::new(Store::in_memory());
        store
            .upsert_user(User::new("55", "Small id on discord", Some(Platform::Discord)))
            .await
            .unwrap();

        let telegram = Arc::new(RecordingAdapter::new(Platform::Telegram));
        let discord = Arc::new(RecordingAdapter::new(Platform::Discord));
        let messenger = Messenger::new(store)
            .with_adapter(telegram.clone())
            .with_adapter(discord.clone());

        let delivery = messenger.send_raw("55", "hello", &SendOptions::default()).await;
        assert_eq!(delivery, Delivery::Sent);
        assert_eq!(discord.sent().len(), 1);
        assert!(telegram.sent().is_empty());
    }

    #[tokio::test]
    async fn test_templated_uses_user_language() {
        let store = Arc::new(Store::in_memory());
        store
            .upsert_user(User::new("77", "Hablante", Some(Platform::Telegram)))
            .await
            .unwrap();
        store.set_language("77", " ES ").await.unwrap();

        let telegram = Arc::new(RecordingAdapter::new(Platform::Telegram));
        let messenger = Messenger::new(store).with_adapter(telegram.clone());

        messenger
            .send_templated("77", "waiver_reminder", &[("leagues", "Liga".to_string())])
            .await;
        let sent = telegram.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].1.contains("waivers se procesan"));
        assert!(sent[0].1.contains("Liga"));
    }

    #[tokio::test]
    async fn test_missing_adapter_is_skipped_not_error() {
        let store = Arc::new(Store::in_memory());
        let telegram = Arc::new(RecordingAdapter::new(Platform::Telegram));
        let messenger = Messenger::new(store).with_adapter(telegram.clone());

        let delivery = messenger
            .send_raw("987654321098765432", "hi", &SendOptions::default())
            .await;
        assert_eq!(delivery, Delivery::Skipped);
        assert!(delivery.is_settled());
        assert!(telegram.sent().is_empty());
    }

    #[tokio::test]
    async fn test_adapter_failure_is_reported() {
        let store = Arc::new(Store::in_memory());
        let telegram = Arc::new(RecordingAdapter::new(Platform::Telegram));
        telegram.fail_for("42");
        let messenger = Messenger::new(store).with_adapter(telegram.clone());

        let delivery = messenger.send_raw("42", "hi", &SendOptions::default()).await;
        assert_eq!(delivery, Delivery::Failed);
        assert!(!delivery.is_settled());
    }
}
