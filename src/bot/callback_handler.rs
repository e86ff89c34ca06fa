//! Callback Handler module for processing inline keyboard callback queries

use anyhow::Result;
use std::sync::Arc;
use teloxide::prelude::*;
use tracing::debug;

use crate::dialogue::SessionKey;

use super::delivery::{deliver, ReplyTarget};
use super::router::{AdminRouter, Inbound};

/// Handle callback queries from inline keyboards
pub async fn callback_handler(
    bot: Bot,
    q: CallbackQuery,
    router: Arc<AdminRouter>,
) -> Result<()> {
    let chat_id = q
        .message
        .as_ref()
        .map(|msg| msg.chat().id)
        .unwrap_or_else(|| ChatId::from(q.from.id));
    let message_id = q.message.as_ref().map(|msg| msg.id());
    let data = q.data.clone().unwrap_or_default();
    debug!(chat_id = %chat_id, user_id = %q.from.id, data = %data, "Received callback query");

    let replies = router
        .handle(
            SessionKey::new(chat_id, q.from.id),
            q.from.language_code.as_deref(),
            Inbound::Callback(data),
        )
        .await;

    let target = ReplyTarget::callback(chat_id, message_id, q.id);
    deliver(&bot, &target, replies).await
}
