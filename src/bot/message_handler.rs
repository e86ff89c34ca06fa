//! Message Handler module for processing incoming commands and text

use anyhow::Result;
use std::sync::Arc;
use teloxide::prelude::*;
use tracing::debug;

use crate::dialogue::SessionKey;

use super::delivery::{deliver, ReplyTarget};
use super::router::{AdminRouter, Inbound};
use super::Command;

/// Conversation key and language of the sender; `None` for anonymous posts
fn sender(msg: &Message) -> Option<(SessionKey, Option<&str>)> {
    msg.from.as_ref().map(|user| {
        (
            SessionKey::new(msg.chat.id, user.id),
            user.language_code.as_deref(),
        )
    })
}

/// Handle a recognised bot command
pub async fn command_handler(
    bot: Bot,
    msg: Message,
    cmd: Command,
    router: Arc<AdminRouter>,
) -> Result<()> {
    debug!(chat_id = %msg.chat.id, command = ?cmd, "Received command");
    let Some((key, language_code)) = sender(&msg) else {
        debug!(chat_id = %msg.chat.id, "Ignoring command without a sender");
        return Ok(());
    };

    let replies = router
        .handle(key, language_code, Inbound::Command(cmd))
        .await;
    deliver(&bot, &ReplyTarget::message(msg.chat.id), replies).await
}

/// Handle any other text message
pub async fn message_handler(bot: Bot, msg: Message, router: Arc<AdminRouter>) -> Result<()> {
    let Some(text) = msg.text() else {
        debug!(chat_id = %msg.chat.id, "Ignoring non-text message");
        return Ok(());
    };
    let Some((key, language_code)) = sender(&msg) else {
        debug!(chat_id = %msg.chat.id, "Ignoring message without a sender");
        return Ok(());
    };
    debug!(chat_id = %msg.chat.id, user_id = %key.user_id, "Received text message");

    let replies = router
        .handle(key, language_code, Inbound::Text(text.to_string()))
        .await;
    deliver(&bot, &ReplyTarget::message(msg.chat.id), replies).await
}
