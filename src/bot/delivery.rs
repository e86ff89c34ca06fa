//! Performs router replies against the Bot API

use anyhow::Result;
use teloxide::prelude::*;
use teloxide::types::{CallbackQueryId, MessageId};
use tracing::{debug, warn};

use super::router::Reply;

/// Where replies for one inbound event go
#[derive(Debug, Clone)]
pub struct ReplyTarget {
    pub chat_id: ChatId,
    /// Message carrying the pressed button, if any
    pub message_id: Option<MessageId>,
    /// Callback query still waiting for an answer
    pub callback_id: Option<CallbackQueryId>,
}

impl ReplyTarget {
    pub fn message(chat_id: ChatId) -> Self {
        Self {
            chat_id,
            message_id: None,
            callback_id: None,
        }
    }

    pub fn callback(
        chat_id: ChatId,
        message_id: Option<MessageId>,
        callback_id: CallbackQueryId,
    ) -> Self {
        Self {
            chat_id,
            message_id,
            callback_id: Some(callback_id),
        }
    }
}

/// Deliver replies in order.
///
/// A callback query is always answered, with the first popup as an alert when
/// there is one. Edits need the pressed message; without it they are sent as
/// new messages. Failed edits and popups are logged and skipped, so a
/// refresh queued after a popup is still attempted.
pub async fn deliver(bot: &Bot, target: &ReplyTarget, replies: Vec<Reply>) -> Result<()> {
    let mut pending_answer = target.callback_id.clone();

    for reply in replies {
        match reply {
            Reply::Popup { text } => match pending_answer.take() {
                Some(callback_id) => {
                    if let Err(e) = bot
                        .answer_callback_query(callback_id)
                        .text(text)
                        .show_alert(true)
                        .await
                    {
                        warn!(chat_id = %target.chat_id, error = %e, "Failed to answer callback");
                    }
                }
                None => {
                    bot.send_message(target.chat_id, text).await?;
                }
            },
            Reply::Send { text, keyboard } => {
                let request = bot.send_message(target.chat_id, text);
                match keyboard {
                    Some(keyboard) => request.reply_markup(keyboard).await?,
                    None => request.await?,
                };
            }
            Reply::EditText { text } => match target.message_id {
                Some(message_id) => {
                    if let Err(e) = bot
                        .edit_message_text(target.chat_id, message_id, text)
                        .await
                    {
                        warn!(chat_id = %target.chat_id, error = %e, "Failed to edit message text");
                    }
                }
                None => {
                    bot.send_message(target.chat_id, text).await?;
                }
            },
            Reply::EditKeyboard { keyboard } => match target.message_id {
                Some(message_id) => {
                    if let Err(e) = bot
                        .edit_message_reply_markup(target.chat_id, message_id)
                        .reply_markup(keyboard)
                        .await
                    {
                        warn!(chat_id = %target.chat_id, error = %e, "Failed to edit keyboard");
                    }
                }
                None => debug!(chat_id = %target.chat_id, "No message to attach keyboard to"),
            },
        }
    }

    // Stops the client-side spinner when nothing else answered
    if let Some(callback_id) = pending_answer {
        bot.answer_callback_query(callback_id).await?;
    }

    Ok(())
}
