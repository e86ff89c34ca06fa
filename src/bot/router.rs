//! Routes one inbound event to its handler and returns the view updates.
//!
//! Nothing here talks to Telegram: handlers produce [`Reply`] values and the
//! message/callback adapters deliver them.

use teloxide::types::InlineKeyboardMarkup;
use teloxide::utils::command::BotCommands;
use tracing::{debug, error, info, warn};

use crate::dialogue::{
    validate_district_name, AdminDialogueState, NameError, SessionKey, SessionStore,
};
use crate::errors::StoreError;
use crate::importer::Importer;
use crate::localization::{t_args_lang, t_lang};
use crate::models::{District, Hierarchy};

use super::payload::{BackTarget, CallbackAction};
use super::ui_builder::{create_district_list_keyboard, create_region_list_keyboard};
use super::Command;

/// Longest text `answerCallbackQuery` accepts, in characters
pub const MAX_POPUP_LEN: usize = 200;

/// An event delivered by the transport
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Command(Command),
    Callback(String),
    Text(String),
}

/// A view update for the transport to perform
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// New message, optionally with buttons
    Send {
        text: String,
        keyboard: Option<InlineKeyboardMarkup>,
    },
    /// Replace the text of the message whose button was pressed
    EditText { text: String },
    /// Replace the buttons of the message whose button was pressed
    EditKeyboard { keyboard: InlineKeyboardMarkup },
    /// Transient alert answering a button press
    Popup { text: String },
}

impl Reply {
    pub fn send(text: impl Into<String>) -> Self {
        Reply::Send {
            text: text.into(),
            keyboard: None,
        }
    }

    /// Popup text is cut to what Telegram accepts for a callback answer
    pub fn popup(text: impl Into<String>) -> Self {
        let text: String = text.into();
        let text = match text.char_indices().nth(MAX_POPUP_LEN) {
            Some((end, _)) => text[..end].to_string(),
            None => text,
        };
        Reply::Popup { text }
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            Reply::Send { text, .. } | Reply::EditText { text } | Reply::Popup { text } => {
                Some(text)
            }
            Reply::EditKeyboard { .. } => None,
        }
    }

    pub fn keyboard(&self) -> Option<&InlineKeyboardMarkup> {
        match self {
            Reply::Send { keyboard, .. } => keyboard.as_ref(),
            Reply::EditKeyboard { keyboard } => Some(keyboard),
            _ => None,
        }
    }
}

/// Command and callback dispatch over the region hierarchy
pub struct AdminRouter {
    hierarchy: Hierarchy,
    importer: Importer,
    sessions: SessionStore,
}

impl AdminRouter {
    pub fn new(hierarchy: Hierarchy, importer: Importer, sessions: SessionStore) -> Self {
        Self {
            hierarchy,
            importer,
            sessions,
        }
    }

    pub fn hierarchy(&self) -> &Hierarchy {
        &self.hierarchy
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Handle one event from one user in one chat
    pub async fn handle(
        &self,
        key: SessionKey,
        language_code: Option<&str>,
        event: Inbound,
    ) -> Vec<Reply> {
        match event {
            Inbound::Command(command) => self.handle_command(key, language_code, command).await,
            Inbound::Callback(payload) => {
                self.handle_callback(key, language_code, &payload).await
            }
            Inbound::Text(text) => self.handle_text(key, language_code, &text).await,
        }
    }

    async fn handle_command(
        &self,
        key: SessionKey,
        language_code: Option<&str>,
        command: Command,
    ) -> Vec<Reply> {
        debug!(
            chat_id = %key.chat_id,
            user_id = %key.user_id,
            command = ?command,
            "Handling command"
        );

        match command {
            Command::Cancel => self.cancel_rename(key, language_code).await,
            Command::Start => {
                self.sessions.exit(key).await;
                self.start(language_code).await
            }
            Command::Migrate => {
                self.sessions.exit(key).await;
                self.migrate(language_code).await
            }
            Command::Help => {
                self.sessions.exit(key).await;
                vec![Reply::send(format!(
                    "{}\n{}",
                    t_lang("help-title", language_code),
                    Command::descriptions()
                ))]
            }
        }
    }

    async fn start(&self, language_code: Option<&str>) -> Vec<Reply> {
        let mut replies = vec![Reply::send(t_lang("greeting", language_code))];

        match self.region_list(language_code).await {
            Ok((text, keyboard)) => replies.push(Reply::Send {
                text,
                keyboard: Some(keyboard),
            }),
            Err(e) => {
                error!(error = %e, "Failed to load regions");
                replies.push(Reply::send(t_lang("operation-failed", language_code)));
            }
        }

        replies
    }

    async fn migrate(&self, language_code: Option<&str>) -> Vec<Reply> {
        match self.importer.run().await {
            Ok(report) => {
                info!(
                    regions = report.regions,
                    districts = report.districts,
                    "Migration finished"
                );
                vec![Reply::send(t_args_lang(
                    "migrate-done",
                    &[
                        ("regions", &report.regions.to_string()),
                        ("districts", &report.districts.to_string()),
                    ],
                    language_code,
                ))]
            }
            Err(e) => {
                error!(error = %e, "Migration failed");
                vec![Reply::send(t_args_lang(
                    "migrate-failed",
                    &[("reason", &e.to_string())],
                    language_code,
                ))]
            }
        }
    }

    async fn cancel_rename(&self, key: SessionKey, language_code: Option<&str>) -> Vec<Reply> {
        match self.sessions.get(key).await {
            AdminDialogueState::AwaitingDistrictName { .. } => {
                self.sessions.exit(key).await;
                vec![Reply::send(t_lang("rename-cancelled", language_code))]
            }
            AdminDialogueState::Idle => vec![Reply::send(t_lang("nothing-to-cancel", language_code))],
        }
    }

    async fn handle_callback(
        &self,
        key: SessionKey,
        language_code: Option<&str>,
        payload: &str,
    ) -> Vec<Reply> {
        debug!(chat_id = %key.chat_id, user_id = %key.user_id, payload, "Handling callback");

        let action = payload.parse::<CallbackAction>();

        // Any button other than another rename abandons a pending rename
        if !matches!(action, Ok(CallbackAction::ChangeDistrict(_))) {
            self.sessions.exit(key).await;
        }

        let action = match action {
            Ok(action) => action,
            Err(e) => {
                warn!(
                    chat_id = %key.chat_id,
                    user_id = %key.user_id,
                    error = %e,
                    "Unsupported callback payload"
                );
                return vec![Reply::popup(t_lang("unsupported-action", language_code))];
            }
        };

        let result = match action {
            CallbackAction::Region(region_id) => self.show_region(region_id, language_code).await,
            CallbackAction::District(district_id) => {
                self.show_district(district_id, language_code).await
            }
            CallbackAction::ChangeDistrict(district_id) => {
                self.begin_rename(key, district_id, language_code).await
            }
            CallbackAction::RemoveDistrict(district_id) => {
                self.remove_district(district_id, language_code).await
            }
            CallbackAction::Back(BackTarget::Regions) => self.back_to_regions(language_code).await,
        };

        result.unwrap_or_else(|e| {
            error!(
                chat_id = %key.chat_id,
                user_id = %key.user_id,
                payload,
                error = %e,
                "Callback failed"
            );
            vec![Reply::popup(t_lang("operation-failed", language_code))]
        })
    }

    async fn region_list(
        &self,
        language_code: Option<&str>,
    ) -> Result<(String, InlineKeyboardMarkup), StoreError> {
        let regions = self.hierarchy.regions.get_all().await?;
        let title = if regions.is_empty() {
            t_lang("regions-empty", language_code)
        } else {
            t_lang("regions-title", language_code)
        };
        Ok((title, create_region_list_keyboard(&regions)))
    }

    async fn show_region(
        &self,
        region_id: i64,
        language_code: Option<&str>,
    ) -> Result<Vec<Reply>, StoreError> {
        let Some(region) = self.hierarchy.regions.get(region_id).await? else {
            return Ok(vec![Reply::popup(t_lang("region-not-found", language_code))]);
        };
        let districts = self.hierarchy.districts_of(region.id).await?;

        Ok(vec![
            Reply::EditText {
                text: t_args_lang("districts-title", &[("region", &region.name)], language_code),
            },
            Reply::EditKeyboard {
                keyboard: create_district_list_keyboard(&districts, language_code),
            },
        ])
    }

    async fn show_district(
        &self,
        district_id: i64,
        language_code: Option<&str>,
    ) -> Result<Vec<Reply>, StoreError> {
        let reply = match self.hierarchy.districts.get(district_id).await? {
            Some(district) => Reply::popup(district.to_string()),
            None => Reply::popup(t_lang("district-not-found", language_code)),
        };
        Ok(vec![reply])
    }

    async fn begin_rename(
        &self,
        key: SessionKey,
        district_id: i64,
        language_code: Option<&str>,
    ) -> Result<Vec<Reply>, StoreError> {
        let Some(district) = self.hierarchy.districts.get(district_id).await? else {
            self.sessions.exit(key).await;
            return Ok(vec![Reply::popup(t_lang("district-not-found", language_code))]);
        };

        self.sessions
            .update(
                key,
                AdminDialogueState::AwaitingDistrictName { district_id },
            )
            .await;
        debug!(
            chat_id = %key.chat_id,
            user_id = %key.user_id,
            district_id,
            "Awaiting new district name"
        );

        Ok(vec![Reply::send(t_args_lang(
            "rename-prompt",
            &[("district", &district.name)],
            language_code,
        ))])
    }

    async fn remove_district(
        &self,
        district_id: i64,
        language_code: Option<&str>,
    ) -> Result<Vec<Reply>, StoreError> {
        let Some(district) = self.hierarchy.districts.delete(district_id).await? else {
            return Ok(vec![Reply::popup(t_lang("district-not-found", language_code))]);
        };
        info!(district_id, name = %district.name, "District deleted");

        let mut replies = vec![Reply::popup(t_args_lang(
            "district-removed",
            &[("name", &district.name)],
            language_code,
        ))];

        // The delete is committed; a failed refresh must not read as a failed delete
        match self.hierarchy.districts_of(district.region_id).await {
            Ok(districts) => replies.push(Reply::EditKeyboard {
                keyboard: create_district_list_keyboard(&districts, language_code),
            }),
            Err(e) => error!(region_id = district.region_id, error = %e, "Failed to refresh districts"),
        }

        Ok(replies)
    }

    async fn back_to_regions(&self, language_code: Option<&str>) -> Result<Vec<Reply>, StoreError> {
        let (text, keyboard) = self.region_list(language_code).await?;
        Ok(vec![Reply::EditText { text }, Reply::EditKeyboard { keyboard }])
    }

    async fn handle_text(
        &self,
        key: SessionKey,
        language_code: Option<&str>,
        text: &str,
    ) -> Vec<Reply> {
        if text.starts_with('/') {
            return vec![Reply::send(t_lang("unknown-command", language_code))];
        }

        match self.sessions.get(key).await {
            AdminDialogueState::AwaitingDistrictName { district_id } => {
                self.finish_rename(key, district_id, text, language_code)
                    .await
            }
            AdminDialogueState::Idle => vec![Reply::send(t_lang("idle-hint", language_code))],
        }
    }

    async fn finish_rename(
        &self,
        key: SessionKey,
        district_id: i64,
        input: &str,
        language_code: Option<&str>,
    ) -> Vec<Reply> {
        // Invalid input keeps the rename pending so the user can try again
        let name = match validate_district_name(input) {
            Ok(name) => name,
            Err(NameError::Empty) => return vec![Reply::send(t_lang("rename-empty", language_code))],
            Err(NameError::TooLong) => {
                return vec![Reply::send(t_lang("rename-too-long", language_code))]
            }
        };

        self.sessions.exit(key).await;

        match self
            .hierarchy
            .districts
            .update(district_id, District::rename(name))
            .await
        {
            Ok(Some(district)) => {
                info!(
                    chat_id = %key.chat_id,
                    user_id = %key.user_id,
                    district_id,
                    name = %district.name,
                    "District renamed"
                );
                vec![Reply::send(t_args_lang(
                    "rename-done",
                    &[("name", &district.name)],
                    language_code,
                ))]
            }
            Ok(None) => vec![Reply::send(t_lang("district-not-found", language_code))],
            Err(e) => {
                error!(
                    chat_id = %key.chat_id,
                    user_id = %key.user_id,
                    district_id,
                    error = %e,
                    "Failed to rename district"
                );
                vec![Reply::send(t_lang("operation-failed", language_code))]
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_popup_text_is_cut_to_callback_answer_limit() {
        let name = "ў".repeat(255);
        let popup = Reply::popup(format!("{name} o'chirildi"));

        let text = popup.text().unwrap_or_default();
        assert_eq!(text.chars().count(), MAX_POPUP_LEN);
        assert!(text.starts_with("ўў"));
    }

    #[test]
    fn test_short_popup_text_is_kept() {
        assert_eq!(
            Reply::popup("7 - Downtown"),
            Reply::Popup {
                text: "7 - Downtown".to_string()
            }
        );
    }
}
