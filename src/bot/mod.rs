//! Bot module for handling Telegram interactions
//!
//! This module is split into several submodules:
//! - `router`: Maps commands, button presses and text to view updates
//! - `message_handler`: Handles incoming commands and text messages
//! - `callback_handler`: Handles inline keyboard callback queries
//! - `delivery`: Performs view updates against the Bot API
//! - `ui_builder`: Creates keyboards
//! - `payload`: Callback payload format

pub mod callback_handler;
pub mod delivery;
pub mod message_handler;
pub mod payload;
pub mod router;
pub mod ui_builder;

use teloxide::dispatching::{UpdateFilterExt, UpdateHandler};
use teloxide::prelude::*;
use teloxide::utils::command::BotCommands;

// Re-export main handler functions for use in main.rs
pub use callback_handler::callback_handler;
pub use message_handler::{command_handler, message_handler};
pub use router::{AdminRouter, Inbound, Reply};

/// Admin commands
#[derive(BotCommands, Clone, Debug, PartialEq, Eq)]
#[command(rename_rule = "lowercase", description = "Buyruqlar:")]
pub enum Command {
    #[command(description = "viloyatlar ro'yxatini ko'rsatish")]
    Start,
    #[command(description = "regions.csv va districts.csv fayllarini yuklash")]
    Migrate,
    #[command(description = "tuman nomini o'zgartirishni bekor qilish")]
    Cancel,
    #[command(description = "buyruqlar ro'yxati")]
    Help,
}

/// Handler tree for the dispatcher; expects an `Arc<AdminRouter>` dependency
pub fn schema() -> UpdateHandler<anyhow::Error> {
    dptree::entry()
        .branch(
            Update::filter_message()
                .branch(
                    dptree::entry()
                        .filter_command::<Command>()
                        .endpoint(command_handler),
                )
                .branch(dptree::endpoint(message_handler)),
        )
        .branch(Update::filter_callback_query().endpoint(callback_handler))
}
