//! UI Builder module for creating keyboards

use teloxide::types::{InlineKeyboardButton, InlineKeyboardButtonKind, InlineKeyboardMarkup};

use crate::localization::t_lang;
use crate::models::{District, Region};

use super::payload::{BackTarget, CallbackAction};

const EDIT_LABEL: &str = "✏️";
const DELETE_LABEL: &str = "❌";

fn button(label: impl Into<String>, action: CallbackAction) -> InlineKeyboardButton {
    InlineKeyboardButton::callback(label.into(), action.to_string())
}

/// One button per region, one region per row
pub fn create_region_list_keyboard(regions: &[Region]) -> InlineKeyboardMarkup {
    let rows = regions
        .iter()
        .map(|region| vec![button(region.name.clone(), CallbackAction::Region(region.id))])
        .collect::<Vec<_>>();

    InlineKeyboardMarkup::new(rows)
}

/// A row per district with edit and delete buttons, then a back row
pub fn create_district_list_keyboard(
    districts: &[District],
    language_code: Option<&str>,
) -> InlineKeyboardMarkup {
    let mut rows = Vec::with_capacity(districts.len() + 1);

    for district in districts {
        rows.push(vec![
            button(district.name.clone(), CallbackAction::District(district.id)),
            button(EDIT_LABEL, CallbackAction::ChangeDistrict(district.id)),
            button(DELETE_LABEL, CallbackAction::RemoveDistrict(district.id)),
        ]);
    }

    rows.push(vec![button(
        t_lang("back-button", language_code),
        CallbackAction::Back(BackTarget::Regions),
    )]);

    InlineKeyboardMarkup::new(rows)
}

/// The callback payload of a button, if it has one
pub fn callback_data(button: &InlineKeyboardButton) -> Option<&str> {
    match &button.kind {
        InlineKeyboardButtonKind::CallbackData(data) => Some(data.as_str()),
        _ => None,
    }
}
