//! Settings menu layout.

use relaybot_conversation::SettingAction;
use serde::{Deserialize, Serialize};

/// One button of the settings menu.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuButton {
    pub label: String,
    /// Callback payload sent back when pressed.
    pub payload: String,
}

/// Inline settings menu: rows of buttons.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsMenu {
    pub rows: Vec<Vec<MenuButton>>,
}

impl SettingsMenu {
    /// The standard menu: one row per option, increase/enable on the left.
    #[must_use]
    pub fn standard() -> Self {
        let rows = SettingAction::ALL
            .chunks(2)
            .map(|pair| {
                pair.iter()
                    .map(|action| MenuButton {
                        label: label(*action).to_string(),
                        payload: action.callback_payload(),
                    })
                    .collect()
            })
            .collect();
        Self { rows }
    }

    /// Iterates over every button, row by row.
    pub fn buttons(&self) -> impl Iterator<Item = &MenuButton> {
        self.rows.iter().flatten()
    }
}

fn label(action: SettingAction) -> &'static str {
    match action {
        SettingAction::IncTemp => "Increase Temperature",
        SettingAction::DecTemp => "Decrease Temperature",
        SettingAction::IncResolution => "Increase Image Resolution",
        SettingAction::DecResolution => "Decrease Image Resolution",
        SettingAction::EnWhisper => "Enable Transcript to Chat",
        SettingAction::DisWhisper => "Disable Transcript to Chat",
        SettingAction::EnVoice => "Enable Assistant Voice",
        SettingAction::DisVoice => "Disable Assistant Voice",
        SettingAction::IncContext => "Increase Context",
        SettingAction::DecContext => "Decrease Context",
    }
}
