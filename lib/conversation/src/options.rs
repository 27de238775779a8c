//! Settings mutation.
//!
//! Every settings action maps to exactly one field mutation. Bounded fields
//! saturate at their limits instead of erroring, and an unrecognised action
//! is ignored rather than rejected.

use crate::context;
use crate::session::{Session, SessionOptions};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Temperature bounds, in tenths.
const TEMPERATURE_STEPS: i64 = 10;

/// Callback payload prefix used by the settings menu.
pub const SETTING_PREFIX: &str = "/setting_";

/// The fixed settings vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettingAction {
    /// Raise temperature by 0.1.
    IncTemp,
    /// Lower temperature by 0.1.
    DecTemp,
    /// Next larger image resolution.
    IncResolution,
    /// Next smaller image resolution.
    DecResolution,
    /// Relay voice transcripts to the completion provider.
    EnWhisper,
    /// Stop relaying voice transcripts.
    DisWhisper,
    /// Synthesize assistant replies to voice.
    EnVoice,
    /// Stop synthesizing assistant replies.
    DisVoice,
    /// Keep one more message in context.
    IncContext,
    /// Keep one fewer message in context.
    DecContext,
}

impl SettingAction {
    /// Every action, in menu order.
    pub const ALL: [SettingAction; 10] = [
        Self::IncTemp,
        Self::DecTemp,
        Self::IncResolution,
        Self::DecResolution,
        Self::EnWhisper,
        Self::DisWhisper,
        Self::EnVoice,
        Self::DisVoice,
        Self::IncContext,
        Self::DecContext,
    ];

    /// Returns the action's vocabulary name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::IncTemp => "inc_temp",
            Self::DecTemp => "dec_temp",
            Self::IncResolution => "inc_resolution",
            Self::DecResolution => "dec_resolution",
            Self::EnWhisper => "en_whisper",
            Self::DisWhisper => "dis_whisper",
            Self::EnVoice => "en_voice",
            Self::DisVoice => "dis_voice",
            Self::IncContext => "inc_context",
            Self::DecContext => "dec_context",
        }
    }

    /// Returns the callback payload that carries this action.
    #[must_use]
    pub fn callback_payload(&self) -> String {
        format!("{SETTING_PREFIX}{}", self.as_str())
    }

    /// Parses a callback payload, with or without the `/setting_` prefix.
    #[must_use]
    pub fn from_payload(payload: &str) -> Option<Self> {
        let name = payload
            .strip_prefix(SETTING_PREFIX)
            .or_else(|| payload.strip_prefix("setting_"))
            .unwrap_or(payload);
        name.parse().ok()
    }
}

impl fmt::Display for SettingAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SettingAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|action| action.as_str() == s)
            .ok_or_else(|| format!("unknown setting action: {s}"))
    }
}

/// What applying a settings payload did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingOutcome {
    /// The action was recognised and applied (possibly saturating).
    Applied(SettingAction),
    /// The payload was not part of the vocabulary; nothing changed.
    Ignored,
}

/// Applies settings actions within the configured bounds.
#[derive(Debug, Clone)]
pub struct OptionsController {
    context_ceiling: usize,
    models: Vec<String>,
}

impl OptionsController {
    /// Creates a controller.
    ///
    /// `context_ceiling` below 1 is treated as 1.
    #[must_use]
    pub fn new(context_ceiling: usize, models: Vec<String>) -> Self {
        Self {
            context_ceiling: context_ceiling.max(1),
            models,
        }
    }

    /// Applies a raw callback payload to a session.
    pub fn apply(&self, session: &mut Session, payload: &str) -> SettingOutcome {
        match SettingAction::from_payload(payload) {
            Some(action) => {
                self.apply_action(session, action);
                SettingOutcome::Applied(action)
            }
            None => {
                tracing::debug!(payload, "ignoring unknown setting action");
                SettingOutcome::Ignored
            }
        }
    }

    /// Applies one action, clamping the affected field.
    pub fn apply_action(&self, session: &mut Session, action: SettingAction) {
        let options = session.options_mut();
        match action {
            SettingAction::IncTemp => options.temperature = step_temperature(options.temperature, 1),
            SettingAction::DecTemp => options.temperature = step_temperature(options.temperature, -1),
            SettingAction::IncResolution => options.image_resolution = options.image_resolution.larger(),
            SettingAction::DecResolution => {
                options.image_resolution = options.image_resolution.smaller();
            }
            SettingAction::EnWhisper => options.relay_transcripts = true,
            SettingAction::DisWhisper => options.relay_transcripts = false,
            SettingAction::EnVoice => options.synthesize_voice = true,
            SettingAction::DisVoice => options.synthesize_voice = false,
            SettingAction::IncContext => {
                options.max_context = options
                    .max_context
                    .saturating_add(1)
                    .clamp(1, self.context_ceiling);
            }
            SettingAction::DecContext => {
                options.max_context = options
                    .max_context
                    .saturating_sub(1)
                    .clamp(1, self.context_ceiling);
                context::enforce_bound(session);
            }
        }
    }

    /// Moves the session to the next configured model, wrapping around.
    ///
    /// A model no longer in the list restarts the cycle at the first entry.
    pub fn switch_model<'a>(&self, session: &'a mut Session) -> &'a str {
        if let Some(first) = self.models.first() {
            let next = self
                .models
                .iter()
                .position(|model| *model == session.options().active_model)
                .map_or(first, |index| &self.models[(index + 1) % self.models.len()]);
            session.options_mut().active_model = next.clone();
        }
        &session.options().active_model
    }

    /// Selects `model` directly. Returns false, changing nothing, if the
    /// model is not configured.
    pub fn select_model(&self, session: &mut Session, model: &str) -> bool {
        if !self.models.iter().any(|configured| configured == model) {
            return false;
        }
        if session.options().active_model != model {
            session.options_mut().active_model = model.to_string();
        }
        true
    }

    /// Clamps every bounded field into its domain.
    ///
    /// Sessions persisted under an older configuration may sit outside the
    /// current bounds. A session already in bounds is left untouched.
    pub fn normalize(&self, session: &mut Session) {
        let mut options = session.options().clone();
        options.temperature = step_temperature(options.temperature, 0);
        options.max_context = options.max_context.clamp(1, self.context_ceiling);
        if !self.models.iter().any(|model| *model == options.active_model) {
            if let Some(first) = self.models.first() {
                options.active_model = first.clone();
            }
        }
        if options != *session.options() {
            *session.options_mut() = options;
        }
        context::enforce_bound(session);
    }

    /// Renders the options in a fixed field order.
    #[must_use]
    pub fn render(options: &SessionOptions) -> String {
        format!(
            "Model: {}\n\
             Image Resolution: {}\n\
             Temperature: {:.1}\n\
             Transcript to Chat: {}\n\
             Assistant Voice: {}\n\
             Context Length: {}",
            options.active_model,
            options.image_resolution,
            options.temperature,
            options.relay_transcripts,
            options.synthesize_voice,
            options.max_context,
        )
    }
}

/// Moves a temperature by `delta` tenths, snapping to the 0.1 grid and
/// saturating at `[0.0, 1.0]`.
fn step_temperature(current: f64, delta: i64) -> f64 {
    let tenths = if current.is_finite() {
        (current * TEMPERATURE_STEPS as f64).round() as i64
    } else {
        0
    };
    let stepped = tenths.saturating_add(delta).clamp(0, TEMPERATURE_STEPS);
    stepped as f64 / TEMPERATURE_STEPS as f64
}
