//! The event router.
//!
//! Handling one event:
//! 1. Check the sender against the allow-list (denials never touch the store)
//! 2. Take the conversation's lock and load or create its session
//! 3. Apply the transition for the event kind, calling providers as needed
//! 4. Save the session, then deliver the replies
//!
//! Provider failures become chat replies naming the failed capability. Only
//! storage, staging and transport failures abort an event.

use crate::config::RouterConfig;
use crate::error::DispatchError;
use crate::event::{Attachment, Command, EventKind, InboundEvent, Origin};
use crate::locks::SessionLocks;
use crate::menu::SettingsMenu;
use crate::scratch::AudioScratch;
use crate::transport::{Transport, TransportError};
use relaybot_access::AllowList;
use relaybot_ai::{Capability, CompletionRequest, LlmMessage, LlmRole, ProviderError, Providers};
use relaybot_conversation::{
    Message, MessageRole, OptionsController, Session, SessionError, SessionStore, SettingOutcome,
    UsageKind, UsageLedger, context,
};
use relaybot_core::ConversationId;
use rootcause::prelude::Report;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Reply to senders outside the allow-list.
pub const ACCESS_DENIED: &str = "Access Denied";
/// Reply to `/start`.
pub const GREETING: &str = "Hello, how can I assist you today?";
/// Reply to `/clear`.
pub const CONTEXT_CLEARED: &str = "Your message context history was cleared.";
/// Reply to attachments that cannot be transcribed.
pub const UNSUPPORTED_ATTACHMENT: &str = "Can't handle such file. Reason: unknown.";
/// Stands in for an empty transcript.
pub const SILENCE: &str = "[Silence]";
/// Reply to `/help` and unknown commands.
pub const HELP: &str = "Commands:\n\n\
    /clear - Clear the context.\n\
    /imagine <prompt> - Generate an image.\n\
    /settings - Open the settings menu.\n\
    /config - View current configuration.\n\
    /switch - Switch between language models.\n\
    /gpt3, /gpt4 - Use a specific language model.\n\
    /usage - See usage statistics.\n\
    /help - Show this message.";

/// A reply produced while handling an event.
///
/// Replies are collected during the transition and delivered only after the
/// session is saved, so a delivery failure never loses recorded usage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Text(String),
    Voice(Vec<u8>),
    SettingsMenu { text: String, menu: SettingsMenu },
}

fn text(reply: impl Into<String>) -> Vec<Outbound> {
    vec![Outbound::Text(reply.into())]
}

/// Routes inbound events to session transitions.
pub struct Router {
    config: RouterConfig,
    store: Arc<dyn SessionStore>,
    providers: Providers,
    access: AllowList,
    transport: Arc<dyn Transport>,
    ledger: UsageLedger,
    options: OptionsController,
    locks: SessionLocks,
}

impl Router {
    /// Creates a router over explicitly constructed collaborators.
    #[must_use]
    pub fn new(
        config: RouterConfig,
        store: Arc<dyn SessionStore>,
        providers: Providers,
        access: AllowList,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let ledger = UsageLedger::new(config.prices);
        let options = OptionsController::new(config.context_ceiling, config.models.clone());
        Self {
            config,
            store,
            providers,
            access,
            transport,
            ledger,
            options,
            locks: SessionLocks::new(),
        }
    }

    /// Handles one inbound event to completion.
    ///
    /// # Errors
    ///
    /// Returns an error if the session cannot be loaded or saved, an
    /// attachment cannot be fetched or staged, or a reply cannot be
    /// delivered. A failed save leaves the previously committed session
    /// untouched and sends no replies.
    #[instrument(
        skip(self, event),
        fields(
            event_id = %event.event_id,
            conversation_id = %event.origin.conversation_id,
            kind = event.kind.label(),
        )
    )]
    pub async fn handle(&self, event: InboundEvent) -> Result<(), Report<DispatchError>> {
        let InboundEvent { origin, kind, .. } = event;
        let id = origin.conversation_id.clone();

        if self.access.require(&id).is_err() {
            if let EventKind::SettingsCallback { callback_id, .. } = &kind {
                self.acknowledge(callback_id).await;
            }
            return self.deliver(&id, text(ACCESS_DENIED)).await;
        }

        if matches!(kind, EventKind::Text { .. }) && !origin.private {
            debug!("ignoring text outside a private conversation");
            return Ok(());
        }

        let _guard = self.locks.acquire(&id).await;

        let mut session = self
            .store
            .get_or_create(&id, &self.config.default_options())
            .await
            .map_err(|report| storage_failure(report, &id))?;
        self.options.normalize(&mut session);

        let outbound = match kind {
            EventKind::Text { text } => self.on_text(&mut session, &origin, &text).await,
            EventKind::Command(command) => self.on_command(&mut session, &origin, command).await?,
            EventKind::Attachment(attachment) => {
                self.on_attachment(&mut session, &origin, attachment).await?
            }
            EventKind::SettingsCallback {
                callback_id,
                payload,
            } => self.on_settings(&mut session, &callback_id, &payload).await,
        };

        self.store
            .save(&session)
            .await
            .map_err(|report| storage_failure(report, &id))?;
        debug!(replies = outbound.len(), "session saved");

        self.deliver(&id, outbound).await
    }

    async fn on_text(&self, session: &mut Session, origin: &Origin, message: &str) -> Vec<Outbound> {
        match self.converse(session, &origin.display_name, message).await {
            Ok(reply) => {
                let mut outbound = text(reply.as_str());
                outbound.extend(self.voice_for(session, &reply).await);
                outbound
            }
            Err(err) => {
                warn!(error = %err, "completion failed");
                text(failure_reply(&err))
            }
        }
    }

    async fn on_command(
        &self,
        session: &mut Session,
        origin: &Origin,
        command: Command,
    ) -> Result<Vec<Outbound>, Report<DispatchError>> {
        debug!(command = command.name(), "command");
        let outbound = match command {
            Command::Start => text(GREETING),
            Command::Clear => {
                context::clear(session);
                info!("context cleared");
                text(CONTEXT_CLEARED)
            }
            Command::Switch => {
                let model = self.options.switch_model(session).to_string();
                info!(%model, "switched model");
                text(format!("Switched model to {model}"))
            }
            Command::UseModel { model } => {
                if self.options.select_model(session, &model) {
                    info!(%model, "selected model");
                    text(format!("Switched model to {model}"))
                } else {
                    text(format!("Model {model} is not available."))
                }
            }
            Command::Settings => vec![Outbound::SettingsMenu {
                text: "Settings:".to_string(),
                menu: SettingsMenu::standard(),
            }],
            Command::Config => text(OptionsController::render(session.options())),
            Command::Imagine { prompt } => self.imagine(session, &prompt).await,
            Command::Usage => {
                let totals = self
                    .store
                    .usage_totals()
                    .await
                    .map_err(|report| storage_failure(report, session.id()))?;
                text(self.ledger.statement(session, totals).render(&origin.display_name))
            }
            Command::Help | Command::Unknown { .. } => text(HELP),
        };
        Ok(outbound)
    }

    async fn imagine(&self, session: &mut Session, prompt: &str) -> Vec<Outbound> {
        if prompt.is_empty() {
            return text("Usage: /imagine <prompt>");
        }
        self.signal_typing(session.id()).await;

        let size = session.options().image_resolution.as_str();
        match self.providers.images.generate(prompt, size).await {
            Ok(url) => {
                self.ledger.record_usage(session, UsageKind::Image, 1);
                text(url)
            }
            Err(err) => {
                warn!(error = %err, "image generation failed");
                text(failure_reply(&err))
            }
        }
    }

    async fn on_attachment(
        &self,
        session: &mut Session,
        origin: &Origin,
        attachment: Attachment,
    ) -> Result<Vec<Outbound>, Report<DispatchError>> {
        let Some(format) = attachment.kind.format() else {
            return Ok(text(UNSUPPORTED_ATTACHMENT));
        };
        self.signal_typing(session.id()).await;

        let bytes = self
            .transport
            .download(&attachment.file_id)
            .await
            .map_err(transport_failure)?;
        let result = {
            let scratch = AudioScratch::stage(&bytes, format).await?;
            self.providers
                .transcription
                .transcribe(scratch.clip(attachment.duration_seconds))
                .await
        };
        let transcript = match result {
            Ok(transcript) => transcript,
            Err(err) => {
                warn!(error = %err, "transcription failed");
                return Ok(text(failure_reply(&err)));
            }
        };

        // Billed once the provider has done the work, whatever happens next.
        self.ledger
            .record_usage(session, UsageKind::Transcription, attachment.duration_seconds);

        let transcript = if transcript.text.trim().is_empty() {
            SILENCE.to_string()
        } else {
            transcript.text
        };

        if attachment.kind.is_spoken() && session.options().relay_transcripts {
            let outbound = match self.converse(session, &origin.display_name, &transcript).await {
                Ok(reply) => {
                    let mut outbound = text(format!("> {transcript}\n\n{reply}"));
                    outbound.extend(self.voice_for(session, &reply).await);
                    outbound
                }
                Err(err) => {
                    warn!(error = %err, "completion failed for transcript");
                    text(format!("> {transcript}\n\n{}", failure_reply(&err)))
                }
            };
            return Ok(outbound);
        }

        context::append_message(session, MessageRole::User, transcript.as_str());
        Ok(text(transcript))
    }

    async fn on_settings(&self, session: &mut Session, callback_id: &str, payload: &str) -> Vec<Outbound> {
        self.acknowledge(callback_id).await;
        if let SettingOutcome::Applied(action) = self.options.apply(session, payload) {
            info!(%action, "setting applied");
        }
        text(format!(
            "Updated settings:\n\n{}",
            OptionsController::render(session.options())
        ))
    }

    /// Appends `message`, asks the completion provider, and appends the reply.
    ///
    /// Usage is recorded whenever the provider answered, even without text.
    async fn converse(
        &self,
        session: &mut Session,
        display_name: &str,
        message: &str,
    ) -> Result<String, ProviderError> {
        context::append_message(session, MessageRole::User, message);
        self.signal_typing(session.id()).await;

        let request = CompletionRequest {
            system_prompt: self.config.system_prompt_for(display_name),
            history: session.context().iter().map(to_llm_message).collect(),
            model: session.options().active_model.clone(),
            temperature: session.options().temperature,
        };
        let completion = self.providers.completion.complete(&request).await?;
        self.ledger
            .record_usage(session, UsageKind::Completion, completion.usage.total());

        let reply = completion.content.ok_or(ProviderError::EmptyResponse {
            capability: Capability::Completion,
        })?;
        context::append_message(session, MessageRole::Assistant, reply.as_str());
        Ok(reply)
    }

    async fn voice_for(&self, session: &Session, reply: &str) -> Option<Outbound> {
        if !session.options().synthesize_voice {
            return None;
        }
        self.signal_typing(session.id()).await;
        match self
            .providers
            .voice
            .synthesize(reply, &self.config.voice_language)
            .await
        {
            Ok(audio) => Some(Outbound::Voice(audio)),
            Err(err) => {
                warn!(error = %err, "voice synthesis failed");
                Some(Outbound::Text(failure_reply(&err)))
            }
        }
    }

    async fn deliver(
        &self,
        to: &ConversationId,
        outbound: Vec<Outbound>,
    ) -> Result<(), Report<DispatchError>> {
        for message in outbound {
            let sent = match message {
                Outbound::Text(body) => self.transport.send_text(to, &body).await,
                Outbound::Voice(audio) => self.transport.send_voice(to, audio).await,
                Outbound::SettingsMenu { text, menu } => {
                    self.transport.send_settings_menu(to, &text, &menu).await
                }
            };
            sent.map_err(transport_failure)?;
        }
        Ok(())
    }

    async fn signal_typing(&self, to: &ConversationId) {
        if let Err(err) = self.transport.typing(to).await {
            debug!(error = %err, "typing indicator failed");
        }
    }

    async fn acknowledge(&self, callback_id: &str) {
        if let Err(err) = self.transport.answer_callback(callback_id).await {
            warn!(error = %err, "failed to answer callback");
        }
    }
}

fn to_llm_message(message: &Message) -> LlmMessage {
    let role = match message.role() {
        MessageRole::System => LlmRole::System,
        MessageRole::User => LlmRole::User,
        MessageRole::Assistant => LlmRole::Assistant,
    };
    LlmMessage::new(role, message.content())
}

/// Chat reply for a provider failure. Always names the capability.
fn failure_reply(err: &ProviderError) -> String {
    match err {
        ProviderError::EmptyResponse {
            capability: Capability::Completion,
        } => "Chat completion returned nothing, maybe usage limit exceeded?".to_string(),
        ProviderError::Rejected {
            capability: Capability::ImageGeneration,
            ..
        } => "Image generation failed. Your prompt may contain text that is not allowed by \
              the provider's safety system."
            .to_string(),
        other => format!(
            "There was a problem with {}, so I can't answer you:\n\n{other}",
            other.capability()
        ),
    }
}

fn storage_failure(report: Report<SessionError>, id: &ConversationId) -> Report<DispatchError> {
    tracing::error!(conversation_id = %id, "session storage failed");
    report.context(DispatchError::Storage {
        conversation_id: id.clone(),
    })
}

fn transport_failure(err: TransportError) -> Report<DispatchError> {
    DispatchError::Transport {
        reason: err.to_string(),
    }
    .into()
}
