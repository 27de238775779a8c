//! The subset of Bot API update types relaybot reads.

use relaybot_core::ConversationId;
use relaybot_dispatch::{Attachment, AttachmentKind, EventKind, InboundEvent, Origin};
use serde::Deserialize;

/// An incoming update.
#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
    pub first_name: String,
    #[serde(default)]
    pub last_name: Option<String>,
}

impl User {
    /// First and last name joined by a space.
    #[must_use]
    pub fn full_name(&self) -> String {
        match &self.last_name {
            Some(last) if !last.is_empty() => format!("{} {last}", self.first_name),
            _ => self.first_name.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: String,
}

impl Chat {
    #[must_use]
    pub fn is_private(&self) -> bool {
        self.kind == "private"
    }
}

/// Voice notes, audio files and videos share this shape.
#[derive(Debug, Clone, Deserialize)]
pub struct Media {
    pub file_id: String,
    #[serde(default)]
    pub duration: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FileRef {
    pub file_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    #[serde(default)]
    pub from: Option<User>,
    pub chat: Chat,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub voice: Option<Media>,
    #[serde(default)]
    pub audio: Option<Media>,
    #[serde(default)]
    pub video: Option<Media>,
    #[serde(default)]
    pub video_note: Option<Media>,
    #[serde(default)]
    pub photo: Vec<FileRef>,
    #[serde(default)]
    pub document: Option<FileRef>,
    #[serde(default)]
    pub sticker: Option<FileRef>,
}

impl Message {
    fn attachment(&self) -> Option<Attachment> {
        let media = |kind: AttachmentKind, clip: &Media| Attachment {
            kind,
            file_id: clip.file_id.clone(),
            duration_seconds: clip.duration,
        };
        let other = |file: &FileRef| Attachment {
            kind: AttachmentKind::Other,
            file_id: file.file_id.clone(),
            duration_seconds: 0,
        };

        if let Some(voice) = &self.voice {
            return Some(media(AttachmentKind::Voice, voice));
        }
        if let Some(audio) = &self.audio {
            return Some(media(AttachmentKind::Audio, audio));
        }
        if let Some(video) = self.video.as_ref().or(self.video_note.as_ref()) {
            return Some(media(AttachmentKind::Video, video));
        }
        self.photo
            .last()
            .or(self.document.as_ref())
            .or(self.sticker.as_ref())
            .map(other)
    }

    fn origin(&self, sender: Option<&User>) -> Origin {
        Origin {
            conversation_id: ConversationId::from(self.chat.id),
            display_name: sender.map(User::full_name).unwrap_or_default(),
            private: self.chat.is_private(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    pub from: User,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub data: Option<String>,
}

impl Update {
    /// Converts the update into an event, or `None` for updates relaybot
    /// does not act on (edits, joins, callbacks without data).
    #[must_use]
    pub fn into_event(self) -> Option<InboundEvent> {
        if let Some(query) = self.callback_query {
            let payload = query.data?;
            let origin = match &query.message {
                Some(message) => message.origin(Some(&query.from)),
                None => Origin {
                    conversation_id: ConversationId::from(query.from.id),
                    display_name: query.from.full_name(),
                    private: true,
                },
            };
            return Some(InboundEvent::new(
                origin,
                EventKind::SettingsCallback {
                    callback_id: query.id,
                    payload,
                },
            ));
        }

        let message = self.message?;
        let origin = message.origin(message.from.as_ref());
        let kind = match (&message.text, message.attachment()) {
            (Some(text), _) => EventKind::from_text(text.as_str()),
            (None, Some(attachment)) => EventKind::Attachment(attachment),
            (None, None) => return None,
        };
        Some(InboundEvent::new(origin, kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relaybot_dispatch::Command;

    fn parse(json: &str) -> Update {
        serde_json::from_str(json).expect("valid update")
    }

    #[test]
    fn private_text_becomes_text_event() {
        let update = parse(
            r#"{
                "update_id": 1,
                "message": {
                    "message_id": 10,
                    "from": {"id": 42, "first_name": "Ada", "last_name": "Lovelace"},
                    "chat": {"id": 42, "type": "private"},
                    "text": "hello"
                }
            }"#,
        );

        let event = update.into_event().expect("event");

        assert_eq!(event.conversation_id().as_str(), "42");
        assert_eq!(event.origin.display_name, "Ada Lovelace");
        assert!(event.origin.private);
        assert_eq!(
            event.kind,
            EventKind::Text {
                text: "hello".to_string()
            }
        );
    }

    #[test]
    fn group_command_is_classified() {
        let update = parse(
            r#"{
                "update_id": 2,
                "message": {
                    "message_id": 11,
                    "from": {"id": 7, "first_name": "Grace"},
                    "chat": {"id": -100, "type": "supergroup"},
                    "text": "/usage@relay_bot"
                }
            }"#,
        );

        let event = update.into_event().expect("event");

        assert!(!event.origin.private);
        assert_eq!(event.origin.display_name, "Grace");
        assert_eq!(event.conversation_id().as_str(), "-100");
        assert_eq!(event.kind, EventKind::Command(Command::Usage));
    }

    #[test]
    fn voice_note_carries_duration() {
        let update = parse(
            r#"{
                "update_id": 3,
                "message": {
                    "message_id": 12,
                    "from": {"id": 42, "first_name": "Ada"},
                    "chat": {"id": 42, "type": "private"},
                    "voice": {"file_id": "AwAD", "duration": 9, "mime_type": "audio/ogg"}
                }
            }"#,
        );

        let event = update.into_event().expect("event");

        assert_eq!(
            event.kind,
            EventKind::Attachment(Attachment {
                kind: AttachmentKind::Voice,
                file_id: "AwAD".to_string(),
                duration_seconds: 9,
            })
        );
    }

    #[test]
    fn photo_is_an_unsupported_attachment() {
        let update = parse(
            r#"{
                "update_id": 4,
                "message": {
                    "message_id": 13,
                    "chat": {"id": 42, "type": "private"},
                    "photo": [{"file_id": "small"}, {"file_id": "large"}]
                }
            }"#,
        );

        let event = update.into_event().expect("event");

        match event.kind {
            EventKind::Attachment(attachment) => {
                assert_eq!(attachment.kind, AttachmentKind::Other);
                assert_eq!(attachment.file_id, "large");
            }
            other => panic!("unexpected kind: {other:?}"),
        }
    }

    #[test]
    fn callback_uses_message_chat() {
        let update = parse(
            r#"{
                "update_id": 5,
                "callback_query": {
                    "id": "cb-1",
                    "from": {"id": 42, "first_name": "Ada"},
                    "message": {
                        "message_id": 14,
                        "chat": {"id": 42, "type": "private"},
                        "text": "Settings"
                    },
                    "data": "/setting_inc_temp"
                }
            }"#,
        );

        let event = update.into_event().expect("event");

        assert_eq!(event.conversation_id().as_str(), "42");
        assert_eq!(event.origin.display_name, "Ada");
        assert_eq!(
            event.kind,
            EventKind::SettingsCallback {
                callback_id: "cb-1".to_string(),
                payload: "/setting_inc_temp".to_string(),
            }
        );
    }

    #[test]
    fn service_messages_are_skipped() {
        let update = parse(
            r#"{
                "update_id": 6,
                "message": {
                    "message_id": 15,
                    "chat": {"id": -5, "type": "group"},
                    "new_chat_members": []
                }
            }"#,
        );
        assert!(update.into_event().is_none());

        let edited = parse(r#"{"update_id": 7, "edited_message": {}}"#);
        assert!(edited.into_event().is_none());
    }
}
