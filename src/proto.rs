//! Hand-maintained subset of the WhatsApp E2E message protobufs.
//!
//! Field tags match the upstream schema so retried plaintexts are
//! bit-compatible with what other devices expect. Only the fields the
//! session core touches are declared; unknown fields round-trip through
//! prost untouched is not required here because retries re-encode from the
//! cached plaintext.

/// The transport-level plaintext of one message.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Message {
    #[prost(string, optional, tag = "1")]
    pub conversation: Option<String>,
    #[prost(message, optional, tag = "2")]
    pub sender_key_distribution_message: Option<SenderKeyDistributionMessage>,
    #[prost(message, optional, tag = "3")]
    pub image_message: Option<ImageMessage>,
    #[prost(message, optional, tag = "6")]
    pub extended_text_message: Option<ExtendedTextMessage>,
    #[prost(message, optional, tag = "7")]
    pub document_message: Option<DocumentMessage>,
    #[prost(message, optional, tag = "8")]
    pub audio_message: Option<AudioMessage>,
    #[prost(message, optional, tag = "9")]
    pub video_message: Option<VideoMessage>,
    #[prost(message, optional, boxed, tag = "12")]
    pub protocol_message: Option<Box<ProtocolMessage>>,
    #[prost(message, optional, tag = "26")]
    pub sticker_message: Option<StickerMessage>,
    #[prost(message, optional, boxed, tag = "31")]
    pub device_sent_message: Option<Box<DeviceSentMessage>>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SenderKeyDistributionMessage {
    #[prost(string, optional, tag = "1")]
    pub group_id: Option<String>,
    #[prost(bytes = "vec", optional, tag = "2")]
    pub axolotl_sender_key_distribution_message: Option<Vec<u8>>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DeviceSentMessage {
    #[prost(string, optional, tag = "1")]
    pub destination_jid: Option<String>,
    #[prost(message, optional, boxed, tag = "2")]
    pub message: Option<Box<Message>>,
    #[prost(string, optional, tag = "3")]
    pub phash: Option<String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ExtendedTextMessage {
    #[prost(string, optional, tag = "1")]
    pub text: Option<String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ImageMessage {
    #[prost(string, optional, tag = "1")]
    pub url: Option<String>,
    #[prost(string, optional, tag = "2")]
    pub mimetype: Option<String>,
    #[prost(string, optional, tag = "3")]
    pub caption: Option<String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DocumentMessage {
    #[prost(string, optional, tag = "1")]
    pub url: Option<String>,
    #[prost(string, optional, tag = "2")]
    pub mimetype: Option<String>,
    #[prost(string, optional, tag = "3")]
    pub title: Option<String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AudioMessage {
    #[prost(string, optional, tag = "1")]
    pub url: Option<String>,
    #[prost(string, optional, tag = "2")]
    pub mimetype: Option<String>,
    #[prost(bool, optional, tag = "6")]
    pub ptt: Option<bool>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct VideoMessage {
    #[prost(string, optional, tag = "1")]
    pub url: Option<String>,
    #[prost(string, optional, tag = "2")]
    pub mimetype: Option<String>,
    #[prost(bool, optional, tag = "8")]
    pub gif_playback: Option<bool>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct StickerMessage {
    #[prost(string, optional, tag = "1")]
    pub url: Option<String>,
    #[prost(string, optional, tag = "2")]
    pub mimetype: Option<String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MessageKey {
    #[prost(string, optional, tag = "1")]
    pub remote_jid: Option<String>,
    #[prost(bool, optional, tag = "2")]
    pub from_me: Option<bool>,
    #[prost(string, optional, tag = "3")]
    pub id: Option<String>,
    #[prost(string, optional, tag = "4")]
    pub participant: Option<String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtocolMessage {
    #[prost(message, optional, tag = "1")]
    pub key: Option<MessageKey>,
    #[prost(enumeration = "protocol_message::Type", optional, tag = "2")]
    pub r#type: Option<i32>,
    #[prost(message, optional, tag = "16")]
    pub peer_data_operation_request_message: Option<PeerDataOperationRequestMessage>,
}

pub mod protocol_message {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum Type {
        Revoke = 0,
        PeerDataOperationRequestMessage = 16,
        PeerDataOperationRequestResponseMessage = 17,
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum PeerDataOperationRequestType {
    UploadSticker = 0,
    SendRecentStickerBoosts = 1,
    GenerateLinkPreview = 2,
    HistorySyncOnDemand = 3,
    PlaceholderMessageResend = 4,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PeerDataOperationRequestMessage {
    #[prost(enumeration = "PeerDataOperationRequestType", optional, tag = "1")]
    pub peer_data_operation_request_type: Option<i32>,
    #[prost(message, repeated, tag = "5")]
    pub placeholder_message_resend_request: Vec<PlaceholderMessageResendRequest>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PlaceholderMessageResendRequest {
    #[prost(message, optional, tag = "1")]
    pub message_key: Option<MessageKey>,
}

/// The `mediatype` attribute value for the enc envelope, if the message
/// carries media.
pub fn media_type(msg: &Message) -> Option<&'static str> {
    let inner = effective_message(msg);
    if inner.image_message.is_some() {
        Some("image")
    } else if inner.sticker_message.is_some() {
        Some("sticker")
    } else if let Some(video) = &inner.video_message {
        if video.gif_playback.unwrap_or(false) {
            Some("gif")
        } else {
            Some("video")
        }
    } else if let Some(audio) = &inner.audio_message {
        if audio.ptt.unwrap_or(false) {
            Some("ptt")
        } else {
            Some("audio")
        }
    } else if inner.document_message.is_some() {
        Some("document")
    } else {
        None
    }
}

/// The `type` attribute of an outgoing `<message>` stanza.
pub fn stanza_type(msg: &Message) -> &'static str {
    if media_type(msg).is_some() {
        "media"
    } else {
        "text"
    }
}

fn effective_message(msg: &Message) -> &Message {
    msg.device_sent_message
        .as_deref()
        .and_then(|dsm| dsm.message.as_deref())
        .unwrap_or(msg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_type_detection() {
        let text = Message {
            conversation: Some("hi".into()),
            ..Default::default()
        };
        assert_eq!(media_type(&text), None);
        assert_eq!(stanza_type(&text), "text");

        let image = Message {
            image_message: Some(ImageMessage::default()),
            ..Default::default()
        };
        assert_eq!(media_type(&image), Some("image"));
        assert_eq!(stanza_type(&image), "media");

        let ptt = Message {
            audio_message: Some(AudioMessage {
                ptt: Some(true),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert_eq!(media_type(&ptt), Some("ptt"));
    }

    #[test]
    fn media_type_sees_through_device_sent_wrapping() {
        let wrapped = Message {
            device_sent_message: Some(Box::new(DeviceSentMessage {
                destination_jid: Some("123@s.whatsapp.net".into()),
                message: Some(Box::new(Message {
                    video_message: Some(VideoMessage {
                        gif_playback: Some(true),
                        ..Default::default()
                    }),
                    ..Default::default()
                })),
                phash: None,
            })),
            ..Default::default()
        };
        assert_eq!(media_type(&wrapped), Some("gif"));
    }
}
