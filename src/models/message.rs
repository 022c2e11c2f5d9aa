use serde::Serialize;

/// Telegram parse mode used for alarm notifications.
pub const MARKDOWN_V2: &str = "MarkdownV2";

/// Text payload ready for the delivery collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutboundMessage {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parse_mode: Option<&'static str>,
}

impl OutboundMessage {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            parse_mode: None,
        }
    }

    pub fn markdown(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            parse_mode: Some(MARKDOWN_V2),
        }
    }
}
