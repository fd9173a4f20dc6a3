//! Wire types exchanged between the editor and the preview surface.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Key of the outer object that marks a frame as ours.
pub const FRAME_MARKER: &str = "themeStudio";

/// The fixed set of message types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    SectionUpdate,
    SectionAdd,
    SectionDelete,
    SectionReorder,
    BlockUpdate,
    BlockAdd,
    BlockDelete,
    BlockReorder,
    ThemeSettingsUpdate,
    ToggleSelectorMode,
    ScrollToSection,
    PreviewReady,
    SectionSelected,
    BlockSelected,
    ScrollPosition,
}

impl MessageType {
    /// Whether the editor originates this type; the rest come from the preview.
    pub fn is_editor_message(&self) -> bool {
        !matches!(
            self,
            MessageType::PreviewReady
                | MessageType::SectionSelected
                | MessageType::BlockSelected
                | MessageType::ScrollPosition
        )
    }
}

/// Which side of the bus produced a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageSource {
    Editor,
    Preview,
}

/// A typed message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub message_type: MessageType,
    #[serde(default)]
    pub payload: Value,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub source: MessageSource,
}

impl Envelope {
    pub fn new(message_type: MessageType, payload: Value, source: MessageSource) -> Self {
        Self {
            message_type,
            payload,
            timestamp: Utc::now().timestamp_millis(),
            source,
        }
    }
}

/// The outer object `{"themeStudio": envelope}` that separates bus traffic from
/// anything else arriving on the same channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusFrame {
    #[serde(rename = "themeStudio")]
    pub message: Envelope,
}

impl BusFrame {
    pub fn wrap(message: Envelope) -> Self {
        Self { message }
    }

    /// Decode a raw frame.
    ///
    /// `Ok(None)` means the text is valid JSON but not bus traffic (no marker);
    /// an `Err` means it carried the marker but the envelope is malformed.
    pub fn decode(raw: &str) -> Result<Option<Self>, serde_json::Error> {
        let value: Value = serde_json::from_str(raw)?;
        if value.get(FRAME_MARKER).is_none() {
            return Ok(None);
        }
        serde_json::from_value(value).map(Some)
    }
}
