use serde::{Deserialize, Serialize};

/// Two-way icon switch keyed on the recording flag.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TileIcon {
    Recording,
    Stopped,
}

impl TileIcon {
    pub fn for_recording(value: bool) -> Self {
        if value {
            TileIcon::Recording
        } else {
            TileIcon::Stopped
        }
    }
}

/// Rendered state of the tile. Derived on every refresh, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TileDisplayState {
    pub visible: bool,
    pub value: bool,
    pub label: String,
    pub icon: TileIcon,
}

impl TileDisplayState {
    pub fn from_recording(value: bool, label: &str) -> Self {
        Self {
            // The tile stays visible while the keyguard shows; hiding it
            // there is a disabled behavior kept out deliberately.
            visible: true,
            value,
            label: label.to_string(),
            icon: TileIcon::for_recording(value),
        }
    }
}
