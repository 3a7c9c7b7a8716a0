//! Event-bus protocol and input payloads shared by all coordination components.
//!
//! The bus carries activation and state notifications for observers that are
//! not part of any player instance (analytics, logging). Input payloads are
//! what an embedding layer feeds into [`crate::InputDispatcher::dispatch`].

use crate::player_arbiter::PlayerId;
use crate::state_machine::{Category, StateValue};

/// Top-level envelope for all bus traffic.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Arbiter(ArbiterMessage),
    Playback(PlaybackMessage),
}

/// Active-slot notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArbiterMessage {
    ActivePlayerChanged(PlayerId),
    ActivePlayerCleared,
}

/// Per-instance playback notifications.
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackMessage {
    StateChanged {
        player_id: PlayerId,
        category: Category,
        value: StateValue,
    },
    PlaybackFailed {
        player_id: PlayerId,
        /// `None` when the failure came from the stall watchdog.
        cause: Option<MediaErrorKind>,
    },
}

/// Cause classes reported by a transport error event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaErrorKind {
    Aborted,
    Network,
    Decode,
    SourceNotSupported,
    Encrypted,
    Metadata,
    Unknown,
}

impl MediaErrorKind {
    /// Maps a platform media error code onto a cause class.
    pub fn from_code(code: u16) -> Self {
        match code {
            1 => MediaErrorKind::Aborted,
            2 => MediaErrorKind::Network,
            3 => MediaErrorKind::Decode,
            4 => MediaErrorKind::SourceNotSupported,
            5 => MediaErrorKind::Encrypted,
            6 => MediaErrorKind::Metadata,
            _ => MediaErrorKind::Unknown,
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            MediaErrorKind::Aborted => "fetching the media resource was aborted",
            MediaErrorKind::Network => "a network error occurred while fetching the media",
            MediaErrorKind::Decode => "the media resource could not be decoded",
            MediaErrorKind::SourceNotSupported => "the media resource is not supported",
            MediaErrorKind::Encrypted => "the media resource is encrypted and cannot be used",
            MediaErrorKind::Metadata => "a metadata error occurred while fetching the media",
            MediaErrorKind::Unknown => "an unclassified media error occurred",
        }
    }
}

/// Native transport events mirrored into the engine.
#[derive(Debug, Clone, Copy, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransportEvent {
    Playing,
    Pause,
    Ended,
    Waiting,
    Stalled,
    LoadStart,
    LoadedMetadata,
    LoadedData,
    CanPlay,
    TimeUpdate,
    Progress,
    VolumeChange,
    FullscreenChange { active: bool },
    Error { cause: MediaErrorKind },
    Abort,
    Emptied,
    Encrypted,
}

impl TransportEvent {
    /// Events that prove the media became playable again.
    pub fn is_recovery(self) -> bool {
        matches!(
            self,
            TransportEvent::Playing
                | TransportEvent::LoadedMetadata
                | TransportEvent::LoadedData
                | TransportEvent::CanPlay
        )
    }
}

/// Recognized click targets on and around a control surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClickTarget {
    /// The media element itself.
    Media,
    /// The player container outside of any control.
    Container,
    PlayPause,
    Mute,
    Fullscreen,
    Cinematic,
    Subtitles,
    Settings,
    Loop,
    Pip,
    /// Inside the open settings overlay but not on a control.
    SettingsOverlay,
    /// Anywhere on the page outside this player.
    Elsewhere,
}

/// Keyboard input as delivered by the embedding layer.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct KeyInput {
    /// Key name (`" "`, `"ArrowUp"`, `"f"`, ...).
    pub key: String,
    /// Focus was inside a text input when the key was pressed.
    #[serde(default)]
    pub from_text_input: bool,
}

impl KeyInput {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            from_text_input: false,
        }
    }
}

/// Seek-bar interaction phases.
#[derive(Debug, Clone, Copy, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum SeekBarInput {
    Press,
    /// Slider moved; `value` is a percentage in `[0, 100]`.
    Input { value: f64 },
    Release,
}

/// Every input source the dispatcher accepts.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InputEvent {
    Focus,
    PointerMove {
        #[serde(default)]
        over_controls: bool,
    },
    PointerEnterControls,
    PointerLeaveControls,
    Click {
        target: ClickTarget,
    },
    Key(KeyInput),
    SeekBar(SeekBarInput),
    VolumeBar {
        value: f64,
    },
    Transport(TransportEvent),
}

/// Discrete actions that the click and keyboard tables map onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputAction {
    TogglePlayPause,
    ToggleMute,
    ToggleFullscreen,
    ToggleCinematic,
    ToggleSettings,
    ToggleSubtitles,
    ToggleLoop,
    TogglePip,
    SkipBackward,
    SkipForward,
    VolumeUp,
    VolumeDown,
}

impl InputAction {
    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            " " | "Spacebar" | "Space" => Some(InputAction::TogglePlayPause),
            "ArrowUp" => Some(InputAction::VolumeUp),
            "ArrowDown" => Some(InputAction::VolumeDown),
            "ArrowLeft" => Some(InputAction::SkipBackward),
            "ArrowRight" => Some(InputAction::SkipForward),
            "f" | "F" => Some(InputAction::ToggleFullscreen),
            "m" | "M" => Some(InputAction::ToggleMute),
            "c" | "C" => Some(InputAction::ToggleCinematic),
            "s" | "S" => Some(InputAction::ToggleSubtitles),
            "t" | "T" => Some(InputAction::ToggleSettings),
            _ => None,
        }
    }

    pub fn from_click(target: ClickTarget) -> Option<Self> {
        match target {
            ClickTarget::Media | ClickTarget::PlayPause => Some(InputAction::TogglePlayPause),
            ClickTarget::Mute => Some(InputAction::ToggleMute),
            ClickTarget::Fullscreen => Some(InputAction::ToggleFullscreen),
            ClickTarget::Cinematic => Some(InputAction::ToggleCinematic),
            ClickTarget::Subtitles => Some(InputAction::ToggleSubtitles),
            ClickTarget::Settings => Some(InputAction::ToggleSettings),
            ClickTarget::Loop => Some(InputAction::ToggleLoop),
            ClickTarget::Pip => Some(InputAction::TogglePip),
            ClickTarget::Container | ClickTarget::SettingsOverlay | ClickTarget::Elsewhere => None,
        }
    }
}
