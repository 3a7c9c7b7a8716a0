//! Interface to the underlying playable-media primitive.

use crate::protocol::MediaErrorKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Video,
    Audio,
}

/// Play/pause/seek/volume capability consumed by the engine.
///
/// Time values are seconds. `duration` is NaN while unknown.
pub trait MediaTransport {
    fn kind(&self) -> MediaKind;
    fn paused(&self) -> bool;
    fn ended(&self) -> bool;
    fn muted(&self) -> bool;
    fn volume(&self) -> f64;
    fn current_time(&self) -> f64;
    fn duration(&self) -> f64;
    /// End of the last buffered range, if anything is buffered.
    fn buffered_end(&self) -> Option<f64>;

    fn error(&self) -> Option<MediaErrorKind> {
        None
    }

    fn has_caption_track(&self) -> bool {
        false
    }

    /// Lowest position a backward skip may land on.
    fn min_position(&self) -> f64 {
        0.0
    }

    fn play(&mut self);
    fn pause(&mut self);
    fn set_current_time(&mut self, seconds: f64);
    fn set_volume(&mut self, volume: f64);
    fn set_muted(&mut self, muted: bool);
    fn set_looping(&mut self, looping: bool);
}

/// Transport fields read together at projection time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransportSnapshot {
    pub paused: bool,
    pub muted: bool,
    pub volume: f64,
    pub current_time: f64,
    pub duration: f64,
    pub buffered_end: Option<f64>,
}

impl TransportSnapshot {
    pub fn read(transport: &dyn MediaTransport) -> Self {
        Self {
            paused: transport.paused(),
            muted: transport.muted(),
            volume: transport.volume(),
            current_time: transport.current_time(),
            duration: transport.duration(),
            buffered_end: transport.buffered_end(),
        }
    }
}
