//! Interfaces to the externally built control widgets and the hosting page.
//!
//! The engine never constructs controls. It only pushes state into them, so
//! every setter except [`ControlSurface::render`] defaults to a no-op for
//! surfaces that lack the corresponding widget.

use crate::player_arbiter::PlayerId;
use crate::sync_loop::Projection;

pub trait ControlSurface {
    /// Applies one projection pass.
    fn render(&mut self, projection: &Projection);

    fn set_controls_visible(&mut self, _visible: bool) {}

    fn set_loading_visible(&mut self, _visible: bool) {}

    /// Shows `message` in the per-instance message region, or clears it.
    fn set_message(&mut self, _message: Option<&str>) {}

    fn set_play_pause_enabled(&mut self, _enabled: bool) {}

    fn set_settings_open(&mut self, _open: bool) {}

    fn set_subtitles_visible(&mut self, _visible: bool) {}

    fn scroll_into_view(&mut self) {}
}

/// Page-level capabilities shared by every instance.
pub trait PageHost {
    fn fullscreen_player(&self) -> Option<PlayerId>;
    fn request_fullscreen(&mut self, id: PlayerId) -> Result<(), String>;
    fn exit_fullscreen(&mut self) -> Result<(), String>;

    fn cinematic(&self) -> bool;
    fn set_cinematic(&mut self, enabled: bool);

    fn pip_supported(&self) -> bool {
        false
    }

    fn pip_player(&self) -> Option<PlayerId> {
        None
    }

    fn request_pip(&mut self, _id: PlayerId) -> Result<(), String> {
        Err("picture-in-picture is not supported".to_string())
    }

    fn exit_pip(&mut self) -> Result<(), String> {
        Err("picture-in-picture is not supported".to_string())
    }
}
