//! In-memory collaborators for driving the engine without a real page.
//!
//! [`HeadlessTransport`] and [`RecordingSurface`] are cheap handles over shared
//! state, so a caller can keep a clone after handing one to
//! [`crate::InputDispatcher::attach`] and inspect or mutate it later.

use std::cell::RefCell;
use std::rc::Rc;

use log::{log, Level};

use crate::control_surface::{ControlSurface, PageHost};
use crate::player_arbiter::PlayerId;
use crate::protocol::MediaErrorKind;
use crate::sync_loop::Projection;
use crate::transport::{MediaKind, MediaTransport};

#[derive(Debug, Clone, PartialEq)]
pub struct TransportState {
    pub kind: MediaKind,
    pub paused: bool,
    pub ended: bool,
    pub muted: bool,
    pub volume: f64,
    pub current_time: f64,
    pub duration: f64,
    pub buffered_end: Option<f64>,
    pub error: Option<MediaErrorKind>,
    pub has_caption_track: bool,
    pub looping: bool,
    pub min_position: f64,
}

impl TransportState {
    fn new(kind: MediaKind, duration: f64) -> Self {
        Self {
            kind,
            paused: true,
            ended: false,
            muted: false,
            volume: 1.0,
            current_time: 0.0,
            duration,
            buffered_end: None,
            error: None,
            has_caption_track: false,
            looping: false,
            min_position: 0.0,
        }
    }
}

/// Transport whose fields are plain shared state.
#[derive(Clone)]
pub struct HeadlessTransport {
    state: Rc<RefCell<TransportState>>,
}

impl HeadlessTransport {
    pub fn video(duration: f64) -> Self {
        Self {
            state: Rc::new(RefCell::new(TransportState::new(MediaKind::Video, duration))),
        }
    }

    pub fn audio(duration: f64) -> Self {
        Self {
            state: Rc::new(RefCell::new(TransportState::new(MediaKind::Audio, duration))),
        }
    }

    pub fn state(&self) -> TransportState {
        self.state.borrow().clone()
    }

    pub fn update<F>(&self, update: F)
    where
        F: FnOnce(&mut TransportState),
    {
        update(&mut self.state.borrow_mut());
    }
}

impl MediaTransport for HeadlessTransport {
    fn kind(&self) -> MediaKind {
        self.state.borrow().kind
    }

    fn paused(&self) -> bool {
        self.state.borrow().paused
    }

    fn ended(&self) -> bool {
        self.state.borrow().ended
    }

    fn muted(&self) -> bool {
        self.state.borrow().muted
    }

    fn volume(&self) -> f64 {
        self.state.borrow().volume
    }

    fn current_time(&self) -> f64 {
        self.state.borrow().current_time
    }

    fn duration(&self) -> f64 {
        self.state.borrow().duration
    }

    fn buffered_end(&self) -> Option<f64> {
        self.state.borrow().buffered_end
    }

    fn error(&self) -> Option<MediaErrorKind> {
        self.state.borrow().error
    }

    fn has_caption_track(&self) -> bool {
        self.state.borrow().has_caption_track
    }

    fn min_position(&self) -> f64 {
        self.state.borrow().min_position
    }

    fn play(&mut self) {
        let mut state = self.state.borrow_mut();
        state.paused = false;
        state.ended = false;
    }

    fn pause(&mut self) {
        self.state.borrow_mut().paused = true;
    }

    fn set_current_time(&mut self, seconds: f64) {
        self.state.borrow_mut().current_time = seconds;
    }

    fn set_volume(&mut self, volume: f64) {
        self.state.borrow_mut().volume = volume;
    }

    fn set_muted(&mut self, muted: bool) {
        self.state.borrow_mut().muted = muted;
    }

    fn set_looping(&mut self, looping: bool) {
        self.state.borrow_mut().looping = looping;
    }
}

/// Everything a [`RecordingSurface`] has been told so far.
#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceRecord {
    pub renders: Vec<Projection>,
    pub controls_visible: bool,
    pub hide_count: usize,
    pub show_count: usize,
    pub loading_visible: bool,
    pub message: Option<String>,
    pub message_count: usize,
    pub play_pause_enabled: bool,
    pub settings_open: bool,
    pub subtitles_visible: bool,
    pub scroll_count: usize,
}

impl Default for SurfaceRecord {
    fn default() -> Self {
        Self {
            renders: Vec::new(),
            controls_visible: true,
            hide_count: 0,
            show_count: 0,
            loading_visible: false,
            message: None,
            message_count: 0,
            play_pause_enabled: true,
            settings_open: false,
            subtitles_visible: false,
            scroll_count: 0,
        }
    }
}

/// Control surface that records every call, optionally logging it.
#[derive(Clone, Default)]
pub struct RecordingSurface {
    label: Option<Rc<str>>,
    record: Rc<RefCell<SurfaceRecord>>,
}

impl RecordingSurface {
    /// A surface that also logs each call under `label`.
    pub fn named(label: &str) -> Self {
        Self {
            label: Some(Rc::from(label)),
            record: Rc::default(),
        }
    }

    pub fn record(&self) -> SurfaceRecord {
        self.record.borrow().clone()
    }

    pub fn render_count(&self) -> usize {
        self.record.borrow().renders.len()
    }

    pub fn last_render(&self) -> Option<Projection> {
        self.record.borrow().renders.last().cloned()
    }

    fn log(&self, level: Level, what: std::fmt::Arguments<'_>) {
        if let Some(label) = self.label.as_deref() {
            log!(level, "{}: {}", label, what);
        }
    }
}

impl ControlSurface for RecordingSurface {
    fn render(&mut self, projection: &Projection) {
        self.log(
            Level::Debug,
            format_args!(
                "{} {} / {} vol={:.1}",
                projection.play_pause.text(),
                projection.timestamp,
                projection.duration_text,
                projection.volume_bar
            ),
        );
        self.record.borrow_mut().renders.push(projection.clone());
    }

    fn set_controls_visible(&mut self, visible: bool) {
        self.log(Level::Info, format_args!("controls visible={}", visible));
        let mut record = self.record.borrow_mut();
        record.controls_visible = visible;
        if visible {
            record.show_count += 1;
        } else {
            record.hide_count += 1;
        }
    }

    fn set_loading_visible(&mut self, visible: bool) {
        self.record.borrow_mut().loading_visible = visible;
    }

    fn set_message(&mut self, message: Option<&str>) {
        self.log(Level::Info, format_args!("message={:?}", message));
        let mut record = self.record.borrow_mut();
        record.message = message.map(ToString::to_string);
        record.message_count += 1;
    }

    fn set_play_pause_enabled(&mut self, enabled: bool) {
        self.record.borrow_mut().play_pause_enabled = enabled;
    }

    fn set_settings_open(&mut self, open: bool) {
        self.record.borrow_mut().settings_open = open;
    }

    fn set_subtitles_visible(&mut self, visible: bool) {
        self.record.borrow_mut().subtitles_visible = visible;
    }

    fn scroll_into_view(&mut self) {
        self.record.borrow_mut().scroll_count += 1;
    }
}

/// Page with one fullscreen slot, a cinematic flag and optional PiP.
#[derive(Debug, Clone, Default)]
pub struct HeadlessPage {
    fullscreen: Option<PlayerId>,
    cinematic: bool,
    pip_supported: bool,
    pip: Option<PlayerId>,
}

impl HeadlessPage {
    pub fn with_pip() -> Self {
        Self {
            pip_supported: true,
            ..Self::default()
        }
    }
}

impl PageHost for HeadlessPage {
    fn fullscreen_player(&self) -> Option<PlayerId> {
        self.fullscreen
    }

    fn request_fullscreen(&mut self, id: PlayerId) -> Result<(), String> {
        self.fullscreen = Some(id);
        Ok(())
    }

    fn exit_fullscreen(&mut self) -> Result<(), String> {
        if self.fullscreen.take().is_none() {
            return Err("no element is fullscreen".to_string());
        }
        Ok(())
    }

    fn cinematic(&self) -> bool {
        self.cinematic
    }

    fn set_cinematic(&mut self, enabled: bool) {
        self.cinematic = enabled;
    }

    fn pip_supported(&self) -> bool {
        self.pip_supported
    }

    fn pip_player(&self) -> Option<PlayerId> {
        self.pip
    }

    fn request_pip(&mut self, id: PlayerId) -> Result<(), String> {
        if !self.pip_supported {
            return Err("picture-in-picture is not supported".to_string());
        }
        self.pip = Some(id);
        Ok(())
    }

    fn exit_pip(&mut self) -> Result<(), String> {
        self.pip = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{HeadlessPage, HeadlessTransport, RecordingSurface};
    use crate::control_surface::{ControlSurface, PageHost};
    use crate::player_arbiter::PlayerId;
    use crate::transport::MediaTransport;

    #[test]
    fn test_transport_clones_share_state() {
        let transport = HeadlessTransport::video(30.0);
        let mut handle = transport.clone();
        handle.play();
        handle.set_volume(0.4);
        let state = transport.state();
        assert!(!state.paused);
        assert!((state.volume - 0.4).abs() < f64::EPSILON);
    }

    #[test]
    fn test_page_exit_fullscreen_without_element_fails() {
        let mut page = HeadlessPage::default();
        assert!(page.exit_fullscreen().is_err());
        let id = PlayerId::new();
        page.request_fullscreen(id).expect("fullscreen");
        assert_eq!(page.fullscreen_player(), Some(id));
        assert!(page.exit_fullscreen().is_ok());
        assert!(page.request_pip(id).is_err());
    }

    #[test]
    fn test_surface_counts_visibility_changes() {
        let surface = RecordingSurface::default();
        let mut handle = surface.clone();
        handle.set_controls_visible(false);
        handle.set_controls_visible(true);
        handle.set_message(Some("hello"));
        let record = surface.record();
        assert_eq!(record.hide_count, 1);
        assert_eq!(record.show_count, 1);
        assert_eq!(record.message.as_deref(), Some("hello"));
    }
}
