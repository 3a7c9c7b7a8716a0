//! Frame-coalesced projection of transport and state-machine values.
//!
//! [`SyncLoop::request_update`] never renders directly. It arms a one-frame
//! [`SingleFlight`], so any number of requests inside one frame collapse into a
//! single [`Projection`] computed from transport fields read when the frame
//! runs. While playback is `playing` the frame re-arms itself.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

use log::{debug, trace};

use crate::control_surface::{ControlSurface, PageHost};
use crate::player_arbiter::{PlayerArbiter, PlayerId};
use crate::player_context::{PlayerContext, SessionStore};
use crate::single_flight::SingleFlight;
use crate::state_machine::{Category, PlaybackState, StateMachine, StateValue};
use crate::transport::{MediaTransport, TransportSnapshot};

/// Whether glyphs resolve to sprite references or plain text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IconStyle {
    Svg,
    Text,
}

impl IconStyle {
    pub fn from_flag(use_svg_icons: bool) -> Self {
        if use_svg_icons {
            IconStyle::Svg
        } else {
            IconStyle::Text
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Glyph {
    Play,
    Pause,
    Mute,
    VolumeUp,
    Fullscreen,
    FullscreenExit,
    CinemaMode,
    CinemaModeActive,
}

impl Glyph {
    pub fn sprite(self) -> &'static str {
        match self {
            Glyph::Play => "assets/icons.svg#icon-play",
            Glyph::Pause => "assets/icons.svg#icon-pause",
            Glyph::Mute => "assets/icons.svg#icon-mute",
            Glyph::VolumeUp => "assets/icons.svg#icon-volume-up",
            Glyph::Fullscreen => "assets/icons.svg#icon-fullscreen",
            Glyph::FullscreenExit => "assets/icons.svg#icon-fullscreen-exit",
            Glyph::CinemaMode => "assets/icons.svg#icon-cinema-mode",
            Glyph::CinemaModeActive => "assets/icons.svg#icon-cinema-mode-active",
        }
    }

    pub fn text(self) -> &'static str {
        match self {
            Glyph::Play => "►",
            Glyph::Pause => "❚❚",
            Glyph::Mute => "🔇",
            Glyph::VolumeUp => "🔊",
            Glyph::Fullscreen => "⛶",
            Glyph::FullscreenExit => "⧈",
            Glyph::CinemaMode | Glyph::CinemaModeActive => "💡",
        }
    }

    pub fn label(self, style: IconStyle) -> &'static str {
        match style {
            IconStyle::Svg => self.sprite(),
            IconStyle::Text => self.text(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct SeekBarProjection {
    pub value_percent: f64,
    pub buffered_percent: f64,
}

/// One complete UI projection for an instance.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Projection {
    pub icon_style: IconStyle,
    pub play_pause: Glyph,
    pub mute: Glyph,
    pub fullscreen: Glyph,
    pub cinematic: Glyph,
    /// `None` while the user is dragging the seek bar.
    pub seek_bar: Option<SeekBarProjection>,
    pub volume_bar: f64,
    pub timestamp: String,
    pub duration_text: String,
}

impl Projection {
    pub fn compute(state: &PlaybackState, transport: &TransportSnapshot, icon_style: IconStyle) -> Self {
        let play_pause = if transport.paused {
            Glyph::Play
        } else {
            Glyph::Pause
        };
        let mute = if transport.muted {
            Glyph::Mute
        } else {
            Glyph::VolumeUp
        };
        let fullscreen = if state.display == StateValue::Fullscreen {
            Glyph::FullscreenExit
        } else {
            Glyph::Fullscreen
        };
        let cinematic = if state.visual_mode == StateValue::CinematicMode {
            Glyph::CinemaModeActive
        } else {
            Glyph::CinemaMode
        };

        let seek_bar = if state.seeking == StateValue::Seeking {
            None
        } else {
            Some(SeekBarProjection {
                value_percent: percent_of(transport.current_time, transport.duration),
                buffered_percent: transport
                    .buffered_end
                    .map(|end| percent_of(end, transport.duration))
                    .unwrap_or(0.0),
            })
        };

        let volume_bar = if transport.volume.is_finite() {
            transport.volume.clamp(0.0, 1.0)
        } else {
            0.0
        };

        let timestamp = if transport.current_time.is_finite() {
            format_timestamp(transport.current_time)
        } else {
            String::new()
        };
        let duration_text = if transport.duration.is_finite() {
            format_timestamp(transport.duration)
        } else {
            "00:00".to_string()
        };

        Self {
            icon_style,
            play_pause,
            mute,
            fullscreen,
            cinematic,
            seek_bar,
            volume_bar,
            timestamp,
            duration_text,
        }
    }
}

/// `(value / duration) * 100`, or 0 when that is not a finite number.
pub fn percent_of(value: f64, duration: f64) -> f64 {
    let percent = value / duration * 100.0;
    if percent.is_finite() {
        percent
    } else {
        0.0
    }
}

/// Formats whole seconds as `m:ss`.
pub fn format_timestamp(seconds: f64) -> String {
    let whole = if seconds.is_finite() && seconds > 0.0 {
        seconds.floor() as u64
    } else {
        0
    };
    format!("{}:{:02}", whole / 60, whole % 60)
}

struct SyncLoopInner {
    player_id: PlayerId,
    arbiter: Rc<PlayerArbiter>,
    state_machine: Rc<StateMachine>,
    transport: Rc<RefCell<dyn MediaTransport>>,
    surface: Rc<RefCell<dyn ControlSurface>>,
    page: Rc<RefCell<dyn PageHost>>,
    session: SessionStore,
    icon_style: IconStyle,
    frame_interval: Duration,
    frame: SingleFlight,
    projections: Cell<u64>,
}

/// Per-instance projection scheduler.
#[derive(Clone)]
pub struct SyncLoop {
    inner: Rc<SyncLoopInner>,
}

impl SyncLoop {
    pub fn new(
        context: &PlayerContext,
        player_id: PlayerId,
        state_machine: Rc<StateMachine>,
        transport: Rc<RefCell<dyn MediaTransport>>,
        surface: Rc<RefCell<dyn ControlSurface>>,
    ) -> Self {
        Self {
            inner: Rc::new(SyncLoopInner {
                player_id,
                arbiter: Rc::clone(&context.arbiter),
                state_machine,
                transport,
                surface,
                page: Rc::clone(&context.page),
                session: context.session.clone(),
                icon_style: IconStyle::from_flag(context.config.controls.use_svg_icons),
                frame_interval: context.config.timing.frame_interval(),
                frame: SingleFlight::new(),
                projections: Cell::new(0),
            }),
        }
    }

    /// Schedules a projection for the next frame, replacing any pending one.
    pub fn request_update(&self) {
        if !self.inner.arbiter.is_active(self.inner.player_id) {
            trace!(
                "SyncLoop: {} is not active, skipping update request",
                self.inner.player_id
            );
            return;
        }
        self.schedule();
    }

    pub fn cancel(&self) {
        self.inner.frame.cancel();
    }

    pub fn is_pending(&self) -> bool {
        self.inner.frame.is_pending()
    }

    /// Number of projection passes that actually rendered.
    pub fn projections_run(&self) -> u64 {
        self.inner.projections.get()
    }

    fn schedule(&self) {
        let sync_loop = self.clone();
        self.inner
            .frame
            .arm(self.inner.frame_interval, move || sync_loop.run_frame());
    }

    fn run_frame(&self) {
        let inner = &self.inner;
        // Activity may have moved between scheduling and execution.
        if !inner.arbiter.is_active(inner.player_id) {
            debug!(
                "SyncLoop: {} lost the active slot before its frame ran",
                inner.player_id
            );
            return;
        }

        // Cinematic mode belongs to the page; another instance may have flipped it.
        let visual_mode = if inner.page.borrow().cinematic() {
            StateValue::CinematicMode
        } else {
            StateValue::NormalMode
        };
        inner.state_machine.set_state(Category::VisualMode, visual_mode);

        let state = inner.state_machine.snapshot();
        let snapshot = {
            let mut transport = inner.transport.borrow_mut();
            let audible = transport.volume() > 0.0;
            if transport.muted() == audible {
                transport.set_muted(!audible);
            }
            TransportSnapshot::read(&*transport)
        };
        inner.session.remember_volume(snapshot.volume);

        let projection = Projection::compute(&state, &snapshot, inner.icon_style);
        inner.surface.borrow_mut().render(&projection);
        inner.projections.set(inner.projections.get() + 1);

        if state.playback == StateValue::Playing {
            self.schedule();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{format_timestamp, percent_of, Glyph, IconStyle, Projection, SyncLoop};
    use crate::config::Config;
    use crate::control_surface::ControlSurface;
    use crate::headless::{HeadlessPage, HeadlessTransport, RecordingSurface};
    use crate::player_arbiter::PlayerId;
    use crate::player_context::PlayerContext;
    use crate::state_machine::{Category, PlaybackState, StateMachine, StateValue};
    use crate::transport::{MediaTransport, TransportSnapshot};
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::time::Duration;
    use tokio::task::LocalSet;
    use tokio::time::sleep;

    struct Fixture {
        context: PlayerContext,
        id: PlayerId,
        machine: Rc<StateMachine>,
        transport: HeadlessTransport,
        surface: RecordingSurface,
        sync_loop: SyncLoop,
    }

    fn fixture() -> Fixture {
        let context = PlayerContext::new(Config::default(), HeadlessPage::default());
        let id = PlayerId::new();
        context.arbiter.register(id);
        context.arbiter.set_active_player(id);
        let machine = Rc::new(StateMachine::default());
        let transport = HeadlessTransport::video(120.0);
        let surface = RecordingSurface::default();
        let transport_handle: Rc<RefCell<dyn MediaTransport>> =
            Rc::new(RefCell::new(transport.clone()));
        let surface_handle: Rc<RefCell<dyn ControlSurface>> =
            Rc::new(RefCell::new(surface.clone()));
        let sync_loop = SyncLoop::new(
            &context,
            id,
            Rc::clone(&machine),
            transport_handle,
            surface_handle,
        );
        Fixture {
            context,
            id,
            machine,
            transport,
            surface,
            sync_loop,
        }
    }

    fn snapshot(current_time: f64, duration: f64) -> TransportSnapshot {
        TransportSnapshot {
            paused: true,
            muted: false,
            volume: 0.5,
            current_time,
            duration,
            buffered_end: Some(60.0),
        }
    }

    #[test]
    fn test_format_timestamp_uses_unpadded_minutes() {
        assert_eq!(format_timestamp(0.0), "0:00");
        assert_eq!(format_timestamp(9.9), "0:09");
        assert_eq!(format_timestamp(75.0), "1:15");
        assert_eq!(format_timestamp(3_599.0), "59:59");
        assert_eq!(format_timestamp(3_600.0), "60:00");
    }

    #[test]
    fn test_percent_of_degrades_to_zero() {
        assert!((percent_of(30.0, 120.0) - 25.0).abs() < 1e-9);
        assert_eq!(percent_of(30.0, f64::NAN), 0.0);
        assert_eq!(percent_of(30.0, 0.0), 0.0);
    }

    #[test]
    fn test_projection_blanks_unknown_times() {
        let projection = Projection::compute(
            &PlaybackState::default(),
            &snapshot(f64::NAN, f64::NAN),
            IconStyle::Text,
        );
        assert_eq!(projection.timestamp, "");
        assert_eq!(projection.duration_text, "00:00");
        let seek_bar = projection.seek_bar.expect("seek bar shown when not seeking");
        assert_eq!(seek_bar.value_percent, 0.0);
        assert_eq!(seek_bar.buffered_percent, 0.0);
    }

    #[test]
    fn test_projection_glyphs_follow_state_and_transport() {
        let mut state = PlaybackState::default();
        state.display = StateValue::Fullscreen;
        state.visual_mode = StateValue::CinematicMode;
        let mut transport = snapshot(30.0, 120.0);
        transport.paused = false;
        transport.muted = true;

        let projection = Projection::compute(&state, &transport, IconStyle::Svg);
        assert_eq!(projection.play_pause, Glyph::Pause);
        assert_eq!(projection.mute, Glyph::Mute);
        assert_eq!(projection.fullscreen, Glyph::FullscreenExit);
        assert_eq!(projection.cinematic, Glyph::CinemaModeActive);
        assert_eq!(
            projection.play_pause.label(projection.icon_style),
            "assets/icons.svg#icon-pause"
        );
        assert_eq!(Glyph::Play.label(IconStyle::Text), "►");
    }

    #[test]
    fn test_projection_hides_seek_bar_while_seeking() {
        let mut state = PlaybackState::default();
        state.seeking = StateValue::Seeking;
        let projection = Projection::compute(&state, &snapshot(30.0, 120.0), IconStyle::Svg);
        assert_eq!(projection.seek_bar, None);
        assert_eq!(projection.timestamp, "0:30");
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn test_requests_in_one_frame_coalesce_and_read_late_values() {
        LocalSet::new()
            .run_until(async {
                let fx = fixture();
                fx.sync_loop.request_update();
                fx.transport.update(|state| state.current_time = 10.0);
                fx.sync_loop.request_update();
                fx.transport.update(|state| state.current_time = 42.0);
                assert!(fx.sync_loop.is_pending());

                sleep(Duration::from_millis(100)).await;
                assert_eq!(fx.surface.render_count(), 1);
                let rendered = fx.surface.last_render().expect("one projection");
                assert_eq!(rendered.timestamp, "0:42");
                assert!(!fx.sync_loop.is_pending());
            })
            .await;
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn test_inactive_instance_never_projects() {
        LocalSet::new()
            .run_until(async {
                let fx = fixture();
                fx.context.arbiter.clear_active_player();
                fx.sync_loop.request_update();
                sleep(Duration::from_millis(100)).await;
                assert_eq!(fx.surface.render_count(), 0);
                assert_eq!(fx.sync_loop.projections_run(), 0);
            })
            .await;
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn test_frame_skipped_when_slot_moves_before_it_runs() {
        LocalSet::new()
            .run_until(async {
                let fx = fixture();
                fx.sync_loop.request_update();
                let other = PlayerId::new();
                fx.context.arbiter.register(other);
                fx.context.arbiter.set_active_player(other);
                sleep(Duration::from_millis(100)).await;
                assert_eq!(fx.surface.render_count(), 0);
                assert!(!fx.context.arbiter.is_active(fx.id));
            })
            .await;
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn test_seek_bar_frozen_across_time_updates_while_seeking() {
        LocalSet::new()
            .run_until(async {
                let fx = fixture();
                fx.machine.set_state(Category::Seeking, StateValue::Seeking);
                for second in [5.0, 6.0, 7.0] {
                    fx.transport.update(|state| state.current_time = second);
                    fx.sync_loop.request_update();
                    sleep(Duration::from_millis(20)).await;
                }
                let record = fx.surface.record();
                assert_eq!(record.renders.len(), 3);
                assert!(record.renders.iter().all(|p| p.seek_bar.is_none()));
                assert_eq!(record.renders[2].timestamp, "0:07");
            })
            .await;
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn test_playing_self_reschedules_until_state_changes() {
        LocalSet::new()
            .run_until(async {
                let fx = fixture();
                fx.machine.set_state(Category::Playback, StateValue::Playing);
                fx.sync_loop.request_update();
                sleep(Duration::from_millis(16 * 5 + 8)).await;
                let while_playing = fx.surface.render_count();
                assert!(while_playing >= 4, "rendered {} frames", while_playing);

                fx.machine.set_state(Category::Playback, StateValue::Paused);
                sleep(Duration::from_millis(100)).await;
                let after_pause = fx.surface.render_count();
                sleep(Duration::from_millis(100)).await;
                assert_eq!(fx.surface.render_count(), after_pause);
                assert!(!fx.sync_loop.is_pending());
            })
            .await;
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn test_frame_reconciles_mute_and_remembers_volume() {
        LocalSet::new()
            .run_until(async {
                let fx = fixture();
                fx.transport.update(|state| {
                    state.volume = 0.7;
                    state.muted = true;
                });
                fx.sync_loop.request_update();
                sleep(Duration::from_millis(20)).await;
                assert!(!fx.transport.state().muted);
                assert_eq!(fx.context.session.remembered_volume(), Some(0.7));
                let rendered = fx.surface.last_render().expect("projection");
                assert_eq!(rendered.mute, Glyph::VolumeUp);
                assert!((rendered.volume_bar - 0.7).abs() < 1e-9);

                fx.transport.update(|state| state.volume = 0.0);
                fx.sync_loop.request_update();
                sleep(Duration::from_millis(20)).await;
                assert!(fx.transport.state().muted);
                assert_eq!(fx.context.session.remembered_volume(), Some(0.7));
            })
            .await;
    }
}
