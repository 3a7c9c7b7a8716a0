//! Per-instance input normalization.
//!
//! Every input source (pointer, keyboard, click targets, seek and volume bars,
//! native transport events) enters through [`InputDispatcher::dispatch`] and is
//! turned into state-machine transitions, transport commands and projection
//! requests. User input only acts while the instance holds the active slot;
//! transport events always mirror into the instance's own state.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use log::{debug, info, warn};

use crate::control_surface::ControlSurface;
use crate::player_arbiter::PlayerId;
use crate::player_context::PlayerContext;
use crate::protocol::{
    ClickTarget, InputAction, InputEvent, KeyInput, MediaErrorKind, Message, PlaybackMessage,
    SeekBarInput, TransportEvent,
};
use crate::single_flight::SingleFlight;
use crate::state_machine::{Category, StateMachine, StateValue};
use crate::sync_loop::SyncLoop;
use crate::transport::{MediaKind, MediaTransport};

const LOAD_FAILED_MESSAGE: &str = "An error occurred while loading the media.";
const ABORTED_MESSAGE: &str = "Media playback was aborted.";

/// Rounds to one decimal place.
pub fn round_to_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Volume after one step of `delta`, clamped to `[0, 1]`.
pub fn step_volume(current: f64, delta: f64) -> f64 {
    let base = if current.is_finite() { current } else { 0.0 };
    round_to_tenth((base + delta).clamp(0.0, 1.0))
}

/// Target position for a skip of `offset` seconds.
///
/// Backward skips floor and stop at `min_position`; forward skips ceil and stop
/// at `duration`. Returns `None` when the target cannot be computed.
pub fn skip_target(current: f64, offset: f64, min_position: f64, duration: f64) -> Option<f64> {
    if !current.is_finite() {
        return None;
    }
    if offset < 0.0 {
        Some((current + offset).floor().max(min_position))
    } else if duration.is_finite() {
        Some((current + offset).ceil().min(duration))
    } else {
        None
    }
}

struct DispatcherInner {
    id: PlayerId,
    kind: MediaKind,
    context: PlayerContext,
    state_machine: Rc<StateMachine>,
    sync_loop: SyncLoop,
    transport: Rc<RefCell<dyn MediaTransport>>,
    surface: Rc<RefCell<dyn ControlSurface>>,
    pointer: SingleFlight,
    idle: SingleFlight,
    watchdog: SingleFlight,
    message: RefCell<Option<String>>,
    controls_visible: Cell<bool>,
    play_pause_disabled: Cell<bool>,
    detached: Cell<bool>,
}

/// Wiring of one player instance into the shared context.
///
/// Dropping the dispatcher detaches the instance.
pub struct InputDispatcher {
    inner: Rc<DispatcherInner>,
}

impl InputDispatcher {
    /// Registers a new instance and wires its state machine, sync loop and timers.
    pub fn attach<T, S>(context: &PlayerContext, transport: T, surface: S) -> Self
    where
        T: MediaTransport + 'static,
        S: ControlSurface + 'static,
    {
        let id = PlayerId::new();
        context.arbiter.register(id);

        let kind = transport.kind();
        let state_machine = Rc::new(StateMachine::default());
        if transport.muted() {
            state_machine.set_state(Category::Volume, StateValue::Muted);
        }
        let transport: Rc<RefCell<dyn MediaTransport>> = Rc::new(RefCell::new(transport));
        let surface: Rc<RefCell<dyn ControlSurface>> = Rc::new(RefCell::new(surface));
        let sync_loop = SyncLoop::new(
            context,
            id,
            Rc::clone(&state_machine),
            Rc::clone(&transport),
            Rc::clone(&surface),
        );

        let bus_sender = context.bus_sender.clone();
        let listener_loop = sync_loop.clone();
        state_machine.add_listener(move |category, value, _| {
            let _ = bus_sender.send(Message::Playback(PlaybackMessage::StateChanged {
                player_id: id,
                category,
                value,
            }));
            listener_loop.request_update();
        });

        info!("InputDispatcher: attached {:?} player {}", kind, id);
        Self {
            inner: Rc::new(DispatcherInner {
                id,
                kind,
                context: context.clone(),
                state_machine,
                sync_loop,
                transport,
                surface,
                pointer: SingleFlight::new(),
                idle: SingleFlight::new(),
                watchdog: SingleFlight::new(),
                message: RefCell::new(None),
                controls_visible: Cell::new(true),
                play_pause_disabled: Cell::new(false),
                detached: Cell::new(false),
            }),
        }
    }

    pub fn id(&self) -> PlayerId {
        self.inner.id
    }

    pub fn kind(&self) -> MediaKind {
        self.inner.kind
    }

    pub fn state_machine(&self) -> &StateMachine {
        &self.inner.state_machine
    }

    pub fn sync_loop(&self) -> &SyncLoop {
        &self.inner.sync_loop
    }

    /// Text currently shown in the message region.
    pub fn message(&self) -> Option<String> {
        self.inner.message.borrow().clone()
    }

    pub fn dispatch(&self, event: InputEvent) {
        if self.inner.detached.get() {
            debug!("InputDispatcher: {} is detached, dropping {:?}", self.inner.id, event);
            return;
        }
        self.inner.dispatch(event);
    }

    /// Cancels timers, clears listeners and gives up the active slot.
    pub fn detach(self) {
        drop(self);
    }
}

impl Drop for InputDispatcher {
    fn drop(&mut self) {
        self.inner.teardown();
    }
}

impl DispatcherInner {
    fn dispatch(self: &Rc<Self>, event: InputEvent) {
        match event {
            InputEvent::Focus => self.activate(),
            InputEvent::PointerMove { over_controls } => {
                if self.gate("pointer move") {
                    self.restart_idle();
                    self.debounce_movement(over_controls);
                }
            }
            InputEvent::PointerEnterControls => {
                if self.gate("pointer enter") {
                    self.show_controls();
                    self.idle.cancel();
                }
            }
            InputEvent::PointerLeaveControls => {
                if self.gate("pointer leave") {
                    self.on_movement();
                }
            }
            InputEvent::Click { target } => self.on_click(target),
            InputEvent::Key(key) => self.on_key(key),
            InputEvent::SeekBar(input) => self.on_seek_bar(input),
            InputEvent::VolumeBar { value } => {
                self.activate();
                if !value.is_finite() {
                    warn!("InputDispatcher: ignoring non-finite volume {}", value);
                    return;
                }
                self.apply_volume(value.clamp(0.0, 1.0));
            }
            InputEvent::Transport(event) => self.on_transport(event),
        }
    }

    fn is_active(&self) -> bool {
        self.context.arbiter.is_active(self.id)
    }

    fn gate(&self, what: &str) -> bool {
        let active = self.is_active();
        if !active {
            debug!("InputDispatcher: {} is not active, ignoring {}", self.id, what);
        }
        active
    }

    /// Takes the active slot. A newly active instance owes a projection.
    fn activate(&self) {
        if self.is_active() {
            return;
        }
        if self.context.arbiter.set_active_player(self.id) {
            self.sync_loop.request_update();
        }
    }

    fn uses_idle_hide(&self) -> bool {
        self.kind == MediaKind::Video && self.context.config.controls.hide_idle_controls
    }

    fn debounce_movement(self: &Rc<Self>, over_controls: bool) {
        let weak = Rc::downgrade(self);
        self.pointer.arm(
            self.context.config.timing.pointer_debounce(over_controls),
            move || {
                if let Some(inner) = weak.upgrade() {
                    if inner.is_active() {
                        inner.on_movement();
                    }
                }
            },
        );
    }

    /// Shows the controls and restarts the idle window.
    fn on_movement(self: &Rc<Self>) {
        if !self.uses_idle_hide() {
            return;
        }
        self.show_controls();
        self.restart_idle();
    }

    fn restart_idle(self: &Rc<Self>) {
        if !self.uses_idle_hide() {
            return;
        }
        let weak = Rc::downgrade(self);
        self.idle.arm(self.context.config.timing.idle_hide(), move || {
            if let Some(inner) = weak.upgrade() {
                inner.on_idle();
            }
        });
    }

    fn on_idle(&self) {
        if self.transport.borrow().paused() {
            return;
        }
        if self.controls_visible.replace(false) {
            debug!("InputDispatcher: hiding idle controls of {}", self.id);
            self.surface.borrow_mut().set_controls_visible(false);
        }
    }

    fn show_controls(&self) {
        if !self.controls_visible.replace(true) {
            self.surface.borrow_mut().set_controls_visible(true);
        }
    }

    fn on_click(self: &Rc<Self>, target: ClickTarget) {
        match target {
            ClickTarget::Elsewhere => {
                self.close_settings();
                return;
            }
            ClickTarget::SettingsOverlay => {
                self.idle.cancel();
                return;
            }
            ClickTarget::Container => {
                self.activate();
                self.close_settings();
                return;
            }
            _ => {}
        }

        let Some(action) = InputAction::from_click(target) else {
            return;
        };
        if target == ClickTarget::PlayPause && self.play_pause_disabled.get() {
            debug!("InputDispatcher: play/pause of {} is disabled", self.id);
            return;
        }

        self.activate();
        if target != ClickTarget::Media {
            self.idle.cancel();
        }
        if target != ClickTarget::Settings {
            self.close_settings();
        }
        self.perform(action);
    }

    fn on_key(self: &Rc<Self>, key: KeyInput) {
        if !self.gate("key") || key.from_text_input {
            return;
        }
        if let Some(cause) = self.transport.borrow().error() {
            debug!(
                "InputDispatcher: ignoring key {:?} while {} reports {:?}",
                key.key, self.id, cause
            );
            return;
        }
        self.on_movement();
        if let Some(action) = InputAction::from_key(&key.key) {
            self.perform(action);
        }
    }

    fn on_seek_bar(&self, input: SeekBarInput) {
        match input {
            SeekBarInput::Press => {
                self.activate();
                self.state_machine
                    .set_state(Category::Seeking, StateValue::Seeking);
            }
            SeekBarInput::Input { value } => {
                if !self.gate("seek input") || !value.is_finite() {
                    return;
                }
                let duration = self.transport.borrow().duration();
                if !duration.is_finite() {
                    debug!("InputDispatcher: duration of {} unknown, seek ignored", self.id);
                    return;
                }
                let target = value.clamp(0.0, 100.0) / 100.0 * duration;
                self.transport.borrow_mut().set_current_time(target);
                self.sync_loop.request_update();
            }
            SeekBarInput::Release => {
                self.state_machine
                    .set_state(Category::Seeking, StateValue::Idle);
                self.sync_loop.request_update();
            }
        }
    }

    fn perform(&self, action: InputAction) {
        let step = self.context.config.controls.volume_step;
        let skip = self.context.config.controls.skip_seconds;
        match action {
            InputAction::TogglePlayPause => self.toggle_play_pause(),
            InputAction::ToggleMute => self.toggle_mute(),
            InputAction::ToggleFullscreen => self.toggle_fullscreen(),
            InputAction::ToggleCinematic => self.toggle_cinematic(),
            InputAction::ToggleSettings => self.toggle_settings(),
            InputAction::ToggleSubtitles => self.toggle_subtitles(),
            InputAction::ToggleLoop => self.toggle_loop(),
            InputAction::TogglePip => self.toggle_pip(),
            InputAction::SkipBackward => self.skip(-skip),
            InputAction::SkipForward => self.skip(skip),
            InputAction::VolumeUp => self.step_volume(step),
            InputAction::VolumeDown => self.step_volume(-step),
        }
    }

    fn toggle_play_pause(&self) {
        let should_play = {
            let transport = self.transport.borrow();
            transport.paused() || transport.ended()
        };
        if should_play {
            self.transport.borrow_mut().play();
            self.state_machine
                .set_state(Category::Playback, StateValue::Playing);
        } else {
            self.transport.borrow_mut().pause();
            self.state_machine
                .set_state(Category::Playback, StateValue::Paused);
        }
    }

    fn toggle_mute(&self) {
        let (muted, volume) = {
            let transport = self.transport.borrow();
            (transport.muted(), transport.volume())
        };
        if muted || volume <= 0.0 {
            let restored = self
                .context
                .session
                .remembered_volume()
                .unwrap_or(self.context.config.controls.fallback_unmute_volume);
            {
                let mut transport = self.transport.borrow_mut();
                transport.set_volume(restored);
                transport.set_muted(false);
            }
            self.state_machine
                .set_state(Category::Volume, StateValue::Unmuted);
        } else {
            self.context.session.remember_volume(volume);
            {
                let mut transport = self.transport.borrow_mut();
                transport.set_volume(0.0);
                transport.set_muted(true);
            }
            self.state_machine
                .set_state(Category::Volume, StateValue::Muted);
        }
        self.sync_loop.request_update();
    }

    fn toggle_fullscreen(&self) {
        let is_fullscreen = self.context.page.borrow().fullscreen_player() == Some(self.id);
        if is_fullscreen {
            let result = self.context.page.borrow_mut().exit_fullscreen();
            match result {
                Ok(()) => {
                    self.state_machine
                        .set_state(Category::Display, StateValue::Windowed);
                    self.surface.borrow_mut().scroll_into_view();
                }
                Err(err) => warn!("InputDispatcher: failed to exit fullscreen: {}", err),
            }
        } else {
            let result = self.context.page.borrow_mut().request_fullscreen(self.id);
            match result {
                Ok(()) => {
                    self.idle.cancel();
                    self.state_machine
                        .set_state(Category::Display, StateValue::Fullscreen);
                }
                Err(err) => warn!("InputDispatcher: failed to enter fullscreen: {}", err),
            }
        }
    }

    fn toggle_cinematic(&self) {
        let enabled = {
            let mut page = self.context.page.borrow_mut();
            let enabled = !page.cinematic();
            page.set_cinematic(enabled);
            enabled
        };
        let value = if enabled {
            StateValue::CinematicMode
        } else {
            StateValue::NormalMode
        };
        self.state_machine.set_state(Category::VisualMode, value);
    }

    fn toggle_settings(&self) {
        if self.kind == MediaKind::Audio || !self.context.config.controls.use_settings {
            debug!("InputDispatcher: {} has no settings overlay", self.id);
            return;
        }
        self.state_machine.toggle_state(
            Category::Settings,
            StateValue::SettingsClosed,
            StateValue::SettingsOpen,
        );
        let open = self.state_machine.get_state(Category::Settings) == StateValue::SettingsOpen;
        self.surface.borrow_mut().set_settings_open(open);
    }

    fn close_settings(&self) {
        if self
            .state_machine
            .set_state(Category::Settings, StateValue::SettingsClosed)
        {
            self.surface.borrow_mut().set_settings_open(false);
        }
    }

    fn toggle_subtitles(&self) {
        if !self.context.config.controls.use_subtitles {
            return;
        }
        if !self.transport.borrow().has_caption_track() {
            warn!("InputDispatcher: {} has no caption track", self.id);
            return;
        }
        self.state_machine.toggle_state(
            Category::Subtitles,
            StateValue::SubtitlesOff,
            StateValue::SubtitlesOn,
        );
        let visible = self.state_machine.get_state(Category::Subtitles) == StateValue::SubtitlesOn;
        self.surface.borrow_mut().set_subtitles_visible(visible);
    }

    fn toggle_loop(&self) {
        self.state_machine
            .toggle_state(Category::Loop, StateValue::NotLooping, StateValue::Looping);
        let looping = self.state_machine.get_state(Category::Loop) == StateValue::Looping;
        self.transport.borrow_mut().set_looping(looping);
    }

    fn toggle_pip(&self) {
        let (supported, current) = {
            let page = self.context.page.borrow();
            (page.pip_supported(), page.pip_player())
        };
        if !supported {
            warn!("InputDispatcher: picture-in-picture is not supported");
            return;
        }
        if current == Some(self.id) {
            let result = self.context.page.borrow_mut().exit_pip();
            match result {
                Ok(()) => {
                    self.state_machine
                        .set_state(Category::Pip, StateValue::PipDisabled);
                }
                Err(err) => warn!("InputDispatcher: failed to exit picture-in-picture: {}", err),
            }
        } else {
            let result = self.context.page.borrow_mut().request_pip(self.id);
            match result {
                Ok(()) => {
                    self.state_machine
                        .set_state(Category::Pip, StateValue::PipEnabled);
                }
                Err(err) => warn!("InputDispatcher: failed to enter picture-in-picture: {}", err),
            }
        }
    }

    fn skip(&self, offset: f64) {
        let (current, min_position, duration) = {
            let transport = self.transport.borrow();
            (
                transport.current_time(),
                transport.min_position(),
                transport.duration(),
            )
        };
        match skip_target(current, offset, min_position, duration) {
            Some(target) => {
                self.transport.borrow_mut().set_current_time(target);
                self.sync_loop.request_update();
            }
            None => warn!(
                "InputDispatcher: cannot skip {}s from {} (duration {})",
                offset, current, duration
            ),
        }
    }

    fn step_volume(&self, delta: f64) {
        let current = self.transport.borrow().volume();
        self.apply_volume(step_volume(current, delta));
    }

    fn apply_volume(&self, volume: f64) {
        let muted = volume <= 0.0;
        {
            let mut transport = self.transport.borrow_mut();
            transport.set_volume(volume);
            transport.set_muted(muted);
        }
        self.context.session.remember_volume(volume);
        let value = if muted {
            StateValue::Muted
        } else {
            StateValue::Unmuted
        };
        self.state_machine.set_state(Category::Volume, value);
        self.sync_loop.request_update();
    }

    fn on_transport(self: &Rc<Self>, event: TransportEvent) {
        if event.is_recovery() {
            self.on_recovered();
        }
        match event {
            TransportEvent::Playing => {
                self.activate();
                self.state_machine
                    .set_state(Category::Playback, StateValue::Playing);
            }
            TransportEvent::Pause => {
                self.state_machine
                    .set_state(Category::Playback, StateValue::Paused);
                self.show_controls();
            }
            TransportEvent::Ended => {
                self.state_machine
                    .set_state(Category::Playback, StateValue::Ended);
                self.show_controls();
                self.context.arbiter.release_active_player(self.id);
            }
            TransportEvent::Waiting => {
                self.state_machine
                    .set_state(Category::Playback, StateValue::Loading);
                self.show_loading();
                self.arm_watchdog();
            }
            TransportEvent::Stalled | TransportEvent::LoadStart => self.show_loading(),
            TransportEvent::LoadedMetadata
            | TransportEvent::LoadedData
            | TransportEvent::CanPlay
            | TransportEvent::TimeUpdate
            | TransportEvent::Progress => self.sync_loop.request_update(),
            TransportEvent::VolumeChange => {
                let muted = self.transport.borrow().muted();
                let value = if muted {
                    StateValue::Muted
                } else {
                    StateValue::Unmuted
                };
                self.state_machine.set_state(Category::Volume, value);
                self.sync_loop.request_update();
            }
            TransportEvent::FullscreenChange { active } => {
                let ours = self.context.page.borrow().fullscreen_player() == Some(self.id);
                if active && ours {
                    self.state_machine
                        .set_state(Category::Display, StateValue::Fullscreen);
                } else if !active
                    && self
                        .state_machine
                        .set_state(Category::Display, StateValue::Windowed)
                {
                    self.surface.borrow_mut().scroll_into_view();
                }
                self.sync_loop.request_update();
            }
            TransportEvent::Error { cause } => {
                warn!(
                    "InputDispatcher: {} failed: {}",
                    self.id,
                    cause.description()
                );
                self.show_message(LOAD_FAILED_MESSAGE);
                self.state_machine
                    .set_state(Category::Playback, StateValue::Error);
                self.publish_failure(Some(cause));
            }
            TransportEvent::Abort => self.show_message(ABORTED_MESSAGE),
            TransportEvent::Emptied => self.transport.borrow_mut().pause(),
            TransportEvent::Encrypted => warn!("InputDispatcher: media of {} is encrypted", self.id),
        }
    }

    fn show_loading(&self) {
        if self.message.borrow().is_none() {
            self.surface.borrow_mut().set_loading_visible(true);
        }
    }

    fn show_message(&self, message: &str) {
        *self.message.borrow_mut() = Some(message.to_string());
        let mut surface = self.surface.borrow_mut();
        surface.set_loading_visible(false);
        surface.set_message(Some(message));
    }

    fn publish_failure(&self, cause: Option<MediaErrorKind>) {
        let _ = self
            .context
            .bus_sender
            .send(Message::Playback(PlaybackMessage::PlaybackFailed {
                player_id: self.id,
                cause,
            }));
    }

    fn arm_watchdog(self: &Rc<Self>) {
        let weak = Rc::downgrade(self);
        self.watchdog.arm(self.context.config.timing.stall_timeout(), move || {
            if let Some(inner) = weak.upgrade() {
                inner.on_stall_timeout();
            }
        });
    }

    fn on_stall_timeout(&self) {
        warn!(
            "InputDispatcher: {} did not recover within {:?}",
            self.id,
            self.context.config.timing.stall_timeout()
        );
        self.show_message(LOAD_FAILED_MESSAGE);
        if !self.play_pause_disabled.replace(true) {
            self.surface.borrow_mut().set_play_pause_enabled(false);
        }
        self.state_machine
            .set_state(Category::Playback, StateValue::Error);
        self.publish_failure(None);
        self.context.arbiter.release_active_player(self.id);
    }

    fn on_recovered(&self) {
        self.watchdog.cancel();
        let had_message = self.message.borrow_mut().take().is_some();
        {
            let mut surface = self.surface.borrow_mut();
            surface.set_loading_visible(false);
            if had_message {
                surface.set_message(None);
            }
            if self.play_pause_disabled.replace(false) {
                surface.set_play_pause_enabled(true);
            }
        }
        let playback = self.state_machine.get_state(Category::Playback);
        if matches!(playback, StateValue::Loading | StateValue::Error) {
            let value = if self.transport.borrow().paused() {
                StateValue::Paused
            } else {
                StateValue::Playing
            };
            self.state_machine.set_state(Category::Playback, value);
        }
    }

    fn teardown(&self) {
        if self.detached.replace(true) {
            return;
        }
        self.pointer.cancel();
        self.idle.cancel();
        self.watchdog.cancel();
        self.sync_loop.cancel();
        self.state_machine.clear_listeners();
        self.context.arbiter.unregister(self.id);
        info!("InputDispatcher: detached player {}", self.id);
    }
}
