//! Per-instance playback state store.
//!
//! Every [`Category`] always holds exactly one [`StateValue`] drawn from that
//! category's own vocabulary. Mutations go through [`StateMachine::set_state`]
//! and [`StateMachine::toggle_state`], and every accepted change is pushed to
//! all registered listeners synchronously, in registration order.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::str::FromStr;

use log::warn;

/// State category keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Category {
    Playback,
    Volume,
    Display,
    VisualMode,
    Subtitles,
    Settings,
    Loop,
    Pip,
    Seeking,
}

/// Closed vocabulary shared by all categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StateValue {
    Idle,
    Loading,
    Playing,
    Paused,
    Ended,
    Error,
    Muted,
    Unmuted,
    Fullscreen,
    Windowed,
    CinematicMode,
    NormalMode,
    SubtitlesOn,
    SubtitlesOff,
    SettingsOpen,
    SettingsClosed,
    Looping,
    NotLooping,
    PipEnabled,
    PipDisabled,
    Seeking,
}

impl Category {
    pub const ALL: [Category; 9] = [
        Category::Playback,
        Category::Volume,
        Category::Display,
        Category::VisualMode,
        Category::Subtitles,
        Category::Settings,
        Category::Loop,
        Category::Pip,
        Category::Seeking,
    ];

    /// Legal values for this category.
    pub fn vocabulary(self) -> &'static [StateValue] {
        use StateValue::*;
        match self {
            Category::Playback => &[Idle, Loading, Playing, Paused, Ended, Error],
            Category::Volume => &[Muted, Unmuted],
            Category::Display => &[Fullscreen, Windowed],
            Category::VisualMode => &[CinematicMode, NormalMode],
            Category::Subtitles => &[SubtitlesOn, SubtitlesOff],
            Category::Settings => &[SettingsOpen, SettingsClosed],
            Category::Loop => &[Looping, NotLooping],
            Category::Pip => &[PipEnabled, PipDisabled],
            Category::Seeking => &[Idle, Seeking],
        }
    }

    pub fn accepts(self, value: StateValue) -> bool {
        self.vocabulary().contains(&value)
    }

    pub fn name(self) -> &'static str {
        match self {
            Category::Playback => "playback",
            Category::Volume => "volume",
            Category::Display => "display",
            Category::VisualMode => "visualMode",
            Category::Subtitles => "subtitles",
            Category::Settings => "settings",
            Category::Loop => "loop",
            Category::Pip => "pip",
            Category::Seeking => "seeking",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .iter()
            .copied()
            .find(|category| category.name() == name)
            .ok_or_else(|| format!("unknown state category \"{}\"", name))
    }
}

impl StateValue {
    const ALL: [StateValue; 21] = [
        StateValue::Idle,
        StateValue::Loading,
        StateValue::Playing,
        StateValue::Paused,
        StateValue::Ended,
        StateValue::Error,
        StateValue::Muted,
        StateValue::Unmuted,
        StateValue::Fullscreen,
        StateValue::Windowed,
        StateValue::CinematicMode,
        StateValue::NormalMode,
        StateValue::SubtitlesOn,
        StateValue::SubtitlesOff,
        StateValue::SettingsOpen,
        StateValue::SettingsClosed,
        StateValue::Looping,
        StateValue::NotLooping,
        StateValue::PipEnabled,
        StateValue::PipDisabled,
        StateValue::Seeking,
    ];

    pub fn name(self) -> &'static str {
        match self {
            StateValue::Idle => "idle",
            StateValue::Loading => "loading",
            StateValue::Playing => "playing",
            StateValue::Paused => "paused",
            StateValue::Ended => "ended",
            StateValue::Error => "error",
            StateValue::Muted => "muted",
            StateValue::Unmuted => "unmuted",
            StateValue::Fullscreen => "fullscreen",
            StateValue::Windowed => "windowed",
            StateValue::CinematicMode => "cinematic_mode",
            StateValue::NormalMode => "normal_mode",
            StateValue::SubtitlesOn => "subtitles_on",
            StateValue::SubtitlesOff => "subtitles_off",
            StateValue::SettingsOpen => "settings_open",
            StateValue::SettingsClosed => "settings_closed",
            StateValue::Looping => "looping",
            StateValue::NotLooping => "not_looping",
            StateValue::PipEnabled => "pip_enabled",
            StateValue::PipDisabled => "pip_disabled",
            StateValue::Seeking => "seeking",
        }
    }
}

impl fmt::Display for StateValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for StateValue {
    type Err = String;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        StateValue::ALL
            .iter()
            .copied()
            .find(|value| value.name() == name)
            .ok_or_else(|| format!("unknown state value \"{}\"", name))
    }
}

/// Full snapshot of one instance's state, one value per category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackState {
    pub playback: StateValue,
    pub volume: StateValue,
    pub display: StateValue,
    pub visual_mode: StateValue,
    pub subtitles: StateValue,
    pub settings: StateValue,
    #[serde(rename = "loop")]
    pub looping: StateValue,
    pub pip: StateValue,
    pub seeking: StateValue,
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self {
            playback: StateValue::Idle,
            volume: StateValue::Unmuted,
            display: StateValue::Windowed,
            visual_mode: StateValue::NormalMode,
            subtitles: StateValue::SubtitlesOff,
            settings: StateValue::SettingsClosed,
            looping: StateValue::NotLooping,
            pip: StateValue::PipDisabled,
            seeking: StateValue::Idle,
        }
    }
}

impl PlaybackState {
    pub fn get(&self, category: Category) -> StateValue {
        match category {
            Category::Playback => self.playback,
            Category::Volume => self.volume,
            Category::Display => self.display,
            Category::VisualMode => self.visual_mode,
            Category::Subtitles => self.subtitles,
            Category::Settings => self.settings,
            Category::Loop => self.looping,
            Category::Pip => self.pip,
            Category::Seeking => self.seeking,
        }
    }

    fn slot_mut(&mut self, category: Category) -> &mut StateValue {
        match category {
            Category::Playback => &mut self.playback,
            Category::Volume => &mut self.volume,
            Category::Display => &mut self.display,
            Category::VisualMode => &mut self.visual_mode,
            Category::Subtitles => &mut self.subtitles,
            Category::Settings => &mut self.settings,
            Category::Loop => &mut self.looping,
            Category::Pip => &mut self.pip,
            Category::Seeking => &mut self.seeking,
        }
    }
}

/// Handle returned by [`StateMachine::add_listener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Rc<dyn Fn(Category, StateValue, PlaybackState)>;

/// Validated keyed state store with synchronous change notification.
pub struct StateMachine {
    state: Cell<PlaybackState>,
    listeners: RefCell<Vec<(ListenerId, Listener)>>,
    next_listener_id: Cell<u64>,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new(PlaybackState::default())
    }
}

impl StateMachine {
    pub fn new(initial: PlaybackState) -> Self {
        Self {
            state: Cell::new(initial),
            listeners: RefCell::new(Vec::new()),
            next_listener_id: Cell::new(0),
        }
    }

    /// Sets `category` to `value`. Returns `true` only when the stored value changed.
    pub fn set_state(&self, category: Category, value: StateValue) -> bool {
        if !category.accepts(value) {
            warn!(
                "StateMachine: rejected value \"{}\" for category \"{}\"",
                value, category
            );
            return false;
        }
        self.commit(category, value)
    }

    /// Sets to `second` when the current value is `first`, otherwise to `first`.
    pub fn toggle_state(&self, category: Category, first: StateValue, second: StateValue) -> bool {
        if !category.accepts(first) || !category.accepts(second) {
            warn!(
                "StateMachine: rejected toggle \"{}\"/\"{}\" for category \"{}\"",
                first, second, category
            );
            return false;
        }
        let current = self.get_state(category);
        let next = if current == first { second } else { first };
        self.commit(category, next)
    }

    pub fn get_state(&self, category: Category) -> StateValue {
        self.state.get().get(category)
    }

    pub fn snapshot(&self) -> PlaybackState {
        self.state.get()
    }

    /// String-keyed entry point; unknown names are rejected with a warning.
    pub fn set_state_named(&self, category: &str, value: &str) -> bool {
        let category = match category.parse::<Category>() {
            Ok(category) => category,
            Err(err) => {
                warn!("StateMachine: {}", err);
                return false;
            }
        };
        match value.parse::<StateValue>() {
            Ok(value) => self.set_state(category, value),
            Err(err) => {
                warn!("StateMachine: {} for category \"{}\"", err, category);
                false
            }
        }
    }

    pub fn get_state_named(&self, category: &str) -> Option<StateValue> {
        category
            .parse::<Category>()
            .ok()
            .map(|category| self.get_state(category))
    }

    pub fn add_listener<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(Category, StateValue, PlaybackState) + 'static,
    {
        let id = ListenerId(self.next_listener_id.get());
        self.next_listener_id.set(id.0 + 1);
        self.listeners.borrow_mut().push((id, Rc::new(listener)));
        id
    }

    pub fn remove_listener(&self, id: ListenerId) {
        self.listeners
            .borrow_mut()
            .retain(|(listener_id, _)| *listener_id != id);
    }

    pub fn clear_listeners(&self) {
        self.listeners.borrow_mut().clear();
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.borrow().len()
    }

    fn commit(&self, category: Category, value: StateValue) -> bool {
        let mut state = self.state.get();
        let slot = state.slot_mut(category);
        if *slot == value {
            return false;
        }
        *slot = value;
        self.state.set(state);

        // Listeners may re-enter the machine, so notify from a detached copy.
        let listeners: Vec<Listener> = self
            .listeners
            .borrow()
            .iter()
            .map(|(_, listener)| Rc::clone(listener))
            .collect();
        for listener in listeners {
            listener(category, value, state);
        }
        true
    }
}
