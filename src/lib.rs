//! Coordination engine for many media-player instances sharing one page.
//!
//! Each attached instance gets its own [`StateMachine`] and [`SyncLoop`], wired
//! together by an [`InputDispatcher`]. All instances share one
//! [`PlayerContext`], whose [`PlayerArbiter`] keeps at most one of them active.
//! Everything runs on a single thread inside a `tokio::task::LocalSet`.

pub mod config;
pub mod control_surface;
pub mod headless;
pub mod input_dispatcher;
pub mod player_arbiter;
pub mod player_context;
pub mod protocol;
pub mod single_flight;
pub mod state_machine;
pub mod sync_loop;
pub mod transport;

pub use config::Config;
pub use control_surface::{ControlSurface, PageHost};
pub use input_dispatcher::InputDispatcher;
pub use player_arbiter::{PlayerArbiter, PlayerId};
pub use player_context::{PlayerContext, SessionStore};
pub use protocol::{InputEvent, Message};
pub use state_machine::{Category, PlaybackState, StateMachine, StateValue};
pub use sync_loop::{Projection, SyncLoop};
pub use transport::{MediaKind, MediaTransport};
