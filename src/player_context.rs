use std::{cell::RefCell, collections::HashMap, rc::Rc};

use log::warn;
use tokio::sync::broadcast;

use crate::{
    config::{sanitize_config, Config},
    control_surface::PageHost,
    player_arbiter::PlayerArbiter,
    protocol::Message,
};

/// Session key of the remembered volume level.
pub(crate) const REMEMBERED_VOLUME_KEY: &str = "playsync.volume";

/// Session-scoped string store shared by every instance.
#[derive(Clone, Default)]
pub struct SessionStore {
    values: Rc<RefCell<HashMap<String, String>>>,
}

impl SessionStore {
    pub fn get(&self, key: &str) -> Option<String> {
        self.values.borrow().get(key).cloned()
    }

    pub fn set(&self, key: &str, value: String) {
        self.values.borrow_mut().insert(key.to_string(), value);
    }

    pub fn remembered_volume(&self) -> Option<f64> {
        let raw = self.get(REMEMBERED_VOLUME_KEY)?;
        match raw.parse::<f64>() {
            Ok(volume) if volume.is_finite() && volume > 0.0 => Some(volume.min(1.0)),
            Ok(_) => None,
            Err(err) => {
                warn!("SessionStore: ignoring unreadable remembered volume {:?}: {}", raw, err);
                None
            }
        }
    }

    /// Remembers `volume` if it is audible.
    pub fn remember_volume(&self, volume: f64) {
        if volume.is_finite() && volume > 0.0 {
            self.set(REMEMBERED_VOLUME_KEY, volume.to_string());
        }
    }
}

/// Shared handles created once per session and cloned into every instance.
#[derive(Clone)]
pub struct PlayerContext {
    pub bus_sender: broadcast::Sender<Message>,
    pub arbiter: Rc<PlayerArbiter>,
    pub session: SessionStore,
    pub page: Rc<RefCell<dyn PageHost>>,
    pub config: Rc<Config>,
}

impl PlayerContext {
    pub fn new<P>(config: Config, page: P) -> Self
    where
        P: PageHost + 'static,
    {
        // broadcast::channel panics on a zero capacity.
        let config = sanitize_config(config);
        let (bus_sender, _) = broadcast::channel(config.bus.capacity);
        let arbiter = Rc::new(PlayerArbiter::new(bus_sender.clone()));
        let page: Rc<RefCell<dyn PageHost>> = Rc::new(RefCell::new(page));
        Self {
            bus_sender,
            arbiter,
            session: SessionStore::default(),
            page,
            config: Rc::new(config),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Message> {
        self.bus_sender.subscribe()
    }
}
