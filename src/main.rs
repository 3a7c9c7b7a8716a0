use std::path::Path;
use std::time::Duration;

use log::{debug, info, warn};
use playsync::config::{load_config, write_default_config};
use playsync::headless::{HeadlessPage, HeadlessTransport, RecordingSurface};
use playsync::protocol::{ClickTarget, InputEvent, KeyInput, TransportEvent};
use playsync::{Config, InputDispatcher, Message, PlayerContext};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::LocalSet;

/// One line of a replay script.
#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
enum ScriptStep {
    Input { player: usize, event: InputEvent },
    Wait { ms: u64 },
    SetPosition { player: usize, seconds: f64 },
    SetDuration { player: usize, seconds: f64 },
    SetBuffered { player: usize, seconds: Option<f64> },
}

struct ScriptedPlayer {
    name: &'static str,
    dispatcher: InputDispatcher,
    transport: HeadlessTransport,
}

impl ScriptedPlayer {
    fn attach(context: &PlayerContext, name: &'static str, transport: HeadlessTransport) -> Self {
        let dispatcher =
            InputDispatcher::attach(context, transport.clone(), RecordingSurface::named(name));
        Self {
            name,
            dispatcher,
            transport,
        }
    }
}

fn load_script(path: &Path) -> Result<Vec<ScriptStep>, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|err| format!("failed to read script {}: {}", path.display(), err))?;
    parse_script(&content).map_err(|err| format!("invalid script {}: {}", path.display(), err))
}

fn parse_script(content: &str) -> Result<Vec<ScriptStep>, serde_json::Error> {
    serde_json::from_str(content)
}

fn input(player: usize, event: InputEvent) -> ScriptStep {
    ScriptStep::Input { player, event }
}

fn click(player: usize, target: ClickTarget) -> ScriptStep {
    input(player, InputEvent::Click { target })
}

fn key(player: usize, name: &str) -> ScriptStep {
    input(player, InputEvent::Key(KeyInput::new(name)))
}

fn transport(player: usize, event: TransportEvent) -> ScriptStep {
    input(player, InputEvent::Transport(event))
}

fn wait(ms: u64) -> ScriptStep {
    ScriptStep::Wait { ms }
}

/// Two players: a video that starts, gets muted and buffers, then an audio
/// player that takes over the active slot.
fn builtin_scenario() -> Vec<ScriptStep> {
    vec![
        input(0, InputEvent::Focus),
        transport(0, TransportEvent::LoadedMetadata),
        click(0, ClickTarget::Media),
        transport(0, TransportEvent::Playing),
        wait(120),
        ScriptStep::SetPosition {
            player: 0,
            seconds: 42.5,
        },
        ScriptStep::SetBuffered {
            player: 0,
            seconds: Some(90.0),
        },
        transport(0, TransportEvent::TimeUpdate),
        input(0, InputEvent::PointerMove {
            over_controls: false,
        }),
        wait(200),
        key(0, "m"),
        wait(50),
        key(0, "ArrowUp"),
        key(0, "ArrowRight"),
        wait(50),
        transport(0, TransportEvent::Waiting),
        wait(300),
        transport(0, TransportEvent::CanPlay),
        click(0, ClickTarget::Settings),
        click(0, ClickTarget::Elsewhere),
        ScriptStep::SetDuration {
            player: 1,
            seconds: 212.0,
        },
        click(1, ClickTarget::PlayPause),
        transport(1, TransportEvent::Playing),
        wait(100),
        key(0, "m"),
        key(1, "ArrowDown"),
        wait(100),
        transport(1, TransportEvent::Ended),
        wait(50),
    ]
}

fn spawn_bus_logger(mut receiver: broadcast::Receiver<Message>) -> tokio::task::JoinHandle<()> {
    tokio::task::spawn_local(async move {
        loop {
            match receiver.recv().await {
                Ok(message) => info!("Bus: {:?}", message),
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Bus logger lagged, skipped {} message(s)", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

fn player_at(players: &[ScriptedPlayer], index: usize) -> Option<&ScriptedPlayer> {
    let player = players.get(index);
    if player.is_none() {
        warn!("Script: no player at index {}", index);
    }
    player
}

async fn run_step(players: &[ScriptedPlayer], step: ScriptStep) {
    match step {
        ScriptStep::Input { player, event } => {
            if let Some(player) = player_at(players, player) {
                debug!("Script: {} <- {:?}", player.name, event);
                player.dispatcher.dispatch(event);
            }
        }
        ScriptStep::Wait { ms } => tokio::time::sleep(Duration::from_millis(ms)).await,
        ScriptStep::SetPosition { player, seconds } => {
            if let Some(player) = player_at(players, player) {
                player.transport.update(|state| state.current_time = seconds);
            }
        }
        ScriptStep::SetDuration { player, seconds } => {
            if let Some(player) = player_at(players, player) {
                player.transport.update(|state| state.duration = seconds);
            }
        }
        ScriptStep::SetBuffered { player, seconds } => {
            if let Some(player) = player_at(players, player) {
                player.transport.update(|state| state.buffered_end = seconds);
            }
        }
    }
}

async fn run_session(config: Config, steps: Vec<ScriptStep>) {
    let context = PlayerContext::new(config, HeadlessPage::with_pip());
    let bus_logger = spawn_bus_logger(context.subscribe());

    let players = vec![
        ScriptedPlayer::attach(&context, "video-0", HeadlessTransport::video(596.0)),
        ScriptedPlayer::attach(&context, "audio-1", HeadlessTransport::audio(f64::NAN)),
    ];

    info!("Replaying {} script step(s)", steps.len());
    for step in steps {
        run_step(&players, step).await;
    }

    for player in players {
        player.dispatcher.detach();
    }
    // Let the logger drain what detaching published.
    tokio::time::sleep(Duration::from_millis(10)).await;
    bus_logger.abort();
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut clog = colog::default_builder();
    clog.filter(None, log::LevelFilter::Debug);
    clog.init();

    std::panic::set_hook(Box::new(|panic_info| {
        let current_thread = std::thread::current();
        let thread_name = current_thread.name().unwrap_or("unnamed");
        log::error!("panic in thread '{}': {}", thread_name, panic_info);
    }));

    let config_dir = dirs::config_dir().ok_or("could not determine the config directory")?;
    let config_file = config_dir.join("playsync.toml");
    if !config_file.exists() {
        info!(
            "Config file not found. Creating default config. path={}",
            config_file.display()
        );
        if let Err(err) = write_default_config(&config_file) {
            log::error!("Failed to write default config: {}", err);
        }
    }
    let config = match load_config(&config_file) {
        Ok(config) => config,
        Err(err) => {
            log::error!("{}. Using default config", err);
            Config::default()
        }
    };

    let steps = match std::env::args().nth(1) {
        Some(path) => load_script(Path::new(&path))?,
        None => builtin_scenario(),
    };

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()?;
    LocalSet::new().block_on(&runtime, run_session(config, steps));
    Ok(())
}
