use anyhow::{bail, Context, Result};
use crossbeam_channel::Receiver;
use parley::audio::{MemoryMicrophone, MemoryPlayer};
use parley::commands::CommandTable;
use parley::integration::{OrchestratorBuilder, SessionConfig, SessionHandle};
use parley::messages::Notification;
use parley::service::EchoConnector;
use parley::utils::Mailbox;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const STEP_TIMEOUT: Duration = Duration::from_secs(10);

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "parley=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Parley session");

    let mut live = false;
    let mut config_path = None;
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--live" => live = true,
            _ => config_path = Some(arg),
        }
    }

    let config = match config_path {
        Some(path) => SessionConfig::load(&path)
            .with_context(|| format!("Failed to load configuration from {}", path))?,
        None => SessionConfig::default(),
    };

    let mailbox = Mailbox::new();
    let builder = OrchestratorBuilder::new()
        .with_config(config.clone())
        .with_connector(EchoConnector::new())
        .with_commands(demo_commands());

    if live {
        run_live(builder, &config, mailbox)
    } else {
        let microphone = MemoryMicrophone::new(Some(mailbox.sender()));
        let player = MemoryPlayer::new(Some(mailbox.sender()));
        let (orchestrator, handle) = builder
            .with_microphone(microphone.clone())
            .with_player(player.clone())
            .build(mailbox)?;
        let worker = orchestrator.start()?;

        run_script(&handle, Some((&microphone, &player)), &config)?;

        handle.shutdown()?;
        let _ = worker.join();
        Ok(())
    }
}

#[cfg(feature = "audio-io")]
fn run_live(builder: OrchestratorBuilder, config: &SessionConfig, mailbox: Mailbox) -> Result<()> {
    use parley::audio::{CpalMicrophone, CpalPlayer};

    let microphone = CpalMicrophone::open(&config.audio, mailbox.sender())?;
    let player = CpalPlayer::open(config, mailbox.sender())?;
    info!(
        "Live audio: {} -> {}",
        microphone.device_name(),
        player.device_name()
    );

    let (orchestrator, handle) = builder
        .with_microphone(microphone)
        .with_player(player)
        .build(mailbox)?;
    let worker = orchestrator.start()?;

    run_script(&handle, None, config)?;

    handle.shutdown()?;
    let _ = worker.join();
    Ok(())
}

#[cfg(not(feature = "audio-io"))]
fn run_live(_builder: OrchestratorBuilder, _config: &SessionConfig, _mailbox: Mailbox) -> Result<()> {
    bail!("Built without the audio-io feature; live audio is unavailable")
}

fn demo_commands() -> CommandTable {
    CommandTable::new().with_command(
        "lights_on",
        &["turn on the lights", "lights on"],
        || {
            info!("Lights switched on");
            Ok(true)
        },
    )
}

/// Walk through a command, a text query, a voice turn and a `say`
fn run_script(
    handle: &SessionHandle,
    memory: Option<(&MemoryMicrophone, &MemoryPlayer)>,
    config: &SessionConfig,
) -> Result<()> {
    let notifications = handle.subscribe();

    handle.authenticate()?;
    wait_for(&notifications, |n| *n == Notification::Ready)?;

    handle.assist(Some("turn on the lights"))?;
    wait_for(&notifications, |n| *n == Notification::Ready)?;

    handle.assist(Some("what's the weather"))?;
    wait_for(&notifications, |n| *n == Notification::Ready)?;

    handle.assist(None)?;
    wait_for(&notifications, |n| *n == Notification::Listening)?;
    if let Some((microphone, player)) = memory {
        // Half a second of silence in 100 ms chunks
        let chunk = vec![0u8; config.audio.sample_rate_in as usize / 5];
        for _ in 0..5 {
            microphone.feed(&chunk);
        }
        wait_for(&notifications, |n| *n == Notification::Ready)?;
        player.finish_playback();
    } else {
        wait_for(&notifications, |n| *n == Notification::Ready)?;
    }

    handle.play_ping()?;
    handle.say("hello", Duration::from_secs(1), false)?;
    wait_for(&notifications, |n| matches!(n, Notification::Response(_)))?;
    wait_for(&notifications, |n| *n == Notification::Ready)?;

    info!("Script finished in state {}", handle.state().state);
    Ok(())
}

/// Print notifications as JSON lines until one matches
fn wait_for<F>(notifications: &Receiver<Notification>, matches: F) -> Result<()>
where
    F: Fn(&Notification) -> bool,
{
    loop {
        let notification = match notifications.recv_timeout(STEP_TIMEOUT) {
            Ok(notification) => notification,
            Err(e) => bail!("Timed out waiting for the session: {}", e),
        };
        println!("{}", serde_json::to_string(&notification)?);
        if matches(&notification) {
            return Ok(());
        }
    }
}
