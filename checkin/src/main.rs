//! `rollcall-scan`: console harness for the check-in scanner.
//!
//! Each stdin line is treated as a decoded QR frame. Lines starting with `:`
//! are commands:
//!
//! - `:torch` toggles the torch
//! - `:again` answers the current prompt with Try Again
//! - `:done` answers the current prompt with Close
//! - `:quit` closes the scanner
//!
//! Set `ROLLCALL_OFFLINE=1` to use the in-memory backend seeded from
//! `ROLLCALL_OFFLINE_EVENTS`.

use anyhow::Context;
use rollcall_checkin::{
    CheckInService, Config, DecodeEvent, Dispatcher, HttpCheckInService, InMemoryCheckInService,
    LogHaptics, PromptResponse, ScannerAction, ScannerEnvironment, ScannerPhase, ScannerReducer,
    ScannerState, ScriptedCamera,
};
use rollcall_core::environment::SystemClock;
use rollcall_runtime::Store;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

type ScannerStore = Store<ScannerState, ScannerAction, ScannerEnvironment, ScannerReducer>;

const OPEN_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine.
    let _ = dotenvy::dotenv();

    let config = Config::from_env().context("invalid configuration")?;
    init_tracing(config.cli.log_filter.as_deref());
    rollcall_checkin::metrics::describe_metrics();

    let user_id = config
        .cli
        .user_id
        .clone()
        .context("ROLLCALL_USER_ID is required")?;

    let service: Arc<dyn CheckInService> = match &config.backend {
        Some(backend) => {
            tracing::info!(url = %backend.base_url, function = %backend.checkin_function, "Using HTTP backend");
            Arc::new(HttpCheckInService::from_config(backend)?)
        },
        None => {
            tracing::info!(events = config.cli.offline_events.len(), "Using offline backend");
            Arc::new(InMemoryCheckInService::with_events(
                config.cli.offline_events.iter().cloned(),
            ))
        },
    };

    let dispatcher = Dispatcher::new(
        service,
        Arc::new(SystemClock),
        config.scanner.payload_format(),
    );
    let env = ScannerEnvironment::new(
        dispatcher,
        Arc::new(ScriptedCamera::granted()),
        Arc::new(LogHaptics),
    )
    .with_cooldown(config.scanner.cooldown);

    let store = Store::new(ScannerState::new(), ScannerReducer::new(), env);

    store
        .send_and_wait_for(
            ScannerAction::Open { user_id },
            |a| {
                matches!(
                    a,
                    ScannerAction::CameraStarted | ScannerAction::CameraFailed { .. }
                )
            },
            OPEN_TIMEOUT,
        )
        .await
        .context("scanner did not start")?;

    println!("Scanner ready. Paste QR payloads, one per line (:torch, :again, :done, :quit).");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let action = match line.trim() {
            ":quit" => break,
            ":torch" => ScannerAction::ToggleTorch,
            ":again" => ScannerAction::RespondToPrompt(PromptResponse::TryAgain),
            ":done" => ScannerAction::RespondToPrompt(PromptResponse::Close),
            _ => ScannerAction::FrameDecoded(DecodeEvent::qr(line.clone())),
        };

        let mut handle = store.send(action).await?;
        handle.wait().await;

        if report(&store).await == ScannerPhase::Closed {
            break;
        }
    }

    let mut handle = store.send(ScannerAction::Close).await?;
    handle.wait().await;
    store.close();

    let dispatched = store.state(|s| s.dispatched).await;
    tracing::info!(dispatched, "Scanner session ended");
    Ok(())
}

/// Print what the member would see and return the phase
async fn report(store: &ScannerStore) -> ScannerPhase {
    let (phase, prompt, rejection, torch_on) = store
        .state(|s| {
            (
                s.phase.clone(),
                s.prompt.clone(),
                s.last_rejection.clone(),
                s.torch_on,
            )
        })
        .await;

    match (&phase, prompt) {
        (_, Some(prompt)) => {
            let buttons: Vec<&str> = prompt.actions.iter().map(|a| a.label.as_str()).collect();
            println!("[{}] {} ({})", prompt.title, prompt.message, buttons.join(" / "));
        },
        (ScannerPhase::Scanning, None) => match rejection {
            Some(rejection) => println!("ignored: {rejection}"),
            None => println!("scanning (torch {})", if torch_on { "on" } else { "off" }),
        },
        (phase, None) => println!("{phase:?}"),
    }

    phase
}

fn init_tracing(filter: Option<&str>) {
    let filter = filter.map_or_else(
        || {
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rollcall_checkin=info,rollcall_runtime=info".into())
        },
        tracing_subscriber::EnvFilter::new,
    );

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
