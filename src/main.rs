//! Dentavia Realtime Tap — diagnostic client for the realtime channel.
//!
//! Connects to the platform's realtime endpoints the same way the patient
//! and clinic portals do, prints every event the channel emits, and can
//! send a test chat message. Used to verify deployments and to watch the
//! reconnect/fallback behavior against a live environment.

use std::time::Duration;

use clap::Parser;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

use dentavia_channel::message::ChatPayload;
use dentavia_channel::{
    ChannelBuilder, ChannelEvent, Envelope, InboundEvent, MessageKind, ResilientChannel,
};
use dentavia_core::config::AppConfig;
use dentavia_core::error::AppError;

/// Dentavia Realtime Tap — watch and exercise the realtime channel
#[derive(Debug, Parser)]
#[command(name = "dentavia-tap", version, about, long_about = None)]
struct Cli {
    /// Configuration environment (merges config/default.toml + config/<env>.toml)
    #[arg(short, long, default_value = "development")]
    env: String,

    /// Override the WebSocket endpoint
    #[arg(long)]
    ws_url: Option<String>,

    /// Override the long-poll fallback base URL
    #[arg(long)]
    poll_url: Option<String>,

    /// Connect with this platform user id
    #[arg(long)]
    user_id: Option<i64>,

    /// Connect with this clinic id (implies --clinic)
    #[arg(long)]
    clinic_id: Option<i64>,

    /// Connect as a clinic rather than a patient
    #[arg(long)]
    clinic: bool,

    /// Send a test chat message once (queued until the channel opens)
    #[arg(long)]
    send: Option<String>,

    /// Exit after this many seconds; 0 runs until Ctrl+C
    #[arg(long, default_value_t = 0)]
    duration: u64,

    /// Verbose per-frame and per-transition logging
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match load_configuration(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    init_logging(&config, cli.debug);

    if let Err(e) = run(config, &cli).await {
        error!("Tap error: {}", e);
        std::process::exit(1);
    }
}

/// Load configuration and apply command-line overrides
fn load_configuration(cli: &Cli) -> Result<AppConfig, AppError> {
    let mut config = AppConfig::load(&cli.env)?;

    if let Some(url) = &cli.ws_url {
        config.endpoint.ws_url = url.clone();
    }
    if let Some(url) = &cli.poll_url {
        config.endpoint.poll_url = url.clone();
    }
    if let Some(id) = cli.user_id {
        config.endpoint.user_id = Some(id);
    }
    if let Some(id) = cli.clinic_id {
        config.endpoint.clinic_id = Some(id);
        config.endpoint.is_clinic = true;
    }
    if cli.clinic {
        config.endpoint.is_clinic = true;
    }
    if cli.debug {
        config.channel.debug = true;
    }

    Ok(config)
}

/// Initialize tracing/logging
fn init_logging(config: &AppConfig, debug: bool) {
    let level = if debug { "debug" } else { &config.logging.level };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match config.logging.format.as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .init();
        }
        _ => {
            fmt()
                .pretty()
                .with_env_filter(filter)
                .with_target(true)
                .init();
        }
    }
}

/// Main tap run function
async fn run(config: AppConfig, cli: &Cli) -> Result<(), AppError> {
    info!("Starting Dentavia realtime tap v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "Endpoints: ws={} poll={}",
        config.endpoint.ws_url, config.endpoint.poll_url
    );

    let channel = ChannelBuilder::from_config(&config).build();
    let mut events = channel.events();
    let mut status = channel.watch_status();

    channel.connect();

    if let Some(text) = &cli.send {
        let envelope = Envelope::of(MessageKind::Chat).with_typed_payload(&ChatPayload {
            message: text.clone(),
            thread_id: None,
            attachment_url: None,
        })?;
        channel.send(envelope);
        info!("Queued test chat message");
    }

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    let deadline = async {
        if cli.duration > 0 {
            tokio::time::sleep(Duration::from_secs(cli.duration)).await;
        } else {
            std::future::pending::<()>().await;
        }
    };
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => print_event(&event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Event stream lagged, {} events skipped", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = status.borrow_and_update().clone();
                info!(
                    phase = %snapshot.phase,
                    attempt = snapshot.reconnect_attempt,
                    fallback = snapshot.using_fallback,
                    "Channel state changed"
                );
            }
            _ = &mut deadline => {
                info!("Duration elapsed, shutting down");
                break;
            }
            _ = &mut shutdown => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    shut_down(&channel, &mut status).await;

    let metrics = channel.metrics();
    info!(
        "Session totals: attempts={} opened={} sent={} received={}",
        metrics.attempts, metrics.connections_opened, metrics.frames_sent, metrics.frames_received
    );

    Ok(())
}

/// Print one channel event to the console
fn print_event(event: &ChannelEvent) {
    match event {
        ChannelEvent::Opened { connection_id } => {
            info!(%connection_id, "Channel open");
        }
        ChannelEvent::Message(envelope) => println!("{}", render_message(envelope)),
        ChannelEvent::Closed { reason } => {
            info!(%reason, "Channel closed");
        }
        ChannelEvent::FallbackEngaged => {
            warn!("Fallback transport engaged");
        }
        ChannelEvent::GaveUp { error } => {
            error!(%error, "Channel gave up reconnecting");
        }
        ChannelEvent::Notice(notice) => {
            info!(level = ?notice.level, "{}", notice.message);
        }
    }
}

/// Render an inbound envelope as one console line, decoded when the payload
/// matches its kind's schema and raw JSON otherwise
fn render_message(envelope: &Envelope) -> String {
    match envelope.decode() {
        Ok(event) => describe_inbound(&event),
        Err(_) => serde_json::to_string_pretty(envelope)
            .unwrap_or_else(|_| format!("{:?}", envelope)),
    }
}

fn describe_inbound(event: &InboundEvent) -> String {
    match event {
        InboundEvent::Notification(n) => match &n.category {
            Some(category) => format!("[notification] ({}) {}: {}", category, n.title, n.message),
            None => format!("[notification] {}: {}", n.title, n.message),
        },
        InboundEvent::Chat(c) => match c.thread_id {
            Some(thread) => format!("[chat] thread {}: {}", thread, c.message),
            None => format!("[chat] {}", c.message),
        },
        InboundEvent::Ping { .. } => "[ping] server keepalive".to_string(),
        InboundEvent::Pong { .. } => "[pong] keepalive reply".to_string(),
        InboundEvent::System(s) => match &s.severity {
            Some(severity) => format!("[system] ({}) {}", severity, s.message),
            None => format!("[system] {}", s.message),
        },
        InboundEvent::QuoteUpdate(q) => match (q.total, &q.currency) {
            (Some(total), Some(currency)) => {
                format!("[quote_update] quote {} {} ({} {})", q.quote_id, q.status, total, currency)
            }
            (Some(total), None) => {
                format!("[quote_update] quote {} {} ({})", q.quote_id, q.status, total)
            }
            _ => format!("[quote_update] quote {} {}", q.quote_id, q.status),
        },
        InboundEvent::AppointmentReminder(a) => format!(
            "[appointment_reminder] appointment {} at {} starts at {}",
            a.appointment_id,
            a.clinic_name.as_deref().unwrap_or("your clinic"),
            a.starts_at
        ),
        InboundEvent::TreatmentPlanUpdate(t) => match &t.stage {
            Some(stage) => {
                format!("[treatment_plan_update] plan {} {} (stage {})", t.plan_id, t.status, stage)
            }
            None => format!("[treatment_plan_update] plan {} {}", t.plan_id, t.status),
        },
    }
}

/// Disconnect and wait briefly for the channel to wind down
async fn shut_down(
    channel: &ResilientChannel,
    status: &mut tokio::sync::watch::Receiver<dentavia_channel::ChannelStatus>,
) {
    channel.disconnect();
    let _ = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            if !status.borrow_and_update().is_connected() {
                break;
            }
            if status.changed().await.is_err() {
                break;
            }
        }
    })
    .await;
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
