use std::time::{Duration, Instant};

use canvas::animate::Target;
use clap::{Args, Parser, Subcommand};
use client::{ClientConfig, ClientError, ClientHandle, SyncEvent, connect};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error("entity `{0}` not found or not selectable")]
    NotSelectable(String),
    #[error("entity `{0}` not found or controlled elsewhere")]
    NotAnimatable(String),
    #[error("reply channel dropped")]
    NoReply,
}

#[derive(Parser, Debug)]
#[command(name = "frontseat-client", about = "FrontSeat diagram sync client")]
struct Cli {
    #[arg(long, env = "FRONTSEAT_URL", default_value = "ws://127.0.0.1:3000/ws")]
    url: String,

    #[arg(long, env = "FRONTSEAT_DIAGRAM", default_value = "1")]
    diagram: String,

    /// Coalescing window for outbound updates, in milliseconds.
    #[arg(long, default_value_t = 250)]
    window_ms: u64,

    /// Request reply timeout, in milliseconds.
    #[arg(long, default_value_t = 10_000)]
    timeout_ms: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Subscribe and log every change until interrupted.
    Watch,
    /// Drag one entity continuously and report how many updates were sent.
    Drag(DragArgs),
    /// Animate one entity to a stage position and report the updates sent.
    Glide(GlideArgs),
}

#[derive(Args, Debug)]
struct DragArgs {
    #[arg(long)]
    id: String,

    #[arg(long, default_value_t = 1000)]
    duration_ms: u64,

    #[arg(long, default_value_t = 60)]
    events: u32,

    /// Total stage-space displacement along x.
    #[arg(long, default_value_t = 1.0)]
    dx: f64,

    /// Total stage-space displacement along y.
    #[arg(long, default_value_t = 0.0)]
    dy: f64,
}

#[derive(Args, Debug)]
struct GlideArgs {
    #[arg(long)]
    id: String,

    #[arg(long)]
    x: f64,

    #[arg(long)]
    y: f64,

    /// Final angle in radians; the current angle is kept when omitted.
    #[arg(long)]
    angle: Option<f64>,

    #[arg(long, default_value_t = 1000)]
    duration_ms: u64,
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = ClientConfig {
        coalesce_window: Duration::from_millis(cli.window_ms),
        request_timeout: Duration::from_millis(cli.timeout_ms),
    };

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let (handle, driver) = connect(&cli.url, config, events_tx).await?;
    subscribe(&handle, &cli.diagram).await?;

    let outcome = match cli.command {
        Command::Watch => watch(events_rx).await,
        Command::Drag(args) => drag(&handle, args, config.coalesce_window).await,
        Command::Glide(args) => glide(&handle, args, config.coalesce_window).await,
    };

    drop(handle);
    match driver.await {
        Ok(Err(e)) => warn!(error = %e, "connection ended with error"),
        Err(e) => warn!(error = %e, "connection task failed"),
        Ok(Ok(())) => {}
    }
    outcome
}

async fn subscribe(handle: &ClientHandle, diagram_id: &str) -> Result<(), CliError> {
    let diagram = diagram_id.to_owned();
    let reply = handle.call(move |c| c.subscribe_at(&diagram, Instant::now())).await??;
    reply.await.map_err(|_| CliError::NoReply)??;
    let count = handle.call(|c| c.engine.store.len()).await?;
    info!(%diagram_id, count, "subscribed");
    Ok(())
}

async fn watch(mut events: mpsc::UnboundedReceiver<SyncEvent>) -> Result<(), CliError> {
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(SyncEvent::Closed) | None => {
                    info!("connection closed");
                    return Ok(());
                }
                Some(event) => info!(?event, "change"),
            },
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    warn!(error = %e, "ctrl-c handler failed");
                }
                return Ok(());
            }
        }
    }
}

async fn drag(handle: &ClientHandle, args: DragArgs, window: Duration) -> Result<(), CliError> {
    let id = args.id.clone();
    if !handle.call(move |c| c.engine.select(&id)).await? {
        return Err(CliError::NotSelectable(args.id));
    }

    let events = args.events.max(1);
    let tick = (Duration::from_millis(args.duration_ms) / events).max(Duration::from_millis(1));
    let step_x = args.dx / f64::from(events);
    let step_y = args.dy / f64::from(events);
    let start = handle.call(|c| c.stats()).await?;

    let mut interval = tokio::time::interval(tick);
    for _ in 0..events {
        interval.tick().await;
        handle
            .call(move |c| {
                let actions = c.engine.drag_selection(step_x, step_y);
                c.apply_actions_at(actions, Instant::now());
            })
            .await?;
    }

    // Let the trailing window flush.
    tokio::time::sleep(window * 2).await;
    let id = args.id.clone();
    let (stats, pos) = handle
        .call(move |c| {
            let pos = c.engine.entity(&id).map(|e| (e.record.pos_x, e.record.pos_y));
            (c.stats(), pos)
        })
        .await?;

    info!(
        id = %args.id,
        events,
        updates = stats.updates - start.updates,
        dropped = stats.dropped - start.dropped,
        ?pos,
        "drag complete"
    );
    Ok(())
}

async fn glide(handle: &ClientHandle, args: GlideArgs, window: Duration) -> Result<(), CliError> {
    let id = args.id.clone();
    let target = Target { pos_x: args.x, pos_y: args.y, angle: args.angle };
    let duration = Duration::from_millis(args.duration_ms);
    let start = handle.call(|c| c.stats()).await?;

    if !handle
        .call(move |c| c.animate_entity_at(&id, target, duration, Instant::now()))
        .await?
    {
        return Err(CliError::NotAnimatable(args.id));
    }

    tokio::time::sleep(duration + window * 2).await;
    let id = args.id.clone();
    let (stats, pos) = handle
        .call(move |c| {
            let pos = c.engine.entity(&id).map(|e| (e.record.pos_x, e.record.pos_y, e.record.angle));
            (c.stats(), pos)
        })
        .await?;

    info!(
        id = %args.id,
        updates = stats.updates - start.updates,
        ?pos,
        "glide complete"
    );
    Ok(())
}
