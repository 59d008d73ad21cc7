//! Socket driver for [`SyncClient`].
//!
//! One task owns the WebSocket and the client. It multiplexes four sources in
//! a `tokio::select!` loop: inbound socket messages, the client's outbox,
//! commands from [`ClientHandle`]s, and the client's next timer deadline.
//! Because every mutation happens on that task, the client needs no locking.

use std::time::Instant;

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::sleep_until;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, info, warn};

use crate::sync::{SyncClient, SyncEvent};
use crate::{ClientConfig, ClientError};

type Command = Box<dyn FnOnce(&mut SyncClient) + Send>;

/// Cloneable handle for running closures against the driven client.
#[derive(Clone)]
pub struct ClientHandle {
    commands: mpsc::UnboundedSender<Command>,
}

impl std::fmt::Debug for ClientHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientHandle").finish_non_exhaustive()
    }
}

impl ClientHandle {
    /// Run `f` on the driver task and return its result.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Closed`] once the driver has exited.
    pub async fn call<R, F>(&self, f: F) -> Result<R, ClientError>
    where
        R: Send + 'static,
        F: FnOnce(&mut SyncClient) -> R + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let command: Command = Box::new(move |client| {
            if tx.send(f(client)).is_err() {
                debug!("caller dropped before command result");
            }
        });
        self.commands.send(command).map_err(|_| ClientError::Closed)?;
        rx.await.map_err(|_| ClientError::Closed)
    }
}

/// Connect to `url` and spawn the driver task.
///
/// `events` receives every [`SyncEvent`], ending with `Closed`. The join
/// handle resolves when the socket closes or every handle is dropped.
///
/// # Errors
///
/// Returns [`ClientError::WebSocket`] if the handshake fails.
pub async fn connect(
    url: &str,
    config: ClientConfig,
    events: mpsc::UnboundedSender<SyncEvent>,
) -> Result<(ClientHandle, JoinHandle<Result<(), ClientError>>), ClientError> {
    let mut client = SyncClient::new(config);
    client.set_event_sink(events);
    client.set_connecting();

    let (stream, _) = connect_async(url).await?;
    info!(%url, "connected");

    let (outbox_tx, outbox_rx) = mpsc::unbounded_channel();
    client.set_open(outbox_tx);

    let (commands_tx, commands_rx) = mpsc::unbounded_channel();
    let task = tokio::spawn(drive(stream, client, outbox_rx, commands_rx));
    Ok((ClientHandle { commands: commands_tx }, task))
}

async fn drive<S>(
    stream: S,
    mut client: SyncClient,
    mut outbox: mpsc::UnboundedReceiver<String>,
    mut commands: mpsc::UnboundedReceiver<Command>,
) -> Result<(), ClientError>
where
    S: Stream<Item = Result<Message, WsError>> + Sink<Message, Error = WsError> + Unpin,
{
    let (mut ws_tx, mut ws_rx) = stream.split();

    let result = loop {
        // Without a deadline the timer arm is disabled.
        let deadline = client.next_deadline();
        let timer = sleep_until(deadline.unwrap_or_else(Instant::now).into());

        tokio::select! {
            msg = ws_rx.next() => match msg {
                Some(Ok(Message::Text(text))) => client.handle_text(&text),
                Some(Ok(Message::Close(_))) | None => {
                    info!("server closed connection");
                    break Ok(());
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(error = %e, "websocket read failed");
                    break Err(ClientError::from(e));
                }
            },
            Some(text) = outbox.recv() => {
                if let Err(e) = ws_tx.send(Message::Text(text.into())).await {
                    warn!(error = %e, "websocket write failed");
                    break Err(ClientError::from(e));
                }
            }
            command = commands.recv() => match command {
                Some(command) => command(&mut client),
                None => {
                    debug!("all handles dropped; closing");
                    if let Err(e) = ws_tx.send(Message::Close(None)).await {
                        debug!(error = %e, "close frame not sent");
                    }
                    break Ok(());
                }
            },
            () = timer, if deadline.is_some() => client.poll_at(Instant::now()),
        }
    };

    client.set_closed();
    result
}
