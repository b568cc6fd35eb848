//! Connection lifecycle: one client from upgrade through disconnect.
//!
//! Each connection runs two loops. The outbound loop owns the write half:
//! it replays the recipient's pending outbox, then multiplexes the live
//! queue, keepalive pings and cancellation. The inbound loop owns the read
//! half: it enforces the frame limit and idle deadline, decodes client
//! events and hands them to a bounded set of handler tasks. Whichever loop
//! stops first cancels the connection's lifetime, which stops the other.
//! Cleanup runs once, after both have exited.

use std::collections::HashSet;
use std::fmt::Display;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::Message;
use courier_core::{ClientEvent, EventId, FrameError, RecipientId, ServerPush};
use futures::{Sink, SinkExt, Stream, StreamExt};
use metrics::{counter, histogram};
use thiserror::Error;
use tokio::sync::{Semaphore, mpsc};
use tracing::{debug, info, instrument, warn};

use crate::context::DeliveryContext;
use crate::errors::DeliveryError;
use crate::metrics::{
    CATCHUP_EVENTS_TOTAL, WS_CONNECTION_DURATION_SECONDS, WS_CONNECTIONS_TOTAL,
    WS_DISCONNECTIONS_TOTAL,
};

use super::connection::ConnectionHandle;
use super::handler::handle_client_event;

/// Why a connection loop stopped.
#[derive(Debug, Error)]
enum CloseReason {
    #[error("connection lifetime cancelled")]
    Cancelled,
    #[error("client closed the connection")]
    ClientClosed,
    #[error("transport stream ended")]
    StreamEnded,
    #[error("no inbound traffic for {0:?}")]
    Idle(Duration),
    #[error("write did not complete within {0:?}")]
    WriteTimeout(Duration),
    #[error("transport error: {0}")]
    Transport(String),
    #[error(transparent)]
    Frame(#[from] FrameError),
}

/// Register `recipient`, run both loops until the connection ends and clean
/// up.
///
/// Returns an error only when registration is refused; the write half then
/// receives a close frame.
#[instrument(skip_all, fields(recipient = %recipient, conn_id = tracing::field::Empty))]
pub async fn accept_and_run<W, R, E>(
    mut sink: W,
    stream: R,
    recipient: RecipientId,
    ctx: Arc<DeliveryContext>,
) -> Result<(), DeliveryError>
where
    W: Sink<Message> + Unpin + Send + 'static,
    W::Error: Display + Send,
    R: Stream<Item = Result<Message, E>> + Unpin + Send,
    E: Display + Send,
{
    let (tx, rx) = mpsc::channel(ctx.config.outbound_queue_capacity);
    let conn = Arc::new(ConnectionHandle::new(
        recipient.clone(),
        tx,
        ctx.hub.lifetime_token(),
    ));
    let _ = tracing::Span::current().record("conn_id", tracing::field::display(&conn.id));

    if let Err(e) = ctx.hub.register(conn.clone()) {
        warn!(error = %e, "registration refused");
        let _ = tokio::time::timeout(ctx.config.write_timeout, sink.send(Message::Close(None))).await;
        return Err(e);
    }

    let started = Instant::now();
    info!("client connected");
    counter!(WS_CONNECTIONS_TOTAL).increment(1);

    if let Err(e) = ctx.presence.connect(&ctx.hub, &recipient).await {
        warn!(error = %e, "failed to announce presence");
    }

    let outbound = tokio::spawn(outbound_loop(sink, rx, conn.clone(), ctx.clone()));
    let reason = inbound_loop(stream, &conn, &ctx).await;
    debug!(%reason, "inbound loop stopped");
    conn.close();
    if let Err(e) = outbound.await {
        warn!(error = %e, "outbound loop panicked");
    }

    cleanup(&conn, &ctx).await;
    counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
    histogram!(WS_CONNECTION_DURATION_SECONDS).record(started.elapsed().as_secs_f64());
    info!(%reason, "client disconnected");
    Ok(())
}

async fn inbound_loop<R, E>(
    mut stream: R,
    conn: &Arc<ConnectionHandle>,
    ctx: &Arc<DeliveryContext>,
) -> CloseReason
where
    R: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    let config = &ctx.config;
    let permits = Arc::new(Semaphore::new(config.dispatch_concurrency));

    loop {
        let next = tokio::select! {
            () = conn.lifetime().cancelled() => return CloseReason::Cancelled,
            next = tokio::time::timeout(config.idle_timeout, stream.next()) => next,
        };
        let message = match next {
            Err(_) => return CloseReason::Idle(config.idle_timeout),
            Ok(None) => return CloseReason::StreamEnded,
            Ok(Some(Err(e))) => return CloseReason::Transport(e.to_string()),
            Ok(Some(Ok(message))) => message,
        };

        let decoded = match message {
            Message::Text(text) => ClientEvent::decode(text.as_str(), config.max_frame_bytes),
            Message::Binary(data) => ClientEvent::decode_bytes(&data, config.max_frame_bytes),
            Message::Ping(_) | Message::Pong(_) => continue,
            Message::Close(_) => return CloseReason::ClientClosed,
        };
        let event = match decoded {
            Ok(event) => event,
            Err(e) => return CloseReason::Frame(e),
        };

        // Reading pauses while every handler slot is busy.
        let permit = tokio::select! {
            () = conn.lifetime().cancelled() => return CloseReason::Cancelled,
            permit = Arc::clone(&permits).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => return CloseReason::Cancelled,
            },
        };
        let task_ctx = Arc::clone(ctx);
        let sender = conn.recipient.clone();
        let _ = ctx.hub.tracker().spawn(async move {
            handle_client_event(&task_ctx, &sender, event).await;
            drop(permit);
        });
    }
}

async fn outbound_loop<W>(
    mut sink: W,
    mut rx: mpsc::Receiver<ServerPush>,
    conn: Arc<ConnectionHandle>,
    ctx: Arc<DeliveryContext>,
) where
    W: Sink<Message> + Unpin,
    W::Error: Display,
{
    if let Err(reason) = pump(&mut sink, &mut rx, &conn, &ctx).await {
        debug!(conn_id = %conn.id, %reason, "outbound loop stopped");
    }
    conn.close();
    let _ = tokio::time::timeout(ctx.config.write_timeout, sink.close()).await;
}

/// Catch-up, then live queue and keepalives until cancelled or a write fails.
async fn pump<W>(
    sink: &mut W,
    rx: &mut mpsc::Receiver<ServerPush>,
    conn: &ConnectionHandle,
    ctx: &DeliveryContext,
) -> Result<(), CloseReason>
where
    W: Sink<Message> + Unpin,
    W::Error: Display,
{
    let config = &ctx.config;
    let lifetime = conn.lifetime().clone();

    let CatchUp {
        mut replayed,
        mut overlap,
    } = tokio::select! {
        () = lifetime.cancelled() => return Err(CloseReason::Cancelled),
        caught_up = catch_up(sink, rx, conn, ctx) => caught_up?,
    };

    let mut keepalive = tokio::time::interval(config.keepalive_interval);
    // first tick completes immediately
    let _ = keepalive.tick().await;

    loop {
        tokio::select! {
            () = lifetime.cancelled() => return Err(CloseReason::Cancelled),
            event = rx.recv() => {
                let Some(event) = event else {
                    return Err(CloseReason::Cancelled);
                };
                // queued before the catch-up snapshot, may already be written
                if overlap > 0 {
                    overlap -= 1;
                    let written = replayed.remove(&event.id);
                    if overlap == 0 {
                        replayed = HashSet::new();
                    }
                    if written {
                        continue;
                    }
                }
                write_push(sink, &event, config.write_timeout).await?;
            }
            _ = keepalive.tick() => {
                write(sink, Message::Ping(Vec::new().into()), config.write_timeout).await?;
            }
        }
    }
}

/// Result of the catch-up replay.
#[derive(Default)]
struct CatchUp {
    /// Ids written during catch-up.
    replayed: HashSet<EventId>,
    /// Live queue length when the snapshot was taken. Only these entries can
    /// repeat a replayed event.
    overlap: usize,
}

/// Write every pending outbox event, oldest first.
///
/// The snapshot is taken under the recipient's send lock. A durable event
/// enqueued after it was appended after it, so only entries already queued
/// at that moment can repeat a replayed event.
async fn catch_up<W>(
    sink: &mut W,
    rx: &mpsc::Receiver<ServerPush>,
    conn: &ConnectionHandle,
    ctx: &DeliveryContext,
) -> Result<CatchUp, CloseReason>
where
    W: Sink<Message> + Unpin,
    W::Error: Display,
{
    let snapshot = {
        let _slot = ctx.hub.lock_recipient(&conn.recipient).await;
        ctx.hub
            .outbox()
            .list_ordered(&conn.recipient)
            .await
            .map(|pending| (pending, rx.len()))
    };
    let (pending, overlap) = match snapshot {
        Ok(snapshot) => snapshot,
        Err(e) => {
            // events stay pending and are retried on the next connect
            warn!(recipient = %conn.recipient, error = %e, "outbox catch-up failed");
            return Ok(CatchUp::default());
        }
    };

    let mut replayed = HashSet::with_capacity(pending.len());
    for event in &pending {
        write_push(sink, event, ctx.config.write_timeout).await?;
        let _ = replayed.insert(event.id.clone());
    }
    if !pending.is_empty() {
        counter!(CATCHUP_EVENTS_TOTAL).increment(pending.len() as u64);
        debug!(recipient = %conn.recipient, count = pending.len(), "replayed pending events");
    }
    Ok(CatchUp { replayed, overlap })
}

async fn write_push<W>(sink: &mut W, event: &ServerPush, deadline: Duration) -> Result<(), CloseReason>
where
    W: Sink<Message> + Unpin,
    W::Error: Display,
{
    let frame = event.to_frame()?;
    write(sink, Message::Text(frame.into()), deadline).await
}

async fn write<W>(sink: &mut W, message: Message, deadline: Duration) -> Result<(), CloseReason>
where
    W: Sink<Message> + Unpin,
    W::Error: Display,
{
    match tokio::time::timeout(deadline, sink.send(message)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(CloseReason::Transport(e.to_string())),
        Err(_) => Err(CloseReason::WriteTimeout(deadline)),
    }
}

/// Unregister, and if this connection was still the recipient's current
/// one, broadcast it offline and drop its subscriptions.
async fn cleanup(conn: &ConnectionHandle, ctx: &DeliveryContext) {
    if !ctx.hub.unregister(conn) {
        debug!(conn_id = %conn.id, "superseded connection, skipping offline broadcast");
        return;
    }
    if let Err(e) = ctx.presence.disconnect(&ctx.hub, &conn.recipient).await {
        warn!(recipient = %conn.recipient, error = %e, "failed to broadcast offline presence");
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
