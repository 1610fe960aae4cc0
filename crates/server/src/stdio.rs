//! Newline-delimited JSON transport.
//!
//! Reads events from the host, runs each on its own task, and funnels every
//! reply through a single writer so output lines never interleave.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use crate::handler::Worker;
use crate::protocol::{Inbound, Outbound, ReplySink, undecodable_replies};

/// Serve events from `input` until it closes, then drain in-flight events.
///
/// # Errors
///
/// Returns an I/O error if reading input or writing output fails.
pub async fn serve<R, W>(worker: Arc<Worker>, input: R, output: W) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel::<Outbound>();
    let writer = tokio::spawn(write_replies(rx, output));

    let mut lines = BufReader::new(input).lines();
    let mut in_flight = JoinSet::new();

    while let Some(line) = lines.next_line().await? {
        reap(&mut in_flight);
        if line.trim().is_empty() {
            continue;
        }
        match Inbound::parse(&line) {
            Ok(inbound) => {
                tracing::debug!(id = inbound.id, event = inbound.event.kind(), "received event");
                let worker = worker.clone();
                let sink = ReplySink::new(inbound.id, tx.clone());
                in_flight.spawn(async move { worker.dispatch(inbound.event, &sink).await });
            }
            Err(e) => match undecodable_replies(&line) {
                Some((id, replies)) => {
                    tracing::warn!(id, error = %e, "rejecting undecodable event");
                    let sink = ReplySink::new(id, tx.clone());
                    for reply in replies {
                        sink.send(reply);
                    }
                }
                None => tracing::warn!(error = %e, "skipping malformed event line"),
            },
        }
    }

    while let Some(result) = in_flight.join_next().await {
        log_join(result);
    }
    drop(tx);

    writer.await.map_err(std::io::Error::other)?
}

/// Drop finished event tasks without waiting. Returns how many were removed.
fn reap(in_flight: &mut JoinSet<()>) -> usize {
    let mut reaped = 0;
    while let Some(result) = in_flight.try_join_next() {
        log_join(result);
        reaped += 1;
    }
    reaped
}

fn log_join(result: Result<(), tokio::task::JoinError>) {
    if let Err(e) = result {
        tracing::error!(error = %e, "event task panicked");
    }
}

async fn write_replies<W>(mut rx: mpsc::UnboundedReceiver<Outbound>, mut output: W) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(out) = rx.recv().await {
        let mut line = match serde_json::to_vec(&out) {
            Ok(line) => line,
            Err(e) => {
                tracing::error!(id = out.id, error = %e, "failed to encode reply");
                continue;
            }
        };
        line.push(b'\n');
        output.write_all(&line).await?;
        output.flush().await?;
    }
    Ok(())
}
