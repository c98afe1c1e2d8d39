/*!
 * JSON Lines Driver
 *
 * Serves a kernel over a line-oriented stream:
 * - input: host requests (`{"op": ...}`) or backend events (`{"event": ...}`)
 * - output: `{"request": n, "response": ...}` replies and host events
 *
 * Requests are numbered from 1 in input order. At end of input every request
 * that can still be answered is answered before returning; blocking waits
 * that nothing will satisfy are abandoned.
 */

use super::kernel::{HostEvent, HostEvents, KernelHandle, PendingResponse};
use super::request::{HostRequest, Request, Response};
use crate::backend::BackendEvent;
use crate::core::errors::KernelResult;
use crate::process::WaitOptions;
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

type Reply = BoxFuture<'static, (u64, KernelResult<Response>)>;

/// Serve requests from `input` until it closes, writing to `output`
pub async fn serve<R, W>(
    handle: KernelHandle,
    mut events: HostEvents,
    input: R,
    mut output: W,
) -> KernelResult<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();
    // Waits without WNOHANG may never resolve; everything else always does
    let mut replies: FuturesUnordered<Reply> = FuturesUnordered::new();
    let mut waits: FuturesUnordered<Reply> = FuturesUnordered::new();
    let mut request_no: u64 = 0;

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                let Some(request) = accept(&handle, &line)? else {
                    continue;
                };
                request_no += 1;
                let blocking = may_block(&request.request);
                let reply = numbered(request_no, handle.submit(request.caller, request.request)?);
                if blocking {
                    waits.push(reply);
                } else {
                    replies.push(reply);
                }
            }
            Some((number, result)) = replies.next() => {
                write_line(&mut output, &reply_line(number, result)).await?;
            }
            Some((number, result)) = waits.next() => {
                write_line(&mut output, &reply_line(number, result)).await?;
            }
            Some(event) = events.recv() => write_event(&mut output, &event).await?,
        }
    }

    info!(pending = replies.len() + waits.len(), "Input closed, draining replies");
    while let Some((number, result)) = replies.next().await {
        write_line(&mut output, &reply_line(number, result)).await?;
    }

    // The loop is FIFO: once this is answered, every wait that can be
    // satisfied already holds its reply
    if let Err(e) = handle.request(None, Request::Snapshot).await {
        debug!(error = %e, "Kernel gone while draining");
    }

    let mut abandoned = 0usize;
    for wait in waits {
        match wait.now_or_never() {
            Some((number, result)) => write_line(&mut output, &reply_line(number, result)).await?,
            None => abandoned += 1,
        }
    }
    while let Ok(event) = events.try_recv() {
        write_event(&mut output, &event).await?;
    }
    if abandoned > 0 {
        info!(abandoned, "Abandoned waits with no child to reap");
    }
    Ok(())
}

/// Parse one input line; backend events are delivered on the spot
fn accept(handle: &KernelHandle, line: &str) -> KernelResult<Option<HostRequest>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let value: Value = match serde_json::from_str(line) {
        Ok(value) => value,
        Err(e) => {
            warn!(error = %e, "Ignoring malformed input line");
            return Ok(None);
        }
    };

    if value.get("event").is_some() {
        match serde_json::from_value::<BackendEvent>(value) {
            Ok(event) => handle.backend_event(event)?,
            Err(e) => warn!(error = %e, "Ignoring malformed backend event"),
        }
        return Ok(None);
    }

    match serde_json::from_value(value) {
        Ok(request) => Ok(Some(request)),
        Err(e) => {
            warn!(error = %e, "Ignoring malformed request");
            Ok(None)
        }
    }
}

fn may_block(request: &Request) -> bool {
    match request {
        Request::Wait { options, .. } => {
            !WaitOptions::from_bits_truncate(*options).contains(WaitOptions::WNOHANG)
        }
        _ => false,
    }
}

fn numbered(number: u64, pending: PendingResponse) -> Reply {
    async move { (number, pending.response().await) }.boxed()
}

fn reply_line(number: u64, result: KernelResult<Response>) -> Value {
    match result {
        Ok(response) => json!({"request": number, "response": response}),
        Err(e) => json!({"request": number, "error": e.to_string()}),
    }
}

async fn write_event<W>(output: &mut W, event: &HostEvent) -> KernelResult<()>
where
    W: AsyncWrite + Unpin,
{
    match serde_json::to_value(event) {
        Ok(value) => write_line(output, &value).await,
        Err(e) => {
            warn!(error = %e, "Failed to encode host event");
            Ok(())
        }
    }
}

async fn write_line<W>(output: &mut W, line: &Value) -> KernelResult<()>
where
    W: AsyncWrite + Unpin,
{
    let mut text = line.to_string();
    text.push('\n');
    output.write_all(text.as_bytes()).await?;
    output.flush().await?;
    Ok(())
}
