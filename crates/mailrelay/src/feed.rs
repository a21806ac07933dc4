//! JSON-lines event feed.
//!
//! Each input line is one event:
//!
//! ```text
//! {"channel": "mail", "name": "send_mail", "args": {"subject": "Hi", "to": "b@y.com", "msg": "Hello"}}
//! ```

use anyhow::Context;
use mailrelay_core::BusEvent;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Forwards every well-formed line of `input` to `events` until EOF or
/// until the receiver goes away. Malformed lines are logged and skipped.
///
/// Returns the number of events forwarded.
///
/// # Errors
///
/// Returns an error if reading `input` fails.
pub async fn forward_lines<R>(input: R, events: mpsc::Sender<BusEvent>) -> anyhow::Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();
    let mut forwarded = 0;
    let mut line_no = 0usize;

    while let Some(line) = lines.next_line().await.context("failed to read event feed")? {
        line_no += 1;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let event: BusEvent = match serde_json::from_str(line) {
            Ok(event) => event,
            Err(e) => {
                warn!(line = line_no, "skipping malformed event: {e}");
                continue;
            }
        };
        if events.send(event).await.is_err() {
            debug!("event receiver closed");
            break;
        }
        forwarded += 1;
    }

    Ok(forwarded)
}
