//! Bounded-wait read primitives on top of a non-blocking port.
//!
//! The link has no framing, so every protocol step reads with an explicit
//! deadline, polling the port at a fine interval until enough bytes arrived.

use crate::error::Result;
use log::{trace, warn};
use std::io::{ErrorKind, Read};
use std::thread;
use std::time::{Duration, Instant};

/// Default interval between two polls of an idle port.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Upper bound on bytes discarded by a single [`drain_input`] call.
const DRAIN_LIMIT: usize = 1 << 20;

/// Tail of the input kept by [`read_until`].
pub const READ_UNTIL_WINDOW: usize = 4096;

/// Read whatever is buffered, mapping "nothing yet" to `Ok(0)`.
pub fn read_available<P: Read + ?Sized>(port: &mut P, buf: &mut [u8]) -> Result<usize> {
    match port.read(buf) {
        Ok(n) => Ok(n),
        Err(e)
            if matches!(
                e.kind(),
                ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
            ) =>
        {
            Ok(0)
        },
        Err(e) => Err(e.into()),
    }
}

/// Read exactly `count` bytes before `timeout` elapses.
///
/// Partial reads are accumulated. Returns `Ok(None)` when the deadline passes
/// with fewer bytes; whatever arrived so far is discarded.
pub fn read_exact_timeout<P: Read + ?Sized>(
    port: &mut P,
    count: usize,
    timeout: Duration,
    poll_interval: Duration,
) -> Result<Option<Vec<u8>>> {
    let start = Instant::now();
    let mut data = vec![0u8; count];
    let mut filled = 0;

    while filled < count {
        let n = read_available(port, &mut data[filled..])?;
        filled += n;
        if filled == count {
            break;
        }
        if start.elapsed() >= timeout {
            trace!("Read timed out with {filled}/{count} bytes");
            return Ok(None);
        }
        if n == 0 {
            thread::sleep(poll_interval);
        }
    }

    Ok(Some(data))
}

/// Read until the received bytes end with `marker` or `timeout` elapses.
///
/// Reads one byte at a time so nothing after the marker is consumed. The
/// deadline holds even while bytes keep arriving. Returns what was read
/// including the marker, at most the last [`READ_UNTIL_WINDOW`] bytes, or
/// `Ok(None)` on timeout.
pub fn read_until<P: Read + ?Sized>(
    port: &mut P,
    marker: &[u8],
    timeout: Duration,
    poll_interval: Duration,
) -> Result<Option<Vec<u8>>> {
    let start = Instant::now();
    let mut received = Vec::new();
    let mut byte = [0u8; 1];

    loop {
        let n = read_available(port, &mut byte)?;
        if n == 1 {
            received.push(byte[0]);
            if received.ends_with(marker) {
                return Ok(Some(received));
            }
            if received.len() >= 2 * READ_UNTIL_WINDOW {
                received.drain(..READ_UNTIL_WINDOW);
            }
        }
        if start.elapsed() >= timeout {
            trace!("No {marker:?} within {} ms", timeout.as_millis());
            return Ok(None);
        }
        if n == 0 {
            thread::sleep(poll_interval);
        }
    }
}

/// Discard input until a read comes back empty.
///
/// Returns the number of bytes discarded.
pub fn drain_input<P: Read + ?Sized>(port: &mut P) -> Result<usize> {
    let mut buf = [0u8; 100];
    let mut total = 0;

    loop {
        let n = read_available(port, &mut buf)?;
        if n == 0 {
            break;
        }
        total += n;
        if total >= DRAIN_LIMIT {
            warn!("Input still flowing after discarding {total} bytes, giving up");
            break;
        }
    }

    if total > 0 {
        trace!("Drained {total} stray bytes");
    }
    Ok(total)
}
