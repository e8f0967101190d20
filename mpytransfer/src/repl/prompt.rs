//! Bringing the REPL to an idle prompt.
//!
//! After a reset the board may still be booting, running `main.py`, or stuck
//! in a script. The synchronizer waits for the `>>> ` prompt and interrupts
//! with Ctrl-C whenever it does not show up in time.

use crate::error::Result;
use crate::port::timed::{DEFAULT_POLL_INTERVAL, read_until};
use crate::repl::paste::{PasteConfig, PasteSender, control_code};
use log::{debug, trace, warn};
use std::io::{Read, Write};
use std::time::Duration;

/// Tail the REPL prints when it waits for input.
pub const PROMPT: &[u8] = b">>> ";

/// Letter of the interrupt control character.
pub const INTERRUPT: char = 'c';

/// Default number of attempts.
pub const DEFAULT_SYNC_ATTEMPTS: usize = 20;

/// Default wait for the prompt per attempt.
pub const DEFAULT_PROMPT_TIMEOUT: Duration = Duration::from_secs(2);

/// Prompt synchronization configuration.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SyncConfig {
    /// Attempts before giving up.
    pub max_attempts: usize,
    /// Wait for the prompt per attempt.
    pub prompt_timeout: Duration,
    /// Interval between polls of an idle port.
    pub poll_interval: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_SYNC_ATTEMPTS,
            prompt_timeout: DEFAULT_PROMPT_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// How synchronization ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The prompt was seen on the given attempt.
    Ready {
        /// Attempts used, counting from 1.
        attempts: usize,
    },
    /// The prompt never appeared; the caller proceeds regardless.
    Exhausted {
        /// Attempts made.
        attempts: usize,
    },
}

impl SyncOutcome {
    /// Whether the prompt was seen.
    pub fn is_ready(self) -> bool {
        matches!(self, Self::Ready { .. })
    }
}

/// Read until the prompt shows up, returning what was printed before it.
pub fn read_to_prompt<P: Read + ?Sized>(
    port: &mut P,
    timeout: Duration,
    poll_interval: Duration,
) -> Result<Option<String>> {
    Ok(read_until(port, PROMPT, timeout, poll_interval)?
        .map(|data| String::from_utf8_lossy(&data).into_owned()))
}

/// Wait for an idle prompt, interrupting whatever runs on the board.
///
/// Gives up after `config.max_attempts` without failing: a board that never
/// shows a prompt is reported as [`SyncOutcome::Exhausted`] and the caller
/// carries on. Only I/O errors are returned as `Err`.
pub fn synchronize<P: Read + Write + ?Sized>(
    port: &mut P,
    config: &SyncConfig,
    paste: &PasteConfig,
) -> Result<SyncOutcome> {
    let interrupt = control_code(INTERRUPT)?;

    for attempt in 1..=config.max_attempts {
        if let Some(output) = read_to_prompt(port, config.prompt_timeout, config.poll_interval)? {
            trace!("Board output before prompt: {output:?}");
            debug!("REPL prompt ready after {attempt} attempt(s)");
            return Ok(SyncOutcome::Ready { attempts: attempt });
        }

        debug!(
            "No prompt within {} ms (attempt {attempt}/{}), interrupting",
            config.prompt_timeout.as_millis(),
            config.max_attempts
        );
        PasteSender::with_config(&mut *port, paste.clone()).send_control(interrupt)?;
    }

    warn!(
        "Board did not reach the REPL prompt after {} attempts, continuing anyway",
        config.max_attempts
    );
    Ok(SyncOutcome::Exhausted {
        attempts: config.max_attempts,
    })
}
