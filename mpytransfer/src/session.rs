//! Transfer session with a MicroPython board.
//!
//! A [`Session`] owns the port for its whole lifetime. Opening it resets the
//! board, waits for the REPL prompt and installs the receiver as a file on the
//! board; every transfer after that only pastes a single line to run it.
//! Closing it deletes the receiver file and closes the port. `Drop` closes a
//! session the caller forgot about.
//!
//! ## Example
//!
//! ```rust,no_run
//! use mpytransfer::{Session, SessionConfig};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     #[cfg(feature = "native")]
//!     {
//!         let mut session = Session::connect("/dev/ttyUSB0", SessionConfig::default())?;
//!         session.upload("main.py")?;
//!         session.create_file(b"{\"debug\": true}", "config.json")?;
//!         session.run_file("main.py", None)?;
//!         session.close()?;
//!     }
//!     Ok(())
//! }
//! ```

use crate::error::{Error, Result};
use crate::port::Port;
use crate::port::timed::drain_input;
use crate::protocol::chunked::{ChunkedTransfer, TransferConfig};
use crate::repl::paste::{PasteConfig, PasteSender, control_code};
use crate::repl::prompt::{INTERRUPT, SyncConfig, SyncOutcome, read_to_prompt, synchronize};
use crate::script::{ReceiverScript, python_string, target_init};
use log::{debug, info, trace, warn};
use std::fs;
use std::path::Path;
use std::thread;
use std::time::Duration;

/// Default name of the receiver file kept on the board.
pub const DEFAULT_RECEIVER_FILE: &str = "__upload_0c19c2b6e0a34223afe5b.py";

/// How long the reset line is held after opening the port.
pub const DEFAULT_RESET_HOLD: Duration = Duration::from_secs(1);

/// Session configuration.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SessionConfig {
    /// Name of the receiver file on the board.
    pub receiver_file: String,
    /// Time the board is held in reset.
    pub reset_hold: Duration,
    /// Prompt synchronization.
    pub sync: SyncConfig,
    /// Paste pacing.
    pub paste: PasteConfig,
    /// Chunked transfers.
    pub transfer: TransferConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            receiver_file: DEFAULT_RECEIVER_FILE.to_string(),
            reset_hold: DEFAULT_RESET_HOLD,
            sync: SyncConfig::default(),
            paste: PasteConfig::default(),
            transfer: TransferConfig::default(),
        }
    }
}

impl SessionConfig {
    /// Set the receiver file name.
    #[must_use]
    pub fn with_receiver_file(mut self, name: impl Into<String>) -> Self {
        self.receiver_file = name.into();
        self
    }

    /// Use a fresh random receiver file name.
    ///
    /// Lets several sessions share a board without deleting each other's
    /// receiver, at the cost of leaving a stray file behind after a crash.
    #[must_use]
    pub fn with_random_receiver_file(self) -> Self {
        let name = format!("__upload_{:016x}.py", rand::random::<u64>());
        self.with_receiver_file(name)
    }

    /// Set the reset hold time.
    #[must_use]
    pub fn with_reset_hold(mut self, hold: Duration) -> Self {
        self.reset_hold = hold;
        self
    }

    /// Set the prompt synchronization options.
    #[must_use]
    pub fn with_sync(mut self, sync: SyncConfig) -> Self {
        self.sync = sync;
        self
    }

    /// Set the paste pacing.
    #[must_use]
    pub fn with_paste(mut self, paste: PasteConfig) -> Self {
        self.paste = paste;
        self
    }

    /// Set the chunked transfer options.
    #[must_use]
    pub fn with_transfer(mut self, transfer: TransferConfig) -> Self {
        self.transfer = transfer;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.receiver_file.is_empty() {
            return Err(Error::Config("receiver file name is empty".into()));
        }
        self.transfer.validate()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Receiver {
    Absent,
    Installing,
    Installed,
}

/// Exclusive transfer session on one port.
pub struct Session<P: Port> {
    port: Option<P>,
    config: SessionConfig,
    script: ReceiverScript,
    receiver: Receiver,
    /// A receiver was started and has not confirmed the end of its transfer.
    transfer_open: bool,
    sync_outcome: SyncOutcome,
}

impl<P: Port> Session<P> {
    /// Take over `port`: reset the board, wait for the prompt, install the
    /// receiver.
    ///
    /// On failure the port is released before the error is returned.
    pub fn open(port: P, config: SessionConfig) -> Result<Self> {
        Self::open_with_script(port, config, ReceiverScript::default())
    }

    /// [`open`](Self::open), installing a custom receiver program.
    pub fn open_with_script(port: P, config: SessionConfig, script: ReceiverScript) -> Result<Self> {
        config.validate()?;

        let mut session = Self {
            port: Some(port),
            config,
            script,
            receiver: Receiver::Absent,
            transfer_open: false,
            sync_outcome: SyncOutcome::Exhausted { attempts: 0 },
        };

        if let Err(e) = session.bring_up() {
            if let Err(close_err) = session.close() {
                warn!("Failed to release port after setup error: {close_err}");
            }
            return Err(e);
        }

        Ok(session)
    }

    fn ensure_active(&self) -> Result<()> {
        if self.is_active() {
            Ok(())
        } else {
            Err(Error::InactiveSession)
        }
    }

    fn port_mut(&mut self) -> Result<&mut P> {
        self.port
            .as_mut()
            .ok_or(Error::InactiveSession)
    }

    fn bring_up(&mut self) -> Result<()> {
        let hold = self.config.reset_hold;
        let port = self.port_mut()?;
        info!("Resetting board on {}", port.name());

        port.set_dtr(false)?;
        port.set_rts(true)?;
        thread::sleep(hold);
        port.set_rts(false)?;

        let port = self
            .port
            .as_mut()
            .ok_or(Error::InactiveSession)?;
        self.sync_outcome = synchronize(&mut *port, &self.config.sync, &self.config.paste)?;
        drain_input(port)?;

        self.ensure_receiver()
    }

    /// Install the receiver unless this session already did.
    ///
    /// `open` only returns a session once this succeeded, so on a live
    /// session it does nothing.
    fn ensure_receiver(&mut self) -> Result<()> {
        if self.receiver == Receiver::Installed {
            trace!("Receiver already installed");
            return Ok(());
        }

        info!("Installing receiver as {}", self.config.receiver_file);
        let bootstrap = self
            .script
            .bootstrap(&self.config.receiver_file);
        let persisted = self
            .script
            .parameterized();

        let port = self
            .port
            .as_mut()
            .ok_or(Error::InactiveSession)?;
        self.receiver = Receiver::Installing;
        self.transfer_open = true;

        // The pasted copy starts receiving right away and stores the
        // parameterized copy under the receiver file name.
        PasteSender::with_config(&mut *port, self.config.paste.clone())
            .paste_lines(bootstrap.lines())?;
        ChunkedTransfer::with_config(port, self.config.transfer.clone())
            .send_file(persisted.as_bytes(), |_, _| {})?;

        self.transfer_open = false;
        self.receiver = Receiver::Installed;
        debug!("Receiver installed");
        Ok(())
    }

    /// Stop a receiver that a failed transfer left running on the board.
    ///
    /// Until its read deadline passes it would take anything pasted for the
    /// next frame header. Base64 never contains Ctrl-C, so an interrupt ends
    /// it at once.
    fn interrupt_stale_receiver(&mut self) -> Result<()> {
        if !self.transfer_open {
            return Ok(());
        }

        debug!("Interrupting receiver left over from a failed transfer");
        let interrupt = control_code(INTERRUPT)?;
        let port = self
            .port
            .as_mut()
            .ok_or(Error::InactiveSession)?;
        PasteSender::with_config(&mut *port, self.config.paste.clone()).send_control(interrupt)?;
        if read_to_prompt(
            &mut *port,
            self.config.sync.prompt_timeout,
            self.config.sync.poll_interval,
        )?
        .is_none()
        {
            warn!("No prompt after interrupting the receiver");
        }
        drain_input(port)?;

        self.transfer_open = false;
        Ok(())
    }

    /// Whether the session still owns an open port.
    pub fn is_active(&self) -> bool {
        self.port.is_some()
    }

    /// Name of the receiver file on the board.
    pub fn receiver_file(&self) -> &str {
        &self.config.receiver_file
    }

    /// How prompt synchronization ended when the session was opened.
    pub fn sync_outcome(&self) -> SyncOutcome {
        self.sync_outcome
    }

    /// Write `content` to `file_name` on the board, replacing any existing file.
    pub fn create_file(&mut self, content: &[u8], file_name: &str) -> Result<()> {
        self.create_file_with_progress(content, file_name, |_, _| {})
    }

    /// [`create_file`](Self::create_file), reporting (sent, total) bytes after
    /// every acknowledged chunk.
    pub fn create_file_with_progress<F>(
        &mut self,
        content: &[u8],
        file_name: &str,
        progress: F,
    ) -> Result<()>
    where
        F: FnMut(usize, usize),
    {
        self.ensure_active()?;
        if file_name.is_empty() {
            return Err(Error::InvalidFileName(file_name.to_string()));
        }
        self.interrupt_stale_receiver()?;
        self.ensure_receiver()?;

        info!("Creating {file_name} ({} bytes)", content.len());
        let init = target_init(file_name);
        let port = self
            .port
            .as_mut()
            .ok_or(Error::InactiveSession)?;
        self.transfer_open = true;

        PasteSender::with_config(&mut *port, self.config.paste.clone())
            .run_file(&self.config.receiver_file, Some(&init))?;
        drain_input(&mut *port)?;
        ChunkedTransfer::with_config(port, self.config.transfer.clone())
            .send_file(content, progress)?;

        self.transfer_open = false;
        Ok(())
    }

    /// Copy a local file to the board under its base name.
    pub fn upload(&mut self, path: impl AsRef<Path>) -> Result<()> {
        self.ensure_active()?;
        let path = path.as_ref();
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| Error::InvalidFileName(path.display().to_string()))?;

        let content = fs::read(path)?;
        debug!("Uploading {}", path.display());
        self.create_file(&content, file_name)
    }

    /// Execute a file stored on the board.
    ///
    /// `globals_init` is run first, in the same global namespace.
    pub fn run_file(&mut self, file_name: &str, globals_init: Option<&str>) -> Result<()> {
        self.ensure_active()?;
        self.interrupt_stale_receiver()?;
        let paste = self.config.paste.clone();
        let port = self.port_mut()?;
        info!("Running {file_name}");
        PasteSender::with_config(port, paste).run_file(file_name, globals_init)
    }

    /// Send a control character by letter, e.g. `'c'` for Ctrl-C.
    pub fn send_control_character(&mut self, letter: char) -> Result<()> {
        let code = control_code(letter)?;
        let paste = self.config.paste.clone();
        let port = self.port_mut()?;
        PasteSender::with_config(port, paste).send_control(code)
    }

    fn remove_receiver(&mut self) -> Result<()> {
        debug!("Removing receiver {}", self.config.receiver_file);
        let remove = format!("os.remove({})", python_string(&self.config.receiver_file));
        let paste = self.config.paste.clone();
        PasteSender::with_config(self.port_mut()?, paste).paste_lines(["import os", remove.as_str()])
    }

    /// Remove the receiver file from the board and close the port.
    ///
    /// The port is closed even when removing the file fails. Closing an
    /// already closed session does nothing.
    pub fn close(&mut self) -> Result<()> {
        if !self.is_active() {
            return Ok(());
        }

        let removed = if self.receiver != Receiver::Absent {
            self.interrupt_stale_receiver()
                .and_then(|()| self.remove_receiver())
        } else {
            Ok(())
        };
        self.receiver = Receiver::Absent;

        let Some(mut port) = self
            .port
            .take()
        else {
            return removed;
        };
        let closed = port.close();
        info!("Session on {} closed", port.name());
        removed.and(closed)
    }
}

impl<P: Port> Drop for Session<P> {
    fn drop(&mut self) {
        if self.is_active() {
            if let Err(e) = self.close() {
                warn!("Failed to close session cleanly: {e}");
            }
        }
    }
}

// Native-specific convenience functions
#[cfg(feature = "native")]
mod native_impl {
    use super::{Result, Session, SessionConfig};
    use crate::port::{DEFAULT_BAUD, NativePort, SerialConfig};

    impl Session<NativePort> {
        /// Open `port_name` at the REPL's default baud rate and start a session.
        pub fn connect(port_name: &str, config: SessionConfig) -> Result<Self> {
            Self::connect_with(&SerialConfig::new(port_name, DEFAULT_BAUD), config)
        }

        /// Open a serial port with custom settings and start a session.
        pub fn connect_with(serial: &SerialConfig, config: SessionConfig) -> Result<Self> {
            let port = NativePort::open(serial)?;
            Self::open(port, config)
        }
    }
}
