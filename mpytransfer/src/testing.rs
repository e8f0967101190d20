//! Simulated MicroPython board for tests.
//!
//! Understands just enough of the REPL to serve a session: the reset line,
//! Ctrl-C, paste mode, running the receiver (through [`FrameReceiver`]),
//! `exec` of stored files and `os.remove`. The handle is cheap to clone so a
//! test can keep one to inspect the board after the session took ownership.

use crate::error::Result;
use crate::port::Port;
use crate::protocol::receiver::FrameReceiver;
use crate::repl::paste::{END_PASTE, START_PASTE};
use std::collections::{HashMap, VecDeque};
use std::io::{ErrorKind, Read, Write};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

const BANNER: &[u8] = b"MicroPython v1.22.0 on 2024-01-01; simulated board\r\n\
Type \"help()\" for more information.\r\n>>> ";

/// What the board does after a reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Boot {
    /// Prints the banner and the prompt.
    Prompt,
    /// Runs a script that only stops on the first Ctrl-C.
    Busy,
    /// Never prints a prompt, but still executes pasted code.
    Mute,
}

enum Mode {
    Repl,
    Paste(Vec<u8>),
    Receiving {
        target: String,
        receiver: FrameReceiver,
        last_input: Instant,
    },
}

pub(crate) struct BoardState {
    pub files: HashMap<String, Vec<u8>>,
    pub globals: HashMap<String, String>,
    /// Every program executed from paste mode.
    pub pasted: Vec<String>,
    /// Files run through `exec(f.read(), globals())`.
    pub runs: Vec<String>,
    pub rts_history: Vec<bool>,
    pub dtr: Option<bool>,
    pub interrupts: usize,
    pub closed: bool,
    /// Receiver swallows frames without answering.
    pub silent_receiver: bool,
    /// Replaces the next acknowledgment sent by a receiver.
    pub reply_override: Option<Vec<u8>>,
    /// Read deadline of the receiver running on the board.
    pub receiver_timeout: Duration,
    boot: Boot,
    mode: Mode,
    output: VecDeque<u8>,
}

impl BoardState {
    fn prompt(&mut self) {
        if self.boot != Boot::Mute {
            self.output
                .extend(b"\r\n>>> ");
        }
    }

    fn reset(&mut self) {
        self.mode = Mode::Repl;
        self.globals.clear();
        match self.boot {
            Boot::Prompt => self.output.extend(BANNER),
            Boot::Busy => self.output.extend(b"running main.py\r\n"),
            Boot::Mute => {},
        }
    }

    fn interrupt(&mut self) {
        self.interrupts += 1;
        self.mode = Mode::Repl;
        if self.boot == Boot::Busy {
            self.boot = Boot::Prompt;
        }
        if self.boot != Boot::Mute {
            self.output
                .extend(b"\r\nKeyboardInterrupt: \r\n>>> ");
        }
    }

    fn input(&mut self, byte: u8) {
        match &mut self.mode {
            Mode::Repl => match byte {
                START_PASTE => {
                    self.output
                        .extend(b"\r\npaste mode; Ctrl-C to cancel, Ctrl-D to finish\r\n=== ");
                    self.mode = Mode::Paste(Vec::new());
                },
                0x03 => self.interrupt(),
                other => self.output.push_back(other),
            },
            Mode::Paste(buf) => match byte {
                END_PASTE => {
                    let source = String::from_utf8_lossy(buf).into_owned();
                    self.mode = Mode::Repl;
                    self.output.extend(b"\r\n");
                    self.pasted
                        .push(source.clone());
                    self.execute(&source);
                },
                0x03 => self.interrupt(),
                b'\r' => {
                    buf.push(b'\n');
                    self.output.extend(b"\r\n=== ");
                },
                b'\n' => {},
                other => {
                    buf.push(other);
                    self.output.push_back(other);
                },
            },
            // KeyboardInterrupt inside the receiver; the `with` block still
            // closes the partly written file.
            Mode::Receiving { .. } if byte == 0x03 => {
                if let Mode::Receiving { target, receiver, .. } =
                    std::mem::replace(&mut self.mode, Mode::Repl)
                {
                    self.files
                        .insert(target, receiver.into_output());
                }
                self.interrupt();
            },
            Mode::Receiving {
                receiver,
                last_input,
                ..
            } => {
                receiver.feed(byte);
                *last_input = Instant::now();
                self.flush_receiver();
            },
        }
    }

    /// Send pending acknowledgments; store the file once the receiver is done.
    fn flush_receiver(&mut self) {
        let Mode::Receiving { receiver, .. } = &mut self.mode else {
            return;
        };
        let replies = receiver.take_replies();
        let finished = receiver.is_finished();
        if !self.silent_receiver {
            for ack in replies {
                match self.reply_override.take() {
                    Some(reply) => self.output.extend(reply),
                    None => self.output.extend(ack.as_bytes()),
                }
            }
        }
        if finished {
            if let Mode::Receiving { target, receiver, .. } =
                std::mem::replace(&mut self.mode, Mode::Repl)
            {
                self.files
                    .insert(target, receiver.into_output());
            }
            self.prompt();
        }
    }

    /// Let the receiver's read deadline pass if nothing arrived in time.
    fn tick(&mut self) {
        if let Mode::Receiving {
            receiver,
            last_input,
            ..
        } = &mut self.mode
        {
            if last_input.elapsed() > self.receiver_timeout {
                receiver.expire();
                self.flush_receiver();
            }
        }
    }

    fn execute(&mut self, source: &str) {
        for line in source.lines() {
            if let Some(value) = line.strip_prefix("file_name=") {
                self.globals
                    .insert("file_name".into(), unquote(value));
            }
        }

        if source.contains("a2b_base64") {
            self.start_receiver(source);
            return;
        }

        if source.contains("exec(f.read(), globals())") {
            let name = between(source, "open(", ")").map(unquote);
            let found = name.and_then(|n| {
                self.files
                    .get(&n)
                    .cloned()
                    .map(|content| (n, content))
            });
            match found {
                Some((name, content)) => {
                    self.runs.push(name);
                    let program = String::from_utf8_lossy(&content).into_owned();
                    self.execute(&program);
                },
                None => {
                    self.output
                        .extend(b"OSError: [Errno 2] ENOENT");
                    self.prompt();
                },
            }
            return;
        }

        if let Some(name) = between(source, "os.remove(", ")") {
            self.files
                .remove(&unquote(name));
        }
        self.prompt();
    }

    fn start_receiver(&mut self, source: &str) {
        let target = between(source, "with open(", ",").map(|arg| {
            if arg.starts_with('"') {
                unquote(arg)
            } else {
                self.globals
                    .get(arg)
                    .cloned()
                    .unwrap_or_default()
            }
        });
        match target {
            Some(target) if !target.is_empty() => {
                self.mode = Mode::Receiving {
                    target,
                    receiver: FrameReceiver::new(),
                    last_input: Instant::now(),
                };
            },
            _ => {
                self.output
                    .extend(b"NameError: name 'file_name' isn't defined");
                self.prompt();
            },
        }
    }
}

fn between<'s>(source: &'s str, start: &str, end: &str) -> Option<&'s str> {
    let from = source.find(start)? + start.len();
    let len = source[from..].find(end)?;
    Some(source[from..from + len].trim())
}

fn unquote(value: &str) -> String {
    value
        .trim()
        .trim_matches('"')
        .to_string()
}

/// Handle to a simulated board.
#[derive(Clone)]
pub(crate) struct SimulatedBoard {
    state: Arc<Mutex<BoardState>>,
}

impl SimulatedBoard {
    pub fn new(boot: Boot) -> Self {
        let mut state = BoardState {
            files: HashMap::new(),
            globals: HashMap::new(),
            pasted: Vec::new(),
            runs: Vec::new(),
            rts_history: Vec::new(),
            dtr: None,
            interrupts: 0,
            closed: false,
            silent_receiver: false,
            reply_override: None,
            receiver_timeout: Duration::from_millis(250),
            boot,
            mode: Mode::Repl,
            output: VecDeque::new(),
        };
        state.reset();
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    pub fn state(&self) -> MutexGuard<'_, BoardState> {
        self.state
            .lock()
            .unwrap()
    }
}

fn closed_error() -> std::io::Error {
    std::io::Error::new(ErrorKind::NotConnected, "port closed")
}

impl Read for SimulatedBoard {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let mut state = self.state();
        if state.closed {
            return Err(closed_error());
        }
        state.tick();
        if state.output.is_empty() {
            return Err(std::io::Error::new(ErrorKind::TimedOut, "no data"));
        }
        let n = buf.len().min(state.output.len());
        for b in buf.iter_mut().take(n) {
            *b = state.output.pop_front().unwrap();
        }
        Ok(n)
    }
}

impl Write for SimulatedBoard {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut state = self.state();
        if state.closed {
            return Err(closed_error());
        }
        state.tick();
        for &b in buf {
            state.input(b);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl Port for SimulatedBoard {
    fn name(&self) -> &str {
        "sim"
    }

    fn set_dtr(&mut self, level: bool) -> Result<()> {
        self.state().dtr = Some(level);
        Ok(())
    }

    fn set_rts(&mut self, level: bool) -> Result<()> {
        let mut state = self.state();
        let was_held = state.rts_history.last() == Some(&true);
        state.rts_history.push(level);
        if was_held && !level {
            state.reset();
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.state().closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::timed::drain_input;

    #[test]
    fn test_reset_prints_banner() {
        let mut board = SimulatedBoard::new(Boot::Prompt);
        drain_input(&mut board).unwrap();
        board.set_rts(true).unwrap();
        board.set_rts(false).unwrap();
        let mut buf = vec![0u8; BANNER.len()];
        board.read_exact(&mut buf).unwrap();
        assert!(buf.ends_with(b">>> "));
    }

    #[test]
    fn test_interrupt_stops_receiver() {
        let mut board = SimulatedBoard::new(Boot::Prompt);
        board
            .write_all(b"\x05file_name=\"t.bin\"\rwith open(file_name, \"wb\") as f: a2b_base64\r\x04")
            .unwrap();
        board.write_all(b"#04YQ==").unwrap();
        board.write_all(&[0x03]).unwrap();

        let state = board.state();
        assert!(matches!(state.mode, Mode::Repl));
        assert_eq!(state.files["t.bin"], b"a");
        assert_eq!(state.interrupts, 1);
    }

    #[test]
    fn test_paste_executes_removal() {
        let mut board = SimulatedBoard::new(Boot::Prompt);
        board
            .state()
            .files
            .insert("x.py".into(), b"1".to_vec());
        board
            .write_all(b"\x05import os\ros.remove(\"x.py\")\r\x04")
            .unwrap();
        assert!(board.state().files.is_empty());
        assert_eq!(board.state().pasted.len(), 1);
    }
}
