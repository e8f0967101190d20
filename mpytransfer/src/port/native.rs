//! Native serial port implementation using the `serialport` crate.
//!
//! `serialport` has a single timeout for both directions. The REPL protocol
//! wants reads that return immediately and writes bounded by
//! [`SerialConfig::write_timeout`], so the port switches the driver timeout
//! lazily whenever the direction changes.

use {
    crate::{
        error::Result,
        port::{Port, SerialConfig},
    },
    log::trace,
    serialport::{DataBits, FlowControl, Parity, StopBits},
    std::{
        io::{Read, Write},
        time::Duration,
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Read,
    Write,
}

/// Native serial port implementation.
pub struct NativePort {
    port: Option<Box<dyn serialport::SerialPort>>,
    name: String,
    write_timeout: Duration,
    direction: Direction,
}

impl NativePort {
    /// Open a serial port with the given configuration.
    ///
    /// The port is opened 8N1 without flow control.
    pub fn open(config: &SerialConfig) -> Result<Self> {
        let port = serialport::new(&config.port_name, config.baud_rate)
            .timeout(Duration::ZERO)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .open()?;

        Ok(Self {
            port: Some(port),
            name: config
                .port_name
                .clone(),
            write_timeout: config.write_timeout,
            direction: Direction::Read,
        })
    }

    fn port_for(
        &mut self,
        direction: Direction,
    ) -> std::io::Result<&mut Box<dyn serialport::SerialPort>> {
        let write_timeout = self.write_timeout;
        let current = &mut self.direction;
        let port = self
            .port
            .as_mut()
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotConnected, "port closed"))?;

        if *current != direction {
            let timeout = match direction {
                Direction::Read => Duration::ZERO,
                Direction::Write => write_timeout,
            };
            port.set_timeout(timeout)
                .map_err(std::io::Error::other)?;
            *current = direction;
        }

        Ok(port)
    }
}

impl Port for NativePort {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_dtr(&mut self, level: bool) -> Result<()> {
        trace!("Setting DTR to {level}");
        if let Some(ref mut p) = self.port {
            p.write_data_terminal_ready(level)?;
        }
        Ok(())
    }

    fn set_rts(&mut self, level: bool) -> Result<()> {
        trace!("Setting RTS to {level}");
        if let Some(ref mut p) = self.port {
            p.write_request_to_send(level)?;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        // Dropping the handle closes the device
        self.port
            .take();
        Ok(())
    }
}

impl Read for NativePort {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.port_for(Direction::Read)?
            .read(buf)
    }
}

impl Write for NativePort {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.port_for(Direction::Write)?
            .write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.port_for(Direction::Write)?
            .flush()
    }
}
