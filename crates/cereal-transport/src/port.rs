use std::io::{ErrorKind, Read, Write};
use std::thread;

use tracing::{debug, info, warn};

use crate::error::{Result, TransportError};
use crate::settings::{
    to_serialport_data_bits, to_serialport_parity, to_serialport_stop_bits, PortSettings,
    DEFAULT_BAUD_RATE, DEFAULT_POLL_INTERVAL,
};

/// One serial connection: open, configure, exact-count read/write, close.
///
/// A port is created open but unconfigured. Every read or write checks that
/// the port is both open and configured and fails with
/// [`TransportError::NotOpen`] or [`TransportError::NotConfigured`] otherwise.
pub struct TransportPort {
    name: String,
    settings: Option<PortSettings>,
    device: Option<Device>,
}

enum Device {
    Native(Box<dyn serialport::SerialPort>),
    /// One end of a socket pair acting as a virtual null-modem cable.
    #[cfg(unix)]
    Pipe(std::os::unix::net::UnixStream),
}

impl Read for Device {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self {
            Device::Native(port) => port.read(buf),
            #[cfg(unix)]
            Device::Pipe(stream) => stream.read(buf),
        }
    }
}

impl Write for Device {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self {
            Device::Native(port) => port.write(buf),
            #[cfg(unix)]
            Device::Pipe(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self {
            Device::Native(port) => port.flush(),
            #[cfg(unix)]
            Device::Pipe(stream) => stream.flush(),
        }
    }
}

impl Device {
    fn apply(&mut self, settings: &PortSettings) -> std::io::Result<()> {
        match self {
            Device::Native(port) => {
                port.set_baud_rate(settings.baud_rate)?;
                port.set_parity(to_serialport_parity(settings.parity))?;
                port.set_data_bits(to_serialport_data_bits(settings.data_bits))?;
                port.set_stop_bits(to_serialport_stop_bits(settings.stop_bits))?;
                port.set_flow_control(serialport::FlowControl::None)?;
                port.set_timeout(settings.poll_interval)?;
                // Pseudo-terminals have no modem lines.
                if let Err(err) = port.write_data_terminal_ready(true) {
                    debug!(error = %err, "device does not support DTR");
                }
                port.clear(serialport::ClearBuffer::All)?;
                Ok(())
            }
            #[cfg(unix)]
            Device::Pipe(stream) => stream.set_read_timeout(Some(settings.poll_interval)),
        }
    }

    /// Take any error latched on the device since the last operation.
    fn take_stale_error(&mut self) -> Option<std::io::Error> {
        match self {
            // Queue status goes through ClearCommError, which resets the
            // latched line error flags.
            #[cfg(windows)]
            Device::Native(port) => port.bytes_to_read().err().map(std::io::Error::from),
            // termios reports faults on the failing call; nothing is latched.
            #[cfg(not(windows))]
            Device::Native(_) => None,
            #[cfg(unix)]
            Device::Pipe(stream) => stream.take_error().ok().flatten(),
        }
    }

    fn try_clone(&self) -> std::io::Result<Self> {
        match self {
            Device::Native(port) => Ok(Device::Native(port.try_clone()?)),
            #[cfg(unix)]
            Device::Pipe(stream) => Ok(Device::Pipe(stream.try_clone()?)),
        }
    }

    fn shutdown(&self) {
        match self {
            Device::Native(_) => {}
            #[cfg(unix)]
            Device::Pipe(stream) => {
                let _ = stream.shutdown(std::net::Shutdown::Both);
            }
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Device::Native(_) => "native",
            #[cfg(unix)]
            Device::Pipe(_) => "pipe",
        }
    }
}

impl TransportPort {
    /// Exclusively acquire the named serial device.
    ///
    /// The port is left unconfigured; call [`TransportPort::configure`]
    /// before any I/O.
    pub fn open(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let port = serialport::new(&name, DEFAULT_BAUD_RATE)
            .timeout(DEFAULT_POLL_INTERVAL)
            .open()
            .map_err(|err| TransportError::Open {
                name: name.clone(),
                source: err.into(),
            })?;

        info!(port = %name, "opened serial device");
        Ok(Self {
            name,
            settings: None,
            device: Some(Device::Native(port)),
        })
    }

    /// Create two connected in-memory ports, wired like a null-modem cable.
    #[cfg(unix)]
    pub fn pipe_pair(left: impl Into<String>, right: impl Into<String>) -> Result<(Self, Self)> {
        let (a, b) = std::os::unix::net::UnixStream::pair()?;
        let left = Self {
            name: left.into(),
            settings: None,
            device: Some(Device::Pipe(a)),
        };
        let right = Self {
            name: right.into(),
            settings: None,
            device: Some(Device::Pipe(b)),
        };
        debug!(left = %left.name, right = %right.name, "created pipe pair");
        Ok((left, right))
    }

    /// Apply line settings, purge stale buffers, then wait out the settle delay.
    pub fn configure(&mut self, settings: &PortSettings) -> Result<()> {
        let name = self.name.clone();
        let device = self.device.as_mut().ok_or(TransportError::NotOpen)?;

        settings
            .validate()
            .and_then(|()| device.apply(settings))
            .map_err(|source| TransportError::Config {
                name: name.clone(),
                source,
            })?;

        self.clear_errors();

        if !settings.settle_delay.is_zero() {
            debug!(port = %name, delay = ?settings.settle_delay, "waiting for port to settle");
            thread::sleep(settings.settle_delay);
        }

        self.settings = Some(settings.clone());
        info!(port = %name, line = %settings.line_summary(), "configured port");
        Ok(())
    }

    /// Record settings that were applied through another handle onto the
    /// same device. No OS call and no settle delay.
    pub fn adopt_settings(&mut self, settings: PortSettings) -> Result<()> {
        if self.device.is_none() {
            return Err(TransportError::NotOpen);
        }
        self.settings = Some(settings);
        Ok(())
    }

    /// Read at most `buf.len()` bytes, waiting no longer than the poll interval.
    ///
    /// Returns `Ok(0)` when the interval elapsed without data.
    pub fn read_some(&mut self, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let device = self.ready_device()?;
        match device.read(buf) {
            Ok(0) => Err(TransportError::Disconnected),
            Ok(n) => Ok(n),
            Err(err) if is_retryable(err.kind()) => Ok(0),
            Err(err) => Err(TransportError::Io(err)),
        }
    }

    /// Block until `buf` is completely filled.
    ///
    /// Short reads and poll timeouts are retried; there is no overall timeout.
    pub fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        let mut filled = 0usize;
        while filled < buf.len() {
            filled += self.read_some(&mut buf[filled..])?;
        }
        Ok(())
    }

    /// Block until every byte has been handed to the device, then flush.
    pub fn write_exact(&mut self, bytes: &[u8]) -> Result<()> {
        let device = self.ready_device()?;

        let mut offset = 0usize;
        while offset < bytes.len() {
            match device.write(&bytes[offset..]) {
                Ok(0) => return Err(TransportError::Disconnected),
                Ok(n) => offset += n,
                Err(err) if is_retryable(err.kind()) => continue,
                Err(err) => return Err(TransportError::Io(err)),
            }
        }

        loop {
            match device.flush() {
                Ok(()) => return Ok(()),
                Err(err) if is_retryable(err.kind()) => continue,
                Err(err) => return Err(TransportError::Io(err)),
            }
        }
    }

    /// Release the device. Safe to call on a closed port.
    pub fn close(&mut self) {
        if let Some(device) = self.device.take() {
            device.shutdown();
            info!(port = %self.name, kind = device.kind(), "closed port");
        }
        self.settings = None;
    }

    /// Open a second handle onto the same device with the same settings.
    pub fn try_clone(&self) -> Result<Self> {
        let device = self.device.as_ref().ok_or(TransportError::NotOpen)?;
        Ok(Self {
            name: self.name.clone(),
            settings: self.settings.clone(),
            device: Some(device.try_clone()?),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Settings applied by the last successful configure.
    pub fn settings(&self) -> Option<&PortSettings> {
        self.settings.as_ref()
    }

    pub fn baud_rate(&self) -> Option<u32> {
        self.settings.as_ref().map(|s| s.baud_rate)
    }

    pub fn is_open(&self) -> bool {
        self.device.is_some()
    }

    pub fn is_configured(&self) -> bool {
        self.device.is_some() && self.settings.is_some()
    }

    /// Take and log any error latched on the device so it cannot surface
    /// from the next read or write.
    pub fn clear_errors(&mut self) {
        if let Some(stale) = self.device.as_mut().and_then(Device::take_stale_error) {
            warn!(port = %self.name, error = %stale, "cleared stale device error");
        }
    }

    fn ready_device(&mut self) -> Result<&mut Device> {
        if self.device.is_none() {
            return Err(TransportError::NotOpen);
        }
        if self.settings.is_none() {
            return Err(TransportError::NotConfigured);
        }
        self.clear_errors();
        self.device.as_mut().ok_or(TransportError::NotOpen)
    }
}

impl Drop for TransportPort {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for TransportPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportPort")
            .field("name", &self.name)
            .field("kind", &self.device.as_ref().map(Device::kind))
            .field("settings", &self.settings)
            .finish()
    }
}

fn is_retryable(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::Interrupted | ErrorKind::WouldBlock | ErrorKind::TimedOut
    )
}
