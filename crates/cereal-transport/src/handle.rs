use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;

use crate::cancel::CancelToken;
use crate::error::{Result, TransportError};
use crate::port::TransportPort;
use crate::settings::PortSettings;

/// Shared single-owner handle to a [`TransportPort`].
///
/// Writes and configuration hold the port lock for their whole duration, so
/// one frame is never interleaved with another. Cancellable reads take the
/// lock once per poll interval and step aside while a writer or configurer
/// is waiting.
#[derive(Clone)]
pub struct PortHandle {
    shared: Arc<Shared>,
}

struct Shared {
    name: String,
    port: Mutex<TransportPort>,
    waiting: AtomicUsize,
}

impl PortHandle {
    pub fn new(port: TransportPort) -> Self {
        Self {
            shared: Arc::new(Shared {
                name: port.name().to_string(),
                port: Mutex::new(port),
                waiting: AtomicUsize::new(0),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Run `f` with exclusive access, ahead of any polling reader.
    pub fn with_port<R>(&self, f: impl FnOnce(&mut TransportPort) -> R) -> R {
        self.shared.waiting.fetch_add(1, Ordering::AcqRel);
        let mut guard = self.lock();
        self.shared.waiting.fetch_sub(1, Ordering::AcqRel);
        f(&mut guard)
    }

    /// Write one complete frame while holding the port.
    pub fn write_exact(&self, bytes: &[u8]) -> Result<()> {
        self.with_port(|port| port.write_exact(bytes))
    }

    /// Fill `buf` completely, checking `cancel` between polls.
    ///
    /// Blocks for as long as the peer stays silent; only cancellation or a
    /// hard I/O error ends the wait early.
    pub fn read_exact_cancellable(&self, buf: &mut [u8], cancel: &CancelToken) -> Result<()> {
        let mut filled = 0usize;
        while filled < buf.len() {
            if cancel.is_cancelled() {
                return Err(TransportError::Cancelled);
            }
            while self.shared.waiting.load(Ordering::Acquire) > 0 {
                thread::yield_now();
            }
            filled += self.lock().read_some(&mut buf[filled..])?;
        }
        Ok(())
    }

    pub fn configure(&self, settings: &PortSettings) -> Result<()> {
        self.with_port(|port| port.configure(settings))
    }

    /// Reconfigure at a new baud rate, keeping the other line settings.
    pub fn set_baud_rate(&self, baud_rate: u32) -> Result<()> {
        self.with_port(|port| {
            let settings = port
                .settings()
                .ok_or(TransportError::NotConfigured)?
                .with_baud_rate(baud_rate);
            port.configure(&settings)
        })
    }

    /// Record a baud rate already applied through another handle to the
    /// same device.
    pub fn adopt_baud_rate(&self, baud_rate: u32) -> Result<()> {
        self.with_port(|port| {
            let settings = port
                .settings()
                .ok_or(TransportError::NotConfigured)?
                .with_baud_rate(baud_rate);
            port.adopt_settings(settings)
        })
    }

    pub fn settings(&self) -> Option<PortSettings> {
        self.lock().settings().cloned()
    }

    pub fn baud_rate(&self) -> Option<u32> {
        self.lock().baud_rate()
    }

    pub fn is_open(&self) -> bool {
        self.lock().is_open()
    }

    pub fn close(&self) {
        self.with_port(TransportPort::close);
    }

    /// Whether both handles refer to the same port instance.
    pub fn same_port(&self, other: &PortHandle) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    fn lock(&self) -> MutexGuard<'_, TransportPort> {
        self.shared
            .port
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for PortHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortHandle")
            .field("name", &self.shared.name)
            .finish()
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::time::{Duration, Instant};

    use super::*;

    fn fast_settings() -> PortSettings {
        PortSettings {
            settle_delay: Duration::ZERO,
            poll_interval: Duration::from_millis(10),
            ..PortSettings::default()
        }
    }

    fn handle_pair() -> (PortHandle, PortHandle) {
        let (left, right) = TransportPort::pipe_pair("left", "right").unwrap();
        let left = PortHandle::new(left);
        let right = PortHandle::new(right);
        left.configure(&fast_settings()).unwrap();
        right.configure(&fast_settings()).unwrap();
        (left, right)
    }

    #[test]
    fn cancelled_read_returns_promptly() {
        let (_left, right) = handle_pair();
        let cancel = CancelToken::new();

        let reader = {
            let right = right.clone();
            let cancel = cancel.clone();
            thread::spawn(move || {
                let mut buf = [0u8; 8];
                right.read_exact_cancellable(&mut buf, &cancel)
            })
        };

        thread::sleep(Duration::from_millis(30));
        let started = Instant::now();
        cancel.cancel();
        let result = reader.join().unwrap();

        assert!(matches!(result, Err(TransportError::Cancelled)));
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn configure_is_not_starved_by_polling_reader() {
        let (_left, right) = handle_pair();
        let cancel = CancelToken::new();

        let reader = {
            let right = right.clone();
            let cancel = cancel.clone();
            thread::spawn(move || {
                let mut buf = [0u8; 1];
                right.read_exact_cancellable(&mut buf, &cancel)
            })
        };

        thread::sleep(Duration::from_millis(20));
        right.set_baud_rate(9600).unwrap();
        assert_eq!(right.baud_rate(), Some(9600));

        cancel.cancel();
        let _ = reader.join().unwrap();
    }

    #[test]
    fn set_baud_rate_requires_configuration() {
        let (left, _right) = TransportPort::pipe_pair("left", "right").unwrap();
        let left = PortHandle::new(left);
        let err = left.set_baud_rate(9600).unwrap_err();
        assert!(matches!(err, TransportError::NotConfigured));
    }

    #[test]
    fn adopt_baud_rate_updates_recorded_settings() {
        let (left, _right) = handle_pair();
        left.adopt_baud_rate(57_600).unwrap();
        assert_eq!(left.baud_rate(), Some(57_600));
    }

    #[test]
    fn same_port_identity() {
        let (left, right) = handle_pair();
        assert!(left.same_port(&left.clone()));
        assert!(!left.same_port(&right));
    }

    #[test]
    fn close_through_handle() {
        let (left, _right) = handle_pair();
        left.close();
        assert!(!left.is_open());
        assert!(matches!(
            left.write_exact(b"x"),
            Err(TransportError::NotOpen)
        ));
    }
}
