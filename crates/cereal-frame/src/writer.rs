use bytes::BytesMut;
use cereal_transport::{CancelToken, PortHandle};
use tracing::debug;

use crate::codec::{encode_send_string, encode_set_baud, encode_shutdown, Command};
use crate::error::Result;

/// Sends complete frames over a shared port.
///
/// Clones share the port. Each frame is encoded up front and committed under
/// the port lock, so concurrent senders never interleave bytes.
#[derive(Debug, Clone)]
pub struct ProtocolWriter {
    port: PortHandle,
    on_shutdown: Option<CancelToken>,
}

impl ProtocolWriter {
    pub fn new(port: PortHandle) -> Self {
        Self {
            port,
            on_shutdown: None,
        }
    }

    /// Cancel `token` once a shutdown frame has gone out.
    pub fn with_shutdown_signal(mut self, token: CancelToken) -> Self {
        self.on_shutdown = Some(token);
        self
    }

    /// Encode and send any command.
    pub fn send(&self, command: &Command) -> Result<()> {
        let mut buf = BytesMut::with_capacity(command.wire_size());
        command.encode_into(&mut buf)?;
        self.commit(command.name(), &buf)?;
        if matches!(command, Command::Shutdown) {
            self.signal_shutdown();
        }
        Ok(())
    }

    pub fn send_string(&self, payload: &[u8]) -> Result<()> {
        let mut buf = BytesMut::new();
        encode_send_string(payload, &mut buf)?;
        self.commit("send_string", &buf)
    }

    pub fn send_set_baud(&self, rate: u32) -> Result<()> {
        let mut buf = BytesMut::new();
        encode_set_baud(rate, &mut buf);
        self.commit("set_baud", &buf)
    }

    pub fn send_shutdown(&self) -> Result<()> {
        let mut buf = BytesMut::new();
        encode_shutdown(&mut buf);
        self.commit("shutdown", &buf)?;
        self.signal_shutdown();
        Ok(())
    }

    pub fn port(&self) -> &PortHandle {
        &self.port
    }

    fn signal_shutdown(&self) {
        if let Some(token) = &self.on_shutdown {
            token.cancel();
        }
    }

    fn commit(&self, command: &'static str, frame: &[u8]) -> Result<()> {
        self.port.write_exact(frame)?;
        debug!(port = self.port.name(), command, bytes = frame.len(), "frame sent");
        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::thread;
    use std::time::Duration;

    use bytes::Bytes;
    use cereal_transport::{CancelToken, PortSettings, TransportPort};

    use super::*;
    use crate::event::ReaderEvent;
    use crate::reader::ProtocolReader;

    fn fast_settings() -> PortSettings {
        PortSettings {
            settle_delay: Duration::ZERO,
            poll_interval: Duration::from_millis(10),
            ..PortSettings::default()
        }
    }

    fn linked() -> (ProtocolWriter, PortHandle) {
        let (left, right) = TransportPort::pipe_pair("left", "right").unwrap();
        let left = PortHandle::new(left);
        let right = PortHandle::new(right);
        left.configure(&fast_settings()).unwrap();
        right.configure(&fast_settings()).unwrap();
        (ProtocolWriter::new(left), right)
    }

    #[test]
    fn writes_exact_frame_bytes() {
        let (writer, right) = linked();
        writer.send_string(b"hi").unwrap();
        writer.send_set_baud(9600).unwrap();
        writer.send_shutdown().unwrap();

        let mut buf = [0u8; 14];
        right
            .read_exact_cancellable(&mut buf, &CancelToken::new())
            .unwrap();
        assert_eq!(
            buf,
            [0x01, 0x02, 0x00, 0x00, 0x00, 0x68, 0x69, 0x01, 0x02, 0x80, 0x25, 0x00, 0x00, 0x03]
        );
    }

    #[test]
    fn send_command_matches_helpers() {
        let (writer, right) = linked();
        writer.send(&Command::send_string("ok")).unwrap();

        let mut reader = ProtocolReader::new(right);
        assert_eq!(
            reader.next_event(),
            Some(ReaderEvent::Message(Bytes::from_static(b"ok")))
        );
    }

    #[test]
    fn concurrent_senders_never_interleave() {
        const PER_THREAD: usize = 50;
        let (writer, right) = linked();

        let senders: Vec<_> = [b'a', b'b', b'c']
            .into_iter()
            .map(|fill| {
                let writer = writer.clone();
                thread::spawn(move || {
                    let payload = vec![fill; 300];
                    for _ in 0..PER_THREAD {
                        writer.send_string(&payload).unwrap();
                    }
                })
            })
            .collect();

        let mut reader = ProtocolReader::new(right);
        let mut counts = [0usize; 3];
        for _ in 0..(3 * PER_THREAD) {
            match reader.next_event() {
                Some(ReaderEvent::Message(payload)) => {
                    assert_eq!(payload.len(), 300);
                    let fill = payload[0];
                    assert!(payload.iter().all(|b| *b == fill));
                    counts[usize::from(fill - b'a')] += 1;
                }
                other => panic!("unexpected event: {other:?}"),
            }
        }

        for sender in senders {
            sender.join().unwrap();
        }
        assert_eq!(counts, [PER_THREAD; 3]);
    }

    #[test]
    fn shutdown_fires_signal_after_send() {
        let (writer, _right) = linked();
        let token = CancelToken::new();
        let writer = writer.with_shutdown_signal(token.clone());

        writer.send_string(b"still open").unwrap();
        writer.send_set_baud(9600).unwrap();
        assert!(!token.is_cancelled());

        writer.send(&Command::Shutdown).unwrap();
        assert!(token.is_cancelled());
    }

    #[test]
    fn failed_shutdown_leaves_signal_untouched() {
        let (writer, _right) = linked();
        let token = CancelToken::new();
        let writer = writer.with_shutdown_signal(token.clone());
        writer.port().close();

        assert!(writer.send_shutdown().is_err());
        assert!(!token.is_cancelled());
    }

    #[test]
    fn send_on_closed_port_fails() {
        let (writer, _right) = linked();
        writer.port().close();
        assert!(writer.send_shutdown().is_err());
    }
}
