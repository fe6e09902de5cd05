use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// Command byte: send string.
pub const CMD_SEND_STRING: u8 = 0x01;
/// Command byte: set baud rate.
pub const CMD_SET_BAUD: u8 = 0x02;
/// Command byte: shutdown.
pub const CMD_SHUTDOWN: u8 = 0x03;

/// Size of the length field of a send-string frame.
pub const LENGTH_SIZE: usize = 4;
/// Size of the rate field of a set-baud frame.
pub const RATE_SIZE: usize = 4;

/// Largest payload the wire can carry; receivers decode the length as `i32`.
pub const MAX_WIRE_PAYLOAD: usize = i32::MAX as usize;

/// Default largest payload a reader will buffer: 16 MiB.
pub const DEFAULT_MAX_PAYLOAD: usize = 16 * 1024 * 1024;

/// One protocol command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    SendString { payload: Bytes },
    SetBaud { rate: u32 },
    Shutdown,
}

impl Command {
    pub fn send_string(payload: impl Into<Bytes>) -> Self {
        Command::SendString {
            payload: payload.into(),
        }
    }

    /// The command byte that starts this command's frame.
    pub fn code(&self) -> u8 {
        match self {
            Command::SendString { .. } => CMD_SEND_STRING,
            Command::SetBaud { .. } => CMD_SET_BAUD,
            Command::Shutdown => CMD_SHUTDOWN,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Command::SendString { .. } => "send_string",
            Command::SetBaud { .. } => "set_baud",
            Command::Shutdown => "shutdown",
        }
    }

    /// Total bytes this command occupies on the wire.
    pub fn wire_size(&self) -> usize {
        match self {
            Command::SendString { payload } => 1 + LENGTH_SIZE + payload.len() + 1,
            Command::SetBaud { .. } => 1 + RATE_SIZE,
            Command::Shutdown => 1,
        }
    }

    /// Append this command's frame to `dst`.
    pub fn encode_into(&self, dst: &mut BytesMut) -> Result<()> {
        match self {
            Command::SendString { payload } => encode_send_string(payload, dst),
            Command::SetBaud { rate } => {
                encode_set_baud(*rate, dst);
                Ok(())
            }
            Command::Shutdown => {
                encode_shutdown(dst);
                Ok(())
            }
        }
    }

    pub fn encode(&self) -> Result<Bytes> {
        let mut dst = BytesMut::with_capacity(self.wire_size());
        self.encode_into(&mut dst)?;
        Ok(dst.freeze())
    }
}

/// Parity byte of a payload: OR of bit 0 over every byte, 0 when empty.
///
/// Only detects corruption that changes whether any byte is odd.
pub fn parity(payload: &[u8]) -> u8 {
    payload.iter().fold(0, |acc, byte| acc | (byte & 0x1))
}

/// Encode a send-string frame.
///
/// Wire format:
/// ```text
/// ┌──────┬──────────────┬──────────────────┬────────┐
/// │ 0x01 │ Length       │ Payload          │ Parity │
/// │ (1B) │ (4B LE)      │ (Length bytes)   │ (1B)   │
/// └──────┴──────────────┴──────────────────┴────────┘
/// ```
pub fn encode_send_string(payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    if payload.len() > MAX_WIRE_PAYLOAD {
        return Err(FrameError::PayloadTooLarge {
            size: payload.len(),
            max: MAX_WIRE_PAYLOAD,
        });
    }
    dst.reserve(1 + LENGTH_SIZE + payload.len() + 1);
    dst.put_u8(CMD_SEND_STRING);
    dst.put_u32_le(payload.len() as u32);
    dst.put_slice(payload);
    dst.put_u8(parity(payload));
    Ok(())
}

/// Encode a set-baud frame: `0x02` followed by the rate as `u32` LE.
pub fn encode_set_baud(rate: u32, dst: &mut BytesMut) {
    dst.reserve(1 + RATE_SIZE);
    dst.put_u8(CMD_SET_BAUD);
    dst.put_u32_le(rate);
}

/// Encode a shutdown frame: the single byte `0x03`.
pub fn encode_shutdown(dst: &mut BytesMut) {
    dst.put_u8(CMD_SHUTDOWN);
}

/// Length field of a send-string frame. Signed: non-positive values are
/// malformed and must never reach an allocation.
pub fn decode_length(field: [u8; LENGTH_SIZE]) -> i32 {
    i32::from_le_bytes(field)
}

/// Rate field of a set-baud frame.
pub fn decode_rate(field: [u8; RATE_SIZE]) -> u32 {
    u32::from_le_bytes(field)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded(command: &Command) -> Vec<u8> {
        command.encode().unwrap().to_vec()
    }

    #[test]
    fn encode_hi_exact_bytes() {
        let mut buf = BytesMut::new();
        encode_send_string(b"hi", &mut buf).unwrap();
        assert_eq!(
            buf.as_ref(),
            &[0x01, 0x02, 0x00, 0x00, 0x00, 0x68, 0x69, 0x01]
        );
    }

    #[test]
    fn encode_baud_9600_exact_bytes() {
        let mut buf = BytesMut::new();
        encode_set_baud(9600, &mut buf);
        assert_eq!(buf.as_ref(), &[0x02, 0x80, 0x25, 0x00, 0x00]);
    }

    #[test]
    fn encode_shutdown_exact_bytes() {
        let mut buf = BytesMut::new();
        encode_shutdown(&mut buf);
        assert_eq!(buf.as_ref(), &[0x03]);
    }

    #[test]
    fn encode_empty_string() {
        let mut buf = BytesMut::new();
        encode_send_string(b"", &mut buf).unwrap();
        assert_eq!(buf.as_ref(), &[0x01, 0x00, 0x00, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn parity_is_or_of_low_bits() {
        assert_eq!(parity(b""), 0);
        assert_eq!(parity(&[0x02, 0x04, 0xF0]), 0);
        assert_eq!(parity(&[0x02, 0x03]), 1);
        assert_eq!(parity(b"h"), 0);
        assert_eq!(parity(b"hi"), 1);
    }

    #[test]
    fn command_encoding_matches_free_functions() {
        assert_eq!(
            encoded(&Command::send_string("hi")),
            vec![0x01, 0x02, 0x00, 0x00, 0x00, 0x68, 0x69, 0x01]
        );
        assert_eq!(
            encoded(&Command::SetBaud { rate: 9600 }),
            vec![0x02, 0x80, 0x25, 0x00, 0x00]
        );
        assert_eq!(encoded(&Command::Shutdown), vec![0x03]);
    }

    #[test]
    fn wire_size_matches_encoding() {
        let commands = [
            Command::send_string(vec![0xAB; 300]),
            Command::SetBaud { rate: 115_200 },
            Command::Shutdown,
        ];
        for command in commands {
            assert_eq!(command.wire_size(), encoded(&command).len());
        }
    }

    #[test]
    fn length_field_is_little_endian_and_signed() {
        assert_eq!(decode_length([0x02, 0x00, 0x00, 0x00]), 2);
        assert_eq!(decode_length([0xFF, 0xFF, 0xFF, 0xFF]), -1);
        assert_eq!(decode_length([0x00, 0x00, 0x00, 0x80]), i32::MIN);
    }

    #[test]
    fn rate_field_is_little_endian() {
        assert_eq!(decode_rate([0x80, 0x25, 0x00, 0x00]), 9600);
        assert_eq!(decode_rate([0x00, 0xC2, 0x01, 0x00]), 115_200);
    }

    #[test]
    fn command_codes_and_names() {
        assert_eq!(Command::send_string("x").code(), CMD_SEND_STRING);
        assert_eq!(Command::SetBaud { rate: 1 }.code(), CMD_SET_BAUD);
        assert_eq!(Command::Shutdown.code(), CMD_SHUTDOWN);
        assert_eq!(Command::Shutdown.name(), "shutdown");
    }
}
