use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default line speed used by both endpoints until a baud change.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Pause after reconfiguring a port before I/O on it is trusted.
///
/// Chosen empirically for commodity USB-serial adapters; tunable per port.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(1000);

/// Read timeout used to let blocked reads observe cancellation.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Parity setting for the serial line.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    #[default]
    None,
    Odd,
    Even,
}

/// Number of data bits per character.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataBits {
    Five,
    Six,
    Seven,
    #[default]
    Eight,
}

/// Number of stop bits per character.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StopBits {
    #[default]
    One,
    Two,
}

/// Line configuration applied by [`crate::TransportPort::configure`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortSettings {
    pub baud_rate: u32,
    pub parity: Parity,
    pub data_bits: DataBits,
    pub stop_bits: StopBits,
    pub settle_delay: Duration,
    pub poll_interval: Duration,
}

impl Default for PortSettings {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
            parity: Parity::None,
            data_bits: DataBits::Eight,
            stop_bits: StopBits::One,
            settle_delay: DEFAULT_SETTLE_DELAY,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl PortSettings {
    /// Same line settings with a different baud rate.
    pub fn with_baud_rate(&self, baud_rate: u32) -> Self {
        Self {
            baud_rate,
            ..self.clone()
        }
    }

    /// Reject combinations no device accepts before touching the OS.
    pub fn validate(&self) -> std::io::Result<()> {
        if self.baud_rate == 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "baud rate must be greater than zero",
            ));
        }
        if self.poll_interval.is_zero() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "poll interval must be greater than zero",
            ));
        }
        Ok(())
    }

    /// Short `8N1`-style summary for logs.
    pub fn line_summary(&self) -> String {
        let bits = match self.data_bits {
            DataBits::Five => '5',
            DataBits::Six => '6',
            DataBits::Seven => '7',
            DataBits::Eight => '8',
        };
        let parity = match self.parity {
            Parity::None => 'N',
            Parity::Odd => 'O',
            Parity::Even => 'E',
        };
        let stop = match self.stop_bits {
            StopBits::One => '1',
            StopBits::Two => '2',
        };
        format!("{} {bits}{parity}{stop}", self.baud_rate)
    }
}

pub(crate) fn to_serialport_parity(parity: Parity) -> serialport::Parity {
    match parity {
        Parity::None => serialport::Parity::None,
        Parity::Odd => serialport::Parity::Odd,
        Parity::Even => serialport::Parity::Even,
    }
}

pub(crate) fn to_serialport_data_bits(bits: DataBits) -> serialport::DataBits {
    match bits {
        DataBits::Five => serialport::DataBits::Five,
        DataBits::Six => serialport::DataBits::Six,
        DataBits::Seven => serialport::DataBits::Seven,
        DataBits::Eight => serialport::DataBits::Eight,
    }
}

pub(crate) fn to_serialport_stop_bits(bits: StopBits) -> serialport::StopBits {
    match bits {
        StopBits::One => serialport::StopBits::One,
        StopBits::Two => serialport::StopBits::Two,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_8n1_at_115200() {
        let settings = PortSettings::default();
        assert_eq!(settings.baud_rate, DEFAULT_BAUD_RATE);
        assert_eq!(settings.line_summary(), "115200 8N1");
        assert_eq!(settings.settle_delay, DEFAULT_SETTLE_DELAY);
    }

    #[test]
    fn with_baud_rate_keeps_line_settings() {
        let settings = PortSettings {
            parity: Parity::Even,
            stop_bits: StopBits::Two,
            ..PortSettings::default()
        };
        let changed = settings.with_baud_rate(9600);
        assert_eq!(changed.baud_rate, 9600);
        assert_eq!(changed.parity, Parity::Even);
        assert_eq!(changed.stop_bits, StopBits::Two);
        assert_eq!(changed.line_summary(), "9600 8E2");
    }

    #[test]
    fn validate_rejects_zero_baud_and_zero_poll() {
        assert!(PortSettings::default().validate().is_ok());

        let zero_baud = PortSettings::default().with_baud_rate(0);
        let err = zero_baud.validate().unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidInput);

        let zero_poll = PortSettings {
            poll_interval: Duration::ZERO,
            ..PortSettings::default()
        };
        assert!(zero_poll.validate().is_err());
    }

    #[test]
    fn serialport_conversions() {
        assert!(matches!(
            to_serialport_parity(Parity::Odd),
            serialport::Parity::Odd
        ));
        assert!(matches!(
            to_serialport_data_bits(DataBits::Seven),
            serialport::DataBits::Seven
        ));
        assert!(matches!(
            to_serialport_stop_bits(StopBits::Two),
            serialport::StopBits::Two
        ));
    }
}
