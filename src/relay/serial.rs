//! Point-to-point byte transport for relay frames

use crate::transport::TransportError;
use std::io::{ErrorKind, Read, Write};
use std::time::Duration;
use tracing::debug;

/// Read timeout for serial ports; a read that times out means "no data yet"
const SERIAL_READ_TIMEOUT: Duration = Duration::from_millis(5);

pub trait RelayTransport {
    /// Write one frame followed by the line terminator
    fn write_line(&mut self, line: &str) -> Result<(), TransportError>;

    /// Read whatever is available without waiting; `Ok(0)` means nothing pending
    fn read_available(&mut self, buf: &mut [u8]) -> Result<usize, TransportError>;
}

/// Relay transport over any byte stream (serial port, TCP socket, pipe)
#[derive(Debug)]
pub struct StreamTransport<S> {
    stream: S,
}

impl<S> StreamTransport<S> {
    pub fn new(stream: S) -> Self {
        Self { stream }
    }

    pub fn into_inner(self) -> S {
        self.stream
    }
}

impl<S: Read + Write> RelayTransport for StreamTransport<S> {
    fn write_line(&mut self, line: &str) -> Result<(), TransportError> {
        self.stream.write_all(line.as_bytes())?;
        self.stream.write_all(b"\n")?;
        self.stream.flush()?;
        Ok(())
    }

    fn read_available(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        match self.stream.read(buf) {
            Ok(n) => Ok(n),
            Err(e)
                if matches!(
                    e.kind(),
                    ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted
                ) =>
            {
                Ok(0)
            }
            Err(e) => Err(e.into()),
        }
    }
}

pub type SerialTransport = StreamTransport<Box<dyn serialport::SerialPort>>;

/// Open a serial device as a relay transport
pub fn open_serial(path: &str, baud_rate: u32) -> Result<SerialTransport, TransportError> {
    let port = serialport::new(path, baud_rate)
        .timeout(SERIAL_READ_TIMEOUT)
        .open()
        .map_err(|e| TransportError::Unavailable(format!("{path}: {e}")))?;
    debug!("Opened relay serial port {} at {} baud", path, baud_rate);
    Ok(StreamTransport::new(port))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_write_line_appends_terminator() {
        let mut transport = StreamTransport::new(Cursor::new(Vec::new()));
        transport.write_line(r#"{"cmd":"status"}"#).unwrap();
        assert_eq!(
            transport.into_inner().into_inner(),
            b"{\"cmd\":\"status\"}\n".to_vec()
        );
    }

    #[test]
    fn test_read_available_drains_then_reports_empty() {
        let mut transport = StreamTransport::new(Cursor::new(b"abc".to_vec()));
        let mut buf = [0u8; 8];
        assert_eq!(transport.read_available(&mut buf).unwrap(), 3);
        assert_eq!(&buf[..3], b"abc");
        assert_eq!(transport.read_available(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_open_missing_port_is_unavailable() {
        let result = open_serial("/dev/does-not-exist-uplink", 115_200);
        assert!(matches!(result, Err(TransportError::Unavailable(_))));
    }
}
