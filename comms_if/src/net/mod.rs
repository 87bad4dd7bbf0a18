//! # Network Module
//!
//! This module abstracts over the link between the vehicle server and its micro-controller. The
//! byte level mechanics of the link belong to the transport, the server only sees whole parsed
//! messages going in and whole commands going out.
//!
//! Two transports are provided:
//!  - `ChannelTransport`, an in-process pair of channels, used for simulation and testing.
//!  - `JsonLinesTransport`, newline-delimited JSON over any reader/writer pair (a serial port
//!    device, a socket, or stdin/stdout).

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::{
    io::{BufRead, Write},
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc::{channel, Receiver, RecvTimeoutError, Sender},
        Arc, Mutex,
    },
    thread,
    time::Duration,
};

use log::debug;
use serde_json::Value;

use crate::eqpt::{McuCommand, McuMessage};

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// A link to the micro-controller.
///
/// Implementations must be shareable between the inbound consumer and the periodic update loop.
pub trait Transport: Send + Sync {
    /// Send a command to the micro-controller.
    fn send(&self, cmd: &McuCommand) -> Result<(), TransportError>;

    /// Receive the next message.
    ///
    /// Implementations should wait no longer than a short, bounded time before returning
    /// `Ok(None)` if nothing arrived.
    fn receive(&self) -> Result<Option<McuMessage>, TransportError>;

    /// Return if the link is currently connected.
    fn is_connected(&self) -> bool;
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(thiserror::Error, Debug)]
pub enum TransportError {
    #[error("The link to the micro-controller is not connected")]
    NotConnected,

    #[error("The link to the micro-controller has been closed")]
    Closed,

    #[error("Received malformed data: {0}")]
    MalformedData(String),

    #[error("Link I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Could not serialize the command: {0}")]
    SerializationError(serde_json::Error),
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Server side of an in-process link.
pub struct ChannelTransport {
    cmd_sender: Mutex<Sender<McuCommand>>,

    msg_receiver: Mutex<Receiver<McuMessage>>,

    connected: Arc<AtomicBool>,

    recv_timeout: Duration,
}

/// Micro-controller side of an in-process link.
pub struct McuEndpoint {
    msg_sender: Sender<McuMessage>,

    cmd_receiver: Receiver<McuCommand>,

    connected: Arc<AtomicBool>,
}

/// Newline-delimited JSON over a reader/writer pair.
///
/// Reads block on the underlying reader, so a reader with a read timeout should be used if the
/// consumer must be able to stop promptly.
pub struct JsonLinesTransport<R, W> {
    reader: Mutex<R>,

    writer: Mutex<W>,

    connected: AtomicBool,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl ChannelTransport {
    /// Create a new in-process link, returning the server side and the micro-controller side.
    ///
    /// The link starts disconnected, use `McuEndpoint::set_connected` to connect it.
    pub fn pair(recv_timeout: Duration) -> (ChannelTransport, McuEndpoint) {
        let (cmd_sender, cmd_receiver) = channel();
        let (msg_sender, msg_receiver) = channel();
        let connected = Arc::new(AtomicBool::new(false));

        (
            ChannelTransport {
                cmd_sender: Mutex::new(cmd_sender),
                msg_receiver: Mutex::new(msg_receiver),
                connected: connected.clone(),
                recv_timeout,
            },
            McuEndpoint {
                msg_sender,
                cmd_receiver,
                connected,
            },
        )
    }
}

impl Transport for ChannelTransport {
    fn send(&self, cmd: &McuCommand) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }

        let sender = self
            .cmd_sender
            .lock()
            .map_err(|_| TransportError::Closed)?;

        sender.send(cmd.clone()).map_err(|_| TransportError::Closed)
    }

    fn receive(&self) -> Result<Option<McuMessage>, TransportError> {
        if !self.is_connected() {
            thread::sleep(self.recv_timeout);
            return Err(TransportError::NotConnected);
        }

        let receiver = self
            .msg_receiver
            .lock()
            .map_err(|_| TransportError::Closed)?;

        match receiver.recv_timeout(self.recv_timeout) {
            Ok(m) => Ok(Some(m)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(TransportError::Closed),
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }
}

impl McuEndpoint {
    /// Set whether the link is connected.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Relaxed);
    }

    /// Send a message to the server.
    pub fn send(&self, msg: McuMessage) -> Result<(), TransportError> {
        self.msg_sender.send(msg).map_err(|_| TransportError::Closed)
    }

    /// Parse a JSON string and send it to the server.
    pub fn send_json(&self, json_str: &str) -> Result<(), TransportError> {
        self.send(parse_message(json_str)?)
    }

    /// Wait up to `timeout` for the next command from the server.
    pub fn recv_command(&self, timeout: Duration) -> Option<McuCommand> {
        self.cmd_receiver.recv_timeout(timeout).ok()
    }

    /// Take every command currently queued by the server.
    pub fn drain_commands(&self) -> Vec<McuCommand> {
        self.cmd_receiver.try_iter().collect()
    }
}

impl<R, W> JsonLinesTransport<R, W>
where
    R: BufRead + Send,
    W: Write + Send,
{
    /// Create a new transport over the given reader and writer.
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
            connected: AtomicBool::new(true),
        }
    }
}

impl<R, W> Transport for JsonLinesTransport<R, W>
where
    R: BufRead + Send,
    W: Write + Send,
{
    fn send(&self, cmd: &McuCommand) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }

        let line = serde_json::to_string(cmd).map_err(TransportError::SerializationError)?;

        let mut writer = self.writer.lock().map_err(|_| TransportError::Closed)?;
        writeln!(writer, "{}", line)?;
        writer.flush()?;

        Ok(())
    }

    fn receive(&self) -> Result<Option<McuMessage>, TransportError> {
        let mut line = String::new();

        let num_bytes = {
            let mut reader = self.reader.lock().map_err(|_| TransportError::Closed)?;
            reader.read_line(&mut line)?
        };

        // End of stream means the other end went away
        if num_bytes == 0 {
            if self.connected.swap(false, Ordering::Relaxed) {
                debug!("End of stream on the micro-controller link");
            }
            return Err(TransportError::Closed);
        }

        if line.trim().is_empty() {
            return Ok(None);
        }

        parse_message(&line).map(Some)
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Parse a message from a JSON string. The top level must be an object.
pub fn parse_message(json_str: &str) -> Result<McuMessage, TransportError> {
    match serde_json::from_str(json_str.trim()) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(TransportError::MalformedData(format!(
            "expected a JSON object, found {}",
            other
        ))),
        Err(e) => Err(TransportError::MalformedData(e.to_string())),
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_channel_transport() {
        let (transport, mcu) = ChannelTransport::pair(Duration::from_millis(5));

        // Disconnected links refuse traffic
        assert!(matches!(
            transport.send(&McuCommand::new()),
            Err(TransportError::NotConnected)
        ));
        assert!(matches!(transport.receive(), Err(TransportError::NotConnected)));

        mcu.set_connected(true);
        assert!(transport.is_connected());

        // Nothing queued yet
        assert!(matches!(transport.receive(), Ok(None)));

        mcu.send_json(r#"{"s1": {"type": "atlas_ph", "data": 7.1}}"#).unwrap();
        let msg = transport.receive().unwrap().unwrap();
        assert_eq!(msg["s1"]["data"].as_f64(), Some(7.1));

        transport
            .send(&McuCommand::new().with_motor_velocity(1, 0.25))
            .unwrap();
        let cmd = mcu.recv_command(Duration::from_millis(100)).unwrap();
        assert_eq!(cmd.field_f64("m1", "v"), Some(0.25));

        drop(mcu);
        assert!(matches!(transport.receive(), Err(TransportError::Closed)));
    }

    #[test]
    fn test_json_lines_transport() {
        let input = "{\"g0\": {\"lat\": 40.0, \"lon\": -80.0, \"time\": 12}}\n\n[1, 2]\n";
        let transport = JsonLinesTransport::new(Cursor::new(input.as_bytes()), Vec::new());

        let msg = transport.receive().unwrap().unwrap();
        assert_eq!(msg["g0"]["time"].as_i64(), Some(12));
        assert!(matches!(transport.receive(), Ok(None)));
        assert!(matches!(
            transport.receive(),
            Err(TransportError::MalformedData(_))
        ));
        assert!(matches!(transport.receive(), Err(TransportError::Closed)));
        assert!(!transport.is_connected());

        // Reading past the end keeps reporting a closed link
        assert!(matches!(transport.receive(), Err(TransportError::Closed)));
        assert!(!transport.is_connected());
    }

    #[test]
    fn test_json_lines_send() {
        let transport = JsonLinesTransport::new(Cursor::new(&b""[..]), Vec::new());
        transport
            .send(&McuCommand::new().with_motor_velocity(0, 1.0))
            .unwrap();

        let written = transport.writer.lock().unwrap().clone();
        assert_eq!(String::from_utf8(written).unwrap(), "{\"m0\":{\"v\":1.0}}\n");
    }
}
