// Feetech STS3215 serial protocol
//
// Drive servos run in velocity mode, steering servos in step mode; all
// eight share one half-duplex bus.
// Packet format: [0xFF, 0xFF, ID, Length, Instruction, Params..., Checksum]

use std::io::{Read, Write};
use std::time::Duration;
use tracing::debug;

/// Default serial configuration for Feetech motors
pub const DEFAULT_BAUDRATE: u32 = 1_000_000;
pub const DEFAULT_TIMEOUT_MS: u64 = 100;

/// Position register resolution: 12 bits per servo revolution
pub const POSITION_COUNTS: u16 = 4096;

/// Largest magnitude the sign-magnitude velocity register can hold
pub const MAX_VELOCITY_RAW: i16 = 0x7FFF;

/// Packet header bytes
const HEADER: [u8; 2] = [0xFF, 0xFF];

/// Broadcast ID used by sync write
const BROADCAST_ID: u8 = 0xFE;

/// Instruction set
#[repr(u8)]
#[derive(Debug, Clone, Copy)]
pub enum Instruction {
    Ping = 0x01,
    Read = 0x02,
    Write = 0x03,
    SyncWrite = 0x83,
}

/// Register addresses for STS3215 (RAM area)
#[repr(u8)]
#[derive(Debug, Clone, Copy)]
pub enum Register {
    OperatingMode = 33,   // 1 byte: 0=position, 1=velocity, 3=step
    TorqueEnable = 40,    // 1 byte: 0=off, 1=on
    GoalPosition = 42,    // 2 bytes (sign-magnitude relative steps in step mode)
    GoalVelocity = 46,    // 2 bytes (sign-magnitude, velocity mode)
    Lock = 55,            // 1 byte: 0=unlocked, 1=locked
    PresentPosition = 56, // 2 bytes, read-only
    PresentVelocity = 58, // 2 bytes, read-only (sign-magnitude)
}

/// Operating modes used by the swerve modules
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OperatingMode {
    Position = 0,
    Velocity = 1,
    Step = 3,
}

/// Error types for Feetech communication
#[derive(Debug, thiserror::Error)]
pub enum FeetechError {
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid response from motor {id}: {reason}")]
    InvalidResponse { id: u8, reason: String },

    #[error("Checksum mismatch for motor {id}")]
    ChecksumMismatch { id: u8 },

    #[error("Motor {id} returned error status: 0x{status:02X}")]
    MotorError { id: u8, status: u8 },

    #[error("Timeout waiting for response from motor {id}")]
    Timeout { id: u8 },
}

pub type Result<T> = std::result::Result<T, FeetechError>;

/// Byte stream the bus talks over (a serial port, or a buffer in tests)
pub trait Port: Read + Write + Send {}

impl<T: Read + Write + Send> Port for T {}

/// Feetech motor bus - handles serial communication with motors
pub struct FeetechBus {
    port: Box<dyn Port>,
}

impl FeetechBus {
    /// Open a new connection to the motor bus
    pub fn open(port_name: &str) -> Result<Self> {
        Self::open_with_baudrate(port_name, DEFAULT_BAUDRATE)
    }

    /// Open with custom baudrate
    pub fn open_with_baudrate(port_name: &str, baudrate: u32) -> Result<Self> {
        let port = serialport::new(port_name, baudrate)
            .timeout(Duration::from_millis(DEFAULT_TIMEOUT_MS))
            .open()?;

        Ok(Self::with_port(Box::new(port)))
    }

    /// Talk over an already-open byte stream
    pub fn with_port(port: Box<dyn Port>) -> Self {
        Self { port }
    }

    /// Checksum over id, length, instruction and params: inverted low byte of the sum
    fn checksum(data: &[u8]) -> u8 {
        let sum: u16 = data.iter().map(|&b| b as u16).sum();
        (!sum & 0xFF) as u8
    }

    fn build_packet(id: u8, instruction: Instruction, params: &[u8]) -> Vec<u8> {
        let length = (params.len() + 2) as u8; // params + instruction + checksum
        let mut packet = Vec::with_capacity(6 + params.len());

        packet.extend_from_slice(&HEADER);
        packet.push(id);
        packet.push(length);
        packet.push(instruction as u8);
        packet.extend_from_slice(params);
        packet.push(Self::checksum(&packet[2..]));

        packet
    }

    fn send_packet(&mut self, packet: &[u8]) -> Result<()> {
        self.port.write_all(packet)?;
        self.port.flush()?;
        Ok(())
    }

    /// Read a status packet and return its parameters
    fn read_response(&mut self, expected_id: u8) -> Result<Vec<u8>> {
        let mut header = [0u8; 2];
        self.port.read_exact(&mut header).map_err(|e| match e.kind() {
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::UnexpectedEof => {
                FeetechError::Timeout { id: expected_id }
            }
            _ => FeetechError::Io(e),
        })?;

        if header != HEADER {
            return Err(FeetechError::InvalidResponse {
                id: expected_id,
                reason: format!("Invalid header: {:02X?}", header),
            });
        }

        let mut id_length = [0u8; 2];
        self.port.read_exact(&mut id_length)?;
        let [id, length] = id_length;

        if id != expected_id {
            return Err(FeetechError::InvalidResponse {
                id: expected_id,
                reason: format!("ID mismatch: expected {}, got {}", expected_id, id),
            });
        }
        if length < 2 {
            return Err(FeetechError::InvalidResponse {
                id,
                reason: format!("Length {} too short for a status packet", length),
            });
        }

        // error + params + checksum
        let mut remaining = vec![0u8; length as usize];
        self.port.read_exact(&mut remaining)?;

        let (body, checksum) = remaining.split_at(remaining.len() - 1);
        let mut checksum_data = vec![id, length];
        checksum_data.extend_from_slice(body);
        if Self::checksum(&checksum_data) != checksum[0] {
            return Err(FeetechError::ChecksumMismatch { id });
        }

        let status = body[0];
        if status != 0 {
            return Err(FeetechError::MotorError { id, status });
        }

        Ok(body[1..].to_vec())
    }

    /// Ping a motor to check if it's connected
    pub fn ping(&mut self, id: u8) -> Result<bool> {
        let packet = Self::build_packet(id, Instruction::Ping, &[]);
        self.send_packet(&packet)?;

        match self.read_response(id) {
            Ok(_) => Ok(true),
            Err(FeetechError::Timeout { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Write a single byte to a register
    pub fn write_u8(&mut self, id: u8, register: Register, value: u8) -> Result<()> {
        debug!("Write u8 to motor {}: reg={:?}, value={}", id, register, value);
        let packet = Self::build_packet(id, Instruction::Write, &[register as u8, value]);
        self.send_packet(&packet)?;
        self.read_response(id).map(|_| ())
    }

    /// Write two bytes (little-endian) to a register
    pub fn write_u16(&mut self, id: u8, register: Register, value: u16) -> Result<()> {
        debug!("Write u16 to motor {}: reg={:?}, value={}", id, register, value);
        let [lo, hi] = value.to_le_bytes();
        let packet = Self::build_packet(id, Instruction::Write, &[register as u8, lo, hi]);
        self.send_packet(&packet)?;
        self.read_response(id).map(|_| ())
    }

    /// Read a single byte from a register
    pub fn read_u8(&mut self, id: u8, register: Register) -> Result<u8> {
        let packet = Self::build_packet(id, Instruction::Read, &[register as u8, 1]);
        self.send_packet(&packet)?;

        let response = self.read_response(id)?;
        response
            .first()
            .copied()
            .ok_or_else(|| FeetechError::InvalidResponse {
                id,
                reason: "Empty response".to_string(),
            })
    }

    /// Read two bytes (little-endian) from a register
    pub fn read_u16(&mut self, id: u8, register: Register) -> Result<u16> {
        let packet = Self::build_packet(id, Instruction::Read, &[register as u8, 2]);
        self.send_packet(&packet)?;

        let response = self.read_response(id)?;
        match response.as_slice() {
            [lo, hi, ..] => Ok(u16::from_le_bytes([*lo, *hi])),
            _ => Err(FeetechError::InvalidResponse {
                id,
                reason: format!("Expected 2 bytes, got {}", response.len()),
            }),
        }
    }

    /// Sync write signed 16-bit values to the same register of several motors
    ///
    /// Broadcast, so no status packets come back.
    pub fn sync_write_i16(&mut self, register: Register, data: &[(u8, i16)]) -> Result<()> {
        if data.is_empty() {
            return Ok(());
        }

        // [start_addr, data_length, id1, lo1, hi1, id2, lo2, hi2, ...]
        let mut params = vec![register as u8, 2];
        for &(id, value) in data {
            let [lo, hi] = encode_sign_magnitude(value).to_le_bytes();
            params.extend_from_slice(&[id, lo, hi]);
        }

        let packet = Self::build_packet(BROADCAST_ID, Instruction::SyncWrite, &params);
        debug!("Sync write to {} motors: reg={:?}", data.len(), register);
        self.send_packet(&packet)
    }

    // === High-level convenience methods ===

    pub fn enable_torque(&mut self, id: u8) -> Result<()> {
        self.write_u8(id, Register::TorqueEnable, 1)?;
        self.write_u8(id, Register::Lock, 1)
    }

    pub fn disable_torque(&mut self, id: u8) -> Result<()> {
        self.write_u8(id, Register::TorqueEnable, 0)?;
        self.write_u8(id, Register::Lock, 0)
    }

    /// Set operating mode (must disable torque first)
    pub fn set_operating_mode(&mut self, id: u8, mode: OperatingMode) -> Result<()> {
        self.write_u8(id, Register::OperatingMode, mode as u8)
    }

    /// Set goal velocity (velocity mode), steps per second
    pub fn set_velocity(&mut self, id: u8, velocity: i16) -> Result<()> {
        self.write_u16(id, Register::GoalVelocity, encode_sign_magnitude(velocity))
    }

    /// Read present velocity, steps per second
    pub fn get_velocity(&mut self, id: u8) -> Result<i16> {
        let raw = self.read_u16(id, Register::PresentVelocity)?;
        Ok(decode_sign_magnitude(raw))
    }

    /// Move by a relative number of steps (step mode), never wrapping at the seam
    pub fn set_goal_step(&mut self, id: u8, steps: i16) -> Result<()> {
        self.write_u16(id, Register::GoalPosition, encode_sign_magnitude(steps))
    }

    /// Read present single-turn position (0..4096)
    pub fn get_position(&mut self, id: u8) -> Result<u16> {
        let raw = self.read_u16(id, Register::PresentPosition)?;
        Ok(raw % POSITION_COUNTS)
    }
}

/// Sign-magnitude: bit 15 = sign (1 = negative), bits 0-14 = magnitude
fn encode_sign_magnitude(value: i16) -> u16 {
    let magnitude = value.unsigned_abs().min(MAX_VELOCITY_RAW as u16);
    if value < 0 { 0x8000 | magnitude } else { magnitude }
}

fn decode_sign_magnitude(raw: u16) -> i16 {
    let magnitude = (raw & 0x7FFF) as i16;
    if raw & 0x8000 != 0 { -magnitude } else { magnitude }
}

/// In-memory port: replies are queued up front, writes are captured
#[cfg(test)]
pub(crate) mod mock {
    use std::collections::VecDeque;
    use std::io::{self, Read, Write};
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    pub struct MockPort {
        inner: Arc<Mutex<MockPortInner>>,
    }

    #[derive(Default)]
    struct MockPortInner {
        replies: VecDeque<u8>,
        written: Vec<u8>,
    }

    impl MockPort {
        /// Queue a status packet with the given parameters
        pub fn reply(&self, id: u8, params: &[u8]) {
            let length = (params.len() + 2) as u8;
            let mut body = vec![id, length, 0];
            body.extend_from_slice(params);
            let sum: u16 = body.iter().map(|&b| b as u16).sum();

            let mut inner = self.inner.lock().unwrap();
            inner.replies.extend([0xFF, 0xFF]);
            inner.replies.extend(body);
            inner.replies.push_back((!sum & 0xFF) as u8);
        }

        /// Queue a two-byte register read reply
        pub fn reply_u16(&self, id: u8, value: u16) {
            self.reply(id, &value.to_le_bytes());
        }

        pub fn written(&self) -> Vec<u8> {
            self.inner.lock().unwrap().written.clone()
        }

        pub fn clear_written(&self) {
            self.inner.lock().unwrap().written.clear();
        }
    }

    impl Read for MockPort {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let mut inner = self.inner.lock().unwrap();
            let count = inner.replies.len().min(buf.len());
            for byte in buf.iter_mut().take(count) {
                *byte = inner.replies.pop_front().unwrap_or_default();
            }
            Ok(count)
        }
    }

    impl Write for MockPort {
        fn write(&mut self, data: &[u8]) -> io::Result<usize> {
            self.inner.lock().unwrap().written.extend_from_slice(data);
            Ok(data.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::MockPort;
    use super::*;

    fn bus() -> (FeetechBus, MockPort) {
        let port = MockPort::default();
        (FeetechBus::with_port(Box::new(port.clone())), port)
    }

    #[test]
    fn test_checksum() {
        // ID=1, Length=4, Instruction=WRITE, Addr=30, Data=0, 2
        let data = [1u8, 4, 0x03, 30, 0, 2];
        // ~(1+4+3+30+0+2) = ~40 = 215
        assert_eq!(FeetechBus::checksum(&data), 215);
    }

    #[test]
    fn test_sign_magnitude_encoding() {
        assert_eq!(encode_sign_magnitude(0), 0);
        assert_eq!(encode_sign_magnitude(100), 100);
        assert_eq!(encode_sign_magnitude(-100), 0x8064);
        assert_eq!(encode_sign_magnitude(-1), 0x8001);
        // i16::MIN has no sign-magnitude form; it saturates
        assert_eq!(encode_sign_magnitude(i16::MIN), 0xFFFF);

        assert_eq!(decode_sign_magnitude(0x8064), -100);
        assert_eq!(decode_sign_magnitude(0x8001), -1);
        assert_eq!(decode_sign_magnitude(100), 100);
    }

    #[test]
    fn test_build_packet() {
        let packet = FeetechBus::build_packet(1, Instruction::Ping, &[]);
        assert_eq!(packet, vec![0xFF, 0xFF, 1, 2, 0x01, !(1u8 + 2 + 1)]);
    }

    #[test]
    fn test_goal_step_is_sign_magnitude() {
        let (mut bus, port) = bus();
        port.reply(4, &[]);
        port.reply(4, &[]);
        bus.set_goal_step(4, 114).unwrap();
        bus.set_goal_step(4, -300).unwrap();

        let written = port.written();
        assert_eq!(&written[5..8], &[42, 114, 0]);
        let [lo, hi] = (0x8000u16 | 300).to_le_bytes();
        assert_eq!(&written[14..17], &[42, lo, hi]);
    }

    #[test]
    fn test_read_position_and_velocity() {
        let (mut bus, port) = bus();
        port.reply_u16(6, 1234);
        port.reply_u16(6, 0x8000 | 250);
        assert_eq!(bus.get_position(6).unwrap(), 1234);
        assert_eq!(bus.get_velocity(6).unwrap(), -250);
    }

    #[test]
    fn test_ping_without_reply_is_false() {
        let (mut bus, _port) = bus();
        assert!(!bus.ping(3).unwrap());
    }

    #[test]
    fn test_corrupt_reply_is_rejected() {
        let (mut bus, port) = bus();
        port.reply_u16(2, 10);
        // Reply is for motor 2, read asks motor 3
        assert!(matches!(
            bus.read_u16(3, Register::PresentPosition),
            Err(FeetechError::InvalidResponse { id: 3, .. })
        ));
    }

    #[test]
    fn test_sync_write_layout() {
        let (mut bus, port) = bus();
        bus.sync_write_i16(Register::GoalVelocity, &[(0, 100), (1, -100)])
            .unwrap();
        let written = port.written();
        assert_eq!(written[2], BROADCAST_ID);
        assert_eq!(written[4], Instruction::SyncWrite as u8);
        assert_eq!(&written[5..13], &[46, 2, 0, 100, 0, 1, 0x64, 0x80]);
    }
}
