//! CTAP HID Protocol Implementation
//!
//! Implements CTAP over USB HID with message fragmentation.
//!
//! Packet Format:
//! - Initialization packet: CID(4) + CMD(1) + BCNT(2) + DATA(57)
//! - Continuation packet: CID(4) + SEQ(1) + DATA(59)
//!
//! Spec: <https://fidoalliance.org/specs/fido-v2.0-ps-20190130/fido-client-to-authenticator-protocol-v2.0-ps-20190130.html#usb-hid-framing>

use crate::error::{Error, Result};

/// HID packet size (fixed at 64 bytes for USB HID)
pub const PACKET_SIZE: usize = 64;

/// Report with a leading HID report id
const REPORT_WITH_ID_SIZE: usize = 65;

/// Truncated report some hosts deliver; the missing tail is zero
const SHORT_REPORT_SIZE: usize = 62;

/// Maximum CTAP message size (7609 bytes)
pub const MAX_MESSAGE_SIZE: usize = INIT_PACKET_DATA_SIZE + 128 * CONT_PACKET_DATA_SIZE;

/// Broadcast channel ID (used for INIT command)
pub const BROADCAST_CID: u32 = 0xFFFFFFFF;

/// Initial packet payload size (64 - 4 CID - 1 CMD - 2 BCNT = 57 bytes)
pub const INIT_PACKET_DATA_SIZE: usize = 57;

/// Continuation packet payload size (64 - 4 CID - 1 SEQ = 59 bytes)
pub const CONT_PACKET_DATA_SIZE: usize = 59;

/// Highest continuation sequence number
pub const MAX_SEQ: u8 = 0x7F;

/// Length of the INIT nonce
pub const INIT_NONCE_SIZE: usize = 8;

/// CTAPHID protocol version reported by INIT
pub const PROTOCOL_VERSION: u8 = 2;

/// Capability flags reported by INIT
pub mod capabilities {
    pub const WINK: u8 = 0x01;
    pub const CBOR: u8 = 0x04;
}

/// CTAP HID commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Cmd {
    /// Transaction that echoes the data back
    Ping = 0x01,

    /// Encapsulated CTAP1/U2F message
    Msg = 0x03,

    /// Place an exclusive lock for one channel
    Lock = 0x04,

    /// Allocate a new CID or synchronize channel
    Init = 0x06,

    /// Request authenticator to provide visual/audible identification
    Wink = 0x08,

    /// Encapsulated CTAP CBOR encoded message
    Cbor = 0x10,

    /// Cancel any outstanding requests on the given CID
    Cancel = 0x11,

    /// The request is still being processed
    Keepalive = 0x3B,

    /// Error response message
    Error = 0x3F,
}

impl Cmd {
    /// Convert from u8 value
    pub fn from_u8(value: u8) -> Option<Self> {
        match value & 0x7F {
            // Mask off the TYPE bit
            0x01 => Some(Cmd::Ping),
            0x03 => Some(Cmd::Msg),
            0x04 => Some(Cmd::Lock),
            0x06 => Some(Cmd::Init),
            0x08 => Some(Cmd::Wink),
            0x10 => Some(Cmd::Cbor),
            0x11 => Some(Cmd::Cancel),
            0x3B => Some(Cmd::Keepalive),
            0x3F => Some(Cmd::Error),
            _ => None,
        }
    }

    /// Convert to u8 value with TYPE bit set (0x80 for initialization packet)
    pub fn to_u8_init(self) -> u8 {
        (self as u8) | 0x80
    }

    pub fn to_u8(self) -> u8 {
        self as u8
    }
}

/// CTAP HID error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ErrorCode {
    /// Invalid command
    InvalidCmd = 0x01,

    /// Invalid parameter
    InvalidPar = 0x02,

    /// Invalid message length
    InvalidLen = 0x03,

    /// Invalid message sequencing
    InvalidSeq = 0x04,

    /// Message has timed out
    MsgTimeout = 0x05,

    /// Channel busy
    ChannelBusy = 0x06,

    /// Command requires channel lock
    LockRequired = 0x0A,

    /// CID invalid
    InvalidChannel = 0x0B,

    /// Other unspecified error
    Other = 0x7F,
}

impl ErrorCode {
    pub fn to_u8(self) -> u8 {
        self as u8
    }
}

/// Status carried by a KEEPALIVE response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum KeepaliveStatus {
    Idle = 0,
    Processing = 1,
    UserPresenceNeeded = 2,
}

impl KeepaliveStatus {
    pub fn to_u8(self) -> u8 {
        self as u8
    }
}

/// A single 64-byte HID packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    data: [u8; PACKET_SIZE],
}

impl Packet {
    /// Create a new packet from raw data
    pub fn from_bytes(data: [u8; PACKET_SIZE]) -> Self {
        Self { data }
    }

    /// Create a packet from an inbound HID report
    ///
    /// Accepts plain 64-byte reports, 65-byte reports with a leading report
    /// id and 62-byte reports.
    pub fn from_report(report: &[u8]) -> Result<Self> {
        let body = match report.len() {
            PACKET_SIZE | SHORT_REPORT_SIZE => report,
            REPORT_WITH_ID_SIZE => &report[1..],
            _ => {
                let cid = match report {
                    [a, b, c, d, ..] => u32::from_be_bytes([*a, *b, *c, *d]),
                    _ => 0,
                };
                return Err(Error::InvalidLength { cid });
            }
        };

        let mut data = [0u8; PACKET_SIZE];
        data[..body.len()].copy_from_slice(body);
        Ok(Self { data })
    }

    /// Get raw packet data
    pub fn as_bytes(&self) -> &[u8; PACKET_SIZE] {
        &self.data
    }

    /// Get channel ID
    pub fn cid(&self) -> u32 {
        u32::from_be_bytes([self.data[0], self.data[1], self.data[2], self.data[3]])
    }

    /// Check if this is an initialization packet
    pub fn is_init(&self) -> bool {
        (self.data[4] & 0x80) != 0
    }

    /// Raw command byte without the TYPE bit (only valid for initialization packets)
    pub fn cmd_byte(&self) -> Option<u8> {
        self.is_init().then_some(self.data[4] & 0x7F)
    }

    /// Get command (only valid for initialization packets)
    pub fn cmd(&self) -> Option<Cmd> {
        self.cmd_byte().and_then(Cmd::from_u8)
    }

    /// Get payload length (only valid for initialization packets)
    pub fn payload_len(&self) -> Option<u16> {
        self.is_init()
            .then(|| u16::from_be_bytes([self.data[5], self.data[6]]))
    }

    /// Get sequence number (only valid for continuation packets)
    pub fn seq(&self) -> Option<u8> {
        (!self.is_init()).then_some(self.data[4])
    }

    /// Get payload data
    pub fn payload(&self) -> &[u8] {
        if self.is_init() {
            &self.data[7..]
        } else {
            &self.data[5..]
        }
    }

    /// Create an error packet
    pub fn new_error(cid: u32, error_code: ErrorCode) -> Self {
        Self::single(cid, Cmd::Error, error_code.to_u8())
    }

    /// Create a keepalive packet
    pub fn keepalive(cid: u32, status: KeepaliveStatus) -> Self {
        Self::single(cid, Cmd::Keepalive, status.to_u8())
    }

    fn single(cid: u32, cmd: Cmd, byte: u8) -> Self {
        let mut packet = [0u8; PACKET_SIZE];
        packet[0..4].copy_from_slice(&cid.to_be_bytes());
        packet[4] = cmd.to_u8_init();
        packet[5..7].copy_from_slice(&1u16.to_be_bytes());
        packet[7] = byte;

        Packet::from_bytes(packet)
    }
}

/// A complete CTAP message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Channel ID
    pub cid: u32,

    /// Command
    pub cmd: Cmd,

    /// Payload data
    pub data: Vec<u8>,
}

impl Message {
    pub fn new(cid: u32, cmd: Cmd, data: Vec<u8>) -> Self {
        Self { cid, cmd, data }
    }

    /// Fragment this message into HID packets
    pub fn to_packets(&self) -> Result<Vec<Packet>> {
        if self.data.len() > MAX_MESSAGE_SIZE {
            return Err(Error::InvalidLength { cid: self.cid });
        }

        let cid = self.cid.to_be_bytes();
        let (first, rest) = self
            .data
            .split_at(self.data.len().min(INIT_PACKET_DATA_SIZE));

        let mut init_packet = [0u8; PACKET_SIZE];
        init_packet[0..4].copy_from_slice(&cid);
        init_packet[4] = self.cmd.to_u8_init();
        init_packet[5..7].copy_from_slice(&(self.data.len() as u16).to_be_bytes());
        init_packet[7..7 + first.len()].copy_from_slice(first);

        let mut packets = Vec::with_capacity(1 + rest.len().div_ceil(CONT_PACKET_DATA_SIZE));
        packets.push(Packet::from_bytes(init_packet));

        for (seq, chunk) in rest.chunks(CONT_PACKET_DATA_SIZE).enumerate() {
            let mut cont_packet = [0u8; PACKET_SIZE];
            cont_packet[0..4].copy_from_slice(&cid);
            cont_packet[4] = seq as u8;
            cont_packet[5..5 + chunk.len()].copy_from_slice(chunk);
            packets.push(Packet::from_bytes(cont_packet));
        }

        Ok(packets)
    }
}

/// Payload of an INIT response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InitResponse {
    pub nonce: [u8; INIT_NONCE_SIZE],
    /// Channel the client should use from now on
    pub cid: u32,
    pub capabilities: u8,
}

impl InitResponse {
    pub fn new(nonce: [u8; INIT_NONCE_SIZE], cid: u32, wink: bool) -> Self {
        let mut capabilities = capabilities::CBOR;
        if wink {
            capabilities |= capabilities::WINK;
        }
        Self {
            nonce,
            cid,
            capabilities,
        }
    }

    /// nonce | cid | protocol version | major | minor | build | capabilities
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(INIT_NONCE_SIZE + 9);
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(&self.cid.to_be_bytes());
        out.push(PROTOCOL_VERSION);
        out.extend_from_slice(&[0, 0, 0]);
        out.push(self.capabilities);
        out
    }
}
