//! CTAP HID Channel Management
//!
//! Channel id allocation and reassembly of one fragmented message.
//!
//! The broadcast channel (0xFFFFFFFF) is used for INIT commands to allocate
//! new channels; channel 0 is never issued.

use crate::ctaphid::{
    BROADCAST_CID, CONT_PACKET_DATA_SIZE, Cmd, INIT_PACKET_DATA_SIZE, MAX_MESSAGE_SIZE, Message,
    Packet,
};
use crate::error::{Error, Result};

/// Reserved channel id
pub const RESERVED_CID: u32 = 0;

/// Hands out channel ids for broadcast INIT requests
#[derive(Debug, Clone)]
pub struct ChannelAllocator {
    /// Next CID to allocate (starts at 1, broadcast is 0xFFFFFFFF)
    next_cid: u32,
}

impl ChannelAllocator {
    pub fn new() -> Self {
        Self { next_cid: 1 }
    }

    /// Allocate a new channel ID
    pub fn allocate(&mut self) -> u32 {
        let cid = self.next_cid;
        self.next_cid = self.next_cid.wrapping_add(1);

        // Skip broadcast CID and zero
        if self.next_cid == RESERVED_CID || self.next_cid == BROADCAST_CID {
            self.next_cid = 1;
        }

        cid
    }
}

impl Default for ChannelAllocator {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of feeding a continuation packet to an [`InMessage`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Append {
    /// Payload was appended
    Accepted,
    /// Wrong channel, wrong sequence or an INIT packet; the message is unchanged
    Dropped,
}

/// A message being reassembled from an INIT packet and its continuations
#[derive(Debug, Clone)]
pub struct InMessage {
    cid: u32,
    cmd: Cmd,
    declared_len: usize,
    data: Vec<u8>,
    next_seq: u8,
}

impl InMessage {
    /// Start reassembly from an initialization packet
    pub fn start(packet: &Packet) -> Result<Self> {
        let cid = packet.cid();
        let cmd = packet.cmd().ok_or(Error::InvalidCommand { cid })?;
        let declared_len = usize::from(packet.payload_len().ok_or(Error::InvalidCommand { cid })?);
        if declared_len > MAX_MESSAGE_SIZE {
            return Err(Error::InvalidLength { cid });
        }

        let mut data = Vec::with_capacity(declared_len);
        let first = declared_len.min(INIT_PACKET_DATA_SIZE);
        data.extend_from_slice(&packet.payload()[..first]);

        Ok(Self {
            cid,
            cmd,
            declared_len,
            data,
            next_seq: 0,
        })
    }

    /// Append a continuation packet
    pub fn append(&mut self, packet: &Packet) -> Append {
        if packet.cid() != self.cid || self.is_complete() {
            return Append::Dropped;
        }
        match packet.seq() {
            Some(seq) if seq == self.next_seq => {}
            _ => return Append::Dropped,
        }

        let remaining = self.declared_len - self.data.len();
        let take = remaining.min(CONT_PACKET_DATA_SIZE);
        self.data.extend_from_slice(&packet.payload()[..take]);
        self.next_seq += 1;

        Append::Accepted
    }

    pub fn cid(&self) -> u32 {
        self.cid
    }

    pub fn cmd(&self) -> Cmd {
        self.cmd
    }

    /// Check if message is complete
    pub fn is_complete(&self) -> bool {
        self.data.len() == self.declared_len
    }

    /// Bytes still missing
    pub fn remaining(&self) -> usize {
        self.declared_len - self.data.len()
    }

    /// The assembled message
    pub fn into_message(self) -> Message {
        Message::new(self.cid, self.cmd, self.data)
    }
}
