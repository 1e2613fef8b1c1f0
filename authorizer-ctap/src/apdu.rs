//! ISO 7816-4 command APDUs as carried by U2F raw messages
//!
//! Spec: <https://fidoalliance.org/specs/fido-u2f-v1.2-ps-20170411/fido-u2f-raw-message-formats-v1.2-ps-20170411.html>

use thiserror::Error;

/// U2F status words
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
#[repr(u16)]
pub enum StatusWord {
    #[error("no error")]
    NoError = 0x9000,

    #[error("conditions not satisfied")]
    ConditionsNotSatisfied = 0x6985,

    #[error("wrong data")]
    WrongData = 0x6A80,

    #[error("wrong length")]
    WrongLength = 0x6700,

    #[error("class not supported")]
    ClaNotSupported = 0x6E00,

    #[error("instruction not supported")]
    InsNotSupported = 0x6D00,

    #[error("memory failure")]
    MemoryFailure = 0x6501,

    #[error("command aborted")]
    CommandAborted = 0x6F00,
}

impl StatusWord {
    pub fn to_u16(self) -> u16 {
        self as u16
    }

    /// Big-endian trailer appended to every response
    pub fn to_bytes(self) -> [u8; 2] {
        self.to_u16().to_be_bytes()
    }
}

/// A parsed command APDU borrowing its data from the request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Apdu<'a> {
    pub cla: u8,
    pub ins: u8,
    pub p1: u8,
    pub p2: u8,
    pub data: &'a [u8],
    /// Expected response length; 0 stands for the maximum
    pub le: Option<usize>,
}

impl<'a> Apdu<'a> {
    /// Parse short or extended encoding
    ///
    /// Le is optional in both encodings.
    pub fn parse(raw: &'a [u8]) -> Result<Self, StatusWord> {
        let [cla, ins, p1, p2, body @ ..] = raw else {
            return Err(StatusWord::WrongLength);
        };

        let (data, le) = match body {
            [] => (&body[..0], None),
            // Short Le only
            [le] => (&body[..0], Some(usize::from(*le))),
            // Extended: 0x00 followed by a 2-byte length
            [0, hi, lo, rest @ ..] => {
                let lc = usize::from(u16::from_be_bytes([*hi, *lo]));
                if lc == 0 && rest.is_empty() {
                    // Either Lc = 0 or a lone extended Le; both carry no data
                    (&rest[..0], None)
                } else {
                    split_data(rest, lc, 2)?
                }
            }
            [lc, rest @ ..] => split_data(rest, usize::from(*lc), 1)?,
        };

        Ok(Self {
            cla: *cla,
            ins: *ins,
            p1: *p1,
            p2: *p2,
            data,
            le,
        })
    }
}

fn split_data(rest: &[u8], lc: usize, le_size: usize) -> Result<(&[u8], Option<usize>), StatusWord> {
    if rest.len() == lc {
        return Ok((rest, None));
    }
    if rest.len() != lc + le_size {
        return Err(StatusWord::WrongLength);
    }

    let (data, le) = rest.split_at(lc);
    let le = le.iter().fold(0usize, |acc, b| (acc << 8) | usize::from(*b));
    Ok((data, Some(le)))
}
