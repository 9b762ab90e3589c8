//! Autokey identity extension fields.
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |R|E|  Version  |     Code      |            Length             |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                        Association ID                         |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                           Timestamp                           |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                           Filestamp                           |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                         Value Length                          |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! .                     Value (padded to 4 bytes)                 .
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                       Signature Length                        |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! .                   Signature (padded to 4 bytes)               .
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! The length (low 16 bits of the first word) counts the whole field, padding included.
//! A field of just the first two words is a bare request without a value.

use alloc::vec::Vec;

use crate::identity::SchemeKind;

/// Autokey protocol version.
pub const VERSION: u8 = 2;

/// Set in responses.
pub const FLAG_RESPONSE: u8 = 0x80;

/// Set in error responses.
pub const FLAG_ERROR: u8 = 0x40;

const BARE_LENGTH: usize = 8;
const HEADER_LENGTH: usize = 20;
const MAX_LENGTH: usize = (u16::MAX as usize) & !3;

/// The identity scheme operation codes.
#[derive(displaydoc::Display, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    /// IFF identity
    Iff = 7,
    /// GQ identity
    Gq = 8,
    /// MV identity
    Mv = 9,
}

impl Opcode {
    /// Returns the opcode for a code byte, if it is an identity operation.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            7 => Some(Self::Iff),
            8 => Some(Self::Gq),
            9 => Some(Self::Mv),
            _ => None,
        }
    }

    /// The code byte.
    pub fn code(self) -> u8 {
        self as u8
    }

    /// The identity scheme of the operation.
    pub fn scheme(self) -> SchemeKind {
        match self {
            Self::Iff => SchemeKind::Iff,
            Self::Gq => SchemeKind::Gq,
            Self::Mv => SchemeKind::Mv,
        }
    }
}

impl From<SchemeKind> for Opcode {
    fn from(scheme: SchemeKind) -> Self {
        match scheme {
            SchemeKind::Iff => Self::Iff,
            SchemeKind::Gq => Self::Gq,
            SchemeKind::Mv => Self::Mv,
        }
    }
}

/// Errors from extension field decoding and encoding.
#[derive(displaydoc::Display, Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireError {
    /// buffer too short: need {needed} bytes, have {available}
    Truncated {
        /// Bytes required.
        needed: usize,
        /// Bytes available.
        available: usize,
    },
    /// invalid declared field length {0}
    InvalidLength(usize),
    /// unsupported Autokey version {0}
    Version(u8),
    /// not an identity operation: code {0}
    UnknownCode(u8),
    /// inner length {declared} overruns the field
    Overrun {
        /// The declared value or signature length.
        declared: usize,
    },
    /// field of {0} bytes is too large to encode
    Oversized(usize),
}

impl core::error::Error for WireError {}

/// An identity extension field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExtensionField {
    /// The operation.
    pub opcode: Opcode,
    /// Whether this is a response (as opposed to a request).
    pub response: bool,
    /// Whether the response reports an error.
    pub error: bool,
    /// The association ID of the sender.
    pub associd: u32,
    /// NTP seconds at signing.
    pub tstamp: u32,
    /// Filestamp of the key that produced the value.
    pub fstamp: u32,
    /// The serialized challenge or response.
    pub value: Vec<u8>,
    /// The signature over [`ExtensionField::signed_bytes`].
    pub signature: Vec<u8>,
}

fn padded(length: usize) -> usize {
    (length + 3) & !3
}

fn read_u32(data: &[u8], offset: usize) -> Result<u32, WireError> {
    let bytes = data.get(offset..offset + 4).ok_or(WireError::Truncated {
        needed: offset + 4,
        available: data.len(),
    })?;
    let mut word = [0u8; 4];
    word.copy_from_slice(bytes);
    Ok(u32::from_be_bytes(word))
}

fn read_block(data: &[u8], offset: usize) -> Result<(&[u8], usize), WireError> {
    let declared = read_u32(data, offset)?;
    let overrun = WireError::Overrun {
        declared: declared as usize,
    };
    // Bounded before any `usize` arithmetic.
    let length = usize::try_from(declared)
        .ok()
        .filter(|length| *length <= MAX_LENGTH)
        .ok_or(overrun)?;
    let start = offset.checked_add(4).ok_or(overrun)?;
    let end = start
        .checked_add(padded(length))
        .filter(|end| *end <= data.len())
        .ok_or(overrun)?;
    let block = start
        .checked_add(length)
        .and_then(|block_end| data.get(start..block_end))
        .ok_or(overrun)?;
    Ok((block, end))
}

impl ExtensionField {
    /// Creates a request carrying a value.
    pub fn request(opcode: Opcode, associd: u32, value: Vec<u8>) -> Self {
        Self {
            opcode,
            response: false,
            error: false,
            associd,
            tstamp: 0,
            fstamp: 0,
            value,
            signature: Vec::new(),
        }
    }

    /// The bytes covered by the signature: timestamp, filestamp, value length and value.
    pub fn signed_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(12 + self.value.len());
        bytes.extend_from_slice(&self.tstamp.to_be_bytes());
        bytes.extend_from_slice(&self.fstamp.to_be_bytes());
        bytes.extend_from_slice(&(self.value.len() as u32).to_be_bytes());
        bytes.extend_from_slice(&self.value);
        bytes
    }

    /// The total encoded length, padding included.
    pub fn encoded_len(&self) -> usize {
        HEADER_LENGTH + padded(self.value.len()) + 4 + padded(self.signature.len())
    }

    /// Serializes the field.
    pub fn encode(&self) -> Result<Vec<u8>, WireError> {
        let length = self.encoded_len();
        if length > MAX_LENGTH {
            return Err(WireError::Oversized(length));
        }

        let mut flags = 0u8;
        if self.response {
            flags |= FLAG_RESPONSE;
        }
        if self.error {
            flags |= FLAG_ERROR;
        }
        let word = (u32::from(flags | VERSION) << 24) | (u32::from(self.opcode.code()) << 16) | length as u32;

        let mut buf = Vec::with_capacity(length);
        buf.extend_from_slice(&word.to_be_bytes());
        buf.extend_from_slice(&self.associd.to_be_bytes());
        buf.extend_from_slice(&self.signed_bytes());
        buf.resize(HEADER_LENGTH + padded(self.value.len()), 0);
        buf.extend_from_slice(&(self.signature.len() as u32).to_be_bytes());
        buf.extend_from_slice(&self.signature);
        buf.resize(length, 0);
        Ok(buf)
    }

    /// Parses one field from the start of `data`.
    ///
    /// Returns the field and the number of bytes it occupied.
    pub fn decode(data: &[u8]) -> Result<(Self, usize), WireError> {
        let [top, code, length_high, length_low] = read_u32(data, 0)?.to_be_bytes();
        let flags = top & (FLAG_RESPONSE | FLAG_ERROR);
        let version = top & !(FLAG_RESPONSE | FLAG_ERROR);
        let length = usize::from(u16::from_be_bytes([length_high, length_low]));

        if version != VERSION {
            return Err(WireError::Version(version));
        }
        let opcode = Opcode::from_code(code).ok_or(WireError::UnknownCode(code))?;
        if length < BARE_LENGTH || length % 4 != 0 {
            return Err(WireError::InvalidLength(length));
        }
        let field = data.get(..length).ok_or(WireError::Truncated {
            needed: length,
            available: data.len(),
        })?;

        let mut result = Self::request(opcode, read_u32(field, 4)?, Vec::new());
        result.response = flags & FLAG_RESPONSE != 0;
        result.error = flags & FLAG_ERROR != 0;
        if length == BARE_LENGTH {
            return Ok((result, length));
        }

        result.tstamp = read_u32(field, 8)?;
        result.fstamp = read_u32(field, 12)?;
        let (value, offset) = read_block(field, 16)?;
        let (signature, offset) = read_block(field, offset)?;
        if offset != length {
            return Err(WireError::InvalidLength(length));
        }
        result.value = value.to_vec();
        result.signature = signature.to_vec();
        Ok((result, length))
    }
}

/// Iterates over consecutive extension fields, stopping at the first malformed one.
pub fn iter_extension_fields(data: &[u8]) -> ExtensionFieldIter<'_> {
    ExtensionFieldIter { data, offset: 0 }
}

/// Iterator over the fields in a buffer. Created by [`iter_extension_fields`].
#[derive(Debug, Clone)]
pub struct ExtensionFieldIter<'a> {
    data: &'a [u8],
    offset: usize,
}

impl Iterator for ExtensionFieldIter<'_> {
    type Item = Result<ExtensionField, WireError>;

    fn next(&mut self) -> Option<Self::Item> {
        let remaining = self.data.get(self.offset..)?;
        if remaining.is_empty() {
            return None;
        }
        match ExtensionField::decode(remaining) {
            Ok((field, consumed)) => {
                self.offset += consumed;
                Some(Ok(field))
            }
            Err(err) => {
                self.offset = self.data.len();
                Some(Err(err))
            }
        }
    }
}
