//! DIS primitive codec.
//!
//! Integers travel as ASCII: a sign, then the digits, preceded by a chain of
//! digit counts whenever the count itself has more than one digit.
//! `2` is `+2`, `123` is `3+123`, `1234567890` is `210+1234567890`.
//! Strings are an unsigned length followed by exactly that many octets.

use crate::{ProtocolError, Result, WireError, MAX_WIRE_STRING};
use batch_core::BoundedString;
use std::io::{self, Read, Write};

/// Decimal digits in `u64::MAX`
const MAX_DIGITS: usize = 20;

/// Blocking reader of DIS scalars.
///
/// Implemented for every [`Read`]. End of stream inside a field is
/// [`ProtocolError::Truncated`]; any other I/O failure is [`WireError::Transport`].
pub trait DisRead {
    /// Fill `buf` completely from the stream
    fn read_octets(&mut self, buf: &mut [u8]) -> Result<()>;

    /// One raw octet
    fn read_char(&mut self) -> Result<u8> {
        let mut byte = [0u8; 1];
        self.read_octets(&mut byte)?;
        Ok(byte[0])
    }

    fn read_unsigned_int(&mut self) -> Result<u64> {
        let (negative, magnitude) = self.read_integer()?;
        if negative {
            return Err(ProtocolError::Malformed("negative value in unsigned field").into());
        }
        Ok(magnitude)
    }

    fn read_signed_int(&mut self) -> Result<i64> {
        let (negative, magnitude) = self.read_integer()?;
        let value = if negative {
            -i128::from(magnitude)
        } else {
            i128::from(magnitude)
        };
        i64::try_from(value).map_err(|_| ProtocolError::Malformed("signed value out of range").into())
    }

    fn read_u32(&mut self) -> Result<u32> {
        let value = self.read_unsigned_int()?;
        u32::try_from(value).map_err(|_| ProtocolError::Malformed("value exceeds 32 bits").into())
    }

    fn read_i32(&mut self) -> Result<i32> {
        let value = self.read_signed_int()?;
        i32::try_from(value).map_err(|_| ProtocolError::Malformed("value exceeds 32 bits").into())
    }

    /// Unsigned `0` or `1`
    fn read_flag(&mut self) -> Result<bool> {
        match self.read_unsigned_int()? {
            0 => Ok(false),
            1 => Ok(true),
            _ => Err(ProtocolError::Malformed("flag is neither 0 nor 1").into()),
        }
    }

    /// Length-prefixed octets, at most `max_len` of them.
    ///
    /// The length is checked before any payload octet is read.
    fn read_counted_bytes(&mut self, max_len: usize) -> Result<Vec<u8>> {
        let declared = self.read_unsigned_int()?;
        if declared > max_len as u64 {
            return Err(ProtocolError::Overflow {
                declared,
                max: max_len,
            }
            .into());
        }
        let mut buf = vec![0u8; declared as usize];
        self.read_octets(&mut buf)?;
        Ok(buf)
    }

    fn read_counted_string(&mut self, max_len: usize) -> Result<String> {
        let bytes = self.read_counted_bytes(max_len)?;
        String::from_utf8(bytes).map_err(|_| ProtocolError::Malformed("string is not UTF-8").into())
    }

    /// Sign and magnitude of a DIS integer
    fn read_integer(&mut self) -> Result<(bool, u64)> {
        let mut count = 1usize;
        loop {
            let lead = self.read_char()?;
            match lead {
                b'+' | b'-' => {
                    let mut value = 0u64;
                    for _ in 0..count {
                        let digit = self.read_char()?;
                        if !digit.is_ascii_digit() {
                            return Err(ProtocolError::Malformed("non-digit in integer").into());
                        }
                        value = value
                            .checked_mul(10)
                            .and_then(|v| v.checked_add(u64::from(digit - b'0')))
                            .ok_or(ProtocolError::Malformed("integer exceeds 64 bits"))?;
                    }
                    return Ok((lead == b'-', value));
                }
                b'1'..=b'9' => {
                    let mut next = usize::from(lead - b'0');
                    for _ in 1..count {
                        let digit = self.read_char()?;
                        if !digit.is_ascii_digit() {
                            return Err(ProtocolError::Malformed("non-digit in digit count").into());
                        }
                        next = next * 10 + usize::from(digit - b'0');
                        if next > MAX_DIGITS {
                            break;
                        }
                    }
                    if next > MAX_DIGITS {
                        return Err(ProtocolError::Malformed("digit count exceeds 64-bit range").into());
                    }
                    if next <= count {
                        return Err(ProtocolError::Malformed("digit count does not grow").into());
                    }
                    count = next;
                }
                b'0' => return Err(ProtocolError::Malformed("digit count has a leading zero").into()),
                _ => return Err(ProtocolError::Malformed("expected sign or digit count").into()),
            }
        }
    }
}

impl<R: Read> DisRead for R {
    fn read_octets(&mut self, buf: &mut [u8]) -> Result<()> {
        self.read_exact(buf).map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof => ProtocolError::Truncated.into(),
            _ => WireError::Transport(e),
        })
    }
}

/// Read a counted string straight into a bounded field
pub fn read_bounded<const MAX: usize>(r: &mut dyn DisRead) -> Result<BoundedString<MAX>> {
    let value = r.read_counted_string(MAX)?;
    BoundedString::new(value).map_err(|e| {
        ProtocolError::Overflow {
            declared: e.actual as u64,
            max: e.max,
        }
        .into()
    })
}

/// DIS text of an integer given its sign and magnitude
pub fn encode_integer(negative: bool, magnitude: u64) -> Vec<u8> {
    let digits = magnitude.to_string();
    let mut counts = Vec::new();
    let mut count = digits.len();
    while count > 1 {
        let text = count.to_string();
        count = text.len();
        counts.push(text);
    }

    let mut out = Vec::with_capacity(digits.len() + 8);
    for text in counts.iter().rev() {
        out.extend_from_slice(text.as_bytes());
    }
    out.push(if negative { b'-' } else { b'+' });
    out.extend_from_slice(digits.as_bytes());
    out
}

/// Blocking writer of DIS scalars, implemented for every [`Write`]
pub trait DisWrite {
    fn write_octets(&mut self, bytes: &[u8]) -> Result<()>;

    fn write_char(&mut self, c: u8) -> Result<()> {
        self.write_octets(&[c])
    }

    fn write_unsigned_int(&mut self, value: u64) -> Result<()> {
        self.write_octets(&encode_integer(false, value))
    }

    fn write_signed_int(&mut self, value: i64) -> Result<()> {
        self.write_octets(&encode_integer(value < 0, value.unsigned_abs()))
    }

    fn write_flag(&mut self, flag: bool) -> Result<()> {
        self.write_unsigned_int(u64::from(flag))
    }

    /// # Panics
    ///
    /// If `bytes` is longer than [`MAX_WIRE_STRING`].
    fn write_counted_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        assert!(
            bytes.len() <= MAX_WIRE_STRING,
            "counted string of {} bytes exceeds wire maximum {}",
            bytes.len(),
            MAX_WIRE_STRING
        );
        self.write_unsigned_int(bytes.len() as u64)?;
        self.write_octets(bytes)
    }

    fn write_counted_string(&mut self, value: &str) -> Result<()> {
        self.write_counted_bytes(value.as_bytes())
    }
}

impl<W: Write> DisWrite for W {
    fn write_octets(&mut self, bytes: &[u8]) -> Result<()> {
        self.write_all(bytes).map_err(WireError::Transport)
    }
}
