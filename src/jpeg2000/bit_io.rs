//! Packet header bit IO (ISO/IEC 15444-1 B.10.1).
//!
//! Bits are packed MSB first. A byte following 0xFF carries only seven bits so that
//! no two-byte sequence of the header can look like a marker.

use crate::error::J2kError;

pub struct J2kBitReader<'a> {
    data: &'a [u8],
    pos: usize,
    buf: u32,
    ct: u32,
}

impl<'a> J2kBitReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            buf: 0,
            ct: 0,
        }
    }

    fn byte_in(&mut self) -> Result<(), J2kError> {
        self.buf = (self.buf << 8) & 0xffff;
        self.ct = if self.buf == 0xff00 { 7 } else { 8 };
        let byte = *self.data.get(self.pos).ok_or(J2kError::TruncatedPacket)?;
        self.buf |= u32::from(byte);
        self.pos += 1;
        Ok(())
    }

    pub fn read_bit(&mut self) -> Result<u32, J2kError> {
        if self.ct == 0 {
            self.byte_in()?;
        }
        self.ct -= 1;
        Ok((self.buf >> self.ct) & 1)
    }

    /// Read `count` bits (at most 32), MSB first.
    pub fn read_bits(&mut self, count: u32) -> Result<u32, J2kError> {
        if count > 32 {
            return Err(J2kError::InvalidPacketHeader);
        }
        let mut value = 0u32;
        for _ in 0..count {
            value = (value << 1) | self.read_bit()?;
        }
        Ok(value)
    }

    /// Skip to the next byte boundary, consuming the stuffing byte after a trailing 0xFF.
    pub fn align(&mut self) -> Result<(), J2kError> {
        self.ct = 0;
        if self.buf & 0xff == 0xff {
            self.byte_in()?;
            self.ct = 0;
        }
        Ok(())
    }

    /// Bytes consumed so far.
    pub fn position(&self) -> usize {
        self.pos
    }
}

pub struct J2kBitWriter<'a> {
    data: &'a mut [u8],
    pos: usize,
    buf: u32,
    ct: u32,
}

impl<'a> J2kBitWriter<'a> {
    pub fn new(data: &'a mut [u8]) -> Self {
        Self {
            data,
            pos: 0,
            buf: 0,
            ct: 8,
        }
    }

    fn byte_out(&mut self) -> Result<(), J2kError> {
        self.buf = (self.buf << 8) & 0xffff;
        self.ct = if self.buf == 0xff00 { 7 } else { 8 };
        let slot = self.data.get_mut(self.pos).ok_or(J2kError::DestinationTooSmall)?;
        *slot = (self.buf >> 8) as u8;
        self.pos += 1;
        Ok(())
    }

    pub fn write_bit(&mut self, bit: u32) -> Result<(), J2kError> {
        if self.ct == 0 {
            self.byte_out()?;
        }
        self.ct -= 1;
        self.buf |= (bit & 1) << self.ct;
        Ok(())
    }

    pub fn write_bits(&mut self, value: u32, count: u32) -> Result<(), J2kError> {
        for i in (0..count).rev() {
            self.write_bit((value >> i) & 1)?;
        }
        Ok(())
    }

    /// Emit the pending byte. A final 0xFF is followed by a zero byte.
    pub fn flush(&mut self) -> Result<(), J2kError> {
        self.ct = 0;
        self.byte_out()?;
        if self.ct == 7 {
            self.ct = 0;
            self.byte_out()?;
        }
        Ok(())
    }

    /// Bytes written so far.
    pub fn num_bytes(&self) -> usize {
        self.pos
    }
}
