//! Bit-level cursors over the data section

use bitstream_io::{BigEndian, BitRead, BitWrite};

use crate::Error;

/// All-ones pattern of the given width: the WMO missing-value sentinel.
pub fn missing_pattern(width: u32) -> u64 {
    match width {
        0 => 0,
        64.. => u64::MAX,
        w => (1u64 << w) - 1,
    }
}

/// Reads fields of arbitrary bit width from a fully materialized buffer.
pub struct BitReader<'a> {
    reader: bitstream_io::BitReader<&'a [u8], BigEndian>,
    total_bits: u64,
    consumed_bits: u64,
}

impl<'a> BitReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            reader: bitstream_io::BitReader::endian(data, BigEndian),
            total_bits: data.len() as u64 * 8,
            consumed_bits: 0,
        }
    }

    pub fn remaining_bits(&self) -> u64 {
        self.total_bits - self.consumed_bits
    }

    pub fn position_bits(&self) -> u64 {
        self.consumed_bits
    }

    fn ensure(&self, bits: u64) -> Result<(), Error> {
        if bits > self.remaining_bits() {
            return Err(Error::Truncated(format!(
                "need {bits} bits at bit offset {} but only {} remain",
                self.consumed_bits,
                self.remaining_bits()
            )));
        }
        Ok(())
    }

    /// Reads `width` bits as an unsigned integer, without missing-value
    /// interpretation.
    pub fn read_bits(&mut self, width: u32) -> Result<u64, Error> {
        if width == 0 {
            return Ok(0);
        }
        if width > 64 {
            return Err(Error::Consistency(format!(
                "cannot read a {width}-bit field"
            )));
        }
        self.ensure(width as u64)?;
        let v: u64 = self.reader.read_var(width)?;
        self.consumed_bits += width as u64;
        Ok(v)
    }

    /// Reads `width` bits as an unsigned integer; `None` when the field holds
    /// the all-ones missing pattern.
    pub fn read_uint(&mut self, width: u32) -> Result<Option<u64>, Error> {
        let raw = self.read_bits(width)?;
        if width > 0 && raw == missing_pattern(width) {
            Ok(None)
        } else {
            Ok(Some(raw))
        }
    }

    /// Reads a sign-and-magnitude integer, sign in the leftmost bit.
    pub fn read_signed(&mut self, width: u32) -> Result<i64, Error> {
        if width < 2 {
            return Err(Error::Consistency(format!(
                "a signed field needs at least 2 bits, got {width}"
            )));
        }
        let raw = self.read_bits(width)?;
        let magnitude = (raw & missing_pattern(width - 1)) as i64;
        Ok(if raw >> (width - 1) == 1 {
            -magnitude
        } else {
            magnitude
        })
    }

    /// Reads `byte_length` 8-bit characters starting at the current bit.
    pub fn read_string(&mut self, byte_length: usize) -> Result<Vec<u8>, Error> {
        self.ensure(byte_length as u64 * 8)?;
        let bytes = self.reader.read_to_vec(byte_length)?;
        self.consumed_bits += byte_length as u64 * 8;
        Ok(bytes)
    }
}

/// Builds a data section bit by bit.
pub struct BitWriter {
    writer: bitstream_io::BitWriter<Vec<u8>, BigEndian>,
    written_bits: u64,
}

impl Default for BitWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl BitWriter {
    pub fn new() -> Self {
        Self {
            writer: bitstream_io::BitWriter::endian(Vec::new(), BigEndian),
            written_bits: 0,
        }
    }

    pub fn bits_written(&self) -> u64 {
        self.written_bits
    }

    /// Writes `value` in `width` bits. Values that do not fit are an error,
    /// never silently truncated.
    pub fn write_bits(&mut self, width: u32, value: u64) -> Result<(), Error> {
        if width > 64 {
            return Err(Error::Consistency(format!(
                "cannot write a {width}-bit field"
            )));
        }
        if value > missing_pattern(width) {
            return Err(Error::Consistency(format!(
                "value {value} does not fit in {width} bits"
            )));
        }
        if width == 0 {
            return Ok(());
        }
        self.writer.write_var(width, value)?;
        self.written_bits += width as u64;
        Ok(())
    }

    /// Writes `value`, or the all-ones pattern when it is `None`.
    ///
    /// A present value equal to the all-ones pattern would read back as
    /// missing, so it is rejected as an overflow.
    pub fn write_uint(&mut self, width: u32, value: Option<u64>) -> Result<(), Error> {
        match value {
            None => self.write_bits(width, missing_pattern(width)),
            Some(v) if width > 0 && v >= missing_pattern(width) => Err(Error::Consistency(
                format!("value {v} does not fit in {width} bits"),
            )),
            Some(v) => self.write_bits(width, v),
        }
    }

    /// Writes a sign-and-magnitude integer, sign in the leftmost bit.
    pub fn write_signed(&mut self, width: u32, value: i64) -> Result<(), Error> {
        if width < 2 {
            return Err(Error::Consistency(format!(
                "a signed field needs at least 2 bits, got {width}"
            )));
        }
        let magnitude = value.unsigned_abs();
        if magnitude > missing_pattern(width - 1) {
            return Err(Error::Consistency(format!(
                "value {value} does not fit in {width} signed bits"
            )));
        }
        let sign = if value < 0 { 1u64 << (width - 1) } else { 0 };
        self.write_bits(width, sign | magnitude)
    }

    /// Writes `bytes` as exactly `byte_length` characters, padding with
    /// spaces or truncating.
    pub fn write_string(&mut self, bytes: &[u8], byte_length: usize) -> Result<(), Error> {
        let mut buf = Vec::new();
        buf.try_reserve_exact(byte_length)?;
        buf.extend(bytes.iter().copied().take(byte_length));
        buf.resize(byte_length, b' ');
        self.write_raw_bytes(&buf)
    }

    /// Writes a missing string: `byte_length` bytes of 0xFF.
    pub fn write_missing_string(&mut self, byte_length: usize) -> Result<(), Error> {
        self.write_raw_bytes(&vec![0xff; byte_length])
    }

    fn write_raw_bytes(&mut self, buf: &[u8]) -> Result<(), Error> {
        self.writer.write_bytes(buf)?;
        self.written_bits += buf.len() as u64 * 8;
        Ok(())
    }

    /// Pads the last byte with zero bits and returns the buffer.
    pub fn finish(mut self) -> Result<Vec<u8>, Error> {
        self.writer.byte_align()?;
        Ok(self.writer.into_writer())
    }
}
