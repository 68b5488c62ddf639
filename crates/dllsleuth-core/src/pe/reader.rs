/// Bounds-checked little-endian cursor over a byte slice.
///
/// Every read validates that the requested bytes exist, so truncated or
/// hostile images surface as `SleuthError::Malformed` instead of a panic.
/// Also implements the ECMA-335 compressed unsigned integer and the
/// length-prefixed UTF-8 string used in custom-attribute blobs.
use crate::error::{Result, SleuthError};

#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Reader positioned at `offset`.
    pub fn at(data: &'a [u8], offset: usize) -> Result<Self> {
        let mut reader = Self::new(data);
        reader.seek(offset)?;
        Ok(reader)
    }

    #[inline]
    pub fn pos(&self) -> usize {
        self.pos
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    pub fn seek(&mut self, offset: usize) -> Result<()> {
        if offset > self.data.len() {
            return Err(SleuthError::malformed(format!(
                "seek to {offset} past end ({})",
                self.data.len()
            )));
        }
        self.pos = offset;
        Ok(())
    }

    pub fn skip(&mut self, count: usize) -> Result<()> {
        self.take(count).map(|_| ())
    }

    /// Advance to the next multiple of `alignment` (relative to slice start).
    pub fn align(&mut self, alignment: usize) -> Result<()> {
        let aligned = self.pos.div_ceil(alignment) * alignment;
        self.seek(aligned.min(self.data.len()))
    }

    pub fn take(&mut self, count: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(count)
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| {
                SleuthError::malformed(format!(
                    "read of {count} bytes at {} exceeds {}",
                    self.pos,
                    self.data.len()
                ))
            })?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    pub fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn u16(&mut self) -> Result<u16> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub fn u32(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn u64(&mut self) -> Result<u64> {
        let b = self.take(8)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(b);
        Ok(u64::from_le_bytes(buf))
    }

    /// Read a 2- or 4-byte heap/table index.
    pub fn index(&mut self, width: u8) -> Result<u32> {
        if width == 4 {
            self.u32()
        } else {
            self.u16().map(u32::from)
        }
    }

    /// ECMA-335 II.23.2 compressed unsigned integer (1, 2 or 4 bytes).
    pub fn compressed_u32(&mut self) -> Result<u32> {
        let first = self.u8()?;
        if first & 0x80 == 0 {
            return Ok(u32::from(first));
        }
        if first & 0xC0 == 0x80 {
            let second = self.u8()?;
            return Ok((u32::from(first & 0x3F) << 8) | u32::from(second));
        }
        if first & 0xE0 == 0xC0 {
            let rest = self.take(3)?;
            return Ok((u32::from(first & 0x1F) << 24)
                | (u32::from(rest[0]) << 16)
                | (u32::from(rest[1]) << 8)
                | u32::from(rest[2]));
        }
        Err(SleuthError::malformed(format!(
            "invalid compressed integer lead byte {first:#04x}"
        )))
    }

    /// Compressed-length-prefixed UTF-8 string (custom-attribute `SerString`).
    pub fn compressed_str(&mut self) -> Result<String> {
        let len = self.compressed_u32()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| SleuthError::malformed(format!("invalid UTF-8 in string: {e}")))
    }

    /// Null-terminated UTF-16LE string, consuming the terminator.
    pub fn utf16z(&mut self) -> Result<String> {
        let mut units = Vec::new();
        loop {
            match self.u16()? {
                0 => break,
                unit => units.push(unit),
            }
        }
        Ok(String::from_utf16_lossy(&units))
    }
}

/// Null-terminated UTF-8 string starting at `offset` (the `#Strings` heap format).
pub fn utf8z_at(data: &[u8], offset: usize) -> Result<&str> {
    let tail = data
        .get(offset..)
        .ok_or_else(|| SleuthError::malformed(format!("string offset {offset} out of range")))?;
    let end = tail
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| SleuthError::malformed("unterminated string"))?;
    std::str::from_utf8(&tail[..end])
        .map_err(|e| SleuthError::malformed(format!("invalid UTF-8 in string heap: {e}")))
}
