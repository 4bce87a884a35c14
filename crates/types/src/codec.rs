//! Canonical byte codec.
//!
//! Consensus-critical structures (transaction hashes, vote refer keys, the
//! persisted producer record) are laid out with this codec rather than a
//! generic serializer: field order, integer width and the varuint length
//! prefix are part of the protocol.
//!
//! Integers are little-endian. Variable-length integers use the compact
//! encoding: values below `0xfd` occupy one byte; larger values are prefixed
//! with `0xfd`/`0xfe`/`0xff` followed by 2, 4 or 8 little-endian bytes.

use std::io::{self, Read, Write};

/// Extension methods for writing canonical values.
pub trait WriteExt: Write {
    /// Writes a single byte.
    fn write_u8(&mut self, v: u8) -> io::Result<()> {
        self.write_all(&[v])
    }

    /// Writes a boolean as one byte (0 or 1).
    fn write_bool(&mut self, v: bool) -> io::Result<()> {
        self.write_u8(v as u8)
    }

    /// Writes a little-endian u16.
    fn write_u16(&mut self, v: u16) -> io::Result<()> {
        self.write_all(&v.to_le_bytes())
    }

    /// Writes a little-endian u32.
    fn write_u32(&mut self, v: u32) -> io::Result<()> {
        self.write_all(&v.to_le_bytes())
    }

    /// Writes a little-endian u64.
    fn write_u64(&mut self, v: u64) -> io::Result<()> {
        self.write_all(&v.to_le_bytes())
    }

    /// Writes a little-endian i64.
    fn write_i64(&mut self, v: i64) -> io::Result<()> {
        self.write_all(&v.to_le_bytes())
    }

    /// Writes a compact variable-length unsigned integer.
    fn write_var_uint(&mut self, v: u64) -> io::Result<()> {
        match v {
            0..=0xfc => self.write_u8(v as u8),
            0xfd..=0xffff => {
                self.write_u8(0xfd)?;
                self.write_u16(v as u16)
            }
            0x1_0000..=0xffff_ffff => {
                self.write_u8(0xfe)?;
                self.write_u32(v as u32)
            }
            _ => {
                self.write_u8(0xff)?;
                self.write_u64(v)
            }
        }
    }

    /// Writes a length-prefixed byte string.
    fn write_var_bytes(&mut self, v: &[u8]) -> io::Result<()> {
        self.write_var_uint(v.len() as u64)?;
        self.write_all(v)
    }

    /// Writes a length-prefixed UTF-8 string.
    fn write_var_string(&mut self, v: &str) -> io::Result<()> {
        self.write_var_bytes(v.as_bytes())
    }
}

impl<W: Write + ?Sized> WriteExt for W {}

/// Extension methods for reading canonical values.
pub trait ReadExt: Read {
    /// Reads a single byte.
    fn read_u8(&mut self) -> io::Result<u8> {
        let mut buf = [0u8; 1];
        self.read_exact(&mut buf)?;
        Ok(buf[0])
    }

    /// Reads a boolean; any byte other than 0 or 1 is rejected.
    fn read_bool(&mut self) -> io::Result<bool> {
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            b => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("invalid boolean byte: {b:#04x}"),
            )),
        }
    }

    /// Reads a little-endian u16.
    fn read_u16(&mut self) -> io::Result<u16> {
        let mut buf = [0u8; 2];
        self.read_exact(&mut buf)?;
        Ok(u16::from_le_bytes(buf))
    }

    /// Reads a little-endian u32.
    fn read_u32(&mut self) -> io::Result<u32> {
        let mut buf = [0u8; 4];
        self.read_exact(&mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }

    /// Reads a little-endian u64.
    fn read_u64(&mut self) -> io::Result<u64> {
        let mut buf = [0u8; 8];
        self.read_exact(&mut buf)?;
        Ok(u64::from_le_bytes(buf))
    }

    /// Reads a little-endian i64.
    fn read_i64(&mut self) -> io::Result<i64> {
        let mut buf = [0u8; 8];
        self.read_exact(&mut buf)?;
        Ok(i64::from_le_bytes(buf))
    }

    /// Reads a compact variable-length unsigned integer.
    fn read_var_uint(&mut self) -> io::Result<u64> {
        match self.read_u8()? {
            0xfd => Ok(self.read_u16()? as u64),
            0xfe => Ok(self.read_u32()? as u64),
            0xff => self.read_u64(),
            b => Ok(b as u64),
        }
    }

    /// Reads a length-prefixed byte string.
    ///
    /// The length is capped at 16 MiB; a larger prefix indicates corrupt or
    /// hostile input.
    fn read_var_bytes(&mut self) -> io::Result<Vec<u8>> {
        const MAX_VAR_BYTES: u64 = 16 * 1024 * 1024;
        let len = self.read_var_uint()?;
        if len > MAX_VAR_BYTES {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("var bytes length {len} exceeds limit"),
            ));
        }
        let mut buf = vec![0u8; len as usize];
        self.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// Reads a length-prefixed UTF-8 string.
    fn read_var_string(&mut self) -> io::Result<String> {
        let bytes = self.read_var_bytes()?;
        String::from_utf8(bytes)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))
    }
}

impl<R: Read + ?Sized> ReadExt for R {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_var_uint_boundaries() {
        for v in [0u64, 1, 0xfc, 0xfd, 0xffff, 0x1_0000, 0xffff_ffff, u64::MAX] {
            let mut buf = Vec::new();
            buf.write_var_uint(v).unwrap();
            let decoded = buf.as_slice().read_var_uint().unwrap();
            assert_eq!(v, decoded, "value {v:#x}");
        }
    }

    #[test]
    fn test_var_uint_sizes() {
        let mut buf = Vec::new();
        buf.write_var_uint(0xfc).unwrap();
        assert_eq!(buf.len(), 1);

        buf.clear();
        buf.write_var_uint(0xfd).unwrap();
        assert_eq!(buf.len(), 3);

        buf.clear();
        buf.write_var_uint(0x1_0000).unwrap();
        assert_eq!(buf.len(), 5);

        buf.clear();
        buf.write_var_uint(u64::MAX).unwrap();
        assert_eq!(buf.len(), 9);
    }

    #[test]
    fn test_var_string_roundtrip() {
        let mut buf = Vec::new();
        buf.write_var_string("vertex").unwrap();
        assert_eq!(buf.as_slice().read_var_string().unwrap(), "vertex");
    }

    #[test]
    fn test_bool_rejects_garbage() {
        let buf = [2u8];
        assert!(buf.as_slice().read_bool().is_err());
    }

    #[test]
    fn test_integers_roundtrip() {
        let mut buf = Vec::new();
        buf.write_u16(0xbeef).unwrap();
        buf.write_u32(0xdead_beef).unwrap();
        buf.write_u64(u64::MAX - 1).unwrap();
        buf.write_i64(-42).unwrap();

        let mut r = buf.as_slice();
        assert_eq!(r.read_u16().unwrap(), 0xbeef);
        assert_eq!(r.read_u32().unwrap(), 0xdead_beef);
        assert_eq!(r.read_u64().unwrap(), u64::MAX - 1);
        assert_eq!(r.read_i64().unwrap(), -42);
    }
}
