use crate::error::{BundleError, Result};
use chrono::{DateTime, Datelike, Timelike, Utc};
use std::io::{Read, Write};

/// Local file header signature ("PK\x03\x04")
pub const LOCAL_ENTRY_SIGNATURE: u32 = 0x0403_4b50;

/// Data descriptor signature ("PK\x07\x08")
pub const DATA_DESCRIPTOR_SIGNATURE: u32 = 0x0807_4b50;

/// Central directory header signature ("PK\x01\x02")
pub const CENTRAL_DIRECTORY_SIGNATURE: u32 = 0x0201_4b50;

/// End of central directory signature ("PK\x05\x06")
pub const END_RECORD_SIGNATURE: u32 = 0x0605_4b50;

/// Version needed to extract: 2.0 (deflate)
pub const VERSION_NEEDED: u16 = 20;

/// Version made by: 2.0, MS-DOS host attributes
pub const VERSION_MADE_BY: u16 = 20;

/// General purpose flag: sizes and CRC follow the data in a descriptor
pub const FLAG_DATA_DESCRIPTOR: u16 = 1 << 3;

/// General purpose flag: name is UTF-8
pub const FLAG_UTF8: u16 = 1 << 11;

/// Fixed size of a central directory header, excluding variable fields
pub const CD_ENTRY_SIZE: usize = 46;

/// Maximum entry name length in bytes
pub const MAX_PATH_LENGTH: usize = u16::MAX as usize;

/// Name of the manifest entry
pub const MANIFEST_NAME: &str = "META-INF/MANIFEST.MF";

/// Directory entry some tools write before the manifest
pub const META_INF_DIR: &str = "META-INF/";

/// Canonical entry name: forward slashes only
///
/// Every layer that names an entry (bucket, manifest section, archive header)
/// goes through this, so the same input always yields the same entry.
pub fn normalize_path(path: &str) -> String {
    path.replace('\\', "/")
}

/// Compression methods supported
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum CompressionMethod {
    Stored = 0,
    Deflated = 8,
}

impl CompressionMethod {
    pub fn from_u16(value: u16) -> Result<Self> {
        match value {
            0 => Ok(Self::Stored),
            8 => Ok(Self::Deflated),
            _ => Err(BundleError::UnsupportedCompression(value)),
        }
    }
}

/// MS-DOS packed date and time, as stored in ZIP headers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DosDateTime {
    pub time: u16,
    pub date: u16,
}

impl DosDateTime {
    /// Earliest representable timestamp (1980-01-01 00:00:00)
    pub const EPOCH: DosDateTime = DosDateTime {
        time: 0,
        date: (1 << 5) | 1,
    };

    /// Latest representable timestamp (2107-12-31 23:59:58)
    pub const MAX: DosDateTime = DosDateTime {
        time: (23 << 11) | (59 << 5) | 29,
        date: (127 << 9) | (12 << 5) | 31,
    };

    /// Current time in UTC
    pub fn now() -> Self {
        Self::from_datetime(Utc::now())
    }

    /// Pack a UTC timestamp, clamped to the 1980-2107 range DOS can hold
    pub fn from_datetime(timestamp: DateTime<Utc>) -> Self {
        let year = timestamp.year();
        if year < 1980 {
            return Self::EPOCH;
        }
        if year > 2107 {
            return Self::MAX;
        }

        let hour = timestamp.hour() as u16;
        let minute = timestamp.minute() as u16;
        let second = timestamp.second() as u16;

        Self {
            time: (hour << 11) | (minute << 5) | (second / 2),
            date: (((year - 1980) as u16) << 9)
                | ((timestamp.month() as u16) << 5)
                | timestamp.day() as u16,
        }
    }
}

/// Central directory record for one entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryInfo {
    pub name: String,
    pub flags: u16,
    pub compression: CompressionMethod,
    pub modified: DosDateTime,
    pub crc32: u32,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    pub local_header_offset: u64,
}

impl EntryInfo {
    /// Write a central directory header
    pub fn write_to<W: Write>(&self, mut writer: W) -> Result<usize> {
        let name = self.name.as_bytes();

        writer.write_all(&CENTRAL_DIRECTORY_SIGNATURE.to_le_bytes())?;
        writer.write_all(&VERSION_MADE_BY.to_le_bytes())?;
        writer.write_all(&VERSION_NEEDED.to_le_bytes())?;
        writer.write_all(&self.flags.to_le_bytes())?;
        writer.write_all(&(self.compression as u16).to_le_bytes())?;
        writer.write_all(&self.modified.time.to_le_bytes())?;
        writer.write_all(&self.modified.date.to_le_bytes())?;
        writer.write_all(&self.crc32.to_le_bytes())?;
        writer.write_all(&to_u32(self.compressed_size, "compressed size")?.to_le_bytes())?;
        writer.write_all(&to_u32(self.uncompressed_size, "uncompressed size")?.to_le_bytes())?;
        writer.write_all(&(name.len() as u16).to_le_bytes())?;
        writer.write_all(&0u16.to_le_bytes())?; // extra field length
        writer.write_all(&0u16.to_le_bytes())?; // comment length
        writer.write_all(&0u16.to_le_bytes())?; // disk number start
        writer.write_all(&0u16.to_le_bytes())?; // internal attributes
        writer.write_all(&0u32.to_le_bytes())?; // external attributes
        writer.write_all(&to_u32(self.local_header_offset, "local header offset")?.to_le_bytes())?;
        writer.write_all(name)?;

        Ok(CD_ENTRY_SIZE + name.len())
    }

    /// Read a central directory header whose signature was already consumed
    pub fn read_after_signature<R: Read>(mut reader: R) -> Result<Self> {
        let _made_by = read_u16(&mut reader)?;
        let _needed = read_u16(&mut reader)?;
        let flags = read_u16(&mut reader)?;
        let compression = CompressionMethod::from_u16(read_u16(&mut reader)?)?;
        let time = read_u16(&mut reader)?;
        let date = read_u16(&mut reader)?;
        let crc32 = read_u32(&mut reader)?;
        let compressed_size = read_u32(&mut reader)? as u64;
        let uncompressed_size = read_u32(&mut reader)? as u64;
        let name_len = read_u16(&mut reader)? as usize;
        let extra_len = read_u16(&mut reader)? as usize;
        let comment_len = read_u16(&mut reader)? as usize;
        let _disk = read_u16(&mut reader)?;
        let _internal = read_u16(&mut reader)?;
        let _external = read_u32(&mut reader)?;
        let local_header_offset = read_u32(&mut reader)? as u64;

        let name = read_name(&mut reader, name_len)?;
        skip(&mut reader, extra_len + comment_len)?;

        Ok(Self {
            name,
            flags,
            compression,
            modified: DosDateTime { time, date },
            crc32,
            compressed_size,
            uncompressed_size,
            local_header_offset,
        })
    }
}

/// Narrow a size or offset to the 32-bit ZIP field
pub(crate) fn to_u32(value: u64, what: &str) -> Result<u32> {
    u32::try_from(value).map_err(|_| {
        BundleError::ArchiveTooLarge(format!("{} {} exceeds 4 GiB", what, value))
    })
}

// Helper functions for reading primitive types
pub(crate) fn read_u16<R: Read>(mut reader: R) -> Result<u16> {
    let mut buf = [0u8; 2];
    reader.read_exact(&mut buf)?;
    Ok(u16::from_le_bytes(buf))
}

pub(crate) fn read_u32<R: Read>(mut reader: R) -> Result<u32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

pub(crate) fn read_name<R: Read>(mut reader: R, len: usize) -> Result<String> {
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf)?;
    String::from_utf8(buf)
        .map_err(|e| BundleError::PathError(format!("Invalid UTF-8 in entry name: {}", e)))
}

pub(crate) fn skip<R: Read>(reader: R, len: usize) -> Result<()> {
    let copied = std::io::copy(&mut reader.take(len as u64), &mut std::io::sink())?;
    if copied != len as u64 {
        return Err(BundleError::InvalidArchive(
            "Unexpected end of archive in header".to_string(),
        ));
    }
    Ok(())
}
