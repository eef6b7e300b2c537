use crate::archive::format::{
    read_name, read_u16, read_u32, skip, to_u32, CompressionMethod, DosDateTime,
    DATA_DESCRIPTOR_SIGNATURE, FLAG_DATA_DESCRIPTOR, LOCAL_ENTRY_SIGNATURE, MAX_PATH_LENGTH,
    VERSION_NEEDED,
};
use crate::error::{BundleError, Result};
use std::io::{Read, Write};

/// Local File Header
///
/// Precedes each entry's data. When `FLAG_DATA_DESCRIPTOR` is set the CRC
/// and size fields are zero and the real values follow the data in a
/// [`DataDescriptor`], which is what lets the writer stream entries of
/// unknown length into a non-seekable sink.
///
/// Structure (30 bytes + name + extra):
/// - Signature: 0x04034b50 (4 bytes)
/// - Version Needed: uint16
/// - Flags: uint16
/// - Compression Method: uint16
/// - Modified Time / Date: uint16 + uint16
/// - CRC32: uint32
/// - Compressed Size: uint32
/// - Uncompressed Size: uint32
/// - Name Length: uint16
/// - Extra Field Length: uint16
/// - Name: variable (UTF-8)
/// - Extra Field: variable
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalEntryHeader {
    pub flags: u16,
    pub compression: CompressionMethod,
    pub modified: DosDateTime,
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub name: String,
}

impl LocalEntryHeader {
    /// Header for an entry whose sizes follow in a data descriptor
    pub fn streamed(name: String, flags: u16, compression: CompressionMethod, modified: DosDateTime) -> Self {
        Self {
            flags: flags | FLAG_DATA_DESCRIPTOR,
            compression,
            modified,
            crc32: 0,
            compressed_size: 0,
            uncompressed_size: 0,
            name,
        }
    }

    pub fn has_data_descriptor(&self) -> bool {
        self.flags & FLAG_DATA_DESCRIPTOR != 0
    }

    /// Write local header to a writer
    pub fn write_to<W: Write>(&self, mut writer: W) -> Result<usize> {
        let name = self.name.as_bytes();
        if name.len() > MAX_PATH_LENGTH {
            return Err(BundleError::PathError(format!(
                "Path too long: {} bytes (max {})",
                name.len(),
                MAX_PATH_LENGTH
            )));
        }

        writer.write_all(&LOCAL_ENTRY_SIGNATURE.to_le_bytes())?;
        writer.write_all(&VERSION_NEEDED.to_le_bytes())?;
        writer.write_all(&self.flags.to_le_bytes())?;
        writer.write_all(&(self.compression as u16).to_le_bytes())?;
        writer.write_all(&self.modified.time.to_le_bytes())?;
        writer.write_all(&self.modified.date.to_le_bytes())?;
        writer.write_all(&self.crc32.to_le_bytes())?;
        writer.write_all(&self.compressed_size.to_le_bytes())?;
        writer.write_all(&self.uncompressed_size.to_le_bytes())?;
        writer.write_all(&(name.len() as u16).to_le_bytes())?;
        writer.write_all(&0u16.to_le_bytes())?; // extra field length
        writer.write_all(name)?;

        Ok(self.header_size())
    }

    /// Read a local header whose signature was already consumed
    pub fn read_after_signature<R: Read>(mut reader: R) -> Result<Self> {
        let _needed = read_u16(&mut reader)?;
        let flags = read_u16(&mut reader)?;
        let compression = CompressionMethod::from_u16(read_u16(&mut reader)?)?;
        let time = read_u16(&mut reader)?;
        let date = read_u16(&mut reader)?;
        let crc32 = read_u32(&mut reader)?;
        let compressed_size = read_u32(&mut reader)?;
        let uncompressed_size = read_u32(&mut reader)?;
        let name_len = read_u16(&mut reader)? as usize;
        let extra_len = read_u16(&mut reader)? as usize;

        let name = read_name(&mut reader, name_len)?;
        skip(&mut reader, extra_len)?;

        Ok(Self {
            flags,
            compression,
            modified: DosDateTime { time, date },
            crc32,
            compressed_size,
            uncompressed_size,
            name,
        })
    }

    /// Calculate the total size of this header when written
    pub fn header_size(&self) -> usize {
        4 + // Signature
        2 + // Version needed
        2 + // Flags
        2 + // Compression method
        4 + // Modified time and date
        4 + // CRC32
        4 + // Compressed size
        4 + // Uncompressed size
        2 + // Name length
        2 + // Extra field length
        self.name.len()
    }
}

/// Data Descriptor
///
/// Trails the data of a streamed entry. Always written with its optional
/// signature; readers accept it either way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataDescriptor {
    pub crc32: u32,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
}

/// Size of a data descriptor including its signature
pub const DATA_DESCRIPTOR_SIZE: usize = 16;

impl DataDescriptor {
    pub fn write_to<W: Write>(&self, mut writer: W) -> Result<usize> {
        writer.write_all(&DATA_DESCRIPTOR_SIGNATURE.to_le_bytes())?;
        writer.write_all(&self.crc32.to_le_bytes())?;
        writer.write_all(&to_u32(self.compressed_size, "compressed size")?.to_le_bytes())?;
        writer.write_all(&to_u32(self.uncompressed_size, "uncompressed size")?.to_le_bytes())?;
        Ok(DATA_DESCRIPTOR_SIZE)
    }

    pub fn read_from<R: Read>(mut reader: R) -> Result<Self> {
        let first = read_u32(&mut reader)?;
        let crc32 = if first == DATA_DESCRIPTOR_SIGNATURE {
            read_u32(&mut reader)?
        } else {
            first
        };
        let compressed_size = read_u32(&mut reader)? as u64;
        let uncompressed_size = read_u32(&mut reader)? as u64;

        Ok(Self {
            crc32,
            compressed_size,
            uncompressed_size,
        })
    }
}
