use crate::archive::format::{read_u16, read_u32, skip, to_u32, END_RECORD_SIGNATURE};
use crate::error::{BundleError, Result};
use std::io::{Read, Write};

/// End record size in bytes, without comment
pub const END_RECORD_SIZE: usize = 22;

/// End of Central Directory Record
///
/// Closes the archive. Readers that start from the back use it to find the
/// central directory; the sequential reader uses it to confirm the entry
/// count it streamed.
///
/// Structure (22 bytes + comment):
/// - Signature: 0x06054b50 (4 bytes)
/// - Disk Number: uint16
/// - Central Directory Disk: uint16
/// - Entries On This Disk: uint16
/// - Total Entries: uint16
/// - Central Directory Size: uint32
/// - Central Directory Offset: uint32
/// - Comment Length: uint16
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndRecord {
    pub entry_count: u16,
    pub central_directory_size: u32,
    pub central_directory_offset: u32,
}

impl EndRecord {
    /// Create a new end record, checking the 16/32-bit field limits
    pub fn new(entry_count: usize, central_directory_size: u64, central_directory_offset: u64) -> Result<Self> {
        let entry_count = u16::try_from(entry_count).map_err(|_| {
            BundleError::ArchiveTooLarge(format!("{} entries exceeds 65535", entry_count))
        })?;

        Ok(Self {
            entry_count,
            central_directory_size: to_u32(central_directory_size, "central directory size")?,
            central_directory_offset: to_u32(central_directory_offset, "central directory offset")?,
        })
    }

    /// Write end record to a writer
    pub fn write_to<W: Write>(&self, mut writer: W) -> Result<usize> {
        writer.write_all(&END_RECORD_SIGNATURE.to_le_bytes())?;
        writer.write_all(&0u16.to_le_bytes())?; // this disk
        writer.write_all(&0u16.to_le_bytes())?; // central directory disk
        writer.write_all(&self.entry_count.to_le_bytes())?;
        writer.write_all(&self.entry_count.to_le_bytes())?;
        writer.write_all(&self.central_directory_size.to_le_bytes())?;
        writer.write_all(&self.central_directory_offset.to_le_bytes())?;
        writer.write_all(&0u16.to_le_bytes())?; // comment length
        Ok(END_RECORD_SIZE)
    }

    /// Read an end record whose signature was already consumed
    pub fn read_after_signature<R: Read>(mut reader: R) -> Result<Self> {
        let disk = read_u16(&mut reader)?;
        let cd_disk = read_u16(&mut reader)?;
        let disk_entries = read_u16(&mut reader)?;
        let entry_count = read_u16(&mut reader)?;
        let central_directory_size = read_u32(&mut reader)?;
        let central_directory_offset = read_u32(&mut reader)?;
        let comment_len = read_u16(&mut reader)? as usize;
        skip(&mut reader, comment_len)?;

        if disk != 0 || cd_disk != 0 || disk_entries != entry_count {
            return Err(BundleError::InvalidArchive(
                "Multi-disk archives are not supported".to_string(),
            ));
        }

        Ok(Self {
            entry_count,
            central_directory_size,
            central_directory_offset,
        })
    }
}
