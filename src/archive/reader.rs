use crate::archive::end_record::EndRecord;
use crate::archive::format::{
    read_u32, CompressionMethod, EntryInfo, CENTRAL_DIRECTORY_SIGNATURE, END_RECORD_SIGNATURE,
    LOCAL_ENTRY_SIGNATURE, MANIFEST_NAME, META_INF_DIR,
};
use crate::archive::local_entry::{DataDescriptor, LocalEntryHeader};
use crate::error::{BundleError, Result};
use crate::manifest::Manifest;
use flate2::bufread::DeflateDecoder;
use std::io::{BufReader, ErrorKind, Read};

/// One fully decoded archive entry
#[derive(Debug, Clone)]
pub struct ArchiveEntry {
    pub name: String,
    pub compression: CompressionMethod,
    pub crc32: u32,
    pub data: Vec<u8>,
}

/// Sequential archive reader
///
/// Walks local headers front to back without seeking, so it can consume a
/// [`BundleStream`](crate::BundleStream) while the writer thread is still
/// producing it. Every entry's CRC and sizes are checked as it is read;
/// [`finish`](Self::finish) then checks the central directory against what
/// was streamed.
pub struct ArchiveStreamReader<R: Read> {
    reader: BufReader<R>,
    entries_read: usize,
    /// Signature that ended the entry sequence
    trailer: Option<u32>,
}

impl<R: Read> ArchiveStreamReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
            entries_read: 0,
            trailer: None,
        }
    }

    /// Number of entries returned so far
    pub fn entries_read(&self) -> usize {
        self.entries_read
    }

    /// Read the next entry, or `None` once the entry sequence ends
    ///
    /// Input that does not start with a local header yields `None` rather
    /// than an error, so arbitrary resources can be probed for an embedded
    /// manifest. Once at least one entry was read, running out of input is
    /// reported as a truncated archive.
    pub fn next_entry(&mut self) -> Result<Option<ArchiveEntry>> {
        if self.trailer.is_some() {
            return Ok(None);
        }

        let signature = match self.read_signature()? {
            Some(signature) => signature,
            None if self.entries_read == 0 => {
                self.trailer = Some(0);
                return Ok(None);
            }
            None => {
                return Err(BundleError::InvalidArchive(format!(
                    "Archive truncated after {} entries",
                    self.entries_read
                )))
            }
        };

        if signature != LOCAL_ENTRY_SIGNATURE {
            self.trailer = Some(signature);
            return Ok(None);
        }

        let header = LocalEntryHeader::read_after_signature(&mut self.reader)?;
        let (data, descriptor) = self.read_entry_data(&header)?;

        let computed = crc32fast::hash(&data);
        if computed != descriptor.crc32 {
            return Err(BundleError::CrcMismatch {
                path: header.name,
                expected: descriptor.crc32,
                actual: computed,
            });
        }
        if data.len() as u64 != descriptor.uncompressed_size {
            return Err(BundleError::InvalidArchive(format!(
                "Size mismatch for {}: expected {}, got {}",
                header.name,
                descriptor.uncompressed_size,
                data.len()
            )));
        }

        self.entries_read += 1;
        Ok(Some(ArchiveEntry {
            name: header.name,
            compression: header.compression,
            crc32: computed,
            data,
        }))
    }

    /// Read the central directory and end record after the last entry
    ///
    /// Fails if the archive has no central directory (for example because the
    /// stream was cut short) or if it disagrees with the streamed entries.
    pub fn finish(mut self) -> Result<Vec<EntryInfo>> {
        while self.next_entry()?.is_some() {}

        let mut signature = match self.trailer {
            Some(signature) if signature != 0 => signature,
            _ => {
                return Err(BundleError::InvalidArchive(
                    "Archive has no central directory".to_string(),
                ))
            }
        };

        let mut directory = Vec::with_capacity(self.entries_read);
        while signature == CENTRAL_DIRECTORY_SIGNATURE {
            directory.push(EntryInfo::read_after_signature(&mut self.reader)?);
            signature = read_u32(&mut self.reader)?;
        }

        if signature != END_RECORD_SIGNATURE {
            return Err(BundleError::InvalidArchive(format!(
                "Unexpected signature {:08x} in central directory",
                signature
            )));
        }

        let end_record = EndRecord::read_after_signature(&mut self.reader)?;
        if end_record.entry_count as usize != directory.len()
            || directory.len() != self.entries_read
        {
            return Err(BundleError::InvalidArchive(format!(
                "Entry count mismatch: streamed {}, directory lists {}, end record says {}",
                self.entries_read,
                directory.len(),
                end_record.entry_count
            )));
        }

        Ok(directory)
    }

    /// Read a 4-byte signature; `None` if input ends before all four bytes
    fn read_signature(&mut self) -> Result<Option<u32>> {
        let mut buf = [0u8; 4];
        let mut filled = 0;
        while filled < buf.len() {
            match self.reader.read(&mut buf[filled..]) {
                Ok(0) => return Ok(None),
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(Some(u32::from_le_bytes(buf)))
    }

    fn read_entry_data(&mut self, header: &LocalEntryHeader) -> Result<(Vec<u8>, DataDescriptor)> {
        let mut data = Vec::new();

        if header.has_data_descriptor() {
            if header.compression == CompressionMethod::Stored {
                return Err(BundleError::InvalidArchive(format!(
                    "Stored entry {} has no size in its local header and cannot be streamed",
                    header.name
                )));
            }

            // The deflate stream marks its own end; the bufread decoder
            // consumes exactly the compressed bytes
            let mut decoder = DeflateDecoder::new(&mut self.reader);
            decoder.read_to_end(&mut data)?;
            let consumed = decoder.total_in();

            let descriptor = DataDescriptor::read_from(&mut self.reader)?;
            if consumed != descriptor.compressed_size {
                return Err(BundleError::InvalidArchive(format!(
                    "Compressed size mismatch for {}: expected {}, got {}",
                    header.name, descriptor.compressed_size, consumed
                )));
            }
            return Ok((data, descriptor));
        }

        let mut raw = Vec::new();
        (&mut self.reader)
            .take(header.compressed_size as u64)
            .read_to_end(&mut raw)?;
        if raw.len() as u64 != header.compressed_size as u64 {
            return Err(BundleError::InvalidArchive(format!(
                "Unexpected end of data in {}",
                header.name
            )));
        }

        match header.compression {
            CompressionMethod::Stored => data = raw,
            CompressionMethod::Deflated => {
                DeflateDecoder::new(&raw[..]).read_to_end(&mut data)?;
            }
        }

        Ok((
            data,
            DataDescriptor {
                crc32: header.crc32,
                compressed_size: header.compressed_size as u64,
                uncompressed_size: header.uncompressed_size as u64,
            },
        ))
    }
}

/// Read the manifest of a JAR-style archive from its first entries
///
/// Mirrors what JAR readers accept: the manifest must be the first entry,
/// optionally preceded by the `META-INF/` directory entry. Returns `None`
/// when the input is not an archive or carries no manifest up front.
pub fn read_manifest<R: Read>(reader: R) -> Result<Option<Manifest>> {
    let mut archive = ArchiveStreamReader::new(reader);

    let mut entry = archive.next_entry()?;
    if matches!(&entry, Some(e) if e.name.eq_ignore_ascii_case(META_INF_DIR)) {
        entry = archive.next_entry()?;
    }

    match entry {
        Some(e) if e.name.eq_ignore_ascii_case(MANIFEST_NAME) => {
            Ok(Some(Manifest::parse(&e.data)?))
        }
        _ => Ok(None),
    }
}
