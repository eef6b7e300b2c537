use crate::archive::end_record::EndRecord;
use crate::archive::format::{normalize_path, CompressionMethod, DosDateTime, EntryInfo, FLAG_UTF8};
use crate::archive::local_entry::{DataDescriptor, LocalEntryHeader};
use crate::config::DEFAULT_COMPRESSION_LEVEL;
use crate::error::{BundleError, Result};
use flate2::write::DeflateEncoder;
use flate2::Compression;
use std::collections::HashSet;
use std::io::{self, Read, Write};

/// Entry currently receiving data
struct OpenEntry {
    info: EntryInfo,
    hasher: crc32fast::Hasher,
    encoder: DeflateEncoder<Vec<u8>>,
}

/// Streaming ZIP writer
///
/// Entries are written strictly front to back: local header, deflated data,
/// data descriptor. Nothing is ever seeked or rewritten, so the sink can be a
/// pipe or socket. Memory use is bounded by the deflate window, not by entry
/// size.
pub struct ArchiveWriter<W: Write> {
    writer: W,
    entries: Vec<EntryInfo>,
    names: HashSet<String>,
    current: Option<OpenEntry>,
    current_offset: u64,
    compression: Compression,
}

impl<W: Write> ArchiveWriter<W> {
    /// Create a writer over any byte sink
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            entries: Vec::new(),
            names: HashSet::new(),
            current: None,
            current_offset: 0,
            compression: Compression::new(DEFAULT_COMPRESSION_LEVEL),
        }
    }

    /// Set the deflate level (0-9)
    pub fn with_compression_level(mut self, level: u32) -> Self {
        self.compression = Compression::new(level.min(9));
        self
    }

    pub fn get_ref(&self) -> &W {
        &self.writer
    }

    /// Abandon the archive and return the sink as it is
    pub fn into_inner(self) -> W {
        self.writer
    }

    /// Bytes emitted so far
    pub fn bytes_written(&self) -> u64 {
        self.current_offset
    }

    /// Entries completed so far
    pub fn entries(&self) -> &[EntryInfo] {
        &self.entries
    }

    /// Begin a new entry, closing any entry still open
    pub fn start_entry(&mut self, name: &str) -> Result<()> {
        if self.current.is_some() {
            self.finish_entry()?;
        }

        let name = normalize_path(name);
        if name.is_empty() {
            return Err(BundleError::PathError("Entry name is empty".to_string()));
        }
        if self.names.contains(&name) {
            return Err(BundleError::DuplicateEntry(name));
        }

        let header = LocalEntryHeader::streamed(
            name.clone(),
            FLAG_UTF8,
            CompressionMethod::Deflated,
            DosDateTime::now(),
        );

        let local_header_offset = self.current_offset;
        self.current_offset += header.write_to(&mut self.writer)? as u64;
        self.names.insert(name.clone());

        self.current = Some(OpenEntry {
            info: EntryInfo {
                name,
                flags: header.flags,
                compression: header.compression,
                modified: header.modified,
                crc32: 0,
                compressed_size: 0,
                uncompressed_size: 0,
                local_header_offset,
            },
            hasher: crc32fast::Hasher::new(),
            encoder: DeflateEncoder::new(Vec::new(), self.compression),
        });

        Ok(())
    }

    /// Append data to the open entry
    pub fn write_data(&mut self, data: &[u8]) -> Result<()> {
        let entry = self
            .current
            .as_mut()
            .ok_or_else(|| BundleError::InvalidArchive("No entry is open".to_string()))?;

        entry.hasher.update(data);
        entry.info.uncompressed_size += data.len() as u64;
        entry.encoder.write_all(data)?;

        // Hand compressed output to the sink as soon as the encoder releases it
        let compressed = std::mem::take(entry.encoder.get_mut());
        if !compressed.is_empty() {
            self.writer.write_all(&compressed)?;
            entry.info.compressed_size += compressed.len() as u64;
            self.current_offset += compressed.len() as u64;
        }

        Ok(())
    }

    /// Close the open entry and write its data descriptor
    pub fn finish_entry(&mut self) -> Result<EntryInfo> {
        let mut entry = self
            .current
            .take()
            .ok_or_else(|| BundleError::InvalidArchive("No entry is open".to_string()))?;

        entry.encoder.try_finish()?;
        let tail = std::mem::take(entry.encoder.get_mut());
        self.writer.write_all(&tail)?;
        entry.info.compressed_size += tail.len() as u64;
        self.current_offset += tail.len() as u64;

        entry.info.crc32 = entry.hasher.finalize();

        let descriptor = DataDescriptor {
            crc32: entry.info.crc32,
            compressed_size: entry.info.compressed_size,
            uncompressed_size: entry.info.uncompressed_size,
        };
        self.current_offset += descriptor.write_to(&mut self.writer)? as u64;

        self.entries.push(entry.info.clone());
        Ok(entry.info)
    }

    /// Add a complete entry from memory
    pub fn add_bytes(&mut self, name: &str, data: &[u8]) -> Result<EntryInfo> {
        self.start_entry(name)?;
        self.write_data(data)?;
        self.finish_entry()
    }

    /// Add a complete entry by draining a reader
    pub fn add_entry<R: Read>(&mut self, name: &str, mut reader: R) -> Result<EntryInfo> {
        self.start_entry(name)?;
        io::copy(&mut reader, self)?;
        self.finish_entry()
    }

    /// Write the central directory and end record, returning the sink
    pub fn finish(mut self) -> Result<W> {
        if self.current.is_some() {
            self.finish_entry()?;
        }

        let cd_offset = self.current_offset;
        for entry in &self.entries {
            self.current_offset += entry.write_to(&mut self.writer)? as u64;
        }
        let cd_size = self.current_offset - cd_offset;

        let end_record = EndRecord::new(self.entries.len(), cd_size, cd_offset)?;
        self.current_offset += end_record.write_to(&mut self.writer)? as u64;

        self.writer.flush()?;
        Ok(self.writer)
    }
}

impl<W: Write> Write for ArchiveWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_data(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}
