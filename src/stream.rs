//! Background archive production
//!
//! A build serializes its manifest up front, then hands the entry plan to a
//! dedicated writer thread. The thread writes the archive into a bounded
//! [`pipe`](crate::pipe) and the caller reads it through [`BundleStream`]
//! while it is being produced.
//!
//! Entry order on the wire is always: `META-INF/MANIFEST.MF`, then each
//! planned entry in plan order, skipping entries flagged missing.

use crate::archive::{ArchiveWriter, MANIFEST_NAME};
use crate::config::{BuildConfig, StreamFailurePolicy};
use crate::error::{BundleError, Result};
use crate::pipe::{pipe, PipeReader, PipeWriter};
use crate::store::Locator;
use std::io::{self, Read};
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

/// Name of the producer thread
pub const WRITER_THREAD_NAME: &str = "tinybundles-writer";

/// One entry the writer thread will emit
#[derive(Debug, Clone)]
pub struct PlannedEntry {
    pub name: String,
    pub source: Locator,
    /// Declared in the manifest but not written
    pub missing: bool,
}

/// Everything the writer thread needs, prepared before it starts
#[derive(Debug)]
pub struct WriteJob {
    pub manifest: Vec<u8>,
    pub entries: Vec<PlannedEntry>,
    pub config: BuildConfig,
}

/// Outcome of a completed build
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildSummary {
    /// Archive entries written, manifest included
    pub entries_written: usize,
    /// Missing entries left out of the archive
    pub entries_skipped: usize,
    /// Total archive bytes handed to the pipe
    pub bytes_written: u64,
}

/// Read end of a bundle being built
///
/// Implements [`Read`]; the archive bytes become available as the writer
/// thread produces them. A failure on the writer side shows up as an
/// `io::Error` from `read` once the bytes written before it are drained,
/// unless the build was configured with [`StreamFailurePolicy::Truncate`].
///
/// Dropping the stream before the end cancels the build.
pub struct BundleStream {
    reader: PipeReader,
    producer: JoinHandle<Result<BuildSummary>>,
}

impl BundleStream {
    /// Start the writer thread for `job`
    pub fn spawn(job: WriteJob) -> Result<Self> {
        let (writer, reader) = pipe(job.config.pipe_capacity, job.config.chunk_size);

        let producer = thread::Builder::new()
            .name(WRITER_THREAD_NAME.to_string())
            .spawn(move || run(job, writer))
            .map_err(BundleError::ThreadSpawn)?;

        Ok(Self { reader, producer })
    }

    /// Stop reading; the writer thread stops at its next write
    pub fn cancel(&mut self) {
        debug!("Bundle stream cancelled by consumer");
        self.reader.close();
    }

    /// Wait for the writer thread and return its outcome
    ///
    /// Anything not yet read is discarded. Call this after reading to the
    /// end to learn whether the archive is complete; calling it earlier
    /// cancels the build and yields [`BundleError::Cancelled`] unless the
    /// writer had already finished.
    pub fn finish(mut self) -> Result<BuildSummary> {
        self.reader.close();
        self.producer
            .join()
            .map_err(|_| BundleError::WriterPanicked)?
    }
}

impl Read for BundleStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reader.read(buf)
    }
}

fn run(job: WriteJob, sink: PipeWriter) -> Result<BuildSummary> {
    let WriteJob {
        manifest,
        entries,
        config,
    } = job;

    let mut archive = ArchiveWriter::new(sink).with_compression_level(config.compression_level);
    let mut summary = BuildSummary::default();

    let outcome = write_entries(&mut archive, &manifest, &entries, &config, &mut summary);

    let err = match outcome {
        Ok(()) => {
            let sink = archive.finish().map_err(|e| match e {
                BundleError::Io(e) if e.kind() == io::ErrorKind::BrokenPipe => BundleError::Cancelled,
                other => other,
            })?;
            summary.bytes_written = sink.bytes_written();
            sink.close().map_err(|_| BundleError::Cancelled)?;
            info!(
                "Bundle written: {} entries, {} missing, {} bytes",
                summary.entries_written, summary.entries_skipped, summary.bytes_written
            );
            return Ok(summary);
        }
        Err(err) => err,
    };

    if matches!(err, BundleError::Cancelled) {
        debug!(
            "Writer stopped after {} entries: consumer went away",
            summary.entries_written
        );
        return Err(err);
    }

    warn!("Bundle stream failed: {}", err);
    match config.on_stream_failure {
        StreamFailurePolicy::Propagate => {
            archive.into_inner().fail(&err);
        }
        StreamFailurePolicy::Truncate => match archive.finish() {
            Ok(sink) => {
                warn!(
                    "Archive truncated after {} entries ({} bytes)",
                    summary.entries_written,
                    sink.bytes_written()
                );
                if let Err(e) = sink.close() {
                    debug!("Closing truncated stream failed: {}", e);
                }
            }
            Err(e) => warn!("Could not close truncated archive: {}", e),
        },
    }

    Err(err)
}

fn write_entries(
    archive: &mut ArchiveWriter<PipeWriter>,
    manifest: &[u8],
    entries: &[PlannedEntry],
    config: &BuildConfig,
    summary: &mut BuildSummary,
) -> Result<()> {
    archive
        .add_bytes(MANIFEST_NAME, manifest)
        .map_err(|e| stream_error(MANIFEST_NAME, e, archive.get_ref().is_cancelled()))?;
    summary.entries_written += 1;

    let mut buffer = vec![0u8; config.copy_buffer_size];
    for entry in entries {
        if archive.get_ref().is_cancelled() {
            return Err(BundleError::Cancelled);
        }
        if entry.missing {
            debug!("Skipping missing entry {}", entry.name);
            summary.entries_skipped += 1;
            continue;
        }

        let copied = copy_entry(archive, entry, &mut buffer)
            .map_err(|e| stream_error(&entry.name, e, archive.get_ref().is_cancelled()))?;
        debug!("Copied {} ({} bytes)", entry.name, copied);
        summary.entries_written += 1;
    }

    Ok(())
}

fn copy_entry(
    archive: &mut ArchiveWriter<PipeWriter>,
    entry: &PlannedEntry,
    buffer: &mut [u8],
) -> Result<u64> {
    // Open before the local header goes out so an unreadable source
    // leaves no partial entry behind
    let mut source = entry.source.open()?;
    archive.start_entry(&entry.name)?;

    let mut copied = 0u64;
    loop {
        let n = match source.read(buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        archive.write_data(&buffer[..n])?;
        copied += n as u64;
    }

    archive.finish_entry()?;
    Ok(copied)
}

fn stream_error(entry: &str, err: BundleError, cancelled: bool) -> BundleError {
    if cancelled {
        return BundleError::Cancelled;
    }
    match err {
        BundleError::Cancelled | BundleError::StreamFailed { .. } => err,
        other => BundleError::StreamFailed {
            entry: entry.to_string(),
            message: other.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::ArchiveStreamReader;

    fn job(entries: Vec<PlannedEntry>, config: BuildConfig) -> WriteJob {
        WriteJob {
            manifest: b"Manifest-Version: 1.0\r\n\r\n".to_vec(),
            entries,
            config,
        }
    }

    fn planned(name: &str, data: &[u8]) -> PlannedEntry {
        PlannedEntry {
            name: name.to_string(),
            source: Locator::bytes(data),
            missing: false,
        }
    }

    #[test]
    fn test_manifest_first_then_entries() {
        let mut missing = planned("gone.txt", b"unused");
        missing.missing = true;
        let entries = vec![planned("a.txt", b"alpha"), missing, planned("b.txt", b"beta")];

        let mut stream = BundleStream::spawn(job(entries, BuildConfig::default())).unwrap();
        let mut bytes = Vec::new();
        stream.read_to_end(&mut bytes).unwrap();
        let summary = stream.finish().unwrap();

        assert_eq!(summary.entries_written, 3);
        assert_eq!(summary.entries_skipped, 1);
        assert_eq!(summary.bytes_written, bytes.len() as u64);

        let directory = ArchiveStreamReader::new(&bytes[..]).finish().unwrap();
        let names: Vec<&str> = directory.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec![MANIFEST_NAME, "a.txt", "b.txt"]);
    }

    #[test]
    fn test_writer_thread_is_named() {
        let entries = vec![PlannedEntry {
            name: "probe".to_string(),
            source: Locator::bytes(&b""[..]),
            missing: false,
        }];
        let mut stream = BundleStream::spawn(job(entries, BuildConfig::default())).unwrap();
        let name = stream.producer.thread().name().map(str::to_string);
        assert_eq!(name.as_deref(), Some(WRITER_THREAD_NAME));

        io::copy(&mut stream, &mut io::sink()).unwrap();
        stream.finish().unwrap();
    }

    #[test]
    fn test_stream_error_mapping() {
        let err = stream_error("a.txt", BundleError::Io(io::Error::new(io::ErrorKind::Other, "disk")), false);
        assert!(matches!(err, BundleError::StreamFailed { ref entry, .. } if entry == "a.txt"));

        let err = stream_error("a.txt", BundleError::Io(io::Error::new(io::ErrorKind::Other, "disk")), true);
        assert!(matches!(err, BundleError::Cancelled));
    }
}
