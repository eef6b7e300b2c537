mod end_record;
mod format;
mod local_entry;
mod reader;
mod writer;

pub use end_record::{EndRecord, END_RECORD_SIZE};
pub use format::{
    CompressionMethod, DosDateTime, EntryInfo, CD_ENTRY_SIZE, CENTRAL_DIRECTORY_SIGNATURE,
    DATA_DESCRIPTOR_SIGNATURE, END_RECORD_SIGNATURE, FLAG_DATA_DESCRIPTOR, FLAG_UTF8,
    LOCAL_ENTRY_SIGNATURE, MANIFEST_NAME, MAX_PATH_LENGTH, META_INF_DIR,
};
pub use format::normalize_path;
pub use local_entry::{DataDescriptor, LocalEntryHeader, DATA_DESCRIPTOR_SIZE};
pub use reader::{read_manifest, ArchiveEntry, ArchiveStreamReader};
pub use writer::ArchiveWriter;
