use super::error::DescriptorError;
use super::fingerprint::Fingerprint;
use crate::bencode::{self, Value};
use crate::constants::MAX_METADATA_SIZE;
use bytes::Bytes;
use std::path::PathBuf;

/// One file within the descriptor's flat byte address space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// Path relative to the download root, descriptor name included.
    pub path: PathBuf,
    pub length: u64,
    /// Position of the file's first byte in the flat address space.
    pub offset: u64,
}

/// Parsed description of a downloadable item.
///
/// Invariants are checked at parse time: the piece length is non-zero,
/// the hash list covers the total length exactly, and file offsets are
/// contiguous from zero. The raw info dictionary is retained so the
/// descriptor can be re-served to bootstrapping peers without
/// re-serialization.
#[derive(Debug, Clone)]
pub struct Descriptor {
    pub name: String,
    pub piece_length: u32,
    pub total_length: u64,
    pub piece_hashes: Vec<[u8; 20]>,
    pub files: Vec<FileEntry>,
    fingerprint: Fingerprint,
    raw_info: Bytes,
}

impl PartialEq for Descriptor {
    fn eq(&self, other: &Self) -> bool {
        // The raw info bytes determine every other field.
        self.raw_info == other.raw_info
    }
}

impl Eq for Descriptor {}

impl Descriptor {
    /// Parses a whole metainfo file, hashing the info dictionary over
    /// the exact byte span it occupies in the input.
    pub fn from_torrent_bytes(data: &[u8]) -> Result<Self, DescriptorError> {
        let raw_info =
            bencode::raw_entry(data, b"info")?.ok_or(DescriptorError::MissingField("info"))?;
        Self::from_info_bytes(raw_info)
    }

    /// Parses a bare info dictionary, e.g. a metadata blob assembled
    /// from peers.
    pub fn from_info_bytes(data: &[u8]) -> Result<Self, DescriptorError> {
        if data.len() > MAX_METADATA_SIZE {
            return Err(DescriptorError::OversizedMetadata(data.len()));
        }
        let fingerprint = Fingerprint::of_info(data);
        let info = bencode::decode(data)?;
        if info.as_dict().is_none() {
            return Err(DescriptorError::InvalidField("info"));
        }

        let name = info
            .get(b"name")
            .ok_or(DescriptorError::MissingField("name"))?
            .as_str()
            .ok_or(DescriptorError::InvalidField("name"))?
            .to_owned();
        validate_path_component(&name)?;

        let piece_length = info
            .get(b"piece length")
            .ok_or(DescriptorError::MissingField("piece length"))?
            .as_integer()
            .filter(|&len| len > 0 && len <= u32::MAX as i64)
            .ok_or(DescriptorError::InvalidField("piece length"))? as u32;

        let hash_bytes = info
            .get(b"pieces")
            .ok_or(DescriptorError::MissingField("pieces"))?
            .as_bytes()
            .filter(|b| b.len() % 20 == 0)
            .ok_or(DescriptorError::InvalidField("pieces"))?;
        let piece_hashes: Vec<[u8; 20]> = hash_bytes
            .chunks_exact(20)
            .map(|chunk| {
                let mut hash = [0u8; 20];
                hash.copy_from_slice(chunk);
                hash
            })
            .collect();

        let files = parse_files(&info, &name)?;
        let total_length: u64 = files.iter().map(|f| f.length).sum();

        let expected_hashes = total_length.div_ceil(piece_length as u64) as usize;
        if piece_hashes.len() != expected_hashes {
            return Err(DescriptorError::HashCountMismatch {
                hashes: piece_hashes.len(),
                total: total_length,
            });
        }

        Ok(Descriptor {
            name,
            piece_length,
            total_length,
            piece_hashes,
            files,
            fingerprint,
            raw_info: Bytes::copy_from_slice(data),
        })
    }

    pub fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }

    /// The info dictionary exactly as it was hashed.
    pub fn raw_info(&self) -> &Bytes {
        &self.raw_info
    }

    pub fn piece_count(&self) -> u32 {
        self.piece_hashes.len() as u32
    }

    /// Length of piece `index`; the final piece may be short. Zero for
    /// out-of-range indices.
    pub fn piece_size(&self, index: u32) -> u32 {
        let start = index as u64 * self.piece_length as u64;
        if start >= self.total_length {
            return 0;
        }
        (self.total_length - start).min(self.piece_length as u64) as u32
    }

    /// Position of piece `index` in the flat byte address space.
    pub fn piece_offset(&self, index: u32) -> u64 {
        index as u64 * self.piece_length as u64
    }

    pub fn piece_hash(&self, index: u32) -> Option<&[u8; 20]> {
        self.piece_hashes.get(index as usize)
    }
}

fn parse_files(info: &Value, name: &str) -> Result<Vec<FileEntry>, DescriptorError> {
    if let Some(length) = info.get(b"length") {
        let length = length
            .as_integer()
            .filter(|&len| len >= 0)
            .ok_or(DescriptorError::InvalidField("length"))? as u64;
        return Ok(vec![FileEntry {
            path: PathBuf::from(name),
            length,
            offset: 0,
        }]);
    }

    let entries = info
        .get(b"files")
        .ok_or(DescriptorError::MissingField("length or files"))?
        .as_list()
        .ok_or(DescriptorError::InvalidField("files"))?;
    if entries.is_empty() {
        return Err(DescriptorError::InvalidField("files"));
    }

    let mut files = Vec::with_capacity(entries.len());
    let mut offset = 0u64;
    for entry in entries {
        let length = entry
            .get(b"length")
            .ok_or(DescriptorError::MissingField("files.length"))?
            .as_integer()
            .filter(|&len| len >= 0)
            .ok_or(DescriptorError::InvalidField("files.length"))? as u64;

        let components = entry
            .get(b"path")
            .ok_or(DescriptorError::MissingField("files.path"))?
            .as_list()
            .ok_or(DescriptorError::InvalidField("files.path"))?;
        if components.is_empty() {
            return Err(DescriptorError::InvalidField("files.path"));
        }

        let mut path = PathBuf::from(name);
        for component in components {
            let component = component
                .as_str()
                .ok_or(DescriptorError::InvalidField("files.path"))?;
            validate_path_component(component)?;
            path.push(component);
        }

        files.push(FileEntry { path, length, offset });
        offset += length;
    }
    Ok(files)
}

/// Rejects components that would escape the download root.
fn validate_path_component(component: &str) -> Result<(), DescriptorError> {
    if component.is_empty()
        || component == "."
        || component == ".."
        || component.contains(['/', '\\', '\0'])
    {
        return Err(DescriptorError::InvalidField("path component"));
    }
    Ok(())
}
