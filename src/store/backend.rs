use super::error::StoreError;
use crate::descriptor::FileEntry;
use bytes::Bytes;
use std::io::SeekFrom;
use std::path::PathBuf;
use tokio::fs::OpenOptions;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

/// Where verified bytes live. Addresses are offsets into the
/// descriptor's flat byte space; the disk backend splits each range
/// across the file table.
#[derive(Debug)]
pub enum StorageBackend {
    Memory(MemoryBackend),
    Disk(DiskBackend),
}

impl StorageBackend {
    pub fn memory(total_length: u64) -> Self {
        StorageBackend::Memory(MemoryBackend {
            data: vec![0; total_length as usize],
        })
    }

    pub fn disk(base_path: PathBuf, files: Vec<FileEntry>) -> Self {
        StorageBackend::Disk(DiskBackend { base_path, files })
    }

    pub(super) async fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<(), StoreError> {
        match self {
            StorageBackend::Memory(backend) => backend.write_at(offset, data),
            StorageBackend::Disk(backend) => backend.write_at(offset, data).await,
        }
    }

    pub(super) async fn read_at(&self, offset: u64, length: usize) -> Result<Bytes, StoreError> {
        match self {
            StorageBackend::Memory(backend) => backend.read_at(offset, length),
            StorageBackend::Disk(backend) => backend.read_at(offset, length).await,
        }
    }
}

/// Flat in-memory buffer, sized up front.
#[derive(Debug)]
pub struct MemoryBackend {
    data: Vec<u8>,
}

impl MemoryBackend {
    fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<(), StoreError> {
        let start = offset as usize;
        let end = start
            .checked_add(data.len())
            .filter(|&end| end <= self.data.len())
            .ok_or(StoreError::OutOfRange {
                offset,
                length: data.len() as u64,
            })?;
        self.data[start..end].copy_from_slice(data);
        Ok(())
    }

    fn read_at(&self, offset: u64, length: usize) -> Result<Bytes, StoreError> {
        let start = offset as usize;
        let end = start
            .checked_add(length)
            .filter(|&end| end <= self.data.len())
            .ok_or(StoreError::OutOfRange {
                offset,
                length: length as u64,
            })?;
        Ok(Bytes::copy_from_slice(&self.data[start..end]))
    }
}

/// Files under a download root, laid out per the descriptor's file
/// table. Handles are opened per operation; parent directories are
/// created on first write.
#[derive(Debug)]
pub struct DiskBackend {
    base_path: PathBuf,
    files: Vec<FileEntry>,
}

struct FileSpan {
    file: usize,
    file_offset: u64,
    length: u64,
}

impl DiskBackend {
    /// Splits a flat byte range across the file table.
    fn spans(&self, mut offset: u64, mut remaining: u64) -> Result<Vec<FileSpan>, StoreError> {
        let mut spans = Vec::new();
        for (index, file) in self.files.iter().enumerate() {
            if remaining == 0 {
                break;
            }
            if file.length == 0 || offset >= file.offset + file.length {
                continue;
            }
            let file_offset = offset - file.offset;
            let length = (file.length - file_offset).min(remaining);
            spans.push(FileSpan {
                file: index,
                file_offset,
                length,
            });
            offset += length;
            remaining -= length;
        }
        if remaining > 0 {
            return Err(StoreError::OutOfRange {
                offset,
                length: remaining,
            });
        }
        Ok(spans)
    }

    async fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<(), StoreError> {
        let mut consumed = 0usize;
        for span in self.spans(offset, data.len() as u64)? {
            let path = self.base_path.join(&self.files[span.file].path);
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            let mut handle = OpenOptions::new()
                .create(true)
                .write(true)
                .open(&path)
                .await?;
            handle.seek(SeekFrom::Start(span.file_offset)).await?;
            handle
                .write_all(&data[consumed..consumed + span.length as usize])
                .await?;
            consumed += span.length as usize;
        }
        Ok(())
    }

    async fn read_at(&self, offset: u64, length: usize) -> Result<Bytes, StoreError> {
        let mut out = vec![0u8; length];
        let mut consumed = 0usize;
        for span in self.spans(offset, length as u64)? {
            let path = self.base_path.join(&self.files[span.file].path);
            let mut handle = OpenOptions::new().read(true).open(&path).await?;
            handle.seek(SeekFrom::Start(span.file_offset)).await?;
            handle
                .read_exact(&mut out[consumed..consumed + span.length as usize])
                .await?;
            consumed += span.length as usize;
        }
        Ok(Bytes::from(out))
    }
}
