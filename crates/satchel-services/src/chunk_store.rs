//! Chunked blob storage.
//!
//! A downloaded blob is cut into fixed 1 MiB slices and each slice is stored
//! as its own row, keyed `{file_id}#{index:010}` and indexed by `file_id`.
//! A chunk group is every row sharing a `file_id`; reassembly requires the
//! indices to run 0..N-1 without gaps.
//!
//! Stored value layout (little-endian):
//!   u32 chunk index | u64 written-at unix ms | payload

use std::sync::atomic::{AtomicBool, Ordering};

use bytes::{Buf, BufMut, Bytes, BytesMut};
use futures::stream::{self, StreamExt};

use crate::error::CacheError;
use crate::now_ms;
use crate::store::{blocking, IndexEntry, IndexRange, StoreError, StoreHandle, Table};

/// Size of every chunk but the last one in a group.
pub const CHUNK_SIZE: usize = 1024 * 1024; // 1 MiB

/// Secondary index grouping chunks by their blob.
pub const FILE_ID_INDEX: &str = "fileId";

const HEADER_LEN: usize = 4 + 8;

/// Partition `blob` into `chunk_size` slices; the last may be shorter.
///
/// Slices share the blob's buffer. An empty blob yields no slices.
pub fn split(blob: &Bytes, chunk_size: usize) -> Vec<Bytes> {
    let chunk_size = chunk_size.max(1);
    (0..blob.len())
        .step_by(chunk_size)
        .map(|start| blob.slice(start..(start + chunk_size).min(blob.len())))
        .collect()
}

/// One persisted slice of a blob.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub file_id: String,
    pub index: u32,
    pub data: Bytes,
    pub written_at: u64,
}

impl Chunk {
    pub fn key(file_id: &str, index: u32) -> String {
        format!("{file_id}#{index:010}")
    }

    fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(HEADER_LEN + self.data.len());
        buf.put_u32_le(self.index);
        buf.put_u64_le(self.written_at);
        buf.put_slice(&self.data);
        buf
    }

    fn decode(file_id: &str, key: String, raw: Vec<u8>) -> Result<Self, StoreError> {
        if raw.len() < HEADER_LEN {
            return Err(StoreError::Malformed {
                table: Table::FileChunks.name(),
                key,
                reason: format!("{} bytes is shorter than the chunk header", raw.len()),
            });
        }
        let mut bytes = Bytes::from(raw);
        let index = bytes.get_u32_le();
        let written_at = bytes.get_u64_le();
        Ok(Self {
            file_id: file_id.to_string(),
            index,
            data: bytes,
            written_at,
        })
    }
}

/// Chunk groups over the durable store.
#[derive(Clone)]
pub struct ChunkStore {
    store: StoreHandle,
}

impl ChunkStore {
    pub fn new(store: StoreHandle) -> Self {
        Self { store }
    }

    /// Upsert one chunk. Re-issuing the same key overwrites it.
    pub async fn put(&self, file_id: &str, index: u32, data: Bytes) -> Result<(), StoreError> {
        let len = data.len();
        let chunk = Chunk {
            file_id: file_id.to_string(),
            index,
            data,
            written_at: now_ms(),
        };
        let key = Chunk::key(file_id, index);
        let encoded = chunk.encode();
        let group = IndexEntry::new(FILE_ID_INDEX, file_id);

        blocking(&self.store, move |s| {
            s.put(Table::FileChunks, &key, &encoded, std::slice::from_ref(&group))
        })
        .await?;

        tracing::trace!(file_id, index, bytes = len, "chunk stored");
        Ok(())
    }

    /// Split `blob` and write every slice under `file_id`, up to
    /// `parallelism` writes at a time.
    ///
    /// On the first failure no further writes are started, but writes
    /// already issued are awaited so the caller can clean up a settled group.
    pub async fn write_group(
        &self,
        file_id: &str,
        blob: &Bytes,
        parallelism: usize,
    ) -> Result<usize, StoreError> {
        let pieces = split(blob, CHUNK_SIZE);
        let count = pieces.len();
        let failed = AtomicBool::new(false);

        let mut writes = stream::iter(pieces.into_iter().enumerate())
            .map(|(index, data)| {
                let failed = &failed;
                async move {
                    if failed.load(Ordering::Acquire) {
                        return Ok(());
                    }
                    let result = self.put(file_id, index as u32, data).await;
                    if result.is_err() {
                        failed.store(true, Ordering::Release);
                    }
                    result
                }
            })
            .buffer_unordered(parallelism.max(1));

        let mut first_error = None;
        while let Some(result) = writes.next().await {
            if let Err(e) = result {
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(count),
        }
    }

    /// Every chunk of a group, sorted by index.
    pub async fn load_group(&self, file_id: &str) -> Result<Vec<Chunk>, StoreError> {
        let group = file_id.to_string();
        let rows = blocking(&self.store, move |s| {
            s.scan_index(Table::FileChunks, FILE_ID_INDEX, &IndexRange::Exact(group))
        })
        .await?;

        let mut chunks = rows
            .into_iter()
            .map(|(key, raw)| Chunk::decode(file_id, key, raw))
            .collect::<Result<Vec<_>, _>>()?;
        chunks.sort_by_key(|c| c.index);
        Ok(chunks)
    }

    /// Reassemble a group, checking it is contiguous and `expected_len` long.
    pub async fn reconstruct(&self, file_id: &str, expected_len: u64) -> Result<Bytes, CacheError> {
        let chunks = self
            .load_group(file_id)
            .await
            .map_err(CacheError::StorageReadFailed)?;

        for (position, chunk) in chunks.iter().enumerate() {
            if chunk.index as usize != position {
                return Err(CacheError::ContentCorrupted {
                    file_id: file_id.to_string(),
                    reason: format!("chunk {position} missing (next stored index is {})", chunk.index),
                });
            }
        }

        let total: usize = chunks.iter().map(|c| c.data.len()).sum();
        if total as u64 != expected_len {
            return Err(CacheError::ContentCorrupted {
                file_id: file_id.to_string(),
                reason: format!("reassembled {total} bytes, expected {expected_len}"),
            });
        }

        let mut blob = BytesMut::with_capacity(total);
        for chunk in &chunks {
            blob.extend_from_slice(&chunk.data);
        }
        tracing::debug!(file_id, chunks = chunks.len(), bytes = total, "group reassembled");
        Ok(blob.freeze())
    }

    /// Stored chunk indices of a group, ascending.
    pub async fn indices(&self, file_id: &str) -> Result<Vec<u32>, StoreError> {
        Ok(self
            .load_group(file_id)
            .await?
            .into_iter()
            .map(|c| c.index)
            .collect())
    }

    /// Remove every chunk of a group. Zero if there were none.
    pub async fn delete_group(&self, file_id: &str) -> Result<usize, StoreError> {
        let group = file_id.to_string();
        let removed = blocking(&self.store, move |s| {
            s.delete_by_index(Table::FileChunks, FILE_ID_INDEX, &group)
        })
        .await?;
        if removed > 0 {
            tracing::debug!(file_id, chunks = removed, "chunk group deleted");
        }
        Ok(removed)
    }

    /// Group keys currently present in the store.
    pub async fn file_ids(&self) -> Result<Vec<String>, StoreError> {
        blocking(&self.store, |s| s.index_values(Table::FileChunks, FILE_ID_INDEX)).await
    }

    pub async fn clear(&self) -> Result<(), StoreError> {
        blocking(&self.store, |s| s.clear(Table::FileChunks)).await
    }

    /// Drop one chunk. Only used to simulate damage.
    #[cfg(test)]
    pub(crate) async fn remove_chunk(&self, file_id: &str, index: u32) -> Result<(), StoreError> {
        let key = Chunk::key(file_id, index);
        blocking(&self.store, move |s| s.delete(Table::FileChunks, &key)).await
    }
}
