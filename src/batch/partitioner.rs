//! Chunk partitioner
//!
//! Splits the ordered target list into server-safe chunks. Concatenating the
//! chunks in order always reproduces the input exactly.

use crate::domain::{Chunk, Photo};

/// Partition `targets` into chunks of at most `max_chunk_size` photos
///
/// Every chunk but the last holds exactly `max_chunk_size` photos. An empty
/// target list yields no chunks. A size of 0 is treated as 1.
pub fn partition(targets: &[Photo], max_chunk_size: usize) -> Vec<Chunk> {
    targets
        .chunks(max_chunk_size.max(1))
        .enumerate()
        .map(|(index, photos)| Chunk { index, photos: photos.to_vec() })
        .collect()
}

/// Number of chunks `partition` would produce
pub fn chunk_count(target_count: usize, max_chunk_size: usize) -> usize {
    target_count.div_ceil(max_chunk_size.max(1))
}
