//! Address-tagged block iteration over a firmware image.

use super::firmware::FirmwareError;

/// One transfer block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk<'a> {
    /// Position in the transfer, from 0.
    pub index: usize,
    /// Byte offset of `data` in the image.
    pub address: usize,
    /// `block_size` bytes; the last chunk may be shorter.
    pub data: &'a [u8],
}

/// Restartable description of a chunked transfer.
///
/// Each call to [`Chunks::iter`] starts again from the first block.
#[derive(Debug, Clone, Copy)]
pub struct Chunks<'a> {
    image: &'a [u8],
    start: usize,
    block_size: usize,
}

impl<'a> Chunks<'a> {
    pub fn new(image: &'a [u8], start: usize, block_size: usize) -> Result<Self, FirmwareError> {
        if block_size == 0 {
            return Err(FirmwareError::InvalidBlockSize(block_size));
        }
        if start > image.len() {
            return Err(FirmwareError::StartBeyondEnd {
                start,
                length: image.len(),
            });
        }
        Ok(Self {
            image,
            start,
            block_size,
        })
    }

    /// Number of chunks, including a short final one.
    pub fn total(&self) -> usize {
        self.payload_len().div_ceil(self.block_size)
    }

    /// Bytes covered by all chunks.
    pub fn payload_len(&self) -> usize {
        self.image.len() - self.start
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn iter(&self) -> ChunkIter<'a> {
        ChunkIter {
            image: self.image,
            block_size: self.block_size,
            offset: self.start,
            index: 0,
        }
    }
}

impl<'a> IntoIterator for &Chunks<'a> {
    type Item = Chunk<'a>;
    type IntoIter = ChunkIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over chunks in ascending address order.
#[derive(Debug, Clone)]
pub struct ChunkIter<'a> {
    image: &'a [u8],
    block_size: usize,
    offset: usize,
    index: usize,
}

impl<'a> Iterator for ChunkIter<'a> {
    type Item = Chunk<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset >= self.image.len() {
            return None;
        }

        let remaining = self.image.len() - self.offset;
        let chunk_len = remaining.min(self.block_size);
        let chunk = Chunk {
            index: self.index,
            address: self.offset,
            data: &self.image[self.offset..self.offset + chunk_len],
        };
        self.offset += chunk_len;
        self.index += 1;

        Some(chunk)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self
            .image
            .len()
            .saturating_sub(self.offset)
            .div_ceil(self.block_size);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for ChunkIter<'_> {}
