//! Transfer chunking
//!
//! Images are sent as a sequence of self-contained writes. Each chunk carries
//! its own destination address, so resending a chunk only overwrites the same
//! region again.

use std::borrow::Cow;

/// Stub upload chunk size
pub const STUB_CHUNK_SIZE: usize = 1024;

/// Flash sector size
pub const FLASH_SECTOR_SIZE: usize = 4096;

/// Flash write frame size
pub const FLASH_FRAME_SIZE: usize = FLASH_SECTOR_SIZE * 16;

/// One write of an image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk<'a> {
    /// Destination address
    pub address: u32,
    /// Bytes to write, zero padded when the plan asks for it
    pub data: Cow<'a, [u8]>,
}

/// How an image is cut into chunks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPlan {
    pub base_address: u32,
    pub chunk_size: usize,
    /// Pad the final chunk with zeros up to `chunk_size`
    pub pad: bool,
}

impl ChunkPlan {
    /// 1 KiB unpadded chunks into SRAM
    pub fn stub(load_address: u32) -> Self {
        Self {
            base_address: load_address,
            chunk_size: STUB_CHUNK_SIZE,
            pad: false,
        }
    }

    /// 64 KiB zero-padded frames into flash
    pub fn firmware(flash_address: u32) -> Self {
        Self {
            base_address: flash_address,
            chunk_size: FLASH_FRAME_SIZE,
            pad: true,
        }
    }

    /// The chunk starting at `offset`, or `None` once the image is exhausted
    pub fn chunk_at<'a>(&self, image: &'a [u8], offset: usize) -> Option<Chunk<'a>> {
        if offset >= image.len() {
            return None;
        }

        let end = (offset + self.chunk_size).min(image.len());
        let slice = &image[offset..end];
        let data = if self.pad && slice.len() < self.chunk_size {
            let mut padded = slice.to_vec();
            padded.resize(self.chunk_size, 0);
            Cow::Owned(padded)
        } else {
            Cow::Borrowed(slice)
        };

        Some(Chunk {
            address: self.base_address.wrapping_add(offset as u32),
            data,
        })
    }

    /// Number of writes needed for an image of `len` bytes
    pub fn count(&self, len: usize) -> usize {
        len.div_ceil(self.chunk_size)
    }

    /// Bytes actually written for an image of `len` bytes
    pub fn transfer_size(&self, len: usize) -> usize {
        if self.pad {
            self.count(len) * self.chunk_size
        } else {
            len
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn walk<'a>(plan: &ChunkPlan, image: &'a [u8]) -> Vec<Chunk<'a>> {
        let mut chunks = Vec::new();
        let mut offset = 0;
        while let Some(chunk) = plan.chunk_at(image, offset) {
            chunks.push(chunk);
            offset += plan.chunk_size;
        }
        chunks
    }

    #[test]
    fn test_frame_size() {
        assert_eq!(FLASH_FRAME_SIZE, 65536);
    }

    #[test]
    fn test_firmware_last_frame_padded() {
        let image = vec![0xAAu8; FLASH_FRAME_SIZE + 10];
        let plan = ChunkPlan::firmware(0);
        let chunks = walk(&plan, &image);

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1].address, FLASH_FRAME_SIZE as u32);
        assert_eq!(chunks[1].data.len(), FLASH_FRAME_SIZE);
        assert!(chunks[1].data[..10].iter().all(|&b| b == 0xAA));
        assert!(chunks[1].data[10..].iter().all(|&b| b == 0));
        assert_eq!(plan.transfer_size(image.len()), 2 * FLASH_FRAME_SIZE);
    }

    #[test]
    fn test_stub_chunks_not_padded() {
        let image = vec![0x11u8; 2 * STUB_CHUNK_SIZE + 3];
        let plan = ChunkPlan::stub(0x8000_0000);
        let chunks = walk(&plan, &image);

        let addresses: Vec<u32> = chunks.iter().map(|c| c.address).collect();
        assert_eq!(addresses, vec![0x8000_0000, 0x8000_0400, 0x8000_0800]);
        assert_eq!(chunks[2].data.len(), 3);
        assert!(matches!(chunks[0].data, Cow::Borrowed(_)));
        assert_eq!(plan.transfer_size(image.len()), image.len());
    }

    #[test]
    fn test_exact_multiple_has_no_extra_frame() {
        let image = vec![1u8; 2 * FLASH_FRAME_SIZE];
        let plan = ChunkPlan::firmware(0x10_0000);
        assert_eq!(plan.count(image.len()), 2);
        assert_eq!(walk(&plan, &image).len(), 2);
        assert!(plan.chunk_at(&image, 2 * FLASH_FRAME_SIZE).is_none());
    }

    #[test]
    fn test_empty_image() {
        let plan = ChunkPlan::firmware(0);
        assert!(walk(&plan, &[]).is_empty());
        assert_eq!(plan.count(0), 0);
    }
}
