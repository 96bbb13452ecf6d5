//! Page-sized staging buffer

use heapless::Vec;

use crate::geometry::{FlashGeometry, ERASED_BYTE, MAX_PAGE_SIZE};

/// In-memory mirror of exactly one flash page
#[derive(Clone, PartialEq, Eq)]
pub struct PageBuffer {
    data: Vec<u8, MAX_PAGE_SIZE>,
}

impl PageBuffer {
    /// A page-sized buffer with every byte set to `value`
    pub fn filled(geometry: &FlashGeometry, value: u8) -> Self {
        let data = core::iter::repeat(value)
            .take(geometry.page_size() as usize)
            .collect();
        Self { data }
    }

    /// A page-sized buffer in the erased state
    pub fn erased(geometry: &FlashGeometry) -> Self {
        Self::filled(geometry, ERASED_BYTE)
    }

    /// Copy `bytes` into a new buffer; `None` unless it is exactly one page
    pub fn from_bytes(geometry: &FlashGeometry, bytes: &[u8]) -> Option<Self> {
        if bytes.len() != geometry.page_size() as usize {
            return None;
        }
        Vec::from_slice(bytes).ok().map(|data| Self { data })
    }

    /// Buffer length in bytes (always one page)
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Always false for a buffer built from a valid geometry
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Contents as bytes
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Mutable contents as bytes
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Contents as little-endian machine words, for erase checks and compares
    pub fn words(&self) -> impl Iterator<Item = u32> + '_ {
        self.data
            .chunks_exact(4)
            .map(|w| u32::from_le_bytes([w[0], w[1], w[2], w[3]]))
    }

    /// Contents as little-endian flash words, in program order
    pub fn half_words(&self) -> impl Iterator<Item = u16> + '_ {
        self.data
            .chunks_exact(2)
            .map(|h| u16::from_le_bytes([h[0], h[1]]))
    }
}

impl core::fmt::Debug for PageBuffer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PageBuffer")
            .field("len", &self.data.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small() -> FlashGeometry {
        FlashGeometry::new(0x0800_0000, 8, 4, 0x0800_0000).unwrap()
    }

    #[test]
    fn test_erased_and_filled() {
        let g = small();
        let buf = PageBuffer::erased(&g);
        assert_eq!(buf.len(), 8);
        assert!(buf.as_slice().iter().all(|&b| b == 0xFF));
        assert!(PageBuffer::filled(&g, 0).as_slice().iter().all(|&b| b == 0));

        let full = PageBuffer::filled(&FlashGeometry::STM32F107, 0x5A);
        assert_eq!(full.len(), 2048);
        assert!(full.as_slice().iter().all(|&b| b == 0x5A));
    }

    #[test]
    fn test_word_views_are_little_endian() {
        let g = small();
        let buf = PageBuffer::from_bytes(&g, &[1, 2, 3, 4, 5, 6, 7, 8]).unwrap();
        let words: std::vec::Vec<u32> = buf.words().collect();
        assert_eq!(words, [0x0403_0201, 0x0807_0605]);
        let halves: std::vec::Vec<u16> = buf.half_words().collect();
        assert_eq!(halves, [0x0201, 0x0403, 0x0605, 0x0807]);
    }

    #[test]
    fn test_from_bytes_requires_one_page() {
        let g = small();
        assert!(PageBuffer::from_bytes(&g, &[0; 7]).is_none());
        assert!(PageBuffer::from_bytes(&g, &[0; 9]).is_none());
    }
}
