//! Flash address space description
//!
//! Internal flash is a run of equally sized pages starting at `base`. The
//! first `user_start_page` pages hold the bootloader itself and are never
//! writable; everything from there to the end of flash is the user region.

use core::fmt;

/// Largest page size the staging buffers can hold
pub const MAX_PAGE_SIZE: usize = 4096;

/// Value of an erased byte (all bits set)
pub const ERASED_BYTE: u8 = 0xFF;

/// Value of an erased machine word
pub const ERASED_WORD: u32 = 0xFFFF_FFFF;

/// Index of a physical flash page
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Page(pub u16);

impl Page {
    /// Page index as usize
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "page {}", self.0)
    }
}

/// Reasons a geometry description is rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeometryError {
    /// Page size is zero, not a multiple of the machine word or too large
    InvalidPageSize(u32),
    /// No pages, or more pages than a `Page` index can address
    InvalidPageCount(u32),
    /// User region does not start on a page inside flash
    InvalidUserBase(u32),
    /// Flash would extend past the 32-bit address space
    AddressOverflow,
}

impl fmt::Display for GeometryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidPageSize(size) => write!(
                f,
                "invalid page size {} (must be a non-zero multiple of 4, at most {})",
                size, MAX_PAGE_SIZE
            ),
            Self::InvalidPageCount(count) => write!(f, "invalid page count {}", count),
            Self::InvalidUserBase(addr) => {
                write!(f, "user base 0x{:08X} is not a page boundary inside flash", addr)
            }
            Self::AddressOverflow => write!(f, "flash extends past the 32-bit address space"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for GeometryError {}

/// Layout of the internal flash
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlashGeometry {
    base: u32,
    page_size: u32,
    page_count: u16,
    user_start_page: u16,
}

impl FlashGeometry {
    /// STM32F105/107 connectivity line: 256 KiB in 2 KiB pages, with the
    /// first 16 KiB reserved for the bootloader
    pub const STM32F107: FlashGeometry = FlashGeometry {
        base: 0x0800_0000,
        page_size: 2048,
        page_count: 128,
        user_start_page: 8,
    };

    /// Build a geometry, checking that every page is addressable
    pub fn new(
        base: u32,
        page_size: u32,
        page_count: u32,
        user_base: u32,
    ) -> Result<Self, GeometryError> {
        if page_size == 0 || page_size % 4 != 0 || page_size as usize > MAX_PAGE_SIZE {
            return Err(GeometryError::InvalidPageSize(page_size));
        }
        if page_count == 0 || page_count > u16::MAX as u32 {
            return Err(GeometryError::InvalidPageCount(page_count));
        }
        let size = page_size as u64 * page_count as u64;
        if base as u64 + size > u32::MAX as u64 + 1 {
            return Err(GeometryError::AddressOverflow);
        }
        if user_base < base || (user_base - base) % page_size != 0 {
            return Err(GeometryError::InvalidUserBase(user_base));
        }
        let user_start_page = (user_base - base) / page_size;
        if user_start_page >= page_count {
            return Err(GeometryError::InvalidUserBase(user_base));
        }

        Ok(Self {
            base,
            page_size,
            page_count: page_count as u16,
            user_start_page: user_start_page as u16,
        })
    }

    /// First address of flash
    pub const fn base(&self) -> u32 {
        self.base
    }

    /// Page size in bytes
    pub const fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Number of pages
    pub const fn page_count(&self) -> u16 {
        self.page_count
    }

    /// Total flash size in bytes
    pub const fn size(&self) -> u32 {
        self.page_size * self.page_count as u32
    }

    /// First page of the user region
    pub const fn user_start_page(&self) -> Page {
        Page(self.user_start_page)
    }

    /// First address of the user region; the application's vector table
    pub const fn user_base(&self) -> u32 {
        self.base + self.page_size * self.user_start_page as u32
    }

    /// Base address of a page
    pub const fn page_base(&self, page: Page) -> u32 {
        self.base + self.page_size * page.0 as u32
    }

    /// The page containing `addr`, if it lies inside flash
    pub fn page_of(&self, addr: u32) -> Option<Page> {
        let offset = addr.checked_sub(self.base)?;
        let index = offset / self.page_size;
        (index < self.page_count as u32).then_some(Page(index as u16))
    }

    /// Byte offset of `addr` within its page
    pub const fn page_offset(&self, addr: u32) -> usize {
        ((addr - self.base) % self.page_size) as usize
    }

    /// Whether `page` exists and may be erased and programmed
    pub fn is_user_page(&self, page: Page) -> bool {
        page.0 >= self.user_start_page && page.0 < self.page_count
    }

    /// Whether every byte of `[addr, addr + len)` lies in the user region
    pub fn is_user_range(&self, addr: u32, len: usize) -> bool {
        if len == 0 {
            return true;
        }
        let end = addr as u64 + len as u64;
        addr >= self.user_base() && end <= self.base as u64 + self.size() as u64
    }

    /// Pages of the user region, in address order
    pub fn user_pages(&self) -> impl Iterator<Item = Page> {
        (self.user_start_page..self.page_count).map(Page)
    }
}
