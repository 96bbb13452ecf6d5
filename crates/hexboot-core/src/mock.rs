//! In-memory flash controller used by the unit tests
//!
//! Simulates flash semantics at the capability level:
//! - Memory starts as all 0xFF (erased state)
//! - Programming can only clear bits (1->0)
//! - Erase and program requests while locked are ignored and counted
//! - Stuck-at-zero bits survive erase; weak cells refuse to program

use std::collections::BTreeMap;
use std::vec;
use std::vec::Vec;

use crate::controller::FlashController;
use crate::geometry::{FlashGeometry, Page};

/// Small layout: 8 pages of 64 bytes, first 2 pages reserved
pub fn small_geometry() -> FlashGeometry {
    FlashGeometry::new(0x0800_0000, 64, 8, 0x0800_0080).unwrap()
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
enum Mode {
    #[default]
    Idle,
    Erase,
    Program,
}

pub struct MockController {
    geometry: FlashGeometry,
    pub memory: Vec<u8>,
    locked: bool,
    refuse_unlock: bool,
    mode: Mode,
    target: u32,
    busy_polls: core::cell::Cell<u32>,
    /// Erase count per page
    pub erases: BTreeMap<u16, usize>,
    /// Every programmed flash word: (address, value)
    pub programs: Vec<(u32, u16)>,
    /// Mutating requests issued while locked or outside the right mode
    pub violations: usize,
    /// Bits that read as zero no matter what: address -> mask
    stuck_zero: BTreeMap<u32, u8>,
    /// Cells that ignore programming
    weak: Vec<u32>,
}

impl MockController {
    pub fn new(geometry: FlashGeometry) -> Self {
        Self {
            memory: vec![0xFF; geometry.size() as usize],
            geometry,
            locked: true,
            refuse_unlock: false,
            mode: Mode::Idle,
            target: 0,
            busy_polls: core::cell::Cell::new(0),
            erases: BTreeMap::new(),
            programs: Vec::new(),
            violations: 0,
            stuck_zero: BTreeMap::new(),
            weak: Vec::new(),
        }
    }

    pub fn with_contents(geometry: FlashGeometry, contents: &[(u32, &[u8])]) -> Self {
        let mut mock = Self::new(geometry);
        for (addr, data) in contents {
            let offset = mock.offset(*addr);
            mock.memory[offset..offset + data.len()].copy_from_slice(data);
        }
        mock
    }

    pub fn refuse_unlock(&mut self) {
        self.refuse_unlock = true;
    }

    pub fn stick_zero(&mut self, addr: u32, mask: u8) {
        self.stuck_zero.insert(addr, mask);
        let offset = self.offset(addr);
        self.memory[offset] &= !mask;
    }

    pub fn weaken(&mut self, addr: u32) {
        self.weak.push(addr);
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn page(&self, page: Page) -> &[u8] {
        let start = self.offset(self.geometry.page_base(page));
        &self.memory[start..start + self.geometry.page_size() as usize]
    }

    pub fn erase_count(&self, page: Page) -> usize {
        self.erases.get(&page.0).copied().unwrap_or(0)
    }

    pub fn total_erases(&self) -> usize {
        self.erases.values().sum()
    }

    fn offset(&self, addr: u32) -> usize {
        (addr - self.geometry.base()) as usize
    }
}

impl FlashController for MockController {
    fn geometry(&self) -> &FlashGeometry {
        &self.geometry
    }

    fn is_busy(&self) -> bool {
        let polls = self.busy_polls.get();
        if polls > 0 {
            self.busy_polls.set(polls - 1);
            true
        } else {
            false
        }
    }

    fn unlock(&mut self) -> bool {
        if !self.refuse_unlock {
            self.locked = false;
        }
        !self.locked
    }

    fn lock(&mut self) {
        self.locked = true;
    }

    fn set_target_address(&mut self, addr: u32) {
        self.target = addr;
    }

    fn begin_erase(&mut self) {
        if self.locked {
            self.violations += 1;
            return;
        }
        self.mode = Mode::Erase;
        let Some(page) = self.geometry.page_of(self.target) else {
            self.violations += 1;
            return;
        };
        *self.erases.entry(page.0).or_insert(0) += 1;

        let start = self.offset(self.geometry.page_base(page));
        let end = start + self.geometry.page_size() as usize;
        self.memory[start..end].fill(0xFF);
        for (addr, mask) in &self.stuck_zero {
            let offset = (addr - self.geometry.base()) as usize;
            if (start..end).contains(&offset) {
                self.memory[offset] &= !mask;
            }
        }
        self.busy_polls.set(3);
    }

    fn end_erase(&mut self) {
        self.mode = Mode::Idle;
    }

    fn begin_program(&mut self) {
        self.mode = Mode::Program;
    }

    fn program_word(&mut self, addr: u32, value: u16) {
        if self.locked || self.mode != Mode::Program {
            self.violations += 1;
            return;
        }
        self.programs.push((addr, value));
        self.busy_polls.set(1);
        if self.weak.contains(&addr) {
            return;
        }
        let offset = self.offset(addr);
        let [lo, hi] = value.to_le_bytes();
        self.memory[offset] &= lo;
        self.memory[offset + 1] &= hi;
    }

    fn end_program(&mut self) {
        self.mode = Mode::Idle;
    }

    fn read(&self, addr: u32, buf: &mut [u8]) {
        let offset = self.offset(addr);
        buf.copy_from_slice(&self.memory[offset..offset + buf.len()]);
    }
}
