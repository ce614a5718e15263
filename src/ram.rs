use std::collections::BTreeMap;
use std::fmt;

use crate::config::{RAM_BLOCKS, RAM_PAGE_LEN};
use crate::error::{BridgeError, Result};

// =============================================================================
// RAM Addresses
// =============================================================================

/// A CPU RAM address split into the 256-byte page the emulator serves and
/// the cell inside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RamAddress {
    pub block: u8,
    pub offset: u8,
}

impl RamAddress {
    pub fn resolve(address: u16) -> Result<Self> {
        let block = address / RAM_PAGE_LEN as u16;
        if block >= RAM_BLOCKS as u16 {
            return Err(BridgeError::Configuration(format!(
                "RAM address 0x{address:04X} is outside the 2 KiB work RAM"
            )));
        }
        Ok(Self {
            block: block as u8,
            offset: (address % RAM_PAGE_LEN as u16) as u8,
        })
    }

    pub fn address(self) -> u16 {
        self.block as u16 * RAM_PAGE_LEN as u16 + self.offset as u16
    }
}

impl fmt::Display for RamAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04X}", self.address())
    }
}

// =============================================================================
// RAM Pages
// =============================================================================

/// One 256-byte RAM page. Each cell is an unsigned byte, never text.
#[derive(Clone, PartialEq, Eq)]
pub struct RamPage {
    pub block: u8,
    bytes: [u8; RAM_PAGE_LEN],
}

impl RamPage {
    pub fn from_bytes(block: u8, bytes: &[u8]) -> Option<Self> {
        let bytes: [u8; RAM_PAGE_LEN] = bytes.try_into().ok()?;
        Some(Self { block, bytes })
    }

    pub fn get(&self, offset: u8) -> u8 {
        self.bytes[offset as usize]
    }

    pub fn as_bytes(&self) -> &[u8; RAM_PAGE_LEN] {
        &self.bytes
    }

    /// Offsets whose value differs between `self` and `other`.
    pub fn diff(&self, other: &RamPage) -> Vec<u8> {
        self.bytes
            .iter()
            .zip(other.bytes.iter())
            .enumerate()
            .filter(|(_, (a, b))| a != b)
            .map(|(i, _)| i as u8)
            .collect()
    }

    /// Continuous lowercase hex, two digits per cell.
    pub fn to_hex(&self) -> String {
        let mut out = String::with_capacity(RAM_PAGE_LEN * 2);
        for b in &self.bytes {
            out.push_str(&format!("{b:02x}"));
        }
        out
    }

    /// 16 cells per row, prefixed with the absolute address of the row.
    pub fn hex_dump(&self) -> String {
        let base = self.block as usize * RAM_PAGE_LEN;
        self.bytes
            .chunks(16)
            .enumerate()
            .map(|(row, cells)| {
                let hex: Vec<String> = cells.iter().map(|b| format!("{b:02x}")).collect();
                format!("{:04X}: {}", base + row * 16, hex.join(" "))
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl fmt::Debug for RamPage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RamPage")
            .field("block", &self.block)
            .field("bytes", &self.to_hex())
            .finish()
    }
}

// =============================================================================
// Snapshots
// =============================================================================

/// The RAM pages read at one point in an episode, keyed by block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RamSnapshot {
    pages: BTreeMap<u8, RamPage>,
}

impl RamSnapshot {
    pub fn insert(&mut self, page: RamPage) {
        self.pages.insert(page.block, page);
    }

    pub fn page(&self, block: u8) -> Option<&RamPage> {
        self.pages.get(&block)
    }

    pub fn read(&self, addr: RamAddress) -> Option<u8> {
        self.page(addr.block).map(|p| p.get(addr.offset))
    }

    pub fn contains_all(&self, blocks: &[u8]) -> bool {
        blocks.iter().all(|b| self.pages.contains_key(b))
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }
}
