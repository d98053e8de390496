//! The section table and translation from virtual addresses to file offsets.


use std::fmt;

use bitflags::bitflags;

use crate::address::{FileOffset, FileRange, StringOffset, VirtualAddress, VirtualRange};
use crate::layout::SECTION_HEADER_SIZE;
use crate::le_int::read_le;


const SECTION_HEADER_BYTES: usize = SECTION_HEADER_SIZE as usize;
const NAME_SIZE: usize = 8;


/// The name of a section as stored in its header.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum SectionName {
    /// Up to eight bytes, stored directly.
    Inline(String),

    /// `/` followed by the decimal offset of a longer name in the COFF string table.
    StringTable(StringOffset),
}
impl SectionName {
    pub fn parse(raw: &[u8; NAME_SIZE]) -> Self {
        let trimmed = match raw.iter().position(|&b| b == 0x00) {
            Some(nul_index) => &raw[..nul_index],
            None => &raw[..],
        };
        if let Some(digits) = trimmed.strip_prefix(b"/") {
            let offset = Some(digits)
                .filter(|d| !d.is_empty() && d.iter().all(|b| b.is_ascii_digit()))
                .and_then(|d| std::str::from_utf8(d).ok())
                .and_then(|d| d.parse::<u32>().ok());
            if let Some(offset) = offset {
                return Self::StringTable(StringOffset(offset));
            }
        }
        Self::Inline(String::from_utf8_lossy(trimmed).into_owned())
    }
}
impl fmt::Display for SectionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inline(name) => write!(f, "{}", name),
            Self::StringTable(offset) => write!(f, "/{}", offset),
        }
    }
}


#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Section {
    pub name: SectionName,
    pub virtual_range: VirtualRange,
    pub file_range: FileRange,
    pub characteristics: SectionCharacteristics,
}
impl Section {
    /// Decodes a 40-byte section header.
    pub fn parse(entry_buf: &[u8]) -> Self {
        let mut raw_name = [0u8; NAME_SIZE];
        raw_name.copy_from_slice(&entry_buf[0..NAME_SIZE]);
        let virtual_size: u32 = read_le(entry_buf, 8);
        let virtual_address: u32 = read_le(entry_buf, 12);
        let raw_data_size: u32 = read_le(entry_buf, 16);
        let raw_data_pointer: u32 = read_le(entry_buf, 20);
        let characteristics = SectionCharacteristics::from_bits_retain(read_le(entry_buf, 36));

        Self {
            name: SectionName::parse(&raw_name),
            virtual_range: VirtualRange::new(virtual_address.into(), virtual_size.into()),
            file_range: FileRange::new(raw_data_pointer.into(), raw_data_size.into()),
            characteristics,
        }
    }

    pub fn translate(&self, address: VirtualAddress) -> Option<FileOffset> {
        if !self.virtual_range.contains(address) {
            return None;
        }
        Some(FileOffset(address.0 + self.file_range.start.0 - self.virtual_range.start.0))
    }

    pub fn translate_range(&self, range: VirtualRange) -> Option<FileRange> {
        if !self.virtual_range.contains_range(&range) {
            return None;
        }
        let start = self.translate(range.start)?;
        Some(FileRange::new(start, range.length))
    }
}


/// The sections of an image in file order.
#[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct SectionTable {
    sections: Vec<Section>,
}
impl SectionTable {
    /// Decodes as many whole section headers as `data` holds.
    pub fn parse(data: &[u8]) -> Self {
        let sections = data
            .chunks_exact(SECTION_HEADER_BYTES)
            .map(Section::parse)
            .collect();
        Self { sections }
    }

    pub fn as_slice(&self) -> &[Section] { &self.sections }
    pub fn iter(&self) -> std::slice::Iter<'_, Section> { self.sections.iter() }
    pub fn len(&self) -> usize { self.sections.len() }
    pub fn is_empty(&self) -> bool { self.sections.is_empty() }

    /// Translates through the first section whose virtual range contains `address`.
    pub fn translate(&self, address: VirtualAddress) -> Option<FileOffset> {
        self.sections
            .iter()
            .find_map(|section| section.translate(address))
    }

    /// Translates through the first section containing all of `range`. Ranges are never split
    /// across sections.
    pub fn translate_range(&self, range: VirtualRange) -> Option<FileRange> {
        self.sections
            .iter()
            .find_map(|section| section.translate_range(range))
    }
}
impl From<Vec<Section>> for SectionTable {
    fn from(value: Vec<Section>) -> Self {
        Self {
            sections: value,
        }
    }
}
impl From<SectionTable> for Vec<Section> {
    fn from(value: SectionTable) -> Self { value.sections }
}
impl<'a> IntoIterator for &'a SectionTable {
    type Item = &'a Section;
    type IntoIter = std::slice::Iter<'a, Section>;
    fn into_iter(self) -> Self::IntoIter { self.sections.iter() }
}


bitflags! {
    #[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
    #[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
    pub struct SectionCharacteristics : u32 {
        const NO_PAD = 0x0000_0008;
        const CONTAINS_CODE = 0x0000_0020;
        const CONTAINS_INITIALIZED_DATA = 0x0000_0040;
        const CONTAINS_UNINITIALIZED_DATA = 0x0000_0080;
        const LINK_OTHER = 0x0000_0100;
        const LINK_INFO = 0x0000_0200;
        const LINK_REMOVE = 0x0000_0800;
        const LINK_COMMON_DATA = 0x0000_1000;
        const GLOBAL_POINTER_RELATIVE = 0x0000_8000;
        const MEM_LOCKED = 0x0004_0000;
        const MEM_PRELOAD = 0x0008_0000;

        /// Alignment is stored as a 4-bit exponent in these bits.
        const ALIGNMENT_MASK = 0x00F0_0000;

        const LINK_NRELOC_OVFL = 0x0100_0000;
        const MEM_DISCARDABLE = 0x0200_0000;
        const MEM_NOT_CACHED = 0x0400_0000;
        const MEM_NOT_PAGED = 0x0800_0000;
        const MEM_SHARED = 0x1000_0000;
        const MEM_EXECUTE = 0x2000_0000;
        const MEM_READ = 0x4000_0000;
        const MEM_WRITE = 0x8000_0000;
    }
}
