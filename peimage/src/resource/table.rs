use std::fmt;

use crate::address::VirtualRange;
use crate::le_int::read_le;


pub const TABLE_HEADER_SIZE: usize = 16;
pub const ENTRY_SIZE: usize = 8;
pub const DATA_DESCRIPTOR_SIZE: usize = 16;

/// Set in an entry's name field if it holds a string offset, and in its reference field if it
/// points to a subtable.
const HIGH_BIT: u32 = 0x8000_0000;
const OFFSET_MASK: u32 = 0x7FFF_FFFF;


macro_rules! define_offset {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
        #[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
        #[cfg_attr(feature = "serde", serde(transparent))]
        pub struct $name(pub u32);
        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{:#x}", self.0)
            }
        }
    };
}

define_offset!(
    /// Offset of a table, relative to the start of the resource directory.
    TableOffset
);
define_offset!(
    /// Offset of a leaf data descriptor, relative to the start of the resource directory.
    DataOffset
);
define_offset!(
    /// Offset of a length-prefixed name, relative to the start of the resource directory.
    StringOffset
);


#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum ResourceId {
    Name(String),
    Number(u32),
}
impl ResourceId {
    pub fn number(&self) -> Option<u32> {
        match self {
            Self::Number(number) => Some(*number),
            Self::Name(_) => None,
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Name(name) => Some(name),
            Self::Number(_) => None,
        }
    }
}
impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name(name) => write!(f, "{:?}", name),
            Self::Number(number) => write!(f, "{}", number),
        }
    }
}


/// Where an entry leads: to another table or to a leaf.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum Reference {
    Table(TableOffset),
    Data(DataOffset),
}
impl Reference {
    pub fn from_raw(raw: u32) -> Self {
        if raw & HIGH_BIT != 0 {
            Self::Table(TableOffset(raw & OFFSET_MASK))
        } else {
            Self::Data(DataOffset(raw))
        }
    }

    pub fn table(&self) -> Option<TableOffset> {
        match self {
            Self::Table(offset) => Some(*offset),
            Self::Data(_) => None,
        }
    }

    pub fn data(&self) -> Option<DataOffset> {
        match self {
            Self::Data(offset) => Some(*offset),
            Self::Table(_) => None,
        }
    }
}


#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Entry {
    pub id: ResourceId,
    pub reference: Reference,
}


/// The entries of one resource directory table: named entries first, then numbered ones, each
/// group in file order.
#[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct Table {
    entries: Vec<Entry>,
}
impl Table {
    pub fn as_slice(&self) -> &[Entry] { &self.entries }
    pub fn iter(&self) -> std::slice::Iter<'_, Entry> { self.entries.iter() }
    pub fn len(&self) -> usize { self.entries.len() }
    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    pub fn find(&self, id: &ResourceId) -> Option<&Entry> {
        self.entries.iter().find(|entry| &entry.id == id)
    }
}
impl From<Vec<Entry>> for Table {
    fn from(value: Vec<Entry>) -> Self {
        Self {
            entries: value,
        }
    }
}
impl From<Table> for Vec<Entry> {
    fn from(value: Table) -> Self { value.entries }
}
impl<'a> IntoIterator for &'a Table {
    type Item = &'a Entry;
    type IntoIter = std::slice::Iter<'a, Entry>;
    fn into_iter(self) -> Self::IntoIter { self.entries.iter() }
}


/// The fixed part of a table, as read from its header.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub(crate) struct TableHeader {
    pub named_count: u16,
    pub numbered_count: u16,
}
impl TableHeader {
    pub fn parse(header_buf: &[u8]) -> Self {
        Self {
            named_count: read_le(header_buf, 12),
            numbered_count: read_le(header_buf, 14),
        }
    }

    pub fn entry_count(&self) -> usize {
        usize::from(self.named_count) + usize::from(self.numbered_count)
    }
}


/// An entry as stored, before any name is resolved.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub(crate) struct RawEntry {
    pub key: u32,
    pub reference: Reference,
}
impl RawEntry {
    pub fn parse(entry_buf: &[u8]) -> Self {
        Self {
            key: read_le::<u32>(entry_buf, 0) & OFFSET_MASK,
            reference: Reference::from_raw(read_le(entry_buf, 4)),
        }
    }
}


/// The descriptor of a leaf: where its data lives in the image and how it is encoded.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct DataDescriptor {
    pub range: VirtualRange,
    pub code_page: u32,
}
impl DataDescriptor {
    pub fn parse(descriptor_buf: &[u8]) -> Self {
        let address: u32 = read_le(descriptor_buf, 0);
        let size: u32 = read_le(descriptor_buf, 4);
        Self {
            range: VirtualRange::new(address.into(), size.into()),
            code_page: read_le(descriptor_buf, 8),
        }
    }
}
