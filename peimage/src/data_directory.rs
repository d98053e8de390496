//! Data directories: raw slots from the optional header and their normalized file ranges.


use std::fmt;

use from_to_repr::from_to_other;
use tracing::debug;

use crate::address::{FileOffset, FileRange, VirtualAddress, VirtualRange};
use crate::error::Error;
use crate::le_int::read_le;
use crate::section::SectionTable;


pub const DATA_DIRECTORY_SIZE: usize = 8;


/// A directory slot as stored in the optional header.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct RawDataDirectory {
    pub address: u32,
    pub size: u32,
}
impl RawDataDirectory {
    pub fn parse(entry_buf: &[u8]) -> Self {
        Self {
            address: read_le(entry_buf, 0),
            size: read_le(entry_buf, 4),
        }
    }

    pub fn is_zero(&self) -> bool {
        self.address == 0 && self.size == 0
    }
}


#[derive(Clone, Copy, Debug)]
#[from_to_other(base_type = u32, derive_compare = "as_int")]
pub enum DirectoryId {
    ExportTable = 0,
    ImportTable = 1,
    ResourceTable = 2,
    ExceptionTable = 3,
    CertificateTable = 4,
    BaseRelocationTable = 5,
    Debug = 6,
    Architecture = 7,
    GlobalPointer = 8,
    TlsTable = 9,
    LoadConfigTable = 10,
    BoundImport = 11,
    ImportAddressTable = 12,
    DelayImportDescriptor = 13,
    ClrRuntimeHeader = 14,
    Reserved = 15,
    Other(u32),
}
impl DirectoryId {
    /// How the raw slot of this directory is turned into a file range.
    pub fn policy(&self) -> DirectoryPolicy {
        match self {
            Self::CertificateTable => DirectoryPolicy::FileOffset,
            Self::GlobalPointer => DirectoryPolicy::PointerOnly,
            _ => DirectoryPolicy::Virtual,
        }
    }
}
impl fmt::Display for DirectoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ExportTable => "Export Table",
            Self::ImportTable => "Import Table",
            Self::ResourceTable => "Resource Table",
            Self::ExceptionTable => "Exception Table",
            Self::CertificateTable => "Certificate Table",
            Self::BaseRelocationTable => "Base Relocation Table",
            Self::Debug => "Debug",
            Self::Architecture => "Architecture",
            Self::GlobalPointer => "Global Ptr",
            Self::TlsTable => "TLS Table",
            Self::LoadConfigTable => "Load Config Table",
            Self::BoundImport => "Bound Import",
            Self::ImportAddressTable => "IAT",
            Self::DelayImportDescriptor => "Delay Import Descriptor",
            Self::ClrRuntimeHeader => "CLR Runtime Header",
            Self::Reserved => "Reserved",
            Self::Other(index) => return write!(f, "Directory {}", index),
        };
        write!(f, "{}", name)
    }
}


#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum DirectoryPolicy {
    /// The address is already a file offset.
    FileOffset,

    /// The address is virtual and the size is meaningless.
    PointerOnly,

    /// Address and size form a virtual range.
    Virtual,
}


#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct DataDirectory {
    pub location: FileRange,
}
impl DataDirectory {
    /// Whether the directory is absent.
    pub fn is_zero(&self) -> bool {
        self.location.is_zero()
    }
}


/// Normalized data directories, indexed by [`DirectoryId`].
#[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct DataDirectoryTable {
    directories: Vec<DataDirectory>,
}
impl DataDirectoryTable {
    /// Resolves each raw slot to a file range through `sections`.
    ///
    /// Zeroed slots stay zero without being translated. Any other slot that cannot be placed in a
    /// section fails with [`Error::UnmappedDirectory`].
    pub fn normalize(raw_directories: &[RawDataDirectory], sections: &SectionTable) -> Result<Self, Error> {
        let mut directories = Vec::with_capacity(raw_directories.len());
        for (index, raw) in (0u32..).zip(raw_directories) {
            if raw.is_zero() {
                directories.push(DataDirectory::default());
                continue;
            }

            let id = DirectoryId::from_base_type(index);
            let location = match id.policy() {
                DirectoryPolicy::FileOffset => {
                    FileRange::new(FileOffset::from(raw.address), raw.size.into())
                },
                DirectoryPolicy::PointerOnly => {
                    let address = VirtualAddress::from(raw.address);
                    let start = sections.translate(address)
                        .ok_or_else(|| Error::UnmappedDirectory { id, range: VirtualRange::new(address, 0) })?;
                    FileRange::new(start, 0)
                },
                DirectoryPolicy::Virtual => {
                    let range = VirtualRange::new(raw.address.into(), raw.size.into());
                    sections.translate_range(range)
                        .ok_or_else(|| Error::UnmappedDirectory { id, range })?
                },
            };
            debug!("{} at {} normalized to {}", id, VirtualAddress::from(raw.address), location);
            directories.push(DataDirectory { location });
        }
        Ok(Self { directories })
    }

    /// The directory with the given ID, or a zero directory if the table is too short.
    pub fn get(&self, id: DirectoryId) -> DataDirectory {
        usize::try_from(id.to_base_type())
            .ok()
            .and_then(|index| self.directories.get(index))
            .copied()
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize { self.directories.len() }
    pub fn is_empty(&self) -> bool { self.directories.is_empty() }
    pub fn as_slice(&self) -> &[DataDirectory] { &self.directories }

    /// Every slot with its ID, absent ones included.
    pub fn iter(&self) -> impl Iterator<Item = (DirectoryId, &DataDirectory)> {
        (0u32..)
            .map(DirectoryId::from_base_type)
            .zip(self.directories.iter())
    }
}
