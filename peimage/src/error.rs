use std::fmt;
use std::io;

use crate::address::VirtualRange;
use crate::data_directory::DirectoryId;
use crate::resource::DataOffset;


/// A structure in the image does not have the shape it must have.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum FormatError {
    DosSignature { obtained: u16 },
    PeSignature { obtained: [u8; 4] },
    OptionalHeaderTooSmall { size: u16, minimum: u16 },
    VersionInfoTooShort { length: usize },
    UnterminatedVersionInfoKey,
    FixedFileInfoTooShort { length: usize },
    FixedFileInfoSignature { obtained: u32 },
}
impl fmt::Display for FormatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DosSignature { obtained }
                => write!(f, "invalid DOS signature {:#06X}", obtained),
            Self::PeSignature { obtained }
                => write!(f, "invalid PE signature {:02X?}", obtained),
            Self::OptionalHeaderTooSmall { size, minimum }
                => write!(f, "optional header is {} bytes long, at least {} required", size, minimum),
            Self::VersionInfoTooShort { length }
                => write!(f, "version info node is {} bytes long, shorter than its header", length),
            Self::UnterminatedVersionInfoKey
                => write!(f, "version info node key is not null-terminated"),
            Self::FixedFileInfoTooShort { length }
                => write!(f, "fixed file info is {} bytes long, too short", length),
            Self::FixedFileInfoSignature { obtained }
                => write!(f, "invalid fixed file info signature {:#010X}", obtained),
        }
    }
}
impl std::error::Error for FormatError {
}


#[derive(Debug)]
pub enum Error {
    Io(io::Error),
    Format(FormatError),
    UnsupportedFormat { magic: u16 },
    OutOfRange { offset: u64, limit: u64 },
    UnmappedDirectory { id: DirectoryId, range: VirtualRange },
    UnmappedResourceData { offset: DataOffset, range: VirtualRange },
    MissingResourceTable,
}
impl Error {
    /// Whether a virtual range could not be placed in any single section.
    pub fn is_unmapped(&self) -> bool {
        matches!(self, Self::UnmappedDirectory { .. } | Self::UnmappedResourceData { .. })
    }

    pub fn format_error(&self) -> Option<FormatError> {
        match self {
            Self::Format(e) => Some(*e),
            _ => None,
        }
    }
}
impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e)
                => write!(f, "I/O error: {}", e),
            Self::Format(e)
                => write!(f, "format error: {}", e),
            Self::UnsupportedFormat { magic }
                => write!(f, "unsupported optional header magic {:#06X}", magic),
            Self::OutOfRange { offset, limit }
                => write!(f, "offset {} is out of range (limit {})", offset, limit),
            Self::UnmappedDirectory { id, range }
                => write!(f, "{} at {} is not mapped to a section", id, range),
            Self::UnmappedResourceData { offset, range }
                => write!(f, "resource data {} at {} is not mapped to a section", offset, range),
            Self::MissingResourceTable
                => write!(f, "image has no resource table"),
        }
    }
}
impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Format(e) => Some(e),
            Self::UnsupportedFormat { .. } => None,
            Self::OutOfRange { .. } => None,
            Self::UnmappedDirectory { .. } => None,
            Self::UnmappedResourceData { .. } => None,
            Self::MissingResourceTable => None,
        }
    }
}
impl From<io::Error> for Error {
    fn from(value: io::Error) -> Self { Self::Io(value) }
}
impl From<FormatError> for Error {
    fn from(value: FormatError) -> Self { Self::Format(value) }
}


#[cfg(test)]
mod tests {
    use super::{Error, FormatError};
    use crate::address::{VirtualAddress, VirtualRange};
    use crate::data_directory::DirectoryId;
    use crate::resource::DataOffset;

    #[test]
    fn test_unmapped_classification() {
        let range = VirtualRange::new(VirtualAddress(0x9000), 0x10);
        assert!(Error::UnmappedDirectory { id: DirectoryId::ExportTable, range }.is_unmapped());
        assert!(Error::UnmappedResourceData { offset: DataOffset(0x48), range }.is_unmapped());
        assert!(!Error::MissingResourceTable.is_unmapped());
        assert!(!Error::from(FormatError::UnterminatedVersionInfoKey).is_unmapped());
    }

    #[test]
    fn test_messages() {
        let range = VirtualRange::new(VirtualAddress(0x9000), 0x10);
        assert_eq!(
            Error::UnmappedDirectory { id: DirectoryId::ExportTable, range }.to_string(),
            "Export Table at 0x9000-0x900f is not mapped to a section",
        );
        assert_eq!(
            Error::from(FormatError::PeSignature { obtained: *b"NE\0\0" }).to_string(),
            "format error: invalid PE signature [4E, 45, 00, 00]",
        );
        assert_eq!(
            Error::UnsupportedFormat { magic: 0x0107 }.to_string(),
            "unsupported optional header magic 0x0107",
        );
    }
}
