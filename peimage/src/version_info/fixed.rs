use std::fmt;

use bitflags::bitflags;

use crate::error::{Error, FormatError};
use crate::le_int::read_le;


pub const FIXED_FILE_INFO_SIZE: usize = 52;
pub const SIGNATURE: u32 = 0xFEEF_04BD;


/// A four-part version number packed into 64 bits, most significant part first.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct FixedVersion(pub u64);
impl FixedVersion {
    pub fn from_words(most_significant: u32, least_significant: u32) -> Self {
        Self((u64::from(most_significant) << 32) | u64::from(least_significant))
    }

    pub fn major(&self) -> u16 { (self.0 >> 48) as u16 }
    pub fn minor(&self) -> u16 { (self.0 >> 32) as u16 }
    pub fn build(&self) -> u16 { (self.0 >> 16) as u16 }
    pub fn revision(&self) -> u16 { self.0 as u16 }
}
impl fmt::Display for FixedVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}.{}", self.major(), self.minor(), self.build(), self.revision())
    }
}


bitflags! {
    #[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
    #[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
    pub struct FileFlags : u32 {
        const DEBUG = 0x0000_0001;
        const PRERELEASE = 0x0000_0002;
        const PATCHED = 0x0000_0004;
        const PRIVATE_BUILD = 0x0000_0008;

        /// The version resource was created dynamically; some fields may be missing or wrong.
        const INFO_INFERRED = 0x0000_0010;

        const SPECIAL_BUILD = 0x0000_0020;
    }
}


/// The fixed-layout value of the root version node.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct FixedFileInfo {
    pub struct_version: u32,
    pub file_version: FixedVersion,
    pub product_version: FixedVersion,
    pub file_flags_mask: FileFlags,
    pub file_flags: FileFlags,
    pub file_os: u32,
    pub file_type: u32,
    pub file_subtype: u32,
    pub file_date: u64,
}
impl FixedFileInfo {
    pub fn parse(data: &[u8]) -> Result<Self, Error> {
        if data.len() < FIXED_FILE_INFO_SIZE {
            return Err(FormatError::FixedFileInfoTooShort { length: data.len() }.into());
        }
        let signature: u32 = read_le(data, 0);
        if signature != SIGNATURE {
            return Err(FormatError::FixedFileInfoSignature { obtained: signature }.into());
        }

        Ok(Self {
            struct_version: read_le(data, 4),
            file_version: FixedVersion::from_words(read_le(data, 8), read_le(data, 12)),
            product_version: FixedVersion::from_words(read_le(data, 16), read_le(data, 20)),
            file_flags_mask: FileFlags::from_bits_retain(read_le(data, 24)),
            file_flags: FileFlags::from_bits_retain(read_le(data, 28)),
            file_os: read_le(data, 32),
            file_type: read_le(data, 36),
            file_subtype: read_le(data, 40),
            file_date: (u64::from(read_le::<u32>(data, 44)) << 32) | u64::from(read_le::<u32>(data, 48)),
        })
    }

    /// The flags that the mask marks as valid.
    pub fn effective_flags(&self) -> FileFlags {
        self.file_flags & self.file_flags_mask
    }
}
