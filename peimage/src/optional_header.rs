//! The optional header: format, Windows-specific fields and the raw data directories.


use std::fmt;

use bitflags::bitflags;
use from_to_repr::from_to_other;
use tracing::debug;

use crate::address::VirtualAddress;
use crate::data_directory::{DATA_DIRECTORY_SIZE, RawDataDirectory};
use crate::error::{Error, FormatError};
use crate::le_int::{LeInt, read_le};


#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum Format {
    Pe32,
    Pe32Plus,
}
impl Format {
    pub const PE32_MAGIC: u16 = 0x010B;
    pub const PE32_PLUS_MAGIC: u16 = 0x020B;

    pub fn from_magic(magic: u16) -> Option<Self> {
        match magic {
            Self::PE32_MAGIC => Some(Self::Pe32),
            Self::PE32_PLUS_MAGIC => Some(Self::Pe32Plus),
            _ => None,
        }
    }

    pub fn magic(self) -> u16 {
        match self {
            Self::Pe32 => Self::PE32_MAGIC,
            Self::Pe32Plus => Self::PE32_PLUS_MAGIC,
        }
    }

    /// Size of the standard and Windows-specific fields, up to the first data directory.
    pub fn min_header_size(self) -> u16 {
        match self {
            Self::Pe32 => 96,
            Self::Pe32Plus => 112,
        }
    }

    /// Whether addresses and memory sizes are 64 bits wide.
    pub fn is_64_bit(self) -> bool {
        matches!(self, Self::Pe32Plus)
    }
}
impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pe32 => write!(f, "PE32 (32-bit)"),
            Self::Pe32Plus => write!(f, "PE32+ (64-bit)"),
        }
    }
}


#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct OptionalHeader {
    pub format: Format,
    pub major_linker_version: u8,
    pub minor_linker_version: u8,
    pub code_size: u32,
    pub initialized_data_size: u32,
    pub uninitialized_data_size: u32,
    pub entry_point: VirtualAddress,
    pub base_of_code: VirtualAddress,

    /// Only present in PE32 headers.
    pub base_of_data: Option<VirtualAddress>,

    pub image_base: u64,
    pub section_alignment: u32,
    pub file_alignment: u32,
    pub major_os_version: u16,
    pub minor_os_version: u16,
    pub major_image_version: u16,
    pub minor_image_version: u16,
    pub major_subsystem_version: u16,
    pub minor_subsystem_version: u16,
    pub win32_version_value: u32,
    pub image_size: u32,
    pub headers_size: u32,
    pub checksum: u32,
    pub subsystem: Subsystem,
    pub dll_characteristics: DllCharacteristics,
    pub stack_reserve_size: u64,
    pub stack_commit_size: u64,
    pub heap_reserve_size: u64,
    pub heap_commit_size: u64,
    pub loader_flags: u32,

    /// The directory count as declared; may exceed the number of directories that fit.
    pub declared_data_directory_count: u32,

    /// The directories that fit entirely within the header, in slot order.
    pub data_directories: Vec<RawDataDirectory>,
}
impl OptionalHeader {
    /// Decodes an optional header from exactly the bytes the file header declares for it.
    pub fn parse(data: &[u8]) -> Result<Self, Error> {
        const MAGIC_SIZE: u16 = 2;
        let size = u16::try_from(data.len()).unwrap_or(u16::MAX);
        if size < MAGIC_SIZE {
            return Err(FormatError::OptionalHeaderTooSmall { size, minimum: MAGIC_SIZE }.into());
        }

        let magic: u16 = read_le(data, 0);
        let Some(format) = Format::from_magic(magic) else {
            debug!("optional header has unknown magic {:#06X}", magic);
            return Err(Error::UnsupportedFormat { magic });
        };
        let minimum = format.min_header_size();
        if size < minimum {
            return Err(FormatError::OptionalHeaderTooSmall { size, minimum }.into());
        }

        let is_64 = format.is_64_bit();
        let mut cursor = FieldCursor { data, position: 2 };
        let major_linker_version = cursor.byte();
        let minor_linker_version = cursor.byte();
        let code_size = cursor.int();
        let initialized_data_size = cursor.int();
        let uninitialized_data_size = cursor.int();
        let entry_point = VirtualAddress::from(cursor.int::<u32>());
        let base_of_code = VirtualAddress::from(cursor.int::<u32>());
        let base_of_data = if is_64 {
            None
        } else {
            Some(VirtualAddress::from(cursor.int::<u32>()))
        };
        let image_base = cursor.word(is_64);
        let section_alignment = cursor.int();
        let file_alignment = cursor.int();
        let major_os_version = cursor.int();
        let minor_os_version = cursor.int();
        let major_image_version = cursor.int();
        let minor_image_version = cursor.int();
        let major_subsystem_version = cursor.int();
        let minor_subsystem_version = cursor.int();
        let win32_version_value = cursor.int();
        let image_size = cursor.int();
        let headers_size = cursor.int();
        let checksum = cursor.int();
        let subsystem = Subsystem::from_base_type(cursor.int());
        let dll_characteristics = DllCharacteristics::from_bits_retain(cursor.int());
        let stack_reserve_size = cursor.word(is_64);
        let stack_commit_size = cursor.word(is_64);
        let heap_reserve_size = cursor.word(is_64);
        let heap_commit_size = cursor.word(is_64);
        let loader_flags = cursor.int();
        let declared_data_directory_count: u32 = cursor.int();
        debug_assert_eq!(cursor.position, usize::from(minimum));

        let directory_bytes = &data[usize::from(minimum)..];
        let fitting_count = directory_bytes.len() / DATA_DIRECTORY_SIZE;
        let count = usize::try_from(declared_data_directory_count)
            .map_or(fitting_count, |declared| declared.min(fitting_count));
        if usize::try_from(declared_data_directory_count).ok() != Some(count) {
            debug!(
                "optional header declares {} data directories, {} fit, using {}",
                declared_data_directory_count, fitting_count, count,
            );
        }
        let data_directories = directory_bytes
            .chunks_exact(DATA_DIRECTORY_SIZE)
            .take(count)
            .map(RawDataDirectory::parse)
            .collect();

        Ok(Self {
            format,
            major_linker_version,
            minor_linker_version,
            code_size,
            initialized_data_size,
            uninitialized_data_size,
            entry_point,
            base_of_code,
            base_of_data,
            image_base,
            section_alignment,
            file_alignment,
            major_os_version,
            minor_os_version,
            major_image_version,
            minor_image_version,
            major_subsystem_version,
            minor_subsystem_version,
            win32_version_value,
            image_size,
            headers_size,
            checksum,
            subsystem,
            dll_characteristics,
            stack_reserve_size,
            stack_commit_size,
            heap_reserve_size,
            heap_commit_size,
            loader_flags,
            declared_data_directory_count,
            data_directories,
        })
    }
}


/// Sequential reader over fields whose positions the caller has already bounds-checked.
struct FieldCursor<'a> {
    data: &'a [u8],
    position: usize,
}
impl<'a> FieldCursor<'a> {
    fn byte(&mut self) -> u8 {
        let value = self.data[self.position];
        self.position += 1;
        value
    }

    fn int<T: LeInt>(&mut self) -> T {
        let value = read_le(self.data, self.position);
        self.position += std::mem::size_of::<T>();
        value
    }

    /// A field that is 64 bits wide in PE32+ and 32 bits wide in PE32.
    fn word(&mut self, is_64: bool) -> u64 {
        if is_64 {
            self.int::<u64>()
        } else {
            self.int::<u32>().into()
        }
    }
}


#[derive(Clone, Copy, Debug)]
#[from_to_other(base_type = u16, derive_compare = "as_int")]
pub enum Subsystem {
    Unknown = 0,

    /// Driver or native process.
    Native = 1,

    WindowsGui = 2,
    WindowsCui = 3,
    Os2Cui = 5,
    PosixCui = 7,

    /// Native Win9x driver.
    NativeWindows = 8,

    WindowsCeGui = 9,
    EfiApplication = 10,
    EfiBootServiceDriver = 11,
    EfiRuntimeDriver = 12,
    EfiRom = 13,
    Xbox = 14,
    WindowsBootApplication = 16,
    Other(u16),
}
impl fmt::Display for Subsystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unknown => "Unknown",
            Self::Native => "Native",
            Self::WindowsGui => "Windows GUI",
            Self::WindowsCui => "Windows CUI",
            Self::Os2Cui => "OS/2 CUI",
            Self::PosixCui => "POSIX CUI",
            Self::NativeWindows => "Native Win9x driver",
            Self::WindowsCeGui => "Windows CE GUI",
            Self::EfiApplication => "EFI application",
            Self::EfiBootServiceDriver => "EFI boot service driver",
            Self::EfiRuntimeDriver => "EFI runtime driver",
            Self::EfiRom => "EFI ROM",
            Self::Xbox => "Xbox",
            Self::WindowsBootApplication => "Windows boot application",
            Self::Other(value) => return write!(f, "subsystem {}", value),
        };
        write!(f, "{}", name)
    }
}


bitflags! {
    #[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
    #[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
    pub struct DllCharacteristics : u16 {
        // 0x0001 through 0x0010 reserved

        /// Image can handle high-entropy 64-bit virtual addresses.
        const HIGH_ENTROPY_VIRTUAL_ADDRESSES = 0x0020;

        /// Image can be relocated at load time.
        const DYNAMIC_BASE = 0x0040;

        const FORCE_INTEGRITY = 0x0080;
        const NX_COMPATIBILITY = 0x0100;
        const NO_ISOLATION = 0x0200;
        const NO_SEH = 0x0400;
        const NO_BIND = 0x0800;
        const APPCONTAINER = 0x1000;
        const WDM_DRIVER = 0x2000;
        const GUARD_CF = 0x4000;
        const TERMINAL_SERVER_AWARE = 0x8000;
    }
}
