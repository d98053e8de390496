//! The PE signature, the COFF file header and the file ranges derived from them.


use std::fmt;

use bitflags::bitflags;
use from_to_repr::from_to_other;
use tracing::debug;

use crate::address::{FileOffset, FileRange};
use crate::dos::DosHeader;
use crate::error::{Error, FormatError};
use crate::le_int::read_le;
use crate::source::ReadAt;


pub const SIGNATURE: [u8; 4] = *b"PE\0\0";
pub const SIGNATURE_SIZE: u64 = 4;
pub const FILE_HEADER_SIZE: u64 = 20;
pub const SECTION_HEADER_SIZE: u64 = 40;
pub const SYMBOL_SIZE: u64 = 18;

/// The optional header must at least hold its magic value.
const MIN_OPTIONAL_HEADER_SIZE: u16 = 2;


/// Where the headers and tables of an image sit within its file.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Layout {
    /// The position of the PE signature.
    pub start: FileOffset,
    pub number_of_sections: u16,
    pub size_of_optional_header: u16,
    pub start_of_symbol_table: FileOffset,
    pub number_of_symbols: u32,

    /// Taken from the first four bytes of the string table, which count themselves.
    pub size_of_string_table: u32,
}
impl Layout {
    pub fn signature(&self) -> FileRange {
        FileRange::new(self.start, SIGNATURE_SIZE)
    }

    pub fn file_header(&self) -> FileRange {
        FileRange::new(FileOffset(self.start.0 + SIGNATURE_SIZE), FILE_HEADER_SIZE)
    }

    pub fn signature_and_file_header(&self) -> FileRange {
        FileRange::new(self.start, SIGNATURE_SIZE + FILE_HEADER_SIZE)
    }

    pub fn optional_header(&self) -> FileRange {
        FileRange::new(
            FileOffset(self.start.0 + SIGNATURE_SIZE + FILE_HEADER_SIZE),
            self.size_of_optional_header.into(),
        )
    }

    pub fn section_table(&self) -> FileRange {
        let optional_header = self.optional_header();
        FileRange::new(
            FileOffset(optional_header.start.0 + optional_header.length),
            u64::from(self.number_of_sections) * SECTION_HEADER_SIZE,
        )
    }

    pub fn symbol_table(&self) -> FileRange {
        FileRange::new(
            self.start_of_symbol_table,
            u64::from(self.number_of_symbols) * SYMBOL_SIZE,
        )
    }

    /// The string table directly follows the symbol table.
    pub fn string_table(&self) -> FileRange {
        let symbol_table = self.symbol_table();
        FileRange::new(
            FileOffset(symbol_table.start.0 + symbol_table.length),
            self.size_of_string_table.into(),
        )
    }

    pub fn has_symbol_table(&self) -> bool {
        self.start_of_symbol_table.0 != 0
    }

    /// Locates the PE header through the DOS header and decodes the file header.
    ///
    /// Reads stop at the first invalid signature. The string table size stays zero; it is filled
    /// in once the rest of the headers have been read.
    pub fn resolve<S: ReadAt + ?Sized>(source: &S) -> Result<(Self, FileHeader), Error> {
        let dos = DosHeader::read(source)?;

        let mut layout = Layout {
            start: dos.next_header,
            ..Default::default()
        };

        let mut header_buf = [0u8; (SIGNATURE_SIZE + FILE_HEADER_SIZE) as usize];
        source.read_exact_at(&mut header_buf, layout.signature_and_file_header().start.0)?;

        let mut signature = [0u8; SIGNATURE_SIZE as usize];
        signature.copy_from_slice(&header_buf[0..4]);
        if signature != SIGNATURE {
            debug!("PE signature at {} is {:02X?}", layout.start, signature);
            return Err(FormatError::PeSignature { obtained: signature }.into());
        }

        let file_header = FileHeader::parse(&header_buf[4..]);
        if file_header.size_of_optional_header < MIN_OPTIONAL_HEADER_SIZE {
            return Err(FormatError::OptionalHeaderTooSmall {
                size: file_header.size_of_optional_header,
                minimum: MIN_OPTIONAL_HEADER_SIZE,
            }.into());
        }

        layout.number_of_sections = file_header.number_of_sections;
        layout.size_of_optional_header = file_header.size_of_optional_header;
        layout.start_of_symbol_table = FileOffset::from(file_header.pointer_to_symbol_table);
        layout.number_of_symbols = file_header.number_of_symbols;
        debug!(
            "PE header at {}: {} sections, {} symbols at {}",
            layout.start, layout.number_of_sections, layout.number_of_symbols, layout.start_of_symbol_table,
        );

        Ok((layout, file_header))
    }
}


/// The COFF file header following the PE signature.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct FileHeader {
    pub machine: MachineType,
    pub number_of_sections: u16,
    pub time_date_stamp: u32,
    pub pointer_to_symbol_table: u32,
    pub number_of_symbols: u32,
    pub size_of_optional_header: u16,
    pub characteristics: Characteristics,
}
impl FileHeader {
    /// Decodes the header from the first 20 bytes of `header_buf`.
    pub fn parse(header_buf: &[u8]) -> Self {
        Self {
            machine: MachineType::from_base_type(read_le(header_buf, 0)),
            number_of_sections: read_le(header_buf, 2),
            time_date_stamp: read_le(header_buf, 4),
            pointer_to_symbol_table: read_le(header_buf, 8),
            number_of_symbols: read_le(header_buf, 12),
            size_of_optional_header: read_le(header_buf, 16),
            characteristics: Characteristics::from_bits_retain(read_le(header_buf, 18)),
        }
    }
}


#[derive(Clone, Copy, Debug)]
#[from_to_other(base_type = u16, derive_compare = "as_int")]
pub enum MachineType {
    Unknown = 0x0000,
    AlphaAxp = 0x0184,
    Alpha64 = 0x0284,
    MatsushitaAm33 = 0x01D3,
    Amd64 = 0x8664,
    Arm = 0x01C0,
    Arm64 = 0xAA64,
    Arm64Ec = 0xA641,
    Arm64X = 0xA64E,
    ArmThumb2 = 0x01C4,
    EfiByteCode = 0x0EBC,
    I386 = 0x014C,
    Itanium = 0x0200,
    LoongArch32 = 0x6232,
    LoongArch64 = 0x6264,
    MitsubishiM32r = 0x9041,
    Mips16 = 0x0266,
    MipsWithFpu = 0x0366,
    Mips16WithFpu = 0x0466,
    PowerPc = 0x01F0,
    PowerPcWithFpu = 0x01F1,
    MipsR3kLittleEndian = 0x0162,
    MipsR4k = 0x0166,
    MipsR10k = 0x0168,
    RiscV32 = 0x5032,
    RiscV64 = 0x5064,
    RiscV128 = 0x5128,
    HitachiSh3 = 0x01A2,
    HitachiSh3Dsp = 0x01A3,
    HitachiSh4 = 0x01A6,
    HitachiSh5 = 0x01A8,
    ArmThumb = 0x01C2,
    WceMipsV2 = 0x0169,
    Other(u16),
}
impl MachineType {
    pub fn name(&self) -> Option<&'static str> {
        let name = match self {
            Self::Unknown => "unknown",
            Self::AlphaAxp => "Alpha AXP",
            Self::Alpha64 => "Alpha 64",
            Self::MatsushitaAm33 => "Matsushita AM33",
            Self::Amd64 => "x64",
            Self::Arm => "ARM little endian",
            Self::Arm64 => "ARM64 little endian",
            Self::Arm64Ec => "ARM64EC",
            Self::Arm64X => "ARM64X",
            Self::ArmThumb2 => "ARM Thumb-2 little endian",
            Self::EfiByteCode => "EFI byte code",
            Self::I386 => "Intel 386",
            Self::Itanium => "Intel Itanium",
            Self::LoongArch32 => "LoongArch 32-bit",
            Self::LoongArch64 => "LoongArch 64-bit",
            Self::MitsubishiM32r => "Mitsubishi M32R little endian",
            Self::Mips16 => "MIPS16",
            Self::MipsWithFpu => "MIPS with FPU",
            Self::Mips16WithFpu => "MIPS16 with FPU",
            Self::PowerPc => "Power PC little endian",
            Self::PowerPcWithFpu => "Power PC with floating point support",
            Self::MipsR3kLittleEndian => "MIPS I little endian",
            Self::MipsR4k => "MIPS III little endian",
            Self::MipsR10k => "MIPS IV little endian",
            Self::RiscV32 => "RISC-V 32-bit",
            Self::RiscV64 => "RISC-V 64-bit",
            Self::RiscV128 => "RISC-V 128-bit",
            Self::HitachiSh3 => "Hitachi SH3",
            Self::HitachiSh3Dsp => "Hitachi SH3 DSP",
            Self::HitachiSh4 => "Hitachi SH4",
            Self::HitachiSh5 => "Hitachi SH5",
            Self::ArmThumb => "Thumb",
            Self::WceMipsV2 => "MIPS little-endian WCE v2",
            Self::Other(_) => return None,
        };
        Some(name)
    }
}
impl fmt::Display for MachineType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{}", name),
            None => write!(f, "machine {:#06X}", self.to_base_type()),
        }
    }
}


bitflags! {
    #[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
    #[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
    pub struct Characteristics : u16 {
        /// Image must be loaded at its preferred base address.
        const RELOCS_STRIPPED = 0x0001;

        /// Image is valid and can be run.
        const EXECUTABLE_IMAGE = 0x0002;

        const LINE_NUMS_STRIPPED = 0x0004;
        const LOCAL_SYMS_STRIPPED = 0x0008;
        const AGGRESSIVE_WS_TRIM = 0x0010;

        /// Image can handle addresses above 2 GiB.
        const LARGE_ADDRESS_AWARE = 0x0020;

        const BYTES_REVERSED_LO = 0x0080;

        /// Machine is based on a 32-bit-word architecture.
        const MACHINE_32BIT = 0x0100;

        const DEBUG_STRIPPED = 0x0200;
        const REMOVABLE_RUN_FROM_SWAP = 0x0400;
        const NET_RUN_FROM_SWAP = 0x0800;
        const SYSTEM = 0x1000;
        const DLL = 0x2000;
        const UP_SYSTEM_ONLY = 0x4000;
        const BYTES_REVERSED_HI = 0x8000;
    }
}
