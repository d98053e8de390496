//! The DOS compatibility header at the start of every image.
//!
//! Only two fields matter here: the `MZ` signature and the pointer to the PE header at 0x3C.


use tracing::debug;

use crate::address::FileOffset;
use crate::error::{Error, FormatError};
use crate::le_int::read_le;
use crate::source::ReadAt;


pub const HEADER_SIZE: usize = 64;
pub const SIGNATURE: u16 = 0x5A4D;
const NEXT_HEADER_POINTER_OFFSET: usize = 0x3C;


#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct DosHeader {
    pub next_header: FileOffset,
}
impl DosHeader {
    pub fn read<S: ReadAt + ?Sized>(source: &S) -> Result<Self, Error> {
        let mut header_buf = [0u8; HEADER_SIZE];
        source.read_exact_at(&mut header_buf, 0)?;
        Self::parse(&header_buf)
    }

    pub fn parse(header_buf: &[u8; HEADER_SIZE]) -> Result<Self, Error> {
        let signature: u16 = read_le(header_buf, 0);
        if signature != SIGNATURE {
            debug!("DOS signature is {:#06X}, expected {:#06X}", signature, SIGNATURE);
            return Err(FormatError::DosSignature { obtained: signature }.into());
        }
        let next_header_pointer: u32 = read_le(header_buf, NEXT_HEADER_POINTER_OFFSET);
        Ok(Self {
            next_header: FileOffset::from(next_header_pointer),
        })
    }
}
