//! Reads structural and resource metadata from Portable Executable images.
//!
//! Nothing is loaded or executed; every structure is decoded from positioned reads against a
//! [`ReadAt`] byte source. Start with [`Image::open`], then hand the image to
//! [`resource::ResourceReader`] to walk its resources and to [`version_info`] to decode a version
//! resource.

pub mod address;
pub mod data_directory;
pub mod dos;
pub mod error;
pub mod image;
pub mod layout;
mod le_int;
pub mod optional_header;
pub mod resource;
pub mod section;
pub mod source;
#[cfg(test)]
mod testing;
pub mod utf16;
pub mod version_info;


pub use crate::error::{Error, FormatError};
pub use crate::image::Image;
pub use crate::source::ReadAt;


/// Strings read from the COFF string table or the resource directory are cut off after this many
/// bytes.
pub const MAX_STRING_LENGTH: usize = 4096;
