//! File offsets, relative virtual addresses and ranges over either.
//!
//! The two address spaces of an image never mix implicitly: a [`VirtualAddress`] only becomes a
//! [`FileOffset`] through a section table translation.

use std::fmt;


/// A position that can delimit an [`AddressRange`].
pub trait Address: Copy + Eq + Ord + fmt::Debug {
    fn from_u64(value: u64) -> Self;
    fn to_u64(self) -> u64;
}

macro_rules! define_address {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
        #[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
        #[cfg_attr(feature = "serde", serde(transparent))]
        pub struct $name(pub u64);
        impl Address for $name {
            fn from_u64(value: u64) -> Self { Self(value) }
            fn to_u64(self) -> u64 { self.0 }
        }
        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{:#x}", self.0)
            }
        }
        impl From<u32> for $name {
            fn from(value: u32) -> Self { Self(value.into()) }
        }
        impl From<u64> for $name {
            fn from(value: u64) -> Self { Self(value) }
        }
    };
}

define_address!(
    /// An absolute offset within an image file.
    FileOffset
);
define_address!(
    /// An address within the mapped image, relative to the image's base address (an RVA).
    VirtualAddress
);


/// The offset of a string within the COFF string table.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct StringOffset(pub u32);
impl fmt::Display for StringOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}


/// A half-open range `[start, start + length)` of addresses.
///
/// A range with a length of zero never contains anything, not even its own start.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct AddressRange<T> {
    pub start: T,
    pub length: u64,
}
impl<T: Address> AddressRange<T> {
    pub fn new(start: T, length: u64) -> Self {
        Self { start, length }
    }

    /// Whether this is the canonical absent range (zero start and zero length).
    pub fn is_zero(&self) -> bool {
        self.start.to_u64() == 0 && self.length == 0
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// The last address within the range, or the start if the range is empty.
    pub fn end(&self) -> T {
        if self.length == 0 {
            self.start
        } else {
            T::from_u64(self.start.to_u64().saturating_add(self.length - 1))
        }
    }

    pub fn contains(&self, address: T) -> bool {
        if self.length == 0 || address < self.start {
            return false;
        }
        address.to_u64() - self.start.to_u64() < self.length
    }

    /// Whether `other` lies entirely within this range. Empty ranges are never contained.
    pub fn contains_range(&self, other: &Self) -> bool {
        if self.length == 0 || other.length == 0 || other.start < self.start {
            return false;
        }
        let skip = other.start.to_u64() - self.start.to_u64();
        skip < self.length && other.length <= self.length - skip
    }
}
impl<T: Address + fmt::Display> fmt::Display for AddressRange<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end())
    }
}

pub type FileRange = AddressRange<FileOffset>;
pub type VirtualRange = AddressRange<VirtualAddress>;


#[cfg(test)]
mod tests {
    use super::{FileOffset, FileRange, VirtualAddress, VirtualRange};

    #[test]
    fn test_empty_range_contains_nothing() {
        for start in [0u64, 1, 0x1000, u64::from(u32::MAX)] {
            let range = VirtualRange::new(VirtualAddress(start), 0);
            assert!(!range.contains(VirtualAddress(start)));
            assert!(!range.contains(VirtualAddress(start.wrapping_sub(1))));
            assert!(!range.contains(VirtualAddress(start + 1)));
            assert!(!range.contains_range(&range));
            assert_eq!(range.end(), VirtualAddress(start));
        }
    }

    #[test]
    fn test_contains_bounds() {
        let range = VirtualRange::new(VirtualAddress(0x1000), 0x100);
        assert!(!range.contains(VirtualAddress(0x0FFF)));
        assert!(range.contains(VirtualAddress(0x1000)));
        assert!(range.contains(VirtualAddress(0x10FF)));
        assert!(!range.contains(VirtualAddress(0x1100)));
        assert_eq!(range.end(), VirtualAddress(0x10FF));
    }

    #[test]
    fn test_contains_range() {
        let outer = FileRange::new(FileOffset(0x400), 0x100);
        assert!(outer.contains_range(&outer));
        assert!(outer.contains_range(&FileRange::new(FileOffset(0x480), 0x80)));
        assert!(!outer.contains_range(&FileRange::new(FileOffset(0x480), 0x81)));
        assert!(!outer.contains_range(&FileRange::new(FileOffset(0x3FF), 0x10)));
        assert!(!outer.contains_range(&FileRange::new(FileOffset(0x480), 0)));
        assert!(!outer.contains_range(&FileRange::new(FileOffset(0x500), 1)));
    }

    #[test]
    fn test_zero_and_display() {
        assert!(FileRange::default().is_zero());
        assert!(!FileRange::new(FileOffset(0x10), 0).is_zero());
        assert!(FileRange::new(FileOffset(0x10), 0).is_empty());
        assert_eq!(FileRange::new(FileOffset(0x400), 0x100).to_string(), "0x400-0x4ff");
        assert_eq!(VirtualAddress(0x1050).to_string(), "0x1050");
    }
}
