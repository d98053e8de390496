/// Integers decodable from little-endian bytes at a position within a buffer.
pub(crate) trait LeInt: Sized {
    fn from_le_slice_at(bytes: &[u8], offset: usize) -> Self;
}

macro_rules! impl_le_int {
    ($type:ty) => {
        impl LeInt for $type {
            fn from_le_slice_at(bytes: &[u8], offset: usize) -> Self {
                const SIZE: usize = ::std::mem::size_of::<$type>();
                let mut buf = [0u8; SIZE];
                buf.copy_from_slice(&bytes[offset..offset+SIZE]);
                <$type>::from_le_bytes(buf)
            }
        }
    };
}
impl_le_int!(u16);
impl_le_int!(u32);
impl_le_int!(u64);


/// Reads a little-endian integer at `offset`. Callers check the buffer length beforehand.
pub(crate) fn read_le<T: LeInt>(bytes: &[u8], offset: usize) -> T {
    T::from_le_slice_at(bytes, offset)
}
