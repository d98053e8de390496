//! The image reader, which resolves all headers of a PE file once and then serves reads.


use std::io;

use tracing::{debug, trace};

use crate::MAX_STRING_LENGTH;
use crate::address::{FileOffset, FileRange, StringOffset};
use crate::data_directory::DataDirectoryTable;
use crate::error::Error;
use crate::layout::{FileHeader, Layout, MachineType};
use crate::optional_header::{Format, OptionalHeader, Subsystem};
use crate::section::{Section, SectionName, SectionTable};
use crate::source::ReadAt;


/// Upper bound on a single allocation while reading a range, so that an absurd declared length
/// fails at the end of the source instead of exhausting memory up front.
const READ_CHUNK_SIZE: usize = 64 * 1024;


/// An opened PE image.
///
/// All header state is decoded in [`Image::open`] and does not change afterwards; the byte source
/// is only ever read through `&self`.
#[derive(Debug)]
pub struct Image<S> {
    source: S,
    layout: Layout,
    file_header: FileHeader,
    optional_header: OptionalHeader,
    sections: SectionTable,
    data_directories: DataDirectoryTable,
}
impl<S: ReadAt> Image<S> {
    /// Decodes the headers, section table and data directories of the image in `source`.
    pub fn open(source: S) -> Result<Self, Error> {
        let (mut layout, file_header) = Layout::resolve(&source)?;

        let optional_header_data = read_range(&source, layout.optional_header())?;
        let optional_header = OptionalHeader::parse(&optional_header_data)?;
        debug!(
            "{} image for {}, subsystem {}",
            optional_header.format, file_header.machine, optional_header.subsystem,
        );

        let section_data = read_range(&source, layout.section_table())?;
        let sections = SectionTable::parse(&section_data);

        let data_directories = DataDirectoryTable::normalize(&optional_header.data_directories, &sections)?;

        if layout.has_symbol_table() {
            let mut size_buf = [0u8; 4];
            source.read_exact_at(&mut size_buf, layout.string_table().start.0)?;
            layout.size_of_string_table = u32::from_le_bytes(size_buf);
            debug!("string table at {} is {} bytes long", layout.string_table().start, layout.size_of_string_table);
        }

        Ok(Self {
            source,
            layout,
            file_header,
            optional_header,
            sections,
            data_directories,
        })
    }

    /// Reads exactly the bytes of `range`.
    pub fn read_range(&self, range: FileRange) -> Result<Vec<u8>, Error> {
        read_range(&self.source, range)
    }

    /// Reads a null-terminated string from the COFF string table.
    ///
    /// At most [`MAX_STRING_LENGTH`] bytes are read; a longer string is cut off rather than
    /// rejected. Invalid UTF-8 is replaced.
    pub fn read_string(&self, offset: StringOffset) -> Result<String, Error> {
        let string_table = self.layout.string_table();
        let relative = u64::from(offset.0);
        if relative >= string_table.length {
            return Err(Error::OutOfRange { offset: relative, limit: string_table.length });
        }

        let window_length = (string_table.length - relative).min(MAX_STRING_LENGTH as u64);
        let window = self.read_range(FileRange::new(FileOffset(string_table.start.0 + relative), window_length))?;
        let text = match window.iter().position(|&b| b == 0x00) {
            Some(nul_index) => &window[..nul_index],
            None => &window[..],
        };
        Ok(String::from_utf8_lossy(text).into_owned())
    }

    /// The full name of a section, looking up long names in the string table.
    pub fn section_name(&self, section: &Section) -> Result<String, Error> {
        match &section.name {
            SectionName::Inline(name) => Ok(name.clone()),
            SectionName::StringTable(offset) => self.read_string(*offset),
        }
    }
}
impl<S> Image<S> {
    pub fn source(&self) -> &S { &self.source }
    pub fn into_source(self) -> S { self.source }
    pub fn layout(&self) -> &Layout { &self.layout }
    pub fn file_header(&self) -> &FileHeader { &self.file_header }
    pub fn machine(&self) -> MachineType { self.file_header.machine }
    pub fn format(&self) -> Format { self.optional_header.format }
    pub fn subsystem(&self) -> Subsystem { self.optional_header.subsystem }
    pub fn optional_header(&self) -> &OptionalHeader { &self.optional_header }
    pub fn sections(&self) -> &SectionTable { &self.sections }
    pub fn data_directories(&self) -> &DataDirectoryTable { &self.data_directories }
}


fn read_range<S: ReadAt + ?Sized>(source: &S, range: FileRange) -> Result<Vec<u8>, Error> {
    trace!("reading {} bytes at {}", range.length, range.start);
    let length = usize::try_from(range.length)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "range does not fit in memory"))?;

    let mut data = Vec::with_capacity(length.min(READ_CHUNK_SIZE));
    while data.len() < length {
        let chunk_start = data.len();
        let chunk_length = (length - chunk_start).min(READ_CHUNK_SIZE);
        data.resize(chunk_start + chunk_length, 0);
        source.read_exact_at(&mut data[chunk_start..], range.start.0 + chunk_start as u64)?;
    }
    Ok(data)
}


#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::io;

    use tracing_test::traced_test;

    use super::Image;
    use crate::address::{FileOffset, FileRange, StringOffset};
    use crate::data_directory::DirectoryId;
    use crate::error::{Error, FormatError};
    use crate::layout::MachineType;
    use crate::optional_header::{Format, Subsystem};
    use crate::source::ReadAt;
    use crate::testing::ImageBuilder;

    /// Counts how often the wrapped source is read.
    #[derive(Debug)]
    struct CountingSource {
        data: Vec<u8>,
        reads: Cell<usize>,
    }
    impl ReadAt for CountingSource {
        fn read_exact_at(&self, buf: &mut [u8], offset: u64) -> Result<(), io::Error> {
            self.reads.set(self.reads.get() + 1);
            self.data.read_exact_at(buf, offset)
        }
    }

    #[test]
    #[traced_test]
    fn test_open_pe32() {
        let image = Image::open(ImageBuilder::new(Format::Pe32).build()).unwrap();
        assert_eq!(image.format(), Format::Pe32);
        assert_eq!(image.machine(), MachineType::I386);
        assert_eq!(image.subsystem(), Subsystem::WindowsCui);
        assert_eq!(image.sections().len(), 1);
        assert!(image.data_directories().get(DirectoryId::ResourceTable).is_zero());
    }

    #[test]
    #[traced_test]
    fn test_open_pe32_plus() {
        let image = Image::open(ImageBuilder::new(Format::Pe32Plus).build()).unwrap();
        assert_eq!(image.format(), Format::Pe32Plus);
        assert_eq!(image.machine(), MachineType::Amd64);
        assert_eq!(image.layout().size_of_string_table, 0);
    }

    #[test]
    fn test_bad_dos_signature_stops_reading() {
        let mut data = ImageBuilder::new(Format::Pe32Plus).build();
        data[0] = b'N';
        let source = CountingSource { data, reads: Cell::new(0) };
        let err = Image::open(&source).unwrap_err();
        assert!(matches!(err, Error::Format(FormatError::DosSignature { .. })));
        assert_eq!(source.reads.get(), 1);
    }

    #[test]
    fn test_bad_pe_signature_stops_reading() {
        let mut data = ImageBuilder::new(Format::Pe32).build();
        let start = usize::try_from(ImageBuilder::PE_HEADER_OFFSET).unwrap();
        data[start] = b'X';
        let source = CountingSource { data, reads: Cell::new(0) };
        let err = Image::open(&source).unwrap_err();
        assert!(matches!(err, Error::Format(FormatError::PeSignature { .. })));
        assert_eq!(source.reads.get(), 2);
    }

    #[test]
    fn test_unmapped_directory_fails_open() {
        let data = ImageBuilder::new(Format::Pe32Plus)
            .directory(DirectoryId::ImportTable, 0x9000, 0x10)
            .build();
        match Image::open(data) {
            Err(Error::UnmappedDirectory { id, .. }) => assert_eq!(id, DirectoryId::ImportTable),
            other => panic!("unexpected result {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_string_table() {
        let data = ImageBuilder::new(Format::Pe32Plus)
            .section_name(b"/4\0\0\0\0\0\0")
            .string_table(3, b".debug_info\0.zdebug\0")
            .build();
        let image = Image::open(data).unwrap();
        let layout = *image.layout();
        assert!(layout.has_symbol_table());
        assert_eq!(layout.number_of_symbols, 3);
        assert_eq!(layout.size_of_string_table, 4 + 20);

        let section = &image.sections().as_slice()[0];
        assert_eq!(image.section_name(section).unwrap(), ".debug_info");
        assert_eq!(image.read_string(StringOffset(16)).unwrap(), ".zdebug");

        match image.read_string(StringOffset(24)) {
            Err(Error::OutOfRange { offset, limit }) => {
                assert_eq!(offset, 24);
                assert_eq!(limit, 24);
            },
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn test_string_without_terminator() {
        let data = ImageBuilder::new(Format::Pe32)
            .string_table(0, b"abc")
            .build();
        let image = Image::open(data).unwrap();
        // with no symbols the size field sits at the symbol pointer itself
        let layout = *image.layout();
        assert_eq!(layout.string_table().start, layout.start_of_symbol_table);
        assert_eq!(layout.size_of_string_table, 4 + 3);
        // the window ends with the table, and the table's size field counts itself
        assert_eq!(image.read_string(StringOffset(4)).unwrap(), "abc");
        assert_eq!(image.read_string(StringOffset(5)).unwrap(), "bc");
    }

    #[test]
    fn test_long_string_is_capped() {
        let mut strings = vec![b'x'; 5000];
        strings.push(0);
        let data = ImageBuilder::new(Format::Pe32Plus)
            .string_table(1, &strings)
            .build();
        let image = Image::open(data).unwrap();
        assert_eq!(image.read_string(StringOffset(4)).unwrap().len(), 4096);
    }

    #[test]
    fn test_read_range() {
        let data = ImageBuilder::new(Format::Pe32).build();
        let total = data.len() as u64;
        let image = Image::open(data).unwrap();

        let bytes = image.read_range(FileRange::new(FileOffset(0), 2)).unwrap();
        assert_eq!(bytes, b"MZ");
        assert!(image.read_range(FileRange::new(FileOffset(0), 0)).unwrap().is_empty());
        assert!(matches!(
            image.read_range(FileRange::new(FileOffset(total - 1), 2)),
            Err(Error::Io(e)) if e.kind() == io::ErrorKind::UnexpectedEof,
        ));
        // a huge declared length fails at the end of the data
        assert!(matches!(
            image.read_range(FileRange::new(FileOffset(0), u64::from(u32::MAX))),
            Err(Error::Io(_)),
        ));
    }
}
