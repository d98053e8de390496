//! Builders for synthetic images and structures used throughout the unit tests.


use crate::data_directory::{DATA_DIRECTORY_SIZE, DirectoryId};
use crate::layout::SYMBOL_SIZE;
use crate::optional_header::Format;


const DIRECTORY_SLOTS: usize = 16;


/// Assembles a minimal image with one section.
///
/// The DOS header points to the PE header at [`ImageBuilder::PE_HEADER_OFFSET`]; headers are
/// followed by the section data at [`ImageBuilder::SECTION_FILE_OFFSET`], which is mapped at
/// [`ImageBuilder::SECTION_VIRTUAL_ADDRESS`]. A symbol and string table, if any, come last.
pub(crate) struct ImageBuilder {
    format: Format,
    section_name: [u8; 8],
    section_data: Vec<u8>,
    directories: Vec<(u32, u32)>,
    symbols: Option<(u32, Vec<u8>)>,
}
impl ImageBuilder {
    pub const PE_HEADER_OFFSET: u32 = 0x40;
    pub const SECTION_FILE_OFFSET: u32 = 0x400;
    pub const SECTION_VIRTUAL_ADDRESS: u32 = 0x1000;
    const FILE_ALIGNMENT: usize = 0x200;

    pub fn new(format: Format) -> Self {
        Self {
            format,
            section_name: *b".rsrc\0\0\0",
            section_data: Vec::new(),
            directories: vec![(0, 0); DIRECTORY_SLOTS],
            symbols: None,
        }
    }

    pub fn directory(mut self, id: DirectoryId, address: u32, size: u32) -> Self {
        let index = usize::try_from(id.to_base_type()).unwrap();
        self.directories[index] = (address, size);
        self
    }

    pub fn section_name(mut self, name: &[u8; 8]) -> Self {
        self.section_name = *name;
        self
    }

    pub fn section_data(mut self, data: Vec<u8>) -> Self {
        self.section_data = data;
        self
    }

    /// Places `resources` at the start of the section and points the resource directory at it.
    pub fn resources(self, resources: Vec<u8>) -> Self {
        let size = u32::try_from(resources.len()).unwrap();
        self.section_data(resources)
            .directory(DirectoryId::ResourceTable, Self::SECTION_VIRTUAL_ADDRESS, size)
    }

    /// Appends `symbol_count` empty symbols and a string table holding `strings`.
    pub fn string_table(mut self, symbol_count: u32, strings: &[u8]) -> Self {
        self.symbols = Some((symbol_count, strings.to_vec()));
        self
    }

    pub fn build(self) -> Vec<u8> {
        let section_size = self.section_data.len().max(1).next_multiple_of(Self::FILE_ALIGNMENT);
        let section_size_u32 = u32::try_from(section_size).unwrap();
        let symbol_pointer = match self.symbols {
            Some(_) => Self::SECTION_FILE_OFFSET + section_size_u32,
            None => 0,
        };
        let symbol_count = self.symbols.as_ref().map_or(0, |(count, _)| *count);
        let (machine, characteristics): (u16, u16) = match self.format {
            Format::Pe32 => (0x014C, 0x0102),
            Format::Pe32Plus => (0x8664, 0x0022),
        };

        let mut file = vec![0u8; usize::try_from(Self::SECTION_FILE_OFFSET).unwrap()];
        file[0..2].copy_from_slice(b"MZ");
        file[0x3C..0x40].copy_from_slice(&Self::PE_HEADER_OFFSET.to_le_bytes());

        let optional_header = optional_header_bytes(self.format, &self.directories);
        let optional_header_size = u16::try_from(optional_header.len()).unwrap();

        let mut headers = Vec::new();
        headers.extend_from_slice(b"PE\0\0");
        headers.extend_from_slice(&machine.to_le_bytes());
        headers.extend_from_slice(&1u16.to_le_bytes());
        headers.extend_from_slice(&0x6000_0000u32.to_le_bytes());
        headers.extend_from_slice(&symbol_pointer.to_le_bytes());
        headers.extend_from_slice(&symbol_count.to_le_bytes());
        headers.extend_from_slice(&optional_header_size.to_le_bytes());
        headers.extend_from_slice(&characteristics.to_le_bytes());
        headers.extend_from_slice(&optional_header);
        headers.extend_from_slice(&section_header_bytes(
            &self.section_name,
            Self::SECTION_VIRTUAL_ADDRESS,
            section_size_u32,
            Self::SECTION_FILE_OFFSET,
            section_size_u32,
            0x4000_0040,
        ));
        let pe_start = usize::try_from(Self::PE_HEADER_OFFSET).unwrap();
        file[pe_start..pe_start+headers.len()].copy_from_slice(&headers);

        file.extend_from_slice(&self.section_data);
        file.resize(usize::try_from(Self::SECTION_FILE_OFFSET).unwrap() + section_size, 0);

        if let Some((count, strings)) = self.symbols {
            let symbol_bytes = usize::try_from(u64::from(count) * SYMBOL_SIZE).unwrap();
            file.resize(file.len() + symbol_bytes, 0);
            let table_size = u32::try_from(4 + strings.len()).unwrap();
            file.extend_from_slice(&table_size.to_le_bytes());
            file.extend_from_slice(&strings);
        }
        file
    }
}


/// An optional header of the minimum size for `format`, followed by `directories`.
pub(crate) fn optional_header_bytes(format: Format, directories: &[(u32, u32)]) -> Vec<u8> {
    let minimum = usize::from(format.min_header_size());
    let mut data = vec![0u8; minimum];
    data[0..2].copy_from_slice(&format.magic().to_le_bytes());
    data[2] = 14;
    match format {
        Format::Pe32 => data[28..32].copy_from_slice(&0x0040_0000u32.to_le_bytes()),
        Format::Pe32Plus => data[24..32].copy_from_slice(&0x1_4000_0000u64.to_le_bytes()),
    }
    data[32..36].copy_from_slice(&0x1000u32.to_le_bytes());
    data[36..40].copy_from_slice(&0x200u32.to_le_bytes());
    data[68..70].copy_from_slice(&3u16.to_le_bytes());
    let count = u32::try_from(directories.len()).unwrap();
    data[minimum-4..minimum].copy_from_slice(&count.to_le_bytes());
    for &(address, size) in directories {
        let mut entry = [0u8; DATA_DIRECTORY_SIZE];
        entry[0..4].copy_from_slice(&address.to_le_bytes());
        entry[4..8].copy_from_slice(&size.to_le_bytes());
        data.extend_from_slice(&entry);
    }
    data
}

pub(crate) fn section_header_bytes(
    name: &[u8; 8],
    virtual_address: u32,
    virtual_size: u32,
    raw_pointer: u32,
    raw_size: u32,
    characteristics: u32,
) -> [u8; 40] {
    let mut header = [0u8; 40];
    header[0..8].copy_from_slice(name);
    header[8..12].copy_from_slice(&virtual_size.to_le_bytes());
    header[12..16].copy_from_slice(&virtual_address.to_le_bytes());
    header[16..20].copy_from_slice(&raw_size.to_le_bytes());
    header[20..24].copy_from_slice(&raw_pointer.to_le_bytes());
    header[36..40].copy_from_slice(&characteristics.to_le_bytes());
    header
}


pub(crate) fn resource_table_header_bytes(named_count: u16, numbered_count: u16) -> [u8; 16] {
    let mut header = [0u8; 16];
    header[12..14].copy_from_slice(&named_count.to_le_bytes());
    header[14..16].copy_from_slice(&numbered_count.to_le_bytes());
    header
}

pub(crate) fn resource_entry_bytes(key: u32, reference: u32) -> [u8; 8] {
    let mut entry = [0u8; 8];
    entry[0..4].copy_from_slice(&key.to_le_bytes());
    entry[4..8].copy_from_slice(&reference.to_le_bytes());
    entry
}

pub(crate) fn resource_string_bytes(text: &str) -> Vec<u8> {
    let units: Vec<u16> = text.encode_utf16().collect();
    let mut bytes = u16::try_from(units.len()).unwrap().to_le_bytes().to_vec();
    bytes.extend(units.iter().flat_map(|unit| unit.to_le_bytes()));
    bytes
}

pub(crate) fn data_descriptor_bytes(address: u32, size: u32, code_page: u32) -> [u8; 16] {
    let mut descriptor = [0u8; 16];
    descriptor[0..4].copy_from_slice(&address.to_le_bytes());
    descriptor[4..8].copy_from_slice(&size.to_le_bytes());
    descriptor[8..12].copy_from_slice(&code_page.to_le_bytes());
    descriptor
}

/// A resource directory holding `version_data` as the only version resource, with name ID 1 and
/// language 1033, for a section mapped at `section_address`.
pub(crate) fn version_resource(section_address: u32, version_data: &[u8]) -> Vec<u8> {
    const NAMES_TABLE: u32 = 0x18;
    const LANGUAGES_TABLE: u32 = 0x30;
    const DESCRIPTOR: u32 = 0x48;
    const DATA: u32 = 0x58;

    let mut resources = Vec::new();
    resources.extend_from_slice(&resource_table_header_bytes(0, 1));
    resources.extend_from_slice(&resource_entry_bytes(16, 0x8000_0000 | NAMES_TABLE));
    resources.extend_from_slice(&resource_table_header_bytes(0, 1));
    resources.extend_from_slice(&resource_entry_bytes(1, 0x8000_0000 | LANGUAGES_TABLE));
    resources.extend_from_slice(&resource_table_header_bytes(0, 1));
    resources.extend_from_slice(&resource_entry_bytes(1033, DESCRIPTOR));
    let size = u32::try_from(version_data.len()).unwrap();
    resources.extend_from_slice(&data_descriptor_bytes(section_address + DATA, size, 1200));
    assert_eq!(resources.len(), usize::try_from(DATA).unwrap());
    resources.extend_from_slice(version_data);
    resources
}


fn pad_to_4(bytes: &mut Vec<u8>) {
    bytes.resize(bytes.len().next_multiple_of(4), 0);
}

/// A version info node; `value_length` is stored as given, so text values pass code units.
pub(crate) fn version_node(key: &str, value_type: u16, value_length: u16, value: &[u8], children: &[Vec<u8>]) -> Vec<u8> {
    let mut node = vec![0u8; 6];
    node[2..4].copy_from_slice(&value_length.to_le_bytes());
    node[4..6].copy_from_slice(&value_type.to_le_bytes());
    node.extend(key.encode_utf16().flat_map(|unit| unit.to_le_bytes()));
    node.extend_from_slice(&[0, 0]);
    pad_to_4(&mut node);
    node.extend_from_slice(value);
    for child in children {
        pad_to_4(&mut node);
        node.extend_from_slice(child);
    }
    let length = u16::try_from(node.len()).unwrap();
    node[0..2].copy_from_slice(&length.to_le_bytes());
    node
}

/// A text-valued node whose value is `text` with a null terminator.
pub(crate) fn text_node(key: &str, text: &str) -> Vec<u8> {
    let mut value: Vec<u8> = text.encode_utf16().flat_map(|unit| unit.to_le_bytes()).collect();
    value.extend_from_slice(&[0, 0]);
    let units = u16::try_from(value.len() / 2).unwrap();
    version_node(key, 1, units, &value, &[])
}

/// Fixed file info with the given file and product versions, as (most, least) significant words.
pub(crate) fn fixed_file_info_bytes(file_version: (u32, u32), product_version: (u32, u32)) -> [u8; 52] {
    let mut bytes = [0u8; 52];
    bytes[0..4].copy_from_slice(&0xFEEF_04BDu32.to_le_bytes());
    bytes[4..8].copy_from_slice(&0x0001_0000u32.to_le_bytes());
    bytes[8..12].copy_from_slice(&file_version.0.to_le_bytes());
    bytes[12..16].copy_from_slice(&file_version.1.to_le_bytes());
    bytes[16..20].copy_from_slice(&product_version.0.to_le_bytes());
    bytes[20..24].copy_from_slice(&product_version.1.to_le_bytes());
    bytes[24..28].copy_from_slice(&0x3Fu32.to_le_bytes());
    bytes[32..36].copy_from_slice(&0x0004_0004u32.to_le_bytes());
    bytes[36..40].copy_from_slice(&1u32.to_le_bytes());
    bytes
}

/// A complete version resource: file version 3.2.1.0, product version 3.2.0.0, two strings in
/// the table for US English and Unicode, and the matching translation.
pub(crate) fn sample_version_info() -> Vec<u8> {
    let fixed = fixed_file_info_bytes((0x0003_0002, 0x0001_0000), (0x0003_0002, 0x0000_0000));
    let string_table = version_node(
        "040904b0",
        1,
        0,
        b"",
        &[text_node("CompanyName", "Acme Corp"), text_node("FileVersion", "3.2.1.0")],
    );
    let string_file_info = version_node("StringFileInfo", 1, 0, b"", &[string_table]);
    let translation = version_node("Translation", 0, 4, &[0x09, 0x04, 0xB0, 0x04], &[]);
    let var_file_info = version_node("VarFileInfo", 1, 0, b"", &[translation]);
    version_node("VS_VERSION_INFO", 0, 52, &fixed, &[string_file_info, var_file_info])
}
