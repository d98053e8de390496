//! The resource directory: a tree of tables leading from resource types through names to
//! language-specific leaves.
//!
//! [`ResourceReader`] decodes one table per call and never follows references on its own. Code
//! that walks the whole tree should stop descending after [`DEFAULT_MAX_DEPTH`] levels, since a
//! hostile file can make tables refer back to each other.


mod resource_type;
mod table;


use tracing::{debug, trace};

use crate::MAX_STRING_LENGTH;
use crate::data_directory::DirectoryId;
use crate::error::Error;
use crate::image::Image;
use crate::source::{RangeView, ReadAt};
use crate::utf16::decode_utf16le;

pub use crate::resource::resource_type::ResourceType;
pub use crate::resource::table::{
    DATA_DESCRIPTOR_SIZE, DataDescriptor, DataOffset, ENTRY_SIZE, Entry, Reference, ResourceId,
    StringOffset, TABLE_HEADER_SIZE, Table, TableOffset,
};
use crate::resource::table::{RawEntry, TableHeader};


/// Maximum depth recommended for recursive walks of the resource tree.
pub const DEFAULT_MAX_DEPTH: usize = 8;


/// One language-specific resource found by [`ResourceReader::read_leaves`].
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Leaf {
    pub name: ResourceId,
    pub language: ResourceId,
    pub code_page: u32,
    pub data: Vec<u8>,
}


/// Reads tables, names and leaves of an image's resource directory.
///
/// Offsets are relative to the start of the resource directory, and reads cannot leave it.
/// Leaf data is the exception: it is located through the image's section table.
pub struct ResourceReader<'a, S> {
    image: &'a Image<S>,
    view: RangeView<'a, S>,
}
impl<'a, S: ReadAt> ResourceReader<'a, S> {
    pub fn new(image: &'a Image<S>) -> Result<Self, Error> {
        let directory = image.data_directories().get(DirectoryId::ResourceTable);
        if directory.is_zero() {
            return Err(Error::MissingResourceTable);
        }
        debug!("resource directory at {}", directory.location);
        Ok(Self {
            image,
            view: RangeView::new(image.source(), directory.location),
        })
    }

    pub fn image(&self) -> &'a Image<S> { self.image }

    pub fn read_root(&self) -> Result<Table, Error> {
        self.read_table(TableOffset(0))
    }

    /// Reads the table at `offset`, resolving the names of its named entries.
    pub fn read_table(&self, offset: TableOffset) -> Result<Table, Error> {
        let (header, raw_entries) = self.read_raw_entries(offset)?;

        let mut entries = Vec::with_capacity(raw_entries.len());
        for (index, raw_entry) in raw_entries.into_iter().enumerate() {
            let id = if index < usize::from(header.named_count) {
                let name = self.read_string(StringOffset(raw_entry.key))
                    .inspect_err(|e| debug!("name of entry {} in table {} unreadable: {}", index, offset, e))?;
                ResourceId::Name(name)
            } else {
                ResourceId::Number(raw_entry.key)
            };
            entries.push(Entry { id, reference: raw_entry.reference });
        }
        Ok(Table::from(entries))
    }

    /// Returns the table below the first of the root's numbered entries for `resource_type` that
    /// refers to a table, or an empty table if there is none.
    ///
    /// Named root entries are skipped without resolving their names.
    pub fn read_type(&self, resource_type: ResourceType) -> Result<Table, Error> {
        let (header, raw_entries) = self.read_raw_entries(TableOffset(0))?;
        let wanted = resource_type.to_base_type();
        let found = raw_entries
            .iter()
            .skip(usize::from(header.named_count))
            .filter(|raw_entry| raw_entry.key == wanted)
            .find_map(|raw_entry| raw_entry.reference.table());
        match found {
            Some(offset) => self.read_table(offset),
            None => {
                debug!("no table for resource type {}", resource_type);
                Ok(Table::default())
            },
        }
    }

    /// Reads a length-prefixed UTF-16LE string, cut off after [`MAX_STRING_LENGTH`] bytes.
    pub fn read_string(&self, offset: StringOffset) -> Result<String, Error> {
        let mut count_buf = [0u8; 2];
        self.view.read_exact_at(&mut count_buf, offset.0.into())?;
        let unit_count = u16::from_le_bytes(count_buf);

        let byte_count = (usize::from(unit_count) * 2).min(MAX_STRING_LENGTH);
        if byte_count < usize::from(unit_count) * 2 {
            debug!("string at {} has {} code units, truncating to {} bytes", offset, unit_count, byte_count);
        }
        let mut string_buf = vec![0u8; byte_count];
        self.view.read_exact_at(&mut string_buf, u64::from(offset.0) + 2)?;
        Ok(decode_utf16le(&string_buf))
    }

    pub fn read_data_descriptor(&self, offset: DataOffset) -> Result<DataDescriptor, Error> {
        let mut descriptor_buf = [0u8; DATA_DESCRIPTOR_SIZE];
        self.view.read_exact_at(&mut descriptor_buf, offset.0.into())?;
        Ok(DataDescriptor::parse(&descriptor_buf))
    }

    /// Reads the data of the leaf whose descriptor is at `offset`.
    pub fn read_data(&self, offset: DataOffset) -> Result<Vec<u8>, Error> {
        let descriptor = self.read_data_descriptor(offset)?;
        self.read_described_data(offset, &descriptor)
    }

    /// Collects every leaf two levels below the table of `resource_type`, which is where names and
    /// then languages are found in conventional resource trees.
    pub fn read_leaves(&self, resource_type: ResourceType) -> Result<Vec<Leaf>, Error> {
        let mut leaves = Vec::new();
        for name_entry in &self.read_type(resource_type)? {
            let Some(languages_offset) = name_entry.reference.table() else {
                debug!("entry {} of type {} is a leaf, skipping", name_entry.id, resource_type);
                continue;
            };
            for language_entry in &self.read_table(languages_offset)? {
                let Some(data_offset) = language_entry.reference.data() else {
                    debug!("language entry {} of {} is a table, skipping", language_entry.id, name_entry.id);
                    continue;
                };
                let descriptor = self.read_data_descriptor(data_offset)?;
                let data = self.read_described_data(data_offset, &descriptor)?;
                leaves.push(Leaf {
                    name: name_entry.id.clone(),
                    language: language_entry.id.clone(),
                    code_page: descriptor.code_page,
                    data,
                });
            }
        }
        Ok(leaves)
    }

    fn read_described_data(&self, offset: DataOffset, descriptor: &DataDescriptor) -> Result<Vec<u8>, Error> {
        let Some(file_range) = self.image.sections().translate_range(descriptor.range) else {
            return Err(Error::UnmappedResourceData { offset, range: descriptor.range });
        };
        trace!("resource data {} at {} is at {} in the file", offset, descriptor.range, file_range);
        self.image.read_range(file_range)
    }

    fn read_raw_entries(&self, offset: TableOffset) -> Result<(TableHeader, Vec<RawEntry>), Error> {
        let mut header_buf = [0u8; TABLE_HEADER_SIZE];
        self.view.read_exact_at(&mut header_buf, offset.0.into())?;
        let header = TableHeader::parse(&header_buf);
        trace!(
            "table {} has {} named and {} numbered entries",
            offset, header.named_count, header.numbered_count,
        );

        let mut entry_data = vec![0u8; header.entry_count() * ENTRY_SIZE];
        self.view.read_exact_at(&mut entry_data, u64::from(offset.0) + TABLE_HEADER_SIZE as u64)?;
        let raw_entries = entry_data
            .chunks_exact(ENTRY_SIZE)
            .map(RawEntry::parse)
            .collect();
        Ok((header, raw_entries))
    }
}
