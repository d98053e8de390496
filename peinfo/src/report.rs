//! Collects everything printable about an image into one serializable value.
//!
//! Failures below the image headers are recorded next to the item they concern, so one broken
//! resource does not hide the rest.


use std::collections::HashSet;
use std::path::Path;

use peimage::{Error, Image, ReadAt};
use peimage::address::{FileRange, VirtualRange};
use peimage::layout::Characteristics;
use peimage::optional_header::DllCharacteristics;
use peimage::resource::{DataOffset, Reference, ResourceId, ResourceReader, ResourceType, TableOffset};
use peimage::section::SectionCharacteristics;
use peimage::version_info::{FixedFileInfo, Node, Translation, ValueType, VersionInfo};
use serde::Serialize;
use tracing::debug;


#[derive(Clone, Debug, Serialize)]
pub struct Report {
    pub path: String,
    pub machine: String,
    pub format: String,
    pub subsystem: String,
    pub time_date_stamp: u32,
    pub characteristics: Characteristics,
    pub dll_characteristics: DllCharacteristics,
    pub entry_point: String,
    pub image_base: u64,
    pub symbol_count: u32,
    pub symbol_table: FileRange,
    pub string_table: FileRange,
    pub section_table: FileRange,
    pub sections: Vec<SectionReport>,
    pub data_directories: Vec<DirectoryReport>,

    /// `None` if the image has no resource directory.
    pub resources: Option<Vec<ResourceNode>>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub resource_errors: Vec<String>,

    pub versions: Vec<VersionReport>,
}

#[derive(Clone, Debug, Serialize)]
pub struct SectionReport {
    pub name: String,
    pub virtual_range: VirtualRange,
    pub file_range: FileRange,
    pub characteristics: SectionCharacteristics,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct DirectoryReport {
    pub name: String,

    /// `None` if the directory is absent.
    pub location: Option<FileRange>,
}

#[derive(Clone, Debug, Serialize)]
pub struct ResourceNode {
    pub id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub leaf: Option<LeafReport>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ResourceNode>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct LeafReport {
    pub descriptor: DataOffset,
    pub range: VirtualRange,
    pub code_page: u32,
}

#[derive(Clone, Debug, Serialize)]
pub struct VersionReport {
    pub name: String,
    pub language: String,
    pub size: usize,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub fixed_file_info: Option<FixedFileInfo>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_version: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_version: Option<String>,

    pub translations: Vec<String>,
    pub tree: Vec<VersionNode>,
    pub errors: Vec<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct VersionNode {
    pub key: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub binary: Option<String>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<VersionNode>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}


impl Report {
    pub fn collect<S: ReadAt>(path: &Path, image: &Image<S>, max_depth: usize) -> Self {
        let layout = image.layout();
        let optional_header = image.optional_header();

        let sections = image.sections()
            .iter()
            .map(|section| {
                let (name, error) = match image.section_name(section) {
                    Ok(name) => (name, None),
                    Err(e) => (section.name.to_string(), Some(e.to_string())),
                };
                SectionReport {
                    name,
                    virtual_range: section.virtual_range,
                    file_range: section.file_range,
                    characteristics: section.characteristics,
                    error,
                }
            })
            .collect();

        let data_directories = image.data_directories()
            .iter()
            .map(|(id, directory)| DirectoryReport {
                name: id.to_string(),
                location: (!directory.is_zero()).then_some(directory.location),
            })
            .collect();

        let mut report = Self {
            path: path.display().to_string(),
            machine: image.machine().to_string(),
            format: image.format().to_string(),
            subsystem: image.subsystem().to_string(),
            time_date_stamp: image.file_header().time_date_stamp,
            characteristics: image.file_header().characteristics,
            dll_characteristics: optional_header.dll_characteristics,
            entry_point: optional_header.entry_point.to_string(),
            image_base: optional_header.image_base,
            symbol_count: layout.number_of_symbols,
            symbol_table: layout.symbol_table(),
            string_table: layout.string_table(),
            section_table: layout.section_table(),
            sections,
            data_directories,
            resources: None,
            resource_errors: Vec::new(),
            versions: Vec::new(),
        };

        match ResourceReader::new(image) {
            Ok(reader) => {
                let mut visited = HashSet::from([TableOffset(0)]);
                match walk_table(&reader, TableOffset(0), 0, max_depth, &mut visited) {
                    Ok(nodes) => report.resources = Some(nodes),
                    Err(e) => report.resource_errors.push(e.to_string()),
                }
                match collect_versions(&reader, max_depth) {
                    Ok(versions) => report.versions = versions,
                    Err(e) => report.resource_errors.push(e.to_string()),
                }
            },
            Err(Error::MissingResourceTable) => {},
            Err(e) => report.resource_errors.push(e.to_string()),
        }

        report
    }
}


/// Lists the table at `offset` and everything below it.
///
/// Each table is listed at most once; `visited` holds every table entered so far, so a table that
/// is referenced again (including from below itself) is recorded as an error instead.
fn walk_table<S: ReadAt>(
    reader: &ResourceReader<'_, S>,
    offset: TableOffset,
    depth: usize,
    max_depth: usize,
    visited: &mut HashSet<TableOffset>,
) -> Result<Vec<ResourceNode>, Error> {
    let table = reader.read_table(offset)?;
    let mut nodes = Vec::with_capacity(table.len());
    for entry in &table {
        let id = match (depth, &entry.id) {
            (0, ResourceId::Number(number)) => ResourceType::from_base_type(*number).to_string(),
            (_, other) => other.to_string(),
        };
        let mut node = ResourceNode {
            id,
            leaf: None,
            children: Vec::new(),
            error: None,
        };
        match entry.reference {
            Reference::Table(child_offset) if depth + 1 >= max_depth => {
                debug!("not descending into table {} at depth {}", child_offset, depth + 1);
                node.error = Some(format!("maximum depth of {} reached", max_depth));
            },
            Reference::Table(child_offset) if !visited.insert(child_offset) => {
                debug!("table {} is referenced more than once", child_offset);
                node.error = Some(format!("table at {} is already listed", child_offset));
            },
            Reference::Table(child_offset) => {
                match walk_table(reader, child_offset, depth + 1, max_depth, visited) {
                    Ok(children) => node.children = children,
                    Err(e) => node.error = Some(e.to_string()),
                }
            },
            Reference::Data(data_offset) => {
                match reader.read_data_descriptor(data_offset) {
                    Ok(descriptor) => node.leaf = Some(LeafReport {
                        descriptor: data_offset,
                        range: descriptor.range,
                        code_page: descriptor.code_page,
                    }),
                    Err(e) => node.error = Some(e.to_string()),
                }
            },
        }
        nodes.push(node);
    }
    Ok(nodes)
}


fn collect_versions<S: ReadAt>(reader: &ResourceReader<'_, S>, max_depth: usize) -> Result<Vec<VersionReport>, Error> {
    let mut versions = Vec::new();
    for name_entry in &reader.read_type(ResourceType::Version)? {
        let Some(languages_offset) = name_entry.reference.table() else {
            continue;
        };
        let languages = match reader.read_table(languages_offset) {
            Ok(languages) => languages,
            Err(e) => {
                versions.push(VersionReport::failed(&name_entry.id, None, e));
                continue;
            },
        };
        for language_entry in &languages {
            let Some(data_offset) = language_entry.reference.data() else {
                continue;
            };
            let report = match reader.read_data(data_offset) {
                Ok(data) => VersionReport::decode(&name_entry.id, &language_entry.id, &data, max_depth),
                Err(e) => VersionReport::failed(&name_entry.id, Some(&language_entry.id), e),
            };
            versions.push(report);
        }
    }
    Ok(versions)
}


impl VersionReport {
    fn empty(name: &ResourceId, language: Option<&ResourceId>, size: usize) -> Self {
        Self {
            name: name.to_string(),
            language: language.map(|l| l.to_string()).unwrap_or_default(),
            size,
            key: None,
            fixed_file_info: None,
            file_version: None,
            product_version: None,
            translations: Vec::new(),
            tree: Vec::new(),
            errors: Vec::new(),
        }
    }

    fn failed(name: &ResourceId, language: Option<&ResourceId>, error: Error) -> Self {
        let mut report = Self::empty(name, language, 0);
        report.errors.push(error.to_string());
        report
    }

    fn decode(name: &ResourceId, language: &ResourceId, data: &[u8], max_depth: usize) -> Self {
        let mut report = Self::empty(name, Some(language), data.len());
        let info = match VersionInfo::parse(data) {
            Ok(info) => info,
            Err(e) => {
                report.errors.push(e.to_string());
                return report;
            },
        };
        report.key = Some(info.key());

        match info.fixed_file_info() {
            Ok(fixed) => {
                report.file_version = Some(fixed.file_version.to_string());
                report.product_version = Some(fixed.product_version.to_string());
                report.fixed_file_info = Some(fixed);
            },
            Err(e) => report.errors.push(e.to_string()),
        }
        match info.translations() {
            Ok(translations) => report.translations = translations.iter().map(Translation::to_string).collect(),
            Err(e) => report.errors.push(e.to_string()),
        }
        report.tree = describe_children(info.root(), 1, max_depth);
        report
    }
}


fn describe_children(node: Node<'_>, depth: usize, max_depth: usize) -> Vec<VersionNode> {
    let mut described = Vec::new();
    for child in node.children() {
        let child = match child {
            Ok(child) => child,
            Err(e) => {
                described.push(VersionNode {
                    key: String::new(),
                    text: None,
                    binary: None,
                    children: Vec::new(),
                    error: Some(e.to_string()),
                });
                break;
            },
        };

        let value = child.value();
        let text = value.and_then(|v| v.to_text());
        let binary = value
            .filter(|v| v.value_type() != ValueType::Text)
            .map(|v| hex_bytes(v.as_bytes()));
        let (children, error) = if depth + 1 >= max_depth {
            (Vec::new(), child.children().next().map(|_| format!("maximum depth of {} reached", max_depth)))
        } else {
            (describe_children(child, depth + 1, max_depth), None)
        };
        described.push(VersionNode {
            key: child.key(),
            text,
            binary,
            children,
            error,
        });
    }
    described
}


fn hex_bytes(bytes: &[u8]) -> String {
    let mut hex = String::with_capacity(bytes.len() * 3);
    for (index, b) in bytes.iter().enumerate() {
        if index > 0 {
            hex.push(' ');
        }
        hex.push_str(&format!("{:02x}", b));
    }
    hex
}


#[cfg(test)]
mod tests {
    use std::path::Path;

    use peimage::Image;
    use peimage::resource::DEFAULT_MAX_DEPTH;

    use super::{Report, ResourceNode, hex_bytes};

    const SECTION_VIRTUAL_ADDRESS: u32 = 0x1000;
    const SECTION_FILE_OFFSET: usize = 0x400;
    const SECTION_SIZE: usize = 0x200;

    /// A PE32 image with one section holding `resources`, which the resource directory covers.
    fn image_with_resources(resources: &[u8]) -> Vec<u8> {
        assert!(resources.len() <= SECTION_SIZE);
        let mut file = vec![0u8; SECTION_FILE_OFFSET + SECTION_SIZE];
        file[0..2].copy_from_slice(b"MZ");
        file[0x3C..0x40].copy_from_slice(&0x40u32.to_le_bytes());

        file[0x40..0x44].copy_from_slice(b"PE\0\0");
        file[0x44..0x46].copy_from_slice(&0x014Cu16.to_le_bytes());
        file[0x46..0x48].copy_from_slice(&1u16.to_le_bytes());
        file[0x54..0x56].copy_from_slice(&224u16.to_le_bytes());
        file[0x56..0x58].copy_from_slice(&0x0102u16.to_le_bytes());

        let optional = 0x58;
        file[optional..optional+2].copy_from_slice(&0x010Bu16.to_le_bytes());
        file[optional+68..optional+70].copy_from_slice(&3u16.to_le_bytes());
        file[optional+92..optional+96].copy_from_slice(&16u32.to_le_bytes());
        let resource_slot = optional + 96 + 2 * 8;
        file[resource_slot..resource_slot+4].copy_from_slice(&SECTION_VIRTUAL_ADDRESS.to_le_bytes());
        file[resource_slot+4..resource_slot+8].copy_from_slice(&u32::try_from(resources.len()).unwrap().to_le_bytes());

        let section = optional + 224;
        let section_size = u32::try_from(SECTION_SIZE).unwrap();
        file[section..section+5].copy_from_slice(b".rsrc");
        file[section+8..section+12].copy_from_slice(&section_size.to_le_bytes());
        file[section+12..section+16].copy_from_slice(&SECTION_VIRTUAL_ADDRESS.to_le_bytes());
        file[section+16..section+20].copy_from_slice(&section_size.to_le_bytes());
        file[section+20..section+24].copy_from_slice(&u32::try_from(SECTION_FILE_OFFSET).unwrap().to_le_bytes());
        file[section+36..section+40].copy_from_slice(&0x4000_0040u32.to_le_bytes());

        file[SECTION_FILE_OFFSET..SECTION_FILE_OFFSET+resources.len()].copy_from_slice(resources);
        file
    }

    fn table(entries: &[(u32, u32)]) -> Vec<u8> {
        let mut bytes = vec![0u8; 16];
        bytes[14..16].copy_from_slice(&u16::try_from(entries.len()).unwrap().to_le_bytes());
        for &(key, reference) in entries {
            bytes.extend_from_slice(&key.to_le_bytes());
            bytes.extend_from_slice(&reference.to_le_bytes());
        }
        bytes
    }

    fn count_nodes(nodes: &[ResourceNode]) -> usize {
        nodes.iter().map(|node| 1 + count_nodes(&node.children)).sum()
    }

    #[test]
    fn test_self_referencing_root_is_listed_once() {
        let entries: Vec<(u32, u32)> = (1..=16).map(|key| (key, 0x8000_0000)).collect();
        let image = Image::open(image_with_resources(&table(&entries))).unwrap();
        let report = Report::collect(Path::new("loop.exe"), &image, DEFAULT_MAX_DEPTH);

        let resources = report.resources.unwrap();
        assert_eq!(count_nodes(&resources), 16);
        for node in &resources {
            assert!(node.children.is_empty());
            assert_eq!(node.error.as_deref(), Some("table at 0x0 is already listed"));
        }
    }

    #[test]
    fn test_shared_subtable_is_listed_once() {
        // two types share the name table at 0x20, which refers back to itself
        let mut resources = table(&[(3, 0x8000_0020), (14, 0x8000_0020)]);
        resources.resize(0x20, 0);
        resources.extend_from_slice(&table(&[(1, 0x8000_0020), (2, 0x8000_0020)]));
        let image = Image::open(image_with_resources(&resources)).unwrap();
        let report = Report::collect(Path::new("shared.exe"), &image, DEFAULT_MAX_DEPTH);

        let resources = report.resources.unwrap();
        assert_eq!(resources[0].children.len(), 2);
        assert!(resources[0].children.iter().all(|node| node.error.is_some()));
        assert!(resources[1].children.is_empty());
        assert_eq!(resources[1].error.as_deref(), Some("table at 0x20 is already listed"));
        assert_eq!(count_nodes(&resources), 4);
    }

    #[test]
    fn test_resource_errors_accumulate() {
        // the root claims more entries than the directory holds
        let mut resources = table(&[]);
        resources[14..16].copy_from_slice(&4u16.to_le_bytes());
        let image = Image::open(image_with_resources(&resources)).unwrap();
        let report = Report::collect(Path::new("short.exe"), &image, DEFAULT_MAX_DEPTH);

        assert!(report.resources.is_none());
        assert_eq!(report.resource_errors.len(), 2);
        assert!(report.versions.is_empty());
    }

    #[test]
    fn test_hex_bytes() {
        assert_eq!(hex_bytes(&[]), "");
        assert_eq!(hex_bytes(&[0x09, 0x04, 0xB0, 0x04]), "09 04 b0 04");
    }
}
