//! The self-describing tree of a version resource.
//!
//! Every node starts with its own length, the length and type of its value, and a
//! null-terminated UTF-16 key. The value and the children follow, each aligned to four bytes
//! relative to the start of the node. Nodes borrow the buffer they were parsed from.


mod fixed;


use std::fmt;
use std::iter::FusedIterator;

use from_to_repr::from_to_other;
use tracing::debug;

use crate::error::{Error, FormatError};
use crate::le_int::read_le;
use crate::utf16::{decode_utf16le, find_null_terminator};

pub use crate::version_info::fixed::{FIXED_FILE_INFO_SIZE, FileFlags, FixedFileInfo, FixedVersion, SIGNATURE};


pub const ROOT_KEY: &str = "VS_VERSION_INFO";
pub const STRING_FILE_INFO_KEY: &str = "StringFileInfo";
pub const VAR_FILE_INFO_KEY: &str = "VarFileInfo";
pub const TRANSLATION_KEY: &str = "Translation";

const KEY_OFFSET: usize = 6;
const MIN_NODE_SIZE: usize = 8;


fn align4(offset: usize) -> usize {
    (offset + 3) & !3
}


#[derive(Clone, Copy, Debug)]
#[from_to_other(base_type = u16, derive_compare = "as_int")]
pub enum ValueType {
    Binary = 0,

    /// The declared value length counts UTF-16 code units, not bytes.
    Text = 1,

    Other(u16),
}


#[derive(Clone, Copy, Debug)]
pub struct Node<'a> {
    data: &'a [u8],
    key_length: usize,
}
impl<'a> Node<'a> {
    /// Parses the node at the start of `data`; anything after the node's own length is ignored.
    pub fn parse(data: &'a [u8]) -> Result<Self, Error> {
        if data.len() < MIN_NODE_SIZE {
            return Err(FormatError::VersionInfoTooShort { length: data.len() }.into());
        }
        let declared_length = usize::from(read_le::<u16>(data, 0));
        let data = if data.len() > declared_length { &data[..declared_length] } else { data };
        if data.len() < MIN_NODE_SIZE {
            return Err(FormatError::VersionInfoTooShort { length: data.len() }.into());
        }

        let Some(key_length) = find_null_terminator(&data[KEY_OFFSET..]) else {
            return Err(FormatError::UnterminatedVersionInfoKey.into());
        };
        Ok(Self { data, key_length })
    }

    /// The length of the node in bytes, after truncation to its declared length.
    pub fn length(&self) -> usize { self.data.len() }

    pub fn as_bytes(&self) -> &'a [u8] { self.data }

    pub fn key(&self) -> String {
        decode_utf16le(&self.data[KEY_OFFSET..KEY_OFFSET+self.key_length])
    }

    pub fn value_type(&self) -> ValueType {
        ValueType::from_base_type(read_le(self.data, 4))
    }

    /// The value length as stored; for text values, this counts code units.
    pub fn declared_value_length(&self) -> u16 {
        read_le(self.data, 2)
    }

    fn value_byte_length(&self) -> usize {
        let declared = usize::from(self.declared_value_length());
        if self.value_type() == ValueType::Text {
            declared * 2
        } else {
            declared
        }
    }

    fn value_start(&self) -> usize {
        align4(KEY_OFFSET + self.key_length + 2)
    }

    /// The value of the node, or `None` if its length is zero.
    ///
    /// A value that claims to extend past the end of the node is cut off at the end of the node.
    pub fn value(&self) -> Option<Value<'a>> {
        let byte_length = self.value_byte_length();
        if byte_length == 0 {
            return None;
        }
        let start = self.value_start().min(self.data.len());
        let end = (start + byte_length).min(self.data.len());
        if end - start < byte_length {
            debug!(
                "value of {:?} claims {} bytes, clamping to {}",
                self.key(), byte_length, end - start,
            );
        }
        Some(Value {
            value_type: self.value_type(),
            data: &self.data[start..end],
        })
    }

    pub fn children(&self) -> Children<'a> {
        Children {
            data: self.data,
            offset: align4(self.value_start() + self.value_byte_length()),
            failed: false,
        }
    }

    /// The first child with the given key. Children before it must be well-formed.
    pub fn child(&self, key: &str) -> Result<Option<Node<'a>>, Error> {
        for child in self.children() {
            let child = child?;
            if child.key() == key {
                return Ok(Some(child));
            }
        }
        Ok(None)
    }
}


#[derive(Clone, Copy, Debug)]
pub struct Value<'a> {
    value_type: ValueType,
    data: &'a [u8],
}
impl<'a> Value<'a> {
    pub fn value_type(&self) -> ValueType { self.value_type }
    pub fn as_bytes(&self) -> &'a [u8] { self.data }

    /// Decodes a text value up to its null terminator. Binary values yield `None`.
    pub fn to_text(&self) -> Option<String> {
        if self.value_type != ValueType::Text {
            return None;
        }
        let text_bytes = match find_null_terminator(self.data) {
            Some(nul_index) => &self.data[..nul_index],
            None => self.data,
        };
        Some(decode_utf16le(text_bytes))
    }
}


/// The children of a node, parsed one at a time.
///
/// A malformed child is yielded as an error and ends the iteration.
#[derive(Clone, Debug)]
pub struct Children<'a> {
    data: &'a [u8],
    offset: usize,
    failed: bool,
}
impl<'a> Iterator for Children<'a> {
    type Item = Result<Node<'a>, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.offset >= self.data.len() {
            return None;
        }
        match Node::parse(&self.data[self.offset..]) {
            Ok(node) => {
                self.offset = align4(self.offset + node.length());
                Some(Ok(node))
            },
            Err(e) => {
                debug!("malformed version info node at offset {}: {}", self.offset, e);
                self.failed = true;
                Some(Err(e))
            },
        }
    }
}
impl<'a> FusedIterator for Children<'a> {}


/// A string from a `StringFileInfo` table.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct StringEntry {
    /// Key of the containing table: language and code page as eight hex digits.
    pub table: String,
    pub key: String,
    pub value: String,
}


#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Translation {
    pub language: u16,
    pub code_page: u16,
}
impl fmt::Display for Translation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04x}{:04x}", self.language, self.code_page)
    }
}


/// The root node of a version resource.
#[derive(Clone, Copy, Debug)]
pub struct VersionInfo<'a> {
    root: Node<'a>,
}
impl<'a> VersionInfo<'a> {
    pub fn parse(data: &'a [u8]) -> Result<Self, Error> {
        let root = Node::parse(data)?;
        let key = root.key();
        if key != ROOT_KEY {
            debug!("version info root key is {:?}, expected {:?}", key, ROOT_KEY);
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> Node<'a> { self.root }
    pub fn key(&self) -> String { self.root.key() }
    pub fn children(&self) -> Children<'a> { self.root.children() }

    pub fn fixed_file_info(&self) -> Result<FixedFileInfo, Error> {
        let value = self.root.value().map(|v| v.as_bytes()).unwrap_or_default();
        FixedFileInfo::parse(value)
    }

    /// All strings of all `StringFileInfo` tables, in file order.
    pub fn strings(&self) -> Result<Vec<StringEntry>, Error> {
        let mut entries = Vec::new();
        for child in self.children() {
            let child = child?;
            if child.key() != STRING_FILE_INFO_KEY {
                continue;
            }
            for table in child.children() {
                let table = table?;
                let table_key = table.key();
                for string in table.children() {
                    let string = string?;
                    entries.push(StringEntry {
                        table: table_key.clone(),
                        key: string.key(),
                        value: string.value().and_then(|v| v.to_text()).unwrap_or_default(),
                    });
                }
            }
        }
        Ok(entries)
    }

    /// The language and code page pairs listed under `VarFileInfo`.
    pub fn translations(&self) -> Result<Vec<Translation>, Error> {
        let mut translations = Vec::new();
        for child in self.children() {
            let child = child?;
            if child.key() != VAR_FILE_INFO_KEY {
                continue;
            }
            let Some(var) = child.child(TRANSLATION_KEY)? else {
                continue;
            };
            let Some(value) = var.value() else {
                continue;
            };
            for pair in value.as_bytes().chunks_exact(4) {
                translations.push(Translation {
                    language: read_le(pair, 0),
                    code_page: read_le(pair, 2),
                });
            }
        }
        Ok(translations)
    }
}
