use std::fmt;

use from_to_repr::from_to_other;


/// Well-known resource types, as found in the numbered entries of the root table.
#[derive(Clone, Copy, Debug)]
#[from_to_other(base_type = u32, derive_compare = "as_int")]
pub enum ResourceType {
    Cursor = 1,
    Bitmap = 2,
    Icon = 3,
    Menu = 4,
    Dialog = 5,
    StringTable = 6,
    FontDir = 7,
    Font = 8,
    Accelerator = 9,
    RcData = 10,
    MessageTable = 11,
    CursorGroup = 12,
    IconGroup = 14,
    Version = 16,
    DlgInclude = 17,
    PlugAndPlay = 19,
    Vxd = 20,
    AniCursor = 21,
    AniIcon = 22,
    Html = 23,
    Manifest = 24,
    Other(u32),
}
impl ResourceType {
    pub fn name(&self) -> Option<&'static str> {
        let name = match self {
            Self::Cursor => "Cursor",
            Self::Bitmap => "Bitmap",
            Self::Icon => "Icon",
            Self::Menu => "Menu",
            Self::Dialog => "Dialog",
            Self::StringTable => "String",
            Self::FontDir => "FontDir",
            Self::Font => "Font",
            Self::Accelerator => "Accelerator",
            Self::RcData => "RCDATA",
            Self::MessageTable => "MessageTable",
            Self::CursorGroup => "CursorGroup",
            Self::IconGroup => "IconGroup",
            Self::Version => "Version",
            Self::DlgInclude => "DlgInclude",
            Self::PlugAndPlay => "PlugAndPlay",
            Self::Vxd => "VXD",
            Self::AniCursor => "AniCursor",
            Self::AniIcon => "AniIcon",
            Self::Html => "HTML",
            Self::Manifest => "Manifest",
            Self::Other(_) => return None,
        };
        Some(name)
    }
}
impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{} ({})", self.to_base_type(), name),
            None => write!(f, "{}", self.to_base_type()),
        }
    }
}
