//! Accessibility roles.
//!
//! Legacy backends report a role as a small integer (1 to 0x40); some
//! backends report a descriptive string instead. [`Role`] is the compact
//! one-byte form cached in every [`Ao`](crate::Ao), and [`RoleValue`] is what
//! a backend actually returned.

use std::borrow::Cow;
use std::fmt;

/// A legacy role code as cached in an accessible-object handle.
///
/// `Role::NONE` means "not computed yet", `Role::CUSTOM` means the backend
/// returned a string or a number outside the known range.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Role(pub u8);

impl Role {
    pub const NONE: Role = Role(0);
    pub const TITLEBAR: Role = Role(0x01);
    pub const MENUBAR: Role = Role(0x02);
    pub const SCROLLBAR: Role = Role(0x03);
    pub const GRIP: Role = Role(0x04);
    pub const SOUND: Role = Role(0x05);
    pub const CURSOR: Role = Role(0x06);
    pub const CARET: Role = Role(0x07);
    pub const ALERT: Role = Role(0x08);
    pub const WINDOW: Role = Role(0x09);
    pub const CLIENT: Role = Role(0x0a);
    pub const MENUPOPUP: Role = Role(0x0b);
    pub const MENUITEM: Role = Role(0x0c);
    pub const TOOLTIP: Role = Role(0x0d);
    pub const APPLICATION: Role = Role(0x0e);
    pub const DOCUMENT: Role = Role(0x0f);
    pub const PANE: Role = Role(0x10);
    pub const CHART: Role = Role(0x11);
    pub const DIALOG: Role = Role(0x12);
    pub const BORDER: Role = Role(0x13);
    pub const GROUPING: Role = Role(0x14);
    pub const SEPARATOR: Role = Role(0x15);
    pub const TOOLBAR: Role = Role(0x16);
    pub const STATUSBAR: Role = Role(0x17);
    pub const TABLE: Role = Role(0x18);
    pub const COLUMNHEADER: Role = Role(0x19);
    pub const ROWHEADER: Role = Role(0x1a);
    pub const COLUMN: Role = Role(0x1b);
    pub const ROW: Role = Role(0x1c);
    pub const CELL: Role = Role(0x1d);
    pub const LINK: Role = Role(0x1e);
    pub const HELPBALLOON: Role = Role(0x1f);
    pub const CHARACTER: Role = Role(0x20);
    pub const LIST: Role = Role(0x21);
    pub const LISTITEM: Role = Role(0x22);
    pub const OUTLINE: Role = Role(0x23);
    pub const OUTLINEITEM: Role = Role(0x24);
    pub const PAGETAB: Role = Role(0x25);
    pub const PROPERTYPAGE: Role = Role(0x26);
    pub const INDICATOR: Role = Role(0x27);
    pub const GRAPHIC: Role = Role(0x28);
    pub const STATICTEXT: Role = Role(0x29);
    pub const TEXT: Role = Role(0x2a);
    pub const PUSHBUTTON: Role = Role(0x2b);
    pub const CHECKBUTTON: Role = Role(0x2c);
    pub const RADIOBUTTON: Role = Role(0x2d);
    pub const COMBOBOX: Role = Role(0x2e);
    pub const DROPLIST: Role = Role(0x2f);
    pub const PROGRESSBAR: Role = Role(0x30);
    pub const DIAL: Role = Role(0x31);
    pub const HOTKEYFIELD: Role = Role(0x32);
    pub const SLIDER: Role = Role(0x33);
    pub const SPINBUTTON: Role = Role(0x34);
    pub const DIAGRAM: Role = Role(0x35);
    pub const ANIMATION: Role = Role(0x36);
    pub const EQUATION: Role = Role(0x37);
    pub const BUTTONDROPDOWN: Role = Role(0x38);
    pub const BUTTONMENU: Role = Role(0x39);
    pub const BUTTONDROPDOWNGRID: Role = Role(0x3a);
    pub const WHITESPACE: Role = Role(0x3b);
    pub const PAGETABLIST: Role = Role(0x3c);
    pub const CLOCK: Role = Role(0x3d);
    pub const SPLITBUTTON: Role = Role(0x3e);
    pub const IPADDRESS: Role = Role(0x3f);
    pub const OUTLINEBUTTON: Role = Role(0x40);
    pub const CUSTOM: Role = Role(0xff);

    /// The highest known legacy role code.
    pub const MAX: u8 = 0x40;

    /// The canonical upper-case name, e.g. `"PUSHBUTTON"`.
    pub fn name(self) -> Option<&'static str> {
        match self.0 {
            1..=Self::MAX => Some(NAMES[usize::from(self.0) - 1]),
            _ => None,
        }
    }

    /// Look up a role by its canonical name. Case-sensitive, as role names
    /// are always written upper-case.
    pub fn from_name(name: &str) -> Option<Role> {
        NAMES
            .iter()
            .position(|n| *n == name)
            .map(|i| Role(i as u8 + 1))
    }

    /// Whether the role is set and known.
    pub fn is_known(self) -> bool {
        (1..=Self::MAX).contains(&self.0)
    }

    /// Link and button-like roles, which usually have a meaningful name and
    /// are preferred over their text or image children.
    pub fn is_link_or_button(self) -> bool {
        matches!(
            self,
            Role::LINK
                | Role::PUSHBUTTON
                | Role::BUTTONMENU
                | Role::BUTTONDROPDOWN
                | Role::BUTTONDROPDOWNGRID
                | Role::CHECKBUTTON
                | Role::RADIOBUTTON
        )
    }
}

const NAMES: [&str; Role::MAX as usize] = [
    "TITLEBAR",
    "MENUBAR",
    "SCROLLBAR",
    "GRIP",
    "SOUND",
    "CURSOR",
    "CARET",
    "ALERT",
    "WINDOW",
    "CLIENT",
    "MENUPOPUP",
    "MENUITEM",
    "TOOLTIP",
    "APPLICATION",
    "DOCUMENT",
    "PANE",
    "CHART",
    "DIALOG",
    "BORDER",
    "GROUPING",
    "SEPARATOR",
    "TOOLBAR",
    "STATUSBAR",
    "TABLE",
    "COLUMNHEADER",
    "ROWHEADER",
    "COLUMN",
    "ROW",
    "CELL",
    "LINK",
    "HELPBALLOON",
    "CHARACTER",
    "LIST",
    "LISTITEM",
    "OUTLINE",
    "OUTLINEITEM",
    "PAGETAB",
    "PROPERTYPAGE",
    "INDICATOR",
    "GRAPHIC",
    "STATICTEXT",
    "TEXT",
    "PUSHBUTTON",
    "CHECKBUTTON",
    "RADIOBUTTON",
    "COMBOBOX",
    "DROPLIST",
    "PROGRESSBAR",
    "DIAL",
    "HOTKEYFIELD",
    "SLIDER",
    "SPINBUTTON",
    "DIAGRAM",
    "ANIMATION",
    "EQUATION",
    "BUTTONDROPDOWN",
    "BUTTONMENU",
    "BUTTONDROPDOWNGRID",
    "WHITESPACE",
    "PAGETABLIST",
    "CLOCK",
    "SPLITBUTTON",
    "IPADDRESS",
    "OUTLINEBUTTON",
];

impl fmt::Debug for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "Role({name})"),
            None => write!(f, "Role({:#04x})", self.0),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "{}", self.0),
        }
    }
}

impl TryFrom<String> for Role {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Role::from_name(&value).ok_or_else(|| format!("unknown role name '{value}'"))
    }
}

impl From<Role> for String {
    fn from(role: Role) -> Self {
        role.to_string()
    }
}

/// A role exactly as reported by a backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RoleValue {
    /// A numeric role, usually 1 to [`Role::MAX`].
    Code(u32),
    /// A string role, e.g. an HTML tag name or an unmapped modern control type.
    Custom(String),
}

impl RoleValue {
    /// The one-byte cached form: the code for known roles, otherwise
    /// [`Role::CUSTOM`].
    pub fn role(&self) -> Role {
        match self {
            Self::Code(c) if (1..=u32::from(Role::MAX)).contains(c) => Role(*c as u8),
            _ => Role::CUSTOM,
        }
    }

    /// The role as text: canonical name for known codes, the number for
    /// unknown codes, or the custom string.
    pub fn to_role_string(&self) -> Cow<'_, str> {
        match self {
            Self::Code(c) => match self.role().name() {
                Some(name) => Cow::Borrowed(name),
                None => Cow::Owned(c.to_string()),
            },
            Self::Custom(s) => Cow::Borrowed(s),
        }
    }
}

impl From<Role> for RoleValue {
    fn from(role: Role) -> Self {
        Self::Code(u32::from(role.0))
    }
}

impl fmt::Display for RoleValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_role_string())
    }
}
