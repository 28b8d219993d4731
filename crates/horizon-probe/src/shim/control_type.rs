//! Modern control types mapped to legacy roles.

use horizon_probe_core::{Role, RoleValue};

/// First control type id of the modern backend.
pub const BUTTON: i32 = 50000;
pub const CALENDAR: i32 = 50001;
pub const CHECK_BOX: i32 = 50002;
pub const COMBO_BOX: i32 = 50003;
pub const EDIT: i32 = 50004;
pub const HYPERLINK: i32 = 50005;
pub const IMAGE: i32 = 50006;
pub const LIST_ITEM: i32 = 50007;
pub const LIST: i32 = 50008;
pub const MENU: i32 = 50009;
pub const MENU_BAR: i32 = 50010;
pub const MENU_ITEM: i32 = 50011;
pub const PROGRESS_BAR: i32 = 50012;
pub const RADIO_BUTTON: i32 = 50013;
pub const SCROLL_BAR: i32 = 50014;
pub const SLIDER: i32 = 50015;
pub const SPINNER: i32 = 50016;
pub const STATUS_BAR: i32 = 50017;
pub const TAB: i32 = 50018;
pub const TAB_ITEM: i32 = 50019;
pub const TEXT: i32 = 50020;
pub const TOOL_BAR: i32 = 50021;
pub const TOOL_TIP: i32 = 50022;
pub const TREE: i32 = 50023;
pub const TREE_ITEM: i32 = 50024;
pub const CUSTOM: i32 = 50025;
pub const GROUP: i32 = 50026;
pub const THUMB: i32 = 50027;
pub const DATA_GRID: i32 = 50028;
pub const DATA_ITEM: i32 = 50029;
pub const DOCUMENT: i32 = 50030;
pub const SPLIT_BUTTON: i32 = 50031;
pub const WINDOW: i32 = 50032;
pub const PANE: i32 = 50033;
pub const HEADER: i32 = 50034;
pub const HEADER_ITEM: i32 = 50035;
pub const TABLE: i32 = 50036;
pub const TITLE_BAR: i32 = 50037;
pub const SEPARATOR: i32 = 50038;
pub const SEMANTIC_ZOOM: i32 = 50039;
pub const APP_BAR: i32 = 50040;

/// Indexed by `control_type - BUTTON`. `Err` entries have no legacy role and
/// are reported as custom role strings.
const ROLES: [Result<Role, &str>; 41] = [
    Ok(Role::PUSHBUTTON),
    Err("Calendar"),
    Ok(Role::CHECKBUTTON),
    Ok(Role::COMBOBOX),
    Ok(Role::TEXT),
    Ok(Role::LINK),
    Ok(Role::GRAPHIC),
    Ok(Role::LISTITEM),
    Ok(Role::LIST),
    Ok(Role::MENUPOPUP),
    Ok(Role::MENUBAR),
    Ok(Role::MENUITEM),
    Ok(Role::PROGRESSBAR),
    Ok(Role::RADIOBUTTON),
    Ok(Role::SCROLLBAR),
    Ok(Role::SLIDER),
    Ok(Role::SPINBUTTON),
    Ok(Role::STATUSBAR),
    Ok(Role::PAGETABLIST),
    Ok(Role::PAGETAB),
    Ok(Role::STATICTEXT),
    Ok(Role::TOOLBAR),
    Ok(Role::TOOLTIP),
    Ok(Role::OUTLINE),
    Ok(Role::OUTLINEITEM),
    Ok(Role::CLIENT),
    Ok(Role::GROUPING),
    Ok(Role::INDICATOR),
    Ok(Role::LIST),
    Ok(Role::LISTITEM),
    Ok(Role::DOCUMENT),
    Ok(Role::SPLITBUTTON),
    Ok(Role::WINDOW),
    Ok(Role::PANE),
    Ok(Role::LIST),
    Ok(Role::COLUMNHEADER),
    Ok(Role::TABLE),
    Ok(Role::TITLEBAR),
    Ok(Role::SEPARATOR),
    Err("SemanticZoom"),
    Err("AppBar"),
];

/// The role reported for a control type.
pub fn role_of(control_type: i32) -> RoleValue {
    let entry = control_type
        .checked_sub(BUTTON)
        .and_then(|i| usize::try_from(i).ok())
        .and_then(|i| ROLES.get(i));
    match entry {
        Some(Ok(role)) => (*role).into(),
        Some(Err(name)) => RoleValue::Custom((*name).to_owned()),
        None => RoleValue::Custom("unknown".to_owned()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_edges() {
        assert_eq!(role_of(BUTTON), Role::PUSHBUTTON.into());
        assert_eq!(role_of(SEPARATOR), Role::SEPARATOR.into());
        assert_eq!(role_of(APP_BAR), RoleValue::Custom("AppBar".into()));
        assert_eq!(role_of(APP_BAR + 1), RoleValue::Custom("unknown".into()));
        assert_eq!(role_of(0), RoleValue::Custom("unknown".into()));
    }

    #[test]
    fn test_grid_types_map_to_list_roles() {
        assert_eq!(role_of(DATA_GRID).role(), Role::LIST);
        assert_eq!(role_of(DATA_ITEM).role(), Role::LISTITEM);
        assert_eq!(role_of(HEADER).role(), Role::LIST);
        assert_eq!(role_of(CUSTOM).role(), Role::CLIENT);
        assert_eq!(role_of(CALENDAR).role(), Role::CUSTOM);
    }
}
