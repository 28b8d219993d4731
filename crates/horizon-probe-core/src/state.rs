//! Accessible-object state flags.

bitflags::bitflags! {
    /// Legacy state bits of an accessible object.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct State: u32 {
        const UNAVAILABLE = 0x1;
        const SELECTED = 0x2;
        const FOCUSED = 0x4;
        const PRESSED = 0x8;
        const CHECKED = 0x10;
        const MIXED = 0x20;
        const READONLY = 0x40;
        const HOTTRACKED = 0x80;
        const DEFAULT = 0x100;
        const EXPANDED = 0x200;
        const COLLAPSED = 0x400;
        const BUSY = 0x800;
        const FLOATING = 0x1000;
        const MARQUEED = 0x2000;
        const ANIMATED = 0x4000;
        const INVISIBLE = 0x8000;
        const OFFSCREEN = 0x10000;
        const SIZEABLE = 0x20000;
        const MOVEABLE = 0x40000;
        const SELFVOICING = 0x80000;
        const FOCUSABLE = 0x100000;
        const SELECTABLE = 0x200000;
        const LINKED = 0x400000;
        const TRAVERSED = 0x800000;
        const MULTISELECTABLE = 0x1000000;
        const EXTSELECTABLE = 0x2000000;
        const ALERT_LOW = 0x4000000;
        const ALERT_MEDIUM = 0x8000000;
        const ALERT_HIGH = 0x10000000;
        const PROTECTED = 0x20000000;
        const HASPOPUP = 0x40000000;
    }
}

/// How hidden an object is, as far as tree search is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Visible,
    /// `INVISIBLE` without `OFFSCREEN`. Reliable: the object is really hidden.
    Invisible,
    /// `INVISIBLE` and `OFFSCREEN`. Some frameworks set both on containers
    /// whose children are still visible.
    InvisibleOffscreen,
}

impl State {
    /// Look up a single flag by name, case-insensitively (`"focusable"`,
    /// `"ALERT_HIGH"`).
    pub fn parse_name(name: &str) -> Option<State> {
        Self::all()
            .iter_names()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, flag)| flag)
    }

    /// Classify the `INVISIBLE`/`OFFSCREEN` bits.
    pub fn visibility(self) -> Visibility {
        if !self.contains(State::INVISIBLE) {
            Visibility::Visible
        } else if self.contains(State::OFFSCREEN) {
            Visibility::InvisibleOffscreen
        } else {
            Visibility::Invisible
        }
    }

    /// Whether the object is `INVISIBLE` or `OFFSCREEN`.
    pub fn is_hidden(self) -> bool {
        self.intersects(State::INVISIBLE | State::OFFSCREEN)
    }
}
