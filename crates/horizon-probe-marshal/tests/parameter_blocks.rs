//! Every request kind through a parameter block and back.

use std::collections::HashSet;
use std::fmt::Debug;

use horizon_probe_core::{
    Error, FindFlags, FocusFlags, MarshalSide, MiscFlags, ObjectId, Point, PointFlags,
    SearchScope, SpecialWindow, WindowFlags, WindowHandle,
};
use horizon_probe_marshal::params;
use horizon_probe_marshal::{
    ActionKind, EnableBrowserRequest, FindRequest, FocusedRequest, FromPointRequest,
    FromWindowRequest, GetHtmlRequest, Header, NavigateRequest, Request,
};

/// Marshal `req`, check the shared header and the size, and decode it again.
fn pass<R>(req: &R, window: WindowHandle, target: Option<&[u8]>, seen: &mut HashSet<ActionKind>) -> R
where
    R: Request + PartialEq + Debug,
{
    let misc = MiscFlags::IN_PROC;
    let block = params::marshal(req, window, misc, target);
    assert_eq!(block.len(), params::calc_size(req, target));

    let header = Header::peek(&block).unwrap();
    assert_eq!(header.action, R::ACTION);
    assert_eq!(header.window, window);
    assert_eq!(header.misc, misc);
    assert_eq!(header.target_data(&block).unwrap(), target);
    seen.insert(header.action);

    // a block cut before the end of its first fixed field never decodes
    for cut in 0..Header::SIZE + 4 {
        assert!(
            matches!(
                params::unmarshal::<R>(&block[..cut]),
                Err(Error::Marshal {
                    side: MarshalSide::Server
                })
            ),
            "{:?} cut at {cut}",
            R::ACTION
        );
    }

    params::unmarshal::<R>(&block).unwrap().1
}

fn same<R>(req: R, window: WindowHandle, target: Option<&[u8]>, seen: &mut HashSet<ActionKind>)
where
    R: Request + PartialEq + Debug,
{
    let back = pass(&req, window, target, seen);
    assert_eq!(back, req);
}

#[test]
fn every_action_kind_survives_a_block() {
    let mut seen = HashSet::new();
    let target: &[u8] = &[0xde, 0xad, 0xbe, 0xef, 0];
    let windows = [WindowHandle::NULL, WindowHandle(0x0001_0a2c), WindowHandle(-2)];

    for &w in &windows {
        same(
            FindRequest {
                role: Some("chrome:LINK".into()),
                name: Some("Caf\u{e9} \u{1F600} [a-z]*".into()),
                prop: Some("state=!INVISIBLE\0@data-x=\u{10348}".into()),
                flags: FindFlags::all(),
                scope: SearchScope::all(),
                skip: i32::MIN,
                result_prop: Some('\u{e9}'),
            },
            w,
            Some(target),
            &mut seen,
        );
        same(
            FindRequest {
                role: Some(String::new()),
                name: None,
                prop: Some(String::new()),
                skip: -1,
                ..Default::default()
            },
            w,
            None,
            &mut seen,
        );

        for (elem, path) in [(0, ""), (-1, "parent ne2 fi"), (i32::MAX, "\u{1F600}")] {
            same(NavigateRequest { elem, path: path.into() }, w, Some(target), &mut seen);
        }

        for object_id in [ObjectId::WINDOW, ObjectId::CLIENT, ObjectId::JAVA, ObjectId(i32::MIN)] {
            same(
                FromWindowRequest {
                    object_id,
                    flags: WindowFlags::all(),
                },
                w,
                None,
                &mut seen,
            );
        }

        for special in (0..=6).map(SpecialWindow::from_u8) {
            same(
                FromPointRequest {
                    point: Point::new(i32::MIN, i32::MAX),
                    flags: PointFlags::all(),
                    special,
                },
                w,
                None,
                &mut seen,
            );
        }

        same(FocusedRequest { flags: FocusFlags::all() }, w, None, &mut seen);
        same(FocusedRequest { flags: FocusFlags::empty() }, w, None, &mut seen);

        for what in ["", "'o", "data-\u{1F600}"] {
            same(GetHtmlRequest { what: what.into() }, w, Some(target), &mut seen);
        }

        for (attempt, control) in [(0, WindowHandle::NULL), (-1, WindowHandle(0x77)), (i32::MAX, WindowHandle(-5))] {
            same(EnableBrowserRequest { attempt, control }, w, None, &mut seen);
        }
    }

    assert_eq!(seen.len(), 7);
}

#[test]
fn wide_result_selector_is_dropped() {
    let mut seen = HashSet::new();
    let req = FindRequest {
        result_prop: Some('\u{1F600}'),
        skip: -3,
        ..Default::default()
    };
    let back = pass(&req, WindowHandle(0x10), None, &mut seen);
    assert_eq!(back.result_prop, None);
    assert_eq!(back.skip, -3);
}

#[test]
fn string_cut_short_is_rejected() {
    let req = GetHtmlRequest {
        what: "outerHTML".into(),
    };
    let block = params::marshal(&req, WindowHandle(0x10), MiscFlags::empty(), None);
    // drop the terminator and the last code unit
    let cut = &block[..block.len() - 4];
    assert!(matches!(
        params::unmarshal::<GetHtmlRequest>(cut),
        Err(Error::Marshal {
            side: MarshalSide::Server
        })
    ));
}
