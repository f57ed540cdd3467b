// SPDX-License-Identifier: CEPL-1.0
mod common;

use common::{Call, MockBackend};
use ember_render::{build_bundle, destroy_bundle, InvariantViolation, RenderSize};

#[test]
fn per_image_arrays_match_created_image_count_and_extent_is_clamped() {
    let mut backend = MockBackend::new(3);
    {
        let mut s = backend.state.borrow_mut();
        s.caps.min_extent = RenderSize::new(100, 100);
        s.caps.max_extent = RenderSize::new(1000, 1000);
    }

    let cases = [
        (RenderSize::new(800, 600), RenderSize::new(800, 600)),
        (RenderSize::new(1600, 50), RenderSize::new(1000, 100)),
        (RenderSize::new(20, 2000), RenderSize::new(100, 1000)),
        (RenderSize::new(1000, 100), RenderSize::new(1000, 100)),
    ];
    for (requested, expected) in cases {
        let bundle = build_bundle(&mut backend, requested).unwrap();
        assert_eq!(bundle.image_count(), 3);
        assert_eq!(bundle.image_set().count, 3);
        assert_eq!(bundle.requested(), requested);
        assert_eq!(bundle.extent(), expected);
        assert_eq!(bundle.area().scissor.width, expected.width);
        for i in 0..3 {
            assert_eq!(bundle.targets(i).image, i);
            assert!(bundle.targets(i).recorded);
        }
        destroy_bundle(&mut backend, bundle);
    }

    let s = backend.state.borrow();
    assert_eq!(s.live_objects(), 0);
    assert!(s.violations.is_empty(), "{:?}", s.violations);
}

#[test]
fn image_set_is_sized_to_the_minimum_image_count() {
    let mut backend = MockBackend::new(2);
    let bundle = build_bundle(&mut backend, RenderSize::new(640, 480)).unwrap();
    let s = backend.state.borrow();
    assert!(s.calls.contains(&Call::CreateSet {
        id: bundle.image_set().id,
        extent: RenderSize::new(640, 480),
        min_count: 2,
    }));
    drop(s);
    destroy_bundle(&mut backend, bundle);
}

#[test]
fn rebuilding_an_unchanged_surface_gives_an_equivalent_bundle() {
    let mut backend = MockBackend::new(3);
    let size = RenderSize::new(1280, 720);

    let first = build_bundle(&mut backend, size).unwrap();
    let (extent, count, first_id) = (first.extent(), first.image_count(), first.image_set().id);
    destroy_bundle(&mut backend, first);
    assert_eq!(backend.state.borrow().live_objects(), 0);

    let second = build_bundle(&mut backend, size).unwrap();
    assert_eq!(second.extent(), extent);
    assert_eq!(second.image_count(), count);
    assert_ne!(second.image_set().id, first_id);
    destroy_bundle(&mut backend, second);
}

#[test]
fn capabilities_are_queried_on_every_build() {
    let mut backend = MockBackend::new(2);
    let a = build_bundle(&mut backend, RenderSize::new(900, 900)).unwrap();
    assert_eq!(a.extent(), RenderSize::new(900, 900));
    destroy_bundle(&mut backend, a);

    // the window shrank: the surface now caps the extent lower
    backend.state.borrow_mut().caps.max_extent = RenderSize::new(500, 400);
    let b = build_bundle(&mut backend, RenderSize::new(900, 900)).unwrap();
    assert_eq!(b.extent(), RenderSize::new(500, 400));
    destroy_bundle(&mut backend, b);

    assert_eq!(backend.state.borrow().count(|c| *c == Call::QueryCaps), 2);
}

#[test]
fn extra_images_from_the_display_are_an_invariant_violation() {
    let mut backend = MockBackend::new(2);
    backend.state.borrow_mut().actual_image_count = Some(3);

    let err = match build_bundle(&mut backend, RenderSize::new(800, 600)) {
        Ok(_) => panic!("mismatched image count must not build"),
        Err(e) => e,
    };
    assert_eq!(
        err.downcast_ref::<InvariantViolation>(),
        Some(&InvariantViolation::ImageCountMismatch {
            expected: 2,
            actual: 3
        })
    );

    let s = backend.state.borrow();
    assert_eq!(s.live_objects(), 0, "image set must be released on failure");
    assert_eq!(s.count(|c| matches!(c, Call::CreateTargets { .. })), 0);
}

#[test]
fn recording_failure_releases_the_partial_bundle() {
    let mut backend = MockBackend::new(3);
    backend.state.borrow_mut().fail_record_image = Some(1);

    let err = match build_bundle(&mut backend, RenderSize::new(800, 600)) {
        Ok(_) => panic!("recording failure must abort the build"),
        Err(e) => e,
    };
    let msg = format!("{err:#}");
    assert!(msg.contains("presentable image 1"), "{msg}");
    assert!(msg.contains("record image commands"), "{msg}");

    let s = backend.state.borrow();
    assert_eq!(s.live_objects(), 0);
    assert_eq!(s.count(|c| matches!(c, Call::DestroyTargets { .. })), 2);
    assert!(s.violations.is_empty(), "{:?}", s.violations);
    // targets go before the set they belong to
    let last_targets = s
        .calls
        .iter()
        .rposition(|c| matches!(c, Call::DestroyTargets { .. }))
        .unwrap();
    let set_gone = s.position(|c| matches!(c, Call::DestroySet(_))).unwrap();
    assert!(last_targets < set_gone);
}
