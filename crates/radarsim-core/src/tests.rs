use crate::coordinates::*;
use crate::domain_box::*;
use crate::params::*;
use approx::assert_relative_eq;
use glam::Vec3;

#[test]
fn test_spherical_roundtrip() {
    let positions = [
        RadarPosition::new(1_000.0, 0.0, 0.0),
        RadarPosition::new(10_000.0, 45.0, 3.0),
        RadarPosition::new(25_000.0, -120.0, 10.0),
        RadarPosition::new(5_000.0, 179.0, 60.0),
    ];

    for pos in positions {
        let back = RadarPosition::from_cartesian(pos.to_cartesian());
        assert_relative_eq!(pos.range, back.range, max_relative = 1e-5);
        assert_relative_eq!(pos.azimuth, back.azimuth, epsilon = 1e-3);
        assert_relative_eq!(pos.elevation, back.elevation, epsilon = 1e-3);
    }
}

#[test]
fn test_azimuth_convention() {
    // Clockwise from north in an east/north/up frame
    assert_relative_eq!(RadarPosition::from_cartesian(Vec3::Y).azimuth, 0.0);
    assert_relative_eq!(RadarPosition::from_cartesian(Vec3::X).azimuth, 90.0);
    assert_relative_eq!(RadarPosition::from_cartesian(Vec3::Z).elevation, 90.0);
    assert_relative_eq!(wrap_degrees(190.0), -170.0);
    assert_relative_eq!(wrap_degrees(-180.0), -180.0);
}

#[test]
fn test_box_contains_half_open() {
    let b = DomainBox::from_limits(1000.0, 2000.0, 15.0, -12.0, 12.0, 1.0, 0.0, 5.0, 1.0);
    assert!(b.validate().is_ok());
    assert!(b.contains(&RadarPosition::new(1000.0, -12.0, 0.0)));
    assert!(b.contains(&RadarPosition::new(1500.0, 0.0, 2.5)));
    assert!(!b.contains(&RadarPosition::new(2000.0, 0.0, 2.5)));
    assert!(!b.contains(&RadarPosition::new(1500.0, 12.0, 2.5)));
    assert!(!b.contains(&RadarPosition::new(1500.0, 0.0, 5.0)));
    assert!(!b.contains(&RadarPosition::new(999.0, 0.0, 2.5)));
    // 348 degrees is -12
    assert!(b.contains(&RadarPosition::new(1500.0, 348.0, 2.5)));
}

#[test]
fn test_box_wrap_opposite_face() {
    let b = DomainBox::from_limits(1000.0, 2000.0, 15.0, -12.0, 12.0, 1.0, 0.0, 5.0, 1.0);

    let out = RadarPosition::new(2010.0, 13.0, 5.5);
    let back = b.wrap(&out);
    assert!(b.contains(&back));
    assert_relative_eq!(back.range, 1010.0, epsilon = 1e-3);
    assert_relative_eq!(back.azimuth, -11.0, epsilon = 1e-3);
    assert_relative_eq!(back.elevation, 0.5, epsilon = 1e-3);

    let under = b.wrap(&RadarPosition::new(990.0, -13.0, -0.5));
    assert_relative_eq!(under.range, 1990.0, epsilon = 1e-3);
    assert_relative_eq!(under.azimuth, 11.0, epsilon = 1e-3);
    assert_relative_eq!(under.elevation, 4.5, epsilon = 1e-3);

    let inside = RadarPosition::new(1500.0, 3.0, 1.0);
    let same = b.wrap(&inside);
    assert_relative_eq!(same.range, inside.range);
    assert_relative_eq!(same.azimuth, inside.azimuth, epsilon = 1e-4);
    assert_relative_eq!(same.elevation, inside.elevation);
}

#[test]
fn test_box_validation() {
    let flat = DomainBox::from_limits(1000.0, 1000.0, 15.0, -12.0, 12.0, 1.0, 0.0, 5.0, 1.0);
    assert!(flat.validate().is_err());
    let inverted = DomainBox::from_limits(1000.0, 2000.0, 15.0, 12.0, -12.0, 1.0, 0.0, 5.0, 1.0);
    assert!(inverted.validate().is_err());
    let nan = DomainBox::from_limits(1000.0, f32::NAN, 15.0, -12.0, 12.0, 1.0, 0.0, 5.0, 1.0);
    assert!(nan.validate().is_err());
    assert!(DomainBox::default().validate().is_ok());
}

#[test]
fn test_uniform_samples_inside() {
    let b = DomainBox::default();
    let corners = [0.0, 0.25, 0.5, 0.999_999, 1.0];
    for &u0 in &corners {
        for &u1 in &corners {
            for &u2 in &corners {
                let p = b.sample_uniform([u0, u1, u2]);
                assert!(b.contains(&p), "{:?} -> {:?}", (u0, u1, u2), p);
            }
        }
    }
}

#[test]
fn test_suggest_and_gates() {
    let radar = RadarParams::default();
    let b = DomainBox::suggest(&radar, 24, 10_000.0, 1_500.0);
    assert!(b.validate().is_ok());
    assert_relative_eq!(b.origin.azimuth, -12.0);
    assert_relative_eq!(b.size.azimuth, 24.0);
    assert_relative_eq!(b.size.elevation, 12.0);

    let gates = GateSpec::for_box(&b, radar.gate_spacing).unwrap();
    assert_eq!(gates.count, 100);
    assert_relative_eq!(gates.range_start, 10_000.0);

    // 100 x 24 x 12 cells
    assert_relative_eq!(b.resolution_cells(), 28_800.0, max_relative = 1e-6);
}

#[test]
fn test_trim_elevation() {
    let mut b = DomainBox::suggest(&RadarParams::default(), 16, 10_000.0, 2_000.0);
    b.trim_elevation(5.0);
    assert_relative_eq!(b.end().elevation, 5.0);
    assert_relative_eq!(b.size.azimuth, 16.0);

    // Already below the cap
    b.trim_elevation(7.0);
    assert_relative_eq!(b.end().elevation, 5.0);
}

#[test]
fn test_gates_for_deep_box_rejected() {
    let b = DomainBox::from_limits(0.0, 100_000.0, 15.0, -1.0, 1.0, 1.0, 0.0, 1.0, 1.0);
    assert!(GateSpec::for_box(&b, 15.0).is_err());
}
