mod common;

use std::io::Cursor;

use common::{Orientation, nifti_bytes, volume, volume_with_geometry};
use segmentation_viewer::{
    Geometry, PayloadKind, PixelType, SegmentationError, VolumeLoader, VolumeRole,
    build_base_payload, build_diff_payload, build_overlay_payload, overlay::label_opacities,
};
use serde_json::json;

fn ramp(n: usize, scale: f64) -> Vec<f64> {
    (0..n).map(|i| (i as f64 * scale) % 17.0).collect()
}

#[test]
fn base_payload_length_matches_shape() {
    for shape in [vec![4, 3, 2], vec![1, 5, 7], vec![6, 6]] {
        let n = shape.iter().product();
        let payload = build_base_payload(volume(&shape, ramp(n, 1.0)));
        let flattened: usize = payload.data.rows().iter().map(Vec::len).sum();
        assert_eq!(flattened, payload.shape.iter().product::<usize>());
        assert_eq!(payload.data.rows().len(), shape[0]);
    }
}

#[test]
fn difference_is_symmetric() {
    let a = volume(&[3, 2, 2], ramp(12, 3.0));
    let b = volume(&[3, 2, 2], ramp(12, 5.0));
    let ab = build_diff_payload(&a, &b).unwrap();
    let ba = build_diff_payload(&b, &a).unwrap();
    assert_eq!(ab.data.values(), ba.data.values());
    assert!(ab.data.values().iter().all(|v| *v >= 0.0));
}

#[test]
fn difference_with_itself_is_zero() {
    let a = volume(&[2, 3, 4], ramp(24, 7.0));
    let payload = build_diff_payload(&a, &a).unwrap();
    assert_eq!(payload.shape, vec![4, 3, 2]);
    assert!(payload.data.values().iter().all(|v| *v == 0.0));
}

#[test]
fn mismatched_shapes_fail_for_overlay_and_difference() {
    let a = volume(&[2, 2, 2], vec![1.0; 8]);
    let b = volume(&[2, 2, 3], vec![1.0; 12]);

    let overlay = build_overlay_payload(&a, b.clone()).unwrap_err();
    assert!(matches!(
        overlay,
        SegmentationError::ShapeMismatch {
            left: VolumeRole::BaseImage,
            right: VolumeRole::Segmentation,
            ..
        }
    ));

    let diff = build_diff_payload(&a, &b).unwrap_err();
    match diff {
        SegmentationError::ShapeMismatch {
            left_shape,
            right_shape,
            ..
        } => {
            assert_eq!(left_shape, vec![2, 2, 2]);
            assert_eq!(right_shape, vec![3, 2, 2]);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn three_labels_with_background_get_stepped_opacity() {
    let seg = volume(&[2, 2, 2], vec![0.0, 1.0, 2.0, 3.0, 0.0, 3.0, 2.0, 1.0]);
    let alphas: Vec<f64> = label_opacities(seg.data()).iter().map(|o| o.alpha).collect();
    let expected = [0.40, 0.45, 0.50];
    assert_eq!(alphas.len(), expected.len());
    for (alpha, want) in alphas.iter().zip(expected) {
        assert!((alpha - want).abs() < 1e-9, "{alpha} != {want}");
    }
}

#[test]
fn overlay_payload_carries_segmentation_in_base_space() {
    let base_geometry = Geometry {
        spacing: vec![0.8, 0.8, 2.5],
        origin: vec![-120.0, -90.0, 35.0],
        direction: vec![1.0, 0.0, 0.0, 0.0, -1.0, 0.0, 0.0, 0.0, 1.0],
    };
    let base = volume_with_geometry(
        &[2, 2, 2],
        vec![10.0, 20.0, 30.0, 40.0, 50.0, 60.0, 70.0, 80.0],
        base_geometry,
    );
    let seg = volume_with_geometry(
        &[2, 2, 2],
        vec![5.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
        Geometry::identity(3),
    );

    let payload = build_overlay_payload(&base, seg).unwrap();
    assert_eq!(payload.kind, Some(PayloadKind::SegmentationOverlay));

    let value = serde_json::to_value(&payload).unwrap();
    assert_eq!(
        value,
        json!({
            "shape": [2, 2, 2],
            "spacing": [0.8, 0.8, 2.5],
            "origin": [-120.0, -90.0, 35.0],
            "direction": [1.0, 0.0, 0.0, 0.0, -1.0, 0.0, 0.0, 0.0, 1.0],
            "data": [[5, 0, 0, 0], [0, 0, 0, 0]],
            "type": "segmentation_overlay"
        })
    );
}

#[test]
fn text_is_never_decodable() {
    let text = "patient notes, definitely not voxels\n".repeat(20);
    for name in ["notes.nii", "notes.nii.gz", "notes.dcm", "notes.png", "notes.txt"] {
        assert!(!VolumeLoader::is_decodable(Cursor::new(text.as_bytes()), name), "{name}");
    }
}

#[test]
fn nifti_volume_decodes_with_sform_geometry() {
    // x fastest: two slices of 3 x 2
    let samples: Vec<f32> = (0..12).map(|v| v as f32).collect();
    let sform = [
        [-2.0, 0.0, 0.0, 10.0],
        [0.0, -2.0, 0.0, 20.0],
        [0.0, 0.0, 3.0, -5.0],
    ];
    let bytes = nifti_bytes([3, 2, 2], [2.0, 2.0, 3.0], Orientation::Sform(sform), &samples);

    let volume = VolumeLoader::decode(Cursor::new(bytes), "scan.nii").unwrap();
    assert_eq!(volume.size(), vec![3, 2, 2]);
    assert_eq!(volume.pixel_type(), PixelType::Float32);
    assert_eq!(volume.spacing(), &[2.0, 2.0, 3.0]);
    assert_eq!(volume.origin(), &[-10.0, -20.0, -5.0]);
    assert_eq!(
        volume.direction(),
        &[1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0]
    );

    let payload = build_base_payload(volume);
    assert_eq!(
        payload.data.rows(),
        vec![
            vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0],
            vec![6.0, 7.0, 8.0, 9.0, 10.0, 11.0],
        ]
    );
}

#[test]
fn gzipped_nifti_without_orientation_uses_identity() {
    use flate2::{Compression, write::GzEncoder};
    use std::io::Write;

    let samples = vec![1.0f32; 8];
    let raw = nifti_bytes([2, 2, 2], [1.5, 1.5, 1.5], Orientation::Unset, &samples);
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&raw).unwrap();
    let bytes = encoder.finish().unwrap();

    let volume = VolumeLoader::decode(Cursor::new(bytes), "scan.nii.gz").unwrap();
    assert_eq!(volume.size(), vec![2, 2, 2]);
    assert_eq!(volume.spacing(), &[1.5, 1.5, 1.5]);
    assert_eq!(volume.origin(), &[0.0, 0.0, 0.0]);
    assert_eq!(volume.geometry(), &Geometry {
        spacing: vec![1.5, 1.5, 1.5],
        origin: vec![0.0; 3],
        direction: vec![1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0],
    });
}

#[test]
fn nifti_qform_is_used_without_sform() {
    let qform = Orientation::Qform {
        quatern: [0.0, 0.0, 0.0],
        offset: [10.0, 20.0, 30.0],
        qfac: 1.0,
    };
    let bytes = nifti_bytes([2, 2, 2], [1.0, 1.0, 2.0], qform, &[0.0; 8]);

    let volume = VolumeLoader::decode(Cursor::new(bytes), "scan.nii").unwrap();
    assert_eq!(volume.spacing(), &[1.0, 1.0, 2.0]);
    assert_eq!(volume.origin(), &[-10.0, -20.0, 30.0]);
    assert_eq!(
        volume.direction(),
        &[-1.0, 0.0, 0.0, 0.0, -1.0, 0.0, 0.0, 0.0, 1.0]
    );
}

#[test]
fn nifti_qform_rotation_and_handedness() {
    // 90 degrees about z, third axis flipped by qfac
    let half = std::f32::consts::FRAC_1_SQRT_2;
    let qform = Orientation::Qform {
        quatern: [0.0, 0.0, half],
        offset: [10.0, 20.0, 30.0],
        qfac: -1.0,
    };
    let bytes = nifti_bytes([2, 2, 2], [1.0, 1.0, 1.0], qform, &[0.0; 8]);

    let volume = VolumeLoader::decode(Cursor::new(bytes), "scan.nii").unwrap();
    assert_eq!(volume.origin(), &[-10.0, -20.0, 30.0]);
    let expected = [0.0, 1.0, 0.0, -1.0, 0.0, 0.0, 0.0, 0.0, -1.0];
    for (got, want) in volume.direction().iter().zip(expected) {
        assert!((got - want).abs() < 1e-6, "{:?}", volume.direction());
    }
}

#[test]
fn nifti_geometry_has_no_negative_zeros() {
    let qform = Orientation::Qform {
        quatern: [0.0, 0.0, 0.0],
        offset: [0.0, 0.0, 4.0],
        qfac: -1.0,
    };
    let bytes = nifti_bytes([2, 2, 2], [1.0, 1.0, 1.0], qform, &[0.0; 8]);

    let payload = build_base_payload(VolumeLoader::decode(Cursor::new(bytes), "scan.nii").unwrap());
    assert!(payload.direction.iter().all(|v| *v != 0.0 || v.is_sign_positive()));
    assert!(payload.origin.iter().all(|v| *v != 0.0 || v.is_sign_positive()));

    let value = serde_json::to_value(&payload).unwrap();
    assert_eq!(value["origin"], json!([0.0, 0.0, 4.0]));
    assert_eq!(
        value["direction"],
        json!([-1.0, 0.0, 0.0, 0.0, -1.0, 0.0, 0.0, 0.0, -1.0])
    );
    assert!(!serde_json::to_string(&payload).unwrap().contains("-0.0"));
}
