use super::*;
use crate::error::CalibrationError;
use nalgebra::{Matrix3, Matrix3x4, Matrix4, Vector3};
use tempfile::TempDir;

fn create_test_pinhole() -> PinholeCamera {
    PinholeCamera::from_parameters(
        &[640, 480],
        &[512.25, 511.75],
        &[319.5, 241.125],
        &[-0.21, 0.043, 0.0012, -0.0007, 0.1],
        None,
        None,
    )
    .unwrap()
}

fn create_test_stereo() -> StereoCamera {
    let k = Matrix3::new(500.0, 0.0, 320.0, 0.0, 500.0, 240.0, 0.0, 0.0, 1.0);
    let p1 = Matrix3x4::new(
        500.0, 0.0, 320.0, 0.0, //
        0.0, 500.0, 240.0, 0.0, //
        0.0, 0.0, 1.0, 0.0,
    );
    let mut p2 = p1;
    p2[(0, 3)] = -1650.0;
    let t = Vector3::new(-3.3, 0.0, 0.0);
    let e = Matrix3::new(0.0, 0.0, 0.0, 0.0, 0.0, 3.3, 0.0, -3.3, 0.0);
    let q = Matrix4::new(
        1.0, 0.0, 0.0, -320.0, //
        0.0, 1.0, 0.0, -240.0, //
        0.0, 0.0, 0.0, 500.0, //
        0.0, 0.0, 1.0 / 3.3, 0.0,
    );

    StereoCamera::from_parameters(
        (640, 480),
        k,
        [0.01, 0.0, 0.0, 0.0, 0.0],
        Matrix3::identity(),
        p1,
        k,
        [0.02, 0.0, 0.0, 0.0, 0.0],
        Matrix3::identity(),
        p2,
        Matrix3::identity(),
        t,
        e,
        e * 1e-6,
        q,
    )
    .unwrap()
}

#[test]
fn test_from_parameters_builds_canonical_matrix() {
    let camera = create_test_pinhole();

    assert_eq!(camera.size(), (640, 480));
    assert_eq!(camera.focal_point(), (512.25, 511.75));
    assert_eq!(camera.center(), (319.5, 241.125));
    assert_eq!(camera.matrix()[(2, 2)], 1.0);
    assert_eq!(camera.matrix()[(0, 1)], 0.0);
    assert!(camera.rectify().is_none());
    assert!(camera.projection().is_none());
}

#[test]
fn test_from_parameters_checks_lengths() {
    let d = [0.0; 5];

    let short_distortion =
        PinholeCamera::from_parameters(&[640, 480], &[1.0, 1.0], &[0.0, 0.0], &[0.0; 4], None, None);
    let long_size =
        PinholeCamera::from_parameters(&[640, 480, 3], &[1.0, 1.0], &[0.0, 0.0], &d, None, None);
    let short_focal =
        PinholeCamera::from_parameters(&[640, 480], &[1.0], &[0.0, 0.0], &d, None, None);
    let long_center =
        PinholeCamera::from_parameters(&[640, 480], &[1.0, 1.0], &[0.0, 0.0, 0.0], &d, None, None);

    for result in [short_distortion, long_size, short_focal, long_center] {
        assert!(matches!(result, Err(CalibrationError::Validation { .. })));
    }
}

#[test]
fn test_new_rejects_degenerate_values() {
    let zero_size = PinholeCamera::new((0, 480), Matrix3::identity(), [0.0; 5], None, None);
    assert!(matches!(zero_size, Err(CalibrationError::Validation { .. })));

    let mut matrix = Matrix3::identity();
    matrix[(0, 0)] = f64::NAN;
    let nan = PinholeCamera::new((640, 480), matrix, [0.0; 5], None, None);
    assert!(matches!(nan, Err(CalibrationError::Validation { .. })));
}

#[test]
fn test_pinhole_json_round_trip_is_exact() {
    let camera = PinholeCamera::new(
        (1280, 720),
        Matrix3::new(
            1000.0 / 3.0,
            0.0,
            640.1,
            0.0,
            1000.0 / 7.0,
            359.9,
            0.0,
            0.0,
            1.0,
        ),
        [0.1 + 0.2, -1e-17, 3.0e-5, 0.0, 2.0 / 3.0],
        Some(Matrix3::identity()),
        Some(Matrix3x4::identity()),
    )
    .unwrap();

    let json = serde_json::to_string(&camera).unwrap();
    let restored: PinholeCamera = serde_json::from_str(&json).unwrap();
    assert_eq!(restored, camera);
}

#[test]
fn test_pinhole_serialized_layout() {
    let value = serde_json::to_value(create_test_pinhole()).unwrap();

    assert_eq!(value["size"], serde_json::json!([640, 480]));
    assert_eq!(value["matrix"][0], serde_json::json!([512.25, 0.0, 319.5]));
    assert_eq!(value["distortion"].as_array().unwrap().len(), 1);
    assert_eq!(value["distortion"][0].as_array().unwrap().len(), 5);
    assert!(value.get("rectify").is_none());
    assert!(value.get("projection").is_none());
}

#[test]
fn test_pinhole_accepts_flat_distortion() {
    let json = r#"{
        "size": [320, 240],
        "matrix": [[300.0, 0.0, 160.0], [0.0, 300.0, 120.0], [0.0, 0.0, 1.0]],
        "distortion": [0.1, 0.0, 0.0, 0.0, 0.0]
    }"#;

    let camera: PinholeCamera = serde_json::from_str(json).unwrap();
    assert_eq!(camera.distortion()[0], 0.1);
    assert_eq!(camera.width(), 320);
}

#[test]
fn test_pinhole_deserialization_validates() {
    let bad_matrix = r#"{
        "size": [320, 240],
        "matrix": [[300.0, 0.0], [0.0, 300.0]],
        "distortion": [[0.0, 0.0, 0.0, 0.0, 0.0]]
    }"#;
    let bad_distortion = r#"{
        "size": [320, 240],
        "matrix": [[300.0, 0.0, 160.0], [0.0, 300.0, 120.0], [0.0, 0.0, 1.0]],
        "distortion": [[0.0, 0.0, 0.0]]
    }"#;

    assert!(serde_json::from_str::<PinholeCamera>(bad_matrix).is_err());
    assert!(serde_json::from_str::<PinholeCamera>(bad_distortion).is_err());
}

#[test]
fn test_stereo_rejects_mismatched_sizes() {
    let left = create_test_pinhole();
    let right = PinholeCamera::new((800, 600), *left.matrix(), *left.distortion(), None, None).unwrap();

    let result = StereoCamera::new(
        left,
        right,
        Matrix3::identity(),
        Vector3::zeros(),
        Matrix3::zeros(),
        Matrix3::zeros(),
        Matrix4::identity(),
    );
    assert!(matches!(result, Err(CalibrationError::Configuration { .. })));
}

#[test]
fn test_stereo_json_round_trip_and_keys() {
    let stereo = create_test_stereo();

    let value = serde_json::to_value(&stereo).unwrap();
    for key in ["left", "right", "R", "T", "E", "F", "Q"] {
        assert!(value.get(key).is_some(), "missing key {}", key);
    }
    assert_eq!(value["T"], serde_json::json!([[-3.3], [0.0], [0.0]]));
    assert_eq!(value["Q"].as_array().unwrap().len(), 4);

    let restored: StereoCamera = serde_json::from_value(value).unwrap();
    assert_eq!(restored, stereo);
    assert!(restored.left().rectify().is_some());
    assert!(restored.right().projection().is_some());
}

#[test]
fn test_stereo_deserialization_rejects_bad_sub_camera() {
    let mut value = serde_json::to_value(create_test_stereo()).unwrap();
    value["right"]["size"] = serde_json::json!([640]);

    assert!(serde_json::from_value::<StereoCamera>(value).is_err());
}

#[test]
fn test_camera_model_accessors() {
    let mono = CameraModel::from(create_test_pinhole());
    let stereo = CameraModel::from(create_test_stereo());

    assert_eq!(mono.kind(), "pinhole");
    assert_eq!(stereo.kind(), "stereo");
    assert_eq!(stereo.size(), (640, 480));
    assert!(mono.as_pinhole().is_some());
    assert!(mono.as_stereo().is_none());
}

#[test]
fn test_save_and_load_json_and_toml() {
    let temp_dir = TempDir::new().unwrap();

    for name in ["mono.json", "mono.toml"] {
        let model = CameraModel::from(create_test_pinhole());
        let path = temp_dir.path().join(name);
        save_camera(&model, &path).unwrap();
        assert_eq!(load_camera(&path).unwrap(), model);
    }

    for name in ["rig.json", "nested/rig.toml"] {
        let model = CameraModel::from(create_test_stereo());
        let path = temp_dir.path().join(name);
        save_camera(&model, &path).unwrap();

        let loaded = load_camera(&path).unwrap();
        assert_eq!(loaded.kind(), "stereo");
        assert_eq!(loaded, model);
    }
}

#[test]
fn test_unknown_extension_is_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("camera.yaml");
    let model = CameraModel::from(create_test_pinhole());

    let result = save_camera(&model, &path);
    assert!(matches!(
        result,
        Err(CalibrationError::UnsupportedFormat { ref extension }) if extension == "yaml"
    ));
}
