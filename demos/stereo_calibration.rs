use camcal::camera::save_camera;
use camcal::solver::PATTERN_MARKER;
use camcal::{
    with_source, CalibratedCamera, CalibratedStereoCamera, CalibrationConfig, CalibrationSolver,
    CameraModel, FrameSequence, PixelBuffer, Processor, ProcessorOptions, ScriptedSolver,
    StereoConfig,
};
use std::sync::Arc;
use tracing::{info, Level};

const WIDTH: u32 = 640;
const HEIGHT: u32 = 480;

/// Synthetic board views; every fourth frame misses the pattern on one side
fn boards(frames: usize, miss_offset: usize) -> Vec<PixelBuffer> {
    (0..frames)
        .map(|i| {
            let visible = (i + miss_offset) % 4 != 0;
            ScriptedSolver::image(WIDTH, HEIGHT, visible)
        })
        .collect()
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .init();

    info!("Starting stereo calibration demo (pattern marker {:#04x})", PATTERN_MARKER);

    let solver = Arc::new(ScriptedSolver::new());
    let shared: Arc<dyn CalibrationSolver> = solver.clone();
    let options = ProcessorOptions::default();
    let mono_config = CalibrationConfig::default();
    let stereo_config = StereoConfig::default();

    // Two mono stages, each over its own synthetic camera
    let left = Processor::new(
        CalibratedCamera::calibrating(Arc::clone(&shared), &mono_config)?,
        FrameSequence::new("left", boards(60, 1)),
        options,
    );
    let right = Processor::new(
        CalibratedCamera::calibrating(Arc::clone(&shared), &mono_config)?,
        FrameSequence::new("right", boards(60, 3)),
        options,
    );

    let mut rig = CalibratedStereoCamera::calibrating(left, right, shared, &stereo_config, options)?;
    info!("Pipeline: {}", camcal::VideoSource::name(&rig));

    let camera = with_source(&mut rig, |rig| {
        let mut frames = 0;
        loop {
            frames += 1;
            if let Some(camera) = rig.calibrate()? {
                info!("Rig solved after {} frames", frames);
                return Ok(camera);
            }
            info!("Frame {}: {}/{} samples", frames, rig.sample_count(), stereo_config.max_samples);
        }
    })?;

    info!(
        "Baseline {:.3}, left focal {:?}, right focal {:?}",
        camera.translation().norm(),
        camera.left().focal_point(),
        camera.right().focal_point()
    );
    info!(
        "Solver calls: {} detections, {} mono, {} stereo, {} rectifications",
        solver.detection_count(),
        solver.mono_solve_count(),
        solver.stereo_solve_count(),
        solver.rectification_count()
    );

    let path = std::env::temp_dir().join("camcal_demo_rig.json");
    save_camera(&CameraModel::Stereo(camera), &path)?;
    info!("Stereo camera written to {}", path.display());

    Ok(())
}
