use super::*;
use crate::frame::{PixelBuffer, PixelFormat};
use crate::source::{find_source, frames, with_source};
use crate::calibration::CameraPair;
use std::cell::Cell;
use std::rc::Rc;
use std::time::SystemTime;

/// Root source producing one text "image" per frame
struct TextSource {
    id: StageId,
    frame: u64,
    frames: u64,
    images_per_frame: usize,
    camera_calls: Cell<usize>,
    releases: Rc<Cell<usize>>,
}

impl TextSource {
    fn new() -> Self {
        Self {
            id: StageId::new(),
            frame: 0,
            frames: 10,
            images_per_frame: 1,
            camera_calls: Cell::new(0),
            releases: Rc::new(Cell::new(0)),
        }
    }
}

fn text(value: &str) -> PixelBuffer {
    PixelBuffer::new(value.len() as u32, 1, PixelFormat::Gray8, value.as_bytes().to_vec()).unwrap()
}

fn as_text(image: &Image) -> String {
    String::from_utf8(image.pixels().data().to_vec()).unwrap()
}

impl VideoSource for TextSource {
    fn id(&self) -> StageId {
        self.id
    }

    fn name(&self) -> String {
        "Test".to_string()
    }

    fn tag(&self) -> &str {
        "TextSource"
    }

    fn setup(&mut self) -> Result<()> {
        Ok(())
    }

    fn release(&mut self) {
        self.releases.set(self.releases.get() + 1);
    }

    fn capture(&mut self) -> Result<Option<Frame>> {
        self.frame += 1;
        let images = (0..self.images_per_frame)
            .map(|_| Image::new(self.id, text("an image")))
            .collect();
        Ok(Some(Frame::new(SystemTime::now(), self.frame - 1, images)))
    }

    fn is_open(&self) -> bool {
        self.frame < self.frames
    }

    fn frame_count(&self) -> Option<u64> {
        Some(self.frames)
    }

    fn camera(&self) -> Option<CameraModel> {
        self.camera_calls.set(self.camera_calls.get() + 1);
        None
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

struct ProcessorA;

impl ImageProcessor for ProcessorA {
    fn tag(&self) -> &str {
        "ProcessorA"
    }

    fn description(&self) -> String {
        "Simple processor".to_string()
    }

    fn process(&self, image: Image, ctx: &StageContext<'_>) -> Result<Image> {
        let upper = image.pixels().data().to_ascii_uppercase();
        let (width, height) = image.pixels().size();
        let pixels = PixelBuffer::new(width, height, PixelFormat::Gray8, upper)?;
        Ok(image.with_source(ctx.id).with_pixels(pixels))
    }
}

struct ProcessorB {
    frame_size: (u32, u32),
}

impl ImageProcessor for ProcessorB {
    fn tag(&self) -> &str {
        "ProcessorB"
    }

    fn description(&self) -> String {
        "Simple processor 2".to_string()
    }

    fn capabilities(&self) -> &[Capability] {
        &[Capability::FrameSize]
    }

    fn process(&self, image: Image, ctx: &StageContext<'_>) -> Result<Image> {
        let titled = as_text(&image)
            .split(' ')
            .map(|word| {
                let mut chars = word.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                    None => String::new(),
                }
            })
            .collect::<Vec<String>>()
            .join(" ");
        Ok(image.with_source(ctx.id).with_pixels(text(&titled)))
    }

    fn frame_size(&self) -> Option<(u32, u32)> {
        Some(self.frame_size)
    }
}

fn create_test_chain() -> Processor<ProcessorB> {
    let a = Processor::new(ProcessorA, TextSource::new(), ProcessorOptions::default());
    Processor::new(
        ProcessorB { frame_size: (3, 2) },
        a,
        ProcessorOptions::default(),
    )
}

#[test]
fn test_capture() {
    let mut processor = Processor::new(ProcessorA, TextSource::new(), ProcessorOptions::default());
    let id = processor.id();

    with_source(&mut processor, |stage| {
        let frame = stage.capture()?.unwrap();
        assert_eq!(frame.images()[0].source(), id);
        assert_eq!(as_text(&frame.images()[0]), "AN IMAGE");
        Ok(())
    })
    .unwrap();
}

#[test]
fn test_capture_before_setup_is_integrity_violation() {
    let mut processor = Processor::new(ProcessorA, TextSource::new(), ProcessorOptions::default());

    let error = processor.capture().unwrap_err();
    assert!(error.is_integrity_violation());
}

#[test]
fn test_capture_stacked_before_setup_is_integrity_violation() {
    let mut chain = create_test_chain();

    assert_eq!(chain.name(), "ProcessorB ← ProcessorA ← Test");
    assert!(matches!(
        chain.capture(),
        Err(CalibrationError::Integrity { .. })
    ));
}

#[test]
fn test_capture_stacked() {
    let mut chain = create_test_chain();
    let outer = chain.id();

    with_source(&mut chain, |stage| {
        let frame = stage.capture()?.unwrap();
        assert_eq!(frame.images()[0].source(), outer);
        assert_eq!(as_text(&frame.images()[0]), "An Image");
        Ok(())
    })
    .unwrap();

    assert_eq!(find_source(&chain, "Test").map(|s| s.name()), Some("Test".to_string()));
    assert_eq!(
        find_source(&chain, "ProcessorA").map(|s| s.tag().to_string()),
        Some("ProcessorA".to_string())
    );
    assert_eq!(find_source(&chain, "ProcessorB").map(|s| s.id()), Some(outer));
    assert!(find_source(&chain, "Test no").is_none());
}

#[test]
fn test_capability_delegation_reaches_root() {
    let chain = create_test_chain();

    assert!(chain.camera().is_none());
    assert_eq!(chain.route(Capability::Camera), Route::Upstream);

    let root = find_source(&chain, "Test")
        .and_then(|stage| stage.as_any().downcast_ref::<TextSource>())
        .unwrap();
    assert_eq!(root.camera_calls.get(), 1);
    assert_eq!(chain.frame_count(), Some(10));
}

#[test]
fn test_local_capability_shadows_upstream() {
    let chain = create_test_chain();

    assert_eq!(chain.route(Capability::FrameSize), Route::Local);
    assert_eq!(chain.frame_size(), Some((3, 2)));

    let inner = chain.upstream().unwrap();
    assert_eq!(inner.frame_size(), None);
}

#[test]
fn test_zero_image_frame_is_integrity_violation() {
    let mut source = TextSource::new();
    source.images_per_frame = 0;
    let mut processor = Processor::new(ProcessorA, source, ProcessorOptions::default());

    let result = with_source(&mut processor, |stage| stage.capture());
    assert!(matches!(result, Err(CalibrationError::Integrity { .. })));
}

#[test]
fn test_disabled_stage_passes_images_through() {
    let options = ProcessorOptions {
        enabled: false,
        ..ProcessorOptions::default()
    };
    let mut processor = Processor::new(ProcessorA, TextSource::new(), options);

    let frame = with_source(&mut processor, |stage| stage.capture())
        .unwrap()
        .unwrap();
    assert_eq!(as_text(&frame.images()[0]), "an image");
    assert_ne!(frame.images()[0].source(), processor.id());
}

#[test]
fn test_frames_run_until_source_closes() {
    let mut chain = create_test_chain();

    let count = with_source(&mut chain, |stage| {
        frames(stage).try_fold(0, |count, frame| frame.map(|_| count + 1))
    })
    .unwrap();

    assert_eq!(count, 10);
    assert!(!chain.is_setup());
}

/// Pass-through stage counting its releases
struct Counting {
    tag: &'static str,
    releases: Rc<Cell<usize>>,
}

fn counting(tag: &'static str) -> (Counting, Rc<Cell<usize>>) {
    let releases = Rc::new(Cell::new(0));
    let stage = Counting {
        tag,
        releases: Rc::clone(&releases),
    };
    (stage, releases)
}

impl ImageProcessor for Counting {
    fn tag(&self) -> &str {
        self.tag
    }

    fn description(&self) -> String {
        "Counting processor".to_string()
    }

    fn release(&mut self) {
        self.releases.set(self.releases.get() + 1);
    }

    fn process(&self, image: Image, ctx: &StageContext<'_>) -> Result<Image> {
        Ok(image.with_source(ctx.id))
    }
}

#[test]
fn test_release_reaches_every_stage_once() {
    let options = ProcessorOptions::default();
    let left_leaf = TextSource::new();
    let right_leaf = TextSource::new();
    let left_leaf_releases = Rc::clone(&left_leaf.releases);
    let right_leaf_releases = Rc::clone(&right_leaf.releases);

    let (left_stage, left_releases) = counting("Left");
    let (right_stage, right_releases) = counting("Right");
    let (top_stage, top_releases) = counting("Top");
    let left = Processor::new(left_stage, left_leaf, options);
    let right = Processor::new(right_stage, right_leaf, options);
    let mut chain = Processor::new(top_stage, CameraPair::new(left, right), options);

    assert_eq!(chain.name(), "Top ← (Left ← Test : Right ← Test)");

    let images = with_source(&mut chain, |chain| {
        Ok(chain.capture()?.map(|frame| frame.images().len()))
    })
    .unwrap();

    assert_eq!(images, Some(2));
    assert!(!chain.is_setup());
    for releases in [
        &top_releases,
        &left_releases,
        &right_releases,
        &left_leaf_releases,
        &right_leaf_releases,
    ] {
        assert_eq!(releases.get(), 1);
    }
}
