//! Streams the preview can decode on its own: still images and synthetic
//! test patterns. Network and movie pipelines need an external decoder and
//! are refused.

use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use anyhow::Context;
use stereo_core::{
    frame_slot, Frame, FramePublisher, PixelFormat, SourceConnectError, SourceKind, SourceRequest,
};
use stereo_gl::TextureHandle;
use stereo_view::{FrameSource, PublishedBinding, SourceBinding};
use tracing::{debug, error};

const PATTERN_INTERVAL: Duration = Duration::from_millis(33);
const MAX_PATTERN_SIDE: u32 = 8192;

const BARS: [[u8; 3]; 8] = [
    [255, 255, 255],
    [255, 255, 0],
    [0, 255, 255],
    [0, 255, 0],
    [255, 0, 255],
    [255, 0, 0],
    [0, 0, 255],
    [0, 0, 0],
];

#[derive(Debug, Default)]
pub struct LocalSource;

impl FrameSource for LocalSource {
    fn attach(
        &mut self,
        request: &SourceRequest,
        texture: TextureHandle,
    ) -> Result<Box<dyn SourceBinding>, SourceConnectError> {
        for (key, value) in request.sink.iter() {
            debug!(key, value, "texture sink parameter");
        }
        debug!(
            descriptor = %request.descriptor,
            pipeline = %request.pipeline,
            texture = texture.0,
            "attach"
        );

        match request.kind {
            SourceKind::Png | SourceKind::Jpeg => attach_image(request),
            SourceKind::Pattern => attach_pattern(request),
            SourceKind::Rtsp | SourceKind::Movie => Err(SourceConnectError::new(
                &request.descriptor,
                format!("no decoder available for `{}`", request.pipeline),
            )),
        }
    }
}

fn attach_image(request: &SourceRequest) -> Result<Box<dyn SourceBinding>, SourceConnectError> {
    let path = PathBuf::from(&request.descriptor);
    if !path.is_file() {
        return Err(SourceConnectError::new(&request.descriptor, "no such file"));
    }
    let bayer = request.sink.is_bayer().unwrap_or(false);

    let (publisher, reader) = frame_slot();
    thread::Builder::new()
        .name("image-loader".into())
        .spawn(move || match load_image(&path, bayer) {
            Ok(frame) => publisher.publish(frame),
            Err(err) => error!("{err:#}"),
        })
        .map_err(|err| SourceConnectError::new(&request.descriptor, err.to_string()))?;

    let binding =
        PublishedBinding::new(reader).with_internal_format(request.sink.texture_format());
    Ok(Box::new(binding))
}

/// Decode an image file. With `bayer` set the luma channel is taken as a raw
/// sensor mosaic.
pub fn load_image(path: &Path, bayer: bool) -> anyhow::Result<Frame> {
    let image = image::open(path).with_context(|| format!("decoding {}", path.display()))?;
    let frame = if bayer {
        let luma = image.to_luma8();
        let (width, height) = luma.dimensions();
        Frame::new(width, height, PixelFormat::Bayer8, luma.into_raw())
    } else {
        let rgba = image.to_rgba8();
        let (width, height) = rgba.dimensions();
        Frame::new(width, height, PixelFormat::Rgba8, rgba.into_raw())
    };
    frame.with_context(|| format!("{} decoded to an unexpected size", path.display()))
}

fn attach_pattern(request: &SourceRequest) -> Result<Box<dyn SourceBinding>, SourceConnectError> {
    let (width, height, bayer) = parse_pattern(&request.descriptor).ok_or_else(|| {
        SourceConnectError::new(&request.descriptor, "expected pattern:WxH or pattern-bayer:WxH")
    })?;
    let bayer = request.sink.is_bayer().unwrap_or(bayer);

    let (publisher, reader) = frame_slot();
    let worker = thread::Builder::new()
        .name("pattern".into())
        .spawn(move || run_pattern(publisher, width, height, bayer))
        .map_err(|err| SourceConnectError::new(&request.descriptor, err.to_string()))?;
    let waker = worker.thread().clone();

    let binding = PublishedBinding::new(reader)
        .with_internal_format(request.sink.texture_format())
        .on_detach(move || waker.unpark());
    Ok(Box::new(binding))
}

fn run_pattern(publisher: FramePublisher, width: u32, height: u32, bayer: bool) {
    let mut offset = 0u32;
    while !publisher.is_closed() {
        publisher.publish(pattern_frame(width, height, bayer, offset));
        offset = offset.wrapping_add(1);
        thread::park_timeout(PATTERN_INTERVAL);
    }
    debug!(width, height, "pattern stopped");
}

/// `pattern:WxH` or `pattern-bayer:WxH`.
fn parse_pattern(descriptor: &str) -> Option<(u32, u32, bool)> {
    let (kind, size) = descriptor.split_once(':')?;
    let bayer = match kind.to_ascii_lowercase().as_str() {
        "pattern" => false,
        "pattern-bayer" => true,
        _ => return None,
    };
    let size = size.to_ascii_lowercase();
    let (w, h) = size.split_once('x')?;
    let (w, h) = (w.trim().parse::<u32>().ok()?, h.trim().parse::<u32>().ok()?);
    let valid = |side: u32| (1..=MAX_PATTERN_SIDE).contains(&side);
    (valid(w) && valid(h)).then_some((w, h, bayer))
}

/// Colour bars scrolled left by `offset` pixels.
pub fn pattern_frame(width: u32, height: u32, bayer: bool, offset: u32) -> Frame {
    let bar_width = (width / BARS.len() as u32).max(1);
    let bar = |x: u32| BARS[(x.wrapping_add(offset) / bar_width) as usize % BARS.len()];

    let format = if bayer {
        PixelFormat::Bayer8
    } else {
        PixelFormat::Rgb8
    };
    let mut data = Vec::with_capacity(width as usize * height as usize * format.bytes_per_pixel());
    for y in 0..height {
        for x in 0..width {
            let rgb = bar(x);
            if bayer {
                data.push(rgb[mosaic_channel(x, y)]);
            } else {
                data.extend_from_slice(&rgb);
            }
        }
    }
    Frame {
        width,
        height,
        format,
        data,
    }
}

/// Channel sampled at `(x, y)` of a mosaic whose first red pixel is at
/// column 1 of row 0.
fn mosaic_channel(x: u32, y: u32) -> usize {
    match (x % 2, y % 2) {
        (1, 0) => 0,
        (0, 1) => 2,
        _ => 1,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;

    fn wait_for_size(binding: &dyn SourceBinding) -> Option<(u32, u32)> {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if let Some(size) = binding.current_size() {
                return Some(size);
            }
            thread::sleep(Duration::from_millis(5));
        }
        None
    }

    #[test]
    fn parses_pattern_descriptors() {
        assert_eq!(parse_pattern("pattern:640x480"), Some((640, 480, false)));
        assert_eq!(parse_pattern("pattern-bayer:64X48"), Some((64, 48, true)));
        assert_eq!(parse_pattern("pattern:0x480"), None);
        assert_eq!(parse_pattern("pattern:640"), None);
        assert_eq!(parse_pattern("smpte:640x480"), None);
    }

    #[test]
    fn mosaic_starts_with_green_then_red() {
        assert_eq!(mosaic_channel(0, 0), 1);
        assert_eq!(mosaic_channel(1, 0), 0);
        assert_eq!(mosaic_channel(0, 1), 2);
        assert_eq!(mosaic_channel(1, 1), 1);
    }

    #[test]
    fn pattern_frames_have_consistent_layout() {
        let rgb = pattern_frame(16, 4, false, 0);
        assert_eq!(rgb.data.len(), 16 * 4 * 3);
        assert_eq!(&rgb.data[..3], &BARS[0]);

        let raw = pattern_frame(16, 4, true, 0);
        assert_eq!(raw.format, PixelFormat::Bayer8);
        assert_eq!(raw.data.len(), 16 * 4);
        // bar 0 is white: every channel is 255
        assert_eq!(raw.data[0], 255);
    }

    #[test]
    fn refuses_network_and_movie_sources() {
        for descriptor in ["rtsp://10.0.0.2/left", "clip.avi"] {
            let request = SourceRequest::new(descriptor, None);
            let err = LocalSource.attach(&request, TextureHandle(1)).err().unwrap();
            assert_eq!(err.descriptor, descriptor);
        }
    }

    #[test]
    fn missing_image_is_refused() {
        let request = SourceRequest::new("/nonexistent/left.png", None);
        assert!(LocalSource.attach(&request, TextureHandle(1)).is_err());
    }

    #[test]
    fn pattern_source_goes_live_and_stops() {
        let request = SourceRequest::new("pattern-bayer:32x16", None);
        let mut binding = LocalSource.attach(&request, TextureHandle(1)).unwrap();
        assert_eq!(wait_for_size(binding.as_ref()), Some((32, 16)));
        assert!(binding.is_bayer_format());
        binding.detach();
    }

    #[test]
    fn sink_parameter_marks_image_as_bayer() {
        let path = std::env::temp_dir().join(format!("stereo-preview-{}.png", std::process::id()));
        image::RgbImage::from_pixel(6, 4, image::Rgb([10, 20, 30]))
            .save(&path)
            .unwrap();
        let descriptor = path.to_string_lossy().into_owned();

        let plain = SourceRequest::new(&descriptor, None);
        let binding = LocalSource.attach(&plain, TextureHandle(1)).unwrap();
        assert_eq!(wait_for_size(binding.as_ref()), Some((6, 4)));
        assert!(!binding.is_bayer_format());

        let pipeline = "filesrc location={source} ! pngdec ! gltexturesink is_bayer=true";
        let raw = SourceRequest::new(&descriptor, Some(pipeline));
        let binding = LocalSource.attach(&raw, TextureHandle(2)).unwrap();
        assert_eq!(wait_for_size(binding.as_ref()), Some((6, 4)));
        assert!(binding.is_bayer_format());

        std::fs::remove_file(&path).ok();
    }
}
