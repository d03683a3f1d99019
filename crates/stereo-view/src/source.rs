//! Frame source interface.
//!
//! A frame source decodes a stream somewhere else and makes its frames
//! available to one texture. The render thread only ever polls: it calls
//! [`SourceBinding::sync`] once per tick to pull in the newest frame, then
//! asks for the dimensions. Nothing here blocks on decoding.

use stereo_core::{frame_slot, FramePublisher, FrameReader, SourceConnectError, SourceRequest};
use stereo_gl::{GpuDevice, TextureHandle};
use tracing::{debug, trace};

/// Something that can attach decoded streams to textures.
pub trait FrameSource {
    /// Start delivering frames for `request` into `texture`.
    fn attach(
        &mut self,
        request: &SourceRequest,
        texture: TextureHandle,
    ) -> Result<Box<dyn SourceBinding>, SourceConnectError>;
}

/// One attached stream.
pub trait SourceBinding {
    /// Bring `texture` up to date with the newest frame. Called once per
    /// render tick on the render thread; must not block on the producer.
    ///
    /// Sources that write the texture themselves leave this as a no-op.
    fn sync(&mut self, _device: &mut dyn GpuDevice, _texture: TextureHandle) {}

    /// Frame dimensions, once the first frame has been seen.
    fn current_size(&self) -> Option<(u32, u32)>;

    /// True if the frames are a raw Bayer mosaic.
    fn is_bayer_format(&self) -> bool;

    /// Stop delivering frames and release the stream. Must be idempotent and
    /// must not wait for the producer to finish.
    fn detach(&mut self);
}

/// [`SourceBinding`] over a [`FrameReader`], for producers that publish
/// frames through [`frame_slot`].
pub struct PublishedBinding {
    reader: FrameReader,
    internal_format: Option<u32>,
    on_detach: Option<Box<dyn FnOnce() + Send>>,
    detached: bool,
}

impl PublishedBinding {
    pub fn new(reader: FrameReader) -> Self {
        Self {
            reader,
            internal_format: None,
            on_detach: None,
            detached: false,
        }
    }

    /// Upload with this GL internal format instead of the one matching the
    /// frames, as requested by the `texture_format` sink parameter.
    pub fn with_internal_format(mut self, internal_format: Option<u32>) -> Self {
        self.internal_format = internal_format;
        self
    }

    /// Run `hook` the first time the binding is detached, after the reader
    /// has been closed.
    pub fn on_detach(mut self, hook: impl FnOnce() + Send + 'static) -> Self {
        self.on_detach = Some(Box::new(hook));
        self
    }

    pub fn is_detached(&self) -> bool {
        self.detached
    }
}

impl SourceBinding for PublishedBinding {
    fn sync(&mut self, device: &mut dyn GpuDevice, texture: TextureHandle) {
        if self.detached {
            return;
        }
        if let Some(frame) = self.reader.take_latest() {
            trace!(texture = texture.0, ?frame, "upload frame");
            device.upload_texture(texture, &frame, self.internal_format);
        }
    }

    fn current_size(&self) -> Option<(u32, u32)> {
        self.reader.size()
    }

    fn is_bayer_format(&self) -> bool {
        self.reader.is_bayer()
    }

    fn detach(&mut self) {
        if self.detached {
            return;
        }
        self.detached = true;
        self.reader.close();
        if let Some(hook) = self.on_detach.take() {
            hook();
        }
    }
}

impl Drop for PublishedBinding {
    fn drop(&mut self) {
        self.detach();
    }
}

struct PushedStream {
    descriptor: String,
    texture: TextureHandle,
    publisher: FramePublisher,
}

/// Frame source fed by the embedder: every attached stream gets its own
/// [`FramePublisher`] that the caller pushes decoded frames into.
///
/// Both sides may use the same descriptor; each attach still gets an
/// independent slot, found through [`publisher_for`](Self::publisher_for).
#[derive(Default)]
pub struct PushSource {
    streams: Vec<PushedStream>,
}

impl PushSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publisher of the first open stream attached under `descriptor`.
    pub fn publisher(&self, descriptor: &str) -> Option<&FramePublisher> {
        self.publishers(descriptor).next()
    }

    /// Publishers of every open stream attached under `descriptor`, in
    /// attach order.
    pub fn publishers<'a, 'b>(
        &'a self,
        descriptor: &'b str,
    ) -> impl Iterator<Item = &'a FramePublisher> + 'b
    where
        'a: 'b,
    {
        self.streams
            .iter()
            .filter(move |s| s.descriptor == descriptor && !s.publisher.is_closed())
            .map(|s| &s.publisher)
    }

    /// Publisher of the stream attached to `texture`.
    pub fn publisher_for(&self, texture: TextureHandle) -> Option<&FramePublisher> {
        self.streams
            .iter()
            .rev()
            .find(|s| s.texture == texture && !s.publisher.is_closed())
            .map(|s| &s.publisher)
    }

    /// Number of streams whose binding is still attached.
    pub fn open_streams(&self) -> usize {
        self.streams.iter().filter(|s| !s.publisher.is_closed()).count()
    }
}

impl FrameSource for PushSource {
    fn attach(
        &mut self,
        request: &SourceRequest,
        texture: TextureHandle,
    ) -> Result<Box<dyn SourceBinding>, SourceConnectError> {
        // Streams detached since the last attach are gone for good.
        self.streams.retain(|s| !s.publisher.is_closed());

        let (publisher, reader) = frame_slot();
        debug!(descriptor = %request.descriptor, texture = texture.0, "attached push source");
        self.streams.push(PushedStream {
            descriptor: request.descriptor.clone(),
            texture,
            publisher,
        });
        let binding =
            PublishedBinding::new(reader).with_internal_format(request.sink.texture_format());
        Ok(Box::new(binding))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use stereo_core::{Frame, PixelFormat};
    use stereo_gl::{Command, RecordingDevice};

    use super::*;

    #[test]
    fn sync_uploads_each_frame_once() {
        let (publisher, reader) = frame_slot();
        let mut binding = PublishedBinding::new(reader);
        let mut device = RecordingDevice::new();
        let texture = device.create_texture();

        binding.sync(&mut device, texture);
        assert_eq!(binding.current_size(), None);

        publisher.publish(Frame::new(2, 1, PixelFormat::Rgb8, vec![0; 6]).unwrap());
        binding.sync(&mut device, texture);
        binding.sync(&mut device, texture);

        let uploads = device
            .commands()
            .iter()
            .filter(|c| matches!(c, Command::UploadTexture { .. }))
            .count();
        assert_eq!(uploads, 1);
        assert_eq!(binding.current_size(), Some((2, 1)));
        assert!(!binding.is_bayer_format());
    }

    #[test]
    fn detach_is_idempotent_and_closes_the_slot() {
        let (publisher, reader) = frame_slot();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let mut binding = PublishedBinding::new(reader).on_detach(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        binding.detach();
        binding.detach();
        drop(binding);

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(publisher.is_closed());
    }

    #[test]
    fn push_source_hands_out_publishers() {
        let mut source = PushSource::new();
        let request = SourceRequest::new("left.png", None);
        let binding = source.attach(&request, TextureHandle(7)).unwrap();

        source
            .publisher("left.png")
            .unwrap()
            .publish(Frame::new(4, 4, PixelFormat::Bayer8, vec![0; 16]).unwrap());
        assert_eq!(binding.current_size(), Some((4, 4)));
        assert!(binding.is_bayer_format());
        assert!(source.publisher("right.png").is_none());
    }

    #[test]
    fn same_descriptor_twice_gets_independent_slots() {
        let mut source = PushSource::new();
        let request = SourceRequest::new("cam", None);
        let left = source.attach(&request, TextureHandle(1)).unwrap();
        let right = source.attach(&request, TextureHandle(2)).unwrap();
        assert_eq!(source.publishers("cam").count(), 2);

        source
            .publisher_for(TextureHandle(1))
            .unwrap()
            .publish(Frame::new(4, 4, PixelFormat::Rgb8, vec![0; 48]).unwrap());
        assert_eq!(left.current_size(), Some((4, 4)));
        assert_eq!(right.current_size(), None);

        source
            .publisher_for(TextureHandle(2))
            .unwrap()
            .publish(Frame::new(2, 2, PixelFormat::Rgb8, vec![0; 12]).unwrap());
        assert_eq!(right.current_size(), Some((2, 2)));
    }

    #[test]
    fn detached_streams_are_dropped_on_next_attach() {
        let mut source = PushSource::new();
        let mut old = source
            .attach(&SourceRequest::new("a.png", None), TextureHandle(1))
            .unwrap();
        old.detach();
        assert_eq!(source.open_streams(), 0);
        assert!(source.publisher("a.png").is_none());

        let _new = source
            .attach(&SourceRequest::new("b.png", None), TextureHandle(1))
            .unwrap();
        assert_eq!(source.streams.len(), 1);
        assert!(source.publisher_for(TextureHandle(1)).is_some());
    }

    #[test]
    fn sink_texture_format_reaches_the_upload() {
        let mut source = PushSource::new();
        let request = SourceRequest::new(
            "cam",
            Some("videotestsrc ! gltexturesink texture_format=0x8051"),
        );
        let mut binding = source.attach(&request, TextureHandle(3)).unwrap();
        let mut device = RecordingDevice::new();
        let texture = device.create_texture();

        source
            .publisher("cam")
            .unwrap()
            .publish(Frame::new(2, 1, PixelFormat::Rgba8, vec![0; 8]).unwrap());
        binding.sync(&mut device, texture);

        let formats: Vec<_> = device
            .commands()
            .iter()
            .filter_map(|c| match c {
                Command::UploadTexture { internal_format, .. } => Some(*internal_format),
                _ => None,
            })
            .collect();
        assert_eq!(formats, vec![Some(0x8051)]);
    }
}
