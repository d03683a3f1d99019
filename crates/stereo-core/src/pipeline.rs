//! Source descriptors and textual pipeline descriptions.
//!
//! The decode pipeline itself belongs to the frame source. This module only
//! picks a default description for a descriptor, substitutes `{source}`, and
//! peels off a trailing `gltexturesink` element whose parameters configure
//! the texture sink rather than the decoder.

use std::collections::BTreeMap;

use tracing::warn;

const PNG_PIPELINE: &str = "filesrc location={source} ! pngdec ";
const JPEG_PIPELINE: &str = "filesrc location={source} ! jpegdec ! ffmpegcolorspace";
const RTSP_PIPELINE: &str =
    "rtspsrc location={source} latency=50 ! rtpjpegdepay ! jpegdec ! queue ! jp462bayer ";
const MOVIE_PIPELINE: &str = "filesrc location={source} ! decodebin ! ffmpegcolorspace ";
const PATTERN_PIPELINE: &str = "videotestsrc pattern={source}";

/// Name of the sink element whose parameters are applied to the texture sink.
pub const SINK_ELEMENT: &str = "gltexturesink";

/// Broad kind of a source descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    Png,
    Jpeg,
    Rtsp,
    /// Synthetic frames, `pattern:<WxH>` or `pattern-bayer:<WxH>`.
    Pattern,
    Movie,
}

impl SourceKind {
    pub fn classify(descriptor: &str) -> Self {
        let lower = descriptor.to_ascii_lowercase();
        if lower.ends_with(".png") {
            SourceKind::Png
        } else if lower.ends_with(".jpg") || lower.ends_with(".jpeg") {
            SourceKind::Jpeg
        } else if lower.starts_with("rtsp:") {
            SourceKind::Rtsp
        } else if lower.starts_with("pattern:") || lower.starts_with("pattern-bayer:") {
            SourceKind::Pattern
        } else {
            SourceKind::Movie
        }
    }

    pub fn default_pipeline(self) -> &'static str {
        match self {
            SourceKind::Png => PNG_PIPELINE,
            SourceKind::Jpeg => JPEG_PIPELINE,
            SourceKind::Rtsp => RTSP_PIPELINE,
            SourceKind::Pattern => PATTERN_PIPELINE,
            SourceKind::Movie => MOVIE_PIPELINE,
        }
    }
}

/// Parameters given to the texture sink element.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SinkParams {
    values: BTreeMap<String, String>,
}

impl SinkParams {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    /// Force the source to be treated as raw Bayer data.
    pub fn is_bayer(&self) -> Option<bool> {
        self.get("is_bayer").and_then(parse_bool)
    }

    /// Requested GL internal texture format. Zero means the format follows
    /// the frames.
    pub fn texture_format(&self) -> Option<u32> {
        self.get("texture_format")
            .and_then(|v| match v.strip_prefix("0x").or_else(|| v.strip_prefix("0X")) {
                Some(hex) => u32::from_str_radix(hex, 16).ok(),
                None => v.parse().ok(),
            })
            .filter(|&format| format != 0)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

/// Everything a frame source needs to attach one stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRequest {
    /// What the user chose: a path, a URL or a pattern name.
    pub descriptor: String,
    pub kind: SourceKind,
    /// Pipeline description with `{source}` substituted and any sink
    /// element removed.
    pub pipeline: String,
    pub sink: SinkParams,
}

impl SourceRequest {
    /// Build a request, using the default pipeline for the descriptor's kind
    /// unless an override is given. An empty override counts as none.
    pub fn new(descriptor: &str, pipeline_override: Option<&str>) -> Self {
        let kind = SourceKind::classify(descriptor);
        let template = pipeline_override
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| kind.default_pipeline());
        let (template, sink) = split_sink_element(template);
        Self {
            descriptor: descriptor.to_owned(),
            kind,
            pipeline: template.replace("{source}", descriptor).trim().to_owned(),
            sink,
        }
    }
}

/// Strip a trailing texture sink element from `pipeline`, returning the rest
/// of the pipeline and the sink's parameters.
pub fn split_sink_element(pipeline: &str) -> (String, SinkParams) {
    let mut elements: Vec<&str> = pipeline.split('!').collect();
    let mut params = SinkParams::default();

    let last = elements.last().map(|e| e.trim()).unwrap_or_default();
    if !last.starts_with(SINK_ELEMENT) {
        return (pipeline.to_owned(), params);
    }
    elements.pop();

    for spec in last.split_whitespace().skip(1) {
        match spec.split_once('=') {
            Some((key, value)) if !key.is_empty() => params.insert(key, value.trim_matches('"')),
            _ => warn!(param = spec, "cannot set property on texture sink"),
        }
    }

    (elements.join("!"), params)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_descriptors() {
        assert_eq!(SourceKind::classify("left.PNG"), SourceKind::Png);
        assert_eq!(SourceKind::classify("/tmp/a.jpeg"), SourceKind::Jpeg);
        assert_eq!(SourceKind::classify("rtsp://192.168.0.9:554"), SourceKind::Rtsp);
        assert_eq!(SourceKind::classify("pattern-bayer:640x480"), SourceKind::Pattern);
        assert_eq!(SourceKind::classify("clip.mov"), SourceKind::Movie);
    }

    #[test]
    fn default_pipeline_substitutes_source() {
        let req = SourceRequest::new("left.png", None);
        assert_eq!(req.pipeline, "filesrc location=left.png ! pngdec");
        assert!(req.sink.is_empty());
    }

    #[test]
    fn empty_override_uses_default() {
        let req = SourceRequest::new("clip.avi", Some("  "));
        assert_eq!(req.pipeline, "filesrc location=clip.avi ! decodebin ! ffmpegcolorspace");
    }

    #[test]
    fn sink_element_is_stripped_and_parsed() {
        let req = SourceRequest::new(
            "rtsp://cam",
            Some("rtspsrc location={source} ! jpegdec ! gltexturesink is_bayer=true texture_format=0x1903 bogus"),
        );
        assert_eq!(req.pipeline, "rtspsrc location=rtsp://cam ! jpegdec");
        assert_eq!(req.sink.is_bayer(), Some(true));
        assert_eq!(req.sink.texture_format(), Some(0x1903));
        assert_eq!(req.sink.get("bogus"), None);
    }

    #[test]
    fn zero_texture_format_means_unset() {
        let req = SourceRequest::new(
            "left.png",
            Some("filesrc location={source} ! pngdec ! gltexturesink texture_format=0"),
        );
        assert_eq!(req.sink.texture_format(), None);
    }

    #[test]
    fn pipeline_without_sink_is_untouched() {
        let (rest, params) = split_sink_element("videotestsrc ! queue");
        assert_eq!(rest, "videotestsrc ! queue");
        assert!(params.is_empty());
    }
}
