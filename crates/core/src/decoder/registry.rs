//! Codec name → decoder factory maps.
//!
//! Names come from the SDP `a=rtpmap` encoding name, which servers spell
//! inconsistently (`H264`, `h264`, `MPEG4-GENERIC`), so lookups are
//! case-insensitive. Registering an existing name replaces its factory.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::{AacLatmDecoder, AudioDecoder, DecoderContext, H264Decoder, H265Decoder, VideoDecoder};

pub type AudioDecoderFactory = Arc<dyn Fn(&DecoderContext) -> Box<dyn AudioDecoder> + Send + Sync>;
pub type VideoDecoderFactory = Arc<dyn Fn(&DecoderContext) -> Box<dyn VideoDecoder> + Send + Sync>;

pub struct DecoderRegistry<F> {
    factories: HashMap<String, F>,
}

impl<F: Clone> DecoderRegistry<F> {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register `factory` under `name`; returns the factory it replaced.
    pub fn register(&mut self, name: &str, factory: F) -> Option<F> {
        self.factories.insert(name.to_ascii_lowercase(), factory)
    }

    pub fn get(&self, name: &str) -> Option<F> {
        self.factories.get(&name.to_ascii_lowercase()).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(&name.to_ascii_lowercase())
    }

    /// Registered names, lower-cased and sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }
}

impl<F: Clone> Default for DecoderRegistry<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F> fmt::Debug for DecoderRegistry<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.factories.keys()).finish()
    }
}

impl DecoderRegistry<AudioDecoderFactory> {
    /// `mpeg4-generic` → [`AacLatmDecoder`].
    pub fn with_builtin_audio() -> Self {
        let mut registry = Self::new();
        registry.register(
            "mpeg4-generic",
            Arc::new(|ctx: &DecoderContext| Box::new(AacLatmDecoder::new(ctx.clone())) as Box<dyn AudioDecoder>),
        );
        registry
    }
}

impl DecoderRegistry<VideoDecoderFactory> {
    /// `H264` → [`H264Decoder`], `H265` → [`H265Decoder`].
    pub fn with_builtin_video() -> Self {
        let mut registry = Self::new();
        registry.register(
            "H264",
            Arc::new(|ctx: &DecoderContext| Box::new(H264Decoder::new(ctx.clone())) as Box<dyn VideoDecoder>),
        );
        registry.register(
            "H265",
            Arc::new(|ctx: &DecoderContext| Box::new(H265Decoder::new(ctx.clone())) as Box<dyn VideoDecoder>),
        );
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_ignores_case() {
        let mut r: DecoderRegistry<u32> = DecoderRegistry::new();
        r.register("MPEG4-Generic", 1);
        assert_eq!(r.get("mpeg4-generic"), Some(1));
        assert_eq!(r.get("MPEG4-GENERIC"), Some(1));
        assert!(r.get("opus").is_none());
    }

    #[test]
    fn register_replaces() {
        let mut r: DecoderRegistry<u32> = DecoderRegistry::new();
        assert_eq!(r.register("h264", 1), None);
        assert_eq!(r.register("H264", 2), Some(1));
        assert_eq!(r.get("h264"), Some(2));
        assert_eq!(r.names(), vec!["h264".to_string()]);
    }

    #[test]
    fn builtins() {
        let audio = DecoderRegistry::with_builtin_audio();
        let video = DecoderRegistry::with_builtin_video();
        assert_eq!(audio.names(), vec!["mpeg4-generic"]);
        assert_eq!(video.names(), vec!["h264", "h265"]);
    }
}
