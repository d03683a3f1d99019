//! GLSL version detection and per-version source preludes.

use glium::CapabilitiesSource;
use stereo_core::ShaderStage;

/// GLSL dialects the shader sources are written for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GlslVersion {
    Glsl120,
    Glsl140,
}

impl GlslVersion {
    /// Text placed before the defines and the shader source.
    ///
    /// The sources are written in 1.20 style (`attribute`, `varying`,
    /// `texture2D`) and write their result to `fragColor`; the 1.40 prelude
    /// maps those names onto the newer keywords.
    pub fn prelude(self, stage: ShaderStage) -> &'static str {
        match (self, stage) {
            (GlslVersion::Glsl120, ShaderStage::Fragment) => {
                "#version 120\n#define fragColor gl_FragColor\n"
            }
            (GlslVersion::Glsl120, _) => "#version 120\n",
            (GlslVersion::Glsl140, ShaderStage::Vertex) => {
                "#version 140\n#define attribute in\n#define varying out\n"
            }
            (GlslVersion::Glsl140, ShaderStage::Fragment) => {
                "#version 140\n#define varying in\n#define texture2D texture\nout vec4 fragColor;\n"
            }
            (GlslVersion::Glsl140, ShaderStage::Geometry) => "#version 140\n",
        }
    }
}

/// Dialects in order of preference, with the desktop GLSL version each needs.
const PREFERENCE: [(GlslVersion, u8, u8); 2] = [
    (GlslVersion::Glsl140, 1, 4),
    (GlslVersion::Glsl120, 1, 2),
];

/// Newest dialect the shaders can be built with on this context. GLSL ES
/// versions do not count.
pub fn best_glsl_version(ctx: &impl CapabilitiesSource) -> Option<GlslVersion> {
    pick_dialect(&ctx.get_capabilities().supported_glsl_versions)
}

fn pick_dialect(supported: &[glium::Version]) -> Option<GlslVersion> {
    PREFERENCE.iter().find_map(|&(dialect, major, minor)| {
        supported
            .contains(&glium::Version(glium::Api::Gl, major, minor))
            .then_some(dialect)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preludes_start_with_version() {
        for version in [GlslVersion::Glsl120, GlslVersion::Glsl140] {
            for stage in [ShaderStage::Vertex, ShaderStage::Fragment, ShaderStage::Geometry] {
                assert!(version.prelude(stage).starts_with("#version 1"));
            }
        }
    }

    #[test]
    fn fragment_preludes_provide_frag_color() {
        assert!(GlslVersion::Glsl120
            .prelude(ShaderStage::Fragment)
            .contains("fragColor gl_FragColor"));
        assert!(GlslVersion::Glsl140
            .prelude(ShaderStage::Fragment)
            .contains("out vec4 fragColor"));
    }

    #[test]
    fn newest_desktop_dialect_wins() {
        use glium::{Api, Version};

        let both = [Version(Api::Gl, 1, 2), Version(Api::Gl, 1, 4)];
        assert_eq!(pick_dialect(&both), Some(GlslVersion::Glsl140));
        assert_eq!(pick_dialect(&both[..1]), Some(GlslVersion::Glsl120));
        assert_eq!(pick_dialect(&[Version(Api::GlEs, 1, 4)]), None);
        assert_eq!(pick_dialect(&[]), None);
    }
}
