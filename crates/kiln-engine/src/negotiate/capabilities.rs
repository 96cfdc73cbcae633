use crate::config::ApiVersion;
use crate::driver::DriverInfo;

/// Layers a 2D array texture must support to hold a split tile map.
const MIN_ARRAY_LAYERS: u32 = 256;

/// Edge a 3D texture must support to hold a split tile map.
const MIN_3D_SIZE: u32 = 256;

pub const EXT_TEXTURE_ARRAY: &str = "GL_EXT_texture_array";
pub const ARB_TEXTURE_NPOT: &str = "GL_ARB_texture_non_power_of_two";

/// What the negotiated context lets the engine do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    pub tile_buffering: bool,
    pub quad_buffering: bool,
    pub text_buffering: bool,
    pub quad_container_buffering: bool,
    pub mipmapping: bool,
    pub npot_textures: bool,
    pub textures_3d: bool,
    pub texture_2d_array: bool,
    pub texture_2d_array_as_extension: bool,
    pub shaders: bool,
}

impl Capabilities {
    /// Derives capabilities for `requested` on a driver reporting `info`.
    ///
    /// The second value is set when the driver cannot serve the request and
    /// names the version to renegotiate with.
    pub fn derive(
        requested: ApiVersion,
        info: &DriverInfo,
        loader: ApiVersion,
    ) -> (Self, Option<ApiVersion>) {
        let has_ext = |name: &str| info.extensions.iter().any(|ext| ext == name);
        let mut caps = Capabilities {
            npot_textures: true,
            ..Capabilities::default()
        };

        if requested.is_core() {
            return (
                Capabilities {
                    tile_buffering: true,
                    quad_buffering: true,
                    text_buffering: true,
                    quad_container_buffering: true,
                    mipmapping: true,
                    npot_textures: true,
                    textures_3d: true,
                    texture_2d_array: true,
                    texture_2d_array_as_extension: false,
                    shaders: true,
                },
                None,
            );
        }

        let mut fallback = None;
        match requested.major {
            3 => {
                caps.mipmapping = true;
                caps.shaders = true;
                caps.texture_2d_array = info.max_array_layers >= MIN_ARRAY_LAYERS;
                caps.textures_3d = info.max_3d_size >= MIN_3D_SIZE;
                if !caps.textures_3d && !caps.texture_2d_array {
                    fallback = Some(ApiVersion::LEGACY_FALLBACK);
                }
                caps.tile_buffering = caps.texture_2d_array || caps.textures_3d;
            }
            2 => {
                caps.mipmapping = true;
                caps.shaders = requested.minor >= 1;
                caps.textures_3d = info.max_3d_size >= MIN_3D_SIZE;
                if caps.shaders
                    && has_ext(EXT_TEXTURE_ARRAY)
                    && info.max_array_layers >= MIN_ARRAY_LAYERS
                {
                    caps.texture_2d_array = true;
                    caps.texture_2d_array_as_extension = true;
                }
                caps.tile_buffering = caps.texture_2d_array || caps.textures_3d;
                caps.npot_textures = has_ext(ARB_TEXTURE_NPOT) || loader.major > 2;

                if !caps.npot_textures || (!caps.textures_3d && !caps.texture_2d_array) {
                    fallback = Some(ApiVersion::LEGACY_FALLBACK);
                }
            }
            _ => {
                caps.npot_textures = false;
            }
        }

        (caps, fallback)
    }

    /// Whether layered textures of either kind exist.
    pub fn has_layered_textures(&self) -> bool {
        self.texture_2d_array || self.textures_3d
    }
}
