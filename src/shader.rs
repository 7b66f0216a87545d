// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use crate::{
    backend::{Backend, Quad},
    error::Error,
};
use tracing::debug;

/// Samples the imported YUV buffer through the external image target; the
/// driver applies the colour conversion described by the import hints.
pub const IMAGE_FRAGMENT_SHADER: &str = "#extension GL_OES_EGL_image_external : enable
precision mediump float;
uniform samplerExternalOES s;
varying vec2 texcoord;
void main() {
  gl_FragColor = texture2D(s, texcoord);
}
";

/// Grows the glyph quad as it fades out and scales the glyph's alpha by the
/// fade factor.
pub const OVERLAY_VERTEX_SHADER: &str = "attribute vec4 pos;
attribute vec2 texcoord;
uniform float ialphafac;
varying vec2 tc;
varying float alphafac;
void main() {
  vec4 tmp = pos;
  tmp.xy *= 2.0 - ialphafac;
  gl_Position = tmp;
  tc = texcoord;
  alphafac = ialphafac;
}
";

pub const OVERLAY_FRAGMENT_SHADER: &str = "precision mediump float;
uniform sampler2D sc;
varying vec2 tc;
varying float alphafac;
void main() {
  vec4 tmp = texture2D(sc, tc);
  tmp.a *= alphafac;
  gl_FragColor = tmp;
}
";

/// Name of the fade factor uniform of the overlay program.
pub const OVERLAY_ALPHA_UNIFORM: &str = "ialphafac";

/// Letterbox factors for showing a `base` sized image in a `window` sized
/// surface.
///
/// The result is the fraction of each window axis covered by the image: the
/// dominant axis is `1.0`, the other is shrunk so the aspect ratio is kept.
pub fn letterbox(base: (u32, u32), window: (u32, u32)) -> (f32, f32) {
    let w_factor = base.0 as f32 / window.0 as f32;
    let h_factor = base.1 as f32 / window.1 as f32;
    let max_dimension = w_factor.max(h_factor);

    (w_factor / max_dimension, h_factor / max_dimension)
}

/// Quad covering the letterboxed image area.
pub fn image_quad(scale: (f32, f32)) -> Quad {
    let (w, h) = scale;
    [-w, -h, w, -h, w, h, -w, h]
}

/// Vertex shader for the image program with the letterbox factors baked
/// into the texture coordinate mapping.
pub fn image_vertex_shader(scale: (f32, f32)) -> String {
    format!(
        "attribute vec4 pos;
varying vec2 texcoord;

void main() {{
  gl_Position = pos;
  texcoord.x = pos.x / {:.6} + 0.5;
  texcoord.y = 0.5 - pos.y / {:.6};
}}
",
        2.0 * scale.0,
        2.0 * scale.1
    )
}

/// The two compiled programs used to draw a frame.
pub struct ShaderSet<B: Backend> {
    pub image: B::Program,
    pub overlay: B::Program,
    pub overlay_alpha: Option<B::Uniform>,
    pub image_quad: Quad,
    pub scale: (f32, f32),
}

impl<B: Backend> ShaderSet<B> {
    /// Compiles the image and overlay programs for a `base` sized frame
    /// shown in a `window` sized surface.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ShaderCompile`] with the compiler log and the shader
    /// source, or [`Error::ShaderLink`] with the linker log.
    pub fn compile(backend: &mut B, base: (u32, u32), window: (u32, u32)) -> Result<Self, Error> {
        let scale = letterbox(base, window);

        let image = backend.link_program(
            &image_vertex_shader(scale),
            IMAGE_FRAGMENT_SHADER,
            &["pos"],
        )?;
        let overlay = match backend.link_program(
            OVERLAY_VERTEX_SHADER,
            OVERLAY_FRAGMENT_SHADER,
            &["pos", "texcoord"],
        ) {
            Ok(program) => program,
            Err(e) => {
                backend.delete_program(image);
                return Err(e);
            }
        };
        let overlay_alpha = backend.uniform_location(overlay, OVERLAY_ALPHA_UNIFORM);

        debug!(
            "compiled shaders for {}x{} in {}x{} letterbox: {:?}",
            base.0, base.1, window.0, window.1, scale
        );

        Ok(Self {
            image,
            overlay,
            overlay_alpha,
            image_quad: image_quad(scale),
            scale,
        })
    }

    pub fn release(self, backend: &mut B) {
        backend.delete_program(self.image);
        backend.delete_program(self.overlay);
    }
}
