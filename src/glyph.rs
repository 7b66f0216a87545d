// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Digit glyphs for the countdown overlay.

use crate::{
    backend::{Backend, Quad},
    error::Error,
};
use fontdue::{Font, FontSettings};
use std::{collections::BTreeMap, fs, path::Path};
use tracing::debug;

/// Number of glyphs in the atlas, digits `0` to `9`.
pub const GLYPH_COUNT: u8 = 10;

/// Glyph id drawn as a full screen white backdrop instead of a digit.
pub const BACKDROP_GLYPH: u8 = 0;

/// Rasterization size of the digits in pixels.
pub const FONT_SIZE: f32 = 400.0;

/// Font used by the camera image when none is configured.
pub const DEFAULT_FONT: &str = "/usr/share/fonts/truetype/piboto/Piboto-Regular.ttf";

/// Texture coordinates matching the vertex order of every glyph quad.
pub const GLYPH_TEXCOORDS: Quad = [0.0, 1.0, 1.0, 1.0, 1.0, 0.0, 0.0, 0.0];

const UNIT_QUAD: Quad = [-1.0, -1.0, 1.0, -1.0, 1.0, 1.0, -1.0, 1.0];
const BACKDROP_SCALE: f32 = 4.0;

/// An 8-bit coverage bitmap, one byte per pixel, rows top to bottom.
#[derive(Clone, Debug, PartialEq)]
pub struct GlyphRaster {
    pub width: u32,
    pub height: u32,
    pub coverage: Vec<u8>,
}

/// Loads the font at `path` and rasterizes the digits `0` to `9` at `size`
/// pixels.
pub fn rasterize_digits(path: &Path, size: f32) -> Result<Vec<GlyphRaster>, Error> {
    let data = fs::read(path)
        .map_err(|e| Error::Font(format!("Error loading font {}: {e}", path.display())))?;
    let font = Font::from_bytes(data, FontSettings::default())
        .map_err(|e| Error::Font(format!("Error parsing font {}: {e}", path.display())))?;

    let rasters = (0..GLYPH_COUNT)
        .map(|id| {
            let (metrics, coverage) = font.rasterize(char::from(b'0' + id), size);
            GlyphRaster {
                width: metrics.width as u32,
                height: metrics.height as u32,
                coverage,
            }
        })
        .collect();
    debug!("rasterized digits from {} at {size}px", path.display());
    Ok(rasters)
}

/// Expands a coverage bitmap to RGBA with the coverage copied into every
/// channel, so the glyph blends as a soft white shape.
pub fn coverage_to_rgba(coverage: &[u8]) -> Vec<u8> {
    coverage.iter().flat_map(|&c| [c, c, c, c]).collect()
}

/// Opaque white RGBA pixels.
pub fn backdrop_rgba(width: u32, height: u32) -> Vec<u8> {
    vec![0xff; width as usize * height as usize * 4]
}

/// Screen space quad of a glyph.
///
/// Digits are centered and keep their rasterized pixel size whatever the
/// window resolution; the backdrop is four times the unit quad.
pub fn glyph_quad(id: u8, size: (u32, u32), window: (u32, u32)) -> Quad {
    let mut quad = UNIT_QUAD;
    for vertex in quad.chunks_mut(2) {
        if id == BACKDROP_GLYPH {
            vertex[0] *= BACKDROP_SCALE;
            vertex[1] *= BACKDROP_SCALE;
        } else {
            vertex[0] = vertex[0] * size.0 as f32 / window.0 as f32;
            vertex[1] = vertex[1] * size.1 as f32 / window.1 as f32;
        }
    }
    quad
}

/// One uploaded glyph.
#[derive(Copy, Clone, Debug)]
pub struct GlyphQuad<T> {
    pub id: u8,
    pub texture: T,
    pub verts: Quad,
}

/// Glyph textures and quads, keyed by glyph id.
pub struct GlyphAtlas<B: Backend> {
    glyphs: BTreeMap<u8, GlyphQuad<B::Texture>>,
}

impl<B: Backend> Default for GlyphAtlas<B> {
    fn default() -> Self {
        Self {
            glyphs: BTreeMap::new(),
        }
    }
}

impl<B: Backend> GlyphAtlas<B> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Uploads one texture per raster, index `i` becoming glyph id `i`.
    ///
    /// Any glyphs from a previous build are released first.
    pub fn build(
        &mut self,
        backend: &mut B,
        rasters: &[GlyphRaster],
        window: (u32, u32),
    ) -> Result<(), Error> {
        self.clear(backend);

        for (id, raster) in (0..GLYPH_COUNT).zip(rasters) {
            let (width, height) = (raster.width.max(1), raster.height.max(1));
            let pixels = if id == BACKDROP_GLYPH {
                backdrop_rgba(width, height)
            } else if raster.coverage.is_empty() {
                // blank glyph, still needs a texture
                vec![0; width as usize * height as usize * 4]
            } else {
                coverage_to_rgba(&raster.coverage)
            };

            let texture = backend.upload_rgba(width, height, &pixels)?;
            self.glyphs.insert(
                id,
                GlyphQuad {
                    id,
                    texture,
                    verts: glyph_quad(id, (raster.width, raster.height), window),
                },
            );
        }

        debug!("glyph atlas built with {} glyphs", self.glyphs.len());
        Ok(())
    }

    pub fn clear(&mut self, backend: &mut B) {
        for glyph in std::mem::take(&mut self.glyphs).into_values() {
            backend.delete_texture(glyph.texture);
        }
    }

    pub fn get(&self, id: u8) -> Option<&GlyphQuad<B::Texture>> {
        self.glyphs.get(&id)
    }

    pub fn len(&self) -> usize {
        self.glyphs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.glyphs.is_empty()
    }
}
