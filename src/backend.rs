// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use crate::{
    error::Error,
    frame::{FrameDescriptor, Handle},
};
use core::fmt;

/// Four 2D vertices in normalized device coordinates, drawn as a triangle
/// fan.
pub type Quad = [f32; 8];

/// Window and GPU operations required by the [`Preview`] compositor.
///
/// [`GlesBackend`] is the production implementation on top of X11, EGL and
/// OpenGL ES 2. Every method that touches GPU objects requires the context
/// to be bound on the calling thread through [`Backend::bind_context`].
///
/// [`Preview`]: crate::preview::Preview
/// [`GlesBackend`]: crate::gles::GlesBackend
pub trait Backend {
    type Texture: Copy + fmt::Debug;
    type Program: Copy + fmt::Debug;
    type Uniform: Clone + fmt::Debug;

    /// Size of the presentation surface in pixels.
    fn window_size(&self) -> (u32, u32);

    /// Largest texture dimension supported by the GPU.
    fn max_texture_size(&self) -> u32;

    /// Drains pending window events, returns whether a close was requested.
    /// Never blocks.
    fn poll_close_requested(&mut self) -> bool;

    fn set_title(&mut self, title: &str);

    fn bind_context(&mut self) -> Result<(), Error>;

    fn release_context(&mut self) -> Result<(), Error>;

    /// Wraps the planar YUV 4:2:0 dma-buf behind `handle` as an external
    /// texture without copying it.
    fn import_dmabuf(
        &mut self,
        handle: Handle,
        size: usize,
        descriptor: &FrameDescriptor,
    ) -> Result<Self::Texture, Error>;

    /// Uploads tightly packed RGBA8 pixels as a clamped, bilinear 2D texture.
    fn upload_rgba(&mut self, width: u32, height: u32, pixels: &[u8])
        -> Result<Self::Texture, Error>;

    fn delete_texture(&mut self, texture: Self::Texture);

    /// Compiles and links a program. `attributes[i]` is bound to vertex
    /// attribute location `i`.
    fn link_program(
        &mut self,
        vertex: &str,
        fragment: &str,
        attributes: &[&str],
    ) -> Result<Self::Program, Error>;

    fn uniform_location(&mut self, program: Self::Program, name: &str) -> Option<Self::Uniform>;

    fn delete_program(&mut self, program: Self::Program);

    fn enable_blending(&mut self);

    fn clear(&mut self);

    fn draw_image(&mut self, program: Self::Program, texture: Self::Texture, quad: &Quad);

    fn draw_overlay(
        &mut self,
        program: Self::Program,
        alpha: Option<&Self::Uniform>,
        fade: f32,
        texture: Self::Texture,
        quad: &Quad,
        texcoords: &Quad,
    );

    /// Presents the back buffer. May block until the display is ready.
    fn present(&mut self) -> Result<(), Error>;
}
