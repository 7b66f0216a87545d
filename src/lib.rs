// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! # EdgeFirst Preview Library
//!
//! This library displays camera frames living in DMA buffers in an X11
//! window, using EGL and OpenGL ES without copying the frame data. It is
//! meant to sit at the end of a capture pipeline: the producer hands over a
//! buffer, the preview shows it, and tells the producer when the buffer may
//! be reused.
//!
//! ## Features
//!
//! - **Zero-copy import**: planar YUV 4:2:0 dma-bufs are imported once per
//!   file descriptor as external EGL images, colour conversion is done by
//!   the GPU using the frame's colour space hints.
//! - **Letterboxing**: frames keep their aspect ratio whatever the window
//!   size.
//! - **Buffer release**: the previous frame is released right after the
//!   current one is presented, so the preview never holds more than two
//!   buffers.
//! - **Countdown overlay**: a fading digit, or a white flash, drawn over the
//!   frame.
//!
//! ## Example
//!
//! ```no_run
//! use edgefirst_preview::{ColorSpace, FrameDescriptor, Handle, Preview, PreviewOptions};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut preview = Preview::open(&PreviewOptions::default(), |handle: Handle| {
//!     println!("{handle} released");
//! })?;
//! let (max_width, max_height) = preview.max_image_size();
//! println!("frames up to {max_width}x{max_height}");
//!
//! let desc = FrameDescriptor::new(1280, 720, 1280, Some(ColorSpace::Rec709));
//! # let fd = 3;
//! preview.show_overlay(3, 1.0);
//! preview.display(Handle::from_raw_fd(fd), desc.size(), &desc)?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Platform Requirements
//!
//! - **Linux** with an X server, libX11 and libEGL (both loaded at runtime)
//! - EGL extensions `EGL_EXT_image_dma_buf_import`, `EGL_KHR_image_base` and
//!   GLES extension `GL_OES_EGL_image_external`
//!
//! ## Safety
//!
//! X11, EGL and GL calls are `unsafe` FFI; they are confined to the
//! [`surface`] and [`gles`] modules. The rest of the crate goes through the
//! safe [`Backend`] trait.

pub mod backend;
pub mod error;
pub mod frame;
pub mod gles;
pub mod glyph;
pub mod import;
pub mod preview;
pub mod shader;
pub mod surface;

pub use backend::{Backend, Quad};
pub use error::Error;
pub use frame::{ColorSpace, FrameDescriptor, Handle};
pub use gles::{GlesBackend, PreviewOptions};
pub use glyph::GlyphRaster;
pub use preview::{OverlayState, Preview, Stage};
pub use surface::{Geometry, WindowOptions};
