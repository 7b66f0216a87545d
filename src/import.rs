// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Zero-copy import of producer dma-bufs as GPU textures.

use crate::{
    backend::Backend,
    error::Error,
    frame::{ColorSpace, FrameDescriptor, Handle},
};
use std::{collections::HashMap, os::fd::AsRawFd};
use tracing::{debug, warn};

// EGL_EXT_image_dma_buf_import
pub const EGL_LINUX_DMA_BUF_EXT: u32 = 0x3270;
pub const EGL_LINUX_DRM_FOURCC_EXT: i32 = 0x3271;
pub const EGL_DMA_BUF_PLANE0_FD_EXT: i32 = 0x3272;
pub const EGL_DMA_BUF_PLANE0_OFFSET_EXT: i32 = 0x3273;
pub const EGL_DMA_BUF_PLANE0_PITCH_EXT: i32 = 0x3274;
pub const EGL_DMA_BUF_PLANE1_FD_EXT: i32 = 0x3275;
pub const EGL_DMA_BUF_PLANE1_OFFSET_EXT: i32 = 0x3276;
pub const EGL_DMA_BUF_PLANE1_PITCH_EXT: i32 = 0x3277;
pub const EGL_DMA_BUF_PLANE2_FD_EXT: i32 = 0x3278;
pub const EGL_DMA_BUF_PLANE2_OFFSET_EXT: i32 = 0x3279;
pub const EGL_DMA_BUF_PLANE2_PITCH_EXT: i32 = 0x327A;
pub const EGL_YUV_COLOR_SPACE_HINT_EXT: i32 = 0x327B;
pub const EGL_SAMPLE_RANGE_HINT_EXT: i32 = 0x327C;
pub const EGL_ITU_REC601_EXT: i32 = 0x327F;
pub const EGL_ITU_REC709_EXT: i32 = 0x3280;
pub const EGL_YUV_FULL_RANGE_EXT: i32 = 0x3282;
pub const EGL_YUV_NARROW_RANGE_EXT: i32 = 0x3283;

const EGL_WIDTH: i32 = 0x3057;
const EGL_HEIGHT: i32 = 0x3056;
const EGL_NONE: i32 = 0x3038;

/// DRM_FORMAT_YUV420, three planes Y, U, V.
pub const DRM_FORMAT_YUV420: u32 = u32::from_le_bytes(*b"YU12");

/// Returns the `(encoding, range)` import hints for a colour space.
///
/// Untagged and unrecognized colour spaces fall back to BT.601 narrow range
/// with a warning.
pub fn colour_hints(color_space: Option<ColorSpace>) -> (i32, i32) {
    let mut encoding = EGL_ITU_REC601_EXT;
    let mut range = EGL_YUV_NARROW_RANGE_EXT;

    match color_space {
        Some(ColorSpace::Sycc) => range = EGL_YUV_FULL_RANGE_EXT,
        Some(ColorSpace::Smpte170m) => {}
        Some(ColorSpace::Rec709) => encoding = EGL_ITU_REC709_EXT,
        Some(cs) => warn!("unexpected colour space {cs}, using smpte170m"),
        None => warn!("frame has no colour space, using smpte170m"),
    }

    (encoding, range)
}

/// Builds the `EGL_LINUX_DMA_BUF_EXT` attribute list for a single-fd planar
/// YUV 4:2:0 buffer: luma at offset 0, U after the luma plane and V right
/// after U, both chroma planes at half stride and half height.
pub fn dmabuf_attributes(handle: Handle, descriptor: &FrameDescriptor) -> Vec<i32> {
    let fd = handle.as_raw_fd();
    let stride = descriptor.stride as i32;
    let height = descriptor.height as i32;
    let (encoding, range) = colour_hints(descriptor.color_space);

    let u_offset = stride * height;
    let v_offset = u_offset + (stride / 2) * (height / 2);

    vec![
        EGL_WIDTH,
        descriptor.width as i32,
        EGL_HEIGHT,
        height,
        EGL_LINUX_DRM_FOURCC_EXT,
        DRM_FORMAT_YUV420 as i32,
        EGL_DMA_BUF_PLANE0_FD_EXT,
        fd,
        EGL_DMA_BUF_PLANE0_OFFSET_EXT,
        0,
        EGL_DMA_BUF_PLANE0_PITCH_EXT,
        stride,
        EGL_DMA_BUF_PLANE1_FD_EXT,
        fd,
        EGL_DMA_BUF_PLANE1_OFFSET_EXT,
        u_offset,
        EGL_DMA_BUF_PLANE1_PITCH_EXT,
        stride / 2,
        EGL_DMA_BUF_PLANE2_FD_EXT,
        fd,
        EGL_DMA_BUF_PLANE2_OFFSET_EXT,
        v_offset,
        EGL_DMA_BUF_PLANE2_PITCH_EXT,
        stride / 2,
        EGL_YUV_COLOR_SPACE_HINT_EXT,
        encoding,
        EGL_SAMPLE_RANGE_HINT_EXT,
        range,
        EGL_NONE,
    ]
}

/// A producer buffer that has been imported as a GPU texture.
///
/// The texture is a view of memory the producer still owns; it must not be
/// sampled once the producer has been told the buffer is free.
#[derive(Debug)]
pub struct ImportedBuffer<T> {
    pub handle: Handle,
    pub size: usize,
    pub descriptor: FrameDescriptor,
    pub texture: T,
}

/// Maps buffer handles to their imported textures. Each handle is imported
/// at most once until [`ImportCache::evict_all`].
#[derive(Debug)]
pub struct ImportCache<T> {
    buffers: HashMap<Handle, ImportedBuffer<T>>,
}

impl<T> Default for ImportCache<T> {
    fn default() -> Self {
        Self {
            buffers: HashMap::new(),
        }
    }
}

impl<T: Copy> ImportCache<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the texture for `handle`, importing the buffer the first time
    /// the handle is seen. A failed import leaves the cache untouched.
    pub fn get_or_import<B>(
        &mut self,
        backend: &mut B,
        handle: Handle,
        size: usize,
        descriptor: &FrameDescriptor,
    ) -> Result<T, Error>
    where
        B: Backend<Texture = T>,
    {
        if let Some(buffer) = self.buffers.get(&handle) {
            return Ok(buffer.texture);
        }

        let texture = backend.import_dmabuf(handle, size, descriptor)?;
        debug!("imported {handle} {descriptor} size: {size}");
        self.buffers.insert(
            handle,
            ImportedBuffer {
                handle,
                size,
                descriptor: *descriptor,
                texture,
            },
        );
        Ok(texture)
    }

    /// Deletes every imported texture and forgets all handles.
    pub fn evict_all<B>(&mut self, backend: &mut B)
    where
        B: Backend<Texture = T>,
    {
        for (handle, buffer) in self.buffers.drain() {
            backend.delete_texture(buffer.texture);
            debug!("evicted {handle}");
        }
    }

    pub fn get(&self, handle: Handle) -> Option<&ImportedBuffer<T>> {
        self.buffers.get(&handle)
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }
}
