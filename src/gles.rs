// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use crate::{
    backend::{Backend, Quad},
    error::Error,
    frame::{FrameDescriptor, Handle},
    glyph::{rasterize_digits, DEFAULT_FONT, FONT_SIZE},
    import::{dmabuf_attributes, EGL_LINUX_DMA_BUF_EXT},
    preview::Preview,
    surface::{Surface, WindowOptions},
};
use glow::HasContext;
use std::{
    ffi::c_void,
    mem,
    path::PathBuf,
    ptr::{null, null_mut},
};
use tracing::{debug, warn};

/// GL_OES_EGL_image_external texture target.
pub const GL_TEXTURE_EXTERNAL_OES: u32 = 0x8D65;

type CreateImageKhr =
    unsafe extern "system" fn(*mut c_void, *mut c_void, u32, *mut c_void, *const i32) -> *mut c_void;
type DestroyImageKhr = unsafe extern "system" fn(*mut c_void, *mut c_void) -> u32;
type ImageTargetTexture2dOes = unsafe extern "system" fn(u32, *mut c_void);

/// Settings for [`Preview::open`].
#[derive(Clone, Debug)]
pub struct PreviewOptions {
    /// Window and icon name.
    pub name: String,
    pub window: WindowOptions,
    /// Font for the countdown digits, `None` disables the overlay.
    pub font: Option<PathBuf>,
    pub font_size: f32,
}

impl Default for PreviewOptions {
    fn default() -> Self {
        Self {
            name: "edgefirst-preview".to_string(),
            window: WindowOptions::default(),
            font: Some(PathBuf::from(DEFAULT_FONT)),
            font_size: FONT_SIZE,
        }
    }
}

impl Preview<GlesBackend> {
    /// Opens the preview window on the default X display.
    ///
    /// A font that cannot be loaded is logged and leaves the countdown
    /// overlay disabled; the preview itself still works.
    pub fn open<F>(options: &PreviewOptions, release: F) -> Result<Self, Error>
    where
        F: FnMut(Handle) + 'static,
    {
        let backend = GlesBackend::new(Surface::new(&options.name, &options.window)?)?;

        let rasters = match &options.font {
            Some(path) => match rasterize_digits(path, options.font_size) {
                Ok(rasters) => Some(rasters),
                Err(e) => {
                    warn!("{e}, countdown overlay disabled");
                    None
                }
            },
            None => None,
        };

        Ok(Preview::new(backend, rasters, release))
    }
}

/// OpenGL ES 2 renderer drawing into a [`Surface`].
pub struct GlesBackend {
    gl: glow::Context,
    vbo: Option<glow::NativeBuffer>,
    create_image: CreateImageKhr,
    destroy_image: DestroyImageKhr,
    image_target_texture: ImageTargetTexture2dOes,
    // dropped last, the GL objects above belong to its context
    surface: Surface,
}

impl GlesBackend {
    /// Loads the GL entry points for `surface`.
    ///
    /// The context is bound only while loading, since the GL version is read
    /// at that point, and is left unbound for the render thread.
    pub fn new(surface: Surface) -> Result<Self, Error> {
        surface.make_current()?;
        let gl = unsafe {
            glow::Context::from_loader_function(|name| {
                surface
                    .proc_address(name)
                    .map_or(null(), |f| f as *const c_void)
            })
        };
        surface.release_current()?;
        debug!("GL {:?}", gl.version());

        let create_image = surface
            .proc_address("eglCreateImageKHR")
            .ok_or(Error::MissingExtension("eglCreateImageKHR"))?;
        let destroy_image = surface
            .proc_address("eglDestroyImageKHR")
            .ok_or(Error::MissingExtension("eglDestroyImageKHR"))?;
        let image_target_texture = surface
            .proc_address("glEGLImageTargetTexture2DOES")
            .ok_or(Error::MissingExtension("glEGLImageTargetTexture2DOES"))?;

        Ok(Self {
            gl,
            vbo: None,
            create_image: unsafe { mem::transmute::<extern "system" fn(), CreateImageKhr>(create_image) },
            destroy_image: unsafe {
                mem::transmute::<extern "system" fn(), DestroyImageKhr>(destroy_image)
            },
            image_target_texture: unsafe {
                mem::transmute::<extern "system" fn(), ImageTargetTexture2dOes>(
                    image_target_texture,
                )
            },
            surface,
        })
    }

    pub fn surface(&self) -> &Surface {
        &self.surface
    }

    /// Uploads `vertices` into the shared vertex buffer, leaving it bound.
    fn upload_vertices(&mut self, vertices: &[f32]) {
        let gl = &self.gl;
        unsafe {
            let vbo = match self.vbo {
                Some(vbo) => vbo,
                None => match gl.create_buffer() {
                    Ok(vbo) => *self.vbo.insert(vbo),
                    Err(e) => {
                        warn!("glGenBuffers failed: {e}");
                        return;
                    }
                },
            };
            gl.bind_buffer(glow::ARRAY_BUFFER, Some(vbo));
            gl.buffer_data_u8_slice(
                glow::ARRAY_BUFFER,
                bytemuck::cast_slice(vertices),
                glow::STREAM_DRAW,
            );
        }
    }

    fn compile_shader(&self, kind: u32, source: &str) -> Result<glow::NativeShader, Error> {
        let gl = &self.gl;
        unsafe {
            let shader = gl.create_shader(kind).map_err(Error::gl("glCreateShader"))?;
            gl.shader_source(shader, source);
            gl.compile_shader(shader);

            if !gl.get_shader_compile_status(shader) {
                let log = gl.get_shader_info_log(shader);
                gl.delete_shader(shader);
                return Err(Error::ShaderCompile {
                    log,
                    text: source.to_string(),
                });
            }
            Ok(shader)
        }
    }
}

impl Backend for GlesBackend {
    type Texture = glow::NativeTexture;
    type Program = glow::NativeProgram;
    type Uniform = glow::NativeUniformLocation;

    fn window_size(&self) -> (u32, u32) {
        self.surface.size()
    }

    fn max_texture_size(&self) -> u32 {
        self.surface.max_texture_size()
    }

    fn poll_close_requested(&mut self) -> bool {
        self.surface.poll_close_requested()
    }

    fn set_title(&mut self, title: &str) {
        self.surface.set_title(title)
    }

    fn bind_context(&mut self) -> Result<(), Error> {
        self.surface.make_current()
    }

    fn release_context(&mut self) -> Result<(), Error> {
        self.surface.release_current()
    }

    fn import_dmabuf(
        &mut self,
        handle: Handle,
        _size: usize,
        descriptor: &FrameDescriptor,
    ) -> Result<Self::Texture, Error> {
        let attribs = dmabuf_attributes(handle, descriptor);
        let display = self.surface.egl_display().as_ptr();

        let image = unsafe {
            (self.create_image)(
                display,
                null_mut(),
                EGL_LINUX_DMA_BUF_EXT,
                null_mut(),
                attribs.as_ptr(),
            )
        };
        if image.is_null() {
            return Err(Error::Import(handle));
        }

        let gl = &self.gl;
        let texture = unsafe {
            match gl.create_texture() {
                Ok(texture) => {
                    gl.bind_texture(GL_TEXTURE_EXTERNAL_OES, Some(texture));
                    gl.tex_parameter_i32(
                        GL_TEXTURE_EXTERNAL_OES,
                        glow::TEXTURE_MIN_FILTER,
                        glow::LINEAR as i32,
                    );
                    gl.tex_parameter_i32(
                        GL_TEXTURE_EXTERNAL_OES,
                        glow::TEXTURE_MAG_FILTER,
                        glow::LINEAR as i32,
                    );
                    (self.image_target_texture)(GL_TEXTURE_EXTERNAL_OES, image);
                    Ok(texture)
                }
                Err(e) => Err(Error::Gl {
                    step: "glGenTextures",
                    message: e,
                }),
            }
        };

        // the texture keeps its own reference to the buffer
        unsafe { (self.destroy_image)(display, image) };
        texture
    }

    fn upload_rgba(
        &mut self,
        width: u32,
        height: u32,
        pixels: &[u8],
    ) -> Result<Self::Texture, Error> {
        let gl = &self.gl;
        unsafe {
            let texture = gl.create_texture().map_err(Error::gl("glGenTextures"))?;
            gl.bind_texture(glow::TEXTURE_2D, Some(texture));
            gl.tex_parameter_i32(
                glow::TEXTURE_2D,
                glow::TEXTURE_WRAP_S,
                glow::CLAMP_TO_EDGE as i32,
            );
            gl.tex_parameter_i32(
                glow::TEXTURE_2D,
                glow::TEXTURE_WRAP_T,
                glow::CLAMP_TO_EDGE as i32,
            );
            gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MIN_FILTER, glow::LINEAR as i32);
            gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MAG_FILTER, glow::LINEAR as i32);
            gl.tex_image_2d(
                glow::TEXTURE_2D,
                0,
                glow::RGBA as i32,
                width as i32,
                height as i32,
                0,
                glow::RGBA,
                glow::UNSIGNED_BYTE,
                Some(pixels),
            );
            Ok(texture)
        }
    }

    fn delete_texture(&mut self, texture: Self::Texture) {
        unsafe { self.gl.delete_texture(texture) };
    }

    fn link_program(
        &mut self,
        vertex: &str,
        fragment: &str,
        attributes: &[&str],
    ) -> Result<Self::Program, Error> {
        let vs = self.compile_shader(glow::VERTEX_SHADER, vertex)?;
        let fs = match self.compile_shader(glow::FRAGMENT_SHADER, fragment) {
            Ok(fs) => fs,
            Err(e) => {
                unsafe { self.gl.delete_shader(vs) };
                return Err(e);
            }
        };

        let gl = &self.gl;
        unsafe {
            let program = gl.create_program().map_err(Error::gl("glCreateProgram"))?;
            gl.attach_shader(program, vs);
            gl.attach_shader(program, fs);
            for (location, name) in attributes.iter().enumerate() {
                gl.bind_attrib_location(program, location as u32, name);
            }
            gl.link_program(program);

            gl.detach_shader(program, vs);
            gl.detach_shader(program, fs);
            gl.delete_shader(vs);
            gl.delete_shader(fs);

            if !gl.get_program_link_status(program) {
                // Some drivers report a single NUL for an empty log.
                let log = gl.get_program_info_log(program);
                let log = log.trim_end_matches('\0').trim();
                gl.delete_program(program);
                return Err(Error::ShaderLink(if log.is_empty() {
                    "<empty log>".to_string()
                } else {
                    log.to_string()
                }));
            }
            Ok(program)
        }
    }

    fn uniform_location(&mut self, program: Self::Program, name: &str) -> Option<Self::Uniform> {
        unsafe { self.gl.get_uniform_location(program, name) }
    }

    fn delete_program(&mut self, program: Self::Program) {
        unsafe { self.gl.delete_program(program) };
    }

    fn enable_blending(&mut self) {
        unsafe {
            self.gl.enable(glow::BLEND);
            self.gl
                .blend_func(glow::SRC_ALPHA, glow::ONE_MINUS_SRC_ALPHA);
        }
    }

    fn clear(&mut self) {
        unsafe {
            self.gl.clear_color(0.0, 0.0, 0.0, 0.0);
            self.gl.clear(glow::COLOR_BUFFER_BIT);
        }
    }

    fn draw_image(&mut self, program: Self::Program, texture: Self::Texture, quad: &Quad) {
        self.upload_vertices(quad);
        let gl = &self.gl;
        unsafe {
            gl.use_program(Some(program));
            gl.disable_vertex_attrib_array(1);
            gl.vertex_attrib_pointer_f32(0, 2, glow::FLOAT, false, 0, 0);
            gl.enable_vertex_attrib_array(0);
            gl.bind_texture(GL_TEXTURE_EXTERNAL_OES, Some(texture));
            gl.draw_arrays(glow::TRIANGLE_FAN, 0, 4);
        }
    }

    fn draw_overlay(
        &mut self,
        program: Self::Program,
        alpha: Option<&Self::Uniform>,
        fade: f32,
        texture: Self::Texture,
        quad: &Quad,
        texcoords: &Quad,
    ) {
        let mut vertices = [0.0f32; 16];
        vertices[..8].copy_from_slice(quad);
        vertices[8..].copy_from_slice(texcoords);
        self.upload_vertices(&vertices);

        let gl = &self.gl;
        unsafe {
            gl.use_program(Some(program));
            gl.uniform_1_f32(alpha, fade);
            gl.vertex_attrib_pointer_f32(0, 2, glow::FLOAT, false, 0, 0);
            gl.vertex_attrib_pointer_f32(1, 2, glow::FLOAT, false, 0, 32);
            gl.enable_vertex_attrib_array(0);
            gl.enable_vertex_attrib_array(1);
            gl.bind_texture(glow::TEXTURE_2D, Some(texture));
            gl.draw_arrays(glow::TRIANGLE_FAN, 0, 4);
        }
    }

    fn present(&mut self) -> Result<(), Error> {
        self.surface.swap_buffers()
    }
}

impl Drop for GlesBackend {
    fn drop(&mut self) {
        if let Some(vbo) = self.vbo.take() {
            if self.surface.make_current().is_ok() {
                unsafe { self.gl.delete_buffer(vbo) };
                debug!("vertex buffer deleted");
            }
        }
    }
}
