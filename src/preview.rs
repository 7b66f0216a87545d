// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use crate::{
    backend::Backend,
    error::Error,
    frame::{FrameDescriptor, Handle},
    glyph::{GlyphAtlas, GlyphRaster, GLYPH_COUNT, GLYPH_TEXCOORDS},
    import::ImportCache,
    shader::ShaderSet,
};
use tracing::{debug, instrument, warn};

/// Fade subtracted from the overlay after each displayed frame.
pub const FADE_STEP: f32 = 0.10;

/// The overlay is hidden once its fade factor drops to this value.
pub const FADE_EPSILON: f32 = 0.01;

/// Lifecycle of the compositor.
///
/// Frame setup (binding the context, building shaders and glyphs) runs
/// inside the first [`Preview::display`] after creation or a reset, so a
/// preview is always observed either before or after it.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Stage {
    /// No frame displayed since creation or the last reset.
    Idle,
    /// Shaders and glyphs are built, frames are drawn directly.
    SteadyDisplay,
}

enum State<B: Backend> {
    Idle,
    SteadyDisplay(ShaderSet<B>),
}

impl<B: Backend> State<B> {
    fn stage(&self) -> Stage {
        match self {
            State::Idle => Stage::Idle,
            State::SteadyDisplay(_) => Stage::SteadyDisplay,
        }
    }
}

/// Countdown overlay animation.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct OverlayState {
    pub visible: bool,
    pub glyph: u8,
    pub fade: f32,
}

impl Default for OverlayState {
    fn default() -> Self {
        Self {
            visible: false,
            glyph: 0,
            fade: 0.0,
        }
    }
}

impl OverlayState {
    pub fn show(&mut self, glyph: u8, fade: f32) {
        self.visible = true;
        self.glyph = glyph;
        self.fade = fade.clamp(0.0, 1.0);
    }

    pub fn hide(&mut self) {
        self.visible = false;
    }

    /// Advances the animation by one frame and returns the glyph and fade to
    /// draw in it, if any.
    pub fn next_frame(&mut self) -> Option<(u8, f32)> {
        if !self.visible {
            return None;
        }
        if self.fade <= FADE_EPSILON {
            self.visible = false;
            return None;
        }

        let frame = (self.glyph, self.fade);
        self.fade -= FADE_STEP;
        if self.fade <= FADE_EPSILON {
            self.visible = false;
        }
        Some(frame)
    }
}

/// Live preview of producer dma-bufs.
///
/// Frames are imported once per handle, drawn letterboxed with an optional
/// countdown glyph on top, and presented. After presentation the handle of
/// the previously displayed frame is passed to the release callback: it is
/// the only point at which the producer may reuse that buffer, so at most
/// two buffers are held by the preview at any time.
///
/// The preview must be driven from a single thread, the one calling
/// [`Preview::display`]; the GPU context is bound there on the first frame.
///
/// # Example
///
/// ```no_run
/// use edgefirst_preview::{ColorSpace, FrameDescriptor, Handle, Preview, PreviewOptions};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let mut preview = Preview::open(&PreviewOptions::default(), |handle: Handle| {
///     println!("{handle} can be reused");
/// })?;
///
/// let desc = FrameDescriptor::new(1920, 1080, 1920, Some(ColorSpace::Smpte170m));
/// # let fd = 3;
/// preview.display(Handle::from_raw_fd(fd), desc.size(), &desc)?;
/// # Ok(())
/// # }
/// ```
pub struct Preview<B: Backend> {
    backend: B,
    state: State<B>,
    buffers: ImportCache<B::Texture>,
    glyphs: GlyphAtlas<B>,
    rasters: Option<Vec<GlyphRaster>>,
    overlay: OverlayState,
    last: Option<Handle>,
    release: Box<dyn FnMut(Handle)>,
}

impl<B: Backend> Preview<B> {
    /// Creates a preview on `backend`.
    ///
    /// `rasters` are the digit glyphs for the countdown overlay; without them
    /// the overlay calls are accepted but nothing is drawn. `release` is
    /// called from [`Preview::display`] and must not call back into the
    /// preview.
    pub fn new<F>(backend: B, rasters: Option<Vec<GlyphRaster>>, release: F) -> Self
    where
        F: FnMut(Handle) + 'static,
    {
        Self {
            backend,
            state: State::Idle,
            buffers: ImportCache::new(),
            glyphs: GlyphAtlas::new(),
            rasters,
            overlay: OverlayState::default(),
            last: None,
            release: Box::new(release),
        }
    }

    /// Displays the buffer behind `handle` and releases the previous one.
    ///
    /// # Errors
    ///
    /// Fails if the context cannot be bound, the shaders or glyphs cannot be
    /// built on the first frame, or the buffer cannot be imported. Nothing
    /// is presented or released in that case.
    #[instrument(skip_all, fields(handle = %handle))]
    pub fn display(
        &mut self,
        handle: Handle,
        size: usize,
        descriptor: &FrameDescriptor,
    ) -> Result<(), Error> {
        let shaders = match std::mem::replace(&mut self.state, State::Idle) {
            State::SteadyDisplay(shaders) => shaders,
            State::Idle => self.first_frame_setup(descriptor)?,
        };

        let result = self.draw(&shaders, handle, size, descriptor);
        self.state = State::SteadyDisplay(shaders);
        result
    }

    fn draw(
        &mut self,
        shaders: &ShaderSet<B>,
        handle: Handle,
        size: usize,
        descriptor: &FrameDescriptor,
    ) -> Result<(), Error> {
        let texture = self
            .buffers
            .get_or_import(&mut self.backend, handle, size, descriptor)?;

        self.backend.clear();
        self.backend
            .draw_image(shaders.image, texture, &shaders.image_quad);

        if let Some((id, fade)) = self.overlay.next_frame() {
            if let Some(glyph) = self.glyphs.get(id) {
                self.backend.draw_overlay(
                    shaders.overlay,
                    shaders.overlay_alpha.as_ref(),
                    fade,
                    glyph.texture,
                    &glyph.verts,
                    &GLYPH_TEXCOORDS,
                );
            }
        }

        if let Err(e) = self.backend.present() {
            warn!("present failed: {e}");
        }

        if let Some(last) = self.last.replace(handle) {
            (self.release)(last);
        }
        Ok(())
    }

    /// Binds the context and builds the shaders and glyphs. On failure
    /// everything built so far is deleted and the context is unbound again.
    fn first_frame_setup(&mut self, descriptor: &FrameDescriptor) -> Result<ShaderSet<B>, Error> {
        self.backend.bind_context()?;

        match self.build_resources(descriptor) {
            Ok(shaders) => Ok(shaders),
            Err(e) => {
                self.glyphs.clear(&mut self.backend);
                if let Err(release) = self.backend.release_context() {
                    warn!("failed to unbind context after setup error: {release}");
                }
                Err(e)
            }
        }
    }

    fn build_resources(&mut self, descriptor: &FrameDescriptor) -> Result<ShaderSet<B>, Error> {
        let window = self.backend.window_size();
        let shaders = ShaderSet::compile(
            &mut self.backend,
            (descriptor.width, descriptor.height),
            window,
        )?;
        self.backend.enable_blending();

        if let Some(rasters) = &self.rasters {
            if let Err(e) = self.glyphs.build(&mut self.backend, rasters, window) {
                shaders.release(&mut self.backend);
                return Err(e);
            }
        }

        debug!("first frame setup done for {descriptor} window {window:?}");
        Ok(shaders)
    }

    /// Drops every imported buffer and glyph, forgets the displayed buffer
    /// and unbinds the context. The next [`Preview::display`] starts over
    /// with a new frame setup, possibly on another thread.
    ///
    /// The forgotten buffer is not passed to the release callback.
    pub fn reset(&mut self) -> Result<(), Error> {
        let state = std::mem::replace(&mut self.state, State::Idle);
        self.last = None;

        if let State::SteadyDisplay(shaders) = state {
            self.buffers.evict_all(&mut self.backend);
            self.glyphs.clear(&mut self.backend);
            shaders.release(&mut self.backend);
            self.backend.release_context()?;
            debug!("preview reset");
        }
        Ok(())
    }

    /// Shows countdown glyph `glyph` starting at `fade`, from the next
    /// displayed frame on. Glyph 0 is the white backdrop.
    pub fn show_overlay(&mut self, glyph: u8, fade: f32) {
        if glyph >= GLYPH_COUNT {
            warn!("ignoring overlay glyph {glyph}");
            return;
        }
        self.overlay.show(glyph, fade);
    }

    pub fn hide_overlay(&mut self) {
        self.overlay.hide();
    }

    pub fn overlay(&self) -> &OverlayState {
        &self.overlay
    }

    pub fn set_title(&mut self, title: &str) {
        if !title.is_empty() {
            self.backend.set_title(title);
        }
    }

    /// Largest frame the preview can import, as `(width, height)`.
    pub fn max_image_size(&self) -> (u32, u32) {
        let max = self.backend.max_texture_size();
        (max, max)
    }

    pub fn poll_close_requested(&mut self) -> bool {
        self.backend.poll_close_requested()
    }

    pub fn stage(&self) -> Stage {
        self.state.stage()
    }

    /// Number of buffers currently imported.
    pub fn imported(&self) -> usize {
        self.buffers.len()
    }

    /// Number of glyphs currently uploaded.
    pub fn glyphs(&self) -> usize {
        self.glyphs.len()
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }
}

impl<B: Backend> Drop for Preview<B> {
    fn drop(&mut self) {
        if let Err(e) = self.reset() {
            warn!("preview teardown: {e}");
        }
    }
}
