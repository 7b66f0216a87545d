// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use edgefirst_preview::{
    glyph::{GlyphAtlas, GlyphRaster, GLYPH_COUNT},
    import::ImportCache,
    Backend, ColorSpace, Error, FrameDescriptor, Handle, Preview, Quad, Stage,
};
use std::{cell::RefCell, collections::HashMap, error::Error as StdError, rc::Rc};

#[derive(Clone, Debug, PartialEq)]
enum Call {
    Bind,
    Release,
    Import(Handle),
    Upload(u32, u32),
    DeleteTexture(u32),
    Link,
    DeleteProgram(u32),
    Clear,
    Image(u32),
    Overlay { texture: u32, fade: f32 },
    Present,
}

/// Backend that records calls instead of talking to a GPU.
#[derive(Default)]
struct Recorder {
    calls: Vec<Call>,
    imports: HashMap<Handle, usize>,
    next: u32,
    fail_import: Option<Handle>,
    fail_link: bool,
    fail_upload: bool,
    close_requested: bool,
    title: Option<String>,
}

impl Recorder {
    fn id(&mut self) -> u32 {
        self.next += 1;
        self.next
    }

    fn count(&self, f: impl Fn(&Call) -> bool) -> usize {
        self.calls.iter().filter(|c| f(c)).count()
    }

    fn overlays(&self) -> Vec<f32> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                Call::Overlay { fade, .. } => Some(*fade),
                _ => None,
            })
            .collect()
    }
}

impl Backend for Recorder {
    type Texture = u32;
    type Program = u32;
    type Uniform = i32;

    fn window_size(&self) -> (u32, u32) {
        (1024, 768)
    }

    fn max_texture_size(&self) -> u32 {
        4096
    }

    fn poll_close_requested(&mut self) -> bool {
        std::mem::take(&mut self.close_requested)
    }

    fn set_title(&mut self, title: &str) {
        self.title = Some(title.to_string());
    }

    fn bind_context(&mut self) -> Result<(), Error> {
        self.calls.push(Call::Bind);
        Ok(())
    }

    fn release_context(&mut self) -> Result<(), Error> {
        self.calls.push(Call::Release);
        Ok(())
    }

    fn import_dmabuf(
        &mut self,
        handle: Handle,
        _size: usize,
        _descriptor: &FrameDescriptor,
    ) -> Result<u32, Error> {
        if self.fail_import == Some(handle) {
            return Err(Error::Import(handle));
        }
        self.calls.push(Call::Import(handle));
        *self.imports.entry(handle).or_default() += 1;
        Ok(self.id())
    }

    fn upload_rgba(&mut self, width: u32, height: u32, pixels: &[u8]) -> Result<u32, Error> {
        assert_eq!(pixels.len(), (width * height * 4) as usize);
        if self.fail_upload {
            return Err(Error::Gl {
                step: "glTexImage2D",
                message: "out of memory".to_string(),
            });
        }
        self.calls.push(Call::Upload(width, height));
        Ok(self.id())
    }

    fn delete_texture(&mut self, texture: u32) {
        self.calls.push(Call::DeleteTexture(texture));
    }

    fn link_program(
        &mut self,
        vertex: &str,
        _fragment: &str,
        attributes: &[&str],
    ) -> Result<u32, Error> {
        if self.fail_link {
            return Err(Error::ShaderCompile {
                log: "0:1: syntax error".to_string(),
                text: vertex.to_string(),
            });
        }
        assert_eq!(attributes[0], "pos");
        self.calls.push(Call::Link);
        Ok(self.id())
    }

    fn uniform_location(&mut self, _program: u32, name: &str) -> Option<i32> {
        assert_eq!(name, "ialphafac");
        Some(0)
    }

    fn delete_program(&mut self, program: u32) {
        self.calls.push(Call::DeleteProgram(program));
    }

    fn enable_blending(&mut self) {}

    fn clear(&mut self) {
        self.calls.push(Call::Clear);
    }

    fn draw_image(&mut self, _program: u32, texture: u32, _quad: &Quad) {
        self.calls.push(Call::Image(texture));
    }

    fn draw_overlay(
        &mut self,
        _program: u32,
        alpha: Option<&i32>,
        fade: f32,
        texture: u32,
        _quad: &Quad,
        _texcoords: &Quad,
    ) {
        assert!(alpha.is_some());
        self.calls.push(Call::Overlay { texture, fade });
    }

    fn present(&mut self) -> Result<(), Error> {
        self.calls.push(Call::Present);
        Ok(())
    }
}

fn rasters() -> Vec<GlyphRaster> {
    (0..GLYPH_COUNT)
        .map(|id| GlyphRaster {
            width: 10 + id as u32,
            height: 20,
            coverage: vec![id * 20; (10 + id as usize) * 20],
        })
        .collect()
}

fn desc() -> FrameDescriptor {
    FrameDescriptor::new(1920, 1080, 1920, Some(ColorSpace::Smpte170m))
}

type Released = Rc<RefCell<Vec<Handle>>>;

fn preview(glyphs: Option<Vec<GlyphRaster>>) -> (Preview<Recorder>, Released) {
    let released = Released::default();
    let sink = released.clone();
    let preview = Preview::new(Recorder::default(), glyphs, move |handle| {
        sink.borrow_mut().push(handle)
    });
    (preview, released)
}

fn show(preview: &mut Preview<Recorder>, fd: i32) -> Result<(), Error> {
    let desc = desc();
    preview.display(Handle::from_raw_fd(fd), desc.size(), &desc)
}

#[test]
fn test_import_once_per_handle() -> Result<(), Box<dyn StdError>> {
    let (mut preview, _) = preview(None);

    for fd in [10, 11, 10, 11, 10, 12] {
        show(&mut preview, fd)?;
    }

    let imports = &preview.backend().imports;
    assert_eq!(imports[&Handle::from_raw_fd(10)], 1);
    assert_eq!(imports[&Handle::from_raw_fd(11)], 1);
    assert_eq!(imports[&Handle::from_raw_fd(12)], 1);
    assert_eq!(preview.imported(), 3);
    Ok(())
}

#[test]
fn test_release_lags_one_frame() -> Result<(), Box<dyn StdError>> {
    let (mut preview, released) = preview(None);

    show(&mut preview, 20)?;
    assert!(released.borrow().is_empty());

    for fd in 21..=25 {
        show(&mut preview, fd)?;
    }

    let expected: Vec<Handle> = (20..=24).map(Handle::from_raw_fd).collect();
    assert_eq!(*released.borrow(), expected);
    Ok(())
}

#[test]
fn test_release_after_present() -> Result<(), Box<dyn StdError>> {
    let released = Released::default();
    let sink = released.clone();
    let mut preview = Preview::new(Recorder::default(), None, move |handle| {
        sink.borrow_mut().push(handle)
    });

    show(&mut preview, 1)?;
    show(&mut preview, 2)?;

    // the second frame was presented before buffer 1 was handed back
    let calls = &preview.backend().calls;
    assert_eq!(calls.iter().filter(|c| **c == Call::Present).count(), 2);
    assert_eq!(calls.last(), Some(&Call::Present));
    assert_eq!(*released.borrow(), vec![Handle::from_raw_fd(1)]);
    Ok(())
}

#[test]
fn test_first_frame_setup_once() -> Result<(), Box<dyn StdError>> {
    let (mut preview, _) = preview(Some(rasters()));
    assert_eq!(preview.stage(), Stage::Idle);

    for fd in 0..5 {
        show(&mut preview, fd)?;
    }

    assert_eq!(preview.stage(), Stage::SteadyDisplay);
    let backend = preview.backend();
    assert_eq!(backend.count(|c| *c == Call::Bind), 1);
    assert_eq!(backend.count(|c| *c == Call::Link), 2);
    assert_eq!(backend.count(|c| matches!(c, Call::Upload(..))), 10);
    assert_eq!(backend.calls[0], Call::Bind);
    assert_eq!(preview.glyphs(), 10);
    Ok(())
}

#[test]
fn test_reset_reimports() -> Result<(), Box<dyn StdError>> {
    let (mut preview, released) = preview(Some(rasters()));

    show(&mut preview, 7)?;
    show(&mut preview, 8)?;
    preview.reset()?;

    assert_eq!(preview.stage(), Stage::Idle);
    assert_eq!(preview.imported(), 0);
    assert_eq!(preview.glyphs(), 0);
    {
        let backend = preview.backend();
        // 2 frames + 10 glyphs
        assert_eq!(backend.count(|c| matches!(c, Call::DeleteTexture(_))), 12);
        assert_eq!(backend.count(|c| matches!(c, Call::DeleteProgram(_))), 2);
        assert_eq!(backend.calls.last(), Some(&Call::Release));
    }

    show(&mut preview, 7)?;
    show(&mut preview, 9)?;

    let backend = preview.backend();
    assert_eq!(backend.imports[&Handle::from_raw_fd(7)], 2);
    assert_eq!(backend.count(|c| *c == Call::Bind), 2);
    assert_eq!(backend.count(|c| matches!(c, Call::Upload(..))), 20);

    // the buffer shown before the reset is forgotten, not released
    let expected: Vec<Handle> = [7, 7].into_iter().map(Handle::from_raw_fd).collect();
    assert_eq!(*released.borrow(), expected);
    Ok(())
}

#[test]
fn test_reset_when_idle() -> Result<(), Box<dyn StdError>> {
    let (mut preview, _) = preview(None);
    preview.reset()?;
    preview.reset()?;
    assert!(preview.backend().calls.is_empty());
    Ok(())
}

#[test]
fn test_overlay_auto_hides() -> Result<(), Box<dyn StdError>> {
    let (mut preview, _) = preview(Some(rasters()));
    preview.show_overlay(4, 1.0);

    for k in 1..=9 {
        show(&mut preview, k)?;
        assert!(preview.overlay().visible, "hidden after {k} frames");
    }
    show(&mut preview, 10)?;
    assert!(!preview.overlay().visible);

    for fd in 11..15 {
        show(&mut preview, fd)?;
    }

    let fades = preview.backend().overlays();
    assert_eq!(fades.len(), 10);
    assert_eq!(fades[0], 1.0);
    assert!(fades.windows(2).all(|w| w[1] < w[0]));
    Ok(())
}

#[test]
fn test_hide_overlay_next_frame() -> Result<(), Box<dyn StdError>> {
    let (mut preview, _) = preview(Some(rasters()));
    preview.show_overlay(2, 1.0);

    show(&mut preview, 1)?;
    show(&mut preview, 2)?;
    preview.hide_overlay();
    show(&mut preview, 3)?;

    assert_eq!(preview.backend().overlays().len(), 2);
    assert!(!preview.overlay().visible);
    Ok(())
}

#[test]
fn test_overlay_drawn_after_image() -> Result<(), Box<dyn StdError>> {
    let (mut preview, _) = preview(Some(rasters()));
    preview.show_overlay(0, 0.5);
    show(&mut preview, 3)?;

    let calls = &preview.backend().calls;
    let image = calls.iter().position(|c| matches!(c, Call::Image(_)));
    let overlay = calls.iter().position(|c| matches!(c, Call::Overlay { .. }));
    let present = calls.iter().position(|c| *c == Call::Present);
    assert!(image < overlay && overlay < present);
    assert_eq!(preview.backend().overlays(), vec![0.5]);
    Ok(())
}

#[test]
fn test_overlay_without_font() -> Result<(), Box<dyn StdError>> {
    let (mut preview, released) = preview(None);
    preview.show_overlay(3, 1.0);

    for fd in 0..3 {
        show(&mut preview, fd)?;
    }

    assert!(preview.backend().overlays().is_empty());
    assert_eq!(preview.backend().count(|c| matches!(c, Call::Image(_))), 3);
    assert_eq!(released.borrow().len(), 2);
    Ok(())
}

#[test]
fn test_invalid_glyph_ignored() -> Result<(), Box<dyn StdError>> {
    let (mut preview, _) = preview(Some(rasters()));
    preview.show_overlay(10, 1.0);
    assert!(!preview.overlay().visible);
    show(&mut preview, 1)?;
    assert!(preview.backend().overlays().is_empty());
    Ok(())
}

#[test]
fn test_import_failure_is_fatal() -> Result<(), Box<dyn StdError>> {
    let (mut preview, released) = preview(None);
    preview.backend_mut().fail_import = Some(Handle::from_raw_fd(5));

    show(&mut preview, 4)?;
    let err = show(&mut preview, 5).unwrap_err();
    assert!(matches!(err, Error::Import(h) if h == Handle::from_raw_fd(5)));
    assert_eq!(err.to_string(), "failed to import fd:5");

    // nothing was presented, buffer 4 is still on screen
    assert!(released.borrow().is_empty());
    assert_eq!(preview.backend().count(|c| *c == Call::Present), 1);
    assert_eq!(preview.imported(), 1);
    Ok(())
}

#[test]
fn test_shader_failure_reports_source() {
    let (mut preview, released) = preview(Some(rasters()));
    preview.backend_mut().fail_link = true;

    let err = show(&mut preview, 1).unwrap_err();
    let message = err.to_string();
    assert!(message.contains("syntax error"));
    assert!(message.contains("texcoord.x = pos.x"));
    assert_eq!(preview.stage(), Stage::Idle);
    assert!(released.borrow().is_empty());
}

#[test]
fn test_failed_setup_unbinds_context() -> Result<(), Box<dyn StdError>> {
    let (mut preview, _) = preview(Some(rasters()));
    preview.backend_mut().fail_link = true;

    assert!(show(&mut preview, 1).is_err());
    preview.reset()?;

    let backend = preview.backend();
    assert_eq!(backend.calls, vec![Call::Bind, Call::Release]);
    Ok(())
}

#[test]
fn test_failed_glyph_upload_cleans_up() -> Result<(), Box<dyn StdError>> {
    let (mut preview, released) = preview(Some(rasters()));
    preview.backend_mut().fail_upload = true;

    let err = show(&mut preview, 1).unwrap_err();
    assert_eq!(err.to_string(), "GL glTexImage2D failed: out of memory");
    assert_eq!(preview.stage(), Stage::Idle);
    assert_eq!(preview.glyphs(), 0);
    {
        let backend = preview.backend();
        assert_eq!(backend.count(|c| matches!(c, Call::DeleteProgram(_))), 2);
        assert_eq!(backend.calls.last(), Some(&Call::Release));
    }

    // setup runs again on the next frame
    preview.backend_mut().fail_upload = false;
    show(&mut preview, 2)?;
    assert_eq!(preview.stage(), Stage::SteadyDisplay);
    assert_eq!(preview.backend().count(|c| *c == Call::Bind), 2);
    assert_eq!(preview.glyphs(), 10);
    assert!(released.borrow().is_empty());
    Ok(())
}

#[test]
fn test_glyph_rebuild_releases_previous() -> Result<(), Box<dyn StdError>> {
    let mut backend = Recorder::default();
    let mut atlas = GlyphAtlas::<Recorder>::new();
    assert!(atlas.is_empty());

    atlas.build(&mut backend, &rasters(), (1024, 768))?;
    let first: Vec<u32> = (0..GLYPH_COUNT)
        .filter_map(|id| atlas.get(id).map(|glyph| glyph.texture))
        .collect();
    assert_eq!(first.len(), 10);

    atlas.build(&mut backend, &rasters(), (1024, 768))?;
    assert_eq!(atlas.len(), 10);
    for texture in &first {
        assert_eq!(backend.count(|c| *c == Call::DeleteTexture(*texture)), 1);
    }
    assert_eq!(backend.count(|c| matches!(c, Call::DeleteTexture(_))), 10);
    assert!(atlas.get(0).map_or(false, |glyph| !first.contains(&glyph.texture)));

    atlas.clear(&mut backend);
    assert!(atlas.is_empty());
    assert_eq!(backend.count(|c| matches!(c, Call::DeleteTexture(_))), 20);
    Ok(())
}

#[test]
fn test_import_cache_keeps_descriptor() -> Result<(), Box<dyn StdError>> {
    let mut backend = Recorder::default();
    let mut cache = ImportCache::new();
    let desc = desc();
    let handle = Handle::from_raw_fd(30);
    assert!(cache.is_empty());

    let texture = cache.get_or_import(&mut backend, handle, desc.size(), &desc)?;
    assert_eq!(cache.get_or_import(&mut backend, handle, desc.size(), &desc)?, texture);

    let buffer = cache.get(handle).ok_or("buffer not cached")?;
    assert_eq!(buffer.handle, handle);
    assert_eq!(buffer.size, desc.size());
    assert_eq!(buffer.descriptor, desc);
    assert_eq!(buffer.texture, texture);
    assert!(cache.get(Handle::from_raw_fd(31)).is_none());

    cache.evict_all(&mut backend);
    assert!(cache.is_empty());
    assert_eq!(backend.calls.last(), Some(&Call::DeleteTexture(texture)));
    Ok(())
}

#[test]
fn test_surface_queries() {
    let (mut preview, _) = preview(None);
    assert_eq!(preview.max_image_size(), (4096, 4096));

    preview.set_title("");
    assert_eq!(preview.backend().title, None);
    preview.set_title("preview 30fps");
    assert_eq!(preview.backend().title.as_deref(), Some("preview 30fps"));

    assert!(!preview.poll_close_requested());
    preview.backend_mut().close_requested = true;
    assert!(preview.poll_close_requested());
    assert!(!preview.poll_close_requested());
}
