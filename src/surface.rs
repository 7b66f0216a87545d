// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! X11 window with an EGL rendering context and window surface.

use crate::error::Error;
use khronos_egl as egl;
use std::{
    ffi::{c_void, CString},
    mem,
    os::raw::{c_int, c_uint},
    ptr::{self, null_mut},
};
use tracing::{debug, info, warn};
use x11_dl::xlib;

/// Window size used when the requested width or height is zero.
pub const DEFAULT_WINDOW_SIZE: (u32, u32) = (1024, 768);

const GL_MAX_TEXTURE_SIZE: u32 = 0x0D33;
const MWM_HINTS_DECORATIONS: libc::c_ulong = 1 << 1;
const PROP_MOTIF_WM_HINTS_ELEMENTS: c_int = 5;

type GlGetIntegerv = unsafe extern "system" fn(u32, *mut i32);

/// Requested window placement.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct WindowOptions {
    pub x: i32,
    pub y: i32,
    /// Zero selects [`DEFAULT_WINDOW_SIZE`].
    pub width: u32,
    pub height: u32,
    pub fullscreen: bool,
}

/// Effective window placement on the screen.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Geometry {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

/// Resolves the requested placement against a `screen` sized display.
///
/// Fullscreen requests, and windows that would not fit on the screen, cover
/// the whole display from the origin.
pub fn window_geometry(options: &WindowOptions, screen: (u32, u32)) -> Geometry {
    let (width, height) = if options.width == 0 || options.height == 0 {
        DEFAULT_WINDOW_SIZE
    } else {
        (options.width, options.height)
    };

    let overflows = i64::from(options.x) + i64::from(width) > i64::from(screen.0)
        || i64::from(options.y) + i64::from(height) > i64::from(screen.1);

    if options.fullscreen || overflows {
        Geometry {
            x: 0,
            y: 0,
            width: screen.0,
            height: screen.1,
        }
    } else {
        Geometry {
            x: options.x,
            y: options.y,
            width,
            height,
        }
    }
}

/// Connection to the X server, closed on drop.
struct XConnection {
    xlib: xlib::Xlib,
    display: *mut xlib::Display,
}

impl XConnection {
    fn open() -> Result<Self, Error> {
        let xlib = xlib::Xlib::open()
            .map_err(|e| Error::Window(format!("couldn't load libX11: {e}")))?;
        let display = unsafe { (xlib.XOpenDisplay)(ptr::null()) };
        if display.is_null() {
            return Err(Error::Window("Couldn't open X display".to_string()));
        }
        Ok(Self { xlib, display })
    }

    fn destroy_window(&self, window: xlib::Window, colormap: xlib::Colormap) {
        unsafe {
            (self.xlib.XDestroyWindow)(self.display, window);
            (self.xlib.XFreeColormap)(self.display, colormap);
        }
    }
}

impl Drop for XConnection {
    fn drop(&mut self) {
        unsafe { (self.xlib.XCloseDisplay)(self.display) };
    }
}

/// Initialized EGL display, terminated on drop.
struct EglConnection {
    egl: egl::DynamicInstance<egl::EGL1_4>,
    display: egl::Display,
}

impl EglConnection {
    fn new(x: &XConnection) -> Result<Self, Error> {
        let egl = unsafe { egl::DynamicInstance::<egl::EGL1_4>::load_required() }
            .map_err(|e| Error::Window(format!("couldn't load libEGL: {e}")))?;
        let display = unsafe { egl.get_display(x.display as egl::NativeDisplayType) }
            .ok_or_else(|| Error::Window("eglGetDisplay() failed".to_string()))?;
        let (major, minor) = egl
            .initialize(display)
            .map_err(Error::egl("eglInitialize()"))?;
        debug!("EGL {major}.{minor}");
        Ok(Self { egl, display })
    }
}

impl Drop for EglConnection {
    fn drop(&mut self) {
        if let Err(e) = self.egl.terminate(self.display) {
            warn!("eglTerminate() failed: {e}");
        }
    }
}

/// The preview window and its GPU context.
///
/// libX11 and libEGL are loaded at runtime. The context is created unbound;
/// call [`Surface::make_current`] on the thread that will render.
pub struct Surface {
    // EGL is terminated before the X connection it was created on is closed
    egl: EglConnection,
    x: XConnection,
    window: xlib::Window,
    colormap: xlib::Colormap,
    wm_delete_window: xlib::Atom,
    egl_context: egl::Context,
    egl_surface: egl::Surface,
    geometry: Geometry,
    max_texture_size: u32,
}

impl Surface {
    /// Opens the X display and creates the window and its EGL context.
    ///
    /// Everything created before a failing step is destroyed again.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Window`] when libX11, libEGL or the X server is not
    /// available, [`Error::NoConfig`] when no GLES2 capable config exists
    /// and [`Error::Egl`] naming the EGL call that failed otherwise.
    pub fn new(name: &str, options: &WindowOptions) -> Result<Self, Error> {
        let x = XConnection::open()?;
        let egl = EglConnection::new(&x)?;
        let (xlib, display) = (&x.xlib, x.display);

        let screen = unsafe { (xlib.XDefaultScreen)(display) };
        let root = unsafe { (xlib.XRootWindow)(display, screen) };
        let screen_size = unsafe {
            (
                (xlib.XDisplayWidth)(display, screen) as u32,
                (xlib.XDisplayHeight)(display, screen) as u32,
            )
        };
        let geometry = window_geometry(options, screen_size);

        let attribs = [
            egl::RED_SIZE,
            1,
            egl::GREEN_SIZE,
            1,
            egl::BLUE_SIZE,
            1,
            egl::RENDERABLE_TYPE,
            egl::OPENGL_ES2_BIT,
            egl::NONE,
        ];
        let config = egl
            .egl
            .choose_first_config(egl.display, &attribs)
            .map_err(Error::egl("eglChooseConfig()"))?
            .ok_or(Error::NoConfig)?;
        let visual_id = egl
            .egl
            .get_config_attrib(egl.display, config, egl::NATIVE_VISUAL_ID)
            .map_err(Error::egl("eglGetConfigAttrib()"))?;

        let mut template: xlib::XVisualInfo = unsafe { mem::zeroed() };
        template.visualid = visual_id as xlib::VisualID;
        let mut num_visuals = 0;
        let visinfo = unsafe {
            (xlib.XGetVisualInfo)(display, xlib::VisualIDMask, &mut template, &mut num_visuals)
        };
        if visinfo.is_null() {
            return Err(Error::NoConfig);
        }

        let (window, colormap) = unsafe {
            let mut attr: xlib::XSetWindowAttributes = mem::zeroed();
            attr.background_pixel = 0;
            attr.border_pixel = 0;
            attr.colormap =
                (xlib.XCreateColormap)(display, root, (*visinfo).visual, xlib::AllocNone);
            attr.event_mask =
                xlib::StructureNotifyMask | xlib::ExposureMask | xlib::KeyPressMask;
            let mask = xlib::CWBackPixel | xlib::CWBorderPixel | xlib::CWColormap | xlib::CWEventMask;

            let window = (xlib.XCreateWindow)(
                display,
                root,
                geometry.x,
                geometry.y,
                geometry.width,
                geometry.height,
                0,
                (*visinfo).depth,
                xlib::InputOutput as c_uint,
                (*visinfo).visual,
                mask,
                &mut attr,
            );
            (xlib.XFree)(visinfo as *mut c_void);
            (window, attr.colormap)
        };

        if options.fullscreen {
            no_border(xlib, display, window);
        }
        set_hints(xlib, display, window, name, &geometry);

        if let Err(e) = egl.egl.bind_api(egl::OPENGL_ES_API) {
            x.destroy_window(window, colormap);
            return Err(Error::egl("eglBindAPI()")(e));
        }
        let ctx_attribs = [egl::CONTEXT_CLIENT_VERSION, 2, egl::NONE];
        let egl_context = match egl
            .egl
            .create_context(egl.display, config, None, &ctx_attribs)
        {
            Ok(context) => context,
            Err(e) => {
                x.destroy_window(window, colormap);
                return Err(Error::egl("eglCreateContext()")(e));
            }
        };

        let wm_delete_window = unsafe {
            (xlib.XMapWindow)(display, window);
            // Lets the window manager send a close request instead of
            // killing the connection.
            let mut atom = (xlib.XInternAtom)(display, c"WM_DELETE_WINDOW".as_ptr(), xlib::False);
            (xlib.XSetWMProtocols)(display, window, &mut atom, 1);
            atom
        };

        let egl_surface = match unsafe {
            egl.egl
                .create_window_surface(egl.display, config, window as egl::NativeWindowType, None)
        } {
            Ok(surface) => surface,
            Err(e) => {
                if let Err(e) = egl.egl.destroy_context(egl.display, egl_context) {
                    warn!("eglDestroyContext() failed: {e}");
                }
                x.destroy_window(window, colormap);
                return Err(Error::egl("eglCreateWindowSurface()")(e));
            }
        };

        // From here on Drop tears everything down.
        let mut surface = Self {
            egl,
            x,
            window,
            colormap,
            wm_delete_window,
            egl_context,
            egl_surface,
            geometry,
            max_texture_size: 0,
        };
        surface.max_texture_size = surface.query_max_texture_size()?;

        info!(
            "preview window {}x{}+{}+{} max texture size {}",
            geometry.width, geometry.height, geometry.x, geometry.y, surface.max_texture_size
        );
        Ok(surface)
    }

    // The context has to be made current on the render thread later, so it
    // is only bound here long enough to ask for the limit.
    fn query_max_texture_size(&self) -> Result<u32, Error> {
        let get_integerv = self
            .proc_address("glGetIntegerv")
            .ok_or(Error::MissingExtension("glGetIntegerv"))?;
        let get_integerv: GlGetIntegerv = unsafe { mem::transmute(get_integerv) };

        self.egl
            .egl
            .make_current(self.egl.display, None, None, Some(self.egl_context))
            .map_err(Error::egl("eglMakeCurrent()"))?;
        let mut max_texture_size = 0;
        unsafe { get_integerv(GL_MAX_TEXTURE_SIZE, &mut max_texture_size) };
        self.release_current()?;

        Ok(max_texture_size.max(0) as u32)
    }

    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    pub fn size(&self) -> (u32, u32) {
        (self.geometry.width, self.geometry.height)
    }

    pub fn max_texture_size(&self) -> u32 {
        self.max_texture_size
    }

    pub fn egl_display(&self) -> egl::Display {
        self.egl.display
    }

    pub fn proc_address(&self, name: &str) -> Option<extern "system" fn()> {
        self.egl.egl.get_proc_address(name)
    }

    /// Binds the context and window surface to the calling thread.
    pub fn make_current(&self) -> Result<(), Error> {
        self.egl
            .egl
            .make_current(
                self.egl.display,
                Some(self.egl_surface),
                Some(self.egl_surface),
                Some(self.egl_context),
            )
            .map_err(Error::egl("eglMakeCurrent()"))
    }

    pub fn release_current(&self) -> Result<(), Error> {
        self.egl
            .egl
            .make_current(self.egl.display, None, None, None)
            .map_err(Error::egl("eglMakeCurrent()"))
    }

    pub fn swap_buffers(&self) -> Result<(), Error> {
        self.egl
            .egl
            .swap_buffers(self.egl.display, self.egl_surface)
            .map_err(Error::egl("eglSwapBuffers()"))
    }

    pub fn set_title(&mut self, title: &str) {
        if title.is_empty() {
            return;
        }
        match CString::new(title) {
            Ok(title) => unsafe {
                (self.x.xlib.XStoreName)(self.x.display, self.window, title.as_ptr());
                (self.x.xlib.XFlush)(self.x.display);
            },
            Err(e) => warn!("invalid window title: {e}"),
        }
    }

    /// Drains pending client messages for the window and reports whether
    /// one of them was a window manager close request.
    pub fn poll_close_requested(&mut self) -> bool {
        let mut requested = false;
        let mut event: xlib::XEvent = unsafe { mem::zeroed() };
        while unsafe {
            (self.x.xlib.XCheckTypedWindowEvent)(
                self.x.display,
                self.window,
                xlib::ClientMessage,
                &mut event,
            )
        } != 0
        {
            let atom = unsafe { event.client_message.data.get_long(0) } as xlib::Atom;
            if atom == self.wm_delete_window {
                requested = true;
            }
        }
        if requested {
            debug!("window close requested");
        }
        requested
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        let _ = self.release_current();
        if let Err(e) = self.egl.egl.destroy_surface(self.egl.display, self.egl_surface) {
            warn!("eglDestroySurface() failed: {e}");
        }
        if let Err(e) = self.egl.egl.destroy_context(self.egl.display, self.egl_context) {
            warn!("eglDestroyContext() failed: {e}");
        }
        self.x.destroy_window(self.window, self.colormap);
        debug!("preview window closed");
    }
}

fn no_border(xlib: &xlib::Xlib, display: *mut xlib::Display, window: xlib::Window) {
    let prop = unsafe { (xlib.XInternAtom)(display, c"_MOTIF_WM_HINTS".as_ptr(), xlib::True) };
    if prop == 0 {
        debug!("_MOTIF_WM_HINTS unsupported, keeping window border");
        return;
    }

    // flags, functions, decorations, input mode, status
    let motif_hints: [libc::c_ulong; 5] = [MWM_HINTS_DECORATIONS, 0, 0, 0, 0];
    unsafe {
        (xlib.XChangeProperty)(
            display,
            window,
            prop,
            prop,
            32,
            xlib::PropModeReplace,
            motif_hints.as_ptr() as *const u8,
            PROP_MOTIF_WM_HINTS_ELEMENTS,
        );
    }
}

fn set_hints(
    xlib: &xlib::Xlib,
    display: *mut xlib::Display,
    window: xlib::Window,
    name: &str,
    geometry: &Geometry,
) {
    let name = CString::new(name).unwrap_or_else(|_| c"preview".to_owned());
    unsafe {
        let mut hints: xlib::XSizeHints = mem::zeroed();
        hints.x = geometry.x;
        hints.y = geometry.y;
        hints.width = geometry.width as c_int;
        hints.height = geometry.height as c_int;
        hints.flags = xlib::USSize | xlib::USPosition;
        (xlib.XSetNormalHints)(display, window, &mut hints);
        (xlib.XSetStandardProperties)(
            display,
            window,
            name.as_ptr(),
            name.as_ptr(),
            0,
            null_mut(),
            0,
            &mut hints,
        );
    }
}
