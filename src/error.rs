// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use crate::frame::Handle;
use thiserror::Error;

/// Errors raised by the preview surface.
///
/// Every variant except [`Error::Font`] is fatal for the preview instance:
/// nothing in this crate retries, the caller is expected to tear the
/// preview down.
#[derive(Debug, Error)]
pub enum Error {
    /// The X server or one of the runtime-loaded libraries is unavailable.
    #[error("window system unavailable: {0}")]
    Window(String),

    #[error("{step} failed: {source}")]
    Egl {
        step: &'static str,
        #[source]
        source: khronos_egl::Error,
    },

    #[error("couldn't get an EGL visual config")]
    NoConfig,

    #[error("missing EGL/GL entry point {0}")]
    MissingExtension(&'static str),

    #[error("GL {step} failed: {message}")]
    Gl { step: &'static str, message: String },

    #[error("failed to compile shader: {log}\nsource:\n{text}")]
    ShaderCompile { log: String, text: String },

    #[error("failed to link: {0}")]
    ShaderLink(String),

    #[error("failed to import {0}")]
    Import(Handle),

    #[error("font: {0}")]
    Font(String),
}

impl Error {
    pub(crate) fn egl(step: &'static str) -> impl FnOnce(khronos_egl::Error) -> Self {
        move |source| Error::Egl { step, source }
    }

    pub(crate) fn gl(step: &'static str) -> impl FnOnce(String) -> Self {
        move |message| Error::Gl { step, message }
    }
}
