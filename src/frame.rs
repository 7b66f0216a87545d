// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use core::fmt;
use std::{
    os::fd::{AsRawFd, RawFd},
    str::FromStr,
};

/// Opaque reference to a producer-owned frame buffer.
///
/// The handle is the DMA buffer's file descriptor number. It is used as the
/// key of the import cache and is handed back to the producer through the
/// release callback. The preview never closes or duplicates the descriptor,
/// ownership of the memory behind it stays with the producer.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle(RawFd);

impl Handle {
    pub const fn from_raw_fd(fd: RawFd) -> Self {
        Handle(fd)
    }
}

impl AsRawFd for Handle {
    fn as_raw_fd(&self) -> RawFd {
        self.0
    }
}

impl From<RawFd> for Handle {
    fn from(fd: RawFd) -> Self {
        Handle(fd)
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "fd:{}", self.0)
    }
}

/// Colour space tag attached to a frame by the producer.
///
/// Only the first three variants have a dedicated import hint; the rest are
/// accepted but imported with the BT.601 narrow-range default.
#[derive(clap::ValueEnum, Copy, Clone, Debug, PartialEq, Eq)]
pub enum ColorSpace {
    /// BT.601 narrow range (SMPTE 170M)
    Smpte170m,
    /// BT.601 full range (sYCC, JPEG)
    Sycc,
    /// BT.709 narrow range
    Rec709,
    /// BT.2020 narrow range
    Rec2020,
    /// sRGB
    Srgb,
    /// Raw sensor data, no colour space
    Raw,
}

impl ColorSpace {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColorSpace::Smpte170m => "smpte170m",
            ColorSpace::Sycc => "sycc",
            ColorSpace::Rec709 => "rec709",
            ColorSpace::Rec2020 => "rec2020",
            ColorSpace::Srgb => "srgb",
            ColorSpace::Raw => "raw",
        }
    }
}

impl fmt::Display for ColorSpace {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ColorSpace {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "smpte170m" | "bt601" => Ok(ColorSpace::Smpte170m),
            "sycc" | "jpeg" => Ok(ColorSpace::Sycc),
            "rec709" | "bt709" => Ok(ColorSpace::Rec709),
            "rec2020" | "bt2020" => Ok(ColorSpace::Rec2020),
            "srgb" => Ok(ColorSpace::Srgb),
            "raw" => Ok(ColorSpace::Raw),
            other => Err(format!("unknown colour space {other}")),
        }
    }
}

/// Layout of a planar YUV 4:2:0 frame as supplied by the producer.
///
/// `stride` is the luma row pitch in bytes; the chroma planes use half of
/// it. `color_space` is `None` when the producer did not tag the frame.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FrameDescriptor {
    pub width: u32,
    pub height: u32,
    pub stride: u32,
    pub color_space: Option<ColorSpace>,
}

impl FrameDescriptor {
    pub fn new(width: u32, height: u32, stride: u32, color_space: Option<ColorSpace>) -> Self {
        Self {
            width,
            height,
            stride,
            color_space,
        }
    }

    /// Bytes occupied by the three planes.
    pub fn size(&self) -> usize {
        let luma = self.stride as usize * self.height as usize;
        luma + 2 * (self.stride as usize / 2) * (self.height as usize / 2)
    }
}

impl fmt::Display for FrameDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}x{} stride:{}", self.width, self.height, self.stride)?;
        match self.color_space {
            Some(cs) => write!(f, " {cs}"),
            None => f.write_str(" <untagged>"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yuv420_size() {
        let desc = FrameDescriptor::new(1920, 1080, 1920, Some(ColorSpace::Smpte170m));
        assert_eq!(desc.size(), 3110400);

        let padded = FrameDescriptor::new(1920, 1080, 2048, None);
        assert_eq!(padded.size(), 2048 * 1080 * 3 / 2);
    }

    #[test]
    fn colour_space_names() {
        assert_eq!("bt709".parse::<ColorSpace>(), Ok(ColorSpace::Rec709));
        assert_eq!("SYCC".parse::<ColorSpace>(), Ok(ColorSpace::Sycc));
        assert!("xvycc".parse::<ColorSpace>().is_err());
        assert_eq!(ColorSpace::Smpte170m.to_string(), "smpte170m");
    }

    #[test]
    fn handle_identity() {
        let a = Handle::from_raw_fd(12);
        let b = Handle::from(12);
        assert_eq!(a, b);
        assert_eq!(a.as_raw_fd(), 12);
        assert_eq!(a.to_string(), "fd:12");
    }
}
