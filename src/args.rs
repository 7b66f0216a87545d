// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use clap::Parser;
use edgefirst_preview::{glyph::DEFAULT_FONT, ColorSpace, PreviewOptions, WindowOptions};
use std::path::PathBuf;

/// Command-line arguments for EdgeFirst Preview.
///
/// Shows frames from a V4L2 camera, or from a synthetic test pattern, in a
/// zero-copy preview window. Arguments can be specified via command line or
/// environment variables.
///
/// # Example
///
/// ```bash
/// # Camera preview with a 3 second countdown
/// edgefirst-preview --camera /dev/video0 --countdown 3
///
/// # Synthetic frames, fullscreen
/// export TEST_PATTERN=true
/// edgefirst-preview --fullscreen
/// ```
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Camera capture device path (e.g., /dev/video0)
    #[arg(short, long, env = "CAMERA", default_value = "/dev/video3")]
    pub camera: String,

    /// Camera capture resolution in pixels (width height)
    #[arg(
        long,
        env = "CAMERA_SIZE",
        default_value = "1920 1080",
        value_delimiter = ' ',
        num_args = 2
    )]
    pub camera_size: Vec<u32>,

    /// Show a synthetic dma-heap test pattern instead of the camera
    #[arg(long, env = "TEST_PATTERN")]
    pub test_pattern: bool,

    /// Colour space of the test pattern frames
    #[arg(long, env = "COLOR_SPACE", default_value = "smpte170m", value_enum)]
    pub color_space: ColorSpace,

    /// Preview window position in pixels (x y)
    #[arg(
        long,
        env = "PREVIEW_POSITION",
        default_value = "0 0",
        value_delimiter = ' ',
        num_args = 2
    )]
    pub preview_position: Vec<i32>,

    /// Preview window size in pixels (width height), 0 0 for 1024x768
    #[arg(
        long,
        env = "PREVIEW_SIZE",
        default_value = "0 0",
        value_delimiter = ' ',
        num_args = 2
    )]
    pub preview_size: Vec<u32>,

    /// Cover the whole display with a borderless window
    #[arg(short, long, env = "FULLSCREEN")]
    pub fullscreen: bool,

    /// Window title
    #[arg(long, env = "TITLE", default_value = "edgefirst-preview")]
    pub title: String,

    /// Font used for the countdown digits
    #[arg(long, env = "FONT", default_value = DEFAULT_FONT)]
    pub font: PathBuf,

    /// Count down from N (1-9) before the flash, one digit per second
    #[arg(long, env = "COUNTDOWN", value_parser = clap::value_parser!(u8).range(1..=9))]
    pub countdown: Option<u8>,

    /// Stop after displaying this many frames
    #[arg(long, env = "FRAMES")]
    pub frames: Option<u64>,

    /// Enable verbose debug logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Enable Tracy profiler for performance analysis
    #[arg(long, env = "TRACY")]
    pub tracy: bool,
}

impl From<&Args> for PreviewOptions {
    fn from(args: &Args) -> Self {
        PreviewOptions {
            name: args.title.clone(),
            window: WindowOptions {
                x: args.preview_position[0],
                y: args.preview_position[1],
                width: args.preview_size[0],
                height: args.preview_size[1],
                fullscreen: args.fullscreen,
            },
            font: Some(args.font.clone()),
            ..Default::default()
        }
    }
}
