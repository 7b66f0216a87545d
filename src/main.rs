// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use args::Args;
use clap::Parser;
use dma_buf::{DmaBuf, MappedDmaBuf};
use dma_heap::{Heap, HeapKind};
use edgefirst_preview::{
    glyph::BACKDROP_GLYPH, FrameDescriptor, GlesBackend, Handle, Preview, PreviewOptions,
};
use kanal::Receiver;
use std::{
    collections::{HashMap, VecDeque},
    error::Error,
    os::fd::AsRawFd,
    time::Instant,
};
use tracing::{debug, info, warn};
use tracing_subscriber::{filter::LevelFilter, layer::SubscriberExt};
use videostream::{
    camera::{create_camera, CameraBuffer},
    fourcc::FourCC,
};

mod args;

/// Planar YUV 4:2:0, the only layout the preview imports.
const YU12: FourCC = FourCC(*b"YU12");

/// Buffers in the test pattern ring. The preview holds at most two.
const PATTERN_BUFFERS: usize = 3;

/// Frames between window title updates.
const TITLE_INTERVAL: u64 = 30;

fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    init_tracing(&args)?;
    info!("EdgeFirst Preview");

    let (tx, rx) = kanal::unbounded();
    let mut preview = Preview::open(&PreviewOptions::from(&args), move |handle: Handle| {
        if let Err(e) = tx.send(handle) {
            warn!("release of {handle} dropped: {e}");
        }
    })?;
    preview.set_title(&args.title);

    if args.test_pattern {
        run_pattern(&mut preview, &rx, &args)
    } else {
        run_camera(&mut preview, &rx, &args)
    }
}

fn init_tracing(args: &Args) -> Result<(), Box<dyn Error>> {
    let level = if args.verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };

    let journald = tracing_journald::layer().ok();
    let tracy = if args.tracy {
        let _ = tracy_client::Client::start();
        Some(tracing_tracy::TracyLayer::default())
    } else {
        None
    };

    let subscriber = tracing_subscriber::registry()
        .with(level)
        .with(tracing_subscriber::fmt::layer())
        .with(journald)
        .with(tracy);
    tracing::subscriber::set_global_default(subscriber)?;
    tracing_log::LogTracer::init()?;

    Ok(())
}

fn update_fps(prev: &mut Instant, history: &mut [i64], index: &mut usize) -> i64 {
    let now = Instant::now();

    let elapsed = now.duration_since(*prev);
    *prev = now;

    history[*index] = 1e9 as i64 / (elapsed.as_nanos() as i64).max(1);
    *index = (*index + 1) % history.len();

    (history.iter().sum::<i64>() as f64 / history.len() as f64).round() as i64
}

/// Wall-clock countdown showing one digit per second, then the flash.
struct Countdown {
    start: Instant,
    from: u8,
    shown: Option<u8>,
}

impl Countdown {
    fn new(from: u8, start: Instant) -> Self {
        Self {
            start,
            from,
            shown: None,
        }
    }

    /// The glyph to show at `now` if it changed since the last call.
    fn due(&mut self, now: Instant) -> Option<u8> {
        let elapsed = now.duration_since(self.start).as_secs();
        if elapsed > u64::from(self.from) {
            return None;
        }

        let glyph = self.from - elapsed as u8;
        if self.shown == Some(glyph) {
            return None;
        }
        self.shown = Some(glyph);
        Some(glyph)
    }
}

/// Per-frame bookkeeping shared by the camera and test pattern loops.
struct Session {
    title: String,
    countdown: Option<Countdown>,
    limit: Option<u64>,
    frames: u64,
    prev: Instant,
    history: Vec<i64>,
    index: usize,
}

impl Session {
    fn new(args: &Args) -> Self {
        let now = Instant::now();
        Self {
            title: args.title.clone(),
            countdown: args.countdown.map(|from| Countdown::new(from, now)),
            limit: args.frames,
            frames: 0,
            prev: now,
            history: vec![0; 30],
            index: 0,
        }
    }

    /// Displays one frame and reports whether the loop should continue.
    fn show(
        &mut self,
        preview: &mut Preview<GlesBackend>,
        handle: Handle,
        size: usize,
        desc: &FrameDescriptor,
    ) -> Result<bool, Box<dyn Error>> {
        if let Some(countdown) = &mut self.countdown {
            if let Some(glyph) = countdown.due(Instant::now()) {
                debug!("countdown {glyph}");
                preview.show_overlay(glyph, 1.0);
                if glyph == BACKDROP_GLYPH {
                    info!("flash");
                }
            }
        }

        preview.display(handle, size, desc)?;
        if let Some(client) = tracy_client::Client::running() {
            client.frame_mark();
        }

        self.frames += 1;
        let fps = update_fps(&mut self.prev, &mut self.history, &mut self.index);
        if self.frames % TITLE_INTERVAL == 0 {
            preview.set_title(&format!("{} {fps}fps", self.title));
            debug!("frame {} {desc} fps: {fps}", self.frames);
        }

        if preview.poll_close_requested() {
            info!("preview window closed");
            return Ok(false);
        }
        Ok(self.limit.map_or(true, |limit| self.frames < limit))
    }
}

fn check_size(
    preview: &Preview<GlesBackend>,
    width: u32,
    height: u32,
) -> Result<(), Box<dyn Error>> {
    let (max_width, max_height) = preview.max_image_size();
    if width > max_width || height > max_height {
        return Err(Box::from(format!(
            "{width}x{height} frames exceed the preview limit of {max_width}x{max_height}"
        )));
    }
    Ok(())
}

fn run_camera(
    preview: &mut Preview<GlesBackend>,
    releases: &Receiver<Handle>,
    args: &Args,
) -> Result<(), Box<dyn Error>> {
    let cam = create_camera()
        .with_device(&args.camera)
        .with_resolution(args.camera_size[0] as i32, args.camera_size[1] as i32)
        .with_format(YU12)
        .open()?;
    cam.start()?;

    if cam.width() as u32 != args.camera_size[0] || cam.height() as u32 != args.camera_size[1] {
        warn!(
            "User requested {} {} resolution but camera set {} {} resolution",
            args.camera_size[0],
            args.camera_size[1],
            cam.width(),
            cam.height()
        );
    }
    check_size(preview, cam.width() as u32, cam.height() as u32)?;

    let desc = FrameDescriptor::new(
        cam.width() as u32,
        cam.height() as u32,
        cam.width() as u32,
        Some(args.color_space),
    );
    info!("camera {} {desc}", args.camera);

    // Captured buffers go back to the camera when dropped, so each one is
    // held until the preview releases its fd.
    let mut held: HashMap<Handle, CameraBuffer<'_>> = HashMap::new();
    let mut session = Session::new(args);
    loop {
        let buf = cam.read()?;
        let fourcc = buf.format().0;
        if fourcc != YU12.0 {
            return Err(Box::from(format!(
                "camera delivers {} frames, the preview needs YU12",
                String::from_utf8_lossy(&fourcc)
            )));
        }
        let handle = Handle::from_raw_fd(buf.rawfd());
        let size = buf.length() as usize;

        let running = session.show(preview, handle, size, &desc)?;
        held.insert(handle, buf);
        while let Some(released) = releases.try_recv()? {
            held.remove(&released);
        }

        if !running {
            break;
        }
    }

    preview.reset()?;
    Ok(())
}

fn fill_pattern(
    data: &mut [u8],
    frame: Option<(FrameDescriptor, u64)>,
) -> Result<(), Box<dyn Error>> {
    let Some((desc, index)) = frame else {
        return Ok(());
    };
    let stride = desc.stride as usize;
    let luma = stride * desc.height as usize;
    if data.len() < desc.size() {
        return Err(Box::from(format!(
            "pattern buffer holds {} bytes, {desc} needs {}",
            data.len(),
            desc.size()
        )));
    }

    let (y, chroma) = data.split_at_mut(luma);
    let shift = index as usize * 4;
    for (row, line) in y.chunks_mut(stride).enumerate() {
        for (col, px) in line.iter_mut().enumerate() {
            *px = ((col + row + shift) % 256) as u8;
        }
    }
    chroma.fill(128);
    Ok(())
}

/// Pattern buffers the preview does not hold, in the order they came back.
struct FreeRing {
    free: VecDeque<Handle>,
}

impl FreeRing {
    fn new(handles: impl IntoIterator<Item = Handle>) -> Self {
        Self {
            free: handles.into_iter().collect(),
        }
    }

    fn take(&mut self) -> Result<Handle, Box<dyn Error>> {
        self.free
            .pop_front()
            .ok_or_else(|| Box::from("all pattern buffers are held by the preview"))
    }

    /// Returns every buffer the preview released since the last call.
    fn reclaim(&mut self, releases: &Receiver<Handle>) -> Result<(), Box<dyn Error>> {
        while let Some(released) = releases.try_recv()? {
            self.free.push_back(released);
        }
        Ok(())
    }
}

fn run_pattern(
    preview: &mut Preview<GlesBackend>,
    releases: &Receiver<Handle>,
    args: &Args,
) -> Result<(), Box<dyn Error>> {
    let (width, height) = (args.camera_size[0], args.camera_size[1]);
    check_size(preview, width, height)?;
    let desc = FrameDescriptor::new(width, height, width, Some(args.color_space));

    // Mapped once, the mapping keeps the buffer alive for the whole run.
    let heap = Heap::new(HeapKind::Cma)?;
    let mut buffers: HashMap<Handle, MappedDmaBuf> = HashMap::new();
    for _ in 0..PATTERN_BUFFERS {
        let fd = heap.allocate(desc.size())?;
        let handle = Handle::from_raw_fd(fd.as_raw_fd());
        buffers.insert(handle, DmaBuf::from(fd).memory_map()?);
    }
    let mut ring = FreeRing::new(buffers.keys().copied());
    info!("test pattern {desc} in {PATTERN_BUFFERS} buffers");

    let mut session = Session::new(args);
    let mut index = 0u64;
    loop {
        let handle = ring.take()?;
        let mem = buffers
            .get_mut(&handle)
            .ok_or_else(|| format!("preview released unknown buffer {handle}"))?;
        mem.write(fill_pattern, Some((desc, index)))?;

        let running = session.show(preview, handle, desc.size(), &desc)?;
        index += 1;
        ring.reclaim(releases)?;

        if !running {
            break;
        }
    }

    preview.reset()?;
    Ok(())
}
