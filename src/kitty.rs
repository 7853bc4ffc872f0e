//! Kitty graphics protocol encoding and terminal capability detection.
//!
//! Images are sent as PNG (`f=100`), base64 encoded and split into 4096-byte
//! chunks; every chunk but the last carries `m=1`.

use std::env;
use std::io::{self, Cursor, Write};

use anyhow::{Context, Result};
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use crossterm::{cursor::MoveTo, queue};
use image::{DynamicImage, ImageFormat};
use ratatui_image::picker::{Picker, ProtocolType};

use crate::image_render::GraphicsSupport;

const CHUNK_SIZE: usize = 4096;

/// Deletes every image placed by this process.
pub const DELETE_ALL: &str = "\x1b_Ga=d,q=2\x1b\\";

/// A transmit-and-display payload, ready to write at a cursor position.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KittyImage {
    pub cols: u16,
    pub rows: u16,
    pub chunks: Vec<String>,
}

pub fn encode_png(img: &DynamicImage, cols: u16, rows: u16) -> Result<KittyImage> {
    let mut png = Vec::new();
    img.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .context("encoding PNG")?;
    Ok(KittyImage {
        cols,
        rows,
        chunks: transmit_chunks(&png, cols, rows),
    })
}

/// Split a PNG into protocol chunks. The first chunk carries the control
/// keys; continuation chunks only carry `m`.
pub fn transmit_chunks(png: &[u8], cols: u16, rows: u16) -> Vec<String> {
    let encoded = BASE64.encode(png);
    let total = encoded.len().div_ceil(CHUNK_SIZE).max(1);

    (0..total)
        .map(|i| {
            let start = (i * CHUNK_SIZE).min(encoded.len());
            let end = ((i + 1) * CHUNK_SIZE).min(encoded.len());
            // base64 is ASCII, so any byte offset is a char boundary.
            let payload = &encoded[start..end];
            let more = u8::from(i + 1 < total);
            if i == 0 {
                format!("\x1b_Gf=100,a=T,c={cols},r={rows},q=2,m={more};{payload}\x1b\\")
            } else {
                format!("\x1b_Gm={more};{payload}\x1b\\")
            }
        })
        .collect()
}

pub(crate) fn in_tmux() -> bool {
    env::var_os("TMUX").is_some()
        || env::var_os("TERM").is_some_and(|t| t.to_string_lossy().starts_with("tmux"))
}

pub(crate) fn tmux_passthrough(seq: &str) -> String {
    let escaped = seq.replace('\x1b', "\x1b\x1b");
    format!("\x1bPtmux;{}\x1b\\", escaped)
}

fn write_sequence<W: Write>(out: &mut W, seq: &str, tmux: bool) -> io::Result<()> {
    if tmux {
        out.write_all(tmux_passthrough(seq).as_bytes())
    } else {
        out.write_all(seq.as_bytes())
    }
}

/// Place `image` with its top-left corner at cell (`x`, `y`).
pub fn write_image<W: Write>(out: &mut W, image: &KittyImage, x: u16, y: u16) -> io::Result<()> {
    let tmux = in_tmux();
    queue!(out, MoveTo(x, y))?;
    for chunk in &image.chunks {
        write_sequence(out, chunk, tmux)?;
    }
    out.flush()
}

pub fn delete_all<W: Write>(out: &mut W) -> io::Result<()> {
    write_sequence(out, DELETE_ALL, in_tmux())?;
    out.flush()
}

fn is_ssh_session() -> bool {
    env::var_os("SSH_CONNECTION").is_some() || env::var_os("SSH_TTY").is_some()
}

/// Probe the terminal once. Must run after raw mode is enabled.
pub fn detect_support() -> GraphicsSupport {
    let truecolor = env::var("COLORTERM")
        .map(|v| matches!(v.as_str(), "truecolor" | "24bit"))
        .unwrap_or(false);

    let kitty = if is_ssh_session() {
        false
    } else {
        match Picker::from_query_stdio() {
            Ok(picker) => matches!(picker.protocol_type(), ProtocolType::Kitty),
            Err(e) => {
                log::debug!("graphics query failed, using half-blocks: {e}");
                false
            }
        }
    };

    log::info!("graphics support: kitty={kitty} truecolor={truecolor}");
    GraphicsSupport { kitty, truecolor }
}
