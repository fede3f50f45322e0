//! CPU-side pixel transforms for the effects a fragment program cannot
//! express exactly, plus the bounded buffer pool they draw from.

use crate::effects::Effect;
use crate::types::{CameraFrame, BYTES_PER_PIXEL};

/// Maximum number of idle buffers kept for reuse.
pub const POOL_CAPACITY: usize = 3;

/// A pixel whose red channel reaches this value, and is at least double both
/// green and blue, is keyed out by [`remove_red`].
pub const RED_KEY_THRESHOLD: u8 = 100;

/// Free list of frame-sized byte buffers.
///
/// Buffers are matched by exact length. Returning a buffer to a full pool
/// drops it.
#[derive(Debug)]
pub struct BufferPool {
    free: Vec<Vec<u8>>,
    capacity: usize,
}

impl BufferPool {
    pub fn new() -> Self {
        Self::with_capacity(POOL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            free: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Takes a buffer of exactly `len` bytes, reusing an idle one if the
    /// pool has it. Contents are unspecified.
    pub fn acquire(&mut self, len: usize) -> Vec<u8> {
        match self.free.iter().position(|buffer| buffer.len() == len) {
            Some(index) => self.free.swap_remove(index),
            None => vec![0; len],
        }
    }

    /// Returns `buffer` to the pool. Returns `false` when the pool was full
    /// and the buffer was discarded.
    pub fn release(&mut self, buffer: Vec<u8>) -> bool {
        if self.free.len() >= self.capacity {
            return false;
        }
        self.free.push(buffer);
        true
    }

    pub fn len(&self) -> usize {
        self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.free.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.free.clear();
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new()
    }
}

/// Pixels ready for upload: either the caller's frame untouched or a pooled
/// buffer holding the transformed copy.
#[derive(Debug)]
pub enum FramePixels<'a> {
    Borrowed(&'a [u8]),
    Pooled(Vec<u8>),
}

impl FramePixels<'_> {
    pub fn as_slice(&self) -> &[u8] {
        match self {
            FramePixels::Borrowed(pixels) => pixels,
            FramePixels::Pooled(buffer) => buffer,
        }
    }

    pub fn is_pooled(&self) -> bool {
        matches!(self, FramePixels::Pooled(_))
    }

    /// Hands a pooled buffer back to `pool`. Borrowed pixels are left alone.
    pub fn recycle(self, pool: &mut BufferPool) {
        if let FramePixels::Pooled(buffer) = self {
            pool.release(buffer);
        }
    }
}

/// Applies the CPU stage of `effect` to `frame`.
///
/// Effects without a CPU stage borrow the frame's pixels directly. The frame
/// is assumed to be validated.
pub fn preprocess<'a>(
    effect: Effect,
    frame: &'a CameraFrame,
    pool: &mut BufferPool,
) -> FramePixels<'a> {
    if !effect.needs_cpu_pass() {
        return FramePixels::Borrowed(&frame.pixels);
    }

    let mut output = pool.acquire(frame.pixels.len());
    match effect {
        Effect::RedRemove => remove_red(&frame.pixels, &mut output),
        Effect::Mirror => mirror_horizontal(&frame.pixels, &mut output, frame.width as usize),
        _ => output.copy_from_slice(&frame.pixels),
    }
    FramePixels::Pooled(output)
}

/// Keys out strongly red pixels: each such pixel becomes transparent black,
/// every other pixel is copied unchanged.
pub fn remove_red(src: &[u8], dst: &mut [u8]) {
    for (out, px) in dst
        .chunks_exact_mut(BYTES_PER_PIXEL)
        .zip(src.chunks_exact(BYTES_PER_PIXEL))
    {
        if is_keyed_red(px[0], px[1], px[2]) {
            out.fill(0);
        } else {
            out.copy_from_slice(px);
        }
    }
}

fn is_keyed_red(r: u8, g: u8, b: u8) -> bool {
    let r16 = u16::from(r);
    r >= RED_KEY_THRESHOLD && r16 >= u16::from(g) * 2 && r16 >= u16::from(b) * 2
}

/// Reverses every row: column `x` of `src` lands in column `width - 1 - x`.
pub fn mirror_horizontal(src: &[u8], dst: &mut [u8], width: usize) {
    let row_bytes = width * BYTES_PER_PIXEL;
    if row_bytes == 0 {
        return;
    }
    for (dst_row, src_row) in dst.chunks_exact_mut(row_bytes).zip(src.chunks_exact(row_bytes)) {
        for (out, px) in dst_row
            .chunks_exact_mut(BYTES_PER_PIXEL)
            .zip(src_row.chunks_exact(BYTES_PER_PIXEL).rev())
        {
            out.copy_from_slice(px);
        }
    }
}
