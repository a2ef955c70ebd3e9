//! Groups decoded frames into fixed-size windows.

use crate::error::{LipstreamError, Result};
use crate::pipeline::types::{Frame, Window};
use tracing::debug;

/// Collects frames in arrival order and hands out complete windows of `size`.
///
/// Holds at most `size - 1` frames between calls. A partial window is only
/// released through [`flush_padded`](Self::flush_padded).
#[derive(Debug)]
pub struct WindowAccumulator {
    size: usize,
    pending: Vec<Frame>,
    completed: u64,
}

impl WindowAccumulator {
    pub fn new(size: usize) -> Self {
        Self {
            size,
            pending: Vec::with_capacity(size),
            completed: 0,
        }
    }

    /// Append a frame; returns the window it completes, if any.
    ///
    /// A frame whose dimensions differ from the frames already pending is
    /// rejected and not counted.
    pub fn accept(&mut self, frame: Frame) -> Result<Option<Window>> {
        if let Some(first) = self.pending.first()
            && first.dimensions() != frame.dimensions()
        {
            return Err(LipstreamError::MalformedFrame {
                index: frame.index,
                message: format!(
                    "frame is {:?}, pending frames are {:?}",
                    frame.dimensions(),
                    first.dimensions()
                ),
            });
        }

        self.pending.push(frame);
        if self.pending.len() < self.size {
            return Ok(None);
        }

        let frames = std::mem::replace(&mut self.pending, Vec::with_capacity(self.size));
        let window = Window::from_frames(self.completed, frames)?;
        self.completed += 1;
        Ok(Some(window))
    }

    /// Frames waiting for the current window to fill.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn windows_completed(&self) -> u64 {
        self.completed
    }

    pub fn window_size(&self) -> usize {
        self.size
    }

    /// Complete the pending frames into a window by repeating the last one.
    ///
    /// Returns `None` when nothing is pending.
    pub fn flush_padded(&mut self) -> Result<Option<Window>> {
        let Some(last) = self.pending.last().cloned() else {
            return Ok(None);
        };
        let missing = self.size - self.pending.len();
        debug!(
            pending = self.pending.len(),
            padding = missing,
            "padding partial window"
        );
        for _ in 0..missing {
            self.pending.push(last.clone());
        }

        let frames = std::mem::take(&mut self.pending);
        let window = Window::from_frames(self.completed, frames)?;
        self.completed += 1;
        Ok(Some(window))
    }
}
