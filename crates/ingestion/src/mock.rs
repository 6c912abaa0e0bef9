//! Mock camera
//!
//! Frame source for running without a capture device. Failures are injected
//! through a shared `MockCameraScript`.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use contracts::{unix_timestamp, ContractError, Frame, FrameSource, PixelFormat};
use tracing::trace;

/// Failure injection shared between a `MockCamera` and its test
#[derive(Debug, Default)]
pub struct MockCameraScript {
    failing_reads: AtomicU32,
    disconnected: AtomicBool,
    open_calls: AtomicU32,
    read_calls: AtomicU32,
}

impl MockCameraScript {
    /// Fail the next `count` reads
    pub fn fail_next_reads(&self, count: u32) {
        self.failing_reads.store(count, Ordering::SeqCst);
    }

    /// Unplug: every open and read fails until `reconnect`
    pub fn disconnect(&self) {
        self.disconnected.store(true, Ordering::SeqCst);
    }

    /// Plug back in
    pub fn reconnect(&self) {
        self.disconnected.store(false, Ordering::SeqCst);
    }

    /// Number of `open` calls so far
    pub fn open_calls(&self) -> u32 {
        self.open_calls.load(Ordering::SeqCst)
    }

    /// Number of `read` calls so far
    pub fn read_calls(&self) -> u32 {
        self.read_calls.load(Ordering::SeqCst)
    }

    fn is_disconnected(&self) -> bool {
        self.disconnected.load(Ordering::SeqCst)
    }

    fn take_read_failure(&self) -> bool {
        self.failing_reads
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

/// Synthetic camera producing gradient frames
pub struct MockCamera {
    index: u32,
    width: u32,
    height: u32,
    open: bool,
    next_frame_id: u64,
    script: Arc<MockCameraScript>,
}

impl MockCamera {
    /// Create a closed mock camera
    pub fn new(index: u32, width: u32, height: u32) -> Self {
        Self {
            index,
            width,
            height,
            open: false,
            next_frame_id: 0,
            script: Arc::new(MockCameraScript::default()),
        }
    }

    /// Failure injection handle
    pub fn script(&self) -> Arc<MockCameraScript> {
        self.script.clone()
    }

    fn render(&mut self) -> Frame {
        let frame_id = self.next_frame_id;
        self.next_frame_id += 1;

        let format = PixelFormat::Bgr8;
        let row = self.width as usize * format.bytes_per_pixel();
        let mut data = vec![0u8; row * self.height as usize];
        let shade = (frame_id % 256) as u8;
        for (i, px) in data.iter_mut().enumerate() {
            *px = shade.wrapping_add((i % row) as u8);
        }

        Frame {
            frame_id,
            timestamp: unix_timestamp(),
            width: self.width,
            height: self.height,
            format,
            data: Bytes::from(data),
        }
    }
}

impl FrameSource for MockCamera {
    fn index(&self) -> u32 {
        self.index
    }

    async fn open(&mut self) -> Result<(), ContractError> {
        self.script.open_calls.fetch_add(1, Ordering::SeqCst);
        if self.script.is_disconnected() {
            return Err(ContractError::camera(self.index, "device not found"));
        }
        self.open = true;
        Ok(())
    }

    async fn read(&mut self) -> Result<Frame, ContractError> {
        self.script.read_calls.fetch_add(1, Ordering::SeqCst);
        if !self.open {
            return Err(ContractError::camera(self.index, "device not open"));
        }
        if self.script.is_disconnected() || self.script.take_read_failure() {
            return Err(ContractError::camera(self.index, "frame grab failed"));
        }
        let frame = self.render();
        trace!(camera = self.index, frame_id = frame.frame_id, "mock frame");
        Ok(frame)
    }

    async fn release(&mut self) {
        self.open = false;
    }

    fn is_open(&self) -> bool {
        self.open
    }
}
