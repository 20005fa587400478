use std::io;

use courier_wire::Frame;

/// Outbound half of a connection, as seen by the dispatch engine.
pub trait ReturnChannel {
    /// Sends a binary frame.
    ///
    /// # Errors
    ///
    /// Propagates transport write failures.
    fn send_bytes(&mut self, bytes: Vec<u8>) -> io::Result<()>;

    /// Sends a text frame.
    ///
    /// # Errors
    ///
    /// Propagates transport write failures.
    fn send_text(&mut self, text: String) -> io::Result<()>;

    /// Sends a frame using its own framing kind.
    ///
    /// # Errors
    ///
    /// Propagates transport write failures.
    fn send_frame(&mut self, frame: Frame) -> io::Result<()> {
        match frame {
            Frame::Text(text) => self.send_text(text),
            Frame::Binary(bytes) => self.send_bytes(bytes),
        }
    }
}

/// Return channel that keeps every frame in memory.
#[derive(Debug, Default)]
pub struct CollectingChannel {
    frames: Vec<Frame>,
}

impl CollectingChannel {
    /// Frames collected so far.
    #[must_use]
    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    /// Consumes the channel and returns its frames.
    #[must_use]
    pub fn into_frames(self) -> Vec<Frame> {
        self.frames
    }
}

impl ReturnChannel for CollectingChannel {
    fn send_bytes(&mut self, bytes: Vec<u8>) -> io::Result<()> {
        self.frames.push(Frame::Binary(bytes));
        Ok(())
    }

    fn send_text(&mut self, text: String) -> io::Result<()> {
        self.frames.push(Frame::Text(text));
        Ok(())
    }
}
