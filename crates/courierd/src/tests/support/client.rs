//! Blocking framed client used to drive a served runtime over TCP.

use std::io::Write;
use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;
use std::time::Duration;

use courier_wire::document::Document;
use courier_wire::{Codec, CodecSet, CorrelationId, Envelope, Frame, Version};

use crate::transport::frame::{WireFrame, read_frame, write_frame};

const READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Client bound to one codec endpoint.
pub struct TestClient {
    stream: TcpStream,
    codec: Arc<dyn Codec>,
}

impl TestClient {
    /// Opens a socket without performing the handshake.
    pub fn raw(addr: SocketAddr) -> TcpStream {
        let stream = TcpStream::connect(addr).expect("connect to test server");
        stream
            .set_read_timeout(Some(READ_TIMEOUT))
            .expect("set read timeout");
        stream
    }

    /// Sends `path` as the handshake and returns the server's answer.
    pub fn handshake(stream: &mut TcpStream, path: &str) -> WireFrame {
        write_frame(stream, &WireFrame::Data(Frame::Text(path.to_owned())))
            .expect("send handshake");
        read_frame(stream)
            .expect("read handshake reply")
            .expect("server closed before replying")
    }

    /// Connects to `/api/<codec>` and checks the negotiated media type.
    pub fn connect(addr: SocketAddr, codec: &str) -> Self {
        let codec = CodecSet::standard().by_name(codec).expect("known codec");
        let mut stream = Self::raw(addr);
        let reply = Self::handshake(&mut stream, &format!("/api/{}", codec.name()));
        assert_eq!(
            reply,
            WireFrame::Data(Frame::Text(codec.media_type().to_owned()))
        );
        Self { stream, codec }
    }

    /// Builds a request envelope with a fixed correlation id.
    pub fn envelope(message_type: &str, payload: Option<Document>) -> Envelope {
        Envelope::new(
            Version::new(1, 0, 0),
            CorrelationId::new(*b"req-1"),
            message_type,
            payload,
        )
    }

    /// Encodes and sends `envelope` with the bound codec.
    pub fn send_envelope(&mut self, envelope: &Envelope) {
        let frame = self.codec.encode(envelope).expect("encode request");
        self.send(&WireFrame::Data(frame));
    }

    /// Sends a request and returns the first non-probe response.
    pub fn request(&mut self, message_type: &str, payload: Option<Document>) -> Envelope {
        self.send_envelope(&Self::envelope(message_type, payload));
        self.next_envelope()
    }

    /// Writes a raw frame.
    pub fn send(&mut self, frame: &WireFrame) {
        write_frame(&mut self.stream, frame).expect("send frame");
    }

    /// Writes bytes that need not form a valid frame.
    pub fn send_raw(&mut self, bytes: &[u8]) {
        self.stream.write_all(bytes).expect("send raw bytes");
    }

    /// Local address of the client socket.
    pub fn local_addr(&self) -> SocketAddr {
        self.stream.local_addr().expect("client address")
    }

    /// Reads the next frame; `None` once the server hung up.
    pub fn next_frame(&mut self) -> Option<WireFrame> {
        read_frame(&mut self.stream).expect("read frame")
    }

    /// Reads the next data frame, skipping keep-alive probes, and decodes it.
    pub fn next_envelope(&mut self) -> Envelope {
        loop {
            match self.next_frame() {
                Some(WireFrame::Data(frame)) => {
                    return self.codec.decode(&frame).expect("decode response");
                }
                Some(WireFrame::Ping(_) | WireFrame::Pong(_)) => {}
                other => panic!("expected a data frame, got {other:?}"),
            }
        }
    }
}
