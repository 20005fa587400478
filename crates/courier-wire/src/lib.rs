//! Wire model shared by every courier transport.
//!
//! The crate defines the versioned [`Envelope`], the structured [`Document`]
//! payload model, and the [`Codec`] abstraction with its two encodings: a
//! textual JSON codec that renders binary fields as standard base64, and a
//! binary CBOR codec that carries them natively. Everything above this crate
//! works against [`Document`] values and never branches on the codec in use.
//!
//! No I/O happens here. Transports turn sockets into [`Frame`] values and hand
//! them to a codec.

mod binary;
pub mod codec;
mod correlation;
pub mod document;
mod envelope;
mod frame;
mod status;
mod version;

pub use binary::Binary;
pub use codec::{Codec, CodecError, CodecSet};
pub use correlation::CorrelationId;
pub use document::{Document, DocumentError};
pub use envelope::{Envelope, EnvelopeError};
pub use frame::{Frame, FrameKind};
pub use status::CloseStatus;
pub use version::{PROTOCOL_VERSION, Version, VersionParseError};
