//! PairLink protocol core.
//! No network I/O; the node crate owns the sockets and drives these types.

pub mod envelope;
pub mod frame;
pub mod identity;
pub mod message;

pub use envelope::{Envelope, EnvelopeError};
pub use frame::{decode_frame, encode_frame, FrameDecodeError, FrameEncodeError, MAX_FRAME_LEN};
pub use identity::{seal, verify, DeviceKeys, IdentityError, PublicIdentity, SealError};
pub use message::{PlainMessage, StoredMessage};
