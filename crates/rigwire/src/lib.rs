//! Real-time transport for PCB inspection rigs.
//!
//! The rig streams camera frames as fragmented UDP datagrams and exchanges
//! JSON commands with the operator console over a single TCP connection.
//! This crate bundles both sides behind one dependency.
//!
//! # Crate Structure
//!
//! - [`transport`]: socket setup shared by both channels
//! - [`codec`]: fragment header and length-prefixed message framing
//! - [`video`]: frame reassembly, admission control and the ingest channel
//! - [`control`]: the single-peer control channel and one-shot commands

/// Re-export transport types.
pub mod transport {
    pub use rigwire_transport::*;
}

/// Re-export wire format types.
pub mod codec {
    pub use rigwire_codec::*;
}

/// Re-export video ingest types.
pub mod video {
    pub use rigwire_video::*;
}

/// Re-export control channel types.
pub mod control {
    pub use rigwire_control::*;
}
