//! Media data model shared by the probing, encoding and muxing stages.

pub mod descriptor;
pub mod tracks;

// Re-export commonly used types
pub use descriptor::{FrameRate, MediaDescriptor, bit_depth_from_pix_fmt};
pub use tracks::{Track, TrackKind, TrackSet};
