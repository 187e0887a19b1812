// Shared protocol types used across the heron crates.
pub mod attrs;

mod namespace;
mod topic;

pub use namespace::Namespace;
pub use topic::Topic;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("bad topic {topic:?}: {reason}")]
    BadTopic { topic: String, reason: String },
}

/// Version of the publish/subscribe protocol implemented by this workspace.
/// It is carried in every `Start` message so the broker knows what to
/// expect; a broker may choose to support more than the latest version.
pub const CURRENT_PROTO_VSN: i32 = 1;
