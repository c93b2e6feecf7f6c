//! Error types for the management protocol engine.
//!
//! The taxonomy distinguishes structural wire problems (dropped and logged),
//! environment problems that make the socket unusable (fatal), and
//! caller-facing command failures (returned as values).

use thiserror::Error;

use crate::mgmt::{
   codec::FrameError,
   protocol::{MgmtOpcode, RawStatus},
};

/// Main error type for the management engine.
#[derive(Error, Debug)]
pub enum MgmtError {
   /// Malformed, short, or oversized frame. Never fatal; the offending
   /// frame is dropped.
   #[error("frame error: {0}")]
   Frame(#[from] FrameError),

   /// The kernel speaks a management version this engine cannot use. The
   /// session must not continue.
   #[error("management version {0} not supported (need version 1 or later)")]
   UnsupportedVersion(u8),

   /// A controller index beyond the high-water mark, or one whose entry has
   /// been removed.
   #[error("unknown controller index {0}")]
   UnknownIndex(u16),

   /// Caller-supplied command parameters out of range; no command was sent.
   #[error("invalid argument: {0}")]
   InvalidArgument(&'static str),

   /// Read or write failure on the control socket or the filesystem.
   #[error("I/O error: {0}")]
   Io(#[from] std::io::Error),

   /// Non-zero status reported by the kernel for a command.
   #[error("{opcode} failed: {status}")]
   KernelRejected { opcode: MgmtOpcode, status: RawStatus },

   /// The control socket was closed underneath the session.
   #[error("control socket closed")]
   SocketClosed,

   #[error("could not determine config directory")]
   ConfigDirNotFound,

   #[error("TOML parsing error: {0}")]
   TomlParse(#[from] toml::de::Error),

   #[error("TOML serialization error: {0}")]
   TomlSerialize(#[from] toml::ser::Error),
}

/// Convenience type alias for Results with `MgmtError`.
pub type Result<T> = std::result::Result<T, MgmtError>;
