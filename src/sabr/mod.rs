//! SABR protocol engine: request building, UMP part dispatch, session state, transport, and the
//! on-disk progress store.

pub mod config;
pub mod format;
pub mod handlers;
pub mod request;
pub mod session;
pub mod transport;
#[cfg(feature = "fetch")]
pub mod writer;

pub use config::SabrSessionConfig;
pub use format::FormatSelector;
pub use session::{Event, PoTokenStatusKind, RefreshReason, SeekReason, SessionState};
#[cfg(feature = "fetch")]
pub use session::SabrSession;
#[cfg(feature = "fetch")]
pub use writer::FormatWriter;
