//! The reading session core: session state, its persistence, the
//! interpretation loop, and saved readings.

pub mod archive;
pub mod error;
pub mod interpreter;
pub mod service;
pub mod session;
pub mod store;

pub use error::{ReadingError, ReadingResult};
pub use interpreter::{ContextWindow, Interpreter};
pub use service::{DrawPolicy, DrawRequest, DrawResult, NewSession, ReadingPolicy, ReadingService};
pub use session::{DrawOutcome, Phase, ReadingSession};
pub use store::{Lookup, SessionStore};
