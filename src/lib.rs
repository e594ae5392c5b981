pub mod channel;
pub mod config;
pub mod constants;
pub mod error;
pub mod frame;
pub mod guide;
pub mod logging;
pub mod metrics;
pub mod progress;
pub mod quality;
pub mod replay;
pub mod session;
pub mod submit;

pub use error::{DeviceError, InitStep, SessionError, SinkError};
pub use session::{SessionController, SessionHandle, SessionOutcome, SessionUpdate};
