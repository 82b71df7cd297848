//! Recording lifecycle
//!
//! The `Recorder` façade ties the capture pipeline together:
//! - rolling rings created at start and released at stop
//! - save-clip with debounce, delegated to the clip saver
//! - externally visible state with buffer usage

pub mod coordinator;
pub mod state;

pub use coordinator::Recorder;
pub use state::{RecorderState, RecorderStatus};
