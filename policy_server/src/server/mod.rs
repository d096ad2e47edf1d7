//! UDP decision server.
//!
//! - `protocol`: JSON request/response codec
//! - `decision_server`: the single-threaded serving loop
//! - `autosave`: periodic persistence loop
//! - `runtime`: process wiring of all three loops

pub mod autosave;
pub mod decision_server;
pub mod protocol;
pub mod runtime;


pub use autosave::{AutosaveHandle, Autosaver};
pub use decision_server::{DecisionServer, DecisionServerConfig};
pub use protocol::{DecisionRequest, DecisionResponse, DecodeError, decode_request, encode_response};
pub use runtime::{run, run_on_socket};
