//! Supervision of the locally launched tool server.

mod process;
mod state;
mod stderr;

pub use process::{
    HOST_ENV_VAR, MAX_STDERR_BYTES, PORT_ENV_VAR, ProcessConfig, ToolServerSupervisor,
};
pub use state::{SupervisorError, SupervisorState};
