pub mod command;
mod config;
mod event;
mod interface;
pub mod task;
mod task_status;

pub use command::*;
pub use config::*;
pub use event::*;
pub use task::*;
pub use task_status::*;
