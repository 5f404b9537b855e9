mod config;
mod gateway;
mod machine;
mod publisher;
mod throttle;
pub mod task;

pub use config::*;
pub use gateway::*;
pub use machine::*;
pub use publisher::*;
pub use throttle::*;
pub use task::{create_task, MissionTask, PixhawkMissionTask};
