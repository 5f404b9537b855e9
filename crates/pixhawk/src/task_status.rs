//! Bridge for the `TASK_STATUS_CHANGE` record sent by the flight controller.
//!
//! The record isn't part of any dialect the `mavlink` crate knows, so its
//! frames are picked out of the stream by message id and decoded here. Values
//! are republished unchanged, stamped with the receive time and a frame id.

use bytes::Buf;
use chrono::{DateTime, Local};
use serde::Deserialize;
use thiserror::Error;

/// Payload length on the wire: u64 timestamp, u32 loop value, two u8 fields.
pub const TASK_STATUS_PAYLOAD_LEN: usize = 14;

#[derive(Debug, Clone, Deserialize)]
pub struct TaskStatusConfig {
    pub message_id: u32,
    pub crc_extra: u8,

    #[serde(default = "default_frame_id")]
    pub frame_id: String,
}

fn default_frame_id() -> String {
    "map".to_owned()
}

/// The record as it arrives from the flight controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskStatusRecord {
    /// Controller-side timestamp in microseconds. Not republished.
    pub time_usec: u64,
    pub loop_value: u32,
    pub num_odd_even: u8,
    pub task_status: u8,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Header {
    pub stamp: DateTime<Local>,
    pub frame_id: String,
}

/// The record as republished on the supervisor's input bus.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskStatusChange {
    pub header: Header,
    pub num_odd_even: u8,
    pub task_status: u8,
    pub loop_value: u32,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum TaskStatusError {
    #[error("payload is {0} bytes, longer than a task status record")]
    TooLong(usize),
    #[error("checksum mismatch (frame has {actual:#06x}, computed {expected:#06x})")]
    Checksum { expected: u16, actual: u16 },
}

impl TaskStatusRecord {
    /// Decodes a little-endian payload. MAVLink v2 strips trailing zero
    /// bytes, so short payloads are zero-extended.
    pub fn decode(payload: &[u8]) -> Result<Self, TaskStatusError> {
        if payload.len() > TASK_STATUS_PAYLOAD_LEN {
            return Err(TaskStatusError::TooLong(payload.len()));
        }

        let mut padded = [0u8; TASK_STATUS_PAYLOAD_LEN];
        padded[..payload.len()].copy_from_slice(payload);

        let mut buf = &padded[..];

        Ok(TaskStatusRecord {
            time_usec: buf.get_u64_le(),
            loop_value: buf.get_u32_le(),
            num_odd_even: buf.get_u8(),
            task_status: buf.get_u8(),
        })
    }

    pub fn republish(&self, stamp: DateTime<Local>, frame_id: &str) -> TaskStatusChange {
        TaskStatusChange {
            header: Header {
                stamp,
                frame_id: frame_id.to_owned(),
            },
            num_odd_even: self.num_odd_even,
            task_status: self.task_status,
            loop_value: self.loop_value,
        }
    }
}
