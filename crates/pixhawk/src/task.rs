use std::{net::SocketAddr, time::Duration};

use anyhow::{bail, Context};
use async_trait::async_trait;
use chrono::Local;
use ms_client::{ChannelCommandSink, ChannelCommandSource, Command, Task};
use ms_types::{enu_yaw_to_ned, FlightMode, Vector3, Waypoint};
use tokio::{select, time::Instant};
use tokio_util::sync::CancellationToken;
use tracing::*;

use mavlink::{common, MavHeader, MavlinkVersion};

use crate::{
    interface::{Frame, PixhawkInterface},
    PixhawkConfig, PixhawkEvent, PixhawkRequest, PixhawkResponse, TaskStatusRecord,
};

const HEARTBEAT_PERIOD: Duration = Duration::from_secs(1);
/// Pause after a socket error so a failing socket doesn't spin the loop.
const LINK_ERROR_BACKOFF: Duration = Duration::from_millis(100);

pub fn create_task(config: PixhawkConfig) -> anyhow::Result<PixhawkTask> {
    let (evt_tx, evt_rx) = flume::bounded(256);
    let (cmd_tx, cmd_rx) = ms_client::command_channel(16);
    // setpoints are only useful while fresh, keep the queue short
    let (setpoint_tx, setpoint_rx) = flume::bounded(8);

    Ok(PixhawkTask {
        address: config.address,
        version: match config.mavlink.as_str() {
            "V1" => MavlinkVersion::V1,
            "V2" => MavlinkVersion::V2,
            other => bail!("invalid mavlink version {other}"),
        },
        system_id: config.system_id,
        component_id: config.component_id,
        heartbeat_timeout: config.heartbeat_timeout,
        command_timeout: config.command_timeout,
        task_status: config.task_status.map(|c| (c.message_id, c.crc_extra, c.frame_id)),
        evt_tx,
        evt_rx,
        cmd_tx,
        cmd_rx,
        setpoint_tx,
        setpoint_rx,
    })
}

/// Owns the MAVLink link to the flight controller: turns incoming traffic into
/// [`PixhawkEvent`]s, forwards setpoints and serves command requests.
pub struct PixhawkTask {
    address: SocketAddr,
    version: MavlinkVersion,
    system_id: u8,
    component_id: u8,
    heartbeat_timeout: Duration,
    command_timeout: Duration,
    task_status: Option<(u32, u8, String)>,
    evt_tx: flume::Sender<PixhawkEvent>,
    evt_rx: flume::Receiver<PixhawkEvent>,
    cmd_tx: ChannelCommandSink<PixhawkRequest, PixhawkResponse>,
    cmd_rx: ChannelCommandSource<PixhawkRequest, PixhawkResponse>,
    setpoint_tx: flume::Sender<Waypoint>,
    setpoint_rx: flume::Receiver<Waypoint>,
}

impl PixhawkTask {
    pub fn events(&self) -> flume::Receiver<PixhawkEvent> {
        self.evt_rx.clone()
    }

    pub fn cmd(&self) -> ChannelCommandSink<PixhawkRequest, PixhawkResponse> {
        self.cmd_tx.clone()
    }

    pub fn setpoints(&self) -> flume::Sender<Waypoint> {
        self.setpoint_tx.clone()
    }
}

enum Action {
    Frame(anyhow::Result<Frame>),
    Command(Command<PixhawkRequest, PixhawkResponse>),
    Setpoint(Waypoint),
    Heartbeat,
    LinkLost,
}

/// What we know about the other end of the link.
struct Link {
    evt_tx: flume::Sender<PixhawkEvent>,
    frame_id: String,
    target_system: u8,
    target_component: u8,
    heartbeat_timeout: Duration,
    /// Deadline for the next autopilot heartbeat, `None` while the link is down.
    deadline: Option<Instant>,
    started: Instant,
}

impl Link {
    fn emit(&self, evt: PixhawkEvent) {
        // never block the link on a slow consumer
        if let Err(err) = self.evt_tx.try_send(evt) {
            trace!("dropping pixhawk event: {:?}", err);
        }
    }

    fn handle_frame(&mut self, frame: Frame) {
        match frame {
            Frame::Mavlink { header, message } => self.handle_message(header, message),
            Frame::TaskStatus(record) => self.handle_task_status(record),
        }
    }

    fn handle_message(&mut self, header: MavHeader, message: common::MavMessage) {
        match message {
            common::MavMessage::HEARTBEAT(data) => {
                if data.autopilot == common::MavAutopilot::MAV_AUTOPILOT_INVALID {
                    // another companion or a ground station
                    return;
                }

                if self.deadline.is_none() {
                    info!(
                        "autopilot heartbeat from system {} component {}",
                        header.system_id, header.component_id
                    );
                }

                self.target_system = header.system_id;
                self.target_component = header.component_id;
                self.deadline = Some(Instant::now() + self.heartbeat_timeout);

                let armed = data
                    .base_mode
                    .contains(common::MavModeFlag::MAV_MODE_FLAG_SAFETY_ARMED);
                let mode = if data
                    .base_mode
                    .contains(common::MavModeFlag::MAV_MODE_FLAG_CUSTOM_MODE_ENABLED)
                {
                    FlightMode::from_px4_custom_mode(data.custom_mode)
                } else {
                    FlightMode::Unknown(data.custom_mode)
                };

                self.emit(PixhawkEvent::State { armed, mode });
            }
            common::MavMessage::LOCAL_POSITION_NED(data) => {
                self.emit(PixhawkEvent::Position {
                    position: Vector3::from_ned(data.x as f64, data.y as f64, data.z as f64),
                });
            }
            common::MavMessage::COMMAND_ACK(data) => {
                trace!("unsolicited ack for {:?}: {:?}", data.command, data.result);
            }
            _ => {}
        }
    }

    fn handle_task_status(&mut self, record: TaskStatusRecord) {
        trace!("task status record: {:?}", record);
        let msg = record.republish(Local::now(), &self.frame_id);
        self.emit(PixhawkEvent::TaskStatus(msg));
    }

    fn time_boot_ms(&self) -> u32 {
        self.started.elapsed().as_millis() as u32
    }

    fn setpoint_message(&self, target: &Waypoint) -> common::MavMessage {
        let (north, east, down) = target.position.to_ned();

        common::MavMessage::SET_POSITION_TARGET_LOCAL_NED(
            common::SET_POSITION_TARGET_LOCAL_NED_DATA {
                time_boot_ms: self.time_boot_ms(),
                x: north as f32,
                y: east as f32,
                z: down as f32,
                yaw: enu_yaw_to_ned(target.yaw()) as f32,
                type_mask: common::PositionTargetTypemask::POSITION_TARGET_TYPEMASK_VX_IGNORE
                    | common::PositionTargetTypemask::POSITION_TARGET_TYPEMASK_VY_IGNORE
                    | common::PositionTargetTypemask::POSITION_TARGET_TYPEMASK_VZ_IGNORE
                    | common::PositionTargetTypemask::POSITION_TARGET_TYPEMASK_AX_IGNORE
                    | common::PositionTargetTypemask::POSITION_TARGET_TYPEMASK_AY_IGNORE
                    | common::PositionTargetTypemask::POSITION_TARGET_TYPEMASK_AZ_IGNORE
                    | common::PositionTargetTypemask::POSITION_TARGET_TYPEMASK_YAW_RATE_IGNORE,
                target_system: self.target_system,
                target_component: self.target_component,
                coordinate_frame: common::MavFrame::MAV_FRAME_LOCAL_NED,
                ..Default::default()
            },
        )
    }

    fn command_message(&self, command: common::MavCmd, params: [f32; 7]) -> common::MavMessage {
        common::MavMessage::COMMAND_LONG(common::COMMAND_LONG_DATA {
            command,
            confirmation: 0,
            param1: params[0],
            param2: params[1],
            param3: params[2],
            param4: params[3],
            param5: params[4],
            param6: params[5],
            param7: params[6],
            target_system: self.target_system,
            target_component: self.target_component,
        })
    }
}

fn heartbeat_message() -> common::MavMessage {
    common::MavMessage::HEARTBEAT(common::HEARTBEAT_DATA {
        custom_mode: 0,
        mavtype: common::MavType::MAV_TYPE_ONBOARD_CONTROLLER,
        autopilot: common::MavAutopilot::MAV_AUTOPILOT_INVALID,
        base_mode: common::MavModeFlag::empty(),
        system_status: common::MavState::MAV_STATE_ACTIVE,
        mavlink_version: 3,
    })
}

/// Sends a command and waits for its ack. Everything else that arrives in the
/// meantime is still handled, so telemetry keeps flowing.
async fn run_command(
    interface: &mut PixhawkInterface,
    link: &mut Link,
    request: PixhawkRequest,
    timeout: Duration,
) -> anyhow::Result<PixhawkResponse> {
    let (command, params) = request.to_command_long()?;

    debug!("sending command {:?} ({:?})", command, params);
    interface.send(&link.command_message(command, params)).await?;

    let deadline = Instant::now() + timeout;

    loop {
        let frame = tokio::time::timeout_at(deadline, interface.recv())
            .await
            .with_context(|| format!("timed out waiting for ack of {command:?}"))??;

        match frame {
            Frame::Mavlink {
                message: common::MavMessage::COMMAND_ACK(data),
                ..
            } if data.command == command => {
                debug!("received ack for {:?}: {:?}", command, data.result);

                return match data.result {
                    common::MavResult::MAV_RESULT_ACCEPTED
                    | common::MavResult::MAV_RESULT_IN_PROGRESS => Ok(()),
                    _ => Err(anyhow::anyhow!(
                        "command {:?} failed with status code {:?}",
                        command,
                        data.result
                    )),
                };
            }
            other => link.handle_frame(other),
        }
    }
}

#[async_trait]
impl Task for PixhawkTask {
    fn name(&self) -> &'static str {
        "pixhawk"
    }

    async fn run(self: Box<Self>, cancel: CancellationToken) -> anyhow::Result<()> {
        let Self {
            address,
            version,
            system_id,
            component_id,
            heartbeat_timeout,
            command_timeout,
            task_status,
            evt_tx,
            cmd_rx,
            setpoint_rx,
            ..
        } = *self;

        let (bridge, frame_id) = match task_status {
            Some((message_id, crc_extra, frame_id)) => (Some((message_id, crc_extra)), frame_id),
            None => (None, String::new()),
        };

        let mut interface = select! {
            _ = cancel.cancelled() => return Ok(()),
            res = PixhawkInterface::connect(address, version, system_id, component_id, bridge) => res?,
        };

        let mut link = Link {
            evt_tx,
            frame_id,
            target_system: 1,
            target_component: 1,
            heartbeat_timeout,
            deadline: None,
            started: Instant::now(),
        };

        let mut heartbeat = tokio::time::interval(HEARTBEAT_PERIOD);

        loop {
            let link_deadline = link.deadline;

            // only the waiting is cancellable: once a command is picked up it
            // runs to completion
            let action = select! {
                _ = cancel.cancelled() => break,
                frame = interface.recv() => Action::Frame(frame),
                Ok(cmd) = cmd_rx.recv_async() => Action::Command(cmd),
                Ok(setpoint) = setpoint_rx.recv_async() => Action::Setpoint(setpoint),
                _ = heartbeat.tick() => Action::Heartbeat,
                _ = tokio::time::sleep_until(link_deadline.unwrap_or_else(Instant::now)), if link_deadline.is_some() => Action::LinkLost,
            };

            match action {
                Action::Frame(Ok(frame)) => link.handle_frame(frame),
                // a restarted peer shows up as ECONNREFUSED on the connected
                // socket; the heartbeat watchdog reports the outage
                Action::Frame(Err(err)) => {
                    warn!("error receiving from flight controller: {:#}", err);
                    tokio::time::sleep(LINK_ERROR_BACKOFF).await;
                }
                Action::Command((request, ret)) => {
                    let result = run_command(&mut interface, &mut link, request, command_timeout).await;
                    if let Err(err) = &result {
                        debug!("command {:?} failed: {:?}", request, err);
                    }
                    let _ = ret.send(result);
                }
                Action::Setpoint(setpoint) => {
                    if let Err(err) = interface.send(&link.setpoint_message(&setpoint)).await {
                        debug!("failed to send setpoint: {:#}", err);
                    }
                }
                Action::Heartbeat => {
                    if let Err(err) = interface.send(&heartbeat_message()).await {
                        warn!("failed to send heartbeat: {:#}", err);
                    }
                }
                Action::LinkLost => {
                    warn!("no heartbeat from autopilot in {:?}, link lost", heartbeat_timeout);
                    link.deadline = None;
                    link.emit(PixhawkEvent::LinkLost);
                }
            }
        }

        Ok(())
    }
}
