use anyhow::Context;
use async_trait::async_trait;
use ms_client::{ChannelCommandSink, Task};
use ms_pixhawk::{PixhawkRequest, PixhawkResponse};
use ms_telemetry::SnapshotReader;
use ms_types::Waypoint;
use tokio::{
    select,
    time::{interval, Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::*;

use crate::{ActuationGateway, Controller, Mission, MissionConfig, SetpointPublisher};

pub type PixhawkMissionTask =
    MissionTask<ChannelCommandSink<PixhawkRequest, PixhawkResponse>, flume::Sender<Waypoint>>;

/// Runs the fixed-rate control loop: wait for the flight controller, prime
/// the setpoint stream, then step the mission once per tick.
pub struct MissionTask<C, P> {
    config: MissionConfig,
    telemetry: SnapshotReader,
    gateway: ActuationGateway<C>,
    publisher: P,
}

pub fn create_task(
    config: MissionConfig,
    telemetry: SnapshotReader,
    cmd: ChannelCommandSink<PixhawkRequest, PixhawkResponse>,
    setpoints: flume::Sender<Waypoint>,
) -> anyhow::Result<PixhawkMissionTask> {
    MissionTask::new(config, telemetry, cmd, setpoints)
}

impl<C: Controller, P: SetpointPublisher> MissionTask<C, P> {
    pub fn new(
        config: MissionConfig,
        telemetry: SnapshotReader,
        controller: C,
        publisher: P,
    ) -> anyhow::Result<Self> {
        config.validate().context("invalid mission config")?;

        let gateway = ActuationGateway::from_config(controller, &config);

        Ok(Self {
            config,
            telemetry,
            gateway,
            publisher,
        })
    }
}

#[async_trait]
impl<C, P> Task for MissionTask<C, P>
where
    C: Controller + 'static,
    P: SetpointPublisher + 'static,
{
    fn name(&self) -> &'static str {
        "mission"
    }

    async fn run(self: Box<Self>, cancel: CancellationToken) -> anyhow::Result<()> {
        let Self {
            config,
            telemetry,
            mut gateway,
            mut publisher,
        } = *self;

        let mut mission = Mission::from_config(&config);

        let mut ticker = interval(config.period());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!("waiting for flight controller");

        loop {
            select! {
              _ = cancel.cancelled() => return Ok(()),
              _ = ticker.tick() => {}
            }

            if telemetry.current_snapshot().connected {
                break;
            }
        }

        debug!(
            "priming with {} setpoints at {} Hz",
            config.priming_setpoints, config.rate
        );

        // the controller refuses offboard mode unless setpoints are already flowing
        let initial = mission.initial_target();
        for _ in 0..config.priming_setpoints {
            select! {
              _ = cancel.cancelled() => return Ok(()),
              _ = ticker.tick() => {}
            }

            publisher.publish(&initial);
        }

        info!("starting mission");

        loop {
            // an in-flight command finishes before shutdown is noticed
            select! {
              _ = cancel.cancelled() => break,
              _ = ticker.tick() => {}
            }

            let snapshot = telemetry.current_snapshot();
            let decision = mission.step(&snapshot);

            if let Some(target) = &decision.setpoint {
                publisher.publish(target);
            }

            gateway
                .execute(&mut mission, &decision, Instant::now())
                .await;
        }

        info!("mission stopped in phase {}", mission.phase());

        Ok(())
    }
}
