use std::time::Duration;

use async_trait::async_trait;
use ms_client::{ChannelCommandSink, CommandSink};
use ms_pixhawk::{LandParams, PixhawkRequest, PixhawkResponse};
use ms_types::FlightMode;
use tokio::time::Instant;
use tracing::*;

use crate::{Bootstrap, CommandThrottle, Decision, Mission, MissionConfig};

/// The request/response side of the flight controller.
#[async_trait]
pub trait Controller: Send {
    async fn arm(&mut self) -> anyhow::Result<()>;

    async fn set_mode(&mut self, mode: FlightMode) -> anyhow::Result<()>;

    async fn land(&mut self, params: LandParams) -> anyhow::Result<()>;
}

#[async_trait]
impl Controller for ChannelCommandSink<PixhawkRequest, PixhawkResponse> {
    async fn arm(&mut self) -> anyhow::Result<()> {
        self.command(PixhawkRequest::Arm(true)).await
    }

    async fn set_mode(&mut self, mode: FlightMode) -> anyhow::Result<()> {
        self.command(PixhawkRequest::SetMode(mode)).await
    }

    async fn land(&mut self, params: LandParams) -> anyhow::Result<()> {
        self.command(PixhawkRequest::Land(params)).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attempt {
    /// Too soon after the previous attempt; nothing was sent.
    Throttled,
    Accepted,
    Rejected,
}

/// Issues commands to the controller, at most one attempt per command type
/// per retry interval. Failures are reported, never retried here.
pub struct ActuationGateway<C> {
    controller: C,
    mode: CommandThrottle,
    arm: CommandThrottle,
    land: CommandThrottle,
    land_params: LandParams,
}

fn outcome(what: &str, result: anyhow::Result<()>) -> Attempt {
    match result {
        Ok(()) => {
            info!("{} accepted", what);
            Attempt::Accepted
        }
        Err(err) => {
            warn!("{} rejected: {:#}", what, err);
            Attempt::Rejected
        }
    }
}

impl<C: Controller> ActuationGateway<C> {
    pub fn new(
        controller: C,
        mode_retry_interval: Duration,
        arm_retry_interval: Duration,
        land_retry_interval: Duration,
        land_params: LandParams,
    ) -> Self {
        Self {
            controller,
            mode: CommandThrottle::new(mode_retry_interval),
            arm: CommandThrottle::new(arm_retry_interval),
            land: CommandThrottle::new(land_retry_interval),
            land_params,
        }
    }

    pub fn from_config(controller: C, config: &MissionConfig) -> Self {
        Self::new(
            controller,
            config.mode_retry_interval,
            config.arm_retry_interval,
            config.land_retry_interval,
            config.land,
        )
    }

    pub fn controller(&self) -> &C {
        &self.controller
    }

    pub async fn request_arm(&mut self, now: Instant) -> Attempt {
        if !self.arm.try_acquire(now) {
            return Attempt::Throttled;
        }

        debug!("requesting arm");
        outcome("arm request", self.controller.arm().await)
    }

    pub async fn request_mode(&mut self, mode: FlightMode, now: Instant) -> Attempt {
        if !self.mode.try_acquire(now) {
            return Attempt::Throttled;
        }

        debug!("requesting mode {}", mode);
        outcome(
            &format!("switch to {mode}"),
            self.controller.set_mode(mode).await,
        )
    }

    pub async fn request_land(&mut self, now: Instant) -> Attempt {
        if !self.land.try_acquire(now) {
            return Attempt::Throttled;
        }

        debug!("requesting land ({:?})", self.land_params);
        outcome("land request", self.controller.land(self.land_params).await)
    }

    /// Carries out the commands in `decision` and feeds the landing outcome
    /// back into the mission.
    pub async fn execute(&mut self, mission: &mut Mission, decision: &Decision, now: Instant) {
        match decision.bootstrap {
            Some(Bootstrap::SetMode(mode)) => {
                self.request_mode(mode, now).await;
            }
            Some(Bootstrap::Arm) => {
                self.request_arm(now).await;
            }
            None => {}
        }

        if decision.land && self.request_land(now).await == Attempt::Accepted {
            mission.record_land_accepted();
        }
    }
}
