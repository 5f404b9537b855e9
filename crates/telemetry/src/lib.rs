use async_trait::async_trait;
use ms_client::Task;
use ms_pixhawk::{PixhawkEvent, TaskStatusChange};
use ms_types::{FlightMode, Vector3};
use tokio::{select, sync::watch};
use tokio_util::sync::CancellationToken;
use tracing::*;

/// The latest known state of the vehicle. Copied out once per control tick.
#[derive(Default, Debug, Clone, PartialEq)]
pub struct VehicleSnapshot {
    pub connected: bool,
    pub armed: bool,
    pub mode: FlightMode,
    /// Local ENU position in meters.
    pub position: Vector3,
}

impl VehicleSnapshot {
    /// Overwrites the fields carried by `evt`. Events that don't describe the
    /// vehicle leave the snapshot untouched.
    pub fn apply(&mut self, evt: &PixhawkEvent) {
        match evt {
            PixhawkEvent::State { armed, mode } => {
                self.connected = true;
                self.armed = *armed;
                self.mode = *mode;
            }
            PixhawkEvent::LinkLost => self.connected = false,
            PixhawkEvent::Position { position } => self.position = *position,
            PixhawkEvent::TaskStatus(_) => {}
        }
    }
}

/// Last-value cache for vehicle telemetry. Writes never block and readers
/// always get the most recent complete snapshot.
pub struct FeedbackIngestor {
    tx: watch::Sender<VehicleSnapshot>,
}

impl Default for FeedbackIngestor {
    fn default() -> Self {
        Self::new()
    }
}

impl FeedbackIngestor {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(VehicleSnapshot::default());
        Self { tx }
    }

    pub fn on_telemetry(&self, evt: &PixhawkEvent) {
        self.tx.send_modify(|snapshot| snapshot.apply(evt));
    }

    pub fn current_snapshot(&self) -> VehicleSnapshot {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> SnapshotReader {
        SnapshotReader {
            rx: self.tx.subscribe(),
        }
    }
}

/// Read side of the [`FeedbackIngestor`], handed to the control loop.
#[derive(Clone)]
pub struct SnapshotReader {
    rx: watch::Receiver<VehicleSnapshot>,
}

impl SnapshotReader {
    pub fn current_snapshot(&self) -> VehicleSnapshot {
        self.rx.borrow().clone()
    }
}

pub struct TelemetryTask {
    pixhawk_evt_rx: flume::Receiver<PixhawkEvent>,
    ingestor: FeedbackIngestor,
    task_status_tx: watch::Sender<Option<TaskStatusChange>>,
    task_status_rx: watch::Receiver<Option<TaskStatusChange>>,
}

pub fn create_task(pixhawk_evt_rx: flume::Receiver<PixhawkEvent>) -> anyhow::Result<TelemetryTask> {
    let (task_status_tx, task_status_rx) = watch::channel(None);

    Ok(TelemetryTask {
        pixhawk_evt_rx,
        ingestor: FeedbackIngestor::new(),
        task_status_tx,
        task_status_rx,
    })
}

impl TelemetryTask {
    pub fn telemetry(&self) -> SnapshotReader {
        self.ingestor.subscribe()
    }

    /// The most recent bridged task status record.
    pub fn task_status(&self) -> watch::Receiver<Option<TaskStatusChange>> {
        self.task_status_rx.clone()
    }
}

fn log_changes(before: &VehicleSnapshot, after: &VehicleSnapshot) {
    if before.connected != after.connected {
        if after.connected {
            info!("flight controller connected");
        } else {
            warn!("flight controller disconnected");
        }
    }

    if before.armed != after.armed {
        info!("vehicle {}", if after.armed { "armed" } else { "disarmed" });
    }

    if before.mode != after.mode {
        match after.mode {
            FlightMode::AutoTakeoff => info!("auto takeoff"),
            FlightMode::AutoLand => info!("auto landing"),
            mode => info!("mode changed from {} to {}", before.mode, mode),
        }
    }
}

#[async_trait]
impl Task for TelemetryTask {
    fn name(&self) -> &'static str {
        "telemetry"
    }

    async fn run(self: Box<Self>, cancel: CancellationToken) -> anyhow::Result<()> {
        let Self {
            pixhawk_evt_rx,
            ingestor,
            task_status_tx,
            ..
        } = *self;

        let loop_fut = async move {
            while let Ok(evt) = pixhawk_evt_rx.recv_async().await {
                match &evt {
                    PixhawkEvent::TaskStatus(msg) => {
                        debug!(
                            "task status: odd/even {} status {} loop {}",
                            msg.num_odd_even, msg.task_status, msg.loop_value
                        );
                        task_status_tx.send_replace(Some(msg.clone()));
                    }
                    evt => {
                        let before = ingestor.current_snapshot();
                        ingestor.on_telemetry(evt);
                        log_changes(&before, &ingestor.current_snapshot());
                    }
                }
            }

            debug!("pixhawk event channel closed");
            Ok::<_, anyhow::Error>(())
        };

        select! {
          _ = cancel.cancelled() => {}
          res = loop_fut => { res? }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ms_pixhawk::Header;

    #[test]
    fn defaults_before_any_telemetry() {
        let ingestor = FeedbackIngestor::new();
        let snapshot = ingestor.current_snapshot();

        assert!(!snapshot.connected);
        assert!(!snapshot.armed);
        assert_eq!(snapshot.mode, FlightMode::Unknown(0));
        assert_eq!(snapshot.position, Vector3::default());
    }

    #[test]
    fn updates_overwrite_only_their_fields() {
        let ingestor = FeedbackIngestor::new();
        let reader = ingestor.subscribe();

        ingestor.on_telemetry(&PixhawkEvent::Position {
            position: Vector3::new(1., 2., 3.),
        });
        ingestor.on_telemetry(&PixhawkEvent::State {
            armed: true,
            mode: FlightMode::Offboard,
        });

        let snapshot = reader.current_snapshot();
        assert!(snapshot.connected);
        assert!(snapshot.armed);
        assert_eq!(snapshot.mode, FlightMode::Offboard);
        assert_eq!(snapshot.position, Vector3::new(1., 2., 3.));

        ingestor.on_telemetry(&PixhawkEvent::Position {
            position: Vector3::new(4., 5., 6.),
        });
        ingestor.on_telemetry(&PixhawkEvent::LinkLost);

        let snapshot = reader.current_snapshot();
        assert!(!snapshot.connected);
        // last known values are kept
        assert!(snapshot.armed);
        assert_eq!(snapshot.mode, FlightMode::Offboard);
        assert_eq!(snapshot.position, Vector3::new(4., 5., 6.));
    }

    #[test]
    fn snapshot_is_a_copy() {
        let ingestor = FeedbackIngestor::new();
        let before = ingestor.current_snapshot();

        ingestor.on_telemetry(&PixhawkEvent::State {
            armed: true,
            mode: FlightMode::Position,
        });

        assert!(!before.armed);
        assert!(ingestor.current_snapshot().armed);
    }

    #[tokio::test]
    async fn task_feeds_snapshot_and_task_status() {
        let (evt_tx, evt_rx) = flume::bounded(8);
        let task = create_task(evt_rx).unwrap();
        let reader = task.telemetry();
        let mut task_status = task.task_status();

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(Box::new(task).run(cancel.clone()));

        evt_tx
            .send_async(PixhawkEvent::State {
                armed: false,
                mode: FlightMode::Manual,
            })
            .await
            .unwrap();
        evt_tx
            .send_async(PixhawkEvent::TaskStatus(TaskStatusChange {
                header: Header {
                    stamp: chrono::Local::now(),
                    frame_id: "map".into(),
                },
                num_odd_even: 1,
                task_status: 3,
                loop_value: 10,
            }))
            .await
            .unwrap();

        task_status.changed().await.unwrap();
        let msg = task_status.borrow().clone().unwrap();
        assert_eq!(msg.task_status, 3);
        assert_eq!(msg.loop_value, 10);

        // events are handled in order, so the state update has landed
        let snapshot = reader.current_snapshot();
        assert!(snapshot.connected);
        assert_eq!(snapshot.mode, FlightMode::Manual);

        // closing the channel ends the task cleanly
        drop(evt_tx);
        handle.await.unwrap().unwrap();
        assert!(!cancel.is_cancelled());
    }
}
