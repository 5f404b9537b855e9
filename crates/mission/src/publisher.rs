use ms_types::Waypoint;
use tracing::*;

/// Fire-and-forget output of position targets to the control link.
pub trait SetpointPublisher: Send {
    fn publish(&mut self, target: &Waypoint);
}

impl SetpointPublisher for flume::Sender<Waypoint> {
    fn publish(&mut self, target: &Waypoint) {
        // a full queue means the link is behind; a newer setpoint follows soon
        if let Err(err) = self.try_send(*target) {
            trace!("dropping setpoint: {:?}", err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ms_types::Vector3;

    #[test]
    fn publishing_never_blocks() {
        let (mut tx, rx) = flume::bounded(2);
        let target = Waypoint::new(Vector3::new(0., 0., 5.), 0.);

        for _ in 0..5 {
            tx.publish(&target);
        }

        assert_eq!(rx.len(), 2);
        assert_eq!(rx.try_recv().unwrap(), target);

        drop(rx);
        tx.publish(&target);
    }
}
