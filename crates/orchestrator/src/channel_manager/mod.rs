use crossbeam::channel;
use log::{debug, error};

use crate::orchestrator::OrchestrationMessage;

pub type HandoffReceiver = channel::Receiver<OrchestrationMessage>;

/// Sending half of a handoff channel. Each pipeline owns its own; there is no shared registry.
#[derive(Clone, Debug)]
pub struct HandoffSender {
    sender: channel::Sender<OrchestrationMessage>,
}

impl HandoffSender {
    /// Publishes a message without blocking. A full or disconnected channel is logged and
    /// dropped; the loader side is responsible for keeping up.
    pub fn publish(&self, msg: OrchestrationMessage) -> bool {
        debug!("publishing {:?}", msg);
        match self.sender.try_send(msg) {
            Ok(_) => true,
            Err(err) => {
                error!("Error in sending handoff message: {}", err);
                false
            }
        }
    }
}

/// Creates a handoff channel. A `buffer` of zero means unbounded.
pub fn create_channel(buffer: usize) -> (HandoffSender, HandoffReceiver) {
    debug!("create request for handoff channel with size {}", buffer);
    let (tx, rx) = if buffer == 0 {
        channel::unbounded()
    } else {
        channel::bounded(buffer)
    };
    (HandoffSender { sender: tx }, rx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn delivers_in_order() {
        let (tx, rx) = create_channel(0);
        assert!(tx.publish(OrchestrationMessage::NoWork {
            run_id: "a".to_string()
        }));
        assert!(tx.publish(OrchestrationMessage::ArtifactStaged {
            run_id: "b".to_string(),
            locator: PathBuf::from("/tmp/b.jsonl"),
            record_count: 2,
        }));

        assert_eq!(rx.recv().unwrap().run_id(), "a");
        match rx.recv().unwrap() {
            OrchestrationMessage::ArtifactStaged { record_count, .. } => {
                assert_eq!(record_count, 2)
            }
            other => panic!("unexpected message {:?}", other),
        }
    }

    #[test]
    fn full_channel_drops_message() {
        let (tx, rx) = create_channel(1);
        assert!(tx.publish(OrchestrationMessage::NoWork {
            run_id: "a".to_string()
        }));
        assert!(!tx.publish(OrchestrationMessage::NoWork {
            run_id: "b".to_string()
        }));
        assert_eq!(rx.len(), 1);
    }

    #[test]
    fn disconnected_receiver() {
        let (tx, rx) = create_channel(0);
        drop(rx);
        assert!(!tx.publish(OrchestrationMessage::NoWork {
            run_id: "a".to_string()
        }));
    }
}
