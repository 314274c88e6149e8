//! In-process transport between replicas running in one tokio runtime.
//!
//! Every replica owns a bounded inbox. Outgoing messages are encoded and
//! decoded through the wire codec before they land in the receiver's inbox,
//! so a replica only ever sees what a socket would have delivered.

use super::codec::{decode_message, encode_message, CodecError};
use canopy_core::Event;
use canopy_messages::ConsensusMessage;
use canopy_types::ValidatorId;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{trace, warn};

/// A set of replica inboxes, created up front for a fixed committee.
#[derive(Debug)]
pub struct ChannelNetwork {
    inboxes: Arc<HashMap<ValidatorId, mpsc::Sender<Event>>>,
    receivers: HashMap<ValidatorId, mpsc::Receiver<Event>>,
}

impl ChannelNetwork {
    /// Create one inbox of `capacity` events per validator.
    pub fn new(validators: &[ValidatorId], capacity: usize) -> Self {
        let mut inboxes = HashMap::with_capacity(validators.len());
        let mut receivers = HashMap::with_capacity(validators.len());
        for &id in validators {
            let (tx, rx) = mpsc::channel(capacity);
            inboxes.insert(id, tx);
            receivers.insert(id, rx);
        }
        Self {
            inboxes: Arc::new(inboxes),
            receivers,
        }
    }

    /// Hand out a validator's transport and inbox. Each endpoint can be
    /// taken once; later calls return `None`.
    pub fn take_endpoint(
        &mut self,
        id: ValidatorId,
    ) -> Option<(ChannelTransport, mpsc::Receiver<Event>)> {
        let rx = self.receivers.remove(&id)?;
        Some((ChannelTransport::new(id, self.inboxes.clone()), rx))
    }

    /// Sender into a validator's inbox, for injecting events from outside.
    pub fn inbox(&self, id: ValidatorId) -> Option<mpsc::Sender<Event>> {
        self.inboxes.get(&id).cloned()
    }
}

/// Sending half held by one replica.
#[derive(Debug, Clone)]
pub struct ChannelTransport {
    local: ValidatorId,
    inboxes: Arc<HashMap<ValidatorId, mpsc::Sender<Event>>>,
}

impl ChannelTransport {
    /// Create a transport for `local` over the given inboxes.
    pub fn new(local: ValidatorId, inboxes: Arc<HashMap<ValidatorId, mpsc::Sender<Event>>>) -> Self {
        Self { local, inboxes }
    }

    /// The validator this transport sends as.
    pub fn local_validator_id(&self) -> ValidatorId {
        self.local
    }

    /// Send to one replica. Sending to ourselves is a no-op.
    pub fn send_to(&self, to: ValidatorId, message: &ConsensusMessage) -> Result<(), CodecError> {
        let bytes = encode_message(message)?;
        self.deliver(to, message.message_type_id(), &bytes)
    }

    /// Send to every other replica.
    pub fn broadcast(&self, message: &ConsensusMessage) -> Result<(), CodecError> {
        let bytes = encode_message(message)?;
        for &to in self.inboxes.keys() {
            self.deliver(to, message.message_type_id(), &bytes)?;
        }
        Ok(())
    }

    /// Send to a chosen subset.
    pub fn multicast(
        &self,
        to: &[ValidatorId],
        message: &ConsensusMessage,
    ) -> Result<(), CodecError> {
        let bytes = encode_message(message)?;
        for &recipient in to {
            self.deliver(recipient, message.message_type_id(), &bytes)?;
        }
        Ok(())
    }

    fn deliver(&self, to: ValidatorId, type_id: &str, bytes: &[u8]) -> Result<(), CodecError> {
        if to == self.local {
            return Ok(());
        }
        let Some(inbox) = self.inboxes.get(&to) else {
            warn!(from = %self.local, to = %to, "Send to unknown validator");
            return Ok(());
        };

        let event = decode_message(type_id, bytes)?;
        match inbox.try_send(event) {
            Ok(()) => trace!(from = %self.local, to = %to, type_id, "Delivered"),
            // Bounded inboxes shed load; consensus recovers through timeouts.
            Err(TrySendError::Full(_)) => {
                warn!(from = %self.local, to = %to, type_id, "Inbox full, dropping message")
            }
            Err(TrySendError::Closed(_)) => {
                trace!(from = %self.local, to = %to, type_id, "Inbox closed, dropping message")
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canopy_messages::VoteGossip;
    use canopy_types::{Hash, KeyPair, KeyType, View, Vote};
    use tracing_test::traced_test;

    fn ids() -> Vec<ValidatorId> {
        (1..=4).map(ValidatorId).collect()
    }

    fn vote_message(voter: ValidatorId) -> ConsensusMessage {
        let key = KeyPair::from_seed(KeyType::Ed25519, &[voter.0 as u8; 32]).unwrap();
        VoteGossip::new(Vote::new(View(1), Hash::from_bytes(b"b1"), voter, &key)).into()
    }

    #[tokio::test]
    async fn test_broadcast_skips_sender() {
        let mut network = ChannelNetwork::new(&ids(), 16);
        let (transport, mut own_rx) = network.take_endpoint(ValidatorId(1)).unwrap();
        let mut others: Vec<_> = (2..=4)
            .map(|i| network.take_endpoint(ValidatorId(i)).unwrap().1)
            .collect();

        let message = vote_message(ValidatorId(1));
        transport.broadcast(&message).unwrap();

        for rx in &mut others {
            assert_eq!(rx.try_recv().unwrap(), Event::from(message.clone()));
        }
        assert!(own_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_multicast_reaches_only_recipients() {
        let mut network = ChannelNetwork::new(&ids(), 16);
        let (transport, _) = network.take_endpoint(ValidatorId(1)).unwrap();
        let (_, mut rx2) = network.take_endpoint(ValidatorId(2)).unwrap();
        let (_, mut rx3) = network.take_endpoint(ValidatorId(3)).unwrap();

        transport
            .multicast(&[ValidatorId(3)], &vote_message(ValidatorId(1)))
            .unwrap();

        assert!(rx2.try_recv().is_err());
        assert!(rx3.try_recv().is_ok());
    }

    #[tokio::test]
    #[traced_test]
    async fn test_full_inbox_drops_instead_of_blocking() {
        let mut network = ChannelNetwork::new(&ids(), 1);
        let (transport, _) = network.take_endpoint(ValidatorId(1)).unwrap();
        let (_, mut rx2) = network.take_endpoint(ValidatorId(2)).unwrap();

        let message = vote_message(ValidatorId(1));
        transport.send_to(ValidatorId(2), &message).unwrap();
        transport.send_to(ValidatorId(2), &message).unwrap();

        assert!(rx2.try_recv().is_ok());
        assert!(rx2.try_recv().is_err());
        assert!(logs_contain("Inbox full"));
    }

    #[test]
    fn test_endpoint_taken_once() {
        let mut network = ChannelNetwork::new(&ids(), 4);
        assert!(network.take_endpoint(ValidatorId(1)).is_some());
        assert!(network.take_endpoint(ValidatorId(1)).is_none());
        assert!(network.take_endpoint(ValidatorId(9)).is_none());
    }
}
