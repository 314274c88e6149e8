//! Gossip messages broadcast to multiple peers.

mod proposal;
mod timeout;
mod timeout_certificate;
mod vote;

pub use proposal::ProposalGossip;
pub use timeout::TimeoutGossip;
pub use timeout_certificate::TimeoutCertificateGossip;
pub use vote::VoteGossip;
