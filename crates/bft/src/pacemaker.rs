//! View synchronization.
//!
//! The pacemaker owns the current view, collects timeout messages per view
//! and builds a timeout certificate once a supermajority timed out. Entering
//! a view is a returned value the engine turns into timer actions.

use canopy_types::{
    KeyPair, QuorumCertificate, TimeoutCertificate, TimeoutMessage, Topology, ValidatorId, View,
};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// How far past the current view a remote timeout may be and still be stored.
/// Replicas further behind catch up through the TC or QC a peer forwards.
pub const MAX_TIMEOUT_LOOKAHEAD: u64 = 100;

/// Current view, timeout collection and TC construction.
pub struct Pacemaker {
    cur_view: View,

    /// Highest TC seen, forwarded in our own timeouts.
    high_tc: Option<TimeoutCertificate>,

    /// Timeouts per view, keyed by sender so repeats overwrite.
    timeouts: BTreeMap<View, BTreeMap<ValidatorId, TimeoutMessage>>,

    /// Views whose TC was already built here.
    tc_built: BTreeSet<View>,

    /// Views entered and not yet drained.
    entered: VecDeque<View>,

    topology: Arc<dyn Topology>,
    view_timeout: Duration,
}

impl std::fmt::Debug for Pacemaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pacemaker")
            .field("cur_view", &self.cur_view)
            .field("high_tc", &self.high_tc.as_ref().map(|tc| tc.view))
            .field("pending_views", &self.timeouts.len())
            .finish()
    }
}

impl Pacemaker {
    /// Create a pacemaker at genesis. The first `advance_view(View::GENESIS)`
    /// enters view 1.
    pub fn new(topology: Arc<dyn Topology>, view_timeout: Duration) -> Self {
        Self {
            cur_view: View::GENESIS,
            high_tc: None,
            timeouts: BTreeMap::new(),
            tc_built: BTreeSet::new(),
            entered: VecDeque::new(),
            topology,
            view_timeout,
        }
    }

    /// The view this replica is in.
    pub fn cur_view(&self) -> View {
        self.cur_view
    }

    /// Local view timer duration.
    pub fn view_timeout(&self) -> Duration {
        self.view_timeout
    }

    /// Move past `view`. A no-op if `view` is already behind us; otherwise
    /// enters `view + 1` and returns it.
    pub fn advance_view(&mut self, view: View) -> Option<View> {
        if view < self.cur_view {
            return None;
        }
        let old = self.cur_view;
        self.cur_view = view.next();
        self.entered.push_back(self.cur_view);
        debug!(old = old.0, new = self.cur_view.0, "Entered view");
        Some(self.cur_view)
    }

    /// Views entered since the last drain, in order.
    pub fn drain_entered_views(&mut self) -> Vec<View> {
        self.entered.drain(..).collect()
    }

    /// Highest TC seen.
    pub fn high_tc(&self) -> Option<&TimeoutCertificate> {
        self.high_tc.as_ref()
    }

    /// Replace the highest TC if `tc` is from a later view.
    pub fn update_high_tc(&mut self, tc: &TimeoutCertificate) {
        let newer = self
            .high_tc
            .as_ref()
            .map_or(true, |current| tc.view > current.view);
        if newer {
            self.high_tc = Some(tc.clone());
        }
    }

    /// Build our timeout for `view`.
    pub fn timeout_for(
        &self,
        view: View,
        high_qc: QuorumCertificate,
        key: &KeyPair,
    ) -> TimeoutMessage {
        TimeoutMessage::new(
            view,
            self.topology.local_validator_id(),
            high_qc,
            self.high_tc.clone(),
            key,
        )
    }

    /// Record a timeout whose signature the caller already checked.
    ///
    /// Returns the TC the first time the view's distinct senders reach a
    /// supermajority.
    pub fn process_remote_timeout(&mut self, tmo: TimeoutMessage) -> Option<TimeoutCertificate> {
        if tmo.view < self.cur_view {
            debug!(
                tmo_view = tmo.view.0,
                cur_view = self.cur_view.0,
                "Ignoring stale timeout"
            );
            return None;
        }
        if tmo.view.0 > self.cur_view.0.saturating_add(MAX_TIMEOUT_LOOKAHEAD) {
            debug!(
                tmo_view = tmo.view.0,
                cur_view = self.cur_view.0,
                sender = ?tmo.sender,
                "Ignoring timeout too far ahead"
            );
            return None;
        }
        if self.tc_built.contains(&tmo.view) {
            return None;
        }

        let view = tmo.view;
        let senders = self.timeouts.entry(view).or_default();
        senders.insert(tmo.sender, tmo);
        if !self.topology.has_quorum(senders.len()) {
            debug!(view = view.0, timeouts = senders.len(), "Timeout recorded");
            return None;
        }

        let collected: Vec<&TimeoutMessage> = senders.values().collect();
        match TimeoutCertificate::from_timeouts(view, &collected) {
            Ok(tc) => {
                self.tc_built.insert(view);
                self.timeouts.remove(&view);
                info!(
                    view = view.0,
                    signers = tc.signer_count(),
                    high_qc_view = tc.high_qc.view.0,
                    "TC built"
                );
                Some(tc)
            }
            Err(e) => {
                warn!(view = view.0, error = ?e, "Failed to aggregate timeout signatures");
                None
            }
        }
    }

    /// Drop timeout state for views below `view`.
    pub fn cleanup_below(&mut self, view: View) {
        self.timeouts = self.timeouts.split_off(&view);
        self.tc_built = self.tc_built.split_off(&view);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canopy_test_helpers::TestCommittee;

    fn pacemaker(committee: &TestCommittee) -> Pacemaker {
        Pacemaker::new(committee.topology(1), Duration::from_millis(100))
    }

    #[test]
    fn test_advance_view_is_monotonic() {
        let committee = TestCommittee::new(4);
        let mut pm = pacemaker(&committee);

        assert_eq!(pm.advance_view(View::GENESIS), Some(View(1)));
        assert_eq!(pm.advance_view(View(4)), Some(View(5)));
        assert_eq!(pm.advance_view(View(2)), None);
        assert_eq!(pm.cur_view(), View(5));
        // Equal to the current view still advances.
        assert_eq!(pm.advance_view(View(5)), Some(View(6)));

        assert_eq!(pm.drain_entered_views(), vec![View(1), View(5), View(6)]);
        assert!(pm.drain_entered_views().is_empty());
    }

    #[test]
    fn test_tc_built_exactly_once() {
        let committee = TestCommittee::new(4);
        let mut pm = pacemaker(&committee);
        pm.advance_view(View(2));
        let qc = QuorumCertificate::genesis();

        assert_eq!(pm.process_remote_timeout(committee.timeout(2, View(3), qc.clone())), None);
        assert_eq!(pm.process_remote_timeout(committee.timeout(2, View(3), qc.clone())), None);
        assert_eq!(pm.process_remote_timeout(committee.timeout(4, View(3), qc.clone())), None);
        let tc = pm
            .process_remote_timeout(committee.timeout(1, View(3), qc.clone()))
            .expect("three distinct senders");

        assert_eq!(tc.view, View(3));
        assert_eq!(tc.signers, vec![ValidatorId(1), ValidatorId(2), ValidatorId(4)]);
        assert_eq!(tc.verify(committee.topology(1).as_ref()), Ok(()));

        assert_eq!(pm.process_remote_timeout(committee.timeout(3, View(3), qc)), None);
    }

    #[test]
    fn test_stale_timeouts_ignored() {
        let committee = TestCommittee::new(4);
        let mut pm = pacemaker(&committee);
        pm.advance_view(View(6));
        for sender in 1..=4 {
            let tmo = committee.timeout(sender, View(5), QuorumCertificate::genesis());
            assert_eq!(pm.process_remote_timeout(tmo), None);
        }
    }

    #[test]
    fn test_far_future_timeouts_not_stored() {
        let committee = TestCommittee::new(4);
        let mut pm = pacemaker(&committee);
        pm.advance_view(View(1));

        for offset in 1..=20 {
            let view = View(2 + MAX_TIMEOUT_LOOKAHEAD + offset);
            let tmo = committee.timeout(4, view, QuorumCertificate::genesis());
            assert_eq!(pm.process_remote_timeout(tmo), None);
        }
        assert!(format!("{pm:?}").contains("pending_views: 0"));

        let edge = View(2 + MAX_TIMEOUT_LOOKAHEAD);
        let tmo = committee.timeout(4, edge, QuorumCertificate::genesis());
        assert_eq!(pm.process_remote_timeout(tmo), None);
        assert!(format!("{pm:?}").contains("pending_views: 1"));
    }

    #[test]
    fn test_timeout_forwards_high_tc() {
        let committee = TestCommittee::new(4);
        let mut pm = pacemaker(&committee);
        let timeouts: Vec<_> = (1..=3)
            .map(|s| committee.timeout(s, View(2), QuorumCertificate::genesis()))
            .collect();
        let tc = timeouts
            .into_iter()
            .find_map(|t| pm.process_remote_timeout(t))
            .unwrap();
        pm.update_high_tc(&tc);

        let tmo = pm.timeout_for(View(3), QuorumCertificate::genesis(), committee.key(1));
        assert_eq!(tmo.sender, ValidatorId(1));
        assert_eq!(tmo.high_tc.as_ref().map(|t| t.view), Some(View(2)));
        assert!(tmo.verify(&committee.key(1).public_key()));

        pm.cleanup_below(View(3));
        assert!(format!("{pm:?}").contains("pending_views: 0"));
    }
}
