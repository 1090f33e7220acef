use super::dispatch::Dispatcher;
use super::intake::IntakeWorker;
use super::lane::{LaneJob, LaneMessage, LaneWorker, Vacated};
use super::*;
use crate::adapters::{
    ChannelGossip, ChannelReobservationSink, GuardianSetState, InMemoryVaaStore, KeySigner,
};
use crate::domain::crypto::test_helpers::{address_of, generate_key, sign};
use crate::domain::{
    ChainId, Digest, EmitterAddress, GuardianSet, GuardianSignature, Observation,
    StateShard, Vaa, VerificationFailure, GOVERNANCE_CHAIN, GOVERNANCE_EMITTER,
};
use crate::events::{
    GossipMessage, ObservationRequest, PeerObservation, SelfObservation, SignedObservation,
    SignedVaaWithQuorum,
};
use async_trait::async_trait;
use k256::ecdsa::SigningKey;
use parking_lot::Mutex;
use std::time::Duration;

// Mock implementations for testing
struct MockGovernor {
    admit: bool,
    governed: bool,
    pending: Mutex<Vec<Observation>>,
}

impl MockGovernor {
    fn new(admit: bool, governed: bool, pending: Vec<Observation>) -> Self {
        Self {
            admit,
            governed,
            pending: Mutex::new(pending),
        }
    }
}

#[async_trait]
impl Governor for MockGovernor {
    async fn admit(&self, _observation: &Observation) -> Result<bool, String> {
        Ok(self.admit)
    }

    async fn release_pending(&self) -> Result<Vec<Observation>, String> {
        Ok(std::mem::take(&mut *self.pending.lock()))
    }

    fn is_governed(&self, _chain: ChainId, _emitter: &EmitterAddress) -> bool {
        self.governed
    }
}

struct MockAccountant {
    decision: Result<bool, String>,
    covers: bool,
}

#[async_trait]
impl Accountant for MockAccountant {
    async fn submit_observation(&self, _observation: &Observation) -> Result<bool, String> {
        self.decision.clone()
    }

    fn covers(&self, _observation: &Observation) -> bool {
        self.covers
    }
}

fn sample_observation(sequence: u64) -> Observation {
    Observation {
        tx_hash: vec![0xaa; 32],
        timestamp: 1_700_000_000,
        nonce: 0,
        sequence,
        consistency_level: 15,
        emitter_chain: ChainId::ETHEREUM,
        emitter_address: EmitterAddress([0x42; 32]),
        payload: b"token transfer".to_vec(),
        unreliable: false,
        is_reobservation: false,
    }
}

struct Harness {
    ctx: Arc<ProcessorContext>,
    /// `keys[0]` is this node
    keys: Vec<SigningKey>,
    set: Arc<GuardianSet>,
    guardian_sets: Arc<GuardianSetState>,
    store: Arc<InMemoryVaaStore>,
    gossip: mpsc::Receiver<Vec<u8>>,
    reobservations: mpsc::Receiver<ObservationRequest>,
    shard: StateShard,
}

struct HarnessBuilder {
    keys: Vec<SigningKey>,
    config: ProcessorConfig,
    gossip_capacity: usize,
    initialized: bool,
    governor: Option<Arc<dyn Governor>>,
    accountant: Option<Arc<dyn Accountant>>,
}

impl HarnessBuilder {
    fn new(keys: Vec<SigningKey>) -> Self {
        Self {
            keys,
            config: ProcessorConfig {
                downgrade_integrity_alarms: true,
                ..Default::default()
            },
            gossip_capacity: 1024,
            initialized: true,
            governor: None,
            accountant: None,
        }
    }

    fn build(self) -> Harness {
        let set = GuardianSet::new(4, self.keys.iter().map(address_of).collect());
        let guardian_sets = Arc::new(GuardianSetState::new());
        if self.initialized {
            guardian_sets.set(set.clone());
        }

        let store = Arc::new(InMemoryVaaStore::new());
        let (gossip, gossip_rx) = ChannelGossip::new(self.gossip_capacity);
        let (reobservation, reobservation_rx) = ChannelReobservationSink::new(64);

        let deps = ProcessorDependencies {
            signer: Arc::new(KeySigner::new(self.keys[0].clone())),
            guardian_sets: guardian_sets.clone(),
            store: store.clone(),
            gossip: Arc::new(gossip),
            reobservation: Arc::new(reobservation),
            governor: self.governor,
            accountant: self.accountant,
        };

        Harness {
            ctx: Arc::new(ProcessorContext::new(deps, self.config)),
            keys: self.keys,
            set: Arc::new(set),
            guardian_sets,
            store,
            gossip: gossip_rx,
            reobservations: reobservation_rx,
            shard: StateShard::new(),
        }
    }
}

fn keys(n: usize) -> Vec<SigningKey> {
    (0..n).map(|_| generate_key()).collect()
}

impl Harness {
    fn new(n: usize) -> Self {
        HarnessBuilder::new(keys(n)).build()
    }

    fn digest(&self, observation: &Observation) -> Digest {
        observation.create_vaa(self.set.index).signing_digest()
    }

    fn peer(&self, signer: usize, observation: &Observation) -> PeerObservation {
        let digest = self.digest(observation);
        PeerObservation {
            digest,
            address: address_of(&self.keys[signer]),
            signature: sign(&digest, &self.keys[signer]),
            tx_hash: observation.tx_hash.clone(),
            message_id: observation.message_id(),
            received_at: Instant::now(),
        }
    }

    async fn observe_locally(&mut self, observation: &Observation) -> AggregationOutcome {
        let event = self
            .ctx
            .observe_message(observation.clone())
            .await
            .unwrap()
            .expect("message should be signed");
        self.ctx
            .handle_self_observation(&mut self.shard, event, Instant::now())
            .await
            .unwrap()
    }

    async fn receive(&mut self, signer: usize, observation: &Observation) -> AggregationOutcome {
        let peer = self.peer(signer, observation);
        self.deliver(peer).await
    }

    async fn deliver(&mut self, peer: PeerObservation) -> AggregationOutcome {
        let set = Arc::clone(&self.set);
        self.ctx
            .handle_peer_observation(&mut self.shard, peer, &set, Instant::now())
            .await
            .unwrap()
    }

    async fn sweep_at(&mut self, digest: &Digest, age: Duration) -> SweepReport {
        let first = self.shard.get(digest).expect("state exists").first_observed;
        self.ctx.sweep(&mut self.shard, first + age).await.unwrap()
    }

    fn drain_gossip(&mut self) -> Vec<GossipMessage> {
        let mut out = Vec::new();
        while let Ok(bytes) = self.gossip.try_recv() {
            out.push(GossipMessage::decode(&bytes).unwrap());
        }
        out
    }

    fn drain_reobservations(&mut self) -> Vec<ObservationRequest> {
        let mut out = Vec::new();
        while let Ok(req) = self.reobservations.try_recv() {
            out.push(req);
        }
        out
    }

    fn signed_vaas(messages: &[GossipMessage]) -> usize {
        messages
            .iter()
            .filter(|m| matches!(m, GossipMessage::SignedVaaWithQuorum(_)))
            .count()
    }
}

fn quorum_vaa(keys: &[SigningKey], signers: &[usize], observation: &Observation) -> Vaa {
    let mut vaa = observation.create_vaa(4);
    let digest = vaa.signing_digest();
    vaa.signatures = signers
        .iter()
        .map(|&i| GuardianSignature {
            index: i as u8,
            signature: sign(&digest, &keys[i]),
        })
        .collect();
    vaa
}

// =============================================================================
// Aggregation
// =============================================================================

#[tokio::test]
async fn test_quorum_of_four_submits_exactly_once() {
    let mut h = Harness::new(4);
    let obs = sample_observation(1);
    let digest = h.digest(&obs);

    assert_eq!(
        h.observe_locally(&obs).await,
        AggregationOutcome::Pending { have: 1, need: 3 }
    );
    assert_eq!(
        h.receive(1, &obs).await,
        AggregationOutcome::Pending { have: 2, need: 3 }
    );
    assert_eq!(h.receive(2, &obs).await, AggregationOutcome::Submitted);
    assert_eq!(h.receive(3, &obs).await, AggregationOutcome::AlreadySubmitted);

    let state = h.shard.get(&digest).unwrap();
    assert!(state.submitted);
    assert_eq!(state.signatures.len(), 3);

    let gossip = h.drain_gossip();
    assert_eq!(Harness::signed_vaas(&gossip), 1);
    assert!(matches!(gossip[0], GossipMessage::SignedObservation(_)));

    let stored = h.store.get(&obs.message_id()).expect("VAA stored");
    let vaa = Vaa::unmarshal(&stored).unwrap();
    let indexes: Vec<u8> = vaa.signatures.iter().map(|s| s.index).collect();
    assert_eq!(indexes, vec![0, 1, 2]);
    assert_eq!(vaa.verify(&h.set), Ok(()));
}

#[tokio::test]
async fn test_arrival_order_does_not_change_vaa() {
    let shared = keys(4);
    let mut a = HarnessBuilder::new(shared.clone()).build();
    let mut b = HarnessBuilder::new(shared).build();
    let obs = sample_observation(2);

    a.observe_locally(&obs).await;
    a.receive(3, &obs).await;
    assert_eq!(a.receive(1, &obs).await, AggregationOutcome::Submitted);

    b.receive(1, &obs).await;
    b.receive(3, &obs).await;
    assert_eq!(b.observe_locally(&obs).await, AggregationOutcome::Submitted);

    let id = obs.message_id();
    assert_eq!(a.store.get(&id).unwrap(), b.store.get(&id).unwrap());
}

#[tokio::test]
async fn test_duplicate_signature_leaves_count_unchanged() {
    let mut h = Harness::new(4);
    let obs = sample_observation(3);
    let digest = h.digest(&obs);

    assert_eq!(
        h.receive(1, &obs).await,
        AggregationOutcome::Pending { have: 1, need: 3 }
    );
    assert_eq!(h.receive(1, &obs).await, AggregationOutcome::Duplicate);
    assert_eq!(h.shard.get(&digest).unwrap().signatures.len(), 1);
}

#[tokio::test]
async fn test_quorum_waits_for_local_observation() {
    let mut h = Harness::new(4);
    let obs = sample_observation(4);
    let digest = h.digest(&obs);

    h.receive(1, &obs).await;
    h.receive(2, &obs).await;
    assert_eq!(
        h.receive(3, &obs).await,
        AggregationOutcome::AwaitingLocalObservation
    );
    assert!(h.store.is_empty());
    assert_eq!(
        h.shard.get(&digest).unwrap().phase(),
        crate::domain::AggregationPhase::WaitingOnLocalObservation
    );

    assert_eq!(h.observe_locally(&obs).await, AggregationOutcome::Submitted);
    assert_eq!(h.store.len(), 1);

    let vaa = Vaa::unmarshal(&h.store.get(&obs.message_id()).unwrap()).unwrap();
    assert_eq!(vaa.signatures.len(), 4);
}

#[tokio::test]
async fn test_forged_and_unknown_signers_rejected() {
    let mut h = Harness::new(4);
    let obs = sample_observation(5);
    let digest = h.digest(&obs);

    // Signed by guardian 2 but claims to be guardian 1
    let mut forged = h.peer(2, &obs);
    forged.address = address_of(&h.keys[1]);
    assert!(matches!(
        h.deliver(forged).await,
        AggregationOutcome::Rejected(VerificationFailure::PubkeyMismatch { .. })
    ));

    let outsider = generate_key();
    let stranger = PeerObservation {
        address: address_of(&outsider),
        signature: sign(&digest, &outsider),
        ..h.peer(1, &obs)
    };
    assert_eq!(
        h.deliver(stranger).await,
        AggregationOutcome::Rejected(VerificationFailure::UnknownGuardian(
            address_of(&outsider),
            4
        ))
    );

    // Rejections never create state
    assert!(h.shard.get(&digest).is_none());
}

#[tokio::test]
async fn test_signature_ignored_when_vaa_already_stored() {
    let mut h = Harness::new(4);
    let obs = sample_observation(6);

    let vaa = quorum_vaa(&h.keys, &[0, 1, 2], &obs);
    h.store.store_vaa(&vaa).await.unwrap();

    assert_eq!(h.receive(3, &obs).await, AggregationOutcome::AlreadyStored);
    assert!(h.shard.is_empty());
}

#[tokio::test]
async fn test_store_failure_still_broadcasts() {
    let mut h = Harness::new(1);
    let obs = sample_observation(7);
    h.store.set_fail_writes(true);

    assert_eq!(h.observe_locally(&obs).await, AggregationOutcome::Submitted);
    assert!(h.store.is_empty());
    assert_eq!(Harness::signed_vaas(&h.drain_gossip()), 1);
}

#[tokio::test]
async fn test_single_guardian_reaches_quorum_alone() {
    let mut h = Harness::new(1);
    let obs = sample_observation(8);

    assert_eq!(h.observe_locally(&obs).await, AggregationOutcome::Submitted);
    let vaa = Vaa::unmarshal(&h.store.get(&obs.message_id()).unwrap()).unwrap();
    assert_eq!(vaa.signatures.len(), 1);
}

// =============================================================================
// Message observer
// =============================================================================

#[tokio::test]
async fn test_governance_emitter_raises_alarm() {
    let h = Harness::new(4);
    let mut obs = sample_observation(9);
    obs.emitter_chain = GOVERNANCE_CHAIN;
    obs.emitter_address = GOVERNANCE_EMITTER;

    assert!(!h.ctx.accept_local(&obs));
    assert!(h.ctx.accept_local(&sample_observation(9)));
}

#[tokio::test]
async fn test_local_observation_dropped_without_guardian_set() {
    let mut builder = HarnessBuilder::new(keys(4));
    builder.initialized = false;
    let mut h = builder.build();
    let obs = sample_observation(10);

    assert!(!h.ctx.accept_local(&obs));
    assert!(h.ctx.observe_message(obs).await.unwrap().is_none());
    assert!(h.drain_gossip().is_empty());
}

#[tokio::test]
async fn test_no_signature_for_stored_message() {
    let mut h = Harness::new(4);
    let obs = sample_observation(11);
    h.store
        .store_vaa(&quorum_vaa(&h.keys, &[0, 1, 2], &obs))
        .await
        .unwrap();

    assert!(h.ctx.observe_message(obs).await.unwrap().is_none());
    assert!(h.drain_gossip().is_empty());
}

#[tokio::test]
async fn test_observe_message_broadcasts_own_signature() {
    let mut h = Harness::new(4);
    let obs = sample_observation(12);

    let event = h.ctx.observe_message(obs.clone()).await.unwrap().unwrap();
    assert_eq!(event.digest, h.digest(&obs));
    assert_eq!(event.address, address_of(&h.keys[0]));

    let gossip = h.drain_gossip();
    assert_eq!(gossip.len(), 1);
    match &gossip[0] {
        GossipMessage::SignedObservation(msg) => {
            assert_eq!(msg.hash, event.digest.0.to_vec());
            assert_eq!(msg.message_id, obs.message_id().to_string());
        }
        other => panic!("unexpected gossip {other:?}"),
    }
}

#[tokio::test]
async fn test_full_gossip_queue_is_fatal() {
    let mut builder = HarnessBuilder::new(keys(4));
    builder.gossip_capacity = 1;
    let h = builder.build();

    h.ctx.observe_message(sample_observation(13)).await.unwrap();
    let err = h
        .ctx
        .observe_message(sample_observation(14))
        .await
        .unwrap_err();
    assert!(matches!(err, ProcessorError::GossipQueueFull));
}

// =============================================================================
// Inbound quorum VAAs
// =============================================================================

#[tokio::test]
async fn test_inbound_quorum_vaa_stored_once() {
    let h = Harness::new(4);
    let obs = sample_observation(15);
    let msg = SignedVaaWithQuorum::from_vaa(&quorum_vaa(&h.keys, &[0, 2, 3], &obs));

    assert!(h.ctx.handle_quorum_vaa(msg.clone()).await);
    assert_eq!(h.store.len(), 1);
    assert!(!h.ctx.handle_quorum_vaa(msg).await);
}

#[tokio::test]
async fn test_inbound_vaa_without_quorum_dropped() {
    let h = Harness::new(4);
    let obs = sample_observation(16);
    let msg = SignedVaaWithQuorum::from_vaa(&quorum_vaa(&h.keys, &[0, 2], &obs));

    assert!(!h.ctx.handle_quorum_vaa(msg).await);
    assert!(h.store.is_empty());
}

#[tokio::test]
async fn test_inbound_vaa_from_foreign_set_dropped() {
    let h = Harness::new(4);
    let strangers = keys(4);
    let obs = sample_observation(17);
    let msg = SignedVaaWithQuorum::from_vaa(&quorum_vaa(&strangers, &[0, 1, 2], &obs));

    assert!(!h.ctx.handle_quorum_vaa(msg).await);
    assert!(!h
        .ctx
        .handle_quorum_vaa(SignedVaaWithQuorum { vaa: vec![1, 2, 3] })
        .await);
}

#[tokio::test]
async fn test_inbound_vaa_needs_guardian_set() {
    let shared = keys(4);
    let mut builder = HarnessBuilder::new(shared.clone());
    builder.initialized = false;
    let h = builder.build();
    let vaa = quorum_vaa(&shared, &[0, 1, 2], &sample_observation(18));

    assert!(!h.ctx.handle_quorum_vaa(SignedVaaWithQuorum::from_vaa(&vaa)).await);
}

// =============================================================================
// Cleanup sweep
// =============================================================================

#[tokio::test]
async fn test_sweep_expires_late_entry() {
    let mut h = Harness::new(4);
    let obs = sample_observation(20);
    let digest = h.digest(&obs);

    h.receive(1, &obs).await;
    h.store
        .store_vaa(&quorum_vaa(&h.keys, &[1, 2, 3], &obs))
        .await
        .unwrap();

    assert_eq!(
        h.sweep_at(&digest, Duration::from_secs(29)).await,
        SweepReport::default()
    );
    let report = h.sweep_at(&digest, Duration::from_secs(31)).await;
    assert_eq!(report.late, 1);
    assert!(h.shard.is_empty());
}

#[tokio::test]
async fn test_sweep_removes_completed_entry() {
    let mut h = Harness::new(1);
    let obs = sample_observation(21);
    let digest = h.digest(&obs);
    h.observe_locally(&obs).await;

    let report = h.sweep_at(&digest, Duration::from_secs(1)).await;
    assert_eq!(report.completed, 1);
    assert!(h.shard.is_empty());
}

#[tokio::test]
async fn test_sweep_expires_unobserved_entry() {
    let mut h = Harness::new(4);
    let obs = sample_observation(22);
    let digest = h.digest(&obs);
    h.receive(1, &obs).await;

    let report = h.sweep_at(&digest, Duration::from_secs(59 * 60)).await;
    assert_eq!(report.removed(), 0);
    assert_eq!(report.retried, 0);

    let report = h.sweep_at(&digest, Duration::from_secs(61 * 60)).await;
    assert_eq!(report.unobserved, 1);
    assert!(h.shard.is_empty());
}

#[tokio::test]
async fn test_sweep_times_out_owned_entry() {
    let mut h = Harness::new(4);
    let obs = sample_observation(23);
    let digest = h.digest(&obs);
    h.observe_locally(&obs).await;

    let report = h
        .sweep_at(&digest, Duration::from_secs(24 * 60 * 60 + 60))
        .await;
    assert_eq!(report.timed_out, 1);
    assert_eq!(report.retried, 0);
    assert!(h.shard.is_empty());
}

#[tokio::test]
async fn test_sweep_retries_once_per_interval() {
    let mut h = Harness::new(4);
    let obs = sample_observation(24);
    let digest = h.digest(&obs);
    h.observe_locally(&obs).await;
    h.drain_gossip();

    let mut total = SweepReport::default();
    for tick in 1..=30u64 {
        total.merge(h.sweep_at(&digest, Duration::from_secs(tick * 30)).await);
    }

    // Ticks at 5, 10 and 15 minutes
    assert_eq!(total.retried, 3);
    assert_eq!(total.removed(), 0);
    assert_eq!(h.shard.get(&digest).unwrap().retry_count, 3);

    let requests = h.drain_reobservations();
    assert_eq!(requests.len(), 3);
    assert_eq!(requests[0].chain_id, ChainId::ETHEREUM);
    assert_eq!(requests[0].tx_hash, obs.tx_hash);

    let retransmits = h.drain_gossip();
    assert_eq!(retransmits.len(), 3);
    assert!(retransmits
        .iter()
        .all(|m| matches!(m, GossipMessage::SignedObservation(_))));
}

#[tokio::test]
async fn test_sweep_drops_unreliable_entry_instead_of_retrying() {
    let mut h = Harness::new(4);
    let mut obs = sample_observation(25);
    obs.unreliable = true;
    let digest = h.digest(&obs);
    h.observe_locally(&obs).await;

    let report = h.sweep_at(&digest, Duration::from_secs(4 * 60)).await;
    assert_eq!(report, SweepReport::default());

    let report = h.sweep_at(&digest, Duration::from_secs(5 * 60)).await;
    assert_eq!(report.timed_out, 1);
    assert!(h.drain_reobservations().is_empty());
}

// =============================================================================
// Dispatcher
// =============================================================================

struct Lanes {
    receivers: Vec<mpsc::Receiver<LaneMessage>>,
}

fn dispatcher_for(h: &Harness) -> (Dispatcher, Lanes) {
    let mut senders = Vec::new();
    let mut receivers = Vec::new();
    for _ in 0..h.ctx.config.num_total_lanes {
        let (tx, rx) = mpsc::channel(16);
        senders.push(tx);
        receivers.push(rx);
    }
    let (_signed_tx, signed_rx) = mpsc::channel(1);
    let (_self_tx, self_rx) = mpsc::channel(1);
    let (_vacated_tx, vacated_rx) = mpsc::unbounded_channel();
    (
        Dispatcher::new(Arc::clone(&h.ctx), signed_rx, self_rx, senders, vacated_rx),
        Lanes { receivers },
    )
}

impl Lanes {
    fn drain(&mut self) -> Vec<(usize, LaneJob)> {
        self.drain_messages()
            .into_iter()
            .map(|(lane, message)| (lane, message.job))
            .collect()
    }

    fn drain_messages(&mut self) -> Vec<(usize, LaneMessage)> {
        let mut out = Vec::new();
        for (lane, rx) in self.receivers.iter_mut().enumerate() {
            while let Ok(message) = rx.try_recv() {
                out.push((lane, message));
            }
        }
        out
    }
}

fn raw_from(peer: &PeerObservation) -> SignedObservation {
    SignedObservation::new(
        peer.address,
        peer.digest,
        peer.signature,
        peer.tx_hash.clone(),
        peer.message_id,
    )
}

#[tokio::test]
async fn test_dispatch_routes_to_bucket_lane() {
    let h = Harness::new(4);
    let (mut dispatcher, mut lanes) = dispatcher_for(&h);
    let obs = sample_observation(30);
    let peer = h.peer(2, &obs);

    dispatcher
        .dispatch_signed(raw_from(&peer), Instant::now())
        .await
        .unwrap();

    let expected = h.ctx.router.route(&peer.digest, 0, 4).lane;
    let jobs = lanes.drain();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].0, expected);
    assert!(matches!(jobs[0].1, LaneJob::Peer { .. }));

    // Our own observation of the same digest lands on the same lane
    let event = h.ctx.observe_message(obs).await.unwrap().unwrap();
    dispatcher.dispatch_self(event).await.unwrap();
    let jobs = lanes.drain();
    assert_eq!(jobs[0].0, expected);
    assert!(matches!(jobs[0].1, LaneJob::SelfObserved(_)));
}

#[tokio::test]
async fn test_dispatch_drops_malformed_and_uninitialized() {
    let h = Harness::new(4);
    let (mut dispatcher, mut lanes) = dispatcher_for(&h);
    let peer = h.peer(1, &sample_observation(31));

    let mut short = raw_from(&peer);
    short.hash.truncate(31);
    dispatcher.dispatch_signed(short, Instant::now()).await.unwrap();

    let mut bad_id = raw_from(&peer);
    bad_id.message_id = "2/zz/1".into();
    dispatcher.dispatch_signed(bad_id, Instant::now()).await.unwrap();
    assert!(lanes.drain().is_empty());

    let mut builder = HarnessBuilder::new(keys(4));
    builder.initialized = false;
    let empty = builder.build();
    let (mut dispatcher, mut lanes) = dispatcher_for(&empty);
    dispatcher
        .dispatch_signed(raw_from(&peer), Instant::now())
        .await
        .unwrap();
    assert!(lanes.drain().is_empty());
}

#[tokio::test]
async fn test_dispatch_respects_leader_filtering() {
    let mut builder = HarnessBuilder::new(keys(19));
    builder.config.leader_filtering = true;
    let h = builder.build();
    let (mut dispatcher, mut lanes) = dispatcher_for(&h);

    let mut routed = 0;
    for seq in 0..40 {
        let obs = sample_observation(100 + seq);
        let peer = h.peer(1, &obs);
        let is_leader = h.ctx.router.route(&peer.digest, 0, 19).is_leader;
        dispatcher
            .dispatch_signed(raw_from(&peer), Instant::now())
            .await
            .unwrap();
        let delivered = lanes.drain().len();
        assert_eq!(delivered, usize::from(is_leader));
        routed += delivered;
    }
    assert!(routed < 40);
}

/// Same members, our key moved from index 0 to 3.
fn rotate(h: &Harness) {
    let mut keys = h.set.keys.clone();
    keys.rotate_left(1);
    h.guardian_sets.set(GuardianSet::new(h.set.index + 1, keys));
}

/// An observation whose digest routes to a different lane once we move from
/// index 0 to index 3.
fn lane_changing_observation(h: &Harness) -> Observation {
    (0..500)
        .map(sample_observation)
        .find(|obs| {
            let digest = h.digest(obs);
            h.ctx.router.route(&digest, 0, 4).lane != h.ctx.router.route(&digest, 3, 4).lane
        })
        .expect("some digest changes lane")
}

#[tokio::test]
async fn test_guardian_set_rotation_keeps_digest_on_its_lane() {
    let h = Harness::new(4);
    let (mut dispatcher, mut lanes) = dispatcher_for(&h);
    let obs = lane_changing_observation(&h);
    let digest = h.digest(&obs);
    let lane = h.ctx.router.route(&digest, 0, 4).lane;

    dispatcher
        .dispatch_signed(raw_from(&h.peer(1, &obs)), Instant::now())
        .await
        .unwrap();
    rotate(&h);
    dispatcher
        .dispatch_signed(raw_from(&h.peer(2, &obs)), Instant::now())
        .await
        .unwrap();
    let event = h.ctx.observe_message(obs.clone()).await.unwrap().unwrap();
    dispatcher.dispatch_self(event).await.unwrap();

    let messages = lanes.drain_messages();
    assert_eq!(messages.len(), 3);
    assert!(messages.iter().all(|(l, _)| *l == lane));
    assert_eq!(dispatcher.owner_of(&digest), Some(lane));

    // One lane sees all three jobs and completes against the original set
    let (_jobs_tx, jobs_rx) = mpsc::channel(1);
    let (vacated_tx, _vacated_rx) = mpsc::unbounded_channel();
    let mut worker = LaneWorker::new(lane, Arc::clone(&h.ctx), jobs_rx, vacated_tx);
    for (_, message) in messages {
        worker.handle(message).await.unwrap();
    }

    let stored = h.store.get(&obs.message_id()).expect("VAA stored");
    let vaa = Vaa::unmarshal(&stored).unwrap();
    assert_eq!(vaa.guardian_set_index, h.set.index);
    assert_eq!(vaa.signatures.len(), 3);
    assert_eq!(vaa.verify(&h.set), Ok(()));
}

#[tokio::test]
async fn test_vacated_digest_is_routed_afresh() {
    let h = Harness::new(4);
    let (mut dispatcher, mut lanes) = dispatcher_for(&h);
    let obs = lane_changing_observation(&h);
    let digest = h.digest(&obs);

    dispatcher
        .dispatch_signed(raw_from(&h.peer(1, &obs)), Instant::now())
        .await
        .unwrap();
    let (first_lane, first) = lanes.drain_messages().remove(0);

    dispatcher.release_vacated(Vacated {
        seq: first.seq,
        digests: vec![digest],
    });
    assert_eq!(dispatcher.owner_of(&digest), None);

    rotate(&h);
    dispatcher
        .dispatch_signed(raw_from(&h.peer(2, &obs)), Instant::now())
        .await
        .unwrap();
    let jobs = lanes.drain();
    assert_eq!(jobs[0].0, h.ctx.router.route(&digest, 3, 4).lane);
    assert_ne!(jobs[0].0, first_lane);
}

#[tokio::test]
async fn test_stale_vacated_report_keeps_pin() {
    let h = Harness::new(4);
    let (mut dispatcher, mut lanes) = dispatcher_for(&h);
    let obs = sample_observation(35);
    let digest = h.digest(&obs);

    dispatcher
        .dispatch_signed(raw_from(&h.peer(1, &obs)), Instant::now())
        .await
        .unwrap();
    dispatcher
        .dispatch_signed(raw_from(&h.peer(2, &obs)), Instant::now())
        .await
        .unwrap();
    let messages = lanes.drain_messages();
    let (lane, first) = &messages[0];

    // The second job was already queued when the lane reported the first
    dispatcher.release_vacated(Vacated {
        seq: first.seq,
        digests: vec![digest],
    });
    assert_eq!(dispatcher.owner_of(&digest), Some(*lane));
}

#[tokio::test]
async fn test_lane_reports_digests_it_does_not_hold() {
    let mut h = Harness::new(4);
    let (_jobs_tx, jobs_rx) = mpsc::channel(1);
    let (vacated_tx, mut vacated_rx) = mpsc::unbounded_channel();
    let mut worker = LaneWorker::new(0, Arc::clone(&h.ctx), jobs_rx, vacated_tx);

    // Rejected signature: no state is created
    let outsider = generate_key();
    let obs = sample_observation(36);
    let digest = h.digest(&obs);
    let forged = PeerObservation {
        address: address_of(&outsider),
        signature: sign(&digest, &outsider),
        ..h.peer(1, &obs)
    };
    let job = LaneJob::Peer {
        observation: forged,
        guardian_set: Arc::clone(&h.set),
    };
    worker.handle(LaneMessage { seq: 7, job }).await.unwrap();
    assert_eq!(
        vacated_rx.try_recv().unwrap(),
        Vacated {
            seq: 7,
            digests: vec![digest]
        }
    );

    // Accepted signature keeps the state, nothing to report
    let job = LaneJob::Peer {
        observation: h.peer(1, &obs),
        guardian_set: Arc::clone(&h.set),
    };
    worker.handle(LaneMessage { seq: 8, job }).await.unwrap();
    assert!(vacated_rx.try_recv().is_err());

    // Expired by the sweep
    let now = Instant::now() + Duration::from_secs(61 * 60);
    worker
        .handle(LaneMessage {
            seq: 9,
            job: LaneJob::Sweep { now },
        })
        .await
        .unwrap();
    assert_eq!(
        vacated_rx.try_recv().unwrap(),
        Vacated {
            seq: 9,
            digests: vec![digest]
        }
    );
    assert!(h.drain_gossip().is_empty());
}

#[tokio::test]
async fn test_sweep_fans_out_to_every_lane() {
    let h = Harness::new(4);
    let (mut dispatcher, mut lanes) = dispatcher_for(&h);

    dispatcher.dispatch_sweep().await.unwrap();
    let jobs = lanes.drain();
    assert_eq!(jobs.len(), h.ctx.config.num_total_lanes);
    assert!(jobs.iter().all(|(_, j)| matches!(j, LaneJob::Sweep { .. })));
}

#[tokio::test]
async fn test_governor_release_signs_message() {
    let obs = sample_observation(40);
    let mut builder = HarnessBuilder::new(keys(4));
    builder.governor = Some(Arc::new(MockGovernor::new(false, true, vec![obs.clone()])));
    let mut h = builder.build();
    let (mut dispatcher, mut lanes) = dispatcher_for(&h);

    dispatcher.release_governed().await.unwrap();

    let jobs = lanes.drain();
    assert_eq!(jobs.len(), 1);
    assert!(matches!(jobs[0].1, LaneJob::SelfObserved(_)));
    assert_eq!(h.drain_gossip().len(), 1);
}

#[tokio::test]
async fn test_governor_releasing_ungoverned_message_is_fatal() {
    let mut builder = HarnessBuilder::new(keys(4));
    builder.governor = Some(Arc::new(MockGovernor::new(
        true,
        false,
        vec![sample_observation(41)],
    )));
    let h = builder.build();
    let (mut dispatcher, _lanes) = dispatcher_for(&h);

    assert!(matches!(
        dispatcher.release_governed().await,
        Err(ProcessorError::GovernorViolation(_))
    ));
}

// =============================================================================
// Intake
// =============================================================================

fn intake_for(h: &Harness) -> (IntakeWorker, mpsc::Receiver<SelfObservation>) {
    let (_local_tx, local) = async_channel::bounded(1);
    let (_acct_tx, accountant_released) = async_channel::bounded(1);
    let (_vaa_tx, quorum_vaas) = async_channel::bounded(1);
    let (self_tx, self_rx) = mpsc::channel(16);
    (
        IntakeWorker {
            id: 0,
            ctx: Arc::clone(&h.ctx),
            local,
            accountant_released,
            quorum_vaas,
            self_observations: self_tx,
        },
        self_rx,
    )
}

#[tokio::test]
async fn test_intake_signs_local_observation() {
    let h = Harness::new(4);
    let (worker, mut self_rx) = intake_for(&h);

    worker.handle_local(sample_observation(50)).await.unwrap();
    let event = self_rx.try_recv().unwrap();
    assert_eq!(event.observation.sequence, 50);
}

#[tokio::test]
async fn test_intake_respects_governor_hold() {
    let mut builder = HarnessBuilder::new(keys(4));
    builder.governor = Some(Arc::new(MockGovernor::new(false, true, vec![])));
    let mut h = builder.build();
    let (worker, mut self_rx) = intake_for(&h);

    worker.handle_local(sample_observation(51)).await.unwrap();
    assert!(self_rx.try_recv().is_err());
    assert!(h.drain_gossip().is_empty());
}

#[tokio::test]
async fn test_intake_respects_accountant() {
    for decision in [Ok(false), Err("contract unreachable".to_string())] {
        let mut builder = HarnessBuilder::new(keys(4));
        builder.accountant = Some(Arc::new(MockAccountant {
            decision,
            covers: true,
        }));
        let h = builder.build();
        let (worker, mut self_rx) = intake_for(&h);

        worker.handle_local(sample_observation(52)).await.unwrap();
        assert!(self_rx.try_recv().is_err());
    }
}

#[tokio::test]
async fn test_accountant_release_checks() {
    let h = Harness::new(4);
    let (worker, _rx) = intake_for(&h);
    assert!(matches!(
        worker.handle_accountant_release(sample_observation(53)).await,
        Err(ProcessorError::AccountantNotConfigured)
    ));

    let mut builder = HarnessBuilder::new(keys(4));
    builder.accountant = Some(Arc::new(MockAccountant {
        decision: Ok(true),
        covers: false,
    }));
    let h = builder.build();
    let (worker, _rx) = intake_for(&h);
    assert!(matches!(
        worker.handle_accountant_release(sample_observation(54)).await,
        Err(ProcessorError::AccountantViolation(_))
    ));

    let mut builder = HarnessBuilder::new(keys(4));
    builder.accountant = Some(Arc::new(MockAccountant {
        decision: Ok(false),
        covers: true,
    }));
    let h = builder.build();
    let (worker, mut self_rx) = intake_for(&h);
    worker
        .handle_accountant_release(sample_observation(55))
        .await
        .unwrap();
    assert_eq!(self_rx.try_recv().unwrap().observation.sequence, 55);
}

#[tokio::test]
async fn test_new_rejects_invalid_config() {
    let h = Harness::new(1);
    let (gossip, _rx) = ChannelGossip::new(1);
    let (reobservation, _reobs) = ChannelReobservationSink::new(1);
    let deps = ProcessorDependencies {
        signer: Arc::new(KeySigner::new(h.keys[0].clone())),
        guardian_sets: Arc::new(GuardianSetState::new()),
        store: h.store.clone(),
        gossip: Arc::new(gossip),
        reobservation: Arc::new(reobservation),
        governor: None,
        accountant: None,
    };
    let config = ProcessorConfig {
        num_priority_lanes: 0,
        ..Default::default()
    };

    assert!(matches!(
        GuardianProcessor::new(deps, config),
        Err(ProcessorError::Config(_))
    ));
}

#[tokio::test]
async fn test_signed_observation_parses_back() {
    let h = Harness::new(4);
    let obs = sample_observation(60);
    let peer = h.peer(1, &obs);

    let parsed = PeerObservation::parse(raw_from(&peer), Instant::now()).unwrap();
    assert_eq!(parsed.message_id, obs.message_id());
    assert_eq!(parsed.digest, peer.digest);
}
