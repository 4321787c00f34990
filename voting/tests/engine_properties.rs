//! Property tests over random connect/disconnect sequences.

use std::collections::HashSet;
use std::sync::Arc;

use proptest::prelude::*;

use crest_store::PollStore;
use crest_types::codec::encode_member;
use crest_types::{FederationMember, NetworkParams, VoteKind, VoterKey, VotingData};
use crest_voting::testkit::MockChain;
use crest_voting::{LiveFederation, NoInactivity, SyncOutcome, VotingEngine};

const VOTERS: [&str; 4] = ["02aa", "02bb", "02cc", "02dd"];

fn genesis() -> Vec<FederationMember> {
    VOTERS
        .iter()
        .map(|key| FederationMember::new(VoterKey::new(*key)))
        .collect()
}

fn proposal(tag: usize) -> VotingData {
    let target = FederationMember::new(VoterKey::new(format!("02e{tag}")));
    VotingData::new(VoteKind::AddMember, encode_member(&target))
}

struct Harness {
    _dir: tempfile::TempDir,
    chain: Arc<MockChain>,
    engine: VotingEngine,
}

fn harness() -> Harness {
    let dir = tempfile::tempdir().expect("temp dir");
    let store = Arc::new(PollStore::open(dir.path(), 10 * 1024 * 1024).expect("open store"));
    let chain = Arc::new(MockChain::new());
    let federation = Arc::new(LiveFederation::new(genesis()));
    let engine = VotingEngine::new(
        store,
        chain.clone(),
        federation.clone(),
        federation,
        Arc::new(NoInactivity),
        NetworkParams::dev(genesis()),
        None,
    );
    engine.initialize().expect("initialize");
    Harness {
        _dir: dir,
        chain,
        engine,
    }
}

fn assert_invariants(engine: &VotingEngine) {
    let polls = engine.all_polls();

    // Ids form a gapless prefix starting at zero.
    let ids: Vec<u32> = polls.iter().map(|p| p.id).collect();
    let expected: Vec<u32> = (0..polls.len() as u32).collect();
    assert_eq!(ids, expected, "poll ids must be gapless");

    // At most one pending poll per proposal.
    let mut pending = HashSet::new();
    for poll in polls.iter().filter(|p| p.is_pending()) {
        assert!(
            pending.insert(poll.voting_data.clone()),
            "two pending polls for one proposal"
        );
    }
}

/// One step of a random chain history: extend the canonical branch or reorg
/// its tip away.
#[derive(Clone, Copy, Debug)]
enum Step {
    Empty { voter: usize },
    Vote { voter: usize, proposal: usize },
    Reorg,
}

fn step_strategy() -> impl Strategy<Value = Step> {
    prop_oneof![
        1 => (0..VOTERS.len()).prop_map(|voter| Step::Empty { voter }),
        3 => (0..VOTERS.len(), 0..4usize)
            .prop_map(|(voter, proposal)| Step::Vote { voter, proposal }),
        1 => Just(Step::Reorg),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn ids_stay_gapless_under_random_reorgs(steps in prop::collection::vec(step_strategy(), 1..40)) {
        let h = harness();
        // A fixed base block so reorgs always have a shared ancestor.
        h.chain.push_block(VOTERS[0], None);
        let mut chain_len = 1usize;

        for step in steps {
            match step {
                Step::Empty { voter } => {
                    h.chain.push_block(VOTERS[voter], None);
                    chain_len += 1;
                }
                Step::Vote { voter, proposal } => {
                    h.chain
                        .push_block(VOTERS[voter], Some(&[self::proposal(proposal)]));
                    chain_len += 1;
                }
                Step::Reorg => {
                    if chain_len > 1 {
                        h.chain.disconnect_tip();
                        chain_len -= 1;
                    }
                }
            }
            let outcome = h.engine.synchronize(&h.chain.tip_ref()).expect("sync");
            prop_assert_eq!(outcome, SyncOutcome::Synchronized);
            assert_invariants(&h.engine);
        }
    }

    #[test]
    fn connect_then_disconnect_restores_poll_state(
        steps in prop::collection::vec(step_strategy(), 1..25),
        base_votes in prop::collection::vec((0..VOTERS.len(), 0..4usize), 0..6),
    ) {
        let h = harness();

        // Base history the round trip must not disturb.
        h.chain.push_block(VOTERS[0], None);
        for (voter, proposal) in base_votes {
            h.chain
                .push_block(VOTERS[voter], Some(&[self::proposal(proposal)]));
        }
        h.engine.synchronize(&h.chain.tip_ref()).expect("base sync");

        let baseline_polls = h.engine.all_polls();
        let baseline_tip = h.engine.tip().expect("tip");

        // Connect a batch of blocks, then disconnect them newest-first.
        let mut connected = Vec::new();
        for step in steps {
            let block = match step {
                Step::Empty { voter } => h.chain.push_block(VOTERS[voter], None),
                Step::Vote { voter, proposal } => h
                    .chain
                    .push_block(VOTERS[voter], Some(&[self::proposal(proposal)])),
                Step::Reorg => continue,
            };
            h.engine.process_block(&block).expect("process");
            connected.push(block);
        }
        for block in connected.iter().rev() {
            h.engine.unprocess_block(block).expect("unprocess");
        }

        prop_assert_eq!(h.engine.all_polls(), baseline_polls);
        prop_assert_eq!(h.engine.tip().expect("tip"), baseline_tip);
    }
}
