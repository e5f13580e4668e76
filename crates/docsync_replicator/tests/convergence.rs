//! Property tests: a successful push leaves the peer matching the local store.

use docsync_replicator::ReplicatorType;
use docsync_store::DocumentStore;
use docsync_testkit::prelude::*;
use proptest::prelude::*;

proptest! {
    #![proptest_config(PropTestConfig {
        cases: 16,
        max_shrink_iters: 50,
    }.to_proptest_config())]

    #[test]
    fn push_makes_peer_match_local(ops in operation_sequence_strategy(6, 1, 25)) {
        let pair = StorePair::new();
        for op in &ops {
            op.apply(pair.local.as_ref());
        }

        let replicator = pair.replicator(ReplicatorType::Push);
        let initial = replicator.pending_document_ids().unwrap();
        prop_assert_eq!(initial.len(), pair.local.count().unwrap());

        replicator.start().unwrap();
        prop_assert!(replicator.wait_for_stopped(LONG_WAIT));
        prop_assert!(replicator.status().error.is_none());
        prop_assert!(replicator.pending_document_ids().unwrap().is_empty());

        prop_assert_eq!(pair.peer.count().unwrap(), pair.local.count().unwrap());
        for local in pair.local.iter_all().unwrap() {
            let remote = pair.peer.get(local.id()).unwrap();
            prop_assert_eq!(
                remote.as_ref().map(|d| d.properties()),
                Some(local.properties())
            );
        }
    }

    #[test]
    fn initial_pending_matches_live_documents(ops in operation_sequence_strategy(8, 0, 30)) {
        let pair = StorePair::new();
        for op in &ops {
            op.apply(pair.local.as_ref());
        }

        let replicator = pair.replicator(ReplicatorType::PushAndPull);
        let pending = replicator.pending_document_ids().unwrap();
        let live: std::collections::BTreeSet<_> = pair
            .local
            .iter_all()
            .unwrap()
            .map(|d| d.id().clone())
            .collect();
        prop_assert_eq!(pending, live);
    }
}
