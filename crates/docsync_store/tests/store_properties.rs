//! Property tests for the in-memory store.

use docsync_store::{Document, DocumentId, DocumentStore, MemoryStore};
use proptest::prelude::*;
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
enum Op {
    Save(u8, String),
    Delete(u8),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0u8..8, "[a-z]{1,6}").prop_map(|(id, value)| Op::Save(id, value)),
        (0u8..8).prop_map(Op::Delete),
    ]
}

proptest! {
    #[test]
    fn live_view_matches_model(ops in prop::collection::vec(op_strategy(), 0..64)) {
        let store = MemoryStore::new("prop");
        let mut model: BTreeMap<String, String> = BTreeMap::new();

        for op in ops {
            match op {
                Op::Save(id, value) => {
                    let id = format!("doc-{id}");
                    store
                        .save(Document::new(id.as_str()).with_string("v", value.as_str()))
                        .unwrap();
                    model.insert(id, value);
                }
                Op::Delete(id) => {
                    let id = format!("doc-{id}");
                    let deleted = store.delete(&DocumentId::new(id.as_str())).unwrap();
                    prop_assert_eq!(deleted, model.remove(&id).is_some());
                }
            }
        }

        let live: BTreeMap<String, String> = store
            .iter_all()
            .unwrap()
            .map(|d| (d.id().to_string(), d.string("v").unwrap().to_string()))
            .collect();
        prop_assert_eq!(live, model);
    }

    #[test]
    fn sequences_strictly_increase(count in 1usize..32) {
        let store = MemoryStore::new("prop");
        let mut last = 0;
        for i in 0..count {
            let saved = store.save(Document::new(format!("doc-{}", i % 4))).unwrap();
            prop_assert!(saved.sequence() > last);
            last = saved.sequence();
        }
        prop_assert_eq!(store.last_sequence(), last);
    }
}
