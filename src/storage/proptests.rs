//! Property-based tests for the conversation store
//!
//! Invariants checked against `MemoryStorage`:
//! - `reset_state(with_data = true)` always yields a null state and empty data
//! - a single-sided address resolves to chat == user
//! - reads are independent copies
//! - no sequence of operations leaves an empty record behind

use super::{resolve_address, Address, ConversationStore, DataMap, MemoryStorage, StepPointer};
use proptest::prelude::*;
use serde_json::Value;

// ============================================================================
// Strategies
// ============================================================================

fn arb_id() -> impl Strategy<Value = String> {
    "[a-z0-9]{1,4}"
}

fn arb_address() -> impl Strategy<Value = Address> {
    prop_oneof![
        arb_id().prop_map(|id| Address::new().user(id)),
        arb_id().prop_map(|id| Address::new().chat(id)),
        (arb_id(), arb_id()).prop_map(|(c, u)| Address::new().chat(c).user(u)),
    ]
}

fn arb_map() -> impl Strategy<Value = DataMap> {
    prop::collection::vec(("[a-c]", any::<i64>()), 0..3).prop_map(|pairs| {
        pairs
            .into_iter()
            .map(|(k, v)| (k, Value::from(v)))
            .collect()
    })
}

#[derive(Debug, Clone)]
enum Op {
    SetState(Option<StepPointer>),
    SetData(DataMap),
    UpdateData(DataMap),
    SetBucket(DataMap),
    UpdateBucket(DataMap),
    Reset(bool),
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        prop::option::of(("[a-b]", "[a-b]").prop_map(|(f, s)| StepPointer::new(f, s)))
            .prop_map(Op::SetState),
        arb_map().prop_map(Op::SetData),
        arb_map().prop_map(Op::UpdateData),
        arb_map().prop_map(Op::SetBucket),
        arb_map().prop_map(Op::UpdateBucket),
        any::<bool>().prop_map(Op::Reset),
    ]
}

fn block_on<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap()
        .block_on(future)
}

async fn apply(store: &MemoryStorage, address: &Address, op: Op) {
    match op {
        Op::SetState(state) => store.set_state(address, state).await,
        Op::SetData(data) => store.set_data(address, data).await,
        Op::UpdateData(data) => store.update_data(address, data).await,
        Op::SetBucket(bucket) => store.set_bucket(address, bucket).await,
        Op::UpdateBucket(bucket) => store.update_bucket(address, bucket).await,
        Op::Reset(with_data) => store.reset_state(address, with_data).await,
    }
    .unwrap();
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #[test]
    fn prop_single_sided_address_fills_other_half(id in arb_id()) {
        let from_user = resolve_address(None, Some(&id)).unwrap();
        prop_assert_eq!(&from_user.chat, &from_user.user);
        let from_chat = resolve_address(Some(&id), None).unwrap();
        prop_assert_eq!(&from_chat.chat, &from_chat.user);
        prop_assert_eq!(from_user, from_chat);
    }

    #[test]
    fn prop_reset_with_data_clears(
        address in arb_address(),
        ops in prop::collection::vec(arb_op(), 0..12),
    ) {
        block_on(async {
            let store = MemoryStorage::new();
            for op in ops {
                apply(&store, &address, op).await;
            }
            store.reset_state(&address, true).await.unwrap();
            assert_eq!(store.get_state(&address).await.unwrap(), None);
            assert!(store.get_data(&address).await.unwrap().is_empty());
        });
    }

    #[test]
    fn prop_reads_are_independent_copies(address in arb_address(), data in arb_map()) {
        block_on(async {
            let store = MemoryStorage::new();
            store.set_data(&address, data.clone()).await.unwrap();

            let mut first = store.get_data(&address).await.unwrap();
            let second = store.get_data(&address).await.unwrap();
            assert_eq!(first, second);

            first.insert("mutated".into(), Value::Bool(true));
            assert_eq!(store.get_data(&address).await.unwrap(), data);
        });
    }

    #[test]
    fn prop_no_empty_records_survive(
        steps in prop::collection::vec((arb_address(), arb_op()), 0..20),
    ) {
        block_on(async {
            let store = MemoryStorage::new();
            for (address, op) in steps {
                apply(&store, &address, op).await;
            }
            for record in store.records.read().await.values() {
                assert!(!record.is_empty());
            }
        });
    }
}
