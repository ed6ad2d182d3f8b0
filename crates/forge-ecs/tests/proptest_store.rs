//! Property-based tests for the component store's core invariants: a
//! value survives an attach unmodified, and a delete clears every
//! component the entity ever held.

use forge_ecs::prelude::*;
use proptest::prelude::*;

proptest! {
    /// For all id, cid: after attach(id, cid, v) without an intervening
    /// mutation, get(id, cid) == v and has(id, cid) == (v is not NaN).
    #[test]
    fn attach_then_get_matches_has(
        id in 0u64..10_000,
        cid in 0u64..32,
        v in prop::num::f32::ANY.prop_filter("finite", |v| v.is_finite()),
    ) {
        let store = ComponentStore::new(10_000, 32);
        store.attach(EntityId::new(id), ComponentId::new(cid), v).unwrap();
        prop_assert_eq!(store.get(EntityId::new(id), ComponentId::new(cid)), v);
        prop_assert_eq!(store.has(EntityId::new(id), ComponentId::new(cid)), !v.is_nan());
    }

    /// After delete_entity(id), has(id, cid) is false for every cid the
    /// entity ever held, and its row becomes available for reuse.
    #[test]
    fn delete_entity_clears_every_component(
        id in 0u64..1_000,
        cids in prop::collection::vec(0u64..16, 1..8),
        vals in prop::collection::vec(prop::num::f32::ANY.prop_filter("finite", |v| v.is_finite()), 1..8),
    ) {
        let store = ComponentStore::new(1_000, 16);
        let n = cids.len().min(vals.len());
        for i in 0..n {
            store.attach(EntityId::new(id), ComponentId::new(cids[i]), vals[i]).unwrap();
        }
        let free_before = store.free_row_count();
        store.delete_entity(EntityId::new(id));
        for i in 0..n {
            prop_assert!(!store.has(EntityId::new(id), ComponentId::new(cids[i])));
        }
        prop_assert_eq!(store.free_row_count(), free_before + 1);
    }
}
