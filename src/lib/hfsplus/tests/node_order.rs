mod common;

use common::*;
use hfsplus_btree::node::{NodeLayout, record_offsets};
use hfsplus_btree::{CatalogKey, Error, HfsName, Node, kBTLeafNode};
use proptest::prelude::*;

const LAYOUT: NodeLayout = NodeLayout {
    node_size: NODE_SIZE,
    fixed_index_key_len: None,
};

fn arb_keys() -> impl Strategy<Value = Vec<(u32, String, Vec<u8>)>> {
    prop::collection::btree_map(
        (1u32..40, "[A-Za-z0-9._ ]{0,12}"),
        prop::collection::vec(any::<u8>(), 0..8).prop_map(|mut payload| {
            // keep records 2-byte aligned like real leaves
            if payload.len() % 2 == 1 {
                payload.pop();
            }
            payload
        }),
        0..20,
    )
    .prop_map(|map| {
        map.into_iter()
            .map(|((parent, name), payload)| (parent, name, payload))
            .collect()
    })
}

proptest! {
    #[test]
    fn prop_leaf_records_decode_in_key_order(entries in arb_keys()) {
        // ASCII names: UTF-16 order equals the BTreeMap's byte order
        let records: Vec<Vec<u8>> = entries
            .iter()
            .map(|(parent, name, payload)| leaf_record(catalog_key(*parent, name), payload))
            .collect();
        let data = node(kBTLeafNode, 1, (0, 0), &records);

        let offsets = record_offsets(3, &data).unwrap();
        prop_assert_eq!(offsets.len(), records.len() + 1);
        for (idx, record) in records.iter().enumerate() {
            prop_assert_eq!(offsets[idx + 1] - offsets[idx], record.len());
        }

        let Node::Leaf(leaf) = Node::<CatalogKey>::parse(3, &data, &LAYOUT).unwrap() else {
            panic!("expected a leaf node");
        };
        prop_assert_eq!(leaf.records.len(), entries.len());
        for (record, (parent, name, payload)) in leaf.records.iter().zip(&entries) {
            prop_assert_eq!(&record.key, &CatalogKey::new(*parent, HfsName::from_str_verbatim(name)));
            prop_assert_eq!(&record.payload, payload);
        }
        prop_assert!(leaf.records.windows(2).all(|w| w[0].key < w[1].key));
    }

    #[test]
    fn prop_swapped_offsets_are_corrupt(entries in arb_keys(), pick in any::<prop::sample::Index>()) {
        prop_assume!(entries.len() >= 2);
        let records: Vec<Vec<u8>> = entries
            .iter()
            .map(|(parent, name, payload)| leaf_record(catalog_key(*parent, name), payload))
            .collect();
        let mut data = node(kBTLeafNode, 1, (0, 0), &records);

        // swap the table entries of two neighbouring records
        let idx = pick.index(records.len() - 1);
        let a = NODE_SIZE - 2 * (idx + 1);
        let b = a - 2;
        let (first, second) = ([data[a], data[a + 1]], [data[b], data[b + 1]]);
        data[a..a + 2].copy_from_slice(&second);
        data[b..b + 2].copy_from_slice(&first);

        let corrupt = matches!(
            Node::<CatalogKey>::parse(3, &data, &LAYOUT),
            Err(Error::CorruptNode { node: 3, .. })
        );
        prop_assert!(corrupt);
    }
}
