use std::collections::BTreeSet;

use refsets::{
    CollectionExt, FoldRole, FoldSpec, MemoryCollection, ReferenceCollection, SharedCollection,
};

fn items(count: usize) -> SharedCollection<usize> {
    MemoryCollection::from_items(0..count).into_shared()
}

#[test]
fn every_item_is_tested_in_exactly_one_fold() {
    let collection = items(23);
    let spec = FoldSpec::new(4);
    let mut tested = Vec::new();
    for fold in 0..spec.fold_count {
        let testing = collection.fold(&spec, fold, FoldRole::Testing).unwrap();
        let training = collection.fold(&spec, fold, FoldRole::Training).unwrap();
        let testing_items: BTreeSet<usize> = testing.to_vec().unwrap().into_iter().collect();
        let training_items: BTreeSet<usize> = training.to_vec().unwrap().into_iter().collect();
        assert!(testing_items.is_disjoint(&training_items));
        assert_eq!(testing_items.len() + training_items.len(), 23);
        tested.extend(testing_items);
    }
    tested.sort_unstable();
    assert_eq!(tested, (0..23).collect::<Vec<_>>());
}

#[test]
fn thinned_training_view_takes_leading_items_then_every_mth() {
    let collection = items(60);
    let spec = FoldSpec::new(3).with_thinning(2, 3).with_max_items_per_fold(5);
    let training = collection
        .fold(&spec, 0, FoldRole::Training)
        .unwrap()
        .to_vec()
        .unwrap();
    // Fold 0 holds multiples of 3; the first pass leaves 1, 2, 4, 5, 7, 8, ...
    // The second keeps the first 4 of those, then every third, capped at 10.
    assert_eq!(training, vec![1, 2, 4, 5, 7, 11, 16, 20, 25, 29]);

    let testing = collection
        .fold(&spec, 0, FoldRole::Testing)
        .unwrap()
        .to_vec()
        .unwrap();
    assert_eq!(testing, vec![0, 3, 6, 15, 24]);
}

#[test]
fn fold_views_shuffle_within_their_own_items() {
    let collection = items(30);
    let spec = FoldSpec::new(5);
    let testing = collection.fold(&spec, 2, FoldRole::Testing).unwrap();
    let expected: BTreeSet<usize> = testing.to_vec().unwrap().into_iter().collect();
    let shuffled: BTreeSet<usize> = testing
        .shuffle_with_seed(11)
        .unwrap()
        .to_vec()
        .unwrap()
        .into_iter()
        .collect();
    assert_eq!(shuffled, expected);
    assert_eq!(expected, BTreeSet::from([2, 7, 12, 17, 22, 27]));
}

#[test]
fn fold_plans_round_trip_through_json() {
    let spec = FoldSpec::new(5).with_thinning(3, 2).with_max_items_per_fold(10);
    let json = serde_json::to_string(&spec).unwrap();
    let restored: FoldSpec = serde_json::from_str(&json).unwrap();
    assert_eq!(restored, spec);

    let minimal: FoldSpec = serde_json::from_str(r#"{"fold_count": 4}"#).unwrap();
    assert_eq!(minimal, FoldSpec::new(4));
}

#[test]
fn out_of_range_fold_index_is_rejected() {
    let collection = items(10);
    assert!(
        collection
            .fold(&FoldSpec::new(3), 3, FoldRole::Testing)
            .is_err()
    );
    assert!(
        collection
            .fold(&FoldSpec::new(1), 0, FoldRole::Training)
            .is_err()
    );
}
