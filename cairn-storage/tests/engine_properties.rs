//! Property tests for the cache engine.

use cairn_core::{Query, Record, DEFAULT_ID_LENGTH};
use cairn_test_utils::fixtures::memory_engine;
use cairn_test_utils::generators::*;
use proptest::prelude::*;

fn block_on<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("runtime should build")
        .block_on(future)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Saving a sequence returns one record per input, each with an id and
    /// metadata, and ids the caller supplied are kept.
    #[test]
    fn prop_save_preserves_shape_and_ids(records in prop::collection::vec(arb_record(), 0..8)) {
        let given: Vec<Option<String>> = records.iter().map(|r| r.id().map(str::to_string)).collect();
        let saved = block_on(async {
            memory_engine().save("items", records).await
        }).expect("save");

        prop_assert_eq!(saved.len(), given.len());
        for (record, given) in saved.iter().zip(given) {
            prop_assert!(record.meta().is_some());
            match given {
                Some(id) => prop_assert_eq!(record.id(), Some(id.as_str())),
                None => {
                    prop_assert!(cairn_core::is_hex_id(record.id().unwrap_or(""), DEFAULT_ID_LENGTH));
                    prop_assert!(record.is_local());
                }
            }
        }
    }

    /// Saving one record returns one record.
    #[test]
    fn prop_single_save_returns_single_record(record in arb_record()) {
        let had_id = record.id().is_some();
        let saved: Record = block_on(async {
            memory_engine().save("items", record).await
        }).expect("save");
        prop_assert!(saved.id().is_some());
        prop_assert_eq!(saved.is_local(), !had_id);
    }

    /// `count` always equals the length of the matching `find`.
    #[test]
    fn prop_count_matches_find(
        records in prop::collection::vec(arb_unkeyed_record(), 0..12),
        field in arb_field_name(),
        value in arb_scalar(),
    ) {
        let query = Query::new().equal_to(field, value);
        let (found, counted) = block_on(async {
            let engine = memory_engine();
            engine.save("items", records).await.expect("save");
            let found = engine.find("items", Some(&query)).await.expect("find");
            let counted = engine.count("items", Some(&query)).await.expect("count");
            (found, counted)
        });
        prop_assert_eq!(found.len(), counted.count);
    }
}
