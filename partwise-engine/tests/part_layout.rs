//! Property tests for part layout across input sizes

use std::sync::Arc;

use partwise_core::*;
use partwise_engine::testing::TrickleReader;
use partwise_engine::*;
use proptest::prelude::*;

fn run_upload(
    data: Vec<u8>,
    part_size: u64,
    chunk: usize,
) -> (ObjectReference, Arc<MemoryStore>) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();

    runtime.block_on(async move {
        let store = Arc::new(MemoryStore::with_min_part_size(part_size).recording());
        let config = UploadConfig {
            part_size,
            retry: RetryPolicy::none(),
        };
        let uploader = Uploader::new(store.clone(), config).unwrap();
        let key = ObjectKey::new("prop-object").unwrap();
        let size = data.len() as u64;

        let reference = uploader
            .upload(TrickleReader::new(data, chunk), size, key)
            .await
            .unwrap();
        (reference, store)
    })
}

fn uploaded_parts(store: &MemoryStore) -> Vec<(u32, u64)> {
    store
        .calls()
        .into_iter()
        .filter_map(|call| match call {
            StoreCall::UploadPart {
                part_number, size, ..
            } => Some((part_number, size)),
            _ => None,
        })
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn parts_are_full_except_a_nonzero_last(
        len in 1usize..4096,
        part_size in 16u64..512,
        chunk in 1usize..700,
    ) {
        let data: Vec<u8> = (0..len).map(|i| (i % 256) as u8).collect();
        let (reference, store) = run_upload(data.clone(), part_size, chunk);
        let parts = uploaded_parts(&store);

        let expected = expected_parts(len as u64, part_size);
        prop_assert_eq!(parts.len() as u64, expected);
        prop_assert_eq!(u64::from(reference.parts), expected);

        let (last, body) = parts.split_last().unwrap();
        for (_, size) in body {
            prop_assert_eq!(*size, part_size);
        }
        prop_assert!(last.1 > 0);
        if len as u64 % part_size == 0 {
            prop_assert_eq!(last.1, part_size);
        } else {
            prop_assert!(last.1 < part_size);
        }

        let stored = store.object(&reference.key).unwrap();
        prop_assert_eq!(&stored.data[..], &data[..]);
    }

    #[test]
    fn completion_lists_contiguous_ascending_parts(
        len in 1usize..2048,
        part_size in 16u64..256,
    ) {
        let data = vec![0x5Au8; len];
        let (_, store) = run_upload(data, part_size, 64);

        let completed = store
            .calls()
            .into_iter()
            .find_map(|call| match call {
                StoreCall::Complete { parts, .. } => Some(parts),
                _ => None,
            })
            .unwrap();

        let expected: Vec<u32> = (1..=expected_parts(len as u64, part_size) as u32).collect();
        prop_assert_eq!(completed, expected);
        prop_assert_eq!(store.count(StoreOp::Complete), 1);
        prop_assert_eq!(store.count(StoreOp::Abort), 0);
    }
}
