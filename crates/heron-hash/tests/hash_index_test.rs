//! End-to-end scenarios for the extendible hash index over real pools.

use heron_buffer::{BufferPoolInstance, FileDiskManager, ShardedBufferPool};
use heron_common::{PageId, Rid};
use heron_hash::ExtendibleHashIndex;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::sync::Arc;
use tempfile::tempdir;

fn int_index(
    pool_size: usize,
) -> (
    ExtendibleHashIndex<i32, i32, BufferPoolInstance>,
    tempfile::TempDir,
) {
    let dir = tempdir().unwrap();
    let disk = Arc::new(FileDiskManager::open(dir.path().join("hash.db"), false).unwrap());
    let pool = Arc::new(BufferPoolInstance::new(pool_size, disk));
    (ExtendibleHashIndex::new(pool).unwrap(), dir)
}

#[test]
fn smoke() {
    let (index, _dir) = int_index(50);

    for i in 0..5 {
        assert!(index.insert(None, i, i).unwrap(), "failed to insert {i}");
        assert_eq!(index.get_value(None, &i).unwrap(), vec![i]);
    }
    index.verify_integrity().unwrap();

    assert!(index.remove(None, &0, &0).unwrap());
    assert!(index.get_value(None, &0).unwrap().is_empty());
    for i in 1..5 {
        assert_eq!(index.get_value(None, &i).unwrap(), vec![i]);
    }
    index.verify_integrity().unwrap();
}

#[test]
fn duplicate_pairs_rejected() {
    let (index, _dir) = int_index(50);

    for i in 0..5 {
        assert!(index.insert(None, i, i).unwrap());
    }

    // Re-inserting (0, 0) fails; a second value under key 0 succeeds.
    assert!(!index.insert(None, 0, 0).unwrap());
    assert!(index.insert(None, 0, 1).unwrap());

    let mut values = index.get_value(None, &0).unwrap();
    values.sort();
    assert_eq!(values, vec![0, 1]);

    // Other keys keep exactly one value.
    for i in 1..5 {
        assert_eq!(index.get_value(None, &i).unwrap(), vec![i]);
    }
    index.verify_integrity().unwrap();
}

#[test]
fn capacity_overflow_splits_buckets() {
    let (index, _dir) = int_index(30);

    for i in 0..500 {
        assert!(index.insert(None, i, i).unwrap(), "failed to insert {i}");
        let values = index.get_value(None, &i).unwrap();
        assert_eq!(values, vec![i], "lookup of freshly inserted {i}");
    }

    index.verify_integrity().unwrap();
    assert!(index.global_depth().unwrap() >= 1);

    for i in 0..500 {
        assert_eq!(index.get_value(None, &i).unwrap(), vec![i], "lookup {i}");
    }
    index.verify_integrity().unwrap();
}

#[test]
fn grow_then_shrink_to_empty() {
    let (index, _dir) = int_index(20);
    let data_size = 1000;

    // Two full insert/remove cycles; the second exercises the table after
    // it has collapsed once.
    for _pass in 0..2 {
        for i in 0..data_size {
            assert!(index.insert(None, i, i).unwrap());
        }
        assert!(index.global_depth().unwrap() >= 1);
        index.verify_integrity().unwrap();

        for i in (0..data_size).step_by(2) {
            assert!(index.remove(None, &i, &i).unwrap());
        }
        index.verify_integrity().unwrap();

        for i in (1..data_size).step_by(2) {
            assert_eq!(index.get_value(None, &i).unwrap(), vec![i]);
            assert!(index.remove(None, &i, &i).unwrap());
        }
        index.verify_integrity().unwrap();

        for i in 0..data_size {
            assert!(index.get_value(None, &i).unwrap().is_empty());
        }

        // With nothing left every bucket pair has merged away.
        assert_eq!(index.global_depth().unwrap(), 0);
    }
}

#[test]
fn shuffled_workload() {
    let (index, _dir) = int_index(30);
    let mut rng = StdRng::seed_from_u64(0x5EED);

    let mut keys: Vec<i32> = (0..800).collect();
    keys.shuffle(&mut rng);
    for &k in &keys {
        assert!(index.insert(None, k, k * 2).unwrap());
    }
    index.verify_integrity().unwrap();

    keys.shuffle(&mut rng);
    let (gone, kept) = keys.split_at(400);
    for &k in gone {
        assert!(index.remove(None, &k, &(k * 2)).unwrap());
    }
    index.verify_integrity().unwrap();

    for &k in gone {
        assert!(index.get_value(None, &k).unwrap().is_empty());
    }
    for &k in kept {
        assert_eq!(index.get_value(None, &k).unwrap(), vec![k * 2]);
    }
}

#[test]
fn rid_valued_index() {
    let dir = tempdir().unwrap();
    let disk = Arc::new(FileDiskManager::open(dir.path().join("rid.db"), false).unwrap());
    let pool = Arc::new(BufferPoolInstance::new(30, disk));
    let index: ExtendibleHashIndex<i64, Rid, _> = ExtendibleHashIndex::new(pool).unwrap();

    for i in 0..300u32 {
        let rid = Rid::new(PageId(i / 8), i % 8);
        assert!(index.insert(None, i as i64, rid).unwrap());
    }
    index.verify_integrity().unwrap();

    for i in 0..300u32 {
        let expected = Rid::new(PageId(i / 8), i % 8);
        assert_eq!(index.get_value(None, &(i as i64)).unwrap(), vec![expected]);
    }

    let rid = Rid::new(PageId(0), 0);
    assert!(index.remove(None, &0, &rid).unwrap());
    assert!(index.get_value(None, &0).unwrap().is_empty());
}

#[test]
fn index_over_sharded_pool() {
    let dir = tempdir().unwrap();
    let disk = Arc::new(FileDiskManager::open(dir.path().join("shard.db"), false).unwrap());
    let pool = Arc::new(ShardedBufferPool::new(2, 16, disk));
    let index: ExtendibleHashIndex<i32, i32, _> = ExtendibleHashIndex::new(pool).unwrap();

    for i in 0..600 {
        assert!(index.insert(None, i, i).unwrap(), "failed to insert {i}");
    }
    index.verify_integrity().unwrap();
    assert!(index.global_depth().unwrap() >= 1);

    for i in 0..600 {
        assert_eq!(index.get_value(None, &i).unwrap(), vec![i], "lookup {i}");
    }

    for i in 0..600 {
        assert!(index.remove(None, &i, &i).unwrap());
    }
    index.verify_integrity().unwrap();
    assert_eq!(index.global_depth().unwrap(), 0);
}
