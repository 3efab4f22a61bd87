use std::{collections::BTreeMap, ffi::OsStr, fs, path::Path};

use engine::{
    EngineErr, SessionBuilder,
    checkpoint::{self, part_path, read_sparse, sparse_stem},
};
use serde_json::json;
use specs::SessionSpec;

fn spec(devices: usize) -> SessionSpec {
    let devices: Vec<_> = (0..devices)
        .map(|id| json!({ "id": id, "memory_limit": 4194304 }))
        .collect();

    serde_json::from_value(json!({
        "devices": devices,
        "optimizer": { "adam": { "learning_rate": 0.01, "beta1": 0.9, "beta2": 0.999, "epsilon": 1e-8 } },
        "network": { "dense_dim": 2, "hidden": [6, 3] },
        "embeddings": [
            { "slots": 2, "vec_size": 3, "max_vocabulary_per_device": 512 },
            { "slots": 1, "vec_size": 2, "max_vocabulary_per_device": 512, "combiner": "mean" }
        ],
        "batch_size": 4,
        "train_data": { "source": { "synthetic": { "samples": 48, "key_range": 200, "nnz_per_slot": 2, "seed": 5 } } },
        "eval_data": { "source": { "synthetic": { "samples": 48, "key_range": 200, "nnz_per_slot": 2, "seed": 6 } } },
        "seed": 11
    }))
    .unwrap()
}

fn table(stem: &Path, vec_size: usize) -> BTreeMap<i64, Vec<u32>> {
    read_sparse::<i64>(stem, vec_size)
        .unwrap()
        .unwrap()
        .iter()
        .map(|(key, values)| (key, values.iter().map(|v| v.to_bits()).collect()))
        .collect()
}

#[test]
fn snapshots_reload_bit_exact_on_another_device_count() {
    let dir = tempfile::tempdir().unwrap();
    let saved = dir.path().join("saved").display().to_string();
    let resaved = dir.path().join("resaved").display().to_string();

    let mut session = SessionBuilder::new().build(&spec(3)).unwrap();
    session.init_params(None).unwrap();
    session.start_data_reading().unwrap();
    for _ in 0..3 {
        session.train().unwrap();
    }
    session.download_params_to_files(&saved, 3).unwrap();

    let mut reloaded = SessionBuilder::new().build(&spec(2)).unwrap();
    reloaded
        .init_params(Some(&checkpoint::dense_path(&saved, 3)))
        .unwrap();
    reloaded
        .init_or_load_sparse(&[sparse_stem(&saved, 0, 3), sparse_stem(&saved, 1, 3)])
        .unwrap();
    reloaded.download_params_to_files(&resaved, 0).unwrap();

    assert_eq!(reloaded.params_num(), session.params_num());
    assert_eq!(
        fs::read(checkpoint::dense_path(&saved, 3)).unwrap(),
        fs::read(checkpoint::dense_path(&resaved, 0)).unwrap()
    );

    for (t, vec_size) in [(0, 3), (1, 2)] {
        let before = sparse_stem(&saved, t, 3);
        let after = sparse_stem(&resaved, t, 0);

        assert!(part_path(&before, 2).exists());
        assert!(part_path(&after, 1).exists());
        assert!(!part_path(&after, 2).exists());
        assert!(!table(&before, vec_size).is_empty());
        assert_eq!(table(&before, vec_size), table(&after, vec_size));
    }

    let leftovers = fs::read_dir(dir.path())
        .unwrap()
        .filter(|entry| entry.as_ref().unwrap().path().extension() == Some(OsStr::new("tmp")))
        .count();
    assert_eq!(leftovers, 0);
}

#[test]
fn dense_files_must_fit_the_network() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dense.model");
    fs::write(&path, [0u8; 12]).unwrap();

    let mut session = SessionBuilder::new().build(&spec(1)).unwrap();

    assert!(matches!(
        session.init_params(Some(&path)),
        Err(EngineErr::CorruptFile { .. })
    ));
    assert!(session.init_params(Some(&dir.path().join("missing"))).is_ok());
}

#[test]
fn missing_sparse_snapshots_keep_random_rows() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = SessionBuilder::new().build(&spec(2)).unwrap();

    session
        .init_or_load_sparse(&[dir.path().join("nothing")])
        .unwrap();
    assert_eq!(session.params_num(), (10 * 6 + 6) + (6 * 3 + 3) + (3 + 1));

    assert!(matches!(
        session.init_or_load_sparse(&[dir.path().join("a"), dir.path().join("b"), dir.path().join("c")]),
        Err(EngineErr::InvalidArgument(_))
    ));
}
