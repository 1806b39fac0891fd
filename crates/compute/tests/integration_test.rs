/// End-to-end sampling runs: archive and loose-file sources, real and mock
/// engines, CSV outputs.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use flate2::write::GzEncoder;
use flate2::Compression;
use serde_json::{json, Value};

use chkpt_compute::error::InvocationError;
use chkpt_compute::{CommandEngine, Engine, JobSource, Sampler};
use chkpt_core::SamplingConfig;

// ============================================================================
// Test Helpers
// ============================================================================

/// Write a `.tar.gz` holding the given `(name, contents)` members.
fn write_archive(path: &Path, members: &[(&str, String)]) {
    let file = File::create(path).unwrap();
    let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
    for (name, data) in members {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, name, data.as_bytes()).unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap();
}

fn write_template(dir: &Path) -> PathBuf {
    let path = dir.join("torchtree.json");
    let template = json!([
        {"id": "tree", "type": "TreeModel"},
        {"id": "advi", "type": "Optimizer", "iterations": 5000},
        {
            "id": "sampler",
            "type": "Sampler",
            "loggers": [
                {"id": "sample", "parameters": ["rate", "like", "scale"]},
                {"id": "tree.logger", "type": "TreeLogger"}
            ]
        }
    ]);
    std::fs::write(&path, serde_json::to_string_pretty(&template).unwrap()).unwrap();
    path
}

fn config(dir: &Path, threads: usize) -> SamplingConfig {
    SamplingConfig {
        threads,
        template: write_template(dir),
        work_dir: dir.join("work"),
        ..SamplingConfig::default()
    }
}

fn read_rows(path: &Path) -> Vec<Vec<String>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .from_path(path)
        .unwrap();
    reader
        .records()
        .map(|r| r.unwrap().iter().map(str::to_string).collect())
        .collect()
}

/// Reads `{"rate": r}` from the checkpoint and logs three samples per
/// column: `rate` = `r-1, r, r+1` and `scale` = `0, 0, 3`.
struct SyntheticEngine;

impl Engine for SyntheticEngine {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn invoke(&self, checkpoint: &Path, config: &Path) -> Result<(), InvocationError> {
        let checkpoint: Value =
            serde_json::from_str(&std::fs::read_to_string(checkpoint).unwrap()).unwrap();
        let config: Value = serde_json::from_str(&std::fs::read_to_string(config).unwrap()).unwrap();

        let sampler = config
            .as_array()
            .unwrap()
            .iter()
            .find(|s| s["id"] == "sampler")
            .unwrap();
        let loggers = sampler["loggers"].as_array().unwrap();
        assert_eq!(loggers.len(), 1, "tree loggers must be dropped");
        assert_eq!(loggers[0]["parameters"], json!(["rate", "scale"]));

        let log = loggers[0]["file_name"].as_str().unwrap();
        let r = checkpoint["rate"].as_f64().unwrap();
        let text = format!(
            "sample\trate\tscale\n0\t{}\t0\n1\t{}\t0\n2\t{}\t3\n",
            r - 1.0,
            r,
            r + 1.0
        );
        std::fs::write(log, text).unwrap();
        Ok(())
    }
}

// ============================================================================
// Archive source
// ============================================================================

#[test]
fn archive_run_orders_rows_by_numeric_suffix() {
    let dir = tempfile::tempdir().unwrap();
    let archive = dir.path().join("checkpoints.tar.gz");
    write_archive(
        &archive,
        &[
            ("run/chkpt-10.json", json!({"rate": 10.0}).to_string()),
            ("run/chkpt-0.json", json!({"rate": 0.5}).to_string()),
            ("README.txt", "not a checkpoint".to_string()),
            ("run/chkpt-2.json", json!({"rate": 2.0}).to_string()),
        ],
    );

    let source = JobSource::from_paths(&[archive]).unwrap();
    assert!(source.archive_path().is_some());

    let config = config(dir.path(), 2);
    let work_dir = config.work_dir.clone();
    let report = Sampler::new(config, Arc::new(SyntheticEngine))
        .run(&source)
        .unwrap();

    assert!(report.is_complete());
    assert_eq!(report.items, 3);
    assert_eq!(report.workers, 2);

    let means = read_rows(&work_dir.join("means.csv"));
    assert_eq!(means[0], vec!["sample", "rate", "scale"]);
    let keys: Vec<&str> = means[1..].iter().map(|r| r[0].as_str()).collect();
    assert_eq!(keys, vec!["0", "2", "10"]);
    assert_eq!(means[1][1], "0.500000000000000");
    assert_eq!(means[3][1], "10.000000000000000");
    assert_eq!(means[2][2], "1.000000000000000");

    let variances = read_rows(&work_dir.join("variances.csv"));
    assert_eq!(variances.len(), 4);
    for row in &variances[1..] {
        assert_eq!(row[1], "1.000000000000000");
        assert_eq!(row[2], "3.000000000000000");
    }

    for id in 0..2 {
        assert!(!work_dir.join(format!("temp-checkpoint-{id}.json")).exists());
    }
}

#[test]
fn archive_member_collision_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let archive = dir.path().join("checkpoints.tar.gz");
    write_archive(
        &archive,
        &[
            ("a/chkpt-1.json", "{}".to_string()),
            ("b/chkpt-1.json", "{}".to_string()),
        ],
    );

    let source = JobSource::from_paths(&[archive]).unwrap();
    let err = Sampler::new(config(dir.path(), 2), Arc::new(SyntheticEngine))
        .run(&source)
        .unwrap_err();
    assert!(err.to_string().contains("order key 1"), "{err}");
}

// ============================================================================
// Loose files
// ============================================================================

#[test]
fn loose_files_with_more_threads_than_items() {
    let dir = tempfile::tempdir().unwrap();
    let paths: Vec<PathBuf> = [(3, 3.0), (1, 1.0)]
        .iter()
        .map(|(k, r)| {
            let path = dir.path().join(format!("sample-{k}.json"));
            std::fs::write(&path, json!({"rate": r}).to_string()).unwrap();
            path
        })
        .collect();

    let source = JobSource::from_paths(&paths).unwrap();
    let config = config(dir.path(), 0);
    let work_dir = config.work_dir.clone();
    let report = Sampler::new(config, Arc::new(SyntheticEngine))
        .run(&source)
        .unwrap();

    assert!(report.is_complete());
    assert!(report.workers <= 2);
    let means = read_rows(&work_dir.join("means.csv"));
    assert_eq!(means[1][0], "1");
    assert_eq!(means[2][0], "3");
}

#[cfg(unix)]
#[test]
fn command_engine_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("engine.sh");
    std::fs::write(
        &script,
        r#"[ "$1" = "-c" ] || exit 64
v=$(cat "$2")
log=$(grep -o '"file_name": *"[^"]*"' "$3" | head -n 1 | sed 's/.*"\([^"]*\)"$/\1/')
printf 'sample\trate\tscale\n0\t%s\t1\n1\t%s\t1\n' "$v" "$v" > "$log"
"#,
    )
    .unwrap();

    let paths: Vec<PathBuf> = [4, 5]
        .iter()
        .map(|k| {
            let path = dir.path().join(format!("chkpt-{k}.json"));
            std::fs::write(&path, k.to_string()).unwrap();
            path
        })
        .collect();

    let config = config(dir.path(), 2);
    let work_dir = config.work_dir.clone();
    let engine = CommandEngine::new("sh").with_args([script.to_string_lossy().into_owned()]);
    let report = Sampler::new(config, Arc::new(engine))
        .run(&JobSource::from_paths(&paths).unwrap())
        .unwrap();

    assert!(report.is_complete(), "{:?}", report.incomplete_summary());
    let means = read_rows(&work_dir.join("means.csv"));
    assert_eq!(means[1], vec!["4", "4.000000000000000", "1.000000000000000"]);
    assert_eq!(means[2], vec!["5", "5.000000000000000", "1.000000000000000"]);
    let variances = read_rows(&work_dir.join("variances.csv"));
    assert_eq!(variances[2], vec!["5", "0.000000000000000", "0.000000000000000"]);
}

#[cfg(unix)]
#[test]
fn failing_command_engine_reports_incomplete_rows() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("chkpt-1.json");
    std::fs::write(&path, "{}").unwrap();

    let engine = CommandEngine::new("sh").with_args(["-c", "echo boom >&2; exit 3", "engine"]);
    let err = Sampler::new(config(dir.path(), 1), Arc::new(engine))
        .run(&JobSource::from_paths(&[path]).unwrap())
        .unwrap_err();

    // No worker ever produced a sample log, so there is no header to write.
    assert!(err.to_string().contains("header"), "{err}");
}
