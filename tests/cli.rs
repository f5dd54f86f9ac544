use assert_cmd::Command;
use serde_json::Value;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn temp_workspace() -> TempDir {
    tempfile::tempdir().expect("create tempdir")
}

fn write_corpus(root: &Path) {
    let train = root.join("corpora/en__it/train");
    let dev = root.join("corpora/en__it/dev");
    fs::create_dir_all(&train).expect("create train dir");
    fs::create_dir_all(&dev).expect("create dev dir");
    fs::write(
        train.join("europarl.en"),
        "the cat sat on the mat\nthe dog sat on the log\na cat and a dog\n".repeat(10),
    )
    .expect("write source");
    fs::write(
        train.join("europarl.it"),
        "il gatto sul tappeto\nil cane sul tronco\nun gatto e un cane\n".repeat(10),
    )
    .expect("write target");
    fs::write(dev.join("news.en"), "the cat and the dog\n").expect("write dev source");
    fs::write(dev.join("news.it"), "il gatto e il cane\n").expect("write dev target");
}

fn datagen(workspace: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("nmt-datagen").expect("binary exists");
    cmd.current_dir(workspace.path()).args([
        "--quiet",
        "--no-progress",
        "--voc-size",
        "120",
        "--threads",
        "1",
        "--workers",
        "2",
    ]);
    cmd
}

#[cfg(unix)]
#[test]
fn end_to_end_run_writes_vocabulary_and_statistics() {
    let workspace = temp_workspace();
    write_corpus(workspace.path());

    let mut cmd = datagen(&workspace);
    cmd.args([
        "en:it,it:en",
        "out",
        "corpora",
        "--working-dir",
        "wdir",
        "--preprocess-cmd",
        "true",
    ]);
    cmd.assert().success();

    let output = workspace.path().join("out");
    let vocabulary: Value =
        serde_json::from_slice(&fs::read(output.join("model.vcb")).expect("vocabulary exists"))
            .expect("vocabulary is tokenizer JSON");
    assert_eq!(vocabulary["model"]["type"], "BPE");

    let lengths: Value = serde_json::from_slice(
        &fs::read(output.join("decode_lengths.json")).expect("lengths exist"),
    )
    .expect("lengths are JSON");
    let forward = lengths["en__it"].as_array().expect("pair of floats");
    assert_eq!(forward.len(), 2);
    assert!(lengths["it__en"].is_array());
    assert!(!workspace.path().join("wdir").exists());
}

#[cfg(unix)]
#[test]
fn debug_run_keeps_the_encoded_streams() {
    let workspace = temp_workspace();
    write_corpus(workspace.path());

    let mut cmd = datagen(&workspace);
    cmd.args([
        "en:it",
        "out",
        "corpora",
        "-w",
        "wdir",
        "--debug",
        "--preprocess-cmd",
        "true",
    ]);
    cmd.assert().success();

    let encoded = workspace.path().join("wdir/encoded_corpora");
    let sources = fs::read_to_string(encoded.join("train.sl")).expect("train.sl");
    let factors = fs::read_to_string(encoded.join("train.factor")).expect("train.factor");
    assert_eq!(sources.lines().count(), 30);
    assert_eq!(factors.lines().count(), 30);
    for (source, factor) in sources.lines().zip(factors.lines()) {
        assert_eq!(source.split(' ').count(), factor.split(' ').count());
    }
    assert_eq!(
        fs::read_to_string(encoded.join("dev.tl")).expect("dev.tl").lines().count(),
        1
    );
    assert!(workspace.path().join("wdir/state.json").is_file());
}

#[cfg(unix)]
#[test]
fn failing_preprocess_names_the_stage() {
    let workspace = temp_workspace();
    write_corpus(workspace.path());

    let mut cmd = datagen(&workspace);
    cmd.args([
        "en:it",
        "out",
        "corpora",
        "-w",
        "wdir",
        "--preprocess-cmd",
        "false",
    ]);
    let stderr = cmd.assert().failure().get_output().stderr.clone();
    let stderr = String::from_utf8_lossy(&stderr);
    assert!(stderr.contains("stage `datagen` failed"), "stderr: {stderr}");
    assert!(workspace.path().join("out/model.vcb").is_file());
    assert!(workspace.path().join("wdir/state.json").is_file());
}

#[test]
fn debug_requires_working_dir() {
    let workspace = temp_workspace();
    let mut cmd = datagen(&workspace);
    cmd.args(["en:it", "out", "corpora", "--debug"]);
    cmd.assert().failure();
}

#[test]
fn malformed_language_pairs_are_rejected() {
    let workspace = temp_workspace();
    let mut cmd = datagen(&workspace);
    cmd.args(["en-it", "out", "corpora", "-w", "wdir"]);
    let stderr = cmd.assert().failure().get_output().stderr.clone();
    assert!(String::from_utf8_lossy(&stderr).contains("invalid language pairs"));
}
