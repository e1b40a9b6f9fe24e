//! End-to-end tests for the `ganomaly` binary on a tiny PNG dataset.

use std::path::Path;
use std::process::Command;

use image::{Luma, GrayImage};
use tempfile::TempDir;

fn write_class(dir: &Path, count: usize, abnormal: bool) {
    std::fs::create_dir_all(dir).unwrap();
    for i in 0..count {
        let img = GrayImage::from_fn(16, 16, |x, y| {
            if abnormal && (x + y + i as u32) % 2 == 0 {
                Luma([240])
            } else {
                Luma([40 + (i as u8) * 3])
            }
        });
        img.save(dir.join(format!("{i:03}.png"))).unwrap();
    }
}

fn dataset(root: &Path) {
    write_class(&root.join("train").join("0.normal"), 8, false);
    write_class(&root.join("test").join("0.normal"), 3, false);
    write_class(&root.join("test").join("1.abnormal"), 3, true);
}

fn run(args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_ganomaly"))
        .args(args)
        .env("RUST_LOG", "warn")
        .output()
        .unwrap()
}

const TINY: [&str; 16] = [
    "--isize", "16", "--nc", "1", "--nz", "8", "--ngf", "8", "--ndf", "8", "--batch-size", "4",
    "--print-freq", "4", "--save-image-freq", "4",
];

#[test]
fn test_train_then_test() {
    let tmp = TempDir::new().unwrap();
    let data = tmp.path().join("data");
    let out = tmp.path().join("out");
    dataset(&data);

    let config = tmp.path().join("run.toml");
    std::fs::write(&config, "[options]\nniter = 1\nname = \"cli\"\n").unwrap();

    let mut args = vec![
        "train",
        "--config",
        config.to_str().unwrap(),
        "--dataroot",
        data.to_str().unwrap(),
        "--outf",
        out.to_str().unwrap(),
    ];
    args.extend(TINY);
    let output = run(&args);
    assert!(
        output.status.success(),
        "train failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let run_dir = out.join("cli");
    assert!(run_dir.join("opt.json").exists());
    assert!(run_dir.join("train").join("loss_log.txt").exists());
    assert!(run_dir.join("train").join("images").join("reals.png").exists());

    let report: serde_json::Value = serde_json::from_reader(
        std::fs::File::open(run_dir.join("train").join("report.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(report["epochs"].as_array().unwrap().len(), 1);

    let weights = run_dir.join("train").join("weights").join("netG.mpk");
    if report["best_auc"].as_f64().unwrap() > 0.0 {
        assert!(weights.exists());

        let mut args = vec![
            "test",
            "--config",
            config.to_str().unwrap(),
            "--dataroot",
            data.to_str().unwrap(),
            "--outf",
            out.to_str().unwrap(),
            "--save-test-images",
        ];
        args.extend(TINY);
        let output = run(&args);
        assert!(
            output.status.success(),
            "test failed: {}",
            String::from_utf8_lossy(&output.stderr)
        );
        assert!(String::from_utf8_lossy(&output.stdout).contains("AUC"));

        let test_dir = run_dir.join("test");
        let scores: serde_json::Value =
            serde_json::from_reader(std::fs::File::open(test_dir.join("scores.json")).unwrap())
                .unwrap();
        assert_eq!(scores["scores"].as_array().unwrap().len(), 6);
        assert!(test_dir.join("performance.json").exists());
        assert!(test_dir.join("images").join("real_001.png").exists());
    }
}

#[test]
fn test_without_weights_fails() {
    let tmp = TempDir::new().unwrap();
    let data = tmp.path().join("data");
    dataset(&data);

    let out = tmp.path().join("out");
    let mut args = vec![
        "test",
        "--dataroot",
        data.to_str().unwrap(),
        "--outf",
        out.to_str().unwrap(),
    ];
    args.extend(TINY);
    let output = run(&args);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Weights not found"));
}

#[test]
fn test_rejects_bad_image_size() {
    let tmp = TempDir::new().unwrap();
    let data = tmp.path().join("data");
    dataset(&data);
    let output = run(&["train", "--dataroot", data.to_str().unwrap(), "--isize", "20"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("multiple of 16"));
}
