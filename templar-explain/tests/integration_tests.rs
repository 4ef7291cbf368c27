//! Integration tests for templar-explain
//!
//! Runs the binary against small catalogs written to temporary directories

use std::fs;
use std::path::Path;
use std::process::Command;
use tempfile::TempDir;

const F16_LINE: &str = "        DeviceGroupedConvFwdMultipleABD_Xdl_CShuffle_V3<NDimSpatial,ALayout,BLayout, DsLayout,ELayout, F16, F16, F32, F16, Tuple<>, F16, PassThrough, PassThrough, PassThrough, ConvSpec, GemmMNKPadding,   256,   128,   128,    32,   8,   8,   32,   32,    2,    2,  S<4, 64, 1>,  S<1, 0, 2>,  S<1, 0, 2>,              2,              8,              8,          0,  S<4, 64, 1>,  S<1, 0, 2>,  S<1, 0, 2>,             2,              8,              8,          0,          1,           1,                   S<1, 32, 1, 8>,               8, BlkGemmPipeSched, BlockGemmPipelineVersion::v3>,";

/// Helper to run the templar-explain binary
fn run_explain(args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_templar-explain"))
        .args(args)
        .env("NO_COLOR", "1")
        .output()
        .expect("Failed to run templar-explain")
}

/// Catalog with one templated F16 declaration and one BF16 declaration
/// whose scheduler is already fixed
fn write_catalog(dir: &Path) {
    let bf16 = F16_LINE
        .replace("F16, F16, F32, F16, Tuple<>, F16", "BF16, BF16, F32, BF16, Tuple<>, BF16")
        .replace("BlkGemmPipeSched", "BlockGemmPipelineScheduler::Intrawave");
    let header = format!(
        "#pragma once\nusing device_grouped_conv_fwd_xdl_instances = std::tuple<\n  // clang-format off\n{F16_LINE}\n{bf16}\n  // clang-format on\n>;\n"
    );
    fs::write(dir.join("device_grouped_conv_fwd_xdl_instance.hpp"), header).unwrap();
}

fn catalog_dir() -> TempDir {
    let dir = TempDir::new().unwrap();
    write_catalog(dir.path());
    dir
}

fn json(output: &std::process::Output) -> serde_json::Value {
    let stdout = String::from_utf8_lossy(&output.stdout);
    serde_json::from_str(&stdout).unwrap_or_else(|e| panic!("invalid JSON ({e}): {stdout}"))
}

#[test]
fn help_shows_subcommands() {
    let output = run_explain(&["--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "Help should succeed");
    for cmd in ["instances", "bmm", "conv", "split"] {
        assert!(stdout.contains(cmd), "Should show {cmd} subcommand");
    }
}

#[test]
fn instances_expands_and_filters() {
    let dir = catalog_dir();
    let catalog = dir.path().to_str().unwrap();
    let output = run_explain(&["instances", "--catalog", catalog, "--json"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let report = json(&output);
    // 2 schedulers x 4 specializations for F16, 4 specializations for BF16
    assert_eq!(report["catalog_size"], 12);
    assert_eq!(report["candidates"], 8);
    assert_eq!(report["selected"].as_array().unwrap().len(), 8);
    assert!(report["cap"].is_null());
}

#[test]
fn instances_cap_is_deterministic() {
    let dir = catalog_dir();
    let catalog = dir.path().to_str().unwrap();
    let args = ["instances", "--catalog", catalog, "--max", "3", "--json"];

    let first = json(&run_explain(&args));
    let second = json(&run_explain(&args));
    assert_eq!(first["selected"].as_array().unwrap().len(), 3);
    assert_eq!(first["selected"], second["selected"]);
}

#[test]
fn instances_zero_cap_is_unbounded() {
    let dir = catalog_dir();
    let catalog = dir.path().to_str().unwrap();
    let report = json(&run_explain(&[
        "instances", "--catalog", catalog, "--a", "bf16", "--b", "bf16", "--out", "bf16",
        "--max", "0", "--json",
    ]));
    assert_eq!(report["candidates"], 4);
    assert_eq!(report["selected"].as_array().unwrap().len(), 4);
}

#[test]
fn instances_text_output() {
    let dir = catalog_dir();
    let catalog = dir.path().to_str().unwrap();
    let output = run_explain(&["instances", "--catalog", catalog, "--a", "f32", "--b", "f32", "--out", "f32"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success());
    assert!(stdout.contains("dtype matches: 0"));
    assert!(stdout.contains("[NONE]"));
}

#[test]
fn instances_missing_catalog_fails() {
    let output = run_explain(&["instances", "--catalog", "/no/such/catalog"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Catalog not found"));
}

#[test]
fn malformed_catalog_fails() {
    let dir = TempDir::new().unwrap();
    let truncated = F16_LINE.replace(", BlockGemmPipelineVersion::v3", "");
    fs::write(dir.path().join("bad.hpp"), truncated).unwrap();
    let output = run_explain(&["instances", "--catalog", dir.path().to_str().unwrap()]);

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("expected"));
}

#[test]
fn unknown_dtype_is_rejected_by_parser() {
    let output = run_explain(&["bmm", "--dtype", "complex64"]);
    assert!(!output.status.success());
}

#[test]
fn bmm_renders_four_fragments() {
    let output = run_explain(&[
        "bmm", "--batch", "13", "-m", "16", "-n", "32", "-k", "16", "--dtype", "f32",
        "--threads", "4",
    ]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let micro = stdout.find("cpp_micro_gemm_f32_f32_normal").unwrap();
    let threaded = stdout.find("threaded_mm(").unwrap();
    let single = stdout.find("single_thread_mm(").unwrap();
    let wrapper = stdout.find("extern \"C\"").unwrap();
    assert!(micro < threaded && threaded < single && single < wrapper);
    assert!(stdout.contains("B_single_thread_block = 12;"));
    assert!(stdout.contains("return -23;"));
}

#[test]
fn bmm_json_reports_layout() {
    let report = json(&run_explain(&[
        "bmm", "--batch", "2", "-n", "40", "-k", "16", "--dtype", "bf16", "--bias", "--json",
    ]));
    assert_eq!(report["blocked_weights"], true);
    assert_eq!(report["layout"], "Vnni2");
    assert_eq!(report["compute_dtype"], "f32");
    assert_eq!(report["weight_size"], serde_json::json!([2, 2, 16, 32]));
    assert!(report["source"].as_str().unwrap().contains("inp"));
}

#[test]
fn bmm_dynamic_m_adds_size_parameter() {
    let report = json(&run_explain(&["bmm", "--dynamic-m", "--json"]));
    assert_eq!(report["shape"][1], "s0");
    assert!(report["source"].as_str().unwrap().contains("const int64_t s0"));
}

#[test]
fn conv_renders_selected_instance() {
    let dir = catalog_dir();
    let catalog = dir.path().to_str().unwrap();
    let output = run_explain(&[
        "conv", "--catalog", catalog, "--index", "1", "--input", "2,8,16,16",
        "--out-channels", "4", "--padding", "0",
    ]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    assert!(stdout.contains("candidate 1 of 8"));
    assert!(stdout.contains("IsSupportedArgument"));
    assert!(stdout.contains("e_g_n_k_wos_lengths{ 1, 2, 4, 14, 14 }"));
}

#[test]
fn conv_index_out_of_range_fails() {
    let dir = catalog_dir();
    let catalog = dir.path().to_str().unwrap();
    let output = run_explain(&["conv", "--catalog", catalog, "--dtype", "bf16", "--index", "4"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("4 selected"));
}

#[test]
fn split_json() {
    let report = json(&run_explain(&["split", "--batch", "13", "--threads", "4", "--json"]));
    assert_eq!(report["single_thread_block"], 12);
    assert_eq!(report["parallel"]["end"], 12);
    assert_eq!(report["serial"]["start"], 12);
    assert_eq!(report["serial"]["end"], 13);
}

#[test]
fn split_single_thread_has_no_parallel_region() {
    let report = json(&run_explain(&["split", "--batch", "13", "--threads", "1", "--json"]));
    assert!(report["parallel"].is_null());
    assert_eq!(report["serial"]["start"], 0);
    assert_eq!(report["serial"]["end"], 13);
}

#[test]
fn split_zero_threads_fails() {
    let output = run_explain(&["split", "--batch", "4", "--threads", "0"]);
    assert!(!output.status.success());
}

#[test]
fn conv_zero_stride_fails_cleanly() {
    let dir = catalog_dir();
    let catalog = dir.path().to_str().unwrap();
    let output = run_explain(&["conv", "--catalog", catalog, "--stride", "0"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("stride must be positive"));
}

#[test]
fn negative_batch_is_rejected() {
    for cmd in [
        &["split", "--batch=-3", "--threads", "2"][..],
        &["bmm", "--batch=-3"][..],
    ] {
        let output = run_explain(cmd);
        assert!(!output.status.success());
        assert_eq!(output.status.code(), Some(2), "rejected while parsing arguments");
    }
}
