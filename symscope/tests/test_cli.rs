use std::process::Command;

fn symscope() -> Command {
    Command::new(env!("CARGO_BIN_EXE_symscope"))
}

#[test]
fn test_unmapped_address_reports_not_found() {
    let output = symscope().args(["--json", "--quiet", "0x10"]).output().unwrap();
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let resolution = &report["resolutions"][0];
    assert_eq!(resolution["target"], "0x10");
    assert_eq!(resolution["found"], false);
    assert!(report.get("objects").is_none());
}

#[test]
fn test_malformed_address_is_a_usage_error() {
    let output = symscope().arg("0xzz").output().unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("0xzz"));
}

#[test]
fn test_list_includes_the_binary_itself() {
    let output = symscope().args(["--list", "--json", "--quiet"]).output().unwrap();
    assert!(output.status.success());

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let load_time = report["objects"]["load_time"].as_array().unwrap();
    println!("symscope sees {} load-time objects", load_time.len());
    assert!(load_time.iter().any(|object| object["name"].as_str().is_some_and(|name| name.contains("symscope"))));
    assert!(report["objects"]["run_time"].as_array().unwrap().is_empty());
}
