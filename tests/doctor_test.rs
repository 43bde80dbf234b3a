//! Integration tests for `packforge doctor`

mod common;

use common::TestProject;

fn manifest(sandbox_command: &str) -> String {
    format!(
        r#"backend = "local"

[[package]]
name = "liba"
artifact = "liba-1.0-1.src.rpm"

[resolver]
command = ["sh", "-c", "echo {{}}"]

[local]
workdir = "work"
repo = "repo"
sandbox_command = "{sandbox_command}"
sandbox_config = "mock.cfg"
package_command = ["sh"]
index_command = ["sh"]
"#
    )
}

#[test]
fn test_doctor_passes_with_available_commands() {
    let project = TestProject::new();
    project.create_file("packforge.toml", &manifest("sh"));

    let output = project.run_packforge(&["doctor"]);
    assert!(
        output.status.success(),
        "doctor failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("resolver command 'sh' found"), "stdout: {stdout}");
    assert!(stdout.contains("sandbox command 'sh' found"), "stdout: {stdout}");
}

#[test]
fn test_doctor_reports_missing_commands() {
    let project = TestProject::new();
    project.create_file("packforge.toml", &manifest("definitely-not-a-real-sandbox"));

    let output = project.run_packforge(&["doctor"]);
    assert!(!output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        stdout.contains("sandbox command 'definitely-not-a-real-sandbox' not found"),
        "stdout: {stdout}"
    );
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("missing external commands"),
        "stderr: {stderr}"
    );
}
