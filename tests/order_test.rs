//! Integration tests for `packforge order`
//!
//! The build-after graph is computed through a stub resolver script and
//! printed with its explanation chains; cycles abort with a report.

mod common;

use common::{TestProject, RESOLVER_SCRIPT};

fn manifest(packages: &str) -> String {
    format!(
        r#"backend = "local"

{packages}

[resolver]
command = ["./resolver.sh"]

[local]
workdir = "work"
repo = "repo"
sandbox_command = "./mock.sh"
sandbox_config = "mock.cfg"
"#
    )
}

fn setup_linear_project() -> TestProject {
    let project = TestProject::new();
    project.create_script("resolver.sh", RESOLVER_SCRIPT);
    project.create_file(
        "packforge.toml",
        &manifest(
            r#"[[package]]
name = "liba"
artifact = "liba-1.0-1.src.rpm"

[[package]]
name = "appb"
requirements = ["liba-devel"]
artifact = "appb-2.0-1.src.rpm"
"#,
        ),
    );
    project
}

#[test]
fn test_order_prints_edges_and_explanations() {
    let project = setup_linear_project();
    let output = project.run_packforge(&["order"]);
    assert!(
        output.status.success(),
        "order failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("appb"));
    assert!(stdout.contains("after liba:"));
    assert!(stdout.contains("appb build-requires liba-devel, provided by liba-1.0-1.x86_64"));
    assert!(stdout.contains("<no build-after dependencies in batch>"));
}

#[test]
fn test_order_detects_cycles() {
    let project = TestProject::new();
    project.create_script("resolver.sh", RESOLVER_SCRIPT);
    project.create_file(
        "packforge.toml",
        &manifest(
            r#"[[package]]
name = "liba"
requirements = ["appb-devel"]
artifact = "liba-1.0-1.src.rpm"

[[package]]
name = "appb"
requirements = ["liba-devel"]
artifact = "appb-2.0-1.src.rpm"
"#,
        ),
    );

    let output = project.run_packforge(&["order"]);
    assert!(!output.status.success(), "cycle must fail the command");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Found cycle"), "stderr: {stderr}");
    assert!(stderr.contains('\u{21d2}'), "stderr: {stderr}");
    assert!(stderr.contains("build-requires"), "stderr: {stderr}");
}

#[test]
fn test_order_fails_when_resolver_fails() {
    let project = TestProject::new();
    project.create_script("resolver.sh", "echo resolver exploded >&2\nexit 1\n");
    project.create_file(
        "packforge.toml",
        &manifest(
            r#"[[package]]
name = "liba"
requirements = ["something"]
artifact = "liba-1.0-1.src.rpm"
"#,
        ),
    );

    let output = project.run_packforge(&["order"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("resolver exploded"), "stderr: {stderr}");
}

#[test]
fn test_missing_manifest_is_reported() {
    let project = TestProject::new();
    let output = project.run_packforge(&["order"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("not found"), "stderr: {stderr}");
}
