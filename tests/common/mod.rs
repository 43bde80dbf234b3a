//! Common test utilities and helpers
//!
//! Sets up temporary batch projects with stub external commands so the
//! packforge binary can run end to end without the real tools.

#![allow(dead_code)]

use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::process::{Command, Output};

use tempfile::TempDir;

/// Temporary project directory for one test.
pub struct TestProject {
    /// Temporary directory holding manifest, scripts and build output
    pub dir: TempDir,
}

impl TestProject {
    /// Create a new empty test project.
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp directory"),
        }
    }

    /// Path of the project directory.
    pub fn path(&self) -> PathBuf {
        self.dir.path().to_path_buf()
    }

    /// Create a file in the project.
    pub fn create_file(&self, name: &str, content: &str) {
        let path = self.dir.path().join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create parent directories");
        }
        std::fs::write(path, content).expect("Failed to write file");
    }

    /// Create an executable script in the project.
    pub fn create_script(&self, name: &str, body: &str) {
        let path = self.dir.path().join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{body}")).expect("Failed to write script");
        let mut permissions = std::fs::metadata(&path)
            .expect("Failed to stat script")
            .permissions();
        permissions.set_mode(0o755);
        std::fs::set_permissions(&path, permissions).expect("Failed to chmod script");
    }

    /// Check whether a file exists in the project.
    pub fn file_exists(&self, name: &str) -> bool {
        self.dir.path().join(name).exists()
    }

    /// Run the packforge binary in the project directory.
    pub fn run_packforge(&self, args: &[&str]) -> Output {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_packforge"));
        cmd.current_dir(self.path());
        cmd.args(args);
        cmd.output().expect("Failed to execute packforge")
    }
}

impl Default for TestProject {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolver stub answering by requirement expression.
///
/// `liba-devel` resolves to liba, `appb-devel` to appb; anything else
/// resolves to nothing.
pub const RESOLVER_SCRIPT: &str = r#"case "$1" in
  liba-devel)
    echo '{"liba": [{"name": "liba-1.0-1", "explanation": ["liba-devel", "liba-1.0-1.x86_64"]}]}'
    ;;
  appb-devel)
    echo '{"appb": [{"name": "appb-2.0-1", "explanation": ["appb-devel", "appb-2.0-1.x86_64"]}]}'
    ;;
  *)
    echo '{}'
    ;;
esac
"#;

/// Sandbox stub handling --rebuild, --clean and --print-root.
pub const SANDBOX_SCRIPT: &str = r#"mode=""
resultdir=""
uniq=""
prev=""
for arg in "$@"; do
  case "$prev" in
    --resultdir) resultdir="$arg" ;;
    --uniqueext) uniq="$arg" ;;
  esac
  case "$arg" in
    --rebuild) mode=rebuild ;;
    --clean) mode=clean ;;
    --print-root) mode=printroot ;;
  esac
  prev="$arg"
done
case "$mode" in
  rebuild)
    printf 'Start: build setup\nFinish: build setup\nStart: rpmbuild\nFinish: rpmbuild\n' > "$resultdir/state.log"
    touch "$resultdir/$(basename "$resultdir")-1.0-1.rpm"
    exit 0
    ;;
  printroot)
    echo "/var/lib/sandbox/root-$uniq"
    exit 0
    ;;
esac
exit 0
"#;

/// Sandbox stub whose builds always fail.
pub const FAILING_SANDBOX_SCRIPT: &str = r#"mode=""
uniq=""
prev=""
for arg in "$@"; do
  case "$prev" in
    --uniqueext) uniq="$arg" ;;
  esac
  case "$arg" in
    --rebuild) mode=rebuild ;;
    --print-root) mode=printroot ;;
  esac
  prev="$arg"
done
case "$mode" in
  rebuild) exit 1 ;;
  printroot) echo "/var/lib/sandbox/root-$uniq"; exit 0 ;;
esac
exit 0
"#;

/// Index stub creating a minimal repodata directory.
pub const INDEX_SCRIPT: &str = r#"repo="$1"
mkdir -p "$repo/repodata"
touch "$repo/repodata/repomd.xml"
exit 0
"#;

/// Packaging stub printing a Wrote: line like the real tool.
pub const PACKAGE_SCRIPT: &str = r#"echo "Wrote: $PWD/packaged-1.0-1.src.rpm"
exit 0
"#;
