#![allow(dead_code)]

use assert_cmd::Command;
use assert_fs::fixture::{FileWriteStr, PathChild};

pub(crate) const MANIFEST: &str = r#"
[project]
name = "demo"
python-versions = "^3.7"

[dependencies]
markdown-it-py = "~=0.6.1"

[tool.tether]
index = "index.json"
"#;

pub(crate) const INDEX: &str = r#"
{
    "markdown-it-py": {
        "0.6.0": {"dependencies": {"attrs": ">=19,<21", "mdit-py-plugins": ">=0.2.1,<0.3.0"}},
        "0.6.1": {
            "description": "Python port of markdown-it",
            "python-versions": "~=3.6",
            "dependencies": {
                "attrs": ">=19,<21",
                "mdit-py-plugins": ">=0.2.1,<0.3.0",
                "pywin32": {"version": ">=300", "markers": "sys_platform == 'win32'"}
            }
        }
    },
    "attrs": {
        "19.3.0": {},
        "20.3.0": {
            "files": [{"file": "attrs-20.3.0.tar.gz", "hash": "[ATTRS_HASH]"}]
        },
        "21.2.0": {}
    },
    "mdit-py-plugins": {
        "0.2.1": {},
        "0.2.4": {"dependencies": {"markdown-it-py": ">=0.5.0,<2.0.0"}},
        "0.3.0": {}
    },
    "pywin32": {"306": {}}
}
"#;

/// The contents of the `attrs` archive the index publishes a hash for.
pub(crate) const ATTRS_ARCHIVE: &str = "attrs-20.3.0 source archive";

/// A project directory with a manifest and an offline index.
pub(crate) struct TestContext {
    pub(crate) temp_dir: assert_fs::TempDir,
}

impl TestContext {
    pub(crate) fn new() -> Self {
        let temp_dir = assert_fs::TempDir::new().unwrap();
        temp_dir.child("tether.toml").write_str(MANIFEST).unwrap();
        temp_dir
            .child("index.json")
            .write_str(&index(ATTRS_ARCHIVE))
            .unwrap();
        Self { temp_dir }
    }

    /// A `tether` command running in the project directory, isolated from the environment.
    pub(crate) fn command(&self, subcommand: &str) -> Command {
        let mut command = Command::new(env!("CARGO_BIN_EXE_tether"));
        command
            .arg(subcommand)
            .current_dir(self.temp_dir.path())
            .env_remove("RUST_LOG")
            .env_remove("TETHER_PROJECT")
            .env_remove("TETHER_INDEX")
            .env_remove("TETHER_RESOLUTION")
            .env_remove("TETHER_PRERELEASE")
            .env_remove("TETHER_TARGET");
        command
    }

    pub(crate) fn lock(&self) -> Command {
        self.command("lock")
    }

    pub(crate) fn read(&self, name: &str) -> String {
        fs_err::read_to_string(self.temp_dir.child(name).path()).unwrap()
    }
}

/// The index, publishing the hash of the given `attrs` archive contents.
pub(crate) fn index(attrs_archive: &str) -> String {
    INDEX.replace(
        "[ATTRS_HASH]",
        &tether_pypi_types::HashDigest::sha256(attrs_archive).to_string(),
    )
}

pub(crate) fn stdout(output: &std::process::Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

pub(crate) fn stderr(output: &std::process::Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}
