use anyhow::Result;
use assert_fs::prelude::*;
use indoc::indoc;

use common::{TestContext, stderr, stdout};

mod common;

/// Redact resolution timings.
fn filters() -> Vec<(&'static str, &'static str)> {
    vec![(r"in \d+(\.\d+)?(ms|s|m \d+s)", "in [TIME]")]
}

#[test]
fn lock_and_check() -> Result<()> {
    let context = TestContext::new();

    let output = context.lock().output()?;
    assert!(output.status.success(), "{}", stderr(&output));
    insta::with_settings!({ filters => filters() }, {
        insta::assert_snapshot!(stderr(&output), @r"
        Resolved 4 packages in [TIME]
        Added attrs v20.3.0
        Added markdown-it-py v0.6.1
        Added mdit-py-plugins v0.2.4
        Added pywin32 v306
        ");
    });

    let lock = context.read("tether.lock");
    assert!(lock.contains(indoc! {r#"
        [[package]]
        name = "attrs"
        version = "20.3.0"
        description = ""
        category = "main"
        optional = false
        python-versions = "*"
    "#}));
    assert!(lock.contains(r#"markers = "sys_platform == 'win32'""#));
    assert!(lock.contains(r#"lock-version = "2.0""#));

    let output = context.command("check").output()?;
    assert!(output.status.success());
    assert_eq!(stderr(&output), "Lock file is up to date\n");

    // Relocking a fresh lock is a no-op.
    let output = context.lock().output()?;
    assert!(output.status.success());
    assert_eq!(stderr(&output), "");
    assert_eq!(context.read("tether.lock"), lock);

    Ok(())
}

#[test]
fn stale() -> Result<()> {
    let context = TestContext::new();
    context.lock().assert().success();

    context.temp_dir.child("tether.toml").write_str(
        &common::MANIFEST.replace(r#""~=0.6.1""#, r#"">=0.6.0,<0.7""#),
    )?;

    let output = context.command("check").output()?;
    assert_eq!(output.status.code(), Some(1));
    assert!(
        stderr(&output).starts_with("The lock file is out of date with the project requirements")
    );

    let output = context.lock().arg("--locked").output()?;
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("but `--locked` was provided"));

    // The locked versions still satisfy the new requirements, so only the content-hash changes.
    let before = context.read("tether.lock");
    let output = context.lock().output()?;
    assert!(output.status.success());
    insta::with_settings!({ filters => filters() }, {
        insta::assert_snapshot!(stderr(&output), @"Resolved 4 packages in [TIME]");
    });
    assert_ne!(context.read("tether.lock"), before);

    context.command("check").assert().success();

    Ok(())
}

#[test]
fn locked_without_lock() -> Result<()> {
    let context = TestContext::new();

    let output = context.lock().arg("--locked").output()?;
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).starts_with("Unable to find lock file at"));
    context.temp_dir.child("tether.lock").assert(predicates::path::missing());

    Ok(())
}

#[test]
fn malformed_lock() -> Result<()> {
    let context = TestContext::new();
    let lock = context.temp_dir.child("tether.lock");
    lock.write_str("this is [not valid toml")?;

    // A malformed lock is an error, and the file is left for the user to inspect.
    let output = context.lock().output()?;
    assert_eq!(output.status.code(), Some(2));
    assert!(
        stderr(&output).starts_with("error: Failed to parse lock file"),
        "{}",
        stderr(&output)
    );
    assert_eq!(context.read("tether.lock"), "this is [not valid toml");

    let output = context.lock().arg("--dry-run").output()?;
    assert_eq!(output.status.code(), Some(2));
    assert_eq!(context.read("tether.lock"), "this is [not valid toml");

    Ok(())
}

#[test]
fn dry_run() -> Result<()> {
    let context = TestContext::new();

    let output = context.lock().arg("--dry-run").output()?;
    assert!(output.status.success());
    assert!(stderr(&output).contains("Added markdown-it-py v0.6.1"));
    context.temp_dir.child("tether.lock").assert(predicates::path::missing());

    context.lock().assert().success();
    let output = context.lock().arg("--dry-run").output()?;
    assert!(output.status.success());
    assert_eq!(stderr(&output), "No lock file changes detected\n");

    Ok(())
}

#[test]
fn upgrade_package() -> Result<()> {
    let context = TestContext::new();
    context.lock().assert().success();

    // Publish a newer `attrs`.
    let index = common::index(common::ATTRS_ARCHIVE)
        .replace(r#""21.2.0": {}"#, r#""20.4.0": {}, "21.2.0": {}"#);
    context.temp_dir.child("index.json").write_str(&index)?;

    // The lock is fresh, so it's kept.
    let output = context.lock().output()?;
    assert!(output.status.success());
    assert_eq!(stderr(&output), "");

    let output = context
        .lock()
        .arg("--upgrade-package")
        .arg("attrs")
        .output()?;
    assert!(output.status.success());
    insta::with_settings!({ filters => filters() }, {
        insta::assert_snapshot!(stderr(&output), @r"
        Resolved 4 packages in [TIME]
        Updated attrs v20.3.0 -> v20.4.0
        ");
    });
    assert!(context.read("tether.lock").contains(r#"version = "20.4.0""#));

    Ok(())
}

#[test]
fn target_environment() -> Result<()> {
    let context = TestContext::new();
    context.temp_dir.child("linux.json").write_str(indoc! {r##"
        {
            "implementation_name": "cpython",
            "implementation_version": "3.8.10",
            "os_name": "posix",
            "platform_machine": "x86_64",
            "platform_python_implementation": "CPython",
            "platform_release": "5.15.0",
            "platform_system": "Linux",
            "platform_version": "#1 SMP",
            "python_full_version": "3.8.10",
            "python_version": "3.8",
            "sys_platform": "linux"
        }
    "##})?;

    let output = context.lock().arg("--target").arg("linux.json").output()?;
    assert!(output.status.success(), "{}", stderr(&output));
    assert!(!stderr(&output).contains("pywin32"));

    // The Windows-only edge is still recorded.
    let lock = context.read("tether.lock");
    assert!(lock.contains(r#"pywin32 = { version = ">=300", markers = "sys_platform == 'win32'" }"#));
    assert!(!lock.contains(r#"name = "pywin32""#));

    Ok(())
}

#[test]
fn unsatisfiable() -> Result<()> {
    let context = TestContext::new();
    context.temp_dir.child("tether.toml").write_str(&common::MANIFEST.replace(
        r#"markdown-it-py = "~=0.6.1""#,
        indoc! {r#"
            markdown-it-py = "==0.6.1"
            attrs = ">=21"
        "#},
    ))?;

    let output = context.lock().output()?;
    assert_eq!(output.status.code(), Some(1));
    assert!(
        stderr(&output).starts_with("error: No solution found when resolving dependencies:"),
        "{}",
        stderr(&output)
    );
    assert!(stderr(&output).contains("`attrs`"));
    context.temp_dir.child("tether.lock").assert(predicates::path::missing());

    Ok(())
}

#[test]
fn missing_index() -> Result<()> {
    let context = TestContext::new();
    context
        .temp_dir
        .child("tether.toml")
        .write_str(&common::MANIFEST.replace(r#"index = "index.json""#, ""))?;

    let output = context.lock().output()?;
    assert_eq!(output.status.code(), Some(2));
    assert_eq!(
        stderr(&output),
        "error: No package index configured; pass `--index` or set `index` in `[tool.tether]`\n"
    );

    // An explicit index works.
    context.lock().arg("--index").arg("index.json").assert().success();

    Ok(())
}

#[test]
fn missing_manifest() -> Result<()> {
    let temp_dir = assert_fs::TempDir::new()?;
    let output = assert_cmd::Command::new(env!("CARGO_BIN_EXE_tether"))
        .arg("check")
        .current_dir(temp_dir.path())
        .env_remove("TETHER_PROJECT")
        .output()?;
    assert_eq!(output.status.code(), Some(2));
    assert!(stderr(&output).starts_with("error: No `tether.toml` found in"));

    Ok(())
}

#[test]
fn tree() -> Result<()> {
    let context = TestContext::new();

    let output = context.command("tree").output()?;
    assert_eq!(output.status.code(), Some(1));

    context.lock().assert().success();

    let output = context.command("tree").output()?;
    assert!(output.status.success());
    insta::assert_snapshot!(stdout(&output), @r"
    markdown-it-py v0.6.1
    ├── attrs v20.3.0
    ├── mdit-py-plugins v0.2.4
    │   └── markdown-it-py v0.6.1 (*)
    └── pywin32 v306 ; sys_platform == 'win32'
    (*) Package tree already displayed
    ");

    let output = context.command("tree").arg("--depth").arg("0").output()?;
    assert_eq!(stdout(&output), "markdown-it-py v0.6.1\n");

    Ok(())
}
