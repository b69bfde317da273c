use anyhow::Result;
use assert_fs::prelude::*;

use common::{ATTRS_ARCHIVE, TestContext, stderr};

mod common;

#[test]
fn verify_index() -> Result<()> {
    let context = TestContext::new();

    let output = context.command("verify").output()?;
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).starts_with("No lock file found at"));

    context.lock().assert().success();

    let output = context.command("verify").output()?;
    assert!(output.status.success(), "{}", stderr(&output));
    assert!(stderr(&output).starts_with("Verified 1 locked file against"));

    // The index now publishes a different archive under the same name.
    context
        .temp_dir
        .child("index.json")
        .write_str(&common::index("a different archive"))?;

    let output = context.command("verify").output()?;
    assert_eq!(output.status.code(), Some(1));
    assert!(
        stderr(&output)
            .starts_with("error: Hash mismatch for `attrs-20.3.0.tar.gz` of `attrs==20.3.0`"),
        "{}",
        stderr(&output)
    );

    Ok(())
}

#[test]
fn verify_artifacts() -> Result<()> {
    let context = TestContext::new();
    context.lock().assert().success();

    let dist = context.temp_dir.child("dist");
    dist.create_dir_all()?;
    dist.child("attrs-20.3.0.tar.gz").write_str(ATTRS_ARCHIVE)?;

    let output = context
        .command("verify")
        .arg("--artifacts")
        .arg("dist")
        .output()?;
    assert!(output.status.success(), "{}", stderr(&output));
    assert!(stderr(&output).contains("Verified 1 artifact in `dist`"));

    dist.child("attrs-20.3.0.tar.gz")
        .write_str("a tampered archive")?;

    let output = context
        .command("verify")
        .arg("--artifacts")
        .arg("dist")
        .output()?;
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("error: Hash mismatch for `attrs-20.3.0.tar.gz`"));

    Ok(())
}

#[test]
fn verify_missing_index() -> Result<()> {
    let context = TestContext::new();
    context.lock().assert().success();

    let output = context
        .command("verify")
        .arg("--index")
        .arg("missing.json")
        .output()?;
    assert_eq!(output.status.code(), Some(2));
    assert!(stderr(&output).starts_with("error: Failed to read index file: `missing.json`"));

    Ok(())
}
