use std::collections::BTreeMap;
use std::str::FromStr;

use anyhow::Result;
use indoc::indoc;

use tether_lock::{Lock, LockChange, StaleLock, TreeDisplay, VerifyError, diff, verify_lock};
use tether_normalize::PackageName;
use tether_pep440::VersionConstraint;
use tether_pep508::{MarkerEnvironment, MarkerEnvironmentBuilder, Requirement};
use tether_pypi_types::Dependency;
use tether_resolver::{
    InMemoryIndex, Manifest, Options, OptionsBuilder, Preferences, Resolver, ResolverEnvironment,
    StaticIndex,
};

const INDEX: &str = indoc! {r#"
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
                },
                "files": [
                    {
                        "file": "markdown_it_py-0.6.1.tar.gz",
                        "hash": "sha256:3a2d0bf9d5d2ea6d1f5ee0e4f9f0f8d93e24e3c8e4f4a95d7e3d5ed2b5b1a6c3"
                    },
                    {
                        "file": "markdown_it_py-0.6.1-py3-none-any.whl",
                        "hash": "sha256:7b5e6b1bd3ec5fdb7f8e25ff21fc16ec4e0ae6d9d93dc0fd8a84dc7dd2c5ab75"
                    }
                ]
            }
        },
        "attrs": {
            "19.3.0": {},
            "20.3.0": {
                "description": "Classes Without Boilerplate",
                "files": [{
                    "file": "attrs-20.3.0.tar.gz",
                    "hash": "sha256:832aa3cde19744e49938b91fea06d69ecb9e649c93ba974535d08ad92164f700"
                }]
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
"#};

fn manifest(requirements: &[&str]) -> Manifest {
    Manifest::new(
        requirements
            .iter()
            .map(|requirement| Dependency::from(Requirement::from_str(requirement).unwrap()))
            .collect(),
        Vec::new(),
        VersionConstraint::from_str("^3.7").unwrap(),
        BTreeMap::new(),
    )
}

fn linux() -> MarkerEnvironment {
    MarkerEnvironment::try_from(MarkerEnvironmentBuilder {
        implementation_name: "cpython",
        implementation_version: "3.8.10",
        os_name: "posix",
        platform_machine: "x86_64",
        platform_python_implementation: "CPython",
        platform_release: "5.15.0",
        platform_system: "Linux",
        platform_version: "#1 SMP",
        python_full_version: "3.8.10",
        python_version: "3.8",
        sys_platform: "linux",
    })
    .unwrap()
}

async fn lock(manifest: &Manifest, options: Options, index: &str) -> Result<Lock> {
    let provider = StaticIndex::from_str(index)?;
    let graph = Resolver::new(
        manifest.clone(),
        options,
        Preferences::default(),
        &InMemoryIndex::default(),
        provider,
    )
    .resolve()
    .await?;
    Ok(Lock::from_resolution(&graph, manifest)?)
}

fn name(name: &str) -> PackageName {
    PackageName::from_str(name).unwrap()
}

#[tokio::test]
async fn deterministic_round_trip() -> Result<()> {
    let manifest = manifest(&["markdown-it-py ~=0.6.1"]);
    let options = OptionsBuilder::new()
        .environment(ResolverEnvironment::specific(linux()))
        .build();

    let first = lock(&manifest, options.clone(), INDEX).await?;
    let second = lock(&manifest, options, INDEX).await?;
    let text = first.to_toml();
    assert_eq!(text, second.to_toml());

    let names: Vec<&str> = first
        .packages()
        .iter()
        .map(|package| package.name.as_ref())
        .collect();
    assert_eq!(names, ["attrs", "markdown-it-py", "mdit-py-plugins"]);

    // The Windows-only edge is recorded, though it took no part in the resolution.
    assert!(text.contains(r#"pywin32 = { version = ">=300", markers = "sys_platform == 'win32'" }"#));
    assert!(text.contains(r#"mdit-py-plugins = ">=0.2.1,<0.3.0""#));
    assert!(text.contains(r#"lock-version = "2.0""#));
    assert!(text.contains(&format!(
        r#"content-hash = "{}""#,
        tether_lock::content_hash(&manifest)
    )));
    assert!(text.contains(indoc! {r#"
        attrs = [
            { file = "attrs-20.3.0.tar.gz", hash = "sha256:832aa3cde19744e49938b91fea06d69ecb9e649c93ba974535d08ad92164f700" },
        ]
    "#}));

    // Files are sorted by name.
    let wheel = text.find("markdown_it_py-0.6.1-py3-none-any.whl").unwrap();
    let sdist = text.find("markdown_it_py-0.6.1.tar.gz").unwrap();
    assert!(wheel < sdist);

    let read = Lock::from_toml(&text)?;
    assert_eq!(read, first);
    assert_eq!(read.to_toml(), text);

    let markdown_it = read.find(&name("markdown-it-py")).unwrap();
    assert_eq!(markdown_it.version.to_string(), "0.6.1");
    assert_eq!(markdown_it.description, "Python port of markdown-it");
    assert_eq!(markdown_it.dependencies.len(), 3);
    assert!(read.find(&name("pywin32")).is_none());

    Ok(())
}

#[tokio::test]
async fn universal_markers() -> Result<()> {
    let manifest = manifest(&["markdown-it-py ~=0.6.1"]);
    let lock = lock(&manifest, Options::default(), INDEX).await?;

    let pywin32 = lock.find(&name("pywin32")).unwrap();
    assert_eq!(
        pywin32.markers.try_to_string().as_deref(),
        Some("sys_platform == 'win32'")
    );
    assert!(
        lock.to_toml()
            .contains(r#"markers = "sys_platform == 'win32'""#)
    );

    Ok(())
}

#[tokio::test]
async fn staleness() -> Result<()> {
    let original = manifest(&["markdown-it-py ~=0.6.1"]);
    let lock = lock(&original, Options::default(), INDEX).await?;

    assert_eq!(lock.check_fresh(&original), Ok(()));
    // Respelling a name doesn't change the requirements.
    assert_eq!(lock.check_fresh(&manifest(&["Markdown_It_Py ~=0.6.1"])), Ok(()));

    let changed = manifest(&["markdown-it-py ~=0.6.0"]);
    let StaleLock { locked, current } = lock.check_fresh(&changed).unwrap_err();
    assert_eq!(locked, lock.metadata().content_hash);
    assert_eq!(current, tether_lock::content_hash(&changed));

    Ok(())
}

#[tokio::test]
async fn targeted_update() -> Result<()> {
    let manifest = manifest(&["markdown-it-py ~=0.6.1"]);
    let before = lock(&manifest, Options::default(), INDEX).await?;

    let preferences = before.preferences();
    assert_eq!(preferences.len(), 4);
    assert_eq!(
        preferences.get(&name("attrs")).map(ToString::to_string),
        Some("20.3.0".to_string())
    );

    // Relock with a newer `attrs` published: the lock keeps the old version.
    let index = INDEX.replace(r#""21.2.0": {}"#, r#""20.4.0": {}, "21.2.0": {}"#);
    let graph = Resolver::new(
        manifest.clone(),
        Options::default(),
        preferences,
        &InMemoryIndex::default(),
        StaticIndex::from_str(&index)?,
    )
    .resolve()
    .await?;
    let after = Lock::from_resolution(&graph, &manifest)?;
    assert!(diff(Some(&before), &after).is_empty());

    // Without preferences, `attrs` moves.
    let updated = lock(&manifest, Options::default(), &index).await?;
    let changes: Vec<String> = diff(Some(&before), &updated)
        .iter()
        .map(ToString::to_string)
        .collect();
    assert_eq!(changes, ["Updated attrs v20.3.0 -> v20.4.0"]);

    let added = diff(None, &updated);
    assert_eq!(added.len(), 4);
    assert!(matches!(added[0], LockChange::Added { .. }));

    Ok(())
}

#[tokio::test]
async fn verification() -> Result<()> {
    let manifest = manifest(&["markdown-it-py ~=0.6.1"]);
    let lock = lock(&manifest, Options::default(), INDEX).await?;

    verify_lock(&lock, &StaticIndex::from_str(INDEX)?).await?;

    let tampered = INDEX.replace(
        "832aa3cde19744e49938b91fea06d69ecb9e649c93ba974535d08ad92164f700",
        "0000000000000000000000000000000000000000000000000000000000000000",
    );
    let err = verify_lock(&lock, &StaticIndex::from_str(&tampered)?)
        .await
        .unwrap_err();
    assert!(matches!(err, VerifyError::Mismatch(_)));
    assert!(
        err.to_string()
            .starts_with("Hash mismatch for `attrs-20.3.0.tar.gz` of `attrs==20.3.0`")
    );

    Ok(())
}

#[tokio::test]
async fn commit_and_read() -> Result<()> {
    let manifest = manifest(&["markdown-it-py ~=0.6.1"]);
    let lock = lock(&manifest, Options::default(), INDEX).await?;

    let dir = tempfile::tempdir()?;
    let path = dir.path().join("tether.lock");
    assert!(tether_lock::read(&path).await?.is_none());

    let _guard = tether_lock::acquire(&path).await?;
    assert!(tether_lock::commit(&path, &lock).await?);
    // Unchanged contents aren't rewritten.
    assert!(!tether_lock::commit(&path, &lock).await?);

    let read = tether_lock::read(&path).await?.unwrap();
    assert_eq!(read, lock);

    Ok(())
}

#[tokio::test]
async fn tree() -> Result<()> {
    let manifest = manifest(&["markdown-it-py ~=0.6.1"]);
    let lock = lock(&manifest, Options::default(), INDEX).await?;

    let roots = lock.roots(&manifest).collect();
    let tree = TreeDisplay::new(&lock, roots, usize::MAX).to_string();
    insta::assert_snapshot!(tree, @r"
    markdown-it-py v0.6.1
    ├── attrs v20.3.0
    ├── mdit-py-plugins v0.2.4
    │   └── markdown-it-py v0.6.1 (*)
    └── pywin32 v306 ; sys_platform == 'win32'
    (*) Package tree already displayed
    ");

    Ok(())
}

#[test]
fn malformed() {
    let duplicate = indoc! {r#"
        [[package]]
        name = "attrs"
        version = "20.3.0"
        category = "main"

        [[package]]
        name = "Attrs"
        version = "21.2.0"
        category = "main"

        [metadata]
        lock-version = "2.0"
        content-hash = "abc"
    "#};
    let err = Lock::from_toml(duplicate).unwrap_err();
    assert!(format!("{:?}", anyhow::Error::from(err)).contains("Found duplicate package `attrs`"));

    let dangling = indoc! {r#"
        [[package]]
        name = "markdown-it-py"
        version = "0.6.1"
        category = "main"

        [package.dependencies]
        attrs = ">=19,<21"
        pywin32 = { version = ">=300", markers = "sys_platform == 'win32'" }

        [metadata]
        lock-version = "2.0"
        content-hash = "abc"
    "#};
    let err = Lock::from_toml(dangling).unwrap_err();
    assert!(
        format!("{:?}", anyhow::Error::from(err))
            .contains("found dependency `attrs` with no locked package")
    );

    let bad_hash = indoc! {r#"
        [metadata]
        lock-version = "2.0"
        content-hash = "abc"

        [metadata.files]
        attrs = [{ file = "attrs-20.3.0.tar.gz", hash = "md5:abc" }]
    "#};
    assert!(Lock::from_toml(bad_hash).is_err());

    let future = indoc! {r#"
        [metadata]
        lock-version = "3.0"
        content-hash = "abc"
    "#};
    let err = Lock::from_toml(future).unwrap_err();
    assert!(format!("{:?}", anyhow::Error::from(err)).contains("format 3.0"));

    let empty = indoc! {r#"
        [metadata]
        lock-version = "2.0"
        python-versions = "^3.7"
        content-hash = "abc"
    "#};
    let lock = Lock::from_toml(empty).unwrap();
    assert!(lock.packages().is_empty());
}
