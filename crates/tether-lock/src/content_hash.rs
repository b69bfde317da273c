use std::fmt::Write;

use tether_pypi_types::{Dependency, HashDigest};
use tether_resolver::Manifest;

/// Compute the content-hash of a manifest: the SHA-256 of its canonical form, in hex.
///
/// The canonical form lists the requirements sorted by name, with normalized names, extras, and
/// constraint spellings, so reordering or respelling the manifest doesn't change the hash.
pub fn content_hash(manifest: &Manifest) -> String {
    HashDigest::sha256(canonical(manifest)).digest.into_string()
}

fn canonical(manifest: &Manifest) -> String {
    let mut text = String::new();
    let _ = writeln!(text, "python-versions = {}", manifest.python_versions());

    text.push_str("[dependencies]\n");
    write_requirements(&mut text, manifest.dependencies());

    text.push_str("[dev-dependencies]\n");
    write_requirements(&mut text, manifest.dev_dependencies());

    text.push_str("[extras]\n");
    for (extra, names) in manifest.extras() {
        let mut names: Vec<&str> = names.iter().map(AsRef::as_ref).collect();
        names.sort_unstable();
        names.dedup();
        let _ = writeln!(text, "{extra} = {}", names.join(","));
    }
    text
}

fn write_requirements(text: &mut String, dependencies: &[Dependency]) {
    let mut lines: Vec<String> = dependencies
        .iter()
        .map(|dependency| {
            let mut requirement = dependency.to_requirement();
            requirement.extras.sort();
            requirement.extras.dedup();
            if dependency.optional {
                format!("{requirement} ; optional")
            } else {
                requirement.to_string()
            }
        })
        .collect();
    lines.sort();
    for line in lines {
        text.push_str(&line);
        text.push('\n');
    }
}
