//! Convert [`VersionSpecifiers`] to [`Ranges`].

use version_ranges::Ranges;

use crate::{Operator, Version, VersionSpecifier, VersionSpecifiers};

impl From<VersionSpecifiers> for Ranges<Version> {
    /// The intersection of every specifier's range, using PEP 440 semantics.
    fn from(specifiers: VersionSpecifiers) -> Self {
        specifiers
            .into_iter()
            .fold(Self::full(), |range, specifier| {
                range.intersection(&Self::from(specifier))
            })
    }
}

impl From<VersionSpecifier> for Ranges<Version> {
    /// Convert the [`VersionSpecifier`] to a version range, using PEP 440 semantics.
    ///
    /// Exclusive bounds are expressed with the internal `min` and `max` sentinels so that, e.g.,
    /// `<2.0` excludes `2.0.dev0` and `>2.0` excludes `2.0.post1`.
    fn from(specifier: VersionSpecifier) -> Self {
        let VersionSpecifier { operator, version } = specifier;
        match operator {
            Operator::Equal => {
                if version.is_local() {
                    Self::singleton(version)
                } else {
                    let high = version.clone().with_local_max();
                    Self::from_range_bounds(version..=high)
                }
            }
            Operator::ExactEqual => Self::singleton(version),
            Operator::NotEqual => Self::from(VersionSpecifier {
                operator: Operator::Equal,
                version,
            })
            .complement(),
            Operator::TildeEqual => {
                let release = version.release();
                let Some((_, prefix)) = release.split_last() else {
                    return Self::higher_than(version);
                };
                let upper = version.bump_release(prefix.len().saturating_sub(1)).with_min();
                Self::from_range_bounds(version..upper)
            }
            Operator::LessThan => {
                // "The exclusive ordered comparison <V MUST NOT allow a pre-release of the
                // specified version unless the specified version is itself a pre-release."
                if version.any_prerelease() {
                    Self::strictly_lower_than(version)
                } else if version.is_post() {
                    // `<1.0.post2`: everything below `1.0`'s pre-releases, then `[1.0, V)`.
                    let base = version.clone().with_post(None);
                    let lower = Self::strictly_lower_than(base.clone().with_min());
                    lower.union(&Self::from_range_bounds(base..version))
                } else {
                    Self::strictly_lower_than(version.with_min())
                }
            }
            Operator::LessThanEqual => Self::lower_than(version.with_local_max()),
            Operator::GreaterThan => {
                // "The exclusive ordered comparison >V MUST NOT allow a post-release of the given
                // version unless V itself is a post release."
                if let Some(dev) = version.dev() {
                    Self::higher_than(version.with_dev(Some(dev + 1)))
                } else if let Some(post) = version.post() {
                    Self::higher_than(version.with_post(Some(post + 1)))
                } else {
                    Self::strictly_higher_than(version.with_max())
                }
            }
            Operator::GreaterThanEqual => Self::higher_than(version),
            Operator::EqualStar => wildcard_range(version),
            Operator::NotEqualStar => wildcard_range(version).complement(),
        }
    }
}

/// `==1.2.*` covers everything from the first dev release of `1.2` up to, but excluding, the
/// first dev release of `1.3`.
fn wildcard_range(version: Version) -> Ranges<Version> {
    let index = version.release().len().saturating_sub(1);
    let high = version.bump_release(index).with_min();
    let low = version.with_min();
    Ranges::from_range_bounds(low..high)
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use version_ranges::Ranges;

    use crate::{Version, VersionSpecifier};

    const VERSIONS: &[&str] = &[
        "0.9",
        "0.9.post1",
        "1.0.dev0",
        "1.0a1",
        "1.0rc1",
        "1.0",
        "1.0+local.7",
        "1.0.post1",
        "1.0.1",
        "1.1.dev1",
        "1.1",
        "1.4.2",
        "1.4.9",
        "1.5.0a1",
        "1.5.0",
        "2.0",
        "1!0.1",
    ];

    const SPECIFIERS: &[&str] = &[
        "==1.0",
        "!=1.0",
        "==1.0+local.7",
        "<1.0",
        "<=1.0",
        ">1.0",
        ">=1.0",
        "<1.0rc1",
        "~=1.4.2",
        "~=1.0",
        "==1.0.*",
        "!=1.0.*",
        ">0.9.post1",
        "<1.0.post1",
    ];

    /// The range of a specifier agrees with its direct evaluation.
    #[test]
    fn ranges_agree_with_contains() {
        for specifier in SPECIFIERS {
            let specifier = VersionSpecifier::from_str(specifier).unwrap();
            let range = Ranges::from(specifier.clone());
            for version in VERSIONS {
                let version = Version::from_str(version).unwrap();
                assert_eq!(
                    range.contains(&version),
                    specifier.contains(&version),
                    "{specifier} {version}"
                );
            }
        }
    }
}
