use tracing::trace;
use version_ranges::Ranges;

use tether_normalize::PackageName;
use tether_pep440::Version;

use crate::prerelease::{AllowPrerelease, PrereleaseStrategy};
use crate::resolution_mode::ResolutionStrategy;
use crate::{Manifest, Options, Preferences};

/// Orders the published versions of a package into the sequence the search tries them in.
#[derive(Debug, Clone)]
pub(crate) struct CandidateSelector {
    resolution_strategy: ResolutionStrategy,
    prerelease_strategy: PrereleaseStrategy,
}

impl CandidateSelector {
    /// Return a [`CandidateSelector`] for the given [`Manifest`].
    pub(crate) fn for_resolution(options: &Options, manifest: &Manifest) -> Self {
        Self {
            resolution_strategy: ResolutionStrategy::from_mode(options.resolution_mode, manifest),
            prerelease_strategy: PrereleaseStrategy::from_mode(options.prerelease_mode, manifest),
        }
    }

    /// The versions inside `range` that the pre-release policy admits, in search order: the
    /// preferred version first, then newest-first (or oldest-first for lowest resolution).
    ///
    /// `versions` must be sorted in ascending order.
    pub(crate) fn candidates(
        &self,
        name: &PackageName,
        versions: &[Version],
        range: &Ranges<Version>,
        preferences: &Preferences,
    ) -> Vec<Version> {
        let in_range = || versions.iter().filter(|version| range.contains(version));

        let mut candidates: Vec<Version> = match self.prerelease_strategy.allows(name) {
            AllowPrerelease::Yes => in_range().cloned().collect(),
            AllowPrerelease::No => in_range()
                .filter(|version| !version.any_prerelease())
                .cloned()
                .collect(),
            AllowPrerelease::IfNecessary => {
                let stable: Vec<Version> = in_range()
                    .filter(|version| !version.any_prerelease())
                    .cloned()
                    .collect();
                if stable.is_empty() {
                    in_range().cloned().collect()
                } else {
                    stable
                }
            }
        };

        if !self.resolution_strategy.prefers_lowest(name) {
            candidates.reverse();
        }

        if let Some(preferred) = preferences.get(name) {
            if let Some(position) = candidates.iter().position(|version| version == preferred) {
                trace!("Trying preferred version {preferred} of `{name}` first");
                let preferred = candidates.remove(position);
                candidates.insert(0, preferred);
            }
        }

        candidates
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use test_case::test_case;
    use version_ranges::Ranges;

    use tether_normalize::PackageName;
    use tether_pep440::{Version, VersionConstraint};
    use tether_pypi_types::Dependency;

    use super::CandidateSelector;
    use crate::{Manifest, OptionsBuilder, Preferences, PrereleaseMode, ResolutionMode};

    fn versions() -> Vec<Version> {
        ["1.0", "1.1", "2.0a1", "2.0", "3.0b1"]
            .iter()
            .map(|version| Version::from_str(version).unwrap())
            .collect()
    }

    fn select(
        resolution: ResolutionMode,
        prerelease: PrereleaseMode,
        requirement: &str,
        range: &str,
        preferences: &Preferences,
    ) -> Vec<String> {
        let name = PackageName::from_str("pkg").unwrap();
        let manifest = Manifest::simple(vec![Dependency {
            version: VersionConstraint::from_str(requirement).unwrap(),
            ..Dependency::any(name.clone())
        }]);
        let options = OptionsBuilder::new()
            .resolution_mode(resolution)
            .prerelease_mode(prerelease)
            .build();
        let range: Ranges<Version> = VersionConstraint::from_str(range).unwrap().to_ranges();
        CandidateSelector::for_resolution(&options, &manifest)
            .candidates(&name, &versions(), &range, preferences)
            .iter()
            .map(ToString::to_string)
            .collect()
    }

    #[test_case(ResolutionMode::Highest, PrereleaseMode::IfNecessaryOrExplicit, "*", "*" => vec!["2.0", "1.1", "1.0"]; "highest")]
    #[test_case(ResolutionMode::Lowest, PrereleaseMode::IfNecessaryOrExplicit, "*", "*" => vec!["1.0", "1.1", "2.0"]; "lowest")]
    #[test_case(ResolutionMode::LowestDirect, PrereleaseMode::IfNecessaryOrExplicit, "*", "*" => vec!["1.0", "1.1", "2.0"]; "lowest direct")]
    #[test_case(ResolutionMode::Highest, PrereleaseMode::Allow, "*", "*" => vec!["3.0b1", "2.0", "2.0a1", "1.1", "1.0"]; "allow")]
    #[test_case(ResolutionMode::Highest, PrereleaseMode::IfNecessaryOrExplicit, "*", ">2.0" => vec!["3.0b1"]; "if necessary")]
    #[test_case(ResolutionMode::Highest, PrereleaseMode::Disallow, "*", ">2.0" => Vec::<String>::new(); "disallow")]
    #[test_case(ResolutionMode::Highest, PrereleaseMode::Explicit, ">=2.0a1", "*" => vec!["3.0b1", "2.0", "2.0a1", "1.1", "1.0"]; "explicit")]
    #[test_case(ResolutionMode::Highest, PrereleaseMode::Explicit, ">=1.0", ">2.0" => Vec::<String>::new(); "not explicit")]
    fn order(
        resolution: ResolutionMode,
        prerelease: PrereleaseMode,
        requirement: &str,
        range: &str,
    ) -> Vec<String> {
        select(resolution, prerelease, requirement, range, &Preferences::default())
    }

    #[test]
    fn preference_first() {
        let preferences: Preferences = [(
            PackageName::from_str("pkg").unwrap(),
            Version::from_str("1.1").unwrap(),
        )]
        .into_iter()
        .collect();
        assert_eq!(
            select(
                ResolutionMode::Highest,
                PrereleaseMode::default(),
                "*",
                "*",
                &preferences
            ),
            ["1.1", "2.0", "1.0"]
        );
        // Out of range: ignored.
        assert_eq!(
            select(
                ResolutionMode::Highest,
                PrereleaseMode::default(),
                "*",
                ">=2.0",
                &preferences
            ),
            ["2.0"]
        );
    }
}
