use version_ranges::Ranges;

use tether_pep440::{Version, VersionConstraint};
use tether_pep508::MarkerValueVersion;

use crate::ResolverEnvironment;

/// The interpreter versions a resolution has to serve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PythonRequirement {
    /// The project's `python-versions`.
    constraint: VersionConstraint,
    /// The project's `python-versions`, as a range.
    range: Ranges<Version>,
    /// The interpreter of a specific environment, if any.
    target: Option<Version>,
}

impl PythonRequirement {
    pub fn new(constraint: VersionConstraint, environment: &ResolverEnvironment) -> Self {
        let range = constraint.to_ranges();
        let target = environment
            .marker_environment()
            .map(|env| env.get_version(&MarkerValueVersion::PythonFullVersion).clone());
        Self {
            constraint,
            range,
            target,
        }
    }

    /// The project's `python-versions`.
    pub fn constraint(&self) -> &VersionConstraint {
        &self.constraint
    }

    /// The project's `python-versions`, as a range.
    pub fn range(&self) -> &Ranges<Version> {
        &self.range
    }

    /// The interpreter version of a specific environment.
    pub fn target(&self) -> Option<&Version> {
        self.target.as_ref()
    }

    /// Whether a package that declares `requires` can serve every interpreter in `required`.
    ///
    /// `required` is the part of the project's range in which the package is needed. For a
    /// specific environment only the bound interpreter has to be served. A project without a
    /// `python-versions` constraint accepts every package.
    pub(crate) fn is_compatible(&self, requires: &VersionConstraint, required: &Ranges<Version>) -> bool {
        if requires.is_any() {
            return true;
        }
        if let Some(target) = &self.target {
            return requires.contains(target);
        }
        if self.constraint.is_any() {
            return true;
        }
        let required = required.intersection(&self.range);
        required.intersection(&requires.to_ranges()) == required
    }

    /// A description of what [`PythonRequirement::is_compatible`] checked against.
    pub(crate) fn describe(&self, required: &Ranges<Version>) -> String {
        match &self.target {
            Some(target) => target.to_string(),
            None if *required == Ranges::full() => self.constraint.to_string(),
            None => required.intersection(&self.range).to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use version_ranges::Ranges;

    use tether_pep440::VersionConstraint;

    use super::PythonRequirement;
    use crate::ResolverEnvironment;

    fn constraint(text: &str) -> VersionConstraint {
        VersionConstraint::from_str(text).unwrap()
    }

    #[test]
    fn universal() {
        let python = PythonRequirement::new(constraint("^3.7"), &ResolverEnvironment::Universal);
        let full = Ranges::full();
        assert!(python.is_compatible(&constraint(">=3.6"), &full));
        assert!(python.is_compatible(&constraint("~=3.6"), &full));
        assert!(python.is_compatible(&constraint("*"), &full));
        assert!(!python.is_compatible(&constraint(">=3.8"), &full));

        // Needed on 3.7 only, through a `python_version < '3.8'` edge.
        let narrow = constraint("<3.8").to_ranges();
        assert!(python.is_compatible(&constraint("<3.8"), &narrow));
        assert!(!python.is_compatible(&constraint("<3.8"), &full));
    }

    #[test]
    fn unconstrained_project() {
        let python = PythonRequirement::new(VersionConstraint::any(), &ResolverEnvironment::Universal);
        assert!(python.is_compatible(&constraint(">=3.12"), &Ranges::full()));
    }
}
