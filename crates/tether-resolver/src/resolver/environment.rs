use std::fmt::{Display, Formatter};

use tether_normalize::ExtraName;
use tether_pep508::{MarkerContext, MarkerEnvironment, MarkerTree, SymbolicMarker};

use crate::PythonRequirement;

/// The environments a resolution has to serve.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ResolverEnvironment {
    /// Every platform, on any interpreter the project's `python-versions` admits.
    ///
    /// An edge is only dropped when its marker can't hold anywhere in that range.
    #[default]
    Universal,
    /// A single interpreter on a single platform.
    Specific(Box<MarkerEnvironment>),
}

impl ResolverEnvironment {
    /// Resolve for one concrete environment.
    pub fn specific(env: MarkerEnvironment) -> Self {
        Self::Specific(Box::new(env))
    }

    /// The concrete environment, if this is a single-platform resolution.
    pub fn marker_environment(&self) -> Option<&MarkerEnvironment> {
        match self {
            Self::Universal => None,
            Self::Specific(env) => Some(env),
        }
    }

    /// Whether an edge with the given marker participates in this resolution.
    ///
    /// `extras` are the extras requested on the package that declares the edge.
    pub(crate) fn includes(
        &self,
        marker: &MarkerTree,
        extras: &[ExtraName],
        python: &PythonRequirement,
    ) -> bool {
        if marker.is_true() {
            return true;
        }
        match self {
            Self::Specific(env) => marker.evaluate(env, extras),
            Self::Universal => {
                let context = MarkerContext::default()
                    .with_python_versions(python.range().clone())
                    .with_extras(extras.to_vec());
                !matches!(
                    marker.evaluate_symbolic_with(&context),
                    SymbolicMarker::Never
                )
            }
        }
    }
}

impl Display for ResolverEnvironment {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Universal => f.write_str("universal"),
            Self::Specific(env) => write!(
                f,
                "{} on Python {}",
                env.sys_platform(),
                env.python_full_version()
            ),
        }
    }
}
