use crate::{PrereleaseMode, ResolutionMode, ResolverEnvironment};

/// Options for resolving a manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    pub resolution_mode: ResolutionMode,
    pub prerelease_mode: PrereleaseMode,
    pub environment: ResolverEnvironment,
    /// Whether to fetch metadata for likely candidates before the search asks for it.
    pub prefetch: bool,
}

impl Default for Options {
    fn default() -> Self {
        OptionsBuilder::new().build()
    }
}

/// Builder for [`Options`].
#[derive(Debug, Clone)]
pub struct OptionsBuilder {
    resolution_mode: ResolutionMode,
    prerelease_mode: PrereleaseMode,
    environment: ResolverEnvironment,
    prefetch: bool,
}

impl Default for OptionsBuilder {
    fn default() -> Self {
        Self {
            resolution_mode: ResolutionMode::default(),
            prerelease_mode: PrereleaseMode::default(),
            environment: ResolverEnvironment::default(),
            prefetch: true,
        }
    }
}

impl OptionsBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the [`ResolutionMode`].
    #[must_use]
    pub fn resolution_mode(mut self, resolution_mode: ResolutionMode) -> Self {
        self.resolution_mode = resolution_mode;
        self
    }

    /// Sets the [`PrereleaseMode`].
    #[must_use]
    pub fn prerelease_mode(mut self, prerelease_mode: PrereleaseMode) -> Self {
        self.prerelease_mode = prerelease_mode;
        self
    }

    /// Sets the [`ResolverEnvironment`].
    #[must_use]
    pub fn environment(mut self, environment: ResolverEnvironment) -> Self {
        self.environment = environment;
        self
    }

    /// Enables or disables metadata prefetching.
    #[must_use]
    pub fn prefetch(mut self, prefetch: bool) -> Self {
        self.prefetch = prefetch;
        self
    }

    /// Builds the options.
    pub fn build(self) -> Options {
        Options {
            resolution_mode: self.resolution_mode,
            prerelease_mode: self.prerelease_mode,
            environment: self.environment,
            prefetch: self.prefetch,
        }
    }
}
