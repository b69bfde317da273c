use std::cmp::min;

use itertools::Itertools;
use rustc_hash::FxHashMap;
use tokio::sync::mpsc::Sender;
use tracing::{debug, trace};

use tether_normalize::PackageName;
use tether_pep440::Version;

use crate::resolver::Request;
use crate::{InMemoryIndex, ResolveError};

/// Prefetch the metadata of a batch of candidates once the search has rejected many versions of
/// the same package, instead of waiting for each request in turn.
///
/// The batch is the next candidates in search order, so the prefetched metadata is exactly what
/// further backtracking on the package would ask for.
#[derive(Default)]
pub(crate) struct BatchPrefetcher {
    tried_versions: FxHashMap<PackageName, usize>,
    last_prefetch: FxHashMap<PackageName, usize>,
}

impl BatchPrefetcher {
    /// Prefetch a large number of versions if we already unsuccessfully tried many versions.
    pub(crate) fn prefetch_batches(
        &mut self,
        name: &PackageName,
        remaining: impl Iterator<Item = Version>,
        request_sink: &Sender<Request>,
        index: &InMemoryIndex,
    ) -> Result<(), ResolveError> {
        let (num_tried, do_prefetch) = self.should_prefetch(name);
        if !do_prefetch {
            return Ok(());
        }
        let total_prefetch = min(num_tried, 50);

        let mut prefetch_count = 0;
        for version in remaining.take(total_prefetch) {
            trace!("Prefetching {name}=={version}");
            if index
                .distributions()
                .register((name.clone(), version.clone()))
            {
                request_sink.blocking_send(Request::Metadata(name.clone(), version))?;
                prefetch_count += 1;
            }
        }

        debug!("Prefetching {prefetch_count} {name} versions");

        self.last_prefetch.insert(name.clone(), num_tried);
        Ok(())
    }

    /// Each time we tried a version for a package, we register that here.
    pub(crate) fn version_tried(&mut self, name: &PackageName) {
        *self.tried_versions.entry(name.clone()).or_default() += 1;
    }

    /// After 5, 10 and 20 tried versions, prefetch that many versions to start early but not too
    /// aggressively. From then on, schedule a prefetch of 50 versions every 20 tried versions.
    fn should_prefetch(&self, name: &PackageName) -> (usize, bool) {
        let num_tried = self.tried_versions.get(name).copied().unwrap_or_default();
        let previous_prefetch = self.last_prefetch.get(name).copied().unwrap_or_default();
        let do_prefetch = (num_tried >= 5 && previous_prefetch < 5)
            || (num_tried >= 10 && previous_prefetch < 10)
            || (num_tried >= 20 && previous_prefetch < 20)
            || (num_tried >= 20 && num_tried - previous_prefetch >= 20);
        (num_tried, do_prefetch)
    }

    /// Log stats about how many versions we tried.
    ///
    /// Counts include versions tried again after backtracking.
    pub(crate) fn log_tried_versions(&self) {
        let total_versions: usize = self.tried_versions.values().sum();
        let counts = self
            .tried_versions
            .iter()
            .sorted_by(|(p1, c1), (p2, c2)| c1.cmp(c2).reverse().then(p1.cmp(p2)))
            .map(|(package, count)| format!("{package} {count}"))
            .join(", ");
        debug!("Tried {total_versions} versions: {counts}");
    }
}
