//! Given a set of requirements, find a set of compatible packages.

use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::thread;

use futures::{FutureExt, StreamExt, TryStreamExt};
use rustc_hash::{FxHashMap, FxHashSet};
use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio::sync::oneshot;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, trace};
use version_ranges::Ranges;

use tether_normalize::{ExtraName, PackageName};
use tether_pep440::Version;
use tether_pypi_types::{Dependency, FileHash, PackageMetadata};

use crate::candidate_selector::CandidateSelector;
use crate::error::{Conflict, ConflictKind, NoSolution, Origin};
use crate::resolver::batch_prefetch::BatchPrefetcher;
use crate::resolver::context::{Frame, Incoming, SearchContext};
pub use crate::resolver::environment::ResolverEnvironment;
pub use crate::resolver::index::{InMemoryIndex, MetadataResult, VersionsResult};
pub use crate::resolver::provider::{MetadataProvider, ProviderError};
use crate::{Manifest, Options, Preferences, PythonRequirement, ResolutionGraph, ResolveError};

mod batch_prefetch;
mod context;
mod environment;
mod index;
mod provider;

pub struct Resolver<Provider: MetadataProvider> {
    state: ResolverState,
    provider: Provider,
}

/// State that is shared between the prefetcher and the search.
struct ResolverState {
    manifest: Manifest,
    preferences: Preferences,
    selector: CandidateSelector,
    environment: ResolverEnvironment,
    python_requirement: PythonRequirement,
    prefetch: bool,
    index: InMemoryIndex,
}

impl<Provider: MetadataProvider> Resolver<Provider> {
    /// Initialize a new resolver.
    ///
    /// The `index` may be shared with other resolutions against the same provider.
    pub fn new(
        manifest: Manifest,
        options: Options,
        preferences: Preferences,
        index: &InMemoryIndex,
        provider: Provider,
    ) -> Self {
        let python_requirement =
            PythonRequirement::new(manifest.python_versions().clone(), &options.environment);
        let state = ResolverState {
            selector: CandidateSelector::for_resolution(&options, &manifest),
            manifest,
            preferences,
            environment: options.environment,
            python_requirement,
            prefetch: options.prefetch,
            index: index.clone(),
        };
        Self { state, provider }
    }

    /// Resolve a set of requirements into a set of pinned versions.
    pub async fn resolve(self) -> Result<ResolutionGraph, ResolveError> {
        let state = Arc::new(self.state);
        let provider = Arc::new(self.provider);

        // A channel to fetch package metadata (e.g., given `flask`, fetch all versions) and version
        // metadata (e.g., given `flask==1.0.0`, fetch the metadata for that version).
        // Channel size is set large to accommodate batch prefetching.
        let (request_sink, request_stream) = mpsc::channel(300);

        // Run the fetcher.
        let requests_fut = state.clone().fetch(provider.clone(), request_stream).fuse();

        // Spawn the search on a dedicated thread, since it blocks on metadata.
        let solver = state.clone();
        let (tx, rx) = oneshot::channel();
        thread::Builder::new()
            .name("tether-resolver".into())
            .spawn(move || {
                let result = solver.solve(&request_sink);
                // The receiver is gone if the fetcher failed; the fetcher's error wins.
                let _ = tx.send(result);
            })
            .map_err(ResolveError::Spawn)?;

        let resolve_fut = async move { rx.await.map_err(ResolveError::from) };

        // Wait for both to complete.
        let ((), selection) = tokio::try_join!(requests_fut, resolve_fut)?;
        let selection = selection?;

        let files = state.fetch_file_hashes(&*provider, &selection).await?;
        Ok(ResolutionGraph::from_selection(
            selection,
            files,
            &state.manifest,
            &state.environment,
            &state.python_requirement,
        ))
    }
}

/// Why a tentative assignment was rejected.
enum Rejection {
    /// The assignment is inconsistent with the constraints; try another candidate.
    Conflict(Conflict),
    /// Resolution can't continue.
    Fatal(ResolveError),
}

impl From<ResolveError> for Rejection {
    fn from(err: ResolveError) -> Self {
        Self::Fatal(err)
    }
}

impl<T> From<mpsc::error::SendError<T>> for Rejection {
    fn from(err: mpsc::error::SendError<T>) -> Self {
        Self::Fatal(ResolveError::from(err))
    }
}

/// The conflicts recorded during the search, without duplicates.
#[derive(Default)]
struct Conflicts {
    seen: FxHashSet<Conflict>,
    ordered: Vec<Conflict>,
}

impl Conflicts {
    fn push(&mut self, conflict: Conflict) {
        if self.seen.insert(conflict.clone()) {
            self.ordered.push(conflict);
        }
    }

    fn into_error(self) -> ResolveError {
        ResolveError::Unsatisfiable(NoSolution::new(self.ordered))
    }
}

impl ResolverState {
    /// Run the backtracking search.
    ///
    /// Decisions are taken most-constrained-first. When every candidate of a decision is
    /// rejected, the search jumps back to the most recent decision that contributed to one of
    /// the rejections, skipping unrelated decisions in between.
    fn solve(&self, request_sink: &Sender<Request>) -> Result<Selection, ResolveError> {
        let mut context = SearchContext::default();
        let mut conflicts = Conflicts::default();
        let mut prefetcher = BatchPrefetcher::default();
        let mut prefetched = FxHashSet::default();

        debug!(
            "Solving with Python {} for {} environment",
            self.python_requirement.constraint(),
            self.environment
        );

        let root_extras = self.manifest.extra_names();
        for (category, dependency) in self.manifest.root_requirements() {
            if !self
                .environment
                .includes(&dependency.marker, &root_extras, &self.python_requirement)
            {
                debug!(
                    "Skipping {category} requirement `{}` in this environment",
                    dependency.to_requirement()
                );
                continue;
            }
            let mut involved = Vec::new();
            match self.add_edge(
                &mut context,
                &Origin::Root,
                dependency,
                request_sink,
                &mut involved,
            ) {
                Ok(()) => {}
                Err(Rejection::Fatal(err)) => return Err(err),
                Err(Rejection::Conflict(conflict)) => {
                    conflicts.push(conflict);
                    return Err(conflicts.into_error());
                }
            }
        }

        let mut stack: Vec<Frame> = Vec::new();
        'search: loop {
            if self.prefetch {
                self.prefetch_frontier(&context, &mut prefetched, request_sink)?;
            }

            let Some((name, candidates)) = self.choose_next(&context)? else {
                break;
            };
            if candidates.is_empty() {
                debug!("No candidates left for `{name}`");
                if let Some(term) = context.term(&name) {
                    conflicts.push(term.conflict(&name, ConflictKind::NoVersions));
                }
            } else {
                trace!("Deciding `{name}` from {} candidates", candidates.len());
            }
            stack.push(Frame {
                name,
                snapshot: context,
                remaining: candidates.into(),
                conflict_set: FxHashSet::default(),
            });

            loop {
                let Some(frame) = stack.last_mut() else {
                    prefetcher.log_tried_versions();
                    return Err(conflicts.into_error());
                };

                if let Some(version) = frame.remaining.pop_front() {
                    prefetcher.version_tried(&frame.name);
                    prefetcher.prefetch_batches(
                        &frame.name,
                        frame.remaining.iter().cloned(),
                        request_sink,
                        &self.index,
                    )?;

                    let mut next = frame.snapshot.clone();
                    let mut involved = Vec::new();
                    let result =
                        self.assign(&mut next, &frame.name, &version, request_sink, &mut involved);
                    match result {
                        Ok(()) => {
                            debug!("Selecting: {}=={version}", frame.name);
                            context = next;
                            continue 'search;
                        }
                        Err(Rejection::Fatal(err)) => return Err(err),
                        Err(Rejection::Conflict(conflict)) => {
                            debug!("Rejecting {}=={version}: {conflict}", frame.name);
                            let culprits = next.culprits(&involved);
                            frame.conflict_set.extend(culprits);
                            frame.conflict_set.remove(&frame.name);
                            conflicts.push(conflict);
                        }
                    }
                    continue;
                }

                // Every candidate failed.
                if let Some(exhausted) = stack.pop() {
                    Self::backjump(&mut stack, exhausted);
                }
            }
        }

        prefetcher.log_tried_versions();
        Ok(self.selection(&context))
    }

    /// Unwind the stack to the most recent decision among the culprits of an exhausted frame,
    /// handing it the remaining culprits.
    fn backjump(stack: &mut Vec<Frame>, exhausted: Frame) {
        let Frame {
            name,
            snapshot,
            mut conflict_set,
            ..
        } = exhausted;
        conflict_set.extend(snapshot.culprits([&name]));
        conflict_set.remove(&name);

        while let Some(frame) = stack.last() {
            if conflict_set.contains(&frame.name) {
                break;
            }
            debug!("Discarding decision on `{}`", frame.name);
            stack.pop();
        }

        if let Some(frame) = stack.last_mut() {
            debug!("Backtracking from `{name}` to `{}`", frame.name);
            conflict_set.remove(&frame.name);
            frame.conflict_set.extend(conflict_set);
        }
    }

    /// Pick the frontier name with the fewest candidates, breaking ties by discovery order.
    fn choose_next(
        &self,
        context: &SearchContext,
    ) -> Result<Option<(PackageName, Vec<Version>)>, ResolveError> {
        let mut best: Option<(PackageName, Vec<Version>)> = None;
        for (name, term) in context.frontier() {
            let versions = self.versions(name)?;
            let candidates =
                self.selector
                    .candidates(name, &versions, &term.range, &self.preferences);
            if best
                .as_ref()
                .is_none_or(|(_, best)| candidates.len() < best.len())
            {
                let exhausted = candidates.is_empty();
                best = Some((name.clone(), candidates));
                if exhausted {
                    break;
                }
            }
        }
        Ok(best)
    }

    /// Tentatively select a version and merge its dependencies into the context.
    fn assign(
        &self,
        context: &mut SearchContext,
        name: &PackageName,
        version: &Version,
        request_sink: &Sender<Request>,
        involved: &mut Vec<PackageName>,
    ) -> Result<(), Rejection> {
        involved.push(name.clone());
        let metadata = self.metadata(name, version, request_sink)?;

        let (term, _) = context.term_mut(name);
        if !self
            .python_requirement
            .is_compatible(&metadata.python_versions, &term.python)
        {
            return Err(Rejection::Conflict(term.conflict(
                name,
                ConflictKind::Python {
                    version: version.clone(),
                    requires: metadata.python_versions.clone(),
                    target: self.python_requirement.describe(&term.python),
                },
            )));
        }
        term.assignment = Some(version.clone());
        let extras = term.extras();

        self.add_dependencies(
            context,
            name,
            version,
            &metadata,
            None,
            &extras,
            request_sink,
            involved,
        )
    }

    /// Merge the edges of a selected version that apply under `extras`, skipping those that
    /// already applied under `previous` extras.
    #[allow(clippy::too_many_arguments)]
    fn add_dependencies(
        &self,
        context: &mut SearchContext,
        name: &PackageName,
        version: &Version,
        metadata: &PackageMetadata,
        previous: Option<&[ExtraName]>,
        extras: &[ExtraName],
        request_sink: &Sender<Request>,
        involved: &mut Vec<PackageName>,
    ) -> Result<(), Rejection> {
        let merged = previous
            .map(|previous| self.active_edges(metadata, previous))
            .unwrap_or_default();
        let origin = Origin::Package(name.clone(), version.clone());
        for dependency in self.active_edges(metadata, extras) {
            if merged.iter().any(|edge| std::ptr::eq(*edge, dependency)) {
                continue;
            }
            trace!("Adding edge {origin} → {}", dependency.to_requirement());
            self.add_edge(context, &origin, dependency, request_sink, involved)?;
        }
        Ok(())
    }

    /// The edges of a package version that participate in this resolution.
    fn active_edges<'a>(
        &self,
        metadata: &'a PackageMetadata,
        extras: &'a [ExtraName],
    ) -> Vec<&'a Dependency> {
        metadata
            .requirements_for(extras)
            .filter(|dependency| {
                self.environment
                    .includes(&dependency.marker, extras, &self.python_requirement)
            })
            .collect()
    }

    /// Merge one edge into the constraint store.
    fn add_edge(
        &self,
        context: &mut SearchContext,
        origin: &Origin,
        dependency: &Dependency,
        request_sink: &Sender<Request>,
        involved: &mut Vec<PackageName>,
    ) -> Result<(), Rejection> {
        let name = &dependency.name;
        let (term, discovered) = context.term_mut(name);
        if discovered && self.index.packages().register(name.clone()) {
            request_sink.blocking_send(Request::Package(name.clone()))?;
        }

        term.incoming.push(Incoming {
            origin: origin.clone(),
            version: dependency.version.clone(),
            extras: dependency.extras.clone(),
        });
        term.range = term.range.intersection(&dependency.version.to_ranges());
        let python = self
            .python_requirement
            .range()
            .intersection(&dependency.marker.python_versions());
        let python = term.python.union(&python);
        let widened = python != term.python;
        term.python = python;

        if term.range.is_empty() {
            involved.push(name.clone());
            return Err(Rejection::Conflict(
                term.conflict(name, ConflictKind::Disjoint),
            ));
        }

        let Some(assigned) = term.assignment.clone() else {
            term.extras.extend(dependency.extras.iter().cloned());
            return Ok(());
        };

        // The name was decided earlier: the selected version has to satisfy the new edge.
        if !term.range.contains(&assigned) {
            involved.push(name.clone());
            return Err(Rejection::Conflict(
                term.conflict(name, ConflictKind::Excluded(assigned)),
            ));
        }

        let previous = term.extras();
        let added = dependency
            .extras
            .iter()
            .filter(|extra| !term.extras.contains(*extra))
            .cloned()
            .collect::<Vec<_>>();
        if added.is_empty() && !widened {
            return Ok(());
        }
        involved.push(name.clone());

        let metadata = self.metadata(name, &assigned, request_sink)?;
        if widened
            && !self
                .python_requirement
                .is_compatible(&metadata.python_versions, &term.python)
        {
            return Err(Rejection::Conflict(term.conflict(
                name,
                ConflictKind::Python {
                    version: assigned,
                    requires: metadata.python_versions.clone(),
                    target: self.python_requirement.describe(&term.python),
                },
            )));
        }
        if added.is_empty() {
            return Ok(());
        }

        // New extras of a selected version activate more of its edges.
        term.extras.extend(added);
        let extras = term.extras();
        self.add_dependencies(
            context,
            name,
            &assigned,
            &metadata,
            Some(&previous),
            &extras,
            request_sink,
            involved,
        )
    }

    /// Request the metadata of the most likely candidate of every frontier name, once.
    fn prefetch_frontier(
        &self,
        context: &SearchContext,
        prefetched: &mut FxHashSet<PackageName>,
        request_sink: &Sender<Request>,
    ) -> Result<(), ResolveError> {
        for (name, term) in context.frontier() {
            if prefetched.insert(name.clone()) {
                request_sink.blocking_send(Request::Prefetch(name.clone(), term.range.clone()))?;
            }
        }
        Ok(())
    }

    /// The published versions of a package, sorted in ascending order.
    fn versions(&self, name: &PackageName) -> Result<Arc<Vec<Version>>, ResolveError> {
        self.index
            .packages()
            .wait_blocking(name)
            .ok_or_else(|| ResolveError::UnregisteredTask(name.to_string()))?
            .map_err(|err| ResolveError::Provider {
                request: format!("the versions of `{name}`"),
                err,
            })
    }

    /// The metadata of a package version, requesting it if nobody did yet.
    fn metadata(
        &self,
        name: &PackageName,
        version: &Version,
        request_sink: &Sender<Request>,
    ) -> Result<Arc<PackageMetadata>, ResolveError> {
        let key = (name.clone(), version.clone());
        if self.index.distributions().register(key.clone()) {
            request_sink.blocking_send(Request::Metadata(name.clone(), version.clone()))?;
        }
        self.index
            .distributions()
            .wait_blocking(&key)
            .ok_or_else(|| ResolveError::UnregisteredTask(format!("{name}=={version}")))?
            .map_err(|err| ResolveError::Provider {
                request: format!("the metadata of `{name}=={version}`"),
                err,
            })
    }

    /// Collect the selected versions and the edges between them.
    fn selection(&self, context: &SearchContext) -> Selection {
        let packages = context
            .assignments()
            .filter_map(|(name, version, term)| {
                // Every selected version had its metadata fetched when it was selected.
                let metadata = self
                    .index
                    .distributions()
                    .get(&(name.clone(), version.clone()))?
                    .ok()?;
                let extras = term.extras();
                let edges = self
                    .active_edges(&metadata, &extras)
                    .into_iter()
                    .cloned()
                    .collect();
                Some(SelectedPackage {
                    name: name.clone(),
                    version: version.clone(),
                    extras,
                    metadata,
                    edges,
                })
            })
            .collect();
        Selection { packages }
    }

    /// Fetch the file hashes of every selected version concurrently.
    async fn fetch_file_hashes<Provider: MetadataProvider>(
        &self,
        provider: &Provider,
        selection: &Selection,
    ) -> Result<FxHashMap<PackageName, Vec<FileHash>>, ResolveError> {
        futures::stream::iter(&selection.packages)
            .map(|package| async move {
                let mut files = provider
                    .get_file_hashes(&package.name, &package.version)
                    .await
                    .map_err(|err| ResolveError::Provider {
                        request: format!(
                            "the file hashes of `{}=={}`",
                            package.name, package.version
                        ),
                        err,
                    })?;
                files.sort();
                Ok::<_, ResolveError>((package.name.clone(), files))
            })
            .buffer_unordered(50)
            .try_collect()
            .await
    }

    /// Fetch the metadata for a stream of requests.
    async fn fetch<Provider: MetadataProvider>(
        self: Arc<Self>,
        provider: Arc<Provider>,
        request_stream: Receiver<Request>,
    ) -> Result<(), ResolveError> {
        let mut response_stream = ReceiverStream::new(request_stream)
            .map(|request| self.process_request(request, &*provider).boxed_local())
            // Allow as many futures as possible to start in the background. Backpressure comes
            // from the bounded request channel.
            .buffer_unordered(usize::MAX);

        while let Some(response) = response_stream.next().await {
            match response {
                Some(Response::Package(name, versions)) => {
                    trace!("Received package versions for: {name}");
                    self.index.packages().done(name, versions);
                }
                Some(Response::Metadata(name, version, metadata)) => {
                    trace!("Received metadata for: {name}=={version}");
                    self.index.distributions().done((name, version), metadata);
                }
                None => {}
            }
        }

        Ok(())
    }

    async fn process_request<Provider: MetadataProvider>(
        &self,
        request: Request,
        provider: &Provider,
    ) -> Option<Response> {
        match request {
            Request::Package(name) => {
                let versions = provider.list_versions(&name).await.map(|mut versions| {
                    versions.sort();
                    versions.dedup();
                    Arc::new(versions)
                });
                Some(Response::Package(name, versions))
            }
            Request::Metadata(name, version) => {
                let metadata = provider
                    .get_dependencies(&name, &version)
                    .await
                    .map(Arc::new);
                Some(Response::Metadata(name, version, metadata))
            }
            // Pre-fetch the metadata of the version the search will most likely try first.
            Request::Prefetch(name, range) => {
                let Some(Ok(versions)) = self.index.packages().wait(&name).await else {
                    return None;
                };
                let version = self
                    .selector
                    .candidates(&name, &versions, &range, &self.preferences)
                    .into_iter()
                    .next()?;
                if !self
                    .index
                    .distributions()
                    .register((name.clone(), version.clone()))
                {
                    return None;
                }
                trace!("Prefetching metadata for: {name}=={version}");
                let metadata = provider
                    .get_dependencies(&name, &version)
                    .await
                    .map(Arc::new);
                Some(Response::Metadata(name, version, metadata))
            }
        }
    }
}

/// Fetch the metadata for an item
#[derive(Debug)]
pub(crate) enum Request {
    /// A request to fetch the versions of a package.
    Package(PackageName),
    /// A request to fetch the metadata of a package version.
    Metadata(PackageName, Version),
    /// A request to pre-fetch the metadata of the best candidate in a range.
    Prefetch(PackageName, Ranges<Version>),
}

impl Display for Request {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Package(name) => write!(f, "Versions {name}"),
            Self::Metadata(name, version) => write!(f, "Metadata {name}=={version}"),
            Self::Prefetch(name, range) => write!(f, "Prefetch {name} {range}"),
        }
    }
}

enum Response {
    /// The returned versions of a package.
    Package(PackageName, VersionsResult),
    /// The returned metadata of a package version.
    Metadata(PackageName, Version, MetadataResult),
}

/// The outcome of the search: one version per reachable name.
#[derive(Debug)]
pub(crate) struct Selection {
    pub(crate) packages: Vec<SelectedPackage>,
}

#[derive(Debug)]
pub(crate) struct SelectedPackage {
    pub(crate) name: PackageName,
    pub(crate) version: Version,
    /// The extras requested on the package.
    pub(crate) extras: Vec<ExtraName>,
    pub(crate) metadata: Arc<PackageMetadata>,
    /// The edges that participated in the resolution.
    pub(crate) edges: Vec<Dependency>,
}
