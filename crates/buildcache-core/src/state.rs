//! State machines driving [`crate::ProjectBuildCache`].

/// Lifecycle of the project's source/dependency indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexState {
    /// Source index is being restored from a prior cache; not yet usable.
    RestoringProject,
    /// Source index is restored; dependency indices still need a full
    /// rebuild before anything can be validated.
    RestoringDependency,
    /// No prior cache was found; the project starts from empty indices.
    Initial,
    /// Indices are restored and validated; caching can proceed.
    Fresh,
    /// Indices are restored but pending project/dependency changes have
    /// not yet been applied.
    RequiresUpdate,
}

/// Lifecycle of the cached build result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultCacheState {
    /// A result lookup is owed before the cache can be trusted.
    PendingValidation,
    /// No result cache was found for the current signatures.
    NoCache,
    /// A result cache hit is active and in use for this build.
    FreshAndInUse,
}

/// Outcome of `prepareTaskExecutionAndValidateCache` when a differential
/// (partial) hit is found: the task can reuse `previous_stage` but must
/// re-derive the paths listed here.
#[derive(Debug, Clone)]
pub struct DifferentialCacheInfo {
    /// Stage signature the differential hit was found under.
    pub new_signature: String,
    /// Project-domain resource paths that changed relative to the
    /// signature the differential was derived from.
    pub changed_project_resource_paths: Vec<String>,
    /// Dependency-domain resource paths that changed relative to the
    /// signature the differential was derived from.
    pub changed_dependency_resource_paths: Vec<String>,
}

/// Outcome of `prepareTaskExecutionAndValidateCache`.
#[derive(Debug, Clone)]
pub enum TaskCacheOutcome {
    /// No usable cache; the task must execute from scratch.
    Miss,
    /// An exact stage signature match; the task can be skipped entirely.
    ExactHit,
    /// A differential match: the task can execute incrementally.
    Differential(DifferentialCacheInfo),
}
