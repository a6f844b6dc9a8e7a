//! Per-task cache state: a project-domain and a dependency-domain request
//! manager, plus the task's differential-build capability flag.

use crate::cache_object::TaskCacheObject;
use crate::request::RequestSet;
use crate::request_manager::ResourceRequestManager;
use crate::Result;
use buildcache_resource::Reader;
use std::collections::BTreeMap;

/// Per-task cache state.
pub struct BuildTaskCache {
    task_name: String,
    project_name: String,
    supports_differential_builds: bool,
    project_request_manager: ResourceRequestManager,
    dependency_request_manager: ResourceRequestManager,
}

impl BuildTaskCache {
    /// Construct an empty task cache.
    #[must_use]
    pub fn new(
        task_name: impl Into<String>,
        project_name: impl Into<String>,
        supports_differential_builds: bool,
    ) -> Self {
        Self {
            task_name: task_name.into(),
            project_name: project_name.into(),
            supports_differential_builds,
            project_request_manager: ResourceRequestManager::new(),
            dependency_request_manager: ResourceRequestManager::new(),
        }
    }

    /// This task's name.
    #[must_use]
    pub fn task_name(&self) -> &str {
        &self.task_name
    }

    /// The owning project's name.
    #[must_use]
    pub fn project_name(&self) -> &str {
        &self.project_name
    }

    /// Whether this task supports differential (incremental) builds.
    #[must_use]
    pub fn supports_differential_builds(&self) -> bool {
        self.supports_differential_builds
    }

    /// Feed both domains' requests to their managers. Returns `(projectSig, depSig)`.
    ///
    /// # Errors
    ///
    /// Propagates [`crate::Error`] from either manager.
    pub fn record_requests(
        &mut self,
        project_requests: RequestSet,
        dep_requests: RequestSet,
        project_reader: &dyn Reader,
        dep_reader: &dyn Reader,
        index_timestamp: i64,
    ) -> Result<(String, String)> {
        let project_sig =
            self.project_request_manager
                .record_requests(project_requests, project_reader, index_timestamp)?;
        let dep_sig = self
            .dependency_request_manager
            .record_requests(dep_requests, dep_reader, index_timestamp)?;
        Ok((project_sig, dep_sig))
    }

    /// Incrementally update project-domain indices.
    ///
    /// # Errors
    ///
    /// Propagates [`crate::Error`] from the request manager.
    pub fn update_project_indices(&mut self, reader: &dyn Reader, changed_paths: &[String]) -> Result<Vec<String>> {
        self.project_request_manager.update_indices(reader, changed_paths)
    }

    /// Incrementally update dependency-domain indices.
    ///
    /// # Errors
    ///
    /// Propagates [`crate::Error`] from the request manager.
    pub fn update_dependency_indices(&mut self, reader: &dyn Reader, changed_paths: &[String]) -> Result<Vec<String>> {
        self.dependency_request_manager.update_indices(reader, changed_paths)
    }

    /// Rebuild dependency-domain indices from scratch.
    ///
    /// # Errors
    ///
    /// Propagates [`crate::Error`] from the request manager.
    pub fn refresh_dependency_indices(&mut self, reader: &dyn Reader, index_timestamp: i64) -> Result<()> {
        self.dependency_request_manager.refresh_indices(reader, index_timestamp)
    }

    /// All project-domain node signatures — candidate cache keys.
    #[must_use]
    pub fn project_index_signatures(&self) -> Vec<String> {
        self.project_request_manager.all_signatures()
    }

    /// All dependency-domain node signatures — candidate cache keys.
    #[must_use]
    pub fn dependency_index_signatures(&self) -> Vec<String> {
        self.dependency_request_manager.all_signatures()
    }

    /// Speculative project-domain deltas for a differential build.
    ///
    /// # Errors
    ///
    /// Propagates [`crate::Error`] from the request manager.
    pub fn project_index_deltas(
        &self,
        reader: &dyn Reader,
        changed_paths: &[String],
    ) -> Result<BTreeMap<String, (String, Vec<String>)>> {
        self.project_request_manager.index_deltas(reader, changed_paths)
    }

    /// Speculative dependency-domain deltas for a differential build.
    ///
    /// # Errors
    ///
    /// Propagates [`crate::Error`] from the request manager.
    pub fn dependency_index_deltas(
        &self,
        reader: &dyn Reader,
        changed_paths: &[String],
    ) -> Result<BTreeMap<String, (String, Vec<String>)>> {
        self.dependency_request_manager.index_deltas(reader, changed_paths)
    }

    /// Current project-domain signature, if any request set has been recorded.
    #[must_use]
    pub fn current_project_signature(&self) -> Option<String> {
        self.project_request_manager.current_signature()
    }

    /// Current dependency-domain signature, if any request set has been recorded.
    #[must_use]
    pub fn current_dependency_signature(&self) -> Option<String> {
        self.dependency_request_manager.current_signature()
    }

    /// Serialize both domains' request managers plus the differential-build flag.
    #[must_use]
    pub fn to_cache_objects(&self) -> TaskCacheObject {
        TaskCacheObject {
            project: self.project_request_manager.to_cache_object(),
            dependency: self.dependency_request_manager.to_cache_object(),
            supports_differential_builds: self.supports_differential_builds,
        }
    }

    /// Restore a task cache from its serializable form.
    ///
    /// # Errors
    ///
    /// Propagates [`crate::Error`] from request manager restoration.
    pub fn from_cache(
        task_name: impl Into<String>,
        project_name: impl Into<String>,
        cache: &TaskCacheObject,
    ) -> Result<Self> {
        Ok(Self {
            task_name: task_name.into(),
            project_name: project_name.into(),
            supports_differential_builds: cache.supports_differential_builds,
            project_request_manager: ResourceRequestManager::from_cache_object(&cache.project)?,
            dependency_request_manager: ResourceRequestManager::from_cache_object(&cache.dependency)?,
        })
    }
}
