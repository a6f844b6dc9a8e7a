//! [`ProjectBuildCache`]: the per-project coordinator tying the request
//! graphs, stage cache, and persistent store together into the
//! index-restore / result-lookup / per-task-lookup algorithm.

use crate::config::resolve_data_dir;
use crate::project::Project;
use crate::resources::{resource_inputs_from_reader, ALL_RESOURCES};
use crate::signature::{self, cartesian_product};
use crate::stage::StageRecord;
use crate::state::{DifferentialCacheInfo, IndexState, ResultCacheState, TaskCacheOutcome};
use crate::{Error, Result};
use buildcache_graph::{BuildTaskCache, RequestSet, TaskCacheObject};
use buildcache_resource::{Reader, Resource};
use buildcache_store::{BuildManifest, CacheManager, ResultMetadata, StageMetadata};
use buildcache_tree::ResourceIndex;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

/// Per-project build cache coordinator (spec component C9).
pub struct ProjectBuildCache {
    project: Box<dyn Project>,
    pkg_path: String,
    build_signature: String,
    cache_manager: CacheManager,
    source_index: Option<ResourceIndex>,
    task_order: Vec<String>,
    tasks: HashMap<String, BuildTaskCache>,
    stage_cache: buildcache_store::StageCache<StageRecord>,
    stage_signatures: BTreeMap<String, String>,
    current_result_signature: Option<String>,
    index_state: IndexState,
    result_cache_state: ResultCacheState,
    pending_project_changes: Vec<buildcache_tree::ResourceInput>,
    pending_dependency_changed_paths: Vec<String>,
    accumulated_changed_paths: Vec<String>,
    index_timestamp: i64,
}

impl ProjectBuildCache {
    /// Open a project's cache: loads the prior source index and per-task
    /// request graphs, if a build manifest for `build_signature` exists.
    ///
    /// `task_specs` lists every task this build will run, in execution
    /// order, paired with whether it opts into differential builds.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache root cannot be resolved, or if
    /// restoring persisted indices fails.
    pub fn open(
        project: Box<dyn Project>,
        build_signature: impl Into<String>,
        data_dir_override: Option<&Path>,
        task_specs: &[(String, bool)],
        index_timestamp: i64,
    ) -> Result<Self> {
        let build_signature = build_signature.into();
        let pkg_path = project.get_id().to_string();
        let data_dir = resolve_data_dir(data_dir_override)?;
        let cache_manager = CacheManager::new(&data_dir)?;

        let manifest = cache_manager.read_build_manifest(&pkg_path, &build_signature)?;
        let task_order: Vec<String> = task_specs.iter().map(|(name, _)| name.clone()).collect();

        let (source_index, tasks, index_state) = match manifest {
            None => {
                let tasks = task_specs
                    .iter()
                    .map(|(name, diff)| (name.clone(), BuildTaskCache::new(name.clone(), project.get_name().to_string(), *diff)))
                    .collect();
                (None, tasks, IndexState::Initial)
            }
            Some(_) => {
                let cached_index: Option<buildcache_tree::CacheObject> =
                    cache_manager.read_source_index(&pkg_path, &build_signature)?;
                let source_index = cached_index.map(|c| ResourceIndex::from_cache(&c)).transpose()?;

                let mut tasks = HashMap::new();
                for (name, diff) in task_specs {
                    let project_obj = cache_manager.read_task_metadata(&pkg_path, &build_signature, name, "project")?;
                    let dep_obj = cache_manager.read_task_metadata(&pkg_path, &build_signature, name, "dependencies")?;
                    let task_cache = match (project_obj, dep_obj) {
                        (Some(project_manager), Some(dependency_manager)) => BuildTaskCache::from_cache(
                            name.clone(),
                            project.get_name().to_string(),
                            &TaskCacheObject {
                                project: project_manager,
                                dependency: dependency_manager,
                                supports_differential_builds: *diff,
                            },
                        )?,
                        _ => BuildTaskCache::new(name.clone(), project.get_name().to_string(), *diff),
                    };
                    tasks.insert(name.clone(), task_cache);
                }
                (source_index, tasks, IndexState::RestoringDependency)
            }
        };

        Ok(Self {
            project,
            pkg_path,
            build_signature,
            cache_manager,
            source_index,
            task_order,
            tasks,
            stage_cache: buildcache_store::StageCache::new(),
            stage_signatures: BTreeMap::new(),
            current_result_signature: None,
            index_state,
            result_cache_state: ResultCacheState::NoCache,
            pending_project_changes: Vec::new(),
            pending_dependency_changed_paths: Vec::new(),
            accumulated_changed_paths: Vec::new(),
            index_timestamp,
        })
    }

    /// Supply pending project-source and dependency changes observed
    /// since the cache was opened, moving the index state to
    /// `RequiresUpdate` so the next `prepareProjectBuildAndValidateCache`
    /// call applies them incrementally instead of doing a full dependency
    /// refresh. A no-op if the index is not currently mid-restore.
    pub fn queue_pending_changes(
        &mut self,
        project_changes: Vec<buildcache_tree::ResourceInput>,
        dependency_changed_paths: Vec<String>,
    ) {
        if self.index_state != IndexState::RestoringDependency {
            return;
        }
        self.pending_project_changes = project_changes;
        self.pending_dependency_changed_paths = dependency_changed_paths;
        self.index_state = IndexState::RequiresUpdate;
    }

    /// Run the index-restore / result-validation state transitions.
    /// Returns `Some(changedPaths)` on a result-cache hit, `None` if no
    /// result cache is usable for this build.
    ///
    /// # Errors
    ///
    /// Propagates errors from index materialization or cache reads.
    pub fn prepare_project_build_and_validate_cache(&mut self, dep_reader: &dyn Reader) -> Result<Option<Vec<String>>> {
        match self.index_state {
            IndexState::Initial => return Ok(None),
            IndexState::RestoringProject => {}
            IndexState::RestoringDependency => {
                for task in self.tasks.values_mut() {
                    task.refresh_dependency_indices(dep_reader, self.index_timestamp)?;
                }
                self.index_state = IndexState::Fresh;
                self.result_cache_state = ResultCacheState::PendingValidation;
            }
            IndexState::RequiresUpdate => {
                let mut any_changed = false;
                if let Some(source_index) = self.source_index.as_mut() {
                    if !self.pending_project_changes.is_empty() {
                        let delta = source_index.upsert_resources(&self.pending_project_changes)?;
                        any_changed |= !delta.added.is_empty() || !delta.updated.is_empty();
                    }
                }
                if !self.pending_dependency_changed_paths.is_empty() {
                    for task in self.tasks.values_mut() {
                        let changed = task.update_dependency_indices(dep_reader, &self.pending_dependency_changed_paths)?;
                        any_changed |= !changed.is_empty();
                    }
                }
                self.pending_project_changes.clear();
                self.pending_dependency_changed_paths.clear();
                if any_changed {
                    self.result_cache_state = ResultCacheState::PendingValidation;
                }
                self.index_state = IndexState::Fresh;
            }
            IndexState::Fresh => {}
        }

        if self.result_cache_state == ResultCacheState::PendingValidation {
            return match self.find_result_cache()? {
                Some(changed_paths) => {
                    self.result_cache_state = ResultCacheState::FreshAndInUse;
                    Ok(Some(changed_paths))
                }
                None => {
                    self.result_cache_state = ResultCacheState::NoCache;
                    Ok(None)
                }
            };
        }

        Ok(None)
    }

    /// Build the initial source index from scratch, for a project with no
    /// prior cache (`indexState == Initial`).
    ///
    /// # Errors
    ///
    /// Propagates errors from reading the source tree.
    pub fn initialize_source_index(&mut self, source_reader: &dyn Reader) -> Result<()> {
        let resources = resource_inputs_from_reader(source_reader, ALL_RESOURCES)?;
        self.source_index = Some(ResourceIndex::create(&resources, self.index_timestamp)?);
        self.index_state = IndexState::Fresh;
        Ok(())
    }

    fn find_result_cache(&mut self) -> Result<Option<Vec<String>>> {
        let Some(source_index) = &self.source_index else { return Ok(None) };
        let project_sig = source_index.get_signature();

        let dep_sig_lists: Vec<Vec<String>> = self
            .task_order
            .iter()
            .filter_map(|name| self.tasks.get(name))
            .map(buildcache_graph::BuildTaskCache::dependency_index_signatures)
            .collect();

        let candidates = cartesian_product(&dep_sig_lists, |combo| signature::result_signature(&project_sig, combo));

        for candidate in candidates {
            let Some(result_meta) = self.cache_manager.read_result_metadata(&self.pkg_path, &self.build_signature, &candidate)? else {
                continue;
            };

            let mut written_paths = Vec::new();
            let mut all_stages_present = true;
            for (stage_id, stage_sig) in &result_meta.stage_signatures {
                match self.lookup_stage(stage_id, stage_sig)? {
                    Some(paths) => written_paths.extend(paths),
                    None => {
                        all_stages_present = false;
                        break;
                    }
                }
            }

            if all_stages_present {
                written_paths.sort();
                written_paths.dedup();
                return Ok(Some(written_paths));
            }
        }

        Ok(None)
    }

    /// Look up a stage's written paths, checking the in-memory cache first
    /// and falling back to the persistent store. Populates the in-memory
    /// cache on a store hit.
    fn lookup_stage(&mut self, stage_id: &str, stage_signature: &str) -> Result<Option<Vec<String>>> {
        if let Some(entry) = self.stage_cache.get(stage_id, stage_signature) {
            return Ok(Some(entry.state.written_resource_paths()));
        }

        let Some(stage_meta) = self
            .cache_manager
            .read_stage_metadata(&self.pkg_path, &self.build_signature, stage_id, stage_signature)?
        else {
            return Ok(None);
        };

        let record = StageRecord { resources: stage_meta.all_records().clone() };
        let paths = record.written_resource_paths();
        self.stage_cache.put(stage_id.to_string(), stage_signature.to_string(), record);
        Ok(Some(paths))
    }

    /// Validate and, if possible, switch to a cached stage for `task_name`.
    ///
    /// # Errors
    ///
    /// Propagates errors from reading project/dependency trees or the
    /// persistent store. Returns [`Error::UnknownTask`] for an
    /// unregistered task name.
    pub fn prepare_task_execution_and_validate_cache(
        &mut self,
        task_name: &str,
        project_reader: &dyn Reader,
        dep_reader: &dyn Reader,
    ) -> Result<TaskCacheOutcome> {
        if !self.tasks.contains_key(task_name) {
            return Err(Error::UnknownTask { task_name: task_name.to_string() });
        }

        let stage_id = format!("task/{task_name}");
        self.project.use_stage(&stage_id)?;

        if self.index_state != IndexState::Fresh {
            return Ok(TaskCacheOutcome::Miss);
        }

        let accumulated = self.accumulated_changed_paths.clone();
        {
            let task = self.tasks.get_mut(task_name).expect("checked above");
            task.update_project_indices(project_reader, &accumulated)?;
        }

        let (project_sigs, dep_sigs, supports_diff) = {
            let task = self.tasks.get(task_name).expect("checked above");
            (task.project_index_signatures(), task.dependency_index_signatures(), task.supports_differential_builds())
        };

        let exact_candidates = cartesian_product(&[project_sigs.clone(), dep_sigs.clone()], |combo| {
            signature::stage_signature(&combo[0], &combo[1])
        });

        for candidate in &exact_candidates {
            if let Some(paths) = self.lookup_stage(&stage_id, candidate)? {
                self.adopt_stage_signature(&stage_id, candidate, &paths);
                return Ok(TaskCacheOutcome::ExactHit);
            }
        }

        if !supports_diff {
            return Ok(TaskCacheOutcome::Miss);
        }

        let task = self.tasks.get(task_name).expect("checked above");
        let project_deltas = task.project_index_deltas(project_reader, &accumulated)?;
        let dep_deltas = task.dependency_index_deltas(dep_reader, &accumulated)?;

        let mut differential_candidates: Vec<(String, Vec<String>, Vec<String>)> = Vec::new();
        for (new_project_sig, changed_project) in project_deltas.values() {
            for dep_sig in &dep_sigs {
                differential_candidates.push((
                    signature::stage_signature(new_project_sig, dep_sig),
                    changed_project.clone(),
                    Vec::new(),
                ));
            }
        }
        for (new_dep_sig, changed_dep) in dep_deltas.values() {
            for project_sig in &project_sigs {
                differential_candidates.push((
                    signature::stage_signature(project_sig, new_dep_sig),
                    Vec::new(),
                    changed_dep.clone(),
                ));
            }
        }
        for (new_project_sig, changed_project) in project_deltas.values() {
            for (new_dep_sig, changed_dep) in dep_deltas.values() {
                differential_candidates.push((
                    signature::stage_signature(new_project_sig, new_dep_sig),
                    changed_project.clone(),
                    changed_dep.clone(),
                ));
            }
        }

        for (candidate, changed_project, changed_dep) in differential_candidates {
            if self.lookup_stage(&stage_id, &candidate)?.is_some() {
                return Ok(TaskCacheOutcome::Differential(DifferentialCacheInfo {
                    new_signature: candidate,
                    changed_project_resource_paths: changed_project,
                    changed_dependency_resource_paths: changed_dep,
                }));
            }
        }

        Ok(TaskCacheOutcome::Miss)
    }

    fn adopt_stage_signature(&mut self, stage_id: &str, signature: &str, written_paths: &[String]) {
        let is_new = self.stage_signatures.get(stage_id).map(String::as_str) != Some(signature);
        if is_new {
            self.accumulated_changed_paths.extend(written_paths.iter().cloned());
            self.accumulated_changed_paths.sort();
            self.accumulated_changed_paths.dedup();
        }
        self.stage_signatures.insert(stage_id.to_string(), signature.to_string());
    }

    /// Record a task's execution result: either a fresh `(projectSig,
    /// depSig)` pair computed from its recorded requests, or the
    /// signature carried from a differential cache hit.
    ///
    /// `written_resources` are persisted into the content store; paths
    /// written by the previous stage execution but not rewritten here are
    /// carried forward for differential hits.
    ///
    /// # Errors
    ///
    /// Propagates errors from index recording or blob persistence.
    pub fn record_task_result(
        &mut self,
        task_name: &str,
        project_requests: RequestSet,
        dep_requests: RequestSet,
        project_reader: &dyn Reader,
        dep_reader: &dyn Reader,
        differential: Option<&DifferentialCacheInfo>,
        written_resources: &[Resource],
    ) -> Result<()> {
        let stage_id = format!("task/{task_name}");

        let signature = match differential {
            Some(info) => info.new_signature.clone(),
            None => {
                let task = self
                    .tasks
                    .get_mut(task_name)
                    .ok_or_else(|| Error::UnknownTask { task_name: task_name.to_string() })?;
                let (project_sig, dep_sig) =
                    task.record_requests(project_requests, dep_requests, project_reader, dep_reader, self.index_timestamp)?;
                signature::stage_signature(&project_sig, &dep_sig)
            }
        };

        let mut resources: BTreeMap<String, buildcache_store::ResourceRecord> = BTreeMap::new();
        for resource in written_resources {
            resources.insert(resource.get_path(), self.cache_manager.write_resource(resource)?);
        }

        if differential.is_some() {
            if let Some(previous_sig) = self.stage_signatures.get(&stage_id).cloned() {
                if let Some(entry) = self.stage_cache.get(&stage_id, &previous_sig) {
                    for (path, record) in &entry.state.resources {
                        resources.entry(path.clone()).or_insert_with(|| record.clone());
                    }
                }
            }
        }

        let written_paths: Vec<String> = resources.keys().cloned().collect();
        self.stage_cache.put(stage_id.clone(), signature.clone(), StageRecord { resources });
        self.stage_signatures.insert(stage_id, signature);

        self.accumulated_changed_paths.extend(written_paths);
        if let Some(info) = differential {
            self.accumulated_changed_paths.extend(info.changed_project_resource_paths.iter().cloned());
            self.accumulated_changed_paths.extend(info.changed_dependency_resource_paths.iter().cloned());
        }
        self.accumulated_changed_paths.sort();
        self.accumulated_changed_paths.dedup();

        Ok(())
    }

    /// Switch the project to its result stage, compute the final result
    /// signature, and return (clearing) the accumulated changed-paths list.
    ///
    /// # Errors
    ///
    /// Propagates errors from switching the project's stage.
    pub fn all_tasks_completed(&mut self) -> Result<Vec<String>> {
        self.project.use_result_stage()?;

        let project_sig = self.source_index.as_ref().map(ResourceIndex::get_signature).unwrap_or_default();
        let dep_sigs: Vec<String> = self
            .task_order
            .iter()
            .filter_map(|name| self.tasks.get(name))
            .filter_map(buildcache_graph::BuildTaskCache::current_dependency_signature)
            .collect();

        self.current_result_signature = Some(signature::result_signature(&project_sig, &dep_sigs));
        self.index_state = IndexState::Fresh;
        self.result_cache_state = ResultCacheState::FreshAndInUse;

        Ok(std::mem::take(&mut self.accumulated_changed_paths))
    }

    /// Persist the result metadata, every queued stage, per-task request
    /// managers, and the source index, writing only what changed.
    ///
    /// # Errors
    ///
    /// Propagates errors from the persistent store.
    pub fn write_cache(&mut self) -> Result<()> {
        if let Some(result_sig) = self.current_result_signature.clone() {
            let metadata = ResultMetadata { stage_signatures: self.stage_signatures.clone() };
            self.cache_manager.write_result_metadata(&self.pkg_path, &self.build_signature, &result_sig, &metadata)?;
        }

        while let Some((stage_id, sig)) = self.stage_cache.next_pending_persistence() {
            let Some(entry) = self.stage_cache.get(&stage_id, &sig) else { continue };
            let metadata = StageMetadata::single_writer(entry.state.resources.clone());
            self.cache_manager.write_stage_metadata(&self.pkg_path, &self.build_signature, &stage_id, &sig, &metadata)?;
        }

        let supports_differential_builds = self.tasks.values().any(buildcache_graph::BuildTaskCache::supports_differential_builds);
        for name in &self.task_order {
            let Some(task) = self.tasks.get(name) else { continue };
            let objects = task.to_cache_objects();
            self.cache_manager.write_task_metadata(&self.pkg_path, &self.build_signature, name, "project", &objects.project)?;
            self.cache_manager.write_task_metadata(&self.pkg_path, &self.build_signature, name, "dependencies", &objects.dependency)?;
        }

        if let Some(source_index) = &self.source_index {
            self.cache_manager.write_source_index(&self.pkg_path, &self.build_signature, &source_index.to_cache_object())?;
            let manifest = BuildManifest::new(self.build_signature.clone(), supports_differential_builds, self.task_order.clone());
            self.cache_manager.write_build_manifest(&self.pkg_path, &self.build_signature, &manifest)?;
        }

        Ok(())
    }

    /// The project handle this cache was opened with.
    #[must_use]
    pub fn project(&self) -> &dyn Project {
        self.project.as_ref()
    }

    /// Current index lifecycle state.
    #[must_use]
    pub fn index_state(&self) -> IndexState {
        self.index_state
    }

    /// Current result-cache lifecycle state.
    #[must_use]
    pub fn result_cache_state(&self) -> ResultCacheState {
        self.result_cache_state
    }
}
