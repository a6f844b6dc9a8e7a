//! End-to-end exercise of `ProjectBuildCache` across two simulated builds:
//! an initial cold build that writes the cache, and a second build over an
//! unchanged source tree that should hit both the result cache and the
//! per-task stage cache.

use buildcache_core::{Project, ProjectBuildCache, ReaderOptions, TaskCacheOutcome};
use buildcache_graph::Request;
use buildcache_resource::{ContentParam, Reader, Resource, StatInfo, Writer};
use std::collections::BTreeMap;
use std::sync::Mutex;

struct FakeReader {
    files: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl FakeReader {
    fn new(files: &[(&str, &str)]) -> Self {
        Self {
            files: Mutex::new(files.iter().map(|(p, c)| ((*p).to_string(), c.as_bytes().to_vec())).collect()),
        }
    }
}

impl Reader for FakeReader {
    fn by_path(&self, virtual_path: &str) -> buildcache_resource::Result<Option<Resource>> {
        let files = self.files.lock().unwrap();
        let Some(bytes) = files.get(virtual_path) else { return Ok(None) };
        Ok(Some(Resource::new(virtual_path, ContentParam::Buffer(bytes.clone()), false, StatInfo::default(), None)?))
    }

    fn by_glob(&self, pattern: &str) -> buildcache_resource::Result<Vec<Resource>> {
        let glob = globset::Glob::new(pattern)
            .map_err(|e| buildcache_resource::Error::invalid_pattern(pattern, e.to_string()))?
            .compile_matcher();
        let files = self.files.lock().unwrap();
        let mut out = Vec::new();
        for (path, bytes) in files.iter() {
            if glob.is_match(path) {
                out.push(Resource::new(path.clone(), ContentParam::Buffer(bytes.clone()), false, StatInfo::default(), None)?);
            }
        }
        Ok(out)
    }
}

struct FakeProject {
    id: String,
    source_reader: FakeReader,
    dep_reader: FakeReader,
}

impl Project for FakeProject {
    fn get_name(&self) -> &str {
        "demo"
    }

    fn get_id(&self) -> &str {
        &self.id
    }

    fn get_source_reader(&self) -> &dyn Reader {
        &self.source_reader
    }

    fn get_reader(&self, opts: ReaderOptions) -> &dyn Reader {
        match opts.stage.as_deref() {
            Some("dependencies") => &self.dep_reader,
            _ => &self.source_reader,
        }
    }

    fn get_stage(&self) -> Option<&str> {
        None
    }

    fn use_stage(&mut self, _name: &str) -> buildcache_resource::Result<()> {
        Ok(())
    }

    fn set_stage(&mut self, _name: &str, _writer: Box<dyn Writer>) -> buildcache_resource::Result<()> {
        Ok(())
    }

    fn init_stages(&mut self, _names: &[String]) -> buildcache_resource::Result<()> {
        Ok(())
    }

    fn use_result_stage(&mut self) -> buildcache_resource::Result<()> {
        Ok(())
    }

    fn set_result_stage(&mut self, _writer: Box<dyn Writer>) -> buildcache_resource::Result<()> {
        Ok(())
    }
}

fn make_project() -> Box<FakeProject> {
    Box::new(FakeProject {
        id: "pkg/demo".to_string(),
        source_reader: FakeReader::new(&[("/src/a.js", "console.log(1)")]),
        dep_reader: FakeReader::new(&[("/node_modules/dep/index.js", "module.exports = {}")]),
    })
}

#[test]
fn second_build_over_unchanged_sources_hits_the_result_and_stage_cache() {
    let data_dir = tempfile::tempdir().unwrap();
    let tasks = vec![("compile".to_string(), true)];

    // First build: cold, no prior manifest.
    let mut cache = ProjectBuildCache::open(make_project(), "build-sig-1", Some(data_dir.path()), &tasks, 1000).unwrap();
    assert_eq!(cache.index_state(), buildcache_core::IndexState::Initial);

    let project_for_reading = make_project();
    cache.initialize_source_index(project_for_reading.get_source_reader()).unwrap();
    assert_eq!(cache.index_state(), buildcache_core::IndexState::Fresh);

    let outcome = cache
        .prepare_task_execution_and_validate_cache("compile", project_for_reading.get_source_reader(), project_for_reading.get_reader(ReaderOptions { stage: Some("dependencies".into()) }))
        .unwrap();
    assert!(matches!(outcome, TaskCacheOutcome::Miss));

    let output = Resource::new("/dist/a.js", ContentParam::Buffer(b"compiled".to_vec()), false, StatInfo::default(), None).unwrap();
    cache
        .record_task_result(
            "compile",
            vec![Request::path("/src/a.js")],
            vec![Request::dep_path("/node_modules/dep/index.js")],
            project_for_reading.get_source_reader(),
            project_for_reading.get_reader(ReaderOptions { stage: Some("dependencies".into()) }),
            None,
            &[output],
        )
        .unwrap();

    let changed = cache.all_tasks_completed().unwrap();
    assert!(changed.contains(&"/dist/a.js".to_string()));
    cache.write_cache().unwrap();

    // Second build: same build signature, same unchanged source tree.
    let mut cache2 = ProjectBuildCache::open(make_project(), "build-sig-1", Some(data_dir.path()), &tasks, 2000).unwrap();
    assert_eq!(cache2.index_state(), buildcache_core::IndexState::RestoringDependency);

    let project2 = make_project();
    let result_hit = cache2.prepare_project_build_and_validate_cache(project2.get_reader(ReaderOptions { stage: Some("dependencies".into()) })).unwrap();
    assert!(result_hit.is_some(), "expected a result-cache hit over an unchanged dependency tree");
    assert_eq!(cache2.result_cache_state(), buildcache_core::ResultCacheState::FreshAndInUse);

    let outcome2 = cache2
        .prepare_task_execution_and_validate_cache("compile", project2.get_source_reader(), project2.get_reader(ReaderOptions { stage: Some("dependencies".into()) }))
        .unwrap();
    assert!(matches!(outcome2, TaskCacheOutcome::ExactHit), "expected an exact stage hit, got {outcome2:?}");
}
