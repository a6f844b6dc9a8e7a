//! The `Project` contract a caller implements so `ProjectBuildCache` can
//! drive stage switching and reader/writer access without knowing how a
//! concrete build tool represents its tasks and workspace.

use buildcache_resource::{Reader, Writer};

/// Caller-supplied options for [`Project::get_reader`], e.g. selecting a
/// dependency vs. project-source view.
#[derive(Debug, Clone, Default)]
pub struct ReaderOptions {
    /// When set, requests a reader scoped to this named stage rather than
    /// the project's current stage.
    pub stage: Option<String>,
}

/// The external interface `ProjectBuildCache` drives. A caller's build
/// tool implements this over its own project/workspace representation.
pub trait Project: Send + Sync {
    /// Human-readable project name, used in log messages and error text.
    fn get_name(&self) -> &str;

    /// Stable project id, used as the `pkgPath` segment in the on-disk
    /// cache layout.
    fn get_id(&self) -> &str;

    /// Reader over the project's original, unmodified source tree.
    fn get_source_reader(&self) -> &dyn Reader;

    /// Reader scoped by `opts`, e.g. the current stage or a named one.
    fn get_reader(&self, opts: ReaderOptions) -> &dyn Reader;

    /// The name of the stage currently active, if any.
    fn get_stage(&self) -> Option<&str>;

    /// Switch the project's active stage to a previously initialized one.
    ///
    /// # Errors
    ///
    /// Returns an error if `name` was never initialized via [`Project::init_stages`].
    fn use_stage(&mut self, name: &str) -> buildcache_resource::Result<()>;

    /// Register (or replace) the writer for a named stage.
    ///
    /// # Errors
    ///
    /// Returns an error if the writer cannot be attached.
    fn set_stage(&mut self, name: &str, writer: Box<dyn Writer>) -> buildcache_resource::Result<()>;

    /// Declare the full set of stage names this project's tasks will use,
    /// in execution order.
    ///
    /// # Errors
    ///
    /// Returns an error if stage initialization fails.
    fn init_stages(&mut self, names: &[String]) -> buildcache_resource::Result<()>;

    /// Switch to the synthetic result stage: the union of every task
    /// stage's writes.
    ///
    /// # Errors
    ///
    /// Returns an error if the result stage cannot be activated.
    fn use_result_stage(&mut self) -> buildcache_resource::Result<()>;

    /// Register the writer backing the result stage.
    ///
    /// # Errors
    ///
    /// Returns an error if the writer cannot be attached.
    fn set_result_stage(&mut self, writer: Box<dyn Writer>) -> buildcache_resource::Result<()>;
}
