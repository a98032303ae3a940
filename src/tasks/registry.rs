//! Task registry for name-based lookup.
//!
//! Holds every task the CLI can run, built once from a [`BuildContext`].

use super::{build_icons, minify_images, parallel, scripts, series, styles};
use super::{LintTask, ServeTask, Task};
use crate::build::BuildContext;
use crate::transform::{EslintEngine, LintEngine};
use std::sync::Arc;

/// Names accepted for each task besides its own.
const ALIASES: &[(&str, &str)] = &[("minImage", "minify-images"), ("icon", "build-icons")];

/// Registry of named tasks, in registration order.
#[derive(Default)]
pub struct TaskRegistry {
    tasks: Vec<(String, Arc<dyn Task>)>,
}

impl TaskRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a task under `name`, replacing any previous one.
    pub fn register(&mut self, name: impl Into<String>, task: Arc<dyn Task>) {
        let name = name.into();
        self.tasks.retain(|(n, _)| *n != name);
        self.tasks.push((name, task));
    }

    /// The standard tasks, linting with eslint.
    pub fn standard(ctx: &BuildContext) -> Self {
        let engine =
            EslintEngine::new(ctx.config().tools.eslint.clone(), ctx.project_root().to_path_buf());
        Self::with_lint_engine(ctx, Arc::new(engine))
    }

    /// The standard tasks with a custom lint engine.
    pub fn with_lint_engine(ctx: &BuildContext, engine: Arc<dyn LintEngine>) -> Self {
        let styles: Arc<dyn Task> = Arc::new(styles(ctx));
        let scripts: Arc<dyn Task> = Arc::new(scripts(ctx));
        let lint: Arc<dyn Task> = Arc::new(LintTask::new(ctx, engine));
        let server: Arc<dyn Task> =
            Arc::new(ServeTask::new(ctx, Arc::clone(&styles), Arc::clone(&scripts)));

        let serve = series(vec![
            parallel(vec![Arc::clone(&styles), series(vec![Arc::clone(&lint), Arc::clone(&scripts)])]),
            server,
        ]);

        let mut registry = Self::new();
        registry.register("minify-images", Arc::new(minify_images(ctx)));
        registry.register("build-icons", Arc::new(build_icons(ctx)));
        registry.register("styles", styles);
        registry.register("scripts", scripts);
        registry.register("lint", lint);
        registry.register("serve", serve);
        registry
    }

    /// Look up a task by name or alias.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Task>> {
        let name = ALIASES.iter().find(|(alias, _)| *alias == name).map_or(name, |(_, n)| *n);
        self.tasks.iter().find(|(n, _)| n == name).map(|(_, t)| Arc::clone(t))
    }

    /// Registered names, in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.tasks.iter().map(|(n, _)| n.as_str()).collect()
    }

    /// Registered names with what each one runs.
    pub fn describe(&self) -> Vec<(&str, &str)> {
        self.tasks.iter().map(|(n, t)| (n.as_str(), t.name())).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AssetConfig;
    use crate::mode::Mode;
    use std::path::PathBuf;

    fn registry() -> TaskRegistry {
        let ctx = BuildContext::new(AssetConfig::default(), PathBuf::from("/project"), Mode::Development);
        TaskRegistry::standard(&ctx)
    }

    #[test]
    fn test_standard_names() {
        assert_eq!(
            registry().names(),
            vec!["minify-images", "build-icons", "styles", "scripts", "lint", "serve"]
        );
    }

    #[test]
    fn test_aliases() {
        let registry = registry();
        assert_eq!(registry.get("minImage").unwrap().name(), "minify-images");
        assert_eq!(registry.get("icon").unwrap().name(), "build-icons");
        assert!(registry.get("deploy").is_none());
    }

    #[test]
    fn test_serve_composition() {
        let registry = registry();
        assert_eq!(
            registry.get("serve").unwrap().name(),
            "series(parallel(styles, series(lint, scripts)), start-server)"
        );
    }

    #[test]
    fn test_register_replaces() {
        let mut registry = registry();
        let styles = registry.get("styles").unwrap();
        registry.register("lint", styles);
        assert_eq!(registry.names().len(), 6);
        assert_eq!(registry.get("lint").unwrap().name(), "styles");
        assert_eq!(registry.names().last(), Some(&"lint"));
    }
}
