//! Plugin registry.
//!
//! Owns the flattened plugin declarations for a run. Construction validates
//! every declaration, then instantiates capabilities against the shared
//! compilation, partitioned by kind with declaration order preserved inside
//! each partition.
//!
//! Kinds with a later lifecycle moment stay as providers: copy runs during
//! the build's copy phase, server when the dev server starts, adapter after
//! the build. Source providers are consumed during graph construction and
//! are only carried here for completeness.

use super::{
    AdapterProvider, BundleTransform, ContextCapability, CopyProvider, PluginProvider, PluginSet,
    RendererCapability, ResourceCapability, ServerProvider, SourceProvider, flatten,
};
use crate::compilation::Compilation;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Raised when a declaration cannot enter the registry.
#[derive(Debug, Error)]
pub enum InvalidPluginError {
    #[error("plugin declaration at position {position} has an empty name")]
    EmptyName { position: usize },
}

/// A capability paired with the declaration name it came from, for error
/// attribution.
pub struct Registered<T> {
    pub name: String,
    pub capability: T,
}

/// Instantiated plugins for one run.
pub struct PluginRegistry {
    sources: Vec<Registered<SourceProvider>>,
    resources: Vec<Registered<ResourceCapability>>,
    renderers: Vec<Registered<RendererCapability>>,
    contexts: Vec<Registered<ContextCapability>>,
    copies: Vec<Registered<CopyProvider>>,
    transforms: Vec<BundleTransform>,
    servers: Vec<Registered<ServerProvider>>,
    adapters: Vec<Registered<AdapterProvider>>,
}

impl PluginRegistry {
    /// Check declarations without instantiating anything. Positions count
    /// across flattened groups.
    pub fn validate(sets: &[PluginSet]) -> Result<(), InvalidPluginError> {
        for (position, declaration) in flatten(sets).enumerate() {
            if declaration.name.trim().is_empty() {
                return Err(InvalidPluginError::EmptyName { position });
            }
        }
        Ok(())
    }

    /// Build the registry, invoking each eager provider exactly once.
    pub fn new(
        sets: Vec<PluginSet>,
        compilation: &Arc<Compilation>,
    ) -> Result<Self, InvalidPluginError> {
        Self::validate(&sets)?;

        let mut registry = Self {
            sources: Vec::new(),
            resources: Vec::new(),
            renderers: Vec::new(),
            contexts: Vec::new(),
            copies: Vec::new(),
            transforms: Vec::new(),
            servers: Vec::new(),
            adapters: Vec::new(),
        };

        for set in sets {
            let declarations = match set {
                PluginSet::One(declaration) => vec![declaration],
                PluginSet::Many(declarations) => declarations,
            };
            for declaration in declarations {
                let name = declaration.name;
                match declaration.provider {
                    PluginProvider::Source(provider) => registry.sources.push(Registered {
                        name,
                        capability: provider,
                    }),
                    PluginProvider::Resource(provider) => registry.resources.push(Registered {
                        capability: provider(compilation),
                        name,
                    }),
                    PluginProvider::Renderer(provider) => registry.renderers.push(Registered {
                        capability: provider(compilation),
                        name,
                    }),
                    PluginProvider::Context(provider) => registry.contexts.push(Registered {
                        capability: provider(compilation),
                        name,
                    }),
                    PluginProvider::Copy(provider) => registry.copies.push(Registered {
                        name,
                        capability: provider,
                    }),
                    PluginProvider::Rollup(provider) => {
                        registry.transforms.extend(provider(compilation));
                    }
                    PluginProvider::Server(provider) => registry.servers.push(Registered {
                        name,
                        capability: provider,
                    }),
                    PluginProvider::Adapter(provider) => registry.adapters.push(Registered {
                        name,
                        capability: provider,
                    }),
                }
            }
        }

        Ok(registry)
    }

    pub fn sources(&self) -> &[Registered<SourceProvider>] {
        &self.sources
    }

    pub fn resources(&self) -> &[Registered<ResourceCapability>] {
        &self.resources
    }

    pub fn renderers(&self) -> &[Registered<RendererCapability>] {
        &self.renderers
    }

    pub fn contexts(&self) -> &[Registered<ContextCapability>] {
        &self.contexts
    }

    pub fn copies(&self) -> &[Registered<CopyProvider>] {
        &self.copies
    }

    pub fn transforms(&self) -> &[BundleTransform] {
        &self.transforms
    }

    pub fn servers(&self) -> &[Registered<ServerProvider>] {
        &self.servers
    }

    pub fn adapters(&self) -> &[Registered<AdapterProvider>] {
        &self.adapters
    }

    /// Layout directories contributed by context plugins, in declaration
    /// order.
    pub fn layout_directories(&self) -> impl Iterator<Item = &PathBuf> {
        self.contexts
            .iter()
            .flat_map(|entry| entry.capability.layouts.iter())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compilation::CompilationContext;
    use crate::config::SiteConfig;
    use crate::plugins::{CopyEntry, PluginDeclaration, ResourceCapability, ServerHooks};
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    fn make_test_compilation(tmp: &TempDir) -> Arc<Compilation> {
        fs::create_dir_all(tmp.path().join("src")).unwrap();
        let mut config = SiteConfig::default();
        config.set_root(tmp.path());
        let context = CompilationContext::resolve(&config).unwrap();
        Arc::new(Compilation::seed(context, config))
    }

    #[test]
    fn test_registration_order_across_groups() {
        let tmp = TempDir::new().unwrap();
        let compilation = make_test_compilation(&tmp);

        let sets = vec![
            PluginSet::One(PluginDeclaration::resource("a", |_| {
                ResourceCapability::new()
            })),
            PluginSet::Many(vec![
                PluginDeclaration::resource("b", |_| ResourceCapability::new()),
                PluginDeclaration::resource("c", |_| ResourceCapability::new()),
            ]),
            PluginSet::One(PluginDeclaration::resource("d", |_| {
                ResourceCapability::new()
            })),
        ];

        let registry = PluginRegistry::new(sets, &compilation).unwrap();
        let names: Vec<&str> = registry.resources().iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_empty_name_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let compilation = make_test_compilation(&tmp);

        let sets = vec![
            PluginSet::One(PluginDeclaration::resource("ok", |_| {
                ResourceCapability::new()
            })),
            PluginSet::Many(vec![PluginDeclaration::resource("  ", |_| {
                ResourceCapability::new()
            })]),
        ];

        let err = PluginRegistry::new(sets, &compilation).err().unwrap();
        let InvalidPluginError::EmptyName { position } = err;
        assert_eq!(position, 1);
    }

    #[test]
    fn test_eager_providers_run_exactly_once() {
        let tmp = TempDir::new().unwrap();
        let compilation = make_test_compilation(&tmp);

        static CALLS: AtomicUsize = AtomicUsize::new(0);
        let sets = vec![PluginSet::One(PluginDeclaration::resource("counted", |_| {
            CALLS.fetch_add(1, Ordering::SeqCst);
            ResourceCapability::new()
        }))];

        let registry = PluginRegistry::new(sets, &compilation).unwrap();
        assert_eq!(CALLS.load(Ordering::SeqCst), 1);
        assert_eq!(registry.resources().len(), 1);
    }

    #[test]
    fn test_deferred_providers_do_not_run_at_construction() {
        let tmp = TempDir::new().unwrap();
        let compilation = make_test_compilation(&tmp);

        static CALLS: AtomicUsize = AtomicUsize::new(0);
        let sets = vec![
            PluginSet::One(PluginDeclaration::server("side-server", |_| {
                CALLS.fetch_add(1, Ordering::SeqCst);
                ServerHooks {
                    start: Box::new(|| Ok(())),
                    stop: None,
                }
            })),
            PluginSet::One(PluginDeclaration::adapter("deployer", |_, _| {
                CALLS.fetch_add(1, Ordering::SeqCst);
                Ok(Box::new(|| Ok(())) as _)
            })),
            PluginSet::One(PluginDeclaration::copy("extras", |_| {
                CALLS.fetch_add(1, Ordering::SeqCst);
                Ok(Vec::<CopyEntry>::new())
            })),
        ];

        let registry = PluginRegistry::new(sets, &compilation).unwrap();
        assert_eq!(CALLS.load(Ordering::SeqCst), 0);
        assert_eq!(registry.servers().len(), 1);
        assert_eq!(registry.adapters().len(), 1);
        assert_eq!(registry.copies().len(), 1);
    }

    #[test]
    fn test_partition_by_kind() {
        let tmp = TempDir::new().unwrap();
        let compilation = make_test_compilation(&tmp);

        let sets = vec![
            PluginSet::One(PluginDeclaration::resource("r", |_| {
                ResourceCapability::new()
            })),
            PluginSet::One(PluginDeclaration::context("layouts", |compilation| {
                ContextCapability {
                    layouts: vec![compilation.context.scratch_dir.join("theme")],
                }
            })),
            PluginSet::One(PluginDeclaration::rollup("rewrites", |_| {
                vec![
                    BundleTransform {
                        name: "one".into(),
                        rewrite: Box::new(|_, _| Ok(None)),
                    },
                    BundleTransform {
                        name: "two".into(),
                        rewrite: Box::new(|_, _| Ok(None)),
                    },
                ]
            })),
            PluginSet::One(PluginDeclaration::source("cms", |_| Ok(Vec::new()))),
        ];

        let registry = PluginRegistry::new(sets, &compilation).unwrap();
        assert_eq!(registry.resources().len(), 1);
        assert_eq!(registry.contexts().len(), 1);
        assert_eq!(registry.sources().len(), 1);
        let transform_names: Vec<&str> =
            registry.transforms().iter().map(|t| t.name.as_str()).collect();
        assert_eq!(transform_names, vec!["one", "two"]);
        assert_eq!(registry.layout_directories().count(), 1);
    }
}
