//! Listener artifacts and the factory that constructs and destroys them.
//!
//! Artifacts are resolved by reference name through an [`ArtifactFactory`].
//! The bundled [`ArtifactRegistry`] maps names to constructor closures.
//! Every handle has an explicit `destroy` step; nothing relies on `Drop`
//! to end an artifact's lifecycle.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::context::JobContext;
use crate::error::{BatchError, Result, catch_panic};
use crate::state_machine::Properties;

/// Hooks invoked around the work of a job.
pub trait JobListener: Send {
    fn before_job(&mut self, _ctx: &JobContext) -> anyhow::Result<()> {
        Ok(())
    }

    fn after_job(&mut self, _ctx: &JobContext) -> anyhow::Result<()> {
        Ok(())
    }

    /// Releases whatever the listener holds. Called exactly once by the factory.
    fn destroy(&mut self) {}
}

/// A constructed listener together with the reference it was built from.
pub struct ListenerHandle {
    reference: String,
    listener: Box<dyn JobListener>,
}

impl ListenerHandle {
    pub fn new(reference: impl Into<String>, listener: Box<dyn JobListener>) -> Self {
        Self {
            reference: reference.into(),
            listener,
        }
    }

    pub fn reference(&self) -> &str {
        &self.reference
    }

    pub fn before_job(&mut self, ctx: &JobContext) -> anyhow::Result<()> {
        self.listener.before_job(ctx)
    }

    pub fn after_job(&mut self, ctx: &JobContext) -> anyhow::Result<()> {
        self.listener.after_job(ctx)
    }

    pub fn destroy(mut self) {
        self.listener.destroy();
    }
}

impl fmt::Debug for ListenerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerHandle")
            .field("reference", &self.reference)
            .finish_non_exhaustive()
    }
}

/// Constructs and tears down listener artifacts.
pub trait ArtifactFactory: Send + Sync {
    fn create(&self, reference: &str, properties: &Properties) -> Result<ListenerHandle>;

    /// Destroys handles in the order given. A listener panicking in its
    /// `destroy` does not keep the others from being destroyed.
    fn destroy(&self, handles: Vec<ListenerHandle>) {
        for handle in handles {
            let reference = handle.reference().to_string();
            debug!(reference = %reference, "destroying listener");
            if let Err(err) = catch_panic(move || handle.destroy()) {
                warn!(reference = %reference, error = %err, "listener destroy panicked");
            }
        }
    }
}

type Constructor = Arc<dyn Fn(&Properties) -> anyhow::Result<Box<dyn JobListener>> + Send + Sync>;

/// Name → constructor registry.
#[derive(Clone, Default)]
pub struct ArtifactRegistry {
    constructors: HashMap<String, Constructor>,
}

impl ArtifactRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, reference: impl Into<String>, constructor: F) -> &mut Self
    where
        F: Fn(&Properties) -> anyhow::Result<Box<dyn JobListener>> + Send + Sync + 'static,
    {
        self.constructors.insert(reference.into(), Arc::new(constructor));
        self
    }

    pub fn contains(&self, reference: &str) -> bool {
        self.constructors.contains_key(reference)
    }

    /// Registered reference names, sorted.
    pub fn references(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.constructors.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl ArtifactFactory for ArtifactRegistry {
    fn create(&self, reference: &str, properties: &Properties) -> Result<ListenerHandle> {
        let constructor = self
            .constructors
            .get(reference)
            .ok_or_else(|| BatchError::UnknownArtifact(reference.to_string()))?;

        let listener = constructor(properties).map_err(|source| BatchError::Setup {
            component: reference.to_string(),
            source,
        })?;
        debug!(reference, "created listener");
        Ok(ListenerHandle::new(reference, listener))
    }
}

impl fmt::Debug for ArtifactRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArtifactRegistry")
            .field("references", &self.references())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    struct Tagged {
        tag: String,
        destroyed: Arc<Mutex<Vec<String>>>,
    }

    impl JobListener for Tagged {
        fn destroy(&mut self) {
            self.destroyed.lock().push(self.tag.clone());
            if self.tag == "boom" {
                panic!("listener resources already released");
            }
        }
    }

    fn registry(destroyed: Arc<Mutex<Vec<String>>>) -> ArtifactRegistry {
        let mut registry = ArtifactRegistry::new();
        registry.register("tagged", move |props: &Properties| {
            Ok(Box::new(Tagged {
                tag: props.get("tag").cloned().unwrap_or_default(),
                destroyed: destroyed.clone(),
            }) as Box<dyn JobListener>)
        });
        registry.register("broken", |_: &Properties| {
            anyhow::bail!("cannot build broken listener")
        });
        registry
    }

    #[test]
    fn create_passes_properties_to_constructor() {
        let destroyed = Arc::new(Mutex::new(Vec::new()));
        let registry = registry(destroyed.clone());
        let props = Properties::from([("tag".to_string(), "x".to_string())]);

        let handle = registry.create("tagged", &props).unwrap();
        assert_eq!(handle.reference(), "tagged");
        registry.destroy(vec![handle]);
        assert_eq!(*destroyed.lock(), vec!["x".to_string()]);
    }

    #[test]
    fn destroy_preserves_order() {
        let destroyed = Arc::new(Mutex::new(Vec::new()));
        let registry = registry(destroyed.clone());
        let handles: Vec<_> = ["1", "2", "3"]
            .into_iter()
            .map(|tag| {
                let props = Properties::from([("tag".to_string(), tag.to_string())]);
                registry.create("tagged", &props).unwrap()
            })
            .collect();

        registry.destroy(handles);
        assert_eq!(*destroyed.lock(), vec!["1", "2", "3"]);
    }

    #[test]
    fn destroy_continues_past_a_panicking_listener() {
        let destroyed = Arc::new(Mutex::new(Vec::new()));
        let registry = registry(destroyed.clone());
        let handles: Vec<_> = ["1", "boom", "3"]
            .into_iter()
            .map(|tag| {
                let props = Properties::from([("tag".to_string(), tag.to_string())]);
                registry.create("tagged", &props).unwrap()
            })
            .collect();

        registry.destroy(handles);
        assert_eq!(*destroyed.lock(), vec!["1", "boom", "3"]);
    }

    #[test]
    fn unknown_reference_is_an_error() {
        let registry = ArtifactRegistry::new();
        let err = registry.create("nope", &Properties::new()).unwrap_err();
        assert!(matches!(err, BatchError::UnknownArtifact(ref r) if r == "nope"));
    }

    #[test]
    fn constructor_failure_is_a_setup_error() {
        let registry = registry(Arc::new(Mutex::new(Vec::new())));
        let err = registry.create("broken", &Properties::new()).unwrap_err();
        assert_eq!(err.component(), Some("broken"));
        assert!(err.to_string().contains("cannot build broken listener"));
    }

    #[test]
    fn references_are_sorted() {
        let registry = registry(Arc::new(Mutex::new(Vec::new())));
        assert_eq!(registry.references(), vec!["broken", "tagged"]);
        assert!(registry.contains("tagged"));
        assert!(!registry.contains("other"));
    }
}
