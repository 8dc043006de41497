use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Properties handed to an artifact when it is constructed.
pub type Properties = BTreeMap<String, String>;

/// One executable unit within a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobElement {
    Step { id: String },
    /// Elements run one after another.
    Flow { id: String, elements: Vec<JobElement> },
    /// Independent flows; the traversal engine decides how to schedule them.
    Split { id: String, flows: Vec<JobElement> },
}

impl JobElement {
    pub fn step(id: impl Into<String>) -> Self {
        JobElement::Step { id: id.into() }
    }

    pub fn id(&self) -> &str {
        match self {
            JobElement::Step { id }
            | JobElement::Flow { id, .. }
            | JobElement::Split { id, .. } => id,
        }
    }
}

/// A reference to a listener artifact, resolved by the artifact factory at run start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListenerRef {
    pub reference: String,
    #[serde(default)]
    pub properties: Properties,
}

impl ListenerRef {
    pub fn new(reference: impl Into<String>) -> Self {
        Self {
            reference: reference.into(),
            properties: Properties::new(),
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }
}

/// Immutable job definition. Shared read-only by everything involved in a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    #[serde(default = "default_restartable")]
    pub restartable: bool,
    /// Name of the definition file the job was loaded from, when it differs from `id`.
    #[serde(default)]
    pub definition_name: Option<String>,
    #[serde(default)]
    pub elements: Vec<JobElement>,
    #[serde(default)]
    pub listeners: Vec<ListenerRef>,
}

fn default_restartable() -> bool {
    true
}

impl Job {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            restartable: default_restartable(),
            definition_name: None,
            elements: Vec::new(),
            listeners: Vec::new(),
        }
    }

    pub fn restartable(mut self, restartable: bool) -> Self {
        self.restartable = restartable;
        self
    }

    pub fn definition_name(mut self, name: impl Into<String>) -> Self {
        self.definition_name = Some(name.into());
        self
    }

    pub fn element(mut self, element: JobElement) -> Self {
        self.elements.push(element);
        self
    }

    pub fn step(self, id: impl Into<String>) -> Self {
        self.element(JobElement::step(id))
    }

    pub fn listener(mut self, listener: ListenerRef) -> Self {
        self.listeners.push(listener);
        self
    }

    /// The definition-file name, only when it is distinct from the job id.
    pub fn distinct_definition_name(&self) -> Option<&str> {
        self.definition_name
            .as_deref()
            .filter(|name| *name != self.id)
    }
}
