use dossier_core::error::{GraphError, Result};
use serde_json::Value;

/// How long a channel's value lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retention {
    /// Reset to its default at the start of every turn.
    Turn,
    /// Carried across turns for the lifetime of the session.
    Session,
}

/// Specification for creating a channel. The set of specs registered on a
/// graph is its reducer table: it decides how each state key merges patches.
#[derive(Clone, Debug)]
pub enum ChannelSpec {
    /// Replace on write, with the given default.
    LastValue { default: Value },
    /// Append-only list.
    Append,
}

impl ChannelSpec {
    pub fn instantiate(&self) -> Box<dyn Channel> {
        match self {
            Self::LastValue { default } => Box::new(LastValue::with_default(default.clone())),
            Self::Append => Box::new(AppendChannel::empty()),
        }
    }
}

/// A registered channel: its reducer plus its retention across turns.
#[derive(Clone, Debug)]
pub struct ChannelDef {
    pub spec: ChannelSpec,
    pub retention: Retention,
}

/// Holds one state key and merges the writes a stage makes to it.
pub trait Channel: Send + Sync {
    /// Merge the writes of one stage. `Ok(true)` when the value changed.
    fn update(&mut self, writes: Vec<Value>) -> Result<bool>;

    fn get(&self) -> &Value;

    /// Serialized form stored in a checkpoint.
    fn snapshot(&self) -> Value;

    fn restore(&mut self, saved: Value);

    /// Back to the registered default.
    fn reset(&mut self);
}

/// Replace-on-write. Two writes from one stage are an error.
pub struct LastValue {
    value: Value,
    default: Value,
}

impl LastValue {
    pub fn with_default(default: Value) -> Self {
        Self {
            value: default.clone(),
            default,
        }
    }
}

impl Channel for LastValue {
    fn update(&mut self, writes: Vec<Value>) -> Result<bool> {
        let mut writes = writes.into_iter();
        match (writes.next(), writes.next()) {
            (None, _) => Ok(false),
            (Some(next), None) => {
                let changed = self.value != next;
                self.value = next;
                Ok(changed)
            }
            (Some(_), Some(_)) => Err(GraphError::InvalidGraph(
                "LastValue channel received more than one value in a single step".into(),
            )
            .into()),
        }
    }

    fn get(&self) -> &Value {
        &self.value
    }

    fn snapshot(&self) -> Value {
        self.value.clone()
    }

    fn restore(&mut self, saved: Value) {
        self.value = saved;
    }

    fn reset(&mut self) {
        self.value.clone_from(&self.default);
    }
}

/// Append-only log. A write of `[a, b]` appends `a` then `b`; `null` is a
/// no-op.
pub struct AppendChannel {
    log: Vec<Value>,
    view: Value,
}

impl AppendChannel {
    pub fn empty() -> Self {
        Self {
            log: Vec::new(),
            view: Value::Array(Vec::new()),
        }
    }

    fn refresh(&mut self) {
        self.view = Value::Array(self.log.clone());
    }
}

impl Channel for AppendChannel {
    fn update(&mut self, writes: Vec<Value>) -> Result<bool> {
        let before = self.log.len();
        for write in writes {
            match write {
                Value::Array(entries) => self.log.extend(entries),
                Value::Null => {}
                entry => self.log.push(entry),
            }
        }
        let grew = self.log.len() > before;
        if grew {
            self.refresh();
        }
        Ok(grew)
    }

    fn get(&self) -> &Value {
        &self.view
    }

    fn snapshot(&self) -> Value {
        self.view.clone()
    }

    fn restore(&mut self, saved: Value) {
        self.log = match saved {
            Value::Array(entries) => entries,
            _ => Vec::new(),
        };
        self.refresh();
    }

    fn reset(&mut self) {
        self.log.clear();
        self.refresh();
    }
}
