//! Per-tick inbound command queue, bounded and schema-validated before
//! acceptance.

use std::collections::{HashMap, VecDeque};
use std::sync::RwLock;

use forge_module::schema::CommandSchema;
use serde_json::{Map, Value};

use crate::error::EngineError;

/// One accepted command: who produced it, what it's called, and its
/// validated payload.
#[derive(Debug, Clone)]
pub struct Command {
    pub producer_id: String,
    pub name: String,
    pub payload: Map<String, Value>,
}

/// Validates inbound command payloads against the schemas modules have
/// registered, then hands them to a bounded FIFO queue.
///
/// Ordering is a single global FIFO: commands from the same producer are
/// never reordered relative to each other because nothing reorders the
/// queue at all, only drains it front-to-back.
pub struct CommandResolver {
    /// Command name -> (owning module name, schema).
    schemas: HashMap<String, (String, CommandSchema)>,
}

impl CommandResolver {
    /// `entries` is `(owning module name, schema)` for every command every
    /// enabled module declared.
    pub fn new(entries: Vec<(String, CommandSchema)>) -> Self {
        Self { schemas: entries.into_iter().map(|(owner, s)| (s.name.clone(), (owner, s))).collect() }
    }

    pub fn resolve(&self, name: &str, payload: &Map<String, Value>) -> Result<(), EngineError> {
        let (_, schema) = self
            .schemas
            .get(name)
            .ok_or_else(|| EngineError::NotFound { detail: format!("command '{name}' is not registered") })?;
        schema
            .validate(payload)
            .map_err(|detail| EngineError::InvalidArgument { detail })
    }

    /// The module whose schema owns `name`, if any is registered.
    pub fn owner_of(&self, name: &str) -> Option<&str> {
        self.schemas.get(name).map(|(owner, _)| owner.as_str())
    }
}

pub struct CommandQueue {
    max_commands_per_tick: usize,
    queue: RwLock<VecDeque<Command>>,
}

impl CommandQueue {
    pub fn new(max_commands_per_tick: usize) -> Self {
        Self { max_commands_per_tick, queue: RwLock::new(VecDeque::new()) }
    }

    /// Validate `payload` against `resolver` and enqueue it if the queue
    /// has room. Rejects with `Overflow` once `max_commands_per_tick`
    /// commands are pending (i.e. not yet drained by this tick's run).
    pub fn enqueue(
        &self,
        resolver: &CommandResolver,
        producer_id: &str,
        name: &str,
        payload: Map<String, Value>,
    ) -> Result<(), EngineError> {
        resolver.resolve(name, &payload)?;

        let mut queue = self.queue.write().expect("command queue lock poisoned");
        if queue.len() >= self.max_commands_per_tick {
            return Err(EngineError::Overflow {
                detail: format!("command queue is at its {}-command tick limit", self.max_commands_per_tick),
            });
        }
        queue.push_back(Command { producer_id: producer_id.to_owned(), name: name.to_owned(), payload });
        Ok(())
    }

    /// Drain every pending command in FIFO order, for the tick loop to
    /// apply.
    pub fn drain(&self) -> Vec<Command> {
        self.queue.write().expect("command queue lock poisoned").drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.queue.read().expect("command queue lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forge_module::schema::{CommandField, ScalarType};
    use serde_json::json;

    fn move_schema() -> CommandSchema {
        CommandSchema {
            name: "move".to_owned(),
            fields: vec![CommandField { name: "dx".to_owned(), ty: ScalarType::Float }],
        }
    }

    fn payload(v: Value) -> Map<String, Value> {
        v.as_object().unwrap().clone()
    }

    #[test]
    fn enqueue_validates_against_schema() {
        let resolver = CommandResolver::new(vec![("physics".to_owned(), move_schema())]);
        let queue = CommandQueue::new(8);
        let err = queue
            .enqueue(&resolver, "p1", "move", payload(json!({"dx": "not a number"})))
            .unwrap_err();
        assert_eq!(err.kind(), "InvalidArgument");
    }

    #[test]
    fn unknown_command_rejected() {
        let resolver = CommandResolver::new(vec![("physics".to_owned(), move_schema())]);
        let queue = CommandQueue::new(8);
        let err = queue.enqueue(&resolver, "p1", "ghost", payload(json!({}))).unwrap_err();
        assert_eq!(err.kind(), "NotFound");
    }

    #[test]
    fn overflow_past_bound() {
        let resolver = CommandResolver::new(vec![("physics".to_owned(), move_schema())]);
        let queue = CommandQueue::new(2);
        queue.enqueue(&resolver, "p1", "move", payload(json!({"dx": 1.0}))).unwrap();
        queue.enqueue(&resolver, "p1", "move", payload(json!({"dx": 2.0}))).unwrap();
        let err = queue
            .enqueue(&resolver, "p1", "move", payload(json!({"dx": 3.0})))
            .unwrap_err();
        assert_eq!(err.kind(), "Overflow");
    }

    #[test]
    fn resolver_reports_owning_module() {
        let resolver = CommandResolver::new(vec![("physics".to_owned(), move_schema())]);
        assert_eq!(resolver.owner_of("move"), Some("physics"));
        assert_eq!(resolver.owner_of("ghost"), None);
    }

    #[test]
    fn drain_preserves_per_producer_fifo_order() {
        let resolver = CommandResolver::new(vec![("physics".to_owned(), move_schema())]);
        let queue = CommandQueue::new(8);
        queue.enqueue(&resolver, "p1", "move", payload(json!({"dx": 1.0}))).unwrap();
        queue.enqueue(&resolver, "p2", "move", payload(json!({"dx": 2.0}))).unwrap();
        queue.enqueue(&resolver, "p1", "move", payload(json!({"dx": 3.0}))).unwrap();

        let drained = queue.drain();
        let p1_values: Vec<f64> = drained
            .iter()
            .filter(|c| c.producer_id == "p1")
            .map(|c| c.payload["dx"].as_f64().unwrap())
            .collect();
        assert_eq!(p1_values, vec![1.0, 3.0]);
        assert!(queue.is_empty());
    }
}
