//! Ordered flow registry

use super::{Flow, FlowError};
use std::sync::Arc;

/// Flows in registration order; trigger scans follow this order.
#[derive(Debug, Clone, Default)]
pub struct FlowRegistry {
    flows: Vec<Arc<Flow>>,
}

impl FlowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and register a flow
    pub fn insert(&mut self, flow: Flow) -> Result<Arc<Flow>, FlowError> {
        flow.validate()?;
        if self.get(flow.name()).is_some() {
            return Err(FlowError::DuplicateFlow(flow.name().to_string()));
        }
        let flow = Arc::new(flow);
        self.flows.push(Arc::clone(&flow));
        Ok(flow)
    }

    pub fn get(&self, name: &str) -> Option<Arc<Flow>> {
        self.flows.iter().find(|f| f.name() == name).cloned()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Flow>> {
        self.flows.iter()
    }

    pub fn len(&self) -> usize {
        self.flows.len()
    }

    #[allow(dead_code)] // API completeness
    pub fn is_empty(&self) -> bool {
        self.flows.is_empty()
    }
}
