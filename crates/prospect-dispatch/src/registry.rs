use crate::handler::ToolHandler;
use crate::types::ToolDescriptor;
use std::collections::HashMap;
use std::sync::Arc;

struct Entry {
    descriptor: ToolDescriptor,
    handler: Arc<dyn ToolHandler>,
}

/// Name → handler map that remembers registration order.
///
/// Built once at startup, then shared read-only by the dispatcher.
#[derive(Default)]
pub struct ToolRegistry {
    entries: Vec<Entry>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under its descriptor name.
    ///
    /// Re-registering a name replaces the earlier handler in its original
    /// catalog slot and returns the replaced one so the caller can warn.
    pub fn register<H: ToolHandler + 'static>(&mut self, handler: H) -> Option<Arc<dyn ToolHandler>> {
        self.register_shared(Arc::new(handler))
    }

    pub fn register_shared(&mut self, handler: Arc<dyn ToolHandler>) -> Option<Arc<dyn ToolHandler>> {
        let descriptor = handler.descriptor();
        let entry = Entry {
            descriptor,
            handler,
        };
        match self.index.get(&entry.descriptor.name) {
            Some(&slot) => {
                let previous = std::mem::replace(&mut self.entries[slot], entry);
                Some(previous.handler)
            }
            None => {
                self.index
                    .insert(entry.descriptor.name.clone(), self.entries.len());
                self.entries.push(entry);
                None
            }
        }
    }

    pub fn lookup(&self, name: &str) -> Option<Arc<dyn ToolHandler>> {
        self.index
            .get(name)
            .map(|&slot| Arc::clone(&self.entries[slot].handler))
    }

    /// Descriptors in registration order.
    pub fn list_all(&self) -> Vec<ToolDescriptor> {
        self.entries.iter().map(|e| e.descriptor.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
