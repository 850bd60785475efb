//! Request-scoped buffer of client-side script fragments.
//!
//! Fragments are flushed once per page render in a fixed category order:
//! impressions first, then the pageview, then events — listing impressions
//! must be registered on the tracker before the pageview hit that reports
//! them. Within a category, insertion order is preserved.

use std::collections::HashMap;

use shoptrace_common::ScriptCategory;

#[derive(Debug, Default)]
pub struct ScriptQueue {
    queued: HashMap<ScriptCategory, Vec<String>>,
}

impl ScriptQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, category: ScriptCategory, script: impl Into<String>) {
        self.queued.entry(category).or_default().push(script.into());
    }

    pub fn is_empty(&self) -> bool {
        self.queued.values().all(Vec::is_empty)
    }

    /// Concatenate all fragments in flush order, each wrapped in line breaks,
    /// and clear the queue. A second flush returns the empty string.
    pub fn flush(&mut self) -> String {
        let mut javascript = String::new();

        for category in ScriptCategory::FLUSH_ORDER {
            if let Some(fragments) = self.queued.remove(&category) {
                for fragment in fragments {
                    javascript.push('\n');
                    javascript.push_str(&fragment);
                    javascript.push('\n');
                }
            }
        }

        javascript
    }
}
