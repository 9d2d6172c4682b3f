use crate::config::TopicConfig;
use event_schema::EventKind;
use std::collections::HashMap;

/// Resolves configured topic names to event kinds.
#[derive(Debug, Clone)]
pub struct TopicRouter {
    routes: HashMap<String, EventKind>,
}

impl TopicRouter {
    pub fn new(topics: &TopicConfig) -> Self {
        let routes = EventKind::ALL
            .iter()
            .map(|kind| (topics.topic_for(*kind).to_string(), *kind))
            .collect();
        Self { routes }
    }

    pub fn resolve(&self, topic: &str) -> Option<EventKind> {
        self.routes.get(topic).copied()
    }

    pub fn topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.routes.keys().cloned().collect();
        topics.sort();
        topics
    }
}
