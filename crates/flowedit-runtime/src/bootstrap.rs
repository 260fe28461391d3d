#![forbid(unsafe_code)]

//! Startup resolution of the initial flow.
//!
//! Sources are tried in order and the first one holding a well-formed flow
//! wins:
//!
//! 1. the durable current-state slot,
//! 2. the fallback text copy under [`FALLBACK_KEY`],
//! 3. the caller's hard-coded default.
//!
//! Missing, unreadable and malformed data are all treated as absence. Nothing
//! here returns an error.

use std::fmt;

use flowedit_core::FlowState;
use tracing::{Instrument, debug, info_span, warn};

use crate::storage::{FALLBACK_KEY, KeyValueStore, PersistenceGateway, TextStore};

/// Where the initial flow came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BootstrapSource {
    Durable,
    Fallback,
    Default,
}

impl BootstrapSource {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Durable => "durable",
            Self::Fallback => "fallback",
            Self::Default => "default",
        }
    }
}

impl fmt::Display for BootstrapSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A resolved initial flow and its source.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved {
    pub state: FlowState,
    pub source: BootstrapSource,
}

/// Reads the persisted sources in priority order.
#[derive(Debug)]
pub struct BootstrapResolver<'a, S, F> {
    gateway: &'a PersistenceGateway<S>,
    fallback: &'a F,
}

impl<'a, S: KeyValueStore, F: TextStore> BootstrapResolver<'a, S, F> {
    #[must_use]
    pub fn new(gateway: &'a PersistenceGateway<S>, fallback: &'a F) -> Self {
        Self { gateway, fallback }
    }

    /// The first persisted flow, or `None` if no source holds one.
    pub async fn resolve(&self) -> Option<Resolved> {
        self.resolve_sources()
            .instrument(info_span!("bootstrap.resolve"))
            .await
    }

    /// Like [`resolve`](Self::resolve), with `default` as the last resort.
    pub async fn resolve_or(&self, default: FlowState) -> Resolved {
        self.resolve().await.unwrap_or_else(|| {
            debug!(source = "default", "bootstrap resolved");
            Resolved {
                state: default,
                source: BootstrapSource::Default,
            }
        })
    }

    async fn resolve_sources(&self) -> Option<Resolved> {
        match self.gateway.load_current().await {
            Ok(Some(state)) => {
                debug!(source = "durable", nodes = state.nodes.len(), "bootstrap resolved");
                return Some(Resolved {
                    state,
                    source: BootstrapSource::Durable,
                });
            }
            Ok(None) => debug!("durable slot empty"),
            Err(err) => warn!(error = %err, "durable slot unreadable; trying fallback"),
        }
        match self.fallback.get_item(FALLBACK_KEY) {
            Ok(Some(text)) => match FlowState::from_json_str(&text) {
                Ok(state) => {
                    debug!(source = "fallback", nodes = state.nodes.len(), "bootstrap resolved");
                    Some(Resolved {
                        state,
                        source: BootstrapSource::Fallback,
                    })
                }
                Err(err) => {
                    warn!(error = %err, "fallback copy malformed");
                    None
                }
            },
            Ok(None) => None,
            Err(err) => {
                warn!(error = %err, "fallback store unreadable");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{CURRENT_STATE_KEY, MemoryStore, MemoryTextStore, StoreName};
    use flowedit_core::default_flow;
    use pollster::block_on;

    fn empty_flow_json() -> String {
        FlowState::default().to_json_string().unwrap()
    }

    #[test]
    fn durable_slot_wins() {
        let gw = PersistenceGateway::new(MemoryStore::new());
        block_on(gw.save_current(&FlowState::default())).unwrap();
        let text = MemoryTextStore::new();
        text.set_item(FALLBACK_KEY, &default_flow().to_json_string().unwrap())
            .unwrap();
        let resolved = block_on(BootstrapResolver::new(&gw, &text).resolve()).unwrap();
        assert_eq!(resolved.source, BootstrapSource::Durable);
        assert_eq!(resolved.state, FlowState::default());
    }

    #[test]
    fn fallback_used_when_durable_empty_or_broken() {
        let text = MemoryTextStore::new();
        text.set_item(FALLBACK_KEY, &empty_flow_json()).unwrap();

        let gw = PersistenceGateway::new(MemoryStore::new());
        let resolved = block_on(BootstrapResolver::new(&gw, &text).resolve()).unwrap();
        assert_eq!(resolved.source, BootstrapSource::Fallback);

        let store = MemoryStore::new();
        store.insert_raw(StoreName::Flow, CURRENT_STATE_KEY, r#"{"edges": []}"#);
        let gw = PersistenceGateway::new(store);
        let resolved = block_on(BootstrapResolver::new(&gw, &text).resolve()).unwrap();
        assert_eq!(resolved.source, BootstrapSource::Fallback);

        let gw = PersistenceGateway::new(MemoryStore::unavailable());
        let resolved = block_on(BootstrapResolver::new(&gw, &text).resolve()).unwrap();
        assert_eq!(resolved.source, BootstrapSource::Fallback);
    }

    #[test]
    fn malformed_fallback_falls_through_to_default() {
        let gw = PersistenceGateway::new(MemoryStore::new());
        let text = MemoryTextStore::new();
        text.set_item(FALLBACK_KEY, r#"{"nodes": 3, "edges": []}"#)
            .unwrap();
        let resolver = BootstrapResolver::new(&gw, &text);
        assert_eq!(block_on(resolver.resolve()), None);
        let resolved = block_on(resolver.resolve_or(default_flow()));
        assert_eq!(resolved.source, BootstrapSource::Default);
        assert_eq!(resolved.state, default_flow());
    }

    #[test]
    fn nothing_available_yields_default() {
        let gw = PersistenceGateway::new(MemoryStore::unavailable());
        let text = MemoryTextStore::unavailable();
        let resolved = block_on(BootstrapResolver::new(&gw, &text).resolve_or(default_flow()));
        assert_eq!(resolved.source, BootstrapSource::Default);
    }
}
