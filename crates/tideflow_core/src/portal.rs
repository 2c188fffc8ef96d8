//! # Portal Linkage
//!
//! Resolves which layer lies directly below/above another and caches the
//! answer with a time-to-live, so vertical flow does not rescan host topology
//! on every neighbor walk.
//!
//! Resolution order:
//! 1. Explicit host linkage ([`HostGrid::linked_layer`])
//! 2. Footprint match: same size and origin, nearest level below/above
//! 3. Failure, cached with the short negative TTL
//!
//! Associations are keyed by [`LayerId`] only. The inverse index
//! (lower → uppers draining into it) is filled lazily from downward
//! resolutions and evicted with the layers it names.

use std::collections::{BTreeSet, HashMap};

use tideflow_shared::LayerId;
use tracing::debug;

use crate::config::PortalConfig;
use crate::host::{HostGrid, LayerInfo, VerticalDir};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct CachedLink {
    target: Option<LayerId>,
    expires_at: u64,
}

/// Cached cross-layer linkage.
#[derive(Clone, Debug)]
pub struct PortalLinkage {
    ttl: u64,
    negative_ttl: u64,
    lower: HashMap<LayerId, CachedLink>,
    upper: HashMap<LayerId, CachedLink>,
    inverse: HashMap<LayerId, BTreeSet<LayerId>>,
    inverse_expires_at: Option<u64>,
    failures: u64,
}

impl PortalLinkage {
    /// Creates an empty cache.
    #[must_use]
    pub fn new(config: &PortalConfig) -> Self {
        Self {
            ttl: config.cache_ttl.max(1),
            negative_ttl: config.negative_ttl.max(1),
            lower: HashMap::new(),
            upper: HashMap::new(),
            inverse: HashMap::new(),
            inverse_expires_at: None,
            failures: 0,
        }
    }

    /// Layer directly below `layer`.
    pub fn resolve_lower(&mut self, host: &dyn HostGrid, layer: LayerId, tick: u64) -> Option<LayerId> {
        self.resolve(host, layer, VerticalDir::Down, tick)
    }

    /// Layer directly above `layer`.
    pub fn resolve_upper(&mut self, host: &dyn HostGrid, layer: LayerId, tick: u64) -> Option<LayerId> {
        self.resolve(host, layer, VerticalDir::Up, tick)
    }

    /// Resolutions that found no linked layer.
    #[inline]
    #[must_use]
    pub const fn failures(&self) -> u64 {
        self.failures
    }

    fn resolve(&mut self, host: &dyn HostGrid, layer: LayerId, dir: VerticalDir, tick: u64) -> Option<LayerId> {
        let cache = match dir {
            VerticalDir::Down => &self.lower,
            VerticalDir::Up => &self.upper,
        };
        if let Some(link) = cache.get(&layer) {
            if tick < link.expires_at {
                return link.target;
            }
        }

        let target = host
            .linked_layer(layer, dir)
            .or_else(|| match_by_footprint(&host.layers(), layer, dir));

        let expires_at = tick.saturating_add(if target.is_some() {
            self.ttl
        } else {
            self.negative_ttl
        });
        let link = CachedLink { target, expires_at };
        let previous = match dir {
            VerticalDir::Down => self.lower.insert(layer, link),
            VerticalDir::Up => self.upper.insert(layer, link),
        };

        if dir == VerticalDir::Down {
            if let Some(stale) = previous.and_then(|p| p.target).filter(|t| Some(*t) != target) {
                if let Some(uppers) = self.inverse.get_mut(&stale) {
                    uppers.remove(&layer);
                }
            }
            if let Some(lower) = target {
                self.inverse.entry(lower).or_default().insert(layer);
            }
        }

        if target.is_none() {
            self.failures += 1;
            debug!(layer = layer.get(), ?dir, "no linked layer, retrying after negative ttl");
        }
        target
    }

    /// Collects every layer whose downward link lands on `lower` into `out`.
    ///
    /// The inverse index is (re)populated from all host layers once per
    /// cache lifetime; in between it grows with each downward resolution.
    pub fn uppers_of(&mut self, host: &dyn HostGrid, lower: LayerId, tick: u64, out: &mut Vec<LayerId>) {
        out.clear();
        let stale = self.inverse_expires_at.map_or(true, |at| tick >= at);
        if stale {
            self.inverse_expires_at = Some(tick.saturating_add(self.ttl));
            for info in host.layers() {
                self.resolve_lower(host, info.id, tick);
            }
        }
        let Some(uppers) = self.inverse.get(&lower) else {
            return;
        };
        out.extend(uppers.iter().copied());
        out.retain(|upper| {
            self.lower
                .get(upper)
                .is_some_and(|link| link.target == Some(lower))
        });
    }

    /// Whether anything is known to drain into `lower`.
    #[inline]
    #[must_use]
    pub fn has_uppers(&self, lower: LayerId) -> bool {
        self.inverse.get(&lower).is_some_and(|u| !u.is_empty())
    }

    /// Drops every cached association that names `layer`.
    pub fn evict_layer(&mut self, layer: LayerId) {
        self.lower.remove(&layer);
        self.upper.remove(&layer);
        self.lower.retain(|_, link| link.target != Some(layer));
        self.upper.retain(|_, link| link.target != Some(layer));
        self.inverse.remove(&layer);
        for uppers in self.inverse.values_mut() {
            uppers.remove(&layer);
        }
        self.inverse_expires_at = None;
    }

    /// Forgets everything.
    pub fn clear(&mut self) {
        self.lower.clear();
        self.upper.clear();
        self.inverse.clear();
        self.inverse_expires_at = None;
    }
}

/// Nearest layer below/above with the same footprint and origin.
fn match_by_footprint(layers: &[LayerInfo], layer: LayerId, dir: VerticalDir) -> Option<LayerId> {
    let me = layers.iter().find(|info| info.id == layer)?;
    layers
        .iter()
        .filter(|other| other.id != layer && other.same_footprint(me))
        .filter(|other| match dir {
            VerticalDir::Down => other.level < me.level,
            VerticalDir::Up => other.level > me.level,
        })
        .min_by_key(|other| (other.level.abs_diff(me.level), other.id))
        .map(|other| other.id)
}
