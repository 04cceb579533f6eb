// esbflow/src/pipeline/path.rs

//! Maps processor instances to their position strings within a flow.

use crate::core::processor::{processor_key, Processor};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tracing::{event, Level};

struct PathCache {
  paths: HashMap<usize, String>,
  // Containers whose inner paths have not been asked for yet.
  pending: VecDeque<Arc<dyn Processor>>,
  // Keeps every keyed processor alive so its address cannot be reused while cached.
  retained: Vec<Arc<dyn Processor>>,
}

impl PathCache {
  fn build(flow_name: &str, processors: &[Arc<dyn Processor>]) -> Self {
    let mut cache = PathCache {
      paths: HashMap::with_capacity(processors.len()),
      pending: VecDeque::new(),
      retained: Vec::with_capacity(processors.len()),
    };
    for (idx, processor) in processors.iter().enumerate() {
      cache.insert(processor, format!("/{}/processors/{}", flow_name, idx));
      if processor.path_container().is_some() {
        cache.pending.push_back(Arc::clone(processor));
      }
    }
    cache
  }

  // First resolution of a processor wins.
  fn insert(&mut self, processor: &Arc<dyn Processor>, path: String) {
    let key = processor_key(processor.as_ref());
    if let std::collections::hash_map::Entry::Vacant(slot) = self.paths.entry(key) {
      slot.insert(path);
      self.retained.push(Arc::clone(processor));
    }
  }
}

/// Lazily built, memoized processor path lookup.
///
/// Static processors are addressed as `/<flow>/processors/<index>`. Processors
/// managed inside a path container are addressed by the path the container
/// reports. Each container is asked for its inner paths at most once until the
/// cache is invalidated.
pub(crate) struct ProcessorPathResolver {
  flow_name: String,
  cache: Mutex<Option<PathCache>>,
}

impl ProcessorPathResolver {
  pub(crate) fn new(flow_name: String) -> Self {
    Self {
      flow_name,
      cache: Mutex::new(None),
    }
  }

  /// Drops the cache; the next lookup rebuilds it from the current topology.
  pub(crate) fn invalidate(&self) {
    *self.cache.lock() = None;
  }

  pub(crate) fn resolve(&self, processors: &[Arc<dyn Processor>], target: &dyn Processor) -> Option<String> {
    let key = processor_key(target);
    // Held across container resolution so no container is built twice.
    let mut guard = self.cache.lock();
    let cache = guard.get_or_insert_with(|| PathCache::build(&self.flow_name, processors));

    if let Some(path) = cache.paths.get(&key) {
      return Some(path.clone());
    }

    while let Some(container) = cache.pending.pop_front() {
      let Some(paths) = container.path_container().map(|c| c.inner_paths()) else {
        continue;
      };
      event!(Level::TRACE, flow = %self.flow_name, container = %container.name(), entries = paths.len(), "Resolved container inner paths.");
      for (inner, path) in paths {
        cache.insert(&inner, path);
      }
      if let Some(path) = cache.paths.get(&key) {
        return Some(path.clone());
      }
    }
    None
  }
}
