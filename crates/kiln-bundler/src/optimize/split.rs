//! Chunk split policy.
//!
//! Every entry gets an entry chunk named after it and a `runtime~<entry>`
//! chunk with the registry bootstrap. Third-party modules move to a shared
//! `vendors` chunk. With two or more entries, first-party modules reachable
//! from more than one entry move to a shared `common` chunk. Dynamically
//! imported modules are reachable like any other dependency, so they are
//! eligible for extraction too.
//!
//! Module order inside every chunk is dependency-first.

use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use tracing::debug;

use crate::asset::AssetId;
use crate::graph::{BuildGraph, Chunk, ChunkKind};
use crate::runtime::runtime_chunk_name;

pub const VENDOR_CHUNK: &str = "vendors";
pub const COMMON_CHUNK: &str = "common";

/// Partition the graph's modules into chunks, replacing `graph.chunks`.
pub fn split_chunks(graph: &mut BuildGraph) {
    let reach: IndexMap<String, Vec<AssetId>> = graph
        .entries
        .iter()
        .map(|(name, id)| (name.clone(), graph.post_order(id)))
        .collect();

    let mut reached_by: FxHashMap<&AssetId, usize> = FxHashMap::default();
    for modules in reach.values() {
        for id in modules {
            *reached_by.entry(id).or_default() += 1;
        }
    }
    let multi_entry = reach.len() > 1;
    let placement = |id: &AssetId| {
        if id.is_vendor() {
            Some(ChunkKind::Vendor)
        } else if multi_entry && reached_by.get(id).copied().unwrap_or(0) > 1 {
            Some(ChunkKind::Common)
        } else {
            None
        }
    };

    let mut vendors = Chunk::new(VENDOR_CHUNK, ChunkKind::Vendor);
    let mut common = Chunk::new(COMMON_CHUNK, ChunkKind::Common);
    let mut runtimes = Vec::new();
    let mut entries = Vec::new();

    for (name, modules) in &reach {
        let mut entry = Chunk::new(name.clone(), ChunkKind::Entry);
        entry.entries.push(name.clone());

        for id in modules {
            let shared = match placement(id) {
                Some(ChunkKind::Vendor) => &mut vendors,
                Some(_) => &mut common,
                None => {
                    entry.modules.push(id.clone());
                    continue;
                }
            };
            if !shared.entries.contains(name) {
                shared.entries.push(name.clone());
            }
            if !shared.modules.contains(id) {
                shared.modules.push(id.clone());
            }
        }

        let mut runtime = Chunk::new(runtime_chunk_name(name), ChunkKind::Runtime);
        runtime.entries.push(name.clone());
        runtimes.push(runtime);
        entries.push(entry);
    }

    let mut chunks = runtimes;
    chunks.extend([vendors, common].into_iter().filter(|c| !c.modules.is_empty()));
    chunks.extend(entries);

    debug!(
        chunks = chunks.len(),
        modules = graph.modules.len(),
        "split chunks"
    );
    graph.chunks = chunks;
}

/// Chunk names `entry` loads, in load order.
pub fn entry_chunks<'g>(graph: &'g BuildGraph, entry: &str) -> Vec<&'g Chunk> {
    let mut chunks: Vec<(usize, &Chunk)> = graph
        .chunks
        .iter()
        .enumerate()
        .filter(|(_, c)| c.entries.iter().any(|e| e == entry))
        .collect();
    chunks.sort_by_key(|(i, c)| (c.kind, *i));
    chunks.into_iter().map(|(_, c)| c).collect()
}
