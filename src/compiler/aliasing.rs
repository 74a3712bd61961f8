//! Memory aliasing.
//!
//! Resources whose pass spans do not overlap may share bytes. Placement uses
//! interval buckets:
//!
//! 1. Sort lifetimes by descending size, ties by key.
//! 2. Each bucket is a tree rooted at the first resource placed in it. A node
//!    accepts a candidate only if their lifetimes are disjoint. Children are
//!    searched depth-first; if none accepts, the candidate is appended after
//!    the node's last child, aligned, as long as it stays inside the node
//!    (the root may grow up to the largest bucket seen so far).
//! 3. A candidate no bucket accepts opens a new bucket.
//! 4. Buckets are laid out back to back, each base aligned to the least
//!    common multiple of the alignments inside it.
//!
//! The packing is not minimal; it is deterministic and every result keeps
//! overlapping lifetimes in disjoint byte ranges.

use std::fmt;

use crate::types::MemoryLocation;

use super::align_up;

/// Allocator input and output for one resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceLifetime {
    /// Caller key, used for tie breaking and to map results back.
    pub key: u32,
    /// First pass index (inclusive).
    pub begin: u32,
    /// Last pass index (inclusive).
    pub end: u32,
    /// Size in bytes.
    pub size: u64,
    /// Required alignment in bytes.
    pub alignment: u64,
    /// Assigned byte offset (output).
    pub offset: u64,
}

impl ResourceLifetime {
    /// Create a lifetime with an unassigned offset.
    pub fn new(key: u32, begin: u32, end: u32, size: u64, alignment: u64) -> Self {
        Self {
            key,
            begin,
            end,
            size,
            alignment,
            offset: 0,
        }
    }

    /// Returns true if the two lifetimes share a pass.
    pub fn overlaps(&self, other: &ResourceLifetime) -> bool {
        self.begin <= other.end && other.begin <= self.end
    }

    fn effective_alignment(&self) -> u64 {
        self.alignment.max(1)
    }
}

#[derive(Debug)]
struct Node {
    item: usize,
    offset: u64,
    end: u64,
    children: Vec<Node>,
}

impl Node {
    fn new(item: usize, offset: u64, size: u64) -> Self {
        Self {
            item,
            offset,
            end: offset + size,
            children: Vec::new(),
        }
    }

    /// Extent of the node including children appended past its own end.
    fn extent(&self) -> u64 {
        self.children
            .iter()
            .map(Node::extent)
            .fold(self.end, u64::max)
    }

    fn try_place(
        &mut self,
        lifetimes: &[ResourceLifetime],
        candidate: usize,
        limit: u64,
    ) -> Option<u64> {
        let item = &lifetimes[candidate];
        if lifetimes[self.item].overlaps(item) {
            return None;
        }
        for child in &mut self.children {
            let child_limit = child.end;
            if let Some(offset) = child.try_place(lifetimes, candidate, child_limit) {
                return Some(offset);
            }
        }
        let start = self
            .children
            .last()
            .map_or(self.offset, |last| last.end);
        let offset = align_up(start, item.effective_alignment());
        if offset + item.size > limit {
            return None;
        }
        self.children.push(Node::new(candidate, offset, item.size));
        Some(offset)
    }

    fn visit(&self, f: &mut impl FnMut(usize)) {
        f(self.item);
        for child in &self.children {
            child.visit(f);
        }
    }
}

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

/// Least common multiple; every member alignment divides the bucket base.
fn lcm(a: u64, b: u64) -> u64 {
    a / gcd(a, b) * b
}

/// Assign offsets to `lifetimes` and return the total backing size.
///
/// Guarantees `offset % alignment == 0` for every entry and disjoint byte
/// ranges for every pair with overlapping lifetimes. Identical input yields
/// identical offsets.
pub fn alias_lifetimes(lifetimes: &mut [ResourceLifetime]) -> u64 {
    if lifetimes.is_empty() {
        return 0;
    }

    let mut order: Vec<usize> = (0..lifetimes.len()).collect();
    order.sort_by(|&a, &b| {
        lifetimes[b]
            .size
            .cmp(&lifetimes[a].size)
            .then(lifetimes[a].key.cmp(&lifetimes[b].key))
    });

    let mut buckets: Vec<Node> = Vec::new();
    let mut in_bucket = vec![0u64; lifetimes.len()];

    for candidate in order {
        let largest = buckets.iter().map(Node::extent).max().unwrap_or(0);
        let mut placed = None;
        for bucket in &mut buckets {
            let limit = bucket.end.max(largest);
            if let Some(offset) = bucket.try_place(lifetimes, candidate, limit) {
                placed = Some(offset);
                break;
            }
        }
        match placed {
            Some(offset) => in_bucket[candidate] = offset,
            None => {
                in_bucket[candidate] = 0;
                buckets.push(Node::new(candidate, 0, lifetimes[candidate].size));
            }
        }
    }

    let mut base = 0u64;
    let mut total = 0u64;
    for bucket in &buckets {
        let mut members = Vec::new();
        bucket.visit(&mut |item| members.push(item));
        let alignment = members
            .iter()
            .map(|&item| lifetimes[item].effective_alignment())
            .fold(1, lcm);
        base = align_up(base, alignment);
        for item in members {
            lifetimes[item].offset = base + in_bucket[item];
        }
        base += bucket.extent();
        total = base;
    }
    total
}

// ============================================================================
// Aliasing report
// ============================================================================

/// One resource placement in the aliasing map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AliasingEntry {
    /// Resource name.
    pub name: String,
    /// Size in bytes.
    pub size: u64,
    /// Alignment in bytes.
    pub alignment: u64,
    /// Offset inside the pool.
    pub offset: u64,
    /// First pass using the resource.
    pub first_pass: u32,
    /// Last pass using the resource.
    pub last_pass: u32,
}

/// Aliasing map of one memory pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolReport {
    /// Memory location of the pool.
    pub location: MemoryLocation,
    /// Bytes required this frame.
    pub total_size: u64,
    /// Placements, sorted by offset.
    pub entries: Vec<AliasingEntry>,
}

/// Human-readable aliasing map of a compiled frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AliasingReport {
    /// One report per non-empty pool.
    pub pools: Vec<PoolReport>,
}

impl AliasingReport {
    /// Report of one pool, if it had any resource.
    pub fn pool(&self, location: MemoryLocation) -> Option<&PoolReport> {
        self.pools.iter().find(|pool| pool.location == location)
    }

    /// Bytes required by one pool.
    pub fn total_size(&self, location: MemoryLocation) -> u64 {
        self.pool(location).map_or(0, |pool| pool.total_size)
    }

    /// Look up an entry by resource name.
    pub fn entry(&self, name: &str) -> Option<&AliasingEntry> {
        self.pools
            .iter()
            .flat_map(|pool| pool.entries.iter())
            .find(|entry| entry.name == name)
    }
}

impl fmt::Display for AliasingReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for pool in &self.pools {
            writeln!(f, "{:?} pool: {} bytes", pool.location, pool.total_size)?;
            for entry in &pool.entries {
                writeln!(
                    f,
                    "  {:<24} offset {:>10} size {:>10} passes [{}, {}]",
                    entry.name, entry.offset, entry.size, entry.first_pass, entry.last_pass
                )?;
            }
        }
        Ok(())
    }
}
