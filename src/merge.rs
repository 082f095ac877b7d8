//! Merge of per-shard result lists under the global limit.

/// Merged output and whether the limit truncated it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Merged<T> {
    pub items: Vec<T>,
    pub limit_hit: bool,
}

/// Concatenate shard lists and truncate to `limit` items.
///
/// Shards are ordered by their key (the input position) before concatenation,
/// so output order does not depend on which shard finished first; each
/// shard's own order is kept. `limit <= 0` means unlimited.
pub fn merge_limited<T>(mut shards: Vec<(usize, Vec<T>)>, limit: i64) -> Merged<T> {
    shards.sort_by_key(|(key, _)| *key);

    let total: usize = shards.iter().map(|(_, items)| items.len()).sum();
    let cap = usize::try_from(limit).ok().filter(|&l| l > 0);

    let mut items = Vec::with_capacity(cap.map_or(total, |l| l.min(total)));
    for (_, shard) in shards {
        items.extend(shard);
    }

    match cap {
        Some(cap) if total > cap => {
            items.truncate(cap);
            Merged {
                items,
                limit_hit: true,
            }
        }
        _ => Merged {
            items,
            limit_hit: false,
        },
    }
}
