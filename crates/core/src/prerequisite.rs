use thiserror::Error;

/// Hard cap on the prerequisite walk.
///
/// A configured safety bound, not an expected real depth: chains are
/// normally shallow, and exceeding the cap is treated as a suspected cycle
/// rather than recursing without limit.
pub const MAX_PREREQUISITE_DEPTH: usize = 50;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum CycleError {
    #[error("prerequisite chain loops back to the starting node")]
    Circular,

    #[error("prerequisite chain exceeds depth {MAX_PREREQUISITE_DEPTH}")]
    DepthExceeded,
}

/// Write-time guard for attaching a prerequisite edge `node -> candidate`.
///
/// Walks from `candidate` along existing edges supplied by `next`. The walk
/// terminates on the first of: revisiting `node` (cycle), no further
/// prerequisite (ok), or exceeding [`MAX_PREREQUISITE_DEPTH`] (fail-safe,
/// treated as a suspected cycle).
///
/// Lock resolution itself never needs this: at query time a single hop
/// suffices because each layer's lock state already incorporates its own
/// chain.
///
/// # Errors
///
/// Returns `CycleError::Circular` when the walk revisits `node` and
/// `CycleError::DepthExceeded` past the depth cap.
pub fn walk_chain<I, F>(node: I, candidate: I, next: F) -> Result<(), CycleError>
where
    I: Copy + Eq,
    F: Fn(I) -> Option<I>,
{
    if candidate == node {
        return Err(CycleError::Circular);
    }

    let mut cursor = candidate;
    let mut depth = 1;
    while let Some(prereq) = next(cursor) {
        if prereq == node {
            return Err(CycleError::Circular);
        }
        depth += 1;
        if depth > MAX_PREREQUISITE_DEPTH {
            return Err(CycleError::DepthExceeded);
        }
        cursor = prereq;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(edges: &HashMap<u64, u64>) -> impl Fn(u64) -> Option<u64> + '_ {
        |id| edges.get(&id).copied()
    }

    #[test]
    fn no_prerequisite_is_always_fine() {
        let edges = HashMap::new();
        assert_eq!(walk_chain(1, 2, lookup(&edges)), Ok(()));
    }

    #[test]
    fn self_edge_is_circular() {
        let edges = HashMap::new();
        assert_eq!(walk_chain(1, 1, lookup(&edges)), Err(CycleError::Circular));
    }

    #[test]
    fn three_node_cycle_rejected_for_any_closing_edge() {
        // A -> B -> C already exist; adding C -> A closes the cycle.
        let mut edges = HashMap::new();
        edges.insert(1, 2);
        edges.insert(2, 3);
        assert_eq!(walk_chain(3, 1, lookup(&edges)), Err(CycleError::Circular));

        // Same cycle, different last edge: B -> C and C -> A exist, adding
        // A -> B closes it.
        let mut edges = HashMap::new();
        edges.insert(2, 3);
        edges.insert(3, 1);
        assert_eq!(walk_chain(1, 2, lookup(&edges)), Err(CycleError::Circular));
    }

    #[test]
    fn long_valid_chain_passes_under_the_cap() {
        let mut edges = HashMap::new();
        for i in 1..40 {
            edges.insert(i, i + 1);
        }
        assert_eq!(walk_chain(100, 1, lookup(&edges)), Ok(()));
    }

    #[test]
    fn depth_cap_fails_safe() {
        let mut edges = HashMap::new();
        for i in 1..200 {
            edges.insert(i, i + 1);
        }
        assert_eq!(
            walk_chain(1000, 1, lookup(&edges)),
            Err(CycleError::DepthExceeded)
        );
    }

    #[test]
    fn preexisting_disjoint_cycle_hits_the_cap() {
        // A corrupt store already contains B <-> C; attaching A -> B must
        // still terminate.
        let mut edges = HashMap::new();
        edges.insert(2, 3);
        edges.insert(3, 2);
        assert_eq!(
            walk_chain(1, 2, lookup(&edges)),
            Err(CycleError::DepthExceeded)
        );
    }
}
