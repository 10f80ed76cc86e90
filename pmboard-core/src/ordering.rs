//! Position arithmetic for drag-and-drop ordering.
//!
//! Features are ordered per (project, status) column, subtasks per feature
//! and milestones per project. Positions are zero-based and dense at rest.
//! The database layer applies these plans inside a transaction.

use uuid::Uuid;

/// Position for an item appended to a scope whose current maximum is `max`.
pub fn next_position(max: Option<i64>) -> i64 {
    max.map_or(0, |max| max + 1)
}

/// Moves `id` to `target` inside `ordered` (ids sorted by current position)
/// and returns the full renumbering as `(id, new_position)` pairs.
///
/// `target` is clamped to the last index. Returns `None` when `id` is not in
/// the scope, which callers treat as a no-op.
pub fn reorder_within(ordered: &[Uuid], id: Uuid, target: usize) -> Option<Vec<(Uuid, i64)>> {
    let from = ordered.iter().position(|candidate| *candidate == id)?;
    let mut items = ordered.to_vec();
    let moved = items.remove(from);
    let to = target.min(items.len());
    items.insert(to, moved);

    Some(
        items
            .into_iter()
            .enumerate()
            .map(|(index, id)| (id, index as i64))
            .collect(),
    )
}

/// Index at which an item entering a scope of `len` items lands. Requests
/// past the end append.
pub fn insertion_index(len: usize, requested: usize) -> i64 {
    requested.min(len) as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(n: usize) -> Vec<Uuid> {
        (0..n).map(|_| Uuid::new_v4()).collect()
    }

    fn order_of(plan: &[(Uuid, i64)]) -> Vec<Uuid> {
        let mut sorted = plan.to_vec();
        sorted.sort_by_key(|(_, pos)| *pos);
        sorted.into_iter().map(|(id, _)| id).collect()
    }

    #[test]
    fn next_position_starts_at_zero() {
        assert_eq!(next_position(None), 0);
        assert_eq!(next_position(Some(0)), 1);
        assert_eq!(next_position(Some(6)), 7);
    }

    #[test]
    fn moves_item_forward() {
        let items = ids(4);
        let plan = reorder_within(&items, items[0], 2).unwrap();
        assert_eq!(order_of(&plan), vec![items[1], items[2], items[0], items[3]]);
    }

    #[test]
    fn moves_item_backward() {
        let items = ids(4);
        let plan = reorder_within(&items, items[3], 0).unwrap();
        assert_eq!(order_of(&plan), vec![items[3], items[0], items[1], items[2]]);
    }

    #[test]
    fn renumbering_is_dense() {
        let items = ids(5);
        let plan = reorder_within(&items, items[1], 3).unwrap();
        let mut positions: Vec<i64> = plan.iter().map(|(_, pos)| *pos).collect();
        positions.sort();
        assert_eq!(positions, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn target_past_end_is_clamped() {
        let items = ids(3);
        let plan = reorder_within(&items, items[0], 99).unwrap();
        assert_eq!(order_of(&plan), vec![items[1], items[2], items[0]]);
    }

    #[test]
    fn missing_item_is_a_no_op() {
        let items = ids(3);
        assert!(reorder_within(&items, Uuid::new_v4(), 0).is_none());
    }

    #[test]
    fn insertion_index_clamps_to_len() {
        assert_eq!(insertion_index(2, 1), 1);
        assert_eq!(insertion_index(2, 2), 2);
        assert_eq!(insertion_index(2, 10), 2);
        assert_eq!(insertion_index(0, 3), 0);
    }
}
