//! Descendant queries over the family graph.
//!
//! The graph is stored in two relations: `families` (a father and/or mother
//! per family) and `children` (family → person). A person's children are the
//! children of every family in which they appear as a parent.

use std::collections::{HashSet, VecDeque};

use rusqlite::{params, Connection};
use tracing::{debug, instrument};

use crate::error::LocalError;

const CHILDREN_OF_PARENT_SQL: &str = "
    SELECT c.person_id
    FROM families f
    JOIN children c ON c.family_id = f.id
    WHERE f.father_id = ?1 OR f.mother_id = ?1
";

/// Returns whether `target` is `root` or one of its descendants.
///
/// Breadth-first over parent → child links. The visited set makes the walk
/// terminate on cyclic data and on people listed as a child of several
/// families. The children statement is prepared once and finalized when it
/// drops, on every return path.
#[instrument(skip(conn))]
pub fn is_person_in_subtree(conn: &Connection, root: &str, target: &str) -> Result<bool, LocalError> {
    if root == target {
        return Ok(true);
    }

    let mut children_of = conn.prepare(CHILDREN_OF_PARENT_SQL)?;
    let mut visited: HashSet<String> = HashSet::new();
    let mut queue: VecDeque<String> = VecDeque::new();
    queue.push_back(root.to_string());

    while let Some(person) = queue.pop_front() {
        if !visited.insert(person.clone()) {
            continue;
        }

        let children = children_of.query_map(params![person], |row| row.get::<_, Option<String>>(0))?;
        for child in children {
            let Some(child) = child? else { continue };
            if child == target {
                debug!(visited = visited.len(), "target found in subtree");
                return Ok(true);
            }
            if !visited.contains(&child) {
                queue.push_back(child);
            }
        }
    }

    debug!(visited = visited.len(), "target not in subtree");
    Ok(false)
}
