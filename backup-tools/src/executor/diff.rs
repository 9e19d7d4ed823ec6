//! Change detection between two snapshots.
//!
//! Works at top-level granularity: any difference anywhere below a top-level
//! directory flags the whole directory for re-archiving.

use super::manifest::DirectoryEntry;
use std::collections::HashMap;

/// Whether `current` must be archived given its entry in the prior manifest.
///
/// An entry is unchanged only when its own mod time matches and its child set
/// is identical: same count, same names, same mod time for each name.
pub fn needs_backup(current: &DirectoryEntry, previous: Option<&DirectoryEntry>) -> bool {
    let Some(previous) = previous else {
        return true;
    };

    if current.mod_time != previous.mod_time {
        return true;
    }

    if current.children.len() != previous.children.len() {
        return true;
    }

    let previous_children: HashMap<&str, &DirectoryEntry> = previous
        .children
        .iter()
        .map(|c| (c.name.as_str(), c))
        .collect();

    current.children.iter().any(|child| {
        previous_children
            .get(child.name.as_str())
            .map_or(true, |old| old.mod_time != child.mod_time)
    })
}

/// Mark every entry of `current` against `previous`, returning how many need backup.
///
/// Unchanged entries inherit the prior archive path, since their archive is
/// still valid.
pub fn mark_changes(current: &mut [DirectoryEntry], previous: &[DirectoryEntry]) -> usize {
    let by_name: HashMap<&str, &DirectoryEntry> =
        previous.iter().map(|e| (e.name.as_str(), e)).collect();

    let mut flagged = 0;
    for entry in current.iter_mut() {
        let prior = by_name.get(entry.name.as_str()).copied();
        entry.needs_backup = needs_backup(entry, prior);

        if entry.needs_backup {
            flagged += 1;
            tracing::debug!(
                dir = %entry.name,
                new = prior.is_none(),
                "Directory changed since last run"
            );
        } else if entry.archive_path.is_none() {
            entry.archive_path = prior.and_then(|p| p.archive_path.clone());
        }
    }

    flagged
}
