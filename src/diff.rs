//! Snapshot change detection
//!
//! Pure field-by-field comparison of two normalized snapshots.

use crate::types::{AccountSnapshot, ChangeSet, FieldChange};

/// Compare two snapshots of the same address.
///
/// A field is reported iff its previous and current values differ. Neither
/// input is modified; `diff(s, s)` is always empty.
pub fn diff(previous: &AccountSnapshot, current: &AccountSnapshot) -> ChangeSet {
    let mut set = ChangeSet::default();

    for name in AccountSnapshot::FIELDS {
        // Both snapshots carry every name in FIELDS
        let (Some(prev), Some(cur)) = (previous.field(name), current.field(name)) else {
            continue;
        };
        if prev != cur {
            set.changes.insert(
                name,
                FieldChange {
                    previous: prev,
                    current: cur,
                },
            );
        }
    }

    set
}
