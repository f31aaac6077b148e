use crate::provider::ListingEntry;
use crate::timestamp::parse_last_modified;

/// Which queue a migrate work item should land on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueKind {
    Primary,
    Verify,
}

/// The outcome of comparing a remote and local entry that share a name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Equal,
    TimeDiff,
    EtagDiff,
}

/// Compares two listing entries with the same name: equal etags and times
/// means the object is fully migrated; equal times with differing etags is
/// the etag-conflict case the large-object handler needs to deep-compare;
/// otherwise whichever side is newer determines whether to skip or migrate.
pub fn cmp_meta(remote: &ListingEntry, local: &ListingEntry) -> Comparison {
    let times_equal = remote.last_modified == local.last_modified;
    if times_equal {
        if remote.hash == local.hash {
            Comparison::Equal
        } else {
            Comparison::EtagDiff
        }
    } else {
        Comparison::TimeDiff
    }
}

/// A single decision produced by [`reconcile`].
#[derive(Debug, Clone)]
pub enum ReconcileAction {
    /// Missing or stale locally: schedule a copy/update.
    Migrate {
        name: String,
        queue: QueueKind,
        /// The remote listing entry's `last_modified`, carried through so the
        /// migrate step can resolve a write timestamp against it.
        last_modified: String,
    },
    /// Present locally, same timestamp but different etag: needs the
    /// large-object deep-comparison path rather than a blind overwrite.
    NeedsDeepCompare { name: String },
    /// Present locally but absent remotely: reconcile as a deletion.
    Delete { name: String },
}

/// Result of one reconciliation sweep over a pair of sorted listings.
#[derive(Debug, Clone, Default)]
pub struct ReconcileOutcome {
    pub actions: Vec<ReconcileAction>,
    pub marker: String,
    pub scanned: u64,
}

/// Performs the sorted merge-join between a remote and a local listing.
/// `remote` and `local` must already be sorted ascending by `name`. When
/// `list_all` is true, every migrate action goes to the primary queue
/// regardless of `is_primary`; otherwise `is_primary(name)` decides.
pub fn reconcile(
    remote: &[ListingEntry],
    local: &[ListingEntry],
    list_all: bool,
    is_primary: impl Fn(&str) -> bool,
) -> ReconcileOutcome {
    let mut actions = Vec::new();
    let mut marker = String::new();
    let mut scanned = 0u64;

    let mut ri = 0usize;
    let mut li = 0usize;

    while ri < remote.len() {
        let r = &remote[ri];
        let queue_for = |name: &str| {
            if list_all || is_primary(name) {
                QueueKind::Primary
            } else {
                QueueKind::Verify
            }
        };

        match local.get(li) {
            None => {
                actions.push(ReconcileAction::Migrate {
                    name: r.name.clone(),
                    queue: queue_for(&r.name),
                    last_modified: r.last_modified.clone(),
                });
                marker = r.name.clone();
                scanned += 1;
                ri += 1;
            }
            Some(l) if l.name > r.name => {
                actions.push(ReconcileAction::Migrate {
                    name: r.name.clone(),
                    queue: queue_for(&r.name),
                    last_modified: r.last_modified.clone(),
                });
                marker = r.name.clone();
                scanned += 1;
                ri += 1;
            }
            Some(l) if l.name < r.name => {
                actions.push(ReconcileAction::Delete { name: l.name.clone() });
                li += 1;
            }
            Some(l) => {
                match cmp_meta(r, l) {
                    Comparison::Equal => {}
                    Comparison::EtagDiff => {
                        actions.push(ReconcileAction::NeedsDeepCompare { name: r.name.clone() });
                    }
                    Comparison::TimeDiff => {
                        if is_remote_newer(r, l) {
                            actions.push(ReconcileAction::Migrate {
                                name: r.name.clone(),
                                queue: queue_for(&r.name),
                                last_modified: r.last_modified.clone(),
                            });
                        }
                    }
                }
                marker = r.name.clone();
                scanned += 1;
                ri += 1;
                li += 1;
            }
        }
    }

    // Remaining local-only entries beyond the remote listing's end are
    // candidates for reconciliation as deletions too.
    while li < local.len() {
        actions.push(ReconcileAction::Delete {
            name: local[li].name.clone(),
        });
        li += 1;
    }

    ReconcileOutcome { actions, marker, scanned }
}

fn is_remote_newer(remote: &ListingEntry, local: &ListingEntry) -> bool {
    match (parse_last_modified(&remote.last_modified), parse_last_modified(&local.last_modified)) {
        (Ok(r), Ok(l)) => r > l,
        // If either timestamp fails to parse (e.g. local stores the internal
        // fixed-point format rather than RFC3339), fall back to string
        // comparison, which is still monotonic for same-format timestamps.
        _ => remote.last_modified > local.last_modified,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, hash: &str, last_modified: &str) -> ListingEntry {
        ListingEntry {
            name: name.to_string(),
            hash: hash.to_string(),
            bytes: 10,
            last_modified: last_modified.to_string(),
        }
    }

    #[test]
    fn missing_locally_is_a_migrate() {
        let remote = vec![entry("k1", "aaa", "2024-01-01T00:00:00Z")];
        let local = vec![];
        let outcome = reconcile(&remote, &local, true, |_| true);
        assert_eq!(outcome.scanned, 1);
        assert!(matches!(outcome.actions[0], ReconcileAction::Migrate { .. }));
        assert_eq!(outcome.marker, "k1");
    }

    #[test]
    fn equal_entries_are_skipped() {
        let remote = vec![entry("k1", "aaa", "2024-01-01T00:00:00Z")];
        let local = vec![entry("k1", "aaa", "2024-01-01T00:00:00Z")];
        let outcome = reconcile(&remote, &local, true, |_| true);
        assert!(outcome.actions.is_empty());
        assert_eq!(outcome.scanned, 1);
    }

    #[test]
    fn absent_remotely_triggers_delete() {
        let remote = vec![entry("k2", "bbb", "2024-01-01T00:00:00Z")];
        let local = vec![
            entry("k1", "aaa", "2024-01-01T00:00:00Z"),
            entry("k2", "bbb", "2024-01-01T00:00:00Z"),
        ];
        let outcome = reconcile(&remote, &local, true, |_| true);
        assert!(matches!(outcome.actions[0], ReconcileAction::Delete { ref name } if name == "k1"));
    }

    #[test]
    fn same_time_different_etag_needs_deep_compare() {
        let remote = vec![entry("k1", "aaa", "2024-01-01T00:00:00Z")];
        let local = vec![entry("k1", "zzz", "2024-01-01T00:00:00Z")];
        let outcome = reconcile(&remote, &local, true, |_| true);
        assert!(matches!(outcome.actions[0], ReconcileAction::NeedsDeepCompare { .. }));
    }

    #[test]
    fn remote_newer_triggers_update_local_newer_skips() {
        let remote = vec![entry("k1", "aaa", "2024-01-02T00:00:00Z")];
        let local = vec![entry("k1", "bbb", "2024-01-01T00:00:00Z")];
        let outcome = reconcile(&remote, &local, true, |_| true);
        assert!(matches!(outcome.actions[0], ReconcileAction::Migrate { .. }));

        let remote2 = vec![entry("k1", "aaa", "2024-01-01T00:00:00Z")];
        let local2 = vec![entry("k1", "bbb", "2024-01-02T00:00:00Z")];
        let outcome2 = reconcile(&remote2, &local2, true, |_| true);
        assert!(outcome2.actions.is_empty());
    }

    #[test]
    fn non_primary_objects_route_to_verify_queue_when_not_listing_all() {
        let remote = vec![entry("k1", "aaa", "2024-01-01T00:00:00Z")];
        let local = vec![];
        let outcome = reconcile(&remote, &local, false, |_| false);
        assert!(matches!(
            outcome.actions[0],
            ReconcileAction::Migrate { queue: QueueKind::Verify, .. }
        ));
    }
}
