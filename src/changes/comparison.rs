use derive_more::Display;

use crate::changes::{ChangeEvent, ChangeKind};
use crate::path::{PathRelationship, relationship};

/// How a newer event relates to an older one for a related path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum EventComparison {
    /// The paths are unrelated
    Different,
    /// The old event still describes the net effect, it just happened again
    NewUpdatesOld,
    /// The old event no longer matters, the new one replaces it
    NewMakesOldObsolete,
    /// The new event is already covered by the old one
    NewObsolete,
    /// The pair can not happen with ordered delivery
    Inconsistent,
}

/// Classifies `new` against `old`.
pub fn compare(old: &ChangeEvent, new: &ChangeEvent) -> EventComparison {
    use ChangeKind::*;
    use EventComparison::*;

    let old_kind = old.kind();
    let new_kind = new.kind();

    match relationship(old.path(), new.path()) {
        PathRelationship::Equal => match (old_kind, new_kind) {
            (Add, Change) | (Change, Change) => NewUpdatesOld,
            (Add, Unlink) | (Unlink, Add) | (Change, Unlink) => NewMakesOldObsolete,
            (UnlinkDir, AddDir) | (AddDir, UnlinkDir) => NewMakesOldObsolete,
            _ => Inconsistent,
        },
        // The old event sits somewhere under the new path. Only a removal of the
        // whole subtree makes sense here, anything else means the new path was
        // never recorded as a directory.
        PathRelationship::ADirectlyInsideB | PathRelationship::AInsideB => match new_kind {
            UnlinkDir => NewMakesOldObsolete,
            _ => Inconsistent,
        },
        PathRelationship::BDirectlyInsideA => match old_kind {
            // still being enumerated, enumerate again
            AddDir => NewUpdatesOld,
            UnlinkDir => NewObsolete,
            _ => Inconsistent,
        },
        PathRelationship::BInsideA => match old_kind {
            AddDir | UnlinkDir => NewObsolete,
            _ => Inconsistent,
        },
        PathRelationship::Different => Different,
    }
}

/// Whether the two events touch the same path or one lies inside the other.
pub fn related(a: &ChangeEvent, b: &ChangeEvent) -> bool {
    let relation = relationship(a.path(), b.path());
    relation == PathRelationship::Equal || relation.a_inside_b() || relation.b_inside_a()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::*;

    use crate::changes::ChangeKind::*;
    use crate::changes::EventComparison::*;

    const KINDS: [ChangeKind; 5] = [Add, AddDir, Change, Unlink, UnlinkDir];

    #[rstest]
    #[case(Add, Change, NewUpdatesOld)]
    #[case(Add, Unlink, NewMakesOldObsolete)]
    #[case(Unlink, Add, NewMakesOldObsolete)]
    #[case(Change, Change, NewUpdatesOld)]
    #[case(Change, Unlink, NewMakesOldObsolete)]
    #[case(UnlinkDir, AddDir, NewMakesOldObsolete)]
    #[case(AddDir, UnlinkDir, NewMakesOldObsolete)]
    fn equal_paths_follow_the_transition_table(
        #[case] old: ChangeKind,
        #[case] new: ChangeKind,
        #[case] expected: EventComparison,
    ) {
        let result = compare(&ChangeEvent::new(old, "x/y"), &ChangeEvent::new(new, "x/y"));
        assert_eq!(result, expected);
    }

    #[test]
    fn every_unlisted_equal_pairing_is_inconsistent() {
        let listed = [
            (Add, Change),
            (Add, Unlink),
            (Unlink, Add),
            (Change, Change),
            (Change, Unlink),
            (UnlinkDir, AddDir),
            (AddDir, UnlinkDir),
        ];

        for old in KINDS {
            for new in KINDS {
                if listed.contains(&(old, new)) {
                    continue;
                }
                let result = compare(&ChangeEvent::new(old, "p"), &ChangeEvent::new(new, "p"));
                assert_eq!(result, Inconsistent, "{old} then {new}");
            }
        }
    }

    #[rstest]
    #[case("d/x")]
    #[case("d/x/y/z")]
    fn old_inside_new_is_only_valid_for_subtree_removal(#[case] old_path: &str) {
        for old in KINDS {
            for new in KINDS {
                let expected = if new == UnlinkDir {
                    NewMakesOldObsolete
                } else {
                    Inconsistent
                };
                let result =
                    compare(&ChangeEvent::new(old, old_path), &ChangeEvent::new(new, "d"));
                assert_eq!(result, expected, "{old} at {old_path} then {new} at d");
            }
        }
    }

    #[test]
    fn new_directly_inside_old() {
        for new in KINDS {
            let new_event = ChangeEvent::new(new, "d/x");
            for old in KINDS {
                let expected = match old {
                    AddDir => NewUpdatesOld,
                    UnlinkDir => NewObsolete,
                    _ => Inconsistent,
                };
                assert_eq!(compare(&ChangeEvent::new(old, "d"), &new_event), expected);
            }
        }
    }

    #[test]
    fn new_deeper_inside_old() {
        for new in KINDS {
            let new_event = ChangeEvent::new(new, "d/x/y");
            for old in KINDS {
                let expected = if old.is_directory() {
                    NewObsolete
                } else {
                    Inconsistent
                };
                assert_eq!(compare(&ChangeEvent::new(old, "d"), &new_event), expected);
            }
        }
    }

    #[test]
    fn root_directory_covers_everything() {
        let root = ChangeEvent::add_dir("");
        assert_eq!(compare(&root, &ChangeEvent::add("a.txt")), NewUpdatesOld);
        assert_eq!(compare(&root, &ChangeEvent::add("sub/a.txt")), NewObsolete);
    }

    #[test]
    fn unrelated_paths_are_different() {
        for old in KINDS {
            for new in KINDS {
                let result = compare(&ChangeEvent::new(old, "a/b"), &ChangeEvent::new(new, "a/c"));
                assert_eq!(result, Different);
            }
        }
    }

    #[test]
    fn related_is_boundary_aware() {
        assert!(related(&ChangeEvent::add("a/b"), &ChangeEvent::unlink_dir("a")));
        assert!(related(&ChangeEvent::add("a/b"), &ChangeEvent::change("./a/b")));
        assert!(!related(&ChangeEvent::add("ab"), &ChangeEvent::unlink_dir("a")));
        assert!(!related(&ChangeEvent::add("a/b"), &ChangeEvent::add("a/c")));
    }
}
