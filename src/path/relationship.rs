use derive_more::Display;

/// Structural relationship of path A to path B.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum PathRelationship {
    Equal,
    /// A is an immediate child of B
    ADirectlyInsideB,
    /// A is nested in B, more than one level down
    AInsideB,
    /// B is an immediate child of A
    BDirectlyInsideA,
    /// B is nested in A, more than one level down
    BInsideA,
    Different,
}

impl PathRelationship {
    /// The relationship of B to A, i.e. the same comparison with the arguments swapped.
    pub fn mirrored(self) -> Self {
        match self {
            PathRelationship::Equal => PathRelationship::Equal,
            PathRelationship::ADirectlyInsideB => PathRelationship::BDirectlyInsideA,
            PathRelationship::AInsideB => PathRelationship::BInsideA,
            PathRelationship::BDirectlyInsideA => PathRelationship::ADirectlyInsideB,
            PathRelationship::BInsideA => PathRelationship::AInsideB,
            PathRelationship::Different => PathRelationship::Different,
        }
    }

    /// A is a strict descendant of B
    pub fn a_inside_b(self) -> bool {
        matches!(
            self,
            PathRelationship::ADirectlyInsideB | PathRelationship::AInsideB
        )
    }

    /// B is a strict descendant of A
    pub fn b_inside_a(self) -> bool {
        matches!(
            self,
            PathRelationship::BDirectlyInsideA | PathRelationship::BInsideA
        )
    }
}

/// Splits a path into its meaningful segments.
///
/// The path is trimmed first, then `.` and empty segments are dropped,
/// so `"./a//b/"` and `"a/b"` yield the same tokens.
pub fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.trim()
        .split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".")
}

/// Canonical `seg/seg/seg` form of a path, `""` for the root.
pub fn normalize(path: &str) -> String {
    segments(path).collect::<Vec<_>>().join("/")
}

/// Joins a child name onto a normalized parent path.
pub fn join(parent: &str, name: &str) -> String {
    let name = normalize(name);
    match (parent.is_empty(), name.is_empty()) {
        (true, _) => name,
        (false, true) => parent.to_string(),
        (false, false) => format!("{parent}/{name}"),
    }
}

/// Parent of a normalized path, `None` for the root.
pub fn parent(path: &str) -> Option<&str> {
    if path.is_empty() {
        return None;
    }
    Some(path.rfind('/').map_or("", |index| &path[..index]))
}

/// Compares two slash-delimited paths token by token.
pub fn relationship(a: &str, b: &str) -> PathRelationship {
    let a_tokens = segments(a).collect::<Vec<_>>();
    let b_tokens = segments(b).collect::<Vec<_>>();

    if a_tokens.iter().zip(&b_tokens).any(|(x, y)| x != y) {
        return PathRelationship::Different;
    }

    match a_tokens.len() as isize - b_tokens.len() as isize {
        0 => PathRelationship::Equal,
        1 => PathRelationship::ADirectlyInsideB,
        -1 => PathRelationship::BDirectlyInsideA,
        extra if extra > 1 => PathRelationship::AInsideB,
        _ => PathRelationship::BInsideA,
    }
}
