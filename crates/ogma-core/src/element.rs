//! Graph element handles.
//!
//! The core never holds backend objects directly. An [`ElementRef`] is a
//! lightweight token (kind + backend-native id string); all element state
//! lives behind the [`GraphAdapter`](crate::adapter::GraphAdapter).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Whether a graph element is a vertex or an edge.
///
/// Also used as the kind of a [`Schema`](crate::schema::Schema), since a
/// mapped type corresponds to exactly one element kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementKind {
    Vertex,
    Edge,
}

impl ElementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ElementKind::Vertex => "vertex",
            ElementKind::Edge => "edge",
        }
    }
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Direction of an adjacency, from the point of view of the element that
/// declares it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Out,
    In,
}

impl Direction {
    /// The other end of the same edge.
    pub fn opposite(&self) -> Direction {
        match self {
            Direction::Out => Direction::In,
            Direction::In => Direction::Out,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Out => "out",
            Direction::In => "in",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Token identifying one element inside a backend.
///
/// The `id` is the backend-native id string, pre-encoding; callers of the
/// repository façade only ever see encoded ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementRef {
    pub kind: ElementKind,
    pub id: String,
}

impl ElementRef {
    pub fn vertex(id: impl Into<String>) -> Self {
        Self {
            kind: ElementKind::Vertex,
            id: id.into(),
        }
    }

    pub fn edge(id: impl Into<String>) -> Self {
        Self {
            kind: ElementKind::Edge,
            id: id.into(),
        }
    }

    pub fn is_vertex(&self) -> bool {
        self.kind == ElementKind::Vertex
    }

    pub fn is_edge(&self) -> bool {
        self.kind == ElementKind::Edge
    }
}

impl fmt::Display for ElementRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_opposite() {
        assert_eq!(Direction::Out.opposite(), Direction::In);
        assert_eq!(Direction::In.opposite(), Direction::Out);
    }

    #[test]
    fn test_element_ref_display() {
        assert_eq!(ElementRef::vertex("v1").to_string(), "vertex:v1");
        assert_eq!(ElementRef::edge("e9").to_string(), "edge:e9");
    }
}
