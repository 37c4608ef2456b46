use super::args::Fields;

/// A boolean query expression.
///
/// Combining never mutates an operand; every call returns a new node, so one condition can be
/// reused in several expressions. Translation happens in
/// [`QueryBuilder::build_q`](super::QueryBuilder::build_q).
///
/// ```
/// use docmap::query::{Fields, Q};
/// let adults = Q::new(Fields::new().with("age__gte", 18));
/// let admins = Q::new(Fields::new().with("role", "admin"));
/// let either = adults.or(&admins);
/// let both = adults.and(&admins);
/// # let _ = (either, both);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum Q {
    Leaf(Fields),
    And(Box<Q>, Box<Q>),
    Or(Box<Q>, Box<Q>),
    Not(Box<Q>),
}

impl Q {
    #[must_use]
    pub const fn new(fields: Fields) -> Self {
        Self::Leaf(fields)
    }

    #[must_use]
    pub fn and(&self, other: &Self) -> Self {
        Self::And(Box::new(self.clone()), Box::new(other.clone()))
    }

    #[must_use]
    pub fn or(&self, other: &Self) -> Self {
        Self::Or(Box::new(self.clone()), Box::new(other.clone()))
    }

    /// Negation, emitted as `{$nor: [expr]}`.
    #[must_use]
    pub fn not(&self) -> Self {
        Self::Not(Box::new(self.clone()))
    }

    /// Number of leaves in the tree.
    #[must_use]
    pub fn leaf_count(&self) -> usize {
        match self {
            Self::Leaf(_) => 1,
            Self::And(l, r) | Self::Or(l, r) => l.leaf_count() + r.leaf_count(),
            Self::Not(inner) => inner.leaf_count(),
        }
    }
}

impl From<Fields> for Q {
    fn from(fields: Fields) -> Self {
        Self::Leaf(fields)
    }
}
