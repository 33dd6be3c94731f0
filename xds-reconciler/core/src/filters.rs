use serde::{Deserialize, Serialize};

/// A filter identified by name within an ordered filter list.
pub trait NamedFilter {
    fn name(&self) -> &str;
}

/// An ordered list of filters.
///
/// Well-formed chains hold at most one terminal filter; insertions are
/// positioned relative to the first filter matching a predicate.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderedFilters<F>(Vec<F>);

// === impl OrderedFilters ===

impl<F> OrderedFilters<F> {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, F> {
        self.0.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, F> {
        self.0.iter_mut()
    }

    pub fn push(&mut self, filter: F) {
        self.0.push(filter);
    }

    pub fn position(&self, predicate: impl FnMut(&F) -> bool) -> Option<usize> {
        self.0.iter().position(predicate)
    }

    /// Inserts `filter` immediately before the first filter matching
    /// `predicate`. Returns false, leaving the list unchanged, if no filter
    /// matches.
    pub fn insert_before(&mut self, filter: F, predicate: impl FnMut(&F) -> bool) -> bool {
        match self.position(predicate) {
            Some(idx) => {
                self.0.insert(idx, filter);
                true
            }
            None => false,
        }
    }
}

impl<F: NamedFilter> OrderedFilters<F> {
    pub fn contains(&self, name: &str) -> bool {
        self.0.iter().any(|f| f.name() == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.0.iter().map(NamedFilter::name)
    }
}

impl<F> Default for OrderedFilters<F> {
    fn default() -> Self {
        Self(Vec::new())
    }
}

impl<F> From<Vec<F>> for OrderedFilters<F> {
    fn from(filters: Vec<F>) -> Self {
        Self(filters)
    }
}

impl<F> FromIterator<F> for OrderedFilters<F> {
    fn from_iter<I: IntoIterator<Item = F>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a, F> IntoIterator for &'a OrderedFilters<F> {
    type Item = &'a F;
    type IntoIter = std::slice::Iter<'a, F>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl<'a, F> IntoIterator for &'a mut OrderedFilters<F> {
    type Item = &'a mut F;
    type IntoIter = std::slice::IterMut<'a, F>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter_mut()
    }
}
