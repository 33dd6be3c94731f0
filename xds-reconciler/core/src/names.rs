/// The scope of a configuration batch. Resource names and references within
/// the batch are qualified with the scope so that same-named resources from
/// different batches do not collide.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Scope {
    pub namespace: String,
    pub name: String,
}

/// Selects how a name that already contains a `/` is treated.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Qualify {
    /// Names containing a `/` are considered qualified and left alone.
    IfUnscoped,

    /// Names are qualified unless their first segment is already the scope's
    /// namespace.
    Force,
}

// === impl Scope ===

impl Scope {
    pub fn new(namespace: impl ToString, name: impl ToString) -> Self {
        Self {
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }

    /// Returns `namespace/name/resource`, or `None` if `resource` is left as is.
    ///
    /// Empty names are never qualified, so an unnamed resource does not become
    /// valid by acquiring a synthetic name.
    pub fn qualified(&self, resource: &str, mode: Qualify) -> Option<String> {
        if resource.is_empty() {
            return None;
        }
        if let Some(idx) = resource.find('/') {
            let in_namespace =
                idx == self.namespace.len() && resource.starts_with(&*self.namespace);
            if mode == Qualify::IfUnscoped || in_namespace {
                return None;
            }
        }
        Some(format!("{}/{}/{}", self.namespace, self.name, resource))
    }

    /// Qualifies `name` in place, returning true if it was changed.
    pub fn qualify(&self, name: &mut String, mode: Qualify) -> bool {
        match self.qualified(name, mode) {
            Some(qualified) => {
                *name = qualified;
                true
            }
            None => false,
        }
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}
