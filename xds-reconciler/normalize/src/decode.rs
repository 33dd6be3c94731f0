use ahash::AHashSet as HashSet;
use serde_json::{Map, Value};
use tracing::debug;
use xds_reconciler_core::{resource::Any, Error, ResourceKind, ResourceSet, Result};

/// Decodes a batch of typed messages into a resource set.
///
/// Entries with an empty type tag are skipped. A message may be given either
/// flat, with its fields alongside the `@type` tag, or wrapped as
/// `{"@type": .., "value": {"@type": .., ..}}`; in the wrapped form both tags
/// must agree.
///
/// Names are checked for presence and per-type uniqueness as given, before
/// any qualification.
pub fn decode(resources: impl IntoIterator<Item = Any>) -> Result<ResourceSet> {
    let mut set = ResourceSet::default();
    for any in resources {
        if any.type_url.is_empty() {
            continue;
        }
        let kind = ResourceKind::from_type_url(&any.type_url)
            .ok_or_else(|| Error::UnsupportedType(any.type_url.clone()))?;
        let message = unwrap_message(any)?;
        let resource = kind
            .decode(Value::Object(message))
            .map_err(|source| Error::Decode { kind, source })?;

        let name = resource.name();
        if name.is_empty() {
            return Err(Error::MissingName { kind });
        }
        if set.contains(kind, name) {
            return Err(Error::DuplicateName {
                kind,
                name: name.to_string(),
            });
        }
        debug!(%kind, %name, "Decoded resource");
        set.insert(resource);
    }
    Ok(set)
}

/// Fails if two resources of one type share a name.
///
/// Qualification may map distinct names onto the same one (`web` and
/// `ns/cfg/web` in scope `ns/cfg`), so normalized sets are checked again.
pub fn check_unique_names(set: &ResourceSet) -> Result<()> {
    let mut seen = HashSet::new();
    for resource in set.iter() {
        if !seen.insert((resource.kind(), resource.name())) {
            return Err(Error::DuplicateName {
                kind: resource.kind(),
                name: resource.name().to_string(),
            });
        }
    }
    Ok(())
}

fn unwrap_message(any: Any) -> Result<Map<String, Value>> {
    let Any {
        type_url,
        mut value,
    } = any;
    if value.len() == 1 {
        if let Some(Value::Object(inner)) = value.get_mut("value") {
            if let Some(tag) = inner.remove("@type") {
                let decoded = match tag {
                    Value::String(decoded) => decoded,
                    other => other.to_string(),
                };
                if decoded != type_url {
                    return Err(Error::TypeMismatch {
                        declared: type_url,
                        decoded,
                    });
                }
                return Ok(std::mem::take(inner));
            }
        }
    }
    Ok(value)
}
