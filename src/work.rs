use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One unit of batched work: an order to print, a flash-sale model to toggle.
///
/// Items carry their owning domain object's identifier only; the caller keeps
/// the object itself and applies successful patches through an
/// [`UpdateCallback`](crate::executor::UpdateCallback).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkItem<P> {
    id: String,
    #[serde(default)]
    attrs: BTreeMap<String, String>,
    payload: P,
}

impl<P> WorkItem<P> {
    pub fn new(id: impl Into<String>, payload: P) -> Self {
        Self {
            id: id.into(),
            attrs: BTreeMap::new(),
            payload,
        }
    }

    /// Attach a grouping or display attribute. Empty values are not stored,
    /// so grouping treats them as missing.
    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let value = value.into();
        if !value.trim().is_empty() {
            self.attrs.insert(key.into(), value);
        }
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs.get(key).map(String::as_str)
    }

    pub fn payload(&self) -> &P {
        &self.payload
    }
}

/// Keep only the items whose identifier is in `ids`, preserving input order.
pub fn select_by_id<P: Clone>(items: &[WorkItem<P>], ids: &[String]) -> Vec<WorkItem<P>> {
    items
        .iter()
        .filter(|it| ids.iter().any(|id| id == it.id()))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_attrs_are_dropped() {
        let it = WorkItem::new("a", ()).with_attr("carrier", "  ").with_attr("shop_id", "7");
        assert_eq!(it.attr("carrier"), None);
        assert_eq!(it.attr("shop_id"), Some("7"));
    }

    #[test]
    fn select_keeps_input_order() {
        let items: Vec<_> = ["a", "b", "c"].iter().map(|id| WorkItem::new(*id, ())).collect();
        let picked = select_by_id(&items, &["c".to_string(), "a".to_string()]);
        let ids: Vec<_> = picked.iter().map(|it| it.id()).collect();
        assert_eq!(ids, vec!["a", "c"]);
    }
}
