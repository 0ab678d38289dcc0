use crate::work::WorkItem;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Key used for items that lack a grouping attribute. Such items are still
/// attempted, so they can fail visibly instead of vanishing.
pub const UNKNOWN_KEY: &str = "unknown";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyExtractor {
    Attr(String),
    ItemId,
}

impl KeyExtractor {
    pub fn attr(name: impl Into<String>) -> Self {
        KeyExtractor::Attr(name.into())
    }

    pub fn extract<P>(&self, item: &WorkItem<P>) -> String {
        match self {
            KeyExtractor::Attr(name) => item.attr(name).unwrap_or(UNKNOWN_KEY).to_string(),
            KeyExtractor::ItemId => item.id().to_string(),
        }
    }
}

/// Two-level partitioning: `group_by` picks the reporting unit (one row of
/// the breakdown), `split_by` picks the unit of one external call inside it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupingStrategy {
    pub group_by: Vec<KeyExtractor>,
    #[serde(default)]
    pub split_by: Vec<KeyExtractor>,
    /// Attribute of the first item used as the group's display label
    /// (e.g. `shop_name` while grouping by `shop_id`).
    #[serde(default)]
    pub label_attr: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Group<P> {
    pub key: String,
    pub label: String,
    pub calls: Vec<CallBatch<P>>,
}

impl<P> Group<P> {
    pub fn len(&self) -> usize {
        self.calls.iter().map(|c| c.items.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The items covered by one external call.
#[derive(Debug, Clone)]
pub struct CallBatch<P> {
    pub key: String,
    pub label: String,
    pub items: Vec<WorkItem<P>>,
}

impl GroupingStrategy {
    pub fn by(group_by: Vec<KeyExtractor>) -> Self {
        Self {
            group_by,
            split_by: Vec::new(),
            label_attr: None,
        }
    }

    pub fn split_by(mut self, split_by: Vec<KeyExtractor>) -> Self {
        self.split_by = split_by;
        self
    }

    pub fn labelled_by(mut self, attr: impl Into<String>) -> Self {
        self.label_attr = Some(attr.into());
        self
    }

    pub fn plan<P>(&self, items: Vec<WorkItem<P>>) -> Vec<Group<P>> {
        partition(items, &self.group_by)
            .into_iter()
            .map(|(key, members)| {
                let label = self
                    .label_attr
                    .as_deref()
                    .and_then(|a| members.first().and_then(|it| it.attr(a)))
                    .map(str::to_string)
                    .unwrap_or_else(|| key.clone());

                let calls = if self.split_by.is_empty() {
                    vec![CallBatch {
                        key: key.clone(),
                        label: label.clone(),
                        items: members,
                    }]
                } else {
                    partition(members, &self.split_by)
                        .into_iter()
                        .map(|(sub, items)| CallBatch {
                            label: format!("{label} / {sub}"),
                            key: sub,
                            items,
                        })
                        .collect()
                };

                Group { key, label, calls }
            })
            .collect()
    }
}

/// Bucket items by composite key, keeping first-seen bucket order and input
/// order inside each bucket.
pub fn partition<P>(
    items: Vec<WorkItem<P>>,
    keys: &[KeyExtractor],
) -> Vec<(String, Vec<WorkItem<P>>)> {
    // Indexed on the key parts; the joined form is only for display and may
    // be ambiguous when values contain '/'.
    let mut index: HashMap<Vec<String>, usize> = HashMap::new();
    let mut buckets: Vec<(String, Vec<WorkItem<P>>)> = Vec::new();

    for item in items {
        let parts: Vec<String> = keys.iter().map(|k| k.extract(&item)).collect();
        match index.get(&parts) {
            Some(&i) => buckets[i].1.push(item),
            None => {
                index.insert(parts.clone(), buckets.len());
                buckets.push((display_key(&parts), vec![item]));
            }
        }
    }
    buckets
}

fn display_key(parts: &[String]) -> String {
    if parts.is_empty() {
        "all".to_string()
    } else {
        parts.join("/")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupSummary {
    pub label: String,
    pub calls: Vec<CallSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallSummary {
    pub label: String,
    pub ids: Vec<String>,
}

pub fn describe<P>(groups: &[Group<P>]) -> Vec<GroupSummary> {
    groups
        .iter()
        .map(|g| GroupSummary {
            label: g.label.clone(),
            calls: g
                .calls
                .iter()
                .map(|c| CallSummary {
                    label: c.label.clone(),
                    ids: c.items.iter().map(|it| it.id().to_string()).collect(),
                })
                .collect(),
        })
        .collect()
}
