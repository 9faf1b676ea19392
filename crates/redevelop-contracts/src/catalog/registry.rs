use anyhow::bail;
use indexmap::IndexMap;

pub trait CatalogEntry {
    fn id(&self) -> &str;
    fn name(&self) -> &str;
}

/// Ordered, id-keyed set of catalog entries. Insertion order is display order.
#[derive(Debug, Clone)]
pub struct OptionRegistry<T: CatalogEntry> {
    kind: &'static str,
    entries: IndexMap<String, T>,
}

impl<T: CatalogEntry + Clone> OptionRegistry<T> {
    pub fn new(kind: &'static str, entries: Vec<T>) -> Self {
        let mut map = IndexMap::new();
        for entry in entries {
            map.insert(entry.id().to_string(), entry);
        }
        Self { kind, entries: map }
    }

    pub fn get(&self, id: &str) -> Option<&T> {
        self.entries.get(id.trim())
    }

    pub fn ids(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn list(&self) -> impl Iterator<Item = &T> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn require(&self, id: &str) -> anyhow::Result<T> {
        match self.get(id) {
            Some(entry) => Ok(entry.clone()),
            None => bail!(
                "unknown {} '{}' (available: [{}])",
                self.kind,
                id.trim(),
                self.ids().join(", ")
            ),
        }
    }
}
