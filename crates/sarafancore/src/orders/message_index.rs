use dashmap::DashMap;

use crate::notify::MessageHandle;

/// Process-local map from order id to its staff-channel announcement.
///
/// Lost on restart; a missing entry only means the announcement can't be
/// edited. Lookups return clones so no shard lock outlives the call.
#[derive(Debug, Default)]
pub struct MessageIndex {
    inner: DashMap<String, MessageHandle>,
}

impl MessageIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, order_id: &str, handle: MessageHandle) {
        self.inner.insert(order_id.to_string(), handle);
    }

    pub fn get(&self, order_id: &str) -> Option<MessageHandle> {
        self.inner.get(order_id).map(|entry| entry.value().clone())
    }

    pub fn remove(&self, order_id: &str) -> Option<MessageHandle> {
        self.inner.remove(order_id).map(|(_, handle)| handle)
    }

    pub fn contains(&self, order_id: &str) -> bool {
        self.inner.contains_key(order_id)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_get_remove() {
        let index = MessageIndex::new();
        assert!(index.is_empty());

        index.put("ORDER001", MessageHandle("17".into()));
        assert!(index.contains("ORDER001"));
        assert_eq!(index.get("ORDER001"), Some(MessageHandle("17".into())));

        index.put("ORDER001", MessageHandle("18".into()));
        assert_eq!(index.len(), 1);
        assert_eq!(index.remove("ORDER001"), Some(MessageHandle("18".into())));
        assert_eq!(index.get("ORDER001"), None);
    }
}
