//! CRUD over any REST resource described by a [`ResourceDescriptor`]

use std::collections::HashSet;

use ledgerlink_core::{Query, ResourceDescriptor};
use ledgerlink_domain::{Cursor, EntityRecord, LedgerError, Page, Result};
use serde_json::Value;
use tracing::{debug, warn};

use crate::connection::Connection;

/// Resource-scoped view of a [`Connection`].
pub struct ResourceClient<'a> {
    connection: &'a Connection,
    descriptor: ResourceDescriptor,
}

impl<'a> ResourceClient<'a> {
    pub fn new(connection: &'a Connection, descriptor: ResourceDescriptor) -> Self {
        Self { connection, descriptor }
    }

    pub fn descriptor(&self) -> &ResourceDescriptor {
        &self.descriptor
    }

    /// Record whose primary key field equals `id`, looked up with a
    /// `$filter` on the collection. `None` when nothing matches or the
    /// provider answers 404.
    pub fn find(&self, id: &str) -> Result<Option<EntityRecord>> {
        match self.connection.get(&self.descriptor.url, &self.descriptor.by_id(id)) {
            Ok(Some(value)) => first_record(value),
            Ok(None) => Ok(None),
            Err(err) if err.status() == Some(404) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Records matching `query` on the first page.
    pub fn filter(&self, query: &Query) -> Result<Vec<EntityRecord>> {
        Ok(self.list(query)?.items)
    }

    /// First record matching `query`.
    pub fn first(&self, query: &Query) -> Result<Option<EntityRecord>> {
        let page = self.list(&query.clone().top(1))?;
        Ok(page.items.into_iter().next())
    }

    pub fn list(&self, query: &Query) -> Result<Page<EntityRecord>> {
        into_records(self.connection.list(&self.descriptor.url, query)?)
    }

    pub fn next(&self, cursor: &Cursor) -> Result<Page<EntityRecord>> {
        into_records(self.connection.next_page(cursor)?)
    }

    /// Every record matching `query`, following cursors until exhausted or
    /// until the provider hands back a cursor it already gave.
    pub fn all(&self, query: &Query) -> Result<Vec<EntityRecord>> {
        let mut page = self.list(query)?;
        let mut records = std::mem::take(&mut page.items);
        let mut pages = 1usize;
        let mut seen = HashSet::new();

        while let Some(cursor) = page.next.take() {
            if !seen.insert(cursor.clone()) {
                warn!(resource = %self.descriptor.url, cursor = %cursor, pages, "resource.cursor_repeated");
                break;
            }
            page = self.next(&cursor)?;
            records.append(&mut page.items);
            pages += 1;
        }

        debug!(resource = %self.descriptor.url, pages, records = records.len(), "resource.all_fetched");
        Ok(records)
    }

    /// Create a record; returns the provider's echo, or `record` when the
    /// response has no body.
    pub fn insert(&self, record: &EntityRecord) -> Result<EntityRecord> {
        let body = serde_json::to_value(record)?;
        match self.connection.post(&self.descriptor.url, &body)? {
            Some(created) => Ok(first_record(created)?.unwrap_or_else(|| record.clone())),
            None => Ok(record.clone()),
        }
    }

    pub fn update(&self, id: &str, record: &EntityRecord) -> Result<()> {
        let body = serde_json::to_value(record)?;
        self.connection.put(&self.descriptor.record_path(id), &body).map(|_| ())
    }

    pub fn delete(&self, id: &str) -> Result<()> {
        self.connection.delete(&self.descriptor.record_path(id))
    }
}

impl Connection {
    /// CRUD client for `descriptor` on this connection
    pub fn resource(&self, descriptor: ResourceDescriptor) -> ResourceClient<'_> {
        ResourceClient::new(self, descriptor)
    }
}

fn first_record(value: Value) -> Result<Option<EntityRecord>> {
    match value {
        Value::Array(items) => items.into_iter().next().map(EntityRecord::from_value).transpose(),
        Value::Null => Ok(None),
        other => EntityRecord::from_value(other).map(Some),
    }
}

fn into_records(page: Page<Value>) -> Result<Page<EntityRecord>> {
    let items = page
        .items
        .into_iter()
        .map(EntityRecord::from_value)
        .collect::<std::result::Result<Vec<_>, LedgerError>>()?;
    Ok(Page::new(items, page.next))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_first_record_accepts_object_array_and_null() {
        assert_eq!(
            first_record(json!({"ID": "a"})).unwrap().unwrap().get_str("ID"),
            Some("a")
        );
        assert_eq!(
            first_record(json!([{"ID": "b"}, {"ID": "c"}])).unwrap().unwrap().get_str("ID"),
            Some("b")
        );
        assert_eq!(first_record(json!([])).unwrap(), None);
        assert_eq!(first_record(Value::Null).unwrap(), None);
    }

    #[test]
    fn test_into_records_rejects_non_objects() {
        let page = Page::new(vec![json!({"ID": "a"}), json!(3)], None);
        assert!(matches!(into_records(page), Err(LedgerError::Protocol(_))));
    }
}
