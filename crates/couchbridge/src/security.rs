//! The `_security` document of a database

use crate::database::Database;
use crate::document::Document;
use crate::remote::OnStatus;
use couchbridge_common::{CouchError, Result};
use serde_json::{Map, Value};

const MEMBERS: &str = "members";
const ADMINS: &str = "admins";
const NAMES: &str = "names";
const ROLES: &str = "roles";

/// Members and admins of a database
///
/// ```json
/// {"admins": {"names": [], "roles": []}, "members": {"names": [], "roles": []}}
/// ```
#[derive(Debug, Clone)]
pub struct SecurityDocument {
    doc: Document,
}

impl SecurityDocument {
    pub(crate) fn new(database: &Database) -> Self {
        let endpoint = format!("{}/_security", database.endpoint());
        Self {
            doc: Document::with_endpoint(database, "_security", endpoint),
        }
    }

    /// Raw content of the document
    pub fn as_map(&self) -> &Map<String, Value> {
        self.doc.as_map()
    }

    pub fn is_dirty(&self) -> bool {
        self.doc.is_dirty()
    }

    pub fn members(&self) -> Option<Vec<String>> {
        self.list(MEMBERS, NAMES)
    }

    pub fn member_roles(&self) -> Option<Vec<String>> {
        self.list(MEMBERS, ROLES)
    }

    pub fn admins(&self) -> Option<Vec<String>> {
        self.list(ADMINS, NAMES)
    }

    pub fn admin_roles(&self) -> Option<Vec<String>> {
        self.list(ADMINS, ROLES)
    }

    pub fn add_member(&mut self, name: &str) {
        self.add(MEMBERS, NAMES, name);
    }

    pub fn add_member_role(&mut self, role: &str) {
        self.add(MEMBERS, ROLES, role);
    }

    pub fn add_admin(&mut self, name: &str) {
        self.add(ADMINS, NAMES, name);
    }

    pub fn add_admin_role(&mut self, role: &str) {
        self.add(ADMINS, ROLES, role);
    }

    pub fn remove_member(&mut self, name: &str) -> Result<()> {
        self.remove(MEMBERS, NAMES, name).ok_or_else(|| {
            CouchError::NotFound(format!(
                "The user '{}' isn't a member of the database '{}'",
                name,
                self.doc.database().id()
            ))
        })
    }

    pub fn remove_member_role(&mut self, role: &str) -> Result<()> {
        self.remove(MEMBERS, ROLES, role).ok_or_else(|| {
            CouchError::NotFound(format!(
                "The role '{}' isn't a member role of the database '{}'",
                role,
                self.doc.database().id()
            ))
        })
    }

    pub fn remove_admin(&mut self, name: &str) -> Result<()> {
        self.remove(ADMINS, NAMES, name).ok_or_else(|| {
            CouchError::NotFound(format!(
                "The user '{}' isn't an admin of the database '{}'",
                name,
                self.doc.database().id()
            ))
        })
    }

    pub fn remove_admin_role(&mut self, role: &str) -> Result<()> {
        self.remove(ADMINS, ROLES, role).ok_or_else(|| {
            CouchError::NotFound(format!(
                "The role '{}' isn't an admin role of the database '{}'",
                role,
                self.doc.database().id()
            ))
        })
    }

    /// Reload the document from the server, dropping local changes
    pub async fn fetch(&mut self) -> Result<()> {
        self.doc.fetch(true).await
    }

    /// Write the document to the server
    ///
    /// CouchDB answers 500 when a non-admin writes `_security`; this is
    /// reported as `Forbidden`.
    pub async fn save(&mut self) -> Result<()> {
        self.doc.save().await.on_status(500, |_| {
            CouchError::Forbidden("You are not a database or server admin".to_string())
        })
    }

    fn list(&self, section: &str, kind: &str) -> Option<Vec<String>> {
        let list = self.doc.get(section)?.get(kind)?.as_array()?;
        Some(
            list.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
        )
    }

    fn add(&mut self, section: &str, kind: &str, entry: &str) {
        let section = self
            .doc
            .entry(section)
            .or_insert_with(|| Value::Object(Map::new()));
        if !section.is_object() {
            *section = Value::Object(Map::new());
        }
        let Value::Object(section) = section else {
            return;
        };

        let list = section
            .entry(kind)
            .or_insert_with(|| Value::Array(Vec::new()));
        if !list.is_array() {
            *list = Value::Array(Vec::new());
        }
        if let Value::Array(list) = list {
            if !list.iter().any(|v| v.as_str() == Some(entry)) {
                list.push(Value::String(entry.to_string()));
            }
        }
    }

    fn remove(&mut self, section: &str, kind: &str, entry: &str) -> Option<()> {
        let list = self
            .doc
            .get_mut(section)?
            .get_mut(kind)?
            .as_array_mut()?;
        let position = list.iter().position(|v| v.as_str() == Some(entry))?;
        list.remove(position);
        Some(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CouchConfig, CouchDB};
    use serde_json::json;

    fn security() -> SecurityDocument {
        let couchdb = CouchDB::new(CouchConfig::default()).unwrap();
        SecurityDocument::new(&Database::new(couchdb.remote().clone(), "testdb"))
    }

    #[test]
    fn test_empty_security_document() {
        let sec = security();
        assert!(sec.as_map().is_empty());
        assert_eq!(sec.doc.endpoint(), "/testdb/_security");
        assert!(sec.members().is_none());
        assert!(sec.admin_roles().is_none());
    }

    #[test]
    fn test_add_is_idempotent() {
        let mut sec = security();
        sec.add_member("alice");
        sec.add_member("alice");
        sec.add_member_role("staff");
        sec.add_admin("root");

        assert_eq!(sec.members(), Some(vec!["alice".to_string()]));
        assert_eq!(sec.member_roles(), Some(vec!["staff".to_string()]));
        assert_eq!(sec.admins(), Some(vec!["root".to_string()]));
        assert!(sec.admin_roles().is_none());
        assert_eq!(
            sec.as_map()["members"],
            json!({"names": ["alice"], "roles": ["staff"]})
        );
    }

    #[test]
    fn test_remove_absent_entry_is_not_found() {
        let mut sec = security();
        assert!(matches!(sec.remove_admin("nobody"), Err(CouchError::NotFound(_))));

        sec.add_admin_role("ops");
        assert!(sec.remove_admin_role("ops").is_ok());
        assert_eq!(sec.admin_roles(), Some(vec![]));
        assert!(matches!(sec.remove_admin_role("ops"), Err(CouchError::NotFound(_))));
    }
}
