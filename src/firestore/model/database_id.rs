use crate::firestore::constants::DEFAULT_DATABASE_ID;
use crate::firestore::error::{invalid_argument, FirestoreResult};

/// Project and database pair that every request is scoped to.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct DatabaseId {
    project_id: String,
    database: String,
}

impl DatabaseId {
    pub fn new(project_id: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            database: database.into(),
        }
    }

    pub fn default(project_id: impl Into<String>) -> Self {
        Self::new(project_id, DEFAULT_DATABASE_ID)
    }

    /// Parses `projects/{project}/databases/{database}`.
    pub fn from_resource_name(name: &str) -> FirestoreResult<Self> {
        let segments: Vec<_> = name.split('/').collect();
        if segments.len() == 4 && segments[0] == "projects" && segments[2] == "databases" {
            if segments[1].is_empty() || segments[3].is_empty() {
                return Err(invalid_argument("Database identifier contains an empty segment"));
            }
            return Ok(Self::new(segments[1], segments[3]));
        }
        Err(invalid_argument(
            "Database identifier must follow projects/{project}/databases/{database}",
        ))
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn with_database(&self, database: impl Into<String>) -> Self {
        Self::new(self.project_id.clone(), database)
    }

    /// `projects/{project}/databases/{database}`
    pub fn resource_name(&self) -> String {
        format!("projects/{}/databases/{}", self.project_id, self.database)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_database() {
        let db = DatabaseId::default("project");
        assert_eq!(db.project_id(), "project");
        assert_eq!(db.database(), DEFAULT_DATABASE_ID);
        assert_eq!(db.resource_name(), "projects/project/databases/(default)");
    }

    #[test]
    fn parses_resource_name() {
        let db = DatabaseId::from_resource_name("projects/p/databases/custom").unwrap();
        assert_eq!(db, DatabaseId::new("p", "custom"));
        let err = DatabaseId::from_resource_name("projects/p").unwrap_err();
        assert_eq!(err.code_str(), "firestore/invalid-argument");
    }
}
