//! Class catalog
//!
//! Position in the catalog *is* the class id: it indexes labels, the model's
//! output vector and the persisted `class_names.json`. The order is fixed at
//! curation time and must never be re-sorted or edited afterwards.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::utils::error::{CropCareError, Result};

/// Ordered list of class names
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClassCatalog {
    names: Vec<String>,
}

impl ClassCatalog {
    /// Build a catalog from names that are already in their final order
    pub fn from_names(names: Vec<String>) -> Self {
        Self { names }
    }

    /// Build a catalog from unsorted class directory names
    pub fn from_directory_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut names: Vec<String> = names.into_iter().map(Into::into).collect();
        names.sort();
        Self { names }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    /// Indices of classes whose name starts with `prefix`, ignoring case
    pub fn indices_with_prefix(&self, prefix: &str) -> Vec<usize> {
        let prefix = prefix.to_lowercase();
        self.names
            .iter()
            .enumerate()
            .filter(|(_, name)| name.to_lowercase().starts_with(&prefix))
            .map(|(idx, _)| idx)
            .collect()
    }

    /// Write the catalog as a pretty JSON array
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.names)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Read a catalog verbatim; order is preserved exactly as stored
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let names: Vec<String> = serde_json::from_str(&json)?;
        if names.is_empty() {
            return Err(CropCareError::Serialization(format!(
                "class catalog {:?} is empty",
                path
            )));
        }
        Ok(Self { names })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_directory_names_are_sorted() {
        let catalog = ClassCatalog::from_directory_names(["Tomato___healthy", "Apple___Black_rot", "Apple___Apple_scab"]);
        assert_eq!(
            catalog.names(),
            &["Apple___Apple_scab", "Apple___Black_rot", "Tomato___healthy"]
        );
        assert_eq!(catalog.index_of("Tomato___healthy"), Some(2));
        assert_eq!(catalog.get(5), None);
    }

    #[test]
    fn test_prefix_is_case_insensitive() {
        let catalog = ClassCatalog::from_names(vec![
            "Apple___Apple_scab".into(),
            "Grape___healthy".into(),
            "apple___healthy".into(),
        ]);
        assert_eq!(catalog.indices_with_prefix("APPLE"), vec![0, 2]);
        assert!(catalog.indices_with_prefix("corn").is_empty());
    }

    #[test]
    fn test_load_preserves_stored_order() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("class_names.json");
        // Deliberately not sorted: loading must not reorder.
        std::fs::write(&path, r#"["b", "a", "c"]"#).unwrap();

        let catalog = ClassCatalog::load(&path).unwrap();
        assert_eq!(catalog.names(), &["b", "a", "c"]);

        let out = dir.path().join("out.json");
        catalog.save(&out).unwrap();
        assert_eq!(ClassCatalog::load(&out).unwrap(), catalog);
    }

    #[test]
    fn test_load_rejects_empty_catalog() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("class_names.json");
        std::fs::write(&path, "[]").unwrap();
        assert!(ClassCatalog::load(&path).is_err());
    }
}
