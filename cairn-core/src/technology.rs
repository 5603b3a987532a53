//! Storage technology identifiers.

use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// An on-device persistence technology the cache can run on.
///
/// The built-in variants have backends in `cairn-storage`. `Custom` names a
/// technology that host code registers itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum StorageTechnology {
    /// Process-local in-memory tables
    Memory,
    /// File-backed key-value store, one document per collection
    LocalStorage,
    /// Structured on-device database (LMDB)
    Lmdb,
    /// Relational on-device database (SQLite)
    Sqlite,
    /// Host-registered technology
    Custom(String),
}

impl StorageTechnology {
    /// Built-in technologies in default preference order.
    pub const BUILTIN: [StorageTechnology; 4] = [
        StorageTechnology::Lmdb,
        StorageTechnology::Sqlite,
        StorageTechnology::LocalStorage,
        StorageTechnology::Memory,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            StorageTechnology::Memory => "Memory",
            StorageTechnology::LocalStorage => "LocalStorage",
            StorageTechnology::Lmdb => "Lmdb",
            StorageTechnology::Sqlite => "Sqlite",
            StorageTechnology::Custom(name) => name,
        }
    }

    pub fn is_builtin(&self) -> bool {
        !matches!(self, StorageTechnology::Custom(_))
    }

    /// Parse a comma-separated priority list such as `"lmdb, memory"`.
    pub fn parse_list(list: &str) -> Vec<StorageTechnology> {
        list.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(StorageTechnology::from)
            .collect()
    }
}

impl fmt::Display for StorageTechnology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StorageTechnology {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "memory" | "inmemory" => StorageTechnology::Memory,
            "localstorage" | "local" => StorageTechnology::LocalStorage,
            "lmdb" => StorageTechnology::Lmdb,
            "sqlite" => StorageTechnology::Sqlite,
            _ => StorageTechnology::Custom(s.to_string()),
        })
    }
}

impl From<&str> for StorageTechnology {
    fn from(s: &str) -> Self {
        match s.parse() {
            Ok(technology) => technology,
            Err(never) => match never {},
        }
    }
}

impl From<String> for StorageTechnology {
    fn from(s: String) -> Self {
        StorageTechnology::from(s.as_str())
    }
}

impl From<StorageTechnology> for String {
    fn from(technology: StorageTechnology) -> Self {
        technology.as_str().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_builtin_case_insensitive() {
        assert_eq!(StorageTechnology::from("MEMORY"), StorageTechnology::Memory);
        assert_eq!(StorageTechnology::from("InMemory"), StorageTechnology::Memory);
        assert_eq!(StorageTechnology::from("lmdb"), StorageTechnology::Lmdb);
        assert_eq!(StorageTechnology::from("SQLite"), StorageTechnology::Sqlite);
        assert_eq!(
            StorageTechnology::from("localStorage"),
            StorageTechnology::LocalStorage
        );
    }

    #[test]
    fn test_unknown_is_custom_preserving_case() {
        assert_eq!(
            StorageTechnology::from("BrowserLocal"),
            StorageTechnology::Custom("BrowserLocal".to_string())
        );
        assert_eq!(StorageTechnology::from("BrowserLocal").to_string(), "BrowserLocal");
    }

    #[test]
    fn test_parse_list() {
        let list = StorageTechnology::parse_list(" lmdb , ,memory");
        assert_eq!(list, vec![StorageTechnology::Lmdb, StorageTechnology::Memory]);
    }

    #[test]
    fn test_serde_uses_names() {
        let json = serde_json::to_string(&StorageTechnology::Sqlite).unwrap();
        assert_eq!(json, "\"Sqlite\"");
        let back: StorageTechnology = serde_json::from_str("\"Flaky\"").unwrap();
        assert_eq!(back, StorageTechnology::Custom("Flaky".to_string()));
    }

    #[test]
    fn test_builtin_flags() {
        assert!(StorageTechnology::BUILTIN.iter().all(StorageTechnology::is_builtin));
        assert!(!StorageTechnology::Custom("x".into()).is_builtin());
    }
}
