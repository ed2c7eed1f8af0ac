//! Schema-related data models.
//!
//! Tables are published as resources addressed by `table://<table>/schema`.

use crate::error::{DbError, DbResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// URI scheme prefix of table resources.
pub const RESOURCE_SCHEME: &str = "table://";

/// The only accepted trailing path segment.
pub const SCHEMA_SEGMENT: &str = "schema";

/// MIME type of every table resource.
pub const RESOURCE_MIME_TYPE: &str = "application/json";

/// Address of a table schema resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceAddress {
    table: String,
}

impl ResourceAddress {
    /// Address for the given table identifier.
    pub fn for_table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
        }
    }

    /// Parse an address, rejecting anything whose last segment is not `schema`.
    pub fn parse(uri: &str) -> DbResult<Self> {
        let rest = uri
            .strip_prefix(RESOURCE_SCHEME)
            .ok_or_else(|| DbError::invalid_resource_uri(uri, "scheme must be table://"))?;

        let (table, segment) = rest.rsplit_once('/').ok_or_else(|| {
            DbError::invalid_resource_uri(uri, "missing trailing /schema segment")
        })?;

        if segment != SCHEMA_SEGMENT {
            return Err(DbError::invalid_resource_uri(
                uri,
                format!("trailing segment must be '{}'", SCHEMA_SEGMENT),
            ));
        }
        if table.is_empty() {
            return Err(DbError::invalid_resource_uri(uri, "table name is empty"));
        }
        if table.contains('/') {
            return Err(DbError::invalid_resource_uri(
                uri,
                "table name must not contain '/'",
            ));
        }

        Ok(Self::for_table(table))
    }

    /// The table identifier, bound verbatim as a query parameter.
    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn uri(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ResourceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}/{}", RESOURCE_SCHEME, self.table, SCHEMA_SEGMENT)
    }
}

/// One column of a table: name and declared data type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub column_name: String,
    pub data_type: String,
}

impl ColumnDescriptor {
    pub fn new(column_name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            column_name: column_name.into(),
            data_type: data_type.into(),
        }
    }
}

/// A listed table resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableResource {
    pub address: ResourceAddress,
}

impl TableResource {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            address: ResourceAddress::for_table(table),
        }
    }

    pub fn uri(&self) -> String {
        self.address.uri()
    }

    /// Human-readable name embedding the table identifier.
    pub fn display_name(&self) -> String {
        format!("\"{}\" database schema", self.address.table())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_round_trip() {
        let address = ResourceAddress::for_table("users");
        assert_eq!(address.uri(), "table://users/schema");
        assert_eq!(ResourceAddress::parse("table://users/schema").unwrap(), address);
    }

    #[test]
    fn test_parse_keeps_identifier_verbatim() {
        let address = ResourceAddress::parse("table://Order Items/schema").unwrap();
        assert_eq!(address.table(), "Order Items");
    }

    #[test]
    fn test_parse_rejects_wrong_trailing_segment() {
        for uri in [
            "table://users/columns",
            "table://users/schema/",
            "table://users/SCHEMA",
            "table://users",
        ] {
            let err = ResourceAddress::parse(uri).unwrap_err();
            assert!(
                matches!(err, DbError::InvalidResourceUri { .. }),
                "expected rejection for {}",
                uri
            );
        }
    }

    #[test]
    fn test_parse_rejects_other_schemes() {
        let err = ResourceAddress::parse("file://users/schema").unwrap_err();
        assert!(matches!(err, DbError::InvalidResourceUri { .. }));
    }

    #[test]
    fn test_parse_rejects_empty_or_nested_table() {
        assert!(ResourceAddress::parse("table:///schema").is_err());
        assert!(ResourceAddress::parse("table://a/b/schema").is_err());
    }

    #[test]
    fn test_table_resource_metadata() {
        let resource = TableResource::new("orders");
        assert_eq!(resource.uri(), "table://orders/schema");
        assert_eq!(resource.display_name(), "\"orders\" database schema");
    }

    #[test]
    fn test_column_descriptor_serialization() {
        let json = serde_json::to_value(vec![ColumnDescriptor::new("id", "integer")]).unwrap();
        assert_eq!(
            json,
            serde_json::json!([{ "column_name": "id", "data_type": "integer" }])
        );
    }
}
