//! Table schema resources.
//!
//! Every base table of the default schema is published as
//! `table://<table>/schema`. Reading one returns its columns as JSON.

use crate::db::{ConnectionPool, SchemaInspector};
use crate::error::{DbError, DbResult, Disposition, Operation};
use crate::models::{
    ColumnDescriptor, RESOURCE_MIME_TYPE, RESOURCE_SCHEME, ResourceAddress, SCHEMA_SEGMENT,
    TableResource,
};
use rmcp::model::{
    AnnotateAble, RawResource, RawResourceTemplate, ReadResourceResult, Resource,
    ResourceContents, ResourceTemplate,
};
use std::sync::Arc;
use tracing::debug;

/// Title shared by the listing entries and the template.
pub const RESOURCE_TITLE: &str = "Table schemas";
pub const RESOURCE_DESCRIPTION: &str = "Individual Table Schema";
pub const TEMPLATE_NAME: &str = "Table Schema";

/// Catalog-backed resource provider.
#[derive(Debug, Clone)]
pub struct TableSchemaResources {
    pool: Arc<ConnectionPool>,
}

impl TableSchemaResources {
    pub fn new(pool: Arc<ConnectionPool>) -> Self {
        Self { pool }
    }

    /// Enumerate table resources.
    ///
    /// Failures are logged and yield an empty listing.
    pub async fn list(&self) -> Vec<TableResource> {
        match self.try_list().await {
            Ok(resources) => resources,
            Err(err) => {
                let disposition = Disposition::of(Operation::ListResources, &err);
                disposition.log(Operation::ListResources, &err);
                Vec::new()
            }
        }
    }

    /// Enumerate table resources, surfacing the first failure.
    ///
    /// Tables whose name cannot be addressed (a `/` in it) are left out, so
    /// every listed URI can be read back.
    pub async fn try_list(&self) -> DbResult<Vec<TableResource>> {
        let mut conn = self.pool.acquire().await?;
        let tables = SchemaInspector::list_tables(&mut conn).await;
        self.pool.release(conn);

        Ok(tables?
            .into_iter()
            .map(TableResource::new)
            .filter(|resource| {
                let addressable = ResourceAddress::parse(&resource.uri()).is_ok();
                if !addressable {
                    debug!(
                        table = resource.address.table(),
                        "Skipping table with unaddressable name"
                    );
                }
                addressable
            })
            .collect())
    }

    /// Columns of the table addressed by `uri`.
    ///
    /// The address is validated before any connection is acquired.
    pub async fn read(&self, uri: &str) -> DbResult<Vec<ColumnDescriptor>> {
        let address = ResourceAddress::parse(uri)?;
        debug!(table = address.table(), "Reading table schema");

        let mut conn = self.pool.acquire().await?;
        let columns = SchemaInspector::describe_columns(&mut conn, address.table()).await;
        self.pool.release(conn);
        columns
    }

    /// Read and render the resource as protocol contents tagged with `uri`.
    pub async fn read_contents(&self, uri: &str) -> DbResult<ReadResourceResult> {
        let columns = self.read(uri).await?;
        render_contents(uri, &columns)
    }
}

/// Protocol descriptor of a listed table.
pub fn to_resource(table: &TableResource) -> Resource {
    let mut raw = RawResource::new(table.uri(), table.display_name());
    raw.title = Some(RESOURCE_TITLE.to_string());
    raw.description = Some(RESOURCE_DESCRIPTION.to_string());
    raw.mime_type = Some(RESOURCE_MIME_TYPE.to_string());
    raw.no_annotation()
}

/// The single address template, `table://{tableName}/schema`.
pub fn resource_template() -> ResourceTemplate {
    RawResourceTemplate {
        uri_template: format!("{}{{tableName}}/{}", RESOURCE_SCHEME, SCHEMA_SEGMENT),
        name: TEMPLATE_NAME.to_string(),
        title: Some(RESOURCE_TITLE.to_string()),
        description: Some(RESOURCE_DESCRIPTION.to_string()),
        mime_type: Some(RESOURCE_MIME_TYPE.to_string()),
    }
    .no_annotation()
}

/// Pretty-printed column list as one JSON text content.
pub fn render_contents(uri: &str, columns: &[ColumnDescriptor]) -> DbResult<ReadResourceResult> {
    let text = serde_json::to_string_pretty(columns)
        .map_err(|e| DbError::internal(format!("Failed to serialize columns: {}", e)))?;

    let mut contents = ResourceContents::text(text, uri);
    if let ResourceContents::TextResourceContents { mime_type, .. } = &mut contents {
        *mime_type = Some(RESOURCE_MIME_TYPE.to_string());
    }
    Ok(ReadResourceResult {
        contents: vec![contents],
    })
}
