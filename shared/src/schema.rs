//! Schema description shared by the prompt and the SQL validator.
//!
//! The description is version-controlled alongside the migrations in
//! [`crate::db`] and must be kept in sync with them. Only tables listed here
//! can be referenced by generated SQL.

/// A column exposed to the generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnDescription {
    pub name: &'static str,
    pub sql_type: &'static str,
}

/// A table exposed to the generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableDescription {
    pub name: &'static str,
    pub columns: &'static [ColumnDescription],
}

/// The set of tables a generated query may touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchemaDescription {
    pub tables: &'static [TableDescription],
}

const fn column(name: &'static str, sql_type: &'static str) -> ColumnDescription {
    ColumnDescription { name, sql_type }
}

/// Tables visible to the chat gateway.
///
/// `contacts` is deliberately absent: it holds visitor emails and messages.
pub const PORTFOLIO_SCHEMA: SchemaDescription = SchemaDescription {
    tables: &[TableDescription {
        name: "projects",
        columns: &[
            column("id", "integer"),
            column("title", "varchar 200"),
            column("description", "varchar 2000"),
            column("tech_stack", "varchar 300"),
            column("github_url", "varchar 300"),
            column("created_at", "timestamp"),
        ],
    }],
};

impl SchemaDescription {
    /// Whether `name` is exactly one of the allow-listed table names.
    pub fn has_table(&self, name: &str) -> bool {
        self.tables.iter().any(|t| t.name == name)
    }

    /// Render the description in the shape the prompt template embeds.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for table in self.tables {
            out.push_str("Table: ");
            out.push_str(table.name);
            out.push('\n');
            for col in table.columns {
                out.push_str(&format!("- {} ({})\n", col.name, col.sql_type));
            }
        }
        out
    }
}
