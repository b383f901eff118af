//! Fallback descriptions for tables and columns that have none.
//!
//! Descriptions are templated from structural facts. Column descriptions may
//! quote a few distinct sample values fetched through the open catalog
//! session; a failed fetch only drops the sample clause.

use tracing::debug;

use crate::catalog::{CatalogError, CatalogReader};
use crate::config::SyncSettings;
use crate::store::ColumnFacts;

/// A synthesized column description and the sample fetch error, if any.
#[derive(Debug)]
pub struct ColumnDescription {
    pub text: String,
    pub sample_error: Option<CatalogError>,
}

/// Generates descriptions from structural facts and sample values.
#[derive(Debug, Clone)]
pub struct DescriptionSynthesizer {
    sample_limit: u32,
    sample_display: usize,
}

impl Default for DescriptionSynthesizer {
    fn default() -> Self {
        Self::new(&SyncSettings::default())
    }
}

impl DescriptionSynthesizer {
    pub fn new(settings: &SyncSettings) -> Self {
        Self {
            sample_limit: settings.sample_limit,
            sample_display: settings.sample_display,
        }
    }

    /// `Table public.order_items containing data related to order items.`
    pub fn table_description(&self, schema: &str, name: &str) -> String {
        format!(
            "Table {schema}.{name} containing data related to {}.",
            name.to_lowercase().replace('_', " ")
        )
    }

    /// Describe a column from its facts and whatever samples are available.
    pub fn column_description(&self, facts: &ColumnFacts, samples: &[String]) -> String {
        let nullability = if facts.nullable {
            "nullable"
        } else {
            "not nullable"
        };

        // Primary key wins when both flags are set.
        let key_role = if facts.is_primary_key {
            " and serves as the primary key"
        } else if facts.is_foreign_key {
            " and references another table"
        } else {
            ""
        };

        let mut text = format!(
            "Column {} of type {} ({nullability}){key_role}.",
            facts.name, facts.data_type
        );

        if !samples.is_empty() {
            let quoted: Vec<String> = samples
                .iter()
                .take(self.sample_display)
                .map(|v| format!("'{v}'"))
                .collect();
            text.push_str(" Sample values include: ");
            text.push_str(&quoted.join(", "));
            if samples.len() > self.sample_display {
                text.push_str(", etc.");
            } else {
                text.push('.');
            }
        }

        text
    }

    /// Fetch samples through `reader` and describe the column. Never fails.
    pub async fn describe_column<R>(
        &self,
        reader: &R,
        schema: &str,
        table: &str,
        facts: &ColumnFacts,
    ) -> ColumnDescription
    where
        R: CatalogReader + ?Sized,
    {
        match reader
            .sample_distinct_values(schema, table, &facts.name, self.sample_limit)
            .await
        {
            Ok(samples) => ColumnDescription {
                text: self.column_description(facts, &samples),
                sample_error: None,
            },
            Err(e) => {
                debug!(schema, table, column = %facts.name, error = %e, "sample values unavailable");
                ColumnDescription {
                    text: self.column_description(facts, &[]),
                    sample_error: Some(e),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::memory::{CatalogOp, MemoryCatalog};
    use crate::catalog::LiveColumn;
    use crate::config::ConnectParams;
    use crate::connection::Connector;
    use crate::store::TableKind;

    fn facts(name: &str, nullable: bool, pk: bool, fk: bool) -> ColumnFacts {
        ColumnFacts {
            name: name.into(),
            ordinal: 1,
            data_type: "integer".into(),
            nullable,
            is_primary_key: pk,
            is_foreign_key: fk,
        }
    }

    fn values(n: usize) -> Vec<String> {
        (1..=n).map(|i| i.to_string()).collect()
    }

    #[test]
    fn test_table_description() {
        let synth = DescriptionSynthesizer::default();
        assert_eq!(
            synth.table_description("public", "Order_Items"),
            "Table public.Order_Items containing data related to order items."
        );
    }

    #[test]
    fn test_column_description_key_roles() {
        let synth = DescriptionSynthesizer::default();
        assert_eq!(
            synth.column_description(&facts("id", false, true, true), &[]),
            "Column id of type integer (not nullable) and serves as the primary key."
        );
        assert_eq!(
            synth.column_description(&facts("user_id", true, false, true), &[]),
            "Column user_id of type integer (nullable) and references another table."
        );
        assert_eq!(
            synth.column_description(&facts("qty", true, false, false), &[]),
            "Column qty of type integer (nullable)."
        );
    }

    #[test]
    fn test_column_description_samples() {
        let synth = DescriptionSynthesizer::default();
        let col = facts("qty", true, false, false);

        assert_eq!(
            synth.column_description(&col, &values(3)),
            "Column qty of type integer (nullable). Sample values include: '1', '2', '3'."
        );
        assert_eq!(
            synth.column_description(&col, &values(5)),
            "Column qty of type integer (nullable). Sample values include: '1', '2', '3', '4', '5'."
        );
        assert_eq!(
            synth.column_description(&col, &values(7)),
            "Column qty of type integer (nullable). Sample values include: '1', '2', '3', '4', '5', etc."
        );
    }

    #[tokio::test]
    async fn test_describe_column_degrades_on_sample_failure() {
        let catalog = MemoryCatalog::new();
        catalog.add_table("public", "users", TableKind::Table);
        catalog.add_column("public", "users", LiveColumn::new("name", "text"));
        catalog.set_samples("public", "users", "name", &["ann", "bob"]);
        let session = catalog
            .connect(&ConnectParams::postgres("memory", "shop", "u", "p"))
            .await
            .unwrap();

        let synth = DescriptionSynthesizer::default();
        let mut col = facts("name", true, false, false);
        col.data_type = "text".into();

        let ok = synth.describe_column(&session, "public", "users", &col).await;
        assert!(ok.sample_error.is_none());
        assert!(ok.text.ends_with("Sample values include: 'ann', 'bob'."));

        catalog.fail_on(CatalogOp::SampleValues, "connection reset");
        let degraded = synth.describe_column(&session, "public", "users", &col).await;
        assert!(degraded.sample_error.is_some());
        assert_eq!(degraded.text, "Column name of type text (nullable).");
    }
}
