use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::enrichment::{
    BatchOutcome, ConfigField, Enrichment, EnrichmentContext, EnrichmentError, FieldType,
};
use crate::source::row_source::{bind_json, quote_ident};

const NULL: Value = Value::Null;

/// Built-in enrichment: convert the configured text columns to upper case.
/// Idempotent, so retrying a batch after a crash is harmless.
pub struct Uppercase;

#[async_trait]
impl Enrichment for Uppercase {
    fn slug(&self) -> &'static str {
        "uppercase"
    }

    fn name(&self) -> &'static str {
        "Convert to uppercase"
    }

    fn description(&self) -> &'static str {
        "Convert selected columns to uppercase"
    }

    fn config_schema(&self) -> Vec<ConfigField> {
        vec![ConfigField {
            name: "columns",
            field_type: FieldType::Text,
            label: "Columns",
            description: "JSON array of column names to convert",
            default: None,
            required: true,
            choices: Vec::new(),
        }]
    }

    async fn enrich_batch(
        &self,
        ctx: &EnrichmentContext,
        rows: &[Map<String, Value>],
        pks: &[String],
    ) -> Result<BatchOutcome, EnrichmentError> {
        let columns: Vec<String> = ctx
            .config()
            .get("columns")
            .and_then(|v| v.as_array())
            .map(|cols| {
                cols.iter()
                    .filter_map(|c| c.as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default();

        if columns.is_empty() {
            return Err(EnrichmentError::new("No columns configured"));
        }

        let sets = columns
            .iter()
            .map(|col| format!("{} = upper({})", quote_ident(col), quote_ident(col)))
            .collect::<Vec<_>>()
            .join(", ");
        let wheres = pks
            .iter()
            .map(|pk| format!("{} = ?", quote_ident(pk)))
            .collect::<Vec<_>>()
            .join(" and ");
        let sql = format!(
            "update {} set {} where {}",
            quote_ident(ctx.table()),
            sets,
            wheres
        );

        for row in rows {
            let mut query = sqlx::query(&sql);
            for pk in pks {
                query = bind_json(query, row.get(pk).unwrap_or(&NULL));
            }
            query.execute(ctx.pool()).await?;
        }

        Ok(BatchOutcome::Completed { processed: None })
    }
}
