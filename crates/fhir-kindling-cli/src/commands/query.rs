use anyhow::{Context, Result};
use fhir_kindling::{FhirQuery, KindlingConfig, QueryResponse, SchemaRegistry, Transport};

use crate::cli::{OutputFormat, QueryArgs};
use crate::output::print_value;

pub fn query(cfg: &KindlingConfig, args: &QueryArgs, output: OutputFormat) -> Result<()> {
    let server = &cfg.server;
    let base_url = server.require_api_url()?;
    let transport = server.transport().context("Failed to create HTTP client")?;

    let format = if args.xml {
        fhir_kindling::OutputFormat::Xml
    } else {
        server.format
    };
    let registry = SchemaRegistry::r4();
    let mut query = FhirQuery::for_model(base_url, &registry, &args.resource_type, transport)?
        .with_format(format);

    let response = execute(&mut query, args)
        .with_context(|| format!("Query for {} failed", args.resource_type))?;

    match response {
        QueryResponse::Json(value) => print_value(&value, output)?,
        QueryResponse::Xml(body) => println!("{body}"),
    }
    Ok(())
}

/// Runs the query with the limit selected by `args`. The URL is read only
/// after execution so that `_count` reflects the limit.
fn execute<T: Transport>(
    query: &mut FhirQuery<T>,
    args: &QueryArgs,
) -> fhir_kindling::Result<QueryResponse> {
    if let Some(raw) = &args.raw_query {
        query.set_query_string(raw);
    }
    let response = if args.first {
        query.first()
    } else if let Some(limit) = args.limit {
        query.limit(limit)
    } else {
        query.all()
    }?;
    tracing::info!(
        url = %query.query_url(),
        entries = response.entries().len(),
        "Executed query"
    );
    Ok(response)
}
