use crate::cli::OutputFormat;
use colored::Colorize;
use serde_json::Value;
use tabled::builder::Builder;
use tabled::settings::Style;

pub fn print_value(value: &Value, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
        OutputFormat::Yaml => print!("{}", serde_yaml::to_string(value)?),
        OutputFormat::Table => print_as_table(value)?,
    }
    Ok(())
}

pub fn print_success(msg: &str) {
    eprintln!("{} {}", "✓".green(), msg);
}

pub fn print_error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

fn print_as_table(value: &Value) -> anyhow::Result<()> {
    let Some(resources) = extract_resources(value) else {
        // Single resource: show key-value
        let rt = value
            .get("resourceType")
            .and_then(|v| v.as_str())
            .unwrap_or("Resource");
        let id = value.get("id").and_then(|v| v.as_str()).unwrap_or("-");
        println!("{} {}/{}", "Resource:".cyan(), rt.cyan(), id.cyan());
        println!("{}", serde_json::to_string_pretty(value)?);
        return Ok(());
    };

    if resources.is_empty() {
        println!("No resources found.");
        return Ok(());
    }
    println!("{}", resource_table(&resources));
    if let Some(total) = value.get("total").and_then(|v| v.as_u64()) {
        println!("Total: {total}");
    }
    Ok(())
}

fn resource_table(resources: &[&Value]) -> String {
    let mut builder = Builder::default();
    builder.push_record(["ID", "ResourceType", "Fields"]);
    for resource in resources {
        let id = resource.get("id").and_then(|v| v.as_str()).unwrap_or("-");
        let rt = resource
            .get("resourceType")
            .and_then(|v| v.as_str())
            .unwrap_or("-");
        let fields = resource
            .as_object()
            .map(|obj| {
                obj.keys()
                    .filter(|k| *k != "id" && *k != "resourceType")
                    .map(String::as_str)
                    .collect::<Vec<_>>()
                    .join(", ")
            })
            .unwrap_or_default();
        builder.push_record([id, rt, fields.as_str()]);
    }
    builder.build().with(Style::rounded()).to_string()
}

/// Resources of a Bundle's entries, or the elements of a plain array.
fn extract_resources(value: &Value) -> Option<Vec<&Value>> {
    let items = match value {
        Value::Array(items) => items,
        Value::Object(_) if value.get("resourceType")?.as_str()? == "Bundle" => {
            match value.get("entry") {
                Some(entry) => entry.as_array()?,
                None => return Some(Vec::new()),
            }
        }
        _ => return None,
    };
    Some(
        items
            .iter()
            .map(|entry| entry.get("resource").unwrap_or(entry))
            .collect(),
    )
}
