use std::io::IsTerminal;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;
use serde_json::{Map, Value};

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

/// Print one record: a single JSON line, a two-column table or a
/// `key=value` line. Records are flat objects with an `event` field.
pub fn print_record<T: Serialize>(record: &T, format: OutputFormat) {
    let mut fields = match serde_json::to_value(record) {
        Ok(Value::Object(fields)) => fields,
        Ok(other) => {
            let mut fields = Map::new();
            fields.insert("value".to_string(), other);
            fields
        }
        Err(err) => {
            eprintln!("error: output serialization failed: {err}");
            return;
        }
    };
    fields.insert("timestamp".to_string(), Value::String(now_unix_seconds()));

    match format {
        OutputFormat::Json => println!("{}", Value::Object(fields)),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["FIELD", "VALUE"]);
            for (key, value) in &fields {
                table.add_row(vec![key.to_uppercase(), display_value(value)]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            let line: Vec<String> = fields
                .iter()
                .filter(|(key, _)| key.as_str() != "timestamp")
                .map(|(key, value)| format!("{key}={}", display_value(value)))
                .collect();
            println!("{}", line.join(" "));
        }
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => "-".to_string(),
        other => other.to_string(),
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
