use crate::config::OutputFormat;
use crate::error::TridentError;
use crate::service::ServiceOutput;

/// Simplified output writer: a real pretty-table renderer is out of
/// scope (spec.md §1), so `Table` falls back to the same indented
/// key-value text as `Text`. `Json` is the one format with a stable,
/// parseable shape.
pub fn write(output: &ServiceOutput, format: OutputFormat, defang: bool) -> Result<(), TridentError> {
	let rendered = match format {
		OutputFormat::Json => serde_json::to_string_pretty(output)
			.map_err(|e| TridentError::ConfigError(format!("failed to render json: {e}")))?,
		OutputFormat::Table | OutputFormat::Text => render_text(output),
	};

	let rendered = if defang { defang_text(&rendered) } else { rendered };
	println!("{rendered}");
	Ok(())
}

fn render_text(output: &ServiceOutput) -> String {
	let value = serde_json::to_value(output).unwrap_or(serde_json::Value::Null);
	let mut lines = Vec::new();
	flatten(&value, String::new(), &mut lines);
	lines.join("\n")
}

fn flatten(value: &serde_json::Value, prefix: &str, out: &mut Vec<String>) {
	match value {
		serde_json::Value::Object(map) => {
			for (key, val) in map {
				let next_prefix = if prefix.is_empty() { key.clone() } else { format!("{prefix}.{key}") };
				flatten(val, &next_prefix, out);
			}
		},
		serde_json::Value::Array(items) => {
			if items.is_empty() {
				out.push(format!("{prefix}: (none)"));
			}
			for (i, item) in items.iter().enumerate() {
				flatten(item, &format!("{prefix}[{i}]"), out);
			}
		},
		serde_json::Value::Null => out.push(format!("{prefix}: -")),
		other => out.push(format!("{prefix}: {other}")),
	}
}

/// Rewrites dots and URL schemes in textual fields for safe display in
/// reports: `example.com` → `example[.]com`, `http://` → `hxxp://`.
fn defang_text(input: &str) -> String {
	input.replace("http://", "hxxp://").replace("https://", "hxxps://").replace('.', "[.]")
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn defang_rewrites_dots_and_schemes() {
		let defanged = defang_text("visit http://example.com/path");
		assert_eq!(defanged, "visit hxxp://example[.]com/path");
	}
}
