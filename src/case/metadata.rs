//! Case metadata rendering

use crate::config::salesforce::case_fields::METADATA_PICKLISTS;
use crate::salesforce::types::ObjectDescribe;
use crate::salesforce::utils::format_picklist;

/// Required fields and the well-known picklists of the Case object
pub fn render_case_metadata(describe: &ObjectDescribe) -> String {
    let mut out = String::from("Case Object Metadata\n\nRequired Fields:\n");

    let required: Vec<String> = describe
        .required_fields()
        .map(|f| format!("- {} ({}): {}", f.label, f.name, f.field_type.as_str()))
        .collect();
    if required.is_empty() {
        out.push_str("(none)\n");
    } else {
        out.push_str(&required.join("\n"));
        out.push('\n');
    }

    for name in METADATA_PICKLISTS {
        out.push('\n');
        match describe.picklist(name) {
            Ok(entries) if !entries.is_empty() => {
                out.push_str(&format!("{} Values:\n{}\n", name, format_picklist(&entries)));
            }
            Ok(_) => out.push_str(&format!("{} Values:\n(no active values)\n", name)),
            Err(e) => {
                tracing::debug!("Skipping picklist {}: {}", name, e);
                out.push_str(&format!("{} Values:\n(not available)\n", name));
            }
        }
    }

    out.trim_end().to_string()
}
