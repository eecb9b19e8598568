//! Raw NVD product wrappers to store entries.

use cpe_name::parse_cpe_name;
use cpe_store::CpeEntry;
use serde::Deserialize;
use serde_json::Value;

const CPE_PREFIX: &str = "cpe:2.3:";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawCpe {
    #[serde(default)]
    cpe_name: String,
    #[serde(default)]
    cpe_name_id: String,
    #[serde(default)]
    deprecated: bool,
    #[serde(default)]
    deprecated_by: Option<Vec<Replacement>>,
}

/// `deprecatedBy` items come either as bare names or as `{cpeName, cpeNameId}`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Replacement {
    Name(String),
    Ref {
        #[serde(rename = "cpeName")]
        cpe_name: String,
    },
}

/// The nested `cpe` object of a product wrapper, if it has one.
pub fn nested_cpe(product: &Value) -> Option<&Value> {
    product.get("cpe").filter(|v| v.as_object().is_some_and(|o| !o.is_empty()))
}

/// Build a store entry from the nested `cpe` object.
pub fn normalize(cpe: &Value) -> Result<CpeEntry, String> {
    let raw = RawCpe::deserialize(cpe).map_err(|e| format!("unreadable cpe object: {e}"))?;
    if raw.cpe_name_id.is_empty() {
        return Err("missing cpeNameId".into());
    }
    if !raw.cpe_name.starts_with(CPE_PREFIX) {
        return Err(format!("not a CPE 2.3 name: {:?}", raw.cpe_name));
    }
    let deprecated_by = if raw.deprecated {
        Some(
            raw.deprecated_by
                .unwrap_or_default()
                .into_iter()
                .map(|r| match r {
                    Replacement::Name(n) => n,
                    Replacement::Ref { cpe_name } => cpe_name,
                })
                .collect(),
        )
    } else {
        None
    };
    Ok(CpeEntry {
        components: parse_cpe_name(&raw.cpe_name),
        cpe_name: raw.cpe_name,
        cpe_name_id: raw.cpe_name_id,
        deprecated: raw.deprecated,
        deprecated_by,
    })
}
