use anyhow::Result;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;
use url::Url;

static LEADING_DIGITS: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"^(?P<n>\d+)").unwrap());

/// Ordering applied to an exported copy of the registry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ExportOrder {
    /// First-seen order
    #[default]
    None,
    /// Ascending by the integer leading the file name
    NumericSuffix,
}

impl fmt::Display for ExportOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportOrder::None => write!(f, "none"),
            ExportOrder::NumericSuffix => write!(f, "numeric-suffix"),
        }
    }
}

/// Integer formed by the leading digits of the last path segment, up to
/// the first `.`.
///
/// `https://x/12.jpg` gives 12, `https://x/12_front.webp?w=800` gives 12,
/// `https://x/front.jpg` gives `None`.
pub fn numeric_suffix(source: &str) -> Option<u64> {
    let segment = match Url::parse(source) {
        Ok(url) => url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .map(str::to_string)?,
        Err(_) => {
            let path = source.split(['?', '#']).next().unwrap_or(source);
            path.rsplit('/').next().unwrap_or(path).to_string()
        }
    };

    let stem = segment.split('.').next().unwrap_or_default();
    let cap = LEADING_DIGITS.captures(stem)?;
    cap["n"].parse().ok()
}

/// Returns an ordered copy of `sources`.
///
/// Under [`ExportOrder::NumericSuffix`] entries without a numeric file name
/// sort after all numeric ones and keep their relative order.
pub fn ordered(sources: &[String], order: ExportOrder) -> Vec<String> {
    let mut out = sources.to_vec();
    if order == ExportOrder::NumericSuffix {
        out.sort_by_key(|source| match numeric_suffix(source) {
            Some(n) => (false, n),
            None => (true, 0),
        });
    }
    out
}

/// Serializes sources as a JSON array, indented by four spaces when `pretty`.
pub fn to_json(sources: &[String], pretty: bool) -> Result<String> {
    if !pretty {
        return Ok(serde_json::to_string(sources)?);
    }

    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    sources.serialize(&mut ser)?;
    Ok(String::from_utf8(buf)?)
}
