use serde::{Deserialize, Serialize};

use crate::error::{KnownError, Result};

const DELIMITER: &str = "---";

/// The metadata header shared by filesystem and CMS posts. Wire names are
/// camelCase to match the header keys (`publishedOn`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrontMatter {
    pub title: String,
    pub summary: String,
    /// ISO-date-like string, e.g. "2021-03-01".
    pub published_on: String,
    pub slug: String,
}

/// A raw post split into its metadata record and markdown body.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedPost {
    pub front_matter: FrontMatter,
    pub body: String,
}

/// Parse a raw post: a `---` delimited YAML header followed by the body.
///
/// Used for both sources so filesystem and CMS posts cannot drift apart.
/// A missing delimiter or missing required key is a typed error.
pub fn parse(raw: &str) -> Result<ParsedPost> {
    let text = raw.trim_start_matches('\u{feff}');
    let after_open = text
        .strip_prefix(DELIMITER)
        .and_then(|rest| rest.strip_prefix("\r\n").or_else(|| rest.strip_prefix('\n')))
        .ok_or_else(|| KnownError::FrontMatter("missing opening delimiter".into()))?;

    let mut offset = 0;
    let mut header_span = None;
    for line in after_open.split_inclusive('\n') {
        if line.trim_end() == DELIMITER {
            header_span = Some((offset, offset + line.len()));
            break;
        }
        offset += line.len();
    }
    let (header_end, body_start) = header_span
        .ok_or_else(|| KnownError::FrontMatter("missing closing delimiter".into()))?;

    let header = &after_open[..header_end];
    let front_matter: FrontMatter = serde_yaml::from_str(header)
        .map_err(|err| KnownError::FrontMatter(err.to_string()))?;

    Ok(ParsedPost {
        front_matter,
        body: after_open[body_start..].to_string(),
    })
}
