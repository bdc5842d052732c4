use crate::identity::NodeIdentity;
use anyhow::{bail, Context, Result};

/// One weighted association between two concepts.
#[derive(Debug, Clone, PartialEq)]
pub struct Association {
    pub source: NodeIdentity,
    pub target: NodeIdentity,
    pub weight: f32,
}

#[derive(Debug)]
pub struct ExtractionResult {
    pub associations: Vec<Association>,
}

pub trait Extractor {
    fn extract(&self, content: &str) -> Result<ExtractionResult>;
}

/// Reads `source,target[,weight]` rows. Identities use the `category:name`
/// form; a missing or empty weight counts as 1.0. Columns are found by header
/// name and fall back to the first three positions.
pub struct CsvExtractor {
    pub delimiter: u8,
}

impl Default for CsvExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl CsvExtractor {
    pub fn new() -> Self {
        Self { delimiter: b',' }
    }

    pub fn tab_separated() -> Self {
        Self { delimiter: b'\t' }
    }
}

fn column(headers: &csv::StringRecord, name: &str, fallback: usize) -> usize {
    headers
        .iter()
        .position(|h| h.trim().eq_ignore_ascii_case(name))
        .unwrap_or(fallback)
}

impl Extractor for CsvExtractor {
    fn extract(&self, content: &str) -> Result<ExtractionResult> {
        let mut rdr = csv::ReaderBuilder::new()
            .delimiter(self.delimiter)
            .flexible(true)
            .from_reader(content.as_bytes());

        let headers = rdr.headers()?.clone();
        let source_col = column(&headers, "source", 0);
        let target_col = column(&headers, "target", 1);
        let weight_col = column(&headers, "weight", 2);
        let mut associations = Vec::new();

        for (row, result) in rdr.records().enumerate() {
            let record = result?;
            let (Some(source), Some(target)) = (record.get(source_col), record.get(target_col)) else {
                continue;
            };
            let (source, target) = (source.trim(), target.trim());
            if source.is_empty() || target.is_empty() {
                continue;
            }

            let weight = match record.get(weight_col).map(str::trim) {
                None | Some("") => 1.0,
                Some(raw) => raw
                    .parse::<f32>()
                    .with_context(|| format!("row {}: bad weight {:?}", row + 1, raw))?,
            };
            if !weight.is_finite() {
                bail!("row {}: weight must be finite", row + 1);
            }

            associations.push(Association {
                source: source
                    .parse::<NodeIdentity>()
                    .with_context(|| format!("row {}: bad source", row + 1))?,
                target: target
                    .parse::<NodeIdentity>()
                    .with_context(|| format!("row {}: bad target", row + 1))?,
                weight,
            });
        }

        Ok(ExtractionResult { associations })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Category;

    #[test]
    fn test_csv_rows() {
        let content = "source,target,weight\nword:faith,word:hope,2.5\nentity:Nephi,verse:1-ne 1:1,\n,word:skip,1\n";
        let result = CsvExtractor::new().extract(content).unwrap();
        assert_eq!(result.associations.len(), 2);

        let first = &result.associations[0];
        assert_eq!(first.source, NodeIdentity::word("faith"));
        assert_eq!(first.weight, 2.5);

        let second = &result.associations[1];
        assert_eq!(second.target, NodeIdentity::new(Category::VERSE, "1-ne 1:1"));
        assert_eq!(second.weight, 1.0);
    }

    #[test]
    fn test_columns_found_by_name() {
        let content = "weight\ttarget\tsource\n0.5\tword:b\tword:a\n";
        let result = CsvExtractor::tab_separated().extract(content).unwrap();
        let only = &result.associations[0];
        assert_eq!(only.source, NodeIdentity::word("a"));
        assert_eq!(only.target, NodeIdentity::word("b"));
        assert_eq!(only.weight, 0.5);
    }

    #[test]
    fn test_bad_rows_are_errors() {
        let bad_weight = "source,target,weight\nword:a,word:b,heavy\n";
        let err = CsvExtractor::new().extract(bad_weight).unwrap_err();
        assert!(err.to_string().contains("row 1"));

        let bad_identity = "source,target\nplanet:mars,word:b\n";
        assert!(CsvExtractor::new().extract(bad_identity).is_err());
    }
}
