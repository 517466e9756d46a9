//! CSV import/export for product batches
//!
//! Parses uploaded product CSVs into [`ProductInput`] rows and serializes
//! generated batches back out. Quote-aware (RFC 4180 style): fields
//! containing commas, quotes, or newlines are quoted, embedded quotes are
//! doubled. Unknown columns are ignored on import so an exported batch
//! re-imports cleanly.

use thiserror::Error;
use tracing::debug;

use crate::api::types::{GeneratedItem, ProductInput};

/// Columns that must all be present (header and per-row value) for a row to
/// be kept.
pub const REQUIRED_COLUMNS: [&str; 4] = ["product_name", "category", "features", "audience"];

/// Optional column carried through when present.
pub const KEYWORDS_COLUMN: &str = "keywords";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CsvError {
    #[error("CSV input is empty")]
    Empty,
    #[error("missing required column: {0}")]
    MissingColumn(&'static str),
}

/// Parse a product CSV.
///
/// The header row must contain every required column (matching is trimmed
/// and case-insensitive). Rows missing any required value are dropped, not
/// errors; the survivor list preserves input order.
pub fn parse_products(input: &str) -> Result<Vec<ProductInput>, CsvError> {
    let mut records = parse_records(input).into_iter();
    let header = records.next().ok_or(CsvError::Empty)?;

    let normalized: Vec<String> = header
        .iter()
        .map(|cell| cell.trim().to_ascii_lowercase())
        .collect();

    let mut required_idx = [0usize; REQUIRED_COLUMNS.len()];
    for (slot, column) in required_idx.iter_mut().zip(REQUIRED_COLUMNS) {
        *slot = normalized
            .iter()
            .position(|cell| cell == column)
            .ok_or(CsvError::MissingColumn(column))?;
    }
    let keywords_idx = normalized.iter().position(|cell| cell == KEYWORDS_COLUMN);

    let mut products = Vec::new();
    let mut dropped = 0usize;

    for record in records {
        // Skip blank separator lines entirely
        if record.iter().all(|cell| cell.trim().is_empty()) {
            continue;
        }

        let mut values = Vec::with_capacity(REQUIRED_COLUMNS.len());
        for idx in required_idx {
            match record.get(idx).map(|cell| cell.trim()) {
                Some(value) if !value.is_empty() => values.push(value.to_string()),
                _ => break,
            }
        }
        if values.len() < REQUIRED_COLUMNS.len() {
            dropped += 1;
            continue;
        }

        let keywords = keywords_idx
            .and_then(|idx| record.get(idx))
            .map(|cell| cell.trim())
            .filter(|value| !value.is_empty())
            .map(str::to_string);

        let mut values = values.into_iter();
        products.push(ProductInput {
            product_name: values.next().unwrap_or_default(),
            category: values.next().unwrap_or_default(),
            features: values.next().unwrap_or_default(),
            audience: values.next().unwrap_or_default(),
            keywords,
        });
    }

    if dropped > 0 {
        debug!(dropped, "dropped CSV rows missing required fields");
    }

    Ok(products)
}

/// Serialize a generated batch to CSV.
///
/// Emits the four core columns plus `description` and `keywords`, one line
/// per item after the header. Output parses back through
/// [`parse_products`] with the core fields intact.
pub fn export_items(items: &[GeneratedItem]) -> String {
    let mut out = String::from("product_name,category,features,audience,description,keywords\n");
    for item in items {
        let row = [
            item.product_name.as_str(),
            item.category.as_str(),
            item.features.as_str(),
            item.audience.as_str(),
            item.description.as_str(),
            item.keywords.as_deref().unwrap_or(""),
        ];
        let encoded: Vec<String> = row.iter().map(|field| escape_field(field)).collect();
        out.push_str(&encoded.join(","));
        out.push('\n');
    }
    out
}

/// Split raw CSV text into records of cells, honoring quoted fields
/// (embedded commas/newlines, doubled quotes) and both LF and CRLF endings.
fn parse_records(input: &str) -> Vec<Vec<String>> {
    let mut records = Vec::new();
    let mut record: Vec<String> = Vec::new();
    let mut cell = String::new();
    let mut in_quotes = false;
    let mut chars = input.chars().peekable();
    let mut saw_any = false;

    while let Some(ch) = chars.next() {
        saw_any = true;
        if in_quotes {
            match ch {
                '"' => {
                    if chars.peek() == Some(&'"') {
                        chars.next();
                        cell.push('"');
                    } else {
                        in_quotes = false;
                    }
                }
                _ => cell.push(ch),
            }
            continue;
        }

        match ch {
            '"' => in_quotes = true,
            ',' => {
                record.push(std::mem::take(&mut cell));
            }
            '\r' => {
                // Consumed as part of CRLF; a bare CR is treated the same
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
                record.push(std::mem::take(&mut cell));
                records.push(std::mem::take(&mut record));
            }
            '\n' => {
                record.push(std::mem::take(&mut cell));
                records.push(std::mem::take(&mut record));
            }
            _ => cell.push(ch),
        }
    }

    if saw_any && (!cell.is_empty() || !record.is_empty()) {
        record.push(cell);
        records.push(record);
    }

    records
}

fn escape_field(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') || field.contains('\r') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_item(name: &str, category: &str, features: &str, audience: &str) -> GeneratedItem {
        GeneratedItem {
            id: "item_1".to_string(),
            product_name: name.to_string(),
            category: category.to_string(),
            features: features.to_string(),
            audience: audience.to_string(),
            description: format!("A great {} for {}", name, audience),
            keywords: None,
        }
    }

    #[test]
    fn test_parse_basic_rows() {
        let csv = "product_name, category, features, audience\n\
                   Mug, Kitchen, \"ceramic, 12oz\", coffee lovers\n\
                   Lamp, Home, warm LED, readers\n";
        let products = parse_products(csv).unwrap();
        assert_eq!(products.len(), 2);
        assert_eq!(products[0].product_name, "Mug");
        assert_eq!(products[0].features, "ceramic, 12oz");
        assert_eq!(products[1].audience, "readers");
        assert!(products[0].keywords.is_none());
    }

    #[test]
    fn test_rows_missing_required_fields_are_dropped() {
        let csv = "product_name,category,features,audience\n\
                   Mug,Kitchen,ceramic,coffee lovers\n\
                   ,Kitchen,steel,campers\n\
                   Bottle,Outdoors,insulated\n\
                   Pan,Kitchen,  ,cooks\n";
        let products = parse_products(csv).unwrap();
        assert_eq!(products.len(), 1);
        assert_eq!(products[0].product_name, "Mug");
    }

    #[test]
    fn test_missing_header_column_is_an_error() {
        let csv = "product_name,category,audience\nMug,Kitchen,coffee lovers\n";
        assert_eq!(
            parse_products(csv),
            Err(CsvError::MissingColumn("features"))
        );
        assert_eq!(parse_products(""), Err(CsvError::Empty));
    }

    #[test]
    fn test_keywords_column_optional() {
        let csv = "product_name,category,features,audience,keywords\n\
                   Mug,Kitchen,ceramic,coffee lovers,gift mug\n\
                   Lamp,Home,LED,readers,\n";
        let products = parse_products(csv).unwrap();
        assert_eq!(products[0].keywords.as_deref(), Some("gift mug"));
        assert!(products[1].keywords.is_none());
    }

    #[test]
    fn test_quoted_fields_with_newlines_and_quotes() {
        let csv = "product_name,category,features,audience\n\
                   \"Mug \"\"XL\"\"\",Kitchen,\"line one\nline two\",campers\n";
        let products = parse_products(csv).unwrap();
        assert_eq!(products.len(), 1);
        assert_eq!(products[0].product_name, "Mug \"XL\"");
        assert_eq!(products[0].features, "line one\nline two");
    }

    #[test]
    fn test_crlf_line_endings() {
        let csv = "product_name,category,features,audience\r\nMug,Kitchen,ceramic,campers\r\n";
        let products = parse_products(csv).unwrap();
        assert_eq!(products.len(), 1);
        assert_eq!(products[0].category, "Kitchen");
    }

    #[test]
    fn test_export_single_item_is_two_lines() {
        let csv = export_items(&[make_item("Mug", "Kitchen", "ceramic, 12oz", "coffee lovers")]);
        let lines: Vec<&str> = csv.trim_end().lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(csv.contains("Mug"));
        assert!(lines[0].starts_with("product_name,category,features,audience"));
    }

    #[test]
    fn test_round_trip_preserves_core_fields() {
        let csv = "product_name,category,features,audience\n\
                   \"Mug, Deluxe\",Kitchen,\"ceramic, 12oz\",coffee lovers\n\
                   Tent,Outdoors,\"3-person, waterproof\",campers\n";
        let parsed = parse_products(csv).unwrap();

        let items: Vec<GeneratedItem> = parsed
            .iter()
            .map(|p| GeneratedItem {
                id: "x".to_string(),
                product_name: p.product_name.clone(),
                category: p.category.clone(),
                features: p.features.clone(),
                audience: p.audience.clone(),
                description: "desc".to_string(),
                keywords: p.keywords.clone(),
            })
            .collect();

        let reparsed = parse_products(&export_items(&items)).unwrap();
        assert_eq!(reparsed.len(), parsed.len());
        for (a, b) in parsed.iter().zip(&reparsed) {
            assert_eq!(a.product_name, b.product_name);
            assert_eq!(a.category, b.category);
            assert_eq!(a.features, b.features);
            assert_eq!(a.audience, b.audience);
        }
    }
}
