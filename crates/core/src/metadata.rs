use crate::models::{ManualMetadata, DEFAULT_DOC_TYPE};
use std::path::Path;

/// Parses the `BRAND_MODEL[_YEAR][_TYPE...].pdf` filename convention
/// into structured tags. Best effort and positional: a filename that
/// does not follow the convention yields partial metadata, never an
/// error. Year is only recognized when the third segment is all digits.
pub fn extract_from_filename(filename: &str) -> ManualMetadata {
    let stem = Path::new(filename)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or(filename);

    let parts: Vec<&str> = stem.split('_').collect();

    let mut metadata = ManualMetadata {
        brand: None,
        model: None,
        year: None,
        doc_type: DEFAULT_DOC_TYPE.to_string(),
        page: 0,
        filename: filename.to_string(),
        source_path: String::new(),
        ocr_processed: false,
    };

    if parts.len() >= 2 {
        metadata.brand = Some(parts[0].to_uppercase());
        metadata.model = Some(parts[1].to_string());
    }

    if parts.len() >= 3 && !parts[2].is_empty() && parts[2].chars().all(|c| c.is_ascii_digit()) {
        metadata.year = Some(parts[2].to_string());
    }

    if parts.len() >= 4 {
        metadata.doc_type = parts[3..].join("_").to_lowercase();
    }

    metadata
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_convention_is_recovered() {
        let metadata = extract_from_filename("FIAT_500_2020_Manuale_Officina.pdf");
        assert_eq!(metadata.brand.as_deref(), Some("FIAT"));
        assert_eq!(metadata.model.as_deref(), Some("500"));
        assert_eq!(metadata.year.as_deref(), Some("2020"));
        assert_eq!(metadata.doc_type, "manuale_officina");
        assert_eq!(metadata.filename, "FIAT_500_2020_Manuale_Officina.pdf");
    }

    #[test]
    fn brand_is_uppercased_model_keeps_case() {
        let metadata = extract_from_filename("fiat_Panda_2018_Uso.pdf");
        assert_eq!(metadata.brand.as_deref(), Some("FIAT"));
        assert_eq!(metadata.model.as_deref(), Some("Panda"));
    }

    #[test]
    fn non_numeric_third_segment_is_not_a_year() {
        let metadata = extract_from_filename("ALFA_Giulia_Quadrifoglio_Officina.pdf");
        assert_eq!(metadata.year, None);
        assert_eq!(metadata.doc_type, "officina");
    }

    #[test]
    fn short_filenames_yield_partial_metadata_without_error() {
        let metadata = extract_from_filename("manuale.pdf");
        assert_eq!(metadata.brand, None);
        assert_eq!(metadata.model, None);
        assert_eq!(metadata.year, None);
        assert_eq!(metadata.doc_type, DEFAULT_DOC_TYPE);
    }

    #[test]
    fn two_segment_filename_sets_brand_and_model_only() {
        let metadata = extract_from_filename("LANCIA_Ypsilon.pdf");
        assert_eq!(metadata.brand.as_deref(), Some("LANCIA"));
        assert_eq!(metadata.model.as_deref(), Some("Ypsilon"));
        assert_eq!(metadata.year, None);
        assert_eq!(metadata.doc_type, DEFAULT_DOC_TYPE);
    }
}
