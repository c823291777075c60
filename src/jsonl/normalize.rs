//! String-field normalizers for JSONL emission (spec.md §4.7 step 7:
//! "normalize string fields (organization name, grant agency, owner name,
//! model, locus-tag prefix, biosample-set id, local id)"). Each normalizer is
//! best-effort: on failure to produce a cleaner form it returns the raw value
//! unchanged and the caller logs DEBUG under the field's category, per spec.md
//! §4.7 ("on failure, emit the raw value and log DEBUG with the specific
//! normalize category").

/// Collapses internal whitespace runs to a single space and trims ends. This
/// is the shared core every field-specific normalizer builds on; by itself it
/// never "fails" (empty input normalizes to empty output), so callers treat a
/// post-normalize value that still looks malformed (empty, or unchanged from
/// a raw value containing control characters) as the failure case to log.
fn collapse_whitespace(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn has_control_chars(raw: &str) -> bool {
    raw.chars().any(|c| c.is_control() && c != '\t' && c != '\n')
}

/// One normalize attempt: `Ok(normalized)` or `Err(raw)` when normalization
/// could not improve on the input (caller emits the raw value and logs DEBUG).
type NormalizeResult = Result<String, String>;

fn basic(raw: &str) -> NormalizeResult {
    if raw.trim().is_empty() {
        return Err(raw.to_string());
    }
    let cleaned = collapse_whitespace(raw);
    if has_control_chars(&cleaned) {
        return Err(raw.to_string());
    }
    Ok(cleaned)
}

pub const CAT_ORGANIZATION_NAME: &str = "NORMALIZE_ORGANIZATION_NAME";
pub const CAT_GRANT_AGENCY: &str = "NORMALIZE_GRANT_AGENCY";
pub const CAT_OWNER_NAME: &str = "NORMALIZE_OWNER_NAME";
pub const CAT_MODEL: &str = "NORMALIZE_MODEL";
pub const CAT_LOCUS_TAG_PREFIX: &str = "NORMALIZE_LOCUS_TAG_PREFIX";
pub const CAT_BIOSAMPLE_SET_ID: &str = "NORMALIZE_BIOSAMPLE_SET_ID";
pub const CAT_LOCAL_ID: &str = "NORMALIZE_LOCAL_ID";

/// Normalizes `raw` under `category`, logging DEBUG with `category` and
/// falling back to the raw value on failure (spec.md §4.7 step 7).
pub fn normalize(raw: &str, category: &'static str) -> String {
    match basic(raw) {
        Ok(value) => value,
        Err(raw) => {
            tracing::debug!(debug_category = category, raw, "failed to normalize field, emitting raw value");
            raw
        }
    }
}

/// Locus-tag prefixes are conventionally upper-cased short alphanumeric
/// tokens (e.g. `ABCDE`); unlike the other free-text fields this one has a
/// shape to validate, not just whitespace to collapse.
pub fn normalize_locus_tag_prefix(raw: &str) -> String {
    let collapsed = collapse_whitespace(raw);
    if collapsed.is_empty() || !collapsed.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        tracing::debug!(
            debug_category = CAT_LOCUS_TAG_PREFIX,
            raw,
            "locus-tag prefix has unexpected shape, emitting raw value"
        );
        return raw.to_string();
    }
    collapsed.to_ascii_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapses_internal_whitespace() {
        assert_eq!(normalize("  Some   Lab   Name  ", CAT_OWNER_NAME), "Some Lab Name");
    }

    #[test]
    fn empty_input_falls_back_to_raw() {
        assert_eq!(normalize("", CAT_ORGANIZATION_NAME), "");
    }

    #[test]
    fn locus_tag_prefix_uppercases_valid_shape() {
        assert_eq!(normalize_locus_tag_prefix("abcde"), "ABCDE");
    }

    #[test]
    fn locus_tag_prefix_keeps_raw_on_bad_shape() {
        assert_eq!(normalize_locus_tag_prefix("not a tag!"), "not a tag!");
    }
}
