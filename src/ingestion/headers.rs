//! Header normalization shared by every format.
//!
//! Blank column names are replaced with `Unnamed_A`, `Unnamed_B`, ..., `Unnamed_Z`,
//! `Unnamed_AA`, ... The letter sequence counts only the blank entries, so
//! `["name", "", "age", " "]` becomes `["name", "Unnamed_A", "age", "Unnamed_B"]`.
//! Non-blank names pass through untouched (duplicates included).

/// Prefix used for synthesized column names.
pub const UNNAMED_PREFIX: &str = "Unnamed_";

/// Convert a 0-based index to a spreadsheet-style column name (`0 -> A`, `25 -> Z`, `26 -> AA`).
pub fn excel_column_name(index: usize) -> String {
    let mut letters = Vec::new();
    let mut n = index + 1;
    while n > 0 {
        n -= 1;
        letters.push(b'A' + (n % 26) as u8);
        n /= 26;
    }
    letters.reverse();
    String::from_utf8(letters).unwrap_or_default()
}

/// Replace empty or whitespace-only header entries with `Unnamed_<letters>`.
pub fn normalize_headers<S: AsRef<str>>(header: &[S]) -> Vec<String> {
    let mut empty_count = 0usize;
    header
        .iter()
        .map(|h| {
            let h = h.as_ref();
            if h.trim().is_empty() {
                let name = format!("{UNNAMED_PREFIX}{}", excel_column_name(empty_count));
                empty_count += 1;
                name
            } else {
                h.to_owned()
            }
        })
        .collect()
}

/// Headers for a source without a header row: one `Unnamed_*` per column.
pub fn synthetic_headers(width: usize) -> Vec<String> {
    normalize_headers(&vec![""; width])
}

/// Header for a source given its first record and the `no_header_row` option.
pub(crate) fn header_from_first_record<S: AsRef<str>>(first: &[S], no_header_row: bool) -> Vec<String> {
    if no_header_row {
        synthetic_headers(first.len())
    } else {
        normalize_headers(first)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_names_follow_base26() {
        assert_eq!(excel_column_name(0), "A");
        assert_eq!(excel_column_name(25), "Z");
        assert_eq!(excel_column_name(26), "AA");
        assert_eq!(excel_column_name(27), "AB");
        assert_eq!(excel_column_name(701), "ZZ");
        assert_eq!(excel_column_name(702), "AAA");
    }

    #[test]
    fn counter_only_advances_on_blank_entries() {
        let out = normalize_headers(&["name", "", "age", "  ", "city", "\t"]);
        assert_eq!(out, vec!["name", "Unnamed_A", "age", "Unnamed_B", "city", "Unnamed_C"]);
    }

    #[test]
    fn non_blank_entries_and_duplicates_are_untouched() {
        let out = normalize_headers(&[" a ", "a", "a"]);
        assert_eq!(out, vec![" a ", "a", "a"]);
    }

    #[test]
    fn many_blanks_roll_over_to_two_letters() {
        let input = vec![""; 28];
        let out = normalize_headers(&input);
        assert_eq!(out[25], "Unnamed_Z");
        assert_eq!(out[26], "Unnamed_AA");
        assert_eq!(out[27], "Unnamed_AB");
        let mut dedup = out.clone();
        dedup.sort();
        dedup.dedup();
        assert_eq!(dedup.len(), 28);
    }

    #[test]
    fn synthetic_headers_match_width() {
        assert_eq!(synthetic_headers(3), vec!["Unnamed_A", "Unnamed_B", "Unnamed_C"]);
        assert!(synthetic_headers(0).is_empty());
    }
}
