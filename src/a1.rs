//! A1-notation address codec.
//!
//! Translates between spreadsheet column letters and zero-based indices, and
//! parses single-cell references like `AB12` into `(row, col)` pairs.

/// A zero-based cell position decoded from an A1-style reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellRef {
    pub row: usize,
    pub col: usize,
}

/// Translate a zero-based column index to its letter form.
///
/// Bijective base-26: 0 -> "A", 25 -> "Z", 26 -> "AA".
pub fn column_index_to_letter(index: usize) -> String {
    let mut n = index + 1;
    let mut letters = Vec::new();

    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push(b'A' + rem as u8);
        n = (n - rem) / 26;
    }

    letters.reverse();
    String::from_utf8(letters).unwrap_or_default()
}

/// Translate a column letter to its zero-based index.
///
/// Accepts one or two uppercase ASCII letters, covering columns A through ZZ
/// (indices 0..=701). Anything longer or containing a non-letter returns
/// `None`; widening this bound would silently change the accepted input range.
pub fn column_letter_to_index(letters: &str) -> Option<usize> {
    let bytes = letters.as_bytes();
    if bytes.is_empty() || bytes.len() > 2 || !bytes.iter().all(|b| b.is_ascii_uppercase()) {
        return None;
    }

    let mut index = (bytes[bytes.len() - 1] - b'A') as usize;
    if bytes.len() == 2 {
        index += 26 * ((bytes[0] - b'A') as usize + 1);
    }

    Some(index)
}

/// Parse a cell reference like `A1` into zero-based row and column indices.
///
/// The reference must be exactly one run of letters followed by one run of
/// digits. Input is uppercased first, so `ab12` works. Row numbers are
/// one-based in A1 notation, so `A0` has no zero-based row and is rejected.
pub fn parse_cell_reference(cell: &str) -> Option<CellRef> {
    let cell = cell.to_ascii_uppercase();
    let split = cell.find(|c: char| c.is_ascii_digit())?;
    let (letters, digits) = cell.split_at(split);

    if letters.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let col = column_letter_to_index(letters)?;
    let row = digits.parse::<usize>().ok()?.checked_sub(1)?;

    Some(CellRef { row, col })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_to_letter() {
        assert_eq!(column_index_to_letter(0), "A");
        assert_eq!(column_index_to_letter(25), "Z");
        assert_eq!(column_index_to_letter(26), "AA");
        assert_eq!(column_index_to_letter(701), "ZZ");
    }

    #[test]
    fn test_letter_to_index() {
        assert_eq!(column_letter_to_index("A"), Some(0));
        assert_eq!(column_letter_to_index("Z"), Some(25));
        assert_eq!(column_letter_to_index("AA"), Some(26));
        assert_eq!(column_letter_to_index("ZZ"), Some(701));
    }

    #[test]
    fn test_letter_to_index_rejects_out_of_bounds_input() {
        // Columns beyond ZZ are a deliberate limit, not a parse bug
        assert_eq!(column_letter_to_index("AAA"), None);
        assert_eq!(column_letter_to_index(""), None);
        assert_eq!(column_letter_to_index("a"), None);
        assert_eq!(column_letter_to_index("A1"), None);
    }

    #[test]
    fn test_letters_and_indices_are_inverses() {
        for index in 0..=701 {
            let letters = column_index_to_letter(index);
            assert_eq!(
                column_letter_to_index(&letters),
                Some(index),
                "round trip failed for column {letters}"
            );
        }
    }

    #[test]
    fn test_parse_cell_reference() {
        assert_eq!(parse_cell_reference("A1"), Some(CellRef { row: 0, col: 0 }));
        assert_eq!(
            parse_cell_reference("AB1234"),
            Some(CellRef { row: 1233, col: 27 })
        );
        assert_eq!(parse_cell_reference("b2"), Some(CellRef { row: 1, col: 1 }));
    }

    #[test]
    fn test_parse_cell_reference_rejects_partial_references() {
        assert_eq!(parse_cell_reference("A"), None);
        assert_eq!(parse_cell_reference("1A"), None);
        assert_eq!(parse_cell_reference("123"), None);
        assert_eq!(parse_cell_reference("A1B2"), None);
        assert_eq!(parse_cell_reference("A0"), None);
        assert_eq!(parse_cell_reference(""), None);
        assert_eq!(parse_cell_reference("AAA1"), None);
    }
}
