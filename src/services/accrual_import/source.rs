//! Delimiter sniffing and per-cell decoding of the raw export

use std::borrow::Cow;

use anyhow::{Context, Result};
use encoding_rs::{Encoding, UTF_8};

use super::error::ImportError;

const SNIFF_BYTES: usize = 8 * 1024;
const CANDIDATES: [u8; 3] = [b';', b',', b'\t'];
const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// One physical record of the source file
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRow {
    /// 1-based line number where the record starts
    pub line: u64,
    pub cells: Vec<String>,
}

/// Decoded content of a delimited file
#[derive(Debug, Clone)]
pub struct SourceTable {
    pub delimiter: u8,
    pub encoding: &'static Encoding,
    pub rows: Vec<SourceRow>,
}

/// Pick the most frequent candidate delimiter in the first 8KB.
/// Ties and files without any candidate fall back to `;`.
pub fn sniff_delimiter(bytes: &[u8]) -> u8 {
    let sample = &bytes[..bytes.len().min(SNIFF_BYTES)];
    let counts: Vec<(u8, usize)> = CANDIDATES
        .iter()
        .map(|&d| (d, sample.iter().filter(|&&b| b == d).count()))
        .collect();

    let max = counts.iter().map(|(_, n)| *n).max().unwrap_or(0);
    if max == 0 {
        return b';';
    }
    let mut leaders = counts.iter().filter(|(_, n)| *n == max);
    match (leaders.next(), leaders.next()) {
        (Some((d, _)), None) => *d,
        _ => b';',
    }
}

/// Resolve an encoding label such as "utf-8", "cp1251" or "windows-1251".
/// Multi-byte legacy encodings are rejected.
pub fn resolve_encoding(label: &str) -> Result<&'static Encoding, ImportError> {
    let normalized = label.trim().to_lowercase();
    let label = match normalized.as_str() {
        "utf8" => "utf-8",
        "cp866" => "ibm866",
        other => other,
    };
    // cells are split at the byte level, so only UTF-8 and single-byte
    // encodings keep delimiters intact
    match Encoding::for_label(label.as_bytes()) {
        Some(encoding) if encoding == UTF_8 || encoding.is_single_byte() => Ok(encoding),
        _ => Err(ImportError::UnsupportedEncoding(label.to_string())),
    }
}

/// Parse a user supplied delimiter ("\t" and "tab" are accepted)
pub fn parse_delimiter(raw: &str) -> Result<u8, ImportError> {
    match raw {
        "\\t" | "tab" | "\t" => Ok(b'\t'),
        s if s.len() == 1 && s.is_ascii() => Ok(s.as_bytes()[0]),
        s => Err(ImportError::InvalidDelimiter(s.to_string())),
    }
}

/// Decode one cell. Undecodable bytes pass through lossily instead of
/// failing the row.
pub fn decode_cell(raw: &[u8], encoding: &'static Encoding) -> String {
    let raw = raw.strip_prefix(UTF8_BOM).unwrap_or(raw);
    let decoded: Cow<'_, str> = if encoding == UTF_8 {
        match std::str::from_utf8(raw) {
            Ok(s) => Cow::Borrowed(s),
            Err(_) => String::from_utf8_lossy(raw),
        }
    } else {
        encoding
            .decode_without_bom_handling_and_without_replacement(raw)
            .unwrap_or_else(|| String::from_utf8_lossy(raw))
    };
    decoded.strip_prefix('\u{feff}').unwrap_or(&decoded).to_string()
}

/// Split the raw file into decoded records
pub fn read_table(
    bytes: &[u8],
    delimiter: Option<u8>,
    encoding: &'static Encoding,
) -> Result<SourceTable> {
    let delimiter = delimiter.unwrap_or_else(|| sniff_delimiter(bytes));

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(bytes);

    let mut rows = Vec::new();
    for (idx, record) in reader.byte_records().enumerate() {
        let record = record.with_context(|| format!("malformed record #{}", idx + 1))?;
        let line = record.position().map(|p| p.line()).unwrap_or(idx as u64 + 1);
        let cells = record.iter().map(|cell| decode_cell(cell, encoding)).collect();
        rows.push(SourceRow { line, cells });
    }

    Ok(SourceTable { delimiter, encoding, rows })
}

#[cfg(test)]
mod tests {
    use super::*;
    use encoding_rs::WINDOWS_1251;

    #[test]
    fn test_sniffs_most_frequent_delimiter() {
        assert_eq!(sniff_delimiter(b"a;b;c\n1;2;3\n"), b';');
        assert_eq!(sniff_delimiter(b"a,b,c\n1,2,3\n"), b',');
        assert_eq!(sniff_delimiter(b"a\tb\tc\n1\t2\t3\n"), b'\t');
    }

    #[test]
    fn test_sniff_defaults_to_semicolon() {
        assert_eq!(sniff_delimiter(b"just one column\n"), b';');
        assert_eq!(sniff_delimiter(b"a,b\tc\n"), b';');
        assert_eq!(sniff_delimiter(b""), b';');
    }

    #[test]
    fn test_override_wins_over_sniffing() {
        let table = read_table(b"a;b,c\n", Some(b','), UTF_8).unwrap();
        assert_eq!(table.delimiter, b',');
        assert_eq!(table.rows[0].cells, vec!["a;b", "c"]);
    }

    #[test]
    fn test_resolves_known_labels() {
        assert_eq!(resolve_encoding("UTF8").unwrap(), UTF_8);
        assert_eq!(resolve_encoding("cp1251").unwrap(), WINDOWS_1251);
        assert_eq!(resolve_encoding("windows-1251").unwrap(), WINDOWS_1251);
        assert!(matches!(
            resolve_encoding("klingon"),
            Err(ImportError::UnsupportedEncoding(_))
        ));
    }

    #[test]
    fn test_rejects_multi_byte_encodings() {
        for label in ["utf-16le", "utf-16", "shift_jis", "gbk", "euc-kr"] {
            assert!(
                matches!(resolve_encoding(label), Err(ImportError::UnsupportedEncoding(_))),
                "{} should be rejected",
                label
            );
        }
        assert_eq!(resolve_encoding("cp866").unwrap(), encoding_rs::IBM866);
        assert_eq!(resolve_encoding("koi8-r").unwrap(), encoding_rs::KOI8_R);
    }

    #[test]
    fn test_parses_delimiter_arguments() {
        assert_eq!(parse_delimiter(";").unwrap(), b';');
        assert_eq!(parse_delimiter("\\t").unwrap(), b'\t');
        assert!(parse_delimiter(";;").is_err());
    }

    #[test]
    fn test_decodes_cp1251_cells() {
        let (bytes, _, _) = WINDOWS_1251.encode("ФИО;Сумма\r\nИванов;100\r\n");
        let table = read_table(&bytes, None, WINDOWS_1251).unwrap();
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0].cells, vec!["ФИО", "Сумма"]);
        assert_eq!(table.rows[1].cells, vec!["Иванов", "100"]);
        assert_eq!(table.rows[1].line, 2);
    }

    #[test]
    fn test_strips_bom_from_first_cell() {
        let table = read_table("\u{feff}ФИО;Сумма\n".as_bytes(), None, UTF_8).unwrap();
        assert_eq!(table.rows[0].cells[0], "ФИО");
    }

    #[test]
    fn test_invalid_utf8_passes_through() {
        let cell = decode_cell(b"ok\xFFok", UTF_8);
        assert!(cell.starts_with("ok"));
        assert!(cell.ends_with("ok"));
    }

    #[test]
    fn test_quoted_cells_keep_delimiters() {
        let table = read_table(b"\"a;b\";c\n", None, UTF_8).unwrap();
        assert_eq!(table.rows[0].cells, vec!["a;b", "c"]);
    }
}
