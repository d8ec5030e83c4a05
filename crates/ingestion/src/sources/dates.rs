//! Brazilian date extraction shared by the source adapters
//!
//! Listing pages carry deadlines in free text ("até 30/12/2025",
//! "de 12 a 31/03/2025", "em 09.06.25"). The extracted date only gates
//! admission; the LLM stage remains authoritative for the record itself.

use chrono::NaiveDate;
use regex_lite::Regex;

/// Parse DD/MM/YYYY or DD.MM.YYYY
pub fn parse_br_date(date_str: &str) -> Option<NaiveDate> {
    let normalized = date_str.trim().replace('.', "/");
    NaiveDate::parse_from_str(&normalized, "%d/%m/%Y").ok()
}

/// Extract a deadline from free text. Ranges yield the final date.
pub fn extract_deadline(text: &str) -> Option<NaiveDate> {
    let patterns = [
        // até 31/03/2025
        r"(?i)at[eé]\s+(\d{2}[/.]\d{2}[/.]\d{4})",
        // prazo: 31/03/2025 / Data de Encerramento: 17/11/2025
        r"(?i)(?:prazo|encerramento)[:\s]+.*?(\d{2}[/.]\d{2}[/.]\d{4})",
        // 12/03/2025 a 31/03/2025 — take the second date
        r"\d{2}[/.]\d{2}[/.]\d{4}\s+a\s+(\d{2}[/.]\d{2}[/.]\d{4})",
        // de 12 a 31/03/2025
        r"(?i)de\s+\d{1,2}\s+a\s+(\d{2}[/.]\d{2}[/.]\d{4})",
        // em 09/06/25 (two-digit year)
        r"(?i)em\s+(\d{2}[/.]\d{2}[/.]\d{2,4})",
    ];

    for pattern in patterns {
        let re = Regex::new(pattern).expect("deadline pattern");
        if let Some(caps) = re.captures(text) {
            if let Some(m) = caps.get(1) {
                let mut date_str = m.as_str().replace('.', "/");
                // Two-digit years are this century
                let parts: Vec<&str> = date_str.split('/').collect();
                if parts.len() == 3 && parts[2].len() == 2 {
                    date_str = format!("{}/{}/20{}", parts[0], parts[1], parts[2]);
                }
                if let Some(parsed) = parse_br_date(&date_str) {
                    return Some(parsed);
                }
            }
        }
    }

    None
}

/// Extract a 20xx year from a title or description
pub fn extract_year(text: &str) -> Option<i32> {
    let re = Regex::new(r"\b(20\d{2})\b").expect("year pattern");
    re.captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_parse_br_date_formats() {
        assert_eq!(parse_br_date("13/03/2025"), Some(date(2025, 3, 13)));
        assert_eq!(parse_br_date("13.03.2025"), Some(date(2025, 3, 13)));
        assert_eq!(parse_br_date("31/02/2025"), None);
        assert_eq!(parse_br_date("amanhã"), None);
    }

    #[test]
    fn test_deadline_ate() {
        let deadline = extract_deadline("Submissões até 30/12/2025 pelo sistema.");
        assert_eq!(deadline, Some(date(2025, 12, 30)));
    }

    #[test]
    fn test_deadline_range_takes_final_date() {
        let deadline = extract_deadline("Inscrições de 12/03/2025 a 31/03/2025");
        assert_eq!(deadline, Some(date(2025, 3, 31)));
    }

    #[test]
    fn test_deadline_compact_range() {
        let deadline = extract_deadline("Período de submissão: de 12 a 31/03/2025");
        assert_eq!(deadline, Some(date(2025, 3, 31)));
    }

    #[test]
    fn test_deadline_two_digit_year() {
        let deadline = extract_deadline("Resultado divulgado em 09/06/25");
        assert_eq!(deadline, Some(date(2025, 6, 9)));
    }

    #[test]
    fn test_deadline_encerramento() {
        let deadline = extract_deadline("Data de Encerramento: 17/11/2025");
        assert_eq!(deadline, Some(date(2025, 11, 17)));
    }

    #[test]
    fn test_deadline_absent() {
        assert_eq!(extract_deadline("Edital permanente, fluxo contínuo"), None);
    }

    #[test]
    fn test_extract_year() {
        assert_eq!(extract_year("Chamadas públicas 2025"), Some(2025));
        assert_eq!(extract_year("Edital nº 4/2024 - CONFAP"), Some(2024));
        assert_eq!(extract_year("Edital sem ano"), None);
        // Out-of-range numbers are not years
        assert_eq!(extract_year("protocolo 123456"), None);
    }
}
