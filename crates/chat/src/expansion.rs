//! Conservative Portuguese query expansion
//!
//! Short queries gain at most two close synonyms to improve recall;
//! queries of three or more words are left alone (the user already knows
//! what they want, precision beats recall).

/// Domain synonym map. Order matters: earlier terms win the two expansion
/// slots.
const EXPANSIONS: &[(&str, &[&str])] = &[
    ("prazo", &["data"]),
    ("data", &["prazo"]),
    ("submissao", &["submissão", "candidatura"]),
    ("submissão", &["candidatura"]),
    ("candidatura", &["submissão"]),
    ("valor", &["financiamento"]),
    ("financiamento", &["valor", "recurso"]),
    ("requisito", &["critério"]),
    ("documento", &["anexo"]),
    ("candidato", &["proponente"]),
    ("resultado", &["divulgação"]),
    ("contato", &["email", "telefone"]),
    ("duracao", &["duração", "período"]),
    ("duração", &["prazo", "período"]),
    ("area", &["área", "tema"]),
    ("área", &["tema"]),
    ("quando", &["data"]),
    ("quanto", &["valor"]),
    ("cronograma", &["data"]),
    ("etapa", &["fase"]),
];

/// Maximum number of terms that get a synonym appended
const MAX_EXPANDED_TERMS: usize = 2;

/// Expand a user query with up to two synonyms not already present
pub fn expand_query(user_message: &str) -> String {
    // Detailed queries are specific intent; do not dilute them
    if user_message.split_whitespace().count() >= 3 {
        return user_message.to_string();
    }

    let query_lower = user_message.to_lowercase();
    let mut expanded = vec![user_message.to_string()];
    let mut expanded_terms = 0;

    for (term, synonyms) in EXPANSIONS {
        if expanded_terms >= MAX_EXPANDED_TERMS {
            break;
        }
        if !query_lower.contains(term) {
            continue;
        }

        if let Some(synonym) = synonyms.iter().find(|s| !query_lower.contains(*s)) {
            expanded.push((*synonym).to_string());
            expanded_terms += 1;
        }
    }

    expanded.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_term_gains_synonym() {
        assert_eq!(expand_query("prazo"), "prazo data");
    }

    #[test]
    fn test_three_word_query_unchanged() {
        let query = "qual o prazo";
        assert_eq!(expand_query(query), query);
    }

    #[test]
    fn test_long_query_unchanged() {
        let query = "Quais os requisitos de submissão para empresas nascentes?";
        assert_eq!(expand_query(query), query);
    }

    #[test]
    fn test_present_synonyms_are_not_repeated() {
        // Both "prazo" and "data" already appear; nothing useful to add
        assert_eq!(expand_query("prazo data"), "prazo data");
    }

    #[test]
    fn test_at_most_two_expansions() {
        let expanded = expand_query("valor quando");
        let added = expanded.split_whitespace().count() - 2;
        assert!(added <= 2, "expanded: {expanded}");
        assert!(expanded.starts_with("valor quando"));
    }

    #[test]
    fn test_accented_term() {
        assert_eq!(expand_query("duração"), "duração prazo");
    }

    #[test]
    fn test_unknown_term_unchanged() {
        assert_eq!(expand_query("blockchain"), "blockchain");
    }
}
