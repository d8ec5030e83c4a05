//! Context assembly for grounded generation
//!
//! Retrieved chunks become a numbered document list the model is told to
//! read in order. Distances ride along so the prompt can steer the model
//! toward the strongest matches (smaller or negative = more similar).

use fomentos_common::vector::ScoredChunk;

/// Marker appended when the context is cut at the length cap
pub const TRUNCATION_MARKER: &str = "\n\n[...contexto truncado por limite de tokens...]";

fn relevance_label(distance: f32) -> &'static str {
    if distance < 0.3 {
        "ALTÍSSIMA RELEVÂNCIA"
    } else if distance < 0.7 {
        "MUITO RELEVANTE"
    } else if distance < 1.2 {
        "RELEVANTE"
    } else {
        "POSSIVELMENTE RELEVANTE"
    }
}

/// Build the numbered-document context, capped at `max_length` characters
pub fn build_context(chunks: &[ScoredChunk], max_length: usize) -> String {
    if chunks.is_empty() {
        return "Nenhum documento relevante encontrado na base de conhecimento.".to_string();
    }

    let mut parts = vec!["DOCUMENTOS RELEVANTES (ordenados por relevância):\n".to_string()];

    for (i, chunk) in chunks.iter().enumerate() {
        let edital_name = chunk
            .metadata
            .get("edital_name")
            .and_then(|v| v.as_str())
            .unwrap_or("Edital");
        let chunk_index = chunk
            .metadata
            .get("chunk_index")
            .and_then(|v| v.as_u64())
            .map(|v| v.to_string())
            .unwrap_or_else(|| "?".to_string());
        let total_chunks = chunk
            .metadata
            .get("total_chunks")
            .and_then(|v| v.as_u64())
            .map(|v| v.to_string())
            .unwrap_or_else(|| "?".to_string());

        // Collapse whitespace; the full chunk text stays in
        let text = chunk.text.split_whitespace().collect::<Vec<_>>().join(" ");

        parts.push(format!("\n{}", "=".repeat(70)));
        parts.push(format!(
            "DOCUMENTO {} - {}",
            i + 1,
            relevance_label(chunk.distance)
        ));
        parts.push("=".repeat(70));
        parts.push(format!("Edital: {}", edital_name));
        parts.push(format!("Trecho: Parte {} de {}", chunk_index, total_chunks));
        parts.push(format!(
            "Score de Similaridade: {:.4} (quanto MENOR, mais relevante)",
            chunk.distance
        ));
        parts.push("\nCONTEÚDO COMPLETO DO TRECHO:".to_string());
        parts.push(text);
        parts.push(format!("--- FIM DO DOCUMENTO {} ---\n", i + 1));
    }

    let context = parts.join("\n");

    if context.chars().count() > max_length {
        let cut: String = context.chars().take(max_length).collect();
        format!("{}{}", cut, TRUNCATION_MARKER)
    } else {
        context
    }
}

/// System prompt for grounded generation
pub fn system_prompt(context: &str) -> String {
    format!(
        r#"Você é um assistente especializado em editais de fomento à pesquisa e inovação no Brasil.
Sua função é ajudar pesquisadores e empresas a entenderem editais de agências como CNPq, FAPESQ, FINEP, CONFAP, CAPES, FACEPE, etc.

INSTRUÇÕES CRÍTICAS - LEIA ANTES DE RESPONDER:

1. LEIA TODOS OS DOCUMENTOS ABAIXO, do primeiro ao último, completamente.
2. ATENÇÃO AOS SCORES: documentos com score MENOR ou NEGATIVO são os MAIS relevantes.
   - Score negativo ou próximo de zero = altíssima relevância
   - Score > 1.0 = menor relevância
3. Se encontrar a informação, cite EXATAMENTE como aparece no documento e indique o número do documento.
4. CRONOGRAMAS/DATAS: procure por seções com "CRONOGRAMA", "Etapas", "Data", tabelas.
5. VALORES: procure por "R$", "reais", "valor", tabelas de financiamento.
6. PRAZOS: procure por "submissão", "inscrição", "até", períodos (XX/XX/XXXX a XX/XX/XXXX).

IMPORTANTE:
- NÃO ignore documentos com score negativo - esses são os melhores.
- SEMPRE cite o documento que contém a informação.
- Responda APENAS com base nos documentos fornecidos; se a informação não estiver presente, diga claramente.

DOCUMENTOS FORNECIDOS (ORDENADOS POR RELEVÂNCIA):
{context}"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map};

    fn chunk(distance: f32, text: &str) -> ScoredChunk {
        let mut metadata = Map::new();
        metadata.insert("edital_name".into(), json!("Edital Universal 2025"));
        metadata.insert("chunk_index".into(), json!(3));
        metadata.insert("total_chunks".into(), json!(7));
        ScoredChunk {
            id: "abc_chunk_3".into(),
            text: text.into(),
            metadata,
            distance,
        }
    }

    #[test]
    fn test_empty_chunks_message() {
        let context = build_context(&[], 4000);
        assert!(context.contains("Nenhum documento relevante"));
    }

    #[test]
    fn test_numbered_documents_with_positions() {
        let chunks = vec![
            chunk(-0.05, "prazo de submissão até 30/12/2025"),
            chunk(0.9, "valor máximo de R$ 500.000,00"),
        ];
        let context = build_context(&chunks, 4000);

        assert!(context.contains("DOCUMENTO 1 - ALTÍSSIMA RELEVÂNCIA"));
        assert!(context.contains("DOCUMENTO 2 - RELEVANTE"));
        assert!(context.contains("Edital: Edital Universal 2025"));
        assert!(context.contains("Trecho: Parte 3 de 7"));
        assert!(context.contains("prazo de submissão até 30/12/2025"));
    }

    #[test]
    fn test_negative_distance_is_top_tier() {
        assert_eq!(relevance_label(-0.4), "ALTÍSSIMA RELEVÂNCIA");
        assert_eq!(relevance_label(0.5), "MUITO RELEVANTE");
        assert_eq!(relevance_label(1.0), "RELEVANTE");
        assert_eq!(relevance_label(1.4), "POSSIVELMENTE RELEVANTE");
    }

    #[test]
    fn test_truncation_adds_marker() {
        let chunks = vec![chunk(0.2, &"texto longo ".repeat(600))];
        let context = build_context(&chunks, 500);

        assert!(context.ends_with(TRUNCATION_MARKER));
        assert!(context.chars().count() <= 500 + TRUNCATION_MARKER.chars().count());
    }

    #[test]
    fn test_whitespace_is_collapsed() {
        let chunks = vec![chunk(0.2, "linha um\n\n\n   linha    dois")];
        let context = build_context(&chunks, 4000);
        assert!(context.contains("linha um linha dois"));
    }
}
