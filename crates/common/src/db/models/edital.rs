//! Edital canonical record and the 24-field extraction schema
//!
//! LLM output is dynamically shaped; the schema is modelled as a record of
//! `Option<T>` fields with a field-by-field merge combinator. `link` and
//! `uuid` are system-owned and never taken from model output.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Extraction lifecycle of an edital record
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl ExtractionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionStatus::Pending => "pending",
            ExtractionStatus::InProgress => "in_progress",
            ExtractionStatus::Completed => "completed",
            ExtractionStatus::Failed => "failed",
        }
    }
}

/// The structured schema extracted from an edital, all fields optional.
///
/// Serialized names follow the upstream schema verbatim, including the
/// `R$` and `%` suffixes. Absent values are JSON nulls, never empty strings.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EditalFields {
    #[serde(default)]
    pub apelido_edital: Option<String>,
    #[serde(default)]
    pub financiador_1: Option<String>,
    #[serde(default)]
    pub financiador_2: Option<String>,
    #[serde(default)]
    pub area_foco: Option<String>,
    #[serde(default)]
    pub tipo_proponente: Option<String>,
    #[serde(default)]
    pub empresas_que_podem_submeter: Option<String>,
    #[serde(default)]
    pub duracao_min_meses: Option<i64>,
    #[serde(default)]
    pub duracao_max_meses: Option<i64>,
    #[serde(default, rename = "valor_min_R$")]
    pub valor_min_reais: Option<f64>,
    #[serde(default, rename = "valor_max_R$")]
    pub valor_max_reais: Option<f64>,
    #[serde(default)]
    pub tipo_recurso: Option<String>,
    #[serde(default)]
    pub recepcao_recursos: Option<String>,
    #[serde(default)]
    pub custeio: Option<bool>,
    #[serde(default)]
    pub capital: Option<bool>,
    #[serde(default, rename = "contrapartida_min_%")]
    pub contrapartida_min_pct: Option<f64>,
    #[serde(default, rename = "contrapartida_max_%")]
    pub contrapartida_max_pct: Option<f64>,
    #[serde(default)]
    pub tipo_contrapartida: Option<String>,
    #[serde(default)]
    pub data_inicial_submissao: Option<String>,
    #[serde(default)]
    pub data_final_submissao: Option<String>,
    #[serde(default)]
    pub data_resultado: Option<String>,
    #[serde(default)]
    pub descricao_completa: Option<String>,
    #[serde(default)]
    pub origem: Option<String>,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub observacoes: Option<String>,

    /// System-generated identity, seeded before the first merge
    #[serde(default)]
    pub uuid: Option<String>,
}

fn is_blank(v: &Option<String>) -> bool {
    match v {
        None => true,
        Some(s) => s.trim().is_empty(),
    }
}

fn merge_str(acc: Option<String>, new: &Option<String>) -> Option<String> {
    if is_blank(new) {
        return acc;
    }
    if is_blank(&acc) {
        return new.clone();
    }
    // Both present: keep the longer (more complete) value
    let a = acc.as_deref().unwrap_or("");
    let n = new.as_deref().unwrap_or("");
    if n.len() > a.len() {
        new.clone()
    } else {
        acc
    }
}

fn merge_int(acc: Option<i64>, new: &Option<i64>) -> Option<i64> {
    match (acc, new) {
        (_, None) => acc,
        (None, Some(n)) => Some(*n),
        (Some(0), Some(n)) if *n != 0 => Some(*n),
        (Some(a), _) => Some(a),
    }
}

fn merge_float(acc: Option<f64>, new: &Option<f64>) -> Option<f64> {
    match (acc, new) {
        (_, None) => acc,
        (None, Some(n)) => Some(*n),
        (Some(a), Some(n)) if a == 0.0 && *n != 0.0 => Some(*n),
        (Some(a), _) => Some(a),
    }
}

// false is the zero placeholder: a chunk that saw no evidence extracts
// false, so any chunk extracting true wins, like non-zero numbers do
fn merge_bool(acc: Option<bool>, new: &Option<bool>) -> Option<bool> {
    match (acc, new) {
        (None, _) => *new,
        (Some(false), Some(true)) => Some(true),
        _ => acc,
    }
}

impl EditalFields {
    /// Merge a newly extracted chunk into the accumulator.
    ///
    /// Bias to information: nulls never replace values, longer strings win,
    /// non-zero numbers win over zero. `link` and `uuid` are system-owned
    /// and keep their seeded values.
    pub fn merge(self, new: &EditalFields) -> EditalFields {
        EditalFields {
            apelido_edital: merge_str(self.apelido_edital, &new.apelido_edital),
            financiador_1: merge_str(self.financiador_1, &new.financiador_1),
            financiador_2: merge_str(self.financiador_2, &new.financiador_2),
            area_foco: merge_str(self.area_foco, &new.area_foco),
            tipo_proponente: merge_str(self.tipo_proponente, &new.tipo_proponente),
            empresas_que_podem_submeter: merge_str(
                self.empresas_que_podem_submeter,
                &new.empresas_que_podem_submeter,
            ),
            duracao_min_meses: merge_int(self.duracao_min_meses, &new.duracao_min_meses),
            duracao_max_meses: merge_int(self.duracao_max_meses, &new.duracao_max_meses),
            valor_min_reais: merge_float(self.valor_min_reais, &new.valor_min_reais),
            valor_max_reais: merge_float(self.valor_max_reais, &new.valor_max_reais),
            tipo_recurso: merge_str(self.tipo_recurso, &new.tipo_recurso),
            recepcao_recursos: merge_str(self.recepcao_recursos, &new.recepcao_recursos),
            custeio: merge_bool(self.custeio, &new.custeio),
            capital: merge_bool(self.capital, &new.capital),
            contrapartida_min_pct: merge_float(
                self.contrapartida_min_pct,
                &new.contrapartida_min_pct,
            ),
            contrapartida_max_pct: merge_float(
                self.contrapartida_max_pct,
                &new.contrapartida_max_pct,
            ),
            tipo_contrapartida: merge_str(self.tipo_contrapartida, &new.tipo_contrapartida),
            data_inicial_submissao: merge_str(
                self.data_inicial_submissao,
                &new.data_inicial_submissao,
            ),
            data_final_submissao: merge_str(self.data_final_submissao, &new.data_final_submissao),
            data_resultado: merge_str(self.data_resultado, &new.data_resultado),
            descricao_completa: merge_str(self.descricao_completa, &new.descricao_completa),
            origem: merge_str(self.origem, &new.origem),
            observacoes: merge_str(self.observacoes, &new.observacoes),
            // System-owned: never taken from LLM output
            link: self.link,
            uuid: self.uuid,
        }
    }

    /// Build the schema from a raw JSON value produced by the LLM.
    ///
    /// Tolerant: the literal string "null" becomes null, numbers may arrive
    /// as numeric strings, booleans as "true"/"false". Returns None when the
    /// value is not a JSON object.
    pub fn from_llm_value(value: &Value) -> Option<EditalFields> {
        let obj = value.as_object()?;

        let get_str = |key: &str| -> Option<String> {
            match obj.get(key) {
                Some(Value::String(s)) => {
                    let t = s.trim();
                    if t.is_empty() || t.eq_ignore_ascii_case("null") {
                        None
                    } else {
                        Some(t.to_string())
                    }
                }
                Some(Value::Number(n)) => Some(n.to_string()),
                _ => None,
            }
        };
        let get_int = |key: &str| -> Option<i64> {
            match obj.get(key) {
                Some(Value::Number(n)) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
                Some(Value::String(s)) => s.trim().parse::<i64>().ok(),
                _ => None,
            }
        };
        let get_float = |key: &str| -> Option<f64> {
            match obj.get(key) {
                Some(Value::Number(n)) => n.as_f64(),
                Some(Value::String(s)) => s.trim().replace(',', ".").parse::<f64>().ok(),
                _ => None,
            }
        };
        let get_bool = |key: &str| -> Option<bool> {
            match obj.get(key) {
                Some(Value::Bool(b)) => Some(*b),
                Some(Value::String(s)) => match s.trim().to_lowercase().as_str() {
                    "true" | "sim" => Some(true),
                    "false" | "nao" | "não" => Some(false),
                    _ => None,
                },
                _ => None,
            }
        };

        Some(EditalFields {
            apelido_edital: get_str("apelido_edital"),
            financiador_1: get_str("financiador_1"),
            financiador_2: get_str("financiador_2"),
            area_foco: get_str("area_foco"),
            tipo_proponente: get_str("tipo_proponente"),
            empresas_que_podem_submeter: get_str("empresas_que_podem_submeter"),
            duracao_min_meses: get_int("duracao_min_meses"),
            duracao_max_meses: get_int("duracao_max_meses"),
            valor_min_reais: get_float("valor_min_R$"),
            valor_max_reais: get_float("valor_max_R$"),
            tipo_recurso: get_str("tipo_recurso"),
            recepcao_recursos: get_str("recepcao_recursos"),
            custeio: get_bool("custeio"),
            capital: get_bool("capital"),
            contrapartida_min_pct: get_float("contrapartida_min_%"),
            contrapartida_max_pct: get_float("contrapartida_max_%"),
            tipo_contrapartida: get_str("tipo_contrapartida"),
            data_inicial_submissao: get_str("data_inicial_submissao"),
            data_final_submissao: get_str("data_final_submissao"),
            data_resultado: get_str("data_resultado"),
            descricao_completa: get_str("descricao_completa"),
            origem: get_str("origem"),
            observacoes: get_str("observacoes"),
            link: None,
            uuid: None,
        })
    }
}

/// One per-chunk raw extraction, appended progressively
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExtractionChunk {
    pub chunk_index: u32,
    pub extracted_at: DateTime<Utc>,
    pub variables: EditalFields,
}

/// Placeholder for a chunk whose extraction never produced valid JSON
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FailedChunk {
    pub chunk_index: u32,
    pub erro: String,
    pub raw: String,
    pub timestamp: DateTime<Utc>,
}

/// The durable edital record
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EditalDocument {
    pub uuid: String,
    pub link: String,
    #[serde(default)]
    pub origem: Option<String>,
    /// SHA-256 of the ingested PDF bytes
    #[serde(default)]
    pub content_hash: Option<String>,
    pub extraction_status: ExtractionStatus,
    #[serde(default)]
    pub extraction_chunks: Vec<ExtractionChunk>,
    #[serde(default)]
    pub raw_failed_chunks: Vec<FailedChunk>,
    #[serde(default)]
    pub consolidated_variables: Option<EditalFields>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(apelido: Option<&str>, valor_max: Option<f64>) -> EditalFields {
        EditalFields {
            apelido_edital: apelido.map(String::from),
            valor_max_reais: valor_max,
            ..Default::default()
        }
    }

    #[test]
    fn test_merge_is_idempotent() {
        let a = fields(Some("Chamada CNPq 10/2025"), Some(500_000.0));
        let merged = a.clone().merge(&a);
        assert_eq!(merged, a);
    }

    #[test]
    fn test_merge_biases_to_information() {
        // merge(null, v) = v
        let merged = EditalFields::default().merge(&fields(Some("Edital"), None));
        assert_eq!(merged.apelido_edital.as_deref(), Some("Edital"));

        // merge(v, null) = v
        let merged = fields(Some("Edital"), None).merge(&EditalFields::default());
        assert_eq!(merged.apelido_edital.as_deref(), Some("Edital"));
    }

    #[test]
    fn test_merge_keeps_longer_string() {
        let short = fields(Some("Chamada 10"), None);
        let long = fields(Some("Chamada 10/2025 - Bolsas de Produtividade"), None);

        let merged = short.clone().merge(&long);
        assert_eq!(merged.apelido_edital, long.apelido_edital);

        let merged = long.clone().merge(&short);
        assert_eq!(merged.apelido_edital, long.apelido_edital);
    }

    #[test]
    fn test_merge_bool_true_wins_over_false() {
        let falsy = EditalFields {
            custeio: Some(false),
            capital: Some(false),
            ..Default::default()
        };
        let truthy = EditalFields {
            custeio: Some(true),
            ..Default::default()
        };

        // An early chunk without evidence extracts false; a later chunk
        // that found the clause flips it
        let merged = falsy.clone().merge(&truthy);
        assert_eq!(merged.custeio, Some(true));
        assert_eq!(merged.capital, Some(false));

        // true is never downgraded, and nulls change nothing
        let merged = truthy.clone().merge(&falsy);
        assert_eq!(merged.custeio, Some(true));
        let merged = truthy.merge(&EditalFields::default());
        assert_eq!(merged.custeio, Some(true));
    }

    #[test]
    fn test_merge_replaces_zero_numbers() {
        let zero = fields(None, Some(0.0));
        let value = fields(None, Some(1_200_000.0));
        let merged = zero.merge(&value);
        assert_eq!(merged.valor_max_reais, Some(1_200_000.0));

        let kept = fields(None, Some(300_000.0)).merge(&fields(None, Some(900_000.0)));
        assert_eq!(kept.valor_max_reais, Some(300_000.0));
    }

    #[test]
    fn test_merge_never_overwrites_system_fields() {
        let mut acc = EditalFields::default();
        acc.link = Some("https://cnpq.br/edital.pdf".into());
        acc.uuid = Some("abc-123".into());

        let mut new = EditalFields::default();
        new.link = Some("https://attacker.example/fake.pdf".into());
        new.uuid = Some("zzz-999".into());

        let merged = acc.merge(&new);
        assert_eq!(merged.link.as_deref(), Some("https://cnpq.br/edital.pdf"));
        assert_eq!(merged.uuid.as_deref(), Some("abc-123"));
    }

    #[test]
    fn test_from_llm_value_coerces_null_strings() {
        let value = json!({
            "apelido_edital": "Chamada Universal",
            "financiador_1": "null",
            "duracao_max_meses": "36",
            "valor_max_R$": 500000.5,
            "custeio": "true",
            "contrapartida_min_%": "5,5"
        });

        let fields = EditalFields::from_llm_value(&value).unwrap();
        assert_eq!(fields.apelido_edital.as_deref(), Some("Chamada Universal"));
        assert_eq!(fields.financiador_1, None);
        assert_eq!(fields.duracao_max_meses, Some(36));
        assert_eq!(fields.valor_max_reais, Some(500000.5));
        assert_eq!(fields.custeio, Some(true));
        assert_eq!(fields.contrapartida_min_pct, Some(5.5));
    }

    #[test]
    fn test_from_llm_value_rejects_non_objects() {
        assert!(EditalFields::from_llm_value(&json!("texto solto")).is_none());
        assert!(EditalFields::from_llm_value(&json!([1, 2, 3])).is_none());
    }

    #[test]
    fn test_schema_serde_names() {
        let mut fields = EditalFields::default();
        fields.valor_min_reais = Some(10_000.0);
        fields.contrapartida_max_pct = Some(20.0);

        let value = serde_json::to_value(&fields).unwrap();
        assert_eq!(value["valor_min_R$"], json!(10_000.0));
        assert_eq!(value["contrapartida_max_%"], json!(20.0));
        // Absent values serialize as null, never as empty strings
        assert_eq!(value["financiador_1"], Value::Null);
    }
}
