// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// EXTRAÇÃO DE JSON DA SAÍDA DE LLMs
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use serde_json::Value;

/// Localiza e parseia JSON na saída de um LLM.
///
/// Estratégia em três camadas, na ordem:
/// 1. Bloco cercado ```json … ```
/// 2. Primeiro objeto `{…}` balanceado que parseia
/// 3. O texto inteiro
///
/// Idempotente sobre JSON válido: `extract_json` da serialização de um
/// objeto devolve o mesmo objeto.
pub fn extract_json(text: &str) -> Option<Value> {
    if let Some(value) = from_fenced_block(text) {
        return Some(value);
    }
    if let Some(value) = from_balanced_object(text) {
        return Some(value);
    }
    serde_json::from_str(text.trim()).ok()
}

/// Camada 1: bloco cercado ```json … ``` (ou ``` … ``` genérico).
fn from_fenced_block(text: &str) -> Option<Value> {
    for fence in ["```json", "```"] {
        let mut rest = text;
        while let Some(start) = rest.find(fence) {
            let body = &rest[start + fence.len()..];
            if let Some(end) = body.find("```") {
                if let Ok(value) = serde_json::from_str::<Value>(body[..end].trim()) {
                    return Some(value);
                }
                rest = &body[end + 3..];
            } else {
                break;
            }
        }
    }
    None
}

/// Camada 2: varre o texto por objetos `{…}` balanceados e devolve o
/// primeiro que parseia. Chaves dentro de strings JSON são ignoradas.
fn from_balanced_object(text: &str) -> Option<Value> {
    let bytes = text.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] != b'{' {
            i += 1;
            continue;
        }

        let mut depth = 0usize;
        let mut in_string = false;
        let mut escaped = false;
        let mut end = None;

        for (offset, &b) in bytes[i..].iter().enumerate() {
            if escaped {
                escaped = false;
                continue;
            }
            match b {
                b'\\' if in_string => escaped = true,
                b'"' => in_string = !in_string,
                b'{' if !in_string => depth += 1,
                b'}' if !in_string => {
                    depth -= 1;
                    if depth == 0 {
                        end = Some(i + offset + 1);
                        break;
                    }
                }
                _ => {}
            }
        }

        match end {
            Some(end) => {
                if let Ok(value) = serde_json::from_str::<Value>(&text[i..end]) {
                    return Some(value);
                }
                // Candidato malformado: segue procurando a partir da
                // próxima chave de abertura
                i += 1;
            }
            None => break,
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_plain_json() {
        let value = extract_json(r#"{"queries": [{"query": "a", "researchGoal": "b"}]}"#);
        assert_eq!(
            value,
            Some(json!({"queries": [{"query": "a", "researchGoal": "b"}]}))
        );
    }

    #[test]
    fn test_extract_fenced_block() {
        let text = "Here is the plan:\n```json\n{\"queries\": []}\n```\nDone.";
        assert_eq!(extract_json(text), Some(json!({"queries": []})));
    }

    #[test]
    fn test_extract_generic_fence() {
        let text = "```\n{\"learnings\": [\"x\"]}\n```";
        assert_eq!(extract_json(text), Some(json!({"learnings": ["x"]})));
    }

    #[test]
    fn test_extract_embedded_object() {
        let text = "Sure! The result is {\"a\": {\"b\": 1}} as requested.";
        assert_eq!(extract_json(text), Some(json!({"a": {"b": 1}})));
    }

    #[test]
    fn test_braces_inside_strings() {
        let text = r#"prefix {"note": "curly } inside", "n": 2} suffix"#;
        assert_eq!(
            extract_json(text),
            Some(json!({"note": "curly } inside", "n": 2}))
        );
    }

    #[test]
    fn test_skips_malformed_candidate() {
        let text = r#"{broken} then {"ok": true}"#;
        assert_eq!(extract_json(text), Some(json!({"ok": true})));
    }

    #[test]
    fn test_no_json_returns_none() {
        assert_eq!(extract_json("no structured output here"), None);
        assert_eq!(extract_json(""), None);
    }

    #[test]
    fn test_roundtrip_idempotence() {
        let original = json!({"queries": [{"query": "q1", "researchGoal": "g1"}], "n": 3});
        let serialized = serde_json::to_string(&original).unwrap();
        assert_eq!(extract_json(&serialized), Some(original));
    }
}
