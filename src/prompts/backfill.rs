//! Prompts for completing unresolved SDS fields.

use crate::schema::FieldKey;

/// System prompt carrying the output style contract
pub const SYSTEM_PROMPT: &str = r#"You are a chemical safety specialist completing fields of a Safety Data Sheet (SDS) that follows the GHS 16-section format.

Rules you MUST follow:
- Answer ONLY the numbered fields you are asked for, one answer per line, in the same order.
- Start every line with the field number followed by a period, e.g. "1. Use water spray, dry chemical or alcohol-resistant foam."
- Write the value only: no field labels, no markdown, no bullets, no quotes, no brackets.
- Keep each value to one or two sentences.
- Temperatures in degrees Celsius written as "120 °C"; pressures as "5.9 kPa" or "44 mmHg".
- Doses as "mg/kg", airborne concentrations as "mg/m³" or "ppm".
- If a value cannot be determined with reasonable confidence, answer exactly "Not available".
- Do NOT invent regulatory identifiers (UN numbers, CAS numbers, EC numbers) you are not sure about."#;

/// User prompt template for one batch of fields
/// Placeholders: {compound_name}, {smiles}, {known_properties}, {field_count}, {field_list}
pub const USER_PROMPT_TEMPLATE: &str = r#"Compound: {compound_name}
SMILES: {smiles}

Known properties:
{known_properties}

Provide values for the following {field_count} SDS fields:
{field_list}

Answer with exactly {field_count} numbered lines."#;

/// Numbered field list, e.g. `1. Flash Point (Physical and Chemical Properties)`.
pub fn format_field_list(fields: &[FieldKey]) -> String {
    fields
        .iter()
        .enumerate()
        .map(|(i, key)| format!("{}. {} ({})", i + 1, key.field, key.section.title()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Build user prompt for a batch
pub fn build_user_prompt(
    compound_name: &str,
    smiles: &str,
    known_properties: &str,
    fields: &[FieldKey],
) -> String {
    USER_PROMPT_TEMPLATE
        .replace("{compound_name}", compound_name)
        .replace("{smiles}", smiles)
        .replace("{known_properties}", known_properties)
        .replace("{field_count}", &fields.len().to_string())
        .replace("{field_list}", &format_field_list(fields))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SectionKey;

    #[test]
    fn test_build_user_prompt() {
        let fields: Vec<FieldKey> = [
            (SectionKey::PhysicalProperties, "Flash Point"),
            (SectionKey::FirstAid, "Inhalation"),
        ]
        .into_iter()
        .filter_map(|(s, f)| FieldKey::resolve(s, f))
        .collect();
        let prompt = build_user_prompt("Ethanol", "CCO", "- Molecular weight: 46.07 g/mol", &fields);
        assert!(prompt.contains("Compound: Ethanol"));
        assert!(prompt.contains("SMILES: CCO"));
        assert!(prompt.contains("following 2 SDS fields"));
        assert!(prompt.contains("1. Flash Point (Physical and Chemical Properties)"));
        assert!(prompt.contains("2. Inhalation (First Aid Measures)"));
        assert!(!prompt.contains('{'));
    }

    #[test]
    fn test_system_prompt_style_contract() {
        assert!(SYSTEM_PROMPT.contains("Not available"));
        assert!(SYSTEM_PROMPT.contains("no markdown"));
    }
}
