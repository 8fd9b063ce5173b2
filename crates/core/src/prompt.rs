//! Prompt rendering for per-chunk criteria extraction.

use crate::criteria::CriteriaSchema;
use crate::error::ExtractError;
use crate::models::NOT_FOUND_SENTINEL;

const ANALYST_INSTRUCTIONS: &str = "You are an expert tender document analyst. Given the following text chunk from a tender document, extract all information relevant to the following criteria, grouping your findings under each heading.";

const OUTPUT_FORMAT_REMINDER: &str = "Respond in JSON format matching the criteria structure: the same keys and nesting, with each innermost heading holding the extracted text instead of the keyword list. Return only the JSON object, no explanations.";

/// Renders the extraction request for one chunk.
///
/// The chunk is embedded verbatim between `"""` delimiters; nothing is escaped.
pub fn build_prompt(chunk: &str, criteria: &CriteriaSchema) -> Result<String, ExtractError> {
    let criteria_json = criteria.to_pretty_json()?;

    let mut prompt = String::with_capacity(criteria_json.len() + chunk.len() + 768);
    prompt.push_str(ANALYST_INSTRUCTIONS);
    prompt.push_str(&format!(
        " If nothing is found for a heading, write \"{NOT_FOUND_SENTINEL}\".\n\n"
    ));

    prompt.push_str("Criteria (JSON structure):\n");
    prompt.push_str(&criteria_json);
    prompt.push_str("\n\n");

    prompt.push_str("Text chunk:\n\"\"\"\n");
    prompt.push_str(chunk);
    prompt.push_str("\n\"\"\"\n\n");

    prompt.push_str(OUTPUT_FORMAT_REMINDER);
    prompt.push('\n');

    Ok(prompt)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_embeds_chunk_verbatim() {
        let chunk = "EMD is 2% of bid value.\n\n\"Quoted\" {braces} kept";
        let prompt = build_prompt(chunk, &CriteriaSchema::tender_default()).expect("prompt");
        assert!(prompt.contains(&format!("\"\"\"\n{chunk}\n\"\"\"")));
    }

    #[test]
    fn prompt_includes_schema_and_rules() {
        let criteria = CriteriaSchema::tender_default();
        let prompt = build_prompt("text", &criteria).expect("prompt");

        assert!(prompt.contains("Criteria (JSON structure):"));
        assert!(prompt.contains(&criteria.to_pretty_json().expect("schema json")));
        assert!(prompt.contains("write \"Not found\""));
        assert!(prompt.contains("Respond in JSON format"));
    }

    #[test]
    fn prompt_is_deterministic() {
        let criteria = CriteriaSchema::tender_default();
        assert_eq!(
            build_prompt("same chunk", &criteria).expect("prompt"),
            build_prompt("same chunk", &criteria).expect("prompt")
        );
    }
}
