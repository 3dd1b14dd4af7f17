//! Prompt templates.
//!
//! Every prompt is a pure function of the user message and slot state, so
//! the same inputs always produce the same text.

use std::fmt::Write;

use crate::slots::{SlotField, SlotState, SlotValue};
use crate::types::{PredictionResult, StructuredData};

/// Prompt asking the model to pull slot values out of `message`.
pub fn extraction_prompt(message: &str, state: &SlotState) -> String {
    format!(
        r#"You are a data extraction assistant for an insurance quote. Extract the following fields from the user's message:

age: number
sex: male/female
smoker: yes/no
children: number
region: string (city or region of residence)
height: number (centimeters)
weight: number (kilograms)

Rules:
1. Output a single JSON object only, with no text before or after it.
2. Fill in a field only when the user states it explicitly.
3. Use null for every field the user does not mention.
4. Do not add fields that are not listed above.
5. Do not ask the user any questions.

User message: "{message}"
Known data: {known}
"#,
        message = message,
        known = known_json(state),
    )
}

/// Prompt asking the model to request the facts that are still missing.
pub fn follow_up_prompt(message: &str, state: &SlotState) -> String {
    let missing = state.fields_to_ask();
    let missing_text = if missing.is_empty() {
        "All the information has been collected.".to_string()
    } else {
        let labels: Vec<&str> = missing.iter().map(|f| f.label()).collect();
        format!("You are still missing: {}.", labels.join(", "))
    };

    format!(
        r#"You are a friendly, professional insurance planning assistant.

The user has provided the following data so far:
{known}

Requirements:
1. Reply in a natural, warm, conversational tone.
2. Base your questions on the missing information. {missing_text}
3. Reply with one continuous paragraph of plain text.
4. Do not use Markdown, bullet points or numbered lists.
5. Do not repeat information that is already known.

User message: "{message}"
"#,
        known = known_json_pretty(state),
        missing_text = missing_text,
        message = message,
    )
}

/// Prompt asking the model to present the estimate and recommended products.
pub fn finalization_prompt(message: &str, state: &SlotState, data: &StructuredData) -> String {
    let price_text = match data.predicted_price {
        PredictionResult::Charge(charge) => {
            format!("The estimated annual premium is about {:.0}.", charge)
        }
        PredictionResult::Unavailable => {
            "The price estimate is currently unavailable. Apologize and say a quote can be provided later."
                .to_string()
        }
    };

    let mut products = String::new();
    if data.recommendations.is_empty() {
        products.push_str("No product recommendations are available right now.\n");
    } else {
        for (i, item) in data.recommendations.iter().enumerate() {
            let _ = writeln!(products, "{}. {}: {} ({})", i + 1, item.title, item.summary, item.url);
        }
    }

    format!(
        r#"You are a professional and friendly insurance consultant.

Customer profile: {summary}

Output requirements:
1. Professional, warm and conversational.
2. Output only one continuous reply addressed to the customer.
3. No separators, headings, bullet points, self-reflection or restating these instructions.

Content requirements:
1. Thank the customer for the information and say the analysis is complete.
2. {price_text}
3. Remind the customer that this is a model estimate with no legal effect; the actual premium depends on underwriting and the product terms.
4. Point the customer to the recommended products listed below.

Recommended products:
{products}
User message: "{message}"
"#,
        summary = query_summary(state),
        price_text = price_text,
        products = products,
        message = message,
    )
}

/// One-line customer summary sent to the recommendation engine.
pub fn query_summary(state: &SlotState) -> String {
    let value = |field: SlotField| {
        state
            .get(field)
            .map(SlotValue::to_string)
            .unwrap_or_default()
    };

    let mut summary = format!(
        "Customer age {}, sex {}, BMI {}, lives in {}",
        value(SlotField::Age),
        value(SlotField::Sex),
        value(SlotField::Bmi),
        value(SlotField::Region),
    );
    if state.get(SlotField::Smoker).and_then(SlotValue::as_str) == Some("yes") {
        summary.push_str(", has a smoking habit");
    }
    summary
}

fn known_json(state: &SlotState) -> String {
    serde_json::to_string(state).unwrap_or_else(|_| "{}".to_string())
}

fn known_json_pretty(state: &SlotState) -> String {
    serde_json::to_string_pretty(state).unwrap_or_else(|_| "{}".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slots::ExtractionDelta;
    use crate::types::RecommendationItem;
    use serde_json::json;

    fn state_from(value: serde_json::Value) -> SlotState {
        let mut state = SlotState::new();
        state.apply(&ExtractionDelta::from_object(value.as_object().unwrap()));
        let _ = state.derive_bmi();
        state
    }

    fn full_state(smoker: &str) -> SlotState {
        state_from(json!({
            "age": 35, "sex": "male", "smoker": smoker, "children": 2,
            "region": "Taipei", "height": 175, "weight": 70
        }))
    }

    // ---- query_summary ----

    #[test]
    fn test_summary_non_smoker() {
        assert_eq!(
            query_summary(&full_state("no")),
            "Customer age 35, sex male, BMI 22.86, lives in Taipei"
        );
    }

    #[test]
    fn test_summary_smoker_suffix() {
        assert_eq!(
            query_summary(&full_state("yes")),
            "Customer age 35, sex male, BMI 22.86, lives in Taipei, has a smoking habit"
        );
    }

    #[test]
    fn test_summary_is_deterministic() {
        let state = full_state("no");
        assert_eq!(query_summary(&state), query_summary(&state.clone()));
    }

    // ---- extraction_prompt ----

    #[test]
    fn test_extraction_prompt_embeds_message_and_known_values() {
        let state = state_from(json!({"age": 41}));
        let prompt = extraction_prompt("I live in Tainan", &state);
        assert!(prompt.contains("User message: \"I live in Tainan\""));
        assert!(prompt.contains("\"age\":41"));
        assert!(prompt.contains("\"region\":null"));
        assert!(prompt.contains("height: number (centimeters)"));
        assert!(!prompt.contains("bmi:"));
    }

    // ---- follow_up_prompt ----

    #[test]
    fn test_follow_up_lists_missing_labels() {
        let state = state_from(json!({"age": 35, "sex": "female", "height": 160}));
        let prompt = follow_up_prompt("hi", &state);
        assert!(prompt.contains(
            "You are still missing: smoking status, number of children, city or region of residence, weight in kilograms."
        ));
        assert!(!prompt.contains("body mass index"));
    }

    #[test]
    fn test_follow_up_when_only_bmi_inputs_missing() {
        let state = state_from(json!({
            "age": 35, "sex": "male", "smoker": "no", "children": 0, "region": "Taipei"
        }));
        let prompt = follow_up_prompt("hi", &state);
        assert!(prompt.contains("You are still missing: height in centimeters, weight in kilograms."));
    }

    // ---- finalization_prompt ----

    #[test]
    fn test_finalization_embeds_price_and_products() {
        let data = StructuredData {
            predicted_price: PredictionResult::Charge(18234.7),
            recommendations: vec![RecommendationItem {
                id: "1".to_string(),
                title: "Care Plus".to_string(),
                url: "https://example.test/care".to_string(),
                summary: "Hospital cover".to_string(),
                score: 0.9,
            }],
        };
        let prompt = finalization_prompt("thanks", &full_state("no"), &data);
        assert!(prompt.contains("about 18235"));
        assert!(prompt.contains("1. Care Plus: Hospital cover (https://example.test/care)"));
        assert!(prompt.contains("Customer age 35"));
    }

    #[test]
    fn test_finalization_handles_degraded_outcome() {
        let data = StructuredData {
            predicted_price: PredictionResult::Unavailable,
            recommendations: vec![],
        };
        let prompt = finalization_prompt("thanks", &full_state("no"), &data);
        assert!(prompt.contains("currently unavailable"));
        assert!(prompt.contains("No product recommendations are available"));
    }
}
