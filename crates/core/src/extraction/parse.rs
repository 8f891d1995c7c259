use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;

use super::ExtractionError;
use crate::domain::request::{ActionType, DeliveryHints, ExtractedRequest, LineItem};

/// Outermost `{...}` span of a model reply, ignoring any prose or code fences around it.
pub fn locate_json_object(output: &str) -> Option<&str> {
    let start = output.find('{')?;
    let end = output.rfind('}')?;
    (end > start).then_some(&output[start..=end])
}

/// Parses a raw extraction reply into an [`ExtractedRequest`] carrying `raw_text`.
pub fn parse_extraction(raw_text: &str, output: &str) -> Result<ExtractedRequest, ExtractionError> {
    let span = locate_json_object(output).ok_or_else(|| {
        ExtractionError::Format(format!("no JSON object in reply: {}", preview(output)))
    })?;
    let wire: WireRequest = serde_json::from_str(span)
        .map_err(|error| ExtractionError::Format(format!("reply is not valid JSON: {error}")))?;

    let line_items = wire
        .line_items
        .into_iter()
        .map(|line| {
            Ok(LineItem {
                reference_guess: non_blank(line.reference),
                description_guess: non_blank(line.description),
                quantity: parse_quantity(line.quantity.as_ref())?,
                unit: non_blank(line.unit),
                search_required: false,
            })
        })
        .collect::<Result<Vec<_>, ExtractionError>>()?;

    let delivery = wire.delivery.unwrap_or_default();

    Ok(ExtractedRequest {
        raw_text: raw_text.to_string(),
        detected_action_type: wire
            .action_type
            .as_deref()
            .map(ActionType::parse_lenient)
            .unwrap_or(ActionType::Other),
        customer_name_guess: non_blank(wire.customer_name),
        customer_email_guess: non_blank(wire.customer_email),
        line_items,
        delivery: DeliveryHints {
            address: non_blank(delivery.address),
            requested_date: non_blank(delivery.requested_date),
            notes: non_blank(delivery.notes),
        },
        confidence: clamp_confidence(wire.confidence.as_ref()),
    })
}

fn parse_quantity(value: Option<&Value>) -> Result<Decimal, ExtractionError> {
    let quantity = match value {
        None | Some(Value::Null) => return Ok(Decimal::ONE),
        Some(Value::Number(number)) => number.to_string().parse::<Decimal>().ok(),
        Some(Value::String(text)) => {
            let cleaned: String =
                text.trim().replace(',', ".").chars().filter(|c| !c.is_whitespace()).collect();
            if cleaned.is_empty() {
                return Ok(Decimal::ONE);
            }
            cleaned.parse::<Decimal>().ok()
        }
        Some(_) => None,
    };

    match quantity {
        Some(quantity) if quantity > Decimal::ZERO => Ok(quantity.normalize()),
        Some(_) => Err(ExtractionError::Format("line quantity must be positive".to_string())),
        None => Err(ExtractionError::Format(format!(
            "unreadable line quantity `{}`",
            value.map(Value::to_string).unwrap_or_default()
        ))),
    }
}

fn clamp_confidence(value: Option<&Value>) -> u8 {
    let raw = match value {
        Some(Value::Number(number)) => number.as_f64().unwrap_or(0.0),
        Some(Value::String(text)) => text.trim().trim_end_matches('%').parse::<f64>().unwrap_or(0.0),
        _ => 0.0,
    };
    // Some models answer on a 0..1 scale.
    let scaled = if raw > 0.0 && raw <= 1.0 { raw * 100.0 } else { raw };
    scaled.round().clamp(0.0, 100.0) as u8
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|text| text.trim().to_string()).filter(|text| !text.is_empty())
}

fn preview(output: &str) -> String {
    let trimmed = output.trim();
    match trimmed.char_indices().nth(120) {
        Some((cut, _)) => format!("{}...", &trimmed[..cut]),
        None => trimmed.to_string(),
    }
}

#[derive(Debug, Deserialize)]
struct WireRequest {
    #[serde(default, alias = "action", alias = "detected_action_type")]
    action_type: Option<String>,
    #[serde(default, alias = "customer", alias = "customer_name_guess")]
    customer_name: Option<String>,
    #[serde(default, alias = "email", alias = "customer_email_guess")]
    customer_email: Option<String>,
    #[serde(default, alias = "lines", alias = "items")]
    line_items: Vec<WireLine>,
    #[serde(default)]
    delivery: Option<WireDelivery>,
    #[serde(default)]
    confidence: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct WireLine {
    #[serde(default, alias = "reference_guess", alias = "ref")]
    reference: Option<String>,
    #[serde(default, alias = "description_guess")]
    description: Option<String>,
    #[serde(default)]
    quantity: Option<Value>,
    #[serde(default)]
    unit: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct WireDelivery {
    #[serde(default)]
    address: Option<String>,
    #[serde(default)]
    requested_date: Option<String>,
    #[serde(default)]
    notes: Option<String>,
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{locate_json_object, parse_extraction};
    use crate::domain::request::ActionType;
    use crate::extraction::ExtractionError;

    const REPLY: &str = r#"Voici le resultat :
```json
{"action_type": "QUOTE", "customer_name": "Edge Communications",
 "line_items": [{"reference": "A00002", "quantity": 500}], "confidence": 92}
```
Bonne journee."#;

    #[test]
    fn prose_and_fences_around_json_are_tolerated() {
        let request = match parse_extraction("raw mail", REPLY) {
            Ok(request) => request,
            Err(error) => panic!("expected a parsed request, got {error}"),
        };

        assert_eq!(request.raw_text, "raw mail");
        assert_eq!(request.detected_action_type, ActionType::Quote);
        assert_eq!(request.customer_name_guess.as_deref(), Some("Edge Communications"));
        assert_eq!(request.line_items.len(), 1);
        assert_eq!(request.line_items[0].reference_guess.as_deref(), Some("A00002"));
        assert_eq!(request.line_items[0].quantity, Decimal::from(500));
        assert_eq!(request.confidence, 92);
    }

    #[test]
    fn missing_braces_is_a_format_error() {
        let error = parse_extraction("raw", "I could not find any products.");
        assert!(matches!(error, Err(ExtractionError::Format(_))));
        assert!(locate_json_object("} reversed {").is_none());
    }

    #[test]
    fn invalid_json_inside_braces_is_a_format_error() {
        let error = parse_extraction("raw", "{ action_type: QUOTE, }");
        assert!(matches!(error, Err(ExtractionError::Format(ref message)) if message.contains("JSON")));
    }

    #[test]
    fn lenient_fields_default_sensibly() {
        let reply = r#"{"action_type":"something else","line_items":[
            {"reference":"  ","description":"roulement 6204","quantity":"2,5"},
            {"reference":"B100"}
        ],"confidence":1.4}"#;
        let request = match parse_extraction("raw", reply) {
            Ok(request) => request,
            Err(error) => panic!("expected a parsed request, got {error}"),
        };

        assert_eq!(request.detected_action_type, ActionType::Other);
        assert_eq!(request.line_items[0].reference_guess, None);
        assert_eq!(request.line_items[0].quantity, Decimal::new(25, 1));
        assert_eq!(request.line_items[1].quantity, Decimal::ONE);
        assert_eq!(request.confidence, 1);
        assert!(request.customer_name_guess.is_none());
    }

    #[test]
    fn unit_scale_confidence_is_lifted_to_percent() {
        let request = parse_extraction("raw", r#"{"confidence": 0.85}"#);
        assert_eq!(request.map(|request| request.confidence), Ok(85));
    }

    #[test]
    fn negative_quantity_is_rejected() {
        let reply = r#"{"line_items":[{"reference":"A1","quantity":-3}]}"#;
        assert!(matches!(parse_extraction("raw", reply), Err(ExtractionError::Format(_))));
    }
}
