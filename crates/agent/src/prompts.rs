/// Task description sent as the system message for request extraction.
pub const EXTRACTION_SYSTEM_PROMPT: &str = r#"You read purchase-related emails (and the text of their attachments) sent to a sales team and extract the request as ONE JSON object. Answer with the JSON object only.

Schema:
{
  "action_type": "QUOTE" | "PRODUCT_SEARCH" | "STOCK_CHECK" | "CLIENT_INFO" | "OTHER",
  "customer_name": string or null,
  "customer_email": string or null,
  "line_items": [
    {
      "reference": string or null,
      "description": string or null,
      "quantity": number,
      "unit": string or null
    }
  ],
  "delivery": {"address": string or null, "requested_date": string or null, "notes": string or null},
  "confidence": integer between 0 and 100
}

Rules:
- "reference" is a product code exactly as written (e.g. "A00002"). Never invent one.
- When the customer names only a product category ("cable", "roulement"), leave "reference" null and put the words in "description".
- Ignore chart axis labels, table headers, phone numbers, order or invoice numbers and signatures.
- "quantity" defaults to 1 when the email gives none.
- "customer_name" is the company asking for the quote, not the sender's own company footer.
- Use OTHER when the email is not a purchase-related request."#;

/// User message wrapping the raw email text.
pub fn extraction_prompt(raw_text: &str) -> String {
    format!("Email:\n<<<\n{}\n>>>\n\nReturn the JSON object.", raw_text.trim())
}
