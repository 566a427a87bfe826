//! Request parameter encoding and response parsing for the XML API.

use chrono::NaiveDate;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use rust_decimal::Decimal;

use crate::destination::{DestinationError, DestinationId, Result};

/// One `<record>` of a response: its `<field>` elements in document order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    fields: Vec<(String, String)>,
}

impl Record {
    /// Value of the field whose `name` (or `id`) attribute matches, ignoring case.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Value of the first field. Save procedures return the new record id
    /// this way, sometimes with an empty field name.
    pub fn first_value(&self) -> Option<&str> {
        self.fields.first().map(|(_, v)| v.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// A procedure parameter value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Param {
    Null,
    Text(String),
    Int(i64),
    Money(Decimal),
    Date(NaiveDate),
}

impl Param {
    /// `None` becomes `null`, anything else quoted text.
    pub fn opt_text(value: Option<&str>) -> Self {
        value.map_or(Self::Null, |v| Self::Text(v.to_string()))
    }

    pub fn opt_int(value: Option<i64>) -> Self {
        value.map_or(Self::Null, Self::Int)
    }

    fn render(&self) -> String {
        match self {
            Self::Null => "null".to_string(),
            Self::Text(text) => quote(text),
            Self::Int(n) => n.to_string(),
            Self::Money(amount) => format_amount(*amount),
            Self::Date(date) => quote(&date.format("%m/%d/%Y").to_string()),
        }
    }
}

impl From<&str> for Param {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Param {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// Single-quote a string, doubling embedded quotes.
pub fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Render an amount with exactly two decimals, rounding half away from zero.
pub fn format_amount(amount: Decimal) -> String {
    let rounded =
        amount.round_dp_with_strategy(2, rust_decimal::RoundingStrategy::MidpointAwayFromZero);
    format!("{rounded:.2}")
}

/// Render `@name=value` pairs for a procedure call.
pub fn render_params(params: &[(&str, Param)]) -> String {
    params
        .iter()
        .map(|(name, value)| format!("@{name}={}", value.render()))
        .collect::<Vec<_>>()
        .join(",")
}

fn attribute(event: &BytesStart<'_>, name: &[u8]) -> Option<String> {
    event
        .attributes()
        .flatten()
        .find(|a| a.key.as_ref().eq_ignore_ascii_case(name))
        .and_then(|a| a.unescape_value().ok())
        .map(|v| v.into_owned())
}

fn push_field(record: &mut Record, event: &BytesStart<'_>) {
    let name = attribute(event, b"name")
        .filter(|n| !n.is_empty())
        .or_else(|| attribute(event, b"id"))
        .unwrap_or_default();
    let value = attribute(event, b"value").unwrap_or_default();
    record.fields.push((name, value));
}

fn classify_error(message: String) -> DestinationError {
    let lower = message.to_ascii_lowercase();
    if lower.contains("api key") || lower.contains("apikey") || lower.contains("unauthorized") {
        DestinationError::auth(message)
    } else {
        DestinationError::api(message)
    }
}

/// Parse a response body into its records.
///
/// # Errors
/// An `<error>` element becomes `Auth` (when it mentions the API key) or
/// `Api`. A body that is not XML, or has no `<result>` root, is `Malformed`.
pub fn parse_response(body: &[u8]) -> Result<Vec<Record>> {
    let text = std::str::from_utf8(body)
        .map_err(|e| DestinationError::malformed(format!("response is not UTF-8: {e}")))?;

    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(true);

    let mut saw_result = false;
    let mut records = Vec::new();
    let mut current: Option<Record> = None;
    let mut error: Option<String> = None;
    let mut in_error = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(event)) => match event.name().as_ref() {
                b"result" => saw_result = true,
                b"record" => current = Some(Record::default()),
                b"error" => {
                    in_error = true;
                    error.get_or_insert_with(String::new);
                }
                b"field" => {
                    if let Some(record) = current.as_mut() {
                        push_field(record, &event);
                    }
                }
                _ => {}
            },
            Ok(Event::Empty(event)) => match event.name().as_ref() {
                b"result" => saw_result = true,
                b"record" => records.push(Record::default()),
                b"field" => {
                    if let Some(record) = current.as_mut() {
                        push_field(record, &event);
                    }
                }
                b"error" => {
                    error = Some(attribute(&event, b"message").unwrap_or_default());
                }
                _ => {}
            },
            Ok(Event::Text(text)) => {
                if in_error && let Ok(value) = text.unescape() {
                    if let Some(message) = error.as_mut() {
                        message.push_str(&value);
                    }
                }
            }
            Ok(Event::End(event)) => match event.name().as_ref() {
                b"record" => {
                    if let Some(record) = current.take() {
                        records.push(record);
                    }
                }
                b"error" => in_error = false,
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(DestinationError::malformed(format!(
                    "invalid XML at byte {}: {e}",
                    reader.buffer_position()
                )));
            }
            _ => {}
        }
    }

    if let Some(message) = error {
        let message = message.trim().to_string();
        let message = if message.is_empty() {
            "Destination returned an error without a message".to_string()
        } else {
            message
        };
        return Err(classify_error(message));
    }

    if !saw_result {
        return Err(DestinationError::malformed("response has no <result> element"));
    }

    Ok(records)
}

/// The id a save procedure returned: the first field of the first record.
pub fn returned_id(records: &[Record], what: &str) -> Result<DestinationId> {
    let raw = records
        .first()
        .and_then(Record::first_value)
        .ok_or_else(|| DestinationError::malformed(format!("no {what} id in response")))?;

    let id: DestinationId = raw.trim().parse().map_err(|_| {
        DestinationError::malformed(format!("{what} id {raw:?} is not a number"))
    })?;

    // Save procedures answer with a non-positive id when they refuse the row.
    if id <= 0 {
        return Err(DestinationError::api(format!("{what} was not saved (id {id})")));
    }
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quote_doubles_embedded_quotes() {
        assert_eq!(quote("O'Brien"), "'O''Brien'");
        assert_eq!(quote(""), "''");
    }

    #[test]
    fn amounts_have_exactly_two_decimals() {
        assert_eq!(format_amount(Decimal::new(25, 0)), "25.00");
        assert_eq!(format_amount(Decimal::new(105, 1)), "10.50");
        assert_eq!(format_amount(Decimal::new(10005, 3)), "10.01");
        assert_eq!(format_amount(Decimal::new(-1, 0)), "-1.00");
    }

    #[test]
    fn render_params_formats_each_kind() {
        let rendered = render_params(&[
            ("donor_id", Param::Int(0)),
            ("last_name", "O'Hara".into()),
            ("amount", Param::Money(Decimal::new(1000, 2))),
            ("gift_date", Param::Date(NaiveDate::from_ymd_opt(2026, 3, 1).unwrap())),
            ("plink", Param::opt_int(None)),
        ]);
        assert_eq!(
            rendered,
            "@donor_id=0,@last_name='O''Hara',@amount=10.00,@gift_date='03/01/2026',@plink=null"
        );
    }

    #[test]
    fn parses_records_and_fields() {
        let body = br#"<?xml version="1.0"?>
            <result>
              <record><field name="donor_id" id="donor_id" value="147"/></record>
              <record><field name="donor_id" id="donor_id" value="152"/></record>
            </result>"#;

        let records = parse_response(body).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].get("donor_id"), Some("147"));
        assert_eq!(records[1].get("DONOR_ID"), Some("152"));
    }

    #[test]
    fn empty_result_has_no_records() {
        assert!(parse_response(b"<result></result>").unwrap().is_empty());
        assert!(parse_response(b"<result/>").unwrap().is_empty());
    }

    #[test]
    fn save_procedure_id_is_read_from_unnamed_field() {
        let records =
            parse_response(br#"<result><record><field name="" id="" value="9001"/></record></result>"#)
                .unwrap();
        assert_eq!(returned_id(&records, "gift").unwrap(), 9001);
    }

    #[test]
    fn non_positive_ids_are_refusals() {
        let records =
            parse_response(br#"<result><record><field name="" value="0"/></record></result>"#)
                .unwrap();
        let err = returned_id(&records, "donor").unwrap_err();
        assert!(matches!(err, DestinationError::Api { .. }));
    }

    #[test]
    fn error_elements_become_api_or_auth_errors() {
        let err = parse_response(b"<result><error>Invalid GL code 'XX'</error></result>").unwrap_err();
        assert!(matches!(err, DestinationError::Api { ref message } if message == "Invalid GL code 'XX'"));

        let err = parse_response(b"<error>Invalid API key</error>").unwrap_err();
        assert!(matches!(err, DestinationError::Auth { .. }));
    }

    #[test]
    fn garbage_is_malformed() {
        let err = parse_response(b"<html><body>Gateway Timeout</body></html>").unwrap_err();
        assert!(err.is_transport());

        let err = parse_response(&[0xff, 0xfe]).unwrap_err();
        assert!(matches!(err, DestinationError::Malformed { .. }));
    }
}
