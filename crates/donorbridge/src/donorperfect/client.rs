use std::time::Instant;

use async_trait::async_trait;
use url::Url;

use crate::destination::{
    CodeField, ConnectionStatus, DestinationClient, DestinationError, DestinationId, GiftPayload,
    PledgePayload, Result, short_error_message,
};
use crate::http::{HttpError, HttpRequest, HttpTransport};
use crate::retry::{RetryConfig, with_retry};
use crate::source::DonorContact;

use super::xml::{Param, Record, parse_response, quote, render_params, returned_id};

/// Production XML API endpoint.
pub const DEFAULT_BASE_URL: &str = "https://www.donorperfect.net/prod/xmlrequest.asp";

/// Value written to the `user_id` audit column of every saved record.
const AUDIT_USER: &str = "donorbridge";

/// Pledge billing frequency. Source subscriptions bill monthly.
const PLEDGE_FREQUENCY: &str = "M";

/// DonorPerfect XML API client.
///
/// Every call is a `GET` with the API key, an `action` and optional
/// `params` in the query string. Reads (`SELECT` actions) are retried on
/// transport failures; saves are sent exactly once.
pub struct DonorPerfectClient<T> {
    transport: T,
    base_url: String,
    api_key: String,
    retry: RetryConfig,
}

impl<T> std::fmt::Debug for DonorPerfectClient<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DonorPerfectClient")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

impl<T: HttpTransport> DonorPerfectClient<T> {
    /// A client for the production endpoint.
    pub fn new(transport: T, api_key: impl Into<String>) -> Self {
        Self {
            transport,
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
            retry: RetryConfig::default(),
        }
    }

    /// Point the client at another endpoint (sandbox, proxy, test server).
    ///
    /// # Errors
    /// Returns `DestinationError::Api` if `base_url` is not an absolute URL.
    pub fn with_base_url(mut self, base_url: &str) -> Result<Self> {
        Url::parse(base_url)
            .map_err(|e| DestinationError::api(format!("invalid base URL {base_url:?}: {e}")))?;
        self.base_url = base_url.to_string();
        Ok(self)
    }

    /// Retry policy for read-only calls.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request_url(&self, action: &str, params: Option<&str>) -> Result<String> {
        let mut query = vec![("apikey", self.api_key.as_str()), ("action", action)];
        if let Some(params) = params {
            query.push(("params", params));
        }
        Url::parse_with_params(&self.base_url, query)
            .map(String::from)
            .map_err(|e| DestinationError::api(format!("invalid base URL: {e}")))
    }

    async fn call(&self, action: &str, params: Option<&str>) -> Result<Vec<Record>> {
        if self.api_key.trim().is_empty() {
            return Err(DestinationError::auth("no API key configured"));
        }

        let response = self
            .transport
            .send(HttpRequest::get(self.request_url(action, params)?))
            .await
            .map_err(|e| match e {
                HttpError::Timeout(message) => {
                    DestinationError::network(format!("timed out: {message}"))
                }
                other => DestinationError::network(other.to_string()),
            })?;

        if !response.is_success() {
            let body = String::from_utf8_lossy(&response.body);
            let message = body.lines().next().unwrap_or_default().trim().to_string();
            return Err(match response.status {
                401 | 403 => DestinationError::auth(message),
                status => DestinationError::http(status, message),
            });
        }

        parse_response(&response.body)
    }

    /// Run a read-only `SELECT`, retrying transport failures.
    async fn select(&self, label: &str, sql: &str) -> Result<Vec<Record>> {
        with_retry(
            || self.call(sql, None),
            DestinationError::is_transport,
            short_error_message,
            label,
            self.retry.clone(),
        )
        .await
    }

    /// Run a save procedure once.
    async fn save(
        &self,
        procedure: &str,
        what: &str,
        params: &[(&str, Param)],
    ) -> Result<DestinationId> {
        let records = self.call(procedure, Some(&render_params(params))).await?;
        let id = returned_id(&records, what)?;
        tracing::debug!(procedure, id, "Saved {what}");
        Ok(id)
    }
}

fn donor_params(contact: &DonorContact) -> Vec<(&'static str, Param)> {
    vec![
        ("donor_id", Param::Int(0)),
        ("first_name", contact.first_name.trim().into()),
        ("last_name", contact.last_name.trim().into()),
        ("middle_name", Param::Null),
        ("suffix", Param::Null),
        ("title", Param::Null),
        ("salutation", Param::Null),
        ("prof_title", Param::Null),
        ("opt_line", Param::Null),
        ("address", Param::Null),
        ("address2", Param::Null),
        ("city", Param::Null),
        ("state", Param::Null),
        ("zip", Param::Null),
        ("country", Param::Null),
        ("address_type", Param::Null),
        ("home_phone", Param::Null),
        ("business_phone", Param::Null),
        ("fax_phone", Param::Null),
        ("mobile_phone", Param::Null),
        ("email", contact.email.trim().to_ascii_lowercase().into()),
        ("org_rec", "N".into()),
        ("donor_type", "IN".into()),
        ("nomail", "N".into()),
        ("nomail_reason", Param::Null),
        ("narrative", Param::Null),
        ("user_id", AUDIT_USER.into()),
    ]
}

fn gift_params(gift: &GiftPayload) -> Vec<(&'static str, Param)> {
    vec![
        ("gift_id", Param::Int(0)),
        ("donor_id", Param::Int(gift.donor_id)),
        ("record_type", "G".into()),
        ("gift_date", Param::Date(gift.gift_date)),
        ("amount", Param::Money(gift.amount)),
        ("gl_code", gift.gl_code.as_str().into()),
        ("solicit_code", Param::opt_text(gift.solicit_code.as_deref())),
        ("sub_solicit_code", gift.sub_solicit_code.as_str().into()),
        ("campaign", Param::opt_text(gift.campaign.as_deref())),
        ("gift_type", gift.gift_type.as_str().into()),
        ("split_gift", "N".into()),
        (
            "pledge_payment",
            if gift.pledge_id.is_some() { "Y" } else { "N" }.into(),
        ),
        ("reference", gift.reference.as_str().into()),
        ("memory_honor", Param::Null),
        ("gfname", Param::Null),
        ("glname", Param::Null),
        ("fmv", Param::Int(0)),
        ("batch_no", Param::Int(0)),
        ("gift_narrative", Param::Null),
        ("ty_letter_no", Param::Null),
        ("glink", Param::Null),
        ("plink", Param::opt_int(gift.pledge_id)),
        ("nocalc", "N".into()),
        ("receipt", "N".into()),
        ("old_amount", Param::Null),
        ("user_id", AUDIT_USER.into()),
    ]
}

fn pledge_params(pledge: &PledgePayload) -> Vec<(&'static str, Param)> {
    vec![
        ("gift_id", Param::Int(0)),
        ("donor_id", Param::Int(pledge.donor_id)),
        ("gift_date", Param::Date(pledge.start_date)),
        ("start_date", Param::Date(pledge.start_date)),
        ("total", Param::Money(pledge.total)),
        ("bill", Param::Money(pledge.bill_amount)),
        ("frequency", PLEDGE_FREQUENCY.into()),
        ("reminder", "N".into()),
        ("gl_code", pledge.gl_code.as_str().into()),
        ("solicit_code", Param::opt_text(pledge.solicit_code.as_deref())),
        ("initial_payment", "N".into()),
        ("sub_solicit_code", crate::settings::SUB_SOLICIT_RECURRING.into()),
        ("writeoff_amount", Param::Int(0)),
        ("writeoff_date", Param::Null),
        ("user_id", AUDIT_USER.into()),
        ("campaign", Param::opt_text(pledge.campaign.as_deref())),
        ("reference", pledge.reference.as_str().into()),
    ]
}

#[async_trait]
impl<T: HttpTransport> DestinationClient for DonorPerfectClient<T> {
    async fn find_donor(&self, email: &str) -> Result<Option<DestinationId>> {
        let sql = format!(
            "SELECT TOP 1 donor_id FROM dp WHERE email={} ORDER BY donor_id",
            quote(&email.trim().to_ascii_lowercase())
        );
        let records = self.select("find_donor", &sql).await?;

        records
            .first()
            .and_then(|r| r.get("donor_id"))
            .map(|raw| {
                raw.trim().parse::<DestinationId>().map_err(|_| {
                    DestinationError::malformed(format!("donor id {raw:?} is not a number"))
                })
            })
            .transpose()
    }

    async fn create_donor(&self, contact: &DonorContact) -> Result<DestinationId> {
        self.save("dp_savedonor", "donor", &donor_params(contact))
            .await
    }

    async fn create_gift(&self, gift: &GiftPayload) -> Result<DestinationId> {
        self.save("dp_savegift", "gift", &gift_params(gift)).await
    }

    async fn create_pledge(&self, pledge: &PledgePayload) -> Result<DestinationId> {
        self.save("dp_savepledge", "pledge", &pledge_params(pledge))
            .await
    }

    async fn validate_code(&self, field: CodeField, value: &str) -> Result<bool> {
        let sql = format!(
            "SELECT TOP 1 code FROM dpcodes WHERE field_name={} AND code={} AND (inactive IS NULL OR inactive='N')",
            quote(field.field_name()),
            quote(value.trim())
        );
        let records = self.select("validate_code", &sql).await?;
        Ok(records.iter().any(|r| !r.is_empty()))
    }

    async fn test_connection(&self) -> Result<ConnectionStatus> {
        let started = Instant::now();
        match self.select("test_connection", "SELECT TOP 1 donor_id FROM dp").await {
            Ok(_) => {
                let host = Url::parse(&self.base_url)
                    .ok()
                    .and_then(|u| u.host_str().map(str::to_string))
                    .unwrap_or_else(|| "DonorPerfect".to_string());
                Ok(ConnectionStatus::ok(format!(
                    "Connected to {host} in {} ms",
                    started.elapsed().as_millis()
                )))
            }
            Err(e @ (DestinationError::Auth { .. } | DestinationError::Api { .. })) => {
                Ok(ConnectionStatus::failed(short_error_message(&e)))
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    use super::*;
    use crate::http::{HttpResponse, MockTransport};

    const BASE: &str = "https://dp.example.com/xmlrequest.asp";

    fn client(transport: &MockTransport) -> DonorPerfectClient<MockTransport> {
        DonorPerfectClient::new(transport.clone(), "k3y")
            .with_base_url(BASE)
            .unwrap()
            .with_retry(RetryConfig::new(
                std::time::Duration::from_millis(1),
                std::time::Duration::from_millis(1),
                2,
            ))
    }

    fn query_value(url: &str, key: &str) -> Option<String> {
        Url::parse(url)
            .unwrap()
            .query_pairs()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
    }

    fn id_response(id: i64) -> HttpResponse {
        HttpResponse::ok(format!(
            r#"<result><record><field name="" id="" value="{id}"/></record></result>"#
        ))
    }

    fn gift() -> GiftPayload {
        GiftPayload {
            donor_id: 147,
            amount: Decimal::new(25, 0),
            gift_date: NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
            gl_code: "UN".to_string(),
            campaign: None,
            solicit_code: Some("WEB".to_string()),
            sub_solicit_code: "ONETIME".to_string(),
            gift_type: "CC".to_string(),
            pledge_id: None,
            reference: "Donation #1".to_string(),
        }
    }

    #[tokio::test]
    async fn find_donor_sends_select_and_parses_id() {
        let transport = MockTransport::new();
        transport.push_next(HttpResponse::ok(
            r#"<result><record><field name="donor_id" id="donor_id" value="147"/></record></result>"#,
        ));

        let id = client(&transport)
            .find_donor(" Ada@Example.com ")
            .await
            .unwrap();
        assert_eq!(id, Some(147));

        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(query_value(&requests[0].url, "apikey").as_deref(), Some("k3y"));
        assert_eq!(
            query_value(&requests[0].url, "action").as_deref(),
            Some("SELECT TOP 1 donor_id FROM dp WHERE email='ada@example.com' ORDER BY donor_id")
        );
        assert!(requests[0].url.starts_with(BASE));
    }

    #[tokio::test]
    async fn find_donor_without_match_is_none() {
        let transport = MockTransport::new();
        transport.push_next(HttpResponse::ok("<result></result>"));
        assert_eq!(client(&transport).find_donor("x@example.com").await.unwrap(), None);
    }

    #[tokio::test]
    async fn find_donor_retries_transport_failures() {
        let transport = MockTransport::new();
        transport.push_next_error("connection reset");
        transport.push_next(HttpResponse::ok("<result></result>"));

        assert_eq!(client(&transport).find_donor("x@example.com").await.unwrap(), None);
        assert_eq!(transport.requests().len(), 2);
    }

    #[tokio::test]
    async fn create_gift_is_not_retried() {
        let transport = MockTransport::new();
        transport.push_next_error("connection reset");
        transport.push_next(id_response(1));

        let err = client(&transport).create_gift(&gift()).await.unwrap_err();
        assert!(err.is_transport());
        assert_eq!(transport.requests().len(), 1);
    }

    #[tokio::test]
    async fn create_gift_renders_procedure_params() {
        let transport = MockTransport::new();
        transport.push_next(id_response(9001));

        let id = client(&transport).create_gift(&gift()).await.unwrap();
        assert_eq!(id, 9001);

        let url = &transport.requests()[0].url;
        assert_eq!(query_value(url, "action").as_deref(), Some("dp_savegift"));
        let params = query_value(url, "params").unwrap();
        assert!(params.starts_with("@gift_id=0,@donor_id=147,@record_type='G',"));
        assert!(params.contains("@amount=25.00,"));
        assert!(params.contains("@gift_date='03/01/2026',"));
        assert!(params.contains("@sub_solicit_code='ONETIME',"));
        assert!(params.contains("@campaign=null,"));
        assert!(params.contains("@pledge_payment='N',"));
        assert!(params.contains("@plink=null,"));
    }

    #[tokio::test]
    async fn create_pledge_is_open_ended() {
        let transport = MockTransport::new();
        transport.push_next(id_response(55));

        let pledge = PledgePayload::open_ended(
            147,
            Decimal::new(1000, 2),
            NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
            "UN",
            "Subscription S1",
        );
        assert_eq!(client(&transport).create_pledge(&pledge).await.unwrap(), 55);

        let params = query_value(&transport.requests()[0].url, "params").unwrap();
        assert!(params.contains("@total=0.00,"));
        assert!(params.contains("@bill=10.00,"));
        assert!(params.contains("@frequency='M',"));
    }

    #[tokio::test]
    async fn create_donor_quotes_names() {
        let transport = MockTransport::new();
        transport.push_next(id_response(300));

        let id = client(&transport)
            .create_donor(&DonorContact::new("Siobhan", "O'Neill", "S@Example.com"))
            .await
            .unwrap();
        assert_eq!(id, 300);

        let params = query_value(&transport.requests()[0].url, "params").unwrap();
        assert!(params.contains("@last_name='O''Neill',"));
        assert!(params.contains("@email='s@example.com',"));
    }

    #[tokio::test]
    async fn api_errors_surface_as_application_errors() {
        let transport = MockTransport::new();
        transport.push_next(HttpResponse::ok(
            "<result><error>Invalid GL_CODE value</error></result>",
        ));

        let err = client(&transport).create_gift(&gift()).await.unwrap_err();
        assert!(matches!(err, DestinationError::Api { .. }));
        assert!(!err.is_transport());
    }

    #[tokio::test]
    async fn http_status_errors_are_transport_failures() {
        let transport = MockTransport::new();
        let mut response = HttpResponse::ok("Service Unavailable");
        response.status = 503;
        transport.push_next(response);

        let err = client(&transport).create_gift(&gift()).await.unwrap_err();
        assert!(matches!(err, DestinationError::Http { status: 503, .. }));
    }

    #[tokio::test]
    async fn missing_api_key_fails_without_a_request() {
        let transport = MockTransport::new();
        let client = DonorPerfectClient::new(transport.clone(), "  ");

        let err = client.find_donor("a@example.com").await.unwrap_err();
        assert!(matches!(err, DestinationError::Auth { .. }));
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn validate_code_checks_code_table() {
        let transport = MockTransport::new();
        transport.push_next(HttpResponse::ok(
            r#"<result><record><field name="code" id="code" value="UN"/></record></result>"#,
        ));
        transport.push_next(HttpResponse::ok("<result></result>"));

        let client = client(&transport);
        assert!(client.validate_code(CodeField::GlCode, "UN").await.unwrap());
        assert!(!client.validate_code(CodeField::Campaign, "NOPE").await.unwrap());

        let action = query_value(&transport.requests()[1].url, "action").unwrap();
        assert!(action.contains("field_name='CAMPAIGN'"));
        assert!(action.contains("code='NOPE'"));
    }

    #[tokio::test]
    async fn test_connection_reports_bad_key_as_failed_status() {
        let transport = MockTransport::new();
        transport.push_next(HttpResponse::ok("<error>Invalid API key</error>"));

        let status = client(&transport).test_connection().await.unwrap();
        assert!(!status.ok);
        assert!(status.message.contains("Invalid API key"));
    }

    #[tokio::test]
    async fn test_connection_succeeds_on_any_result() {
        let transport = MockTransport::new();
        transport.push_next(HttpResponse::ok("<result></result>"));

        let status = client(&transport).test_connection().await.unwrap();
        assert!(status.ok);
        assert!(status.message.contains("dp.example.com"));
    }
}
