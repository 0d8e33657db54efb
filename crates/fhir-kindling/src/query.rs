//! Search queries against a FHIR server.
//!
//! [`FhirQuery`] builds the search URL for one resource type, executes it and,
//! when the server answers with a paginated searchset Bundle, follows the
//! `next` links until pagination ends or the requested limit is reached.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{KindlingError, Result};
use crate::model::{Resource, ResourceModel, is_valid_resource_type_name};
use crate::transport::Transport;

/// `_count` sent when no limit is set.
pub const DEFAULT_PAGE_COUNT: usize = 5000;

/// Value of the `_format` search parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Json,
    Xml,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Xml => write!(f, "xml"),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = KindlingError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "xml" => Ok(OutputFormat::Xml),
            other => Err(KindlingError::configuration(format!(
                "Unknown output format: {other}. Valid formats: json, xml"
            ))),
        }
    }
}

/// Result of executing a query.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryResponse {
    /// Decoded JSON body, with all fetched pages merged into `entry`.
    Json(Value),
    /// Raw XML body of the first page; XML responses are not paginated.
    Xml(String),
}

impl QueryResponse {
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            QueryResponse::Json(value) => Some(value),
            QueryResponse::Xml(_) => None,
        }
    }

    pub fn into_json(self) -> Option<Value> {
        match self {
            QueryResponse::Json(value) => Some(value),
            QueryResponse::Xml(_) => None,
        }
    }

    /// Bundle entries of a JSON response, empty for anything else.
    pub fn entries(&self) -> &[Value] {
        self.as_json()
            .and_then(|v| v.get("entry"))
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

/// A search for one resource type on one server.
///
/// The query URL is built on first access and cached. Changing the limit
/// afterwards (via [`FhirQuery::all`], [`FhirQuery::first`] or
/// [`FhirQuery::limit`]) still truncates the merged result, but the cached
/// URL keeps the `_count` it was built with.
pub struct FhirQuery<T> {
    transport: T,
    base_url: String,
    resource_type: String,
    output_format: OutputFormat,
    limit: Option<usize>,
    query_string: Option<String>,
}

impl<T: Transport> FhirQuery<T> {
    pub fn new(base_url: &str, resource_type: &str, transport: T) -> Result<Self> {
        if !is_valid_resource_type_name(resource_type) {
            return Err(KindlingError::unknown_resource_type(resource_type));
        }
        Ok(Self {
            transport,
            base_url: base_url.trim_end_matches('/').to_string(),
            resource_type: resource_type.to_string(),
            output_format: OutputFormat::default(),
            limit: None,
            query_string: None,
        })
    }

    /// Like [`FhirQuery::new`], but the type must also be known to `model`.
    pub fn for_model(
        base_url: &str,
        model: &dyn ResourceModel,
        resource_type: &str,
        transport: T,
    ) -> Result<Self> {
        let descriptor = model.resolve_type(resource_type)?;
        Self::new(base_url, &descriptor.name, transport)
    }

    /// Query for resources of the same type as `resource`.
    pub fn for_resource(base_url: &str, resource: &Resource, transport: T) -> Result<Self> {
        Self::new(base_url, resource.resource_type(), transport)
    }

    pub fn with_format(mut self, output_format: OutputFormat) -> Self {
        self.output_format = output_format;
        self
    }

    /// Filter predicates are accepted for forward compatibility but not yet
    /// applied to the query.
    pub fn where_<I, S>(self, conditions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let ignored = conditions.into_iter().count();
        tracing::debug!(ignored, "Filter conditions are not applied");
        self
    }

    /// `_include` support placeholder; returns the query unchanged.
    pub fn include(self) -> Self {
        self
    }

    /// `_has` support placeholder; returns the query unchanged.
    pub fn has(self) -> Self {
        self
    }

    pub fn resource_type(&self) -> &str {
        &self.resource_type
    }

    pub fn output_format(&self) -> OutputFormat {
        self.output_format
    }

    pub fn current_limit(&self) -> Option<usize> {
        self.limit
    }

    /// Fetch every matching resource, following all `next` links.
    pub fn all(&mut self) -> Result<QueryResponse> {
        self.limit = None;
        self.execute()
    }

    /// Fetch at most `n` resources. A limit of zero means no limit.
    pub fn limit(&mut self, n: usize) -> Result<QueryResponse> {
        self.limit = (n > 0).then_some(n);
        self.execute()
    }

    pub fn first(&mut self) -> Result<QueryResponse> {
        self.limit = Some(1);
        self.execute()
    }

    /// Replace the query with a raw search string appended to the base URL,
    /// e.g. `/Patient?gender=female`.
    pub fn set_query_string(&mut self, raw_query_string: &str) {
        self.query_string = Some(format!("{}{}", self.base_url, raw_query_string));
    }

    pub fn query_url(&mut self) -> &str {
        let query_string = self.query_string.get_or_insert_with(|| {
            let count = self.limit.unwrap_or(DEFAULT_PAGE_COUNT);
            let url = format!(
                "{}/{}?_count={}&_format={}",
                self.base_url, self.resource_type, count, self.output_format
            );
            tracing::debug!(url = %url, "Built query string");
            url
        });
        query_string.as_str()
    }

    fn execute(&mut self) -> Result<QueryResponse> {
        let url = self.query_url().to_string();
        let body = self.fetch(&url)?;

        match self.output_format {
            OutputFormat::Xml => Ok(QueryResponse::Xml(body)),
            OutputFormat::Json => {
                let response: Value = serde_json::from_str(&body)?;
                if has_links(&response) {
                    self.resolve_pagination(response).map(QueryResponse::Json)
                } else {
                    Ok(QueryResponse::Json(response))
                }
            }
        }
    }

    fn fetch(&self, url: &str) -> Result<String> {
        let resp = self.transport.get(url)?;
        if !resp.is_success() {
            return Err(KindlingError::Http {
                status: resp.status,
                url: url.to_string(),
                body: resp.body,
            });
        }
        Ok(resp.body)
    }

    fn limit_reached(&self, collected: usize) -> bool {
        self.limit.is_some_and(|limit| collected >= limit)
    }

    fn resolve_pagination(&self, mut response: Value) -> Result<Value> {
        let mut entries = take_entries(&mut response);

        if let Some(limit) = self.limit
            && entries.len() >= limit
        {
            entries.truncate(limit);
            set_entries(&mut response, entries);
            return Ok(response);
        }

        let mut pages = 1usize;
        while has_links(&response) {
            if self.limit_reached(entries.len()) {
                tracing::info!(
                    pages,
                    entries = entries.len(),
                    "Limit reached, stopping pagination"
                );
                break;
            }

            let Some(next) = next_link(&response) else {
                break;
            };
            let body = self.fetch(&next)?;
            response = serde_json::from_str(&body)?;
            let page = take_entries(&mut response);
            pages += 1;
            tracing::debug!(page = pages, entries = page.len(), url = %next, "Fetched next page");
            entries.extend(page);
        }

        if let Some(limit) = self.limit {
            entries.truncate(limit);
        }
        set_entries(&mut response, entries);
        Ok(response)
    }
}

fn has_links(response: &Value) -> bool {
    response
        .get("link")
        .and_then(Value::as_array)
        .is_some_and(|links| !links.is_empty())
}

fn next_link(response: &Value) -> Option<String> {
    response
        .get("link")?
        .as_array()?
        .iter()
        .find(|link| link.get("relation").and_then(Value::as_str) == Some("next"))
        .and_then(|link| link.get("url"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn take_entries(response: &mut Value) -> Vec<Value> {
    match response.as_object_mut().and_then(|obj| obj.remove("entry")) {
        Some(Value::Array(entries)) => entries,
        _ => Vec::new(),
    }
}

fn set_entries(response: &mut Value, entries: Vec<Value>) {
    if let Some(obj) = response.as_object_mut() {
        obj.insert("entry".to_string(), Value::Array(entries));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::TransportResponse;
    use serde_json::json;
    use std::cell::RefCell;
    use std::collections::HashMap;

    const BASE: &str = "http://fhir.test/fhir";

    /// Serves canned responses by URL and records every request.
    #[derive(Default)]
    struct RecordingTransport {
        responses: HashMap<String, TransportResponse>,
        requests: RefCell<Vec<String>>,
    }

    impl RecordingTransport {
        fn with(mut self, url: &str, status: u16, body: Value) -> Self {
            self.responses
                .insert(url.to_string(), TransportResponse::new(status, body.to_string()));
            self
        }

        fn request_count(&self) -> usize {
            self.requests.borrow().len()
        }
    }

    impl Transport for RecordingTransport {
        fn get(&self, url: &str) -> Result<TransportResponse> {
            self.requests.borrow_mut().push(url.to_string());
            Ok(self
                .responses
                .get(url)
                .cloned()
                .unwrap_or_else(|| TransportResponse::new(404, "not found")))
        }
    }

    fn page(start: usize, len: usize, next: Option<&str>) -> Value {
        let entries: Vec<Value> = (start..start + len)
            .map(|i| json!({"resource": {"resourceType": "Patient", "id": format!("p{i}")}}))
            .collect();
        let mut links = vec![json!({"relation": "self", "url": "ignored"})];
        if let Some(next) = next {
            links.push(json!({"relation": "next", "url": next}));
        }
        json!({"resourceType": "Bundle", "type": "searchset", "link": links, "entry": entries})
    }

    fn first_url(count: usize) -> String {
        format!("{BASE}/Patient?_count={count}&_format=json")
    }

    fn page2_url() -> String {
        format!("{BASE}/Patient?page=2")
    }

    fn two_page_transport(count: usize) -> RecordingTransport {
        RecordingTransport::default()
            .with(&first_url(count), 200, page(0, 10, Some(&page2_url())))
            .with(&page2_url(), 200, page(10, 10, None))
    }

    #[test]
    fn test_query_url_defaults_to_5000() {
        let transport = RecordingTransport::default();
        let mut query = FhirQuery::new(BASE, "Patient", &transport).unwrap();
        assert_eq!(query.query_url(), first_url(5000));
    }

    #[test]
    fn test_query_url_uses_limit_set_before_first_access() {
        let transport = RecordingTransport::default().with(&first_url(3), 200, page(0, 3, None));
        let mut query = FhirQuery::new(BASE, "Patient", &transport).unwrap();
        query.limit(3).unwrap();
        assert_eq!(query.query_url(), first_url(3));
    }

    #[test]
    fn test_cached_query_url_survives_limit_change() {
        let transport = RecordingTransport::default().with(&first_url(3), 200, page(0, 3, None));
        let mut query = FhirQuery::new(BASE, "Patient", &transport).unwrap();
        query.limit(3).unwrap();
        query.all().unwrap();
        assert_eq!(query.current_limit(), None);
        assert_eq!(*transport.requests.borrow(), vec![first_url(3), first_url(3)]);
    }

    #[test]
    fn test_all_collects_every_page() {
        let transport = two_page_transport(5000);
        let mut query = FhirQuery::new(BASE, "Patient", &transport).unwrap();
        let result = query.all().unwrap();
        assert_eq!(result.entries().len(), 20);
        assert_eq!(result.entries()[19]["resource"]["id"], "p19");
        assert_eq!(transport.request_count(), 2);
    }

    #[test]
    fn test_limit_truncates_after_second_page() {
        let transport = two_page_transport(15);
        let mut query = FhirQuery::new(BASE, "Patient", &transport).unwrap();
        let result = query.limit(15).unwrap();
        assert_eq!(result.entries().len(), 15);
        assert_eq!(result.entries()[14]["resource"]["id"], "p14");
        assert_eq!(transport.request_count(), 2);
    }

    #[test]
    fn test_limit_met_by_first_page_skips_next_links() {
        let transport = RecordingTransport::default()
            .with(&first_url(15), 200, page(0, 20, Some(&page2_url())))
            .with(&page2_url(), 200, page(20, 10, None));
        let mut query = FhirQuery::new(BASE, "Patient", &transport).unwrap();
        let result = query.limit(15).unwrap();
        assert_eq!(result.entries().len(), 15);
        assert_eq!(transport.request_count(), 1);
    }

    #[test]
    fn test_first_returns_single_entry() {
        let transport =
            RecordingTransport::default().with(&first_url(1), 200, page(0, 1, Some(&page2_url())));
        let mut query = FhirQuery::new(BASE, "Patient", &transport).unwrap();
        let result = query.first().unwrap();
        assert_eq!(result.entries().len(), 1);
        assert_eq!(transport.request_count(), 1);
    }

    #[test]
    fn test_unpaginated_body_is_returned_as_is() {
        let body = json!({"resourceType": "Bundle", "total": 0});
        let transport = RecordingTransport::default().with(&first_url(5000), 200, body.clone());
        let mut query = FhirQuery::new(BASE, "Patient", &transport).unwrap();
        assert_eq!(query.all().unwrap(), QueryResponse::Json(body));
    }

    #[test]
    fn test_error_status_on_next_page_is_reported() {
        let transport = RecordingTransport::default()
            .with(&first_url(5000), 200, page(0, 10, Some(&page2_url())))
            .with(&page2_url(), 500, json!({"resourceType": "OperationOutcome"}));
        let mut query = FhirQuery::new(BASE, "Patient", &transport).unwrap();
        let err = query.all().unwrap_err();
        assert_eq!(err.status(), Some(500));
    }

    #[test]
    fn test_error_status_on_first_page_is_reported() {
        let transport = RecordingTransport::default();
        let mut query = FhirQuery::new(BASE, "Patient", &transport).unwrap();
        assert!(matches!(
            query.all(),
            Err(KindlingError::Http { status: 404, .. })
        ));
    }

    #[test]
    fn test_xml_returns_raw_body() {
        let url = format!("{BASE}/Patient?_count=5000&_format=xml");
        let mut transport = RecordingTransport::default();
        transport
            .responses
            .insert(url, TransportResponse::new(200, "<Bundle/>"));
        let mut query = FhirQuery::new(BASE, "Patient", &transport)
            .unwrap()
            .with_format(OutputFormat::Xml);
        assert_eq!(query.all().unwrap(), QueryResponse::Xml("<Bundle/>".into()));
    }

    #[test]
    fn test_raw_query_string_overrides_built_url() {
        let url = format!("{BASE}/Patient?gender=female");
        let transport = RecordingTransport::default().with(&url, 200, page(0, 2, None));
        let mut query = FhirQuery::new(BASE, "Patient", &transport).unwrap();
        query.set_query_string("/Patient?gender=female");
        assert_eq!(query.query_url(), url);
        assert_eq!(query.all().unwrap().entries().len(), 2);
    }

    #[test]
    fn test_where_is_a_no_op() {
        let transport = RecordingTransport::default();
        let mut query = FhirQuery::new(BASE, "Patient", &transport)
            .unwrap()
            .where_(["gender=female"])
            .include()
            .has();
        assert_eq!(query.query_url(), first_url(5000));
    }

    #[test]
    fn test_limit_stops_following_next_links() {
        let page_url = |n: usize| match n {
            1 => first_url(15),
            n => format!("{BASE}/Patient?page={n}"),
        };
        let mut transport = RecordingTransport::default();
        for n in 1..=4 {
            let next = page_url(n + 1);
            transport = transport.with(&page_url(n), 200, page(n * 10, 10, Some(&next)));
        }
        let mut query = FhirQuery::new(BASE, "Patient", &transport).unwrap();
        let result = query.limit(15).unwrap();
        assert_eq!(result.entries().len(), 15);
        assert_eq!(transport.request_count(), 2);
        assert_eq!(*transport.requests.borrow(), vec![page_url(1), page_url(2)]);
    }

    #[test]
    fn test_for_model_rejects_unregistered_type() {
        let transport = RecordingTransport::default();
        let registry = crate::model::SchemaRegistry::r4();
        assert!(matches!(
            FhirQuery::for_model(BASE, &registry, "Unicorn", &transport),
            Err(KindlingError::UnknownResourceType(name)) if name == "Unicorn"
        ));
        let mut query = FhirQuery::for_model(BASE, &registry, "Patient", &transport).unwrap();
        assert_eq!(query.query_url(), first_url(5000));
    }

    #[test]
    fn test_rejects_invalid_resource_type() {
        let transport = RecordingTransport::default();
        assert!(matches!(
            FhirQuery::new(BASE, "not a type", &transport),
            Err(KindlingError::UnknownResourceType(_))
        ));
    }

    #[test]
    fn test_output_format_parsing() {
        assert_eq!("JSON".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert_eq!("xml".parse::<OutputFormat>().unwrap(), OutputFormat::Xml);
        assert!("csv".parse::<OutputFormat>().is_err());
    }
}
