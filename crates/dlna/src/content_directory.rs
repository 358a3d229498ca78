/// ContentDirectory SOAP client
///
/// Issues `Browse` actions against the server's control URL and turns the
/// DIDL-Lite payload into `Node`s. Large folders are fetched page by page.
use crate::context::FetchContext;
use crate::didl::parse_didl;
use async_trait::async_trait;
use fetchtv_core::{ContentBrowser, FetchError, Node, Result, Server};
use quick_xml::events::Event;
use quick_xml::Reader;
use std::future::Future;
use tracing::{debug, info};

const SERVICE_TYPE: &str = "urn:schemas-upnp-org:service:ContentDirectory:1";

/// ContentDirectory controller for a Fetch TV server
#[derive(Debug, Clone)]
pub struct ContentDirectory {
    ctx: FetchContext,
    control_url: String,
    service_type: String,
}

/// One page of a `Browse` response
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BrowsePage {
    pub result: String,
    pub number_returned: u32,
    pub total_matches: u32,
}

impl ContentDirectory {
    pub fn new(ctx: FetchContext, server: &Server) -> Self {
        Self {
            ctx,
            control_url: server.control_url.clone(),
            service_type: SERVICE_TYPE.to_string(),
        }
    }

    /// Browse all direct children of `object_id`, following pagination
    pub async fn browse_children(&self, object_id: &str) -> Result<Vec<Node>> {
        let page_size = self.ctx.config().browse_page_size;
        let nodes = collect_pages(page_size, move |start, count| {
            self.browse_page(object_id, start, count)
        })
        .await?;

        info!("Browsed {}: {} entries", object_id, nodes.len());
        Ok(nodes)
    }

    /// Issue a single `BrowseDirectChildren` request
    pub async fn browse_page(&self, object_id: &str, start: u32, count: u32) -> Result<BrowsePage> {
        let body = browse_envelope(&self.service_type, object_id, start, count);
        let response = self.send_soap_action("Browse", &body).await?;
        parse_browse_response(&response)
    }

    /// Send a SOAP action to the control URL
    async fn send_soap_action(&self, action: &str, body: &str) -> Result<String> {
        let soap_action = format!("\"{}#{}\"", self.service_type, action);

        debug!("Sending SOAP action: {}", soap_action);
        debug!("To URL: {}", self.control_url);
        debug!("Body: {}", body);

        let response = self
            .ctx
            .control_client()
            .post(&self.control_url)
            .header("Content-Type", "text/xml; charset=\"utf-8\"")
            .header("SOAPAction", soap_action)
            .body(body.to_string())
            .send()
            .await
            .map_err(|e| FetchError::protocol(format!("{} request failed: {}", action, e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_body = response.text().await.unwrap_or_default();
            return Err(FetchError::protocol(format!(
                "{} failed with status {}: {}",
                action, status, error_body
            )));
        }

        let response_text = response
            .text()
            .await
            .map_err(|e| FetchError::protocol(format!("{} response unreadable: {}", action, e)))?;
        debug!("SOAP response: {}", response_text);

        Ok(response_text)
    }
}

#[async_trait]
impl ContentBrowser for ContentDirectory {
    async fn browse(&self, container_id: &str) -> Result<Vec<Node>> {
        self.browse_children(container_id).await
    }
}

/// Request pages of `page_size` until the server returns nothing or every
/// match has been seen, parsing each page's DIDL in order
async fn collect_pages<F, Fut>(page_size: u32, mut fetch: F) -> Result<Vec<Node>>
where
    F: FnMut(u32, u32) -> Fut,
    Fut: Future<Output = Result<BrowsePage>>,
{
    let page_size = page_size.max(1);
    let mut nodes = Vec::new();
    let mut start = 0u32;

    loop {
        let page = fetch(start, page_size).await?;
        nodes.extend(parse_didl(&page.result)?);
        start = start.saturating_add(page.number_returned);

        if page.number_returned == 0 || start >= page.total_matches {
            break;
        }
    }
    Ok(nodes)
}

/// SOAP envelope for `Browse` / `BrowseDirectChildren`
fn browse_envelope(service_type: &str, object_id: &str, start: u32, count: u32) -> String {
    format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/"
            s:encodingStyle="http://schemas.xmlsoap.org/soap/encoding/">
  <s:Body>
    <u:Browse xmlns:u="{}">
      <ObjectID>{}</ObjectID>
      <BrowseFlag>BrowseDirectChildren</BrowseFlag>
      <Filter>*</Filter>
      <StartingIndex>{}</StartingIndex>
      <RequestedCount>{}</RequestedCount>
      <SortCriteria></SortCriteria>
    </u:Browse>
  </s:Body>
</s:Envelope>"#,
        service_type,
        escape_xml(object_id),
        start,
        count
    )
}

/// Pull `Result`, `NumberReturned` and `TotalMatches` out of a `BrowseResponse`
///
/// `Result` carries escaped DIDL-Lite; it comes back unescaped.
pub fn parse_browse_response(xml: &str) -> Result<BrowsePage> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut result: Option<String> = None;
    let mut number_returned: Option<u32> = None;
    let mut total_matches: Option<u32> = None;
    let mut fault: Option<String> = None;
    let mut current_text = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(_)) => current_text.clear(),
            Ok(Event::Empty(e)) => {
                if e.local_name().as_ref() == b"Result" {
                    result = Some(String::new());
                }
            }
            Ok(Event::End(e)) => {
                let text = current_text.trim();
                match e.local_name().as_ref() {
                    b"Result" => result = Some(text.to_string()),
                    b"NumberReturned" => number_returned = text.parse().ok(),
                    b"TotalMatches" => total_matches = text.parse().ok(),
                    b"faultstring" | b"errorDescription" => fault = Some(text.to_string()),
                    _ => {}
                }
                current_text.clear();
            }
            Ok(Event::Text(e)) => {
                current_text.push_str(&e.unescape().unwrap_or_default());
            }
            Ok(Event::CData(e)) => {
                current_text.push_str(&String::from_utf8_lossy(&e));
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(FetchError::protocol(format!(
                    "Browse response XML error at position {}: {}",
                    reader.buffer_position(),
                    e
                )));
            }
            _ => {}
        }
    }

    let result = match (result, fault) {
        (Some(result), _) => result,
        (None, Some(fault)) => {
            return Err(FetchError::protocol(format!("Browse fault: {}", fault)));
        }
        (None, None) => {
            return Err(FetchError::protocol("Browse response has no Result element"));
        }
    };

    let number_returned = number_returned.unwrap_or(0);
    Ok(BrowsePage {
        result,
        number_returned,
        total_matches: total_matches.unwrap_or(number_returned),
    })
}

/// Escape XML special characters
fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
