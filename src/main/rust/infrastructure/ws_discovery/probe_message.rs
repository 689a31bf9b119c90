use crate::domain::errors::{DomainError, Result};

const PROBE_ACTION: &str = "http://schemas.xmlsoap.org/ws/2005/04/discovery/Probe";

/// One `ProbeMatch` entry of a WS-Discovery response
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeMatch {
    /// `EndpointReference/Address`, usually `urn:uuid:...`
    pub endpoint_address: Option<String>,
    pub types: Vec<String>,
    pub scopes: Vec<String>,
    pub xaddrs: Vec<String>,
}

impl ProbeMatch {
    /// True if any advertised type has the same local name as `device_type`.
    /// A match that advertises no types at all is accepted.
    pub fn offers_type(&self, device_type: &str) -> bool {
        let wanted = local_name(device_type);
        self.types.is_empty() || self.types.iter().any(|t| local_name(t) == wanted)
    }
}

/// A parsed `ProbeMatches` message
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeResponse {
    pub relates_to: Option<String>,
    pub matches: Vec<ProbeMatch>,
}

/// SOAP envelope for a typed WS-Discovery probe
pub fn build_probe(message_id: &str, device_type: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
<soap:Envelope xmlns:soap=\"http://www.w3.org/2003/05/soap-envelope\" \
xmlns:wsa=\"http://schemas.xmlsoap.org/ws/2004/08/addressing\" \
xmlns:wsd=\"http://schemas.xmlsoap.org/ws/2005/04/discovery\" \
xmlns:dn=\"http://www.onvif.org/ver10/network/wsdl\">\
<soap:Header>\
<wsa:MessageID>{}</wsa:MessageID>\
<wsa:To>urn:schemas-xmlsoap-org:ws:2005:04:discovery</wsa:To>\
<wsa:Action>{}</wsa:Action>\
</soap:Header>\
<soap:Body><wsd:Probe><wsd:Types>{}</wsd:Types></wsd:Probe></soap:Body>\
</soap:Envelope>",
        message_id, PROBE_ACTION, device_type
    )
}

/// Parse a `ProbeMatches` response, ignoring namespace prefixes
pub fn parse_probe_matches(xml: &str) -> Result<ProbeResponse> {
    let body = element_bodies(xml, "ProbeMatches")
        .into_iter()
        .next()
        .ok_or_else(|| DomainError::DiscoveryFailed("not a ProbeMatches message".to_string()))?;

    let relates_to = element_text(xml, "RelatesTo");
    let matches = element_bodies(body, "ProbeMatch")
        .into_iter()
        .map(|entry| ProbeMatch {
            endpoint_address: element_text(entry, "Address"),
            types: element_list(entry, "Types"),
            scopes: element_list(entry, "Scopes"),
            xaddrs: element_list(entry, "XAddrs"),
        })
        .collect();

    Ok(ProbeResponse {
        relates_to,
        matches,
    })
}

fn element_text(xml: &str, local: &str) -> Option<String> {
    element_bodies(xml, local)
        .into_iter()
        .map(str::trim)
        .find(|value| !value.is_empty())
        .map(str::to_string)
}

/// Whitespace-separated list content, e.g. `XAddrs` or `Scopes`
fn element_list(xml: &str, local: &str) -> Vec<String> {
    element_bodies(xml, local)
        .into_iter()
        .flat_map(str::split_whitespace)
        .map(str::to_string)
        .collect()
}

/// Inner text of every element whose local name is `local`
fn element_bodies<'a>(xml: &'a str, local: &str) -> Vec<&'a str> {
    let mut bodies = Vec::new();
    let mut rest = xml;
    while let Some((body, after)) = next_element(rest, local) {
        bodies.push(body);
        rest = after;
    }
    bodies
}

fn next_element<'a>(xml: &'a str, local: &str) -> Option<(&'a str, &'a str)> {
    let mut from = 0;
    loop {
        let open = xml[from..].find('<')? + from;
        let open_end = xml[open..].find('>')? + open;
        let tag = &xml[open + 1..open_end];
        from = open_end + 1;

        if tag.starts_with(['/', '?', '!']) {
            continue;
        }
        let name = tag
            .split(|c: char| c.is_whitespace() || c == '/')
            .next()
            .unwrap_or_default();
        if local_name(name) != local {
            continue;
        }
        if tag.ends_with('/') {
            return Some(("", &xml[from..]));
        }

        let close = format!("</{}>", name);
        let close_at = xml[from..].find(close.as_str())? + from;
        return Some((&xml[from..close_at], &xml[close_at + close.len()..]));
    }
}

fn local_name(name: &str) -> &str {
    name.rsplit(':').next().unwrap_or(name)
}
