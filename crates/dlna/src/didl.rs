/// DIDL-Lite parsing for ContentDirectory browse results
///
/// DIDL-Lite is the metadata format UPnP servers use to describe containers
/// and items. Every entry is classified into a `Node` here, so nothing
/// downstream has to inspect raw attributes.
use fetchtv_core::{
    Container, FetchError, Item, ItemKind, Node, Result, RECORDING_IN_PROGRESS_SIZE,
};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryElement {
    Container,
    Item,
}

/// An entry as read off the wire, before classification
#[derive(Debug, Default)]
struct RawEntry {
    element: Option<EntryElement>,
    id: String,
    parent_id: String,
    child_count: Option<String>,
    title: String,
    description: String,
    res_url: Option<String>,
    res_size: Option<String>,
    res_duration: Option<String>,
}

impl RawEntry {
    fn start(element: EntryElement, start: &BytesStart<'_>) -> Self {
        let mut entry = RawEntry {
            element: Some(element),
            ..Default::default()
        };
        for (key, value) in attributes(start) {
            match key.as_str() {
                "id" => entry.id = value,
                "parentID" => entry.parent_id = value,
                "childCount" => entry.child_count = Some(value),
                _ => {}
            }
        }
        entry
    }

    /// Container when it is one (or advertises children), item when it carries a resource
    fn classify(self) -> Option<Node> {
        if self.element == Some(EntryElement::Container) || self.child_count.is_some() {
            return Some(Node::Container(Container {
                id: self.id,
                parent_id: self.parent_id,
                title: self.title,
                child_count: self.child_count.and_then(|c| c.trim().parse().ok()),
            }));
        }

        let Some(url) = self.res_url.filter(|u| !u.is_empty()) else {
            warn!("Skipping DIDL item {} ({}) without a resource", self.id, self.title);
            return None;
        };

        let size_bytes = self.res_size.as_deref().and_then(parse_size);
        Some(Node::Item(Item {
            kind: ItemKind::from_title(&self.title),
            is_recording: size_bytes == Some(RECORDING_IN_PROGRESS_SIZE),
            id: self.id,
            parent_id: self.parent_id,
            title: self.title,
            parent_folder: String::new(),
            url,
            size_bytes,
            duration_seconds: self.res_duration.as_deref().and_then(parse_duration),
            description: self.description,
        }))
    }
}

/// Parse a DIDL-Lite document into nodes, in document order
pub fn parse_didl(xml: &str) -> Result<Vec<Node>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut nodes = Vec::new();
    let mut current: Option<RawEntry> = None;
    let mut current_text = String::new();
    let mut in_res = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                match e.local_name().as_ref() {
                    b"container" => current = Some(RawEntry::start(EntryElement::Container, &e)),
                    b"item" => current = Some(RawEntry::start(EntryElement::Item, &e)),
                    b"res" => {
                        if let Some(entry) = current.as_mut() {
                            // First resource wins
                            if entry.res_url.is_none() {
                                in_res = true;
                                for (key, value) in attributes(&e) {
                                    match key.as_str() {
                                        "size" => entry.res_size = Some(value),
                                        "duration" => entry.res_duration = Some(value),
                                        _ => {}
                                    }
                                }
                            }
                        }
                    }
                    _ => {}
                }
                current_text.clear();
            }
            Ok(Event::Empty(e)) => {
                let element = match e.local_name().as_ref() {
                    b"container" => Some(EntryElement::Container),
                    b"item" => Some(EntryElement::Item),
                    _ => None,
                };
                if let Some(element) = element {
                    nodes.extend(RawEntry::start(element, &e).classify());
                }
            }
            Ok(Event::End(e)) => {
                let text = current_text.trim().to_string();
                match e.local_name().as_ref() {
                    b"container" | b"item" => {
                        if let Some(entry) = current.take() {
                            nodes.extend(entry.classify());
                        }
                    }
                    b"title" => {
                        if let Some(entry) = current.as_mut() {
                            entry.title = text;
                        }
                    }
                    b"description" => {
                        if let Some(entry) = current.as_mut() {
                            entry.description = text;
                        }
                    }
                    b"res" => {
                        if in_res {
                            if let Some(entry) = current.as_mut() {
                                entry.res_url = Some(text);
                            }
                            in_res = false;
                        }
                    }
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
                    "DIDL-Lite XML error at position {}: {}",
                    reader.buffer_position(),
                    e
                )));
            }
            _ => {}
        }
    }

    Ok(nodes)
}

fn attributes(start: &BytesStart<'_>) -> Vec<(String, String)> {
    start
        .attributes()
        .flatten()
        .map(|attr| {
            let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).to_string();
            let value = attr
                .unescape_value()
                .map(|v| v.to_string())
                .unwrap_or_else(|_| String::from_utf8_lossy(&attr.value).to_string());
            (key, value)
        })
        .collect()
}

/// Resource size in bytes; `None` when absent or garbled
pub fn parse_size(value: &str) -> Option<u64> {
    value.trim().parse().ok()
}

/// `H+:MM:SS[.fraction]` (or `MM:SS`, or bare seconds) to whole seconds
pub fn parse_duration(value: &str) -> Option<u64> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    let whole = value.split('.').next()?;
    let parts: Vec<&str> = whole.split(':').collect();
    if parts.len() > 3 {
        return None;
    }

    let mut seconds = 0u64;
    for part in &parts {
        let n: u64 = part.trim().parse().ok()?;
        seconds = seconds.checked_mul(60)?.checked_add(n)?;
    }
    Some(seconds)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHOW_LISTING: &str = r#"<DIDL-Lite xmlns="urn:schemas-upnp-org:metadata-1-0/DIDL-Lite/" xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:upnp="urn:schemas-upnp-org:metadata-1-0/upnp/">
<item id="61" parentID="12" restricted="1">
  <dc:title>S4 E12</dc:title>
  <dc:description>Max &amp; Caroline open a cupcake window.</dc:description>
  <upnp:class>object.item.videoItem</upnp:class>
  <res size="1534091264" duration="0:30:12.000" protocolInfo="http-get:*:video/mpeg:*">http://192.168.1.10:49152/web/61.mpeg</res>
</item>
<item id="62" parentID="12" restricted="1">
  <dc:title>S4 E13</dc:title>
  <res size="4398046510080" duration="bogus">http://192.168.1.10:49152/web/62.mpeg</res>
</item>
<item id="63" parentID="12" restricted="1">
  <dc:title>Ghost</dc:title>
</item>
</DIDL-Lite>"#;

    #[test]
    fn test_parse_items() {
        let nodes = parse_didl(SHOW_LISTING).unwrap();
        assert_eq!(nodes.len(), 2);

        let Node::Item(first) = &nodes[0] else {
            panic!("expected item");
        };
        assert_eq!(first.id, "61");
        assert_eq!(first.parent_id, "12");
        assert_eq!(first.title, "S4 E12");
        assert_eq!(first.description, "Max & Caroline open a cupcake window.");
        assert_eq!(first.url, "http://192.168.1.10:49152/web/61.mpeg");
        assert_eq!(first.size_bytes, Some(1_534_091_264));
        assert_eq!(first.duration_seconds, Some(1812));
        assert_eq!(first.kind, ItemKind::Episode);
        assert!(!first.is_recording);
    }

    #[test]
    fn test_bad_numbers_degrade_and_recording_is_flagged() {
        let nodes = parse_didl(SHOW_LISTING).unwrap();
        let Node::Item(second) = &nodes[1] else {
            panic!("expected item");
        };
        assert_eq!(second.duration_seconds, None);
        assert!(second.is_recording);
    }

    #[test]
    fn test_parse_containers() {
        let xml = r#"<DIDL-Lite xmlns:dc="http://purl.org/dc/elements/1.1/">
<container id="12" parentID="5" childCount="3" restricted="1"><dc:title>2 Broke Girls</dc:title></container>
<container id="13" parentID="5" restricted="1"><dc:title>News</dc:title></container>
<container id="14" parentID="5" childCount="0"/>
</DIDL-Lite>"#;
        let nodes = parse_didl(xml).unwrap();
        assert_eq!(nodes.len(), 3);
        assert_eq!(
            nodes[0],
            Node::Container(Container {
                id: "12".to_string(),
                parent_id: "5".to_string(),
                title: "2 Broke Girls".to_string(),
                child_count: Some(3),
            })
        );
        assert_eq!(nodes[1].title(), "News");
        assert_eq!(nodes[2].id(), "14");
    }

    #[test]
    fn test_malformed_didl_is_protocol_error() {
        let err = parse_didl("<DIDL-Lite><item id=\"1\"></container></DIDL-Lite>").unwrap_err();
        assert!(matches!(err, FetchError::Protocol { .. }));
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("1:02:03"), Some(3723));
        assert_eq!(parse_duration("0:30:12.500"), Some(1812));
        assert_eq!(parse_duration("45:10"), Some(2710));
        assert_eq!(parse_duration("90"), Some(90));
        assert_eq!(parse_duration(""), None);
        assert_eq!(parse_duration("a:b:c"), None);
        assert_eq!(parse_duration("1:2:3:4"), None);
    }

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size(" 1024 "), Some(1024));
        assert_eq!(parse_size("-1"), None);
        assert_eq!(parse_size("12kb"), None);
    }
}
