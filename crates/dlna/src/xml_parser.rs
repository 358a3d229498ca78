/// UPnP device description parsing with quick-xml
use fetchtv_core::{FetchError, Result};
use quick_xml::events::Event;
use quick_xml::Reader;

/// The parts of a device description document we care about
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceDescription {
    pub friendly_name: String,
    pub udn: Option<String>,
    pub manufacturer: Option<String>,
    pub manufacturer_url: Option<String>,
    pub model: Option<String>,
    pub services: Vec<DeviceService>,
}

impl DeviceDescription {
    /// First service whose type starts with `service_type_prefix`
    pub fn service(&self, service_type_prefix: &str) -> Option<&DeviceService> {
        self.services
            .iter()
            .find(|s| s.service_type.starts_with(service_type_prefix))
    }
}

/// A UPnP service entry, with URLs already resolved to absolute form
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceService {
    pub service_type: String,
    pub service_id: String,
    pub control_url: String,
    pub event_sub_url: String,
    pub scpd_url: String,
}

/// Parse a UPnP device description fetched from `location`
pub fn parse_device_description(xml: &str, location: &str) -> Result<DeviceDescription> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut description = DeviceDescription::default();
    let mut url_base: Option<String> = None;
    let mut services = Vec::new();
    let mut current_text = String::new();
    let mut device_depth = 0usize;
    let mut in_service = false;
    let mut current_service = DeviceService::default();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                match e.local_name().as_ref() {
                    b"device" => device_depth += 1,
                    b"service" => {
                        in_service = true;
                        current_service = DeviceService::default();
                    }
                    _ => {}
                }
                current_text.clear();
            }
            Ok(Event::End(e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).to_string();
                let text = current_text.trim().to_string();

                if in_service {
                    match name.as_str() {
                        "serviceType" => current_service.service_type = text,
                        "serviceId" => current_service.service_id = text,
                        "controlURL" => current_service.control_url = text,
                        "eventSubURL" => current_service.event_sub_url = text,
                        "SCPDURL" => current_service.scpd_url = text,
                        "service" => {
                            if !current_service.service_type.is_empty() {
                                services.push(std::mem::take(&mut current_service));
                            }
                            in_service = false;
                        }
                        _ => {}
                    }
                } else if device_depth == 1 {
                    // Only the root device; embedded devices keep their own names
                    match name.as_str() {
                        "friendlyName" => description.friendly_name = text,
                        "UDN" => description.udn = Some(text),
                        "manufacturer" => description.manufacturer = Some(text),
                        "manufacturerURL" => description.manufacturer_url = Some(text),
                        "modelName" => description.model = Some(text),
                        _ => {}
                    }
                } else if device_depth == 0 && name == "URLBase" && !text.is_empty() {
                    url_base = Some(text);
                }

                if name == "device" {
                    device_depth = device_depth.saturating_sub(1);
                }
                current_text.clear();
            }
            Ok(Event::Text(e)) => {
                current_text.push_str(&e.unescape().unwrap_or_default());
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(FetchError::protocol(format!(
                    "device description XML error at position {}: {}",
                    reader.buffer_position(),
                    e
                )));
            }
            _ => {}
        }
    }

    if description.friendly_name.is_empty() {
        description.friendly_name = "Unknown Device".to_string();
    }

    let base = url_base.as_deref().unwrap_or(location);
    description.services = services
        .into_iter()
        .map(|s| resolve_service_urls(s, base))
        .collect();

    Ok(description)
}

fn resolve_service_urls(service: DeviceService, base_url: &str) -> DeviceService {
    DeviceService {
        control_url: resolve_url(base_url, &service.control_url),
        event_sub_url: resolve_url(base_url, &service.event_sub_url),
        scpd_url: resolve_url(base_url, &service.scpd_url),
        ..service
    }
}

/// Resolve a potentially relative URL against a base URL
pub fn resolve_url(base: &str, url: &str) -> String {
    if url.starts_with("http://") || url.starts_with("https://") {
        return url.to_string();
    }

    if url.starts_with('/') {
        // Keep scheme + host + port of the base
        if let Some(pos) = base.find("://") {
            let after_scheme = &base[pos + 3..];
            return match after_scheme.find('/') {
                Some(slash) => format!("{}{}", &base[..pos + 3 + slash], url),
                None => format!("{}{}", base, url),
            };
        }
        return format!("{}{}", base, url);
    }

    // Relative to the base's directory
    let scheme_end = base.find("://").map(|p| p + 3).unwrap_or(0);
    match base[scheme_end..].rfind('/') {
        Some(last_slash) => format!("{}/{}", &base[..scheme_end + last_slash], url),
        None => format!("{}/{}", base, url),
    }
}
