/// UPnP/SSDP discovery of the Fetch TV media server
///
/// Sends an M-SEARCH for MediaServer devices, fetches the description of every
/// responder and keeps the first one made by Fetch that exposes a
/// ContentDirectory service.
use crate::context::FetchContext;
use crate::xml_parser::{parse_device_description, DeviceDescription};
use fetchtv_core::{FetchError, Result, Server, DEFAULT_PORT};
use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};
use std::time::Duration;
use tracing::{debug, info, warn};

const SSDP_ADDR: &str = "239.255.255.250:1900";
const SSDP_MX: u8 = 3; // Max wait time in seconds
const MEDIA_SERVER_TARGET: &str = "urn:schemas-upnp-org:device:MediaServer:1";
const CONTENT_DIRECTORY: &str = "urn:schemas-upnp-org:service:ContentDirectory";
const FETCH_MANUFACTURER_URL: &str = "http://www.fetch.com/";
const DESCRIPTION_PATH: &str = "MediaServer.xml";

/// Locate the Fetch TV server on the local network
///
/// Returns `NotFound` when nothing suitable answers before `timeout` elapses.
pub async fn discover(ctx: &FetchContext, timeout: Duration) -> Result<Server> {
    info!("Starting Fetch TV discovery ({}s timeout)", timeout.as_secs());

    let socket = create_ssdp_socket().map_err(|e| FetchError::protocol(format!("SSDP socket: {}", e)))?;
    send_msearch(&socket).map_err(|e| FetchError::protocol(format!("SSDP M-SEARCH: {}", e)))?;

    socket
        .set_nonblocking(true)
        .map_err(|e| FetchError::protocol(format!("SSDP socket: {}", e)))?;
    let socket = tokio::net::UdpSocket::from_std(socket)
        .map_err(|e| FetchError::protocol(format!("SSDP socket: {}", e)))?;

    let deadline = tokio::time::Instant::now() + timeout;
    let mut seen_locations = HashSet::new();
    let mut buf = [0u8; 2048];

    info!("Listening for SSDP responses...");

    loop {
        let (len, addr) = match tokio::time::timeout_at(deadline, socket.recv_from(&mut buf)).await {
            Ok(Ok(received)) => received,
            Ok(Err(e)) => {
                warn!("Socket error during discovery: {}", e);
                tokio::time::sleep(Duration::from_millis(10)).await;
                continue;
            }
            Err(_) => break,
        };

        let response = String::from_utf8_lossy(&buf[..len]);
        debug!("SSDP response from {} ({} bytes): {}", addr, len, response);

        let Some(location) = parse_location(&response) else {
            continue;
        };
        if !seen_locations.insert(location.clone()) {
            continue;
        }

        match describe_before(ctx, &location, addr.ip(), deadline).await {
            Ok(server) => {
                info!("Discovery successful: {} at {}", server.friendly_name, server.location);
                return Ok(server);
            }
            Err(e) => debug!("Ignoring {}: {}", location, e),
        }
    }

    warn!("Discovery failed: no Fetch TV server found");
    Err(FetchError::NotFound {
        timeout_secs: timeout.as_secs(),
    })
}

/// `server_from_location`, giving up when the discovery deadline passes
async fn describe_before(
    ctx: &FetchContext,
    location: &str,
    source_ip: IpAddr,
    deadline: tokio::time::Instant,
) -> Result<Server> {
    match tokio::time::timeout_at(deadline, server_from_location(ctx, location, Some(source_ip))).await
    {
        Ok(result) => result,
        Err(_) => Err(FetchError::protocol(format!(
            "{} did not describe itself before the discovery deadline",
            location
        ))),
    }
}

/// Build a server from an operator-supplied address, skipping SSDP
///
/// The description is read from the box's well-known location; nothing else
/// is validated until the first browse.
pub async fn server_at(ctx: &FetchContext, ip: IpAddr, port: Option<u16>) -> Result<Server> {
    let port = port.unwrap_or(DEFAULT_PORT);
    let location = format!("http://{}/{}", SocketAddr::new(ip, port), DESCRIPTION_PATH);

    info!("Using Fetch TV server at {}", location);
    server_from_location(ctx, &location, Some(ip)).await
}

/// Fetch the description at `location` and turn it into a `Server`
pub async fn server_from_location(
    ctx: &FetchContext,
    location: &str,
    source_ip: Option<IpAddr>,
) -> Result<Server> {
    let description = fetch_device_description(ctx, location).await?;

    if description.manufacturer_url.as_deref() != Some(FETCH_MANUFACTURER_URL) {
        return Err(FetchError::protocol(format!(
            "{} ({}) is not a Fetch TV server",
            description.friendly_name, location
        )));
    }

    let control_url = description
        .service(CONTENT_DIRECTORY)
        .map(|s| s.control_url.clone())
        .ok_or_else(|| {
            FetchError::protocol(format!("{} has no ContentDirectory service", location))
        })?;

    let url = reqwest::Url::parse(location)
        .map_err(|e| FetchError::protocol(format!("invalid location {}: {}", location, e)))?;
    let port = url.port_or_known_default().unwrap_or(DEFAULT_PORT);
    let address = match source_ip {
        Some(ip) => ip,
        None => url
            .host_str()
            .and_then(|h| h.trim_matches(|c| c == '[' || c == ']').parse().ok())
            .ok_or_else(|| FetchError::protocol(format!("no IP address in {}", location)))?,
    };

    Ok(Server {
        address,
        port,
        control_url,
        friendly_name: description.friendly_name,
        location: location.to_string(),
        manufacturer: description.manufacturer,
        manufacturer_url: description.manufacturer_url,
        model: description.model,
        udn: description.udn,
    })
}

/// Fetch and parse a UPnP device description
async fn fetch_device_description(ctx: &FetchContext, location: &str) -> Result<DeviceDescription> {
    debug!("Fetching device description from: {}", location);

    let response = ctx
        .control_client()
        .get(location)
        .send()
        .await
        .map_err(|e| FetchError::protocol(format!("GET {}: {}", location, e)))?;

    if !response.status().is_success() {
        return Err(FetchError::protocol(format!(
            "GET {} returned {}",
            location,
            response.status()
        )));
    }

    let xml_text = response
        .text()
        .await
        .map_err(|e| FetchError::protocol(format!("GET {}: {}", location, e)))?;

    parse_device_description(&xml_text, location)
}

/// Create a UDP socket for SSDP multicast
fn create_ssdp_socket() -> std::io::Result<UdpSocket> {
    let socket = socket2::Socket::new(
        socket2::Domain::IPV4,
        socket2::Type::DGRAM,
        Some(socket2::Protocol::UDP),
    )?;

    // Coexist with other UPnP software on the same host
    socket.set_reuse_address(true)?;
    #[cfg(unix)]
    socket.set_reuse_port(true)?;

    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0));
    socket.bind(&addr.into())?;

    let socket: UdpSocket = socket.into();
    info!("SSDP socket bound to: {}", socket.local_addr()?);

    let multicast_addr = Ipv4Addr::new(239, 255, 255, 250);
    if let Err(e) = socket.join_multicast_v4(&multicast_addr, &Ipv4Addr::UNSPECIFIED) {
        warn!("Failed to join multicast group: {}. Discovery may not work.", e);
        return Err(e);
    }
    socket.set_multicast_ttl_v4(2)?;

    debug!("SSDP socket created and configured");
    Ok(socket)
}

/// Build the M-SEARCH datagram for `search_target`
fn msearch_request(search_target: &str) -> String {
    format!(
        "M-SEARCH * HTTP/1.1\r\n\
         HOST: {}\r\n\
         MAN: \"ssdp:discover\"\r\n\
         MX: {}\r\n\
         ST: {}\r\n\
         \r\n",
        SSDP_ADDR, SSDP_MX, search_target
    )
}

fn send_msearch(socket: &UdpSocket) -> std::io::Result<()> {
    let msearch = msearch_request(MEDIA_SERVER_TARGET);
    let bytes_sent = socket.send_to(msearch.as_bytes(), SSDP_ADDR)?;
    info!(
        "Sent M-SEARCH for {} ({} bytes to {})",
        MEDIA_SERVER_TARGET, bytes_sent, SSDP_ADDR
    );
    Ok(())
}

/// Value of the LOCATION header of an SSDP response
fn parse_location(response: &str) -> Option<String> {
    response.lines().find_map(|line| {
        let (name, value) = line.split_once(':')?;
        if name.trim().eq_ignore_ascii_case("location") {
            Some(value.trim().to_string()).filter(|v| !v.is_empty())
        } else {
            None
        }
    })
}
