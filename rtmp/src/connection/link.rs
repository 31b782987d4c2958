use super::ConnectionError;
use std::fmt;

pub const DEFAULT_PORT: u16 = 1935;

/// The transport named by the scheme of a server link
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Protocol {
    Rtmp,
    Rtmpt,
    Rtmps,
    Rtmpe,
    Rtmpte,
    Rtmfp,
}

impl Protocol {
    pub fn parse(scheme: &str) -> Option<Protocol> {
        match scheme.to_ascii_lowercase().as_str() {
            "rtmp" => Some(Protocol::Rtmp),
            "rtmpt" => Some(Protocol::Rtmpt),
            "rtmps" => Some(Protocol::Rtmps),
            "rtmpe" => Some(Protocol::Rtmpe),
            "rtmpte" => Some(Protocol::Rtmpte),
            "rtmfp" => Some(Protocol::Rtmfp),
            _ => None,
        }
    }

    pub fn scheme(self) -> &'static str {
        match self {
            Protocol::Rtmp => "rtmp",
            Protocol::Rtmpt => "rtmpt",
            Protocol::Rtmps => "rtmps",
            Protocol::Rtmpe => "rtmpe",
            Protocol::Rtmpte => "rtmpte",
            Protocol::Rtmfp => "rtmfp",
        }
    }

    /// Only plain TCP transports can be opened.  `Rtmpe` gets as far as the encrypted handshake.
    pub fn is_supported(self) -> bool {
        match self {
            Protocol::Rtmp | Protocol::Rtmpe => true,
            _ => false,
        }
    }

    pub fn is_encrypted(self) -> bool {
        match self {
            Protocol::Rtmpe | Protocol::Rtmpte => true,
            _ => false,
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.scheme())
    }
}

/// Where to connect to, parsed from a `protocol://host[:port]/app[/...]` locator
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerLink {
    pub protocol: Protocol,
    pub host: String,
    pub port: u16,

    /// Everything after the host, without the leading slash.  May contain further slashes
    /// (e.g. `app/instance`).
    pub app: String,
}

impl ServerLink {
    pub fn new(protocol: Protocol, host: &str, port: u16, app: &str) -> ServerLink {
        ServerLink {
            protocol,
            host: host.to_string(),
            port,
            app: app.to_string(),
        }
    }

    pub fn parse(url: &str) -> Result<ServerLink, ConnectionError> {
        let invalid = || ConnectionError::InvalidUrl {
            url: url.to_string(),
        };

        let separator = url.find("://").ok_or_else(invalid)?;
        let protocol = Protocol::parse(&url[..separator]).ok_or_else(invalid)?;
        let rest = &url[separator + 3..];

        let (authority, app) = match rest.find('/') {
            Some(index) => (&rest[..index], &rest[index + 1..]),
            None => (rest, ""),
        };

        let (host, port) = if authority.starts_with('[') {
            let end = authority.find(']').ok_or_else(invalid)?;
            let host = &authority[1..end];
            let port = match &authority[end + 1..] {
                "" => None,
                x if x.starts_with(':') => Some(&x[1..]),
                _ => return Err(invalid()),
            };

            (host, port)
        } else {
            match authority.rfind(':') {
                Some(index) => (&authority[..index], Some(&authority[index + 1..])),
                None => (authority, None),
            }
        };

        if host.is_empty() {
            return Err(invalid());
        }

        let port = match port {
            Some(port) => port.parse::<u16>().map_err(|_| invalid())?,
            None => DEFAULT_PORT,
        };

        Ok(ServerLink {
            protocol,
            host: host.to_string(),
            port,
            app: app.trim_end_matches('/').to_string(),
        })
    }

    /// The `host:port` pair used to open the socket
    pub fn address(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    /// Reconstructs the locator, always including the port
    pub fn url(&self) -> String {
        format!("{}://{}/{}", self.protocol, self.address(), self.app)
    }

    /// The `tcUrl` sent in the `connect` command
    pub fn tc_url(&self) -> String {
        self.url()
    }
}

impl fmt::Display for ServerLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_link() {
        let link = ServerLink::parse("rtmp://media.example.com:1940/vod/instance").unwrap();
        assert_eq!(link.protocol, Protocol::Rtmp);
        assert_eq!(link.host, "media.example.com");
        assert_eq!(link.port, 1940);
        assert_eq!(link.app, "vod/instance");
        assert_eq!(link.url(), "rtmp://media.example.com:1940/vod/instance");
    }

    #[test]
    fn port_defaults_to_1935() {
        let link = ServerLink::parse("RTMPE://10.0.0.1/live").unwrap();
        assert_eq!(link.protocol, Protocol::Rtmpe);
        assert_eq!(link.port, DEFAULT_PORT);
        assert_eq!(link.tc_url(), "rtmpe://10.0.0.1:1935/live");
    }

    #[test]
    fn ipv6_hosts_are_bracketed() {
        let link = ServerLink::parse("rtmp://[::1]:2000/app").unwrap();
        assert_eq!(link.host, "::1");
        assert_eq!(link.port, 2000);
        assert_eq!(link.address(), "[::1]:2000");
    }

    #[test]
    fn app_may_be_empty() {
        let link = ServerLink::parse("rtmp://host").unwrap();
        assert_eq!(link.app, "");
    }

    #[test]
    fn bad_links_are_rejected() {
        for url in &["host/app", "http://host/app", "rtmp:///app", "rtmp://host:port/app"] {
            match ServerLink::parse(url) {
                Err(ConnectionError::InvalidUrl { .. }) => (),
                x => panic!("Expected InvalidUrl for {}, got {:?}", url, x),
            }
        }
    }

    #[test]
    fn only_tcp_transports_are_supported() {
        assert!(Protocol::Rtmp.is_supported());
        assert!(Protocol::Rtmpe.is_supported());
        assert!(!Protocol::Rtmpt.is_supported());
        assert!(!Protocol::Rtmps.is_supported());
        assert!(!Protocol::Rtmfp.is_supported());
    }
}
