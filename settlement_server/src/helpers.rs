use std::{net::IpAddr, str::FromStr};

use actix_web::HttpRequest;
use hmac::{Hmac, Mac};
use log::{debug, trace};
use regex::Regex;
use sha2::Sha256;

/// The client address used for the provider IP allow-list. Proxy headers are only trusted when
/// the corresponding config flag is set; otherwise the connection's peer address is used.
pub fn get_remote_ip(req: &HttpRequest, use_x_forwarded_for: bool, use_forwarded: bool) -> Option<IpAddr> {
    if use_x_forwarded_for {
        if let Some(ip) = header_ip(req, "X-Forwarded-For") {
            debug!("💻️ Remote address {ip} taken from X-Forwarded-For");
            return Some(ip);
        }
    }
    if use_forwarded {
        let re = Regex::new(r#"for=(?P<ip>[^;]+)"#).ok()?;
        let forwarded = req
            .headers()
            .get("Forwarded")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| re.captures(v))
            .and_then(|caps| caps.name("ip"))
            .and_then(|m| IpAddr::from_str(m.as_str()).ok());
        if let Some(ip) = forwarded {
            debug!("💻️ Remote address {ip} taken from Forwarded");
            return Some(ip);
        }
    }
    let peer = req.connection_info().peer_addr().and_then(|s| IpAddr::from_str(s).ok());
    trace!("💻️ Remote address from the connection peer: {peer:?}");
    peer
}

fn header_ip(req: &HttpRequest, name: &str) -> Option<IpAddr> {
    req.headers().get(name).and_then(|v| v.to_str().ok()).and_then(|s| IpAddr::from_str(s.trim()).ok())
}

/// HMAC-SHA256 over `data`, returned as lowercase hex. This is the signature scheme used on
/// both the merchant API (over the `x-timestamp` header) and outbound notifications (over the
/// envelope timestamp).
pub fn calculate_hmac_hex(secret: &str, data: &[u8]) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("HMAC accepts keys of any size");
    mac.update(data);
    hex::encode(mac.finalize().into_bytes())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn hmac_hex_is_deterministic_and_keyed() {
        let a = calculate_hmac_hex("secret", b"1718000000");
        let b = calculate_hmac_hex("secret", b"1718000000");
        let c = calculate_hmac_hex("other", b"1718000000");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
    }
}
