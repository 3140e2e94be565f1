//! External URL discovery for managed routes
//!
//! Given an HTTP route and the gateways it attaches to, produce the ordered
//! list of externally addressable URLs: resolve listeners to (scheme, port),
//! cross with the host set (route hostnames, else gateway addresses), and
//! canonicalize (lowercase, dedupe, lexicographic sort). Classification into
//! internal and external happens on the canonical list.

use std::collections::BTreeSet;
use std::net::IpAddr;

use kube::api::Api;
use kube::{Client, ResourceExt};
use tracing::debug;

use crate::crd::gwapi::{Gateway, GatewayListener, HTTPRoute};
use crate::error::Error;

/// Discover all URLs for a route, fetching its parent gateways.
///
/// A referenced gateway that does not exist is a `NotFound` error. An empty
/// result is `ExternalAddressNotFound`.
pub async fn discover_urls(client: &Client, route: &HTTPRoute) -> Result<Vec<String>, Error> {
    let route_namespace = route.namespace().unwrap_or_default();

    let mut gateways = Vec::new();
    for parent in &route.spec.parent_refs {
        if parent.kind.as_deref().is_some_and(|k| k != "Gateway") {
            continue;
        }
        let namespace = parent.namespace.clone().unwrap_or_else(|| route_namespace.clone());
        let api: Api<Gateway> = Api::namespaced(client.clone(), &namespace);
        let gateway = api
            .get_opt(&parent.name)
            .await
            .map_err(Error::Kube)?
            .ok_or_else(|| Error::not_found("Gateway", namespace.as_str(), parent.name.as_str()))?;
        gateways.push((parent.section_name.clone(), gateway));
    }

    let urls = collect_urls(route, &gateways);
    if urls.is_empty() {
        return Err(Error::ExternalAddressNotFound);
    }
    Ok(urls)
}

/// Pure URL collection over a route and its resolved gateways.
///
/// `gateways` pairs each gateway with the `sectionName` the route used to
/// reference it (None means all listeners).
pub fn collect_urls(route: &HTTPRoute, gateways: &[(Option<String>, Gateway)]) -> Vec<String> {
    let hosts = route_hosts(route, gateways);
    let path = route_path(route);

    let mut urls = BTreeSet::new();
    for (section_name, gateway) in gateways {
        for listener in resolve_listeners(gateway, section_name.as_deref()) {
            let Some(scheme) = listener_scheme(listener) else {
                continue;
            };
            for host in &hosts {
                urls.insert(format_url(scheme, host, listener.port, &path));
            }
        }
    }

    urls.into_iter().collect()
}

fn route_hosts(route: &HTTPRoute, gateways: &[(Option<String>, Gateway)]) -> Vec<String> {
    let from_route: Vec<String> = route
        .spec
        .hostnames
        .iter()
        .filter(|h| !h.is_empty() && h.as_str() != "*")
        .map(|h| h.to_lowercase())
        .collect();
    if !from_route.is_empty() {
        return from_route;
    }

    let mut hosts = Vec::new();
    for (_, gateway) in gateways {
        let Some(status) = &gateway.status else {
            continue;
        };
        for address in &status.addresses {
            match address.type_.as_deref() {
                None | Some("IPAddress") | Some("Hostname") => {
                    if !address.value.is_empty() {
                        hosts.push(address.value.to_lowercase());
                    }
                }
                other => debug!(type_ = ?other, "skipping gateway address of unknown type"),
            }
        }
    }
    hosts
}

fn route_path(route: &HTTPRoute) -> String {
    route
        .spec
        .rules
        .first()
        .and_then(|rule| rule.matches.first())
        .and_then(|m| m.path.as_ref())
        .and_then(|p| p.value.clone())
        .unwrap_or_else(|| "/".to_string())
}

fn resolve_listeners<'a>(
    gateway: &'a Gateway,
    section_name: Option<&str>,
) -> Vec<&'a GatewayListener> {
    match section_name {
        Some(section) => gateway
            .spec
            .listeners
            .iter()
            .filter(|l| l.name == section)
            .collect(),
        None => gateway.spec.listeners.iter().collect(),
    }
}

fn listener_scheme(listener: &GatewayListener) -> Option<&'static str> {
    match listener.protocol.as_str() {
        "HTTP" => Some("http"),
        "HTTPS" => Some("https"),
        _ => None,
    }
}

fn format_url(scheme: &str, host: &str, port: i32, path: &str) -> String {
    let default_port = match scheme {
        "http" => 80,
        _ => 443,
    };
    if port == default_port {
        format!("{scheme}://{host}{path}")
    } else {
        format!("{scheme}://{host}:{port}{path}")
    }
}

/// Split a canonical URL list into (external, internal) halves, preserving
/// order.
///
/// A URL is internal when its host is an RFC 1918 or loopback IP literal, a
/// hostname containing `localhost`, or has a top-label suffix of `.local`,
/// `.internal` or `.localhost`.
pub fn classify_urls(urls: &[String]) -> (Vec<String>, Vec<String>) {
    let mut external = Vec::new();
    let mut internal = Vec::new();
    for url in urls {
        if is_internal_url(url) {
            internal.push(url.clone());
        } else {
            external.push(url.clone());
        }
    }
    (external, internal)
}

fn is_internal_url(url: &str) -> bool {
    let Some(host) = url_host(url) else {
        return false;
    };

    if let Ok(ip) = host.parse::<IpAddr>() {
        return match ip {
            IpAddr::V4(v4) => v4.is_loopback() || v4.is_private(),
            IpAddr::V6(v6) => v6.is_loopback(),
        };
    }

    if host.contains("localhost") {
        return true;
    }
    host.ends_with(".local") || host.ends_with(".internal") || host.ends_with(".localhost")
}

fn url_host(url: &str) -> Option<&str> {
    let rest = url.split_once("://")?.1;
    let authority = rest.split(['/', '?']).next()?;
    Some(authority.rsplit_once(':').map_or(authority, |(host, port)| {
        if port.chars().all(|c| c.is_ascii_digit()) {
            host
        } else {
            authority
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::gwapi::{
        GatewaySpec, GatewayStatus, GatewayStatusAddress, HTTPPathMatch, HTTPRouteMatch,
        HTTPRouteRule, HTTPRouteSpec, ParentReference,
    };

    fn gateway(listeners: Vec<GatewayListener>, addresses: Vec<(&str, &str)>) -> Gateway {
        let mut gw = Gateway::new(
            "gw",
            GatewaySpec {
                gateway_class_name: Some("istio".into()),
                listeners,
            },
        );
        gw.status = Some(GatewayStatus {
            addresses: addresses
                .into_iter()
                .map(|(type_, value)| GatewayStatusAddress {
                    type_: Some(type_.to_string()),
                    value: value.to_string(),
                })
                .collect(),
        });
        gw
    }

    fn http_listener(name: &str, port: i32) -> GatewayListener {
        GatewayListener {
            name: name.to_string(),
            hostname: None,
            port,
            protocol: "HTTP".to_string(),
        }
    }

    fn https_listener(name: &str, port: i32) -> GatewayListener {
        GatewayListener {
            name: name.to_string(),
            hostname: None,
            port,
            protocol: "HTTPS".to_string(),
        }
    }

    fn route(hostnames: Vec<&str>) -> HTTPRoute {
        HTTPRoute::new(
            "route",
            HTTPRouteSpec {
                parent_refs: vec![ParentReference::gateway("gw", "ns")],
                hostnames: hostnames.into_iter().map(String::from).collect(),
                rules: vec![],
            },
        )
    }

    #[test]
    fn gateway_addresses_sort_lexicographically() {
        // addresses deliberately out of order
        let gw = gateway(
            vec![http_listener("http", 80)],
            vec![("IPAddress", "203.0.113.200"), ("IPAddress", "203.0.113.100")],
        );
        let urls = collect_urls(&route(vec![]), &[(None, gw)]);
        assert_eq!(
            urls,
            vec!["http://203.0.113.100/", "http://203.0.113.200/"]
        );
    }

    #[test]
    fn route_hostnames_win_over_gateway_addresses() {
        let gw = gateway(
            vec![http_listener("http", 80)],
            vec![("IPAddress", "203.0.113.1")],
        );
        let urls = collect_urls(&route(vec!["API.Example.COM", "*", ""]), &[(None, gw)]);
        assert_eq!(urls, vec!["http://api.example.com/"]);
    }

    #[test]
    fn listener_scheme_and_non_default_port_are_reflected() {
        let gw = gateway(
            vec![https_listener("https", 8443)],
            vec![("Hostname", "secure.example.com")],
        );
        let urls = collect_urls(&route(vec![]), &[(None, gw)]);
        assert_eq!(urls, vec!["https://secure.example.com:8443/"]);

        let gw = gateway(
            vec![https_listener("https", 443)],
            vec![("Hostname", "secure.example.com")],
        );
        let urls = collect_urls(&route(vec![]), &[(None, gw)]);
        assert_eq!(urls, vec!["https://secure.example.com/"]);
    }

    #[test]
    fn section_name_restricts_to_one_listener() {
        let gw = gateway(
            vec![http_listener("http", 80), https_listener("https", 443)],
            vec![("IPAddress", "203.0.113.1")],
        );
        let urls = collect_urls(&route(vec![]), &[(Some("https".to_string()), gw.clone())]);
        assert_eq!(urls, vec!["https://203.0.113.1/"]);

        // without a section name, all listeners contribute
        let urls = collect_urls(&route(vec![]), &[(None, gw)]);
        assert_eq!(urls, vec!["http://203.0.113.1/", "https://203.0.113.1/"]);
    }

    #[test]
    fn duplicate_hosts_collapse() {
        let gw = gateway(
            vec![http_listener("http", 80)],
            vec![
                ("IPAddress", "203.0.113.1"),
                ("IPAddress", "203.0.113.1"),
                ("Hostname", "API.example.com"),
                ("Hostname", "api.example.com"),
            ],
        );
        let urls = collect_urls(&route(vec![]), &[(None, gw)]);
        assert_eq!(
            urls,
            vec!["http://203.0.113.1/", "http://api.example.com/"]
        );
    }

    #[test]
    fn path_comes_from_the_first_rule_match() {
        let mut r = route(vec![]);
        r.spec.rules = vec![HTTPRouteRule {
            matches: vec![HTTPRouteMatch {
                path: Some(HTTPPathMatch {
                    type_: Some("PathPrefix".into()),
                    value: Some("/api/v1/models".into()),
                }),
                ..Default::default()
            }],
            ..Default::default()
        }];
        let gw = gateway(
            vec![http_listener("http", 80)],
            vec![("IPAddress", "203.0.113.1")],
        );
        let urls = collect_urls(&r, &[(None, gw)]);
        assert_eq!(urls, vec!["http://203.0.113.1/api/v1/models"]);
    }

    #[test]
    fn non_http_listeners_are_skipped() {
        let gw = gateway(
            vec![GatewayListener {
                name: "tcp".into(),
                hostname: None,
                port: 9000,
                protocol: "TCP".into(),
            }],
            vec![("IPAddress", "203.0.113.1")],
        );
        assert!(collect_urls(&route(vec![]), &[(None, gw)]).is_empty());
    }

    #[test]
    fn classification_splits_internal_and_external() {
        let urls = vec![
            "http://10.0.0.20/".to_string(),
            "http://192.168.1.10/".to_string(),
            "http://127.0.0.1/".to_string(),
            "http://172.16.0.1/".to_string(),
            "http://203.0.113.50/".to_string(),
            "http://api.example.com/".to_string(),
            "http://app.internal/".to_string(),
            "http://localhost/".to_string(),
            "http://service.local/".to_string(),
            "http://my.localhost/".to_string(),
        ];
        let (external, internal) = classify_urls(&urls);
        assert_eq!(
            external,
            vec!["http://203.0.113.50/", "http://api.example.com/"]
        );
        assert_eq!(internal.len(), 8);
    }

    #[test]
    fn classification_handles_explicit_ports() {
        let urls = vec![
            "http://10.0.0.20:8080/".to_string(),
            "https://api.example.com:8443/".to_string(),
        ];
        let (external, internal) = classify_urls(&urls);
        assert_eq!(external, vec!["https://api.example.com:8443/"]);
        assert_eq!(internal, vec!["http://10.0.0.20:8080/"]);
    }

    #[test]
    fn discovery_is_deterministic() {
        let gw = gateway(
            vec![http_listener("http", 80), https_listener("https", 443)],
            vec![
                ("IPAddress", "198.51.100.1"),
                ("Hostname", "Z.example.com"),
                ("IPAddress", "203.0.113.1"),
            ],
        );
        let a = collect_urls(&route(vec![]), &[(None, gw.clone())]);
        let b = collect_urls(&route(vec![]), &[(None, gw)]);
        assert_eq!(a, b);
        let mut sorted = a.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(a, sorted, "output must be sorted and duplicate-free");
    }
}
